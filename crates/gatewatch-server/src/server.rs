//! Core server: accepts WebSocket connections and runs every frame through
//! the gateway.
//!
//! A connection must open with a `hello` frame; that is the connect event
//! evaluated against the per-source cap. The admission guard it yields is
//! held until the socket task ends, which releases the slot.

use crate::config::ServerConfig;
use crate::protocol::{self, ClientMessage, ServerMessage};
use crate::transport::websocket::{self, WebSocketConnection};
use gatewatch_core::admission::EventKind;
use gatewatch_core::{
    verify_token, AdmissionEvent, Decision, DenyReason, GatewatchError, Gateway, Result,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

type Ws = WebSocketStream<TcpStream>;

/// Per-connection context threaded through the frame loop.
struct ConnectionContext {
    remote: SocketAddr,
    /// Token presented in `hello`, if it passed verification.
    token: Option<String>,
    admin: bool,
}

/// The gatewatch server instance.
pub struct GatewatchServer {
    config: ServerConfig,
    gateway: Arc<Gateway>,
}

impl GatewatchServer {
    pub fn new(config: ServerConfig, gateway: Arc<Gateway>) -> Self {
        Self { config, gateway }
    }

    /// Bind the listener and serve until the accept channel closes.
    pub async fn run(self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind, self.config.port)
            .parse()
            .map_err(|e| GatewatchError::Config(format!("invalid address: {e}")))?;
        let (_, rx) = websocket::start_listener(addr).await?;
        self.serve(rx).await;
        Ok(())
    }

    /// Serve connections from an already started listener.
    pub async fn serve(self, mut rx: tokio::sync::mpsc::Receiver<WebSocketConnection>) {
        let server = Arc::new(self);

        // Periodic admission state GC
        let gc_gateway = server.gateway.clone();
        let gc_every = Duration::from_secs(server.config.gc_interval);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(gc_every);
            loop {
                interval.tick().await;
                gc_gateway.gc();
            }
        });

        while let Some(conn) = rx.recv().await {
            let server = server.clone();
            tokio::spawn(async move {
                let remote = conn.remote_addr;
                if let Err(e) = server.handle_connection(conn).await {
                    debug!(remote = %remote, error = %e, "connection ended with error");
                }
            });
        }
    }

    async fn handle_connection(&self, conn: WebSocketConnection) -> Result<()> {
        let WebSocketConnection {
            mut ws_stream,
            remote_addr,
        } = conn;

        let hello_timeout = Duration::from_secs(self.config.hello_timeout);
        let first = match tokio::time::timeout(hello_timeout, websocket::ws_recv_text(&mut ws_stream)).await {
            Ok(frame) => frame?,
            Err(_) => {
                debug!(remote = %remote_addr, "no hello before timeout");
                None
            }
        };

        let presented = match first.as_deref().map(protocol::decode) {
            Some(Ok(ClientMessage::Hello { token })) => token,
            _ => {
                send(&mut ws_stream, &ServerMessage::error(DenyReason::Unauthorized.message())).await?;
                websocket::ws_close(&mut ws_stream).await;
                return Ok(());
            }
        };

        let (token, subject) = self.resolve_token(presented, remote_addr);
        let admin = match (&token, &self.config.admin_token) {
            (Some(t), Some(admin)) => t == admin,
            _ => false,
        };

        let event = AdmissionEvent::connect(remote_addr.ip(), token.clone());
        let _guard = match self.gateway.handle(&event) {
            Decision::Allow(admission) => admission.into_guard(),
            Decision::Deny(reason) => {
                info!(remote = %remote_addr, reason = %reason, "connection denied");
                send(&mut ws_stream, &ServerMessage::error(reason.message())).await?;
                websocket::ws_close(&mut ws_stream).await;
                return Ok(());
            }
        };

        info!(remote = %remote_addr, subject = ?subject, admin, "client connected");
        send(&mut ws_stream, &ServerMessage::Welcome { subject }).await?;

        let ctx = ConnectionContext {
            remote: remote_addr,
            token,
            admin,
        };
        let result = self.frame_loop(&mut ws_stream, &ctx).await;
        info!(remote = %remote_addr, "client disconnected");
        result
    }

    async fn frame_loop(&self, ws: &mut Ws, ctx: &ConnectionContext) -> Result<()> {
        while let Some(text) = websocket::ws_recv_text(ws).await? {
            let reply = match protocol::decode(&text) {
                Ok(msg) => self.dispatch(msg, ctx),
                Err(e) => ServerMessage::error(e.to_string()),
            };
            send(ws, &reply).await?;
        }
        Ok(())
    }

    fn dispatch(&self, msg: ClientMessage, ctx: &ConnectionContext) -> ServerMessage {
        match msg {
            ClientMessage::Ping => ServerMessage::Pong,
            ClientMessage::Hello { .. } => ServerMessage::error("already greeted"),
            ClientMessage::Message {
                user_id,
                channel_id,
                message,
            } => {
                let event = AdmissionEvent {
                    kind: EventKind::Message,
                    token: ctx.token.clone(),
                    subject_id: user_id,
                    channel_id,
                    message,
                    source: ctx.remote.ip(),
                };
                match self.gateway.handle(&event) {
                    Decision::Allow(_) => {
                        debug!(
                            remote = %ctx.remote,
                            subject = ?event.subject_id,
                            channel = ?event.channel_id,
                            "message admitted"
                        );
                        ServerMessage::Ack
                    }
                    Decision::Deny(reason) => ServerMessage::error(reason.message()),
                }
            }
            ClientMessage::ScanStatus => {
                if !ctx.admin {
                    return ServerMessage::error(DenyReason::Unauthorized.message());
                }
                match self.gateway.scan_status() {
                    Some(status) => ServerMessage::Status { status },
                    None => ServerMessage::error("scanner not configured"),
                }
            }
            ClientMessage::AddRange { range } => {
                if !ctx.admin {
                    return ServerMessage::error(DenyReason::Unauthorized.message());
                }
                match self.gateway.add_range(&range) {
                    Some(Ok(added)) => ServerMessage::RangeAdded {
                        range: added.to_string(),
                    },
                    Some(Err(e)) => ServerMessage::error(e.to_string()),
                    None => ServerMessage::error("scanner not configured"),
                }
            }
            ClientMessage::StartScan => {
                if !ctx.admin {
                    return ServerMessage::error(DenyReason::Unauthorized.message());
                }
                if self.gateway.scan_status().is_none() {
                    return ServerMessage::error("scanner not configured");
                }
                if self.gateway.start_scanner() {
                    info!(remote = %ctx.remote, "scanner started by admin");
                }
                ServerMessage::ScanControl {
                    scanning: self.gateway.scanner_running(),
                }
            }
            ClientMessage::StopScan => {
                if !ctx.admin {
                    return ServerMessage::error(DenyReason::Unauthorized.message());
                }
                if self.gateway.scan_status().is_none() {
                    return ServerMessage::error("scanner not configured");
                }
                info!(remote = %ctx.remote, "scanner stopped by admin");
                self.gateway.stop_scanner();
                ServerMessage::ScanControl { scanning: false }
            }
        }
    }

    /// Apply token verification when a secret is configured.
    ///
    /// Returns the token to present to the gate (dropped if it failed
    /// verification) and the verified subject, if any.
    fn resolve_token(
        &self,
        presented: Option<String>,
        remote: SocketAddr,
    ) -> (Option<String>, Option<String>) {
        let token = presented.filter(|t| !t.is_empty());
        let Some(secret) = &self.config.token_secret else {
            return (token, None);
        };
        let Some(token) = token else {
            return (None, None);
        };
        if self.config.admin_token.as_deref() == Some(token.as_str()) {
            return (Some(token), None);
        }
        match verify_token(secret, &token) {
            Ok(subject) => (Some(token), Some(subject)),
            Err(e) => {
                warn!(remote = %remote, error = %e, "token rejected");
                (None, None)
            }
        }
    }
}

async fn send(ws: &mut Ws, msg: &ServerMessage) -> Result<()> {
    websocket::ws_send_text(ws, protocol::encode(msg)?).await
}
