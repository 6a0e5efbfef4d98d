//! The sweep loop and the per-address probe pipeline.

use super::{Hit, Scanner};
use crate::error::ProbeError;
use crate::ipv4::{self, AddrRange};
use crate::probe::with_timeout;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// One entry of the sweep plan.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SweepTarget {
    /// Sweep `[base - radius, base + radius]` with adaptive radius.
    Seed(u32),
    /// Sweep an operator range as-is.
    Extra(AddrRange),
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

/// Result of running the pipeline on one address.
#[derive(Debug)]
enum Outcome {
    Excluded,
    Miss,
    Hit(Vec<String>),
    Stopped,
}

fn stop_requested(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow()
}

/// Sleep for `duration` unless stopped first. Returns `true` if stopped.
async fn pause(duration: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    if stop_requested(stop) {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => stop_requested(stop),
        changed = stop.changed() => changed.is_err() || stop_requested(stop),
    }
}

impl Scanner {
    /// Cycle through the sweep plan until stopped.
    pub(crate) async fn run(&self, mut stop: watch::Receiver<bool>) {
        info!(
            seeds = self.seeds.len(),
            port = self.config.probe_port,
            pattern = %self.pattern,
            "scanner started"
        );

        loop {
            let plan = self.sweep_plan();
            if plan.is_empty() {
                debug!("sweep plan empty, idling");
                let idle = self.config.skip_pause().max(Duration::from_secs(1));
                if pause(idle, &mut stop).await {
                    return;
                }
                continue;
            }

            for (index, target) in plan.into_iter().enumerate() {
                if stop_requested(&stop) {
                    return;
                }
                if self.sweep(index, target, &mut stop).await == Flow::Stop {
                    return;
                }
            }
        }
    }

    fn sweep_plan(&self) -> Vec<SweepTarget> {
        let extra = self.state().extra_ranges.clone();
        self.seeds
            .iter()
            .map(|base| SweepTarget::Seed(*base))
            .chain(extra.into_iter().map(SweepTarget::Extra))
            .collect()
    }

    /// Walk one target address by address.
    ///
    /// For seed targets the upper bound is re-read after every address, so
    /// hits extend the sweep that produced them.
    pub(crate) async fn sweep(
        &self,
        index: usize,
        target: SweepTarget,
        stop: &mut watch::Receiver<bool>,
    ) -> Flow {
        let start = match target {
            SweepTarget::Seed(base) => {
                let radius = self.state().cursor.radius;
                ipv4::range_around(base, radius).start
            }
            SweepTarget::Extra(range) => range.start,
        };
        {
            let mut state = self.state();
            state.cursor.base_index = index;
            state.cursor.current_address = start;
        }
        match target {
            SweepTarget::Seed(base) => {
                info!(base = %ipv4::encode(base), radius = self.state().cursor.radius, "sweep started")
            }
            SweepTarget::Extra(range) => info!(range = %range, "sweep started"),
        }

        let mut hits = 0u32;
        let mut addr = start;
        loop {
            let end = match target {
                SweepTarget::Seed(base) => {
                    let radius = self.state().cursor.radius;
                    ipv4::range_around(base, radius).end
                }
                SweepTarget::Extra(range) => range.end,
            };
            if addr > end {
                break;
            }
            self.state().cursor.current_address = addr;

            let delay = match self.probe_address(addr, stop).await {
                Outcome::Stopped => return Flow::Stop,
                Outcome::Excluded => self.config.skip_pause(),
                Outcome::Miss => {
                    self.state().cursor.hit_streak = 0;
                    self.config.skip_pause()
                }
                Outcome::Hit(hostnames) => {
                    hits += 1;
                    let grow = matches!(target, SweepTarget::Seed(_));
                    self.record_hit(addr, hostnames, grow).await;
                    self.config.action_pause()
                }
            };
            if pause(delay, stop).await {
                return Flow::Stop;
            }

            if addr == u32::MAX {
                break;
            }
            addr += 1;
        }

        if hits == 0 {
            if let SweepTarget::Seed(base) = target {
                self.state().cursor.radius = self.config.radius_floor;
                info!(
                    base = %ipv4::encode(base),
                    radius = self.config.radius_floor,
                    "sweep found nothing, radius reset"
                );
            }
        }
        info!(index, hits, "sweep finished");
        Flow::Continue
    }

    /// Exclusion → reverse DNS → hostname filter → port probe.
    async fn probe_address(&self, addr: u32, stop: &watch::Receiver<bool>) -> Outcome {
        let text = ipv4::encode(addr);
        if ipv4::is_excluded(&text, &self.config.exclusions) {
            debug!(addr = %text, "excluded, skipping");
            return Outcome::Excluded;
        }
        if stop_requested(stop) {
            return Outcome::Stopped;
        }

        self.state().cursor.total_probed += 1;
        let ip = Ipv4Addr::from(addr);

        let lookup = with_timeout(
            self.config.lookup_timeout(),
            self.backend.reverse_lookup(ip),
        )
        .await;
        let hostnames = match lookup {
            Ok(names) if !names.is_empty() => names,
            Ok(_) | Err(ProbeError::NotFound) => {
                debug!(addr = %text, "no PTR records");
                return Outcome::Miss;
            }
            Err(ProbeError::Timeout) => {
                debug!(addr = %text, "reverse lookup timed out");
                return Outcome::Miss;
            }
            Err(e) => {
                warn!(addr = %text, error = %e, "reverse lookup failed");
                return Outcome::Miss;
            }
        };
        if stop_requested(stop) {
            return Outcome::Stopped;
        }

        let matched: Vec<String> = hostnames
            .into_iter()
            .filter(|name| name.to_lowercase().contains(&self.pattern))
            .collect();
        if matched.is_empty() {
            debug!(addr = %text, "no hostname matches target pattern");
            return Outcome::Miss;
        }
        if stop_requested(stop) {
            return Outcome::Stopped;
        }

        let port = self.config.probe_port;
        let timeout = self.config.probe_timeout();
        match with_timeout(timeout, self.backend.port_open(ip, port, timeout)).await {
            Ok(true) => Outcome::Hit(matched),
            Ok(false) => {
                info!(addr = %text, port, host = %matched[0], "port closed");
                Outcome::Miss
            }
            Err(ProbeError::Timeout) => {
                info!(addr = %text, port, host = %matched[0], "port probe timed out");
                Outcome::Miss
            }
            Err(e) => {
                warn!(addr = %text, port, error = %e, "port probe failed");
                Outcome::Miss
            }
        }
    }

    /// Record a hit. Only seed sweeps adapt the radius (`grow`).
    async fn record_hit(&self, addr: u32, hostnames: Vec<String>, grow: bool) {
        let text = ipv4::encode(addr);
        let radius = {
            let mut state = self.state();
            state.cursor.hit_streak += 1;
            if grow {
                state.cursor.radius = state.cursor.radius.saturating_add(self.config.radius_step);
            }
            let radius = state.cursor.radius;
            state.hits.push_back(Hit {
                address: text.clone(),
                hostnames: hostnames.clone(),
                port: self.config.probe_port,
                radius,
            });
            while state.hits.len() > self.config.max_hits {
                state.hits.pop_front();
            }
            radius
        };
        info!(
            addr = %text,
            port = self.config.probe_port,
            hosts = ?hostnames,
            radius,
            "hit"
        );

        if self.config.whois_on_hit {
            match with_timeout(self.config.whois_timeout(), self.backend.whois(&text)).await {
                Ok(body) => {
                    let summary = body
                        .lines()
                        .map(str::trim)
                        .find(|l| !l.is_empty() && !l.starts_with('%') && !l.starts_with('#'))
                        .unwrap_or("");
                    info!(addr = %text, summary = %summary, "whois");
                }
                Err(e) => debug!(addr = %text, error = %e, "whois unavailable"),
            }
        }
    }
}
