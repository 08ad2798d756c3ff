//! Background key refresh.
//!
//! Re-syncs the agent on a fixed interval (when configured) and whenever the
//! process receives `SIGHUP`.

use std::sync::Arc;
use std::time::Duration;

use keybridge_ssh_agent::{KeyAgent, UpdateSummary};
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Failures warned about individually before going quiet.
const WARN_LIMIT: u32 = 3;

pub async fn run(agent: Arc<KeyAgent>, every: Option<Duration>, shutdown: CancellationToken) {
    let mut ticker = every.map(|period| {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });
    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!("failed to register SIGHUP handler: {e}");
            None
        }
    };
    let mut failures = FailureCounter::default();

    loop {
        let trigger = tokio::select! {
            () = shutdown.cancelled() => return,
            () = tick(&mut ticker) => "interval",
            () = hup(&mut hangup) => "SIGHUP",
        };
        debug!(trigger, "refreshing keys");
        failures.record(agent.update().await.map_err(|e| e.to_string()));
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn hup(hangup: &mut Option<Signal>) {
    if let Some(hangup) = hangup
        && hangup.recv().await.is_some()
    {
        return;
    }
    std::future::pending().await
}

/// What [`FailureCounter::record`] logged.
#[derive(Debug, PartialEq, Eq)]
enum Report {
    Updated,
    Recovered { after: u32 },
    Failed { attempt: u32 },
    Suppressing,
    Silent,
}

/// Rate-limits warnings for an update that keeps failing.
#[derive(Debug, Default)]
struct FailureCounter {
    consecutive: u32,
}

impl FailureCounter {
    fn record(&mut self, outcome: Result<UpdateSummary, String>) -> Report {
        match outcome {
            Ok(summary) => {
                let report = if self.consecutive > 0 {
                    info!(
                        failures = self.consecutive,
                        total = summary.total,
                        "key refresh recovered"
                    );
                    Report::Recovered {
                        after: self.consecutive,
                    }
                } else {
                    debug!(total = summary.total, "key refresh done");
                    Report::Updated
                };
                self.consecutive = 0;
                report
            }
            Err(err) => {
                self.consecutive += 1;
                if self.consecutive <= WARN_LIMIT {
                    warn!(attempt = self.consecutive, "key refresh failed: {err}");
                    Report::Failed {
                        attempt: self.consecutive,
                    }
                } else if self.consecutive == WARN_LIMIT + 1 {
                    warn!(
                        "key refresh has failed {} times, suppressing further warnings",
                        self.consecutive
                    );
                    Report::Suppressing
                } else {
                    Report::Silent
                }
            }
        }
    }
}
