//! Existence Reaper (SPEC_FULL §4.4). Runs last in the state machine. Folded in as a
//! module of this crate rather than its own, per the `DESIGN.md` judgment call: its
//! SPEC_FULL budget share is small and it is tightly coupled to the orchestrator's
//! final REAP step of the same state machine.

use persistence::PersistenceGateway;
use pipeline_core::Outcome;
use router::FailoverRouter;
use std::sync::Arc;

pub struct ReapReport {
    pub delisted: Vec<String>,
    pub probed: usize,
}

pub struct ExistenceReaper {
    router: Arc<FailoverRouter>,
    persistence: Arc<PersistenceGateway>,
    min_agreement: usize,
}

impl ExistenceReaper {
    pub fn new(router: Arc<FailoverRouter>, persistence: Arc<PersistenceGateway>, min_agreement: usize) -> Self {
        Self { router, persistence, min_agreement }
    }

    /// A ticker is delisted iff `count(not_found) >= min_agreement` and no adapter
    /// returned `ok`; `rate_limited`/`transient_error`/`auth_error` are ignored
    /// entirely, per SPEC_FULL §4.4.
    pub async fn sweep(&self, tickers: &[String]) -> ReapReport {
        let mut delisted = Vec::new();
        let mut probed = 0usize;

        for ticker in tickers {
            let results = self.router.existence_probe_all(ticker).await;
            if results.is_empty() {
                continue;
            }
            probed += 1;

            let not_found = results.iter().filter(|(_, outcome)| *outcome == Outcome::NotFound).count();
            let any_ok = results.iter().any(|(_, outcome)| *outcome == Outcome::Ok);

            if not_found >= self.min_agreement && !any_ok {
                match self.persistence.delete_ticker(ticker).await {
                    Ok(()) => {
                        tracing::info!(ticker = %ticker, not_found, "delisted");
                        delisted.push(ticker.clone());
                    }
                    Err(error) => {
                        tracing::warn!(ticker = %ticker, %error, "delisting vote passed but delete failed");
                    }
                }
            }
        }

        ReapReport { delisted, probed }
    }
}
