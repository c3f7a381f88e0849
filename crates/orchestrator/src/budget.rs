//! API Budget (SPEC_FULL §4.8, §5): "a shared counter decremented atomically on every
//! adapter call. When `remaining ≤ 0`, remaining priorities that require external calls
//! are skipped with reason `budget_exhausted`."
//!
//! `pipeline_core::ApiBudget` is the plain-data snapshot shape persisted in the run
//! summary; `BudgetGuard` is the live, thread-shared counter workers decrement from.
//! Grounded in `data-loader::main`'s `AtomicU64` run counters, generalized from a
//! monotonic progress counter into a decrementing admission gate.

use pipeline_core::ApiBudget;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

pub struct BudgetGuard {
    total: i64,
    remaining: AtomicI64,
    per_provider: Mutex<HashMap<String, i64>>,
}

impl BudgetGuard {
    pub fn new(total: i64) -> Self {
        Self { total, remaining: AtomicI64::new(total), per_provider: Mutex::new(HashMap::new()) }
    }

    /// Tries to charge one unit of budget to `provider`. A worker that would spend
    /// below zero must not issue the call — this reserves the unit only if one is
    /// actually available, per SPEC_FULL §5.
    pub fn try_spend(&self, provider: &str) -> bool {
        let previous = self.remaining.fetch_sub(1, Ordering::SeqCst);
        if previous <= 0 {
            self.remaining.fetch_add(1, Ordering::SeqCst);
            return false;
        }
        let mut counts = self.per_provider.lock().unwrap();
        *counts.entry(provider.to_string()).or_insert(0) += 1;
        true
    }

    pub fn exhausted(&self) -> bool {
        self.remaining.load(Ordering::SeqCst) <= 0
    }

    pub fn snapshot(&self) -> ApiBudget {
        ApiBudget {
            total: self.total,
            remaining: self.remaining.load(Ordering::SeqCst).max(0),
            per_provider: self.per_provider.lock().unwrap().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_spend_refuses_once_exhausted() {
        let guard = BudgetGuard::new(2);
        assert!(guard.try_spend("polygon"));
        assert!(guard.try_spend("polygon"));
        assert!(!guard.try_spend("polygon"));
        assert!(guard.exhausted());
        let snapshot = guard.snapshot();
        assert_eq!(snapshot.remaining, 0);
        assert_eq!(snapshot.per_provider.get("polygon"), Some(&2));
    }

    #[test]
    fn try_spend_never_goes_negative_under_contention() {
        let guard = BudgetGuard::new(1);
        assert!(guard.try_spend("a"));
        assert!(!guard.try_spend("b"));
        assert_eq!(guard.snapshot().remaining, 0);
    }
}
