//! # Expiry Sweeper
//!
//! Background hygiene for the pending store. Periodically:
//!
//! - marks stale `Pending` descriptors `Expired` via the store's
//!   compare-and-set, so a concurrent commit that already claimed the
//!   descriptor always wins, and
//! - deletes terminal descriptors whose retention window has passed,
//!   releasing store capacity.
//!
//! The sweeper never executes legs and never touches `Committing` or
//! terminal states. [`ExpirySweeper::sweep_once`] is the whole algorithm;
//! [`ExpirySweeper::run`] just drives it on a tokio interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::intent::StagingStatus;
use super::store::PendingStore;

/// What one sweep pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Descriptors moved `Pending → Expired`.
    pub expired: usize,
    /// Terminal descriptors deleted past retention.
    pub deleted: usize,
}

/// Periodic store sweeper.
pub struct ExpirySweeper {
    store: Arc<PendingStore>,
    interval: Duration,
    retention: chrono::Duration,
}

impl ExpirySweeper {
    pub fn new(store: Arc<PendingStore>, interval: Duration, retention: chrono::Duration) -> Self {
        Self {
            store,
            interval,
            retention,
        }
    }

    /// Runs one sweep pass against the clock value `now`.
    pub fn sweep_once(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for token in self.store.list_expired(now) {
            // A commit racing us may have claimed the descriptor between
            // listing and here; the CAS settles it in the commit's favor.
            if self.store.compare_and_set_status(
                &token,
                StagingStatus::Pending,
                StagingStatus::Expired,
            ) {
                report.expired += 1;
            }
        }

        let cutoff = now - self.retention;
        for token in self.store.list_terminal_before(cutoff) {
            self.store.delete(&token);
            report.deleted += 1;
        }

        if report != SweepReport::default() {
            tracing::info!(
                expired = report.expired,
                deleted = report.deleted,
                remaining = self.store.len(),
                "sweep pass complete"
            );
        }
        report
    }

    /// Drives [`Self::sweep_once`] forever on the configured interval,
    /// handing each pass's report to `on_report` (metrics, typically).
    ///
    /// Intended to be spawned as a task and aborted at shutdown.
    pub async fn run<F>(self, mut on_report: F)
    where
        F: FnMut(SweepReport) + Send,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            on_report(self.sweep_once(Utc::now()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Asset;
    use crate::staging::intent::{PendingTransaction, TransferIntent};

    fn sweeper(store: &Arc<PendingStore>, retention_secs: i64) -> ExpirySweeper {
        ExpirySweeper::new(
            Arc::clone(store),
            Duration::from_secs(30),
            chrono::Duration::seconds(retention_secs),
        )
    }

    fn stage(store: &PendingStore, ttl_secs: i64) -> String {
        let descriptor = PendingTransaction::new(
            vec![TransferIntent::new(Asset::ProxyDelegation, "0xABC", "0xFEED", 1)],
            chrono::Duration::seconds(ttl_secs),
        );
        store.put(descriptor).remove(0)
    }

    #[test]
    fn stale_pending_descriptors_expire() {
        let store = Arc::new(PendingStore::new());
        let stale = stage(&store, -10);
        let fresh = stage(&store, 600);

        let report = sweeper(&store, 3_600).sweep_once(Utc::now());
        assert_eq!(report.expired, 1);
        assert_eq!(report.deleted, 0);
        assert_eq!(store.get(&stale).unwrap().status, StagingStatus::Expired);
        assert_eq!(store.get(&fresh).unwrap().status, StagingStatus::Pending);
    }

    #[test]
    fn committing_descriptors_are_untouchable() {
        let store = Arc::new(PendingStore::new());
        let token = stage(&store, -10);
        // A commit claimed it just before the sweep.
        store.compare_and_set_status(&token, StagingStatus::Pending, StagingStatus::Committing);

        let report = sweeper(&store, 3_600).sweep_once(Utc::now());
        assert_eq!(report.expired, 0);
        assert_eq!(store.get(&token).unwrap().status, StagingStatus::Committing);
    }

    #[test]
    fn terminal_descriptors_are_deleted_after_retention() {
        let store = Arc::new(PendingStore::new());
        let token = stage(&store, 600);
        store.compare_and_set_status(&token, StagingStatus::Pending, StagingStatus::Committing);
        store.compare_and_set_status(&token, StagingStatus::Committing, StagingStatus::Committed);

        // Retention not yet over: kept.
        let report = sweeper(&store, 3_600).sweep_once(Utc::now());
        assert_eq!(report.deleted, 0);
        assert!(store.get(&token).is_some());

        // Zero retention: the next pass collects it.
        let report = sweeper(&store, 0).sweep_once(Utc::now() + chrono::Duration::seconds(1));
        assert_eq!(report.deleted, 1);
        assert!(store.get(&token).is_none());
    }

    #[test]
    fn expired_descriptors_also_age_out() {
        let store = Arc::new(PendingStore::new());
        let token = stage(&store, -10);

        let s = sweeper(&store, 0);
        let first = s.sweep_once(Utc::now());
        assert_eq!(first.expired, 1);

        // Expired is terminal; with zero retention the following pass
        // deletes it and the token stops resolving.
        let second = s.sweep_once(Utc::now() + chrono::Duration::seconds(1));
        assert_eq!(second.deleted, 1);
        assert!(store.get(&token).is_none());
    }
}
