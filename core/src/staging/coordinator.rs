//! # Commit Coordinator
//!
//! Executes the commit half of the protocol. Given the staging token(s) a
//! client presents, the coordinator:
//!
//! 1. Resolves the descriptor and checks expiry.
//! 2. Verifies the complete token set was presented (a two-leg purchase
//!    cannot commit just its payment leg or just its item leg).
//! 3. Claims the descriptor via compare-and-set `Pending → Committing` —
//!    the exactly-once guarantee. Losers get an error and execute nothing.
//! 4. Executes legs strictly in declared order, each under a bounded
//!    deadline, persisting every ledger transaction id as it lands.
//! 5. Resolves the terminal state: `Committed`, `Failed` (first leg, no
//!    ledger effects), or `PartiallyFailed` (a committed prefix exists).
//!
//! Legs are never retried: the ledger's transfer call is not idempotent,
//! and a retry after an ambiguous timeout risks a double-spend. A partial
//! failure is surfaced verbatim — the external ledger offers no cross-asset
//! rollback, so compensation is an operator decision, not an automatic one.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::StagingError;
use crate::ledger::{LedgerClient, LedgerError};
use crate::staging::intent::{StagingStatus, TransferIntent};
use crate::staging::store::PendingStore;

/// Successful commit: the ledger transaction ids of every leg, in order.
#[derive(Clone, Debug)]
pub struct CommitOutcome {
    pub ledger_tx_ids: Vec<String>,
}

/// Drives staged transactions through commit.
pub struct CommitCoordinator {
    store: Arc<PendingStore>,
    ledger: Arc<dyn LedgerClient>,
    leg_timeout: Duration,
}

impl CommitCoordinator {
    pub fn new(store: Arc<PendingStore>, ledger: Arc<dyn LedgerClient>, leg_timeout: Duration) -> Self {
        Self {
            store,
            ledger,
            leg_timeout,
        }
    }

    /// Commits the staged transaction unlocked by `tokens`.
    ///
    /// All tokens bound to the descriptor must be presented together;
    /// presenting a strict subset (or tokens from different descriptors)
    /// fails with [`StagingError::IncompleteCommitSet`] before any ledger
    /// call is made.
    pub async fn commit(&self, tokens: &[&str]) -> Result<CommitOutcome, StagingError> {
        let primary = *tokens.first().ok_or(StagingError::TokenNotFound)?;
        let descriptor = self.store.get(primary).ok_or(StagingError::TokenNotFound)?;

        if descriptor.status == StagingStatus::Expired || descriptor.is_expired(Utc::now()) {
            return Err(StagingError::TokenExpired);
        }

        // Completeness: presented set must equal the descriptor's set, and
        // every presented token must resolve to this descriptor.
        let presented: BTreeSet<&str> = tokens.iter().copied().collect();
        let bound: BTreeSet<&str> = descriptor.tokens.iter().map(String::as_str).collect();
        if presented != bound {
            return Err(StagingError::IncompleteCommitSet);
        }
        for token in &presented {
            match self.store.get(token) {
                Some(d) if d.id == descriptor.id => {}
                _ => return Err(StagingError::IncompleteCommitSet),
            }
        }

        // The claim. Exactly one concurrent caller gets past this line.
        if !self
            .store
            .compare_and_set_status(primary, StagingStatus::Pending, StagingStatus::Committing)
        {
            return Err(self.losing_claim_error(primary));
        }

        tracing::info!(
            id = %descriptor.id,
            legs = descriptor.legs.len(),
            "commit claim won, executing legs"
        );
        self.execute_legs(primary, &descriptor.legs).await
    }

    /// Maps a lost compare-and-set to the caller-facing error by
    /// re-reading the status the winner left behind.
    fn losing_claim_error(&self, token: &str) -> StagingError {
        match self.store.get(token).map(|d| d.status) {
            Some(StagingStatus::Committing) => StagingError::AlreadyInProgress,
            Some(StagingStatus::Expired) => StagingError::TokenExpired,
            // Committed / Failed / PartiallyFailed: already resolved.
            Some(_) => StagingError::AlreadyCommitted,
            None => StagingError::TokenNotFound,
        }
    }

    /// Executes the claimed descriptor's legs in declared order.
    async fn execute_legs(
        &self,
        token: &str,
        legs: &[TransferIntent],
    ) -> Result<CommitOutcome, StagingError> {
        let mut committed_tx_ids = Vec::with_capacity(legs.len());

        for (index, leg) in legs.iter().enumerate() {
            let result = tokio::time::timeout(self.leg_timeout, self.ledger.transfer(leg)).await;
            let leg_outcome = match result {
                Ok(inner) => inner,
                Err(_elapsed) => Err(LedgerError::Timeout(self.leg_timeout.as_millis() as u64)),
            };

            match leg_outcome {
                Ok(tx_id) => {
                    // Persist before touching the next leg so a later
                    // failure can never lose this id.
                    self.store.record_leg_result(token, index, &tx_id);
                    tracing::info!(leg = index, tx_id = %tx_id, "leg committed");
                    committed_tx_ids.push(tx_id);
                }
                Err(source) => {
                    return Err(self.resolve_leg_failure(token, index, committed_tx_ids, source));
                }
            }
        }

        self.store.compare_and_set_status(
            token,
            StagingStatus::Committing,
            StagingStatus::Committed,
        );
        Ok(CommitOutcome {
            ledger_tx_ids: committed_tx_ids,
        })
    }

    /// Resolves a failed leg into `Failed` (clean, nothing committed) or
    /// `PartiallyFailed` (a committed prefix exists, reconciliation case).
    fn resolve_leg_failure(
        &self,
        token: &str,
        failed_index: usize,
        committed_tx_ids: Vec<String>,
        source: LedgerError,
    ) -> StagingError {
        if committed_tx_ids.is_empty() {
            self.store.compare_and_set_status(
                token,
                StagingStatus::Committing,
                StagingStatus::Failed,
            );
            tracing::warn!(leg = failed_index, error = %source, "first leg failed, nothing committed");
            StagingError::LegFailed {
                index: failed_index,
                source,
            }
        } else {
            self.store.compare_and_set_status(
                token,
                StagingStatus::Committing,
                StagingStatus::PartiallyFailed,
            );
            tracing::error!(
                leg = failed_index,
                committed = committed_tx_ids.len(),
                error = %source,
                "partial commit failure — manual reconciliation required"
            );
            StagingError::PartialCommitFailure {
                committed_tx_ids,
                failed_index,
                source,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::InMemoryLedger;
    use crate::ledger::{Asset, AssetKind};
    use crate::staging::intent::PendingTransaction;

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn stage_proxy(store: &PendingStore) -> String {
        let descriptor = PendingTransaction::new(
            vec![TransferIntent::new(Asset::ProxyDelegation, "0xABC", "0xFEED", 100)],
            chrono::Duration::seconds(600),
        );
        store.put(descriptor).remove(0)
    }

    fn stage_purchase(store: &PendingStore, ledger: &InMemoryLedger) -> (String, String) {
        ledger.credit_base_coin("0xABC", 1_000);
        ledger.grant_nft("0xFEED", "10000001", "movie-42");
        let descriptor = PendingTransaction::new(
            vec![
                TransferIntent::new(Asset::BaseCoin, "0xABC", "0xFEED", 500),
                TransferIntent::new(
                    Asset::NonFungibleToken {
                        token_type: "10000001".into(),
                        token_index: "movie-42".into(),
                    },
                    "0xFEED",
                    "0xABC",
                    1,
                ),
            ],
            chrono::Duration::seconds(600),
        );
        let mut tokens = store.put(descriptor);
        let movie = tokens.remove(1);
        let coin = tokens.remove(0);
        (coin, movie)
    }

    fn setup() -> (Arc<PendingStore>, Arc<InMemoryLedger>, CommitCoordinator) {
        let store = Arc::new(PendingStore::new());
        let ledger = Arc::new(InMemoryLedger::new());
        let coordinator = CommitCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&ledger) as Arc<dyn LedgerClient>,
            TIMEOUT,
        );
        (store, ledger, coordinator)
    }

    #[tokio::test]
    async fn single_leg_commit_returns_tx_id_then_already_committed() {
        let (store, _ledger, coordinator) = setup();
        let token = stage_proxy(&store);

        let outcome = coordinator.commit(&[&token]).await.unwrap();
        assert_eq!(outcome.ledger_tx_ids.len(), 1);
        assert_eq!(store.get(&token).unwrap().status, StagingStatus::Committed);

        // Second presentation of the same token.
        let err = coordinator.commit(&[&token]).await.unwrap_err();
        assert!(matches!(err, StagingError::AlreadyCommitted));
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let (_store, _ledger, coordinator) = setup();
        let err = coordinator.commit(&["beef".repeat(16).as_str()]).await.unwrap_err();
        assert!(matches!(err, StagingError::TokenNotFound));
    }

    #[tokio::test]
    async fn two_leg_commit_moves_both_assets() {
        let (store, ledger, coordinator) = setup();
        let (coin, movie) = stage_purchase(&store, &ledger);

        let outcome = coordinator.commit(&[&coin, &movie]).await.unwrap();
        assert_eq!(outcome.ledger_tx_ids.len(), 2);
        assert_eq!(store.get(&coin).unwrap().status, StagingStatus::Committed);

        assert_eq!(ledger.base_coin_balance("0xABC"), 500);
        assert_eq!(ledger.base_coin_balance("0xFEED"), 500);
        assert_eq!(ledger.nft_holdings("0xABC", "10000001"), vec!["movie-42"]);
    }

    #[tokio::test]
    async fn subset_of_tokens_fails_with_zero_ledger_calls() {
        let (store, ledger, coordinator) = setup();
        let (coin, movie) = stage_purchase(&store, &ledger);

        for presented in [vec![coin.as_str()], vec![movie.as_str()]] {
            let err = coordinator.commit(&presented).await.unwrap_err();
            assert!(matches!(err, StagingError::IncompleteCommitSet));
        }
        assert_eq!(ledger.transfer_calls(), 0);
        assert_eq!(store.get(&coin).unwrap().status, StagingStatus::Pending);
    }

    #[tokio::test]
    async fn tokens_from_different_descriptors_are_incomplete() {
        let (store, ledger, coordinator) = setup();
        let (coin, _movie) = stage_purchase(&store, &ledger);
        let stray = stage_proxy(&store);

        let err = coordinator.commit(&[&coin, &stray]).await.unwrap_err();
        assert!(matches!(err, StagingError::IncompleteCommitSet));
        assert_eq!(ledger.transfer_calls(), 0);
    }

    #[tokio::test]
    async fn first_leg_failure_resolves_failed_and_skips_second_leg() {
        let (store, ledger, coordinator) = setup();
        let (coin, movie) = stage_purchase(&store, &ledger);
        ledger.fail_transfers_of(AssetKind::BaseCoin);

        let err = coordinator.commit(&[&coin, &movie]).await.unwrap_err();
        assert!(matches!(err, StagingError::LegFailed { index: 0, .. }));

        let descriptor = store.get(&coin).unwrap();
        assert_eq!(descriptor.status, StagingStatus::Failed);
        assert!(descriptor.committed_tx_ids().is_empty());
        // The item leg was never attempted.
        assert_eq!(ledger.transfer_calls_for(AssetKind::NonFungible), 0);
    }

    #[tokio::test]
    async fn later_leg_failure_is_partial_and_preserves_prefix() {
        let (store, ledger, coordinator) = setup();
        let (coin, movie) = stage_purchase(&store, &ledger);
        ledger.fail_transfers_of(AssetKind::NonFungible);

        let err = coordinator.commit(&[&coin, &movie]).await.unwrap_err();
        let StagingError::PartialCommitFailure {
            committed_tx_ids,
            failed_index,
            ..
        } = err
        else {
            panic!("expected PartialCommitFailure, got {err:?}");
        };
        assert_eq!(failed_index, 1);
        assert_eq!(committed_tx_ids.len(), 1);

        // The coin leg's tx id survives on the descriptor for
        // reconciliation; the item leg has none.
        let descriptor = store.get(&movie).unwrap();
        assert_eq!(descriptor.status, StagingStatus::PartiallyFailed);
        assert_eq!(descriptor.legs[0].ledger_tx_id, Some(committed_tx_ids[0].clone()));
        assert!(descriptor.legs[1].ledger_tx_id.is_none());
    }

    #[tokio::test]
    async fn expired_descriptor_cannot_commit() {
        let (store, ledger, coordinator) = setup();
        let descriptor = PendingTransaction::new(
            vec![TransferIntent::new(Asset::ProxyDelegation, "0xABC", "0xFEED", 1)],
            chrono::Duration::seconds(-5),
        );
        let token = store.put(descriptor).remove(0);

        let err = coordinator.commit(&[&token]).await.unwrap_err();
        assert!(matches!(err, StagingError::TokenExpired));
        assert_eq!(ledger.transfer_calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_commits_execute_legs_exactly_once() {
        let (store, ledger, coordinator) = setup();
        let coordinator = Arc::new(coordinator);
        let token = stage_proxy(&store);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coordinator = Arc::clone(&coordinator);
            let token = token.clone();
            handles.push(tokio::spawn(
                async move { coordinator.commit(&[&token]).await },
            ));
        }

        let mut wins = 0;
        let mut losses = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(StagingError::AlreadyInProgress | StagingError::AlreadyCommitted) => {
                    losses += 1
                }
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(losses, 7);
        // The single winner made the single ledger call.
        assert_eq!(ledger.transfer_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_ledger_call_times_out_and_fails_the_leg() {
        let store = Arc::new(PendingStore::new());
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.stall_transfers(Duration::from_secs(60));
        let coordinator = CommitCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&ledger) as Arc<dyn LedgerClient>,
            Duration::from_secs(1),
        );

        let token = stage_proxy(&store);
        let err = coordinator.commit(&[&token]).await.unwrap_err();
        assert!(matches!(
            err,
            StagingError::LegFailed {
                index: 0,
                source: LedgerError::Timeout(_)
            }
        ));
        assert_eq!(store.get(&token).unwrap().status, StagingStatus::Failed);
    }
}
