//! # Pending Transaction Store
//!
//! The only mutable shared state in the staging core. Descriptors live in
//! a [`DashMap`] keyed by their internal id, with a second map from opaque
//! staging tokens to that id. All mutation goes through the store's atomic
//! primitives; the per-descriptor entry lock provided by `DashMap` is the
//! serialization point that makes [`PendingStore::compare_and_set_status`]
//! a true compare-and-set — exactly one concurrent caller can win the
//! `Pending → Committing` edge.
//!
//! Tokens are 32 bytes of OS randomness, hex-encoded. Collision over the
//! store's lifetime is negligible; an actual collision on insert means the
//! randomness source is broken, which is a panic, not a business error.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;
use uuid::Uuid;

use super::intent::{PendingTransaction, StagingStatus};

/// Length of the random token material in bytes. Hex-encoding doubles it
/// on the wire, so clients see 64-character tokens.
pub const TOKEN_BYTE_LENGTH: usize = 32;

/// In-memory store of staged transactions.
///
/// Thread-safe and cheap to share behind an `Arc`. Descriptors are owned
/// exclusively by the store; callers always get clones.
#[derive(Default)]
pub struct PendingStore {
    /// Descriptors by internal id.
    descriptors: DashMap<Uuid, PendingTransaction>,
    /// Token → descriptor id. Multiple tokens may point at one descriptor.
    token_index: DashMap<String, Uuid>,
}

impl PendingStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a descriptor, minting one token per leg.
    ///
    /// Returns the minted tokens in leg order. A two-leg purchase gets two
    /// tokens that both resolve to the same descriptor; the commit protocol
    /// requires the full set to be presented together.
    ///
    /// # Panics
    ///
    /// Panics if a freshly generated token already exists in the index.
    /// With 256-bit tokens that is a broken RNG, not bad luck.
    pub fn put(&self, mut descriptor: PendingTransaction) -> Vec<String> {
        let id = descriptor.id;
        let tokens: Vec<String> = (0..descriptor.legs.len()).map(|_| generate_token()).collect();

        for token in &tokens {
            match self.token_index.entry(token.clone()) {
                Entry::Occupied(_) => {
                    panic!("staging token collision — randomness source is compromised")
                }
                Entry::Vacant(slot) => {
                    slot.insert(id);
                }
            }
        }

        descriptor.tokens = tokens.clone();
        self.descriptors.insert(id, descriptor);
        tokens
    }

    /// Looks up the descriptor a token points at. Returns a clone.
    pub fn get(&self, token: &str) -> Option<PendingTransaction> {
        let id = *self.token_index.get(token)?;
        self.descriptors.get(&id).map(|d| d.clone())
    }

    /// Atomically advances the descriptor's status from `from` to `to`.
    ///
    /// Succeeds only if the current status equals `from` *and* the edge is
    /// legal per [`StagingStatus::can_transition_to`]. Losers observe
    /// `false` and must not proceed to execute legs. Entering a terminal
    /// state stamps `resolved_at` for retention cleanup.
    pub fn compare_and_set_status(
        &self,
        token: &str,
        from: StagingStatus,
        to: StagingStatus,
    ) -> bool {
        let Some(id) = self.token_index.get(token).map(|e| *e) else {
            return false;
        };
        let Some(mut descriptor) = self.descriptors.get_mut(&id) else {
            return false;
        };

        if descriptor.status != from || !from.can_transition_to(to) {
            return false;
        }

        descriptor.status = to;
        if to.is_terminal() {
            descriptor.resolved_at = Some(Utc::now());
        }
        tracing::debug!(id = %id, %from, %to, "staging status advanced");
        true
    }

    /// Persists the outcome of one successfully executed leg.
    ///
    /// Called by the coordinator between legs so that a crash or a later
    /// leg failure never loses an already-obtained ledger transaction id.
    pub fn record_leg_result(&self, token: &str, leg_index: usize, ledger_tx_id: &str) {
        let Some(id) = self.token_index.get(token).map(|e| *e) else {
            return;
        };
        if let Some(mut descriptor) = self.descriptors.get_mut(&id) {
            if let Some(leg) = descriptor.legs.get_mut(leg_index) {
                leg.mark_committed(ledger_tx_id.to_string());
            }
        }
    }

    /// Removes the descriptor a token points at, along with every token
    /// bound to it.
    pub fn delete(&self, token: &str) {
        let Some(id) = self.token_index.get(token).map(|e| *e) else {
            return;
        };
        if let Some((_, descriptor)) = self.descriptors.remove(&id) {
            for t in &descriptor.tokens {
                self.token_index.remove(t);
            }
        }
    }

    /// Tokens (first per descriptor) of `Pending` descriptors whose TTL
    /// has elapsed as of `now`. Sweeper input.
    pub fn list_expired(&self, now: DateTime<Utc>) -> Vec<String> {
        self.descriptors
            .iter()
            .filter(|d| d.status == StagingStatus::Pending && d.is_expired(now))
            .filter_map(|d| d.tokens.first().cloned())
            .collect()
    }

    /// Tokens of terminal descriptors that resolved before `cutoff` and
    /// are therefore past their retention window.
    pub fn list_terminal_before(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        self.descriptors
            .iter()
            .filter(|d| {
                d.status.is_terminal()
                    && d.resolved_at.is_some_and(|resolved| resolved < cutoff)
            })
            .filter_map(|d| d.tokens.first().cloned())
            .collect()
    }

    /// Number of descriptors currently held (any state).
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the store holds no descriptors.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Mints one opaque staging token from OS randomness.
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTE_LENGTH];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Asset;
    use crate::staging::intent::TransferIntent;
    use chrono::Duration;

    fn one_leg_descriptor(ttl_secs: i64) -> PendingTransaction {
        PendingTransaction::new(
            vec![TransferIntent::new(Asset::BaseCoin, "0xAAA", "0xBBB", 100)],
            Duration::seconds(ttl_secs),
        )
    }

    fn two_leg_descriptor() -> PendingTransaction {
        PendingTransaction::new(
            vec![
                TransferIntent::new(Asset::BaseCoin, "0xAAA", "0xBBB", 500),
                TransferIntent::new(
                    Asset::NonFungibleToken {
                        token_type: "1000".into(),
                        token_index: "00000001".into(),
                    },
                    "0xBBB",
                    "0xAAA",
                    1,
                ),
            ],
            Duration::seconds(600),
        )
    }

    #[test]
    fn put_mints_one_token_per_leg() {
        let store = PendingStore::new();
        let tokens = store.put(two_leg_descriptor());
        assert_eq!(tokens.len(), 2);
        assert_ne!(tokens[0], tokens[1]);
        // 32 bytes hex-encoded.
        assert_eq!(tokens[0].len(), TOKEN_BYTE_LENGTH * 2);

        // Both tokens resolve to the same descriptor.
        let a = store.get(&tokens[0]).unwrap();
        let b = store.get(&tokens[1]).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.tokens, tokens);
    }

    #[test]
    fn get_unknown_token_is_none() {
        let store = PendingStore::new();
        assert!(store.get("deadbeef").is_none());
    }

    #[test]
    fn cas_advances_and_rejects() {
        let store = PendingStore::new();
        let tokens = store.put(one_leg_descriptor(600));
        let token = &tokens[0];

        assert!(store.compare_and_set_status(token, StagingStatus::Pending, StagingStatus::Committing));
        // Second claim loses: status is no longer Pending.
        assert!(!store.compare_and_set_status(token, StagingStatus::Pending, StagingStatus::Committing));
        // Illegal edge is rejected even with a matching `from`.
        assert!(!store.compare_and_set_status(token, StagingStatus::Committing, StagingStatus::Expired));
        // Legal terminal edge stamps resolved_at.
        assert!(store.compare_and_set_status(token, StagingStatus::Committing, StagingStatus::Committed));
        assert!(store.get(token).unwrap().resolved_at.is_some());
    }

    #[test]
    fn cas_is_exactly_once_under_contention() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let store = Arc::new(PendingStore::new());
        let token = store.put(one_leg_descriptor(600))[0].clone();
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let token = token.clone();
                let wins = Arc::clone(&wins);
                std::thread::spawn(move || {
                    if store.compare_and_set_status(
                        &token,
                        StagingStatus::Pending,
                        StagingStatus::Committing,
                    ) {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn record_leg_result_persists_incrementally() {
        let store = PendingStore::new();
        let tokens = store.put(two_leg_descriptor());

        store.record_leg_result(&tokens[0], 0, "tx-coin");
        let d = store.get(&tokens[1]).unwrap();
        assert!(d.legs[0].committed);
        assert_eq!(d.legs[0].ledger_tx_id.as_deref(), Some("tx-coin"));
        assert!(!d.legs[1].committed);
    }

    #[test]
    fn delete_removes_all_tokens() {
        let store = PendingStore::new();
        let tokens = store.put(two_leg_descriptor());
        store.delete(&tokens[0]);
        assert!(store.get(&tokens[0]).is_none());
        assert!(store.get(&tokens[1]).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn list_expired_sees_only_stale_pending() {
        let store = PendingStore::new();
        let stale = store.put(one_leg_descriptor(-5));
        let fresh = store.put(one_leg_descriptor(600));

        // A stale descriptor that already began committing is not listed.
        let claimed = store.put(one_leg_descriptor(-5));
        store.compare_and_set_status(&claimed[0], StagingStatus::Pending, StagingStatus::Committing);

        let expired = store.list_expired(Utc::now());
        assert_eq!(expired, vec![stale[0].clone()]);
        assert!(!expired.contains(&fresh[0]));
    }

    #[test]
    fn list_terminal_before_respects_retention() {
        let store = PendingStore::new();
        let tokens = store.put(one_leg_descriptor(600));
        store.compare_and_set_status(&tokens[0], StagingStatus::Pending, StagingStatus::Committing);
        store.compare_and_set_status(&tokens[0], StagingStatus::Committing, StagingStatus::Committed);

        // Resolved just now: not yet past a 1h retention cutoff.
        let cutoff = Utc::now() - Duration::hours(1);
        assert!(store.list_terminal_before(cutoff).is_empty());

        // With the cutoff in the future, the descriptor is collectable.
        let cutoff = Utc::now() + Duration::seconds(1);
        assert_eq!(store.list_terminal_before(cutoff), vec![tokens[0].clone()]);
    }

    #[test]
    fn tokens_are_unguessably_distinct() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1_000 {
            assert!(seen.insert(generate_token()));
        }
    }
}
