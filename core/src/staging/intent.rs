//! Core type definitions for staged transactions.
//!
//! A [`PendingTransaction`] is one staged operation against the external
//! ledger. It owns one or two [`TransferIntent`] legs that execute, in
//! declared order, when the client comes back with the staging token(s).
//! The [`StagingStatus`] state machine governs its whole lifecycle.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::Asset;

// ---------------------------------------------------------------------------
// Transfer Intent
// ---------------------------------------------------------------------------

/// One ledger-mutating call, to be executed at commit time.
///
/// Invariant: `ledger_tx_id` is `Some` if and only if `committed` is true.
/// The only way to set either is [`TransferIntent::mark_committed`], which
/// maintains both together.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferIntent {
    /// What is being moved (or delegated).
    pub asset: Asset,
    /// Source ledger account.
    pub from_account: String,
    /// Destination ledger account.
    pub to_account: String,
    /// Positive quantity. Fixed at 1 for non-fungible assets.
    pub amount: u64,
    /// Whether this leg has been executed against the ledger.
    pub committed: bool,
    /// The ledger transaction id, present once the leg succeeds.
    pub ledger_tx_id: Option<String>,
}

impl TransferIntent {
    /// Creates a new, uncommitted leg.
    ///
    /// Non-fungible assets always carry an amount of 1, whatever the
    /// caller passed — a single NFT is indivisible.
    pub fn new(asset: Asset, from_account: &str, to_account: &str, amount: u64) -> Self {
        let amount = match asset {
            Asset::NonFungibleToken { .. } => 1,
            _ => amount,
        };
        Self {
            asset,
            from_account: from_account.to_string(),
            to_account: to_account.to_string(),
            amount,
            committed: false,
            ledger_tx_id: None,
        }
    }

    /// Records successful execution of this leg.
    pub fn mark_committed(&mut self, ledger_tx_id: String) {
        self.committed = true;
        self.ledger_tx_id = Some(ledger_tx_id);
    }
}

// ---------------------------------------------------------------------------
// Status State Machine
// ---------------------------------------------------------------------------

/// Lifecycle state of a staged transaction.
///
/// Transitions are monotonic:
///
/// ```text
/// Pending ──► Committing ──► Committed
///    │             ├──────► PartiallyFailed
///    │             └──────► Failed
///    └──► Expired   (sweeper only)
/// ```
///
/// `Committed`, `Failed`, `PartiallyFailed`, and `Expired` are terminal;
/// a descriptor in any of them is immutable. `PartiallyFailed` is terminal
/// for automatic handling but flags the descriptor for out-of-band
/// reconciliation — a strict prefix of its legs committed on-ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StagingStatus {
    /// Staged, waiting for the client to commit.
    Pending,
    /// A commit caller won the claim and is executing legs.
    Committing,
    /// Terminal: every leg executed successfully.
    Committed,
    /// Terminal: a later leg failed after at least one leg committed.
    PartiallyFailed,
    /// Terminal: the first leg failed; nothing reached the ledger.
    Failed,
    /// Terminal: the TTL elapsed before any commit attempt won.
    Expired,
}

impl StagingStatus {
    /// Returns `true` for states that admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StagingStatus::Committed
                | StagingStatus::PartiallyFailed
                | StagingStatus::Failed
                | StagingStatus::Expired
        )
    }

    /// Whether `self → to` is a legal transition.
    ///
    /// This is the single encoding of the state machine; the store's
    /// compare-and-set consults it so no caller can invent an edge.
    pub fn can_transition_to(&self, to: StagingStatus) -> bool {
        use StagingStatus::*;
        matches!(
            (self, to),
            (Pending, Committing)
                | (Pending, Expired)
                | (Committing, Committed)
                | (Committing, PartiallyFailed)
                | (Committing, Failed)
        )
    }
}

impl std::fmt::Display for StagingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StagingStatus::Pending => "pending",
            StagingStatus::Committing => "committing",
            StagingStatus::Committed => "committed",
            StagingStatus::PartiallyFailed => "partially-failed",
            StagingStatus::Failed => "failed",
            StagingStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Pending Transaction
// ---------------------------------------------------------------------------

/// One staged operation: ordered legs, unlock tokens, lifecycle state.
///
/// Descriptors are owned exclusively by the store. Everything a client
/// holds is a token — an opaque lookup key, never a reference to the
/// descriptor itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingTransaction {
    /// Internal identifier. Never leaves the process.
    pub id: Uuid,
    /// Opaque tokens that unlock this descriptor. One per leg; a commit
    /// must present all of them together.
    pub tokens: Vec<String>,
    /// Legs in commit execution order.
    pub legs: Vec<TransferIntent>,
    /// Current lifecycle state.
    pub status: StagingStatus,
    /// When the descriptor was staged.
    pub created_at: DateTime<Utc>,
    /// After this instant an uncommitted descriptor can no longer commit.
    pub expires_at: DateTime<Utc>,
    /// When a terminal state was reached. Drives retention cleanup.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl PendingTransaction {
    /// Stages a new descriptor with the given legs and time-to-live.
    ///
    /// Tokens are minted by the store on insert; the descriptor starts
    /// with an empty token set and `Pending` status.
    pub fn new(legs: Vec<TransferIntent>, ttl: Duration) -> Self {
        debug_assert!(!legs.is_empty(), "a staged transaction needs at least one leg");
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tokens: Vec::new(),
            legs,
            status: StagingStatus::Pending,
            created_at: now,
            expires_at: now + ttl,
            resolved_at: None,
        }
    }

    /// Whether the TTL has elapsed as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Ledger transaction ids of the legs that committed, in leg order.
    pub fn committed_tx_ids(&self) -> Vec<String> {
        self.legs
            .iter()
            .filter_map(|leg| leg.ledger_tx_id.clone())
            .collect()
    }
}
