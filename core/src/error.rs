//! Error types for the staging/commit protocol.
//!
//! Every fallible staging operation returns a [`StagingError`]. The enum is
//! exhaustive over the protocol's failure modes: request validation and
//! pre-checks, token resolution at commit time, the exactly-once claim, and
//! the two flavours of leg failure.

use thiserror::Error;

use crate::ledger::LedgerError;

/// Errors that can occur while staging or committing a transaction.
#[derive(Debug, Error)]
pub enum StagingError {
    /// A zero (or otherwise unusable) quantity was requested.
    #[error("invalid amount: {0}")]
    InvalidAmount(u64),

    /// The wallet address is not well-formed.
    #[error("invalid wallet address: {0:?}")]
    InvalidAddress(String),

    /// A balance query named an asset kind this service does not serve.
    #[error("unknown asset kind: {0:?}")]
    UnknownAsset(String),

    /// The pre-check found the buyer short. Surfaced before anything is
    /// staged, so the client can fail fast.
    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance {
        /// Balance reported by the ledger at staging time.
        available: u64,
        /// Amount the purchase would need.
        required: u64,
    },

    /// The requested movie token is not held by the seller wallet.
    #[error("movie token {0:?} is not available for purchase")]
    TicketUnavailable(String),

    /// No staged transaction matches the presented token.
    #[error("staging token not found")]
    TokenNotFound,

    /// The staged transaction's TTL elapsed before commit.
    #[error("staging token expired")]
    TokenExpired,

    /// A multi-token transaction was presented with a strict subset of its
    /// tokens, or with tokens from different transactions.
    #[error("incomplete commit set: all tokens of a staged transaction must be presented together")]
    IncompleteCommitSet,

    /// Another caller holds the commit claim right now.
    #[error("commit already in progress")]
    AlreadyInProgress,

    /// The staged transaction already reached a resolution.
    #[error("transaction already committed or resolved")]
    AlreadyCommitted,

    /// The first leg failed. Nothing reached the ledger; the descriptor is
    /// `Failed` and safe to discard.
    #[error("leg {index} failed, nothing committed")]
    LegFailed {
        /// Zero-based index of the failed leg.
        index: usize,
        /// The ledger failure that stopped the commit.
        #[source]
        source: LedgerError,
    },

    /// A later leg failed after earlier legs committed on-ledger. The
    /// committed prefix is **not** rolled back — the external ledger has no
    /// cross-asset rollback primitive. This must reach an operator.
    #[error(
        "partial commit failure: leg {failed_index} failed after {} committed leg(s)",
        committed_tx_ids.len()
    )]
    PartialCommitFailure {
        /// Ledger transaction ids of the legs that did commit, in order.
        committed_tx_ids: Vec<String>,
        /// Zero-based index of the leg that failed.
        failed_index: usize,
        /// The ledger failure on that leg.
        #[source]
        source: LedgerError,
    },

    /// A read-only ledger call (pre-check or balance query) failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
