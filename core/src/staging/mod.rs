//! # Staging Protocol
//!
//! The request/commit core: clients stage an operation against the
//! external ledger and later finalize it by presenting the opaque token(s)
//! minted at staging time. This decouples intent creation from the
//! ledger-mutating commit, and lets a purchase spanning two independent
//! ledger resources (a coin payment and a token transfer) be coordinated
//! as one logical unit on a ledger with no multi-asset transaction.
//!
//! - [`intent`] — descriptors, legs, and the status state machine.
//! - [`store`] — the shared descriptor store with atomic compare-and-set.
//! - [`issuer`] — validates requests and mints staging tokens.
//! - [`coordinator`] — exactly-once commit with partial-failure handling.
//! - [`sweeper`] — TTL expiry and retention cleanup.

pub mod coordinator;
pub mod intent;
pub mod issuer;
pub mod store;
pub mod sweeper;

pub use coordinator::{CommitCoordinator, CommitOutcome};
pub use intent::{PendingTransaction, StagingStatus, TransferIntent};
pub use issuer::TokenIssuer;
pub use store::PendingStore;
pub use sweeper::{ExpirySweeper, SweepReport};
