// Copyright (c) 2026 Marquee Labs. MIT License.
// See LICENSE for details.

//! # Marquee Core
//!
//! Library half of Marquee, a gateway that stages operations against an
//! external token ledger and commits them later, when the client comes
//! back with the opaque staging token(s) it was handed.
//!
//! Why stage at all? Two reasons, both about money:
//!
//! 1. A client should get to confirm price, recipient, and balance before
//!    the ledger-mutating call actually fires.
//! 2. A ticket purchase touches two independent ledger resources — a
//!    base-coin payment and a movie-token transfer — and the ledger has no
//!    native multi-asset transaction. Staging both legs in one descriptor
//!    and committing them as a unit is the closest thing to atomicity the
//!    external surface allows; when it isn't atomic enough, the partial
//!    failure is recorded, never papered over.
//!
//! ## Architecture
//!
//! - **staging** — the core protocol: token issuance, the descriptor
//!   store, exactly-once commit, and TTL expiry.
//! - **ledger** — the boundary to the external ledger service, as a trait
//!   plus an HTTP client and an in-memory implementation.
//! - **balance** — stateless read-only balance lookups.
//! - **config** — one explicit configuration value, built at startup.
//! - **error** — the protocol's failure taxonomy.
//!
//! ## Design Philosophy
//!
//! 1. The store's compare-and-set is the only serialization point; if a
//!    second one shows up in review, something is wrong.
//! 2. Ledger transfers are never retried. Ambiguity goes to an operator,
//!    not to a retry loop that might double-spend.
//! 3. If it touches money, it has tests. Plural.

pub mod balance;
pub mod config;
pub mod error;
pub mod ledger;
pub mod staging;
