//! # Ledger Boundary
//!
//! Marquee never talks to the external ledger directly from business code.
//! Everything goes through the [`LedgerClient`] trait: balance queries,
//! holdings lookups, and the transfer submissions that commit staged legs.
//!
//! Two implementations ship with the crate:
//!
//! - [`HttpLedgerClient`](http::HttpLedgerClient) — the production client,
//!   speaking JSON over HTTP to the ledger service configured at startup.
//! - [`InMemoryLedger`](memory::InMemoryLedger) — a deterministic in-process
//!   ledger for devnet runs and tests, with failure injection and call
//!   counting so commit-path tests can assert "zero ledger calls happened".
//!
//! The trait is deliberately narrow. The coordinator needs exactly one
//! mutating call (`transfer`) and the issuer/balance service need two
//! read-only ones. Anything the real ledger offers beyond that stays out.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::staging::intent::TransferIntent;

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// The kinds of ledger resource a transfer leg can move.
///
/// `FungibleToken` and `NonFungibleToken` carry the ledger-side token type
/// identifiers; `BaseCoin` is the chain's native balance. `ProxyDelegation`
/// is not a balance movement at all — it grants the configured operator
/// wallet transfer rights over the delegating account, up to `amount`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Asset {
    /// Native base-coin balance.
    BaseCoin,
    /// A fungible item token (e.g. discount credits).
    FungibleToken {
        /// Ledger token-type identifier.
        token_type: String,
    },
    /// A single non-fungible item token (e.g. one movie token).
    NonFungibleToken {
        /// Ledger token-type identifier.
        token_type: String,
        /// Index of the individual token within the type.
        token_index: String,
    },
    /// Operator proxy approval on a user wallet.
    ProxyDelegation,
}

/// Coarse asset classification, used for failure injection and metrics
/// labels where the full [`Asset`] payload would be noise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssetKind {
    BaseCoin,
    Fungible,
    NonFungible,
    Proxy,
}

impl Asset {
    /// Returns the coarse kind of this asset.
    pub fn kind(&self) -> AssetKind {
        match self {
            Asset::BaseCoin => AssetKind::BaseCoin,
            Asset::FungibleToken { .. } => AssetKind::Fungible,
            Asset::NonFungibleToken { .. } => AssetKind::NonFungible,
            Asset::ProxyDelegation => AssetKind::Proxy,
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AssetKind::BaseCoin => "base-coin",
            AssetKind::Fungible => "fungible",
            AssetKind::NonFungible => "non-fungible",
            AssetKind::Proxy => "proxy",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Typed failures from the external ledger.
///
/// The coordinator never retries any of these — retrying a non-idempotent
/// transfer risks a double-spend. Classification into `Failed` vs
/// `PartiallyFailed` happens upstream, based on which leg the error hit.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Transport-level failure: connection refused, DNS, 5xx, etc.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// The ledger understood the request and said no.
    #[error("ledger rejected the call ({code}): {message}")]
    Rejected {
        /// HTTP status or ledger-specific error code.
        code: u16,
        /// Ledger-provided reason.
        message: String,
    },

    /// The per-leg deadline elapsed before the ledger answered.
    ///
    /// The leg's true outcome is unknown at this point; it is treated as a
    /// failure and left to reconciliation, never re-submitted.
    #[error("ledger call timed out after {0}ms")]
    Timeout(u64),
}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

/// Contract for the external ledger service.
///
/// `transfer` submits one leg and returns the ledger transaction id on
/// success. `query_balance` and `holdings` are read-only and carry no
/// staging state whatsoever.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submits one transfer leg. Returns the ledger transaction id.
    async fn transfer(&self, intent: &TransferIntent) -> Result<String, LedgerError>;

    /// Returns the balance of `account` for the given asset.
    ///
    /// For `NonFungibleToken` assets the `token_index` is ignored and the
    /// count of held tokens of that type is returned.
    async fn query_balance(&self, account: &str, asset: &Asset) -> Result<u64, LedgerError>;

    /// Returns the token indexes of the given non-fungible type held by
    /// `account`.
    async fn holdings(&self, account: &str, token_type: &str) -> Result<Vec<String>, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_kind_classification() {
        assert_eq!(Asset::BaseCoin.kind(), AssetKind::BaseCoin);
        assert_eq!(
            Asset::FungibleToken {
                token_type: "0001".into()
            }
            .kind(),
            AssetKind::Fungible
        );
        assert_eq!(
            Asset::NonFungibleToken {
                token_type: "1000".into(),
                token_index: "00000001".into()
            }
            .kind(),
            AssetKind::NonFungible
        );
        assert_eq!(Asset::ProxyDelegation.kind(), AssetKind::Proxy);
    }

    #[test]
    fn asset_kind_display_is_kebab_case() {
        assert_eq!(AssetKind::BaseCoin.to_string(), "base-coin");
        assert_eq!(AssetKind::NonFungible.to_string(), "non-fungible");
    }

    #[test]
    fn asset_serde_tags_by_kind() {
        let json = serde_json::to_value(Asset::FungibleToken {
            token_type: "0001".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "fungible-token");
        assert_eq!(json["token_type"], "0001");
    }
}
