//! # Balance Query Service
//!
//! Stateless pass-through to the ledger for the four read-only balance
//! surfaces the gateway exposes: base coin, movie-discount credits,
//! movie-ticket holdings, and movie-token count. No staging, no tokens,
//! idempotent by nature — this is a boundary contract, not an algorithm.

use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::config::GatewayConfig;
use crate::error::StagingError;
use crate::ledger::{Asset, LedgerClient};

/// The balance surfaces a client can ask about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BalanceKind {
    /// Native base-coin balance.
    BaseCoin,
    /// Fungible discount-credit balance.
    MovieDiscount,
    /// Held movie-ticket tokens, with their indexes.
    MovieTicket,
    /// Count of held movie tokens.
    Movie,
}

impl FromStr for BalanceKind {
    type Err = StagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base-coin" => Ok(BalanceKind::BaseCoin),
            "movie-discount" => Ok(BalanceKind::MovieDiscount),
            "movie-ticket" => Ok(BalanceKind::MovieTicket),
            "movie" => Ok(BalanceKind::Movie),
            other => Err(StagingError::UnknownAsset(other.to_string())),
        }
    }
}

/// One balance answer.
#[derive(Clone, Debug, Serialize)]
pub struct BalanceReport {
    /// The account queried.
    pub account: String,
    /// Quantity held (count of tokens for non-fungible kinds).
    pub amount: u64,
    /// Token indexes, for kinds where individual tokens matter.
    #[serde(rename = "tokenIndexes", skip_serializing_if = "Option::is_none")]
    pub token_indexes: Option<Vec<String>>,
}

/// Read-only balance lookups against the ledger.
pub struct BalanceQueryService {
    ledger: Arc<dyn LedgerClient>,
    config: Arc<GatewayConfig>,
}

impl BalanceQueryService {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: Arc<GatewayConfig>) -> Self {
        Self { ledger, config }
    }

    /// Answers one balance query for `account`.
    pub async fn balance(
        &self,
        account: &str,
        kind: BalanceKind,
    ) -> Result<BalanceReport, StagingError> {
        let report = match kind {
            BalanceKind::BaseCoin => {
                let amount = self.ledger.query_balance(account, &Asset::BaseCoin).await?;
                BalanceReport {
                    account: account.to_string(),
                    amount,
                    token_indexes: None,
                }
            }
            BalanceKind::MovieDiscount => {
                let asset = Asset::FungibleToken {
                    token_type: self.config.fungible_token_type.clone(),
                };
                let amount = self.ledger.query_balance(account, &asset).await?;
                BalanceReport {
                    account: account.to_string(),
                    amount,
                    token_indexes: None,
                }
            }
            BalanceKind::MovieTicket => {
                let held = self
                    .ledger
                    .holdings(account, &self.config.non_fungible_token_type)
                    .await?;
                BalanceReport {
                    account: account.to_string(),
                    amount: held.len() as u64,
                    token_indexes: Some(held),
                }
            }
            BalanceKind::Movie => {
                let asset = Asset::NonFungibleToken {
                    token_type: self.config.non_fungible_token_type.clone(),
                    token_index: String::new(),
                };
                let amount = self.ledger.query_balance(account, &asset).await?;
                BalanceReport {
                    account: account.to_string(),
                    amount,
                    token_indexes: None,
                }
            }
        };
        Ok(report)
    }
}
