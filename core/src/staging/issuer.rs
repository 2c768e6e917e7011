//! # Token Issuer
//!
//! Turns validated client requests into staged [`PendingTransaction`]s and
//! hands back the opaque tokens that unlock them. Issuing never mutates the
//! ledger: the only ledger traffic here is the read-only pre-check that
//! lets a doomed purchase fail fast, before anything is staged.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::error::StagingError;
use crate::ledger::{Asset, LedgerClient};
use crate::staging::intent::{PendingTransaction, TransferIntent};
use crate::staging::store::PendingStore;

/// Stages transactions and mints their unlock tokens.
pub struct TokenIssuer {
    store: Arc<PendingStore>,
    ledger: Arc<dyn LedgerClient>,
    config: Arc<GatewayConfig>,
}

impl TokenIssuer {
    pub fn new(
        store: Arc<PendingStore>,
        ledger: Arc<dyn LedgerClient>,
        config: Arc<GatewayConfig>,
    ) -> Self {
        Self {
            store,
            ledger,
            config,
        }
    }

    /// Stages a proxy delegation: the wallet grants the operator transfer
    /// rights up to `amount`. Returns the single staging token.
    pub async fn request_proxy(
        &self,
        wallet_address: &str,
        amount: u64,
    ) -> Result<String, StagingError> {
        if amount == 0 {
            return Err(StagingError::InvalidAmount(amount));
        }
        validate_wallet_address(wallet_address)?;

        let leg = TransferIntent::new(
            Asset::ProxyDelegation,
            wallet_address,
            &self.config.operator_address,
            amount,
        );
        let descriptor = PendingTransaction::new(vec![leg], self.config.proxy_ttl());
        let mut tokens = self.store.put(descriptor);

        tracing::info!(wallet = wallet_address, amount, "proxy delegation staged");
        // One leg, one token.
        Ok(tokens.remove(0))
    }

    /// Stages a two-leg ticket purchase: base-coin payment from the buyer
    /// to the operator, then the movie token from the operator to the
    /// buyer. Both legs live in one descriptor and commit as one unit.
    ///
    /// Pre-checks run against live ledger state: the buyer must cover the
    /// price and the operator must still hold the requested movie token.
    /// Returns `(base_coin_token, movie_token_token)` — the commit call
    /// must present both.
    pub async fn request_ticket_purchase(
        &self,
        buyer: &str,
        price: u64,
        movie_token_index: &str,
    ) -> Result<(String, String), StagingError> {
        if price == 0 {
            return Err(StagingError::InvalidAmount(price));
        }
        validate_wallet_address(buyer)?;

        let available = self.ledger.query_balance(buyer, &Asset::BaseCoin).await?;
        if available < price {
            return Err(StagingError::InsufficientBalance {
                available,
                required: price,
            });
        }

        let inventory = self
            .ledger
            .holdings(
                &self.config.operator_address,
                &self.config.non_fungible_token_type,
            )
            .await?;
        if !inventory.iter().any(|idx| idx == movie_token_index) {
            return Err(StagingError::TicketUnavailable(movie_token_index.to_string()));
        }

        // Payment first, item second. If the item leg fails, the buyer has
        // a recorded claim; the reverse order could hand out tokens for
        // free.
        let legs = vec![
            TransferIntent::new(Asset::BaseCoin, buyer, &self.config.operator_address, price),
            TransferIntent::new(
                Asset::NonFungibleToken {
                    token_type: self.config.non_fungible_token_type.clone(),
                    token_index: movie_token_index.to_string(),
                },
                &self.config.operator_address,
                buyer,
                1,
            ),
        ];
        let descriptor = PendingTransaction::new(legs, self.config.purchase_ttl());
        let mut tokens = self.store.put(descriptor);

        tracing::info!(
            buyer,
            price,
            movie_token_index,
            "ticket purchase staged (2 legs)"
        );
        let movie_token = tokens.remove(1);
        let base_coin = tokens.remove(0);
        Ok((base_coin, movie_token))
    }

    /// Stages a purchase of fungible extras (discount credits, concessions
    /// vouchers). Follows the same one-or-two-leg pattern as tickets: a
    /// priced extra pays in base coin first, then receives the items; a
    /// zero-priced extra is a single item-transfer leg.
    ///
    /// Returns all staging tokens in leg order.
    pub async fn request_extra_purchase(
        &self,
        buyer: &str,
        price: u64,
        quantity: u64,
    ) -> Result<Vec<String>, StagingError> {
        if quantity == 0 {
            return Err(StagingError::InvalidAmount(quantity));
        }
        validate_wallet_address(buyer)?;

        let mut legs = Vec::with_capacity(2);
        if price > 0 {
            let available = self.ledger.query_balance(buyer, &Asset::BaseCoin).await?;
            if available < price {
                return Err(StagingError::InsufficientBalance {
                    available,
                    required: price,
                });
            }
            legs.push(TransferIntent::new(
                Asset::BaseCoin,
                buyer,
                &self.config.operator_address,
                price,
            ));
        }
        legs.push(TransferIntent::new(
            Asset::FungibleToken {
                token_type: self.config.fungible_token_type.clone(),
            },
            &self.config.operator_address,
            buyer,
            quantity,
        ));

        let descriptor = PendingTransaction::new(legs, self.config.purchase_ttl());
        let tokens = self.store.put(descriptor);

        tracing::info!(buyer, price, quantity, legs = tokens.len(), "extra purchase staged");
        Ok(tokens)
    }
}

/// Checks that a wallet address is well-formed: `0x` followed by at least
/// one hex digit. Shape of the address only — existence on the ledger is
/// the ledger's business.
pub fn validate_wallet_address(address: &str) -> Result<(), StagingError> {
    let hex_part = address
        .strip_prefix("0x")
        .ok_or_else(|| StagingError::InvalidAddress(address.to_string()))?;
    if hex_part.is_empty() || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(StagingError::InvalidAddress(address.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::InMemoryLedger;
    use crate::staging::intent::StagingStatus;

    fn setup() -> (Arc<PendingStore>, Arc<InMemoryLedger>, TokenIssuer) {
        let store = Arc::new(PendingStore::new());
        let ledger = Arc::new(InMemoryLedger::new());
        let issuer = TokenIssuer::new(
            Arc::clone(&store),
            Arc::clone(&ledger) as Arc<dyn LedgerClient>,
            Arc::new(GatewayConfig::devnet()),
        );
        (store, ledger, issuer)
    }

    #[tokio::test]
    async fn proxy_request_stages_pending_descriptor() {
        let (store, _ledger, issuer) = setup();
        let token = issuer.request_proxy("0xABC", 100).await.unwrap();

        let descriptor = store.get(&token).unwrap();
        assert_eq!(descriptor.status, StagingStatus::Pending);
        assert!(descriptor.expires_at > descriptor.created_at);
        assert_eq!(descriptor.legs.len(), 1);
        assert_eq!(descriptor.legs[0].asset, Asset::ProxyDelegation);
        assert_eq!(descriptor.legs[0].from_account, "0xABC");
        assert_eq!(descriptor.legs[0].to_account, "0xFEED");
    }

    #[tokio::test]
    async fn proxy_rejects_zero_amount_and_bad_address() {
        let (_store, _ledger, issuer) = setup();
        assert!(matches!(
            issuer.request_proxy("0xABC", 0).await,
            Err(StagingError::InvalidAmount(0))
        ));
        assert!(matches!(
            issuer.request_proxy("not-an-address", 10).await,
            Err(StagingError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn ticket_purchase_stages_two_legs_sharing_one_descriptor() {
        let (store, ledger, issuer) = setup();
        ledger.credit_base_coin("0xABC", 1_000);
        ledger.grant_nft("0xFEED", "10000001", "movie-42");

        let (coin_token, movie_token) = issuer
            .request_ticket_purchase("0xABC", 500, "movie-42")
            .await
            .unwrap();

        let a = store.get(&coin_token).unwrap();
        let b = store.get(&movie_token).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.legs.len(), 2);
        // Payment leg first, item leg second.
        assert_eq!(a.legs[0].asset, Asset::BaseCoin);
        assert_eq!(a.legs[0].amount, 500);
        assert!(matches!(a.legs[1].asset, Asset::NonFungibleToken { .. }));
        assert_eq!(a.legs[1].amount, 1);
    }

    #[tokio::test]
    async fn ticket_purchase_fails_fast_on_insufficient_balance() {
        let (store, ledger, issuer) = setup();
        ledger.credit_base_coin("0xABC", 100);
        ledger.grant_nft("0xFEED", "10000001", "movie-42");

        let err = issuer
            .request_ticket_purchase("0xABC", 500, "movie-42")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StagingError::InsufficientBalance {
                available: 100,
                required: 500
            }
        ));
        // Nothing staged, nothing transferred.
        assert!(store.is_empty());
        assert_eq!(ledger.transfer_calls(), 0);
    }

    #[tokio::test]
    async fn ticket_purchase_fails_when_token_not_in_inventory() {
        let (store, ledger, issuer) = setup();
        ledger.credit_base_coin("0xABC", 1_000);

        let err = issuer
            .request_ticket_purchase("0xABC", 500, "movie-42")
            .await
            .unwrap_err();
        assert!(matches!(err, StagingError::TicketUnavailable(idx) if idx == "movie-42"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn extra_purchase_with_price_has_two_legs() {
        let (store, ledger, issuer) = setup();
        ledger.credit_base_coin("0xABC", 1_000);

        let tokens = issuer.request_extra_purchase("0xABC", 200, 3).await.unwrap();
        assert_eq!(tokens.len(), 2);

        let descriptor = store.get(&tokens[0]).unwrap();
        assert_eq!(descriptor.legs[0].asset, Asset::BaseCoin);
        assert_eq!(
            descriptor.legs[1].asset,
            Asset::FungibleToken {
                token_type: "00000031".into()
            }
        );
        assert_eq!(descriptor.legs[1].amount, 3);
    }

    #[tokio::test]
    async fn free_extra_is_single_leg() {
        let (store, _ledger, issuer) = setup();
        let tokens = issuer.request_extra_purchase("0xABC", 0, 1).await.unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(store.get(&tokens[0]).unwrap().legs.len(), 1);
    }

    #[test]
    fn address_validation() {
        assert!(validate_wallet_address("0xABC").is_ok());
        assert!(validate_wallet_address("0xdeadBEEF42").is_ok());
        assert!(validate_wallet_address("0x").is_err());
        assert!(validate_wallet_address("ABC").is_err());
        assert!(validate_wallet_address("0xNOPE").is_err());
        assert!(validate_wallet_address("").is_err());
    }
}
