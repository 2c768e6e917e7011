//! # HTTP Ledger Client
//!
//! Production [`LedgerClient`] speaking JSON over HTTP to the external
//! ledger service. Endpoint, credentials, and contract identifiers come
//! from the startup [`GatewayConfig`]; nothing here is mutable after
//! construction.
//!
//! Error mapping is deliberately coarse: transport failures and 5xx become
//! [`LedgerError::Unavailable`], any other non-success status becomes
//! [`LedgerError::Rejected`] carrying the ledger's own message. The
//! coordinator decides what a failure means for the staged transaction;
//! this client only reports what the ledger said.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{Asset, LedgerClient, LedgerError};
use crate::config::GatewayConfig;
use crate::staging::intent::TransferIntent;

/// HTTP implementation of the ledger boundary.
pub struct HttpLedgerClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    api_secret: String,
    item_contract_id: String,
    operator_secret: String,
}

/// Body of a successful transfer response.
#[derive(Debug, Deserialize)]
struct TransferResponse {
    #[serde(rename = "txId")]
    tx_id: String,
}

/// Body of a balance response.
#[derive(Debug, Deserialize)]
struct BalanceResponse {
    amount: u64,
}

/// Body of a non-fungible holdings response.
#[derive(Debug, Deserialize)]
struct HoldingsResponse {
    #[serde(rename = "tokenIndexes")]
    token_indexes: Vec<String>,
}

impl HttpLedgerClient {
    /// Builds a client from the gateway configuration.
    pub fn new(config: &GatewayConfig) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(config.leg_timeout())
            .build()
            .map_err(|e| LedgerError::Unavailable(format!("http client init: {e}")))?;

        Ok(Self {
            http,
            endpoint: config.ledger_endpoint.trim_end_matches('/').to_string(),
            api_key: config.ledger_api_key.clone(),
            api_secret: config.ledger_api_secret.clone(),
            item_contract_id: config.item_contract_id.clone(),
            operator_secret: config.operator_secret.clone(),
        })
    }

    /// URL and JSON body for one transfer leg, by asset shape.
    fn transfer_request(&self, intent: &TransferIntent) -> (String, serde_json::Value) {
        match &intent.asset {
            Asset::BaseCoin => (
                format!(
                    "{}/v1/wallets/{}/base-coin/transfer",
                    self.endpoint, intent.from_account
                ),
                json!({
                    "toAddress": intent.to_account,
                    "amount": intent.amount.to_string(),
                    "walletSecret": self.operator_secret,
                }),
            ),
            Asset::FungibleToken { token_type } => (
                format!(
                    "{}/v1/item-tokens/{}/fungibles/{}/transfer",
                    self.endpoint, self.item_contract_id, token_type
                ),
                json!({
                    "fromAddress": intent.from_account,
                    "toAddress": intent.to_account,
                    "amount": intent.amount.to_string(),
                    "walletSecret": self.operator_secret,
                }),
            ),
            Asset::NonFungibleToken {
                token_type,
                token_index,
            } => (
                format!(
                    "{}/v1/item-tokens/{}/non-fungibles/{}/{}/transfer",
                    self.endpoint, self.item_contract_id, token_type, token_index
                ),
                json!({
                    "fromAddress": intent.from_account,
                    "toAddress": intent.to_account,
                    "walletSecret": self.operator_secret,
                }),
            ),
            Asset::ProxyDelegation => (
                format!(
                    "{}/v1/wallets/{}/proxy/request",
                    self.endpoint, intent.from_account
                ),
                json!({
                    "operatorAddress": intent.to_account,
                    "allowance": intent.amount.to_string(),
                }),
            ),
        }
    }

    /// Issues a POST and decodes the response as `T`.
    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, LedgerError> {
        let response = self
            .http
            .post(url)
            .header("service-api-key", &self.api_key)
            .header("service-api-secret", &self.api_secret)
            .json(body)
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        Self::decode(response).await
    }

    /// Issues a GET and decodes the response as `T`.
    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, LedgerError> {
        let response = self
            .http
            .get(url)
            .header("service-api-key", &self.api_key)
            .header("service-api-secret", &self.api_secret)
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, LedgerError> {
        let status = response.status();
        if status.is_server_error() {
            return Err(LedgerError::Unavailable(format!("ledger returned {status}")));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LedgerError::Rejected {
                code: status.as_u16(),
                message,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| LedgerError::Unavailable(format!("invalid response body: {e}")))
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn transfer(&self, intent: &TransferIntent) -> Result<String, LedgerError> {
        let (url, body) = self.transfer_request(intent);
        let response: TransferResponse = self.post_json(&url, &body).await?;
        tracing::debug!(tx_id = %response.tx_id, kind = %intent.asset.kind(), "ledger transfer accepted");
        Ok(response.tx_id)
    }

    async fn query_balance(&self, account: &str, asset: &Asset) -> Result<u64, LedgerError> {
        let url = match asset {
            Asset::BaseCoin => {
                format!("{}/v1/wallets/{}/base-coin", self.endpoint, account)
            }
            Asset::FungibleToken { token_type } => format!(
                "{}/v1/wallets/{}/item-tokens/{}/fungibles/{}",
                self.endpoint, account, self.item_contract_id, token_type
            ),
            Asset::NonFungibleToken { token_type, .. } => {
                // Count of held tokens of the type.
                let held = self.holdings(account, token_type).await?;
                return Ok(held.len() as u64);
            }
            Asset::ProxyDelegation => return Ok(0),
        };
        let response: BalanceResponse = self.get_json(&url).await?;
        Ok(response.amount)
    }

    async fn holdings(&self, account: &str, token_type: &str) -> Result<Vec<String>, LedgerError> {
        let url = format!(
            "{}/v1/wallets/{}/item-tokens/{}/non-fungibles/{}",
            self.endpoint, account, self.item_contract_id, token_type
        );
        let response: HoldingsResponse = self.get_json(&url).await?;
        Ok(response.token_indexes)
    }
}
