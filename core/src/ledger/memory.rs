//! # In-Memory Ledger
//!
//! A deterministic, in-process implementation of [`LedgerClient`]. Backing
//! for the gateway's devnet mode and for every test that needs to observe
//! exactly what the coordinator did: per-kind call counting, injectable
//! failures, and an optional artificial stall for timeout tests.
//!
//! Balances follow real transfer semantics (debits fail when short, NFTs
//! actually move between holders) so commit-path tests exercise the same
//! shapes the production client would produce.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Asset, AssetKind, LedgerClient, LedgerError};
use crate::staging::intent::TransferIntent;

#[derive(Default)]
struct LedgerState {
    /// Base-coin balances by account.
    base_coin: HashMap<String, u64>,
    /// Fungible balances by (account, token_type).
    fungible: HashMap<(String, String), u64>,
    /// NFT holdings: (account, token_type) → token indexes.
    non_fungible: HashMap<(String, String), Vec<String>>,
    /// Proxy allowances: (delegator, operator) → approved amount.
    allowances: HashMap<(String, String), u64>,
    /// Transfer attempts by asset kind.
    calls: HashMap<AssetKind, u64>,
    /// When set, transfers of this kind fail with `Unavailable`.
    fail_kind: Option<AssetKind>,
    /// When set, every transfer sleeps this long before answering.
    stall: Option<Duration>,
}

/// In-process ledger for tests and devnet runs.
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    tx_seq: AtomicU64,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits base coin to an account.
    pub fn credit_base_coin(&self, account: &str, amount: u64) {
        *self
            .state
            .lock()
            .base_coin
            .entry(account.to_string())
            .or_default() += amount;
    }

    /// Credits fungible tokens to an account.
    pub fn credit_fungible(&self, account: &str, token_type: &str, amount: u64) {
        *self
            .state
            .lock()
            .fungible
            .entry((account.to_string(), token_type.to_string()))
            .or_default() += amount;
    }

    /// Places one NFT into an account's holdings.
    pub fn grant_nft(&self, account: &str, token_type: &str, token_index: &str) {
        self.state
            .lock()
            .non_fungible
            .entry((account.to_string(), token_type.to_string()))
            .or_default()
            .push(token_index.to_string());
    }

    /// Makes every subsequent transfer of the given asset kind fail with
    /// [`LedgerError::Unavailable`]. The attempt is still counted.
    pub fn fail_transfers_of(&self, kind: AssetKind) {
        self.state.lock().fail_kind = Some(kind);
    }

    /// Makes every subsequent transfer sleep before answering, for
    /// deadline tests under paused tokio time.
    pub fn stall_transfers(&self, delay: Duration) {
        self.state.lock().stall = Some(delay);
    }

    /// Total transfer attempts, all kinds.
    pub fn transfer_calls(&self) -> u64 {
        self.state.lock().calls.values().sum()
    }

    /// Transfer attempts for one asset kind.
    pub fn transfer_calls_for(&self, kind: AssetKind) -> u64 {
        self.state.lock().calls.get(&kind).copied().unwrap_or(0)
    }

    /// Current base-coin balance of an account.
    pub fn base_coin_balance(&self, account: &str) -> u64 {
        self.state.lock().base_coin.get(account).copied().unwrap_or(0)
    }

    /// Current fungible balance of an account for one token type.
    pub fn fungible_balance(&self, account: &str, token_type: &str) -> u64 {
        self.state
            .lock()
            .fungible
            .get(&(account.to_string(), token_type.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Token indexes of one NFT type held by an account.
    pub fn nft_holdings(&self, account: &str, token_type: &str) -> Vec<String> {
        self.state
            .lock()
            .non_fungible
            .get(&(account.to_string(), token_type.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn next_tx_id(&self) -> String {
        let seq = self.tx_seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("memtx-{seq:08x}")
    }

    /// Applies one transfer to the balance tables. Caller holds the lock.
    fn apply(state: &mut LedgerState, intent: &TransferIntent) -> Result<(), LedgerError> {
        match &intent.asset {
            Asset::BaseCoin => {
                let from = state.base_coin.entry(intent.from_account.clone()).or_default();
                if *from < intent.amount {
                    return Err(LedgerError::Rejected {
                        code: 400,
                        message: format!(
                            "insufficient base coin: {} < {}",
                            *from, intent.amount
                        ),
                    });
                }
                *from -= intent.amount;
                *state.base_coin.entry(intent.to_account.clone()).or_default() += intent.amount;
            }
            Asset::FungibleToken { token_type } => {
                let from_key = (intent.from_account.clone(), token_type.clone());
                let from = state.fungible.entry(from_key).or_default();
                if *from < intent.amount {
                    return Err(LedgerError::Rejected {
                        code: 400,
                        message: format!("insufficient {token_type}: {} < {}", *from, intent.amount),
                    });
                }
                *from -= intent.amount;
                let to_key = (intent.to_account.clone(), token_type.clone());
                *state.fungible.entry(to_key).or_default() += intent.amount;
            }
            Asset::NonFungibleToken {
                token_type,
                token_index,
            } => {
                let from_key = (intent.from_account.clone(), token_type.clone());
                let holdings = state.non_fungible.entry(from_key).or_default();
                let Some(pos) = holdings.iter().position(|idx| idx == token_index) else {
                    return Err(LedgerError::Rejected {
                        code: 404,
                        message: format!("{} does not hold {token_index}", intent.from_account),
                    });
                };
                holdings.remove(pos);
                state
                    .non_fungible
                    .entry((intent.to_account.clone(), token_type.clone()))
                    .or_default()
                    .push(token_index.clone());
            }
            Asset::ProxyDelegation => {
                state.allowances.insert(
                    (intent.from_account.clone(), intent.to_account.clone()),
                    intent.amount,
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn transfer(&self, intent: &TransferIntent) -> Result<String, LedgerError> {
        let stall = {
            let mut state = self.state.lock();
            *state.calls.entry(intent.asset.kind()).or_default() += 1;
            state.stall
        };
        if let Some(delay) = stall {
            // Lock released across the await.
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if state.fail_kind == Some(intent.asset.kind()) {
            return Err(LedgerError::Unavailable("injected failure".into()));
        }
        Self::apply(&mut state, intent)?;
        drop(state);
        Ok(self.next_tx_id())
    }

    async fn query_balance(&self, account: &str, asset: &Asset) -> Result<u64, LedgerError> {
        let state = self.state.lock();
        let balance = match asset {
            Asset::BaseCoin => state.base_coin.get(account).copied().unwrap_or(0),
            Asset::FungibleToken { token_type } => state
                .fungible
                .get(&(account.to_string(), token_type.clone()))
                .copied()
                .unwrap_or(0),
            Asset::NonFungibleToken { token_type, .. } => state
                .non_fungible
                .get(&(account.to_string(), token_type.clone()))
                .map(|held| held.len() as u64)
                .unwrap_or(0),
            Asset::ProxyDelegation => 0,
        };
        Ok(balance)
    }

    async fn holdings(&self, account: &str, token_type: &str) -> Result<Vec<String>, LedgerError> {
        Ok(self.nft_holdings(account, token_type))
    }
}
