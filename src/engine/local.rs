//! Local chain
//!
//! In-process stand-in for a local development chain running the streaming
//! protocol. Balances follow the usual realtime model: a settled amount plus
//! the account's net flow rate times the seconds since it was last settled.
//! Opening a flow locks a deposit worth four hours of flow from the sender.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;

use super::{EngineError, EngineResult, FlowInfo, RealtimeBalance, SettlementEngine, TxReceipt};
use crate::domain::{Address, FlowRate, Wei};

/// Seconds of flow locked as deposit when a flow is opened
pub const DEPOSIT_BUFFER_SECS: i64 = 4 * 60 * 60;

/// Local chain configuration
#[derive(Debug, Clone)]
pub struct LocalChainConfig {
    pub chain_id: u64,
    /// Underlying (unwrapped) token contract
    pub underlying_token: Address,
    /// Wrapped, streamable token contract
    pub wrapped_token: Address,
    /// Time between submission and confirmation of a transaction
    pub confirmation_delay: Duration,
}

/// Local development chain implementing [`SettlementEngine`]
pub struct LocalChain {
    config: LocalChainConfig,
    state: Mutex<ChainState>,
}

#[derive(Debug, Clone, Copy)]
struct WrappedAccount {
    settled: i128,
    settled_at: DateTime<Utc>,
    deposit: i128,
}

#[derive(Debug, Clone, Copy)]
struct Flow {
    rate: i128,
    deposit: i128,
    updated_at: DateTime<Utc>,
}

#[derive(Debug)]
enum ChainOp {
    OpenFlow {
        sender: String,
        receiver: String,
        rate: i128,
    },
    CloseFlow {
        sender: String,
        receiver: String,
    },
    Approve {
        owner: String,
        amount: i128,
    },
    Wrap {
        account: String,
        amount: i128,
    },
    Unwrap {
        account: String,
        amount: i128,
    },
}

#[derive(Debug, Default)]
struct ChainState {
    clock_offset_secs: i64,
    nonce: u64,
    deployed: HashSet<String>,
    underlying: HashMap<String, i128>,
    allowances: HashMap<String, i128>,
    accounts: HashMap<String, WrappedAccount>,
    flows: HashMap<(String, String), Flow>,
}

impl ChainState {
    fn now(&self) -> DateTime<Utc> {
        Utc::now() + ChronoDuration::seconds(self.clock_offset_secs)
    }

    fn net_flow(&self, account: &str) -> i128 {
        self.flows
            .iter()
            .map(|((sender, receiver), flow)| {
                let mut net = 0;
                if receiver == account {
                    net += flow.rate;
                }
                if sender == account {
                    net -= flow.rate;
                }
                net
            })
            .sum()
    }

    fn account(&self, account: &str, now: DateTime<Utc>) -> WrappedAccount {
        self.accounts.get(account).copied().unwrap_or(WrappedAccount {
            settled: 0,
            settled_at: now,
            deposit: 0,
        })
    }

    fn realtime(&self, account: &str, now: DateTime<Utc>) -> i128 {
        let state = self.account(account, now);
        let elapsed = (now - state.settled_at).num_seconds().max(0);
        state.settled + self.net_flow(account) * i128::from(elapsed)
    }

    fn available(&self, account: &str, now: DateTime<Utc>) -> i128 {
        self.realtime(account, now) - self.account(account, now).deposit
    }

    /// Fold accrued flow into the settled balance. Must run before any
    /// change to the account's flows or balance.
    fn settle(&mut self, account: &str, now: DateTime<Utc>) {
        let settled = self.realtime(account, now);
        let deposit = self.account(account, now).deposit;
        self.accounts.insert(
            account.to_string(),
            WrappedAccount {
                settled,
                settled_at: now,
                deposit,
            },
        );
    }

    fn apply(&mut self, op: &ChainOp, now: DateTime<Utc>) -> Result<(), String> {
        match op {
            ChainOp::OpenFlow {
                sender,
                receiver,
                rate,
            } => {
                if *rate <= 0 {
                    return Err("flow rate must be positive".to_string());
                }
                if sender == receiver {
                    return Err("cannot open a flow to self".to_string());
                }
                let key = (sender.clone(), receiver.clone());
                if self.flows.contains_key(&key) {
                    return Err("flow already exists".to_string());
                }
                let deposit = rate
                    .checked_mul(i128::from(DEPOSIT_BUFFER_SECS))
                    .ok_or_else(|| "flow rate overflow".to_string())?;
                if self.available(sender, now) < deposit {
                    return Err("insufficient balance for flow deposit".to_string());
                }

                self.settle(sender, now);
                self.settle(receiver, now);
                if let Some(account) = self.accounts.get_mut(sender) {
                    account.deposit += deposit;
                }
                self.flows.insert(
                    key,
                    Flow {
                        rate: *rate,
                        deposit,
                        updated_at: now,
                    },
                );
            }
            ChainOp::CloseFlow { sender, receiver } => {
                let key = (sender.clone(), receiver.clone());
                if !self.flows.contains_key(&key) {
                    return Err("flow does not exist".to_string());
                }

                self.settle(sender, now);
                self.settle(receiver, now);
                if let Some(flow) = self.flows.remove(&key) {
                    if let Some(account) = self.accounts.get_mut(sender) {
                        account.deposit -= flow.deposit;
                    }
                }
            }
            ChainOp::Approve { owner, amount } => {
                self.allowances.insert(owner.clone(), *amount);
            }
            ChainOp::Wrap { account, amount } => {
                if *amount <= 0 {
                    return Err("amount must be positive".to_string());
                }
                let balance = self.underlying.get(account).copied().unwrap_or(0);
                if balance < *amount {
                    return Err("underlying transfer amount exceeds balance".to_string());
                }
                let allowance = self.allowances.get(account).copied().unwrap_or(0);
                if allowance < *amount {
                    return Err("underlying transfer amount exceeds allowance".to_string());
                }

                self.underlying.insert(account.clone(), balance - amount);
                if allowance != i128::MAX {
                    self.allowances.insert(account.clone(), allowance - amount);
                }
                self.settle(account, now);
                if let Some(state) = self.accounts.get_mut(account) {
                    state.settled += amount;
                }
            }
            ChainOp::Unwrap { account, amount } => {
                if *amount <= 0 {
                    return Err("amount must be positive".to_string());
                }
                if self.available(account, now) < *amount {
                    return Err("burn amount exceeds available balance".to_string());
                }

                self.settle(account, now);
                if let Some(state) = self.accounts.get_mut(account) {
                    state.settled -= amount;
                }
                *self.underlying.entry(account.clone()).or_insert(0) += amount;
            }
        }
        Ok(())
    }
}

impl LocalChain {
    /// Start a chain with both token contracts deployed
    pub fn new(config: LocalChainConfig) -> Self {
        let mut state = ChainState::default();
        state.deployed.insert(config.underlying_token.key());
        state.deployed.insert(config.wrapped_token.key());

        Self {
            config,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &LocalChainConfig {
        &self.config
    }

    /// Credit underlying tokens to `account` (dev faucet)
    pub async fn mint_underlying(&self, account: &Address, amount: Wei) {
        let mut state = self.state.lock().await;
        *state.underlying.entry(account.key()).or_insert(0) += amount.value();
        tracing::debug!(account = %account, amount = %amount, "Minted underlying tokens");
    }

    /// Move the chain clock forward
    pub async fn advance(&self, seconds: i64) {
        let mut state = self.state.lock().await;
        state.clock_offset_secs += seconds;
    }

    /// Current chain time
    pub async fn now(&self) -> DateTime<Utc> {
        self.state.lock().await.now()
    }

    async fn submit(&self, op: ChainOp) -> EngineResult<TxReceipt> {
        let tx_hash = {
            let mut state = self.state.lock().await;
            state.nonce += 1;
            tx_hash(self.config.chain_id, state.nonce, &op)
        };
        tracing::debug!(tx_hash = %tx_hash, op = ?op, "Transaction submitted");

        if !self.config.confirmation_delay.is_zero() {
            tokio::time::sleep(self.config.confirmation_delay).await;
        }

        let mut state = self.state.lock().await;
        let now = state.now();
        state.apply(&op, now).map_err(|reason| {
            tracing::warn!(tx_hash = %tx_hash, reason = %reason, "Transaction reverted");
            EngineError::Reverted(reason)
        })?;

        tracing::debug!(tx_hash = %tx_hash, "Transaction confirmed");
        Ok(TxReceipt {
            tx_hash,
            confirmed_at: now,
        })
    }
}

fn tx_hash(chain_id: u64, nonce: u64, op: &ChainOp) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{:?}", chain_id, nonce, op).as_bytes());
    format!("0x{}", hex::encode(hasher.finalize()))
}

#[async_trait]
impl SettlementEngine for LocalChain {
    fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    async fn is_deployed(&self, contract: &Address) -> EngineResult<bool> {
        Ok(self.state.lock().await.deployed.contains(&contract.key()))
    }

    async fn open_flow(
        &self,
        sender: &Address,
        receiver: &Address,
        rate: FlowRate,
    ) -> EngineResult<TxReceipt> {
        self.submit(ChainOp::OpenFlow {
            sender: sender.key(),
            receiver: receiver.key(),
            rate: rate.wei_per_second().value(),
        })
        .await
    }

    async fn close_flow(&self, sender: &Address, receiver: &Address) -> EngineResult<TxReceipt> {
        self.submit(ChainOp::CloseFlow {
            sender: sender.key(),
            receiver: receiver.key(),
        })
        .await
    }

    async fn query_flow(
        &self,
        sender: &Address,
        receiver: &Address,
    ) -> EngineResult<Option<FlowInfo>> {
        let state = self.state.lock().await;
        Ok(state
            .flows
            .get(&(sender.key(), receiver.key()))
            .map(|flow| FlowInfo {
                rate: FlowRate::per_second(Wei::new(flow.rate)),
                deposit: Wei::new(flow.deposit),
                updated_at: flow.updated_at,
            }))
    }

    async fn query_balance(&self, account: &Address) -> EngineResult<RealtimeBalance> {
        let state = self.state.lock().await;
        let now = state.now();
        let key = account.key();
        Ok(RealtimeBalance {
            available: Wei::new(state.available(&key, now)),
            deposit: Wei::new(state.account(&key, now).deposit),
        })
    }

    async fn underlying_balance(&self, account: &Address) -> EngineResult<Wei> {
        let state = self.state.lock().await;
        Ok(Wei::new(
            state.underlying.get(&account.key()).copied().unwrap_or(0),
        ))
    }

    async fn allowance(&self, owner: &Address) -> EngineResult<Wei> {
        let state = self.state.lock().await;
        Ok(Wei::new(
            state.allowances.get(&owner.key()).copied().unwrap_or(0),
        ))
    }

    async fn approve(&self, owner: &Address, amount: Wei) -> EngineResult<TxReceipt> {
        self.submit(ChainOp::Approve {
            owner: owner.key(),
            amount: amount.value(),
        })
        .await
    }

    async fn wrap(&self, account: &Address, amount: Wei) -> EngineResult<TxReceipt> {
        self.submit(ChainOp::Wrap {
            account: account.key(),
            amount: amount.value(),
        })
        .await
    }

    async fn unwrap(&self, account: &Address, amount: Wei) -> EngineResult<TxReceipt> {
        self.submit(ChainOp::Unwrap {
            account: account.key(),
            amount: amount.value(),
        })
        .await
    }
}
