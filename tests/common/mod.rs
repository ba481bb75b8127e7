#![allow(dead_code)]

use async_trait::async_trait;
use ethers::abi::{Abi, Token};
use ethers::types::{Address, H256, U256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use yield_sync::api::{
    ApiError, DashboardApi, HistoryFilters, PagedResult, RewardPoolType, RewardTokenMeta, SyPool,
    SyRewardPool, SyUserTxHistory, TreasuryHistory, TreasuryToken,
};
use yield_sync::chain::{ChainError, ChainProvider, ContractCall};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn address(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub fn uint(n: u64) -> Vec<Token> {
    vec![Token::Uint(U256::from(n))]
}

pub fn text(s: &str) -> Vec<Token> {
    vec![Token::String(s.to_string())]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub address: Address,
    pub method: String,
    pub from: Option<Address>,
}

/// In-memory node answering reads from a `(contract, method)` table.
///
/// Reads with no scripted answer fail with an RPC error. Every read and
/// every submitted transaction is recorded in order.
#[derive(Default)]
pub struct ScriptedChain {
    responses: Mutex<HashMap<(Address, String), Vec<Token>>>,
    calls: Mutex<Vec<RecordedCall>>,
    sent: Mutex<Vec<RecordedCall>>,
    fail_receipts: AtomicBool,
    receipt_gate: Mutex<Option<Arc<Notify>>>,
    read_gates: Mutex<HashMap<(Address, String), Arc<Notify>>>,
    next_hash: AtomicU64,
}

impl ScriptedChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, contract: Address, method: &str, output: Vec<Token>) {
        self.responses
            .lock()
            .unwrap()
            .insert((contract, method.to_string()), output);
    }

    pub fn unset(&self, contract: Address, method: &str) {
        self.responses
            .lock()
            .unwrap()
            .remove(&(contract, method.to_string()));
    }

    /// Scripts `symbol`, `decimals` and `totalSupply` of a token.
    pub fn token(&self, contract: Address, symbol: &str, decimals: u64) {
        self.set(contract, "symbol", text(symbol));
        self.set(contract, "decimals", uint(decimals));
        self.set(contract, "totalSupply", uint(1_000_000));
    }

    pub fn fail_receipts(&self, fail: bool) {
        self.fail_receipts.store(fail, Ordering::SeqCst);
    }

    /// Receipts wait until the returned notify fires.
    pub fn hold_receipts(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.receipt_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Reads of `method` on `contract` wait until the returned notify fires.
    pub fn hold_reads(&self, contract: Address, method: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.read_gates
            .lock()
            .unwrap()
            .insert((contract, method.to_string()), gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.method).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn sent(&self) -> Vec<RecordedCall> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainProvider for ScriptedChain {
    async fn call(&self, _abi: &Abi, call: ContractCall) -> Result<Vec<Token>, ChainError> {
        self.calls.lock().unwrap().push(RecordedCall {
            address: call.address,
            method: call.method.clone(),
            from: call.from,
        });
        let gate = self
            .read_gates
            .lock()
            .unwrap()
            .get(&(call.address, call.method.clone()))
            .cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.responses
            .lock()
            .unwrap()
            .get(&(call.address, call.method.clone()))
            .cloned()
            .ok_or_else(|| ChainError::Rpc(format!("no answer for {}", call.method)))
    }

    async fn send_transaction(&self, _abi: &Abi, call: ContractCall) -> Result<H256, ChainError> {
        self.sent.lock().unwrap().push(RecordedCall {
            address: call.address,
            method: call.method,
            from: call.from,
        });
        let n = self.next_hash.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(H256::from_low_u64_be(n))
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<(), ChainError> {
        let gate = self.receipt_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_receipts.load(Ordering::SeqCst) {
            return Err(ChainError::Reverted(tx_hash));
        }
        Ok(())
    }
}

/// REST fake with canned pools and treasury data.
#[derive(Default)]
pub struct FakeApi {
    pub pools: Vec<SyPool>,
    pub reward_pools: Vec<SyRewardPool>,
    pub treasury_tokens: Vec<TreasuryToken>,
    pub history: Mutex<Option<Vec<TreasuryHistory>>>,
    pub history_total: u64,
    pub user_history: Vec<SyUserTxHistory>,
    pub reward_pool_gates: Mutex<HashMap<String, Arc<Notify>>>,
}

impl FakeApi {
    /// Reward pool lookups for `underlying_symbol` wait until the returned notify fires.
    pub fn hold_reward_pools(&self, underlying_symbol: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.reward_pool_gates
            .lock()
            .unwrap()
            .insert(underlying_symbol.to_string(), gate.clone());
        gate
    }
}

#[async_trait]
impl DashboardApi for FakeApi {
    async fn fetch_sy_pools(&self, _originator: &str) -> Result<Vec<SyPool>, ApiError> {
        Ok(self.pools.clone())
    }

    async fn fetch_sy_reward_pools(
        &self,
        _originator: &str,
        underlying_symbol: &str,
    ) -> Result<Vec<SyRewardPool>, ApiError> {
        let gate = self
            .reward_pool_gates
            .lock()
            .unwrap()
            .get(underlying_symbol)
            .cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self
            .reward_pools
            .iter()
            .filter(|pool| pool.underlying_symbol == underlying_symbol)
            .cloned()
            .collect())
    }

    async fn fetch_treasury_tokens(&self, _treasury: Address) -> Result<Vec<TreasuryToken>, ApiError> {
        Ok(self.treasury_tokens.clone())
    }

    async fn fetch_treasury_history(
        &self,
        _treasury: Address,
        page: u32,
        page_size: u32,
    ) -> Result<PagedResult<TreasuryHistory>, ApiError> {
        match self.history.lock().unwrap().clone() {
            Some(items) => Ok(PagedResult {
                items: items.into_iter().take(page_size as usize).collect(),
                total: self.history_total,
                page,
                page_size,
            }),
            None => Err(ApiError::Empty("treasury history".to_string())),
        }
    }

    async fn fetch_sy_user_history(
        &self,
        _user: Address,
        page: u32,
        page_size: u32,
        _filters: HistoryFilters,
    ) -> Result<PagedResult<SyUserTxHistory>, ApiError> {
        let items = self.user_history.clone();
        let total = items.len() as u64;
        Ok(PagedResult {
            items: items
                .into_iter()
                .skip(((page.max(1) - 1) * page_size) as usize)
                .take(page_size as usize)
                .collect(),
            total,
            page,
            page_size,
        })
    }
}

/// Lets spawned tasks run until they block.
pub async fn run_pending() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub fn sy_pool(n: u64, symbol: &str, reward_pool: Option<Address>) -> SyPool {
    SyPool {
        protocol_id: "compound/v2".to_string(),
        smart_yield_address: address(100 + n),
        underlying_address: address(200 + n),
        senior_bond_address: address(300 + n),
        junior_bond_address: address(400 + n),
        underlying_symbol: symbol.to_string(),
        underlying_decimals: 6,
        reward_pool_address: reward_pool,
        ..SyPool::default()
    }
}

pub fn sy_reward_pool(symbol: &str) -> SyRewardPool {
    SyRewardPool {
        pool_address: address(500),
        pool_token_address: address(501),
        pool_token_decimals: 6,
        pool_type: RewardPoolType::Single,
        protocol_id: "compound/v2".to_string(),
        reward_tokens: vec![RewardTokenMeta {
            address: address(502),
            symbol: "BOND".to_string(),
            decimals: 18,
        }],
        underlying_address: address(503),
        underlying_symbol: symbol.to_string(),
    }
}
