use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ethers::abi::{Abi, Token};
use ethers::types::{Address, H256, U256};
use log::{debug, warn};
use metrics::counter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::chain::{gwei_to_wei, ChainError, ChainProvider, ContractCall};
use crate::events::{EventBus, Subscription};
use crate::value::ScaledValue;

pub mod dao;
pub mod erc20;
pub mod reward_pool;
pub mod senior_bond;
pub mod smart_yield;
pub mod yield_farming;

pub use dao::{DaoBarnContract, DaoRewardContract};
pub use erc20::{Erc20Contract, TokenContract};
pub use reward_pool::RewardPoolContract;
pub use senior_bond::SeniorBondContract;
pub use smart_yield::SmartYieldContract;
pub use yield_farming::{YfPoolContract, YfStakingContract};

const METRIC_CONTRACT_LOADS: &str = "contract_loads_total";
const METRIC_CONTRACT_LOAD_FAILURES: &str = "contract_load_failures_total";
const METRIC_STALE_LOADS: &str = "contract_stale_loads_total";

/// Events published by a handle.
#[derive(Debug, Clone, PartialEq)]
pub enum ContractEvent {
    /// A cached field was replaced.
    UpdateData,
    /// A transaction was accepted by the node.
    TxHash(H256),
    TxSuccess(H256),
    TxFail { tx_hash: Option<H256>, reason: String },
}

/// Last-loaded value of one cached field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Amount(ScaledValue),
    Count(u64),
    Text(String),
    Flag(bool),
    Address(Address),
}

#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("No provider bound to contract {0:?}")]
    NoProvider(Address),
    #[error("No account bound to contract {0:?}")]
    NoAccount(Address),
    #[error("Unexpected output from {method}: {output}")]
    UnexpectedOutput { method: String, output: String },
    #[error(transparent)]
    Chain(#[from] ChainError),
}

#[derive(Clone, Default)]
struct Binding {
    provider: Option<Arc<dyn ChainProvider>>,
    account: Option<Address>,
}

#[derive(Debug, Clone)]
struct CachedField {
    value: FieldValue,
    generation: u64,
}

/// In-memory proxy for one on-chain contract.
///
/// Each `load*` performs exactly one read, replaces one cached field and
/// emits [`ContractEvent::UpdateData`]. Loads are tagged with a generation
/// issued when the call starts; a response is applied only if it is newer
/// than the cached value, so an earlier call resolving late never
/// overwrites a later one.
pub struct ContractHandle {
    name: String,
    address: Address,
    abi: Arc<Abi>,
    binding: RwLock<Binding>,
    fields: DashMap<String, CachedField>,
    generation: AtomicU64,
    events: EventBus<ContractEvent>,
}

impl ContractHandle {
    pub fn new(name: impl Into<String>, address: Address, abi: Arc<Abi>) -> Self {
        Self {
            name: name.into(),
            address,
            abi,
            binding: RwLock::new(Binding::default()),
            fields: DashMap::new(),
            generation: AtomicU64::new(0),
            events: EventBus::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn account(&self) -> Option<Address> {
        self.binding.read().unwrap_or_else(PoisonError::into_inner).account
    }

    pub fn has_provider(&self) -> bool {
        self.binding
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .provider
            .is_some()
    }

    /// Rebinds the node connection. No network traffic.
    pub fn set_provider(&self, provider: Option<Arc<dyn ChainProvider>>) {
        self.binding.write().unwrap_or_else(PoisonError::into_inner).provider = provider;
    }

    /// Rebinds the user account. No network traffic.
    pub fn set_account(&self, account: Option<Address>) {
        self.binding.write().unwrap_or_else(PoisonError::into_inner).account = account;
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ContractEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler)
    }

    pub fn field(&self, key: &str) -> Option<FieldValue> {
        self.fields.get(key).map(|cached| cached.value.clone())
    }

    pub fn amount(&self, key: &str) -> Option<ScaledValue> {
        match self.field(key)? {
            FieldValue::Amount(value) => Some(value),
            _ => None,
        }
    }

    pub fn count(&self, key: &str) -> Option<u64> {
        match self.field(key)? {
            FieldValue::Count(value) => Some(value),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<String> {
        match self.field(key)? {
            FieldValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.field(key)? {
            FieldValue::Flag(value) => Some(value),
            _ => None,
        }
    }

    pub fn address_field(&self, key: &str) -> Option<Address> {
        match self.field(key)? {
            FieldValue::Address(value) => Some(value),
            _ => None,
        }
    }

    fn binding(&self) -> Binding {
        self.binding.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Account bound right now, or `NoAccount`.
    pub fn require_account(&self) -> Result<Address, ContractError> {
        self.account().ok_or(ContractError::NoAccount(self.address))
    }

    /// Reads `method` and caches the decoded result under `key`.
    ///
    /// On failure the cached value is left untouched and nothing is emitted.
    /// The raw outcome is returned either way so callers can chain loads.
    pub async fn load<D>(
        &self,
        key: impl Into<String>,
        method: &str,
        args: Vec<Token>,
        decode: D,
    ) -> Result<FieldValue, ContractError>
    where
        D: FnOnce(Vec<Token>) -> Option<FieldValue> + Send,
    {
        let key = key.into();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let binding = self.binding();
        let provider = binding
            .provider
            .ok_or(ContractError::NoProvider(self.address))?;

        counter!(METRIC_CONTRACT_LOADS, 1);
        let call = ContractCall::new(self.address, method, args).from(binding.account);
        let output = match provider.call(&self.abi, call).await {
            Ok(output) => output,
            Err(e) => {
                counter!(METRIC_CONTRACT_LOAD_FAILURES, 1);
                warn!("{} {:?}: {} failed: {}", self.name, self.address, method, e);
                return Err(e.into());
            }
        };

        let rendered = format!("{:?}", output);
        let value = decode(output).ok_or_else(|| ContractError::UnexpectedOutput {
            method: method.to_string(),
            output: rendered,
        })?;

        let applied = match self.fields.entry(key.clone()) {
            Entry::Occupied(entry) if entry.get().generation > generation => false,
            Entry::Occupied(mut entry) => {
                entry.insert(CachedField {
                    value: value.clone(),
                    generation,
                });
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(CachedField {
                    value: value.clone(),
                    generation,
                });
                true
            }
        };

        if applied {
            self.events.emit(&ContractEvent::UpdateData);
        } else {
            counter!(METRIC_STALE_LOADS, 1);
            debug!(
                "{} {:?}: discarding stale {} (generation {})",
                self.name, self.address, key, generation
            );
        }

        Ok(value)
    }

    /// Submits `method` from the bound account and waits for the receipt.
    ///
    /// Publishes `TxHash` once the node accepts the transaction, then
    /// `TxSuccess` or `TxFail`.
    pub async fn send(
        &self,
        method: &str,
        args: Vec<Token>,
        gas_price_gwei: u64,
    ) -> Result<H256, ContractError> {
        let binding = self.binding();
        let provider = binding
            .provider
            .ok_or(ContractError::NoProvider(self.address))?;
        let account = binding.account.ok_or(ContractError::NoAccount(self.address))?;

        let call = ContractCall::new(self.address, method, args)
            .from(Some(account))
            .gas_price(gwei_to_wei(gas_price_gwei));

        let tx_hash = match provider.send_transaction(&self.abi, call).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                counter!("transactions_total", 1, "status" => "rejected");
                warn!("{} {:?}: {} rejected: {}", self.name, self.address, method, e);
                self.events.emit(&ContractEvent::TxFail {
                    tx_hash: None,
                    reason: e.to_string(),
                });
                return Err(e.into());
            }
        };
        self.events.emit(&ContractEvent::TxHash(tx_hash));

        match provider.wait_for_receipt(tx_hash).await {
            Ok(()) => {
                counter!("transactions_total", 1, "status" => "confirmed");
                self.events.emit(&ContractEvent::TxSuccess(tx_hash));
                Ok(tx_hash)
            }
            Err(e) => {
                counter!("transactions_total", 1, "status" => "failed");
                warn!("{} {:?}: {} failed: {}", self.name, self.address, method, e);
                self.events.emit(&ContractEvent::TxFail {
                    tx_hash: Some(tx_hash),
                    reason: e.to_string(),
                });
                Err(e.into())
            }
        }
    }
}

impl std::fmt::Debug for ContractHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractHandle")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("account", &self.account())
            .field("fields", &self.fields.len())
            .finish()
    }
}

/// Cache key for a value scoped to an address (balances, allowances, claims).
pub fn keyed(field: &str, address: &Address) -> String {
    format!("{}:{:?}", field, address)
}

pub(crate) fn decode_amount(tokens: Vec<Token>) -> Option<FieldValue> {
    match tokens.into_iter().next()? {
        Token::Uint(raw) => Some(FieldValue::Amount(ScaledValue::from_u256(raw))),
        _ => None,
    }
}

pub(crate) fn decode_count(tokens: Vec<Token>) -> Option<FieldValue> {
    match tokens.into_iter().next()? {
        Token::Uint(raw) if raw <= U256::from(u64::MAX) => Some(FieldValue::Count(raw.as_u64())),
        _ => None,
    }
}

pub(crate) fn decode_text(tokens: Vec<Token>) -> Option<FieldValue> {
    match tokens.into_iter().next()? {
        Token::String(text) => Some(FieldValue::Text(text)),
        _ => None,
    }
}

pub(crate) fn decode_flag(tokens: Vec<Token>) -> Option<FieldValue> {
    match tokens.into_iter().next()? {
        Token::Bool(flag) => Some(FieldValue::Flag(flag)),
        _ => None,
    }
}

pub(crate) fn decode_address(tokens: Vec<Token>) -> Option<FieldValue> {
    match tokens.into_iter().next()? {
        Token::Address(address) => Some(FieldValue::Address(address)),
        _ => None,
    }
}

pub(crate) fn parse_abi(fragments: &[&str]) -> Arc<Abi> {
    Arc::new(ethers::abi::parse_abi(fragments).expect("static ABI fragments are valid"))
}
