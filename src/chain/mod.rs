use async_trait::async_trait;
use ethers::abi::{Abi, Token};
use ethers::types::{Address, H256, U256};

mod client;

pub use client::EthersChain;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("ABI error: {0}")]
    Abi(#[from] ethers::abi::Error),
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("Transaction {0:?} was dropped before confirmation")]
    Dropped(H256),
    #[error("Transaction {0:?} reverted")]
    Reverted(H256),
}

/// One contract method invocation, already resolved to ABI tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractCall {
    pub address: Address,
    pub method: String,
    pub args: Vec<Token>,
    pub from: Option<Address>,
    pub gas_price: Option<U256>,
}

impl ContractCall {
    pub fn new(address: Address, method: &str, args: Vec<Token>) -> Self {
        Self {
            address,
            method: method.to_string(),
            args,
            from: None,
            gas_price: None,
        }
    }

    pub fn from(mut self, from: Option<Address>) -> Self {
        self.from = from;
        self
    }

    pub fn gas_price(mut self, gas_price: U256) -> Self {
        self.gas_price = Some(gas_price);
        self
    }
}

/// Read/write access to a node. Contract handles reach RPC only through this.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Executes a read-only call and returns the decoded outputs.
    async fn call(&self, abi: &Abi, call: ContractCall) -> Result<Vec<Token>, ChainError>;

    /// Submits a transaction and returns its hash without waiting for inclusion.
    async fn send_transaction(&self, abi: &Abi, call: ContractCall) -> Result<H256, ChainError>;

    /// Waits for the receipt. `Ok` only for a successful execution status.
    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<(), ChainError>;
}

/// Converts a gas price in gwei to wei.
pub fn gwei_to_wei(gwei: u64) -> U256 {
    U256::from(gwei) * U256::exp10(9)
}
