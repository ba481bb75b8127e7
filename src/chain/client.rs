use async_trait::async_trait;
use ethers::{
    abi::{Abi, Token},
    providers::{Middleware, PendingTransaction},
    types::{transaction::eip2718::TypedTransaction, TransactionRequest, H256, U64},
};
use log::debug;
use std::sync::Arc;

use super::{ChainError, ChainProvider, ContractCall};

/// [`ChainProvider`] backed by an ethers middleware stack.
///
/// Use a plain `Provider<Http>` for read-only access or wrap it in a
/// `SignerMiddleware` to submit transactions.
pub struct EthersChain<M> {
    client: Arc<M>,
}

impl<M: Middleware + 'static> EthersChain<M> {
    pub fn new(client: Arc<M>) -> Self {
        Self { client }
    }

    fn request(abi: &Abi, call: &ContractCall) -> Result<TransactionRequest, ChainError> {
        let function = abi.function(&call.method)?;
        let data = function.encode_input(&call.args)?;

        let mut tx = TransactionRequest::new().to(call.address).data(data);
        if let Some(from) = call.from {
            tx = tx.from(from);
        }
        if let Some(gas_price) = call.gas_price {
            tx = tx.gas_price(gas_price);
        }
        Ok(tx)
    }
}

#[async_trait]
impl<M: Middleware + 'static> ChainProvider for EthersChain<M> {
    async fn call(&self, abi: &Abi, call: ContractCall) -> Result<Vec<Token>, ChainError> {
        let tx: TypedTransaction = Self::request(abi, &call)?.into();
        let output = self
            .client
            .call(&tx, None)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;

        let function = abi.function(&call.method)?;
        Ok(function.decode_output(&output)?)
    }

    async fn send_transaction(&self, abi: &Abi, call: ContractCall) -> Result<H256, ChainError> {
        let tx = Self::request(abi, &call)?;
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;

        let tx_hash = pending.tx_hash();
        debug!("Submitted {} to {:?}: {:?}", call.method, call.address, tx_hash);
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<(), ChainError> {
        let receipt = PendingTransaction::new(tx_hash, self.client.provider())
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;

        match receipt {
            None => Err(ChainError::Dropped(tx_hash)),
            Some(receipt) if receipt.status == Some(U64::from(1)) => Ok(()),
            Some(_) => Err(ChainError::Reverted(tx_hash)),
        }
    }
}
