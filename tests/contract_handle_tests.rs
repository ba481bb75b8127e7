use anyhow::Result;
use async_trait::async_trait;
use ethers::abi::{Abi, Token};
use ethers::types::{Address, H256, U256};
use mockall::mock;
use std::sync::{Arc, Mutex};
use test_log::test;

use yield_sync::chain::{ChainError, ChainProvider, ContractCall};
use yield_sync::contracts::{
    ContractError, ContractEvent, Erc20Contract, SmartYieldContract, TokenContract,
};
use yield_sync::value::ScaledValue;

mod common;

mock! {
    pub Chain {}

    #[async_trait]
    impl ChainProvider for Chain {
        async fn call(&self, abi: &Abi, call: ContractCall) -> Result<Vec<Token>, ChainError>;
        async fn send_transaction(&self, abi: &Abi, call: ContractCall) -> Result<H256, ChainError>;
        async fn wait_for_receipt(&self, tx_hash: H256) -> Result<(), ChainError>;
    }
}

fn record_events(handle: &Erc20Contract) -> (Arc<Mutex<Vec<ContractEvent>>>, yield_sync::events::Subscription) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let subscription = handle.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
    (events, subscription)
}

#[test(tokio::test)]
async fn test_load_common_caches_fields() -> Result<()> {
    let mut chain = MockChain::new();
    chain.expect_call().times(3).returning(|_, call| {
        Ok(match call.method.as_str() {
            "symbol" => vec![Token::String("USDC".into())],
            "decimals" => vec![Token::Uint(U256::from(6u64))],
            _ => vec![Token::Uint(U256::from(5_000_000u64))],
        })
    });

    let token = Erc20Contract::new(Address::random());
    token.set_provider(Some(Arc::new(chain)));
    let (events, _subscription) = record_events(&token);

    token.load_common().await?;

    assert_eq!(token.symbol().as_deref(), Some("USDC"));
    assert_eq!(token.decimals(), Some(6));
    assert_eq!(token.total_supply(), Some(ScaledValue::from(5_000_000u64)));
    assert_eq!(
        *events.lock().unwrap(),
        vec![ContractEvent::UpdateData; 3]
    );
    Ok(())
}

#[test(tokio::test)]
async fn test_balance_requires_account() -> Result<()> {
    let mut chain = MockChain::new();
    chain.expect_call().times(0);

    let token = Erc20Contract::new(Address::random());
    token.set_provider(Some(Arc::new(chain)));

    let result = token.load_balance().await;
    assert!(matches!(result, Err(ContractError::NoAccount(_))));
    assert_eq!(token.balance(), None);
    Ok(())
}

#[test(tokio::test)]
async fn test_balance_is_read_for_bound_account() -> Result<()> {
    let account = Address::from_low_u64_be(0xabc);
    let mut chain = MockChain::new();
    chain
        .expect_call()
        .withf(move |_, call| {
            call.method == "balanceOf"
                && call.from == Some(account)
                && call.args == vec![Token::Address(account)]
        })
        .times(1)
        .returning(|_, _| Ok(vec![Token::Uint(U256::from(1_500_000u64))]));

    let token = Erc20Contract::new(Address::random());
    token.set_provider(Some(Arc::new(chain)));
    token.set_account(Some(account));

    let balance = token.load_balance().await?;
    assert_eq!(balance, ScaledValue::from(1_500_000u64));
    assert_eq!(token.balance(), Some(balance));

    // Another account sees nothing until its own balance is loaded.
    token.set_account(Some(Address::from_low_u64_be(0xdef)));
    assert_eq!(token.balance(), None);
    Ok(())
}

#[test(tokio::test)]
async fn test_read_failure_leaves_field_absent() -> Result<()> {
    let mut chain = MockChain::new();
    chain
        .expect_call()
        .returning(|_, _| Err(ChainError::Rpc("connection reset".to_string())));

    let token = Erc20Contract::new(Address::random());
    token.set_provider(Some(Arc::new(chain)));
    let (events, _subscription) = record_events(&token);

    assert!(token.load_common().await.is_err());
    assert_eq!(token.symbol(), None);
    assert!(events.lock().unwrap().is_empty());
    Ok(())
}

#[test(tokio::test)]
async fn test_send_publishes_hash_then_success() -> Result<()> {
    let tx_hash = H256::from_low_u64_be(42);
    let account = Address::from_low_u64_be(7);
    let mut chain = MockChain::new();
    chain
        .expect_send_transaction()
        .withf(move |_, call| {
            call.method == "redeemBond"
                && call.from == Some(account)
                && call.gas_price == Some(U256::from(50u64) * U256::exp10(9))
        })
        .times(1)
        .returning(move |_, _| Ok(tx_hash));
    chain
        .expect_wait_for_receipt()
        .times(1)
        .returning(|_| Ok(()));

    let pool = SmartYieldContract::new(Address::random());
    pool.set_provider(Some(Arc::new(chain)));
    pool.set_account(Some(account));

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let _subscription = pool.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

    assert_eq!(pool.redeem_bond_send(42, 50).await?, tx_hash);
    assert_eq!(
        *events.lock().unwrap(),
        vec![ContractEvent::TxHash(tx_hash), ContractEvent::TxSuccess(tx_hash)]
    );
    Ok(())
}

#[test(tokio::test)]
async fn test_send_failure_publishes_fail() -> Result<()> {
    let tx_hash = H256::from_low_u64_be(9);
    let mut chain = MockChain::new();
    chain
        .expect_send_transaction()
        .returning(move |_, _| Ok(tx_hash));
    chain
        .expect_wait_for_receipt()
        .returning(|hash| Err(ChainError::Reverted(hash)));

    let token = Erc20Contract::new(Address::random());
    token.set_provider(Some(Arc::new(chain)));
    token.set_account(Some(Address::random()));
    let (events, _subscription) = record_events(&token);

    let result = token.approve_send(Address::random(), U256::MAX, 30).await;
    assert!(result.is_err());

    let events = events.lock().unwrap();
    assert_eq!(events[0], ContractEvent::TxHash(tx_hash));
    assert!(matches!(
        &events[1],
        ContractEvent::TxFail { tx_hash: Some(hash), .. } if *hash == tx_hash
    ));
    Ok(())
}

#[test(tokio::test)]
async fn test_rejected_send_has_no_hash() -> Result<()> {
    let mut chain = MockChain::new();
    chain
        .expect_send_transaction()
        .returning(|_, _| Err(ChainError::Rpc("user denied".to_string())));
    chain.expect_wait_for_receipt().times(0);

    let token = Erc20Contract::new(Address::random());
    token.set_provider(Some(Arc::new(chain)));
    token.set_account(Some(Address::random()));
    let (events, _subscription) = record_events(&token);

    assert!(token.approve_send(Address::random(), U256::one(), 30).await.is_err());
    assert!(matches!(
        events.lock().unwrap().as_slice(),
        [ContractEvent::TxFail { tx_hash: None, .. }]
    ));
    Ok(())
}

#[test(tokio::test)]
async fn test_unsubscribe_on_drop() -> Result<()> {
    let chain = common::ScriptedChain::new();
    let address = common::address(1);
    chain.token(address, "DAI", 18);

    let token = Erc20Contract::new(address);
    token.set_provider(Some(chain));
    let (events, subscription) = record_events(&token);
    drop(subscription);

    token.load_common().await?;
    assert!(events.lock().unwrap().is_empty());
    assert_eq!(token.decimals(), Some(18));
    Ok(())
}
