use anyhow::Result;
use ethers::types::{Address, H256};
use std::sync::Arc;
use std::time::Duration;
use test_log::test;
use tokio::time::timeout;

use yield_sync::api::{TransactionDirection, TreasuryHistory, TreasuryToken};
use yield_sync::chain::ChainProvider;
use yield_sync::config::ReferenceTables;
use yield_sync::config::YfPoolConfig;
use yield_sync::contracts::TokenContract;
use yield_sync::providers::{
    follow_wallet, ActionError, DaoProvider, PoolsProvider, RewardPoolProvider, TreasuryProvider,
    TxState, YieldFarmingProvider, SENIOR_PORTFOLIO_ROUTE,
};
use yield_sync::value::ScaledValue;
use yield_sync::wallet::Wallet;

mod common;

use common::{address, uint, FakeApi, ScriptedChain};

const WAIT: Duration = Duration::from_secs(2);

fn account() -> Address {
    Address::from_low_u64_be(0xabc)
}

fn value(s: &str) -> ScaledValue {
    s.parse().unwrap()
}

/// Chain scripted with token metadata for every pool built by `common::sy_pool`.
fn pools_chain(pools: &[u64]) -> Arc<ScriptedChain> {
    let chain = ScriptedChain::new();
    for n in pools {
        chain.token(address(100 + n), "bb_cUSDC", 6);
        chain.set(address(100 + n), "price", uint(1_020_000_000_000_000_000));
        chain.token(address(200 + n), "USDC", 6);
    }
    chain
}

fn pools_provider(
    chain: &Arc<ScriptedChain>,
    wallet: &Wallet,
) -> Arc<PoolsProvider> {
    let api = Arc::new(FakeApi {
        pools: vec![
            common::sy_pool(1, "USDC", None),
            common::sy_pool(2, "DAI", None),
        ],
        ..Default::default()
    });
    let read: Arc<dyn ChainProvider> = chain.clone();
    Arc::new(PoolsProvider::new(
        api,
        Arc::new(ReferenceTables::builtin()),
        read,
        wallet.subscribe(),
    ))
}

#[test(tokio::test)]
async fn test_pools_without_wallet_have_no_balances() -> Result<()> {
    common::init_logging();
    let chain = pools_chain(&[1, 2]);
    let wallet = Wallet::new();
    let pools = pools_provider(&chain, &wallet);

    pools.mount().await;

    let state = pools.state();
    assert!(!state.loading);
    assert_eq!(state.pools.len(), 2);
    for entity in &state.pools {
        assert_eq!(entity.smart_yield.account(), None);
        assert!(entity.smart_yield.has_provider());
        assert_eq!(entity.underlying_balance(), None);
        assert_eq!(entity.underlying.symbol().as_deref(), Some("USDC"));
        assert!(entity.meta.is_some());
        assert_eq!(entity.market.as_ref().map(|m| m.name.as_str()), Some("Compound"));
    }
    assert!(chain.methods().iter().all(|method| method != "balanceOf"));
    Ok(())
}

#[test(tokio::test)]
async fn test_account_change_loads_balances() -> Result<()> {
    let chain = pools_chain(&[1, 2]);
    chain.set(address(201), "balanceOf", uint(2_500_000));
    chain.set(address(202), "balanceOf", uint(7_000_000));
    let wallet = Wallet::new();
    let pools = pools_provider(&chain, &wallet);
    pools.mount().await;

    let mut reload = pools.subscribe_reload();
    let before = pools.reload_version();
    let follower = tokio::spawn(follow_wallet(pools.clone(), wallet.subscribe()));
    tokio::task::yield_now().await;

    assert!(wallet.set_account(Some(account())));

    timeout(WAIT, async {
        while !pools.pools().iter().all(|p| p.underlying_balance().is_some()) {
            reload.changed().await.unwrap();
        }
    })
    .await?;

    assert!(pools.reload_version() > before);
    let first = pools.pool(address(101)).unwrap();
    assert_eq!(first.underlying.account(), Some(account()));
    assert_eq!(first.underlying_balance(), Some(value("2.5")));
    assert!(chain
        .calls()
        .iter()
        .filter(|call| call.method == "balanceOf")
        .all(|call| call.from == Some(account())));

    follower.abort();
    Ok(())
}

#[test(tokio::test)]
async fn test_account_change_during_mount_rebinds_handles() -> Result<()> {
    let chain = pools_chain(&[1, 2]);
    chain.set(address(201), "balanceOf", uint(2_500_000));
    chain.set(address(202), "balanceOf", uint(7_000_000));
    let wallet = Wallet::new();
    let pools = pools_provider(&chain, &wallet);
    let follower = tokio::spawn(follow_wallet(pools.clone(), wallet.subscribe()));
    let gate = chain.hold_reads(address(201), "symbol");

    let mount = {
        let pools = pools.clone();
        tokio::spawn(async move { pools.mount().await })
    };
    common::run_pending().await;
    assert!(pools.state().loading);

    assert!(wallet.set_account(Some(account())));
    common::run_pending().await;
    gate.notify_one();
    timeout(WAIT, mount).await??;

    for entity in pools.pools() {
        assert_eq!(entity.underlying.account(), Some(account()));
        assert_eq!(entity.smart_yield.account(), Some(account()));
    }
    let first = pools.pool(address(101)).unwrap();
    assert_eq!(first.underlying_balance(), Some(value("2.5")));

    follower.abort();
    Ok(())
}

#[test(tokio::test)]
async fn test_follower_started_late_catches_up() -> Result<()> {
    let chain = pools_chain(&[1, 2]);
    chain.set(address(201), "balanceOf", uint(2_500_000));
    chain.set(address(202), "balanceOf", uint(7_000_000));
    let wallet = Wallet::new();
    let pools = pools_provider(&chain, &wallet);
    pools.mount().await;

    // Changed before anyone follows the wallet.
    assert!(wallet.set_account(Some(account())));
    let mut reload = pools.subscribe_reload();
    let follower = tokio::spawn(follow_wallet(pools.clone(), wallet.subscribe()));

    timeout(WAIT, async {
        while !pools.pools().iter().all(|p| p.underlying_balance().is_some()) {
            reload.changed().await.unwrap();
        }
    })
    .await?;
    assert_eq!(
        pools.pool(address(102)).unwrap().underlying_balance(),
        Some(value("7"))
    );

    follower.abort();
    Ok(())
}

#[test(tokio::test)]
async fn test_redeem_bond_runs_reloads_and_navigates() -> Result<()> {
    let chain = pools_chain(&[1, 2]);
    chain.set(address(201), "balanceOf", uint(1_000_000));
    chain.set(address(201), "allowance", uint(0));
    chain.set(address(101), "balanceOf", uint(0));
    let wallet = Wallet::new();
    wallet.connect(chain.clone(), Some(account()));
    let pools = pools_provider(&chain, &wallet);
    pools.mount().await;

    let gate = chain.hold_receipts();
    let mut modal = pools.tx().subscribe_modal();
    chain.clear_calls();

    let action = {
        let pools = pools.clone();
        tokio::spawn(async move { pools.redeem_bond(address(101), 42, 50).await })
    };

    timeout(WAIT, modal.changed()).await??;
    let progress = modal.borrow_and_update().clone();
    assert!(progress.visible);
    assert_eq!(progress.state, Some(TxState::Progress));
    assert!(pools.tx().is_pending());

    // A second submission while the first is pending is rejected.
    let second = pools.redeem_bond(address(101), 43, 50).await;
    assert!(matches!(second, Err(ActionError::Busy)));

    gate.notify_one();
    let tx_hash = timeout(WAIT, action).await???;
    assert_eq!(pools.tx_modal().state, Some(TxState::Success));
    assert_eq!(pools.tx_modal().tx_hash, Some(tx_hash));
    assert!(!pools.tx().is_pending());

    let sent = chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].method, "redeemBond");
    assert_eq!(sent[0].from, Some(account()));

    let reloaded: Vec<(Address, String)> = chain
        .calls()
        .into_iter()
        .map(|call| (call.address, call.method))
        .collect();
    assert_eq!(
        &reloaded[..3],
        &[
            (address(201), "balanceOf".to_string()),
            (address(201), "allowance".to_string()),
            (address(101), "balanceOf".to_string()),
        ]
    );

    let mut navigation = pools.tx().subscribe_navigation();
    pools.tx().acknowledge_success();
    assert!(!pools.tx_modal().visible);
    assert!(navigation.has_changed()?);
    assert_eq!(
        navigation.borrow_and_update().as_deref(),
        Some(SENIOR_PORTFOLIO_ROUTE)
    );
    Ok(())
}

#[test(tokio::test)]
async fn test_failed_transaction_leaves_modal_failed() -> Result<()> {
    let chain = pools_chain(&[1]);
    chain.fail_receipts(true);
    let wallet = Wallet::new();
    wallet.connect(chain.clone(), Some(account()));
    let pools = pools_provider(&chain, &wallet);
    pools.mount().await;
    chain.clear_calls();

    let result = pools.redeem_junior_bond(address(101), 7, 50).await;
    assert!(matches!(result, Err(ActionError::Contract(_))));

    let modal = pools.tx_modal();
    assert!(modal.visible);
    assert_eq!(modal.state, Some(TxState::Failure));
    assert!(chain.calls().is_empty(), "no reloads after a failure");

    // Acknowledging only applies to successes; dismiss closes it.
    pools.tx().acknowledge_success();
    assert!(pools.tx_modal().visible);
    pools.tx().dismiss();
    assert!(!pools.tx_modal().visible);
    Ok(())
}

#[test(tokio::test)]
async fn test_actions_require_wallet() -> Result<()> {
    let chain = pools_chain(&[1]);
    let wallet = Wallet::new();
    let pools = pools_provider(&chain, &wallet);
    pools.mount().await;

    let result = pools
        .transfer_from(address(301), address(0xdef), 1, 50)
        .await;
    assert!(matches!(result, Err(ActionError::NoWallet)));
    assert!(chain.sent().is_empty());
    Ok(())
}

fn history_item(n: u64) -> TreasuryHistory {
    TreasuryHistory {
        account_address: address(900),
        account_label: None,
        counterparty_address: address(n),
        counterparty_label: None,
        amount: ScaledValue::from(n),
        transaction_direction: TransactionDirection::In,
        token_address: address(801),
        token_symbol: "USDC".to_string(),
        transaction_hash: H256::from_low_u64_be(n),
        block_timestamp: 1_600_000_000,
        block_number: n,
    }
}

fn treasury_provider(chain: &Arc<ScriptedChain>, history: Option<Vec<TreasuryHistory>>) -> TreasuryProvider {
    let api = Arc::new(FakeApi {
        treasury_tokens: vec![
            TreasuryToken {
                token_address: address(801),
                token_symbol: "USDC".to_string(),
                token_decimals: 6,
            },
            TreasuryToken {
                token_address: address(802),
                token_symbol: "BOND".to_string(),
                token_decimals: 18,
            },
        ],
        history: std::sync::Mutex::new(history),
        history_total: 12,
        ..Default::default()
    });
    let read: Arc<dyn ChainProvider> = chain.clone();
    TreasuryProvider::new(api, read, address(900), 10)
}

#[test(tokio::test)]
async fn test_treasury_history_failure_is_empty() -> Result<()> {
    let chain = ScriptedChain::new();
    let treasury = treasury_provider(&chain, None);

    treasury.mount().await;

    let history = treasury.history();
    assert_eq!(history.total, 0);
    assert!(!history.loading);
    assert!(history.items.is_empty());
    assert_eq!(treasury.tokens().items.len(), 2);
    Ok(())
}

#[test(tokio::test)]
async fn test_treasury_totals_skip_unknown_balances() -> Result<()> {
    let chain = ScriptedChain::new();
    chain.set(address(801), "balanceOf", uint(1_500_000));
    let treasury = treasury_provider(&chain, Some((1..=3).map(history_item).collect()));

    treasury.mount().await;

    assert_eq!(treasury.total_holdings(), value("1.5"));
    let tokens = treasury.tokens();
    assert_eq!(tokens.items[1].holdings(&address(900)), None);

    let history = treasury.history();
    assert_eq!(history.items.len(), 3);
    assert_eq!(history.total, 12);
    assert!(treasury.set_history_page(2).await);
    assert_eq!(treasury.history().page, 2);
    Ok(())
}

#[test(tokio::test)]
async fn test_reward_pool_select_and_stake() -> Result<()> {
    let chain = ScriptedChain::new();
    chain.token(address(502), "BOND", 18);
    chain.token(address(501), "bb_cUSDC", 6);
    chain.set(address(501), "price", uint(1_000_000_000_000_000_000));
    chain.set(address(501), "balanceOf", uint(3_000_000));
    chain.set(address(501), "allowance", uint(2_000_000));
    chain.set(address(500), "poolSize", uint(50_000_000));
    chain.set(
        address(500),
        "poolToken",
        vec![ethers::abi::Token::Address(address(501))],
    );
    chain.set(address(500), "balances", uint(1_000_000));
    chain.set(address(500), "toClaim", uint(4_000_000_000_000_000_000));

    let wallet = Wallet::new();
    wallet.connect(chain.clone(), Some(account()));
    let api = Arc::new(FakeApi {
        reward_pools: vec![common::sy_reward_pool("USDC")],
        ..Default::default()
    });
    let read: Arc<dyn ChainProvider> = chain.clone();
    let provider = RewardPoolProvider::new(api, read, wallet.subscribe());

    provider.select(Some("compound/v2"), Some("USDC")).await;
    let entity = provider.pool().expect("reward pool selected");
    assert!(!provider.state().loading);
    assert_eq!(entity.pool_size(), Some(value("50")));
    assert_eq!(entity.staked_balance(), Some(value("1")));
    assert_eq!(entity.pool_token_balance(), Some(value("3")));
    assert_eq!(entity.to_claim(), Some(value("4")));
    assert_eq!(entity.is_allowed(&value("1.5")), Some(true));
    assert_eq!(entity.is_allowed(&value("2.5")), Some(false));

    let invalid = provider.stake(&value("0"), 50).await;
    assert!(matches!(invalid, Err(ActionError::InvalidAmount(_))));

    provider.stake(&value("1.5"), 50).await?;
    let sent = chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].address, address(500));
    assert_eq!(sent[0].method, "deposit");

    provider.select(Some("compound/v2"), Some("DAI")).await;
    assert!(provider.pool().is_none());
    assert!(!provider.state().loading);
    Ok(())
}

#[test(tokio::test)]
async fn test_superseded_selection_is_discarded() -> Result<()> {
    let chain = ScriptedChain::new();
    chain.token(address(501), "bb_cUSDC", 6);
    chain.set(address(500), "poolSize", uint(50_000_000));

    let mut dai = common::sy_reward_pool("DAI");
    dai.pool_address = address(600);
    dai.pool_token_address = address(601);
    chain.token(address(601), "bb_cDAI", 18);
    chain.set(address(600), "poolSize", uint(9));

    let api = Arc::new(FakeApi {
        reward_pools: vec![dai, common::sy_reward_pool("USDC")],
        ..Default::default()
    });
    let gate = api.hold_reward_pools("DAI");
    let wallet = Wallet::new();
    let read: Arc<dyn ChainProvider> = chain.clone();
    let provider = Arc::new(RewardPoolProvider::new(api, read, wallet.subscribe()));

    let older = {
        let provider = provider.clone();
        tokio::spawn(async move { provider.select(Some("compound/v2"), Some("DAI")).await })
    };
    common::run_pending().await;

    provider.select(Some("compound/v2"), Some("USDC")).await;
    gate.notify_one();
    timeout(WAIT, older).await??;

    let state = provider.state();
    assert_eq!(state.token_id.as_deref(), Some("USDC"));
    assert!(!state.loading);
    let entity = state.pool.expect("latest selection installed");
    assert_eq!(entity.pool.underlying_symbol, "USDC");
    assert_eq!(entity.pool_size(), Some(value("50")));
    // The overtaken lookup never built or loaded its pool.
    assert!(chain
        .calls()
        .iter()
        .all(|call| call.address != address(600) && call.address != address(601)));
    Ok(())
}

#[test(tokio::test)]
async fn test_selection_overtaken_while_loading_keeps_latest() -> Result<()> {
    let chain = ScriptedChain::new();
    chain.token(address(501), "bb_cUSDC", 6);
    chain.set(address(500), "poolSize", uint(50_000_000));

    let mut dai = common::sy_reward_pool("DAI");
    dai.pool_address = address(600);
    dai.pool_token_address = address(601);
    chain.token(address(601), "bb_cDAI", 18);
    let gate = chain.hold_reads(address(601), "symbol");

    let api = Arc::new(FakeApi {
        reward_pools: vec![dai, common::sy_reward_pool("USDC")],
        ..Default::default()
    });
    let wallet = Wallet::new();
    let read: Arc<dyn ChainProvider> = chain.clone();
    let provider = Arc::new(RewardPoolProvider::new(api, read, wallet.subscribe()));

    let older = {
        let provider = provider.clone();
        tokio::spawn(async move { provider.select(Some("compound/v2"), Some("DAI")).await })
    };
    common::run_pending().await;
    assert!(chain.calls().iter().any(|call| call.address == address(601)));

    provider.select(Some("compound/v2"), Some("USDC")).await;
    gate.notify_one();
    timeout(WAIT, older).await??;

    let state = provider.state();
    assert_eq!(state.token_id.as_deref(), Some("USDC"));
    assert!(!state.loading);
    let entity = state.pool.expect("latest selection installed");
    assert_eq!(entity.pool.pool_address, address(500));
    Ok(())
}

#[test(tokio::test)]
async fn test_dao_claim_reloads_reward() -> Result<()> {
    let chain = ScriptedChain::new();
    let (barn, reward, bond) = (address(600), address(601), address(602));
    chain.token(bond, "BOND", 18);
    chain.set(bond, "balanceOf", uint(5_000_000_000_000_000_000));
    chain.set(barn, "bondStaked", uint(100));
    chain.set(barn, "balanceOf", uint(2_000_000_000_000_000_000));
    chain.set(barn, "votingPower", uint(3_000_000_000_000_000_000));
    chain.set(barn, "userLockedUntil", uint(2_000_000_000));
    chain.set(barn, "multiplierAtTs", uint(1_500_000_000_000_000_000));
    chain.set(reward, "claim", uint(1_000_000_000_000_000_000));

    let wallet = Wallet::new();
    wallet.connect(chain.clone(), Some(account()));
    let read: Arc<dyn ChainProvider> = chain.clone();
    let dao = DaoProvider::new(read, wallet.subscribe(), barn, reward, bond);
    dao.mount().await;

    assert_eq!(dao.voting_power(), Some(value("3")));
    assert_eq!(dao.staked_balance(), Some(value("2")));
    assert_eq!(dao.bond_balance(), Some(value("5")));
    assert_eq!(dao.claim_value(), Some(value("1")));
    assert_eq!(dao.multiplier(), value("1.5"));
    assert_eq!(dao.lock_remaining(1_999_999_000), 1_000);
    assert_eq!(dao.lock_remaining(2_100_000_000), 0);

    chain.set(reward, "claim", uint(0));
    chain.clear_calls();
    dao.claim(40).await?;

    assert_eq!(chain.sent()[0].address, reward);
    assert_eq!(dao.claim_value(), Some(ScaledValue::zero()));
    assert_eq!(
        chain.methods(),
        vec!["claim".to_string(), "balanceOf".to_string()]
    );
    Ok(())
}

#[test(tokio::test)]
async fn test_yield_farming_stake_reload_order() -> Result<()> {
    let chain = ScriptedChain::new();
    let (staking, pool, token) = (address(700), address(701), address(702));
    chain.token(token, "USDC", 6);
    chain.set(token, "balanceOf", uint(10_000_000));
    chain.set(token, "allowance", uint(4_000_000));
    chain.set(staking, "getCurrentEpoch", uint(5));
    chain.set(staking, "getEpochPoolSize", uint(1_000));
    chain.set(staking, "balanceOf", uint(2_000_000));
    chain.set(staking, "getEpochUserBalance", uint(2_000_000));
    chain.set(pool, "TOTAL_DISTRIBUTED_AMOUNT", uint(800));
    chain.set(pool, "NR_OF_EPOCHS", uint(8));
    chain.set(pool, "getCurrentEpoch", uint(5));
    chain.set(pool, "getPoolSize", uint(100));
    chain.set(pool, "massHarvest", uint(3));
    chain.set(pool, "getEpochStake", uint(25));

    let wallet = Wallet::new();
    wallet.connect(chain.clone(), Some(account()));
    let read: Arc<dyn ChainProvider> = chain.clone();
    let farming = YieldFarmingProvider::new(
        read,
        wallet.subscribe(),
        staking,
        vec![YfPoolConfig {
            name: "Stablecoins".to_string(),
            address: pool,
            tokens: vec![token],
        }],
    );
    farming.mount().await;

    assert_eq!(farming.total_to_claim(), Some(ScaledValue::from(3u64)));
    assert_eq!(farming.total_potential_reward(), Some(ScaledValue::from(25u64)));
    assert_eq!(farming.max_stake(&token), Some(value("4")));
    assert_eq!(farming.staking().staked_balance(&token), Some(ScaledValue::from(2_000_000u64)));
    assert_eq!(
        farming.token(&token).and_then(|t| t.unscaled_balance()),
        Some(value("10"))
    );

    chain.clear_calls();
    farming.stake(token, &value("2"), 50).await?;

    let order: Vec<(Address, String)> = chain
        .calls()
        .into_iter()
        .map(|call| (call.address, call.method))
        .collect();
    let expected: Vec<(Address, &str)> = vec![
        (staking, "getCurrentEpoch"),
        (staking, "getEpochPoolSize"),
        (staking, "balanceOf"),
        (staking, "getEpochUserBalance"),
        (token, "balanceOf"),
        (pool, "TOTAL_DISTRIBUTED_AMOUNT"),
        (pool, "NR_OF_EPOCHS"),
        (pool, "getCurrentEpoch"),
        (pool, "getPoolSize"),
        (pool, "massHarvest"),
        (pool, "getEpochStake"),
    ];
    assert_eq!(
        order,
        expected
            .into_iter()
            .map(|(address, method)| (address, method.to_string()))
            .collect::<Vec<_>>()
    );
    assert_eq!(chain.sent()[0].method, "deposit");
    Ok(())
}
