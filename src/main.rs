use anyhow::Result;
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Provider},
    signers::{LocalWallet, Signer},
};
use log::{error, info};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_stream::{wrappers::WatchStream, StreamExt};

use yield_sync::{
    api::{ApiClient, DashboardApi},
    chain::{ChainProvider, EthersChain},
    config::{AppConfig, RuntimeConfig},
    providers::{
        follow_wallet, DaoProvider, PoolsProvider, RewardPoolProvider, TreasuryProvider,
        YieldFarmingProvider,
    },
    settings::{Theme, ThemeStore},
    utils::{format_token, setup_logger, shorten_addr},
    wallet::Wallet,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment and logging
    dotenv::dotenv().ok();
    let runtime_config = RuntimeConfig::from_env()?;
    setup_logger(runtime_config.log_level())?;

    // Load and validate configurations
    let config = AppConfig::from_env()?;
    config.validate_all()?;
    let tables = Arc::new(config.reference_tables()?);

    let theme = ThemeStore::open(&config.theme_path);
    info!("Theme: {:?}", theme.effective(Theme::Light));

    // Start metrics exporter
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([127, 0, 0, 1], runtime_config.metrics_port)))
        .install()?;

    // Setup REST client and chain providers
    let api: Arc<dyn DashboardApi> = Arc::new(ApiClient::new(
        &config.api_base_url,
        runtime_config.request_timeout,
    )?);
    let http = Provider::<Http>::try_from(config.rpc_url.as_str())?
        .interval(runtime_config.wallet_poll_interval);
    let read_provider: Arc<dyn ChainProvider> = Arc::new(EthersChain::new(Arc::new(http.clone())));

    let wallet = Wallet::new();
    match &config.private_key {
        Some(key) => {
            let signer = LocalWallet::from_bytes(&hex::decode(key.trim_start_matches("0x"))?)?
                .with_chain_id(config.chain_id);
            let account = signer.address();
            let client = SignerMiddleware::new(http.clone(), signer);
            wallet.connect(Arc::new(EthersChain::new(Arc::new(client))), Some(account));
        }
        None => {
            if let Some(account) = config.account {
                wallet.connect(read_provider.clone(), Some(account));
            }
        }
    }

    // Mount providers
    let pools = Arc::new(PoolsProvider::new(
        api.clone(),
        tables.clone(),
        read_provider.clone(),
        wallet.subscribe(),
    ));
    let treasury = Arc::new(TreasuryProvider::new(
        api.clone(),
        read_provider.clone(),
        config.dao_governance_address,
        runtime_config.page_size,
    ));
    let dao = Arc::new(DaoProvider::new(
        read_provider.clone(),
        wallet.subscribe(),
        config.dao_barn_address,
        config.dao_reward_address,
        config.bond_token_address,
    ));
    let farming = Arc::new(YieldFarmingProvider::new(
        read_provider.clone(),
        wallet.subscribe(),
        config.yf_staking_address,
        tables.yf_pools.clone(),
    ));
    let reward_pool = Arc::new(RewardPoolProvider::new(
        api.clone(),
        read_provider.clone(),
        wallet.subscribe(),
    ));
    futures::join!(pools.mount(), treasury.mount(), dao.mount(), farming.mount());

    // Follow the reward pool of the first smart-yield pool that has one
    if let Some(entity) = pools
        .pools()
        .into_iter()
        .find(|entity| entity.pool.reward_pool_address.is_some())
    {
        reward_pool
            .select(
                Some(entity.pool.protocol_id.as_str()),
                Some(entity.pool.underlying_symbol.as_str()),
            )
            .await;
    }

    let mut set = JoinSet::new();
    set.spawn(follow_wallet(pools.clone(), wallet.subscribe()));
    set.spawn(follow_wallet(dao.clone(), wallet.subscribe()));
    set.spawn(follow_wallet(farming.clone(), wallet.subscribe()));
    set.spawn(follow_wallet(reward_pool.clone(), wallet.subscribe()));
    spawn_balance_reporters(&mut set, pools, treasury, dao);
    spawn_farming_reporters(&mut set, farming, reward_pool);

    // Wait for tasks and handle failures
    while let Some(res) = set.join_next().await {
        match res {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => error!("Task failed: {}", e),
            Err(e) => error!("Task error: {}", e),
        }
    }

    Ok(())
}

fn spawn_balance_reporters(
    set: &mut JoinSet<Result<()>>,
    pools: Arc<PoolsProvider>,
    treasury: Arc<TreasuryProvider>,
    dao: Arc<DaoProvider>,
) {
    set.spawn(async move {
        let mut versions = WatchStream::new(pools.subscribe_reload());
        while let Some(version) = versions.next().await {
            for entity in pools.pools() {
                info!(
                    "[pools v{}] {} {} underlying={} junior={}",
                    version,
                    entity.pool.underlying_symbol,
                    shorten_addr(&entity.pool.smart_yield_address, 6, 4),
                    format_token(entity.underlying_balance().as_ref(), 4)
                        .unwrap_or_else(|| "-".to_string()),
                    format_token(entity.junior_balance().as_ref(), 4)
                        .unwrap_or_else(|| "-".to_string()),
                );
            }
        }
        Ok(())
    });

    set.spawn(async move {
        let mut versions = WatchStream::new(treasury.subscribe_reload());
        while let Some(version) = versions.next().await {
            info!(
                "[treasury v{}] {} tokens, total holdings {}",
                version,
                treasury.tokens().items.len(),
                format_token(Some(&treasury.total_holdings()), 4).unwrap_or_default(),
            );
        }
        Ok(())
    });

    set.spawn(async move {
        let mut versions = WatchStream::new(dao.subscribe_reload());
        while let Some(version) = versions.next().await {
            info!(
                "[dao v{}] voting power {} staked {} multiplier {}",
                version,
                format_token(dao.voting_power().as_ref(), 4).unwrap_or_else(|| "-".to_string()),
                format_token(dao.staked_balance().as_ref(), 4).unwrap_or_else(|| "-".to_string()),
                dao.multiplier().to_fixed(2),
            );
        }
        Ok(())
    });
}

fn spawn_farming_reporters(
    set: &mut JoinSet<Result<()>>,
    farming: Arc<YieldFarmingProvider>,
    reward_pool: Arc<RewardPoolProvider>,
) {
    set.spawn(async move {
        let mut versions = WatchStream::new(farming.subscribe_reload());
        while let Some(version) = versions.next().await {
            info!(
                "[farming v{}] {} pools, to claim {} potential {}",
                version,
                farming.pools().len(),
                format_token(farming.total_to_claim().as_ref(), 4).unwrap_or_else(|| "-".to_string()),
                format_token(farming.total_potential_reward().as_ref(), 4)
                    .unwrap_or_else(|| "-".to_string()),
            );
        }
        Ok(())
    });

    set.spawn(async move {
        let mut versions = WatchStream::new(reward_pool.subscribe_reload());
        while let Some(version) = versions.next().await {
            if let Some(entity) = reward_pool.pool() {
                info!(
                    "[reward pool v{}] {} staked {} to claim {}",
                    version,
                    entity.pool.underlying_symbol,
                    format_token(entity.staked_balance().as_ref(), 4)
                        .unwrap_or_else(|| "-".to_string()),
                    format_token(entity.to_claim().as_ref(), 4).unwrap_or_else(|| "-".to_string()),
                );
            }
        }
        Ok(())
    });
}
