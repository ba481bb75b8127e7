use async_trait::async_trait;
use ethers::types::H256;
use log::{debug, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use super::{
    bind_for_send, bind_handle, follow, lock, reload, settle, sync_wallet, to_base_units, ActionError,
    TxKind, TxTracker, WalletFollower,
};
use crate::api::{DashboardApi, SyRewardPool};
use crate::chain::ChainProvider;
use crate::contracts::{
    ContractHandle, Erc20Contract, RewardPoolContract, SmartYieldContract, TokenContract,
};
use crate::events::Subscription;
use crate::reload::Reload;
use crate::value::ScaledValue;
use crate::wallet::{WalletChange, WalletState};

/// Reward pool with its staked token, reward token and pool handles.
#[derive(Debug)]
pub struct RewardPoolEntity {
    pub pool: SyRewardPool,
    pub pool_contract: RewardPoolContract,
    pub pool_token: SmartYieldContract,
    pub reward_token: Option<Erc20Contract>,
}

impl RewardPoolEntity {
    fn handles(&self) -> Vec<&ContractHandle> {
        let mut handles = vec![&*self.pool_contract, &*self.pool_token];
        if let Some(reward_token) = &self.reward_token {
            handles.push(&**reward_token);
        }
        handles
    }

    fn pool_token_decimals(&self) -> u64 {
        self.pool.pool_token_decimals as u64
    }

    /// Bound account's wallet balance of the staked token, human units.
    pub fn pool_token_balance(&self) -> Option<ScaledValue> {
        Some(self.pool_token.balance()?.unscale_by(self.pool_token_decimals() as i64))
    }

    pub fn staked_balance(&self) -> Option<ScaledValue> {
        Some(
            self.pool_contract
                .balance()?
                .unscale_by(self.pool_token_decimals() as i64),
        )
    }

    pub fn pool_size(&self) -> Option<ScaledValue> {
        Some(
            self.pool_contract
                .pool_size()?
                .unscale_by(self.pool_token_decimals() as i64),
        )
    }

    pub fn to_claim(&self) -> Option<ScaledValue> {
        let decimals = self.pool.reward_tokens.first()?.decimals;
        Some(self.pool_contract.to_claim()?.unscale_by(decimals as i64))
    }

    /// Whether the pool may already pull `amount` (human units) of the staked token.
    pub fn is_allowed(&self, amount: &ScaledValue) -> Option<bool> {
        let raw = amount.scale_by(self.pool_token_decimals() as i64);
        self.pool_token.is_allowed(&self.pool.pool_address, &raw)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RewardPoolState {
    pub market_id: Option<String>,
    pub token_id: Option<String>,
    pub loading: bool,
    pub pool: Option<Arc<RewardPoolEntity>>,
}

/// Single reward pool selected by market and underlying token.
pub struct RewardPoolProvider {
    api: Arc<dyn DashboardApi>,
    read_provider: Arc<dyn ChainProvider>,
    wallet: watch::Receiver<WalletState>,
    reload: Reload,
    state: watch::Sender<RewardPoolState>,
    subscriptions: Mutex<Vec<Subscription>>,
    generation: AtomicU64,
    bound_wallet: Mutex<Option<WalletState>>,
    tx: TxTracker,
}

impl RewardPoolProvider {
    pub fn new(
        api: Arc<dyn DashboardApi>,
        read_provider: Arc<dyn ChainProvider>,
        wallet: watch::Receiver<WalletState>,
    ) -> Self {
        let (state, _) = watch::channel(RewardPoolState::default());
        Self {
            api,
            read_provider,
            wallet,
            reload: Reload::new(),
            state,
            subscriptions: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
            bound_wallet: Mutex::new(None),
            tx: TxTracker::new(),
        }
    }

    /// Selects the pool for `(market, token)`; the previous pool is released.
    ///
    /// Only the latest selection is applied: a selection overtaken by a later
    /// call drops its handles and leaves the state alone.
    pub async fn select(&self, market: Option<&str>, token: Option<&str>) {
        let generation = {
            let mut subscriptions = lock(&self.subscriptions);
            subscriptions.clear();
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.state.send_replace(RewardPoolState {
                market_id: market.map(str::to_string),
                token_id: token.map(str::to_string),
                loading: true,
                pool: None,
            });
            generation
        };

        let (market, token) = match (market, token) {
            (Some(market), Some(token)) => (market, token),
            _ => {
                self.install(generation, None, Vec::new());
                return;
            }
        };

        let pool = match self.api.fetch_sy_reward_pools(market, token).await {
            Ok(pools) => pools.into_iter().next(),
            Err(e) => {
                warn!("Failed to fetch reward pools for {}/{}: {}", market, token, e);
                self.install(generation, None, Vec::new());
                return;
            }
        };
        let pool = match pool {
            Some(pool) => pool,
            None => {
                debug!("No reward pool for {}/{}", market, token);
                self.install(generation, None, Vec::new());
                return;
            }
        };
        if !self.is_current(generation) {
            debug!("Selection of {}/{} superseded", market, token);
            return;
        }

        let wallet = self.wallet.borrow().clone();
        let entity = Arc::new(RewardPoolEntity {
            pool_contract: RewardPoolContract::new(pool.pool_address),
            pool_token: SmartYieldContract::new(pool.pool_token_address),
            reward_token: pool
                .reward_tokens
                .first()
                .map(|token| Erc20Contract::new(token.address)),
            pool,
        });
        let subscriptions: Vec<Subscription> = entity
            .handles()
            .into_iter()
            .map(|handle| {
                bind_handle(handle, &wallet, &self.read_provider);
                follow(handle, &self.reload)
            })
            .collect();

        if let Some(reward_token) = &entity.reward_token {
            settle("rewardToken.loadCommon", reward_token.load_common().await);
        }
        settle("poolToken.loadCommon", entity.pool_token.load_pool_common().await);
        settle("pool.loadCommon", entity.pool_contract.load_common().await);

        if !self.install(generation, Some(entity), subscriptions) {
            debug!("Selection of {}/{} superseded", market, token);
            return;
        }
        *lock(&self.bound_wallet) = None;
        sync_wallet(self, &self.wallet).await;
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Publishes the outcome of selection `generation` if no later selection
    /// started; otherwise drops `subscriptions` and returns `false`.
    fn install(
        &self,
        generation: u64,
        pool: Option<Arc<RewardPoolEntity>>,
        subscriptions: Vec<Subscription>,
    ) -> bool {
        let mut installed = lock(&self.subscriptions);
        if !self.is_current(generation) {
            return false;
        }
        *installed = subscriptions;
        self.state.send_modify(|state| {
            state.loading = false;
            state.pool = pool;
        });
        true
    }

    pub fn state(&self) -> RewardPoolState {
        self.state.borrow().clone()
    }

    pub fn pool(&self) -> Option<Arc<RewardPoolEntity>> {
        self.state.borrow().pool.clone()
    }

    pub fn reload_version(&self) -> u64 {
        self.reload.version()
    }

    pub fn subscribe_reload(&self) -> watch::Receiver<u64> {
        self.reload.subscribe()
    }

    pub fn tx(&self) -> &TxTracker {
        &self.tx
    }

    async fn load_account_data(entity: &RewardPoolEntity) {
        settle("poolToken.loadBalance", entity.pool_token.load_balance().await);
        settle(
            "poolToken.loadAllowance",
            entity.pool_token.load_allowance(entity.pool.pool_address).await,
        );
        settle("pool.loadClaim", entity.pool_contract.load_claim().await);
        settle("pool.loadBalance", entity.pool_contract.load_balance().await);
    }

    fn require_pool(&self) -> Result<Arc<RewardPoolEntity>, ActionError> {
        self.pool()
            .ok_or_else(|| ActionError::Unknown("reward pool".to_string()))
    }

    /// Stakes `amount` (human units) of the pool token.
    pub async fn stake(&self, amount: &ScaledValue, gas_price_gwei: u64) -> Result<H256, ActionError> {
        let entity = self.require_pool()?;
        let raw = to_base_units(amount, entity.pool_token_decimals())?;
        let contract = RewardPoolContract::new(entity.pool.pool_address);
        bind_for_send(&contract, &self.wallet.borrow().clone())?;

        let reloads = vec![
            reload("poolToken.loadBalance", entity.pool_token.load_balance()),
            reload(
                "poolToken.loadAllowance",
                entity.pool_token.load_allowance(entity.pool.pool_address),
            ),
            reload("pool.loadBalance", entity.pool_contract.load_balance()),
            reload("pool.loadCommon", entity.pool_contract.load_common()),
        ];
        self.tx
            .execute(
                TxKind::Stake,
                &contract,
                contract.deposit_send(raw, gas_price_gwei),
                reloads,
                None,
            )
            .await
    }

    pub async fn unstake(&self, amount: &ScaledValue, gas_price_gwei: u64) -> Result<H256, ActionError> {
        let entity = self.require_pool()?;
        let raw = to_base_units(amount, entity.pool_token_decimals())?;
        let contract = RewardPoolContract::new(entity.pool.pool_address);
        bind_for_send(&contract, &self.wallet.borrow().clone())?;

        let reloads = vec![
            reload("poolToken.loadBalance", entity.pool_token.load_balance()),
            reload("pool.loadBalance", entity.pool_contract.load_balance()),
            reload("pool.loadCommon", entity.pool_contract.load_common()),
        ];
        self.tx
            .execute(
                TxKind::Unstake,
                &contract,
                contract.withdraw_send(raw, gas_price_gwei),
                reloads,
                None,
            )
            .await
    }

    pub async fn claim(&self, gas_price_gwei: u64) -> Result<H256, ActionError> {
        let entity = self.require_pool()?;
        let contract = RewardPoolContract::new(entity.pool.pool_address);
        bind_for_send(&contract, &self.wallet.borrow().clone())?;

        let mut reloads = vec![reload("pool.loadClaim", entity.pool_contract.load_claim())];
        if let Some(reward_token) = &entity.reward_token {
            reloads.push(reload("rewardToken.loadBalance", reward_token.load_balance()));
        }
        self.tx
            .execute(
                TxKind::Claim,
                &contract,
                contract.claim_send(gas_price_gwei),
                reloads,
                None,
            )
            .await
    }
}

#[async_trait]
impl WalletFollower for RewardPoolProvider {
    /// A provider change only rebinds; an account change also reloads the
    /// account-scoped fields.
    async fn handle_wallet_change(&self, change: WalletChange, wallet: &WalletState) {
        *lock(&self.bound_wallet) = Some(wallet.clone());
        let entity = match self.pool() {
            Some(entity) => entity,
            None => return,
        };
        for handle in entity.handles() {
            bind_handle(handle, wallet, &self.read_provider);
        }
        if change.account && wallet.account.is_some() {
            Self::load_account_data(&entity).await;
        }
    }

    fn bound_wallet(&self) -> Option<WalletState> {
        lock(&self.bound_wallet).clone()
    }
}
