use async_trait::async_trait;
use ethers::types::{Address, H256};
use futures::future::join_all;
use log::{info, warn};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use super::{
    bind_for_send, bind_handle, follow, lock, reload, settle, sync_wallet, ActionError, ReloadStep,
    TxKind, TxModal, TxTracker, WalletFollower, SENIOR_PORTFOLIO_ROUTE,
};
use crate::api::{DashboardApi, SyPool, ALL};
use crate::chain::ChainProvider;
use crate::config::reference::{MarketMeta, PoolMeta, ReferenceTables};
use crate::contracts::{
    Erc20Contract, RewardPoolContract, SeniorBondContract, SmartYieldContract, TokenContract,
};
use crate::events::Subscription;
use crate::reload::Reload;
use crate::value::ScaledValue;
use crate::wallet::{WalletChange, WalletState};

/// API pool joined with its reference metadata and live handles.
#[derive(Debug)]
pub struct PoolEntity {
    pub pool: SyPool,
    pub meta: Option<PoolMeta>,
    pub market: Option<MarketMeta>,
    pub smart_yield: SmartYieldContract,
    pub underlying: Erc20Contract,
    pub reward_pool: Option<RewardPoolContract>,
}

impl PoolEntity {
    /// Bound account's underlying balance in human units.
    pub fn underlying_balance(&self) -> Option<ScaledValue> {
        Some(
            self.underlying
                .balance()?
                .unscale_by(self.pool.underlying_decimals as i64),
        )
    }

    /// Bound account's junior token balance in human units.
    pub fn junior_balance(&self) -> Option<ScaledValue> {
        Some(
            self.smart_yield
                .balance()?
                .unscale_by(self.pool.underlying_decimals as i64),
        )
    }

    fn handles(&self) -> Vec<&crate::contracts::ContractHandle> {
        let mut handles = vec![&*self.smart_yield, &*self.underlying];
        if let Some(reward_pool) = &self.reward_pool {
            handles.push(&**reward_pool);
        }
        handles
    }
}

#[derive(Debug, Clone, Default)]
pub struct PoolsState {
    pub loading: bool,
    pub pools: Vec<Arc<PoolEntity>>,
}

/// Smart-yield pools screen: one entity per API pool, bond redemptions and
/// senior bond transfers.
pub struct PoolsProvider {
    api: Arc<dyn DashboardApi>,
    tables: Arc<ReferenceTables>,
    read_provider: Arc<dyn ChainProvider>,
    wallet: watch::Receiver<WalletState>,
    reload: Reload,
    state: watch::Sender<PoolsState>,
    subscriptions: Mutex<Vec<Subscription>>,
    bound_wallet: Mutex<Option<WalletState>>,
    tx: TxTracker,
}

impl PoolsProvider {
    pub fn new(
        api: Arc<dyn DashboardApi>,
        tables: Arc<ReferenceTables>,
        read_provider: Arc<dyn ChainProvider>,
        wallet: watch::Receiver<WalletState>,
    ) -> Self {
        let (state, _) = watch::channel(PoolsState::default());
        Self {
            api,
            tables,
            read_provider,
            wallet,
            reload: Reload::new(),
            state,
            subscriptions: Mutex::new(Vec::new()),
            bound_wallet: Mutex::new(None),
            tx: TxTracker::new(),
        }
    }

    /// Fetches pool metadata, builds the handles and runs the initial loads.
    pub async fn mount(&self) {
        self.state.send_replace(PoolsState {
            loading: true,
            pools: Vec::new(),
        });
        lock(&self.subscriptions).clear();
        *lock(&self.bound_wallet) = None;

        let pools = match self.api.fetch_sy_pools(ALL).await {
            Ok(pools) => pools,
            Err(e) => {
                warn!("Failed to fetch smart-yield pools: {}", e);
                self.state.send_modify(|state| state.loading = false);
                return;
            }
        };

        let wallet = self.wallet.borrow().clone();
        let entities: Vec<Arc<PoolEntity>> = pools
            .into_iter()
            .map(|pool| Arc::new(self.build_entity(pool, &wallet)))
            .collect();

        join_all(entities.iter().map(|entity| async move {
            settle("smartYield.loadCommon", entity.smart_yield.load_pool_common().await);
            settle("underlying.loadCommon", entity.underlying.load_common().await);
            if let Some(reward_pool) = &entity.reward_pool {
                settle("rewardPool.loadCommon", reward_pool.load_common().await);
            }
        }))
        .await;

        info!("Mounted {} smart-yield pools", entities.len());
        self.state.send_replace(PoolsState {
            loading: false,
            pools: entities,
        });
        // The wallet may have moved on while the common loads ran.
        sync_wallet(self, &self.wallet).await;
    }

    fn build_entity(&self, pool: SyPool, wallet: &WalletState) -> PoolEntity {
        let entity = PoolEntity {
            meta: self.tables.pool(&pool.underlying_symbol).cloned(),
            market: self.tables.market(&pool.protocol_id).cloned(),
            smart_yield: SmartYieldContract::new(pool.smart_yield_address),
            underlying: Erc20Contract::new(pool.underlying_address),
            reward_pool: pool.reward_pool_address.map(RewardPoolContract::new),
            pool,
        };

        let mut subscriptions = lock(&self.subscriptions);
        for handle in entity.handles() {
            bind_handle(handle, wallet, &self.read_provider);
            subscriptions.push(follow(handle, &self.reload));
        }
        entity
    }

    pub fn state(&self) -> PoolsState {
        self.state.borrow().clone()
    }

    pub fn pools(&self) -> Vec<Arc<PoolEntity>> {
        self.state.borrow().pools.clone()
    }

    pub fn pool(&self, smart_yield: Address) -> Option<Arc<PoolEntity>> {
        self.state
            .borrow()
            .pools
            .iter()
            .find(|entity| entity.pool.smart_yield_address == smart_yield)
            .cloned()
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

    pub fn tx_modal(&self) -> TxModal {
        self.tx.modal()
    }

    fn refresh_steps(entity: &PoolEntity) -> Vec<ReloadStep<'_>> {
        vec![
            reload("underlying.loadBalance", entity.underlying.load_balance()),
            reload(
                "underlying.loadAllowance",
                entity.underlying.load_allowance(entity.pool.smart_yield_address),
            ),
            reload("smartYield.loadBalance", entity.smart_yield.load_balance()),
            reload("smartYield.loadCommon", entity.smart_yield.load_pool_common()),
        ]
    }

    pub async fn redeem_bond(
        &self,
        smart_yield: Address,
        bond_id: u64,
        gas_price_gwei: u64,
    ) -> Result<H256, ActionError> {
        let contract = SmartYieldContract::new(smart_yield);
        bind_for_send(&contract, &self.wallet.borrow().clone())?;

        let entity = self.pool(smart_yield);
        let reloads = entity.as_deref().map(Self::refresh_steps).unwrap_or_default();
        self.tx
            .execute(
                TxKind::Redeem,
                &contract,
                contract.redeem_bond_send(bond_id, gas_price_gwei),
                reloads,
                Some(SENIOR_PORTFOLIO_ROUTE),
            )
            .await
    }

    pub async fn redeem_junior_bond(
        &self,
        smart_yield: Address,
        junior_bond_id: u64,
        gas_price_gwei: u64,
    ) -> Result<H256, ActionError> {
        let contract = SmartYieldContract::new(smart_yield);
        bind_for_send(&contract, &self.wallet.borrow().clone())?;

        let entity = self.pool(smart_yield);
        let reloads = entity.as_deref().map(Self::refresh_steps).unwrap_or_default();
        self.tx
            .execute(
                TxKind::RedeemJunior,
                &contract,
                contract.redeem_junior_bond_send(junior_bond_id, gas_price_gwei),
                reloads,
                Some(SENIOR_PORTFOLIO_ROUTE),
            )
            .await
    }

    /// Transfers senior bond `bond_id` from the connected account to `to`.
    pub async fn transfer_from(
        &self,
        senior_bond: Address,
        to: Address,
        bond_id: u64,
        gas_price_gwei: u64,
    ) -> Result<H256, ActionError> {
        let contract = SeniorBondContract::new(senior_bond);
        bind_for_send(&contract, &self.wallet.borrow().clone())?;

        self.tx
            .execute(
                TxKind::Transfer,
                &contract,
                contract.transfer_from_send(to, bond_id, gas_price_gwei),
                Vec::new(),
                Some(SENIOR_PORTFOLIO_ROUTE),
            )
            .await
    }
}

#[async_trait]
impl WalletFollower for PoolsProvider {
    async fn handle_wallet_change(&self, change: WalletChange, wallet: &WalletState) {
        *lock(&self.bound_wallet) = Some(wallet.clone());
        let pools = self.pools();
        for entity in &pools {
            for handle in entity.handles() {
                bind_handle(handle, wallet, &self.read_provider);
            }
        }
        if !change.account || wallet.account.is_none() {
            return;
        }

        join_all(pools.iter().map(|entity| async move {
            settle("underlying.loadBalance", entity.underlying.load_balance().await);
        }))
        .await;
    }

    fn bound_wallet(&self) -> Option<WalletState> {
        lock(&self.bound_wallet).clone()
    }
}
