use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use futures::future::join_all;
use log::info;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use super::{
    bind_for_send, bind_handle, follow, lock, reload, settle, sync_wallet, to_base_units, ActionError,
    TxKind, TxTracker, WalletFollower,
};
use crate::chain::ChainProvider;
use crate::config::reference::YfPoolConfig;
use crate::contracts::{
    ContractHandle, Erc20Contract, TokenContract, YfPoolContract, YfStakingContract,
};
use crate::events::Subscription;
use crate::reload::Reload;
use crate::value::ScaledValue;
use crate::wallet::{WalletChange, WalletState};

/// Farming pool and the handles of the tokens it accepts.
#[derive(Debug)]
pub struct YfPoolEntity {
    pub config: YfPoolConfig,
    pub contract: YfPoolContract,
}

/// Yield-farming screen: shared staking vault, per-pool reward handles and
/// one handle per stakeable token.
pub struct YieldFarmingProvider {
    read_provider: Arc<dyn ChainProvider>,
    wallet: watch::Receiver<WalletState>,
    staking: YfStakingContract,
    pools: Vec<YfPoolEntity>,
    tokens: HashMap<Address, Erc20Contract>,
    reload: Reload,
    subscriptions: Mutex<Vec<Subscription>>,
    bound_wallet: Mutex<Option<WalletState>>,
    tx: TxTracker,
}

impl YieldFarmingProvider {
    pub fn new(
        read_provider: Arc<dyn ChainProvider>,
        wallet: watch::Receiver<WalletState>,
        staking: Address,
        pools: Vec<YfPoolConfig>,
    ) -> Self {
        let tokens = pools
            .iter()
            .flat_map(|pool| pool.tokens.iter().copied())
            .map(|token| (token, Erc20Contract::new(token)))
            .collect();
        let pools = pools
            .into_iter()
            .map(|config| YfPoolEntity {
                contract: YfPoolContract::new(config.address),
                config,
            })
            .collect();

        Self {
            read_provider,
            wallet,
            staking: YfStakingContract::new(staking),
            pools,
            tokens,
            reload: Reload::new(),
            subscriptions: Mutex::new(Vec::new()),
            bound_wallet: Mutex::new(None),
            tx: TxTracker::new(),
        }
    }

    fn handles(&self) -> Vec<&ContractHandle> {
        let mut handles: Vec<&ContractHandle> = vec![&*self.staking];
        handles.extend(self.pools.iter().map(|pool| &*pool.contract));
        handles.extend(self.tokens.values().map(|token| &**token));
        handles
    }

    pub async fn mount(&self) {
        *lock(&self.bound_wallet) = None;
        let wallet = self.wallet.borrow().clone();
        {
            let mut subscriptions = lock(&self.subscriptions);
            subscriptions.clear();
            for handle in self.handles() {
                bind_handle(handle, &wallet, &self.read_provider);
                subscriptions.push(follow(handle, &self.reload));
            }
        }

        settle("yfStaking.loadCurrentEpoch", self.staking.load_current_epoch().await);
        join_all(self.pools.iter().map(|pool| async move {
            settle("yfPool.loadCommon", pool.contract.load_common().await);
        }))
        .await;
        for (address, token) in &self.tokens {
            settle("token.loadCommon", token.load_common().await);
            settle("yfStaking.loadCommonFor", self.staking.load_common_for(*address).await);
        }
        info!("Mounted {} yield-farming pools", self.pools.len());
        sync_wallet(self, &self.wallet).await;
    }

    async fn load_account_data(&self) {
        for (address, token) in &self.tokens {
            settle("token.loadBalance", token.load_balance().await);
            settle(
                "token.loadAllowance",
                token.load_allowance(self.staking.address()).await,
            );
            settle(
                "yfStaking.loadUserDataFor",
                self.staking.load_user_data_for(*address).await,
            );
        }
        for pool in &self.pools {
            settle("yfPool.loadUserData", pool.contract.load_user_data().await);
        }
    }

    pub fn pools(&self) -> &[YfPoolEntity] {
        &self.pools
    }

    pub fn staking(&self) -> &YfStakingContract {
        &self.staking
    }

    pub fn token(&self, address: &Address) -> Option<&Erc20Contract> {
        self.tokens.get(address)
    }

    fn pool_for_token(&self, token: &Address) -> Option<&YfPoolEntity> {
        self.pools.iter().find(|pool| pool.config.tokens.contains(token))
    }

    /// Rewards claimable across all pools; absent when there are no pools.
    pub fn total_to_claim(&self) -> Option<ScaledValue> {
        self.pools.iter().fold(None, |sum: Option<ScaledValue>, pool| {
            Some(
                sum.unwrap_or_default()
                    .plus(&pool.contract.to_claim().unwrap_or_default()),
            )
        })
    }

    /// Potential reward of the running pools only.
    pub fn total_potential_reward(&self) -> Option<ScaledValue> {
        self.pools
            .iter()
            .filter(|pool| pool.contract.is_pool_ended() == Some(false))
            .fold(None, |sum: Option<ScaledValue>, pool| {
                Some(
                    sum.unwrap_or_default()
                        .plus(&pool.contract.potential_reward().unwrap_or_default()),
                )
            })
    }

    /// Wallet balance of `token` that the staking vault may pull, human units.
    pub fn max_stake(&self, token: &Address) -> Option<ScaledValue> {
        let contract = self.tokens.get(token)?;
        let decimals = contract.decimals()? as i64;
        let balance = contract.balance().unwrap_or_default();
        let allowance = contract
            .allowance_of(&self.staking.address())
            .unwrap_or_default();
        Some(std::cmp::min(balance, allowance).unscale_by(decimals))
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

    fn prepare(
        &self,
        token: &Address,
        amount: &ScaledValue,
    ) -> Result<(&Erc20Contract, U256), ActionError> {
        let contract = self
            .tokens
            .get(token)
            .ok_or_else(|| ActionError::Unknown(format!("token {:?}", token)))?;
        let decimals = contract
            .decimals()
            .ok_or_else(|| ActionError::Unknown(format!("decimals of {:?}", token)))?;
        Ok((contract, to_base_units(amount, decimals)?))
    }

    /// Stakes `amount` (human units) of `token`, then reloads the staking
    /// vault, the token balance and the owning pool in that order.
    pub async fn stake(
        &self,
        token: Address,
        amount: &ScaledValue,
        gas_price_gwei: u64,
    ) -> Result<H256, ActionError> {
        let (token_contract, raw) = self.prepare(&token, amount)?;
        let contract = YfStakingContract::new(self.staking.address());
        bind_for_send(&contract, &self.wallet.borrow().clone())?;

        let mut reloads = vec![
            reload("yfStaking.loadCommonFor", self.staking.load_common_for(token)),
            reload("yfStaking.loadUserDataFor", self.staking.load_user_data_for(token)),
            reload("token.loadBalance", token_contract.load_balance()),
        ];
        if let Some(pool) = self.pool_for_token(&token) {
            reloads.push(reload("yfPool.loadCommon", pool.contract.load_common()));
            reloads.push(reload("yfPool.loadUserData", pool.contract.load_user_data()));
        }

        self.tx
            .execute(
                TxKind::Stake,
                &contract,
                contract.deposit_send(token, raw, gas_price_gwei),
                reloads,
                None,
            )
            .await
    }

    pub async fn unstake(
        &self,
        token: Address,
        amount: &ScaledValue,
        gas_price_gwei: u64,
    ) -> Result<H256, ActionError> {
        let (token_contract, raw) = self.prepare(&token, amount)?;
        let contract = YfStakingContract::new(self.staking.address());
        bind_for_send(&contract, &self.wallet.borrow().clone())?;

        let mut reloads = vec![
            reload("yfStaking.loadCommonFor", self.staking.load_common_for(token)),
            reload("yfStaking.loadUserDataFor", self.staking.load_user_data_for(token)),
            reload("token.loadBalance", token_contract.load_balance()),
        ];
        if let Some(pool) = self.pool_for_token(&token) {
            reloads.push(reload("yfPool.loadCommon", pool.contract.load_common()));
            reloads.push(reload("yfPool.loadUserData", pool.contract.load_user_data()));
        }

        self.tx
            .execute(
                TxKind::Unstake,
                &contract,
                contract.withdraw_send(token, raw, gas_price_gwei),
                reloads,
                None,
            )
            .await
    }

    /// Harvests every pending epoch of `pool`.
    pub async fn harvest(&self, pool: Address, gas_price_gwei: u64) -> Result<H256, ActionError> {
        let entity = self
            .pools
            .iter()
            .find(|entity| entity.config.address == pool)
            .ok_or_else(|| ActionError::Unknown(format!("pool {:?}", pool)))?;
        let contract = YfPoolContract::new(pool);
        bind_for_send(&contract, &self.wallet.borrow().clone())?;

        let reloads = vec![reload("yfPool.loadUserData", entity.contract.load_user_data())];
        self.tx
            .execute(
                TxKind::Harvest,
                &contract,
                contract.mass_harvest_send(gas_price_gwei),
                reloads,
                None,
            )
            .await
    }
}

#[async_trait]
impl WalletFollower for YieldFarmingProvider {
    async fn handle_wallet_change(&self, change: WalletChange, wallet: &WalletState) {
        *lock(&self.bound_wallet) = Some(wallet.clone());
        for handle in self.handles() {
            bind_handle(handle, wallet, &self.read_provider);
        }
        if change.account && wallet.account.is_some() {
            self.load_account_data().await;
        }
    }

    fn bound_wallet(&self) -> Option<WalletState> {
        lock(&self.bound_wallet).clone()
    }
}
