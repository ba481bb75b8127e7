use async_trait::async_trait;
use chrono::Utc;
use ethers::types::{Address, H256};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use super::{
    bind_for_send, bind_handle, follow, lock, reload, settle, sync_wallet, ActionError, TxKind,
    TxTracker, WalletFollower,
};
use crate::chain::ChainProvider;
use crate::contracts::{
    ContractHandle, DaoBarnContract, DaoRewardContract, Erc20Contract, TokenContract,
};
use crate::events::Subscription;
use crate::reload::Reload;
use crate::value::ScaledValue;
use crate::wallet::{WalletChange, WalletState};

const BOND_DECIMALS: i64 = 18;

fn now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Governance overview: voting power, lock, multiplier and claimable reward.
pub struct DaoProvider {
    read_provider: Arc<dyn ChainProvider>,
    wallet: watch::Receiver<WalletState>,
    barn: DaoBarnContract,
    reward: DaoRewardContract,
    bond: Erc20Contract,
    reload: Reload,
    subscriptions: Mutex<Vec<Subscription>>,
    bound_wallet: Mutex<Option<WalletState>>,
    tx: TxTracker,
}

impl DaoProvider {
    pub fn new(
        read_provider: Arc<dyn ChainProvider>,
        wallet: watch::Receiver<WalletState>,
        barn: Address,
        reward: Address,
        bond: Address,
    ) -> Self {
        Self {
            read_provider,
            wallet,
            barn: DaoBarnContract::new(barn),
            reward: DaoRewardContract::new(reward),
            bond: Erc20Contract::new(bond),
            reload: Reload::new(),
            subscriptions: Mutex::new(Vec::new()),
            bound_wallet: Mutex::new(None),
            tx: TxTracker::new(),
        }
    }

    fn handles(&self) -> [&ContractHandle; 3] {
        [&*self.barn, &*self.reward, &*self.bond]
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
        settle("bond.loadCommon", self.bond.load_common().await);
        settle("daoBarn.loadCommon", self.barn.load_common().await);
        sync_wallet(self, &self.wallet).await;
    }

    async fn load_account_data(&self) {
        settle("daoBarn.loadUserData", self.barn.load_user_data(now()).await);
        settle("daoReward.loadClaim", self.reward.load_claim().await);
        settle("bond.loadBalance", self.bond.load_balance().await);
    }

    pub fn voting_power(&self) -> Option<ScaledValue> {
        Some(self.barn.voting_power()?.unscale_by(BOND_DECIMALS))
    }

    pub fn staked_balance(&self) -> Option<ScaledValue> {
        Some(self.barn.balance()?.unscale_by(BOND_DECIMALS))
    }

    pub fn bond_balance(&self) -> Option<ScaledValue> {
        let decimals = self.bond.decimals().unwrap_or(BOND_DECIMALS as u64);
        Some(self.bond.balance()?.unscale_by(decimals as i64))
    }

    pub fn claim_value(&self) -> Option<ScaledValue> {
        Some(self.reward.claim_value()?.unscale_by(BOND_DECIMALS))
    }

    pub fn user_locked_until(&self) -> Option<u64> {
        self.barn.user_locked_until()
    }

    /// Seconds left on the lock; zero once expired or when unknown.
    pub fn lock_remaining(&self, now: u64) -> u64 {
        self.user_locked_until()
            .map(|until| until.saturating_sub(now))
            .unwrap_or(0)
    }

    /// Lock multiplier; an unknown multiplier counts as 1.
    pub fn multiplier(&self) -> ScaledValue {
        self.barn.multiplier().unwrap_or_else(|| ScaledValue::from(1u64))
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

    /// Refreshes the lock state once the lock timer runs out.
    pub async fn reload_barn(&self) {
        if self.wallet.borrow().account.is_some() {
            settle("daoBarn.loadUserData", self.barn.load_user_data(now()).await);
        }
    }

    /// Claims the governance reward, then refreshes the reward and bond balance.
    pub async fn claim(&self, gas_price_gwei: u64) -> Result<H256, ActionError> {
        let contract = DaoRewardContract::new(self.reward.address());
        bind_for_send(&contract, &self.wallet.borrow().clone())?;

        let reloads = vec![
            reload("daoReward.loadClaim", self.reward.load_claim()),
            reload("bond.loadBalance", self.bond.load_balance()),
        ];
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
impl WalletFollower for DaoProvider {
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
