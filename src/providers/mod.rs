use async_trait::async_trait;
use ethers::types::{H256, U256};
use futures::future::BoxFuture;
use futures::FutureExt;
use log::{info, warn};
use metrics::counter;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

use crate::chain::ChainProvider;
use crate::contracts::{ContractError, ContractEvent, ContractHandle};
use crate::events::Subscription;
use crate::reload::Reload;
use crate::value::ScaledValue;
use crate::wallet::{WalletChange, WalletState};

pub mod dao;
pub mod pools;
pub mod reward_pool;
pub mod treasury;
pub mod yield_farming;

pub use dao::DaoProvider;
pub use pools::{PoolEntity, PoolsProvider};
pub use reward_pool::{RewardPoolEntity, RewardPoolProvider};
pub use treasury::{TreasuryProvider, TreasuryTokenEntity};
pub use yield_farming::{YfPoolEntity, YieldFarmingProvider};

/// Route opened after a confirmed senior bond action.
pub const SENIOR_PORTFOLIO_ROUTE: &str = "/smart-yield/portfolio/senior";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    Redeem,
    RedeemJunior,
    Transfer,
    Stake,
    Unstake,
    Claim,
    Harvest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Progress,
    Success,
    Failure,
}

/// Transaction status shown to the user while an action runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxModal {
    pub visible: bool,
    pub kind: Option<TxKind>,
    pub state: Option<TxState>,
    pub tx_hash: Option<H256>,
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Another transaction is still pending")]
    Busy,
    #[error("No wallet connected")]
    NoWallet,
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Unknown entity: {0}")]
    Unknown(String),
    #[error(transparent)]
    Contract(#[from] ContractError),
}

/// One awaited step of a post-transaction reload chain.
pub struct ReloadStep<'a> {
    label: &'static str,
    future: BoxFuture<'a, Result<(), ContractError>>,
}

/// Wraps a load into a reload step; its value is dropped, only failures are logged.
pub fn reload<'a, T, Fut>(label: &'static str, future: Fut) -> ReloadStep<'a>
where
    Fut: Future<Output = Result<T, ContractError>> + Send + 'a,
{
    ReloadStep {
        label,
        future: future.map(|result| result.map(|_| ())).boxed(),
    }
}

struct PendingGuard<'a>(&'a AtomicBool);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives the transaction modal of one provider.
///
/// Only one action runs at a time; a second call while one is pending is
/// rejected with [`ActionError::Busy`].
pub struct TxTracker {
    modal: Arc<watch::Sender<TxModal>>,
    pending: AtomicBool,
    success_route: Mutex<Option<&'static str>>,
    navigation: watch::Sender<Option<String>>,
}

impl TxTracker {
    pub fn new() -> Self {
        let (modal, _) = watch::channel(TxModal::default());
        let (navigation, _) = watch::channel(None);
        Self {
            modal: Arc::new(modal),
            pending: AtomicBool::new(false),
            success_route: Mutex::new(None),
            navigation,
        }
    }

    pub fn modal(&self) -> TxModal {
        self.modal.borrow().clone()
    }

    pub fn subscribe_modal(&self) -> watch::Receiver<TxModal> {
        self.modal.subscribe()
    }

    /// Route requested after the user acknowledged a successful transaction.
    pub fn subscribe_navigation(&self) -> watch::Receiver<Option<String>> {
        self.navigation.subscribe()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Subscribes the modal to `handle`'s transaction events, awaits
    /// `submit`, then runs `reloads` one after another.
    pub async fn execute<'a, Fut>(
        &self,
        kind: TxKind,
        handle: &ContractHandle,
        submit: Fut,
        reloads: Vec<ReloadStep<'a>>,
        success_route: Option<&'static str>,
    ) -> Result<H256, ActionError>
    where
        Fut: Future<Output = Result<H256, ContractError>>,
    {
        if self
            .pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("{:?} rejected: a transaction is already pending", kind);
            return Err(ActionError::Busy);
        }
        let _pending = PendingGuard(&self.pending);
        *self
            .success_route
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = success_route;

        let modal = self.modal.clone();
        let _subscription = handle.subscribe(move |event| match event {
            ContractEvent::TxHash(tx_hash) => {
                let tx_hash = *tx_hash;
                modal.send_replace(TxModal {
                    visible: true,
                    kind: Some(kind),
                    state: Some(TxState::Progress),
                    tx_hash: Some(tx_hash),
                });
            }
            ContractEvent::TxSuccess(_) => {
                modal.send_modify(|modal| modal.state = Some(TxState::Success));
            }
            ContractEvent::TxFail { .. } => {
                modal.send_modify(|modal| {
                    modal.visible = true;
                    modal.kind = Some(kind);
                    modal.state = Some(TxState::Failure);
                });
            }
            ContractEvent::UpdateData => {}
        });

        let tx_hash = submit.await?;
        info!("{:?} confirmed: {:?}", kind, tx_hash);
        counter!("actions_total", 1, "kind" => format!("{:?}", kind));

        for step in reloads {
            if let Err(e) = step.future.await {
                warn!("{:?}: reload {} failed: {}", kind, step.label, e);
            }
        }
        Ok(tx_hash)
    }

    /// Closes the modal without navigating.
    pub fn dismiss(&self) {
        self.modal.send_replace(TxModal::default());
    }

    /// Closes a successful modal and requests the action's follow-up route.
    pub fn acknowledge_success(&self) {
        if self.modal.borrow().state != Some(TxState::Success) {
            return;
        }
        self.dismiss();
        let route = self
            .success_route
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(route) = route {
            self.navigation.send_replace(Some(route.to_string()));
        }
    }
}

impl Default for TxTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// A provider that rebinds its handles when the wallet changes.
#[async_trait]
pub trait WalletFollower: Send + Sync {
    async fn handle_wallet_change(&self, change: WalletChange, wallet: &WalletState);

    /// Wallet the provider's handles were last bound to; `None` until mounted.
    fn bound_wallet(&self) -> Option<WalletState>;
}

/// Feeds every wallet change to `provider` until the wallet is dropped.
///
/// Changes are diffed against what the provider is actually bound to, so a
/// change made before the follower starts, or while the provider was still
/// mounting, is reconciled on the first pass.
pub async fn follow_wallet<P>(
    provider: Arc<P>,
    mut wallet: watch::Receiver<WalletState>,
) -> anyhow::Result<()>
where
    P: WalletFollower + ?Sized,
{
    loop {
        let current = wallet.borrow_and_update().clone();
        if let Some(bound) = provider.bound_wallet() {
            let change = current.diff(&bound);
            if change.any() {
                provider.handle_wallet_change(change, &current).await;
            }
        }
        if wallet.changed().await.is_err() {
            break;
        }
    }
    Ok(())
}

/// Rebinds `provider` until it is bound to the latest wallet state.
pub(crate) async fn sync_wallet<P>(provider: &P, wallet: &watch::Receiver<WalletState>)
where
    P: WalletFollower + ?Sized,
{
    loop {
        let current = wallet.borrow().clone();
        let change = match provider.bound_wallet() {
            Some(bound) => current.diff(&bound),
            None => WalletChange::all(),
        };
        if !change.any() {
            return;
        }
        provider.handle_wallet_change(change, &current).await;
    }
}

/// Binds `handle` to the wallet, falling back to the read-only node when
/// no wallet provider is connected.
pub(crate) fn bind_handle(
    handle: &ContractHandle,
    wallet: &WalletState,
    fallback: &Arc<dyn ChainProvider>,
) {
    handle.set_provider(Some(wallet.provider.clone().unwrap_or_else(|| fallback.clone())));
    handle.set_account(wallet.account);
}

/// Handle bound for sending: requires a connected wallet.
pub(crate) fn bind_for_send(handle: &ContractHandle, wallet: &WalletState) -> Result<(), ActionError> {
    let provider = wallet.provider.clone().ok_or(ActionError::NoWallet)?;
    let account = wallet.account.ok_or(ActionError::NoWallet)?;
    handle.set_provider(Some(provider));
    handle.set_account(Some(account));
    Ok(())
}

/// Forwards `handle`'s data updates to `reload`.
pub(crate) fn follow(handle: &ContractHandle, reload: &Reload) -> Subscription {
    let reload = reload.clone();
    handle.subscribe(move |event| {
        if *event == ContractEvent::UpdateData {
            reload.trigger();
        }
    })
}

/// Logs a failed load; failures only leave the cached field absent.
pub(crate) fn settle<T>(label: &str, result: Result<T, ContractError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{} failed: {}", label, e);
            None
        }
    }
}

/// Converts a human amount into base units, rejecting zero and negatives.
pub(crate) fn to_base_units(amount: &ScaledValue, decimals: u64) -> Result<U256, ActionError> {
    if !amount.is_positive() {
        return Err(ActionError::InvalidAmount(amount.to_string()));
    }
    amount
        .scale_by(decimals as i64)
        .to_u256()
        .ok_or_else(|| ActionError::InvalidAmount(amount.to_string()))
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
