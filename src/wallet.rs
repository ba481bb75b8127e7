use ethers::types::Address;
use log::info;
use std::sync::Arc;
use tokio::sync::watch;

use crate::chain::ChainProvider;

/// Current wallet connection. `provider` and `account` change independently.
#[derive(Clone, Default)]
pub struct WalletState {
    pub provider: Option<Arc<dyn ChainProvider>>,
    pub account: Option<Address>,
}

impl WalletState {
    pub fn is_connected(&self) -> bool {
        self.provider.is_some() && self.account.is_some()
    }

    /// What changed going from `previous` to `self`.
    pub fn diff(&self, previous: &WalletState) -> WalletChange {
        WalletChange {
            provider: !same_provider(&self.provider, &previous.provider),
            account: self.account != previous.account,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WalletChange {
    pub provider: bool,
    pub account: bool,
}

impl WalletChange {
    /// Everything changed; used for the first state a provider sees.
    pub fn all() -> Self {
        Self {
            provider: true,
            account: true,
        }
    }

    pub fn any(&self) -> bool {
        self.provider || self.account
    }
}

impl std::fmt::Debug for WalletState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletState")
            .field("provider", &self.provider.is_some())
            .field("account", &self.account)
            .finish()
    }
}

fn same_provider(a: &Option<Arc<dyn ChainProvider>>, b: &Option<Arc<dyn ChainProvider>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

/// Publishes wallet changes to every mounted provider.
pub struct Wallet {
    tx: watch::Sender<WalletState>,
}

impl Wallet {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(WalletState::default());
        Self { tx }
    }

    pub fn connect(&self, provider: Arc<dyn ChainProvider>, account: Option<Address>) {
        info!("Wallet connected: {:?}", account);
        self.tx.send_replace(WalletState {
            provider: Some(provider),
            account,
        });
    }

    pub fn disconnect(&self) {
        info!("Wallet disconnected");
        self.tx.send_replace(WalletState::default());
    }

    /// Notifies only when the account actually changes.
    pub fn set_account(&self, account: Option<Address>) -> bool {
        self.tx.send_if_modified(|state| {
            if state.account == account {
                return false;
            }
            info!("Account changed: {:?} -> {:?}", state.account, account);
            state.account = account;
            true
        })
    }

    pub fn set_provider(&self, provider: Option<Arc<dyn ChainProvider>>) -> bool {
        self.tx.send_if_modified(|state| {
            if same_provider(&state.provider, &provider) {
                return false;
            }
            state.provider = provider;
            true
        })
    }

    pub fn state(&self) -> WalletState {
        self.tx.borrow().clone()
    }

    pub fn account(&self) -> Option<Address> {
        self.tx.borrow().account
    }

    pub fn subscribe(&self) -> watch::Receiver<WalletState> {
        self.tx.subscribe()
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}
