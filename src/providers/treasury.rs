use ethers::types::Address;
use futures::future::join_all;
use futures::FutureExt;
use log::{info, warn};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use super::{follow, lock, settle};
use crate::api::{DashboardApi, TreasuryHistory, TreasuryToken};
use crate::chain::ChainProvider;
use crate::contracts::{Erc20Contract, TokenContract};
use crate::events::Subscription;
use crate::paging::{PageFetcher, PageRequest, PageState, PagedFetch};
use crate::reload::Reload;
use crate::value::ScaledValue;

/// Treasury token joined with a handle reading the treasury's balance.
#[derive(Debug)]
pub struct TreasuryTokenEntity {
    pub token: TreasuryToken,
    pub contract: Erc20Contract,
}

impl TreasuryTokenEntity {
    pub fn holdings(&self, treasury: &Address) -> Option<ScaledValue> {
        Some(
            self.contract
                .balance_of(treasury)?
                .unscale_by(self.token.token_decimals as i64),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct TreasuryTokensState {
    pub loading: bool,
    pub items: Vec<Arc<TreasuryTokenEntity>>,
}

/// Treasury holdings and paged transfer history of the governance contract.
///
/// Reads are account-independent, so the provider never follows the wallet.
pub struct TreasuryProvider {
    api: Arc<dyn DashboardApi>,
    read_provider: Arc<dyn ChainProvider>,
    treasury: Address,
    reload: Reload,
    tokens: watch::Sender<TreasuryTokensState>,
    history: PagedFetch<TreasuryHistory, ()>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl TreasuryProvider {
    pub fn new(
        api: Arc<dyn DashboardApi>,
        read_provider: Arc<dyn ChainProvider>,
        treasury: Address,
        page_size: u32,
    ) -> Self {
        let fetcher_api = api.clone();
        let fetcher: PageFetcher<TreasuryHistory, ()> = Arc::new(move |request: PageRequest<()>| {
            let api = fetcher_api.clone();
            async move {
                api.fetch_treasury_history(treasury, request.page, request.page_size)
                    .await
            }
            .boxed()
        });
        let (tokens, _) = watch::channel(TreasuryTokensState::default());

        Self {
            api,
            read_provider,
            treasury,
            reload: Reload::new(),
            tokens,
            history: PagedFetch::new("treasury history", page_size, (), fetcher),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn treasury(&self) -> Address {
        self.treasury
    }

    /// Loads token holdings and the first history page concurrently.
    pub async fn mount(&self) {
        futures::join!(self.load_tokens(), self.history.refresh());
    }

    async fn load_tokens(&self) {
        self.tokens.send_modify(|state| state.loading = true);
        lock(&self.subscriptions).clear();

        let tokens = match self.api.fetch_treasury_tokens(self.treasury).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("Failed to fetch treasury tokens: {}", e);
                self.tokens.send_replace(TreasuryTokensState::default());
                return;
            }
        };

        let items: Vec<Arc<TreasuryTokenEntity>> = {
            let mut subscriptions = lock(&self.subscriptions);
            tokens
                .into_iter()
                .map(|token| {
                    let contract = Erc20Contract::new(token.token_address);
                    contract.set_provider(Some(self.read_provider.clone()));
                    subscriptions.push(follow(&contract, &self.reload));
                    Arc::new(TreasuryTokenEntity { token, contract })
                })
                .collect()
        };
        self.tokens.send_replace(TreasuryTokensState {
            loading: false,
            items: items.clone(),
        });

        let treasury = self.treasury;
        join_all(items.iter().map(|entity| async move {
            settle(
                "treasuryToken.loadBalance",
                entity.contract.load_balance_of(treasury).await,
            );
        }))
        .await;
        info!("Loaded {} treasury tokens", items.len());
    }

    pub fn tokens(&self) -> TreasuryTokensState {
        self.tokens.borrow().clone()
    }

    /// Sum of all holdings in human units; unknown balances count as zero.
    pub fn total_holdings(&self) -> ScaledValue {
        self.tokens
            .borrow()
            .items
            .iter()
            .fold(ScaledValue::zero(), |total, entity| {
                total.plus(&entity.holdings(&self.treasury).unwrap_or_default())
            })
    }

    pub fn history(&self) -> PageState<TreasuryHistory, ()> {
        self.history.state()
    }

    pub fn subscribe_history(&self) -> watch::Receiver<PageState<TreasuryHistory, ()>> {
        self.history.subscribe()
    }

    pub async fn set_history_page(&self, page: u32) -> bool {
        self.history.set_page(page).await
    }

    pub fn reload_version(&self) -> u64 {
        self.reload.version()
    }

    pub fn subscribe_reload(&self) -> watch::Receiver<u64> {
        self.reload.subscribe()
    }
}
