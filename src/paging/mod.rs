use futures::future::BoxFuture;
use log::{debug, warn};
use metrics::counter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::api::{ApiError, PagedResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    Idle,
    Loading,
    Loaded,
    Failed,
}

/// Parameters of one page request.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest<F> {
    pub page: u32,
    pub page_size: u32,
    pub filters: F,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageState<T, F> {
    pub status: PageStatus,
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub filters: F,
    pub loading: bool,
}

pub type PageFetcher<T, F> =
    Arc<dyn Fn(PageRequest<F>) -> BoxFuture<'static, Result<PagedResult<T>, ApiError>> + Send + Sync>;

/// Page/filter state of one REST list endpoint.
///
/// Every request takes a generation number; a response is applied only if
/// no newer request was issued meanwhile. A failed request empties the
/// page instead of surfacing the error.
pub struct PagedFetch<T, F> {
    name: String,
    fetcher: PageFetcher<T, F>,
    state: watch::Sender<PageState<T, F>>,
    generation: AtomicU64,
}

impl<T, F> PagedFetch<T, F>
where
    T: Clone + Send + Sync + 'static,
    F: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, page_size: u32, filters: F, fetcher: PageFetcher<T, F>) -> Self {
        let (state, _) = watch::channel(PageState {
            status: PageStatus::Idle,
            items: Vec::new(),
            total: 0,
            page: 1,
            page_size,
            filters,
            loading: false,
        });
        Self {
            name: name.into(),
            fetcher,
            state,
            generation: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> PageState<T, F> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PageState<T, F>> {
        self.state.subscribe()
    }

    /// Re-requests the current page.
    pub async fn refresh(&self) -> bool {
        self.fetch().await
    }

    pub async fn set_page(&self, page: u32) -> bool {
        self.state.send_modify(|state| state.page = page.max(1));
        self.fetch().await
    }

    /// Changing the page size starts over from page 1.
    pub async fn set_page_size(&self, page_size: u32) -> bool {
        self.state.send_modify(|state| {
            state.page_size = page_size.max(1);
            state.page = 1;
        });
        self.fetch().await
    }

    /// Changing filters starts over from page 1.
    pub async fn set_filters(&self, filters: F) -> bool {
        self.state.send_modify(|state| {
            if state.filters != filters {
                state.page = 1;
            }
            state.filters = filters;
        });
        self.fetch().await
    }

    /// Returns whether the response was applied.
    async fn fetch(&self) -> bool {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut request = None;
        self.state.send_modify(|state| {
            state.status = PageStatus::Loading;
            state.loading = true;
            request = Some(PageRequest {
                page: state.page,
                page_size: state.page_size,
                filters: state.filters.clone(),
            });
        });
        let request = match request {
            Some(request) => request,
            None => return false,
        };

        let page = request.page;
        let result = (self.fetcher)(request).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            counter!("paged_stale_responses_total", 1);
            debug!("{}: discarding stale page {} (generation {})", self.name, page, generation);
            return false;
        }

        self.state.send_modify(|state| match result {
            Ok(result) => {
                state.status = PageStatus::Loaded;
                state.items = result.items;
                state.items.truncate(state.page_size as usize);
                state.total = result.total;
                state.loading = false;
            }
            Err(e) => {
                counter!("paged_fetch_failures_total", 1);
                warn!("{}: page {} failed: {}", self.name, page, e);
                state.status = PageStatus::Failed;
                state.items.clear();
                state.total = 0;
                state.loading = false;
            }
        });
        true
    }
}

impl<T, F> std::fmt::Debug for PagedFetch<T, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("PagedFetch")
            .field("name", &self.name)
            .field("status", &state.status)
            .field("page", &state.page)
            .field("total", &state.total)
            .finish()
    }
}
