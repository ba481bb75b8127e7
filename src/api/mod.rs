use async_trait::async_trait;
use ethers::types::Address;
use log::{debug, warn};
use metrics::counter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use url::Url;

pub mod smart_yield;
pub mod treasury;

pub use smart_yield::*;
pub use treasury::*;

/// Wildcard accepted by every filter parameter.
pub const ALL: &str = "all";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Empty response from {0}")]
    Empty(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMeta {
    #[serde(default)]
    pub count: u64,
}

/// `{data: T[], meta: {count}}`
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub struct PagedResponse<T> {
    #[serde(default)]
    pub data: Option<Vec<T>>,
    #[serde(default)]
    pub meta: Option<PageMeta>,
}

/// `{data: T}`
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub struct DataResponse<T> {
    #[serde(default)]
    pub data: Option<T>,
}

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> PagedResult<T> {
    pub fn empty(page: u32, page_size: u32) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page,
            page_size,
        }
    }

    /// Builds a page from the wire format, never holding more than `page_size` items.
    pub fn from_response(response: PagedResponse<T>, page: u32, page_size: u32) -> Self {
        let mut items = response.data.unwrap_or_default();
        items.truncate(page_size as usize);
        Self {
            items,
            total: response.meta.map(|meta| meta.count).unwrap_or(0),
            page,
            page_size,
        }
    }
}

/// Query string builder. Unset optional parameters are left out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query(Vec<(String, String)>);

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(page: u32, limit: u32) -> Self {
        Self::new()
            .push("page", page.to_string())
            .push("limit", limit.to_string())
    }

    pub fn push(mut self, key: &str, value: impl ToString) -> Self {
        self.0.push((key.to_string(), value.to_string()));
        self
    }

    pub fn push_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.push(key, value),
            None => self,
        }
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }
}

/// Client for the dashboard REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: Url::parse(base_url)?,
            http,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn url(&self, path: &str, query: &Query) -> Result<Url, ApiError> {
        let mut url = self.base_url.join(path)?;
        if !query.pairs().is_empty() {
            url.query_pairs_mut().extend_pairs(query.pairs());
        }
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &Query) -> Result<T, ApiError> {
        let url = self.url(path, query)?;
        debug!("GET {}", url);
        let result = async {
            self.http
                .get(url.clone())
                .send()
                .await?
                .error_for_status()?
                .json::<T>()
                .await
        }
        .await;

        result.map_err(|e| {
            counter!("api_fetch_failures_total", 1);
            warn!("GET {} failed: {}", url, e);
            ApiError::from(e)
        })
    }

    /// Fetches `{data: T}`; a missing `data` is an error.
    pub async fn fetch_data<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &Query,
    ) -> Result<T, ApiError> {
        let response: DataResponse<T> = self.get(path, query).await?;
        response.data.ok_or_else(|| ApiError::Empty(path.to_string()))
    }

    /// Fetches `{data: T[]}`; a missing `data` is an empty list.
    pub async fn fetch_list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &Query,
    ) -> Result<Vec<T>, ApiError> {
        let response: DataResponse<Vec<T>> = self.get(path, query).await?;
        Ok(response.data.unwrap_or_default())
    }

    /// Fetches one page; `page` and `limit` are appended to `filters`.
    pub async fn fetch_paged<T: DeserializeOwned>(
        &self,
        path: &str,
        page: u32,
        page_size: u32,
        filters: Query,
    ) -> Result<PagedResult<T>, ApiError> {
        let mut query = Query::page(page, page_size);
        query.0.extend(filters.0);
        let response: PagedResponse<T> = self.get(path, &query).await?;
        Ok(PagedResult::from_response(response, page, page_size))
    }
}

/// REST reads the providers depend on.
#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn fetch_sy_pools(&self, originator: &str) -> Result<Vec<SyPool>, ApiError>;

    async fn fetch_sy_reward_pools(
        &self,
        originator: &str,
        underlying_symbol: &str,
    ) -> Result<Vec<SyRewardPool>, ApiError>;

    async fn fetch_treasury_tokens(&self, treasury: Address) -> Result<Vec<TreasuryToken>, ApiError>;

    async fn fetch_treasury_history(
        &self,
        treasury: Address,
        page: u32,
        page_size: u32,
    ) -> Result<PagedResult<TreasuryHistory>, ApiError>;

    async fn fetch_sy_user_history(
        &self,
        user: Address,
        page: u32,
        page_size: u32,
        filters: HistoryFilters,
    ) -> Result<PagedResult<SyUserTxHistory>, ApiError>;
}

#[async_trait]
impl DashboardApi for ApiClient {
    async fn fetch_sy_pools(&self, originator: &str) -> Result<Vec<SyPool>, ApiError> {
        self.sy_pools(originator).await
    }

    async fn fetch_sy_reward_pools(
        &self,
        originator: &str,
        underlying_symbol: &str,
    ) -> Result<Vec<SyRewardPool>, ApiError> {
        self.sy_reward_pools(originator, underlying_symbol).await
    }

    async fn fetch_treasury_tokens(&self, treasury: Address) -> Result<Vec<TreasuryToken>, ApiError> {
        self.treasury_tokens(treasury).await
    }

    async fn fetch_treasury_history(
        &self,
        treasury: Address,
        page: u32,
        page_size: u32,
    ) -> Result<PagedResult<TreasuryHistory>, ApiError> {
        self.treasury_history(treasury, page, page_size).await
    }

    async fn fetch_sy_user_history(
        &self,
        user: Address,
        page: u32,
        page_size: u32,
        filters: HistoryFilters,
    ) -> Result<PagedResult<SyUserTxHistory>, ApiError> {
        self.sy_user_history(user, page, page_size, filters).await
    }
}

/// Deserializes an address that the API may send as `""` or `null`.
pub fn optional_address<'de, D>(deserializer: D) -> Result<Option<Address>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
