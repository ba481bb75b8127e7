use chrono::{DateTime, Utc};
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};

use super::{optional_address, ApiClient, ApiError, PagedResult, Query, ALL};
use crate::value::ScaledValue;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyPoolState {
    pub block_number: u64,
    pub block_timestamp: String,
    pub senior_liquidity: ScaledValue,
    pub junior_liquidity: ScaledValue,
    pub j_token_price: ScaledValue,
    pub senior_apy: f64,
    pub junior_apy: f64,
    pub originator_apy: f64,
    pub originator_net_apy: f64,
    pub avg_senior_maturity_days: f64,
    pub number_of_seniors: u64,
    pub number_of_juniors: u64,
    pub junior_liquidity_locked: ScaledValue,
}

/// Smart-yield pool metadata as served by the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyPool {
    pub protocol_id: String,
    pub controller_address: Address,
    pub model_address: Address,
    pub provider_address: Address,
    pub smart_yield_address: Address,
    pub oracle_address: Address,
    pub junior_bond_address: Address,
    pub senior_bond_address: Address,
    #[serde(rename = "cTokenAddress")]
    pub c_token_address: Address,
    pub underlying_address: Address,
    pub underlying_symbol: String,
    pub underlying_decimals: u32,
    #[serde(default, deserialize_with = "optional_address")]
    pub reward_pool_address: Option<Address>,
    #[serde(default)]
    pub state: SyPoolState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyPoolApy {
    pub point: DateTime<Utc>,
    pub senior_apy: f64,
    pub junior_apy: f64,
    pub originator_net_apy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyPoolLiquidity {
    pub point: DateTime<Utc>,
    pub senior_liquidity: ScaledValue,
    pub junior_liquidity: ScaledValue,
}

/// Transaction categories reported by the smart-yield history endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryType {
    JuniorDeposit,
    JuniorInstantWithdraw,
    JuniorRegularWithdraw,
    JuniorRedeem,
    SeniorDeposit,
    SeniorRedeem,
    JtokenSend,
    JtokenReceive,
    JbondSend,
    JbondReceive,
    SbondSend,
    SbondReceive,
    JuniorStake,
    JuniorUnstake,
    #[serde(other)]
    Unknown,
}

impl HistoryType {
    pub fn short_label(&self) -> &'static str {
        match self {
            Self::JuniorDeposit | Self::SeniorDeposit => "Deposit",
            Self::JuniorInstantWithdraw => "Instant Withdraw",
            Self::JuniorRegularWithdraw => "2 Step Withdraw",
            Self::JuniorRedeem | Self::SeniorRedeem => "Redeem",
            Self::JtokenSend => "Token Send",
            Self::JtokenReceive => "Token Receive",
            Self::JbondSend | Self::SbondSend => "Bond Send",
            Self::JbondReceive | Self::SbondReceive => "Bond Receive",
            Self::JuniorStake => "Stake",
            Self::JuniorUnstake => "Unstake",
            Self::Unknown => "Unknown",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::JuniorDeposit => "Junior Deposit",
            Self::JuniorInstantWithdraw => "Junior Instant Withdraw",
            Self::JuniorRegularWithdraw => "Junior 2 Step Withdraw",
            Self::JuniorRedeem => "Junior Redeem",
            Self::JtokenSend => "Junior Token Send",
            Self::JtokenReceive => "Junior Token Receive",
            Self::JbondSend => "Junior Bond Send",
            Self::JbondReceive => "Junior Bond Receive",
            Self::JuniorStake => "Junior Stake",
            Self::JuniorUnstake => "Junior Unstake",
            Self::SeniorDeposit => "Senior Deposit",
            Self::SeniorRedeem => "Senior Redeem",
            Self::SbondSend => "Senior Bond Send",
            Self::SbondReceive => "Senior Bond Receive",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether the transaction moved funds into the user's position.
    pub fn is_positive(&self) -> bool {
        matches!(
            self,
            Self::JuniorDeposit
                | Self::JtokenReceive
                | Self::JbondReceive
                | Self::JuniorStake
                | Self::SeniorDeposit
                | Self::SbondReceive
        )
    }

    pub fn is_junior_past_position(&self) -> bool {
        matches!(self, Self::JuniorRedeem | Self::JuniorInstantWithdraw)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyPoolTransaction {
    pub protocol_id: String,
    pub pool: Address,
    pub underlying_token_address: Address,
    pub underlying_token_symbol: String,
    pub amount: ScaledValue,
    pub tranche: String,
    pub transaction_type: HistoryType,
    pub transaction_hash: H256,
    pub block_timestamp: u64,
    pub block_number: u64,
    pub account_address: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SySeniorBond {
    pub senior_bond_id: u64,
    pub maturity_date: u64,
    pub redeemed: bool,
    pub account_address: Address,
    pub deposited_amount: ScaledValue,
    pub redeemable_amount: ScaledValue,
    pub underlying_token_address: Address,
    pub underlying_token_symbol: String,
    pub underlying_token_decimals: u32,
    pub transaction_hash: H256,
    pub block_timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyJuniorBond {
    pub junior_bond_id: u64,
    pub maturity_date: u64,
    pub redeemed: bool,
    pub account_address: Address,
    pub deposited_amount: ScaledValue,
    pub underlying_token_address: Address,
    pub underlying_token_symbol: String,
    pub underlying_token_decimals: u32,
    pub transaction_hash: H256,
    pub block_timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyUserTxHistory {
    pub protocol_id: String,
    pub pool: Address,
    pub underlying_token_address: Address,
    pub underlying_token_symbol: String,
    pub amount: ScaledValue,
    pub tranche: String,
    pub transaction_type: HistoryType,
    pub transaction_hash: H256,
    pub block_timestamp: u64,
    pub block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SySeniorRedeem {
    pub senior_bond_address: Address,
    pub user_address: Address,
    pub senior_bond_id: u64,
    pub smart_yield_address: Address,
    pub fee: ScaledValue,
    pub underlying_in: ScaledValue,
    pub gain: ScaledValue,
    pub for_days: f64,
    pub block_timestamp: u64,
    pub transaction_hash: H256,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyJuniorPastPosition {
    pub protocol_id: String,
    pub smart_yield_address: Address,
    pub underlying_token_address: Address,
    pub underlying_token_symbol: String,
    pub tokens_in: ScaledValue,
    pub underlying_out: ScaledValue,
    pub forfeits: ScaledValue,
    pub transaction_type: HistoryType,
    pub block_timestamp: u64,
    pub transaction_hash: H256,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyPortfolioValue {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub senior_value: Option<f64>,
    #[serde(default)]
    pub junior_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardTokenMeta {
    pub address: Address,
    pub symbol: String,
    pub decimals: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardPoolType {
    Single,
    Multi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyRewardPool {
    pub pool_address: Address,
    pub pool_token_address: Address,
    pub pool_token_decimals: u32,
    pub pool_type: RewardPoolType,
    pub protocol_id: String,
    #[serde(default)]
    pub reward_tokens: Vec<RewardTokenMeta>,
    pub underlying_address: Address,
    pub underlying_symbol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyRewardPoolTransaction {
    pub user_address: Address,
    pub transaction_type: HistoryType,
    pub amount: ScaledValue,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub transaction_hash: H256,
}

/// Filters shared by the per-user history endpoints; `"all"` matches everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryFilters {
    pub originator: String,
    pub token: String,
    pub transaction_type: String,
}

impl Default for HistoryFilters {
    fn default() -> Self {
        Self {
            originator: ALL.to_string(),
            token: ALL.to_string(),
            transaction_type: ALL.to_string(),
        }
    }
}

impl HistoryFilters {
    fn query(&self) -> Query {
        Query::new()
            .push("originator", &self.originator)
            .push("token", &self.token)
            .push("transactionType", &self.transaction_type)
    }
}

/// Filters for the bond listings of a pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BondFilters {
    pub redeemed: Option<bool>,
    pub sort: Option<String>,
    pub sort_direction: Option<String>,
}

impl BondFilters {
    fn query(&self) -> Query {
        Query::new()
            .push_opt("redeemed", self.redeemed)
            .push_opt("sort", self.sort.as_ref())
            .push_opt("sortDirection", self.sort_direction.as_ref())
    }
}

impl ApiClient {
    pub async fn sy_pools(&self, originator: &str) -> Result<Vec<SyPool>, ApiError> {
        self.fetch_list(
            "/api/smartyield/pools",
            &Query::new().push("originator", originator),
        )
        .await
    }

    pub async fn sy_pool(
        &self,
        originator: &str,
        underlying_symbol: &str,
    ) -> Result<Option<SyPool>, ApiError> {
        let query = Query::new()
            .push("originator", originator)
            .push("underlyingSymbol", underlying_symbol);
        let pools: Vec<SyPool> = self.fetch_list("/api/smartyield/pools", &query).await?;
        Ok(pools.into_iter().next())
    }

    pub async fn sy_pool_apy(
        &self,
        smart_yield: Address,
        window: &str,
    ) -> Result<Vec<SyPoolApy>, ApiError> {
        self.fetch_list(
            &format!("/api/smartyield/pools/{:?}/apy", smart_yield),
            &Query::new().push("window", window),
        )
        .await
    }

    pub async fn sy_pool_liquidity(
        &self,
        smart_yield: Address,
        window: &str,
    ) -> Result<Vec<SyPoolLiquidity>, ApiError> {
        self.fetch_list(
            &format!("/api/smartyield/pools/{:?}/liquidity", smart_yield),
            &Query::new().push("window", window),
        )
        .await
    }

    pub async fn sy_pool_transactions(
        &self,
        pool: Address,
        page: u32,
        page_size: u32,
        transaction_type: &str,
    ) -> Result<PagedResult<SyPoolTransaction>, ApiError> {
        self.fetch_paged(
            &format!("/api/smartyield/pools/{:?}/transactions", pool),
            page,
            page_size,
            Query::new().push("transactionType", transaction_type),
        )
        .await
    }

    pub async fn sy_senior_bonds(
        &self,
        pool: Address,
        page: u32,
        page_size: u32,
        filters: &BondFilters,
    ) -> Result<PagedResult<SySeniorBond>, ApiError> {
        self.fetch_paged(
            &format!("/api/smartyield/pools/{:?}/senior-bonds", pool),
            page,
            page_size,
            filters.query(),
        )
        .await
    }

    pub async fn sy_junior_bonds(
        &self,
        pool: Address,
        page: u32,
        page_size: u32,
        filters: &BondFilters,
    ) -> Result<PagedResult<SyJuniorBond>, ApiError> {
        self.fetch_paged(
            &format!("/api/smartyield/pools/{:?}/junior-bonds", pool),
            page,
            page_size,
            filters.query(),
        )
        .await
    }

    pub async fn sy_user_history(
        &self,
        user: Address,
        page: u32,
        page_size: u32,
        filters: HistoryFilters,
    ) -> Result<PagedResult<SyUserTxHistory>, ApiError> {
        self.fetch_paged(
            &format!("/api/smartyield/users/{:?}/history", user),
            page,
            page_size,
            filters.query(),
        )
        .await
    }

    pub async fn sy_senior_redeems(
        &self,
        user: Address,
        page: u32,
        page_size: u32,
        originator: &str,
        token: &str,
    ) -> Result<PagedResult<SySeniorRedeem>, ApiError> {
        self.fetch_paged(
            &format!("/api/smartyield/users/{:?}/redeems/senior", user),
            page,
            page_size,
            Query::new().push("originator", originator).push("token", token),
        )
        .await
    }

    pub async fn sy_junior_past_positions(
        &self,
        user: Address,
        page: u32,
        page_size: u32,
        filters: HistoryFilters,
    ) -> Result<PagedResult<SyJuniorPastPosition>, ApiError> {
        self.fetch_paged(
            &format!("/api/smartyield/users/{:?}/junior-past-positions", user),
            page,
            page_size,
            filters.query(),
        )
        .await
    }

    pub async fn sy_portfolio_values(&self, user: Address) -> Result<Vec<SyPortfolioValue>, ApiError> {
        self.fetch_list(
            &format!("/api/smartyield/users/{:?}/portfolio-value", user),
            &Query::new(),
        )
        .await
    }

    pub async fn sy_senior_portfolio_values(
        &self,
        user: Address,
    ) -> Result<Vec<SyPortfolioValue>, ApiError> {
        self.fetch_list(
            &format!("/api/smartyield/users/{:?}/portfolio-value/senior", user),
            &Query::new(),
        )
        .await
    }

    pub async fn sy_junior_portfolio_values(
        &self,
        user: Address,
    ) -> Result<Vec<SyPortfolioValue>, ApiError> {
        self.fetch_list(
            &format!("/api/smartyield/users/{:?}/portfolio-value/junior", user),
            &Query::new(),
        )
        .await
    }

    pub async fn sy_reward_pools(
        &self,
        originator: &str,
        underlying_symbol: &str,
    ) -> Result<Vec<SyRewardPool>, ApiError> {
        let query = Query::new()
            .push("originator", originator)
            .push("underlyingSymbol", underlying_symbol);
        self.fetch_list("/api/smartyield/rewards/v2/pools", &query)
            .await
    }

    pub async fn sy_reward_pool_transactions(
        &self,
        pool: Address,
        page: u32,
        page_size: u32,
        user: Option<Address>,
        transaction_type: &str,
    ) -> Result<PagedResult<SyRewardPoolTransaction>, ApiError> {
        let user = user.map(|user| format!("{:?}", user));
        let query = Query::new()
            .push("userAddress", user.as_deref().unwrap_or(ALL))
            .push("transactionType", transaction_type);
        self.fetch_paged(
            &format!("/api/smartyield/rewards/v2/pools/{:?}/transactions", pool),
            page,
            page_size,
            query,
        )
        .await
    }
}
