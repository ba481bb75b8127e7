use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};

use super::{ApiClient, ApiError, PagedResult, Query};
use crate::value::ScaledValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreasuryToken {
    pub token_address: Address,
    pub token_symbol: String,
    pub token_decimals: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionDirection {
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreasuryHistory {
    pub account_address: Address,
    #[serde(default)]
    pub account_label: Option<String>,
    pub counterparty_address: Address,
    #[serde(default)]
    pub counterparty_label: Option<String>,
    pub amount: ScaledValue,
    pub transaction_direction: TransactionDirection,
    pub token_address: Address,
    pub token_symbol: String,
    pub transaction_hash: H256,
    pub block_timestamp: u64,
    pub block_number: u64,
}

impl TreasuryHistory {
    /// Address funds came from.
    pub fn from_address(&self) -> Address {
        match self.transaction_direction {
            TransactionDirection::In => self.counterparty_address,
            TransactionDirection::Out => self.account_address,
        }
    }

    /// Address funds went to.
    pub fn to_address(&self) -> Address {
        match self.transaction_direction {
            TransactionDirection::In => self.account_address,
            TransactionDirection::Out => self.counterparty_address,
        }
    }

    /// Signed amount, negative for outgoing transfers.
    pub fn signed_amount(&self) -> ScaledValue {
        match self.transaction_direction {
            TransactionDirection::In => self.amount.clone(),
            TransactionDirection::Out => ScaledValue::zero().minus(&self.amount),
        }
    }
}

impl ApiClient {
    pub async fn treasury_tokens(&self, treasury: Address) -> Result<Vec<TreasuryToken>, ApiError> {
        self.fetch_list(
            "/api/governance/treasury/tokens",
            &Query::new().push("address", format!("{:?}", treasury)),
        )
        .await
    }

    pub async fn treasury_history(
        &self,
        treasury: Address,
        page: u32,
        page_size: u32,
    ) -> Result<PagedResult<TreasuryHistory>, ApiError> {
        self.fetch_paged(
            "/api/governance/treasury/transactions",
            page,
            page_size,
            Query::new().push("address", format!("{:?}", treasury)),
        )
        .await
    }
}
