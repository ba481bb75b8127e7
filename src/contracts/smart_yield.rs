use async_trait::async_trait;
use ethers::abi::{Abi, Token};
use ethers::types::{Address, H256, U256};
use lazy_static::lazy_static;
use std::ops::Deref;
use std::sync::Arc;

use super::erc20::amount_or_unexpected;
use super::{decode_amount, parse_abi, ContractError, ContractHandle, TokenContract};
use crate::value::ScaledValue;

lazy_static! {
    pub static ref SMART_YIELD_ABI: Arc<Abi> = parse_abi(&[
        "function symbol() view returns (string)",
        "function decimals() view returns (uint8)",
        "function totalSupply() view returns (uint256)",
        "function balanceOf(address owner) view returns (uint256)",
        "function allowance(address owner, address spender) view returns (uint256)",
        "function approve(address spender, uint256 amount) returns (bool)",
        "function price() view returns (uint256)",
        "function abondDebt() view returns (uint256)",
        "function redeemBond(uint256 bondId)",
        "function redeemJuniorBond(uint256 jBondId)",
    ]);
}

/// Smart-yield pool; the contract is also the junior tranche token.
#[derive(Debug)]
pub struct SmartYieldContract(ContractHandle);

impl SmartYieldContract {
    pub fn new(address: Address) -> Self {
        Self(ContractHandle::new(
            "smart_yield",
            address,
            SMART_YIELD_ABI.clone(),
        ))
    }

    /// Token metadata plus the junior token price.
    pub async fn load_pool_common(&self) -> Result<(), ContractError> {
        self.load_common().await?;
        self.load_price().await?;
        Ok(())
    }

    pub async fn load_price(&self) -> Result<ScaledValue, ContractError> {
        let value = self.0.load("price", "price", vec![], decode_amount).await?;
        amount_or_unexpected(value, "price")
    }

    /// Junior token price, 18 decimal fixed point on chain.
    pub fn price(&self) -> Option<ScaledValue> {
        Some(self.0.amount("price")?.unscale_by(18))
    }

    pub async fn redeem_bond_send(
        &self,
        bond_id: u64,
        gas_price_gwei: u64,
    ) -> Result<H256, ContractError> {
        self.0
            .send("redeemBond", vec![Token::Uint(U256::from(bond_id))], gas_price_gwei)
            .await
    }

    pub async fn redeem_junior_bond_send(
        &self,
        junior_bond_id: u64,
        gas_price_gwei: u64,
    ) -> Result<H256, ContractError> {
        self.0
            .send(
                "redeemJuniorBond",
                vec![Token::Uint(U256::from(junior_bond_id))],
                gas_price_gwei,
            )
            .await
    }
}

impl Deref for SmartYieldContract {
    type Target = ContractHandle;

    fn deref(&self) -> &ContractHandle {
        &self.0
    }
}

#[async_trait]
impl TokenContract for SmartYieldContract {
    fn handle(&self) -> &ContractHandle {
        &self.0
    }
}
