use ethers::abi::{Abi, Token};
use ethers::types::{Address, H256, U256};
use lazy_static::lazy_static;
use std::ops::Deref;
use std::sync::Arc;

use super::erc20::amount_or_unexpected;
use super::{decode_address, decode_amount, keyed, parse_abi, ContractError, ContractHandle};
use crate::value::ScaledValue;

lazy_static! {
    pub static ref REWARD_POOL_ABI: Arc<Abi> = parse_abi(&[
        "function poolSize() view returns (uint256)",
        "function poolToken() view returns (address)",
        "function rewardToken() view returns (address)",
        "function balances(address user) view returns (uint256)",
        "function toClaim(address user) view returns (uint256)",
        "function deposit(uint256 amount)",
        "function withdraw(uint256 amount)",
        "function claim() returns (uint256)",
    ]);
}

/// Staking pool paying rewards for junior tokens.
#[derive(Debug)]
pub struct RewardPoolContract(ContractHandle);

impl RewardPoolContract {
    pub fn new(address: Address) -> Self {
        Self(ContractHandle::new(
            "reward_pool",
            address,
            REWARD_POOL_ABI.clone(),
        ))
    }

    pub async fn load_common(&self) -> Result<(), ContractError> {
        self.0.load("poolSize", "poolSize", vec![], decode_amount).await?;
        self.0
            .load("poolToken", "poolToken", vec![], decode_address)
            .await?;
        Ok(())
    }

    /// Staked balance of the bound account.
    pub async fn load_balance(&self) -> Result<ScaledValue, ContractError> {
        let account = self.0.require_account()?;
        let value = self
            .0
            .load(
                keyed("balance", &account),
                "balances",
                vec![Token::Address(account)],
                decode_amount,
            )
            .await?;
        amount_or_unexpected(value, "balances")
    }

    /// Rewards claimable by the bound account.
    pub async fn load_claim(&self) -> Result<ScaledValue, ContractError> {
        let account = self.0.require_account()?;
        let value = self
            .0
            .load(
                keyed("toClaim", &account),
                "toClaim",
                vec![Token::Address(account)],
                decode_amount,
            )
            .await?;
        amount_or_unexpected(value, "toClaim")
    }

    pub fn pool_size(&self) -> Option<ScaledValue> {
        self.0.amount("poolSize")
    }

    pub fn pool_token(&self) -> Option<Address> {
        self.0.address_field("poolToken")
    }

    pub fn balance(&self) -> Option<ScaledValue> {
        let account = self.0.account()?;
        self.0.amount(&keyed("balance", &account))
    }

    pub fn to_claim(&self) -> Option<ScaledValue> {
        let account = self.0.account()?;
        self.0.amount(&keyed("toClaim", &account))
    }

    pub async fn deposit_send(&self, amount: U256, gas_price_gwei: u64) -> Result<H256, ContractError> {
        self.0
            .send("deposit", vec![Token::Uint(amount)], gas_price_gwei)
            .await
    }

    pub async fn withdraw_send(&self, amount: U256, gas_price_gwei: u64) -> Result<H256, ContractError> {
        self.0
            .send("withdraw", vec![Token::Uint(amount)], gas_price_gwei)
            .await
    }

    pub async fn claim_send(&self, gas_price_gwei: u64) -> Result<H256, ContractError> {
        self.0.send("claim", vec![], gas_price_gwei).await
    }
}

impl Deref for RewardPoolContract {
    type Target = ContractHandle;

    fn deref(&self) -> &ContractHandle {
        &self.0
    }
}
