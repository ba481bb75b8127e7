use ethers::abi::{Abi, Token};
use ethers::types::{Address, H256, U256};
use lazy_static::lazy_static;
use std::ops::Deref;
use std::sync::Arc;

use super::{decode_amount, decode_count, keyed, parse_abi, ContractError, ContractHandle};
use crate::value::ScaledValue;

lazy_static! {
    pub static ref DAO_BARN_ABI: Arc<Abi> = parse_abi(&[
        "function bondStaked() view returns (uint256)",
        "function balanceOf(address user) view returns (uint256)",
        "function votingPower(address user) view returns (uint256)",
        "function userLockedUntil(address user) view returns (uint256)",
        "function multiplierAtTs(address user, uint256 timestamp) view returns (uint256)",
    ]);
    pub static ref DAO_REWARD_ABI: Arc<Abi> = parse_abi(&[
        "function claim() returns (uint256)",
    ]);
}

/// Governance staking vault.
#[derive(Debug)]
pub struct DaoBarnContract(ContractHandle);

impl DaoBarnContract {
    pub fn new(address: Address) -> Self {
        Self(ContractHandle::new("dao_barn", address, DAO_BARN_ABI.clone()))
    }

    pub async fn load_common(&self) -> Result<(), ContractError> {
        self.0
            .load("bondStaked", "bondStaked", vec![], decode_amount)
            .await?;
        Ok(())
    }

    /// Staked balance, voting power, lock expiry and multiplier of the bound account.
    pub async fn load_user_data(&self, now: u64) -> Result<(), ContractError> {
        let account = self.0.require_account()?;
        let user = vec![Token::Address(account)];
        self.0
            .load(keyed("balance", &account), "balanceOf", user.clone(), decode_amount)
            .await?;
        self.0
            .load(
                keyed("votingPower", &account),
                "votingPower",
                user.clone(),
                decode_amount,
            )
            .await?;
        self.0
            .load(
                keyed("userLockedUntil", &account),
                "userLockedUntil",
                user,
                decode_count,
            )
            .await?;
        self.0
            .load(
                keyed("multiplier", &account),
                "multiplierAtTs",
                vec![Token::Address(account), Token::Uint(U256::from(now))],
                decode_amount,
            )
            .await?;
        Ok(())
    }

    pub fn bond_staked(&self) -> Option<ScaledValue> {
        self.0.amount("bondStaked")
    }

    pub fn balance(&self) -> Option<ScaledValue> {
        let account = self.0.account()?;
        self.0.amount(&keyed("balance", &account))
    }

    pub fn voting_power(&self) -> Option<ScaledValue> {
        let account = self.0.account()?;
        self.0.amount(&keyed("votingPower", &account))
    }

    /// Unix timestamp (seconds) until which the bound account's stake is locked.
    pub fn user_locked_until(&self) -> Option<u64> {
        let account = self.0.account()?;
        self.0.count(&keyed("userLockedUntil", &account))
    }

    /// Lock multiplier, 18 decimal fixed point on chain.
    pub fn multiplier(&self) -> Option<ScaledValue> {
        let account = self.0.account()?;
        Some(self.0.amount(&keyed("multiplier", &account))?.unscale_by(18))
    }
}

impl Deref for DaoBarnContract {
    type Target = ContractHandle;

    fn deref(&self) -> &ContractHandle {
        &self.0
    }
}

/// Governance reward distributor.
#[derive(Debug)]
pub struct DaoRewardContract(ContractHandle);

impl DaoRewardContract {
    pub fn new(address: Address) -> Self {
        Self(ContractHandle::new(
            "dao_reward",
            address,
            DAO_REWARD_ABI.clone(),
        ))
    }

    /// Previews the claimable reward by calling `claim` from the bound account.
    pub async fn load_claim(&self) -> Result<(), ContractError> {
        let account = self.0.require_account()?;
        self.0
            .load(keyed("claimValue", &account), "claim", vec![], decode_amount)
            .await?;
        Ok(())
    }

    pub fn claim_value(&self) -> Option<ScaledValue> {
        let account = self.0.account()?;
        self.0.amount(&keyed("claimValue", &account))
    }

    pub async fn claim_send(&self, gas_price_gwei: u64) -> Result<H256, ContractError> {
        self.0.send("claim", vec![], gas_price_gwei).await
    }
}

impl Deref for DaoRewardContract {
    type Target = ContractHandle;

    fn deref(&self) -> &ContractHandle {
        &self.0
    }
}
