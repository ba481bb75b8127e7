use ethers::abi::{Abi, Token};
use ethers::types::{Address, H256, U256};
use lazy_static::lazy_static;
use std::ops::Deref;
use std::sync::Arc;

use super::{decode_amount, decode_count, keyed, parse_abi, ContractError, ContractHandle};
use crate::value::{MaybeScaled, ScaledValue};

lazy_static! {
    pub static ref YF_STAKING_ABI: Arc<Abi> = parse_abi(&[
        "function getCurrentEpoch() view returns (uint128)",
        "function getEpochPoolSize(address token, uint128 epochId) view returns (uint256)",
        "function getEpochUserBalance(address user, address token, uint128 epochId) view returns (uint256)",
        "function balanceOf(address user, address token) view returns (uint256)",
        "function deposit(address token, uint256 amount)",
        "function withdraw(address token, uint256 amount)",
    ]);
    pub static ref YF_POOL_ABI: Arc<Abi> = parse_abi(&[
        "function TOTAL_DISTRIBUTED_AMOUNT() view returns (uint256)",
        "function NR_OF_EPOCHS() view returns (uint256)",
        "function getCurrentEpoch() view returns (uint256)",
        "function getPoolSize(uint128 epochId) view returns (uint256)",
        "function getEpochStake(address user, uint128 epochId) view returns (uint256)",
        "function massHarvest() returns (uint256)",
    ]);
}

/// Yield-farming staking vault shared by every farming pool.
#[derive(Debug)]
pub struct YfStakingContract(ContractHandle);

impl YfStakingContract {
    pub fn new(address: Address) -> Self {
        Self(ContractHandle::new(
            "yf_staking",
            address,
            YF_STAKING_ABI.clone(),
        ))
    }

    pub async fn load_current_epoch(&self) -> Result<u64, ContractError> {
        match self
            .0
            .load("currentEpoch", "getCurrentEpoch", vec![], decode_count)
            .await?
        {
            super::FieldValue::Count(epoch) => Ok(epoch),
            other => Err(ContractError::UnexpectedOutput {
                method: "getCurrentEpoch".to_string(),
                output: format!("{:?}", other),
            }),
        }
    }

    /// Pool size of `token` for the upcoming epoch.
    pub async fn load_common_for(&self, token: Address) -> Result<(), ContractError> {
        let epoch = self.load_current_epoch().await?;
        self.0
            .load(
                keyed("nextEpochPoolSize", &token),
                "getEpochPoolSize",
                vec![Token::Address(token), Token::Uint(U256::from(epoch + 1))],
                decode_amount,
            )
            .await?;
        Ok(())
    }

    /// Bound account's stake of `token`, now and for the upcoming epoch.
    pub async fn load_user_data_for(&self, token: Address) -> Result<(), ContractError> {
        let account = self.0.require_account()?;
        let epoch = match self.current_epoch() {
            Some(epoch) => epoch,
            None => self.load_current_epoch().await?,
        };
        self.0
            .load(
                user_token_key("balance", &account, &token),
                "balanceOf",
                vec![Token::Address(account), Token::Address(token)],
                decode_amount,
            )
            .await?;
        self.0
            .load(
                user_token_key("nextEpochUserBalance", &account, &token),
                "getEpochUserBalance",
                vec![
                    Token::Address(account),
                    Token::Address(token),
                    Token::Uint(U256::from(epoch + 1)),
                ],
                decode_amount,
            )
            .await?;
        Ok(())
    }

    pub fn current_epoch(&self) -> Option<u64> {
        self.0.count("currentEpoch")
    }

    pub fn next_epoch_pool_size(&self, token: &Address) -> Option<ScaledValue> {
        self.0.amount(&keyed("nextEpochPoolSize", token))
    }

    pub fn staked_balance(&self, token: &Address) -> Option<ScaledValue> {
        let account = self.0.account()?;
        self.0.amount(&user_token_key("balance", &account, token))
    }

    pub fn next_epoch_user_balance(&self, token: &Address) -> Option<ScaledValue> {
        let account = self.0.account()?;
        self.0
            .amount(&user_token_key("nextEpochUserBalance", &account, token))
    }

    pub async fn deposit_send(
        &self,
        token: Address,
        amount: U256,
        gas_price_gwei: u64,
    ) -> Result<H256, ContractError> {
        self.0
            .send(
                "deposit",
                vec![Token::Address(token), Token::Uint(amount)],
                gas_price_gwei,
            )
            .await
    }

    pub async fn withdraw_send(
        &self,
        token: Address,
        amount: U256,
        gas_price_gwei: u64,
    ) -> Result<H256, ContractError> {
        self.0
            .send(
                "withdraw",
                vec![Token::Address(token), Token::Uint(amount)],
                gas_price_gwei,
            )
            .await
    }
}

impl Deref for YfStakingContract {
    type Target = ContractHandle;

    fn deref(&self) -> &ContractHandle {
        &self.0
    }
}

fn user_token_key(field: &str, user: &Address, token: &Address) -> String {
    format!("{}:{:?}", keyed(field, user), token)
}

/// One yield-farming reward pool.
#[derive(Debug)]
pub struct YfPoolContract(ContractHandle);

impl YfPoolContract {
    pub fn new(address: Address) -> Self {
        Self(ContractHandle::new("yf_pool", address, YF_POOL_ABI.clone()))
    }

    pub async fn load_common(&self) -> Result<(), ContractError> {
        self.0
            .load(
                "totalDistributedAmount",
                "TOTAL_DISTRIBUTED_AMOUNT",
                vec![],
                decode_amount,
            )
            .await?;
        self.0
            .load("numberOfEpochs", "NR_OF_EPOCHS", vec![], decode_count)
            .await?;
        let epoch = match self
            .0
            .load("currentEpoch", "getCurrentEpoch", vec![], decode_count)
            .await?
        {
            super::FieldValue::Count(epoch) => epoch,
            _ => return Ok(()),
        };
        self.0
            .load(
                "epochPoolSize",
                "getPoolSize",
                vec![Token::Uint(U256::from(epoch))],
                decode_amount,
            )
            .await?;
        Ok(())
    }

    /// Claimable reward and current-epoch stake of the bound account.
    pub async fn load_user_data(&self) -> Result<(), ContractError> {
        let account = self.0.require_account()?;
        // massHarvest is executed as a call from the account to preview the payout.
        self.0
            .load(keyed("toClaim", &account), "massHarvest", vec![], decode_amount)
            .await?;
        if let Some(epoch) = self.current_epoch() {
            self.0
                .load(
                    keyed("epochStake", &account),
                    "getEpochStake",
                    vec![Token::Address(account), Token::Uint(U256::from(epoch))],
                    decode_amount,
                )
                .await?;
        }
        Ok(())
    }

    pub fn total_distributed_amount(&self) -> Option<ScaledValue> {
        self.0.amount("totalDistributedAmount")
    }

    pub fn number_of_epochs(&self) -> Option<u64> {
        self.0.count("numberOfEpochs")
    }

    pub fn current_epoch(&self) -> Option<u64> {
        self.0.count("currentEpoch")
    }

    pub fn epoch_pool_size(&self) -> Option<ScaledValue> {
        self.0.amount("epochPoolSize")
    }

    pub fn to_claim(&self) -> Option<ScaledValue> {
        let account = self.0.account()?;
        self.0.amount(&keyed("toClaim", &account))
    }

    pub fn epoch_stake(&self) -> Option<ScaledValue> {
        let account = self.0.account()?;
        self.0.amount(&keyed("epochStake", &account))
    }

    pub fn is_pool_ended(&self) -> Option<bool> {
        Some(self.current_epoch()? > self.number_of_epochs()?)
    }

    /// Reward distributed in one epoch.
    pub fn epoch_reward(&self) -> Option<ScaledValue> {
        let epochs = self.number_of_epochs()?;
        self.total_distributed_amount()?
            .divided_by(&ScaledValue::from(epochs))
    }

    /// Bound account's share of the current epoch reward.
    pub fn potential_reward(&self) -> Option<ScaledValue> {
        let share = self.epoch_stake().maybe_divided_by(self.epoch_pool_size().as_ref());
        self.epoch_reward().maybe_multiplied_by(share.as_ref())
    }

    pub async fn mass_harvest_send(&self, gas_price_gwei: u64) -> Result<H256, ContractError> {
        self.0.send("massHarvest", vec![], gas_price_gwei).await
    }
}

impl Deref for YfPoolContract {
    type Target = ContractHandle;

    fn deref(&self) -> &ContractHandle {
        &self.0
    }
}
