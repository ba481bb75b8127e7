use async_trait::async_trait;
use ethers::abi::{Abi, Token};
use ethers::types::{Address, H256, U256};
use lazy_static::lazy_static;
use std::ops::Deref;
use std::sync::Arc;

use super::{
    decode_amount, decode_count, decode_text, keyed, parse_abi, ContractError, ContractHandle,
};
use crate::value::ScaledValue;

lazy_static! {
    pub static ref ERC20_ABI: Arc<Abi> = parse_abi(&[
        "function name() view returns (string)",
        "function symbol() view returns (string)",
        "function decimals() view returns (uint8)",
        "function totalSupply() view returns (uint256)",
        "function balanceOf(address owner) view returns (uint256)",
        "function allowance(address owner, address spender) view returns (uint256)",
        "function approve(address spender, uint256 amount) returns (bool)",
    ]);
}

fn allowance_key(owner: &Address, spender: &Address) -> String {
    format!("{}:{:?}", keyed("allowance", owner), spender)
}

/// Token reads shared by every ERC-20 compatible handle.
///
/// Balances and allowances are cached per owner, so a handle rebound to a
/// new account never reports the previous account's values.
#[async_trait]
pub trait TokenContract: Send + Sync {
    fn handle(&self) -> &ContractHandle;

    /// Loads `symbol`, `decimals` and `totalSupply`.
    async fn load_common(&self) -> Result<(), ContractError> {
        let handle = self.handle();
        handle.load("symbol", "symbol", vec![], decode_text).await?;
        handle.load("decimals", "decimals", vec![], decode_count).await?;
        handle
            .load("totalSupply", "totalSupply", vec![], decode_amount)
            .await?;
        Ok(())
    }

    /// Loads the bound account's balance.
    async fn load_balance(&self) -> Result<ScaledValue, ContractError> {
        let account = self.handle().require_account()?;
        self.load_balance_of(account).await
    }

    async fn load_balance_of(&self, owner: Address) -> Result<ScaledValue, ContractError> {
        let value = self
            .handle()
            .load(
                keyed("balance", &owner),
                "balanceOf",
                vec![Token::Address(owner)],
                decode_amount,
            )
            .await?;
        amount_or_unexpected(value, "balanceOf")
    }

    /// Loads how much `spender` may move on behalf of the bound account.
    async fn load_allowance(&self, spender: Address) -> Result<ScaledValue, ContractError> {
        let owner = self.handle().require_account()?;
        let value = self
            .handle()
            .load(
                allowance_key(&owner, &spender),
                "allowance",
                vec![Token::Address(owner), Token::Address(spender)],
                decode_amount,
            )
            .await?;
        amount_or_unexpected(value, "allowance")
    }

    fn symbol(&self) -> Option<String> {
        self.handle().text("symbol")
    }

    fn decimals(&self) -> Option<u64> {
        self.handle().count("decimals")
    }

    fn total_supply(&self) -> Option<ScaledValue> {
        self.handle().amount("totalSupply")
    }

    /// Raw balance of the bound account.
    fn balance(&self) -> Option<ScaledValue> {
        let account = self.handle().account()?;
        self.balance_of(&account)
    }

    fn balance_of(&self, owner: &Address) -> Option<ScaledValue> {
        self.handle().amount(&keyed("balance", owner))
    }

    fn allowance_of(&self, spender: &Address) -> Option<ScaledValue> {
        let owner = self.handle().account()?;
        self.handle().amount(&allowance_key(&owner, spender))
    }

    /// Bound account's balance in human units, absent until both the balance
    /// and the decimals are known.
    fn unscaled_balance(&self) -> Option<ScaledValue> {
        let decimals = self.decimals()?;
        Some(self.balance()?.unscale_by(decimals as i64))
    }

    /// Whether `spender` may already move `amount` base units.
    fn is_allowed(&self, spender: &Address, amount: &ScaledValue) -> Option<bool> {
        Some(self.allowance_of(spender)? >= *amount)
    }

    async fn approve_send(
        &self,
        spender: Address,
        amount: U256,
        gas_price_gwei: u64,
    ) -> Result<H256, ContractError> {
        self.handle()
            .send(
                "approve",
                vec![Token::Address(spender), Token::Uint(amount)],
                gas_price_gwei,
            )
            .await
    }
}

pub(crate) fn amount_or_unexpected(
    value: super::FieldValue,
    method: &str,
) -> Result<ScaledValue, ContractError> {
    match value {
        super::FieldValue::Amount(amount) => Ok(amount),
        other => Err(ContractError::UnexpectedOutput {
            method: method.to_string(),
            output: format!("{:?}", other),
        }),
    }
}

/// Plain ERC-20 token (underlying assets, staking tokens, treasury holdings).
#[derive(Debug)]
pub struct Erc20Contract(ContractHandle);

impl Erc20Contract {
    pub fn new(address: Address) -> Self {
        Self(ContractHandle::new("erc20", address, ERC20_ABI.clone()))
    }
}

impl Deref for Erc20Contract {
    type Target = ContractHandle;

    fn deref(&self) -> &ContractHandle {
        &self.0
    }
}

#[async_trait]
impl TokenContract for Erc20Contract {
    fn handle(&self) -> &ContractHandle {
        &self.0
    }
}
