use ethers::abi::{Abi, Token};
use ethers::types::{Address, H256, U256};
use lazy_static::lazy_static;
use std::ops::Deref;
use std::sync::Arc;

use super::{decode_address, parse_abi, ContractError, ContractHandle};

lazy_static! {
    pub static ref SENIOR_BOND_ABI: Arc<Abi> = parse_abi(&[
        "function ownerOf(uint256 tokenId) view returns (address)",
        "function transferFrom(address from, address to, uint256 tokenId)",
    ]);
}

/// Senior bond NFT of a smart-yield pool.
#[derive(Debug)]
pub struct SeniorBondContract(ContractHandle);

impl SeniorBondContract {
    pub fn new(address: Address) -> Self {
        Self(ContractHandle::new(
            "senior_bond",
            address,
            SENIOR_BOND_ABI.clone(),
        ))
    }

    pub async fn load_owner_of(&self, bond_id: u64) -> Result<(), ContractError> {
        self.0
            .load(
                format!("owner:{}", bond_id),
                "ownerOf",
                vec![Token::Uint(U256::from(bond_id))],
                decode_address,
            )
            .await?;
        Ok(())
    }

    pub fn owner_of(&self, bond_id: u64) -> Option<Address> {
        self.0.address_field(&format!("owner:{}", bond_id))
    }

    /// Moves bond `bond_id` from the bound account to `to`.
    pub async fn transfer_from_send(
        &self,
        to: Address,
        bond_id: u64,
        gas_price_gwei: u64,
    ) -> Result<H256, ContractError> {
        let from = self.0.require_account()?;
        self.0
            .send(
                "transferFrom",
                vec![
                    Token::Address(from),
                    Token::Address(to),
                    Token::Uint(U256::from(bond_id)),
                ],
                gas_price_gwei,
            )
            .await
    }
}

impl Deref for SeniorBondContract {
    type Target = ContractHandle;

    fn deref(&self) -> &ContractHandle {
        &self.0
    }
}
