use std::str::FromStr;

use alloy::primitives::{utils::parse_ether, Address, U256};

use crate::abi::mint_calldata;
use crate::chain::PayableCall;
use crate::consts::{MINT_CONTRACT, MINT_VALUE};
use crate::error::ConfigError;

/// What a run mints: contract, token argument and attached value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintTarget {
    pub contract: Address,
    pub token: Address,
    /// Native value in wei
    pub value: U256,
}

impl MintTarget {
    /// Target the default mint contract with the default value
    pub fn new(token: Address) -> Self {
        Self {
            contract: MINT_CONTRACT,
            token,
            // MINT_VALUE is a valid ether literal
            value: parse_ether(MINT_VALUE).unwrap_or(U256::ZERO),
        }
    }

    /// Build a target from user-entered strings
    pub fn parse(contract: &str, token: &str, value: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            contract: parse_address(contract)?,
            token: parse_address(token)?,
            value: parse_value(value)?,
        })
    }

    /// The payable call submitted on every attempt
    pub fn payable_call(&self) -> PayableCall {
        PayableCall {
            contract: self.contract,
            calldata: mint_calldata(self.token),
            value: self.value,
        }
    }
}

pub fn parse_address(value: &str) -> Result<Address, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidAddress {
            value: value.to_string(),
            reason: "empty".to_string(),
        });
    }
    Address::from_str(trimmed).map_err(|e| ConfigError::InvalidAddress {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Parse an ether-denominated amount ("0.01") into wei
pub fn parse_value(value: &str) -> Result<U256, ConfigError> {
    parse_ether(value.trim()).map_err(|e| ConfigError::InvalidAmount {
        value: value.to_string(),
        reason: e.to_string(),
    })
}
