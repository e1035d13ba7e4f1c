//! Node-facing seam
//!
//! The submission loop only talks to the chain through `ChainClient`. The
//! binary provides an alloy-backed implementation; tests script their own.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;

use crate::error::{ChainError, ConfigError};

/// A payable contract call: target, encoded function + args, attached value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayableCall {
    pub contract: Address,
    pub calldata: Bytes,
    pub value: U256,
}

/// Inclusion of a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub block_height: u64,
}

#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Handle for a submitted transaction awaiting inclusion
    type Pending: Send + 'static;

    /// Signing account used for submissions and balance display
    fn account(&self) -> Address;

    async fn block_height(&self) -> Result<u64, ChainError>;

    async fn native_balance(&self, account: Address) -> Result<U256, ChainError>;

    /// Balance of an 18-decimal token, in base units
    async fn token_balance(&self, token: Address, account: Address) -> Result<U256, ChainError>;

    async fn submit_payable_call(&self, call: PayableCall) -> Result<Self::Pending, ChainError>;

    /// Wait until the transaction lands. Reverts surface as `ChainError::Confirmation`.
    async fn await_inclusion(&self, pending: Self::Pending) -> Result<Confirmation, ChainError>;
}

/// Builds a `ChainClient` for the credentials given to `start()`
pub trait Connector: Send + Sync + 'static {
    type Client: ChainClient;

    fn connect(&self, credentials: &Credentials) -> Result<Self::Client, ConfigError>;
}

/// Signing secret, validated but otherwise opaque
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials(B256);

impl Credentials {
    /// Parse a hex private key, with or without `0x` prefix
    pub fn parse(raw: Option<&str>) -> Result<Self, ConfigError> {
        let raw = raw.map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }

        let hex = raw.strip_prefix("0x").unwrap_or(raw);
        if hex.len() != 64 {
            return Err(ConfigError::InvalidCredentials(format!(
                "expected 64 hex characters, got {}",
                hex.len()
            )));
        }

        let secret = B256::from_str(hex)
            .map_err(|e| ConfigError::InvalidCredentials(e.to_string()))?;
        if secret.is_zero() {
            return Err(ConfigError::InvalidCredentials("key is zero".to_string()));
        }

        Ok(Self(secret))
    }

    pub fn secret(&self) -> &B256 {
        &self.0
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(<redacted>)")
    }
}
