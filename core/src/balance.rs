//! Balance snapshot shown next to the log
//!
//! Refreshed by the submission loop after each confirmation and by display
//! surfaces whenever the account or token changes.

use std::fmt;

use alloy::primitives::{utils::format_units, Address, U256};
use tracing::debug;

use crate::chain::ChainClient;
use crate::consts::TOKEN_DECIMALS;
use crate::error::ChainError;

/// Fixed-point amount with 18 fractional digits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TokenAmount(pub U256);

impl TokenAmount {
    pub fn base_units(&self) -> U256 {
        self.0
    }
}

impl From<U256> for TokenAmount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl fmt::Display for TokenAmount {
    /// Renders like `1.0`, `0.01`, `12.345`: trailing zeros trimmed, at least
    /// one fractional digit kept
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = match format_units(self.0, TOKEN_DECIMALS) {
            Ok(s) => s,
            Err(_) => return write!(f, "{} wei", self.0),
        };
        match formatted.split_once('.') {
            Some((whole, frac)) => {
                let frac = frac.trim_end_matches('0');
                let frac = if frac.is_empty() { "0" } else { frac };
                write!(f, "{}.{}", whole, frac)
            }
            None => write!(f, "{}.0", formatted),
        }
    }
}

/// Native and token balance of the signing account, replaced wholesale
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub native: TokenAmount,
    pub token: TokenAmount,
    /// Token `token` was queried for. Loop and display refreshes share one
    /// channel, so readers match on this.
    pub token_address: Address,
}

pub async fn refresh_native<C: ChainClient + ?Sized>(
    client: &C,
    account: Address,
) -> Result<TokenAmount, ChainError> {
    let balance = client.native_balance(account).await?;
    Ok(TokenAmount(balance))
}

pub async fn refresh_token<C: ChainClient + ?Sized>(
    client: &C,
    account: Address,
    token: Address,
) -> Result<TokenAmount, ChainError> {
    let balance = client.token_balance(token, account).await?;
    Ok(TokenAmount(balance))
}

/// Query both balances and build a fresh snapshot
pub async fn refresh<C: ChainClient + ?Sized>(
    client: &C,
    account: Address,
    token: Address,
) -> Result<BalanceSnapshot, ChainError> {
    let native = refresh_native(client, account).await?;
    let token_balance = refresh_token(client, account, token).await?;
    debug!("Balances for {}: native={} token={}", account, native, token_balance);
    Ok(BalanceSnapshot {
        native,
        token: token_balance,
        token_address: token,
    })
}
