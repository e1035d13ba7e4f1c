use alloy::primitives::{address, Address};
use std::time::Duration;

/// Mint contract the tool targets unless overridden
pub const MINT_CONTRACT: Address = address!("d991C8DaC59c969CeFEB442d0e6cAe8E6c7f1f2a");

/// Native value attached to every mint call, in ether units
pub const MINT_VALUE: &str = "0.01";

/// Fractional digits used for both native and token balances
pub const TOKEN_DECIMALS: u8 = 18;

pub const DEFAULT_RPC_URL: &str = "https://bsc-dataseed.bnbchain.org";

/// Delay between height polls while no new block has appeared
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound on a single inclusion wait
pub const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Cap for the backoff applied when the node cannot be reached
pub const MAX_NETWORK_BACKOFF: Duration = Duration::from_secs(5);

/// Attempt records kept in memory; older settled records are dropped first
pub const ATTEMPT_HISTORY_LIMIT: usize = 1024;

pub const LOG_STARTED: &str = "Minting started";
pub const LOG_STOPPED: &str = "Minting stopped";
pub const LOG_MINT_FAILED: &str = "Error: Mint failed";
