//! Mint Bot Configuration
//!
//! Optional TOML file, overridden field by field by CLI flags / env vars.
//! Anything still unset falls back to the built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use mint_core::consts::{DEFAULT_RPC_URL, MINT_CONTRACT, MINT_VALUE};
use mint_core::target::parse_address;
use mint_core::{ConfigError, LoopConfig, MintTarget};

/// Contents of `config.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub rpc_url: Option<String>,
    pub private_key: Option<String>,
    /// Token address passed to `mint(address)`
    pub token: Option<String>,
    pub contract: Option<String>,
    /// Native value per mint, in ether units ("0.01")
    pub value: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub confirmation_timeout_secs: Option<u64>,
    pub max_backoff_ms: Option<u64>,
}

impl FileConfig {
    /// Load config from TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&contents).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
    }

    /// Explicit path must exist; the default path is used only if present
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let path = default_config_path();
                if path.is_file() {
                    Self::load(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".config/mint-bot/config.toml")
}

/// Values taken from the command line (or their env fallbacks)
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub rpc_url: Option<String>,
    pub private_key: Option<String>,
    pub token: Option<String>,
    pub contract: Option<String>,
    pub value: Option<String>,
}

/// Fully resolved settings. Strings stay unparsed until a run needs them so
/// the dashboard can show and edit what the user supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub rpc_url: String,
    pub private_key: Option<String>,
    pub token: Option<String>,
    pub contract: String,
    pub value: String,
    pub loop_config: LoopConfig,
}

impl Settings {
    pub fn resolve(file: FileConfig, cli: Overrides) -> Self {
        let defaults = LoopConfig::default();
        let loop_config = LoopConfig {
            poll_interval: file
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            confirmation_timeout: file
                .confirmation_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.confirmation_timeout),
            max_backoff: file
                .max_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_backoff),
        };

        Self {
            rpc_url: cli
                .rpc_url
                .or(file.rpc_url)
                .unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            private_key: non_empty(cli.private_key).or_else(|| non_empty(file.private_key)),
            token: non_empty(cli.token).or_else(|| non_empty(file.token)),
            contract: cli
                .contract
                .or(file.contract)
                .unwrap_or_else(|| MINT_CONTRACT.to_string()),
            value: cli.value.or(file.value).unwrap_or_else(|| MINT_VALUE.to_string()),
            loop_config,
        }
    }

    /// Parse the mint target. A token address is required.
    pub fn target(&self) -> Result<MintTarget, ConfigError> {
        let token = self.token.as_deref().ok_or_else(|| ConfigError::InvalidAddress {
            value: String::new(),
            reason: "no token address configured (--token / TOKEN_ADDRESS)".to_string(),
        })?;
        MintTarget::parse(&self.contract, token, &self.value)
    }

    /// Token alone, for balance display before a target is complete
    pub fn token_address(&self) -> Option<Result<Address, ConfigError>> {
        self.token.as_deref().map(parse_address)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
