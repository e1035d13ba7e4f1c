//! Mint Core - submission control loop for repeated mint calls
//!
//! Layout:
//! - `controller`: start/stop lifecycle, owns run state
//! - `submission`: the per-block submit → confirm → refresh loop
//! - `event_log`: append-only outcome log for display surfaces
//! - `balance`: native/token balance snapshot
//! - `chain`: the node-facing seam (`ChainClient`, `Connector`)

pub mod abi;
pub mod balance;
pub mod chain;
pub mod consts;
pub mod controller;
pub mod error;
pub mod event_log;
pub mod state;
pub mod submission;
pub mod target;

pub use balance::{BalanceSnapshot, TokenAmount};
pub use chain::{ChainClient, Confirmation, Connector, Credentials, PayableCall};
pub use controller::{BalanceRefresher, RunController};
pub use error::{ChainError, ConfigError, RefreshError};
pub use event_log::{EventLog, LogEntry, LogSubscription};
pub use state::{AttemptOutcome, AttemptRecord, LoopPhase, RunState};
pub use submission::LoopConfig;
pub use target::MintTarget;
