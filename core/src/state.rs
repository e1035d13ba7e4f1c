//! Run State Machine - lifecycle and per-attempt records
//!
//! RunState:
//! - Idle: never started
//! - Running: loop is scheduling cycles
//! - Stopped: stop() called or a mint failed; terminal until start()
//!
//! LoopPhase (within a run):
//! - AwaitingBlock → Submitting → AwaitingConfirmation → Confirmed | Failed
//! - Halted once the loop observes Stopped

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Stopped,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "Idle",
            RunState::Running => "Running",
            RunState::Stopped => "Stopped",
        }
    }
}

/// Where the submission loop currently is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum LoopPhase {
    /// No loop task has run yet, or it has exited
    #[default]
    Halted,
    /// Polling height, waiting for a block newer than the last confirmed one
    AwaitingBlock,
    Submitting,
    AwaitingConfirmation,
    Confirmed,
    Failed,
}

impl LoopPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopPhase::Halted => "Halted",
            LoopPhase::AwaitingBlock => "Awaiting block",
            LoopPhase::Submitting => "Submitting",
            LoopPhase::AwaitingConfirmation => "Awaiting confirmation",
            LoopPhase::Confirmed => "Confirmed",
            LoopPhase::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AttemptOutcome {
    Pending,
    Confirmed { block_height: u64 },
    Failed { reason: String },
}

/// One submission decision. Settled exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    /// Height observed when the loop decided to submit
    pub block_height_at_attempt: u64,
    pub submitted_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
}

impl AttemptRecord {
    pub fn pending(block_height_at_attempt: u64) -> Self {
        Self {
            block_height_at_attempt,
            submitted_at: Utc::now(),
            outcome: AttemptOutcome::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.outcome == AttemptOutcome::Pending
    }

    /// Mark confirmed. Returns false (and changes nothing) if already settled.
    pub fn confirm(&mut self, block_height: u64) -> bool {
        self.settle(AttemptOutcome::Confirmed { block_height })
    }

    /// Mark failed. Returns false (and changes nothing) if already settled.
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        self.settle(AttemptOutcome::Failed {
            reason: reason.into(),
        })
    }

    fn settle(&mut self, outcome: AttemptOutcome) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.outcome = outcome;
        true
    }
}
