//! Submission Loop - races one mint call into each new block
//!
//! Runs as a single tokio task per run. Each cycle:
//! 1. poll block height (network errors → bounded backoff, retry)
//! 2. same height as the last confirmed mint → wait poll interval, retry
//! 3. submit the payable mint call, record a pending attempt
//! 4. await inclusion (bounded) → log, refresh balances, next cycle at once
//! 5. any submit/confirm failure → log, stop the run (no auto-retry)
//!
//! The stop flag is only honored at decision points; an in-flight
//! confirmation always settles and is recorded.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::balance::{self, BalanceSnapshot};
use crate::chain::ChainClient;
use crate::consts::{
    ATTEMPT_HISTORY_LIMIT, CONFIRMATION_TIMEOUT, LOG_MINT_FAILED, MAX_NETWORK_BACKOFF, POLL_INTERVAL,
};
use crate::error::ChainError;
use crate::event_log::EventLog;
use crate::state::{AttemptRecord, LoopPhase, RunState};
use crate::target::MintTarget;

/// Timing knobs for the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Wait between polls while the height has not moved past the last mint
    pub poll_interval: Duration,
    /// Upper bound on one inclusion wait; expiry is a failed attempt
    pub confirmation_timeout: Duration,
    /// Cap for the doubling backoff after failed height polls
    pub max_backoff: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            confirmation_timeout: CONFIRMATION_TIMEOUT,
            max_backoff: MAX_NETWORK_BACKOFF,
        }
    }
}

/// Submit only when the height differs from the last confirmed mint.
///
/// Equality, not ordering: a height that moves backwards counts as new.
pub fn should_submit(height: u64, last_confirmed_block: Option<u64>) -> bool {
    last_confirmed_block != Some(height)
}

/// Mutable run state shared by the controller and the loop task
#[derive(Debug, Default)]
pub(crate) struct ControlState {
    pub(crate) run_state: RunState,
    /// Bumped by every start(); a loop task only acts while it matches
    pub(crate) generation: u64,
    pub(crate) last_confirmed_block: Option<u64>,
    /// Newest attempts, oldest first; older settled records are evicted
    pub(crate) attempts: VecDeque<AttemptRecord>,
    /// Records evicted from the front so far. Attempt ids are absolute.
    attempts_evicted: usize,
    pub(crate) phase: LoopPhase,
}

impl ControlState {
    fn attempt_mut(&mut self, id: usize) -> Option<&mut AttemptRecord> {
        let position = id.checked_sub(self.attempts_evicted)?;
        self.attempts.get_mut(position)
    }
}

/// Everything a run touches: one mutex for control state, plus the log and
/// balance channel which have their own synchronization
pub(crate) struct SharedState {
    control: Mutex<ControlState>,
    history_limit: usize,
    pub(crate) log: EventLog,
    pub(crate) balances: watch::Sender<BalanceSnapshot>,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self::with_history_limit(ATTEMPT_HISTORY_LIMIT)
    }

    pub(crate) fn with_history_limit(history_limit: usize) -> Self {
        let (balances, _) = watch::channel(BalanceSnapshot::default());
        Self {
            control: Mutex::new(ControlState::default()),
            history_limit: history_limit.max(1),
            log: EventLog::new(),
            balances,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Idle/Stopped → Running. Returns the new generation, or None if already running.
    pub(crate) fn begin_run(&self) -> Option<u64> {
        let mut control = self.lock();
        if control.run_state == RunState::Running {
            return None;
        }
        control.run_state = RunState::Running;
        control.generation += 1;
        Some(control.generation)
    }

    /// Running → Stopped. Returns false if the run was not active.
    pub(crate) fn end_run(&self) -> bool {
        let mut control = self.lock();
        if control.run_state != RunState::Running {
            return false;
        }
        control.run_state = RunState::Stopped;
        true
    }

    fn is_current_run(&self, generation: u64) -> bool {
        let control = self.lock();
        control.generation == generation && control.run_state == RunState::Running
    }

    fn set_phase(&self, generation: u64, phase: LoopPhase) {
        let mut control = self.lock();
        if control.generation == generation {
            control.phase = phase;
        }
    }

    fn last_confirmed_block(&self) -> Option<u64> {
        self.lock().last_confirmed_block
    }

    /// Decision point: record a pending attempt if this run may still submit.
    /// Returns the attempt id.
    fn begin_attempt(&self, generation: u64, height: u64) -> Option<usize> {
        let mut control = self.lock();
        if control.generation != generation || control.run_state != RunState::Running {
            return None;
        }
        // Only the newest record can be pending
        debug_assert!(
            !control.attempts.back().is_some_and(AttemptRecord::is_pending),
            "second attempt started while one is pending"
        );
        if control.attempts.len() >= self.history_limit {
            control.attempts.pop_front();
            control.attempts_evicted += 1;
        }
        control.attempts.push_back(AttemptRecord::pending(height));
        control.phase = LoopPhase::Submitting;
        Some(control.attempts_evicted + control.attempts.len() - 1)
    }

    fn record_confirmed(&self, generation: u64, attempt: usize, block_height: u64) {
        let mut control = self.lock();
        if let Some(record) = control.attempt_mut(attempt) {
            record.confirm(block_height);
        }
        // Never moves backwards, even if a reorged confirmation reports a lower block
        control.last_confirmed_block = Some(
            control
                .last_confirmed_block
                .map_or(block_height, |last| last.max(block_height)),
        );
        if control.generation == generation {
            control.phase = LoopPhase::Confirmed;
        }
    }

    /// Settle the attempt as failed and stop the run it belongs to
    fn record_failed(&self, generation: u64, attempt: usize, reason: String) {
        let mut control = self.lock();
        if let Some(record) = control.attempt_mut(attempt) {
            record.fail(reason);
        }
        if control.generation == generation {
            control.phase = LoopPhase::Failed;
            if control.run_state == RunState::Running {
                control.run_state = RunState::Stopped;
            }
        }
    }
}

/// One run of the mint loop
pub(crate) struct SubmissionLoop<C: ChainClient> {
    client: Arc<C>,
    shared: Arc<SharedState>,
    target: MintTarget,
    config: LoopConfig,
    generation: u64,
}

impl<C: ChainClient> SubmissionLoop<C> {
    pub(crate) fn new(
        client: Arc<C>,
        shared: Arc<SharedState>,
        target: MintTarget,
        config: LoopConfig,
        generation: u64,
    ) -> Self {
        Self {
            client,
            shared,
            target,
            config,
            generation,
        }
    }

    pub(crate) async fn run(self) {
        info!(
            "Mint loop #{} started (contract {}, token {}, value {} wei)",
            self.generation, self.target.contract, self.target.token, self.target.value
        );

        let mut backoff = self.config.poll_interval;

        loop {
            if !self.shared.is_current_run(self.generation) {
                break;
            }
            self.shared.set_phase(self.generation, LoopPhase::AwaitingBlock);

            let height = match self.client.block_height().await {
                Ok(height) => {
                    backoff = self.config.poll_interval;
                    height
                }
                Err(e) => {
                    warn!("Height poll failed: {} (retrying in {:?})", e, backoff);
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(self.config.max_backoff);
                    continue;
                }
            };

            if !should_submit(height, self.shared.last_confirmed_block()) {
                debug!("Skipping mint: same block number {}", height);
                sleep(self.config.poll_interval).await;
                continue;
            }

            if !self.attempt(height).await {
                break;
            }
        }

        self.shared.set_phase(self.generation, LoopPhase::Halted);
        info!("Mint loop #{} halted", self.generation);
    }

    /// Submit and settle one attempt. Returns whether the loop should go on.
    async fn attempt(&self, height: u64) -> bool {
        let Some(attempt) = self.shared.begin_attempt(self.generation, height) else {
            return false;
        };
        debug!("Submitting mint at height {}", height);

        match self.submit_and_confirm().await {
            Ok(block_height) => {
                self.shared
                    .record_confirmed(self.generation, attempt, block_height);
                self.shared
                    .log
                    .append(format!("Minted at block {}", block_height));
                self.refresh_balances().await;
                true
            }
            Err(e) => {
                error!("Mint attempt at height {} failed: {}", height, e);
                self.shared
                    .record_failed(self.generation, attempt, e.to_string());
                self.shared.log.append(LOG_MINT_FAILED);
                false
            }
        }
    }

    async fn submit_and_confirm(&self) -> Result<u64, ChainError> {
        let pending = self
            .client
            .submit_payable_call(self.target.payable_call())
            .await?;
        self.shared
            .set_phase(self.generation, LoopPhase::AwaitingConfirmation);

        let confirmation = timeout(
            self.config.confirmation_timeout,
            self.client.await_inclusion(pending),
        )
        .await
        .map_err(|_| ChainError::Timeout(self.config.confirmation_timeout))??;

        Ok(confirmation.block_height)
    }

    /// Balance failures are reported but never stop the run
    async fn refresh_balances(&self) {
        let account = self.client.account();
        match balance::refresh(self.client.as_ref(), account, self.target.token).await {
            Ok(snapshot) => {
                self.shared.balances.send_replace(snapshot);
            }
            Err(e) => {
                warn!("Balance refresh failed, keeping previous snapshot: {}", e);
            }
        }
    }
}
