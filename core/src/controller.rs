//! Run Controller - start/stop lifecycle for the mint loop
//!
//! Owns the run state and the handle of the active loop task. `start()`
//! validates credentials, builds a client through the `Connector` and spawns
//! a `SubmissionLoop`; `stop()` only flips state, the loop notices at its next
//! decision point.
//!
//! Must be used from inside a tokio runtime.

use std::sync::Arc;

use alloy::primitives::Address;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::balance::{self, BalanceSnapshot};
use crate::chain::{ChainClient, Connector, Credentials};
use crate::consts::{LOG_STARTED, LOG_STOPPED};
use crate::error::{ConfigError, RefreshError};
use crate::event_log::{EventLog, LogEntry, LogSubscription};
use crate::state::{AttemptRecord, LoopPhase, RunState};
use crate::submission::{LoopConfig, SharedState, SubmissionLoop};
use crate::target::MintTarget;

pub struct RunController<K: Connector> {
    connector: Arc<K>,
    config: LoopConfig,
    shared: Arc<SharedState>,
    task: Option<JoinHandle<()>>,
}

impl<K: Connector> RunController<K> {
    pub fn new(connector: K, config: LoopConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            shared: Arc::new(SharedState::new()),
            task: None,
        }
    }

    /// Begin minting. No-op while already running.
    ///
    /// If a previous run is still settling its last confirmation, the new
    /// loop waits for it before its first cycle.
    pub fn start(&mut self, credentials: Option<&str>, target: MintTarget) -> Result<(), ConfigError> {
        if self.state() == RunState::Running {
            debug!("start() ignored: already running");
            return Ok(());
        }

        let credentials = Credentials::parse(credentials)?;
        let client = Arc::new(self.connector.connect(&credentials)?);

        let Some(generation) = self.shared.begin_run() else {
            return Ok(());
        };
        self.shared.log.append(LOG_STARTED);

        let submission = SubmissionLoop::new(
            client,
            Arc::clone(&self.shared),
            target,
            self.config,
            generation,
        );
        let previous = self.task.take();
        self.task = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    warn!("Previous mint loop ended abnormally: {}", e);
                }
            }
            submission.run().await;
        }));

        Ok(())
    }

    /// Stop scheduling new attempts. No-op unless running.
    pub fn stop(&self) {
        if self.shared.end_run() {
            self.shared.log.append(LOG_STOPPED);
        }
    }

    /// Wait for the loop task to exit (after stop() or a failure)
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Mint loop ended abnormally: {}", e);
            }
        }
    }

    pub fn state(&self) -> RunState {
        self.shared.lock().run_state
    }

    pub fn phase(&self) -> LoopPhase {
        self.shared.lock().phase
    }

    pub fn can_start(&self) -> bool {
        self.state() != RunState::Running
    }

    pub fn can_stop(&self) -> bool {
        self.state() == RunState::Running
    }

    pub fn last_confirmed_block(&self) -> Option<u64> {
        self.shared.lock().last_confirmed_block
    }

    /// Most recent attempts (bounded history), oldest first
    pub fn attempts(&self) -> Vec<AttemptRecord> {
        self.shared.lock().attempts.iter().cloned().collect()
    }

    pub fn log(&self) -> &EventLog {
        &self.shared.log
    }

    /// Hand log entries to `on_entry` until the run leaves Running.
    ///
    /// Every transition out of Running (stop() or a fail-stop) appends an
    /// entry after the state change, so the state is rechecked after each
    /// wake-up. A superseded run's failure line does not end this.
    pub async fn follow_log(&self, log: &mut LogSubscription, mut on_entry: impl FnMut(&LogEntry)) {
        loop {
            log.drain().iter().for_each(&mut on_entry);
            if self.state() != RunState::Running {
                return;
            }
            match log.next().await {
                Some(entry) => on_entry(&entry),
                None => return,
            }
        }
    }

    pub fn balances(&self) -> watch::Receiver<BalanceSnapshot> {
        self.shared.balances.subscribe()
    }

    /// Handle for refreshing balances outside the loop (account/token changed)
    pub fn balance_refresher(&self) -> BalanceRefresher<K> {
        BalanceRefresher {
            connector: Arc::clone(&self.connector),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K: Connector> Drop for RunController<K> {
    /// A dropped controller leaves no handle to stop its loop, so end the run
    fn drop(&mut self) {
        self.stop();
    }
}

/// Display-only balance refresh. Publishes to the same snapshot channel the
/// loop uses, never touches run state.
pub struct BalanceRefresher<K: Connector> {
    connector: Arc<K>,
    shared: Arc<SharedState>,
}

impl<K: Connector> Clone for BalanceRefresher<K> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K: Connector> BalanceRefresher<K> {
    pub async fn refresh(
        &self,
        credentials: Option<&str>,
        token: Address,
    ) -> Result<BalanceSnapshot, RefreshError> {
        let credentials = Credentials::parse(credentials)?;
        let client = self.connector.connect(&credentials)?;
        let snapshot = balance::refresh(&client, client.account(), token).await?;
        self.shared.balances.send_replace(snapshot);
        Ok(snapshot)
    }
}
