use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{address, Address, U256};
use async_trait::async_trait;
use mint_core::{
    AttemptOutcome, BalanceSnapshot, ChainClient, ChainError, ConfigError, Confirmation, Connector,
    Credentials, EventLog, LoopConfig, LoopPhase, MintTarget, PayableCall, RefreshError,
    RunController, RunState,
};
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};

// ============================================================================
// Scripted chain
// ============================================================================

const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
const ACCOUNT: Address = address!("00000000000000000000000000000000000000a1");
const TOKEN: Address = address!("00000000000000000000000000000000000000bb");
const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
enum Poll {
    Height(u64),
    Down,
}

#[derive(Debug, Clone, Copy)]
enum Inclusion {
    /// Included in the block the attempt was raced for
    AtPollHeight,
    Revert,
    Hang,
}

#[derive(Default)]
struct Script {
    polls: VecDeque<Poll>,
    /// Repeated once `polls` runs out
    last_height: u64,
    inclusions: VecDeque<Inclusion>,
    submit_errors: VecDeque<ChainError>,
}

#[derive(Default)]
struct ScriptedChain {
    script: Mutex<Script>,
    poll_count: AtomicUsize,
    /// (poll number, height) at each submission
    submissions: Mutex<Vec<(usize, u64)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    balance_queries_fail: AtomicBool,
    submitted: Notify,
    /// When set, inclusion waits for a permit
    gate: Option<Notify>,
}

impl ScriptedChain {
    fn new(polls: impl IntoIterator<Item = Poll>) -> Arc<Self> {
        Arc::new(Self::with_polls(polls))
    }

    fn gated(polls: impl IntoIterator<Item = Poll>) -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Notify::new()),
            ..Self::with_polls(polls)
        })
    }

    fn with_polls(polls: impl IntoIterator<Item = Poll>) -> Self {
        let chain = Self::default();
        chain.push_polls(polls);
        chain
    }

    fn push_polls(&self, polls: impl IntoIterator<Item = Poll>) {
        self.script.lock().unwrap().polls.extend(polls);
    }

    fn push_inclusions(&self, inclusions: impl IntoIterator<Item = Inclusion>) {
        self.script.lock().unwrap().inclusions.extend(inclusions);
    }

    fn push_submit_error(&self, error: ChainError) {
        self.script.lock().unwrap().submit_errors.push_back(error);
    }

    fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    fn submissions(&self) -> Vec<(usize, u64)> {
        self.submissions.lock().unwrap().clone()
    }

    fn polls(&self) -> usize {
        self.poll_count.load(Ordering::SeqCst)
    }
}

struct ChainHandle(Arc<ScriptedChain>);

#[async_trait]
impl ChainClient for ChainHandle {
    type Pending = u64;

    fn account(&self) -> Address {
        ACCOUNT
    }

    async fn block_height(&self) -> Result<u64, ChainError> {
        self.0.poll_count.fetch_add(1, Ordering::SeqCst);
        let mut script = self.0.script.lock().unwrap();
        match script.polls.pop_front() {
            Some(Poll::Height(h)) => {
                script.last_height = h;
                Ok(h)
            }
            Some(Poll::Down) => Err(ChainError::Network("connection refused".to_string())),
            None => Ok(script.last_height),
        }
    }

    async fn native_balance(&self, _account: Address) -> Result<U256, ChainError> {
        if self.0.balance_queries_fail.load(Ordering::SeqCst) {
            return Err(ChainError::Query("eth_getBalance".to_string()));
        }
        Ok(U256::from(5u64) * U256::from(10u64).pow(U256::from(18)))
    }

    async fn token_balance(&self, _token: Address, _account: Address) -> Result<U256, ChainError> {
        if self.0.balance_queries_fail.load(Ordering::SeqCst) {
            return Err(ChainError::Query("balanceOf".to_string()));
        }
        Ok(U256::from(self.0.submissions.lock().unwrap().len()))
    }

    async fn submit_payable_call(&self, call: PayableCall) -> Result<u64, ChainError> {
        assert_eq!(call.value, MintTarget::new(TOKEN).value);

        let height = {
            let mut script = self.0.script.lock().unwrap();
            if let Some(error) = script.submit_errors.pop_front() {
                return Err(error);
            }
            script.last_height
        };

        let now = self.0.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.0
            .submissions
            .lock()
            .unwrap()
            .push((self.0.polls(), height));
        self.0.submitted.notify_one();
        Ok(height)
    }

    async fn await_inclusion(&self, pending: u64) -> Result<Confirmation, ChainError> {
        if let Some(gate) = &self.0.gate {
            gate.notified().await;
        }
        let inclusion = self
            .0
            .script
            .lock()
            .unwrap()
            .inclusions
            .pop_front()
            .unwrap_or(Inclusion::AtPollHeight);

        let result = match inclusion {
            Inclusion::AtPollHeight => Ok(Confirmation {
                block_height: pending,
            }),
            Inclusion::Revert => Err(ChainError::Confirmation("execution reverted".to_string())),
            Inclusion::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        };
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

struct ScriptedConnector(Arc<ScriptedChain>);

impl Connector for ScriptedConnector {
    type Client = ChainHandle;

    fn connect(&self, _credentials: &Credentials) -> Result<ChainHandle, ConfigError> {
        Ok(ChainHandle(Arc::clone(&self.0)))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn fast_config() -> LoopConfig {
    LoopConfig {
        poll_interval: Duration::from_millis(5),
        confirmation_timeout: Duration::from_secs(2),
        max_backoff: Duration::from_millis(20),
    }
}

fn controller(chain: &Arc<ScriptedChain>, config: LoopConfig) -> RunController<ScriptedConnector> {
    RunController::new(ScriptedConnector(Arc::clone(chain)), config)
}

fn target() -> MintTarget {
    MintTarget::new(TOKEN)
}

/// Wait until `message` has been logged `count` times in total
async fn wait_for_log(log: &EventLog, message: &str, count: usize) {
    let mut sub = log.subscribe();
    let mut seen = 0;
    timeout(WAIT, async {
        while let Some(entry) = sub.next().await {
            if entry.message == message {
                seen += 1;
                if seen == count {
                    return;
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for '{}' x{}", message, count));
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ============================================================================
// Controller contract
// ============================================================================

#[tokio::test]
async fn test_start_rejects_missing_or_bad_credentials() {
    let chain = ScriptedChain::new([Poll::Height(1)]);
    let mut ctl = controller(&chain, fast_config());

    assert_eq!(ctl.start(None, target()), Err(ConfigError::MissingCredentials));
    assert!(matches!(
        ctl.start(Some("0x1234"), target()),
        Err(ConfigError::InvalidCredentials(_))
    ));

    assert_eq!(ctl.state(), RunState::Idle);
    assert!(ctl.log().is_empty());
    assert_eq!(chain.polls(), 0);
}

#[tokio::test]
async fn test_start_is_idempotent_and_stop_is_noop_when_not_running() {
    let chain = ScriptedChain::new([Poll::Height(10)]);
    let mut ctl = controller(&chain, fast_config());

    ctl.stop();
    assert!(ctl.log().is_empty());
    assert!(ctl.can_start());
    assert!(!ctl.can_stop());

    ctl.start(Some(KEY), target()).unwrap();
    ctl.start(Some(KEY), target()).unwrap();
    assert_eq!(ctl.state(), RunState::Running);
    assert!(!ctl.can_start());
    assert!(ctl.can_stop());

    wait_for_log(ctl.log(), "Minted at block 10", 1).await;
    ctl.stop();
    ctl.stop();
    ctl.join().await;

    assert_eq!(ctl.state(), RunState::Stopped);
    assert_eq!(ctl.phase(), LoopPhase::Halted);
    assert_eq!(
        ctl.log().messages(),
        vec!["Minting started", "Minted at block 10", "Minting stopped"]
    );
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_same_height_is_not_resubmitted() {
    // Poll 1 mints block 100; polls 2-3 still see 100; poll 4 sees 101
    let chain = ScriptedChain::new([
        Poll::Height(100),
        Poll::Height(100),
        Poll::Height(100),
        Poll::Height(101),
    ]);
    let mut ctl = controller(&chain, fast_config());

    ctl.start(Some(KEY), target()).unwrap();
    wait_for_log(ctl.log(), "Minted at block 101", 1).await;
    ctl.stop();
    ctl.join().await;

    assert_eq!(chain.submissions(), vec![(1, 100), (4, 101)]);
    assert_eq!(ctl.last_confirmed_block(), Some(101));
    assert_eq!(ctl.attempts().len(), 2);
}

#[tokio::test]
async fn test_confirmation_starts_next_cycle_without_delay() {
    let chain = ScriptedChain::new([Poll::Height(101)]);
    // A poll delay long enough that only an immediate re-poll can pass
    let config = LoopConfig {
        poll_interval: Duration::from_secs(30),
        ..fast_config()
    };
    let mut ctl = controller(&chain, config);
    let mut balances = ctl.balances();

    ctl.start(Some(KEY), target()).unwrap();
    wait_for_log(ctl.log(), "Minted at block 101", 1).await;
    assert_eq!(ctl.last_confirmed_block(), Some(101));

    wait_until(|| chain.polls() >= 2).await;
    wait_until(|| ctl.phase() == LoopPhase::AwaitingBlock).await;

    timeout(WAIT, balances.wait_for(|b| b.native.base_units() > U256::ZERO))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(balances.borrow().native.to_string(), "5.0");

    ctl.stop();
    assert_eq!(chain.submissions().len(), 1);
    assert_eq!(
        ctl.attempts()[0].outcome,
        AttemptOutcome::Confirmed { block_height: 101 }
    );
}

#[tokio::test]
async fn test_revert_fails_stop_and_restart_resumes() {
    let chain = ScriptedChain::new([Poll::Height(100)]);
    chain.push_inclusions([Inclusion::Revert]);
    let mut ctl = controller(&chain, fast_config());

    ctl.start(Some(KEY), target()).unwrap();
    wait_for_log(ctl.log(), "Error: Mint failed", 1).await;
    ctl.join().await;

    assert_eq!(ctl.state(), RunState::Stopped);
    assert_eq!(ctl.phase(), LoopPhase::Halted);
    assert_eq!(ctl.last_confirmed_block(), None);
    assert!(matches!(
        &ctl.attempts()[0].outcome,
        AttemptOutcome::Failed { reason } if reason.contains("reverted")
    ));

    // stop() after a fail-stop changes nothing
    ctl.stop();
    assert_eq!(ctl.log().messages(), vec!["Minting started", "Error: Mint failed"]);

    // No submissions while stopped
    sleep(Duration::from_millis(30)).await;
    assert_eq!(chain.submissions().len(), 1);

    ctl.start(Some(KEY), target()).unwrap();
    wait_for_log(ctl.log(), "Minted at block 100", 1).await;
    ctl.stop();
    ctl.join().await;

    assert_eq!(
        ctl.log().messages(),
        vec![
            "Minting started",
            "Error: Mint failed",
            "Minting started",
            "Minted at block 100",
            "Minting stopped",
        ]
    );
}

#[tokio::test]
async fn test_stop_during_confirmation_lets_it_settle() {
    let chain = ScriptedChain::gated([Poll::Height(100), Poll::Height(101)]);
    let mut ctl = controller(&chain, fast_config());
    let mut balances = ctl.balances();

    ctl.start(Some(KEY), target()).unwrap();
    timeout(WAIT, chain.submitted.notified()).await.unwrap();
    wait_until(|| ctl.phase() == LoopPhase::AwaitingConfirmation).await;

    ctl.stop();
    assert_eq!(ctl.state(), RunState::Stopped);

    chain.release();
    ctl.join().await;

    assert_eq!(
        ctl.log().messages(),
        vec!["Minting started", "Minting stopped", "Minted at block 100"]
    );
    assert_eq!(ctl.last_confirmed_block(), Some(100));
    assert!(balances.has_changed().unwrap());
    assert_eq!(balances.borrow_and_update().token.base_units(), U256::from(1u64));

    // Height 101 was never polled: no further cycle began
    assert_eq!(chain.submissions(), vec![(1, 100)]);
    assert_eq!(chain.polls(), 1);
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn test_submission_error_fails_stop() {
    let chain = ScriptedChain::new([Poll::Height(7)]);
    chain.push_submit_error(ChainError::Submission("insufficient funds".to_string()));
    let mut ctl = controller(&chain, fast_config());

    ctl.start(Some(KEY), target()).unwrap();
    ctl.join().await;

    assert_eq!(ctl.state(), RunState::Stopped);
    assert_eq!(ctl.log().messages(), vec!["Minting started", "Error: Mint failed"]);
    assert_eq!(ctl.attempts().len(), 1);
    assert!(chain.submissions().is_empty());
}

#[tokio::test]
async fn test_confirmation_timeout_fails_stop() {
    let chain = ScriptedChain::new([Poll::Height(3)]);
    chain.push_inclusions([Inclusion::Hang]);
    let config = LoopConfig {
        confirmation_timeout: Duration::from_millis(50),
        ..fast_config()
    };
    let mut ctl = controller(&chain, config);

    ctl.start(Some(KEY), target()).unwrap();
    ctl.join().await;

    assert_eq!(ctl.state(), RunState::Stopped);
    assert!(matches!(
        &ctl.attempts()[0].outcome,
        AttemptOutcome::Failed { reason } if reason.contains("timed out")
    ));
    let errors = ctl
        .log()
        .messages()
        .into_iter()
        .filter(|m| m == "Error: Mint failed")
        .count();
    assert_eq!(errors, 1);
}

#[tokio::test]
async fn test_network_errors_while_polling_are_retried() {
    let chain = ScriptedChain::new([Poll::Down, Poll::Down, Poll::Down, Poll::Height(50)]);
    let mut ctl = controller(&chain, fast_config());

    ctl.start(Some(KEY), target()).unwrap();
    wait_for_log(ctl.log(), "Minted at block 50", 1).await;
    assert_eq!(ctl.state(), RunState::Running);
    ctl.stop();
    ctl.join().await;

    assert_eq!(chain.submissions(), vec![(4, 50)]);
    assert!(!ctl.log().messages().iter().any(|m| m.starts_with("Error")));
}

#[tokio::test]
async fn test_balance_failure_does_not_stop_run() {
    let chain = ScriptedChain::new([Poll::Height(20), Poll::Height(21)]);
    chain.balance_queries_fail.store(true, Ordering::SeqCst);
    let mut ctl = controller(&chain, fast_config());
    let balances = ctl.balances();

    ctl.start(Some(KEY), target()).unwrap();
    wait_for_log(ctl.log(), "Minted at block 21", 1).await;
    assert_eq!(ctl.state(), RunState::Running);
    ctl.stop();
    ctl.join().await;

    assert_eq!(*balances.borrow(), BalanceSnapshot::default());
}

// ============================================================================
// Invariants
// ============================================================================

#[tokio::test]
async fn test_single_flight_across_restart() {
    let chain = ScriptedChain::gated([Poll::Height(100)]);
    let mut ctl = controller(&chain, fast_config());

    ctl.start(Some(KEY), target()).unwrap();
    timeout(WAIT, chain.submitted.notified()).await.unwrap();

    // Restart while the first confirmation is still outstanding
    ctl.stop();
    ctl.start(Some(KEY), target()).unwrap();
    sleep(Duration::from_millis(30)).await;
    assert_eq!(chain.submissions().len(), 1);

    chain.release();
    wait_for_log(ctl.log(), "Minted at block 100", 1).await;

    chain.push_polls([Poll::Height(101)]);
    timeout(WAIT, chain.submitted.notified()).await.unwrap();
    chain.release();
    wait_for_log(ctl.log(), "Minted at block 101", 1).await;

    ctl.stop();
    ctl.join().await;

    assert_eq!(chain.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(chain.submissions().iter().map(|s| s.1).collect::<Vec<_>>(), vec![100, 101]);
    assert_eq!(ctl.attempts().iter().filter(|a| a.is_pending()).count(), 0);
}

#[tokio::test]
async fn test_log_indices_strictly_increase() {
    let chain = ScriptedChain::new([Poll::Height(1), Poll::Height(2), Poll::Height(3)]);
    let mut ctl = controller(&chain, fast_config());

    ctl.start(Some(KEY), target()).unwrap();
    wait_for_log(ctl.log(), "Minted at block 3", 1).await;
    ctl.stop();
    ctl.join().await;

    let entries = ctl.log().snapshot();
    assert_eq!(entries.len(), 5);
    for pair in entries.windows(2) {
        assert_eq!(pair[1].index, pair[0].index + 1);
        assert!(pair[1].at >= pair[0].at);
    }
}

#[tokio::test]
async fn test_balance_refresher_publishes_snapshot() {
    let chain = ScriptedChain::new(Vec::new());
    let ctl = controller(&chain, fast_config());
    let balances = ctl.balances();
    let refresher = ctl.balance_refresher();

    let snapshot = refresher.refresh(Some(KEY), TOKEN).await.unwrap();
    assert_eq!(snapshot.native.to_string(), "5.0");
    assert_eq!(snapshot.token_address, TOKEN);
    assert_eq!(*balances.borrow(), snapshot);
    assert_eq!(ctl.state(), RunState::Idle);

    let err = refresher.refresh(None, TOKEN).await.unwrap_err();
    assert_eq!(err, RefreshError::Config(ConfigError::MissingCredentials));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_dropping_controller_ends_the_run() {
    let chain = ScriptedChain::new([Poll::Height(1)]);
    let log = {
        let mut ctl = controller(&chain, fast_config());
        ctl.start(Some(KEY), target()).unwrap();
        wait_for_log(ctl.log(), "Minted at block 1", 1).await;
        ctl.log().clone()
    };

    // New blocks keep arriving after the controller is gone
    chain.push_polls([Poll::Height(2), Poll::Height(3)]);
    sleep(Duration::from_millis(50)).await;

    assert_eq!(chain.submissions(), vec![(1, 1)]);
    assert_eq!(
        log.messages(),
        vec!["Minting started", "Minted at block 1", "Minting stopped"]
    );
}

#[tokio::test]
async fn test_follow_log_returns_on_fail_stop() {
    let chain = ScriptedChain::new([Poll::Height(9)]);
    chain.push_inclusions([Inclusion::Revert]);
    let mut ctl = controller(&chain, fast_config());
    let mut sub = ctl.log().subscribe();

    ctl.start(Some(KEY), target()).unwrap();
    let mut seen = Vec::new();
    timeout(WAIT, ctl.follow_log(&mut sub, |e| seen.push(e.message.clone())))
        .await
        .expect("follow_log should end once the run fail-stops");

    assert_eq!(seen, vec!["Minting started", "Error: Mint failed"]);
    assert_eq!(ctl.state(), RunState::Stopped);
    ctl.join().await;
}

#[tokio::test]
async fn test_superseded_failure_does_not_end_follow_log() {
    let chain = ScriptedChain::gated([Poll::Height(100)]);
    chain.push_inclusions([Inclusion::Revert]);
    let mut ctl = controller(&chain, fast_config());
    let mut sub = ctl.log().subscribe();

    ctl.start(Some(KEY), target()).unwrap();
    timeout(WAIT, chain.submitted.notified()).await.unwrap();
    ctl.stop();
    ctl.start(Some(KEY), target()).unwrap();

    // The first run's attempt reverts after it was superseded
    chain.release();
    wait_for_log(ctl.log(), "Error: Mint failed", 1).await;
    assert_eq!(ctl.state(), RunState::Running);

    let mut seen = Vec::new();
    let followed = timeout(
        Duration::from_millis(50),
        ctl.follow_log(&mut sub, |e| seen.push(e.message.clone())),
    )
    .await;
    assert!(followed.is_err(), "healthy run must keep being followed");
    assert!(seen.iter().any(|m| m == "Error: Mint failed"));

    ctl.stop();
    chain.release();
    ctl.join().await;
    assert_eq!(chain.max_in_flight.load(Ordering::SeqCst), 1);
}
