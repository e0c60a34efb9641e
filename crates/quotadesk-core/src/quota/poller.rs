use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use crate::auth::SessionState;

use super::QuotaSource;

/// How often the balance is re-fetched while authenticated.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(30_000);

/// Shortest interval accepted; `tokio::time::interval` rejects zero.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Queued manual refreshes beyond this are dropped; one pending is enough.
const COMMAND_BUFFER_SIZE: usize = 4;

#[derive(Debug)]
enum Command {
    Refresh,
}

/// Builder for a quota polling task bound to a session.
pub struct QuotaPoller {
    source: Arc<dyn QuotaSource>,
    session: watch::Receiver<SessionState>,
    interval: Duration,
}

impl QuotaPoller {
    pub fn new(source: Arc<dyn QuotaSource>, session: watch::Receiver<SessionState>) -> Self {
        Self {
            source,
            session,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Spawn the polling task on the current tokio runtime.
    pub fn start(self) -> PollerHandle {
        let (balance_tx, balance_rx) = watch::channel(None);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER_SIZE);

        let task = PollTask {
            source: self.source,
            session: self.session,
            balance: Arc::new(balance_tx),
            commands: command_rx,
            interval: self.interval,
            fetches: JoinSet::new(),
        };

        PollerHandle {
            balance: balance_rx,
            commands: command_tx,
            task: Some(tokio::spawn(task.run())),
        }
    }
}

/// Owner of a running poller. Stopping or dropping the handle cancels the
/// ticker and any fetch still in flight.
pub struct PollerHandle {
    balance: watch::Receiver<Option<u64>>,
    commands: mpsc::Sender<Command>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Last known balance; `None` when unknown or signed out.
    pub fn balance(&self) -> Option<u64> {
        *self.balance.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<u64>> {
        self.balance.clone()
    }

    /// Fetch now, without touching the periodic schedule.
    pub fn refresh(&self) {
        if let Err(e) = self.commands.try_send(Command::Refresh) {
            debug!(error = %e, "Manual quota refresh not queued");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn stop(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Quota poller stopped");
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct PollTask {
    source: Arc<dyn QuotaSource>,
    session: watch::Receiver<SessionState>,
    balance: Arc<watch::Sender<Option<u64>>>,
    commands: mpsc::Receiver<Command>,
    interval: Duration,
    fetches: JoinSet<()>,
}

impl PollTask {
    async fn run(mut self) {
        loop {
            let authenticated = self.session.borrow_and_update().is_authenticated;
            if !authenticated {
                publish(&self.balance, None);
                if !self.wait_for_login().await {
                    break;
                }
            }

            debug!(interval_ms = self.interval.as_millis() as u64, "Polling quota balance");
            let keep_running = self.poll_while_authenticated().await;

            self.fetches.abort_all();
            publish(&self.balance, None);
            if !keep_running {
                break;
            }
            debug!("Session ended, quota polling paused");
        }
        publish(&self.balance, None);
    }

    /// Idle until the session becomes authenticated. Returns false if the
    /// session or the handle went away.
    async fn wait_for_login(&mut self) -> bool {
        loop {
            tokio::select! {
                changed = self.session.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                    if self.session.borrow_and_update().is_authenticated {
                        return true;
                    }
                }
                command = self.commands.recv() => match command {
                    Some(Command::Refresh) => publish(&self.balance, None),
                    None => return false,
                },
            }
        }
    }

    /// Fetch on every tick (the first tick is immediate) and on request,
    /// until authentication is lost. Returns false if the session or the
    /// handle went away.
    async fn poll_while_authenticated(&mut self) -> bool {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.spawn_fetch(),
                command = self.commands.recv() => match command {
                    Some(Command::Refresh) => self.spawn_fetch(),
                    None => return false,
                },
                changed = self.session.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                    if !self.session.borrow_and_update().is_authenticated {
                        return true;
                    }
                }
                Some(joined) = self.fetches.join_next(), if !self.fetches.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            warn!(error = %e, "Quota fetch panicked");
                        }
                    }
                }
            }
        }
    }

    fn spawn_fetch(&mut self) {
        let source = Arc::clone(&self.source);
        let balance = Arc::clone(&self.balance);
        let session = self.session.clone();

        self.fetches.spawn(async move {
            let result = source.fetch_balance().await;
            match result {
                Ok(value) if session.borrow().is_authenticated => {
                    debug!(balance = value, "Quota balance updated");
                    publish(&balance, Some(value));
                }
                Ok(_) => publish(&balance, None),
                Err(e) => {
                    warn!(error = %e, "Failed to fetch quota balance");
                    publish(&balance, None);
                }
            }
        });
    }
}

fn publish(balance: &watch::Sender<Option<u64>>, value: Option<u64>) {
    balance.send_if_modified(|current| {
        if *current == value {
            return false;
        }
        *current = value;
        true
    });
}
