//! Periodic driver for a [`Connection`].
//!
//! Every tick either advances a live connection or, when disconnected, starts
//! a new connect. Reconnects are rate-limited by the retry interval and only
//! attempted while the backend process is known to be running.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::connection::Connection;
use crate::types::{ClientConfig, ConnectionState};

/// Answers "is the backend process running right now?".
///
/// Consulted before every reconnect; a `false` skips the attempt without
/// touching the network.
pub trait BackendProbe: Send + Sync {
    fn backend_available(&self) -> bool;
}

impl<F> BackendProbe for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn backend_available(&self) -> bool {
        self()
    }
}

/// Probe for setups where the backend is started out of band.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAvailable;

impl BackendProbe for AlwaysAvailable {
    fn backend_available(&self) -> bool {
        true
    }
}

/// What a single [`Scheduler::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The connection was busy (a tick in flight or a caller holding it).
    Skipped,
    /// Disconnected, but the retry interval has not passed yet.
    Waiting,
    /// Disconnected, and the probe says the backend is not running.
    BackendAbsent,
    ConnectStarted,
    Ticked,
}

pub struct Scheduler {
    connection: Arc<Mutex<Connection>>,
    probe: Arc<dyn BackendProbe>,
    last_attempt: StdMutex<Option<Instant>>,
    host: String,
    port: u16,
    tick_interval: Duration,
    retry_interval: Duration,
}

impl Scheduler {
    pub fn new(
        config: &ClientConfig,
        connection: Arc<Mutex<Connection>>,
        probe: Arc<dyn BackendProbe>,
    ) -> Self {
        Self {
            connection,
            probe,
            last_attempt: StdMutex::new(None),
            host: config.host.clone(),
            port: config.port,
            tick_interval: config.tick_interval(),
            retry_interval: config.retry_interval(),
        }
    }

    /// Run one tick.
    ///
    /// Never waits for the connection: if another tick or a caller holds it,
    /// this tick is dropped and [`TickOutcome::Skipped`] is returned.
    pub async fn step(&self) -> TickOutcome {
        let Ok(mut connection) = self.connection.try_lock() else {
            tracing::trace!("Connection busy, skipping tick");
            return TickOutcome::Skipped;
        };

        if connection.state() != ConnectionState::Disconnected {
            connection.tick().await;
            return TickOutcome::Ticked;
        }

        if !self.retry_due() {
            return TickOutcome::Waiting;
        }
        if !self.probe.backend_available() {
            tracing::trace!("Backend not running, skipping connect");
            return TickOutcome::BackendAbsent;
        }

        connection.connect(&self.host, self.port);
        TickOutcome::ConnectStarted
    }

    /// First call always passes; later ones once per retry interval.
    fn retry_due(&self) -> bool {
        let mut last = self
            .last_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.retry_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Coarse while disconnected, fine once a connect is under way.
    ///
    /// A busy connection gets the fine interval so the skipped tick is retried soon.
    #[must_use]
    pub fn next_interval(&self) -> Duration {
        match self.connection.try_lock().map(|connection| connection.state()) {
            Ok(ConnectionState::Disconnected) => self.retry_interval,
            Ok(ConnectionState::Connecting | ConnectionState::Connected) | Err(_) => {
                self.tick_interval
            }
        }
    }

    /// Drive the connection on a background task until the handle shuts it down.
    #[must_use]
    pub fn spawn(self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        SchedulerHandle { cancel, task }
    }

    async fn run(self, cancel: CancellationToken) {
        tracing::debug!(host = %self.host, port = self.port, "Scheduler started");
        while !cancel.is_cancelled() {
            self.step().await;
            let interval = self.next_interval();
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }

        // Taking the lock waits out any tick still in flight.
        self.connection.lock().await.disconnect(true).await;
        tracing::info!("Scheduler stopped");
    }
}

pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop ticking, say goodbye to the backend, and wait for the task to end.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!("Scheduler task failed: {e}");
        }
    }
}
