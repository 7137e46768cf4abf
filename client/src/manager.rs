//! `DiagnosticsClient`: the facade consumers hold on to.
//!
//! Construction IS start-up: `start()` spawns the scheduler, which connects
//! as soon as the backend is available. Queries go straight to the shared
//! store and never wait on the socket.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};

use crate::connection::Connection;
use crate::diagnostics::DiagnosticsStore;
use crate::scheduler::{BackendProbe, Scheduler, SchedulerHandle};
use crate::types::{
    ClientConfig, ConnectionState, Diagnostic, DiagnosticsChanged, DiagnosticsMessage,
    DiagnosticsSnapshot,
};

pub struct DiagnosticsClient {
    connection: Arc<Mutex<Connection>>,
    store: DiagnosticsStore,
    changes: broadcast::Sender<DiagnosticsChanged>,
    scheduler: SchedulerHandle,
}

impl DiagnosticsClient {
    /// Build the connection and start ticking it in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: ClientConfig, probe: impl BackendProbe + 'static) -> Self {
        tracing::info!(
            "Starting diagnostics client for {}:{}",
            config.host,
            config.port
        );

        let connection = Connection::new(config.clone());
        let store = connection.store().clone();
        let changes = connection.change_sender();
        let connection = Arc::new(Mutex::new(connection));

        let scheduler = Scheduler::new(&config, Arc::clone(&connection), Arc::new(probe)).spawn();

        Self {
            connection,
            store,
            changes,
            scheduler,
        }
    }

    /// Debounced change signal. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<DiagnosticsChanged> {
        self.changes.subscribe()
    }

    #[must_use]
    pub fn diagnostics_for(&self, path: &str) -> Option<DiagnosticsMessage> {
        self.store.get(path)
    }

    #[must_use]
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        self.store.snapshot()
    }

    /// Errors (no warnings or infos) for the given files, skipping clean ones.
    #[must_use]
    pub fn errors_for_files(&self, paths: &[&str]) -> Vec<(String, Vec<Diagnostic>)> {
        self.store.errors_for_files(paths)
    }

    /// Clonable read-only handle for other threads.
    #[must_use]
    pub fn store(&self) -> DiagnosticsStore {
        self.store.clone()
    }

    /// The underlying connection, for callers that need to send or inspect it.
    ///
    /// While a caller holds the lock, the scheduler skips its ticks.
    #[must_use]
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.connection)
    }

    pub async fn state(&self) -> ConnectionState {
        self.connection.lock().await.state()
    }

    /// Stop the scheduler and disconnect, telling the backend we're leaving.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down diagnostics client");
        self.scheduler.shutdown().await;
    }
}
