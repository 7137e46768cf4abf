//! Client for the script compiler's debug server.
//!
//! Keeps one loopback TCP connection to the backend, decodes its
//! length-prefixed frames, and caches the latest diagnostics per file.
//! Consumers subscribe to a debounced change signal and query the cache.

pub mod codec;
pub mod protocol;
pub mod types;

pub(crate) mod diagnostics;
pub(crate) mod notifier;

mod connection;
mod manager;
mod scheduler;

pub use connection::{Connection, ConnectionError};
pub use diagnostics::DiagnosticsStore;
pub use manager::DiagnosticsClient;
pub use notifier::ChangeNotifier;
pub use protocol::MessageType;
pub use scheduler::{AlwaysAvailable, BackendProbe, Scheduler, SchedulerHandle, TickOutcome};
pub use types::{
    ChangeReason, ClientConfig, ConnectionState, Diagnostic, DiagnosticSeverity,
    DiagnosticsChanged, DiagnosticsMessage, DiagnosticsSnapshot, TextLocation,
};
