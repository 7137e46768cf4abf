//! Latest per-file diagnostics pushed by the backend.
//!
//! One writer (the connection's tick) and any number of readers share the
//! map through a cheap clonable handle. Mutation is crate-private, so
//! consumers can only read. Every operation is a short critical
//! section; nothing holds the lock across I/O.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::types::{Diagnostic, DiagnosticsMessage, DiagnosticsSnapshot, normalize_path};

#[derive(Clone, Default)]
pub struct DiagnosticsStore {
    data: Arc<RwLock<HashMap<String, DiagnosticsMessage>>>,
}

impl DiagnosticsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking reader cannot leave the map half-written, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, DiagnosticsMessage>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, DiagnosticsMessage>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace whatever was stored for the message's file.
    pub(crate) fn upsert(&self, message: DiagnosticsMessage) {
        self.write()
            .insert(message.file_path().to_string(), message);
    }

    /// Latest message for `path`, spelled any way the backend or an editor does.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<DiagnosticsMessage> {
        self.read().get(&normalize_path(path)).cloned()
    }

    /// Remove every entry. Returns whether anything was removed.
    pub(crate) fn clear(&self) -> bool {
        let mut data = self.write();
        let had_entries = !data.is_empty();
        data.clear();
        had_entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let files: Vec<DiagnosticsMessage> = self.read().values().cloned().collect();
        DiagnosticsSnapshot::new(files)
    }

    pub fn errors_for_files(&self, paths: &[&str]) -> Vec<(String, Vec<Diagnostic>)> {
        let data = self.read();
        let mut result = Vec::new();
        for path in paths {
            let key = normalize_path(path);
            if let Some(message) = data.get(&key) {
                let errors: Vec<Diagnostic> = message
                    .diagnostics()
                    .iter()
                    .filter(|d| d.severity().is_error())
                    .cloned()
                    .collect();
                if !errors.is_empty() {
                    result.push((key, errors));
                }
            }
        }
        result
    }
}
