//! Public types consumed by editor integrations.
//!
//! Collaborators construct [`ClientConfig`], receive [`DiagnosticsChanged`]
//! signals, and read [`DiagnosticsMessage`]s or [`DiagnosticsSnapshot`]s to
//! render squiggles and populate error lists.

use std::time::Duration;

use serde::Deserialize;

/// Column used as the end of every decoded diagnostic.
///
/// The backend reports only a line, so the range runs to the end of it.
pub const END_OF_LINE_COLUMN: u32 = 10_000;

/// Source tag attached to every decoded diagnostic.
pub const DIAGNOSTIC_SOURCE: &str = "as";

fn default_host() -> String {
    String::from("127.0.0.1")
}

const fn default_port() -> u16 {
    27099
}

const fn default_tick_interval_ms() -> u64 {
    150
}

const fn default_retry_interval_ms() -> u64 {
    5_000
}

const fn default_keep_alive_secs() -> u64 {
    5
}

const fn default_debounce_ms() -> u64 {
    250
}

const fn default_read_poll_ms() -> u64 {
    1
}

const fn default_connect_timeout_ms() -> u64 {
    2_000
}

const fn default_write_timeout_ms() -> u64 {
    1_000
}

/// Configuration for the debug server client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Backend host. Default: `127.0.0.1`.
    #[serde(default = "default_host")]
    pub host: String,
    /// Backend port. Default: 27099.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Tick cadence while connected or connecting.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Tick cadence, and minimum gap between connect attempts, while disconnected.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Idle time after which a keep-alive ping is sent.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Quiet period before a burst of updates is announced.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// How long a tick waits for the socket to become readable.
    #[serde(default = "default_read_poll_ms")]
    pub read_poll_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tick_interval_ms: default_tick_interval_ms(),
            retry_interval_ms: default_retry_interval_ms(),
            keep_alive_secs: default_keep_alive_secs(),
            debounce_ms: default_debounce_ms(),
            read_poll_ms: default_read_poll_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub fn read_poll(&self) -> Duration {
        Duration::from_millis(self.read_poll_ms)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Lifecycle of the single backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticSeverity {
    Information,
    Warning,
    Error,
}

impl DiagnosticSeverity {
    /// Info wins over error; neither flag set means warning.
    #[must_use]
    pub fn from_flags(is_error: bool, is_info: bool) -> Self {
        match (is_info, is_error) {
            (true, _) => Self::Information,
            (false, true) => Self::Error,
            (false, false) => Self::Warning,
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
        }
    }
}

/// A position inside a file. Both fields are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextLocation {
    pub line_number: u32,
    pub character_in_line: u32,
}

/// A single compiler diagnostic.
///
/// Fields are private; external consumers read via accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    severity: DiagnosticSeverity,
    start: TextLocation,
    end: TextLocation,
    message: String,
    source: String,
}

impl Diagnostic {
    /// A diagnostic covering the whole of `line` (0-based).
    #[must_use]
    pub fn whole_line(severity: DiagnosticSeverity, line: u32, message: String) -> Self {
        Self {
            severity,
            start: TextLocation {
                line_number: line,
                character_in_line: 0,
            },
            end: TextLocation {
                line_number: line,
                character_in_line: END_OF_LINE_COLUMN,
            },
            message,
            source: String::from(DIAGNOSTIC_SOURCE),
        }
    }

    #[must_use]
    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    #[must_use]
    pub fn start(&self) -> TextLocation {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> TextLocation {
        self.end
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// End column clamped to a line of `line_len` characters.
    #[must_use]
    pub fn end_column_within(&self, line_len: u32) -> u32 {
        self.end.character_in_line.min(line_len)
    }

    /// Format as `path:line:col: severity: [source] message` (1-indexed for display).
    #[must_use]
    pub fn display_with_path(&self, path: &str) -> String {
        format!(
            "{}:{}:{}: {}: [{}] {}",
            path,
            self.start.line_number + 1,
            self.start.character_in_line + 1,
            self.severity.label(),
            self.source,
            self.message,
        )
    }
}

/// Latest diagnostics the backend reported for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticsMessage {
    file_path: String,
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticsMessage {
    /// `file_path` is normalized with [`normalize_path`].
    #[must_use]
    pub fn new(file_path: &str, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            file_path: normalize_path(file_path),
            diagnostics,
        }
    }

    #[must_use]
    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The file compiled without any diagnostics.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity().is_error())
    }

    /// Diagnostics starting on `line` (0-based).
    pub fn on_line(&self, line: u32) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |d| d.start().line_number == line)
    }

    /// Messages on `line` joined for a single tooltip.
    #[must_use]
    pub fn line_summary(&self, line: u32) -> String {
        self.on_line(line)
            .map(Diagnostic::message)
            .collect::<Vec<_>>()
            .join("   ")
    }
}

/// Canonical store key for a path as the backend or an editor spells it.
///
/// Every `\` becomes `/`, then doubled separators collapse to one.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let forward = path.replace('\\', "/");
    let mut out = String::with_capacity(forward.len());
    for ch in forward.chars() {
        if ch == '/' && out.ends_with('/') {
            continue;
        }
        out.push(ch);
    }
    out
}

/// Why the change signal fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    /// The backend pushed new diagnostics.
    Updated,
    /// The connection dropped and the cache was emptied.
    Cleared,
}

/// Broadcast to subscribers whenever the diagnostics cache changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticsChanged {
    pub reason: ChangeReason,
}

/// Immutable snapshot of all diagnostics, suitable for UI rendering.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsSnapshot {
    /// Per-file messages, sorted with error-containing files first.
    files: Vec<DiagnosticsMessage>,
}

impl DiagnosticsSnapshot {
    /// Files with errors first, then by path.
    #[must_use]
    pub fn new(mut files: Vec<DiagnosticsMessage>) -> Self {
        files.sort_by(|a, b| {
            b.has_errors()
                .cmp(&a.has_errors())
                .then_with(|| a.file_path().cmp(b.file_path()))
        });
        Self { files }
    }

    #[must_use]
    pub fn files(&self) -> &[DiagnosticsMessage] {
        &self.files
    }

    /// No files are tracked. A tracked file with zero diagnostics counts as
    /// an entry (it compiled cleanly).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn count_by_severity(&self, severity: DiagnosticSeverity) -> usize {
        self.files
            .iter()
            .flat_map(DiagnosticsMessage::diagnostics)
            .filter(|d| d.severity() == severity)
            .count()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.count_by_severity(DiagnosticSeverity::Error)
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.count_by_severity(DiagnosticSeverity::Warning)
    }

    #[must_use]
    pub fn info_count(&self) -> usize {
        self.count_by_severity(DiagnosticSeverity::Information)
    }

    #[must_use]
    pub fn total_count(&self) -> usize {
        self.files.iter().map(|f| f.diagnostics().len()).sum()
    }

    /// Format a compact status string like "E:3 W:5".
    #[must_use]
    pub fn status_string(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        format!("E:{} W:{}", self.error_count(), self.warning_count())
    }
}
