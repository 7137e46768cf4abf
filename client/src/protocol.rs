//! Message catalog and payload decoding for the debug server protocol.

use crate::codec::{PayloadReader, ProtocolError};
use crate::types::{Diagnostic, DiagnosticSeverity, DiagnosticsMessage};

/// Every message kind the debug server knows about.
///
/// The discriminant is the type byte on the wire, so entries must never be
/// reordered or removed. Only [`Diagnostics`](Self::Diagnostics),
/// [`Disconnect`](Self::Disconnect) and [`PingAlive`](Self::PingAlive) are
/// acted on by this client; the rest are carried for ordinal stability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Diagnostics = 0,
    RequestDebugDatabase,
    DebugDatabase,

    StartDebugging,
    StopDebugging,
    Pause,
    Continue,

    RequestCallStack,
    CallStack,

    ClearBreakpoints,
    SetBreakpoint,

    HasStopped,
    HasContinued,

    StepOver,
    StepIn,
    StepOut,

    EngineBreak,

    RequestVariables,
    Variables,

    RequestEvaluate,
    Evaluate,
    GoToDefinition,

    BreakOptions,
    RequestBreakFilters,
    BreakFilters,

    Disconnect,

    DebugDatabaseFinished,
    AssetDatabaseInit,
    AssetDatabase,
    AssetDatabaseFinished,
    FindAssets,
    DebugDatabaseSettings,

    PingAlive,

    DebugServerVersion,
    CreateBlueprint,

    ReplaceAssetDefinition,

    SetDataBreakpoints,
    ClearDataBreakpoints,
}

impl MessageType {
    /// All entries in wire order; `CATALOG[n]` has type byte `n`.
    pub const CATALOG: [Self; 38] = [
        Self::Diagnostics,
        Self::RequestDebugDatabase,
        Self::DebugDatabase,
        Self::StartDebugging,
        Self::StopDebugging,
        Self::Pause,
        Self::Continue,
        Self::RequestCallStack,
        Self::CallStack,
        Self::ClearBreakpoints,
        Self::SetBreakpoint,
        Self::HasStopped,
        Self::HasContinued,
        Self::StepOver,
        Self::StepIn,
        Self::StepOut,
        Self::EngineBreak,
        Self::RequestVariables,
        Self::Variables,
        Self::RequestEvaluate,
        Self::Evaluate,
        Self::GoToDefinition,
        Self::BreakOptions,
        Self::RequestBreakFilters,
        Self::BreakFilters,
        Self::Disconnect,
        Self::DebugDatabaseFinished,
        Self::AssetDatabaseInit,
        Self::AssetDatabase,
        Self::AssetDatabaseFinished,
        Self::FindAssets,
        Self::DebugDatabaseSettings,
        Self::PingAlive,
        Self::DebugServerVersion,
        Self::CreateBlueprint,
        Self::ReplaceAssetDefinition,
        Self::SetDataBreakpoints,
        Self::ClearDataBreakpoints,
    ];

    #[must_use]
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::CATALOG.get(usize::from(byte)).copied()
    }
}

/// Decode the body of a [`MessageType::Diagnostics`] frame.
///
/// Layout: `path: string, count: i32, count × { message: string, line: i32,
/// column: i32, is_error: bool, is_info: bool }`. Lines are 1-based on the
/// wire (non-positive values are treated as line 1); the column is read but
/// not kept since the backend does not report one yet.
pub fn decode_diagnostics(body: &[u8]) -> Result<DiagnosticsMessage, ProtocolError> {
    let mut reader = PayloadReader::new(body);

    let path = reader.read_string()?;
    let count = reader.read_i32()?;

    // Each entry takes at least 20 bytes, so a hostile count can't over-allocate.
    let capacity = usize::try_from(count)
        .unwrap_or(0)
        .min(reader.remaining() / 20);
    let mut diagnostics = Vec::with_capacity(capacity);

    for _ in 0..count.max(0) {
        let message = reader.read_string()?;
        let line = reader.read_i32()?;
        let _column = reader.read_i32()?;
        let is_error = reader.read_bool()?;
        let is_info = reader.read_bool()?;

        let line = if line <= 0 { 1 } else { line };
        diagnostics.push(Diagnostic::whole_line(
            DiagnosticSeverity::from_flags(is_error, is_info),
            (line - 1) as u32,
            message,
        ));
    }

    Ok(DiagnosticsMessage::new(&path, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PayloadWriter;
    use crate::types::END_OF_LINE_COLUMN;

    struct Entry<'a> {
        message: &'a str,
        line: i32,
        is_error: bool,
        is_info: bool,
    }

    fn diagnostics_body(path: &str, entries: &[Entry<'_>]) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        writer.write_string(path).write_i32(entries.len() as i32);
        for entry in entries {
            writer
                .write_string(entry.message)
                .write_i32(entry.line)
                .write_i32(17)
                .write_bool(entry.is_error)
                .write_bool(entry.is_info);
        }
        writer.finish().to_vec()
    }

    #[test]
    fn test_catalog_ordinals_are_stable() {
        assert_eq!(MessageType::Diagnostics.as_byte(), 0);
        assert_eq!(MessageType::StartDebugging.as_byte(), 3);
        assert_eq!(MessageType::GoToDefinition.as_byte(), 21);
        assert_eq!(MessageType::Disconnect.as_byte(), 25);
        assert_eq!(MessageType::PingAlive.as_byte(), 32);
        assert_eq!(MessageType::ClearDataBreakpoints.as_byte(), 37);
    }

    #[test]
    fn test_catalog_matches_discriminants() {
        for (index, kind) in MessageType::CATALOG.iter().enumerate() {
            assert_eq!(usize::from(kind.as_byte()), index, "{kind:?}");
            assert_eq!(MessageType::from_byte(index as u8), Some(*kind));
        }
        assert_eq!(MessageType::from_byte(38), None);
        assert_eq!(MessageType::from_byte(u8::MAX), None);
    }

    #[test]
    fn test_decode_clean_file() {
        let body = diagnostics_body(r"C:\Foo\Bar.as", &[]);
        let msg = decode_diagnostics(&body).unwrap();
        assert_eq!(msg.file_path(), "C:/Foo/Bar.as");
        assert!(msg.diagnostics().is_empty());
        assert!(msg.is_clean());
    }

    #[test]
    fn test_decode_error_entry() {
        let body = diagnostics_body(
            "Game/Player.as",
            &[Entry {
                message: "unexpected token",
                line: 5,
                is_error: true,
                is_info: false,
            }],
        );
        let msg = decode_diagnostics(&body).unwrap();
        let diag = &msg.diagnostics()[0];
        assert_eq!(diag.severity(), DiagnosticSeverity::Error);
        assert_eq!(diag.start().line_number, 4);
        assert_eq!(diag.start().character_in_line, 0);
        assert_eq!(diag.end().line_number, 4);
        assert_eq!(diag.message(), "unexpected token");
        assert_eq!(diag.source(), "as");
    }

    #[test]
    fn test_decode_clamps_non_positive_lines() {
        let body = diagnostics_body(
            "a.as",
            &[
                Entry {
                    message: "zero",
                    line: 0,
                    is_error: false,
                    is_info: false,
                },
                Entry {
                    message: "negative",
                    line: -12,
                    is_error: false,
                    is_info: false,
                },
                Entry {
                    message: "first",
                    line: 1,
                    is_error: false,
                    is_info: false,
                },
            ],
        );
        let msg = decode_diagnostics(&body).unwrap();
        for diag in msg.diagnostics() {
            assert_eq!(diag.start().line_number, 0, "{}", diag.message());
        }
    }

    #[test]
    fn test_decode_end_column_is_sentinel_and_severity_priority() {
        let body = diagnostics_body(
            "a.as",
            &[
                Entry {
                    message: "info beats error",
                    line: 3,
                    is_error: true,
                    is_info: true,
                },
                Entry {
                    message: "plain warning",
                    line: 8,
                    is_error: false,
                    is_info: false,
                },
            ],
        );
        let msg = decode_diagnostics(&body).unwrap();
        let severities: Vec<_> = msg.diagnostics().iter().map(Diagnostic::severity).collect();
        assert_eq!(
            severities,
            vec![DiagnosticSeverity::Information, DiagnosticSeverity::Warning]
        );
        assert!(
            msg.diagnostics()
                .iter()
                .all(|d| d.end().character_in_line == END_OF_LINE_COLUMN)
        );
    }

    #[test]
    fn test_decode_preserves_entry_order() {
        let entries: Vec<Entry<'_>> = ["c", "a", "b"]
            .into_iter()
            .enumerate()
            .map(|(i, m)| Entry {
                message: m,
                line: i as i32 + 1,
                is_error: true,
                is_info: false,
            })
            .collect();
        let msg = decode_diagnostics(&diagnostics_body("x.as", &entries)).unwrap();
        let messages: Vec<_> = msg.diagnostics().iter().map(Diagnostic::message).collect();
        assert_eq!(messages, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_decode_truncated_entry_fails() {
        let mut body = diagnostics_body(
            "a.as",
            &[Entry {
                message: "cut",
                line: 2,
                is_error: true,
                is_info: false,
            }],
        );
        body.truncate(body.len() - 3);
        assert!(matches!(
            decode_diagnostics(&body),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_count_larger_than_body_fails_without_allocating() {
        let mut writer = PayloadWriter::new();
        writer.write_string("a.as").write_i32(i32::MAX);
        assert!(decode_diagnostics(&writer.finish()).is_err());
    }
}
