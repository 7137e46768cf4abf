//! Plain-text rendering of a diagnostics snapshot.

use std::fmt::Write;

use asbridge_client::{ChangeReason, DiagnosticsSnapshot};

pub(crate) fn render(reason: ChangeReason, snapshot: &DiagnosticsSnapshot) -> String {
    let mut out = String::new();

    if reason == ChangeReason::Cleared {
        out.push_str("-- debug server disconnected, diagnostics cleared --\n");
        return out;
    }

    // Writing into a String cannot fail.
    let clean = snapshot.files().iter().filter(|f| f.is_clean()).count();
    let _ = writeln!(
        out,
        "-- {} file(s), {} clean, {} error(s), {} warning(s), {} info --",
        snapshot.files().len(),
        clean,
        snapshot.error_count(),
        snapshot.warning_count(),
        snapshot.info_count(),
    );

    for file in snapshot.files() {
        for diagnostic in file.diagnostics() {
            let _ = writeln!(out, "{}", diagnostic.display_with_path(file.file_path()));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use asbridge_client::{Diagnostic, DiagnosticSeverity, DiagnosticsMessage};

    #[test]
    fn cleared_report_is_one_line() {
        let text = render(ChangeReason::Cleared, &DiagnosticsSnapshot::default());
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("cleared"));
    }

    #[test]
    fn updated_report_lists_errors_first() {
        let snapshot = DiagnosticsSnapshot::new(vec![
            DiagnosticsMessage::new(
                "a.as",
                vec![Diagnostic::whole_line(
                    DiagnosticSeverity::Warning,
                    1,
                    "unused".to_string(),
                )],
            ),
            DiagnosticsMessage::new(
                r"b\b.as",
                vec![Diagnostic::whole_line(
                    DiagnosticSeverity::Error,
                    4,
                    "unexpected token".to_string(),
                )],
            ),
            DiagnosticsMessage::new("clean.as", Vec::new()),
        ]);

        let text = render(ChangeReason::Updated, &snapshot);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "-- 3 file(s), 1 clean, 1 error(s), 1 warning(s), 0 info --",
                "b/b.as:5:1: error: [as] unexpected token",
                "a.as:2:1: warning: [as] unused",
            ]
        );
    }

    #[test]
    fn empty_snapshot_reports_header_only() {
        let text = render(ChangeReason::Updated, &DiagnosticsSnapshot::default());
        assert_eq!(
            text,
            "-- 0 file(s), 0 clean, 0 error(s), 0 warning(s), 0 info --\n"
        );
    }
}
