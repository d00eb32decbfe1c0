//! Per-item failure collection.

use serde::{Deserialize, Serialize};

const TRUNCATION_MARKER: &str = "… [truncated]";

/// One failed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub identifier: String,
    pub message: String,
}

impl LedgerEntry {
    /// Log line for this failure, without the trailing separator.
    pub fn line(&self) -> String {
        format!("Error processing {}: {}", self.identifier, self.message)
    }
}

/// Failures of a run, in processing order.
///
/// Rendered as one archive entry: each line is followed by a blank line.
#[derive(Debug, Clone)]
pub struct ErrorLedger {
    entries: Vec<LedgerEntry>,
    max_message_bytes: usize,
}

impl ErrorLedger {
    pub fn new(max_message_bytes: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_message_bytes,
        }
    }

    /// Records a failure, truncating overly long diagnostics.
    pub fn record(&mut self, identifier: impl Into<String>, message: &str) {
        self.entries.push(LedgerEntry {
            identifier: identifier.into(),
            message: truncate_message(message, self.max_message_bytes),
        });
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Full log entry contents.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.line());
            out.push_str("\n\n");
        }
        out
    }
}

fn truncate_message(message: &str, max_bytes: usize) -> String {
    if message.len() <= max_bytes {
        return message.to_string();
    }
    let mut end = max_bytes;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &message[..end], TRUNCATION_MARKER)
}

/// Picks an entry name for the ledger that no item entry already uses.
///
/// `processing_errors.log` becomes `processing_errors-1.log`, then `-2`, and
/// so on.
pub fn unique_log_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }

    let (stem, extension) = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (base, None),
    };

    (1..)
        .map(|n| match extension {
            Some(ext) => format!("{stem}-{n}.{ext}"),
            None => format!("{stem}-{n}"),
        })
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_separates_with_blank_lines() {
        let mut ledger = ErrorLedger::new(4096);
        ledger.record("a/b.dcm", "bad format");
        ledger.record("c.dcm", "invalid tag");

        assert_eq!(
            ledger.render(),
            "Error processing a/b.dcm: bad format\n\nError processing c.dcm: invalid tag\n\n"
        );
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_empty_ledger() {
        let ledger = ErrorLedger::new(10);
        assert!(ledger.is_empty());
        assert_eq!(ledger.render(), "");
    }

    #[test]
    fn test_long_messages_are_truncated_on_char_boundary() {
        let mut ledger = ErrorLedger::new(5);
        ledger.record("x", "ééééé");

        let message = &ledger.entries()[0].message;
        assert_eq!(message, "éé… [truncated]");
    }

    #[test]
    fn test_unique_log_name() {
        let taken = ["processing_errors.log", "processing_errors-1.log"];
        let name = unique_log_name("processing_errors.log", |n| taken.contains(&n));
        assert_eq!(name, "processing_errors-2.log");

        assert_eq!(unique_log_name("errors", |n| n == "errors"), "errors-1");
        assert_eq!(unique_log_name("free.log", |_| false), "free.log");
    }
}
