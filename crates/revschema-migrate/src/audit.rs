//! Audit sink for applied schema edits.

use std::fmt;
use std::sync::Mutex;

use revschema_core::ReversibleStatementSet;
use tracing::info;

/// Receives every statement set a client applied.
pub trait AuditSink: fmt::Debug + Send + Sync {
    /// Records one applied edit.
    fn record(&self, operation: &str, set: &ReversibleStatementSet);
}

/// Logs applied edits through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, operation: &str, set: &ReversibleStatementSet) {
        let up: Vec<&str> = set.up.iter().map(|s| s.sql.as_str()).collect();
        let down: Vec<&str> = set.down.iter().map(|s| s.sql.as_str()).collect();
        info!(
            operation,
            up = ?up,
            down = ?down,
            "Schema edit applied"
        );
    }
}

/// Keeps applied edits in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<(String, ReversibleStatementSet)>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, ReversibleStatementSet)> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, operation: &str, set: &ReversibleStatementSet) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((operation.to_string(), set.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revschema_core::Statement;

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemoryAuditSink::new();
        let mut set = ReversibleStatementSet::new();
        set.push([Statement::new("CREATE TABLE a (id INT)")], [Statement::new("DROP TABLE a")]);
        sink.record("create_table", &set);
        sink.record("drop_table", &set.inverted());

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "create_table");
        assert_eq!(entries[1].1.up[0].sql, "DROP TABLE a");
    }
}
