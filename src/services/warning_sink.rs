use std::sync::Mutex;

use crate::services::conflict_detector::ConflictWarning;

/// Receiver of non-fatal diagnostics
///
/// `emit` must not block; callers never wait on or inspect the outcome.
pub trait WarningSink: Send + Sync {
    fn emit(&self, message: &str, context: &ConflictWarning);
}

/// Forwards warnings to `tracing` at WARN level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWarningSink;

impl WarningSink for TracingWarningSink {
    fn emit(&self, message: &str, context: &ConflictWarning) {
        tracing::warn!(
            field = %context.field,
            column = %context.column,
            sources = ?context.sources,
            "{}",
            message
        );
    }
}

/// Keeps every warning in memory; used by dry-run compilation and tests
#[derive(Debug, Default)]
pub struct CollectingWarningSink {
    warnings: Mutex<Vec<ConflictWarning>>,
}

impl CollectingWarningSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> Vec<ConflictWarning> {
        match self.warnings.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.warnings().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WarningSink for CollectingWarningSink {
    fn emit(&self, _message: &str, context: &ConflictWarning) {
        match self.warnings.lock() {
            Ok(mut guard) => guard.push(context.clone()),
            Err(poisoned) => poisoned.into_inner().push(context.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warning() -> ConflictWarning {
        ConflictWarning {
            field: "id".into(),
            column: "id".into(),
            sources: vec!["users".into(), "orders".into()],
            suggestions: vec!["users.id".into(), "orders.id".into()],
        }
    }

    #[test]
    fn test_collecting_sink_keeps_order() {
        let sink = CollectingWarningSink::new();
        assert!(sink.is_empty());

        let mut second = warning();
        second.field = "createdAt".into();
        sink.emit("first", &warning());
        sink.emit("second", &second);

        let collected = sink.warnings();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[1].field, "createdAt");
    }

    #[test]
    fn test_tracing_sink_does_not_panic_without_subscriber() {
        TracingWarningSink.emit("ambiguous", &warning());
    }
}
