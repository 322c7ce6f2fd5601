//! Diagnostic sink for advisory warnings.
//!
//! The binding subsystem emits freeform warning lines (ambiguous `using`,
//! conflicting imports, deprecation notices). They are advisory and never
//! block an operation, so they all funnel through one sink.

use parking_lot::Mutex;

/// Receiver for warning lines.
pub trait DiagnosticSink: Send + Sync {
    fn warn(&self, message: &str);
}

/// Default sink: one line per warning on standard error.
#[derive(Debug, Default)]
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn warn(&self, message: &str) {
        eprintln!("{message}");
    }
}

/// Sink that records warnings in memory, for tests asserting on emission
/// (and in particular on once-only emission).
#[derive(Debug, Default)]
pub struct CaptureSink {
    messages: Mutex<Vec<String>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything warned so far.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl DiagnosticSink for CaptureSink {
    fn warn(&self, message: &str) {
        self.messages.lock().push(message.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sink_records() {
        let sink = CaptureSink::new();
        sink.warn("WARNING: first");
        sink.warn("WARNING: second");
        assert_eq!(sink.messages(), vec!["WARNING: first", "WARNING: second"]);
        sink.clear();
        assert!(sink.messages().is_empty());
    }
}
