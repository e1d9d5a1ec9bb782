//! Structured diagnostic sink for engine warnings and errors.
//!
//! The engine reports per-(channel, day) anomalies through a sink passed in
//! at DayContext construction instead of relying on global log state, so
//! tests can capture and assert on emitted diagnostics deterministically.
//! The default sink forwards to the `log` facade.

use std::sync::Mutex;

/// Severity of a diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One captured diagnostic: severity, (station/date/channel) context, message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEntry {
    pub severity: Severity,
    pub context: String,
    pub message: String,
}

/// Context-scoped diagnostic receiver.
///
/// `context` carries the station/date/channel scope of the report; `message`
/// is the human-readable detail.
pub trait DiagnosticSink: Send + Sync {
    fn warn(&self, context: &str, message: &str);
    fn error(&self, context: &str, message: &str);
}

/// Default sink forwarding to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn warn(&self, context: &str, message: &str) {
        log::warn!("{} {}", context, message);
    }

    fn error(&self, context: &str, message: &str) {
        log::error!("{} {}", context, message);
    }
}

/// Sink that collects entries for test assertions.
#[derive(Debug, Default)]
pub struct CaptureSink {
    entries: Mutex<Vec<DiagnosticEntry>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, severity: Severity, context: &str, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(DiagnosticEntry {
                severity,
                context: context.to_string(),
                message: message.to_string(),
            });
        }
    }

    /// Snapshot of everything captured so far.
    pub fn entries(&self) -> Vec<DiagnosticEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Count of captured entries at the given severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.entries()
            .iter()
            .filter(|e| e.severity == severity)
            .count()
    }
}

impl DiagnosticSink for CaptureSink {
    fn warn(&self, context: &str, message: &str) {
        self.push(Severity::Warning, context, message);
    }

    fn error(&self, context: &str, message: &str) {
        self.push(Severity::Error, context, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sink_records_entries() {
        let sink = CaptureSink::new();
        sink.warn("IU_ANMO 2024-05-01 00-LHZ", "gap found in window");
        sink.error("IU_ANMO 2024-05-01 00-LH1", "sample rate mismatch");

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].severity, Severity::Warning);
        assert_eq!(entries[1].severity, Severity::Error);
        assert_eq!(sink.count(Severity::Warning), 1);
        assert_eq!(sink.count(Severity::Error), 1);
    }
}
