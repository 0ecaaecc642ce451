use async_trait::async_trait;

/// A simple keyed blob store. The engine serializes its own collections and
/// is agnostic to the backing implementation (file, key-value store,
/// embedded database).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    type Error;

    async fn store(&self, key: &str, value: &[u8]) -> Result<(), Self::Error>;

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error>;

    async fn delete(&self, key: &str) -> Result<(), Self::Error>;

    async fn exists(&self, key: &str) -> Result<bool, Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error
}

/// Fire-and-forget diagnostics collaborator. Calls must never block or fail
/// the calling operation; implementations swallow their own errors.
pub trait DiagnosticsSink: Send + Sync {
    fn record(&self, severity: Severity, category: &str, message: &str, metadata: serde_json::Value);
}

/// Default sink forwarding entries to `tracing`.
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn record(
        &self,
        severity: Severity,
        category: &str,
        message: &str,
        metadata: serde_json::Value
    ) {
        match severity {
            Severity::Debug => {
                tracing::debug!(category = category, metadata = %metadata, "{message}");
            }
            Severity::Info => {
                tracing::info!(category = category, metadata = %metadata, "{message}");
            }
            Severity::Warn => {
                tracing::warn!(category = category, metadata = %metadata, "{message}");
            }
            Severity::Error => {
                tracing::error!(category = category, metadata = %metadata, "{message}");
            }
        }
    }
}

/// Sink that drops everything. Used in tests.
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn record(&self, _: Severity, _: &str, _: &str, _: serde_json::Value) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sinks_never_panic() {
        let sinks: Vec<Box<dyn DiagnosticsSink>> = vec![Box::new(TracingSink), Box::new(NullSink)];
        for sink in &sinks {
            sink.record(
                Severity::Info,
                "remote",
                "attempt succeeded",
                serde_json::json!({ "attempt": 1 })
            );
        }
    }
}
