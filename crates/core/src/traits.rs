use crate::SinkError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// One `(text, metadata)` pair handed to a downstream index.
#[derive(Debug, Clone, Serialize)]
pub struct SinkDocument {
    pub id: String,
    pub text: String,
    pub metadata: Value,
}

/// Downstream document-ingestion service, e.g. a vector index.
#[async_trait]
pub trait DocumentSink {
    /// Returns how many documents the service ingested. An empty batch is a
    /// no-op returning 0.
    async fn ingest(&self, documents: &[SinkDocument]) -> Result<usize, SinkError>;
}
