use crate::dedup::StableKey;
use crate::traits::{DocumentSink, SinkDocument};
use crate::{QuestionRecord, SinkError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use url::Url;

/// POSTs `{"documents": [...]}` batches to a document-ingestion endpoint and
/// reads back `{"ingested": n}`.
pub struct HttpDocumentSink {
    endpoint: Url,
    api_key: Option<String>,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct IngestResponse {
    #[serde(default)]
    ingested: Option<usize>,
}

impl HttpDocumentSink {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, SinkError> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            client: Client::new(),
        })
    }
}

#[async_trait]
impl DocumentSink for HttpDocumentSink {
    async fn ingest(&self, documents: &[SinkDocument]) -> Result<usize, SinkError> {
        if documents.is_empty() {
            return Ok(0);
        }

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({ "documents": documents }));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SinkError::BackendResponse {
                backend: self.endpoint.to_string(),
                details: response.status().to_string(),
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(documents.len());
        }
        let parsed: IngestResponse = serde_json::from_str(&body)?;
        Ok(parsed.ingested.unwrap_or(documents.len()))
    }
}

/// `"<exam> <paper> <year> Q<number>: <text>"` plus the full record as
/// metadata, keyed by the stable-key digest.
pub fn to_sink_documents(
    records: &[QuestionRecord],
    prefix_chars: usize,
) -> Result<Vec<SinkDocument>, SinkError> {
    records
        .iter()
        .map(|record| {
            Ok(SinkDocument {
                id: StableKey::of(record, prefix_chars).digest(),
                text: format!(
                    "{} {} {} Q{}: {}",
                    record.exam_type,
                    record.paper_type,
                    record.year,
                    record.question_number,
                    record.question_text
                ),
                metadata: serde_json::to_value(record)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Difficulty, ExamType, Grammar, QuestionNumber, SourceTag};

    fn record() -> QuestionRecord {
        QuestionRecord {
            year: 2022,
            exam_type: ExamType::Mains,
            paper_type: "gs3".to_string(),
            question_number: QuestionNumber::Numeric(7),
            numbering: Some(Grammar::NumericDot),
            question_text: "Examine the role of MSMEs in export-led growth.".to_string(),
            options: None,
            marks: 10,
            difficulty: Difficulty::Hard,
            source_tag: SourceTag::Primary,
        }
    }

    #[test]
    fn sink_documents_carry_prefixed_text_and_metadata() -> Result<(), SinkError> {
        let documents = to_sink_documents(&[record()], 120)?;

        assert_eq!(documents.len(), 1);
        assert_eq!(
            documents[0].text,
            "mains gs3 2022 Q7: Examine the role of MSMEs in export-led growth."
        );
        assert_eq!(documents[0].metadata["paperType"], "gs3");
        assert_eq!(documents[0].id.len(), 64);
        Ok(())
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() -> Result<(), SinkError> {
        // Nothing listens here; an empty batch must not try to connect.
        let sink = HttpDocumentSink::new("http://127.0.0.1:9/documents", None)?;
        assert_eq!(sink.ingest(&[]).await?, 0);
        Ok(())
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        assert!(matches!(
            HttpDocumentSink::new("not a url", None),
            Err(SinkError::Url(_))
        ));
    }
}
