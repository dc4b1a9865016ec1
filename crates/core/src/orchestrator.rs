use crate::dedup::MergeEngine;
use crate::enricher::Enricher;
use crate::error::{IngestError, PipelineError};
use crate::extractor::{Extraction, ExtractionCascade};
use crate::ingest::{discover_pdf_files, LayoutResolver};
use crate::models::{DocumentMeta, FailedDocument, IngestionOptions, QuestionRecord, SourceTag};
use crate::normalize::normalize;
use crate::segmenter::Segmenter;
use crate::store::{CorpusLock, CorpusStore};
use rayon::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    /// Full cascade, numbering grammars with heuristic fallback.
    First,
    /// Best available text, heuristic fallback only.
    Retry,
}

struct DocumentOutcome {
    records: Vec<QuestionRecord>,
    failure: Option<FailedDocument>,
}

impl DocumentOutcome {
    fn failed(meta: &DocumentMeta, reason: String) -> Self {
        Self {
            records: Vec::new(),
            failure: Some(FailedDocument {
                path: meta.path.clone(),
                reason,
            }),
        }
    }
}

/// Operator-facing outcome of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub documents_discovered: usize,
    /// Documents that produced usable text.
    pub documents_processed: usize,
    pub questions_segmented: usize,
    /// Records newly added to the corpus by this run.
    pub accepted: Vec<QuestionRecord>,
    pub exact_duplicates: usize,
    pub fuzzy_duplicates: usize,
    /// Accepted records that came from the heuristic line segmenter.
    pub fallback_records: usize,
    pub failed: Vec<FailedDocument>,
    pub corpus_before: usize,
    pub corpus_after: usize,
}

/// Extraction through publish for one corpus. Holds its own store handle
/// and extraction cascade; nothing is shared process-wide.
pub struct IngestionPipeline {
    store: CorpusStore,
    cascade: ExtractionCascade,
    segmenter: Segmenter,
    enricher: Enricher,
    merger: MergeEngine,
    workers: usize,
}

impl IngestionPipeline {
    pub fn new(
        store: CorpusStore,
        cascade: ExtractionCascade,
        options: &IngestionOptions,
    ) -> Result<Self, IngestError> {
        if options.workers == 0 {
            return Err(IngestError::InvalidArgument(
                "workers must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            store,
            cascade,
            segmenter: Segmenter::new(options)?,
            enricher: Enricher::new(options.marks.clone(), options.min_question_chars)?,
            merger: MergeEngine::new(options.stable_key_prefix_chars, options.fuzzy_threshold),
            workers: options.workers,
        })
    }

    pub fn store(&self) -> &CorpusStore {
        &self.store
    }

    /// Ingests every PDF under `root` and append-merges the result into the
    /// corpus. Only storage failures end the run early; the previous corpus
    /// is left untouched in that case.
    pub fn run(&self, root: &Path) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let lock = self.store.lock()?;
        let existing = self.store.load()?;

        let resolver = LayoutResolver::new(root)?;
        let documents = discover_pdf_files(root)
            .iter()
            .map(|path| resolver.document_meta(path))
            .collect::<Vec<_>>();
        if documents.is_empty() {
            warn!(root = %root.display(), "no pdf files found");
        }

        info!(
            %run_id,
            root = %root.display(),
            documents = documents.len(),
            corpus = existing.len(),
            "ingestion run started"
        );

        let outcomes = self.process_all(&documents, Pass::First)?;
        self.publish(run_id, &lock, existing, documents.len(), outcomes)
    }

    /// Re-reads the failed list and gives each document one more chance
    /// with whatever text the cascade can recover, segmented by the line
    /// heuristic. Documents that still yield nothing stay on the list.
    pub fn retry_failed(&self, root: &Path) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let lock = self.store.lock()?;
        let existing = self.store.load()?;

        let resolver = LayoutResolver::new(root)?;
        let documents = self
            .store
            .load_failed()?
            .iter()
            .map(|path| resolver.document_meta(path))
            .collect::<Vec<_>>();

        info!(%run_id, documents = documents.len(), "retry pass started");

        let outcomes = self.process_all(&documents, Pass::Retry)?;
        self.publish(run_id, &lock, existing, documents.len(), outcomes)
    }

    /// Parallel over documents, results in document order so the single
    /// merge step below sees a deterministic sequence.
    fn process_all(
        &self,
        documents: &[DocumentMeta],
        pass: Pass,
    ) -> Result<Vec<DocumentOutcome>, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()?;

        Ok(pool.install(|| {
            documents
                .par_iter()
                .map(|meta| self.process_document(meta, pass))
                .collect()
        }))
    }

    fn process_document(&self, meta: &DocumentMeta, pass: Pass) -> DocumentOutcome {
        let extraction = self.cascade.extract(&meta.path);

        if pass == Pass::First && !extraction.sufficient {
            let reason = failure_reason(&extraction);
            warn!(path = %meta.path.display(), %reason, "no extraction strategy produced enough text");
            return DocumentOutcome::failed(meta, reason);
        }

        let text = normalize(&extraction.text);
        let candidates = match pass {
            Pass::First => self.segmenter.segment(&text, meta.exam_type),
            Pass::Retry => self.segmenter.segment_fallback(&text),
        };

        if candidates.is_empty() {
            if pass == Pass::Retry {
                let reason = format!(
                    "fallback segmenter found no questions in {} chars",
                    extraction.char_count()
                );
                warn!(path = %meta.path.display(), %reason, "document still unusable");
                return DocumentOutcome::failed(meta, reason);
            }
            warn!(path = %meta.path.display(), "document produced no questions");
        }

        debug!(
            path = %meta.path.display(),
            strategy = %extraction.source_tag,
            exam_type = %meta.exam_type,
            paper_type = %meta.paper_type,
            year = meta.year,
            questions = candidates.len(),
            "document segmented"
        );

        DocumentOutcome {
            records: candidates
                .into_iter()
                .map(|candidate| self.enricher.enrich(candidate, meta, extraction.source_tag))
                .collect(),
            failure: None,
        }
    }

    fn publish(
        &self,
        run_id: Uuid,
        lock: &CorpusLock,
        existing: Vec<QuestionRecord>,
        documents_discovered: usize,
        outcomes: Vec<DocumentOutcome>,
    ) -> Result<RunReport, PipelineError> {
        let corpus_before = existing.len();
        let mut incoming = Vec::new();
        let mut failed = Vec::new();

        for outcome in outcomes {
            incoming.extend(outcome.records);
            failed.extend(outcome.failure);
        }
        let questions_segmented = incoming.len();

        let outcome = self.merger.merge(existing, incoming);
        self.store.write_corpus(lock, &outcome.corpus)?;
        self.store.write_failed(lock, &failed)?;

        let fallback_records = outcome
            .accepted
            .iter()
            .filter(|record| record.source_tag == SourceTag::OcrFallback)
            .count();

        let report = RunReport {
            run_id,
            documents_discovered,
            documents_processed: documents_discovered - failed.len(),
            questions_segmented,
            exact_duplicates: outcome.exact_duplicates,
            fuzzy_duplicates: outcome.fuzzy_duplicates,
            fallback_records,
            corpus_before,
            corpus_after: outcome.corpus.len(),
            accepted: outcome.accepted,
            failed,
        };

        info!(
            %run_id,
            processed = report.documents_processed,
            segmented = report.questions_segmented,
            accepted = report.accepted.len(),
            exact_duplicates = report.exact_duplicates,
            fuzzy_duplicates = report.fuzzy_duplicates,
            fallback_records = report.fallback_records,
            failed = report.failed.len(),
            corpus_after = report.corpus_after,
            "run finished"
        );
        Ok(report)
    }
}

fn failure_reason(extraction: &Extraction) -> String {
    if extraction.attempts.is_empty() {
        "no extraction strategy configured".to_string()
    } else {
        extraction.attempts.join("; ")
    }
}
