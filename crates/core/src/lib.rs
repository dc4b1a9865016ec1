pub mod dedup;
pub mod enricher;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod segmenter;
pub mod store;
pub mod stores;
pub mod traits;

pub use dedup::{fuzzy_dedup, similarity, MergeEngine, MergeOutcome, StableKey};
pub use enricher::{estimate_difficulty, estimate_marks, infer_year, Enricher};
pub use error::{IngestError, PipelineError, SinkError, StoreError};
pub use extractor::{
    Extraction, ExtractionCascade, OcrEngine, OcrSettings, PageText, PdfExtractor, TesseractOcr,
};
pub use ingest::{discover_pdf_files, LayoutResolver};
pub use models::{
    Difficulty, DocumentMeta, ExamType, FailedDocument, Grammar, IngestionOptions, MarksTable,
    QuestionNumber, QuestionRecord, SourceTag,
};
pub use normalize::normalize;
pub use orchestrator::{IngestionPipeline, RunReport};
pub use segmenter::{Candidate, Segmenter};
pub use store::{CorpusLock, CorpusStats, CorpusStore};
pub use stores::{to_sink_documents, HttpDocumentSink};
pub use traits::{DocumentSink, SinkDocument};
