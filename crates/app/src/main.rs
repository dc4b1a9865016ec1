use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use pyq_corpus_core::{
    to_sink_documents, CorpusStats, CorpusStore, DocumentSink, ExtractionCascade,
    HttpDocumentSink, IngestionOptions, IngestionPipeline, MarksTable, OcrSettings, RunReport,
    TesseractOcr,
};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pyq-corpus", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Corpus JSON file, rewritten atomically by every run.
    #[arg(long, env = "PYQ_CORPUS_PATH", default_value = "data/processed_pyq.json")]
    corpus: PathBuf,

    /// Failed-document list. Defaults to failed_pdfs.txt next to the corpus.
    #[arg(long, env = "PYQ_FAILED_PATH")]
    failed_list: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest every PDF under the input tree and merge into the corpus.
    Ingest {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Re-process the failed-document list with the line heuristic.
    Retry {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Print corpus counts by year, exam type and paper type.
    Stats,
}

#[derive(Args)]
struct RunArgs {
    /// Root of the prelims/ mains/ optional/ tree.
    #[arg(long, env = "PYQ_INPUT_DIR", default_value = "data/pyq")]
    input: PathBuf,

    /// Worker threads for per-document processing. Defaults to available cores.
    #[arg(long, env = "PYQ_WORKERS")]
    workers: Option<usize>,

    /// Below this many characters an extraction strategy counts as failed.
    #[arg(long, env = "PYQ_MIN_EXTRACTED_CHARS", default_value = "200")]
    min_extracted_chars: usize,

    #[arg(long, env = "PYQ_MIN_QUESTION_CHARS", default_value = "15")]
    min_question_chars: usize,

    #[arg(long, env = "PYQ_MAX_QUESTION_CHARS", default_value = "1500")]
    max_question_chars: usize,

    /// Similarity above which two questions of one paper are duplicates.
    #[arg(long, env = "PYQ_FUZZY_THRESHOLD", default_value = "0.85")]
    fuzzy_threshold: f64,

    #[arg(long, env = "PYQ_MARKS_PRELIMS", default_value = "2")]
    marks_prelims: u32,

    #[arg(long, env = "PYQ_MARKS_ESSAY", default_value = "125")]
    marks_essay: u32,

    #[arg(long, env = "PYQ_MARKS_MAINS", default_value = "10")]
    marks_mains: u32,

    /// Per-paper marks, e.g. `--marks-override gs4=20`. Repeatable.
    #[arg(long = "marks-override", value_parser = parse_marks_override)]
    marks_overrides: Vec<(String, u32)>,

    /// Skip the raster OCR strategy.
    #[arg(long, default_value_t = false)]
    no_ocr: bool,

    #[arg(long, env = "PYQ_OCR_DPI", default_value = "150")]
    ocr_dpi: u32,

    #[arg(long, env = "PYQ_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// Document-ingestion endpoint that receives accepted questions.
    #[arg(long, env = "PYQ_SINK_URL")]
    sink_url: Option<String>,

    #[arg(long, env = "PYQ_SINK_API_KEY")]
    sink_api_key: Option<String>,

    #[arg(long, env = "PYQ_SINK_BATCH_SIZE", default_value = "64")]
    sink_batch_size: usize,
}

impl RunArgs {
    fn options(&self) -> IngestionOptions {
        let defaults = IngestionOptions::default();
        IngestionOptions {
            min_extracted_chars: self.min_extracted_chars,
            min_question_chars: self.min_question_chars,
            max_question_chars: self.max_question_chars,
            fuzzy_threshold: self.fuzzy_threshold,
            workers: self.workers.unwrap_or(defaults.workers),
            marks: MarksTable {
                prelims: self.marks_prelims,
                essay: self.marks_essay,
                mains: self.marks_mains,
                overrides: self.marks_overrides.iter().cloned().collect(),
            },
            ..defaults
        }
    }

    fn cascade(&self, min_chars: usize) -> ExtractionCascade {
        let cascade = ExtractionCascade::new(min_chars);
        if self.no_ocr {
            return cascade;
        }
        if !TesseractOcr::tools_available() {
            warn!("pdftoppm or tesseract not found on PATH, OCR strategy disabled");
            return cascade;
        }
        cascade.with_ocr(TesseractOcr::new(OcrSettings {
            dpi: self.ocr_dpi,
            lang: self.ocr_lang.clone(),
        }))
    }
}

fn parse_marks_override(raw: &str) -> Result<(String, u32), String> {
    let (paper, marks) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected paper=marks, got `{raw}`"))?;
    let marks = marks
        .trim()
        .parse::<u32>()
        .map_err(|error| format!("invalid marks in `{raw}`: {error}"))?;
    Ok((pyq_corpus_core::enricher::normalize_paper_type(paper), marks))
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run(Cli::parse()).await {
        error!(error = %err, "pyq-corpus failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let store = match &cli.failed_list {
        Some(failed) => CorpusStore::new(&cli.corpus, failed),
        None => CorpusStore::at(&cli.corpus),
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        corpus = %store.corpus_path().display(),
        "pyq-corpus boot"
    );

    match cli.command {
        Command::Ingest { run: args } => {
            let report = run_pipeline(store, &args, false).await?;
            print_report("ingest", &report);
            push_accepted(&args, &report).await?;
        }
        Command::Retry { run: args } => {
            let report = run_pipeline(store, &args, true).await?;
            print_report("retry", &report);
            push_accepted(&args, &report).await?;
        }
        Command::Stats => {
            let records = store
                .load()
                .with_context(|| format!("failed to load {}", store.corpus_path().display()))?;
            print_stats(&CorpusStats::from_records(&records));
        }
    }

    Ok(())
}

async fn run_pipeline(store: CorpusStore, args: &RunArgs, retry: bool) -> Result<RunReport> {
    let options = args.options();
    let cascade = args.cascade(options.min_extracted_chars);
    let pipeline =
        IngestionPipeline::new(store, cascade, &options).context("failed to build pipeline")?;
    let input = args.input.clone();

    let report = tokio::task::spawn_blocking(move || {
        if retry {
            pipeline.retry_failed(&input)
        } else {
            pipeline.run(&input)
        }
    })
    .await
    .context("pipeline worker panicked")??;

    for failed in &report.failed {
        warn!(path = %failed.path.display(), reason = %failed.reason, "failed document");
    }
    Ok(report)
}

async fn push_accepted(args: &RunArgs, report: &RunReport) -> Result<()> {
    let Some(endpoint) = &args.sink_url else {
        return Ok(());
    };

    let sink = HttpDocumentSink::new(endpoint, args.sink_api_key.clone())?;
    let documents = to_sink_documents(&report.accepted, args.options().stable_key_prefix_chars)?;

    let mut ingested = 0usize;
    for batch in documents.chunks(args.sink_batch_size.max(1)) {
        ingested += sink
            .ingest(batch)
            .await
            .with_context(|| format!("push to {endpoint} failed; corpus was already published"))?;
    }

    info!(endpoint = %endpoint, sent = documents.len(), ingested, "accepted questions pushed");
    println!("{ingested} questions pushed to {endpoint}");
    Ok(())
}

fn print_report(label: &str, report: &RunReport) {
    println!("{label} run {}", report.run_id);
    println!(
        "  documents: {} discovered, {} processed, {} failed",
        report.documents_discovered,
        report.documents_processed,
        report.failed.len()
    );
    println!(
        "  questions: {} segmented, {} accepted ({} from line heuristic)",
        report.questions_segmented,
        report.accepted.len(),
        report.fallback_records
    );
    println!(
        "  duplicates: {} exact, {} fuzzy",
        report.exact_duplicates, report.fuzzy_duplicates
    );
    println!(
        "  corpus: {} -> {} records",
        report.corpus_before, report.corpus_after
    );
    for failed in &report.failed {
        println!("  failed: {} ({})", failed.path.display(), failed.reason);
    }
}

fn print_stats(stats: &CorpusStats) {
    println!("records: {}", stats.total);
    println!("objective (4 options): {}", stats.objective);
    println!("by year:");
    for (year, count) in stats.by_year.iter().rev() {
        println!("  {year}: {count}");
    }
    println!("by exam type:");
    for (exam_type, count) in &stats.by_exam_type {
        println!("  {exam_type}: {count}");
    }
    println!("by paper type:");
    for (paper_type, count) in &stats.by_paper_type {
        println!("  {paper_type}: {count}");
    }
}
