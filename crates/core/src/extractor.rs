use crate::error::IngestError;
use crate::models::SourceTag;
use lopdf::Document;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// One strategy of the extraction cascade.
pub trait PdfExtractor: Send + Sync {
    fn source_tag(&self) -> SourceTag;

    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

/// Embedded text layer via lopdf. Cheapest, and exact for digitally
/// produced papers.
#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn source_tag(&self) -> SourceTag {
        SourceTag::Primary
    }

    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        without_panics("lopdf", path, || lopdf_pages(path))
    }
}

fn lopdf_pages(path: &Path) -> Result<Vec<PageText>, IngestError> {
    let document = Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

    let mut pages = Vec::new();
    for (page_no, _page_id) in document.get_pages() {
        match document.extract_text(&[page_no]) {
            Ok(text) if !text.trim().is_empty() => pages.push(PageText {
                number: page_no,
                text,
            }),
            Ok(_) => {}
            Err(error) => {
                debug!(path = %path.display(), page = page_no, %error, "lopdf page text unreadable");
            }
        }
    }

    if pages.is_empty() {
        return Err(IngestError::PdfParse(format!(
            "pdf had no readable page text: {}",
            path.display()
        )));
    }

    Ok(pages)
}

/// Both PDF parsers can panic on malformed input; a panic is a parse error
/// for that strategy only.
fn without_panics<T>(
    parser: &str,
    path: &Path,
    parse: impl FnOnce() -> Result<T, IngestError>,
) -> Result<T, IngestError> {
    panic::catch_unwind(AssertUnwindSafe(parse)).map_err(|_| {
        IngestError::PdfParse(format!("{parser} panicked on {}", path.display()))
    })?
}

/// Independent text extractor (pdf-extract). Recovers papers whose font
/// encodings lopdf mis-decodes.
#[derive(Default)]
pub struct PdfExtractExtractor;

impl PdfExtractor for PdfExtractExtractor {
    fn source_tag(&self) -> SourceTag {
        SourceTag::Secondary
    }

    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let text = without_panics("pdf-extract", path, || {
            pdf_extract::extract_text(path).map_err(|error| IngestError::PdfParse(error.to_string()))
        })?;

        let pages = split_form_feeds(&text);
        if pages.is_empty() {
            return Err(IngestError::PdfParse(format!(
                "pdf-extract found no text: {}",
                path.display()
            )));
        }
        Ok(pages)
    }
}

fn split_form_feeds(text: &str) -> Vec<PageText> {
    text.split('\u{000c}')
        .enumerate()
        .filter_map(|(index, chunk)| {
            let trimmed = chunk.replace('\u{0000}', "");
            if trimmed.trim().is_empty() {
                None
            } else {
                Some(PageText {
                    number: (index + 1) as u32,
                    text: trimmed,
                })
            }
        })
        .collect()
}

/// Renders and recognizes a single page at a time.
pub trait OcrEngine: Send + Sync {
    fn page_count(&self, path: &Path) -> Result<u32, IngestError>;

    fn recognize_page(&self, path: &Path, page: u32) -> Result<String, IngestError>;
}

#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub dpi: u32,
    pub lang: String,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            dpi: 150,
            lang: "eng".to_string(),
        }
    }
}

/// `pdftoppm` + `tesseract`. Each page is rasterized into its own temporary
/// directory, which is removed before the next page is rendered.
#[derive(Debug, Clone, Default)]
pub struct TesseractOcr {
    settings: OcrSettings,
}

impl TesseractOcr {
    pub fn new(settings: OcrSettings) -> Self {
        Self { settings }
    }

    pub fn tools_available() -> bool {
        command_available("pdftoppm", "-v") && command_available("tesseract", "--version")
    }
}

impl OcrEngine for TesseractOcr {
    fn page_count(&self, path: &Path) -> Result<u32, IngestError> {
        if let Ok(document) = Document::load(path) {
            return Ok(document.get_pages().len() as u32);
        }
        pdfinfo_page_count(path)
    }

    fn recognize_page(&self, path: &Path, page: u32) -> Result<String, IngestError> {
        let scratch = tempfile::tempdir()?;
        let output_root = scratch.path().join("page");
        let png_path = scratch.path().join("page.png");

        let pdftoppm = Command::new("pdftoppm")
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg("-r")
            .arg(self.settings.dpi.to_string())
            .arg("-singlefile")
            .arg("-png")
            .arg(path)
            .arg(&output_root)
            .output()
            .map_err(|error| IngestError::OcrFailed(format!("failed to execute pdftoppm: {error}")))?;

        if !pdftoppm.status.success() {
            return Err(IngestError::OcrFailed(format!(
                "pdftoppm exited with {} for page {page}: {}",
                pdftoppm.status,
                String::from_utf8_lossy(&pdftoppm.stderr).trim()
            )));
        }

        if !png_path.exists() {
            return Err(IngestError::OcrFailed(format!(
                "pdftoppm produced no image for page {page}"
            )));
        }

        let tesseract = Command::new("tesseract")
            .arg(&png_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.settings.lang)
            .output()
            .map_err(|error| IngestError::OcrFailed(format!("failed to execute tesseract: {error}")))?;

        if !tesseract.status.success() {
            return Err(IngestError::OcrFailed(format!(
                "tesseract exited with {} for page {page}: {}",
                tesseract.status,
                String::from_utf8_lossy(&tesseract.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&tesseract.stdout).replace('\u{0000}', ""))
    }
}

fn command_available(program: &str, version_flag: &str) -> bool {
    Command::new(program).arg(version_flag).output().is_ok()
}

fn pdfinfo_page_count(path: &Path) -> Result<u32, IngestError> {
    let output = Command::new("pdfinfo")
        .arg(path)
        .output()
        .map_err(|error| IngestError::OcrFailed(format!("failed to execute pdfinfo: {error}")))?;

    if !output.status.success() {
        return Err(IngestError::PdfParse(format!(
            "pdfinfo could not read {}",
            path.display()
        )));
    }

    parse_pdfinfo_pages(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
        IngestError::PdfParse(format!("pdfinfo reported no page count for {}", path.display()))
    })
}

fn parse_pdfinfo_pages(report: &str) -> Option<u32> {
    report
        .lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|value| value.trim().parse().ok())
}

/// Raster OCR strategy. Pages that fail are skipped, never the document.
pub struct OcrExtractor<E> {
    engine: E,
}

impl<E: OcrEngine> OcrExtractor<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }
}

impl<E: OcrEngine> PdfExtractor for OcrExtractor<E> {
    fn source_tag(&self) -> SourceTag {
        SourceTag::Ocr
    }

    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let page_count = self.engine.page_count(path)?;
        let mut pages = Vec::new();

        for number in 1..=page_count {
            match self.engine.recognize_page(path, number) {
                Ok(text) if !text.trim().is_empty() => pages.push(PageText { number, text }),
                Ok(_) => debug!(path = %path.display(), page = number, "ocr page empty"),
                Err(error) => {
                    warn!(path = %path.display(), page = number, %error, "ocr page failed, skipping");
                }
            }
        }

        if pages.is_empty() {
            return Err(IngestError::OcrFailed(format!(
                "no page of {} produced text",
                path.display()
            )));
        }
        Ok(pages)
    }
}

/// Best text the cascade found for a document.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    pub source_tag: SourceTag,
    /// At least `min_chars` of trimmed text.
    pub sufficient: bool,
    /// `strategy: outcome` for every strategy that was tried.
    pub attempts: Vec<String>,
}

impl Extraction {
    pub fn char_count(&self) -> usize {
        self.text.trim().chars().count()
    }
}

/// Ordered extraction strategies, cheapest first. Stops at the first
/// strategy whose text reaches `min_chars`.
pub struct ExtractionCascade {
    strategies: Vec<Box<dyn PdfExtractor>>,
    min_chars: usize,
}

impl ExtractionCascade {
    /// lopdf, then pdf-extract. No OCR.
    pub fn new(min_chars: usize) -> Self {
        let strategies: Vec<Box<dyn PdfExtractor>> =
            vec![Box::new(LopdfExtractor), Box::new(PdfExtractExtractor)];
        Self::from_strategies(strategies, min_chars)
    }

    pub fn from_strategies(strategies: Vec<Box<dyn PdfExtractor>>, min_chars: usize) -> Self {
        Self {
            strategies,
            min_chars,
        }
    }

    /// Appends raster OCR as the last resort.
    pub fn with_ocr<E: OcrEngine + 'static>(mut self, engine: E) -> Self {
        self.strategies.push(Box::new(OcrExtractor::new(engine)));
        self
    }

    pub fn extract(&self, path: &Path) -> Extraction {
        let mut attempts = Vec::new();
        let mut best: Option<Extraction> = None;

        for strategy in &self.strategies {
            let tag = strategy.source_tag();
            match strategy.extract_pages(path) {
                Ok(pages) => {
                    let text = pages
                        .into_iter()
                        .map(|page| page.text)
                        .collect::<Vec<_>>()
                        .join("\n");
                    let chars = text.trim().chars().count();

                    if chars >= self.min_chars {
                        attempts.push(format!("{tag}: {chars} chars"));
                        debug!(path = %path.display(), strategy = %tag, chars, "extraction succeeded");
                        return Extraction {
                            text,
                            source_tag: tag,
                            sufficient: true,
                            attempts,
                        };
                    }

                    attempts.push(format!("{tag}: only {chars} chars"));
                    debug!(path = %path.display(), strategy = %tag, chars, "extraction below threshold");
                    if best.as_ref().map_or(true, |current| chars > current.char_count()) {
                        best = Some(Extraction {
                            text,
                            source_tag: tag,
                            sufficient: false,
                            attempts: Vec::new(),
                        });
                    }
                }
                Err(error) => {
                    warn!(path = %path.display(), strategy = %tag, %error, "extraction strategy failed");
                    attempts.push(format!("{tag}: {error}"));
                }
            }
        }

        let mut extraction = best.unwrap_or(Extraction {
            text: String::new(),
            source_tag: SourceTag::Primary,
            sufficient: false,
            attempts: Vec::new(),
        });
        extraction.attempts = attempts;
        extraction
    }
}
