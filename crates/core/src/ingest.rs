//! Source document discovery and the exam identity implied by a document's
//! place in the input tree:
//!
//! ```text
//! <root>/prelims/{prelims,gs,csat}/*.pdf
//! <root>/mains/{gs1,gs2,gs3,gs4,essay}/*.pdf
//! <root>/mains/optional/*.pdf
//! <root>/optional/*.pdf
//! ```

use crate::enricher::{infer_year, normalize_paper_type};
use crate::error::IngestError;
use crate::models::{DocumentMeta, ExamType};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

pub const MAINS_PAPERS: [&str; 5] = ["gs1", "gs2", "gs3", "gs4", "essay"];

pub const OPTIONAL_SUBJECTS: [&str; 11] = [
    "geography",
    "history",
    "sociology",
    "anthropology",
    "political science",
    "public administration",
    "economics",
    "philosophy",
    "psychology",
    "law",
    "management",
];

const UNKNOWN_PAPER: &str = "unknown";

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Maps document paths to [`DocumentMeta`].
pub struct LayoutResolver {
    root: PathBuf,
    paper_one: Regex,
    paper_two: Regex,
}

impl LayoutResolver {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, IngestError> {
        Ok(Self {
            root: root.into(),
            paper_one: Regex::new(r"(paper[-_ ]?1|\bi\b)")?,
            paper_two: Regex::new(r"(paper[-_ ]?2|\bii\b)")?,
        })
    }

    /// Exam type and paper from the directories under the root, year from
    /// the file name or its directories. Anything outside the known layout
    /// is `mains` / `unknown`.
    pub fn document_meta(&self, path: &Path) -> DocumentMeta {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let directories = relative
            .parent()
            .map(|parent| {
                parent
                    .components()
                    .filter_map(|component| match component {
                        Component::Normal(name) => name.to_str().map(str::to_lowercase),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_lowercase();

        let dirs = directories.iter().map(String::as_str).collect::<Vec<_>>();
        let (exam_type, paper_type) = match dirs.as_slice() {
            ["prelims"] | ["prelims", "prelims" | "gs", ..] => (ExamType::Prelims, "gs".to_string()),
            ["prelims", "csat", ..] => (ExamType::Prelims, "csat".to_string()),
            ["prelims", other, ..] => (ExamType::Prelims, normalize_paper_type(other)),
            ["mains", "optional", ..] | ["optional", ..] => {
                (ExamType::Optional, self.optional_paper(&file_name))
            }
            ["mains", paper, ..] if MAINS_PAPERS.contains(paper) => (ExamType::Mains, paper.to_string()),
            _ => (ExamType::Mains, UNKNOWN_PAPER.to_string()),
        };

        DocumentMeta {
            path: path.to_path_buf(),
            exam_type,
            paper_type,
            year: infer_year(path),
        }
    }

    /// `optional_<subject>_<paper1|paper2|unknown>`.
    fn optional_paper(&self, file_name: &str) -> String {
        let compact = file_name.replace(' ', "");
        let subject = OPTIONAL_SUBJECTS
            .iter()
            .find(|subject| compact.contains(&subject.replace(' ', "")))
            .map(|subject| subject.replace(' ', "_"))
            .unwrap_or_else(|| UNKNOWN_PAPER.to_string());

        let paper = if self.paper_one.is_match(file_name) {
            "paper1"
        } else if self.paper_two.is_match(file_name) {
            "paper2"
        } else {
            UNKNOWN_PAPER
        };

        format!("optional_{subject}_{paper}")
    }
}
