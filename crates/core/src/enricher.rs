use crate::error::IngestError;
use crate::models::{
    Difficulty, DocumentMeta, ExamType, Grammar, MarksTable, QuestionRecord, SourceTag,
    OBJECTIVE_OPTION_COUNT,
};
use crate::segmenter::Candidate;
use chrono::Datelike;
use regex::Regex;
use std::path::Path;

const HARD_CUES: [&str; 5] = ["critically", "evaluate", "analyze", "analyse", "examine"];
const MEDIUM_CUES: [&str; 2] = ["discuss", "explain"];

const OPTION_MARKER: &str = r"\((?P<letter>[a-dA-D])\)\s*";

/// Turns segmented candidates into corpus records.
pub struct Enricher {
    marks: MarksTable,
    min_question_chars: usize,
    option_marker: Regex,
}

impl Enricher {
    pub fn new(marks: MarksTable, min_question_chars: usize) -> Result<Self, IngestError> {
        Ok(Self {
            marks,
            min_question_chars,
            option_marker: Regex::new(OPTION_MARKER)?,
        })
    }

    pub fn enrich(
        &self,
        candidate: Candidate,
        meta: &DocumentMeta,
        extracted_by: SourceTag,
    ) -> QuestionRecord {
        let source_tag = if candidate.grammar == Grammar::Sequential {
            SourceTag::OcrFallback
        } else {
            extracted_by
        };

        let (question_text, options) = if meta.exam_type.is_objective() {
            self.split_options(&candidate.text)
        } else {
            (candidate.text, None)
        };

        let paper_type = normalize_paper_type(&meta.paper_type);

        QuestionRecord {
            year: meta.year,
            exam_type: meta.exam_type,
            marks: estimate_marks(&self.marks, meta.exam_type, &paper_type),
            difficulty: estimate_difficulty(&question_text),
            paper_type,
            question_number: candidate.number,
            numbering: Some(candidate.grammar),
            question_text,
            options,
            source_tag,
        }
    }

    /// Splits trailing `(a) .. (d)` options off an objective question. Any
    /// marker layout other than exactly a, b, c, d in order leaves the text
    /// whole and yields no options; such records stay in the corpus but
    /// outside the objective subset. The same applies when the stem alone
    /// would be shorter than the minimum question length.
    pub fn split_options(&self, text: &str) -> (String, Option<Vec<String>>) {
        let markers = self
            .option_marker
            .captures_iter(text)
            .filter_map(|captures| {
                let whole = captures.get(0)?;
                let letter = captures.name("letter")?.as_str().to_ascii_lowercase();
                Some((whole.start(), whole.end(), letter))
            })
            .collect::<Vec<_>>();

        let in_order = markers
            .iter()
            .map(|(_, _, letter)| letter.as_str())
            .eq(["a", "b", "c", "d"]);
        if markers.len() != OBJECTIVE_OPTION_COUNT || !in_order {
            return (text.to_string(), None);
        }

        let stem = text[..markers[0].0].trim().to_string();
        let options = markers
            .iter()
            .enumerate()
            .map(|(index, (_, body_start, _))| {
                let body_end = markers
                    .get(index + 1)
                    .map(|(next_start, _, _)| *next_start)
                    .unwrap_or(text.len());
                text[*body_start..body_end].trim().to_string()
            })
            .collect::<Vec<_>>();

        if stem.chars().count() < self.min_question_chars || options.iter().any(String::is_empty) {
            return (text.to_string(), None);
        }
        (stem, Some(options))
    }
}

/// First `20xx` token in a file or directory name.
pub fn extract_year(name: &str) -> Option<i32> {
    let bytes = name.as_bytes();
    bytes.windows(4).enumerate().find_map(|(index, window)| {
        let is_year = window[0] == b'2'
            && window[1] == b'0'
            && window[2].is_ascii_digit()
            && window[3].is_ascii_digit();
        let boundary_before = index == 0 || !bytes[index - 1].is_ascii_digit();
        let boundary_after = bytes.get(index + 4).map_or(true, |next| !next.is_ascii_digit());
        if is_year && boundary_before && boundary_after {
            std::str::from_utf8(window).ok()?.parse().ok()
        } else {
            None
        }
    })
}

/// Year from the file name, then from enclosing directories, else the
/// current year.
pub fn infer_year(path: &Path) -> i32 {
    let file_year = path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(extract_year);

    file_year
        .or_else(|| {
            path.ancestors()
                .skip(1)
                .filter_map(|ancestor| ancestor.file_name().and_then(|name| name.to_str()))
                .find_map(extract_year)
        })
        .unwrap_or_else(|| chrono::Utc::now().year())
}

/// Lower-case, whitespace runs collapsed to `_`.
pub fn normalize_paper_type(raw: &str) -> String {
    raw.to_lowercase().split_whitespace().collect::<Vec<_>>().join("_")
}

pub fn estimate_marks(table: &MarksTable, exam_type: ExamType, paper_type: &str) -> u32 {
    if let Some(marks) = table.overrides.get(paper_type) {
        return *marks;
    }
    match exam_type {
        ExamType::Prelims => table.prelims,
        _ if paper_type == "essay" => table.essay,
        _ => table.mains,
    }
}

/// First matching tier wins: analytical verbs, then directive verbs.
pub fn estimate_difficulty(text: &str) -> Difficulty {
    let lowered = text.to_lowercase();
    if HARD_CUES.iter().any(|cue| lowered.contains(cue)) {
        Difficulty::Hard
    } else if MEDIUM_CUES.iter().any(|cue| lowered.contains(cue)) {
        Difficulty::Medium
    } else {
        Difficulty::Easy
    }
}

/// Text form compared by the fuzzy deduplicator.
pub fn similarity_key(text: &str) -> String {
    text.to_lowercase()
}
