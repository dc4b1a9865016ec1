use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ExamType {
    Prelims,
    Mains,
    Optional,
}

impl ExamType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prelims => "prelims",
            Self::Mains => "mains",
            Self::Optional => "optional",
        }
    }

    /// Prelims papers are objective: four lettered options per question.
    pub fn is_objective(self) -> bool {
        matches!(self, Self::Prelims)
    }
}

impl fmt::Display for ExamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

/// Which extraction path produced a record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum SourceTag {
    /// Embedded text layer read with lopdf.
    #[default]
    #[serde(rename = "primary")]
    Primary,
    /// Independent text extractor (pdf-extract).
    #[serde(rename = "secondary")]
    Secondary,
    /// Page-by-page raster OCR.
    #[serde(rename = "ocr")]
    Ocr,
    /// Heuristic line segmenter; lower quality, filter downstream if needed.
    #[serde(rename = "OCR-fallback")]
    OcrFallback,
}

impl SourceTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Ocr => "ocr",
            Self::OcrFallback => "OCR-fallback",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lexical convention used to label questions in a paper.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Grammar {
    /// `12. ...`, `12) ...`, `Q12. ...`
    NumericDot,
    /// `(a) ...`
    LetteredParen,
    /// `iv. ...`
    RomanDot,
    /// Sequential numbering assigned by the heuristic fallback.
    Sequential,
}

/// Question label as printed in the source. Numeric labels serialize as
/// integers so older corpora stay readable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum QuestionNumber {
    Numeric(u32),
    Label(String),
}

impl QuestionNumber {
    fn sort_rank(&self) -> (u8, u32) {
        match self {
            Self::Numeric(value) => (2, *value),
            Self::Label(label) => {
                if let Ok(value) = label.trim().parse::<u32>() {
                    return (2, value);
                }
                if let Some(value) = roman_value(label) {
                    return (1, value);
                }
                let letter = label
                    .trim_matches(|c: char| c == '(' || c == ')')
                    .chars()
                    .next()
                    .filter(|c| c.is_ascii_alphabetic())
                    .map(|c| (c.to_ascii_lowercase() as u32) - ('a' as u32) + 1)
                    .unwrap_or(0);
                (0, letter)
            }
        }
    }
}

impl Ord for QuestionNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_rank()
            .cmp(&other.sort_rank())
            .then_with(|| self.to_string().cmp(&other.to_string()))
    }
}

impl PartialOrd for QuestionNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for QuestionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(value) => write!(f, "{value}"),
            Self::Label(label) => f.write_str(label),
        }
    }
}

/// Value of a lower-case roman numeral, or `None` if `label` is not one.
pub fn roman_value(label: &str) -> Option<u32> {
    if label.is_empty() {
        return None;
    }

    let digit = |c: char| match c {
        'i' => Some(1),
        'v' => Some(5),
        'x' => Some(10),
        'l' => Some(50),
        'c' => Some(100),
        'd' => Some(500),
        'm' => Some(1000),
        _ => None,
    };

    let values = label.chars().map(digit).collect::<Option<Vec<u32>>>()?;
    let mut total = 0i64;
    for (index, value) in values.iter().enumerate() {
        match values.get(index + 1) {
            Some(next) if next > value => total -= i64::from(*value),
            _ => total += i64::from(*value),
        }
    }
    let total = u32::try_from(total).ok()?;

    if to_roman(total).as_deref() == Some(label) {
        Some(total)
    } else {
        None
    }
}

fn to_roman(mut value: u32) -> Option<String> {
    if value == 0 || value > 3999 {
        return None;
    }
    const TABLE: [(u32, &str); 13] = [
        (1000, "m"),
        (900, "cm"),
        (500, "d"),
        (400, "cd"),
        (100, "c"),
        (90, "xc"),
        (50, "l"),
        (40, "xl"),
        (10, "x"),
        (9, "ix"),
        (5, "v"),
        (4, "iv"),
        (1, "i"),
    ];
    let mut out = String::new();
    for (step, glyph) in TABLE {
        while value >= step {
            out.push_str(glyph);
            value -= step;
        }
    }
    Some(out)
}

/// One question in the corpus. Created once per extraction pass and never
/// mutated after enrichment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
    pub year: i32,
    #[serde(alias = "exam_type")]
    pub exam_type: ExamType,
    #[serde(alias = "paper_type")]
    pub paper_type: String,
    #[serde(alias = "question_number")]
    pub question_number: QuestionNumber,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numbering: Option<Grammar>,
    #[serde(alias = "question_text")]
    pub question_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub marks: u32,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default, alias = "source")]
    pub source_tag: SourceTag,
}

impl QuestionRecord {
    /// Member of the objective subset: exactly four options.
    pub fn is_objective(&self) -> bool {
        self.options
            .as_ref()
            .is_some_and(|options| options.len() == OBJECTIVE_OPTION_COUNT)
    }
}

pub const OBJECTIVE_OPTION_COUNT: usize = 4;

/// Exam identity implied by a document's location and file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMeta {
    pub path: PathBuf,
    pub exam_type: ExamType,
    pub paper_type: String,
    pub year: i32,
}

/// Source document for which no extraction strategy produced usable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDocument {
    pub path: PathBuf,
    pub reason: String,
}

/// Coarse marks heuristic. Overridable per paper type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarksTable {
    pub prelims: u32,
    pub essay: u32,
    pub mains: u32,
    pub overrides: BTreeMap<String, u32>,
}

impl Default for MarksTable {
    fn default() -> Self {
        Self {
            prelims: 2,
            essay: 125,
            mains: 10,
            overrides: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    /// Below this many characters an extraction strategy counts as failed.
    pub min_extracted_chars: usize,
    pub min_question_chars: usize,
    pub max_question_chars: usize,
    pub fallback_min_line_chars: usize,
    pub fuzzy_threshold: f64,
    pub stable_key_prefix_chars: usize,
    pub workers: usize,
    pub marks: MarksTable,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            min_extracted_chars: 200,
            min_question_chars: 15,
            max_question_chars: 1_500,
            fallback_min_line_chars: 40,
            fuzzy_threshold: 0.85,
            stable_key_prefix_chars: 120,
            workers: std::thread::available_parallelism()
                .map(|count| count.get())
                .unwrap_or(1),
            marks: MarksTable::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roman_labels_are_validated() {
        assert_eq!(roman_value("iv"), Some(4));
        assert_eq!(roman_value("ix"), Some(9));
        assert_eq!(roman_value("xiv"), Some(14));
        assert_eq!(roman_value("xix"), Some(19));
        assert_eq!(roman_value("xl"), Some(40));
        assert_eq!(roman_value("iiii"), None);
        assert_eq!(roman_value("vx"), None);
        assert_eq!(roman_value("did"), None);
    }

    #[test]
    fn numeric_labels_outrank_lettered_and_roman() {
        let mut labels = vec![
            QuestionNumber::Label("(b)".to_string()),
            QuestionNumber::Numeric(3),
            QuestionNumber::Label("ii".to_string()),
            QuestionNumber::Numeric(12),
            QuestionNumber::Label("(a)".to_string()),
        ];
        labels.sort();
        let rendered = labels.iter().map(ToString::to_string).collect::<Vec<_>>();
        assert_eq!(rendered, vec!["(a)", "(b)", "ii", "3", "12"]);
    }

    #[test]
    fn subtractive_roman_labels_sort_by_value() {
        let mut labels = ["ix", "v", "iv", "x", "iii"]
            .iter()
            .map(|label| QuestionNumber::Label(label.to_string()))
            .collect::<Vec<_>>();
        labels.sort();
        let rendered = labels.iter().map(ToString::to_string).collect::<Vec<_>>();
        assert_eq!(rendered, vec!["iii", "iv", "v", "ix", "x"]);
    }

    #[test]
    fn legacy_snake_case_records_deserialize() -> Result<(), serde_json::Error> {
        let raw = r#"{
            "year": 2019,
            "exam_type": "mains",
            "paper_type": "gs1",
            "question_number": 4,
            "question_text": "Discuss the salient features of the Harappan town planning.",
            "marks": 10,
            "difficulty": "Medium",
            "source": "OCR-fallback"
        }"#;
        let record: QuestionRecord = serde_json::from_str(raw)?;
        assert_eq!(record.exam_type, ExamType::Mains);
        assert_eq!(record.question_number, QuestionNumber::Numeric(4));
        assert_eq!(record.source_tag, SourceTag::OcrFallback);
        assert!(record.options.is_none());
        Ok(())
    }

    #[test]
    fn records_serialize_with_camel_case_fields() -> Result<(), serde_json::Error> {
        let record = QuestionRecord {
            year: 2023,
            exam_type: ExamType::Prelims,
            paper_type: "gs".to_string(),
            question_number: QuestionNumber::Numeric(1),
            numbering: Some(Grammar::NumericDot),
            question_text: "Which of the following is a fundamental right?".to_string(),
            options: None,
            marks: 2,
            difficulty: Difficulty::Easy,
            source_tag: SourceTag::Primary,
        };
        let value = serde_json::to_value(&record)?;
        assert_eq!(value["examType"], "prelims");
        assert_eq!(value["questionNumber"], 1);
        assert_eq!(value["sourceTag"], "primary");
        assert!(value.get("options").is_none());
        Ok(())
    }
}
