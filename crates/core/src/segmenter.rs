//! Splits normalized paper text into candidate questions.

use crate::error::IngestError;
use crate::models::{roman_value, ExamType, Grammar, IngestionOptions, QuestionNumber};
use crate::normalize::normalize_whitespace;
use regex::Regex;

/// `12. `, `12) `, `Q12. `, `Question 12. ` at a line start or after
/// sentence punctuation.
const NUMERIC_DOT: &str =
    r"(?m)(?:^|[.?!:;]\s)[ \t]*(?P<label>(?:(?i:q(?:uestion)?)\.?[ \t]*)?(?P<value>\d{1,3})[.)])\s+";

/// `(a) ` anywhere after whitespace.
const LETTERED_PAREN: &str = r"(?m)(?:^|\s)(?P<label>\((?P<value>[a-eA-E])\))\s+";

/// `iv. ` at a line start.
const ROMAN_DOT: &str = r"(?m)^[ \t]*(?P<label>(?P<value>[ivx]{1,6})\.)\s+";

const MAX_ROMAN_LABEL: u32 = 39;

/// Phrasing that marks a line as an exam question when no numbering is
/// recognizable.
pub const QUESTION_VERB_CUES: [&str; 9] = [
    "discuss",
    "examine",
    "analyze",
    "analyse",
    "critically",
    "evaluate",
    "comment",
    "explain",
    "elucidate",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub number: QuestionNumber,
    pub text: String,
    pub grammar: Grammar,
}

struct GrammarPattern {
    grammar: Grammar,
    label: Regex,
}

pub struct Segmenter {
    patterns: Vec<GrammarPattern>,
    min_chars: usize,
    max_chars: usize,
    fallback_min_line_chars: usize,
}

impl Segmenter {
    pub fn new(options: &IngestionOptions) -> Result<Self, IngestError> {
        let patterns = vec![
            GrammarPattern {
                grammar: Grammar::NumericDot,
                label: Regex::new(NUMERIC_DOT)?,
            },
            GrammarPattern {
                grammar: Grammar::LetteredParen,
                label: Regex::new(LETTERED_PAREN)?,
            },
            GrammarPattern {
                grammar: Grammar::RomanDot,
                label: Regex::new(ROMAN_DOT)?,
            },
        ];

        Ok(Self {
            patterns,
            min_chars: options.min_question_chars,
            max_chars: options.max_question_chars,
            fallback_min_line_chars: options.fallback_min_line_chars,
        })
    }

    /// Numbering grammars first; the line heuristic only when they find
    /// nothing.
    pub fn segment(&self, text: &str, exam_type: ExamType) -> Vec<Candidate> {
        let candidates = self.segment_numbered(text, exam_type);
        if candidates.is_empty() {
            self.segment_fallback(text)
        } else {
            candidates
        }
    }

    /// Union of every applicable grammar, in grammar priority order. Each
    /// candidate keeps its grammar so labels from different grammars never
    /// collide.
    pub fn segment_numbered(&self, text: &str, exam_type: ExamType) -> Vec<Candidate> {
        self.patterns
            .iter()
            .filter(|pattern| grammar_applies(pattern.grammar, exam_type))
            .flat_map(|pattern| self.apply_grammar(pattern, text))
            .collect()
    }

    /// Lines long enough to be a question and carrying a directive verb,
    /// numbered sequentially. Boundaries between multi-line questions are
    /// not recovered.
    pub fn segment_fallback(&self, text: &str) -> Vec<Candidate> {
        text.lines()
            .map(str::trim)
            .filter(|line| line.chars().count() > self.fallback_min_line_chars)
            .filter(|line| {
                let lowered = line.to_lowercase();
                QUESTION_VERB_CUES.iter().any(|cue| lowered.contains(cue))
            })
            .enumerate()
            .map(|(index, line)| Candidate {
                number: QuestionNumber::Numeric(index as u32 + 1),
                text: truncate_chars(&normalize_whitespace(line), self.max_chars),
                grammar: Grammar::Sequential,
            })
            .collect()
    }

    fn apply_grammar(&self, pattern: &GrammarPattern, text: &str) -> Vec<Candidate> {
        let labels = pattern
            .label
            .captures_iter(text)
            .filter_map(|captures| {
                let label = captures.name("label")?;
                let value = captures.name("value")?.as_str();
                let whole = captures.get(0)?;
                let number = label_number(pattern.grammar, value)?;
                Some((label.start(), whole.end(), number))
            })
            .collect::<Vec<_>>();

        let mut candidates = Vec::new();
        for (index, (_, body_start, number)) in labels.iter().enumerate() {
            let body_end = labels
                .get(index + 1)
                .map(|(next_label_start, _, _)| *next_label_start)
                .unwrap_or(text.len());
            if body_end <= *body_start {
                continue;
            }

            let body = normalize_whitespace(&text[*body_start..body_end]);
            if body.chars().count() < self.min_chars {
                continue;
            }

            candidates.push(Candidate {
                number: number.clone(),
                text: truncate_chars(&body, self.max_chars),
                grammar: pattern.grammar,
            });
        }
        candidates
    }
}

/// Lettered labels are answer options in objective papers, not questions.
fn grammar_applies(grammar: Grammar, exam_type: ExamType) -> bool {
    !(grammar == Grammar::LetteredParen && exam_type.is_objective())
}

fn label_number(grammar: Grammar, value: &str) -> Option<QuestionNumber> {
    match grammar {
        Grammar::NumericDot | Grammar::Sequential => value.parse().ok().map(QuestionNumber::Numeric),
        Grammar::LetteredParen => Some(QuestionNumber::Label(format!("({})", value.to_lowercase()))),
        Grammar::RomanDot => roman_value(value)
            .filter(|parsed| *parsed <= MAX_ROMAN_LABEL)
            .map(|_| QuestionNumber::Label(value.to_string())),
    }
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].trim_end().to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter() -> Segmenter {
        Segmenter::new(&IngestionOptions::default()).unwrap()
    }

    #[test]
    fn numeric_dot_splits_inline_questions() {
        let text = "1. What is federalism? 2. Explain separation of powers.";
        let candidates = segmenter().segment_numbered(text, ExamType::Mains);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].number, QuestionNumber::Numeric(1));
        assert_eq!(candidates[0].text, "What is federalism?");
        assert_eq!(candidates[1].number, QuestionNumber::Numeric(2));
        assert_eq!(candidates[1].text, "Explain separation of powers.");
        assert!(candidates.iter().all(|c| c.grammar == Grammar::NumericDot));
    }

    #[test]
    fn numeric_variants_are_recognized_at_line_start() {
        let text = "Q1. Discuss the role of the Governor in a parliamentary democracy.\n\
                    Question 2. Examine the working of the anti-defection law.\n\
                    3) Comment on the federal character of the Indian Constitution.";
        let candidates = segmenter().segment_numbered(text, ExamType::Mains);

        let numbers = candidates.iter().map(|c| c.number.clone()).collect::<Vec<_>>();
        assert_eq!(
            numbers,
            vec![
                QuestionNumber::Numeric(1),
                QuestionNumber::Numeric(2),
                QuestionNumber::Numeric(3)
            ]
        );
        assert!(candidates[1].text.starts_with("Examine the working"));
    }

    #[test]
    fn three_digit_labels_close_a_full_prelims_paper() {
        let text = "99. Which one of the following rivers originates in the Western Ghats of India?\n\
                    100. Which one of the following is the largest tiger reserve in India by area?";
        let candidates = segmenter().segment_numbered(text, ExamType::Prelims);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].number, QuestionNumber::Numeric(99));
        assert!(candidates[0].text.ends_with("Western Ghats of India?"));
        assert_eq!(candidates[1].number, QuestionNumber::Numeric(100));
        assert!(candidates[1].text.starts_with("Which one of the following is the largest"));
    }

    #[test]
    fn subtractive_roman_labels_split_questions() {
        let text = "iii. Evaluate the impact of GST on cooperative federalism.\n\
                    iv. Explain the concept of fiscal consolidation in India.\n\
                    ix. Examine the role of the Reserve Bank in managing inflation.";
        let candidates = segmenter().segment_numbered(text, ExamType::Optional);

        let labels = candidates.iter().map(|c| c.number.to_string()).collect::<Vec<_>>();
        assert_eq!(labels, vec!["iii", "iv", "ix"]);
        assert_eq!(candidates[0].text, "Evaluate the impact of GST on cooperative federalism.");
        assert_eq!(candidates[1].text, "Explain the concept of fiscal consolidation in India.");
    }

    #[test]
    fn decimals_and_years_are_not_labels() {
        let text = "1. Growth fell from 7.5 percent in 2019. 12 states reported deficits, discuss the causes.";
        let candidates = segmenter().segment_numbered(text, ExamType::Mains);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].text.contains("2019. 12 states"));
    }

    #[test]
    fn short_bodies_are_rejected_as_noise() {
        let text = "1. Too short.\n2. Discuss the role of civil society in strengthening democratic accountability in India today, with suitable examples from the last decade of reform, and examine how digital platforms have changed citizen engagement with the state.";
        let candidates = segmenter().segment_numbered(text, ExamType::Mains);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].number, QuestionNumber::Numeric(2));
        assert!(candidates[0].text.chars().count() > 150);
    }

    #[test]
    fn numeric_and_lettered_grammars_are_unioned() {
        let text = "1. Answer the following in about 150 words each:\n\
                    (a) Discuss the significance of the 73rd Amendment.\n\
                    (b) Examine the role of Gram Sabhas in local governance.";
        let candidates = segmenter().segment_numbered(text, ExamType::Mains);

        let lettered = candidates
            .iter()
            .filter(|c| c.grammar == Grammar::LetteredParen)
            .map(|c| c.number.to_string())
            .collect::<Vec<_>>();
        assert_eq!(lettered, vec!["(a)", "(b)"]);
        assert_eq!(candidates[0].grammar, Grammar::NumericDot);
    }

    #[test]
    fn lettered_grammar_is_skipped_for_objective_papers() {
        let text = "1. Which of the following is a fundamental duty?\n(a) To vote in elections (b) To pay taxes on time\n(c) To protect the environment (d) To own property";
        let candidates = segmenter().segment_numbered(text, ExamType::Prelims);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].grammar, Grammar::NumericDot);
        assert!(candidates[0].text.contains("(d) To own property"));
    }

    #[test]
    fn roman_labels_must_be_valid_numerals() {
        let text = "i. Evaluate the impact of GST on cooperative federalism.\n\
                    ii. Explain the concept of fiscal consolidation.\n\
                    vx. This is not a roman numbered question at all though.";
        let candidates = segmenter().segment_numbered(text, ExamType::Optional);

        let labels = candidates.iter().map(|c| c.number.to_string()).collect::<Vec<_>>();
        assert_eq!(labels, vec!["i", "ii"]);
        assert!(candidates[1].text.ends_with("vx. This is not a roman numbered question at all though."));
    }

    #[test]
    fn fallback_keeps_long_lines_with_question_verbs() {
        let text = "UNION PUBLIC SERVICE COMMISSION GENERAL STUDIES PAPER II\n\
                    Critically examine the role of the judiciary in protecting federalism.\n\
                    Time allowed three hours, maximum marks two hundred and fifty\n\
                    Discuss\n\
                    Elucidate the challenges in implementing one nation one election.";
        let candidates = segmenter().segment(text, ExamType::Mains);

        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.grammar == Grammar::Sequential));
        assert_eq!(candidates[0].number, QuestionNumber::Numeric(1));
        assert_eq!(candidates[1].number, QuestionNumber::Numeric(2));
        assert!(candidates[1].text.starts_with("Elucidate"));
    }

    #[test]
    fn fallback_is_not_used_when_numbering_is_found() {
        let text = "1. Discuss the role of the Election Commission in free and fair elections.";
        let candidates = segmenter().segment(text, ExamType::Mains);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].grammar, Grammar::NumericDot);
    }

    #[test]
    fn bodies_are_capped_on_char_boundaries() {
        let options = IngestionOptions {
            max_question_chars: 20,
            ..IngestionOptions::default()
        };
        let segmenter = Segmenter::new(&options).unwrap();
        let text = "1. Évaluez l'impact économique de la décentralisation fiscale.";
        let candidates = segmenter.segment_numbered(text, ExamType::Mains);

        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].text.chars().count() <= 20);
    }
}
