//! Exact stable-key dedup, fuzzy cross-source dedup and append-merge.
//!
//! The stable key is deliberately coarse: `(year, examType, paperType,
//! questionNumber, first 120 chars of questionText)`. Two records that agree
//! on all of that are the same question even if their text differs later on.

use crate::enricher::similarity_key;
use crate::models::{ExamType, QuestionRecord};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StableKey {
    pub year: i32,
    pub exam_type: ExamType,
    pub paper_type: String,
    pub question_number: String,
    pub text_prefix: String,
}

impl StableKey {
    pub fn of(record: &QuestionRecord, prefix_chars: usize) -> Self {
        Self {
            year: record.year,
            exam_type: record.exam_type,
            paper_type: record.paper_type.clone(),
            question_number: record.question_number.to_string(),
            text_prefix: record.question_text.chars().take(prefix_chars).collect(),
        }
    }

    /// Hex SHA-256 over the key fields; used as a document id downstream.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.year.to_le_bytes());
        hasher.update(self.exam_type.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(self.paper_type.as_bytes());
        hasher.update([0]);
        hasher.update(self.question_number.as_bytes());
        hasher.update([0]);
        hasher.update(self.text_prefix.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Accumulated stable keys. Single writer: only the merge step inserts.
#[derive(Debug, Default)]
pub struct KeySet {
    keys: HashSet<StableKey>,
    prefix_chars: usize,
}

impl KeySet {
    pub fn new(prefix_chars: usize) -> Self {
        Self {
            keys: HashSet::new(),
            prefix_chars,
        }
    }

    /// Returns `false` if the record's key was already present.
    pub fn insert(&mut self, record: &QuestionRecord) -> bool {
        self.keys.insert(StableKey::of(record, self.prefix_chars))
    }
}

/// Normalized Levenshtein similarity in `[0, 1]`.
pub fn similarity(left: &str, right: &str) -> f64 {
    strsim::normalized_levenshtein(left, right)
}

/// Drops records whose lower-cased text is more than `threshold` similar to
/// an already kept record of the same `(year, examType, paperType)`.
/// Quadratic within a group, so callers pass one run's new records only.
pub fn fuzzy_dedup(records: Vec<QuestionRecord>, threshold: f64) -> (Vec<QuestionRecord>, usize) {
    let mut seen: HashMap<(i32, ExamType, String), Vec<String>> = HashMap::new();
    let mut kept = Vec::with_capacity(records.len());
    let mut rejected = 0usize;

    for record in records {
        let group = seen
            .entry((record.year, record.exam_type, record.paper_type.clone()))
            .or_default();
        let key = similarity_key(&record.question_text);

        let duplicate_of = group
            .iter()
            .map(|accepted| similarity(&key, accepted))
            .find(|score| *score > threshold);

        match duplicate_of {
            Some(score) => {
                debug!(
                    year = record.year,
                    paper_type = %record.paper_type,
                    question_number = %record.question_number,
                    score,
                    "near-duplicate question dropped"
                );
                rejected += 1;
            }
            None => {
                group.push(key);
                kept.push(record);
            }
        }
    }

    (kept, rejected)
}

/// Year descending, then question number descending. Stable, so ties keep
/// existing-before-new order.
pub fn sort_corpus(records: &mut [QuestionRecord]) {
    records.sort_by(|left, right| {
        right
            .year
            .cmp(&left.year)
            .then_with(|| right.question_number.cmp(&left.question_number))
    });
}

#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Existing corpus plus accepted records, sorted.
    pub corpus: Vec<QuestionRecord>,
    /// Newly accepted records only.
    pub accepted: Vec<QuestionRecord>,
    pub exact_duplicates: usize,
    pub fuzzy_duplicates: usize,
    /// Records in the persisted corpus that already shared a key.
    pub existing_duplicates: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct MergeEngine {
    prefix_chars: usize,
    fuzzy_threshold: f64,
}

impl MergeEngine {
    pub fn new(prefix_chars: usize, fuzzy_threshold: f64) -> Self {
        Self {
            prefix_chars,
            fuzzy_threshold,
        }
    }

    /// Append-merge: nothing in `existing` is ever dropped except a record
    /// whose stable key repeats an earlier one.
    pub fn merge(&self, existing: Vec<QuestionRecord>, incoming: Vec<QuestionRecord>) -> MergeOutcome {
        let mut keys = KeySet::new(self.prefix_chars);
        let mut corpus = Vec::with_capacity(existing.len() + incoming.len());
        let mut existing_duplicates = 0usize;

        for record in existing {
            if keys.insert(&record) {
                corpus.push(record);
            } else {
                existing_duplicates += 1;
            }
        }
        if existing_duplicates > 0 {
            warn!(existing_duplicates, "persisted corpus contained repeated stable keys");
        }

        let mut exact_duplicates = 0usize;
        let mut unique = Vec::new();
        for record in incoming {
            if keys.insert(&record) {
                unique.push(record);
            } else {
                exact_duplicates += 1;
            }
        }

        let (accepted, fuzzy_duplicates) = fuzzy_dedup(unique, self.fuzzy_threshold);
        corpus.extend(accepted.iter().cloned());
        sort_corpus(&mut corpus);

        MergeOutcome {
            corpus,
            accepted,
            exact_duplicates,
            fuzzy_duplicates,
            existing_duplicates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Difficulty, Grammar, QuestionNumber, SourceTag};

    fn record(year: i32, number: u32, text: &str) -> QuestionRecord {
        QuestionRecord {
            year,
            exam_type: ExamType::Mains,
            paper_type: "gs2".to_string(),
            question_number: QuestionNumber::Numeric(number),
            numbering: Some(Grammar::NumericDot),
            question_text: text.to_string(),
            options: None,
            marks: 10,
            difficulty: Difficulty::Medium,
            source_tag: SourceTag::Primary,
        }
    }

    fn alphabet_text(len: usize) -> String {
        (0..len).map(|index| (b'a' + (index % 26) as u8) as char).collect()
    }

    fn with_substitutions(base: &str, count: usize) -> String {
        base.chars()
            .enumerate()
            .map(|(index, character)| if index < count { '#' } else { character })
            .collect()
    }

    #[test]
    fn stable_key_ignores_text_beyond_prefix() {
        let shared = "x".repeat(120);
        let first = record(2023, 5, &format!("{shared} ends one way"));
        let second = record(2023, 5, &format!("{shared} ends a completely different way"));

        let outcome = MergeEngine::new(120, 0.85).merge(vec![first], vec![second]);

        assert_eq!(outcome.exact_duplicates, 1);
        assert_eq!(outcome.corpus.len(), 1);
    }

    #[test]
    fn same_number_with_different_opening_text_is_kept() {
        let first = record(2023, 5, "Discuss the role of the Inter-State Council in resolving disputes.");
        let second = record(2023, 5, "Examine the constitutional position of the Attorney General of India.");

        let outcome = MergeEngine::new(120, 0.85).merge(vec![first], vec![second]);

        assert_eq!(outcome.exact_duplicates, 0);
        assert_eq!(outcome.corpus.len(), 2);
    }

    #[test]
    fn fuzzy_threshold_is_strict_at_the_boundary() {
        let base = alphabet_text(100);
        let close = with_substitutions(&base, 14);
        let far = with_substitutions(&base, 16);

        assert!((similarity(&base, &close) - 0.86).abs() < 1e-9);
        assert!((similarity(&base, &far) - 0.84).abs() < 1e-9);

        let (kept, rejected) = fuzzy_dedup(vec![record(2022, 1, &base), record(2022, 7, &close)], 0.85);
        assert_eq!((kept.len(), rejected), (1, 1));

        let (kept, rejected) = fuzzy_dedup(vec![record(2022, 1, &base), record(2022, 7, &far)], 0.85);
        assert_eq!((kept.len(), rejected), (2, 0));
    }

    #[test]
    fn fuzzy_comparison_ignores_case() {
        let text = "Discuss the significance of the Seventy-Third Amendment for rural local governance.";
        let shouted = text.to_uppercase();
        let (kept, rejected) = fuzzy_dedup(vec![record(2020, 3, text), record(2020, 9, &shouted)], 0.85);
        assert_eq!(kept.len(), 1);
        assert_eq!(rejected, 1);
    }

    #[test]
    fn fuzzy_dedup_is_scoped_to_year_and_paper() {
        let text = "Discuss the significance of the Seventy-Third Amendment for rural local governance.";
        let (kept, rejected) = fuzzy_dedup(vec![record(2020, 3, text), record(2021, 3, text)], 0.85);
        assert_eq!(kept.len(), 2);
        assert_eq!(rejected, 0);
    }

    #[test]
    fn merge_is_append_only_and_sorted() {
        let existing = vec![
            record(2021, 2, "Explain the doctrine of pith and substance with examples."),
            record(2022, 1, "Discuss the powers of the Comptroller and Auditor General."),
        ];
        let incoming = vec![
            record(2023, 4, "Examine the significance of the Finance Commission awards."),
            record(2022, 9, "Critically evaluate the collegium system of appointments."),
        ];

        let outcome = MergeEngine::new(120, 0.85).merge(existing.clone(), incoming);

        for old in &existing {
            assert!(outcome.corpus.contains(old));
        }
        let order = outcome
            .corpus
            .iter()
            .map(|record| (record.year, record.question_number.to_string()))
            .collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![
                (2023, "4".to_string()),
                (2022, "9".to_string()),
                (2022, "1".to_string()),
                (2021, "2".to_string()),
            ]
        );
        assert_eq!(outcome.accepted.len(), 2);
    }

    #[test]
    fn repeated_keys_in_persisted_corpus_are_collapsed() {
        let duplicate = record(2019, 3, "Discuss the evolution of the Panchayati Raj institutions.");
        let outcome = MergeEngine::new(120, 0.85).merge(vec![duplicate.clone(), duplicate], Vec::new());
        assert_eq!(outcome.corpus.len(), 1);
        assert_eq!(outcome.existing_duplicates, 1);
    }

    #[test]
    fn key_digest_is_stable_and_distinct() {
        let first = StableKey::of(&record(2023, 1, "Discuss federalism in India."), 120);
        let second = StableKey::of(&record(2023, 2, "Discuss federalism in India."), 120);
        assert_eq!(first.digest(), first.clone().digest());
        assert_ne!(first.digest(), second.digest());
        assert_eq!(first.digest().len(), 64);
    }
}
