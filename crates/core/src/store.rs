use crate::error::StoreError;
use crate::models::{ExamType, FailedDocument, QuestionRecord};
use fs4::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub const DEFAULT_FAILED_LIST_NAME: &str = "failed_pdfs.txt";

/// Durable home of the question corpus and the failed-document list.
#[derive(Debug, Clone)]
pub struct CorpusStore {
    corpus_path: PathBuf,
    failed_path: PathBuf,
}

/// Exclusive run-level lock on the corpus. Released on drop.
#[derive(Debug)]
pub struct CorpusLock {
    file: File,
    path: PathBuf,
}

impl Drop for CorpusLock {
    fn drop(&mut self) {
        if let Err(error) = FileExt::unlock(&self.file) {
            debug!(path = %self.path.display(), %error, "failed to release corpus lock");
        }
    }
}

impl CorpusStore {
    pub fn new(corpus_path: impl Into<PathBuf>, failed_path: impl Into<PathBuf>) -> Self {
        Self {
            corpus_path: corpus_path.into(),
            failed_path: failed_path.into(),
        }
    }

    /// Failed list next to the corpus file.
    pub fn at(corpus_path: impl Into<PathBuf>) -> Self {
        let corpus_path = corpus_path.into();
        let failed_path = corpus_path
            .parent()
            .map(|parent| parent.join(DEFAULT_FAILED_LIST_NAME))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FAILED_LIST_NAME));
        Self::new(corpus_path, failed_path)
    }

    pub fn corpus_path(&self) -> &Path {
        &self.corpus_path
    }

    pub fn failed_path(&self) -> &Path {
        &self.failed_path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .corpus_path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.corpus_path.with_file_name(name)
    }

    /// Fails fast with [`StoreError::Locked`] if another run holds the lock.
    pub fn lock(&self) -> Result<CorpusLock, StoreError> {
        let path = self.lock_path();
        ensure_parent(&path)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|error| StoreError::io(&path, error))?;

        file.try_lock_exclusive()
            .map_err(|_| StoreError::Locked(path.clone()))?;

        Ok(CorpusLock { file, path })
    }

    /// Whole corpus in memory. A missing file is an empty corpus.
    pub fn load(&self) -> Result<Vec<QuestionRecord>, StoreError> {
        let file = match File::open(&self.corpus_path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(StoreError::io(&self.corpus_path, error)),
        };

        serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Corrupt {
            path: self.corpus_path.clone(),
            source,
        })
    }

    /// Write to a sibling temp file, fsync, then rename over the corpus.
    /// Readers see either the old file or the new one.
    pub fn write_corpus(&self, _lock: &CorpusLock, records: &[QuestionRecord]) -> Result<(), StoreError> {
        let mut bytes = serde_json::to_vec_pretty(records)?;
        bytes.push(b'\n');
        write_atomically(&self.corpus_path, &bytes)?;
        info!(path = %self.corpus_path.display(), records = records.len(), "corpus published");
        Ok(())
    }

    pub fn load_failed(&self) -> Result<Vec<PathBuf>, StoreError> {
        match fs::read_to_string(&self.failed_path) {
            Ok(contents) => Ok(contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(PathBuf::from)
                .collect()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(error) => Err(StoreError::io(&self.failed_path, error)),
        }
    }

    /// One path per line. An empty list truncates the file.
    pub fn write_failed(&self, _lock: &CorpusLock, failed: &[FailedDocument]) -> Result<(), StoreError> {
        let mut contents = failed
            .iter()
            .map(|document| document.path.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }
        write_atomically(&self.failed_path, contents.as_bytes())
    }
}

/// Corpus breakdown for operators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusStats {
    pub total: usize,
    pub by_year: BTreeMap<i32, usize>,
    pub by_exam_type: BTreeMap<ExamType, usize>,
    pub by_paper_type: BTreeMap<String, usize>,
    /// Records with exactly four options.
    pub objective: usize,
}

impl CorpusStats {
    pub fn from_records(records: &[QuestionRecord]) -> Self {
        let mut stats = Self {
            total: records.len(),
            ..Self::default()
        };
        for record in records {
            *stats.by_year.entry(record.year).or_default() += 1;
            *stats.by_exam_type.entry(record.exam_type).or_default() += 1;
            *stats
                .by_paper_type
                .entry(record.paper_type.clone())
                .or_default() += 1;
            if record.is_objective() {
                stats.objective += 1;
            }
        }
        stats
    }
}

fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|error| StoreError::io(parent, error))
        }
        _ => Ok(()),
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut temp = NamedTempFile::new_in(&directory).map_err(|error| StoreError::io(&directory, error))?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        writer
            .write_all(bytes)
            .and_then(|_| writer.flush())
            .map_err(|error| StoreError::io(path, error))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|error| StoreError::io(path, error))?;

    temp.persist(path).map_err(|error| StoreError::Publish {
        path: path.to_path_buf(),
        source: error.error,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Difficulty, Grammar, QuestionNumber, SourceTag};
    use tempfile::tempdir;

    fn sample(number: u32) -> QuestionRecord {
        QuestionRecord {
            year: 2024,
            exam_type: ExamType::Mains,
            paper_type: "gs1".to_string(),
            question_number: QuestionNumber::Numeric(number),
            numbering: Some(Grammar::NumericDot),
            question_text: format!("Discuss the legacy of the Bhakti movement, part {number}."),
            options: None,
            marks: 10,
            difficulty: Difficulty::Medium,
            source_tag: SourceTag::Primary,
        }
    }

    #[test]
    fn missing_corpus_loads_empty() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = CorpusStore::at(dir.path().join("processed_pyq.json"));
        assert!(store.load()?.is_empty());
        assert!(store.load_failed()?.is_empty());
        Ok(())
    }

    #[test]
    fn corpus_round_trips_through_atomic_write() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = CorpusStore::at(dir.path().join("nested").join("processed_pyq.json"));
        let lock = store.lock()?;

        store.write_corpus(&lock, &[sample(1), sample(2)])?;
        let loaded = store.load()?;

        assert_eq!(loaded, vec![sample(1), sample(2)]);
        let leftovers = fs::read_dir(dir.path().join("nested"))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
        Ok(())
    }

    #[test]
    fn second_lock_is_refused_until_first_is_dropped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = CorpusStore::at(dir.path().join("processed_pyq.json"));

        let first = store.lock()?;
        assert!(matches!(store.lock(), Err(StoreError::Locked(_))));
        drop(first);
        assert!(store.lock().is_ok());
        Ok(())
    }

    #[test]
    fn corrupt_corpus_is_reported_not_replaced() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("processed_pyq.json");
        fs::write(&path, b"[{\"year\": 2020,")?;
        let store = CorpusStore::at(&path);

        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));
        assert_eq!(fs::read(&path)?, b"[{\"year\": 2020,");
        Ok(())
    }

    #[test]
    fn stats_count_years_exams_and_objective_subset() {
        let mut objective = sample(3);
        objective.exam_type = ExamType::Prelims;
        objective.paper_type = "gs".to_string();
        objective.options = Some(vec!["A".into(), "B".into(), "C".into(), "D".into()]);
        let mut older = sample(4);
        older.year = 2019;

        let stats = CorpusStats::from_records(&[sample(1), objective, older]);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_year.get(&2024), Some(&2));
        assert_eq!(stats.by_year.get(&2019), Some(&1));
        assert_eq!(stats.by_exam_type.get(&ExamType::Mains), Some(&2));
        assert_eq!(stats.by_paper_type.get("gs"), Some(&1));
        assert_eq!(stats.objective, 1);
    }

    #[test]
    fn failed_list_is_one_path_per_line() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = CorpusStore::at(dir.path().join("processed_pyq.json"));
        let lock = store.lock()?;
        let failed = vec![
            FailedDocument {
                path: PathBuf::from("pyq/mains/gs1/scan_2015.pdf"),
                reason: "ocr: no page produced text".to_string(),
            },
            FailedDocument {
                path: PathBuf::from("pyq/prelims/csat/csat_2016.pdf"),
                reason: "primary: broken xref".to_string(),
            },
        ];

        store.write_failed(&lock, &failed)?;
        assert_eq!(
            fs::read_to_string(store.failed_path())?,
            "pyq/mains/gs1/scan_2015.pdf\npyq/prelims/csat/csat_2016.pdf\n"
        );
        assert_eq!(store.load_failed()?.len(), 2);

        store.write_failed(&lock, &[])?;
        assert!(store.load_failed()?.is_empty());
        Ok(())
    }
}
