use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::{question::MalformedQuestion, Difficulty, Question, RawQuestion};

#[derive(Debug, Error)]
pub enum BankError {
    #[error("failed to read question bank {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("question bank is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("question bank contains no usable questions")]
    Empty,
}

// Entries stay untyped here so one badly typed entry cannot sink the file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BankFile {
    Plain(Vec<serde_json::Value>),
    Sections {
        questions: Vec<serde_json::Value>,
        #[serde(default)]
        supplementary: Vec<serde_json::Value>,
    },
}

/// Immutable question bank: a primary pool and an optional remediation pool.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    primary: Vec<Question>,
    supplementary: Vec<Question>,
    rejected: Vec<MalformedQuestion>,
}

impl QuestionBank {
    pub fn new(primary: Vec<Question>, supplementary: Vec<Question>) -> Self {
        Self {
            primary,
            supplementary,
            rejected: Vec::new(),
        }
    }

    /// Builds a bank from untyped entries (file array or MongoDB documents),
    /// dropping malformed ones. Entries flagged `supplementary` go to the
    /// remediation pool.
    pub fn from_values(entries: Vec<serde_json::Value>) -> Self {
        let mut rejected = Vec::new();
        let (supplementary, primary): (Vec<_>, Vec<_>) = decode_all(entries, &mut rejected)
            .into_iter()
            .partition(|raw| raw.supplementary);
        Self::validate(primary, supplementary, rejected)
    }

    fn from_sections(
        primary: Vec<serde_json::Value>,
        supplementary: Vec<serde_json::Value>,
    ) -> Self {
        let mut rejected = Vec::new();
        let primary = decode_all(primary, &mut rejected);
        let supplementary = decode_all(supplementary, &mut rejected);
        Self::validate(primary, supplementary, rejected)
    }

    fn validate(
        primary: Vec<RawQuestion>,
        supplementary: Vec<RawQuestion>,
        mut rejected: Vec<MalformedQuestion>,
    ) -> Self {
        let mut validate = |raws: Vec<RawQuestion>| -> Vec<Question> {
            raws.into_iter()
                .filter_map(|raw| match Question::try_from(raw) {
                    Ok(question) => Some(question),
                    Err(err) => {
                        tracing::warn!("Skipping malformed bank entry: {}", err);
                        rejected.push(err);
                        None
                    }
                })
                .collect()
        };

        let primary = validate(primary);
        let supplementary = validate(supplementary);

        Self {
            primary,
            supplementary,
            rejected,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, BankError> {
        let bank = match serde_json::from_str::<BankFile>(json)? {
            BankFile::Plain(entries) => Self::from_values(entries),
            BankFile::Sections {
                questions,
                supplementary,
            } => Self::from_sections(questions, supplementary),
        };

        if bank.primary.is_empty() {
            return Err(BankError::Empty);
        }
        Ok(bank)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, BankError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| BankError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn primary(&self) -> &[Question] {
        &self.primary
    }

    /// Pool used for remediation: the dedicated supplementary section when the
    /// bank has one, otherwise the primary pool.
    pub fn supplementary_pool(&self) -> &[Question] {
        if self.supplementary.is_empty() {
            &self.primary
        } else {
            &self.supplementary
        }
    }

    pub fn has_supplementary_section(&self) -> bool {
        !self.supplementary.is_empty()
    }

    pub fn rejected(&self) -> &[MalformedQuestion] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.primary.len() + self.supplementary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.supplementary.is_empty()
    }

    pub fn count_for(&self, difficulty: Difficulty) -> usize {
        self.primary
            .iter()
            .filter(|q| q.difficulty == difficulty)
            .count()
    }

    /// Primary questions for a topic (case-insensitive); all of them when
    /// `topic` is `None`.
    pub fn by_topic(&self, topic: Option<&str>) -> Vec<&Question> {
        match topic.map(str::trim).filter(|t| !t.is_empty()) {
            Some(topic) => {
                let wanted = topic.to_lowercase();
                self.primary
                    .iter()
                    .filter(|q| q.topic.to_lowercase() == wanted)
                    .collect()
            }
            None => self.primary.iter().collect(),
        }
    }
}

fn decode_all(
    entries: Vec<serde_json::Value>,
    rejected: &mut Vec<MalformedQuestion>,
) -> Vec<RawQuestion> {
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value::<RawQuestion>(entry) {
            Ok(raw) => Some(raw),
            Err(e) => {
                let err = MalformedQuestion::Undecodable {
                    index,
                    reason: e.to_string(),
                };
                tracing::warn!("Skipping malformed bank entry: {}", err);
                rejected.push(err);
                None
            }
        })
        .collect()
}
