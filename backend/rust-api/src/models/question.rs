use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lessons in the bank are numbered 1..=5.
pub const MIN_LESSON: u8 = 1;
pub const MAX_LESSON: u8 = 5;

/// Difficulty tiers, strictly ordered. A learner only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    #[serde(alias = "nhan_biet")]
    Recognition,
    #[serde(alias = "thong_hieu")]
    Understanding,
    #[serde(alias = "van_dung")]
    Application,
}

impl Difficulty {
    pub const fn all() -> [Difficulty; 3] {
        [
            Difficulty::Recognition,
            Difficulty::Understanding,
            Difficulty::Application,
        ]
    }

    pub fn next(self) -> Option<Difficulty> {
        match self {
            Difficulty::Recognition => Some(Difficulty::Understanding),
            Difficulty::Understanding => Some(Difficulty::Application),
            Difficulty::Application => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Recognition => "recognition",
            Difficulty::Understanding => "understanding",
            Difficulty::Application => "application",
        }
    }

    /// Vietnamese label shown to learners.
    pub fn label_vi(self) -> &'static str {
        match self {
            Difficulty::Recognition => "Nhận biết",
            Difficulty::Understanding => "Thông hiểu",
            Difficulty::Application => "Vận dụng",
        }
    }

    pub fn parse(value: &str) -> Option<Difficulty> {
        match value.trim().to_lowercase().as_str() {
            "recognition" | "nhan_biet" | "nhận biết" => Some(Difficulty::Recognition),
            "understanding" | "thong_hieu" | "thông hiểu" => Some(Difficulty::Understanding),
            "application" | "van_dung" | "vận dụng" => Some(Difficulty::Application),
            _ => None,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated, immutable bank question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub lesson: u8,
    pub difficulty: Difficulty,
    pub text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: String,
    pub topic: String,
    pub subtopic: String,
}

impl Question {
    pub fn is_correct(&self, chosen: &str) -> bool {
        chosen.trim() == self.correct_answer.trim()
    }

    pub fn has_option(&self, chosen: &str) -> bool {
        self.options.iter().any(|option| option.trim() == chosen.trim())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MalformedQuestion {
    #[error("question id is missing")]
    MissingId,
    #[error("question {0}: text is empty")]
    EmptyText(String),
    #[error("question {0}: no answer options")]
    NoOptions(String),
    #[error("question {0}: options field is not a list")]
    InvalidOptions(String),
    #[error("question {0}: correct answer is not one of the options")]
    CorrectAnswerNotInOptions(String),
    #[error("question {id}: lesson {lesson} outside 1..=5")]
    LessonOutOfRange { id: String, lesson: i64 },
    #[error("question {id}: unknown difficulty {value:?}")]
    UnknownDifficulty { id: String, value: String },
    #[error("entry #{index}: {reason}")]
    Undecodable { index: usize, reason: String },
}

/// Bank entry as it arrives on the wire (JSON file, MongoDB document or the
/// question API). Options may be a list or a JSON-encoded string of a list.
/// MongoDB's `_id` is only used when the entry has no `id` of its own.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQuestion {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default, rename = "_id")]
    pub mongo_id: Option<serde_json::Value>,
    #[serde(default)]
    pub lesson: Option<i64>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default, alias = "text")]
    pub question: Option<String>,
    #[serde(default)]
    pub options: Option<serde_json::Value>,
    #[serde(default, alias = "correct_answer")]
    pub correct_answer: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub subtopic: Option<String>,
    #[serde(default)]
    pub supplementary: bool,
}

impl TryFrom<RawQuestion> for Question {
    type Error = MalformedQuestion;

    fn try_from(raw: RawQuestion) -> Result<Self, Self::Error> {
        let id = match raw.id.or(raw.mongo_id) {
            Some(serde_json::Value::String(value)) if !value.trim().is_empty() => value,
            Some(serde_json::Value::Number(value)) => value.to_string(),
            Some(serde_json::Value::Object(map)) => map
                .get("$oid")
                .and_then(|v| v.as_str())
                .map(|v| v.to_string())
                .ok_or(MalformedQuestion::MissingId)?,
            _ => return Err(MalformedQuestion::MissingId),
        };

        let text = raw
            .question
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MalformedQuestion::EmptyText(id.clone()))?;

        let options = parse_options(&id, raw.options)?;
        if options.is_empty() {
            return Err(MalformedQuestion::NoOptions(id));
        }

        let correct_answer = raw
            .correct_answer
            .map(|a| a.trim().to_string())
            .filter(|a| options.iter().any(|o| o == a))
            .ok_or_else(|| MalformedQuestion::CorrectAnswerNotInOptions(id.clone()))?;

        let lesson = raw.lesson.unwrap_or(0);
        if !(i64::from(MIN_LESSON)..=i64::from(MAX_LESSON)).contains(&lesson) {
            return Err(MalformedQuestion::LessonOutOfRange { id, lesson });
        }

        let difficulty_raw = raw.difficulty.unwrap_or_default();
        let difficulty = Difficulty::parse(&difficulty_raw).ok_or_else(|| {
            MalformedQuestion::UnknownDifficulty {
                id: id.clone(),
                value: difficulty_raw.clone(),
            }
        })?;

        Ok(Question {
            id,
            lesson: lesson as u8,
            difficulty,
            text,
            options,
            correct_answer,
            explanation: raw.explanation.unwrap_or_default(),
            topic: raw.topic.unwrap_or_default(),
            subtopic: raw.subtopic.unwrap_or_default(),
        })
    }
}

fn parse_options(
    id: &str,
    options: Option<serde_json::Value>,
) -> Result<Vec<String>, MalformedQuestion> {
    let list = match options {
        None | Some(serde_json::Value::Null) => return Err(MalformedQuestion::NoOptions(id.into())),
        Some(serde_json::Value::Array(items)) => items,
        Some(serde_json::Value::String(encoded)) => {
            serde_json::from_str::<Vec<serde_json::Value>>(&encoded)
                .map_err(|_| MalformedQuestion::InvalidOptions(id.into()))?
        }
        Some(_) => return Err(MalformedQuestion::InvalidOptions(id.into())),
    };

    list.into_iter()
        .map(|item| match item {
            serde_json::Value::String(s) => Ok(s.trim().to_string()),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            _ => Err(MalformedQuestion::InvalidOptions(id.into())),
        })
        .filter(|item| !matches!(item, Ok(s) if s.is_empty()))
        .collect()
}

/// What a learner sees while answering: no correct answer, no explanation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: String,
    pub lesson: u8,
    pub difficulty: Difficulty,
    pub question: String,
    pub options: Vec<String>,
    pub topic: String,
    pub subtopic: String,
}

impl From<&Question> for QuestionView {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            lesson: q.lesson,
            difficulty: q.difficulty,
            question: q.text.clone(),
            options: q.options.clone(),
            topic: q.topic.clone(),
            subtopic: q.subtopic.clone(),
        }
    }
}

/// Shape returned by `GET /api/questions/math`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MathQuestion {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: String,
    pub topic: String,
    pub difficulty: Difficulty,
}

impl From<&Question> for MathQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            question: q.text.clone(),
            options: q.options.clone(),
            correct_answer: q.correct_answer.clone(),
            explanation: q.explanation.clone(),
            topic: q.topic.clone(),
            difficulty: q.difficulty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawQuestion {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn difficulty_order_and_next() {
        assert!(Difficulty::Recognition < Difficulty::Understanding);
        assert!(Difficulty::Understanding < Difficulty::Application);
        assert_eq!(Difficulty::Recognition.next(), Some(Difficulty::Understanding));
        assert_eq!(Difficulty::Application.next(), None);
    }

    #[test]
    fn difficulty_accepts_vietnamese_aliases() {
        let d: Difficulty = serde_json::from_value(json!("thong_hieu")).unwrap();
        assert_eq!(d, Difficulty::Understanding);
        assert_eq!(Difficulty::parse("Vận dụng"), Some(Difficulty::Application));
    }

    #[test]
    fn options_may_be_json_encoded_string() {
        let q = Question::try_from(raw(json!({
            "id": 7,
            "lesson": 2,
            "difficulty": "recognition",
            "question": "2 + 3 = ?",
            "options": "[\"4\", \"5\", \"6\"]",
            "correctAnswer": "5",
            "topic": "Phép cộng"
        })))
        .unwrap();

        assert_eq!(q.id, "7");
        assert_eq!(q.options, vec!["4", "5", "6"]);
        assert!(q.is_correct(" 5 "));
        assert!(!q.is_correct("4"));
    }

    #[test]
    fn correct_answer_must_be_an_option() {
        let err = Question::try_from(raw(json!({
            "id": "q1",
            "lesson": 1,
            "difficulty": "recognition",
            "question": "1 + 1 = ?",
            "options": ["1", "3"],
            "correctAnswer": "2"
        })))
        .unwrap_err();
        assert_eq!(err, MalformedQuestion::CorrectAnswerNotInOptions("q1".into()));
    }

    #[test]
    fn missing_options_is_rejected() {
        let err = Question::try_from(raw(json!({
            "id": "q2",
            "lesson": 1,
            "difficulty": "recognition",
            "question": "1 + 1 = ?",
            "correctAnswer": "2"
        })))
        .unwrap_err();
        assert_eq!(err, MalformedQuestion::NoOptions("q2".into()));
    }

    #[test]
    fn own_id_wins_over_mongo_id() {
        let q = Question::try_from(raw(json!({
            "_id": {"$oid": "65f0aa"},
            "id": "q1",
            "lesson": 1,
            "difficulty": "recognition",
            "question": "1 + 1 = ?",
            "options": ["1", "2"],
            "correctAnswer": "2"
        })))
        .unwrap();
        assert_eq!(q.id, "q1");
    }

    #[test]
    fn lesson_out_of_range_is_rejected() {
        let err = Question::try_from(raw(json!({
            "id": "q3",
            "lesson": 9,
            "difficulty": "application",
            "question": "?",
            "options": ["a"],
            "correctAnswer": "a"
        })))
        .unwrap_err();
        assert!(matches!(err, MalformedQuestion::LessonOutOfRange { lesson: 9, .. }));
    }
}
