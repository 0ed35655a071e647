use std::collections::HashMap;
use std::path::Path;

use crate::models::SupportContent;

use super::bank::BankError;

const DEFAULT_THEORY: &str =
    "Hãy đọc lại phần lý thuyết của bài học này và ghi chú những công thức quan trọng.";
const DEFAULT_EXAMPLE: &str =
    "Thử giải lại từng bước một ví dụ tương tự trong sách giáo khoa trước khi làm tiếp.";

/// Read-only topic -> theory/example table used while a learner is in AI support.
#[derive(Debug, Clone)]
pub struct SupportCatalog {
    entries: HashMap<String, SupportContent>,
    fallback: SupportContent,
}

impl Default for SupportCatalog {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl SupportCatalog {
    pub fn new(entries: HashMap<String, SupportContent>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(topic, content)| (normalize(&topic), content))
                .collect(),
            fallback: SupportContent {
                theory: DEFAULT_THEORY.to_string(),
                example: DEFAULT_EXAMPLE.to_string(),
            },
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, BankError> {
        let entries: HashMap<String, SupportContent> = serde_json::from_str(json)?;
        Ok(Self::new(entries))
    }

    /// Missing file means an empty catalog; every topic then gets the
    /// generic content.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, BankError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(json) => Self::from_json_str(&json),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    "Support content file {} not found, using generic content",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(source) => Err(BankError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn lookup(&self, topic: &str) -> SupportContent {
        self.entries
            .get(&normalize(topic))
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize(topic: &str) -> String {
    topic.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_with_generic_fallback() {
        let catalog = SupportCatalog::from_json_str(
            r#"{"Phân số": {"theory": "Phân số a/b ...", "example": "1/2 + 1/3 = 5/6"}}"#,
        )
        .unwrap();

        assert_eq!(catalog.lookup(" phân số ").example, "1/2 + 1/3 = 5/6");
        assert_eq!(catalog.lookup("Hình học").theory, DEFAULT_THEORY);
    }
}
