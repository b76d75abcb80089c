//! Document properties

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Descriptive document properties carried by most formats
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

impl DocumentMetadata {
    pub fn is_empty(&self) -> bool {
        self == &DocumentMetadata::default()
    }

    /// Keywords joined the way most formats store them
    pub fn keywords_joined(&self) -> String {
        self.keywords.join(", ")
    }

    /// Split a keyword list on commas or semicolons
    pub fn parse_keywords(raw: &str) -> Vec<String> {
        raw.split([',', ';'])
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .collect()
    }

    /// Stamp creation (if unset) and modification time.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if self.created.is_none() {
            self.created = Some(now);
        }
        self.modified = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keywords() {
        assert_eq!(
            DocumentMetadata::parse_keywords("rust; docs , ,model"),
            vec!["rust", "docs", "model"]
        );
    }

    #[test]
    fn test_touch_keeps_creation_time() {
        let mut meta = DocumentMetadata::default();
        let t1 = Utc::now();
        meta.touch(t1);
        let t2 = t1 + chrono::Duration::seconds(5);
        meta.touch(t2);
        assert_eq!(meta.created, Some(t1));
        assert_eq!(meta.modified, Some(t2));
    }
}
