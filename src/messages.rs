//! Localized user-facing message tables
//!
//! Loaded from a JSON document mapping language codes to message tables.
//! Lookups for unknown or absent languages fall back to the configured
//! default language, which is guaranteed to exist at construction time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading message tables
#[derive(Error, Debug)]
pub enum MessagesError {
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Error during JSON deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// No table exists for the configured default language
    #[error("no message table for default language: {0}")]
    MissingDefault(String),
}

/// Messages for one language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LangMessages {
    /// Template for user-visible errors; `{error}` is replaced with the cause
    pub response_error: String,
}

impl LangMessages {
    /// Format the error template with the given cause
    ///
    /// Literal `\n` sequences in the template become newlines.
    #[must_use]
    pub fn format_error(&self, error: &str) -> String {
        self.response_error
            .replace("{error}", error)
            .replace("\\n", "\n")
    }
}

/// Language-keyed message tables with default-language fallback
#[derive(Debug, Clone)]
pub struct Messages {
    tables: HashMap<String, LangMessages>,
    default: LangMessages,
}

impl Messages {
    /// Build a message set, verifying the default language has a table
    ///
    /// # Errors
    ///
    /// Returns [`MessagesError::MissingDefault`] when no table exists for the
    /// default language.
    pub fn new(
        tables: HashMap<String, LangMessages>,
        default_lang: &str,
    ) -> Result<Self, MessagesError> {
        let default = tables
            .get(default_lang)
            .cloned()
            .ok_or_else(|| MessagesError::MissingDefault(default_lang.to_string()))?;
        Ok(Self { tables, default })
    }

    /// Load message tables from a JSON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// lacks a table for the default language.
    pub fn from_file(path: impl AsRef<Path>, default_lang: &str) -> Result<Self, MessagesError> {
        let bytes = std::fs::read(path)?;
        let tables = serde_json::from_slice(&bytes)?;
        Self::new(tables, default_lang)
    }

    /// Table for the given language
    ///
    /// Unknown languages and `None` resolve to the default table.
    #[must_use]
    pub fn for_lang(&self, lang: Option<&str>) -> &LangMessages {
        lang.and_then(|lang| self.tables.get(lang))
            .unwrap_or(&self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Messages {
        let tables = HashMap::from([
            (
                "en".to_string(),
                LangMessages {
                    response_error: "Error: {error}".to_string(),
                },
            ),
            (
                "ru".to_string(),
                LangMessages {
                    response_error: "Ошибка: {error}".to_string(),
                },
            ),
        ]);
        Messages::new(tables, "en").expect("Should build messages")
    }

    #[test]
    fn looks_up_known_language() {
        let messages = sample();
        assert_eq!(
            messages.for_lang(Some("ru")).format_error("boom"),
            "Ошибка: boom"
        );
    }

    #[test]
    fn falls_back_to_default_language() {
        let messages = sample();
        assert_eq!(
            messages.for_lang(Some("fr")).format_error("boom"),
            "Error: boom"
        );
        assert_eq!(messages.for_lang(None).format_error("boom"), "Error: boom");
    }

    #[test]
    fn missing_default_language_is_an_error() {
        let result = Messages::new(HashMap::new(), "en");
        assert!(matches!(result, Err(MessagesError::MissingDefault(_))));
    }

    #[test]
    fn template_unescapes_newlines() {
        let table = LangMessages {
            response_error: "Something broke:\\n{error}".to_string(),
        };
        assert_eq!(table.format_error("boom"), "Something broke:\nboom");
    }

    #[test]
    fn loads_tables_from_json_file() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("messages.json");
        std::fs::write(&path, r#"{"en": {"response_error": "Error: {error}"}}"#)
            .expect("Should write fixture");

        let messages = Messages::from_file(&path, "en").expect("Should load messages");

        assert_eq!(messages.for_lang(None).format_error("x"), "Error: x");
    }
}
