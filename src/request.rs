//! Dispatcher-facing request contract
//!
//! A [`ChatRequest`] is built by the surrounding dispatcher, handed to the
//! module for one processing pass, and returned with the response fields
//! filled in. The requester's [`UserRecord`] is a schemaless JSON object
//! owned by the user-record collaborator; the module reads and rewrites
//! exactly one field of it, the per-module session identifier.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schemaless user record owned by the user-record store
///
/// Only two fields are meaningful here: `lang` and the session identifier
/// stored under `<module-key>_conversation_id`. Everything else passes
/// through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserRecord {
    fields: Map<String, Value>,
}

impl UserRecord {
    /// Create an empty record
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Language code of the user, if present and textual
    #[must_use]
    pub fn lang(&self) -> Option<&str> {
        self.fields.get("lang").and_then(Value::as_str)
    }

    /// Session identifier stored for the given module key, if any
    ///
    /// An explicit JSON `null` reads the same as an absent field.
    #[must_use]
    pub fn conversation_id(&self, module_key: &str) -> Option<String> {
        self.fields
            .get(&format!("{module_key}_conversation_id"))
            .and_then(Value::as_str)
            .map(ToString::to_string)
    }

    /// Store (or null out) the session identifier for the given module key
    pub fn set_conversation_id(&mut self, module_key: &str, id: Option<&str>) {
        let value = id.map_or(Value::Null, |id| Value::String(id.to_string()));
        self.fields
            .insert(format!("{module_key}_conversation_id"), value);
    }

    /// Raw fields of the record
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// One inbound request and its in-flight response state
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Record of the requesting user
    pub user: UserRecord,
    /// Raw request text
    pub text: String,
    /// Optional URL of an attached image
    pub image_url: Option<String>,
    /// Accumulated response text, filled during processing
    pub response: String,
    /// Whether `response` carries a user-visible error
    pub error: bool,
}

impl ChatRequest {
    /// Create a text request with empty response state
    #[must_use]
    pub fn text(user: UserRecord, text: impl Into<String>) -> Self {
        Self {
            user,
            text: text.into(),
            image_url: None,
            response: String::new(),
            error: false,
        }
    }

    /// Create an image+text request with empty response state
    #[must_use]
    pub fn with_image(
        user: UserRecord,
        text: impl Into<String>,
        image_url: impl Into<String>,
    ) -> Self {
        Self {
            image_url: Some(image_url.into()),
            ..Self::text(user, text)
        }
    }
}
