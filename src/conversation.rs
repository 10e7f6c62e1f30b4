//! Flat-file persistence for conversation transcripts
//!
//! Each session is one pretty-printed JSON document under the configured
//! conversations directory, named `<session-id>.json`. The serialized shape of
//! [`Turn`] doubles as the `contents[]` element of the Gemini request body.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while reading or writing transcripts
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Role of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The requesting user
    User,
    /// The model
    Model,
}

/// A single content part of a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Part {
    /// Plain text
    Text(String),
    /// Inline binary payload, base64-encoded
    InlineData {
        /// Mime type of the payload, e.g. `image/jpeg`
        mime_type: String,
        /// Base64-encoded bytes
        data: String,
    },
}

/// One role-tagged message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced this turn
    pub role: Role,
    /// Ordered content parts
    pub parts: Vec<Part>,
}

impl Turn {
    /// Create a user turn with a single text part
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Create a model turn with a single text part
    #[must_use]
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::Text(text.into())],
        }
    }
}

/// Directory-backed store of conversation transcripts
#[derive(Debug, Clone)]
pub struct ConversationStore {
    dir: PathBuf,
}

impl ConversationStore {
    /// Create a store rooted at the given directory
    ///
    /// The directory itself is created lazily on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load the transcript for a session
    ///
    /// Returns `Ok(None)` when no file exists for the identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid JSON.
    pub async fn load(&self, session_id: &str) -> Result<Option<Vec<Turn>>, StorageError> {
        let path = self.transcript_path(session_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let turns = serde_json::from_slice(&bytes)?;
        Ok(Some(turns))
    }

    /// Save the transcript for a session, overwriting any previous version
    ///
    /// # Errors
    ///
    /// Returns an error if the conversations directory cannot be created or
    /// the file cannot be written.
    pub async fn save(&self, session_id: &str, turns: &[Turn]) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let body = serde_json::to_string_pretty(turns)?;
        tokio::fs::write(self.transcript_path(session_id), body).await?;
        Ok(())
    }

    /// Delete the transcript for a session
    ///
    /// Deleting a session that has no file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub async fn delete(&self, session_id: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.transcript_path(session_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Path of the transcript file for a session
    #[must_use]
    pub fn transcript_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }
}

/// Generate a new collision-resistant session identifier
#[must_use]
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}
