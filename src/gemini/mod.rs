//! Streaming client for the Google Gemini generative-language API
//!
//! Covers the text model (full conversation contents) and the vision model
//! (inline image plus prompt), as well as the image download used by the
//! vision path. Model calls stream their response via server-sent events.

mod stream;

pub use stream::{Candidate, CandidateContent, CandidatePart, ResponseChunk};

use crate::config::GeminiSettings;
use crate::conversation::{Part, Role, Turn};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures_util::Stream;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Base URL of the generative-language API
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Timeout for downloading a request's attached image
const IMAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors that can occur during Gemini operations
#[derive(Debug, Error)]
pub enum GeminiError {
    /// Error returned by the API
    #[error("API error: {0}")]
    ApiError(String),
    /// Error during network communication
    #[error("Network error: {0}")]
    NetworkError(String),
    /// Error decoding a streamed response chunk
    #[error("JSON error: {0}")]
    JsonError(String),
    /// Error building the HTTP client or proxy
    #[error("Client setup error: {0}")]
    ClientSetup(String),
}

/// Generation parameters sent with every model call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling cutoff
    pub top_p: f32,
    /// Top-k sampling cutoff
    pub top_k: u32,
    /// Maximum tokens in the reply
    pub max_output_tokens: u32,
}

impl From<&GeminiSettings> for GenerationConfig {
    fn from(settings: &GeminiSettings) -> Self {
        Self {
            temperature: settings.temperature,
            top_p: settings.top_p,
            top_k: settings.top_k,
            max_output_tokens: settings.max_output_tokens,
        }
    }
}

/// Input of one streaming model call
#[derive(Debug, Clone)]
pub enum ModelInput {
    /// Full conversation for the text model
    Turns(Vec<Turn>),
    /// Single image with an accompanying prompt for the vision model
    ImageWithText {
        /// Mime type of the image bytes
        mime_type: String,
        /// Raw image bytes
        data: Vec<u8>,
        /// Prompt describing what to do with the image
        prompt: String,
    },
}

/// Lazy sequence of streamed response chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ResponseChunk, GeminiError>> + Send>>;

/// Streaming model client used by the module
///
/// A consumed stream cannot be replayed; re-running a generation means
/// issuing a new call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Issue a streaming generation call for the given input
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent or the API answers
    /// with a non-success status.
    async fn stream_generate(&self, input: ModelInput) -> Result<ChunkStream, GeminiError>;

    /// Download the image a request points at
    ///
    /// # Errors
    ///
    /// Returns an error on network failure or a non-success status.
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, GeminiError>;
}

/// HTTP implementation of [`GenerativeModel`]
pub struct GeminiClient {
    http: HttpClient,
    api_key: String,
    model: String,
    vision_model: String,
    generation: GenerationConfig,
}

impl GeminiClient {
    /// Build a client from settings, optionally routed through a proxy
    ///
    /// # Errors
    ///
    /// Returns [`GeminiError::ClientSetup`] if the proxy URL is invalid or
    /// the HTTP client cannot be constructed.
    pub fn new(settings: &GeminiSettings, proxy: Option<&str>) -> Result<Self, GeminiError> {
        let mut builder = HttpClient::builder();
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| GeminiError::ClientSetup(format!("Invalid proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| GeminiError::ClientSetup(e.to_string()))?;

        Ok(Self {
            http,
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            vision_model: settings.vision_model.clone(),
            generation: GenerationConfig::from(settings),
        })
    }

    /// Model identifier and request body for the given input
    fn payload(&self, input: &ModelInput) -> (&str, serde_json::Value) {
        let (model, contents) = match input {
            ModelInput::Turns(turns) => (self.model.as_str(), json!(turns)),
            ModelInput::ImageWithText {
                mime_type,
                data,
                prompt,
            } => {
                let turn = Turn {
                    role: Role::User,
                    parts: vec![
                        Part::InlineData {
                            mime_type: mime_type.clone(),
                            data: BASE64.encode(data),
                        },
                        Part::Text(prompt.clone()),
                    ],
                };
                (self.vision_model.as_str(), json!([turn]))
            }
        };
        let body = json!({
            "contents": contents,
            "generationConfig": self.generation,
        });
        (model, body)
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn stream_generate(&self, input: ModelInput) -> Result<ChunkStream, GeminiError> {
        let (model, body) = self.payload(&input);
        let url =
            format!("{API_BASE}/models/{model}:streamGenerateContent?alt=sse&key={}", self.api_key);

        debug!("Starting streaming generation (model: {model})");

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GeminiError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GeminiError::ApiError(format!(
                "Gemini API error: {status} - {error_text}"
            )));
        }

        Ok(stream::chunk_stream(response))
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, GeminiError> {
        debug!("Downloading request image");

        let response = self
            .http
            .get(url)
            .timeout(IMAGE_FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| GeminiError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeminiError::ApiError(format!(
                "Image download failed: {status}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GeminiError::NetworkError(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
