//! Decoding of streamed `streamGenerateContent` responses
//!
//! With `alt=sse` the endpoint answers as server-sent events; each event's
//! data field is one JSON `GenerateContentResponse` increment. Unknown
//! fields (safety ratings, usage metadata) are ignored.

use super::{ChunkStream, GeminiError};
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use serde::Deserialize;

/// One streamed increment of a model response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseChunk {
    /// Response candidates; the first one carries the reply
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// One candidate reply inside a chunk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Candidate {
    /// Generated content delta
    pub content: Option<CandidateContent>,
    /// Reason generation stopped, present on the final chunk
    #[serde(rename = "finishReason")]
    pub finish_reason: Option<String>,
}

/// Content payload of a candidate
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateContent {
    /// Ordered content parts
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

/// One content part of a candidate
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidatePart {
    /// Text delta, absent for non-text parts
    pub text: Option<String>,
}

impl ResponseChunk {
    /// Build a chunk carrying a single text delta
    #[must_use]
    pub fn text_delta(text: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(CandidateContent {
                    parts: vec![CandidatePart {
                        text: Some(text.into()),
                    }],
                }),
                finish_reason: None,
            }],
        }
    }

    /// Text carried by this chunk, if any
    ///
    /// Chunks without candidates, without parts, or with an empty text delta
    /// read as `None`.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .and_then(|content| content.parts.first())
            .and_then(|part| part.text.as_deref())
            .filter(|text| !text.is_empty())
    }

    /// Finish reason reported by the first candidate, if any
    #[must_use]
    pub fn finish_reason(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|candidate| candidate.finish_reason.as_deref())
    }
}

/// Adapt an SSE response body into a stream of decoded chunks
pub(super) fn chunk_stream(response: reqwest::Response) -> ChunkStream {
    let events = response.bytes_stream().eventsource();
    let chunks = events.map(|event| match event {
        Ok(event) => serde_json::from_str::<ResponseChunk>(&event.data)
            .map_err(|e| GeminiError::JsonError(format!("Failed to parse event data: {e}"))),
        Err(e) => Err(GeminiError::NetworkError(format!("Stream error: {e}"))),
    });
    Box::pin(chunks)
}
