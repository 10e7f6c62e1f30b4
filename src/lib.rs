#![deny(missing_docs)]
//! Gemini bridge library.
//!
//! Adapts a chat-bot platform to the Google Gemini generative-language API:
//! streamed replies with cooperative cancellation, flat-file conversation
//! persistence, and per-module rate limiting.

/// Configuration management.
pub mod config;
/// Conversation transcripts and their on-disk store.
pub mod conversation;
/// Rate limiting between model calls.
pub mod cooldown;
/// Streaming Gemini model client.
pub mod gemini;
/// Localized user-facing messages.
pub mod messages;
/// The request-processing module itself.
pub mod module;
/// Outbound collaborator interfaces.
pub mod outbound;
/// Dispatcher-facing request contract.
pub mod request;
