//! Outbound collaborator interfaces
//!
//! The module pushes data out through two seams owned by the surrounding
//! platform: a message sender that relays response updates to the requester,
//! and a store that persists user records. Adapters implement these traits;
//! tests substitute recording mocks.

use crate::request::{ChatRequest, UserRecord};
use async_trait::async_trait;

/// Relays response updates to the requester
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Push the request's current response text to the requester
    ///
    /// `end` marks the final update of the request. Called once per streamed
    /// increment with `end == false`, then once with `end == true` after the
    /// stream finishes.
    ///
    /// # Errors
    ///
    /// Implementations may fail on transport errors; the module logs such
    /// failures and carries on.
    async fn send_update(&self, request: &ChatRequest, end: bool) -> anyhow::Result<()>;
}

/// Persists user records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Persist the given user record
    ///
    /// # Errors
    ///
    /// Fails when the backing store is unavailable; the module treats this
    /// as fatal for the current request.
    async fn save_user(&self, user: &UserRecord) -> anyhow::Result<()>;
}
