//! Gemini request-processing module
//!
//! Owns the full lifecycle of one chat request: enablement, cooldown,
//! session load/append/persist, streamed generation with cooperative
//! cancellation, and relaying of partial and final updates. A dispatcher
//! coordinates with a running module only through [`ModuleFlags`].

use crate::config::{Settings, MODULE_KEY};
use crate::conversation::{new_session_id, ConversationStore, Turn};
use crate::cooldown::Cooldown;
use crate::gemini::{ChunkStream, GeminiClient, GeminiError, GenerativeModel, ModelInput};
use crate::messages::Messages;
use crate::outbound::{MessageSender, UserStore};
use crate::request::{ChatRequest, UserRecord};
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Error text shown to the user when the module is not initialized
const NOT_INITIALIZED: &str = "Gemini module not initialized";

/// Mime type assumed for downloaded request images
const IMAGE_MIME_TYPE: &str = "image/jpeg";

/// Errors that can occur while initializing or processing requests
#[derive(Debug, Error)]
pub enum ModuleError {
    /// The module is switched off in configuration
    #[error("module disabled in configuration")]
    Disabled,
    /// Error from the model client
    #[error("Gemini error: {0}")]
    Gemini(#[from] GeminiError),
    /// Error from the user-record store
    #[error("user store error: {0}")]
    UserStore(String),
}

/// Shared busy/cancel flags coordinating a module with its dispatcher
///
/// Clones share state. Each flag is a single atomic scalar, safe to read and
/// write from another task or thread without extra locking. Cancellation is
/// cooperative: the streamer polls the flag once per chunk, so cancellation
/// latency equals the time to the next chunk.
#[derive(Debug, Clone, Default)]
pub struct ModuleFlags {
    cancel_requested: Arc<AtomicBool>,
    processing: Arc<AtomicBool>,
}

impl ModuleFlags {
    /// Create flags with both bits cleared
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether cancellation of the current stream has been requested
    #[must_use]
    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Request cooperative cancellation of the current stream
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    /// Whether a request is currently being processed
    #[must_use]
    pub fn processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    fn set_processing(&self, value: bool) {
        self.processing.store(value, Ordering::SeqCst);
    }

    fn clear_cancel(&self) {
        self.cancel_requested.store(false, Ordering::SeqCst);
    }

    fn reset(&self) {
        self.clear_cancel();
        self.set_processing(false);
    }
}

/// Clears the processing flag when dropped
///
/// Keeps the busy indicator truthful on every exit path, including early
/// returns and propagated errors.
struct ProcessingGuard {
    flags: ModuleFlags,
}

impl ProcessingGuard {
    fn engage(flags: &ModuleFlags) -> Self {
        flags.set_processing(true);
        Self {
            flags: flags.clone(),
        }
    }
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.flags.set_processing(false);
    }
}

/// Request-processing module bridging the chat platform to Gemini
pub struct GeminiModule {
    settings: Arc<Settings>,
    messages: Arc<Messages>,
    users: Arc<dyn UserStore>,
    sender: Arc<dyn MessageSender>,
    store: ConversationStore,
    cooldown: Cooldown,
    flags: ModuleFlags,
    client: Option<Arc<dyn GenerativeModel>>,
}

impl GeminiModule {
    /// Create a module wired to its collaborators
    ///
    /// The module starts disabled; call [`initialize`](Self::initialize) or
    /// [`install_model`](Self::install_model) before processing requests.
    #[must_use]
    pub fn new(
        settings: Arc<Settings>,
        messages: Arc<Messages>,
        users: Arc<dyn UserStore>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        let store = ConversationStore::new(settings.files.conversations_dir.clone());
        let cooldown = Cooldown::new(settings.cooldown());
        Self {
            settings,
            messages,
            users,
            sender,
            store,
            cooldown,
            flags: ModuleFlags::new(),
            client: None,
        }
    }

    /// Shared flags for dispatcher-side coordination
    #[must_use]
    pub fn flags(&self) -> ModuleFlags {
        self.flags.clone()
    }

    /// Whether a model client is installed and requests can be processed
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Configure the model client and enable the module
    ///
    /// The proxy argument wins over the configured `gemini.proxy`; the
    /// configured value is ignored when it is the `"auto"` sentinel. Both
    /// shared flags are reset. Failing here leaves the module disabled —
    /// there is no partial-enabled state.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::Disabled`] when the module is switched off in
    /// configuration, or the underlying [`GeminiError`] when the client
    /// cannot be built.
    pub fn initialize(&mut self, proxy: Option<&str>) -> Result<(), ModuleError> {
        info!("Initializing Gemini module");
        self.flags.reset();
        self.client = None;

        if !self.settings.module_enabled(MODULE_KEY) {
            error!("Gemini module is disabled in configuration");
            return Err(ModuleError::Disabled);
        }

        let proxy = proxy.or_else(|| self.settings.gemini.proxy_url());
        if let Some(proxy) = proxy {
            info!("Routing Gemini calls through proxy {proxy}");
        }
        let client = GeminiClient::new(&self.settings.gemini, proxy)?;
        self.client = Some(Arc::new(client));
        info!("Gemini module initialized");
        Ok(())
    }

    /// Install a pre-built model client and enable the module
    ///
    /// Embedders with their own transport (and tests) use this in place of
    /// [`initialize`](Self::initialize).
    pub fn install_model(&mut self, model: Arc<dyn GenerativeModel>) {
        self.client = Some(model);
    }

    /// Process one chat request, mutating its response fields in place
    ///
    /// Requests carrying an image URL go to the vision model as a stateless
    /// single turn; text requests continue (or start) the user's persisted
    /// session. Partial replies are relayed as they stream in; one final
    /// update is relayed after the stream ends, whether it completed or was
    /// cancelled.
    ///
    /// When the module is not enabled the request is rejected in place: a
    /// localized error lands in the response, the error flag is set, and the
    /// call returns `Ok` without reaching the model.
    ///
    /// # Errors
    ///
    /// A model-call or user-store failure is fatal for this instance: the
    /// module disables itself and the error propagates. Run
    /// [`initialize`](Self::initialize) again to resume processing.
    pub async fn process_request(&mut self, request: &mut ChatRequest) -> Result<(), ModuleError> {
        let Some(client) = self.client.clone() else {
            error!("Gemini module not initialized, rejecting request");
            let table = self.messages.for_lang(request.user.lang());
            request.response = table.format_error(NOT_INITIALIZED);
            request.error = true;
            self.flags.set_processing(false);
            return Ok(());
        };

        // A leftover cancel aimed at a previous request must not abort this one.
        self.flags.clear_cancel();
        let guard = ProcessingGuard::engage(&self.flags);
        let outcome = self.run(client.as_ref(), request).await;
        drop(guard);

        match outcome {
            Ok(()) => {
                if let Err(e) = self.sender.send_update(request, true).await {
                    warn!(error = %e, "Failed to relay final update");
                }
                Ok(())
            }
            Err(e) => {
                // Fatal for this instance; a new initialize is required.
                self.client = None;
                Err(e)
            }
        }
    }

    /// Delete the user's stored conversation, if any
    ///
    /// Removes the transcript file (absence is not an error), nulls the
    /// session identifier in the record, and persists the record. A user
    /// without a session identifier is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::UserStore`] when the updated record cannot be
    /// persisted. Transcript deletion failures are logged and ignored.
    pub async fn clear_conversation_for_user(
        &self,
        user: &mut UserRecord,
    ) -> Result<(), ModuleError> {
        let Some(session_id) = user.conversation_id(MODULE_KEY) else {
            return Ok(());
        };

        if let Err(e) = self.store.delete(&session_id).await {
            warn!(session_id = %session_id, error = %e, "Failed to delete transcript");
        }
        user.set_conversation_id(MODULE_KEY, None);
        self.users
            .save_user(user)
            .await
            .map_err(|e| ModuleError::UserStore(e.to_string()))?;
        info!(session_id = %session_id, "Cleared conversation history");
        Ok(())
    }

    async fn run(
        &self,
        client: &dyn GenerativeModel,
        request: &mut ChatRequest,
    ) -> Result<(), ModuleError> {
        self.cooldown.acquire().await;

        match request.image_url.clone() {
            Some(image_url) => self.run_image_request(client, request, &image_url).await,
            None => self.run_text_request(client, request).await,
        }
    }

    /// Stateless vision path: the session and user record are untouched
    async fn run_image_request(
        &self,
        client: &dyn GenerativeModel,
        request: &mut ChatRequest,
        image_url: &str,
    ) -> Result<(), ModuleError> {
        let data = client.fetch_image(image_url).await?;
        let input = ModelInput::ImageWithText {
            mime_type: IMAGE_MIME_TYPE.to_string(),
            data,
            prompt: request.text.clone(),
        };
        let stream = client.stream_generate(input).await?;
        self.consume_stream(stream, request).await?;
        Ok(())
    }

    async fn run_text_request(
        &self,
        client: &dyn GenerativeModel,
        request: &mut ChatRequest,
    ) -> Result<(), ModuleError> {
        let stored_id = request.user.conversation_id(MODULE_KEY);
        let mut turns = match &stored_id {
            Some(id) => self.load_transcript(id).await,
            None => Vec::new(),
        };
        let session_id = stored_id.unwrap_or_else(new_session_id);

        turns.push(Turn::user(request.text.clone()));

        let stream = client
            .stream_generate(ModelInput::Turns(turns.clone()))
            .await?;
        let cancelled = self.consume_stream(stream, request).await?;
        if cancelled {
            // No transcript mutation, no persistence, no record update.
            return Ok(());
        }

        turns.push(Turn::model(request.response.clone()));
        let saved_id = match self.store.save(&session_id, &turns).await {
            Ok(()) => Some(session_id),
            Err(e) => {
                warn!(error = %e, "Failed to save conversation, dropping the session");
                None
            }
        };
        request.user.set_conversation_id(MODULE_KEY, saved_id.as_deref());
        self.users
            .save_user(&request.user)
            .await
            .map_err(|e| ModuleError::UserStore(e.to_string()))?;
        Ok(())
    }

    /// Load a transcript, degrading every failure to "no prior transcript"
    async fn load_transcript(&self, session_id: &str) -> Vec<Turn> {
        match self.store.load(session_id).await {
            Ok(Some(turns)) => turns,
            Ok(None) => {
                warn!(session_id = %session_id, "No transcript on disk, starting fresh");
                Vec::new()
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to load transcript, starting fresh");
                Vec::new()
            }
        }
    }

    /// Drain the chunk stream into the request's response accumulator
    ///
    /// Returns `true` when the loop stopped because cancellation was
    /// requested. The flag is checked before a chunk is handled, so no chunk
    /// is relayed after cancellation is observed.
    async fn consume_stream(
        &self,
        mut stream: ChunkStream,
        request: &mut ChatRequest,
    ) -> Result<bool, ModuleError> {
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if self.flags.cancel_requested() {
                info!("Request cancelled, dropping the rest of the stream");
                return Ok(true);
            }
            if let Some(reason) = chunk.finish_reason() {
                debug!("Generation finished: {reason}");
            }
            let Some(text) = chunk.text() else {
                continue;
            };
            request.response.push_str(text);
            if let Err(e) = self.sender.send_update(request, false).await {
                warn!(error = %e, "Failed to relay partial update");
            }
        }
        Ok(false)
    }
}
