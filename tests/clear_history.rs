use gemini_bridge::config::{FilesSettings, GeminiSettings, Settings, MODULE_KEY};
use gemini_bridge::conversation::{ConversationStore, Turn};
use gemini_bridge::messages::{LangMessages, Messages};
use gemini_bridge::module::{GeminiModule, ModuleError};
use gemini_bridge::outbound::{MessageSender, UserStore};
use gemini_bridge::request::{ChatRequest, UserRecord};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Drops every update; clearing history relays nothing.
struct SilentSender;

#[async_trait::async_trait]
impl MessageSender for SilentSender {
    async fn send_update(&self, _request: &ChatRequest, _end: bool) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Records every persisted user record.
#[derive(Default)]
struct RecordingUserStore {
    saved: Mutex<Vec<UserRecord>>,
}

impl RecordingUserStore {
    fn saved(&self) -> Vec<UserRecord> {
        self.saved.lock().expect("Mutex poisoned").clone()
    }
}

#[async_trait::async_trait]
impl UserStore for RecordingUserStore {
    async fn save_user(&self, user: &UserRecord) -> anyhow::Result<()> {
        self.saved.lock().expect("Mutex poisoned").push(user.clone());
        Ok(())
    }
}

/// Always fails to persist, simulating an unavailable backing store.
struct FailingUserStore;

#[async_trait::async_trait]
impl UserStore for FailingUserStore {
    async fn save_user(&self, _user: &UserRecord) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("user store unavailable"))
    }
}

fn settings(conversations_dir: &Path) -> Arc<Settings> {
    Arc::new(Settings {
        modules: HashMap::from([(MODULE_KEY.to_string(), true)]),
        files: FilesSettings {
            conversations_dir: conversations_dir.to_path_buf(),
        },
        default_lang: "en".to_string(),
        gemini: GeminiSettings {
            api_key: "test-key".to_string(),
            proxy: None,
            cooldown_seconds: 0,
            temperature: 0.9,
            top_p: 1.0,
            top_k: 1,
            max_output_tokens: 2048,
            model: "gemini-pro".to_string(),
            vision_model: "gemini-pro-vision".to_string(),
        },
    })
}

fn messages() -> Arc<Messages> {
    let tables = HashMap::from([(
        "en".to_string(),
        LangMessages {
            response_error: "Error: {error}".to_string(),
        },
    )]);
    Arc::new(Messages::new(tables, "en").expect("Should build messages"))
}

fn module_with(dir: &Path, users: Arc<RecordingUserStore>) -> GeminiModule {
    GeminiModule::new(settings(dir), messages(), users, Arc::new(SilentSender))
}

fn user_with_session(id: &str) -> UserRecord {
    let mut user: UserRecord =
        serde_json::from_value(serde_json::json!({ "user_id": 42, "lang": "en" }))
            .expect("Should build record");
    user.set_conversation_id(MODULE_KEY, Some(id));
    user
}

#[tokio::test]
async fn clearing_without_a_session_touches_nothing() {
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let users = Arc::new(RecordingUserStore::default());
    let module = module_with(dir.path(), users.clone());

    let mut user: UserRecord =
        serde_json::from_value(serde_json::json!({ "user_id": 42 })).expect("Should build record");
    let before = user.clone();
    module
        .clear_conversation_for_user(&mut user)
        .await
        .expect("Should be a no-op");

    assert_eq!(user, before, "record changed by a no-op clear");
    assert!(users.saved().is_empty(), "no-op clear persisted the record");
}

#[tokio::test]
async fn clearing_deletes_the_transcript_and_persists_the_nulled_record() {
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let store = ConversationStore::new(dir.path());
    store
        .save("sess", &[Turn::user("Hello"), Turn::model("Hi there")])
        .await
        .expect("Should seed transcript");

    let users = Arc::new(RecordingUserStore::default());
    let module = module_with(dir.path(), users.clone());

    let mut user = user_with_session("sess");
    module
        .clear_conversation_for_user(&mut user)
        .await
        .expect("Should clear");

    assert_eq!(user.conversation_id(MODULE_KEY), None);
    assert!(
        !store.transcript_path("sess").exists(),
        "transcript file survived the clear"
    );

    // One save, carrying the nulled identifier and the untouched fields.
    let saved = users.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].conversation_id(MODULE_KEY), None);
    assert_eq!(
        saved[0].fields().get("user_id"),
        Some(&serde_json::json!(42))
    );
}

#[tokio::test]
async fn clearing_twice_persists_only_once() {
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let store = ConversationStore::new(dir.path());
    store
        .save("sess", &[Turn::user("Hello")])
        .await
        .expect("Should seed transcript");

    let users = Arc::new(RecordingUserStore::default());
    let module = module_with(dir.path(), users.clone());

    let mut user = user_with_session("sess");
    module
        .clear_conversation_for_user(&mut user)
        .await
        .expect("First clear should succeed");
    module
        .clear_conversation_for_user(&mut user)
        .await
        .expect("Second clear should be a no-op");

    assert_eq!(users.saved().len(), 1);
}

#[tokio::test]
async fn clearing_with_a_missing_file_still_nulls_the_identifier() {
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let users = Arc::new(RecordingUserStore::default());
    let module = module_with(dir.path(), users.clone());

    let mut user = user_with_session("ghost");
    module
        .clear_conversation_for_user(&mut user)
        .await
        .expect("A missing file is not an error");

    assert_eq!(user.conversation_id(MODULE_KEY), None);
    assert_eq!(users.saved().len(), 1);
}

#[tokio::test]
async fn a_failing_user_store_surfaces_the_error() {
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let module = GeminiModule::new(
        settings(dir.path()),
        messages(),
        Arc::new(FailingUserStore),
        Arc::new(SilentSender),
    );

    let mut user = user_with_session("sess");
    let result = module.clear_conversation_for_user(&mut user).await;

    assert!(matches!(result, Err(ModuleError::UserStore(_))));
}
