// End-to-end engine tests over mock provider/backend and the in-process
// conversation store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::tempdir;

use mimic::{
    ChatEngine, ChatRequest, ContextAssembler, ConversationStore, EmbeddingProvider, EngineError,
    EphemeralConversationStore, Exchange, GenerationBackend, IdentityCache, ModelCapability,
    ProfileRepository, Result, SamplingConfig,
};

/// Maps texts onto fixed keyword axes so similarity is deterministic.
struct AxisProvider;

#[async_trait]
impl EmbeddingProvider for AxisProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let philosophy = text.contains("philosoph") || text.contains("Socrates");
        let music = text.contains("music") || text.contains("Beethoven");
        Ok(vec![
            if philosophy { 1.0 } else { 0.0 },
            if music { 1.0 } else { 0.0 },
            0.1,
        ])
    }

    fn dimension(&self) -> usize {
        3
    }
}

/// Backend that returns a fixed raw completion and records the identity
/// vector it was conditioned with.
struct ScriptedBackend {
    reply: String,
    capability: ModelCapability,
    seen_identity: Mutex<Option<Vec<f32>>>,
}

impl ScriptedBackend {
    fn new(reply: impl Into<String>, capability: ModelCapability) -> Self {
        Self {
            reply: reply.into(),
            capability,
            seen_identity: Mutex::new(None),
        }
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(
        &self,
        _prompt: &str,
        identity: Option<&[f32]>,
        _sampling: &SamplingConfig,
    ) -> Result<String> {
        *self.seen_identity.lock().unwrap() = identity.map(|v| v.to_vec());
        Ok(self.reply.clone())
    }

    fn capability(&self) -> ModelCapability {
        self.capability
    }
}

/// Store whose semantic search is down but whose recency path works.
struct SearchlessStore {
    inner: EphemeralConversationStore,
}

#[async_trait]
impl ConversationStore for SearchlessStore {
    async fn append(
        &self,
        conversation_id: &str,
        user_text: &str,
        response_text: &str,
    ) -> Result<Exchange> {
        self.inner.append(conversation_id, user_text, response_text).await
    }

    async fn search_relevant(
        &self,
        _conversation_id: &str,
        _query_text: &str,
        _k: usize,
    ) -> Result<Vec<Exchange>> {
        Err(EngineError::MemoryStoreUnavailable("connection refused".into()))
    }

    async fn recent_history(&self, conversation_id: &str, limit: usize) -> Result<Vec<Exchange>> {
        self.inner.recent_history(conversation_id, limit).await
    }
}

async fn seeded_profiles(dir: &tempfile::TempDir) -> Arc<ProfileRepository> {
    let repo = Arc::new(ProfileRepository::new(
        dir.path().join("profiles"),
        dir.path().join("embed"),
    ));
    repo.put_profile(
        "Socrates",
        "# Socrates\n\nAthenian philosopher, questioner of everything.",
    )
    .await
    .unwrap();
    repo.put_profile(
        "Beethoven",
        "# Beethoven\n\nGerman composer, master of classical music.",
    )
    .await
    .unwrap();
    repo
}

fn engine(
    profiles: Arc<ProfileRepository>,
    store: Arc<dyn ConversationStore>,
    backend: Arc<ScriptedBackend>,
) -> ChatEngine {
    ChatEngine::new(Arc::new(AxisProvider), profiles, store, backend, 3, 10)
}

#[tokio::test]
async fn explicit_persona_turn_is_cleaned_and_recorded() {
    let dir = tempdir().unwrap();
    let profiles = seeded_profiles(&dir).await;
    let store = Arc::new(EphemeralConversationStore::new(Arc::new(AxisProvider)));
    let backend = Arc::new(ScriptedBackend::new(
        "Socrates (speaking): I know that I know nothing.</s>Man (speaking): more",
        ModelCapability::Conditionable,
    ));
    let engine = engine(profiles, store.clone(), backend.clone());

    let reply = engine
        .chat(ChatRequest {
            persona: Some("Socrates".into()),
            conversation_id: "c1".into(),
            user_text: "what do you know".into(),
            sampling: None,
        })
        .await
        .unwrap();

    assert_eq!(reply.persona, "Socrates");
    assert_eq!(reply.text, "I know that I know nothing.");

    // Conditionable backend received the identity vector
    let seen = backend.seen_identity.lock().unwrap().clone().unwrap();
    assert_eq!(seen.len(), 3);

    // The exchange was appended and is retrievable for the next turn
    let recent = store.recent_history("c1", 10).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].user_prompt, "what do you know");
    assert_eq!(recent[0].response, "I know that I know nothing.");
}

#[tokio::test]
async fn absent_persona_is_matched_from_the_user_text() {
    let dir = tempdir().unwrap();
    let profiles = seeded_profiles(&dir).await;
    let store = Arc::new(EphemeralConversationStore::new(Arc::new(AxisProvider)));
    let backend = Arc::new(ScriptedBackend::new(
        "Socrates (speaking): ask away.</s>",
        ModelCapability::Conditionable,
    ));
    let engine = engine(profiles, store, backend);

    let reply = engine
        .chat(ChatRequest {
            persona: None,
            conversation_id: "c1".into(),
            user_text: "I want to act like Socrates".into(),
            sampling: None,
        })
        .await
        .unwrap();

    assert_eq!(reply.persona, "Socrates");
}

#[tokio::test]
async fn plain_backend_gets_no_identity_but_turn_still_requires_resolution() {
    let dir = tempdir().unwrap();
    let profiles = seeded_profiles(&dir).await;
    let store = Arc::new(EphemeralConversationStore::new(Arc::new(AxisProvider)));
    let backend = Arc::new(ScriptedBackend::new(
        "Beethoven (speaking): listen closely.</s>",
        ModelCapability::Plain,
    ));
    let engine = engine(profiles.clone(), store, backend.clone());

    let reply = engine
        .chat(ChatRequest {
            persona: Some("Beethoven".into()),
            conversation_id: "c1".into(),
            user_text: "play music".into(),
            sampling: None,
        })
        .await
        .unwrap();

    assert_eq!(reply.text, "listen closely.");
    assert!(backend.seen_identity.lock().unwrap().is_none());
    // Resolution still ran: the identity vector was persisted
    assert!(profiles
        .load_identity_vector("Beethoven")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn unknown_persona_fails_the_turn() {
    let dir = tempdir().unwrap();
    let profiles = seeded_profiles(&dir).await;
    let store = Arc::new(EphemeralConversationStore::new(Arc::new(AxisProvider)));
    let backend = Arc::new(ScriptedBackend::new("", ModelCapability::Plain));
    let engine = engine(profiles, store, backend);

    let err = engine
        .chat(ChatRequest {
            persona: Some("Nobody".into()),
            conversation_id: "c1".into(),
            user_text: "hello".into(),
            sampling: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::IdentityResolution { .. }));
}

#[tokio::test]
async fn fresh_conversation_builds_a_prompt_from_the_message_alone() {
    let dir = tempdir().unwrap();
    let profiles = seeded_profiles(&dir).await;
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(AxisProvider);
    let store: Arc<dyn ConversationStore> =
        Arc::new(EphemeralConversationStore::new(provider.clone()));
    let identity = Arc::new(IdentityCache::new(provider, profiles));
    let assembler = ContextAssembler::new(identity, store, 3, 10);

    let payload = assembler
        .build_prompt("Socrates", "fresh-conv", "first question")
        .await
        .unwrap();

    assert!(payload.text.contains("Man (speaking): first question</s>"));
    assert!(payload.text.ends_with("Socrates (speaking): "));
}

#[tokio::test]
async fn store_outage_falls_back_to_recent_history() {
    let dir = tempdir().unwrap();
    let profiles = seeded_profiles(&dir).await;
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(AxisProvider);
    let store = Arc::new(SearchlessStore {
        inner: EphemeralConversationStore::new(provider.clone()),
    });
    store.append("c1", "earlier question", "earlier answer").await.unwrap();

    let identity = Arc::new(IdentityCache::new(provider, profiles));
    let assembler = ContextAssembler::new(identity, store, 3, 10);

    let payload = assembler
        .build_prompt("Socrates", "c1", "next question")
        .await
        .unwrap();

    // Fallback history made it into the prompt despite the search outage
    assert!(payload.text.contains("Man (speaking): earlier question</s>"));
    assert!(payload.text.contains("Man (speaking): next question</s>"));
}

#[tokio::test]
async fn register_profile_drops_the_cached_identity() {
    let dir = tempdir().unwrap();
    let profiles = seeded_profiles(&dir).await;
    let store = Arc::new(EphemeralConversationStore::new(Arc::new(AxisProvider)));
    let backend = Arc::new(ScriptedBackend::new(
        "Socrates (speaking): indeed.</s>",
        ModelCapability::Conditionable,
    ));
    let engine = engine(profiles.clone(), store, backend);

    let v1 = engine.identity_cache().resolve("Socrates").await.unwrap();

    engine
        .register_profile("Socrates", "# Socrates\n\nA rewritten, music-loving Socrates.")
        .await
        .unwrap();

    let v2 = engine.identity_cache().resolve("Socrates").await.unwrap();
    // New profile text lands on a different embedding axis
    assert!(!Arc::ptr_eq(&v1, &v2));
    assert_ne!(*v1, *v2);
}

#[tokio::test]
async fn relevant_history_is_scoped_and_rendered_chronologically() {
    let dir = tempdir().unwrap();
    let profiles = seeded_profiles(&dir).await;
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(AxisProvider);
    let store: Arc<dyn ConversationStore> =
        Arc::new(EphemeralConversationStore::new(provider.clone()));

    store
        .append("c1", "tell me about philosophy", "gladly")
        .await
        .unwrap();
    store
        .append("other", "philosophy elsewhere", "should not appear")
        .await
        .unwrap();

    let identity = Arc::new(IdentityCache::new(provider, profiles));
    let assembler = ContextAssembler::new(identity, store, 3, 10);

    let payload = assembler
        .build_prompt("Socrates", "c1", "more philosophy please")
        .await
        .unwrap();

    assert!(payload.text.contains("tell me about philosophy"));
    assert!(!payload.text.contains("philosophy elsewhere"));
}
