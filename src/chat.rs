// src/chat.rs

//! Engine orchestration for one chat turn: disambiguate the persona when
//! none is named, assemble the conditioned prompt, generate, clean, and
//! record the exchange.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::SamplingConfig;
use crate::context::ContextAssembler;
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::generation::{GenerationBackend, ModelCapability};
use crate::identity::IdentityCache;
use crate::matcher::CharacterMatcher;
use crate::memory::ConversationStore;
use crate::postprocess::clean;
use crate::profile::ProfileRepository;

#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Explicit persona, or `None` to disambiguate from the user text.
    pub persona: Option<String>,
    pub conversation_id: String,
    pub user_text: String,
    pub sampling: Option<SamplingConfig>,
}

#[derive(Debug, Clone)]
pub struct ChatReply {
    /// The persona that answered (resolved, when the request named none).
    pub persona: String,
    pub text: String,
}

/// Explicitly constructed engine state; everything the turn pipeline needs
/// is injected here once, at startup.
pub struct ChatEngine {
    profiles: Arc<ProfileRepository>,
    identity: Arc<IdentityCache>,
    matcher: CharacterMatcher,
    assembler: ContextAssembler,
    store: Arc<dyn ConversationStore>,
    backend: Arc<dyn GenerationBackend>,
}

impl ChatEngine {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        profiles: Arc<ProfileRepository>,
        store: Arc<dyn ConversationStore>,
        backend: Arc<dyn GenerationBackend>,
        search_k: usize,
        recent_limit: usize,
    ) -> Self {
        let identity = Arc::new(IdentityCache::new(provider.clone(), profiles.clone()));
        let matcher = CharacterMatcher::new(provider, profiles.clone());
        let assembler =
            ContextAssembler::new(identity.clone(), store.clone(), search_k, recent_limit);
        Self {
            profiles,
            identity,
            matcher,
            assembler,
            store,
            backend,
        }
    }

    /// Run one chat turn end to end.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatReply> {
        let persona = match request.persona {
            Some(name) => name,
            None => self.matcher.match_persona(&request.user_text).await?,
        };

        let payload = self
            .assembler
            .build_prompt(&persona, &request.conversation_id, &request.user_text)
            .await?;

        let sampling = request.sampling.unwrap_or_default();
        let identity = match self.backend.capability() {
            ModelCapability::Conditionable => Some(payload.identity.as_slice()),
            ModelCapability::Plain => None,
        };
        let raw = self
            .backend
            .generate(&payload.text, identity, &sampling)
            .await?;

        let text = clean(&raw, &persona);
        info!(persona = %persona, conversation = %request.conversation_id, "turn generated");

        // The reply already exists; a failed append degrades retrieval for
        // later turns but must not fail this one.
        if let Err(e) = self
            .store
            .append(&request.conversation_id, &request.user_text, &text)
            .await
        {
            warn!(
                conversation = %request.conversation_id,
                error = %e,
                "failed to record exchange"
            );
        }

        Ok(ChatReply { persona, text })
    }

    /// Create or overwrite a persona profile and drop its cached identity
    /// so the next resolve recomputes from the new text.
    pub async fn register_profile(&self, name: &str, text: &str) -> Result<()> {
        self.profiles.put_profile(name, text).await?;
        self.identity.invalidate(name);
        Ok(())
    }

    pub fn identity_cache(&self) -> &Arc<IdentityCache> {
        &self.identity
    }
}
