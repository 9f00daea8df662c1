// src/context.rs

//! Assembles the retrieval-augmented prompt for one turn: identity vector,
//! relevant history, scene framing, and the new user message.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::identity::{IdentityCache, IdentityVector};
use crate::memory::{ConversationStore, Exchange};
use crate::postprocess::{speaking_marker, TURN_DELIMITER};

/// What generation receives: the text prompt plus the identity vector as
/// an out-of-band conditioning signal. The vector is never interpolated
/// into the text.
#[derive(Clone)]
pub struct PromptPayload {
    pub text: String,
    pub identity: IdentityVector,
}

pub struct ContextAssembler {
    identity: Arc<IdentityCache>,
    store: Arc<dyn ConversationStore>,
    search_k: usize,
    recent_limit: usize,
}

impl ContextAssembler {
    pub fn new(
        identity: Arc<IdentityCache>,
        store: Arc<dyn ConversationStore>,
        search_k: usize,
        recent_limit: usize,
    ) -> Self {
        Self {
            identity,
            store,
            search_k,
            recent_limit,
        }
    }

    /// Build the prompt for one turn. Identity resolution is mandatory: if
    /// it fails, the whole turn fails. History retrieval is relevance-first
    /// with an explicit recency fallback when the vector store is down.
    pub async fn build_prompt(
        &self,
        persona: &str,
        conversation_id: &str,
        user_text: &str,
    ) -> Result<PromptPayload> {
        let identity = self.identity.resolve(persona).await?;
        let history = self.retrieve_history(conversation_id, user_text).await?;

        debug!(
            persona,
            conversation = %conversation_id,
            exchanges = history.len(),
            "prompt assembled"
        );

        Ok(PromptPayload {
            text: render_prompt(persona, &history, user_text),
            identity,
        })
    }

    async fn retrieve_history(
        &self,
        conversation_id: &str,
        user_text: &str,
    ) -> Result<Vec<Exchange>> {
        // An empty prompt has nothing meaningful to search with.
        if user_text.trim().is_empty() {
            return self
                .store
                .recent_history(conversation_id, self.recent_limit)
                .await;
        }

        match self
            .store
            .search_relevant(conversation_id, user_text, self.search_k)
            .await
        {
            Ok(mut relevant) => {
                // Relevance selects which exchanges matter; the dialogue
                // itself still reads in chronological order.
                relevant.sort_by_key(|e| e.timestamp);
                Ok(relevant)
            }
            Err(EngineError::MemoryStoreUnavailable(reason)) => {
                warn!(
                    conversation = %conversation_id,
                    %reason,
                    "semantic search unavailable, falling back to recent history"
                );
                self.store
                    .recent_history(conversation_id, self.recent_limit)
                    .await
            }
            Err(e) => Err(e),
        }
    }
}

/// Fixed scene-setting instruction plus the dialogue so far, ending with
/// the persona's open speaking marker for the model to complete.
fn render_prompt(persona: &str, history: &[Exchange], user_text: &str) -> String {
    let mut dialogue = String::new();
    for exchange in history {
        dialogue.push_str(&format!(
            "Man (speaking): {}{TURN_DELIMITER}",
            exchange.user_prompt
        ));
        dialogue.push_str(&format!(
            "{} {}{TURN_DELIMITER}",
            speaking_marker(persona),
            exchange.response
        ));
    }
    dialogue.push_str(&format!("Man (speaking): {user_text}{TURN_DELIMITER}"));

    format!(
        "I want you to act like {persona}. I want you to respond and answer like {persona}, \
using the tone, manner and vocabulary {persona} would use. You must know all of the knowledge of {persona}.

The status of you is as follows:
Location: Coffee Shop - Afternoon
Status: {persona} is casually chatting with a human. {persona} fully trusts the human who engage in \
conversation and shares everything {persona} knows without reservation.

The interactions are as follows:

{dialogue}{marker} ",
        marker = speaking_marker(persona)
    )
}
