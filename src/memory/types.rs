// src/memory/types.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One user-prompt/persona-response pair within a conversation.
/// Created right after a response is generated; never mutated after that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub id: String,
    pub conversation_id: String,
    pub user_prompt: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

impl Exchange {
    pub fn new(
        conversation_id: impl Into<String>,
        user_prompt: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            user_prompt: user_prompt.into(),
            response: response.into(),
            timestamp: Utc::now(),
        }
    }

    /// The text that gets embedded: both sides of the exchange combined.
    pub fn combined_text(&self) -> String {
        format!("User: {}\nBot: {}", self.user_prompt, self.response)
    }
}
