// src/lib.rs

//! Persona conditioning and retrieval-augmented context engine.
//!
//! Resolves a character name to a cached identity embedding, disambiguates
//! the intended persona when none is given, retrieves the most relevant
//! prior exchanges for the current turn, and cleans raw model output into
//! a single persona reply. The HTTP surface, auth, and the model itself
//! live outside this crate and talk to it through [`chat::ChatEngine`].

pub mod chat;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod identity;
pub mod matcher;
pub mod memory;
pub mod postprocess;
pub mod profile;

pub use chat::{ChatEngine, ChatReply, ChatRequest};
pub use config::{EngineConfig, SamplingConfig, CONFIG};
pub use context::{ContextAssembler, PromptPayload};
pub use embedding::{EmbeddingProvider, OpenAiEmbeddingClient};
pub use error::{EngineError, Result};
pub use generation::{GenerationBackend, ModelCapability};
pub use identity::IdentityCache;
pub use matcher::CharacterMatcher;
pub use memory::{ConversationStore, EphemeralConversationStore, Exchange, QdrantConversationStore};
pub use profile::{PersonaProfile, ProfileRepository};
