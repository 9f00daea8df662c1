// src/error.rs

//! Typed error surface for the engine. Every core operation returns one of
//! these variants; the boundary layer maps them to user-facing responses.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Requested persona has no profile. Fatal to the request.
    #[error("no profile found for persona '{0}'")]
    ProfileNotFound(String),

    /// Profile text is malformed (missing `# ` title marker or empty body).
    /// Fatal, operator-fixable.
    #[error("invalid profile format for '{name}': {reason}")]
    InvalidProfileFormat { name: String, reason: String },

    /// Identity embedding computation or persistence failed. Fatal to the
    /// request, retryable by the caller.
    #[error("failed to resolve identity for '{persona}': {reason}")]
    IdentityResolution { persona: String, reason: String },

    /// Disambiguation was requested against an empty profile corpus.
    #[error("no personas available for matching")]
    NoPersonasAvailable,

    /// Vector store unreachable. Recovered locally by the context assembler
    /// via the recency fallback; escalated only if that also fails.
    #[error("conversation memory store unavailable: {0}")]
    MemoryStoreUnavailable(String),

    /// Opaque failure from the generation capability, propagated unchanged.
    #[error("generation failed: {0}")]
    GenerationFailure(String),

    /// Embedding provider call failed outside the identity path.
    #[error("embedding provider error: {0}")]
    Embedding(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Collapse any error into the identity-resolution variant, keeping the
    /// persona attribution. Used when a cache population fails and the same
    /// failure must be fanned out to every waiter.
    pub fn into_identity_failure(self, persona: &str) -> EngineError {
        match self {
            e @ EngineError::IdentityResolution { .. } => e,
            other => EngineError::IdentityResolution {
                persona: persona.to_string(),
                reason: other.to_string(),
            },
        }
    }
}
