// src/generation.rs

//! The generation capability seam. The engine treats the model as an
//! opaque text completer that may or may not accept an identity vector as
//! an auxiliary conditioning input.

use async_trait::async_trait;

use crate::config::SamplingConfig;
use crate::error::Result;

/// Whether a backend accepts identity-vector conditioning. Resolved once
/// when the backend is constructed, never probed per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelCapability {
    /// Accepts an identity vector alongside the text prompt.
    Conditionable,
    /// Text-prompt only; the identity vector is withheld.
    Plain,
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate raw text from the prompt. `identity` is `Some` only for
    /// `Conditionable` backends; it is an out-of-band signal, never
    /// interpolated into the prompt text.
    async fn generate(
        &self,
        prompt: &str,
        identity: Option<&[f32]>,
        sampling: &SamplingConfig,
    ) -> Result<String>;

    fn capability(&self) -> ModelCapability;
}
