// src/memory/mod.rs

//! Append-only conversation memory with similarity search scoped to a
//! single conversation. Two backends live behind one trait: qdrant over
//! REST for deployments, an in-process store for tests and embedded use.

pub mod ephemeral;
pub mod qdrant;
pub mod traits;
pub mod types;

pub use ephemeral::EphemeralConversationStore;
pub use qdrant::QdrantConversationStore;
pub use traits::ConversationStore;
pub use types::Exchange;
