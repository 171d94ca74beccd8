//! Question answering over French national collective agreements (CCN).
//!
//! A query is classified (deterministic pre-detection first, then an LLM),
//! scoped to one agreement, answered from that agreement's passages ranked by
//! legal authority, and synthesized into a single answer.

pub mod config;
pub mod error;
pub mod llm;
pub mod rag;
pub mod rag_engine;
pub mod reranking;
pub mod search;
pub mod text;
pub mod types;

// Re-export primary types for convenience
pub use config::EngineConfig;
pub use error::EngineError;
pub use rag_engine::{build_completion_provider, build_passage_store, CcnEngine, EngineResponse};
pub use types::{
    AgreementId, Classification, Intent, Passage, Query, RankedContext, RankedPassage,
    ResponseLength, Role, Turn,
};

// Re-export LLM and store seams
pub use llm::{ApiProvider, CompletionError, CompletionProvider, ProviderInfo, ResponseFormat};
pub use search::{PassageStore, StoreError};

// Re-export common types
pub use anyhow::{Error, Result};
pub use uuid::Uuid;
