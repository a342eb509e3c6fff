//! # blog-rag
//!
//! A retrieval-augmented chatbot over a collection of blog posts. Posts are
//! split into chunks, embedded and stored in a vector store; a ReAct-style
//! agent answers questions by choosing between two retrieval tools and cites
//! the best source it found.
//!
//! ## Architecture
//!
//! One conversational turn:
//!
//! ```text
//!     ┌──────────────┐
//!     │ User Message │
//!     └──────┬───────┘
//!            │
//!            ▼
//!  ┌───────────────────┐   Action    ┌────────────────────────────────┐
//!  │ Agent Controller  │────────────►│ vector_search                  │
//!  │ ReAct step (LLM)  │             │   top-K by cosine similarity   │
//!  │ ≤ max steps       │◄────────────│   LLM re-rank: batches of 5,   │
//!  └─────────┬─────────┘ Observation │   keep top 3                   │
//!            │                       │   answer from re-ranked chunks │
//!            │ Answer                ├────────────────────────────────┤
//!            ▼                       │ summary                        │
//!  ┌───────────────────┐             │   top-K by cosine similarity   │
//!  │ Response + best   │             │   tree summarize to 1 passage  │
//!  │ source citation   │             └────────────────────────────────┘
//!  └───────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration, validated at startup
//! - [`error`] - Pipeline error variants and the error kinds reported to the UI
//! - [`models`] - Shared data types: `Document`, `Chunk`, `Candidate`, `Response`
//! - [`chunking`] - Whitespace cleaning and sentence-window splitting
//! - [`llm::embeddings`] - Embeddings via Ollama or OpenAI-compatible APIs
//! - [`llm::completion`] - Non-streaming chat completions with fixed sampling parameters
//! - [`llm::rerank`] - Batched LLM relevance judgments with similarity fallback
//! - [`search::vector`] - `VectorStore` trait and the in-memory store with disk persistence
//! - [`search::qdrant`] - Qdrant-backed `VectorStore`
//! - [`search::index`] - Direct similarity search and tree summarization
//! - [`tools`] - The `vector_search` and `summary` tools
//! - [`agent`] - ReAct controller and the per-conversation `ChatSession`
//! - [`indexing`] - Index build: load, chunk, embed, upsert
//! - [`api`] - Axum HTTP handlers for chat and health
//! - [`state`] - Shared application state and pipeline wiring

pub mod agent;
pub mod api;
pub mod chunking;
pub mod config;
pub mod error;
pub mod indexing;
pub mod llm;
pub mod models;
pub mod search;
pub mod state;
pub mod tools;

#[cfg(test)]
pub(crate) mod test_support;
