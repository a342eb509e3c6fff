//! Narrow interfaces to the external model services, plus the HTTP clients
//! and the LLM-judged re-ranker built on them.

pub mod completion;
pub mod embeddings;
pub mod rerank;

use anyhow::Result;
use async_trait::async_trait;

/// Text-to-vector service.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed each text; the output is parallel with `texts`.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Text-completion service. Sampling parameters are fixed by the
/// implementation's configuration, never per request.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Chat-template control tokens that must never reach a prompt from user
/// input or retrieved text.
const CONTROL_TOKENS: &[&str] = &[
    "<|im_start|>",
    "<|im_end|>",
    "<|endoftext|>",
    "<|eot_id|>",
    "<|begin_of_text|>",
    "<|start_header_id|>",
    "<|end_header_id|>",
];

/// Strip chat-template control tokens from untrusted text.
pub fn sanitize_for_prompt(text: &str) -> String {
    let mut out = text.to_string();
    for token in CONTROL_TOKENS {
        if out.contains(token) {
            out = out.replace(token, "");
        }
    }
    out
}

/// Truncate to at most `max_bytes`, never splitting a UTF-8 character.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
