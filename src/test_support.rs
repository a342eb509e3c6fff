//! Scripted collaborators shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::llm::{CompletionModel, Embedder};
use crate::models::{Candidate, Chunk, ChunkMetadata};

type Handler = dyn Fn(&str) -> Result<String> + Send + Sync;

/// Completion model answering through a closure and recording every prompt.
pub struct ScriptedLlm {
    handler: Box<Handler>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(handler: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(reply: &'static str) -> Arc<Self> {
        Self::new(move |_| Ok(reply.to_string()))
    }

    pub fn failing() -> Arc<Self> {
        Self::new(|_| Err(anyhow::anyhow!("judge unreachable")))
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl CompletionModel for ScriptedLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        (self.handler)(prompt)
    }
}

/// Completion model replaying a fixed sequence of replies, then repeating
/// the last one.
pub struct SequenceLlm {
    replies: Vec<String>,
    next: AtomicUsize,
}

impl SequenceLlm {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: replies.iter().map(|r| r.to_string()).collect(),
            next: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.next.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionModel for SequenceLlm {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        let i = self.next.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .get(i)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or_default();
        Ok(reply)
    }
}

/// Deterministic bag-of-words embedder: each lowercase word is hashed into
/// one of `DIM` buckets.
pub struct HashEmbedder;

const DIM: usize = 64;

pub fn hash_embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        let word = word.strip_suffix('s').unwrap_or(&word);
        let mut h: u64 = 0xcbf29ce484222325;
        for b in word.bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        v[(h % DIM as u64) as usize] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_embed(t)).collect())
    }
}

/// Embedder whose service refuses every connection.
pub struct DownEmbedder;

#[async_trait]
impl Embedder for DownEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(anyhow::anyhow!("connection refused"))
    }
}

/// Embedder whose requests never complete.
pub struct StalledEmbedder;

#[async_trait]
impl Embedder for StalledEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

pub fn chunk(id: &str, text: &str) -> Chunk {
    Chunk {
        id: id.to_string(),
        document_id: id.split('-').next().unwrap_or(id).to_string(),
        text: text.to_string(),
        metadata: ChunkMetadata {
            source: format!("/blog/{id}"),
            title: format!("Title {id}"),
            url: format!("https://example.com/{id}"),
            date: "2024-01-01".to_string(),
        },
    }
}

/// Candidates `c0..cN` with strictly decreasing similarity.
pub fn candidates(n: usize) -> Vec<Candidate> {
    (0..n)
        .map(|i| {
            Candidate::new(
                chunk(&format!("c{i}"), &format!("text {i}")),
                1.0 - i as f32 * 0.05,
            )
        })
        .collect()
}
