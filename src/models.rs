use serde::{Deserialize, Serialize};

use crate::chunking::clean_text;
use crate::error::ErrorKind;

/// A crawled record as produced by content acquisition (one CSV row or JSON Lines object).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    #[serde(default)]
    pub source: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub date: String,
    pub content: String,
}

/// A cleaned blog post, ready to be split into chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub metadata: ChunkMetadata,
    pub content: String,
}

impl Document {
    /// Clean a raw record. `ordinal` names the document when the record
    /// carries neither a source path nor a URL.
    pub fn from_record(record: DocumentRecord, ordinal: usize) -> Self {
        let id = if !record.source.trim().is_empty() {
            record.source.trim().to_string()
        } else if !record.url.trim().is_empty() {
            record.url.trim().to_string()
        } else {
            format!("doc-{ordinal}")
        };

        Self {
            id,
            metadata: ChunkMetadata {
                source: record.source.trim().to_string(),
                title: clean_text(&record.title),
                url: record.url.trim().to_string(),
                date: record.date.trim().to_string(),
            },
            content: clean_text(&record.content),
        }
    }
}

/// Document-level metadata carried unchanged by every chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub title: String,
    pub url: String,
    pub date: String,
}

/// A retrievable slice of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `{document_id}-{chunk_index}`
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A chunk returned by a retrieval query, with its scores.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub chunk: Chunk,
    /// Cosine similarity to the query embedding
    pub similarity: f32,
    /// Judged relevance (1-10) assigned by the re-ranker
    pub relevance: Option<f32>,
}

impl Candidate {
    pub fn new(chunk: Chunk, similarity: f32) -> Self {
        Self {
            chunk,
            similarity,
            relevance: None,
        }
    }

    /// Score used to compare candidates across tool calls: judged relevance
    /// scaled to 0..1 when available, raw similarity otherwise.
    pub fn rank_score(&self) -> f32 {
        match self.relevance {
            Some(relevance) => relevance / 10.0,
            None => self.similarity,
        }
    }
}

/// Output of the re-ranker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedResult {
    /// Highest relevance first, at most top-N entries
    pub candidates: Vec<Candidate>,
    /// Set when the judgment pass failed and raw similarity order was used
    pub degraded: bool,
}

/// Citation surfaced to the UI host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub source: String,
    pub title: String,
    pub url: String,
    pub date: String,
}

impl SourceMetadata {
    /// All four fields or nothing: a citation is never partially surfaced.
    pub fn from_metadata(metadata: &ChunkMetadata) -> Option<Self> {
        let fields = [
            &metadata.source,
            &metadata.title,
            &metadata.url,
            &metadata.date,
        ];
        if fields.iter().any(|f| f.trim().is_empty()) {
            return None;
        }
        Some(Self {
            source: metadata.source.clone(),
            title: metadata.title.clone(),
            url: metadata.url.clone(),
            date: metadata.date.clone(),
        })
    }
}

/// The answer to one conversational turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub answer_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_source: Option<SourceMetadata>,
    /// The reasoning-step bound was hit and the answer is partial
    #[serde(default)]
    pub incomplete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// A re-rank pass fell back to raw similarity order
    #[serde(default)]
    pub degraded_ranking: bool,
}

impl Response {
    pub fn answer(text: impl Into<String>, primary_source: Option<SourceMetadata>) -> Self {
        Self {
            answer_text: text.into(),
            primary_source,
            incomplete: false,
            error_kind: None,
            degraded_ranking: false,
        }
    }

    pub fn failure(text: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            answer_text: text.into(),
            primary_source: None,
            incomplete: false,
            error_kind: Some(kind),
            degraded_ranking: false,
        }
    }

    /// Render the answer the way the chat front-end displays it.
    pub fn render(&self) -> String {
        match &self.primary_source {
            Some(source) => format!(
                "{} \n\nSource: \nTitle: {} \nURL: {} \nDate: {}",
                self.answer_text, source.title, source.url, source.date
            ),
            None => self.answer_text.clone(),
        }
    }
}

/// A single chat turn (user or assistant)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Chat request
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub history: Option<Vec<ChatMessage>>,
}

/// Chat response body: the structured answer plus its rendered text.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    #[serde(flatten)]
    pub response: Response,
    pub rendered: String,
}

impl From<Response> for ChatReply {
    fn from(response: Response) -> Self {
        let rendered = response.render();
        Self { response, rendered }
    }
}
