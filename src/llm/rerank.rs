use std::sync::Arc;

use anyhow::Result;

use crate::llm::{sanitize_for_prompt, CompletionModel};
use crate::models::{Candidate, RankedResult};

/// Characters of each candidate shown to the judge.
const MAX_DOC_CHARS: usize = 1_500;

/// Re-ranks direct-search candidates with batched LLM relevance judgments.
///
/// Each batch of `batch_size` candidates is shown to the judge as a numbered
/// list; the judge names the relevant documents with a 1-10 relevance score.
/// Selections from every batch are merged, stably sorted by judged relevance
/// and trimmed to the requested top-N.
#[derive(Clone)]
pub struct LlmReranker {
    llm: Arc<dyn CompletionModel>,
    batch_size: usize,
}

impl LlmReranker {
    pub fn new(llm: Arc<dyn CompletionModel>, batch_size: usize) -> Self {
        Self {
            llm,
            batch_size: batch_size.max(1),
        }
    }

    /// Re-rank `candidates` for `query`, keeping at most `top_n`.
    ///
    /// Never fails: if a judgment call errors, the original candidates are
    /// returned in raw similarity order and the result is marked degraded.
    pub async fn rerank(&self, query: &str, candidates: Vec<Candidate>, top_n: usize) -> RankedResult {
        if candidates.is_empty() || top_n == 0 {
            return RankedResult::default();
        }

        match self.judge_all(query, &candidates).await {
            Ok(selected) if !selected.is_empty() => {
                tracing::info!(
                    "Re-ranking kept {} of {} candidates",
                    selected.len().min(top_n),
                    candidates.len()
                );
                let mut selected = selected;
                selected.truncate(top_n);
                RankedResult {
                    candidates: selected,
                    degraded: false,
                }
            }
            Ok(_) => {
                tracing::info!("Re-ranking expressed no preference; keeping similarity order");
                RankedResult {
                    candidates: by_similarity(candidates, top_n),
                    degraded: false,
                }
            }
            Err(e) => {
                tracing::warn!("Re-ranking degraded, falling back to similarity order: {e:#}");
                RankedResult {
                    candidates: by_similarity(candidates, top_n),
                    degraded: true,
                }
            }
        }
    }

    /// Judge every batch and merge the selections, best first.
    async fn judge_all(&self, query: &str, candidates: &[Candidate]) -> Result<Vec<Candidate>> {
        // (position in input, judged candidate)
        let mut selected: Vec<(usize, Candidate)> = Vec::new();

        for (batch_no, batch) in candidates.chunks(self.batch_size).enumerate() {
            let prompt = build_choice_prompt(query, batch);
            tracing::debug!("Re-rank judgment call for batch {batch_no} ({} docs)", batch.len());
            let reply = self.llm.complete(&prompt).await?;

            for (doc_no, relevance) in parse_choices(&reply, batch.len()) {
                let mut candidate = batch[doc_no - 1].clone();
                candidate.relevance = Some(relevance);
                selected.push((batch_no * self.batch_size + doc_no - 1, candidate));
            }
        }

        // Equal judgments keep similarity-search order.
        selected.sort_by(|(pos_a, a), (pos_b, b)| {
            b.relevance
                .unwrap_or(0.0)
                .partial_cmp(&a.relevance.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(pos_a.cmp(pos_b))
        });
        Ok(selected.into_iter().map(|(_, c)| c).collect())
    }
}

fn by_similarity(mut candidates: Vec<Candidate>, top_n: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(top_n);
    candidates
}

/// Build the numbered-list judgment prompt for one batch.
fn build_choice_prompt(query: &str, batch: &[Candidate]) -> String {
    let mut docs = String::new();
    for (i, candidate) in batch.iter().enumerate() {
        let text = sanitize_for_prompt(crate::llm::truncate_to_char_boundary(
            &candidate.chunk.text,
            MAX_DOC_CHARS,
        ));
        docs.push_str(&format!(
            "Document {}:\nTitle: {}\n{}\n\n",
            i + 1,
            candidate.chunk.metadata.title,
            text
        ));
    }

    format!(
        "A list of documents is shown below. Each document has a number next to it. \
         A question is also provided.\n\
         Respond with the numbers of the documents you should consult to answer the question, \
         in order of relevance, as well as the relevance score. The relevance score is a number \
         from 1-10 based on how relevant you think the document is to the question.\n\
         Do not include any documents that are not relevant to the question.\n\
         Example format:\n\
         Document 1:\n<text of document 1>\n\n\
         Document 2:\n<text of document 2>\n\n\
         ...\n\n\
         Document 10:\n<text of document 10>\n\n\
         Question: <question>\n\
         Answer:\n\
         Doc: 9, Relevance: 7\n\
         Doc: 3, Relevance: 4\n\
         Doc: 7, Relevance: 3\n\n\
         Let's try this now:\n\n\
         {docs}\
         Question: {query}\n\
         Answer:\n",
        query = sanitize_for_prompt(query)
    )
}

/// Parse `Doc: <n>, Relevance: <score>` lines into 1-based document numbers
/// with scores. Out-of-range numbers and malformed lines are skipped; a
/// document named twice keeps its first judgment.
fn parse_choices(reply: &str, batch_len: usize) -> Vec<(usize, f32)> {
    let mut choices: Vec<(usize, f32)> = Vec::new();

    for line in reply.lines() {
        let lower = line.to_lowercase();
        let Some(doc_pos) = lower.find("doc") else {
            continue;
        };
        let Some(rel_pos) = lower.find("relevance") else {
            continue;
        };
        if rel_pos < doc_pos {
            continue;
        }

        let doc_no = leading_number(&lower[doc_pos + 3..rel_pos]);
        let relevance = leading_number(&lower[rel_pos + "relevance".len()..]);

        let (Some(doc_no), Some(relevance)) = (doc_no, relevance) else {
            continue;
        };
        if doc_no < 1.0 || doc_no.fract() != 0.0 {
            continue;
        }
        let doc_no = doc_no as usize;
        if doc_no > batch_len || choices.iter().any(|(n, _)| *n == doc_no) {
            continue;
        }
        choices.push((doc_no, relevance.clamp(0.0, 10.0)));
    }

    choices
}

/// First number in `s`, skipping any leading non-numeric characters such as
/// `ument 3` or `: 7`.
fn leading_number(s: &str) -> Option<f32> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let rest = &s[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    rest[..end].trim_end_matches('.').parse().ok()
}
