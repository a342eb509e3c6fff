//! The agent controller: one conversational turn from user message to
//! [`Response`].
//!
//! Each turn runs a bounded ReAct loop. The model picks a tool (or answers),
//! the tool's fragment is fed back as an observation, and when the model
//! answers, the best-scoring source seen during the turn becomes the
//! citation.

pub mod react;
pub mod session;

use std::sync::Arc;

use crate::error::{ErrorKind, PipelineError, Result};
use crate::llm::CompletionModel;
use crate::models::{Candidate, ChatMessage, Response, SourceMetadata};
use crate::tools::{Tool, ToolRegistry};

use react::{Reply, ScratchpadStep};

pub use session::ChatSession;

pub const EMPTY_MESSAGE_REPLY: &str =
    "Please type a question about the blog posts and I'll do my best to answer it.";
pub const RETRIEVAL_UNAVAILABLE_REPLY: &str = "I'm sorry, I was unable to retrieve information to answer your question right now. Please try again later.";
pub const INTERNAL_ERROR_REPLY: &str = "An error occurred while processing your request.";
pub const EXHAUSTED_REPLY: &str =
    "I could not reach a complete answer to your question. Please try rephrasing it.";
/// Stands in for a final answer the model left blank.
pub const NO_ANSWER_REPLY: &str =
    "I don't have an answer to that based on the blog posts.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Received,
    ToolSelection,
    ToolExecution,
    Synthesis,
    Done,
}

/// Everything accumulated while a turn is in flight.
#[derive(Default)]
struct Turn {
    scratchpad: Vec<ScratchpadStep>,
    sources: Vec<Candidate>,
    last_fragment: Option<String>,
    degraded: bool,
}

impl Turn {
    fn enter(&self, state: TurnState) {
        tracing::debug!(step = self.scratchpad.len(), "Turn state: {state:?}");
    }
}

#[derive(Clone)]
pub struct AgentController {
    tools: ToolRegistry,
    llm: Arc<dyn CompletionModel>,
    max_steps: usize,
}

impl AgentController {
    pub fn new(tools: ToolRegistry, llm: Arc<dyn CompletionModel>, max_steps: usize) -> Self {
        Self {
            tools,
            llm,
            max_steps: max_steps.max(1),
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Answer `message` given the prior `history`. Never fails: every error
    /// is turned into a polite reply with its [`ErrorKind`] recorded.
    pub async fn handle_turn(&self, history: &[ChatMessage], message: &str) -> Response {
        let message = message.trim();
        if message.is_empty() {
            return Response::answer(EMPTY_MESSAGE_REPLY, None);
        }

        match self.run(history, message).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Turn failed: {e}");
                match e.kind() {
                    ErrorKind::RetrievalUnavailable => Response::failure(
                        RETRIEVAL_UNAVAILABLE_REPLY,
                        ErrorKind::RetrievalUnavailable,
                    ),
                    _ => Response::failure(INTERNAL_ERROR_REPLY, ErrorKind::Internal),
                }
            }
        }
    }

    async fn run(&self, history: &[ChatMessage], message: &str) -> Result<Response> {
        let mut turn = Turn::default();
        turn.enter(TurnState::Received);

        for step in 1..=self.max_steps {
            turn.enter(TurnState::ToolSelection);
            let prompt = react::build_prompt(&Tool::ALL, history, message, &turn.scratchpad);
            tracing::info!("Reasoning step {step}/{}: calling LLM", self.max_steps);
            let reply = self
                .llm
                .complete(&prompt)
                .await
                .map_err(|e| PipelineError::Completion(format!("{e:#}")))?;

            match react::parse_reply(&reply) {
                Reply::Answer { text, .. } => {
                    turn.enter(TurnState::Synthesis);
                    let response = self.synthesize(turn, text);
                    tracing::debug!("Turn state: {:?}", TurnState::Done);
                    return Ok(response);
                }
                Reply::Action {
                    thought,
                    tool,
                    input,
                } => {
                    let action_input = input.unwrap_or_else(|| message.to_string());
                    let observation = match Tool::from_name(&tool) {
                        Some(selected) => {
                            turn.enter(TurnState::ToolExecution);
                            let output = self.tools.invoke(selected, &action_input).await?;
                            turn.sources.extend(output.sources);
                            turn.degraded |= output.degraded;
                            turn.last_fragment = Some(output.text.clone());
                            output.text
                        }
                        None => {
                            tracing::warn!("LLM selected unknown tool {tool:?}");
                            let names: Vec<&str> = Tool::ALL.iter().map(|t| t.name()).collect();
                            format!(
                                "Error: {tool} is not a valid tool. Valid tools are: {}.",
                                names.join(", ")
                            )
                        }
                    };
                    turn.scratchpad.push(ScratchpadStep {
                        thought,
                        action: tool,
                        action_input: serde_json::json!({ "input": action_input }).to_string(),
                        observation,
                    });
                }
            }
        }

        tracing::warn!(
            "Reasoning step bound ({}) reached without a final answer",
            self.max_steps
        );
        Ok(self.exhausted(turn))
    }

    fn synthesize(&self, turn: Turn, text: String) -> Response {
        let text = if text.trim().is_empty() {
            turn.last_fragment
                .clone()
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| NO_ANSWER_REPLY.to_string())
        } else {
            text
        };
        let mut response = Response::answer(text, primary_source(&turn.sources));
        response.degraded_ranking = turn.degraded;
        response
    }

    fn exhausted(&self, turn: Turn) -> Response {
        let text = turn
            .last_fragment
            .clone()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| EXHAUSTED_REPLY.to_string());
        Response {
            answer_text: text,
            primary_source: primary_source(&turn.sources),
            incomplete: true,
            error_kind: Some(ErrorKind::ReasoningExhausted),
            degraded_ranking: turn.degraded,
        }
    }
}

/// Citation for the best-scoring candidate; the first one wins ties.
/// Absent when nothing was retrieved or its metadata is incomplete.
fn primary_source(sources: &[Candidate]) -> Option<SourceMetadata> {
    let mut best: Option<&Candidate> = None;
    for candidate in sources {
        if best.map_or(true, |b| candidate.rank_score() > b.rank_score()) {
            best = Some(candidate);
        }
    }
    best.and_then(|c| SourceMetadata::from_metadata(&c.chunk.metadata))
}
