//! ReAct prompt construction and reply parsing.
//!
//! The model is asked to answer in the Thought / Action / Action Input
//! format to call a tool, or Thought / Answer to finish. Each tool call is
//! recorded on the scratchpad with its observation and replayed in the next
//! prompt.

use crate::llm::sanitize_for_prompt;
use crate::models::ChatMessage;
use crate::tools::Tool;

/// One completed tool call, as replayed to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ScratchpadStep {
    pub thought: String,
    pub action: String,
    pub action_input: String,
    pub observation: String,
}

/// A parsed model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Action {
        thought: String,
        tool: String,
        /// `None` when the model gave no usable input
        input: Option<String>,
    },
    Answer {
        thought: String,
        text: String,
    },
}

pub fn build_prompt(
    tools: &[Tool],
    history: &[ChatMessage],
    message: &str,
    scratchpad: &[ScratchpadStep],
) -> String {
    let mut prompt = String::from(
        "You are a helpful assistant answering questions about a collection of blog posts.\n\
         You are responsible for using the tools provided to retrieve information from the posts \
         before answering. Do not rely on prior knowledge.\n\n\
         ## Tools\n\
         You have access to the following tools:\n",
    );

    for tool in tools {
        prompt.push_str(&format!(
            "> Tool Name: {}\nTool Description: {}\nTool Args: {{\"input\": \"string\"}}\n\n",
            tool.name(),
            tool.description()
        ));
    }

    let names = tools.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ");
    prompt.push_str(&format!(
        "## Output Format\n\
         To answer the question, please use the following format.\n\n\
         Thought: I need to use a tool to help me answer the question.\n\
         Action: tool name (one of {names})\n\
         Action Input: the input to the tool, in JSON format (e.g. {{\"input\": \"hello world\"}})\n\n\
         Please ALWAYS start with a Thought.\n\
         If this format is used, the tool result will be shown to you as:\n\n\
         Observation: tool response\n\n\
         You should keep repeating the above format until you have enough information \
         to answer the question without using any more tools. At that point, you MUST respond \
         in the following format:\n\n\
         Thought: I can answer without using any more tools.\n\
         Answer: [your answer here]\n\n\
         ## Current Conversation\n"
    ));

    for msg in history {
        let speaker = if msg.role == "assistant" { "Assistant" } else { "User" };
        prompt.push_str(&format!("{speaker}: {}\n", sanitize_for_prompt(&msg.content)));
    }
    prompt.push_str(&format!("User: {}\n", sanitize_for_prompt(message)));

    for step in scratchpad {
        prompt.push_str(&format!(
            "Thought: {}\nAction: {}\nAction Input: {}\nObservation: {}\n",
            step.thought,
            step.action,
            step.action_input,
            sanitize_for_prompt(&step.observation)
        ));
    }

    prompt
}

const MARKERS: [&str; 5] = ["Thought:", "Action:", "Action Input:", "Observation:", "Answer:"];

/// Text following `marker` up to the next marker or the end of the reply.
fn section<'a>(reply: &'a str, marker: &str) -> Option<&'a str> {
    let start = find_marker(reply, marker)? + marker.len();
    let rest = &reply[start..];
    let end = MARKERS
        .iter()
        .filter_map(|m| find_marker(rest, m))
        .min()
        .unwrap_or(rest.len());
    Some(rest[..end].trim())
}

/// Position of `marker` at the start of a line. "Action:" never matches the
/// "Action Input:" line.
fn find_marker(text: &str, marker: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with(marker) {
            return Some(offset + (line.len() - trimmed.len()));
        }
        offset += line.len();
    }
    None
}

pub fn parse_reply(reply: &str) -> Reply {
    let thought = section(reply, "Thought:").unwrap_or_default().to_string();
    let action_at = find_marker(reply, "Action:");
    let answer_at = find_marker(reply, "Answer:");

    match (action_at, answer_at) {
        (Some(action), answer) if answer.map_or(true, |a| action < a) => {
            let tool = section(reply, "Action:").unwrap_or_default().to_string();
            let input = section(reply, "Action Input:").and_then(parse_action_input);
            Reply::Action {
                thought,
                tool,
                input,
            }
        }
        (_, Some(_)) => Reply::Answer {
            thought,
            text: section(reply, "Answer:").unwrap_or_default().to_string(),
        },
        _ => Reply::Answer {
            thought: String::new(),
            text: reply.trim().to_string(),
        },
    }
}

/// Accepts `{"input": ...}`, `{"query": ...}`, a JSON string, or plain text.
fn parse_action_input(raw: &str) -> Option<String> {
    let raw = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let value = match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => ["input", "query"]
            .iter()
            .find_map(|key| map.get(*key).and_then(|v| v.as_str()).map(String::from))
            .or_else(|| {
                map.values()
                    .find_map(|v| v.as_str().map(String::from))
            }),
        Ok(serde_json::Value::String(s)) => Some(s),
        _ => Some(raw.to_string()),
    };

    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
