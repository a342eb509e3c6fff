use crate::agent::AgentController;
use crate::models::{ChatMessage, Response};

/// History of one conversation, fed to the controller on every turn.
pub struct ChatSession {
    controller: AgentController,
    history: Vec<ChatMessage>,
    max_history: usize,
}

impl ChatSession {
    pub fn new(controller: AgentController, max_history: usize) -> Self {
        Self {
            controller,
            history: Vec::new(),
            max_history,
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub async fn handle_message(&mut self, text: &str) -> Response {
        let response = self.controller.handle_turn(&self.history, text).await;

        self.history.push(ChatMessage::user(text.trim()));
        self.history.push(ChatMessage::assistant(response.answer_text.clone()));
        if self.history.len() > self.max_history {
            let excess = self.history.len() - self.max_history;
            self.history.drain(..excess);
        }

        response
    }
}
