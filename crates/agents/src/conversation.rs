use {dashmap::DashMap, relaydesk_common::ChatId};

use crate::model::Turn;

/// Responder context, one buffer per chat.
///
/// Buffers live in memory only; a restart starts every chat with a fresh
/// context while the durable dialogue log is kept by the stores.
pub struct ConversationBuffers {
    turns: DashMap<ChatId, Vec<Turn>>,
    system_prompt: Option<String>,
    max_turns: usize,
}

impl ConversationBuffers {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: DashMap::new(),
            system_prompt: None,
            // Keep at least one full exchange.
            max_turns: max_turns.max(2),
        }
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt.filter(|p| !p.trim().is_empty());
        self
    }

    /// The turns to send for `chat_id`, system prompt first.
    pub fn snapshot(&self, chat_id: &ChatId) -> Vec<Turn> {
        let mut out: Vec<Turn> = self.system_prompt.iter().map(Turn::system).collect();
        if let Some(turns) = self.turns.get(chat_id) {
            out.extend(turns.iter().cloned());
        }
        out
    }

    /// Record a completed exchange, dropping the oldest exchanges past the cap.
    pub fn record_exchange(&self, chat_id: &ChatId, user_text: &str, reply: &str) {
        let mut turns = self.turns.entry(chat_id.clone()).or_default();
        turns.push(Turn::user(user_text));
        turns.push(Turn::assistant(reply));

        if turns.len() > self.max_turns {
            let mut excess = turns.len() - self.max_turns;
            // Drop whole user/assistant pairs.
            excess += excess % 2;
            turns.drain(..excess);
        }
    }

    pub fn clear(&self, chat_id: &ChatId) {
        self.turns.remove(chat_id);
    }

    pub fn len(&self, chat_id: &ChatId) -> usize {
        self.turns.get(chat_id).map_or(0, |t| t.len())
    }
}
