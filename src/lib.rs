pub mod chat;
pub mod completion;
pub mod config;
pub mod constants;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod scan;

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use error::{CompletionError, CompletionErrorKind, ExchangeError, ScanError, ScanErrorKind};
pub use pipeline::{ExchangeOutcome, ExchangePipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
    timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Bounded conversation context. Once `max_len` is exceeded the oldest
/// messages are evicted first.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    messages: VecDeque<Message>,
    max_len: usize,
}

impl ConversationHistory {
    pub fn new(max_len: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(max_len),
            max_len,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push_back(message);
        while self.messages.len() > self.max_len {
            self.messages.pop_front();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(constants::DEFAULT_MAX_HISTORY)
    }
}
