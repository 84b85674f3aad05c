//! Append-only conversation log.

use chrono::{DateTime, Utc};

/// Who said a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Grows for the life of the process; cleared only by restart.
#[derive(Debug, Default)]
pub struct ConversationLog {
    entries: Vec<LogEntry>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, text: impl Into<String>) {
        self.entries.push(LogEntry {
            role,
            text: text.into(),
            at: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_keep_arrival_order() {
        let mut log = ConversationLog::new();
        log.push(Role::User, "do you have a two bhk in gurgaon");
        log.push(Role::Assistant, "yes, near the golf course road");
        log.push(Role::User, "what about the budget");
        let roles: Vec<Role> = log.entries().iter().map(|e| e.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(log.len(), 3);
    }
}
