use serde::{Deserialize, Serialize};

use crate::error::ParleyError;

/// Who produced a logged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ParleyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(ParleyError::InvalidInput(format!("unknown role: {s}"))),
        }
    }
}

/// One immutable row of the `event_logs` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub session_id: String,
    pub role: Role,
    pub message: String,
}

impl EventLogEntry {
    pub fn new(session_id: impl Into<String>, role: Role, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            role,
            message: message.into(),
        }
    }
}
