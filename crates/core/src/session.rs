//! Session types.
//!
//! A session is the scope grouping entries, summaries, and lineage for one
//! continuous interaction. Sessions are created lazily on first write and
//! never deleted — a restart supersedes the old session with a new id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the session interacts with the assistant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Conversational back-and-forth (default).
    #[default]
    Chat,
    /// Autonomous multi-step task execution.
    Agent,
    /// Voice-driven interaction.
    Voice,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Agent => "agent",
            Self::Voice => "voice",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "agent" => Ok(Self::Agent),
            "voice" => Ok(Self::Voice),
            other => Err(format!("unknown session mode: {other}")),
        }
    }
}

/// A durable interaction session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub mode: SessionMode,
    /// The model the session was opened against.
    pub active_model: String,
    pub created_at: DateTime<Utc>,
    /// Monotonically non-decreasing; bumped on every write to the session.
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    pub fn new(mode: SessionMode, active_model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            mode,
            active_model: active_model.into(),
            created_at: now,
            last_active_at: now,
        }
    }

    /// Advance `last_active_at`, never moving it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_active_at {
            self.last_active_at = now;
        }
    }
}
