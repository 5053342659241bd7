//! Context entry types.
//!
//! A `ContextEntry` is one unit of context (file snippet, conversation turn,
//! tool output) eligible for inclusion in a model prompt. The entry kind is a
//! closed set: it is derived from the metadata variant, so an entry can never
//! carry a kind its metadata does not match. Unknown kinds only arise at
//! parse boundaries (JSON import, string APIs) and are rejected there.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The closed set of recognized context kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    File,
    Conversation,
    ToolOutput,
}

impl ContextKind {
    /// Stable string form, used in storage columns and search filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Conversation => "conversation",
            Self::ToolOutput => "tool_output",
        }
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Self::File),
            "conversation" => Ok(Self::Conversation),
            "tool_output" => Ok(Self::ToolOutput),
            other => Err(StoreError::InvalidType(other.to_string())),
        }
    }
}

/// Typed metadata, tagged by entry kind.
///
/// Each variant carries the structured fields that kind actually has, plus an
/// opaque `extra` map for genuinely unstructured fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryMetadata {
    File {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        extra: BTreeMap<String, String>,
    },
    Conversation {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        turn: Option<u32>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        extra: BTreeMap<String, String>,
    },
    ToolOutput {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        extra: BTreeMap<String, String>,
    },
}

impl EntryMetadata {
    /// The kind this metadata belongs to.
    pub fn kind(&self) -> ContextKind {
        match self {
            Self::File { .. } => ContextKind::File,
            Self::Conversation { .. } => ContextKind::Conversation,
            Self::ToolOutput { .. } => ContextKind::ToolOutput,
        }
    }

    /// Empty metadata of the given kind.
    pub fn empty(kind: ContextKind) -> Self {
        match kind {
            ContextKind::File => Self::File {
                path: None,
                language: None,
                extra: BTreeMap::new(),
            },
            ContextKind::Conversation => Self::Conversation {
                role: None,
                turn: None,
                extra: BTreeMap::new(),
            },
            ContextKind::ToolOutput => Self::ToolOutput {
                tool: None,
                exit_code: None,
                extra: BTreeMap::new(),
            },
        }
    }
}

/// A single unit of context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Unique id within a store or session.
    pub id: String,

    /// The raw text content.
    pub content: String,

    /// Typed metadata; also determines the entry kind.
    pub metadata: EntryMetadata,

    /// Caller-assigned ordering weight for the working tier. Higher survives
    /// eviction longer.
    #[serde(default)]
    pub priority: i64,

    /// Caller-assigned durability weight in [0, 1], used by ledger scoring.
    #[serde(default)]
    pub importance: f64,

    /// Opaque token estimate supplied by an external estimator. Never
    /// recomputed internally.
    #[serde(default)]
    pub token_estimate: u64,

    /// Creation timestamp. Preserved across updates.
    pub created_at: DateTime<Utc>,
}

impl ContextEntry {
    /// Create an entry with empty metadata of the given kind and defaults
    /// for the scoring fields.
    pub fn new(id: impl Into<String>, kind: ContextKind, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: EntryMetadata::empty(kind),
            priority: 0,
            importance: 0.0,
            token_estimate: 0,
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> ContextKind {
        self.metadata.kind()
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }

    pub fn with_token_estimate(mut self, tokens: u64) -> Self {
        self.token_estimate = tokens;
        self
    }

    pub fn with_metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A partial update for an existing entry.
///
/// `id` and `created_at` are never touched by an update; absent fields leave
/// the current value in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EntryMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_estimate: Option<u64>,
}

impl EntryPatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }
}
