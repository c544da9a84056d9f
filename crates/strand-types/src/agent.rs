//! Conversation identifiers and subagent records

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one conversation (an ordered list of entries)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Lifecycle state of a subagent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Working,
    Completed,
    Error,
}

impl AgentStatus {
    /// Map a backend completion status string to a final status.
    ///
    /// Anything that is not recognisably an error counts as completed.
    pub fn from_completion(status: &str) -> Self {
        let status = status.trim().to_lowercase();
        match status.as_str() {
            "error" | "failed" | "failure" | "cancelled" | "canceled" | "aborted" => {
                AgentStatus::Error
            }
            s if s.starts_with("error") => AgentStatus::Error,
            _ => AgentStatus::Completed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AgentStatus::Working)
    }
}

/// A subagent spawned by the main agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Identifier issued by the backend for the task (the spawning call id)
    pub agent_id: String,
    /// Identifier used to re-attach to this agent later
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_id: Option<String>,
    pub status: AgentStatus,
    /// Conversation holding this agent's transcript
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub agent_type: String,
    #[serde(default)]
    pub description: String,
    /// Final summary reported on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl AgentRecord {
    /// A freshly spawned, working agent
    pub fn spawned(
        agent_id: impl Into<String>,
        conversation_id: ConversationId,
        agent_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            resume_id: None,
            status: AgentStatus::Working,
            conversation_id,
            agent_type: agent_type.into(),
            description: description.into(),
            summary: None,
        }
    }
}
