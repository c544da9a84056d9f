//! The conversation store interface the engine writes through

use std::collections::HashMap;

use strand_types::{
    AgentRecord, ConversationId, ModelUsageInfo, SharedEntry, ToolResultEntry, UsageInfo,
};

use crate::error::Result;

/// Everything the engine needs from its conversation store.
///
/// The engine calls these synchronously from its single event loop. Methods
/// returning [`Result`] may fail; the engine logs such failures and carries on.
pub trait ConversationSink: Send + Sync {
    /// Append a live entry (possibly still streaming) to a conversation
    fn append_entry(&self, conversation: &ConversationId, entry: SharedEntry);

    /// Persist an entry whose streaming has finished
    fn persist_entry(&self, conversation: &ConversationId, entry: &SharedEntry) -> Result<()>;

    /// Append a complete entry and persist it in one step
    fn append_free_entry(&self, conversation: &ConversationId, entry: SharedEntry) -> Result<()>;

    /// Persist a tool result keyed by its call id
    fn persist_tool_result(
        &self,
        conversation: &ConversationId,
        result: &ToolResultEntry,
    ) -> Result<()>;

    /// Replace the session's cumulative usage
    fn update_usage(
        &self,
        total: &UsageInfo,
        model_usage: Option<&HashMap<String, ModelUsageInfo>>,
        context_window: Option<u64>,
    );

    /// Update the context-window tracker from a raw usage snapshot
    fn update_context(&self, snapshot: &UsageInfo);

    /// Mark the session as working or idle
    fn set_working(&self, working: bool);

    /// Create a conversation for a subagent
    fn create_conversation(
        &self,
        conversation: &ConversationId,
        parent: &ConversationId,
        title: &str,
    ) -> Result<()>;

    /// Create or update an agent record
    fn upsert_agent(&self, agent: &AgentRecord) -> Result<()>;

    /// Find an agent by the identifier it can be resumed with
    fn find_agent_by_resume_id(&self, resume_id: &str) -> Option<AgentRecord>;

    /// Drop any pending permission prompt for a call
    fn clear_pending_permission(&self, call_id: &str);

    /// Tell observers that state changed
    fn request_notification(&self);

    /// Rename a conversation
    fn rename_conversation(&self, conversation: &ConversationId, title: &str) -> Result<()>;

    /// Forward a permission-mode hint from the backend
    fn set_permission_mode(&self, _mode: &str) {}
}

/// Log a failed sink call and carry on
pub(crate) fn log_failure(action: &str, result: Result<()>) {
    if let Err(e) = result {
        tracing::warn!("Failed to {}: {}", action, e);
    }
}
