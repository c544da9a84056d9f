//! In-memory conversation store
//!
//! Holds every conversation of one replayed session. The engine writes
//! through [`ConversationSink`]; the report reads snapshots afterwards.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use strand_engine::{ConversationSink, Error, Result};
use strand_types::{
    AgentRecord, ConversationId, Entry, ModelUsageInfo, SharedEntry, ToolResultEntry, UsageInfo,
};

/// Counters and last-known values held by the store
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    /// Persist calls across all conversations
    pub persisted: usize,
    pub tool_results: usize,
    pub usage: UsageInfo,
    pub model_usage: HashMap<String, ModelUsageInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<UsageInfo>,
    pub working: bool,
    pub notifications: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<String>,
}

/// One conversation and its entries
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSnapshot {
    pub id: ConversationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ConversationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub entries: Vec<Entry>,
}

struct Conversation {
    id: ConversationId,
    parent: Option<ConversationId>,
    title: Option<String>,
    entries: Vec<SharedEntry>,
    persisted: usize,
}

impl Conversation {
    fn new(id: ConversationId, parent: Option<ConversationId>, title: Option<String>) -> Self {
        Self {
            id,
            parent,
            title,
            entries: Vec::new(),
            persisted: 0,
        }
    }

    fn contains(&self, entry: &SharedEntry) -> bool {
        self.entries.iter().any(|e| e.ptr_eq(entry))
    }
}

#[derive(Default)]
struct State {
    conversations: Vec<Conversation>,
    tool_results: HashMap<String, ToolResultEntry>,
    usage: UsageInfo,
    model_usage: HashMap<String, ModelUsageInfo>,
    context_window: Option<u64>,
    context: Option<UsageInfo>,
    working: bool,
    agents: Vec<AgentRecord>,
    notifications: usize,
    permission_mode: Option<String>,
}

impl State {
    fn conversation(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    fn conversation_mut(&mut self, id: &ConversationId) -> Result<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| Error::sink(format!("unknown conversation {}", id)))
    }
}

/// A [`ConversationSink`] that keeps everything in memory
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    /// Create a store holding an empty primary conversation
    pub fn new(primary: ConversationId) -> Self {
        let state = State {
            conversations: vec![Conversation::new(primary, None, None)],
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Conversations in creation order
    pub fn conversations(&self) -> Vec<ConversationSnapshot> {
        self.state
            .lock()
            .conversations
            .iter()
            .map(|c| ConversationSnapshot {
                id: c.id.clone(),
                parent: c.parent.clone(),
                title: c.title.clone(),
                entries: c.entries.iter().map(SharedEntry::snapshot).collect(),
            })
            .collect()
    }

    pub fn conversation(&self, id: &ConversationId) -> Option<ConversationSnapshot> {
        self.conversations().into_iter().find(|c| &c.id == id)
    }

    /// Agents in the order they were first seen
    pub fn agents(&self) -> Vec<AgentRecord> {
        self.state.lock().agents.clone()
    }

    /// Bookkeeping the engine reported through the sink
    pub fn stats(&self) -> StoreStats {
        let state = self.state.lock();
        StoreStats {
            persisted: state.conversations.iter().map(|c| c.persisted).sum(),
            tool_results: state.tool_results.len(),
            usage: state.usage.clone(),
            model_usage: state.model_usage.clone(),
            context_window: state.context_window,
            context: state.context.clone(),
            working: state.working,
            notifications: state.notifications,
            permission_mode: state.permission_mode.clone(),
        }
    }
}

impl ConversationSink for InMemoryStore {
    fn append_entry(&self, conversation: &ConversationId, entry: SharedEntry) {
        let mut state = self.state.lock();
        match state.conversation_mut(conversation) {
            Ok(c) => c.entries.push(entry),
            Err(e) => tracing::warn!("Dropping entry: {}", e),
        }
    }

    fn persist_entry(&self, conversation: &ConversationId, entry: &SharedEntry) -> Result<()> {
        let mut state = self.state.lock();
        let c = state.conversation_mut(conversation)?;
        if !c.contains(entry) {
            return Err(Error::sink(format!(
                "{} entry is not in conversation {}",
                entry.read().kind(),
                conversation
            )));
        }
        c.persisted += 1;
        Ok(())
    }

    fn append_free_entry(&self, conversation: &ConversationId, entry: SharedEntry) -> Result<()> {
        let mut state = self.state.lock();
        let c = state.conversation_mut(conversation)?;
        c.entries.push(entry);
        c.persisted += 1;
        Ok(())
    }

    fn persist_tool_result(
        &self,
        conversation: &ConversationId,
        result: &ToolResultEntry,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.conversation_mut(conversation)?;
        state
            .tool_results
            .insert(result.call_id.clone(), result.clone());
        Ok(())
    }

    fn update_usage(
        &self,
        total: &UsageInfo,
        model_usage: Option<&HashMap<String, ModelUsageInfo>>,
        context_window: Option<u64>,
    ) {
        let mut state = self.state.lock();
        state.usage = total.clone();
        if let Some(model_usage) = model_usage {
            state.model_usage = model_usage.clone();
        }
        if context_window.is_some() {
            state.context_window = context_window;
        }
    }

    fn update_context(&self, snapshot: &UsageInfo) {
        self.state.lock().context = Some(snapshot.clone());
    }

    fn set_working(&self, working: bool) {
        self.state.lock().working = working;
    }

    fn create_conversation(
        &self,
        conversation: &ConversationId,
        parent: &ConversationId,
        title: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.conversation(conversation).is_some() {
            return Err(Error::sink(format!(
                "conversation {} already exists",
                conversation
            )));
        }
        let title = (!title.is_empty()).then(|| title.to_string());
        state.conversations.push(Conversation::new(
            conversation.clone(),
            Some(parent.clone()),
            title,
        ));
        Ok(())
    }

    fn upsert_agent(&self, agent: &AgentRecord) -> Result<()> {
        let mut state = self.state.lock();
        match state
            .agents
            .iter_mut()
            .find(|a| a.agent_id == agent.agent_id)
        {
            Some(existing) => *existing = agent.clone(),
            None => state.agents.push(agent.clone()),
        }
        Ok(())
    }

    fn find_agent_by_resume_id(&self, resume_id: &str) -> Option<AgentRecord> {
        self.state
            .lock()
            .agents
            .iter()
            .find(|a| a.resume_id.as_deref() == Some(resume_id))
            .cloned()
    }

    // Replayed logs carry no interactive prompts, so there is nothing to clear
    fn clear_pending_permission(&self, call_id: &str) {
        tracing::trace!("No permission prompt held for {}", call_id);
    }

    fn request_notification(&self) {
        self.state.lock().notifications += 1;
    }

    fn rename_conversation(&self, conversation: &ConversationId, title: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.conversation_mut(conversation)?.title = Some(title.to_string());
        Ok(())
    }

    fn set_permission_mode(&self, mode: &str) {
        self.state.lock().permission_mode = Some(mode.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_types::{AgentStatus, ContentKind, TextEntry, UserInputEntry};

    fn primary() -> ConversationId {
        ConversationId::new("primary")
    }

    #[test]
    fn test_new_store_has_primary() {
        let store = InMemoryStore::new(primary());
        let conversations = store.conversations();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].id, primary());
        assert!(conversations[0].parent.is_none());
        assert!(conversations[0].entries.is_empty());
    }

    #[test]
    fn test_live_entry_is_visible_through_snapshot() {
        let store = InMemoryStore::new(primary());
        let entry = SharedEntry::new(TextEntry::streaming(ContentKind::Text));
        store.append_entry(&primary(), entry.clone());
        entry.with_text_mut(|t| t.text.push_str("Hello"));
        entry.finish_streaming();
        store.persist_entry(&primary(), &entry).unwrap();

        let snapshot = store.conversation(&primary()).unwrap();
        match &snapshot.entries[0] {
            Entry::Text(t) => assert_eq!(t.text, "Hello"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.stats().persisted, 1);
    }

    #[test]
    fn test_persist_foreign_entry_fails() {
        let store = InMemoryStore::new(primary());
        let stray = SharedEntry::new(UserInputEntry::new("hi", false));
        assert!(store.persist_entry(&primary(), &stray).is_err());
        assert!(
            store
                .persist_entry(&ConversationId::new("nope"), &stray)
                .is_err()
        );
    }

    #[test]
    fn test_create_conversation() {
        let store = InMemoryStore::new(primary());
        let sub = ConversationId::new("sub-1");
        store.create_conversation(&sub, &primary(), "explore").unwrap();
        assert!(store.create_conversation(&sub, &primary(), "again").is_err());

        let snapshot = store.conversation(&sub).unwrap();
        assert_eq!(snapshot.parent, Some(primary()));
        assert_eq!(snapshot.title.as_deref(), Some("explore"));
    }

    #[test]
    fn test_rename() {
        let store = InMemoryStore::new(primary());
        store.rename_conversation(&primary(), "Fix the bug").unwrap();
        assert_eq!(
            store.conversation(&primary()).unwrap().title.as_deref(),
            Some("Fix the bug")
        );
        assert!(
            store
                .rename_conversation(&ConversationId::new("missing"), "x")
                .is_err()
        );
    }

    #[test]
    fn test_upsert_and_find_agent() {
        let store = InMemoryStore::new(primary());
        let mut agent = AgentRecord::spawned("task_1", ConversationId::new("sub"), "explore", "");
        store.upsert_agent(&agent).unwrap();
        assert!(store.find_agent_by_resume_id("agent_1").is_none());

        agent.status = AgentStatus::Completed;
        agent.resume_id = Some("agent_1".into());
        store.upsert_agent(&agent).unwrap();

        assert_eq!(store.agents().len(), 1);
        let found = store.find_agent_by_resume_id("agent_1").unwrap();
        assert_eq!(found.status, AgentStatus::Completed);
    }

    #[test]
    fn test_tool_results() {
        let store = InMemoryStore::new(primary());
        store
            .persist_tool_result(
                &primary(),
                &ToolResultEntry::new("call_1", serde_json::json!("ok"), false),
            )
            .unwrap();
        store.clear_pending_permission("call_1");

        assert_eq!(store.state.lock().tool_results["call_1"].output, "ok");
        let stats = store.stats();
        assert_eq!(stats.tool_results, 1);
    }

    #[test]
    fn test_usage_keeps_previous_breakdown() {
        let store = InMemoryStore::new(primary());
        let mut models = HashMap::new();
        models.insert("m".to_string(), ModelUsageInfo::default());
        let usage = UsageInfo {
            input_tokens: 10,
            ..Default::default()
        };
        store.update_usage(&usage, Some(&models), Some(200_000));
        store.update_usage(&usage, None, None);

        let stats = store.stats();
        assert_eq!(stats.usage.input_tokens, 10);
        assert_eq!(stats.model_usage.len(), 1);
        assert_eq!(stats.context_window, Some(200_000));
    }
}
