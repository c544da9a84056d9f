//! Subagent lifecycle
//!
//! Spawning a subagent gives it a conversation and an [`AgentRecord`]; a
//! resume re-attaches a new call id to an agent the store already knows.
//! Completions are applied through the resume alias, so the original record
//! is the one that finishes.

use std::collections::HashMap;

use strand_types::{AgentRecord, AgentStatus, ConversationId};

use crate::router::ConversationRouter;
use crate::sink::{ConversationSink, log_failure};

/// Parameters of a spawn event
#[derive(Debug, Clone, Copy)]
pub struct SpawnRequest<'a> {
    pub call_id: &'a str,
    pub is_resume: bool,
    pub resume_agent_id: Option<&'a str>,
    pub agent_type: &'a str,
    pub description: &'a str,
}

/// Agent records touched during this session, keyed by agent id
#[derive(Debug, Default)]
pub struct SubagentRegistry {
    agents: HashMap<String, AgentRecord>,
}

impl SubagentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, agent_id: &str) -> Option<&AgentRecord> {
        self.agents.get(agent_id)
    }

    pub fn agents(&self) -> impl Iterator<Item = &AgentRecord> {
        self.agents.values()
    }

    /// Handle a spawn or resume. Returns the conversation the agent writes into.
    pub fn spawn(
        &mut self,
        request: SpawnRequest<'_>,
        router: &mut ConversationRouter,
        sink: &dyn ConversationSink,
    ) -> ConversationId {
        if router.is_routed(request.call_id) {
            tracing::debug!("Subagent '{}' already spawned", request.call_id);
            return router.resolve(Some(request.call_id));
        }

        if request.is_resume {
            match request.resume_agent_id {
                Some(resume_id) => {
                    if let Some(conversation) = self.resume(request.call_id, resume_id, router, sink)
                    {
                        return conversation;
                    }
                    tracing::warn!(
                        "Resume target '{}' not found, starting a fresh agent for '{}'",
                        resume_id,
                        request.call_id
                    );
                }
                None => tracing::warn!(
                    "Resume of '{}' names no agent, starting a fresh agent",
                    request.call_id
                ),
            }
        }

        let conversation = ConversationId::generate();
        router.route(request.call_id, conversation.clone());
        let title = if request.description.is_empty() {
            request.agent_type
        } else {
            request.description
        };
        log_failure(
            "create subagent conversation",
            sink.create_conversation(&conversation, router.primary(), title),
        );

        let record = AgentRecord::spawned(
            request.call_id,
            conversation.clone(),
            request.agent_type,
            request.description,
        );
        self.store(record, sink);
        conversation
    }

    fn resume(
        &mut self,
        call_id: &str,
        resume_id: &str,
        router: &mut ConversationRouter,
        sink: &dyn ConversationSink,
    ) -> Option<ConversationId> {
        let mut record = self
            .agents
            .values()
            .find(|a| a.resume_id.as_deref() == Some(resume_id))
            .cloned()
            .or_else(|| sink.find_agent_by_resume_id(resume_id))?;

        tracing::debug!(
            "Call '{}' resumes agent '{}' in {}",
            call_id,
            record.agent_id,
            record.conversation_id
        );
        record.status = AgentStatus::Working;
        let conversation = record.conversation_id.clone();
        router.route(call_id, conversation.clone());
        router.route(record.agent_id.clone(), conversation.clone());
        router.alias(call_id, record.agent_id.clone());
        self.store(record, sink);
        Some(conversation)
    }

    /// Apply a completion. Returns the updated record, or `None` for an unknown agent.
    pub fn complete(
        &mut self,
        call_id: &str,
        resume_id: Option<&str>,
        status: &str,
        summary: Option<&str>,
        router: &ConversationRouter,
        sink: &dyn ConversationSink,
    ) -> Option<AgentRecord> {
        let agent_id = router.effective_agent_id(call_id);
        let Some(mut record) = self.agents.get(agent_id).cloned() else {
            tracing::warn!("Completion for unknown subagent '{}'", agent_id);
            return None;
        };
        record.status = AgentStatus::from_completion(status);
        if let Some(summary) = summary {
            record.summary = Some(summary.to_string());
        }
        if let Some(resume_id) = resume_id {
            record.resume_id = Some(resume_id.to_string());
        }
        self.store(record.clone(), sink);
        Some(record)
    }

    /// Apply a subagent's turn result to its status
    pub fn finish_turn(
        &mut self,
        parent_call_id: &str,
        subtype: &str,
        router: &ConversationRouter,
        sink: &dyn ConversationSink,
    ) {
        let agent_id = router.effective_agent_id(parent_call_id);
        let Some(record) = self.agents.get_mut(agent_id) else {
            tracing::debug!("Turn result for unknown subagent '{}'", agent_id);
            return;
        };
        record.status = AgentStatus::from_completion(subtype);
        let record = record.clone();
        log_failure("update subagent", sink.upsert_agent(&record));
    }

    pub fn clear(&mut self) {
        self.agents.clear();
    }

    fn store(&mut self, record: AgentRecord, sink: &dyn ConversationSink) {
        log_failure("update subagent", sink.upsert_agent(&record));
        self.agents.insert(record.agent_id.clone(), record);
    }
}
