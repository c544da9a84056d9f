//! Conversation routing
//!
//! Maps the call id that spawned a subagent to the conversation that subagent
//! writes into. Routes are never removed during a session, so a late event
//! that names an old call id still lands in the right place.

use std::collections::HashMap;

use strand_types::ConversationId;

#[derive(Debug)]
pub struct ConversationRouter {
    primary: ConversationId,
    routes: HashMap<String, ConversationId>,
    /// Resume call id -> the agent id it re-attached to
    aliases: HashMap<String, String>,
}

impl ConversationRouter {
    pub fn new(primary: ConversationId) -> Self {
        Self {
            primary,
            routes: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    pub fn primary(&self) -> &ConversationId {
        &self.primary
    }

    /// Resolve the conversation for an event's parent call id.
    ///
    /// No parent means the primary conversation. An unknown parent also falls
    /// back to the primary conversation, with a warning.
    pub fn resolve(&self, parent_call_id: Option<&str>) -> ConversationId {
        let Some(parent) = parent_call_id else {
            return self.primary.clone();
        };
        match self.routes.get(parent) {
            Some(conversation) => conversation.clone(),
            None => {
                tracing::warn!(
                    "No conversation routed for parent call '{}', using primary conversation",
                    parent
                );
                self.primary.clone()
            }
        }
    }

    /// Route events carrying `call_id` as their parent into `conversation`
    pub fn route(&mut self, call_id: impl Into<String>, conversation: ConversationId) {
        self.routes.insert(call_id.into(), conversation);
    }

    pub fn is_routed(&self, call_id: &str) -> bool {
        self.routes.contains_key(call_id)
    }

    /// Record that `call_id` resumed the agent known as `agent_id`
    pub fn alias(&mut self, call_id: impl Into<String>, agent_id: impl Into<String>) {
        self.aliases.insert(call_id.into(), agent_id.into());
    }

    /// The agent id a call refers to: its alias if it resumed an agent, else itself
    pub fn effective_agent_id<'a>(&'a self, call_id: &'a str) -> &'a str {
        self.aliases
            .get(call_id)
            .map(String::as_str)
            .unwrap_or(call_id)
    }

    pub fn clear(&mut self) {
        self.routes.clear();
        self.aliases.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_without_parent_is_primary() {
        let router = ConversationRouter::new(ConversationId::new("main"));
        assert_eq!(router.resolve(None), ConversationId::new("main"));
    }

    #[test]
    fn test_resolve_routed_parent() {
        let mut router = ConversationRouter::new(ConversationId::new("main"));
        router.route("task_1", ConversationId::new("sub"));
        assert_eq!(router.resolve(Some("task_1")), ConversationId::new("sub"));
        assert!(router.is_routed("task_1"));
    }

    #[test]
    fn test_resolve_unknown_parent_falls_back() {
        let router = ConversationRouter::new(ConversationId::new("main"));
        assert_eq!(router.resolve(Some("ghost")), ConversationId::new("main"));
    }

    #[test]
    fn test_effective_agent_id_prefers_alias() {
        let mut router = ConversationRouter::new(ConversationId::new("main"));
        assert_eq!(router.effective_agent_id("call_2"), "call_2");
        router.alias("call_2", "call_1");
        assert_eq!(router.effective_agent_id("call_2"), "call_1");
    }

    #[test]
    fn test_clear_keeps_primary() {
        let mut router = ConversationRouter::new(ConversationId::new("main"));
        router.route("t", ConversationId::new("sub"));
        router.alias("t2", "t");
        router.clear();
        assert!(!router.is_routed("t"));
        assert_eq!(router.effective_agent_id("t2"), "t2");
        assert_eq!(router.primary(), &ConversationId::new("main"));
    }
}
