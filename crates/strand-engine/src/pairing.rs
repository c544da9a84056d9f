//! Tool-call pairing index
//!
//! Maps a call id to the live invocation entry waiting for its result. An id
//! is reserved once (by a streaming placeholder or by the invocation event)
//! and resolved at most once. Resolved ids are remembered until the session
//! is reset so a late duplicate can be recognised. Nothing is evicted during a
//! session; [`PairingIndex::clear`] is the only way entries leave.

use std::collections::{HashMap, HashSet};

use strand_types::{ConversationId, SharedEntry};

/// Where a reservation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOrigin {
    /// Created by a streaming `block_start`; input not yet authoritative
    Streamed,
    /// Created or confirmed by the non-streaming invocation event
    Invoked,
}

/// An invocation waiting for its completion
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub conversation: ConversationId,
    pub entry: SharedEntry,
    pub origin: CallOrigin,
}

#[derive(Debug, Default)]
pub struct PairingIndex {
    pending: HashMap<String, PendingCall>,
    completed: HashSet<String>,
}

impl PairingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a call id. Returns `false` if the id is already pending or resolved.
    pub fn reserve(
        &mut self,
        call_id: &str,
        conversation: ConversationId,
        entry: SharedEntry,
        origin: CallOrigin,
    ) -> bool {
        if self.pending.contains_key(call_id) || self.completed.contains(call_id) {
            return false;
        }
        self.pending.insert(
            call_id.to_string(),
            PendingCall {
                conversation,
                entry,
                origin,
            },
        );
        true
    }

    pub fn get(&self, call_id: &str) -> Option<&PendingCall> {
        self.pending.get(call_id)
    }

    /// Mark a streamed reservation as confirmed by the invocation event
    pub fn confirm(&mut self, call_id: &str) {
        if let Some(call) = self.pending.get_mut(call_id) {
            call.origin = CallOrigin::Invoked;
        }
    }

    /// Take the pending call for a completion. A second resolve returns `None`.
    pub fn resolve(&mut self, call_id: &str) -> Option<PendingCall> {
        let call = self.pending.remove(call_id)?;
        self.completed.insert(call_id.to_string());
        Some(call)
    }

    pub fn is_pending(&self, call_id: &str) -> bool {
        self.pending.contains_key(call_id)
    }

    pub fn is_completed(&self, call_id: &str) -> bool {
        self.completed.contains(call_id)
    }

    /// Number of calls still waiting for a result
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.completed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_types::{ToolInvocationEntry, ToolKind};

    fn entry(call_id: &str) -> SharedEntry {
        SharedEntry::new(ToolInvocationEntry::new(
            call_id,
            "Bash",
            ToolKind::Execute,
            serde_json::json!({}),
        ))
    }

    #[test]
    fn test_reserve_then_resolve_once() {
        let mut index = PairingIndex::new();
        let conv = ConversationId::new("main");
        assert!(index.reserve("c1", conv.clone(), entry("c1"), CallOrigin::Invoked));
        assert!(index.is_pending("c1"));

        let call = index.resolve("c1").unwrap();
        assert_eq!(call.conversation, conv);
        assert!(index.is_completed("c1"));
        assert!(index.resolve("c1").is_none());
    }

    #[test]
    fn test_reserve_rejects_duplicates() {
        let mut index = PairingIndex::new();
        let conv = ConversationId::new("main");
        assert!(index.reserve("c1", conv.clone(), entry("c1"), CallOrigin::Streamed));
        assert!(!index.reserve("c1", conv.clone(), entry("c1"), CallOrigin::Invoked));
        index.resolve("c1");
        assert!(!index.reserve("c1", conv, entry("c1"), CallOrigin::Invoked));
    }

    #[test]
    fn test_confirm_promotes_streamed() {
        let mut index = PairingIndex::new();
        index.reserve("c1", ConversationId::new("m"), entry("c1"), CallOrigin::Streamed);
        index.confirm("c1");
        assert_eq!(index.get("c1").unwrap().origin, CallOrigin::Invoked);
    }

    #[test]
    fn test_unknown_resolve_is_none() {
        let mut index = PairingIndex::new();
        assert!(index.resolve("nope").is_none());
        assert!(!index.is_completed("nope"));
    }

    #[test]
    fn test_clear_forgets_everything() {
        let mut index = PairingIndex::new();
        index.reserve("a", ConversationId::new("m"), entry("a"), CallOrigin::Invoked);
        index.reserve("b", ConversationId::new("m"), entry("b"), CallOrigin::Invoked);
        index.resolve("b");
        assert_eq!(index.pending_len(), 1);
        index.clear();
        assert_eq!(index.pending_len(), 0);
        assert!(!index.is_completed("b"));
    }
}
