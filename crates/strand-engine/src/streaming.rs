//! Streaming assembly
//!
//! Turns `message_start` / `block_start` / delta / `block_stop` /
//! `message_stop` signals into placeholder entries that fill up while the
//! model is still talking. Each (conversation, block index) pair moves from
//! absent to open to closed. Placeholders are appended to their conversation
//! as soon as the block opens, so a view can render them mid-stream.
//!
//! Text buffers are authoritative once their block stops: a later complete
//! text event may only repeat or extend them. Tool-input fragments
//! are kept as raw text for display only; the tool invocation event that
//! follows carries the real input.

use std::collections::{HashMap, HashSet, VecDeque};

use strand_types::{
    BlockKind, ContentKind, ConversationId, DeltaKind, Entry, SharedEntry, TextEntry,
    ToolInvocationEntry,
};

use crate::pairing::{CallOrigin, PairingIndex};
use crate::sink::{ConversationSink, log_failure};

/// What an open block is filling
#[derive(Debug, Clone, PartialEq, Eq)]
enum BlockRole {
    Text(ContentKind),
    Tool(String),
}

#[derive(Debug, Clone)]
struct OpenBlock {
    role: BlockRole,
    entry: SharedEntry,
}

/// Per-conversation streaming state machine
#[derive(Debug, Default)]
pub struct StreamAssembler {
    open: HashMap<(ConversationId, usize), OpenBlock>,
    /// Conversations with a message in progress
    active: HashSet<ConversationId>,
    /// Streamed text placeholders not yet matched by a complete text event
    unreconciled: HashMap<ConversationId, VecDeque<(ContentKind, SharedEntry)>>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new message in `conversation`, dropping the previous message's state
    pub fn message_start(&mut self, conversation: &ConversationId, sink: &dyn ConversationSink) {
        let leftover = self.close_blocks(conversation, sink);
        if leftover > 0 {
            tracing::warn!(
                "message_start in {} with {} block(s) still open, finalizing them",
                conversation,
                leftover
            );
        }
        self.unreconciled.remove(conversation);
        self.active.insert(conversation.clone());
    }

    /// Open a block and append its placeholder.
    ///
    /// `tool` is the block's (call id, tool name) when it streams a tool call.
    /// Returns the placeholder, or `None` if that call id already has an entry.
    pub fn block_start(
        &mut self,
        conversation: &ConversationId,
        block_index: usize,
        block_kind: Option<BlockKind>,
        tool: Option<(&str, &str)>,
        sink: &dyn ConversationSink,
        pairing: &mut PairingIndex,
    ) -> Option<SharedEntry> {
        if self.active.insert(conversation.clone()) {
            tracing::debug!("block_start without message_start in {}", conversation);
        }

        let key = (conversation.clone(), block_index);
        if let Some(previous) = self.open.remove(&key) {
            tracing::warn!(
                "Block {} in {} reopened before it stopped",
                block_index,
                conversation
            );
            Self::close(conversation, previous, sink);
        }

        let block = match tool {
            Some((call_id, tool_name)) => {
                let entry = SharedEntry::new(ToolInvocationEntry::streaming(call_id, tool_name));
                if !pairing.reserve(
                    call_id,
                    conversation.clone(),
                    entry.clone(),
                    CallOrigin::Streamed,
                ) {
                    tracing::debug!("Tool call '{}' already has an entry, not streaming it", call_id);
                    return None;
                }
                OpenBlock {
                    role: BlockRole::Tool(call_id.to_string()),
                    entry,
                }
            }
            None => {
                let kind = match block_kind {
                    Some(BlockKind::Thinking) => ContentKind::Thinking,
                    _ => ContentKind::Text,
                };
                self.text_block(conversation, kind)
            }
        };

        sink.append_entry(conversation, block.entry.clone());
        let entry = block.entry.clone();
        self.open.insert(key, block);
        Some(entry)
    }

    /// Append a fragment to an open block. Returns `true` if anything changed.
    ///
    /// A text or thinking delta for a block that was never opened opens one.
    pub fn delta(
        &mut self,
        conversation: &ConversationId,
        block_index: usize,
        kind: DeltaKind,
        fragment: &str,
        sink: &dyn ConversationSink,
    ) -> bool {
        let key = (conversation.clone(), block_index);
        if !self.open.contains_key(&key) {
            let content = match kind {
                DeltaKind::Text => ContentKind::Text,
                DeltaKind::Thinking => ContentKind::Thinking,
                _ => {
                    tracing::debug!(
                        "Dropping {:?} fragment for unopened block {} in {}",
                        kind,
                        block_index,
                        conversation
                    );
                    return false;
                }
            };
            self.active.insert(conversation.clone());
            let block = self.text_block(conversation, content);
            sink.append_entry(conversation, block.entry.clone());
            self.open.insert(key.clone(), block);
        }

        let Some(block) = self.open.get(&key) else {
            return false;
        };
        match (&block.role, kind) {
            (BlockRole::Text(_), DeltaKind::Text | DeltaKind::Thinking) => block
                .entry
                .with_text_mut(|text| text.text.push_str(fragment))
                .is_some(),
            (BlockRole::Tool(_), DeltaKind::ToolInput) => block
                .entry
                .with_tool_mut(|tool| tool.partial_input.push_str(fragment))
                .is_some(),
            (role, kind) => {
                tracing::debug!("Ignoring {:?} fragment for {:?} block", kind, role);
                false
            }
        }
    }

    /// Close a block. Text placeholders are finalized and persisted here; tool
    /// placeholders wait for their invocation event.
    pub fn block_stop(
        &mut self,
        conversation: &ConversationId,
        block_index: usize,
        sink: &dyn ConversationSink,
    ) {
        match self.open.remove(&(conversation.clone(), block_index)) {
            Some(block) => Self::close(conversation, block, sink),
            None => tracing::debug!(
                "block_stop for block {} in {} that is not open",
                block_index,
                conversation
            ),
        }
    }

    /// End the message in `conversation`, closing any block left open
    pub fn message_stop(&mut self, conversation: &ConversationId, sink: &dyn ConversationSink) {
        let leftover = self.close_blocks(conversation, sink);
        if leftover > 0 {
            tracing::warn!(
                "message_stop in {} with {} block(s) never stopped",
                conversation,
                leftover
            );
        }
        self.active.remove(conversation);
    }

    /// Finalize open text blocks of `conversation` ahead of a complete event,
    /// so streamed text stays before whatever that event appends.
    pub fn finish_open_text(&mut self, conversation: &ConversationId, sink: &dyn ConversationSink) {
        let keys: Vec<_> = self
            .open
            .iter()
            .filter(|((conv, _), block)| {
                conv == conversation && matches!(block.role, BlockRole::Text(_))
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            if let Some(block) = self.open.remove(&key) {
                Self::close(conversation, block, sink);
            }
        }
    }

    /// Stop tracking the streamed block of a tool call, if it is still open
    pub fn release_tool(&mut self, call_id: &str) {
        self.open
            .retain(|_, block| block.role != BlockRole::Tool(call_id.to_string()));
    }

    /// Match a complete text event against the oldest streamed placeholder of
    /// the same kind whose buffer the event repeats or extends. The buffer is
    /// never rewritten; a longer event only fills in the missing tail. Returns
    /// `false` if no placeholder matches, leaving every buffer untouched.
    pub fn reconcile_text(
        &mut self,
        conversation: &ConversationId,
        kind: ContentKind,
        text: &str,
        sink: &dyn ConversationSink,
    ) -> bool {
        let Some(queue) = self.unreconciled.get_mut(conversation) else {
            return false;
        };
        let Some(position) = queue.iter().position(|(k, entry)| {
            *k == kind
                && matches!(&*entry.read(), Entry::Text(t) if text.starts_with(t.text.as_str()))
        }) else {
            return false;
        };
        let Some((_, entry)) = queue.remove(position) else {
            return false;
        };
        self.open
            .retain(|(conv, _), block| !(conv == conversation && block.entry.ptr_eq(&entry)));

        let changed = entry
            .with_text_mut(|existing| {
                let changed = existing.text.len() < text.len() || existing.is_streaming;
                if let Some(tail) = text.get(existing.text.len()..) {
                    existing.text.push_str(tail);
                }
                existing.is_streaming = false;
                changed
            })
            .unwrap_or(false);
        if changed {
            log_failure("persist text", sink.persist_entry(conversation, &entry));
        }
        true
    }

    /// Freeze every open placeholder and forget all state
    pub fn reset(&mut self, sink: &dyn ConversationSink) {
        for ((conversation, _), block) in self.open.drain() {
            Self::close(&conversation, block, sink);
        }
        self.active.clear();
        self.unreconciled.clear();
    }

    /// Number of blocks currently open, across conversations
    pub fn open_blocks(&self) -> usize {
        self.open.len()
    }

    pub fn is_message_active(&self, conversation: &ConversationId) -> bool {
        self.active.contains(conversation)
    }

    fn text_block(&mut self, conversation: &ConversationId, kind: ContentKind) -> OpenBlock {
        let entry = SharedEntry::new(TextEntry::streaming(kind));
        self.unreconciled
            .entry(conversation.clone())
            .or_default()
            .push_back((kind, entry.clone()));
        OpenBlock {
            role: BlockRole::Text(kind),
            entry,
        }
    }

    fn close_blocks(&mut self, conversation: &ConversationId, sink: &dyn ConversationSink) -> usize {
        let keys: Vec<_> = self
            .open
            .keys()
            .filter(|(conv, _)| conv == conversation)
            .cloned()
            .collect();
        let count = keys.len();
        for key in keys {
            if let Some(block) = self.open.remove(&key) {
                Self::close(conversation, block, sink);
            }
        }
        count
    }

    fn close(conversation: &ConversationId, block: OpenBlock, sink: &dyn ConversationSink) {
        let finished = block.entry.finish_streaming();
        if finished && matches!(block.role, BlockRole::Text(_)) {
            log_failure("persist text", sink.persist_entry(conversation, &block.entry));
        }
    }
}
