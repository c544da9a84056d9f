//! The event dispatcher
//!
//! [`EventEngine`] receives one [`AgentEvent`] at a time, in arrival order, and
//! turns it into entries in the conversation store. It owns all per-session
//! state (pairing index, routing table, streaming indices, usage) and is
//! driven from a single task, so none of that state is locked.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use strand_types::{
    AgentEvent, AgentRecord, AutoCompactionEntry, BlockKind, CompactionTrigger, ContentKind,
    ContextClearedEntry, ContextSummaryEntry, ConversationId, DeltaKind, Entry, ModelUsageInfo,
    SessionStatusKind, SharedEntry, SystemNotificationEntry, TextEntry, TextKind,
    ToolInvocationEntry, ToolKind, ToolResultEntry, UnknownMessageEntry, UsageInfo,
    UserInputEntry,
};

use crate::batcher::NotifyBatcher;
use crate::config::EngineConfig;
use crate::pairing::{CallOrigin, PairingIndex};
use crate::router::ConversationRouter;
use crate::sink::{ConversationSink, log_failure};
use crate::streaming::StreamAssembler;
use crate::subagent::{SpawnRequest, SubagentRegistry};
use crate::title::{FirstLineTitleGenerator, TitleGenerator, TitleScheduler};
use crate::usage::{SessionUsage, TurnTracker};

/// Assembles one session's event stream into conversations
pub struct EventEngine {
    config: EngineConfig,
    sink: Arc<dyn ConversationSink>,
    router: ConversationRouter,
    pairing: PairingIndex,
    assembler: StreamAssembler,
    batcher: NotifyBatcher,
    turns: TurnTracker,
    subagents: SubagentRegistry,
    titles: Option<TitleScheduler>,
}

impl EventEngine {
    /// Create an engine for the session whose primary conversation is `primary`
    pub fn new(
        primary: ConversationId,
        sink: Arc<dyn ConversationSink>,
        config: EngineConfig,
    ) -> Self {
        let titles = config.generate_titles.then(|| {
            TitleScheduler::new(Arc::new(FirstLineTitleGenerator::new(
                config.max_title_chars,
            )))
        });
        Self {
            config,
            sink,
            router: ConversationRouter::new(primary),
            pairing: PairingIndex::new(),
            assembler: StreamAssembler::new(),
            batcher: NotifyBatcher::new(),
            turns: TurnTracker::new(),
            subagents: SubagentRegistry::new(),
            titles,
        }
    }

    /// Use a custom title generator
    pub fn with_title_generator(mut self, generator: Arc<dyn TitleGenerator>) -> Self {
        self.titles = Some(TitleScheduler::new(generator));
        self
    }

    pub fn primary(&self) -> &ConversationId {
        self.router.primary()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Session usage and state
    pub fn usage(&self) -> &SessionUsage {
        self.turns.session()
    }

    /// Agents spawned or resumed this session
    pub fn agents(&self) -> impl Iterator<Item = &AgentRecord> {
        self.subagents.agents()
    }

    /// Tool calls still waiting for a result
    pub fn pending_calls(&self) -> usize {
        self.pairing.pending_len()
    }

    /// Streaming blocks not yet closed
    pub fn open_blocks(&self) -> usize {
        self.assembler.open_blocks()
    }

    /// Whether a title task is still running
    pub fn titles_pending(&self) -> bool {
        self.titles.as_ref().is_some_and(TitleScheduler::has_in_flight)
    }

    /// Whether the notification timer should be running
    pub fn batcher_armed(&self) -> bool {
        self.batcher.is_armed()
    }

    /// Periodic notification tick. Returns `true` if observers were notified.
    pub fn tick(&mut self) -> bool {
        if self.batcher.tick() {
            self.sink.request_notification();
            true
        } else {
            false
        }
    }

    /// Stop the notification timer, notifying if a delta is still unannounced
    pub fn flush(&mut self) -> bool {
        if self.batcher.drain() {
            self.sink.request_notification();
            true
        } else {
            false
        }
    }

    /// Process one event
    pub fn handle_event(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::ToolInvocation {
                call_id,
                tool_name,
                tool_kind,
                parent_call_id,
                input,
                model,
                ..
            } => self.on_tool_invocation(
                call_id,
                tool_name,
                tool_kind,
                parent_call_id.as_deref(),
                input,
                model,
            ),
            AgentEvent::ToolCompletion {
                call_id,
                output,
                is_error,
                ..
            } => self.on_tool_completion(&call_id, output, is_error),
            AgentEvent::Text {
                text,
                kind,
                parent_call_id,
                ..
            } => self.on_text(text, kind, parent_call_id.as_deref()),
            AgentEvent::UserInput {
                text,
                is_synthetic,
                is_replay,
                parent_call_id,
                ..
            } => self.on_user_input(text, is_synthetic, is_replay, parent_call_id.as_deref()),
            AgentEvent::TurnComplete {
                parent_call_id,
                usage,
                model_usage,
                cost_usd,
                result,
                subtype,
                provider,
            } => match parent_call_id {
                Some(parent) => self.on_subagent_turn(&parent, &subtype),
                None => self.on_turn_complete(
                    &usage,
                    &model_usage,
                    cost_usd,
                    result,
                    provider.as_deref(),
                ),
            },
            AgentEvent::UsageUpdate {
                step_usage,
                parent_call_id,
            } => self.on_usage_update(&step_usage, parent_call_id.is_none()),
            AgentEvent::SessionInit {
                session_id,
                model,
                permission_mode,
            } => {
                tracing::debug!(
                    "Session {} started with model {}",
                    session_id.as_deref().unwrap_or("?"),
                    model.as_deref().unwrap_or("?")
                );
                if model.is_some() {
                    self.turns.session_mut().model = model;
                }
                self.set_permission_mode(permission_mode);
                self.notify();
            }
            AgentEvent::SessionStatus {
                status,
                permission_mode,
            } => {
                self.turns.session_mut().is_compacting = status == SessionStatusKind::Compacting;
                self.set_permission_mode(permission_mode);
                self.notify();
            }
            AgentEvent::ContextCompaction {
                trigger,
                pre_tokens,
                summary,
                parent_call_id,
            } => self.on_compaction(trigger, pre_tokens, summary, parent_call_id.as_deref()),
            AgentEvent::SubagentSpawn {
                call_id,
                is_resume,
                resume_agent_id,
                agent_type,
                description,
            } => {
                let request = SpawnRequest {
                    call_id: &call_id,
                    is_resume,
                    resume_agent_id: resume_agent_id.as_deref(),
                    agent_type: &agent_type,
                    description: &description,
                };
                self.subagents
                    .spawn(request, &mut self.router, self.sink.as_ref());
                self.notify();
            }
            AgentEvent::SubagentComplete {
                call_id,
                agent_id,
                status,
                summary,
            } => {
                self.subagents.complete(
                    &call_id,
                    agent_id.as_deref(),
                    &status,
                    summary.as_deref(),
                    &self.router,
                    self.sink.as_ref(),
                );
                self.notify();
            }
            AgentEvent::StreamDelta {
                kind,
                block_index,
                block_kind,
                call_id,
                tool_name,
                fragment,
                parent_call_id,
            } => self.on_stream_delta(
                kind,
                block_index,
                block_kind,
                call_id.as_deref().map(|id| (id, tool_name.as_deref().unwrap_or_default())),
                fragment.as_deref(),
                parent_call_id.as_deref(),
            ),
            AgentEvent::Unknown { message_type, raw } => {
                tracing::debug!("Keeping unrecognised '{}' event as an entry", message_type);
                let primary = self.router.primary().clone();
                self.append(&primary, UnknownMessageEntry::new(message_type, raw));
                self.notify();
            }
        }
    }

    /// Interrupt the session: flush, freeze open streams and forget per-session maps
    pub fn reset(&mut self) {
        self.flush();
        self.assembler.reset(self.sink.as_ref());
        self.pairing.clear();
        self.router.clear();
        self.subagents.clear();
        if self.turns.session().is_working {
            self.sink.set_working(false);
        }
        self.turns.interrupt();
    }

    fn on_tool_invocation(
        &mut self,
        call_id: String,
        tool_name: String,
        tool_kind: Option<ToolKind>,
        parent_call_id: Option<&str>,
        input: Value,
        model: Option<String>,
    ) {
        let conversation = self.router.resolve(parent_call_id);
        self.assembler
            .finish_open_text(&conversation, self.sink.as_ref());

        if let Some(pending) = self.pairing.get(&call_id) {
            if pending.origin == CallOrigin::Invoked {
                tracing::debug!("Duplicate invocation of '{}' ignored", call_id);
                return;
            }
            let entry = pending.entry.clone();
            let target = pending.conversation.clone();
            if target != conversation {
                tracing::debug!(
                    "Invocation of '{}' names {} but was streamed into {}",
                    call_id,
                    conversation,
                    target
                );
            }
            entry.with_tool_mut(|tool| {
                tool.finalize_input(input);
                if tool.tool_name.is_empty() {
                    tool.tool_name = tool_name;
                    tool.tool_kind = ToolKind::classify(&tool.tool_name);
                }
                if let Some(kind) = tool_kind {
                    tool.tool_kind = kind;
                }
                if model.is_some() {
                    tool.model = model;
                }
            });
            self.pairing.confirm(&call_id);
            self.assembler.release_tool(&call_id);
            log_failure("persist tool call", self.sink.persist_entry(&target, &entry));
            self.note_output(&target);
            self.notify();
            return;
        }

        if self.pairing.is_completed(&call_id) {
            tracing::debug!("Invocation of already completed '{}' ignored", call_id);
            return;
        }

        let kind = tool_kind.unwrap_or_else(|| ToolKind::classify(&tool_name));
        let mut tool = ToolInvocationEntry::new(call_id.clone(), tool_name, kind, input);
        tool.model = model;
        let entry = SharedEntry::new(tool);
        self.pairing.reserve(
            &call_id,
            conversation.clone(),
            entry.clone(),
            CallOrigin::Invoked,
        );
        log_failure(
            "append tool call",
            self.sink.append_free_entry(&conversation, entry),
        );
        self.note_output(&conversation);
        self.notify();
    }

    fn on_tool_completion(&mut self, call_id: &str, output: Value, is_error: bool) {
        let Some(call) = self.pairing.resolve(call_id) else {
            tracing::debug!("Completion for unknown tool call '{}' ignored", call_id);
            return;
        };
        call.entry
            .with_tool_mut(|tool| tool.complete(output.clone(), is_error));
        self.assembler.release_tool(call_id);
        let result = ToolResultEntry::new(call_id, output, is_error);
        log_failure(
            "persist tool result",
            self.sink.persist_tool_result(&call.conversation, &result),
        );
        self.sink.clear_pending_permission(call_id);
        self.notify();
    }

    fn on_text(&mut self, text: String, kind: TextKind, parent_call_id: Option<&str>) {
        let conversation = self.router.resolve(parent_call_id);

        let content = match kind {
            TextKind::Text => Some(ContentKind::Text),
            TextKind::Thinking => Some(ContentKind::Thinking),
            TextKind::Error | TextKind::Plan => None,
        };
        if let Some(content) = content {
            if self
                .assembler
                .reconcile_text(&conversation, content, &text, self.sink.as_ref())
            {
                self.note_output(&conversation);
                self.notify();
                return;
            }
        }

        self.assembler
            .finish_open_text(&conversation, self.sink.as_ref());
        let entry = match kind {
            TextKind::Thinking => TextEntry::new(text, ContentKind::Thinking),
            TextKind::Error => TextEntry::error(text),
            TextKind::Text | TextKind::Plan => TextEntry::new(text, ContentKind::Text),
        };
        self.append(&conversation, entry);
        self.note_output(&conversation);
        self.notify();
    }

    fn on_user_input(
        &mut self,
        text: String,
        is_synthetic: bool,
        is_replay: bool,
        parent_call_id: Option<&str>,
    ) {
        if parent_call_id.is_some() {
            let conversation = self.router.resolve(parent_call_id);
            self.append(&conversation, UserInputEntry::new(text, is_synthetic));
            self.notify();
            return;
        }
        if is_replay {
            tracing::debug!("Skipping replayed user input");
            return;
        }

        let primary = self.router.primary().clone();
        self.append(&primary, UserInputEntry::new(text.clone(), is_synthetic));
        self.sink.set_working(true);
        self.turns.start_turn();
        if !is_synthetic {
            if let Some(titles) = self.titles.as_mut() {
                titles.request(&primary, &text, Arc::clone(&self.sink));
            }
        }
        self.notify();
    }

    fn on_turn_complete(
        &mut self,
        usage: &UsageInfo,
        model_usage: &HashMap<String, ModelUsageInfo>,
        cost_usd: f64,
        result: Option<String>,
        provider: Option<&str>,
    ) {
        let had_output = self.turns.had_output();
        let cost = self
            .turns
            .complete_turn(usage, model_usage, cost_usd, &self.config.pricing);
        tracing::debug!(
            "Turn complete ({}), cost ${:.4}",
            provider.unwrap_or("unknown provider"),
            cost
        );

        let session = self.turns.session();
        let breakdown = (!session.model_usage.is_empty()).then_some(&session.model_usage);
        self.sink
            .update_usage(&session.total, breakdown, session.context_window);
        self.sink.set_working(false);

        let silent_result = result.filter(|r| !had_output && !r.trim().is_empty());
        if let Some(result) = silent_result {
            let primary = self.router.primary().clone();
            self.append(&primary, SystemNotificationEntry::new(result));
        }
        self.notify();
    }

    fn on_subagent_turn(&mut self, parent_call_id: &str, subtype: &str) {
        self.subagents
            .finish_turn(parent_call_id, subtype, &self.router, self.sink.as_ref());
        self.notify();
    }

    fn on_usage_update(&mut self, step: &UsageInfo, is_main: bool) {
        if self.turns.record_step(step, is_main) {
            self.sink.update_context(step);
        }
        self.notify();
    }

    fn on_compaction(
        &mut self,
        trigger: CompactionTrigger,
        pre_tokens: Option<u64>,
        summary: Option<String>,
        parent_call_id: Option<&str>,
    ) {
        let conversation = self.router.resolve(parent_call_id);
        match trigger {
            CompactionTrigger::Cleared => {
                self.append(&conversation, ContextClearedEntry::new());
                if parent_call_id.is_none() {
                    let empty = UsageInfo::default();
                    self.sink.update_context(&empty);
                    self.turns.session_mut().context = Some(empty);
                }
            }
            CompactionTrigger::Auto | CompactionTrigger::Manual => {
                let is_manual = trigger == CompactionTrigger::Manual;
                self.append(&conversation, AutoCompactionEntry::new(pre_tokens, is_manual));
                if let Some(summary) = summary.filter(|s| !s.trim().is_empty()) {
                    self.append(&conversation, ContextSummaryEntry::new(summary));
                }
            }
        }
        self.turns.session_mut().is_compacting = false;
        self.notify();
    }

    fn on_stream_delta(
        &mut self,
        kind: DeltaKind,
        block_index: usize,
        block_kind: Option<BlockKind>,
        tool: Option<(&str, &str)>,
        fragment: Option<&str>,
        parent_call_id: Option<&str>,
    ) {
        let conversation = self.router.resolve(parent_call_id);
        let sink = self.sink.as_ref();
        match kind {
            DeltaKind::MessageStart => self.assembler.message_start(&conversation, sink),
            DeltaKind::BlockStart => {
                let placeholder = self.assembler.block_start(
                    &conversation,
                    block_index,
                    block_kind,
                    tool,
                    sink,
                    &mut self.pairing,
                );
                if placeholder.is_some() {
                    self.note_output(&conversation);
                    self.batcher.note_delta();
                }
            }
            DeltaKind::Text | DeltaKind::Thinking | DeltaKind::ToolInput => {
                let fragment = fragment.unwrap_or_default();
                if self
                    .assembler
                    .delta(&conversation, block_index, kind, fragment, sink)
                {
                    self.note_output(&conversation);
                    self.batcher.note_delta();
                }
            }
            DeltaKind::BlockStop => self.assembler.block_stop(&conversation, block_index, sink),
            DeltaKind::MessageStop => {
                self.assembler.message_stop(&conversation, sink);
                self.flush();
            }
        }
    }

    fn set_permission_mode(&mut self, mode: Option<String>) {
        if let Some(mode) = mode {
            self.sink.set_permission_mode(&mode);
            self.turns.session_mut().permission_mode = Some(mode);
        }
    }

    fn append(&self, conversation: &ConversationId, entry: impl Into<Entry>) {
        log_failure(
            "append entry",
            self.sink
                .append_free_entry(conversation, SharedEntry::new(entry)),
        );
    }

    fn note_output(&mut self, conversation: &ConversationId) {
        if conversation == self.router.primary() {
            self.turns.note_output();
        }
    }

    fn notify(&self) {
        self.sink.request_notification();
    }
}
