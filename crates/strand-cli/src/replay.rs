//! Replay a recorded event log through the engine
//!
//! Each line of the log is one JSON-encoded agent event. Lines that do not
//! decode are skipped with a warning. The replayed session is kept in an
//! [`InMemoryStore`] and rendered as a transcript or as JSON.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use strand_engine::{EngineConfig, EngineRunner, EventEngine, SessionUsage};
use strand_types::{AgentEvent, AgentRecord, ContentKind, ConversationId, Entry};

use crate::store::{ConversationSnapshot, InMemoryStore, StoreStats};

/// Id of the main agent's conversation in a replay
pub const PRIMARY_CONVERSATION: &str = "primary";

/// Result of replaying one log
pub struct Replay {
    pub store: Arc<InMemoryStore>,
    pub usage: SessionUsage,
}

#[derive(Serialize)]
struct Report<'a> {
    conversations: Vec<ConversationSnapshot>,
    agents: Vec<AgentRecord>,
    usage: &'a SessionUsage,
    store: StoreStats,
}

/// Read and decode an event log
pub fn read_events(path: &Path) -> Result<Vec<AgentEvent>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read event log {}", path.display()))?;
    Ok(parse_events(&content))
}

/// Decode one event per non-empty line
pub fn parse_events(content: &str) -> Vec<AgentEvent> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(i, line)| match AgentEvent::parse_line(line.trim()) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!("Skipping line {}: {}", i + 1, e);
                None
            }
        })
        .collect()
}

/// Run `events` through a fresh engine and wait for title tasks to settle
pub async fn replay(events: Vec<AgentEvent>, config: EngineConfig) -> Replay {
    let primary = ConversationId::new(PRIMARY_CONVERSATION);
    let store = Arc::new(InMemoryStore::new(primary.clone()));
    let mut engine = EventEngine::new(primary, store.clone(), config);

    tracing::debug!("Replaying {} events", events.len());
    EngineRunner::run_stream(&mut engine, futures::stream::iter(events)).await;
    while engine.titles_pending() {
        tokio::task::yield_now().await;
    }

    if engine.pending_calls() > 0 {
        tracing::info!("{} tool calls never completed", engine.pending_calls());
    }
    Replay {
        store,
        usage: engine.usage().clone(),
    }
}

impl Replay {
    fn selected(&self, only: Option<&ConversationId>) -> Result<Vec<ConversationSnapshot>> {
        match only {
            None => Ok(self.store.conversations()),
            Some(id) => match self.store.conversation(id) {
                Some(conversation) => Ok(vec![conversation]),
                None => bail!("No conversation with id '{}'", id),
            },
        }
    }

    /// Render as pretty JSON
    pub fn to_json(&self, only: Option<&ConversationId>) -> Result<String> {
        let report = Report {
            conversations: self.selected(only)?,
            agents: self.store.agents(),
            usage: &self.usage,
            store: self.store.stats(),
        };
        Ok(serde_json::to_string_pretty(&report)?)
    }

    /// Render as a human-readable transcript with a usage summary
    pub fn to_text(&self, only: Option<&ConversationId>) -> Result<String> {
        let mut out = String::new();
        for conversation in self.selected(only)? {
            write_conversation(&mut out, &conversation)?;
            out.push('\n');
        }

        let agents = self.store.agents();
        if !agents.is_empty() {
            writeln!(out, "Agents:")?;
            for agent in &agents {
                writeln!(
                    out,
                    "  {:<12} {:<10} {:<12} {}",
                    agent.agent_id,
                    format!("{:?}", agent.status).to_lowercase(),
                    agent.agent_type,
                    agent.summary.as_deref().unwrap_or(&agent.description)
                )?;
            }
            out.push('\n');
        }

        write_usage(&mut out, &self.usage)?;

        let stats = self.store.stats();
        if let Some(mode) = &stats.permission_mode {
            writeln!(out, "Permission mode: {}", mode)?;
        }
        writeln!(
            out,
            "Store: {} entries persisted, {} tool results, {}",
            stats.persisted,
            stats.tool_results,
            if stats.working { "working" } else { "idle" }
        )?;
        writeln!(out, "Notifications: {}", stats.notifications)?;
        Ok(out)
    }
}

fn write_conversation(out: &mut String, conversation: &ConversationSnapshot) -> std::fmt::Result {
    write!(out, "== {}", conversation.id)?;
    if let Some(title) = &conversation.title {
        write!(out, " \"{}\"", title)?;
    }
    if let Some(parent) = &conversation.parent {
        write!(out, " (parent {})", parent)?;
    }
    writeln!(out, " ==")?;
    for entry in &conversation.entries {
        writeln!(out, "{}", format_entry(entry))?;
    }
    Ok(())
}

fn write_usage(out: &mut String, usage: &SessionUsage) -> std::fmt::Result {
    let total = &usage.total;
    writeln!(out, "Turns: {}", usage.turns)?;
    writeln!(
        out,
        "Tokens: {} in, {} out, {} cache read, {} cache write",
        total.input_tokens, total.output_tokens, total.cache_read_tokens, total.cache_creation_tokens
    )?;
    writeln!(out, "Cost: ${:.4}", total.cost_usd)?;

    let mut models: Vec<_> = usage.model_usage.iter().collect();
    models.sort_by(|a, b| a.0.cmp(b.0));
    for (model, info) in models {
        writeln!(
            out,
            "  {}: {} in, {} out, ${:.4}",
            model, info.usage.input_tokens, info.usage.output_tokens, info.usage.cost_usd
        )?;
    }
    if let (Some(context), Some(window)) = (&usage.context, usage.context_window) {
        let used = context
            .input_tokens
            .saturating_add(context.cache_read_tokens)
            .saturating_add(context.cache_creation_tokens);
        writeln!(out, "Context: {} / {} tokens", used, window)?;
    }
    Ok(())
}

/// One transcript line (continuation lines indented)
pub fn format_entry(entry: &Entry) -> String {
    let time = entry
        .timestamp()
        .with_timezone(&chrono::Local)
        .format("%H:%M:%S");
    let body = match entry {
        Entry::Text(e) if e.is_error => format!("error: {}", e.text),
        Entry::Text(e) => match e.kind {
            ContentKind::Text => format!("assistant: {}", e.text),
            ContentKind::Thinking => format!("thinking: {}", e.text),
        },
        Entry::ToolInvocation(e) => {
            let status = match &e.result {
                None => "pending",
                Some(_) if e.is_error => "error",
                Some(_) => "ok",
            };
            format!("tool {} {} [{}]", e.tool_name, e.input, status)
        }
        Entry::ToolResult(e) => format!("result {}: {}", e.call_id, e.output),
        Entry::UserInput(e) if e.is_synthetic => format!("user (synthetic): {}", e.text),
        Entry::UserInput(e) => format!("user: {}", e.text),
        Entry::ContextSummary(e) => format!("summary: {}", e.summary),
        Entry::ContextCleared(_) => "context cleared".to_string(),
        Entry::AutoCompaction(e) => {
            let how = if e.is_manual { "manual" } else { "auto" };
            match e.pre_tokens {
                Some(tokens) => format!("compacted ({}, {} tokens before)", how, tokens),
                None => format!("compacted ({})", how),
            }
        }
        Entry::SystemNotification(e) => format!("system: {}", e.text),
        Entry::UnknownMessage(e) => format!("unknown {}: {}", e.message_type, e.raw),
    };
    format!("[{}] {}", time, body.replace('\n', "\n           "))
}
