//! Transcript entries
//!
//! An [`Entry`] is one durable record in a conversation. Entries are shared
//! between the conversation store, the views and the engine's pairing index
//! through [`SharedEntry`], so an in-place mutation (a tool result arriving,
//! a streaming delta) is visible to every holder without a re-fetch.
//!
//! Creation timestamps are private and never change. `is_streaming` and
//! `is_expanded` are transient and are never serialized.

use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

fn is_false(value: &bool) -> bool {
    !*value
}

/// Kind of text content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    #[default]
    Text,
    Thinking,
}

/// Coarse classification of a tool, used for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Read,
    Edit,
    Write,
    Execute,
    Search,
    Fetch,
    Task,
    Todo,
    #[default]
    #[serde(other)]
    Other,
}

impl ToolKind {
    /// Classify a tool by its name
    pub fn classify(tool_name: &str) -> Self {
        let name = tool_name.to_lowercase();
        match name.as_str() {
            "read" | "notebookread" | "ls" | "list" => ToolKind::Read,
            "edit" | "multiedit" | "notebookedit" => ToolKind::Edit,
            "write" => ToolKind::Write,
            "bash" | "bashoutput" | "killshell" | "shell" => ToolKind::Execute,
            "grep" | "glob" | "websearch" | "search" => ToolKind::Search,
            "webfetch" | "fetch" => ToolKind::Fetch,
            "task" | "agent" => ToolKind::Task,
            "todowrite" | "todoread" => ToolKind::Todo,
            _ => ToolKind::Other,
        }
    }
}

/// Assistant text or thinking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextEntry {
    timestamp: DateTime<Utc>,
    pub text: String,
    #[serde(default)]
    pub kind: ContentKind,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
    #[serde(skip)]
    pub is_streaming: bool,
}

impl TextEntry {
    pub fn new(text: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            timestamp: Utc::now(),
            text: text.into(),
            kind,
            is_error: false,
            is_streaming: false,
        }
    }

    /// An empty placeholder that will be filled by streaming deltas
    pub fn streaming(kind: ContentKind) -> Self {
        Self {
            is_streaming: true,
            ..Self::new(String::new(), kind)
        }
    }

    /// A text entry carrying the error marker
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::new(text, ContentKind::Text)
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A tool call made by an agent, later completed by its result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationEntry {
    timestamp: DateTime<Utc>,
    call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub tool_kind: ToolKind,
    #[serde(default)]
    pub input: serde_json::Value,
    /// Raw input JSON received so far while streaming
    #[serde(skip)]
    pub partial_input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
    #[serde(skip)]
    pub is_streaming: bool,
    #[serde(skip)]
    pub is_expanded: bool,
}

impl ToolInvocationEntry {
    pub fn new(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        tool_kind: ToolKind,
        input: serde_json::Value,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            tool_kind,
            input,
            partial_input: String::new(),
            model: None,
            result: None,
            is_error: false,
            is_streaming: false,
            is_expanded: false,
        }
    }

    /// A placeholder created before any input has arrived
    pub fn streaming(call_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        let tool_name = tool_name.into();
        let kind = ToolKind::classify(&tool_name);
        Self {
            is_streaming: true,
            ..Self::new(call_id, tool_name, kind, serde_json::Value::Null)
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Replace streamed input with the authoritative final input
    pub fn finalize_input(&mut self, input: serde_json::Value) {
        self.input = input;
        self.partial_input.clear();
        self.is_streaming = false;
    }

    /// Attach the result of the call
    pub fn complete(&mut self, output: serde_json::Value, is_error: bool) {
        self.result = Some(output);
        self.is_error = is_error;
        self.is_streaming = false;
    }

    /// Whether the call is still waiting for its result
    pub fn is_pending(&self) -> bool {
        self.result.is_none()
    }

    /// Best-effort parse of the streamed input, for display only
    pub fn partial_input_value(&self) -> Option<serde_json::Value> {
        if self.partial_input.is_empty() {
            return None;
        }
        serde_json::from_str(&self.partial_input).ok()
    }
}

/// A tool result recorded on its own, keyed by call id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultEntry {
    timestamp: DateTime<Utc>,
    pub call_id: String,
    pub output: serde_json::Value,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl ToolResultEntry {
    pub fn new(call_id: impl Into<String>, output: serde_json::Value, is_error: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            call_id: call_id.into(),
            output,
            is_error,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Input typed by the user (or injected on their behalf)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInputEntry {
    timestamp: DateTime<Utc>,
    pub text: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_synthetic: bool,
}

impl UserInputEntry {
    pub fn new(text: impl Into<String>, is_synthetic: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            text: text.into(),
            is_synthetic,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Summary of context that was compacted away
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSummaryEntry {
    timestamp: DateTime<Utc>,
    pub summary: String,
}

impl ContextSummaryEntry {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            summary: summary.into(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Marker for a cleared context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextClearedEntry {
    timestamp: DateTime<Utc>,
}

impl ContextClearedEntry {
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Default for ContextClearedEntry {
    fn default() -> Self {
        Self::new()
    }
}

/// Marker for a context compaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoCompactionEntry {
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_tokens: Option<u64>,
    #[serde(default)]
    pub is_manual: bool,
}

impl AutoCompactionEntry {
    pub fn new(pre_tokens: Option<u64>, is_manual: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            pre_tokens,
            is_manual,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Free-text notice from the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemNotificationEntry {
    timestamp: DateTime<Utc>,
    pub text: String,
}

impl SystemNotificationEntry {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            text: text.into(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A message the engine did not recognise, kept verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnknownMessageEntry {
    timestamp: DateTime<Utc>,
    pub message_type: String,
    pub raw: serde_json::Value,
}

impl UnknownMessageEntry {
    pub fn new(message_type: impl Into<String>, raw: serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now(),
            message_type: message_type.into(),
            raw,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// One record in a conversation transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Entry {
    Text(TextEntry),
    ToolInvocation(ToolInvocationEntry),
    ToolResult(ToolResultEntry),
    UserInput(UserInputEntry),
    ContextSummary(ContextSummaryEntry),
    ContextCleared(ContextClearedEntry),
    AutoCompaction(AutoCompactionEntry),
    SystemNotification(SystemNotificationEntry),
    UnknownMessage(UnknownMessageEntry),
}

impl Entry {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Entry::Text(e) => e.timestamp(),
            Entry::ToolInvocation(e) => e.timestamp(),
            Entry::ToolResult(e) => e.timestamp(),
            Entry::UserInput(e) => e.timestamp(),
            Entry::ContextSummary(e) => e.timestamp(),
            Entry::ContextCleared(e) => e.timestamp(),
            Entry::AutoCompaction(e) => e.timestamp(),
            Entry::SystemNotification(e) => e.timestamp(),
            Entry::UnknownMessage(e) => e.timestamp(),
        }
    }

    /// Short type tag, matching the serialized `type` field
    pub fn kind(&self) -> &'static str {
        match self {
            Entry::Text(_) => "text",
            Entry::ToolInvocation(_) => "tool_invocation",
            Entry::ToolResult(_) => "tool_result",
            Entry::UserInput(_) => "user_input",
            Entry::ContextSummary(_) => "context_summary",
            Entry::ContextCleared(_) => "context_cleared",
            Entry::AutoCompaction(_) => "auto_compaction",
            Entry::SystemNotification(_) => "system_notification",
            Entry::UnknownMessage(_) => "unknown_message",
        }
    }

    pub fn is_streaming(&self) -> bool {
        match self {
            Entry::Text(e) => e.is_streaming,
            Entry::ToolInvocation(e) => e.is_streaming,
            _ => false,
        }
    }

    /// Clear the streaming flag. Returns `true` only on the first call.
    pub fn finish_streaming(&mut self) -> bool {
        let flag = match self {
            Entry::Text(e) => &mut e.is_streaming,
            Entry::ToolInvocation(e) => &mut e.is_streaming,
            _ => return false,
        };
        std::mem::replace(flag, false)
    }

    /// Whether this entry was produced by an agent (as opposed to the user or system)
    pub fn is_assistant_output(&self) -> bool {
        matches!(self, Entry::Text(_) | Entry::ToolInvocation(_))
    }
}

impl From<TextEntry> for Entry {
    fn from(e: TextEntry) -> Self {
        Entry::Text(e)
    }
}

impl From<ToolInvocationEntry> for Entry {
    fn from(e: ToolInvocationEntry) -> Self {
        Entry::ToolInvocation(e)
    }
}

impl From<ToolResultEntry> for Entry {
    fn from(e: ToolResultEntry) -> Self {
        Entry::ToolResult(e)
    }
}

impl From<UserInputEntry> for Entry {
    fn from(e: UserInputEntry) -> Self {
        Entry::UserInput(e)
    }
}

impl From<ContextSummaryEntry> for Entry {
    fn from(e: ContextSummaryEntry) -> Self {
        Entry::ContextSummary(e)
    }
}

impl From<ContextClearedEntry> for Entry {
    fn from(e: ContextClearedEntry) -> Self {
        Entry::ContextCleared(e)
    }
}

impl From<AutoCompactionEntry> for Entry {
    fn from(e: AutoCompactionEntry) -> Self {
        Entry::AutoCompaction(e)
    }
}

impl From<SystemNotificationEntry> for Entry {
    fn from(e: SystemNotificationEntry) -> Self {
        Entry::SystemNotification(e)
    }
}

impl From<UnknownMessageEntry> for Entry {
    fn from(e: UnknownMessageEntry) -> Self {
        Entry::UnknownMessage(e)
    }
}

/// A shared, internally mutable handle to an entry.
///
/// Cloning is cheap; all clones observe the same entry.
#[derive(Clone)]
pub struct SharedEntry(Arc<RwLock<Entry>>);

impl SharedEntry {
    pub fn new(entry: impl Into<Entry>) -> Self {
        Self(Arc::new(RwLock::new(entry.into())))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Entry> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Entry> {
        self.0.write()
    }

    /// A detached copy of the current state
    pub fn snapshot(&self) -> Entry {
        self.0.read().clone()
    }

    /// Whether two handles point at the same entry
    pub fn ptr_eq(&self, other: &SharedEntry) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_streaming(&self) -> bool {
        self.0.read().is_streaming()
    }

    /// Clear the streaming flag. Returns `true` only on the first call.
    pub fn finish_streaming(&self) -> bool {
        self.0.write().finish_streaming()
    }

    /// Run `f` against the entry if it is a tool invocation
    pub fn with_tool_mut<R>(&self, f: impl FnOnce(&mut ToolInvocationEntry) -> R) -> Option<R> {
        match &mut *self.0.write() {
            Entry::ToolInvocation(tool) => Some(f(tool)),
            _ => None,
        }
    }

    /// Run `f` against the entry if it is a text entry
    pub fn with_text_mut<R>(&self, f: impl FnOnce(&mut TextEntry) -> R) -> Option<R> {
        match &mut *self.0.write() {
            Entry::Text(text) => Some(f(text)),
            _ => None,
        }
    }
}

impl fmt::Debug for SharedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedEntry").field(&*self.0.read()).finish()
    }
}

impl Serialize for SharedEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.read().serialize(serializer)
    }
}
