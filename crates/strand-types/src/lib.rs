//! strand-types: Transcript and protocol model
//!
//! This crate defines the durable entries that make up a conversation
//! transcript, token/cost accounting, subagent records, and the inbound
//! event union consumed by the engine.

pub mod agent;
pub mod entry;
pub mod error;
pub mod event;
pub mod pricing;
pub mod usage;

pub use agent::{AgentRecord, AgentStatus, ConversationId};
pub use entry::{
    AutoCompactionEntry, ContentKind, ContextClearedEntry, ContextSummaryEntry, Entry, SharedEntry,
    SystemNotificationEntry, TextEntry, ToolInvocationEntry, ToolKind, ToolResultEntry,
    UnknownMessageEntry, UserInputEntry,
};
pub use error::{Error, Result};
pub use event::{
    AgentEvent, BlockKind, CompactionTrigger, DeltaKind, SessionStatusKind, TextKind,
};
pub use pricing::{ModelPricing, PricingTable};
pub use usage::{ModelUsageInfo, UsageInfo};
