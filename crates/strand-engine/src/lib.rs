//! strand-engine: Event assembly and routing
//!
//! Consumes the interleaved event stream of an agent session (streaming
//! deltas, tool calls and results, subagent lifecycle, usage telemetry) and
//! turns it into ordered, per-conversation entries written through a
//! [`ConversationSink`].

pub mod batcher;
pub mod config;
pub mod engine;
pub mod error;
pub mod pairing;
pub mod router;
pub mod runner;
pub mod sink;
pub mod streaming;
pub mod subagent;
pub mod title;
pub mod usage;

pub use config::EngineConfig;
pub use engine::EventEngine;
pub use error::{Error, Result};
pub use runner::{EngineCommand, EngineHandle, EngineRunner};
pub use sink::ConversationSink;
pub use title::{FirstLineTitleGenerator, TitleGenerator};
pub use usage::SessionUsage;
