//! Conversation title generation
//!
//! Titles are produced off the event path by a detached task. Each
//! conversation gets at most one attempt per session; a failure leaves the
//! conversation untitled.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use strand_types::ConversationId;

use crate::error::{Error, Result};
use crate::sink::ConversationSink;

/// Produces a short title from a conversation's first user input
#[async_trait]
pub trait TitleGenerator: Send + Sync {
    async fn generate_title(&self, text: &str) -> Result<String>;
}

/// Titles a conversation with the first line of its first input
#[derive(Debug, Clone)]
pub struct FirstLineTitleGenerator {
    max_chars: usize,
}

impl FirstLineTitleGenerator {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

#[async_trait]
impl TitleGenerator for FirstLineTitleGenerator {
    async fn generate_title(&self, text: &str) -> Result<String> {
        let line = text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| Error::Title("input has no text".into()))?;
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        Ok(truncate(&collapsed, self.max_chars))
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut with an ellipsis
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(1);
    let mut out: String = text.chars().take(keep).collect();
    out.truncate(out.trim_end().len());
    out.push('…');
    out
}

/// Spawns title tasks, at most one per conversation
pub struct TitleScheduler {
    generator: Arc<dyn TitleGenerator>,
    attempted: HashSet<ConversationId>,
    in_flight: Arc<Mutex<HashSet<ConversationId>>>,
}

impl TitleScheduler {
    pub fn new(generator: Arc<dyn TitleGenerator>) -> Self {
        Self {
            generator,
            attempted: HashSet::new(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Start a title task for `conversation` unless one was already attempted.
    /// Returns `true` if a task was spawned.
    pub fn request(
        &mut self,
        conversation: &ConversationId,
        text: &str,
        sink: Arc<dyn ConversationSink>,
    ) -> bool {
        if self.attempted.contains(conversation) || self.in_flight.lock().contains(conversation) {
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No async runtime, skipping title for {}", conversation);
            return false;
        };

        self.attempted.insert(conversation.clone());
        self.in_flight.lock().insert(conversation.clone());

        let generator = Arc::clone(&self.generator);
        let in_flight = Arc::clone(&self.in_flight);
        let conversation = conversation.clone();
        let text = text.to_string();
        runtime.spawn(async move {
            match generator.generate_title(&text).await {
                Ok(title) if title.trim().is_empty() => {
                    tracing::debug!("Empty title generated for {}", conversation);
                }
                Ok(title) => {
                    if let Err(e) = sink.rename_conversation(&conversation, title.trim()) {
                        tracing::warn!("Failed to rename {}: {}", conversation, e);
                    }
                }
                Err(e) => tracing::warn!("Title generation for {} failed: {}", conversation, e),
            }
            in_flight.lock().remove(&conversation);
        });
        true
    }

    /// Whether a task for `conversation` is still running
    pub fn is_in_flight(&self, conversation: &ConversationId) -> bool {
        self.in_flight.lock().contains(conversation)
    }

    pub fn was_attempted(&self, conversation: &ConversationId) -> bool {
        self.attempted.contains(conversation)
    }

    /// Whether any title task is still running
    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.lock().is_empty()
    }
}
