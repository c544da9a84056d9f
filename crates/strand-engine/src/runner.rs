//! Async driver for the engine
//!
//! The engine itself is synchronous. [`EngineRunner`] owns it on one task and
//! interleaves inbound events with the notification timer, so ticks never
//! race with event handling. The timer only runs while the batcher is armed.

use std::pin::pin;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use strand_types::AgentEvent;

use crate::engine::EventEngine;
use crate::error::{Error, Result};

/// Commands accepted by a running engine
#[derive(Debug, Clone)]
pub enum EngineCommand {
    Event(AgentEvent),
    Reset,
}

/// A cloneable handle for feeding a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<EngineCommand>,
    cancel: CancellationToken,
}

impl EngineHandle {
    /// Queue an event for the engine
    pub fn send(&self, event: AgentEvent) -> Result<()> {
        self.commands
            .send(EngineCommand::Event(event))
            .map_err(|_| Error::Closed)
    }

    /// Queue a session reset
    pub fn reset(&self) -> Result<()> {
        self.commands
            .send(EngineCommand::Reset)
            .map_err(|_| Error::Closed)
    }

    /// Stop the runner. The engine is reset on the way out.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Whether the runner has stopped accepting commands
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Owns an [`EventEngine`] and drives it from a command channel
pub struct EngineRunner {
    engine: EventEngine,
    commands: mpsc::UnboundedReceiver<EngineCommand>,
    cancel: CancellationToken,
}

impl EngineRunner {
    pub fn new(engine: EventEngine) -> (Self, EngineHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = EngineHandle {
            commands: tx,
            cancel: cancel.clone(),
        };
        let runner = Self {
            engine,
            commands: rx,
            cancel,
        };
        (runner, handle)
    }

    /// Run until shut down or every handle is dropped. Returns the engine.
    pub async fn run(mut self) -> EventEngine {
        let commands = UnboundedReceiverStream::new(self.commands);
        drive(&mut self.engine, commands, &self.cancel).await;
        self.engine
    }

    /// Feed every event of `events` through `engine`, then flush.
    pub async fn run_stream<S>(engine: &mut EventEngine, events: S)
    where
        S: Stream<Item = AgentEvent>,
    {
        let commands = pin!(events.map(EngineCommand::Event));
        drive(engine, commands, &CancellationToken::new()).await;
    }
}

async fn drive<S>(engine: &mut EventEngine, mut commands: S, cancel: &CancellationToken)
where
    S: Stream<Item = EngineCommand> + Unpin,
{
    let period = engine.config().notify_interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let armed = engine.batcher_armed();
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::debug!("Engine runner cancelled");
                engine.reset();
                return;
            }
            command = commands.next() => match command {
                Some(EngineCommand::Event(event)) => {
                    engine.handle_event(event);
                    if !armed && engine.batcher_armed() {
                        ticker.reset();
                    }
                }
                Some(EngineCommand::Reset) => engine.reset(),
                None => break,
            },
            _ = ticker.tick(), if armed => {
                engine.tick();
            }
        }
    }

    engine.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::sink::testing::RecordingSink;
    use std::sync::Arc;
    use strand_types::{ConversationId, DeltaKind, Entry};

    fn engine(sink: &Arc<RecordingSink>) -> EventEngine {
        let config = EngineConfig {
            generate_titles: false,
            notify_interval: Duration::from_millis(50),
            ..Default::default()
        };
        EventEngine::new(ConversationId::new("main"), sink.clone(), config)
    }

    fn delta(kind: DeltaKind, fragment: Option<&str>) -> AgentEvent {
        AgentEvent::StreamDelta {
            kind,
            block_index: 0,
            block_kind: None,
            call_id: None,
            tool_name: None,
            fragment: fragment.map(String::from),
            parent_call_id: None,
        }
    }

    fn streamed_text(entries: &[Entry]) -> (String, bool) {
        match entries.first() {
            Some(Entry::Text(t)) => (t.text.clone(), t.is_streaming),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_coalesces_deltas() {
        let sink = Arc::new(RecordingSink::new());
        let (runner, handle) = EngineRunner::new(engine(&sink));
        let task = tokio::spawn(runner.run());

        handle.send(delta(DeltaKind::MessageStart, None)).unwrap();
        handle.send(delta(DeltaKind::BlockStart, None)).unwrap();
        for _ in 0..10 {
            handle.send(delta(DeltaKind::Text, Some("ab"))).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.notifications(), 0);

        tokio::time::sleep(Duration::from_millis(110)).await;
        assert_eq!(sink.notifications(), 1);

        handle.send(delta(DeltaKind::Text, Some("!"))).unwrap();
        handle.send(delta(DeltaKind::MessageStop, None)).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(sink.notifications(), 2);

        handle.shutdown();
        let engine = task.await.unwrap();
        assert!(!engine.batcher_armed());
        assert_eq!(sink.notifications(), 2);
        assert_eq!(
            streamed_text(&sink.entries(&ConversationId::new("main"))),
            ("abababababababababab!".to_string(), false)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_freezes_open_stream() {
        let sink = Arc::new(RecordingSink::new());
        let (runner, handle) = EngineRunner::new(engine(&sink));
        let task = tokio::spawn(runner.run());

        handle.send(delta(DeltaKind::MessageStart, None)).unwrap();
        handle.send(delta(DeltaKind::BlockStart, None)).unwrap();
        handle.send(delta(DeltaKind::Text, Some("half"))).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        handle.shutdown();
        let engine = task.await.unwrap();
        assert_eq!(engine.open_blocks(), 0);
        assert_eq!(sink.notifications(), 1);
        assert_eq!(
            streamed_text(&sink.entries(&ConversationId::new("main"))),
            ("half".to_string(), false)
        );
        assert!(handle.is_closed());
        assert!(matches!(
            handle.send(delta(DeltaKind::MessageStop, None)),
            Err(Error::Closed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_command() {
        let sink = Arc::new(RecordingSink::new());
        let (runner, handle) = EngineRunner::new(engine(&sink));
        let task = tokio::spawn(runner.run());

        handle.send(delta(DeltaKind::BlockStart, None)).unwrap();
        handle.send(delta(DeltaKind::Text, Some("x"))).unwrap();
        handle.reset().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        // the reset flush is the only notification; the timer stays quiet afterwards
        assert_eq!(sink.notifications(), 1);

        drop(handle);
        let engine = task.await.unwrap();
        assert_eq!(engine.open_blocks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stream_flushes_at_end() {
        let sink = Arc::new(RecordingSink::new());
        let mut engine = engine(&sink);
        let events = async_stream::stream! {
            yield delta(DeltaKind::MessageStart, None);
            yield delta(DeltaKind::BlockStart, None);
            yield delta(DeltaKind::Text, Some("Hello, "));
            yield delta(DeltaKind::Text, Some("world"));
            yield delta(DeltaKind::BlockStop, None);
        };

        EngineRunner::run_stream(&mut engine, events).await;
        assert_eq!(sink.notifications(), 1);
        assert!(!engine.batcher_armed());
        assert_eq!(
            streamed_text(&sink.entries(&ConversationId::new("main"))),
            ("Hello, world".to_string(), false)
        );
    }
}
