//! In-process event hub fanning turn events out to conversation subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::error::BroadcastError;
use crate::events::Broadcaster;
use crate::events::types::{EventKind, StreamEvent};

/// Maximum number of concurrent subscriptions across all conversations.
const MAX_CONNECTIONS: u64 = 100;

/// Events buffered per conversation; slow subscribers miss events beyond this.
const DEFAULT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
struct Envelope {
    origin: Option<Uuid>,
    event: StreamEvent,
}

/// Per-conversation broadcast channels.
pub struct EventHub {
    channels: RwLock<HashMap<Uuid, broadcast::Sender<Envelope>>>,
    connection_count: Arc<AtomicU64>,
    max_connections: u64,
    buffer: usize,
}

impl EventHub {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_BUFFER, MAX_CONNECTIONS)
    }

    pub fn with_limits(buffer: usize, max_connections: u64) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            connection_count: Arc::new(AtomicU64::new(0)),
            max_connections,
            buffer: buffer.max(1),
        }
    }

    /// Get current number of active subscriptions.
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }

    /// Subscribe to a conversation's events.
    ///
    /// The stream opens with a `connected` event. Events published with
    /// `origin == connection_id` are skipped, since the originating
    /// connection already received them in-stream. Returns `None` if the
    /// subscription limit has been reached.
    pub fn subscribe(
        &self,
        conversation_id: Uuid,
        connection_id: Uuid,
    ) -> Option<impl Stream<Item = StreamEvent> + Send + 'static + use<>> {
        // Atomically increment only if below the limit.
        let counter = Arc::clone(&self.connection_count);
        let max = self.max_connections;
        counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                if current < max {
                    Some(current + 1)
                } else {
                    None
                }
            })
            .ok()?;

        let rx = {
            let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
            channels
                .entry(conversation_id)
                .or_insert_with(|| broadcast::channel(self.buffer).0)
                .subscribe()
        };

        let connected = StreamEvent::new(EventKind::Connected {
            convo_id: conversation_id,
        });
        let stream = tokio_stream::once(connected).chain(
            BroadcastStream::new(rx)
                .filter_map(|result| result.ok())
                .filter(move |envelope| envelope.origin != Some(connection_id))
                .map(|envelope| envelope.event),
        );

        tracing::debug!(
            conversation_id = %conversation_id,
            connection_id = %connection_id,
            "Subscriber connected"
        );

        Some(CountedStream {
            inner: Box::pin(stream),
            counter,
        })
    }

    /// Number of live subscribers for one conversation.
    pub fn subscriber_count(&self, conversation_id: Uuid) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&conversation_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster for EventHub {
    fn publish(
        &self,
        conversation_id: Uuid,
        origin: Option<Uuid>,
        event: StreamEvent,
    ) -> Result<usize, BroadcastError> {
        let sent = {
            let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
            let Some(tx) = channels.get(&conversation_id) else {
                return Err(BroadcastError::NoSubscribers);
            };
            tx.send(Envelope { origin, event }).ok()
        };

        match sent {
            Some(count) => Ok(count),
            None => {
                // Every subscriber is gone; drop the channel unless someone
                // subscribed in the meantime.
                let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
                if channels
                    .get(&conversation_id)
                    .is_some_and(|tx| tx.receiver_count() == 0)
                {
                    channels.remove(&conversation_id);
                }
                Err(BroadcastError::NoSubscribers)
            }
        }
    }
}

/// Stream wrapper that decrements the connection count on drop.
struct CountedStream<S> {
    inner: S,
    counter: Arc<AtomicU64>,
}

impl<S: Stream + Unpin> Stream for CountedStream<S> {
    type Item = S::Item;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        std::pin::Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<S> Drop for CountedStream<S> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}
