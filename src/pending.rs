//! Pending call registry.
//!
//! Bridges a call site that must await a result with an external actor that
//! supplies it later through a separate entry point. Remote tool dispatch and
//! human confirmations both sit on top of this registry; they differ only in
//! what happens when the deadline passes (see [`OnTimeout`]).
//!
//! Every entry is removed exactly once: by `resolve`/`reject`/`claim`, by its
//! deadline timer, or by `shutdown`. Whoever removes it under the lock owns
//! the completion, so late attempts observe `NotFound` instead of completing
//! twice.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{Mutex, oneshot};
use tokio::task::AbortHandle;

use crate::error::PendingError;

/// Default deadline for both remote dispatch and confirmations.
pub const DEFAULT_PENDING_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Value delivered to the waiting call site.
pub type Completion = Result<String, PendingError>;

/// What the deadline timer delivers when nobody resolves the entry in time.
///
/// The two flavors are deliberately asymmetric: a remote tool that never
/// answers is a failed tool call, while an unanswered confirmation is
/// reported to the agent as ordinary text it can react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnTimeout {
    /// Complete with [`PendingError::TimedOut`].
    Reject,
    /// Complete successfully with the given message.
    Resolve(String),
}

/// A live pending entry.
#[derive(Debug, Clone)]
pub struct PendingEntry<M> {
    pub id: String,
    pub meta: M,
    pub owner_user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

struct Slot<M> {
    entry: PendingEntry<M>,
    tx: oneshot::Sender<Completion>,
    timer: AbortHandle,
}

type Slots<M> = Arc<Mutex<HashMap<String, Slot<M>>>>;

/// Map from correlation ID to a suspended completion.
pub struct PendingRegistry<M> {
    name: &'static str,
    slots: Slots<M>,
}

impl<M: Send + 'static> PendingRegistry<M> {
    /// Create an empty registry. `name` only shows up in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a pending entry and start its deadline timer.
    ///
    /// Fails with [`PendingError::Duplicate`] if `id` already has a live entry.
    pub async fn register(
        &self,
        id: impl Into<String>,
        meta: M,
        owner_user_id: Option<i64>,
        timeout: Duration,
        on_timeout: OnTimeout,
    ) -> Result<PendingHandle, PendingError> {
        let id = id.into();
        let mut slots = self.slots.lock().await;
        if slots.contains_key(&id) {
            return Err(PendingError::Duplicate(id));
        }

        let created_at = Utc::now();
        let deadline = TimeDelta::from_std(timeout)
            .ok()
            .and_then(|delta| created_at.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let (tx, rx) = oneshot::channel();
        let timer = tokio::spawn(expire_after(
            Arc::clone(&self.slots),
            id.clone(),
            timeout,
            on_timeout,
            self.name,
        ))
        .abort_handle();

        slots.insert(
            id.clone(),
            Slot {
                entry: PendingEntry {
                    id: id.clone(),
                    meta,
                    owner_user_id,
                    created_at,
                    deadline,
                },
                tx,
                timer,
            },
        );

        tracing::debug!(registry = self.name, id = %id, "Registered pending entry");
        Ok(PendingHandle { id, rx })
    }

    /// Complete a live entry with `value`.
    pub async fn resolve(&self, id: &str, value: impl Into<String>) -> Result<(), PendingError> {
        let claimed = self
            .claim(id)
            .await
            .ok_or_else(|| PendingError::NotFound(id.to_string()))?;
        claimed.complete(Ok(value.into()));
        Ok(())
    }

    /// Complete a live entry with a failure.
    pub async fn reject(&self, id: &str, reason: impl Into<String>) -> Result<(), PendingError> {
        let claimed = self
            .claim(id)
            .await
            .ok_or_else(|| PendingError::NotFound(id.to_string()))?;
        claimed.complete(Err(PendingError::Rejected(reason.into())));
        Ok(())
    }

    /// Remove a live entry and stop its timer without completing it yet.
    ///
    /// The caller owns the completion from here on, which lets it do async
    /// work (such as running an approved tool) while no one else can resolve
    /// or expire the same entry.
    pub async fn claim(&self, id: &str) -> Option<Claimed<M>> {
        let slot = self.slots.lock().await.remove(id)?;
        slot.timer.abort();
        tracing::debug!(registry = self.name, id = %id, "Claimed pending entry");
        Some(Claimed {
            entry: slot.entry,
            tx: slot.tx,
        })
    }

    /// Whether `id` currently has a live entry.
    pub async fn contains(&self, id: &str) -> bool {
        self.slots.lock().await.contains_key(id)
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every live entry, waking waiters with [`PendingError::Cancelled`].
    ///
    /// Returns the number of entries cancelled.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<Slot<M>> = self.slots.lock().await.drain().map(|(_, s)| s).collect();
        let count = drained.len();
        for slot in drained {
            slot.timer.abort();
            let _ = slot.tx.send(Err(PendingError::Cancelled));
        }
        if count > 0 {
            tracing::info!(registry = self.name, "Cancelled {} pending entries", count);
        }
        count
    }
}

impl<M: Clone + Send + 'static> PendingRegistry<M> {
    /// Snapshot of a live entry, left in place.
    pub async fn get(&self, id: &str) -> Option<PendingEntry<M>> {
        self.slots.lock().await.get(id).map(|s| s.entry.clone())
    }
}

async fn expire_after<M>(
    slots: Slots<M>,
    id: String,
    timeout: Duration,
    on_timeout: OnTimeout,
    registry: &'static str,
) {
    tokio::time::sleep(timeout).await;

    let Some(slot) = slots.lock().await.remove(&id) else {
        return;
    };

    tracing::warn!(registry, id = %id, "Pending entry expired after {:?}", timeout);
    let completion = match on_timeout {
        OnTimeout::Reject => Err(PendingError::TimedOut(timeout)),
        OnTimeout::Resolve(message) => Ok(message),
    };
    let _ = slot.tx.send(completion);
}

/// The waiting side of a pending entry.
#[derive(Debug)]
pub struct PendingHandle {
    id: String,
    rx: oneshot::Receiver<Completion>,
}

impl PendingHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the entry to be resolved, rejected or expired.
    pub async fn wait(self) -> Completion {
        self.rx.await.unwrap_or(Err(PendingError::Cancelled))
    }
}

/// An entry removed from the registry whose completion is still owed.
#[derive(Debug)]
pub struct Claimed<M> {
    pub entry: PendingEntry<M>,
    tx: oneshot::Sender<Completion>,
}

impl<M> Claimed<M> {
    /// Deliver the completion. Returns false if the waiter has gone away.
    pub fn complete(self, completion: Completion) -> bool {
        self.tx.send(completion).is_ok()
    }
}
