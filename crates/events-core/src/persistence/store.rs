//! EventStore trait definition

use async_trait::async_trait;
use uuid::Uuid;

use crate::event::{ClaimedEvent, Event, EventId, NewEvent, Resolution, User};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying storage unreachable or the query failed
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Event not found
    #[error("event not found: {0}")]
    NotFound(EventId),

    /// The claim used to resolve an event is no longer live
    #[error("lease lost for event {0}")]
    LeaseLost(EventId),

    /// Submitted event rejected
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Durable record of events
///
/// The store exclusively owns event records; callers only mutate them
/// through these operations. Implementations must be thread-safe and
/// support concurrent access from the dispatch loop and request handlers.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Create a new `pending` event owned by `owner`
    async fn persist_event(&self, owner: &User, event: NewEvent) -> Result<Event, StoreError>;

    /// Claim up to `limit` due events, oldest first
    ///
    /// An event is due when it is `pending` and not held under a live lease.
    /// Each returned event is leased to the caller from the moment of the
    /// claim, so callers should only claim what they can start right away.
    async fn fetch_due_events(&self, limit: usize) -> Result<Vec<ClaimedEvent>, StoreError>;

    /// Record the outcome of a dispatched event and release its lease
    ///
    /// Fails with [`StoreError::LeaseLost`] if `lease_token` is not the
    /// event's live claim (expired and re-claimed, or already resolved).
    async fn mark_resolved(
        &self,
        event_id: EventId,
        lease_token: Uuid,
        resolution: Resolution,
    ) -> Result<(), StoreError>;

    /// Get a single event
    async fn get_event(&self, event_id: EventId) -> Result<Option<Event>, StoreError>;

    /// List events owned by `owner`, oldest first
    async fn list_events(&self, owner: &str) -> Result<Vec<Event>, StoreError>;
}

/// Reject submissions the dispatcher could never deliver
pub fn validate_new_event(event: &NewEvent) -> Result<(), StoreError> {
    if event.target.trim().is_empty() {
        return Err(StoreError::InvalidEvent("target must not be empty".into()));
    }
    Ok(())
}
