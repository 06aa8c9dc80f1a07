//! In-memory implementation of EventStore for development and testing

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::store::*;
use crate::event::{ClaimedEvent, Event, EventId, EventStatus, Lease, NewEvent, Resolution, User};

/// Default lease duration for claimed events
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(300);

/// Internal event state
struct EventRecord {
    event: Event,
    lease: Option<Lease>,
}

impl EventRecord {
    fn is_due(&self, now: chrono::DateTime<Utc>) -> bool {
        self.event.status == EventStatus::Pending
            && self.lease.map_or(true, |lease| lease.expires_at <= now)
    }
}

/// In-memory implementation of EventStore
///
/// Provides the same claim/lease semantics as the PostgreSQL implementation.
/// All data is lost on restart.
///
/// # Example
///
/// ```
/// use events_core::InMemoryEventStore;
/// use std::time::Duration;
///
/// let store = InMemoryEventStore::new().with_lease_duration(Duration::from_secs(60));
/// assert_eq!(store.len(), 0);
/// ```
pub struct InMemoryEventStore {
    events: RwLock<HashMap<EventId, EventRecord>>,
    lease_duration: Duration,
}

impl InMemoryEventStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            lease_duration: DEFAULT_LEASE_DURATION,
        }
    }

    /// Set how long a claimed event stays invisible to `fetch_due_events`
    pub fn with_lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    /// Get the number of stored events
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Get the number of pending events (leased or not)
    pub fn pending_count(&self) -> usize {
        self.events
            .read()
            .values()
            .filter(|r| r.event.status == EventStatus::Pending)
            .count()
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn persist_event(&self, owner: &User, event: NewEvent) -> Result<Event, StoreError> {
        validate_new_event(&event)?;

        let event = Event::pending(owner.id.clone(), event.target);
        self.events.write().insert(
            event.id,
            EventRecord {
                event: event.clone(),
                lease: None,
            },
        );
        Ok(event)
    }

    async fn fetch_due_events(&self, limit: usize) -> Result<Vec<ClaimedEvent>, StoreError> {
        let now = Utc::now();
        let lease = Lease {
            token: Uuid::now_v7(),
            expires_at: now
                + chrono::Duration::from_std(self.lease_duration)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?,
        };

        let mut events = self.events.write();
        let mut due: Vec<EventId> = events
            .iter()
            .filter(|(_, record)| record.is_due(now))
            .map(|(id, _)| *id)
            .collect();
        due.sort();
        due.truncate(limit);

        let mut claimed = Vec::with_capacity(due.len());
        for id in due {
            if let Some(record) = events.get_mut(&id) {
                record.lease = Some(lease);
                claimed.push(ClaimedEvent {
                    event: record.event.clone(),
                    lease,
                });
            }
        }
        Ok(claimed)
    }

    async fn mark_resolved(
        &self,
        event_id: EventId,
        lease_token: Uuid,
        resolution: Resolution,
    ) -> Result<(), StoreError> {
        let mut events = self.events.write();
        let record = events
            .get_mut(&event_id)
            .ok_or(StoreError::NotFound(event_id))?;

        let holds_lease = record.lease.is_some_and(|lease| lease.token == lease_token);
        if record.event.status != EventStatus::Pending || !holds_lease {
            return Err(StoreError::LeaseLost(event_id));
        }

        let now = Utc::now();
        record.event.status = resolution.status();
        record.event.attempts = resolution.attempts();
        record.event.last_error = resolution.error().map(str::to_string);
        record.event.updated_at = now;
        record.event.resolved_at = Some(now);
        record.lease = None;
        Ok(())
    }

    async fn get_event(&self, event_id: EventId) -> Result<Option<Event>, StoreError> {
        Ok(self.events.read().get(&event_id).map(|r| r.event.clone()))
    }

    async fn list_events(&self, owner: &str) -> Result<Vec<Event>, StoreError> {
        let mut events: Vec<Event> = self
            .events
            .read()
            .values()
            .filter(|r| r.event.owner == owner)
            .map(|r| r.event.clone())
            .collect();
        events.sort_by_key(|e| e.id);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> User {
        User::new("user-1")
    }

    #[tokio::test]
    async fn test_persist_assigns_unique_pending_events() {
        let store = InMemoryEventStore::new();

        let a = store
            .persist_event(&owner(), NewEvent::new("https://a.example"))
            .await
            .unwrap();
        let b = store
            .persist_event(&owner(), NewEvent::new("https://b.example"))
            .await
            .unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.owner, "user-1");
        assert_eq!(a.status, EventStatus::Pending);
        assert_eq!(store.len(), 2);
        assert_eq!(store.pending_count(), 2);
    }

    #[tokio::test]
    async fn test_persist_rejects_empty_target() {
        let store = InMemoryEventStore::new();
        let err = store
            .persist_event(&owner(), NewEvent::new("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidEvent(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_claimed_events_are_not_refetched_while_leased() {
        let store = InMemoryEventStore::new();
        store
            .persist_event(&owner(), NewEvent::new("https://a.example"))
            .await
            .unwrap();

        let first = store.fetch_due_events(10).await.unwrap();
        assert_eq!(first.len(), 1);

        let second = store.fetch_due_events(10).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(store.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_claims_at_most_limit_oldest_first() {
        let store = InMemoryEventStore::new();
        let mut ids = Vec::new();
        for target in ["https://a.example", "https://b.example", "https://c.example"] {
            let event = store
                .persist_event(&owner(), NewEvent::new(target))
                .await
                .unwrap();
            ids.push(event.id);
        }
        ids.sort();

        let first = store.fetch_due_events(2).await.unwrap();
        let claimed: Vec<EventId> = first.iter().map(|c| c.event.id).collect();
        assert_eq!(claimed, ids[..2].to_vec());

        // The unclaimed remainder is still due
        let rest = store.fetch_due_events(2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].event.id, ids[2]);

        assert!(store.fetch_due_events(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_lease_is_reclaimable() {
        let store = InMemoryEventStore::new().with_lease_duration(Duration::ZERO);
        store
            .persist_event(&owner(), NewEvent::new("https://a.example"))
            .await
            .unwrap();

        let first = store.fetch_due_events(10).await.unwrap();
        let second = store.fetch_due_events(10).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_ne!(first[0].lease.token, second[0].lease.token);

        // The stale claim can no longer resolve the event
        let err = store
            .mark_resolved(
                first[0].event.id,
                first[0].lease.token,
                Resolution::Delivered { attempts: 1 },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::LeaseLost(_)));

        store
            .mark_resolved(
                second[0].event.id,
                second[0].lease.token,
                Resolution::Delivered { attempts: 1 },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_resolved_events_never_reappear() {
        let store = InMemoryEventStore::new().with_lease_duration(Duration::ZERO);
        let delivered = store
            .persist_event(&owner(), NewEvent::new("https://a.example"))
            .await
            .unwrap();
        let failed = store
            .persist_event(&owner(), NewEvent::new("https://b.example"))
            .await
            .unwrap();

        let claimed = store.fetch_due_events(10).await.unwrap();
        assert_eq!(claimed.len(), 2);
        let token = claimed[0].lease.token;

        store
            .mark_resolved(delivered.id, token, Resolution::Delivered { attempts: 3 })
            .await
            .unwrap();
        store
            .mark_resolved(
                failed.id,
                token,
                Resolution::Failed {
                    attempts: 20,
                    error: "status 503".into(),
                },
            )
            .await
            .unwrap();

        assert!(store.fetch_due_events(10).await.unwrap().is_empty());

        let delivered = store.get_event(delivered.id).await.unwrap().unwrap();
        assert_eq!(delivered.status, EventStatus::Delivered);
        assert_eq!(delivered.attempts, 3);
        assert!(delivered.resolved_at.is_some());

        let failed = store.get_event(failed.id).await.unwrap().unwrap();
        assert_eq!(failed.status, EventStatus::Failed);
        assert_eq!(failed.last_error.as_deref(), Some("status 503"));

        // Resolving twice is rejected
        let err = store
            .mark_resolved(failed.id, token, Resolution::Delivered { attempts: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::LeaseLost(_)));
    }

    #[tokio::test]
    async fn test_mark_resolved_unknown_event() {
        let store = InMemoryEventStore::new();
        let id = Uuid::now_v7();
        let err = store
            .mark_resolved(id, Uuid::now_v7(), Resolution::Delivered { attempts: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(found) if found == id));
    }

    #[tokio::test]
    async fn test_list_events_is_scoped_to_owner() {
        let store = InMemoryEventStore::new();
        store
            .persist_event(&owner(), NewEvent::new("https://a.example"))
            .await
            .unwrap();
        store
            .persist_event(&User::new("someone-else"), NewEvent::new("https://b.example"))
            .await
            .unwrap();

        let events = store.list_events("user-1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target, "https://a.example");
    }
}
