//! Event domain types
//!
//! An [`Event`] is a scheduled notification: a target URL owned by the user
//! who registered it. The store assigns its identity and maintains its
//! lifecycle (`pending` → `delivered` | `failed`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Store-assigned event identifier (UUID v7)
pub type EventId = Uuid;

/// Lifecycle status of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Waiting for delivery
    Pending,

    /// Target acknowledged a delivery attempt
    Delivered,

    /// Retry budget exhausted without a successful attempt
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    /// Whether the dispatcher is done with events in this status
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Event {
    /// Unique identifier assigned at creation
    #[cfg_attr(feature = "openapi", schema(value_type = uuid::Uuid))]
    pub id: EventId,

    /// Identifier of the user that registered the event
    pub owner: String,

    /// URL invoked on delivery
    pub target: String,

    pub status: EventStatus,

    /// Delivery attempts made by the dispatch that resolved the event
    pub attempts: u32,

    /// Failure description of the last attempt, for failed events
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Event {
    /// Build a fresh pending event owned by `owner`
    pub fn pending(owner: impl Into<String>, target: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            owner: owner.into(),
            target: target.into(),
            status: EventStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Authenticated identity registering events
///
/// Decoded from the caller's session; only `id` is used as the event owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct User {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            name: None,
        }
    }
}

/// Submission for a new event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NewEvent {
    /// URL to invoke on delivery
    #[serde(alias = "what")]
    pub target: String,
}

impl NewEvent {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

/// Time-bounded claim on a due event
///
/// Only the holder of the token may resolve the event. Once `expires_at`
/// passes, the event is due again and can be claimed by the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// An event returned by `fetch_due_events` together with its lease
#[derive(Debug, Clone)]
pub struct ClaimedEvent {
    pub event: Event,
    pub lease: Lease,
}

/// Final outcome of dispatching an event, reported back to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Delivered { attempts: u32 },
    Failed { attempts: u32, error: String },
}

impl Resolution {
    pub fn status(&self) -> EventStatus {
        match self {
            Self::Delivered { .. } => EventStatus::Delivered,
            Self::Failed { .. } => EventStatus::Failed,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Delivered { attempts } | Self::Failed { attempts, .. } => *attempts,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Delivered { .. } => None,
            Self::Failed { error, .. } => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&EventStatus::Delivered).unwrap(),
            "\"delivered\""
        );
        assert_eq!(EventStatus::Failed.to_string(), "failed");
        assert!(!EventStatus::Pending.is_terminal());
        assert!(EventStatus::Delivered.is_terminal());
    }

    #[test]
    fn test_new_event_accepts_legacy_field_name() {
        let event: NewEvent = serde_json::from_str(r#"{"what": "https://example.com/hook"}"#).unwrap();
        assert_eq!(event.target, "https://example.com/hook");

        let event: NewEvent =
            serde_json::from_str(r#"{"target": "https://example.com/hook"}"#).unwrap();
        assert_eq!(event.target, "https://example.com/hook");
    }

    #[test]
    fn test_user_optional_fields() {
        let user: User = serde_json::from_str(r#"{"id": "u-1"}"#).unwrap();
        assert_eq!(user, User::new("u-1"));
    }

    #[test]
    fn test_pending_event() {
        let event = Event::pending("u-1", "https://example.com");
        assert_eq!(event.status, EventStatus::Pending);
        assert_eq!(event.attempts, 0);
        assert!(!event.is_resolved());
    }

    #[test]
    fn test_resolution_accessors() {
        let failed = Resolution::Failed {
            attempts: 20,
            error: "boom".into(),
        };
        assert_eq!(failed.status(), EventStatus::Failed);
        assert_eq!(failed.attempts(), 20);
        assert_eq!(failed.error(), Some("boom"));
        assert_eq!(Resolution::Delivered { attempts: 1 }.error(), None);
    }
}
