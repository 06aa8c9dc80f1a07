// Database models (internal, converted to events_core types at the boundary)

use chrono::{DateTime, Utc};
use events_core::{Event, EventStatus, StoreError};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: Uuid,
    pub owner_id: String,
    pub target: String,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Row returned by the claim statement
#[derive(Debug, Clone, FromRow)]
pub struct ClaimedEventRow {
    #[sqlx(flatten)]
    pub event: EventRow,
    pub lease_token: Uuid,
    pub leased_until: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            id: row.id,
            owner: row.owner_id,
            target: row.target,
            status: parse_event_status(&row.status)?,
            attempts: u32::try_from(row.attempts).map_err(|_| {
                StoreError::Serialization(format!("negative attempt count: {}", row.attempts))
            })?,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
            resolved_at: row.resolved_at,
        })
    }
}

pub fn parse_event_status(status: &str) -> Result<EventStatus, StoreError> {
    match status {
        "pending" => Ok(EventStatus::Pending),
        "delivered" => Ok(EventStatus::Delivered),
        "failed" => Ok(EventStatus::Failed),
        _ => Err(StoreError::Serialization(format!(
            "Unknown event status: {}",
            status
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str, attempts: i32) -> EventRow {
        let now = Utc::now();
        EventRow {
            id: Uuid::now_v7(),
            owner_id: "user-1".into(),
            target: "https://example.com".into(),
            status: status.into(),
            attempts,
            last_error: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    #[test]
    fn test_parse_event_status() {
        assert_eq!(parse_event_status("pending").unwrap(), EventStatus::Pending);
        assert_eq!(parse_event_status("delivered").unwrap(), EventStatus::Delivered);
        assert_eq!(parse_event_status("failed").unwrap(), EventStatus::Failed);
        assert!(matches!(
            parse_event_status("cancelled"),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_row_conversion() {
        let event = Event::try_from(row("delivered", 3)).unwrap();
        assert_eq!(event.owner, "user-1");
        assert_eq!(event.status, EventStatus::Delivered);
        assert_eq!(event.attempts, 3);
    }

    #[test]
    fn test_row_conversion_rejects_bad_data() {
        assert!(Event::try_from(row("unknown", 0)).is_err());
        assert!(Event::try_from(row("pending", -1)).is_err());
    }
}
