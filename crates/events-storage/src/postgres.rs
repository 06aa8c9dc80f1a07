//! PostgreSQL implementation of EventStore
//!
//! - Claiming with `FOR UPDATE SKIP LOCKED`, a row limit and a lease token per batch
//! - Resolution is a single conditional update on the lease token

use std::time::Duration;

use async_trait::async_trait;
use events_core::{
    validate_new_event, ClaimedEvent, Event, EventId, EventStore, Lease, NewEvent, Resolution,
    StoreError, User, DEFAULT_LEASE_DURATION,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::models::{ClaimedEventRow, EventRow};

const EVENT_COLUMNS: &str =
    "id, owner_id, target, status, attempts, last_error, created_at, updated_at, resolved_at";

/// PostgreSQL implementation of EventStore
///
/// # Example
///
/// ```ignore
/// use events_storage::PostgresEventStore;
/// use sqlx::PgPool;
///
/// let pool = PgPool::connect("postgres://localhost/events").await?;
/// let store = PostgresEventStore::new(pool);
/// store.migrate().await?;
/// ```
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
    lease_duration: Duration,
}

impl PostgresEventStore {
    /// Create a new PostgreSQL store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease_duration: DEFAULT_LEASE_DURATION,
        }
    }

    /// Connect a pool to `database_url`
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| {
                error!("Failed to connect to database: {}", e);
                StoreError::Unavailable(e.to_string())
            })?;
        Ok(Self::new(pool))
    }

    /// Set how long a claim holds an event
    pub fn with_lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    /// Apply embedded migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to run migrations: {}", e);
                StoreError::Unavailable(e.to_string())
            })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn database_error(context: &str, e: sqlx::Error) -> StoreError {
    error!("Failed to {}: {}", context, e);
    StoreError::Unavailable(e.to_string())
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[instrument(skip(self, owner, event), fields(owner = %owner.id))]
    async fn persist_event(&self, owner: &User, event: NewEvent) -> Result<Event, StoreError> {
        validate_new_event(&event)?;

        let row: EventRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO events (id, owner_id, target, status)
            VALUES ($1, $2, $3, 'pending')
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(Uuid::now_v7())
        .bind(&owner.id)
        .bind(&event.target)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| database_error("persist event", e))?;

        let event = Event::try_from(row)?;
        debug!(event_id = %event.id, "persisted event");
        Ok(event)
    }

    #[instrument(skip(self))]
    async fn fetch_due_events(&self, limit: usize) -> Result<Vec<ClaimedEvent>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let lease_token = Uuid::now_v7();

        // One statement: lock due rows no other dispatcher holds, then lease them
        let rows: Vec<ClaimedEventRow> = sqlx::query_as(&format!(
            r#"
            WITH due AS (
                SELECT id
                FROM events
                WHERE status = 'pending'
                  AND (leased_until IS NULL OR leased_until <= NOW())
                ORDER BY id
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            UPDATE events e
            SET lease_token = $1,
                leased_until = NOW() + $2::float8 * INTERVAL '1 millisecond',
                updated_at = NOW()
            FROM due
            WHERE e.id = due.id
            RETURNING {}, e.lease_token, e.leased_until
            "#,
            qualified_columns("e")
        ))
        .bind(lease_token)
        .bind(self.lease_duration.as_millis() as i64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| database_error("claim due events", e))?;

        let mut claimed = rows
            .into_iter()
            .map(|row| {
                let lease = Lease {
                    token: row.lease_token,
                    expires_at: row.leased_until,
                };
                Ok(ClaimedEvent {
                    event: Event::try_from(row.event)?,
                    lease,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        claimed.sort_by_key(|c| c.event.id);

        if !claimed.is_empty() {
            debug!(count = claimed.len(), %lease_token, "claimed due events");
        }
        Ok(claimed)
    }

    #[instrument(skip(self, resolution), fields(status = %resolution.status()))]
    async fn mark_resolved(
        &self,
        event_id: EventId,
        lease_token: Uuid,
        resolution: Resolution,
    ) -> Result<(), StoreError> {
        let attempts = i32::try_from(resolution.attempts())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE events
            SET status = $3,
                attempts = $4,
                last_error = $5,
                lease_token = NULL,
                leased_until = NULL,
                updated_at = NOW(),
                resolved_at = NOW()
            WHERE id = $1
              AND status = 'pending'
              AND lease_token = $2
            "#,
        )
        .bind(event_id)
        .bind(lease_token)
        .bind(resolution.status().as_str())
        .bind(attempts)
        .bind(resolution.error())
        .execute(&self.pool)
        .await
        .map_err(|e| database_error("resolve event", e))?;

        if result.rows_affected() == 1 {
            debug!(%event_id, "resolved event");
            return Ok(());
        }

        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM events WHERE id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| database_error("look up event", e))?;

        match exists {
            Some(_) => Err(StoreError::LeaseLost(event_id)),
            None => Err(StoreError::NotFound(event_id)),
        }
    }

    #[instrument(skip(self))]
    async fn get_event(&self, event_id: EventId) -> Result<Option<Event>, StoreError> {
        let row: Option<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error("get event", e))?;

        row.map(Event::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn list_events(&self, owner: &str) -> Result<Vec<Event>, StoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE owner_id = $1 ORDER BY id"
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| database_error("list events", e))?;

        rows.into_iter().map(Event::try_from).collect()
    }
}

/// `EVENT_COLUMNS` prefixed with a table alias
fn qualified_columns(alias: &str) -> String {
    EVENT_COLUMNS
        .split(", ")
        .map(|column| format!("{alias}.{column}"))
        .collect::<Vec<_>>()
        .join(", ")
}
