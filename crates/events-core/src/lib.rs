//! # Event Delivery Engine
//!
//! Accepts scheduled events from authenticated users and delivers each one
//! to its target URL from a background loop.
//!
//! ## Features
//!
//! - **Durable hand-off**: Events are persisted before ingestion returns
//! - **Bounded retries**: 20 attempts with exponential backoff capped at 10s
//! - **Failure isolation**: One unreachable target never stalls the batch or the loop
//! - **Leased claims**: A claimed event is not handed to a second dispatcher while its lease holds
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Dispatcher                            │
//! │  (every poll interval: claim due events, deliver, resolve)  │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                              │
//!                 ▼                              ▼
//! ┌───────────────────────────┐  ┌──────────────────────────────┐
//! │        EventStore         │  │       DeliveryExecutor       │
//! │  (in-memory or Postgres)  │  │  (GET target, retry/backoff) │
//! └───────────────────────────┘  └──────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use events_core::prelude::*;
//!
//! let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
//! let transport = Arc::new(HttpTransport::new(DEFAULT_DELIVERY_TIMEOUT)?);
//! let executor = Arc::new(DeliveryExecutor::new(transport, RetryPolicy::delivery()));
//!
//! let dispatcher = Arc::new(Dispatcher::new(store.clone(), executor, DispatcherConfig::default()));
//! dispatcher.start()?;
//!
//! store
//!     .persist_event(&User::new("user-1"), NewEvent::new("https://example.com/hook"))
//!     .await?;
//! ```

pub mod delivery;
pub mod dispatch;
pub mod event;
pub mod persistence;
pub mod reliability;

/// Prelude for common imports
pub mod prelude {
    pub use crate::delivery::{
        DeliveryError, DeliveryExecutor, DeliveryTransport, HttpTransport,
        DEFAULT_DELIVERY_TIMEOUT,
    };
    pub use crate::dispatch::{CycleReport, Dispatcher, DispatcherConfig, DispatcherError};
    pub use crate::event::{Event, EventId, EventStatus, NewEvent, Resolution, User};
    pub use crate::persistence::{EventStore, InMemoryEventStore, StoreError};
    pub use crate::reliability::RetryPolicy;
}

// Re-export key types at crate root
pub use delivery::{
    AttemptFailure, Delivered, DeliveryError, DeliveryExecutor, DeliveryTransport, HttpTransport,
    TransportError, DEFAULT_DELIVERY_TIMEOUT,
};
pub use dispatch::{CycleReport, Dispatcher, DispatcherConfig, DispatcherError};
pub use event::{ClaimedEvent, Event, EventId, EventStatus, Lease, NewEvent, Resolution, User};
pub use persistence::{
    validate_new_event, EventStore, InMemoryEventStore, StoreError, DEFAULT_LEASE_DURATION,
};
pub use reliability::{RetryPolicy, Sleeper, TokioSleeper};
