//! Persistence layer for events
//!
//! This module provides:
//! - [`EventStore`] trait for event persistence and claiming
//! - [`InMemoryEventStore`] for development and testing
//!
//! The PostgreSQL implementation lives in the `events-storage` crate.

mod memory;
mod store;

pub use memory::{InMemoryEventStore, DEFAULT_LEASE_DURATION};
pub use store::{validate_new_event, EventStore, StoreError};
