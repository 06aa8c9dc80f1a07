// Postgres storage layer with sqlx
//
// This crate provides:
// - PostgresEventStore: implements EventStore for durable event persistence
// - DatabaseUrl: builds the connection string from EVENTS_DB_* variables

pub mod database_url;
mod models;
pub mod postgres;

pub use database_url::{redact, DatabaseUrl, DatabaseUrlError};
pub use postgres::PostgresEventStore;
