//! Background dispatch of due events
//!
//! This module provides:
//! - [`Dispatcher`] - Periodic claim-and-deliver loop with graceful shutdown
//! - [`DispatcherConfig`] - Poll interval, concurrency and shutdown timeout

mod dispatcher;

pub use dispatcher::{CycleReport, Dispatcher, DispatcherConfig, DispatcherError};
