//! Reliability patterns for event delivery
//!
//! This module provides:
//! - [`RetryPolicy`] - Bounded retries with capped exponential backoff
//! - [`Sleeper`] - Injectable wait between attempts

mod retry;
mod sleep;

pub use retry::RetryPolicy;
pub use sleep::{Sleeper, TokioSleeper};
