//! Event delivery
//!
//! This module provides:
//! - [`DeliveryExecutor`] - Delivers one event with bounded retries
//! - [`DeliveryTransport`] - The outbound call, with [`HttpTransport`] as the reqwest implementation

mod executor;
mod transport;

pub use executor::{AttemptFailure, Delivered, DeliveryError, DeliveryExecutor};
pub use transport::{DeliveryTransport, HttpTransport, TransportError, DEFAULT_DELIVERY_TIMEOUT};
