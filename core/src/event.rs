//! Event trait for notifications carried between services.
//!
//! Every notification is a JSON envelope with a `type` tag next to its payload:
//!
//! ```json
//! {"type": "draw_activated", "draw": {"id": 7, "status": "ACTIVE"}}
//! {"type": "invoice_overdue", "ticket_id": 12}
//! ```
//!
//! # Example
//!
//! ```
//! use lottery_core::event::Event;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! #[serde(tag = "type", rename_all = "snake_case")]
//! enum BellEvent {
//!     BellRung { times: u32 },
//! }
//!
//! impl Event for BellEvent {
//!     fn event_type(&self) -> &'static str {
//!         "bell_rung"
//!     }
//! }
//!
//! let bytes = BellEvent::BellRung { times: 2 }.to_json().unwrap();
//! assert_eq!(bytes, br#"{"type":"bell_rung","times":2}"#);
//! ```

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Error types for event operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),
}

/// A notification that can travel over the event bus.
///
/// `event_type()` returns the stable wire tag (`"draw_activated"`, ...). The
/// default methods encode and decode the JSON envelope.
pub trait Event: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Wire tag of this event.
    fn event_type(&self) -> &'static str;

    /// Encode the event as a JSON envelope.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if serialization fails.
    fn to_json(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Decode an event from a JSON envelope.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DeserializationError`] when the payload does not
    /// match the schema.
    fn from_json(bytes: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}
