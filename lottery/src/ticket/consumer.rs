//! Ticket-side reactions to draw and invoice events.
//!
//! | Channel          | Event                                 | Reaction                      |
//! |------------------|---------------------------------------|-------------------------------|
//! | `draw_events`    | `draw_activated`                      | generate the draw's ticket pool |
//! | `invoice_events` | `invoice_overdue`, `invoice_failure`  | release the ticket's booking  |
//!
//! Every other event type is ignored. Both handlers plug into
//! [`lottery_runtime::EventConsumer`], which owns the receive loop.

use super::repository::TicketRepository;
use super::service::TicketService;
use crate::draw::{DrawEvent, DrawEventKind};
use crate::payment::{InvoiceEvent, InvoiceEventKind};
use async_trait::async_trait;
use lottery_core::event::{Event, EventError};
use lottery_runtime::{EventHandler, HandlerError};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Just the `type` tag of an envelope.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

fn event_type(payload: &[u8]) -> Result<String, EventError> {
    serde_json::from_slice::<Envelope>(payload)
        .map(|envelope| envelope.kind)
        .map_err(|e| EventError::DeserializationError(e.to_string()))
}

/// Generates the system ticket pool when a draw is activated.
pub struct DrawActivationHandler<R> {
    tickets: Arc<TicketService<R>>,
    pool_size: usize,
}

impl<R> DrawActivationHandler<R> {
    /// Generate `pool_size` tickets per activated draw.
    #[must_use]
    pub const fn new(tickets: Arc<TicketService<R>>, pool_size: usize) -> Self {
        Self { tickets, pool_size }
    }
}

#[async_trait]
impl<R: TicketRepository> EventHandler for DrawActivationHandler<R> {
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        let kind = event_type(payload)?;
        if kind != DrawEventKind::DrawActivated.as_str() {
            debug!(event = %kind, "Ignoring draw event");
            return Ok(());
        }

        let event = DrawEvent::from_json(payload)?;
        let generated = self
            .tickets
            .generate_tickets(event.draw.id, self.pool_size)
            .await
            .map_err(|e| HandlerError::Failed(e.to_string()))?;

        info!(draw_id = %event.draw.id, count = generated.len(), "Draw activated, ticket pool ready");
        Ok(())
    }
}

/// Releases a ticket's booking when its invoice lapses or could not be
/// created.
pub struct InvoiceSettlementHandler<R> {
    tickets: Arc<TicketService<R>>,
}

impl<R> InvoiceSettlementHandler<R> {
    /// Release bookings through `tickets`.
    #[must_use]
    pub const fn new(tickets: Arc<TicketService<R>>) -> Self {
        Self { tickets }
    }
}

#[async_trait]
impl<R: TicketRepository> EventHandler for InvoiceSettlementHandler<R> {
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        let kind = event_type(payload)?;
        let releases = [
            InvoiceEventKind::InvoiceOverdue.as_str(),
            InvoiceEventKind::InvoiceFailure.as_str(),
        ];
        if !releases.contains(&kind.as_str()) {
            debug!(event = %kind, "Ignoring invoice event");
            return Ok(());
        }

        let event = InvoiceEvent::from_json(payload)?;
        self.tickets
            .release_booking(event.ticket_id)
            .await
            .map_err(|e| HandlerError::Failed(e.to_string()))?;

        info!(ticket_id = %event.ticket_id, event = %kind, "Ticket returned to the pool");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn envelope_tag_is_read_without_the_payload() {
        assert_eq!(event_type(br#"{"type":"draw_started","x":1}"#).unwrap(), "draw_started");
        assert!(event_type(b"not json").is_err());
        assert!(event_type(br#"{"draw":{}}"#).is_err());
    }
}
