//! Ticket service: user-picked tickets, the system ticket pool generated when
//! a draw opens, bookings, and results.

mod consumer;
mod memory;
mod model;
pub mod numbers;
mod repository;
mod service;

pub use consumer::{DrawActivationHandler, InvoiceSettlementHandler};
pub use memory::{InMemoryTicketRepository, TicketTables};
pub use model::{DrawInfo, NewTicket, Ticket, TicketStatus, TicketWithDraw};
pub use numbers::NumbersError;
pub use repository::{PgTicketRepository, TicketRepository};
pub use service::{TicketError, TicketService};
