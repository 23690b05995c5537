//! Payment service: invoices for booked tickets, the card payment saga, and
//! the overdue sweep.

pub mod card;
mod event;
mod gateway;
mod memory;
mod model;
mod repository;
mod service;

pub use card::{Card, CardError};
pub use event::{InvoiceEvent, InvoiceEventKind};
pub use gateway::{GatewayError, GatewayResult, GatewayTransactionId, MockPaymentGateway, PaymentGateway};
pub use memory::{InMemoryInvoiceRepository, InvoiceTables};
pub use model::{Invoice, InvoiceStatus, NewInvoice, Payment, PaymentStatus, TicketRef};
pub use repository::{InvoiceRepository, PgInvoiceRepository};
pub use service::{PaymentError, PaymentService, PaymentSettings, TicketBooking};
