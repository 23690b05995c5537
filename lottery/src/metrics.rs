//! Business metrics of the lottery services.
//!
//! # Exported Metrics
//!
//! - `lottery_draw_transitions_total{status}` - Draws moved to ACTIVE, COMPLETED, or CANCELLED
//! - `lottery_tickets_generated_total` - System tickets created for draw pools
//! - `lottery_bookings_released_total` - Bookings returned to the pool
//! - `lottery_payments_total{status}` - Charge attempts by outcome (PAID, REJECTED, declined)
//! - `lottery_refunds_total{outcome}` - Compensating refunds (refunded, failed)
//! - `lottery_invoices_overdue_total` - Invoices expired by the sweep
//!
//! Transaction, scheduler, and consumer counters are described by
//! [`lottery_runtime::metrics::MetricsServer`].

use metrics::describe_counter;

/// Register descriptions of every business metric.
///
/// Call once at startup, after the exporter is installed.
pub fn register_lottery_metrics() {
    describe_counter!(
        "lottery_draw_transitions_total",
        "Draw state transitions by target status"
    );
    describe_counter!(
        "lottery_tickets_generated_total",
        "System tickets generated for activated draws"
    );
    describe_counter!(
        "lottery_bookings_released_total",
        "Ticket bookings released after an invoice lapsed or failed"
    );
    describe_counter!(
        "lottery_payments_total",
        "Payment attempts by status (PAID, REJECTED, declined)"
    );
    describe_counter!(
        "lottery_refunds_total",
        "Compensating refunds by outcome (refunded, failed)"
    );
    describe_counter!(
        "lottery_invoices_overdue_total",
        "Pending invoices marked overdue"
    );
}
