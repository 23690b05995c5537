//! External payment processor.
//!
//! The gateway is not transactional: a charge that succeeded stays charged
//! until it is explicitly refunded.

use super::card::Card;
use crate::types::Money;
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Gateway result
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors reported by the gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The processor refused the charge or refund
    #[error("Payment declined: {0}")]
    Declined(String),

    /// The processor could not be reached
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),
}

/// Processor-side identifier of a charge, needed to refund it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GatewayTransactionId(String);

impl GatewayTransactionId {
    /// Wrap a processor id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GatewayTransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payment processor.
pub trait PaymentGateway: Send + Sync {
    /// Charge `amount` to `card`.
    ///
    /// # Errors
    ///
    /// [`GatewayError`] when nothing was charged.
    fn charge<'a>(
        &'a self,
        card: &'a Card,
        amount: Money,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<GatewayTransactionId>> + Send + 'a>>;

    /// Return a previous charge.
    ///
    /// # Errors
    ///
    /// [`GatewayError`] when the refund was not accepted.
    fn refund<'a>(
        &'a self,
        transaction: &'a GatewayTransactionId,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<()>> + Send + 'a>>;
}

/// Simulated processor for development and tests.
///
/// Each call fails with probability `failure_rate`. A card with CVV `123` is
/// always charged successfully. Charges and refunds are recorded so tests can
/// assert on them.
#[derive(Debug, Default)]
pub struct MockPaymentGateway {
    failure_rate: f64,
    charges: Mutex<Vec<(GatewayTransactionId, Money)>>,
    refunds: Mutex<Vec<GatewayTransactionId>>,
}

impl MockPaymentGateway {
    /// CVV that is never declined.
    pub const APPROVED_CVV: &'static str = "123";

    /// Create a gateway failing with probability `failure_rate`, clamped to
    /// `0.0..=1.0`.
    #[must_use]
    pub fn new(failure_rate: f64) -> Self {
        let failure_rate = if failure_rate.is_nan() { 0.0 } else { failure_rate.clamp(0.0, 1.0) };
        Self {
            failure_rate,
            ..Self::default()
        }
    }

    /// Successful charges so far.
    #[must_use]
    pub fn charges(&self) -> Vec<(GatewayTransactionId, Money)> {
        self.charges.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Successful refunds so far.
    #[must_use]
    pub fn refunds(&self) -> Vec<GatewayTransactionId> {
        self.refunds.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn fails(&self) -> bool {
        rand::thread_rng().gen_bool(self.failure_rate)
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn charge<'a>(
        &'a self,
        card: &'a Card,
        amount: Money,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<GatewayTransactionId>> + Send + 'a>> {
        let declined = card.cvv != Self::APPROVED_CVV && self.fails();
        Box::pin(async move {
            if declined {
                tracing::info!(card = %card.last_four(), amount = %amount, "Mock charge declined");
                return Err(GatewayError::Declined("payment failure".to_string()));
            }

            let id = GatewayTransactionId::new(format!("mock_txn_{}", uuid::Uuid::new_v4()));
            self.charges
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((id.clone(), amount));
            tracing::info!(card = %card.last_four(), amount = %amount, transaction = %id, "Mock charge accepted");
            Ok(id)
        })
    }

    fn refund<'a>(
        &'a self,
        transaction: &'a GatewayTransactionId,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<()>> + Send + 'a>> {
        let declined = self.fails();
        Box::pin(async move {
            if declined {
                return Err(GatewayError::Unavailable("refund failure".to_string()));
            }
            self.refunds
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(transaction.clone());
            tracing::info!(transaction = %transaction, "Mock refund processed");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn card(cvv: &str) -> Card {
        Card::new("4111111111111111", "12/30", cvv)
    }

    #[tokio::test]
    async fn reliable_gateway_charges_and_refunds() {
        let gateway = MockPaymentGateway::new(0.0);
        let amount = Money::from_cents(10_000);

        let id = gateway.charge(&card("999"), amount).await.unwrap();
        assert!(id.as_str().starts_with("mock_txn_"));
        assert_eq!(gateway.charges(), vec![(id.clone(), amount)]);

        gateway.refund(&id).await.unwrap();
        assert_eq!(gateway.refunds(), vec![id]);
    }

    #[tokio::test]
    async fn failing_gateway_declines_but_honours_the_approved_cvv() {
        let gateway = MockPaymentGateway::new(1.0);
        let amount = Money::from_cents(100);

        let declined = gateway.charge(&card("999"), amount).await;
        assert!(matches!(declined, Err(GatewayError::Declined(_))));
        assert!(gateway.charges().is_empty());

        assert!(gateway.charge(&card(MockPaymentGateway::APPROVED_CVV), amount).await.is_ok());
    }

    #[test]
    fn failure_rate_is_clamped() {
        assert!(MockPaymentGateway::new(f64::NAN).failure_rate.abs() < f64::EPSILON);
        assert!((MockPaymentGateway::new(7.0).failure_rate - 1.0).abs() < f64::EPSILON);
        assert!(MockPaymentGateway::new(-1.0).failure_rate.abs() < f64::EPSILON);
    }
}
