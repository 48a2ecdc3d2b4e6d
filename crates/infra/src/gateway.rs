//! Payment gateway port.
//!
//! The core never talks to a gateway on the request path: it records a
//! Pending attempt, hands the correlation id to the adapter fire-and-forget,
//! and waits for the adapter (or an operator) to call the settlement endpoint
//! with a terminal outcome. Adapter failures therefore surface as Failed
//! attempts, never as core faults.

use std::sync::Mutex;

use thiserror::Error;
use tracing::info;

use scholarhub_billing::{AttemptId, FeeAmount, InvoiceId, PaymentMethod};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway rejected hand-off: {0}")]
    Rejected(String),
}

/// Hand-off request passed to a gateway adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRequest {
    pub invoice_id: InvoiceId,
    pub attempt_id: AttemptId,
    pub amount: FeeAmount,
    pub method: PaymentMethod,
}

/// Outbound port to card / mobile-money / bank / aggregator adapters.
pub trait PaymentGateway: Send + Sync {
    /// Initiate a payment fire-and-forget.
    ///
    /// The adapter is expected to eventually report a terminal outcome for
    /// `request.attempt_id` through the settlement endpoint.
    fn initiate(&self, request: GatewayRequest) -> Result<(), GatewayError>;
}

/// Dev/test adapter: logs the hand-off and succeeds.
#[derive(Debug, Default)]
pub struct LoggingPaymentGateway;

impl PaymentGateway for LoggingPaymentGateway {
    fn initiate(&self, request: GatewayRequest) -> Result<(), GatewayError> {
        info!(
            invoice_id = %request.invoice_id,
            attempt_id = %request.attempt_id,
            method = request.method.as_str(),
            usd_cents = request.amount.usd_cents,
            mwk = request.amount.mwk,
            "handing payment attempt to gateway"
        );
        Ok(())
    }
}

/// Test adapter: records every hand-off for assertions.
#[derive(Debug, Default)]
pub struct RecordingPaymentGateway {
    requests: Mutex<Vec<GatewayRequest>>,
}

impl RecordingPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<GatewayRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl PaymentGateway for RecordingPaymentGateway {
    fn initiate(&self, request: GatewayRequest) -> Result<(), GatewayError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scholarhub_core::AggregateId;

    #[test]
    fn hand_off_carries_full_correlation() {
        let gateway = RecordingPaymentGateway::new();
        let request = GatewayRequest {
            invoice_id: InvoiceId::new(AggregateId::new()),
            attempt_id: AttemptId::new(AggregateId::new()),
            amount: FeeAmount::new(199, 2_500),
            method: PaymentMethod::AirtelMoney,
        };

        gateway.initiate(request.clone()).unwrap();

        assert_eq!(gateway.requests(), vec![request]);
    }
}
