use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use scholarhub_core::{DomainError, ValueObject};

/// Submission fee in both billed denominations.
///
/// Amounts are in the smallest unit of each currency (US cents, whole
/// kwacha). Both denominations are always carried; the payer settles in
/// whichever one the chosen gateway supports. Non-negative by construction;
/// zero is a valid fee (waived) but still requires explicit settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeAmount {
    pub usd_cents: u64,
    pub mwk: u64,
}

impl FeeAmount {
    pub fn new(usd_cents: u64, mwk: u64) -> Self {
        Self { usd_cents, mwk }
    }

    pub fn is_zero(&self) -> bool {
        self.usd_cents == 0 && self.mwk == 0
    }
}

impl ValueObject for FeeAmount {}

/// Payment gateways offered on the payment page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    PayPal,
    Card,
    AirtelMoney,
    MtnMoney,
    BankTransfer,
    Aggregator,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::PayPal => "paypal",
            PaymentMethod::Card => "card",
            PaymentMethod::AirtelMoney => "airtel_money",
            PaymentMethod::MtnMoney => "mtn_money",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Aggregator => "aggregator",
        }
    }
}

impl core::str::FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paypal" => Ok(PaymentMethod::PayPal),
            "card" => Ok(PaymentMethod::Card),
            "airtel_money" => Ok(PaymentMethod::AirtelMoney),
            "mtn_money" => Ok(PaymentMethod::MtnMoney),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "aggregator" => Ok(PaymentMethod::Aggregator),
            other => Err(DomainError::validation(format!(
                "unknown payment method: {other}"
            ))),
        }
    }
}

/// Fee schedule applied when acceptance triggers an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub amount: FeeAmount,
    pub days_until_due: i64,
}

impl FeeSchedule {
    pub fn due_date(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        from + Duration::days(self.days_until_due)
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            amount: FeeAmount::new(199, 2_500),
            days_until_due: 30,
        }
    }
}
