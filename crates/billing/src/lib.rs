//! Invoice & payment ledger domain: invoices, attempts, settlement, expiry.

mod account;
mod fees;

pub use account::{
    AttemptId, AttemptOutcome, BillingAccount, BillingAccountId, BillingCommand, BillingEvent,
    ExpireInvoice, Invoice, InvoiceExpired, InvoiceId, InvoiceOpened, InvoiceStatus, OpenInvoice,
    PaymentAttempt, PaymentAttemptRecorded, PaymentFailed, PaymentSucceeded, RecordPaymentAttempt,
    SettlePayment, SettlementOutcome,
};
pub use fees::{FeeAmount, FeeSchedule, PaymentMethod};
