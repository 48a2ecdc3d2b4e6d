use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use scholarhub_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Entity};
use scholarhub_events::Event;
use scholarhub_submissions::SubmissionId;

use crate::fees::{FeeAmount, PaymentMethod};

/// Namespace for deriving billing stream ids from submission ids.
const BILLING_STREAM_NAMESPACE: Uuid = Uuid::from_u128(0x9c35_1adc_f0de_4b41_9b1e_27d6_83a4_55c2);

/// Billing account identifier: one stream per submission.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillingAccountId(pub AggregateId);

impl BillingAccountId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    /// Derive the unique billing stream for a submission.
    ///
    /// Deterministic: concurrent invoice triggers for the same submission
    /// land on the same stream and serialize there, which is what makes
    /// "at most one Open invoice per submission" enforceable.
    pub fn for_submission(submission_id: SubmissionId) -> Self {
        Self(AggregateId::derived(
            &BILLING_STREAM_NAMESPACE,
            submission_id.0.as_uuid(),
        ))
    }
}

impl core::fmt::Display for BillingAccountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Invoice identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Payment attempt identifier (gateway correlation handle).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(pub AggregateId);

impl AttemptId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Invoice status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Open,
    Paid,
    Expired,
}

/// Outcome of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Pending,
    Succeeded,
    Failed,
}

/// Terminal outcome reported by a gateway callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    Succeeded,
    Failed,
}

impl SettlementOutcome {
    fn as_attempt_outcome(self) -> AttemptOutcome {
        match self {
            SettlementOutcome::Succeeded => AttemptOutcome::Succeeded,
            SettlementOutcome::Failed => AttemptOutcome::Failed,
        }
    }
}

/// One gateway interaction against an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub id: AttemptId,
    pub method: PaymentMethod,
    pub outcome: AttemptOutcome,
    pub requested_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Entity for PaymentAttempt {
    type Id = AttemptId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A payable obligation tied to one submission; owns its attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub submission_id: SubmissionId,
    pub amount: FeeAmount,
    pub due_date: DateTime<Utc>,
    pub status: InvoiceStatus,
    pub attempts: Vec<PaymentAttempt>,
}

impl Invoice {
    pub fn attempt(&self, attempt_id: AttemptId) -> Option<&PaymentAttempt> {
        self.attempts.iter().find(|a| a.id == attempt_id)
    }

    fn attempt_mut(&mut self, attempt_id: AttemptId) -> Option<&mut PaymentAttempt> {
        self.attempts.iter_mut().find(|a| a.id == attempt_id)
    }

    fn pending_attempt_ids(&self) -> Vec<AttemptId> {
        self.attempts
            .iter()
            .filter(|a| a.outcome == AttemptOutcome::Pending)
            .map(|a| a.id)
            .collect()
    }
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Aggregate root: BillingAccount.
///
/// One billing stream per submission, holding the current invoice and any
/// expired predecessors. All billing mutations for a submission serialize
/// through this stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingAccount {
    id: BillingAccountId,
    submission_id: Option<SubmissionId>,
    current: Option<Invoice>,
    history: Vec<Invoice>,
    version: u64,
}

impl BillingAccount {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: BillingAccountId) -> Self {
        Self {
            id,
            submission_id: None,
            current: None,
            history: Vec::new(),
            version: 0,
        }
    }

    pub fn id_typed(&self) -> BillingAccountId {
        self.id
    }

    pub fn submission_id(&self) -> Option<SubmissionId> {
        self.submission_id
    }

    /// The latest invoice, whatever its status.
    pub fn current_invoice(&self) -> Option<&Invoice> {
        self.current.as_ref()
    }

    /// The invoice currently accepting payment, if any.
    pub fn open_invoice(&self) -> Option<&Invoice> {
        self.current
            .as_ref()
            .filter(|inv| inv.status == InvoiceStatus::Open)
    }

    /// Expired predecessors of the current invoice, oldest first.
    pub fn past_invoices(&self) -> &[Invoice] {
        &self.history
    }

    /// Locate an attempt across the current invoice and its predecessors.
    pub fn find_attempt(&self, attempt_id: AttemptId) -> Option<(&Invoice, &PaymentAttempt)> {
        self.current
            .iter()
            .chain(self.history.iter())
            .find_map(|inv| inv.attempt(attempt_id).map(|a| (inv, a)))
    }
}

impl AggregateRoot for BillingAccount {
    type Id = BillingAccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenInvoice {
    pub account_id: BillingAccountId,
    pub submission_id: SubmissionId,
    pub invoice_id: InvoiceId,
    pub amount: FeeAmount,
    pub due_date: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPaymentAttempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPaymentAttempt {
    pub account_id: BillingAccountId,
    pub invoice_id: InvoiceId,
    pub attempt_id: AttemptId,
    pub method: PaymentMethod,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SettlePayment (gateway callback).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlePayment {
    pub account_id: BillingAccountId,
    pub attempt_id: AttemptId,
    pub outcome: SettlementOutcome,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ExpireInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireInvoice {
    pub account_id: BillingAccountId,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingCommand {
    OpenInvoice(OpenInvoice),
    RecordPaymentAttempt(RecordPaymentAttempt),
    SettlePayment(SettlePayment),
    ExpireInvoice(ExpireInvoice),
}

/// Event: InvoiceOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceOpened {
    pub account_id: BillingAccountId,
    pub submission_id: SubmissionId,
    pub invoice_id: InvoiceId,
    pub amount: FeeAmount,
    pub due_date: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentAttemptRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAttemptRecorded {
    pub account_id: BillingAccountId,
    pub invoice_id: InvoiceId,
    pub attempt_id: AttemptId,
    pub method: PaymentMethod,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentSucceeded.
///
/// Carries the sibling attempts superseded by this settlement so replaying
/// the event reproduces the exact same read state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSucceeded {
    pub account_id: BillingAccountId,
    pub invoice_id: InvoiceId,
    pub attempt_id: AttemptId,
    pub superseded: Vec<AttemptId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentFailed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailed {
    pub account_id: BillingAccountId,
    pub invoice_id: InvoiceId,
    pub attempt_id: AttemptId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceExpired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceExpired {
    pub account_id: BillingAccountId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingEvent {
    InvoiceOpened(InvoiceOpened),
    PaymentAttemptRecorded(PaymentAttemptRecorded),
    PaymentSucceeded(PaymentSucceeded),
    PaymentFailed(PaymentFailed),
    InvoiceExpired(InvoiceExpired),
}

impl Event for BillingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BillingEvent::InvoiceOpened(_) => "billing.account.invoice_opened",
            BillingEvent::PaymentAttemptRecorded(_) => "billing.account.payment_attempt_recorded",
            BillingEvent::PaymentSucceeded(_) => "billing.account.payment_succeeded",
            BillingEvent::PaymentFailed(_) => "billing.account.payment_failed",
            BillingEvent::InvoiceExpired(_) => "billing.account.invoice_expired",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BillingEvent::InvoiceOpened(e) => e.occurred_at,
            BillingEvent::PaymentAttemptRecorded(e) => e.occurred_at,
            BillingEvent::PaymentSucceeded(e) => e.occurred_at,
            BillingEvent::PaymentFailed(e) => e.occurred_at,
            BillingEvent::InvoiceExpired(e) => e.occurred_at,
        }
    }
}

impl Aggregate for BillingAccount {
    type Command = BillingCommand;
    type Event = BillingEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BillingEvent::InvoiceOpened(e) => {
                if let Some(previous) = self.current.take() {
                    self.history.push(previous);
                }
                self.id = e.account_id;
                self.submission_id = Some(e.submission_id);
                self.current = Some(Invoice {
                    id: e.invoice_id,
                    submission_id: e.submission_id,
                    amount: e.amount,
                    due_date: e.due_date,
                    status: InvoiceStatus::Open,
                    attempts: Vec::new(),
                });
            }
            BillingEvent::PaymentAttemptRecorded(e) => {
                if let Some(inv) = self.current.as_mut().filter(|inv| inv.id == e.invoice_id) {
                    inv.attempts.push(PaymentAttempt {
                        id: e.attempt_id,
                        method: e.method,
                        outcome: AttemptOutcome::Pending,
                        requested_at: e.occurred_at,
                        settled_at: None,
                    });
                }
            }
            BillingEvent::PaymentSucceeded(e) => {
                if let Some(inv) = self.current.as_mut().filter(|inv| inv.id == e.invoice_id) {
                    inv.status = InvoiceStatus::Paid;
                    if let Some(attempt) = inv.attempt_mut(e.attempt_id) {
                        attempt.outcome = AttemptOutcome::Succeeded;
                        attempt.settled_at = Some(e.occurred_at);
                    }
                    for superseded in &e.superseded {
                        if let Some(attempt) = inv.attempt_mut(*superseded) {
                            attempt.outcome = AttemptOutcome::Failed;
                            attempt.settled_at = Some(e.occurred_at);
                        }
                    }
                }
            }
            BillingEvent::PaymentFailed(e) => {
                let invoice = self
                    .current
                    .iter_mut()
                    .chain(self.history.iter_mut())
                    .find(|inv| inv.id == e.invoice_id);
                if let Some(inv) = invoice {
                    if let Some(attempt) = inv.attempt_mut(e.attempt_id) {
                        attempt.outcome = AttemptOutcome::Failed;
                        attempt.settled_at = Some(e.occurred_at);
                    }
                }
            }
            BillingEvent::InvoiceExpired(e) => {
                if let Some(inv) = self.current.as_mut().filter(|inv| inv.id == e.invoice_id) {
                    inv.status = InvoiceStatus::Expired;
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BillingCommand::OpenInvoice(cmd) => self.handle_open(cmd),
            BillingCommand::RecordPaymentAttempt(cmd) => self.handle_record_attempt(cmd),
            BillingCommand::SettlePayment(cmd) => self.handle_settle(cmd),
            BillingCommand::ExpireInvoice(cmd) => self.handle_expire(cmd),
        }
    }
}

impl BillingAccount {
    fn ensure_account_id(&self, account_id: BillingAccountId) -> Result<(), DomainError> {
        if self.id != account_id {
            return Err(DomainError::invalid_id("billing account_id mismatch"));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenInvoice) -> Result<Vec<BillingEvent>, DomainError> {
        self.ensure_account_id(cmd.account_id)?;

        if let Some(owner) = self.submission_id {
            if owner != cmd.submission_id {
                return Err(DomainError::invalid_id(
                    "billing account belongs to a different submission",
                ));
            }
        }

        match self.current.as_ref().map(|inv| inv.status) {
            // Idempotent: an Open invoice already covers the obligation.
            Some(InvoiceStatus::Open) => Ok(vec![]),
            Some(InvoiceStatus::Paid) => Err(DomainError::invalid_state(
                "submission fee is already settled",
            )),
            // Expired (or none): open a fresh invoice.
            Some(InvoiceStatus::Expired) | None => {
                Ok(vec![BillingEvent::InvoiceOpened(InvoiceOpened {
                    account_id: cmd.account_id,
                    submission_id: cmd.submission_id,
                    invoice_id: cmd.invoice_id,
                    amount: cmd.amount,
                    due_date: cmd.due_date,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }

    fn handle_record_attempt(
        &self,
        cmd: &RecordPaymentAttempt,
    ) -> Result<Vec<BillingEvent>, DomainError> {
        self.ensure_account_id(cmd.account_id)?;

        // Unknown invoice and non-open invoice are both NotFound to the
        // caller: there is nothing payable behind that id.
        let Some(open) = self.open_invoice() else {
            return Err(DomainError::not_found());
        };
        if open.id != cmd.invoice_id {
            return Err(DomainError::not_found());
        }

        if self.find_attempt(cmd.attempt_id).is_some() {
            return Err(DomainError::conflict("payment attempt already recorded"));
        }

        Ok(vec![BillingEvent::PaymentAttemptRecorded(
            PaymentAttemptRecorded {
                account_id: cmd.account_id,
                invoice_id: cmd.invoice_id,
                attempt_id: cmd.attempt_id,
                method: cmd.method,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_settle(&self, cmd: &SettlePayment) -> Result<Vec<BillingEvent>, DomainError> {
        self.ensure_account_id(cmd.account_id)?;

        let Some((invoice, attempt)) = self.find_attempt(cmd.attempt_id) else {
            return Err(DomainError::not_found());
        };

        match attempt.outcome {
            AttemptOutcome::Pending => {}
            already => {
                // Idempotent when the gateway retries the same outcome;
                // conflicting re-settlement must be surfaced.
                if already == cmd.outcome.as_attempt_outcome() {
                    return Ok(vec![]);
                }
                return Err(DomainError::conflict(format!(
                    "attempt {} already settled as {already:?}",
                    cmd.attempt_id
                )));
            }
        }

        match cmd.outcome {
            SettlementOutcome::Succeeded => {
                if invoice.status != InvoiceStatus::Open {
                    return Err(DomainError::invalid_state(
                        "invoice is no longer open; re-invoice before settling",
                    ));
                }
                let superseded = invoice
                    .pending_attempt_ids()
                    .into_iter()
                    .filter(|id| *id != cmd.attempt_id)
                    .collect();
                Ok(vec![BillingEvent::PaymentSucceeded(PaymentSucceeded {
                    account_id: cmd.account_id,
                    invoice_id: invoice.id,
                    attempt_id: cmd.attempt_id,
                    superseded,
                    occurred_at: cmd.occurred_at,
                })])
            }
            SettlementOutcome::Failed => {
                Ok(vec![BillingEvent::PaymentFailed(PaymentFailed {
                    account_id: cmd.account_id,
                    invoice_id: invoice.id,
                    attempt_id: cmd.attempt_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }

    fn handle_expire(&self, cmd: &ExpireInvoice) -> Result<Vec<BillingEvent>, DomainError> {
        self.ensure_account_id(cmd.account_id)?;

        // Sweep-friendly: nothing to expire is a no-op, not an error.
        let Some(open) = self.open_invoice() else {
            return Ok(vec![]);
        };
        if open.due_date >= cmd.now {
            return Ok(vec![]);
        }

        Ok(vec![BillingEvent::InvoiceExpired(InvoiceExpired {
            account_id: cmd.account_id,
            invoice_id: open.id,
            occurred_at: cmd.now,
        })])
    }
}
