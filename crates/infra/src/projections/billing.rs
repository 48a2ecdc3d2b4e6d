use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use scholarhub_billing::{
    AttemptId, AttemptOutcome, BillingAccountId, BillingEvent, FeeAmount, InvoiceId, InvoiceStatus,
    PaymentMethod,
};
use scholarhub_core::AggregateId;
use scholarhub_events::EventEnvelope;
use scholarhub_submissions::SubmissionId;

use crate::read_model::ReadModelStore;

/// One gateway interaction row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptReadModel {
    pub attempt_id: AttemptId,
    pub method: PaymentMethod,
    pub outcome: AttemptOutcome,
    pub requested_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

/// Current invoice row for a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceReadModel {
    pub invoice_id: InvoiceId,
    pub amount: FeeAmount,
    pub due_date: DateTime<Utc>,
    pub status: InvoiceStatus,
    pub attempts: Vec<AttemptReadModel>,
}

/// Billing row per submission: the current invoice plus expired predecessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingReadModel {
    pub account_id: BillingAccountId,
    pub submission_id: SubmissionId,
    pub invoice: InvoiceReadModel,
    pub past_invoice_ids: Vec<InvoiceId>,
    pub updated_at: DateTime<Utc>,
    pub revision: u64,
}

#[derive(Debug, Error)]
pub enum BillingProjectionError {
    #[error("failed to deserialize billing event: {0}")]
    Deserialize(String),

    #[error("event stream mismatch: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Billing ledger projection: invoices and attempts per submission.
///
/// Also maintains the correlation indexes the settlement callback and the
/// attempt route need: invoice id → submission and attempt id → submission.
#[derive(Debug)]
pub struct BillingLedgerProjection<S>
where
    S: ReadModelStore<SubmissionId, BillingReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
    invoice_index: RwLock<HashMap<InvoiceId, SubmissionId>>,
    attempt_index: RwLock<HashMap<AttemptId, SubmissionId>>,
}

impl<S> BillingLedgerProjection<S>
where
    S: ReadModelStore<SubmissionId, BillingReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
            invoice_index: RwLock::new(HashMap::new()),
            attempt_index: RwLock::new(HashMap::new()),
        }
    }

    fn cursor(&self, aggregate_id: AggregateId) -> u64 {
        match self.cursors.read() {
            Ok(cursors) => *cursors.get(&aggregate_id).unwrap_or(&0),
            Err(_) => 0,
        }
    }

    fn update_cursor(&self, aggregate_id: AggregateId, sequence_number: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(aggregate_id, sequence_number);
        }
    }

    /// Billing row for a submission, if an invoice was ever opened.
    pub fn get(&self, submission_id: &SubmissionId) -> Option<BillingReadModel> {
        self.store.get(submission_id)
    }

    /// Resolve the submission owning an invoice.
    pub fn submission_for_invoice(&self, invoice_id: &InvoiceId) -> Option<SubmissionId> {
        self.invoice_index.read().ok()?.get(invoice_id).copied()
    }

    /// Resolve the submission owning a payment attempt.
    pub fn submission_for_attempt(&self, attempt_id: &AttemptId) -> Option<SubmissionId> {
        self.attempt_index.read().ok()?.get(attempt_id).copied()
    }

    /// All rows whose current invoice is Open (payable join, expiry sweep).
    pub fn list_open(&self) -> Vec<BillingReadModel> {
        let mut rows: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|rm| rm.invoice.status == InvoiceStatus::Open)
            .collect();
        rows.sort_by_key(|rm| (rm.invoice.due_date, rm.submission_id.0));
        rows
    }

    /// Open rows past their due date.
    pub fn list_overdue(&self, now: DateTime<Utc>) -> Vec<BillingReadModel> {
        self.list_open()
            .into_iter()
            .filter(|rm| rm.invoice.due_date < now)
            .collect()
    }

    /// Apply an envelope into the ledger read model.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), BillingProjectionError> {
        if envelope.aggregate_type() != "billing.account" {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        let last = self.cursor(aggregate_id);

        if seq == 0 {
            return Err(BillingProjectionError::NonMonotonicSequence { last, found: seq });
        }

        // Idempotent under at-least-once delivery.
        if seq <= last {
            return Ok(());
        }

        if seq != last + 1 && last != 0 {
            return Err(BillingProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: BillingEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| BillingProjectionError::Deserialize(e.to_string()))?;

        let account_id = match &ev {
            BillingEvent::InvoiceOpened(e) => e.account_id,
            BillingEvent::PaymentAttemptRecorded(e) => e.account_id,
            BillingEvent::PaymentSucceeded(e) => e.account_id,
            BillingEvent::PaymentFailed(e) => e.account_id,
            BillingEvent::InvoiceExpired(e) => e.account_id,
        };

        if account_id.0 != aggregate_id {
            return Err(BillingProjectionError::StreamMismatch(
                "event account_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            BillingEvent::InvoiceOpened(e) => {
                let previous = self.store.get(&e.submission_id);
                let mut past_invoice_ids = previous
                    .as_ref()
                    .map(|rm| rm.past_invoice_ids.clone())
                    .unwrap_or_default();
                if let Some(prev) = previous {
                    past_invoice_ids.push(prev.invoice.invoice_id);
                }

                if let Ok(mut index) = self.invoice_index.write() {
                    index.insert(e.invoice_id, e.submission_id);
                }

                self.store.upsert(
                    e.submission_id,
                    BillingReadModel {
                        account_id: e.account_id,
                        submission_id: e.submission_id,
                        invoice: InvoiceReadModel {
                            invoice_id: e.invoice_id,
                            amount: e.amount,
                            due_date: e.due_date,
                            status: InvoiceStatus::Open,
                            attempts: Vec::new(),
                        },
                        past_invoice_ids,
                        updated_at: e.occurred_at,
                        revision: seq,
                    },
                );
            }
            BillingEvent::PaymentAttemptRecorded(e) => {
                if let Ok(mut index) = self.attempt_index.write() {
                    if let Some(submission_id) = self.submission_for_invoice(&e.invoice_id) {
                        index.insert(e.attempt_id, submission_id);
                    }
                }

                self.mutate_by_invoice(&e.invoice_id, seq, e.occurred_at, |rm| {
                    if rm.invoice.invoice_id == e.invoice_id {
                        rm.invoice.attempts.push(AttemptReadModel {
                            attempt_id: e.attempt_id,
                            method: e.method,
                            outcome: AttemptOutcome::Pending,
                            requested_at: e.occurred_at,
                            settled_at: None,
                        });
                    }
                });
            }
            BillingEvent::PaymentSucceeded(e) => {
                let superseded = e.superseded.clone();
                self.mutate_by_invoice(&e.invoice_id, seq, e.occurred_at, |rm| {
                    if rm.invoice.invoice_id == e.invoice_id {
                        rm.invoice.status = InvoiceStatus::Paid;
                        for attempt in rm.invoice.attempts.iter_mut() {
                            if attempt.attempt_id == e.attempt_id {
                                attempt.outcome = AttemptOutcome::Succeeded;
                                attempt.settled_at = Some(e.occurred_at);
                            } else if superseded.contains(&attempt.attempt_id) {
                                attempt.outcome = AttemptOutcome::Failed;
                                attempt.settled_at = Some(e.occurred_at);
                            }
                        }
                    }
                });
            }
            BillingEvent::PaymentFailed(e) => {
                self.mutate_by_invoice(&e.invoice_id, seq, e.occurred_at, |rm| {
                    if rm.invoice.invoice_id == e.invoice_id {
                        for attempt in rm.invoice.attempts.iter_mut() {
                            if attempt.attempt_id == e.attempt_id {
                                attempt.outcome = AttemptOutcome::Failed;
                                attempt.settled_at = Some(e.occurred_at);
                            }
                        }
                    }
                });
            }
            BillingEvent::InvoiceExpired(e) => {
                self.mutate_by_invoice(&e.invoice_id, seq, e.occurred_at, |rm| {
                    if rm.invoice.invoice_id == e.invoice_id {
                        rm.invoice.status = InvoiceStatus::Expired;
                    }
                });
            }
        }

        self.update_cursor(aggregate_id, seq);
        Ok(())
    }

    fn mutate_by_invoice(
        &self,
        invoice_id: &InvoiceId,
        seq: u64,
        occurred_at: DateTime<Utc>,
        f: impl FnOnce(&mut BillingReadModel),
    ) {
        let Some(submission_id) = self.submission_for_invoice(invoice_id) else {
            return;
        };
        if let Some(mut rm) = self.store.get(&submission_id) {
            f(&mut rm);
            rm.updated_at = occurred_at;
            rm.revision = seq;
            self.store.upsert(submission_id, rm);
        }
    }

    /// Rebuild the ledger from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), BillingProjectionError> {
        self.store.clear();
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }
        if let Ok(mut index) = self.invoice_index.write() {
            index.clear();
        }
        if let Ok(mut index) = self.attempt_index.write() {
            index.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid().as_bytes(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
