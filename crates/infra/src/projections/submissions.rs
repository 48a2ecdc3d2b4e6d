use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use scholarhub_core::AggregateId;
use scholarhub_events::EventEnvelope;
use scholarhub_submissions::{
    AbstractContent, Author, PaymentStatus, ResearchField, SubmissionEvent, SubmissionId,
    SubmissionStatus,
};

use crate::read_model::ReadModelStore;

/// Denormalized submission row for dashboards and detail lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionReadModel {
    pub submission_id: SubmissionId,
    pub title: String,
    pub author: Author,
    pub field: ResearchField,
    pub year: Option<i32>,
    pub keywords: BTreeSet<String>,
    pub content: AbstractContent,
    pub status: SubmissionStatus,
    pub payment_status: PaymentStatus,
    pub resubmission_of: Option<SubmissionId>,
    pub resubmitted_to: Option<SubmissionId>,
    pub submitted_at: DateTime<Utc>,
    /// Business time of the last applied event (monotonic per stream).
    pub updated_at: DateTime<Utc>,
    /// Stream revision of the last applied event.
    pub revision: u64,
}

#[derive(Debug, Error)]
pub enum SubmissionProjectionError {
    #[error("failed to deserialize submission event: {0}")]
    Deserialize(String),

    #[error("event stream mismatch: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Submissions board projection: one row per submission.
///
/// Backs the by-status and resubmittable dashboard queries and the detail
/// lookup; the payable view joins this with the billing ledger projection.
#[derive(Debug)]
pub struct SubmissionsBoardProjection<S>
where
    S: ReadModelStore<SubmissionId, SubmissionReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl<S> SubmissionsBoardProjection<S>
where
    S: ReadModelStore<SubmissionId, SubmissionReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
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

    /// Lookup a single submission row.
    pub fn get(&self, submission_id: &SubmissionId) -> Option<SubmissionReadModel> {
        self.store.get(submission_id)
    }

    /// Every row, ordered by submission time ascending.
    pub fn list_all(&self) -> Vec<SubmissionReadModel> {
        let mut rows = self.store.list();
        rows.sort_by_key(|rm| (rm.submitted_at, rm.submission_id.0));
        rows
    }

    /// All rows in a status, ordered by submission time ascending.
    pub fn list_by_status(&self, status: SubmissionStatus) -> Vec<SubmissionReadModel> {
        let mut rows: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|rm| rm.status == status)
            .collect();
        rows.sort_by_key(|rm| (rm.submitted_at, rm.submission_id.0));
        rows
    }

    /// Rejected rows without a recorded resubmission, optionally scoped to
    /// one author, ordered by submission time ascending.
    pub fn list_resubmittable(&self, author_email: Option<&str>) -> Vec<SubmissionReadModel> {
        let mut rows: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|rm| rm.status == SubmissionStatus::Rejected && rm.resubmitted_to.is_none())
            .filter(|rm| author_email.is_none_or(|email| rm.author.email == email))
            .collect();
        rows.sort_by_key(|rm| (rm.submitted_at, rm.submission_id.0));
        rows
    }

    /// Rows with an outstanding fee, optionally scoped to one author,
    /// ordered by submission time ascending.
    pub fn list_pending_payment(&self, author_email: Option<&str>) -> Vec<SubmissionReadModel> {
        let mut rows: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|rm| rm.payment_status == PaymentStatus::Pending)
            .filter(|rm| author_email.is_none_or(|email| rm.author.email == email))
            .collect();
        rows.sort_by_key(|rm| (rm.submitted_at, rm.submission_id.0));
        rows
    }

    /// Apply an envelope into the board read model.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), SubmissionProjectionError> {
        if envelope.aggregate_type() != "submissions.submission" {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        let last = self.cursor(aggregate_id);

        if seq == 0 {
            return Err(SubmissionProjectionError::NonMonotonicSequence { last, found: seq });
        }

        // Idempotent under at-least-once delivery.
        if seq <= last {
            return Ok(());
        }

        if seq != last + 1 && last != 0 {
            return Err(SubmissionProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: SubmissionEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| SubmissionProjectionError::Deserialize(e.to_string()))?;

        let submission_id = match &ev {
            SubmissionEvent::SubmissionReceived(e) => e.submission_id,
            SubmissionEvent::ReviewStarted(e) => e.submission_id,
            SubmissionEvent::SubmissionAccepted(e) => e.submission_id,
            SubmissionEvent::SubmissionRejected(e) => e.submission_id,
            SubmissionEvent::SubmissionPublished(e) => e.submission_id,
            SubmissionEvent::ResubmissionRecorded(e) => e.submission_id,
            SubmissionEvent::FeePaid(e) => e.submission_id,
        };

        if submission_id.0 != aggregate_id {
            return Err(SubmissionProjectionError::StreamMismatch(
                "event submission_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            SubmissionEvent::SubmissionReceived(e) => {
                self.store.upsert(
                    e.submission_id,
                    SubmissionReadModel {
                        submission_id: e.submission_id,
                        title: e.title,
                        author: e.author,
                        field: e.field,
                        year: e.year,
                        keywords: e.keywords,
                        content: e.content,
                        status: SubmissionStatus::Submitted,
                        payment_status: PaymentStatus::NotApplicable,
                        resubmission_of: e.resubmission_of,
                        resubmitted_to: None,
                        submitted_at: e.occurred_at,
                        updated_at: e.occurred_at,
                        revision: seq,
                    },
                );
            }
            SubmissionEvent::ReviewStarted(e) => {
                self.mutate(submission_id, seq, e.occurred_at, |rm| {
                    rm.status = SubmissionStatus::UnderReview;
                });
            }
            SubmissionEvent::SubmissionAccepted(e) => {
                self.mutate(submission_id, seq, e.occurred_at, |rm| {
                    rm.status = SubmissionStatus::Accepted;
                    if rm.payment_status == PaymentStatus::NotApplicable {
                        rm.payment_status = PaymentStatus::Pending;
                    }
                });
            }
            SubmissionEvent::SubmissionRejected(e) => {
                self.mutate(submission_id, seq, e.occurred_at, |rm| {
                    rm.status = SubmissionStatus::Rejected;
                });
            }
            SubmissionEvent::SubmissionPublished(e) => {
                self.mutate(submission_id, seq, e.occurred_at, |rm| {
                    rm.status = SubmissionStatus::Published;
                    if rm.payment_status == PaymentStatus::NotApplicable {
                        rm.payment_status = PaymentStatus::Pending;
                    }
                });
            }
            SubmissionEvent::ResubmissionRecorded(e) => {
                let successor = e.successor;
                self.mutate(submission_id, seq, e.occurred_at, |rm| {
                    rm.resubmitted_to = Some(successor);
                });
            }
            SubmissionEvent::FeePaid(e) => {
                self.mutate(submission_id, seq, e.occurred_at, |rm| {
                    rm.payment_status = PaymentStatus::Paid;
                });
            }
        }

        self.update_cursor(aggregate_id, seq);
        Ok(())
    }

    fn mutate(
        &self,
        submission_id: SubmissionId,
        seq: u64,
        occurred_at: DateTime<Utc>,
        f: impl FnOnce(&mut SubmissionReadModel),
    ) {
        if let Some(mut rm) = self.store.get(&submission_id) {
            f(&mut rm);
            rm.updated_at = occurred_at;
            rm.revision = seq;
            self.store.upsert(submission_id, rm);
        }
    }

    /// Rebuild the board from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), SubmissionProjectionError> {
        self.store.clear();
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid().as_bytes(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
