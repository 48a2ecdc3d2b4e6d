use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scholarhub_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use scholarhub_events::Event;

use crate::draft::{AbstractContent, Author, ResearchField, SubmissionDraft};

/// Submission identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub AggregateId);

impl SubmissionId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Review lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Submitted,
    UnderReview,
    Accepted,
    Rejected,
    Published,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::UnderReview => "under_review",
            SubmissionStatus::Accepted => "accepted",
            SubmissionStatus::Rejected => "rejected",
            SubmissionStatus::Published => "published",
        }
    }
}

impl core::str::FromStr for SubmissionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(SubmissionStatus::Submitted),
            "under_review" => Ok(SubmissionStatus::UnderReview),
            "accepted" => Ok(SubmissionStatus::Accepted),
            "rejected" => Ok(SubmissionStatus::Rejected),
            "published" => Ok(SubmissionStatus::Published),
            other => Err(DomainError::validation(format!(
                "unknown submission status: {other}"
            ))),
        }
    }
}

/// Fee reconciliation status, constrained by the review status.
///
/// Invariant: `NotApplicable` unless the submission is Accepted or Published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    NotApplicable,
    Pending,
    Paid,
}

/// Aggregate root: Submission.
///
/// One stream per submitted abstract. Records are never deleted; terminal
/// states are retained for history, and a rejected submission is never
/// mutated by its resubmission (only linked to it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    id: SubmissionId,
    status: SubmissionStatus,
    payment_status: PaymentStatus,
    author: Option<Author>,
    field: Option<ResearchField>,
    year: Option<i32>,
    title: String,
    keywords: BTreeSet<String>,
    content: Option<AbstractContent>,
    resubmission_of: Option<SubmissionId>,
    resubmitted_to: Option<SubmissionId>,
    submitted_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Submission {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SubmissionId) -> Self {
        Self {
            id,
            status: SubmissionStatus::Submitted,
            payment_status: PaymentStatus::NotApplicable,
            author: None,
            field: None,
            year: None,
            title: String::new(),
            keywords: BTreeSet::new(),
            content: None,
            resubmission_of: None,
            resubmitted_to: None,
            submitted_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SubmissionId {
        self.id
    }

    pub fn status(&self) -> SubmissionStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn author(&self) -> Option<&Author> {
        self.author.as_ref()
    }

    pub fn field(&self) -> Option<ResearchField> {
        self.field
    }

    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn keywords(&self) -> &BTreeSet<String> {
        &self.keywords
    }

    pub fn content(&self) -> Option<&AbstractContent> {
        self.content.as_ref()
    }

    pub fn resubmission_of(&self) -> Option<SubmissionId> {
        self.resubmission_of
    }

    pub fn resubmitted_to(&self) -> Option<SubmissionId> {
        self.resubmitted_to
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    /// A fee obligation only exists for accepted or published work.
    pub fn is_payable(&self) -> bool {
        matches!(
            self.status,
            SubmissionStatus::Accepted | SubmissionStatus::Published
        )
    }

    /// Rejected and not yet linked to a successor.
    pub fn is_resubmittable(&self) -> bool {
        self.status == SubmissionStatus::Rejected && self.resubmitted_to.is_none()
    }
}

impl AggregateRoot for Submission {
    type Id = SubmissionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ReceiveSubmission (form handover).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveSubmission {
    pub submission_id: SubmissionId,
    pub draft: SubmissionDraft,
    /// Set when this submission revises a rejected one.
    pub resubmission_of: Option<SubmissionId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: StartReview (reviewer assignment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartReview {
    pub submission_id: SubmissionId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AcceptSubmission (review decision).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptSubmission {
    pub submission_id: SubmissionId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectSubmission (review decision).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectSubmission {
    pub submission_id: SubmissionId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PublishSubmission (production step).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishSubmission {
    pub submission_id: SubmissionId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordResubmission (link the rejected original to its successor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordResubmission {
    pub submission_id: SubmissionId,
    pub successor: SubmissionId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkFeePaid (settlement reconciliation from the ledger).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkFeePaid {
    pub submission_id: SubmissionId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionCommand {
    ReceiveSubmission(ReceiveSubmission),
    StartReview(StartReview),
    AcceptSubmission(AcceptSubmission),
    RejectSubmission(RejectSubmission),
    PublishSubmission(PublishSubmission),
    RecordResubmission(RecordResubmission),
    MarkFeePaid(MarkFeePaid),
}

/// Event: SubmissionReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceived {
    pub submission_id: SubmissionId,
    pub author: Author,
    pub field: ResearchField,
    pub year: Option<i32>,
    pub title: String,
    pub keywords: BTreeSet<String>,
    pub content: AbstractContent,
    pub resubmission_of: Option<SubmissionId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReviewStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewStarted {
    pub submission_id: SubmissionId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SubmissionAccepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionAccepted {
    pub submission_id: SubmissionId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SubmissionRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRejected {
    pub submission_id: SubmissionId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SubmissionPublished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionPublished {
    pub submission_id: SubmissionId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ResubmissionRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResubmissionRecorded {
    pub submission_id: SubmissionId,
    pub successor: SubmissionId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FeePaid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePaid {
    pub submission_id: SubmissionId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionEvent {
    SubmissionReceived(SubmissionReceived),
    ReviewStarted(ReviewStarted),
    SubmissionAccepted(SubmissionAccepted),
    SubmissionRejected(SubmissionRejected),
    SubmissionPublished(SubmissionPublished),
    ResubmissionRecorded(ResubmissionRecorded),
    FeePaid(FeePaid),
}

impl Event for SubmissionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SubmissionEvent::SubmissionReceived(_) => "submissions.submission.received",
            SubmissionEvent::ReviewStarted(_) => "submissions.submission.review_started",
            SubmissionEvent::SubmissionAccepted(_) => "submissions.submission.accepted",
            SubmissionEvent::SubmissionRejected(_) => "submissions.submission.rejected",
            SubmissionEvent::SubmissionPublished(_) => "submissions.submission.published",
            SubmissionEvent::ResubmissionRecorded(_) => {
                "submissions.submission.resubmission_recorded"
            }
            SubmissionEvent::FeePaid(_) => "submissions.submission.fee_paid",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SubmissionEvent::SubmissionReceived(e) => e.occurred_at,
            SubmissionEvent::ReviewStarted(e) => e.occurred_at,
            SubmissionEvent::SubmissionAccepted(e) => e.occurred_at,
            SubmissionEvent::SubmissionRejected(e) => e.occurred_at,
            SubmissionEvent::SubmissionPublished(e) => e.occurred_at,
            SubmissionEvent::ResubmissionRecorded(e) => e.occurred_at,
            SubmissionEvent::FeePaid(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Submission {
    type Command = SubmissionCommand;
    type Event = SubmissionEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SubmissionEvent::SubmissionReceived(e) => {
                self.id = e.submission_id;
                self.status = SubmissionStatus::Submitted;
                self.payment_status = PaymentStatus::NotApplicable;
                self.author = Some(e.author.clone());
                self.field = Some(e.field);
                self.year = e.year;
                self.title = e.title.clone();
                self.keywords = e.keywords.clone();
                self.content = Some(e.content.clone());
                self.resubmission_of = e.resubmission_of;
                self.submitted_at = Some(e.occurred_at);
                self.created = true;
            }
            SubmissionEvent::ReviewStarted(_) => {
                self.status = SubmissionStatus::UnderReview;
            }
            SubmissionEvent::SubmissionAccepted(_) => {
                self.status = SubmissionStatus::Accepted;
                if self.payment_status == PaymentStatus::NotApplicable {
                    self.payment_status = PaymentStatus::Pending;
                }
            }
            SubmissionEvent::SubmissionRejected(_) => {
                self.status = SubmissionStatus::Rejected;
            }
            SubmissionEvent::SubmissionPublished(_) => {
                self.status = SubmissionStatus::Published;
                if self.payment_status == PaymentStatus::NotApplicable {
                    self.payment_status = PaymentStatus::Pending;
                }
            }
            SubmissionEvent::ResubmissionRecorded(e) => {
                self.resubmitted_to = Some(e.successor);
            }
            SubmissionEvent::FeePaid(_) => {
                self.payment_status = PaymentStatus::Paid;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SubmissionCommand::ReceiveSubmission(cmd) => self.handle_receive(cmd),
            SubmissionCommand::StartReview(cmd) => self.handle_start_review(cmd),
            SubmissionCommand::AcceptSubmission(cmd) => self.handle_accept(cmd),
            SubmissionCommand::RejectSubmission(cmd) => self.handle_reject(cmd),
            SubmissionCommand::PublishSubmission(cmd) => self.handle_publish(cmd),
            SubmissionCommand::RecordResubmission(cmd) => self.handle_record_resubmission(cmd),
            SubmissionCommand::MarkFeePaid(cmd) => self.handle_mark_fee_paid(cmd),
        }
    }
}

impl Submission {
    fn ensure_submission_id(&self, submission_id: SubmissionId) -> Result<(), DomainError> {
        if self.id != submission_id {
            return Err(DomainError::invalid_id("submission_id mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn illegal(&self, target: SubmissionStatus) -> DomainError {
        DomainError::illegal_transition(format!(
            "{} -> {}",
            self.status.as_str(),
            target.as_str()
        ))
    }

    fn handle_receive(&self, cmd: &ReceiveSubmission) -> Result<Vec<SubmissionEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("submission already exists"));
        }
        self.ensure_submission_id(cmd.submission_id)?;

        cmd.draft.validate()?;

        let field = cmd
            .draft
            .field
            .ok_or_else(|| DomainError::validation("missing required field(s): field"))?;
        let content = cmd
            .draft
            .content()
            .ok_or_else(|| DomainError::validation("missing required field(s): abstract"))?;

        Ok(vec![SubmissionEvent::SubmissionReceived(
            SubmissionReceived {
                submission_id: cmd.submission_id,
                author: cmd.draft.author(),
                field,
                year: cmd.draft.year,
                title: cmd.draft.title.trim().to_string(),
                keywords: cmd.draft.keywords.clone(),
                content,
                resubmission_of: cmd.resubmission_of,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_start_review(&self, cmd: &StartReview) -> Result<Vec<SubmissionEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_submission_id(cmd.submission_id)?;

        if self.status != SubmissionStatus::Submitted {
            return Err(self.illegal(SubmissionStatus::UnderReview));
        }

        Ok(vec![SubmissionEvent::ReviewStarted(ReviewStarted {
            submission_id: cmd.submission_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_accept(&self, cmd: &AcceptSubmission) -> Result<Vec<SubmissionEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_submission_id(cmd.submission_id)?;

        if self.status != SubmissionStatus::UnderReview {
            return Err(self.illegal(SubmissionStatus::Accepted));
        }

        Ok(vec![SubmissionEvent::SubmissionAccepted(
            SubmissionAccepted {
                submission_id: cmd.submission_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_reject(&self, cmd: &RejectSubmission) -> Result<Vec<SubmissionEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_submission_id(cmd.submission_id)?;

        if self.status != SubmissionStatus::UnderReview {
            return Err(self.illegal(SubmissionStatus::Rejected));
        }

        Ok(vec![SubmissionEvent::SubmissionRejected(
            SubmissionRejected {
                submission_id: cmd.submission_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_publish(&self, cmd: &PublishSubmission) -> Result<Vec<SubmissionEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_submission_id(cmd.submission_id)?;

        // Publication only follows acceptance; UnderReview -> Published is
        // not a legal shortcut.
        if self.status != SubmissionStatus::Accepted {
            return Err(self.illegal(SubmissionStatus::Published));
        }

        Ok(vec![SubmissionEvent::SubmissionPublished(
            SubmissionPublished {
                submission_id: cmd.submission_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_record_resubmission(
        &self,
        cmd: &RecordResubmission,
    ) -> Result<Vec<SubmissionEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_submission_id(cmd.submission_id)?;

        if self.status != SubmissionStatus::Rejected {
            return Err(DomainError::invalid_state(format!(
                "only rejected submissions can be resubmitted (status: {})",
                self.status.as_str()
            )));
        }

        if let Some(existing) = self.resubmitted_to {
            return Err(DomainError::conflict(format!(
                "resubmission already recorded: {existing}"
            )));
        }

        Ok(vec![SubmissionEvent::ResubmissionRecorded(
            ResubmissionRecorded {
                submission_id: cmd.submission_id,
                successor: cmd.successor,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_mark_fee_paid(&self, cmd: &MarkFeePaid) -> Result<Vec<SubmissionEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_submission_id(cmd.submission_id)?;

        if !self.is_payable() {
            return Err(DomainError::invalid_state(format!(
                "no fee obligation in status {}",
                self.status.as_str()
            )));
        }

        // Settlement reconciliation is idempotent.
        if self.payment_status == PaymentStatus::Paid {
            return Ok(vec![]);
        }

        Ok(vec![SubmissionEvent::FeePaid(FeePaid {
            submission_id: cmd.submission_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;

    use super::*;
    use scholarhub_core::AggregateId;
    use scholarhub_events::execute;

    fn test_submission_id() -> SubmissionId {
        SubmissionId::new(AggregateId::new())
    }

    fn test_draft() -> SubmissionDraft {
        SubmissionDraft {
            full_name: "Thandiwe Banda".to_string(),
            email: "thandiwe@unima.mw".to_string(),
            country: "Malawi".to_string(),
            institution: "University of Malawi".to_string(),
            field: Some(ResearchField::Agriculture),
            year: Some(2025),
            title: "AI in Agriculture".to_string(),
            keywords: BTreeSet::from(["ai".to_string()]),
            abstract_text: Some("Model-driven irrigation scheduling.".to_string()),
            document: None,
        }
    }

    fn received(id: SubmissionId) -> Submission {
        let mut submission = Submission::empty(id);
        execute(
            &mut submission,
            &SubmissionCommand::ReceiveSubmission(ReceiveSubmission {
                submission_id: id,
                draft: test_draft(),
                resubmission_of: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        submission
    }

    fn advance(submission: &mut Submission, command: SubmissionCommand) {
        execute(submission, &command).unwrap();
    }

    #[test]
    fn receive_emits_submission_received() {
        let id = test_submission_id();
        let submission = Submission::empty(id);

        let events = submission
            .handle(&SubmissionCommand::ReceiveSubmission(ReceiveSubmission {
                submission_id: id,
                draft: test_draft(),
                resubmission_of: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();

        assert_eq!(events.len(), 1);
        match &events[0] {
            SubmissionEvent::SubmissionReceived(e) => {
                assert_eq!(e.submission_id, id);
                assert_eq!(e.title, "AI in Agriculture");
                assert_eq!(e.field, ResearchField::Agriculture);
                assert_eq!(e.author.email, "thandiwe@unima.mw");
                assert!(e.resubmission_of.is_none());
            }
            other => panic!("expected SubmissionReceived, got {other:?}"),
        }
    }

    #[test]
    fn receive_rejects_invalid_draft() {
        let id = test_submission_id();
        let submission = Submission::empty(id);

        let mut draft = test_draft();
        draft.title = String::new();

        let err = submission
            .handle(&SubmissionCommand::ReceiveSubmission(ReceiveSubmission {
                submission_id: id,
                draft,
                resubmission_of: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();

        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn full_acceptance_path_reconciles_payment_status() {
        let id = test_submission_id();
        let mut submission = received(id);
        assert_eq!(submission.status(), SubmissionStatus::Submitted);
        assert_eq!(submission.payment_status(), PaymentStatus::NotApplicable);

        advance(
            &mut submission,
            SubmissionCommand::StartReview(StartReview {
                submission_id: id,
                occurred_at: Utc::now(),
            }),
        );
        assert_eq!(submission.status(), SubmissionStatus::UnderReview);
        assert_eq!(submission.payment_status(), PaymentStatus::NotApplicable);

        advance(
            &mut submission,
            SubmissionCommand::AcceptSubmission(AcceptSubmission {
                submission_id: id,
                occurred_at: Utc::now(),
            }),
        );
        assert_eq!(submission.status(), SubmissionStatus::Accepted);
        assert_eq!(submission.payment_status(), PaymentStatus::Pending);

        advance(
            &mut submission,
            SubmissionCommand::MarkFeePaid(MarkFeePaid {
                submission_id: id,
                occurred_at: Utc::now(),
            }),
        );
        assert_eq!(submission.payment_status(), PaymentStatus::Paid);

        advance(
            &mut submission,
            SubmissionCommand::PublishSubmission(PublishSubmission {
                submission_id: id,
                occurred_at: Utc::now(),
            }),
        );
        assert_eq!(submission.status(), SubmissionStatus::Published);
        assert_eq!(submission.payment_status(), PaymentStatus::Paid);
    }

    #[test]
    fn under_review_cannot_jump_to_published() {
        let id = test_submission_id();
        let mut submission = received(id);
        advance(
            &mut submission,
            SubmissionCommand::StartReview(StartReview {
                submission_id: id,
                occurred_at: Utc::now(),
            }),
        );

        let err = submission
            .handle(&SubmissionCommand::PublishSubmission(PublishSubmission {
                submission_id: id,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();

        match err {
            DomainError::IllegalTransition(msg) => {
                assert!(msg.contains("under_review -> published"), "{msg}");
            }
            other => panic!("expected IllegalTransition, got {other:?}"),
        }
    }

    #[test]
    fn review_of_unknown_submission_is_not_found() {
        let id = test_submission_id();
        let submission = Submission::empty(id);

        let err = submission
            .handle(&SubmissionCommand::StartReview(StartReview {
                submission_id: id,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();

        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn resubmission_recorded_once() {
        let id = test_submission_id();
        let mut submission = received(id);
        advance(
            &mut submission,
            SubmissionCommand::StartReview(StartReview {
                submission_id: id,
                occurred_at: Utc::now(),
            }),
        );
        advance(
            &mut submission,
            SubmissionCommand::RejectSubmission(RejectSubmission {
                submission_id: id,
                occurred_at: Utc::now(),
            }),
        );
        assert!(submission.is_resubmittable());

        let successor = test_submission_id();
        advance(
            &mut submission,
            SubmissionCommand::RecordResubmission(RecordResubmission {
                submission_id: id,
                successor,
                occurred_at: Utc::now(),
            }),
        );

        // Status is untouched; only the link is recorded.
        assert_eq!(submission.status(), SubmissionStatus::Rejected);
        assert_eq!(submission.resubmitted_to(), Some(successor));
        assert!(!submission.is_resubmittable());

        let err = submission
            .handle(&SubmissionCommand::RecordResubmission(RecordResubmission {
                submission_id: id,
                successor: test_submission_id(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn resubmission_requires_rejected_status() {
        let id = test_submission_id();
        let submission = received(id);

        let err = submission
            .handle(&SubmissionCommand::RecordResubmission(RecordResubmission {
                submission_id: id,
                successor: test_submission_id(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();

        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn mark_fee_paid_is_idempotent_and_state_guarded() {
        let id = test_submission_id();
        let mut submission = received(id);

        // No obligation before acceptance.
        let err = submission
            .handle(&SubmissionCommand::MarkFeePaid(MarkFeePaid {
                submission_id: id,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));

        advance(
            &mut submission,
            SubmissionCommand::StartReview(StartReview {
                submission_id: id,
                occurred_at: Utc::now(),
            }),
        );
        advance(
            &mut submission,
            SubmissionCommand::AcceptSubmission(AcceptSubmission {
                submission_id: id,
                occurred_at: Utc::now(),
            }),
        );
        advance(
            &mut submission,
            SubmissionCommand::MarkFeePaid(MarkFeePaid {
                submission_id: id,
                occurred_at: Utc::now(),
            }),
        );
        assert_eq!(submission.payment_status(), PaymentStatus::Paid);

        // Settling twice is a no-op.
        let events = submission
            .handle(&SubmissionCommand::MarkFeePaid(MarkFeePaid {
                submission_id: id,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Step {
            StartReview,
            Accept,
            Reject,
            Publish,
            RecordResubmission,
            MarkFeePaid,
        }

        fn step_strategy() -> impl Strategy<Value = Step> {
            prop_oneof![
                Just(Step::StartReview),
                Just(Step::Accept),
                Just(Step::Reject),
                Just(Step::Publish),
                Just(Step::RecordResubmission),
                Just(Step::MarkFeePaid),
            ]
        }

        fn command_for(step: &Step, id: SubmissionId) -> SubmissionCommand {
            let occurred_at = Utc::now();
            match step {
                Step::StartReview => SubmissionCommand::StartReview(StartReview {
                    submission_id: id,
                    occurred_at,
                }),
                Step::Accept => SubmissionCommand::AcceptSubmission(AcceptSubmission {
                    submission_id: id,
                    occurred_at,
                }),
                Step::Reject => SubmissionCommand::RejectSubmission(RejectSubmission {
                    submission_id: id,
                    occurred_at,
                }),
                Step::Publish => SubmissionCommand::PublishSubmission(PublishSubmission {
                    submission_id: id,
                    occurred_at,
                }),
                Step::RecordResubmission => {
                    SubmissionCommand::RecordResubmission(RecordResubmission {
                        submission_id: id,
                        successor: test_submission_id(),
                        occurred_at,
                    })
                }
                Step::MarkFeePaid => SubmissionCommand::MarkFeePaid(MarkFeePaid {
                    submission_id: id,
                    occurred_at,
                }),
            }
        }

        fn payment_invariant_holds(submission: &Submission) -> bool {
            submission.payment_status() == PaymentStatus::NotApplicable
                || submission.is_payable()
        }

        proptest! {
            /// Applying any command sequence (accepted or rejected) never
            /// produces a fee obligation outside Accepted/Published.
            #[test]
            fn payment_status_invariant(steps in proptest::collection::vec(step_strategy(), 0..24)) {
                let id = test_submission_id();
                let mut submission = received(id);
                prop_assert!(payment_invariant_holds(&submission));

                for step in &steps {
                    let cmd = command_for(step, id);
                    if let Ok(events) = submission.handle(&cmd) {
                        for ev in &events {
                            submission.apply(ev);
                        }
                    }
                    prop_assert!(payment_invariant_holds(&submission));
                }
            }

            /// The aggregate never reaches Published without passing Accepted.
            #[test]
            fn published_implies_prior_acceptance(steps in proptest::collection::vec(step_strategy(), 0..24)) {
                let id = test_submission_id();
                let mut submission = received(id);
                let mut was_accepted = false;

                for step in &steps {
                    let cmd = command_for(step, id);
                    if let Ok(events) = submission.handle(&cmd) {
                        for ev in &events {
                            submission.apply(ev);
                        }
                    }
                    if submission.status() == SubmissionStatus::Accepted {
                        was_accepted = true;
                    }
                    if submission.status() == SubmissionStatus::Published {
                        prop_assert!(was_accepted);
                    }
                }
            }
        }
    }
}
