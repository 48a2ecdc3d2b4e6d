//! Submission lifecycle domain: drafts, review state machine, resubmission.

mod draft;
mod submission;

pub use draft::{AbstractContent, Author, DocumentRef, ResearchField, SubmissionDraft};
pub use submission::{
    AcceptSubmission, MarkFeePaid, PaymentStatus, PublishSubmission, ReceiveSubmission,
    RecordResubmission, RejectSubmission, ReviewStarted, StartReview, Submission,
    SubmissionAccepted, SubmissionCommand, SubmissionEvent, SubmissionId, SubmissionPublished,
    SubmissionReceived, SubmissionRejected, SubmissionStatus, FeePaid, ResubmissionRecorded,
};
