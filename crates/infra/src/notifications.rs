//! Author email notifications.
//!
//! A bus subscriber sends a confirmation when an abstract is received and a
//! payment confirmation when its fee settles. Delivery is best effort:
//! failures are logged and never propagate into the command path.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, warn};

use scholarhub_events::{EventBus, EventEnvelope};
use scholarhub_submissions::{SubmissionEvent, SubmissionId};

use crate::workers::{SubscriberWorker, WorkerHandle};

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("email hand-off failed: {0}")]
    Transport(String),
}

/// Outbound email message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Outbound port to the mail system.
pub trait EmailSender: Send + Sync {
    fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

/// Dev/test sender: logs the message and succeeds.
#[derive(Debug, Default)]
pub struct LoggingEmailSender;

impl EmailSender for LoggingEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        info!(to = %message.to, subject = %message.subject, "sending email");
        Ok(())
    }
}

/// Author details remembered per submission for later notifications.
#[derive(Debug, Clone)]
struct AuthorRecord {
    name: String,
    email: String,
    title: String,
}

/// Bus subscriber that turns submission events into author emails.
pub struct NotificationRelay;

impl NotificationRelay {
    pub fn spawn<B>(bus: B, sender: Arc<dyn EmailSender>) -> WorkerHandle
    where
        B: EventBus<EventEnvelope<JsonValue>> + Send + Sync + 'static,
    {
        let mut authors: HashMap<SubmissionId, AuthorRecord> = HashMap::new();

        SubscriberWorker::spawn(
            "notification-relay",
            bus,
            move |envelope: EventEnvelope<JsonValue>| -> Result<(), EmailError> {
                if envelope.aggregate_type() != "submissions.submission" {
                    return Ok(());
                }

                let ev: SubmissionEvent =
                    match serde_json::from_value(envelope.payload().clone()) {
                        Ok(ev) => ev,
                        Err(err) => {
                            warn!(error = %err, "notification relay skipping undecodable event");
                            return Ok(());
                        }
                    };

                match ev {
                    SubmissionEvent::SubmissionReceived(e) => {
                        let record = AuthorRecord {
                            name: e.author.full_name.clone(),
                            email: e.author.email.clone(),
                            title: e.title.clone(),
                        };
                        let message = submission_confirmation(&record, e.submission_id);
                        authors.insert(e.submission_id, record);
                        if let Err(err) = sender.send(&message) {
                            warn!(error = %err, "submission confirmation email failed");
                        }
                    }
                    SubmissionEvent::FeePaid(e) => {
                        let Some(record) = authors.get(&e.submission_id) else {
                            warn!(
                                submission_id = %e.submission_id,
                                "no author record for payment confirmation"
                            );
                            return Ok(());
                        };
                        let message = payment_confirmation(record, e.submission_id);
                        if let Err(err) = sender.send(&message) {
                            warn!(error = %err, "payment confirmation email failed");
                        }
                    }
                    _ => {}
                }

                Ok(())
            },
        )
    }
}

fn submission_confirmation(record: &AuthorRecord, submission_id: SubmissionId) -> EmailMessage {
    EmailMessage {
        to: record.email.clone(),
        subject: "Abstract submission confirmation".to_string(),
        body: format!(
            "Hello {}!\n\n\
             Thank you for submitting your abstract titled \"{}\".\n\n\
             Submission ID: {}\n\n\
             We will review your submission and get back to you as soon as possible.",
            record.name, record.title, submission_id
        ),
    }
}

fn payment_confirmation(record: &AuthorRecord, submission_id: SubmissionId) -> EmailMessage {
    EmailMessage {
        to: record.email.clone(),
        subject: "Payment confirmation".to_string(),
        body: format!(
            "Dear {},\n\n\
             Your submission fee for \"{}\" (submission {}) has been settled.\n\
             You can follow the publication status from your dashboard.",
            record.name, record.title, submission_id
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use chrono::Utc;

    use super::*;
    use scholarhub_core::AggregateId;
    use scholarhub_events::{Event, InMemoryEventBus};
    use scholarhub_submissions::{
        AbstractContent, Author, FeePaid, ResearchField, SubmissionReceived,
    };

    #[derive(Debug, Default)]
    struct RecordingEmailSender {
        messages: Mutex<Vec<EmailMessage>>,
    }

    impl RecordingEmailSender {
        fn messages(&self) -> Vec<EmailMessage> {
            self.messages.lock().map(|m| m.clone()).unwrap_or_default()
        }
    }

    impl EmailSender for RecordingEmailSender {
        fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
            if let Ok(mut messages) = self.messages.lock() {
                messages.push(message.clone());
            }
            Ok(())
        }
    }

    fn envelope(id: SubmissionId, seq: u64, ev: &SubmissionEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            uuid::Uuid::now_v7(),
            id.0,
            "submissions.submission",
            seq,
            serde_json::to_value(ev).unwrap(),
        )
    }

    #[test]
    fn relay_sends_confirmation_and_payment_emails() {
        let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> =
            Arc::new(InMemoryEventBus::new());
        let sender = Arc::new(RecordingEmailSender::default());
        let handle = NotificationRelay::spawn(bus.clone(), sender.clone());

        let id = SubmissionId::new(AggregateId::new());
        let received = SubmissionEvent::SubmissionReceived(SubmissionReceived {
            submission_id: id,
            author: Author {
                full_name: "Thandiwe Banda".to_string(),
                email: "thandiwe@unima.mw".to_string(),
                country: "Malawi".to_string(),
                institution: "University of Malawi".to_string(),
            },
            field: ResearchField::Agriculture,
            year: Some(2025),
            title: "AI in Agriculture".to_string(),
            keywords: BTreeSet::new(),
            content: AbstractContent::Inline("Irrigation scheduling.".to_string()),
            resubmission_of: None,
            occurred_at: Utc::now(),
        });
        let paid = SubmissionEvent::FeePaid(FeePaid {
            submission_id: id,
            occurred_at: Utc::now(),
        });
        assert_eq!(received.event_type(), "submissions.submission.received");

        bus.publish(envelope(id, 1, &received)).unwrap();
        bus.publish(envelope(id, 2, &paid)).unwrap();

        // The relay runs on its own thread; wait briefly for delivery.
        let deadline = Instant::now() + Duration::from_secs(2);
        while sender.messages().len() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        handle.shutdown();

        let messages = sender.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].to, "thandiwe@unima.mw");
        assert!(messages[0].subject.contains("confirmation"));
        assert!(messages[0].body.contains("AI in Agriculture"));
        assert!(messages[1].body.contains("settled"));
    }
}
