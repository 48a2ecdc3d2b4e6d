//! Infrastructure wiring and application-level orchestration.
//!
//! `AppServices` composes the event store, dispatcher, projections, and
//! outbound ports, and exposes the operations the HTTP layer calls. Committed
//! events are applied to the projections synchronously on the request path,
//! so a caller always reads its own writes; the bus additionally fans events
//! out to background consumers (notification relay).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use scholarhub_billing::{
    AttemptId, BillingAccount, BillingAccountId, BillingCommand, ExpireInvoice, FeeAmount,
    FeeSchedule, InvoiceId, OpenInvoice, PaymentMethod, RecordPaymentAttempt, SettlePayment,
    SettlementOutcome,
};
use scholarhub_core::AggregateId;
use scholarhub_events::{EventEnvelope, InMemoryEventBus};
use scholarhub_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    config::AppConfig,
    event_store::{EventStore, InMemoryEventStore, PostgresEventStore, StoredEvent},
    gateway::{GatewayRequest, LoggingPaymentGateway, PaymentGateway},
    notifications::{LoggingEmailSender, NotificationRelay},
    projections::billing::{BillingLedgerProjection, BillingReadModel},
    projections::submissions::{SubmissionReadModel, SubmissionsBoardProjection},
    read_model::InMemoryReadModelStore,
    workers::{PeriodicWorker, WorkerHandle},
};
use scholarhub_submissions::{
    AcceptSubmission, MarkFeePaid, PublishSubmission, ReceiveSubmission, RecordResubmission,
    RejectSubmission, StartReview, Submission, SubmissionCommand, SubmissionDraft, SubmissionId,
    SubmissionStatus,
};

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type BoardStore = Arc<InMemoryReadModelStore<SubmissionId, SubmissionReadModel>>;
type LedgerStore = Arc<InMemoryReadModelStore<SubmissionId, BillingReadModel>>;

/// Application services shared by all request handlers.
pub struct AppServices {
    dispatcher: CommandDispatcher<Arc<dyn EventStore>, Bus>,
    event_bus: Bus,
    board: Arc<SubmissionsBoardProjection<BoardStore>>,
    ledger: Arc<BillingLedgerProjection<LedgerStore>>,
    gateway: Arc<dyn PaymentGateway>,
    fee_schedule: FeeSchedule,
    workers: Mutex<Vec<WorkerHandle>>,
}

/// Build services from configuration.
///
/// The event store is in-memory by default; `USE_PERSISTENT_STORES=true`
/// plus `DATABASE_URL` switches to Postgres. Read models stay in memory in
/// both modes and are rebuilt by replaying the store on restart.
pub async fn build_services(config: &AppConfig) -> AppServices {
    let store: Arc<dyn EventStore> = if config.use_persistent_stores {
        let database_url = config
            .database_url
            .as_deref()
            .expect("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");

        let pool = sqlx::PgPool::connect(database_url)
            .await
            .expect("failed to connect to Postgres");

        let store = PostgresEventStore::new(pool);
        store
            .ensure_schema()
            .await
            .expect("failed to prepare events schema");
        Arc::new(store)
    } else {
        Arc::new(InMemoryEventStore::new())
    };

    let bus: Bus = Arc::new(InMemoryEventBus::new());

    let board_store: BoardStore = Arc::new(InMemoryReadModelStore::new());
    let board = Arc::new(SubmissionsBoardProjection::new(board_store));

    let ledger_store: LedgerStore = Arc::new(InMemoryReadModelStore::new());
    let ledger = Arc::new(BillingLedgerProjection::new(ledger_store));

    // Read models are disposable: rebuild them from the store so a restart
    // of the persistent deployment starts with warm projections.
    match store.load_all() {
        Ok(history) => {
            for stored in &history {
                let envelope = stored.to_envelope();
                let applied = match envelope.aggregate_type() {
                    "submissions.submission" => {
                        board.apply_envelope(&envelope).map_err(|e| e.to_string())
                    }
                    "billing.account" => {
                        ledger.apply_envelope(&envelope).map_err(|e| e.to_string())
                    }
                    _ => Ok(()),
                };
                if let Err(err) = applied {
                    warn!(error = %err, "read model rebuild skipped an event");
                }
            }
        }
        Err(err) => warn!(error = %err, "read model rebuild failed; starting cold"),
    }

    let dispatcher = CommandDispatcher::new(store, bus.clone());

    AppServices {
        dispatcher,
        event_bus: bus,
        board,
        ledger,
        gateway: Arc::new(LoggingPaymentGateway),
        fee_schedule: config.fee_schedule,
        workers: Mutex::new(Vec::new()),
    }
}

/// Start the background consumers: notification relay and expiry sweeper.
pub fn spawn_workers(services: &Arc<AppServices>, config: &AppConfig) {
    let relay = NotificationRelay::spawn(
        services.event_bus.clone(),
        Arc::new(LoggingEmailSender),
    );

    let sweeper = {
        let services = services.clone();
        PeriodicWorker::spawn(
            "invoice-expiry-sweep",
            Duration::from_secs(config.expiry_sweep_interval_secs),
            move || -> Result<(), DispatchError> {
                let expired = services.expire_overdue(Utc::now())?;
                if expired > 0 {
                    info!(expired, "expired overdue invoices");
                }
                Ok(())
            },
        )
    };

    if let Ok(mut workers) = services.workers.lock() {
        workers.push(relay);
        workers.push(sweeper);
    }
}

impl AppServices {
    // ---- lifecycle engine -------------------------------------------------

    /// Accept a draft from the form layer; returns the new submission id.
    pub fn submit(&self, draft: SubmissionDraft) -> Result<SubmissionId, DispatchError> {
        let id = SubmissionId::new(AggregateId::new());
        self.dispatch_submission(
            id,
            SubmissionCommand::ReceiveSubmission(ReceiveSubmission {
                submission_id: id,
                draft,
                resubmission_of: None,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(id)
    }

    /// Drive a submission to `target` per the allowed transition table.
    ///
    /// Entering Accepted or Published also ensures an invoice exists
    /// (idempotent; an existing Open invoice is left untouched).
    pub fn transition(
        &self,
        id: SubmissionId,
        target: SubmissionStatus,
    ) -> Result<(), DispatchError> {
        let occurred_at = Utc::now();
        let command = match target {
            SubmissionStatus::UnderReview => SubmissionCommand::StartReview(StartReview {
                submission_id: id,
                occurred_at,
            }),
            SubmissionStatus::Accepted => SubmissionCommand::AcceptSubmission(AcceptSubmission {
                submission_id: id,
                occurred_at,
            }),
            SubmissionStatus::Rejected => SubmissionCommand::RejectSubmission(RejectSubmission {
                submission_id: id,
                occurred_at,
            }),
            SubmissionStatus::Published => {
                SubmissionCommand::PublishSubmission(PublishSubmission {
                    submission_id: id,
                    occurred_at,
                })
            }
            SubmissionStatus::Submitted => {
                return Err(DispatchError::IllegalTransition(
                    "a rejected submission returns to submitted only via resubmit".to_string(),
                ));
            }
        };

        self.dispatch_submission(id, command)?;

        if matches!(
            target,
            SubmissionStatus::Accepted | SubmissionStatus::Published
        ) {
            self.ensure_invoice(id)?;
        }

        Ok(())
    }

    /// Resubmit a rejected submission with a revised draft.
    ///
    /// The link on the original is recorded first: that stream is the
    /// serialization point, so of two racing resubmits exactly one wins and
    /// the loser observes a conflict. The draft is validated before anything
    /// is written.
    pub fn resubmit(
        &self,
        original: SubmissionId,
        draft: SubmissionDraft,
    ) -> Result<SubmissionId, DispatchError> {
        draft.validate().map_err(DispatchError::from)?;

        let successor = SubmissionId::new(AggregateId::new());
        let occurred_at = Utc::now();

        self.dispatch_submission(
            original,
            SubmissionCommand::RecordResubmission(RecordResubmission {
                submission_id: original,
                successor,
                occurred_at,
            }),
        )?;

        self.dispatch_submission(
            successor,
            SubmissionCommand::ReceiveSubmission(ReceiveSubmission {
                submission_id: successor,
                draft,
                resubmission_of: Some(original),
                occurred_at,
            }),
        )?;

        Ok(successor)
    }

    // ---- invoice & payment ledger ----------------------------------------

    /// Open an invoice for an accepted/published submission (idempotent).
    ///
    /// Amount and due date default to the configured fee schedule.
    pub fn create_invoice(
        &self,
        submission_id: SubmissionId,
        amount: Option<FeeAmount>,
        due_date: Option<DateTime<Utc>>,
    ) -> Result<BillingReadModel, DispatchError> {
        // Strong check against the stream, not the projection: invoices only
        // exist for accepted/published submissions.
        let submission = self
            .dispatcher
            .rehydrate(submission_id.0, |aggregate_id| {
                Submission::empty(SubmissionId::new(aggregate_id))
            })?;
        if !submission.exists() {
            return Err(DispatchError::NotFound);
        }
        if !submission.is_payable() {
            return Err(DispatchError::InvalidState(format!(
                "no fee obligation in status {}",
                submission.status().as_str()
            )));
        }

        let account_id = BillingAccountId::for_submission(submission_id);
        let now = Utc::now();
        self.dispatch_billing(
            account_id,
            BillingCommand::OpenInvoice(OpenInvoice {
                account_id,
                submission_id,
                invoice_id: InvoiceId::new(AggregateId::new()),
                amount: amount.unwrap_or(self.fee_schedule.amount),
                due_date: due_date.unwrap_or_else(|| self.fee_schedule.due_date(now)),
                occurred_at: now,
            }),
        )?;

        self.ledger.get(&submission_id).ok_or(DispatchError::NotFound)
    }

    /// Record a Pending attempt against an Open invoice and hand it to the
    /// gateway; returns the attempt id for callback correlation.
    pub fn record_payment_attempt(
        &self,
        invoice_id: InvoiceId,
        method: PaymentMethod,
    ) -> Result<AttemptId, DispatchError> {
        let submission_id = self
            .ledger
            .submission_for_invoice(&invoice_id)
            .ok_or(DispatchError::NotFound)?;
        let account_id = BillingAccountId::for_submission(submission_id);
        let attempt_id = AttemptId::new(AggregateId::new());

        self.dispatch_billing(
            account_id,
            BillingCommand::RecordPaymentAttempt(RecordPaymentAttempt {
                account_id,
                invoice_id,
                attempt_id,
                method,
                occurred_at: Utc::now(),
            }),
        )?;

        let amount = self
            .ledger
            .get(&submission_id)
            .map(|rm| rm.invoice.amount)
            .unwrap_or(self.fee_schedule.amount);

        // Fire-and-forget hand-off; a synchronous rejection is recorded as a
        // Failed attempt rather than surfaced as a fault.
        if let Err(err) = self.gateway.initiate(GatewayRequest {
            invoice_id,
            attempt_id,
            amount,
            method,
        }) {
            warn!(%invoice_id, %attempt_id, error = %err, "gateway hand-off failed");
            self.settle_payment(attempt_id, SettlementOutcome::Failed)?;
        }

        Ok(attempt_id)
    }

    /// Apply a terminal gateway outcome to an attempt (idempotent).
    ///
    /// On success the invoice closes and the submission's payment status is
    /// reconciled to Paid.
    pub fn settle_payment(
        &self,
        attempt_id: AttemptId,
        outcome: SettlementOutcome,
    ) -> Result<(), DispatchError> {
        let submission_id = self
            .ledger
            .submission_for_attempt(&attempt_id)
            .ok_or(DispatchError::NotFound)?;
        let account_id = BillingAccountId::for_submission(submission_id);

        let command = BillingCommand::SettlePayment(SettlePayment {
            account_id,
            attempt_id,
            outcome,
            occurred_at: Utc::now(),
        });

        // A racing settlement loses the optimistic append; retry once against
        // fresh state, where it lands on the idempotent no-op path or a real
        // settlement conflict.
        match self.dispatch_billing(account_id, command.clone()) {
            Ok(_) => {}
            Err(DispatchError::Concurrency(_)) => {
                self.dispatch_billing(account_id, command)?;
            }
            Err(e) => return Err(e),
        }

        if outcome == SettlementOutcome::Succeeded {
            self.dispatch_submission(
                submission_id,
                SubmissionCommand::MarkFeePaid(MarkFeePaid {
                    submission_id,
                    occurred_at: Utc::now(),
                }),
            )?;
        }

        Ok(())
    }

    /// Expire every Open invoice past its due date; returns how many expired.
    pub fn expire_overdue(&self, now: DateTime<Utc>) -> Result<usize, DispatchError> {
        let mut expired = 0;
        for rm in self.ledger.list_overdue(now) {
            let account_id = rm.account_id;
            match self.dispatch_billing(
                account_id,
                BillingCommand::ExpireInvoice(ExpireInvoice { account_id, now }),
            ) {
                Ok(committed) if !committed.is_empty() => expired += 1,
                Ok(_) => {}
                Err(err) => {
                    warn!(submission_id = %rm.submission_id, error = ?err, "expiry dispatch failed");
                }
            }
        }
        Ok(expired)
    }

    // ---- dashboard queries ------------------------------------------------

    pub fn submission(&self, id: SubmissionId) -> Option<SubmissionReadModel> {
        self.board.get(&id)
    }

    pub fn billing(&self, submission_id: SubmissionId) -> Option<BillingReadModel> {
        self.ledger.get(&submission_id)
    }

    pub fn list_submissions(&self, status: Option<SubmissionStatus>) -> Vec<SubmissionReadModel> {
        match status {
            Some(status) => self.board.list_by_status(status),
            None => self.board.list_all(),
        }
    }

    /// Submissions with an outstanding fee and an Open invoice.
    pub fn list_payable(
        &self,
        author_email: Option<&str>,
    ) -> Vec<(SubmissionReadModel, BillingReadModel)> {
        self.board
            .list_pending_payment(author_email)
            .into_iter()
            .filter_map(|rm| {
                let billing = self.ledger.get(&rm.submission_id)?;
                (billing.invoice.status == scholarhub_billing::InvoiceStatus::Open)
                    .then_some((rm, billing))
            })
            .collect()
    }

    /// Rejected submissions with no recorded resubmission.
    pub fn list_resubmittable(&self, author_email: Option<&str>) -> Vec<SubmissionReadModel> {
        self.board.list_resubmittable(author_email)
    }

    // ---- internals --------------------------------------------------------

    fn dispatch_submission(
        &self,
        id: SubmissionId,
        command: SubmissionCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let committed = self.dispatcher.dispatch(
            id.0,
            "submissions.submission",
            command,
            |aggregate_id| Submission::empty(SubmissionId::new(aggregate_id)),
        )?;
        self.project(&committed);
        Ok(committed)
    }

    fn dispatch_billing(
        &self,
        account_id: BillingAccountId,
        command: BillingCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let committed = self.dispatcher.dispatch(
            account_id.0,
            "billing.account",
            command,
            |aggregate_id| BillingAccount::empty(BillingAccountId::new(aggregate_id)),
        )?;
        self.project(&committed);
        Ok(committed)
    }

    /// Apply committed events to the projections on the request path, so the
    /// caller reads its own writes.
    fn project(&self, committed: &[StoredEvent]) {
        for stored in committed {
            let envelope = stored.to_envelope();
            let applied = match envelope.aggregate_type() {
                "submissions.submission" => self
                    .board
                    .apply_envelope(&envelope)
                    .map_err(|e| e.to_string()),
                "billing.account" => self
                    .ledger
                    .apply_envelope(&envelope)
                    .map_err(|e| e.to_string()),
                _ => Ok(()),
            };
            if let Err(err) = applied {
                warn!(error = %err, "projection apply failed");
            }
        }
    }

    /// Invoice trigger on entering Accepted/Published.
    ///
    /// An already-settled fee is not an error for the transition itself.
    fn ensure_invoice(&self, id: SubmissionId) -> Result<(), DispatchError> {
        match self.create_invoice(id, None, None) {
            Ok(_) => Ok(()),
            Err(DispatchError::InvalidState(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
