use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use scholarhub_core::AggregateId;
use scholarhub_events::{EventEnvelope, InMemoryEventBus};
use scholarhub_infra::command_dispatcher::CommandDispatcher;
use scholarhub_infra::event_store::InMemoryEventStore;
use scholarhub_submissions::{
    AcceptSubmission, ReceiveSubmission, ResearchField, StartReview, Submission,
    SubmissionCommand, SubmissionDraft, SubmissionId,
};

type Bus = Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>;

fn dispatcher() -> CommandDispatcher<InMemoryEventStore, Bus> {
    let store = InMemoryEventStore::new();
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    CommandDispatcher::new(store, bus)
}

fn draft() -> SubmissionDraft {
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

fn receive(id: SubmissionId) -> SubmissionCommand {
    SubmissionCommand::ReceiveSubmission(ReceiveSubmission {
        submission_id: id,
        draft: draft(),
        resubmission_of: None,
        occurred_at: Utc::now(),
    })
}

fn dispatch(
    d: &CommandDispatcher<InMemoryEventStore, Bus>,
    id: SubmissionId,
    command: SubmissionCommand,
) {
    d.dispatch(id.0, "submissions.submission", command, |aggregate_id| {
        Submission::empty(SubmissionId::new(aggregate_id))
    })
    .unwrap();
}

fn bench_submission_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("submission_dispatch");
    group.throughput(Throughput::Elements(1));

    group.bench_function("receive", |b| {
        let d = dispatcher();
        b.iter(|| {
            let id = SubmissionId::new(AggregateId::new());
            dispatch(&d, id, receive(id));
        })
    });

    group.bench_function("receive_review_accept", |b| {
        let d = dispatcher();
        b.iter(|| {
            let id = SubmissionId::new(AggregateId::new());
            dispatch(&d, id, receive(id));
            dispatch(
                &d,
                id,
                SubmissionCommand::StartReview(StartReview {
                    submission_id: id,
                    occurred_at: Utc::now(),
                }),
            );
            dispatch(
                &d,
                id,
                SubmissionCommand::AcceptSubmission(AcceptSubmission {
                    submission_id: id,
                    occurred_at: Utc::now(),
                }),
            );
        })
    });

    group.finish();
}

fn bench_rehydration(c: &mut Criterion) {
    let mut group = c.benchmark_group("rehydration");

    // Replay cost grows with stream length; lifecycle streams stay short, so
    // measure the populated sizes that actually occur.
    for submissions in [1usize, 64, 512] {
        let d = dispatcher();
        let mut last = SubmissionId::new(AggregateId::new());
        for _ in 0..submissions {
            last = SubmissionId::new(AggregateId::new());
            dispatch(&d, last, receive(last));
            dispatch(
                &d,
                last,
                SubmissionCommand::StartReview(StartReview {
                    submission_id: last,
                    occurred_at: Utc::now(),
                }),
            );
            dispatch(
                &d,
                last,
                SubmissionCommand::AcceptSubmission(AcceptSubmission {
                    submission_id: last,
                    occurred_at: Utc::now(),
                }),
            );
        }

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("store_population", submissions),
            &submissions,
            |b, _| {
                b.iter(|| {
                    d.rehydrate(last.0, |aggregate_id| {
                        Submission::empty(SubmissionId::new(aggregate_id))
                    })
                    .unwrap()
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_submission_dispatch, bench_rehydration);
criterion_main!(benches);
