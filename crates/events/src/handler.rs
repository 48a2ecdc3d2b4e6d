/// Execute an aggregate command deterministically (no IO, no async).
///
/// The canonical event-sourced lifecycle in one step: decide
/// (`aggregate.handle`), then evolve (`aggregate.apply` per event). Mutates
/// the aggregate in place and returns the emitted events.
///
/// For production paths prefer the command dispatcher, which adds
/// persistence, publication, and optimistic concurrency; this helper is for
/// unit tests and inline processing.
pub fn execute<A>(
    aggregate: &mut A,
    command: &A::Command,
) -> Result<Vec<A::Event>, A::Error>
where
    A: scholarhub_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
