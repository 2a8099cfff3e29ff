/// Decide and evolve in one step (no IO, no persistence).
///
/// Calls `handle` and applies every returned event to `aggregate`. Used by
/// domain tests and anywhere a command must be run against in-memory state;
/// the persistent path goes through `CommandDispatcher` in `infra`.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: stockbook_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
