use std::future::Future;

/// Applies `transition` to `state` right away, then awaits `command`. If the
/// command fails, `state` is restored to what it was before the transition.
pub async fn apply_optimistic<S, T, E, Fut>(
    state: &mut S,
    transition: impl FnOnce(&mut S),
    command: Fut,
) -> Result<T, E>
where
    S: Clone,
    Fut: Future<Output = Result<T, E>>,
{
    let snapshot = state.clone();
    transition(state);
    match command.await {
        Ok(value) => Ok(value),
        Err(err) => {
            *state = snapshot;
            Err(err)
        }
    }
}
