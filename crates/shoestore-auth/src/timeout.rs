//! Bounding a fallible async call by a deadline.

use std::future::Future;
use std::time::Duration;

/// Outcome of a call raced against a timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timed<T, E> {
    Ok(T),
    /// The timer won; the call was dropped.
    TimedOut,
    Err(E),
}

/// Run `call`, giving up after `limit`.
pub async fn with_timeout<F, T, E>(limit: Duration, call: F) -> Timed<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Timed::Ok(value),
        Ok(Err(e)) => Timed::Err(e),
        Err(_) => Timed::TimedOut,
    }
}
