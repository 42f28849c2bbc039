//! Joint settlement of independent fallible operations.
//!
//! The diagnosis workflow dispatches two independent remote calls and
//! classifies the joint outcome by counting successes: both settled
//! successfully, one of two (partial), or none (total failure). The
//! primitive here is deliberately generic over the operation type so the
//! orchestrator carries no bespoke per-call plumbing.

use std::future::Future;

/// Run two independent fallible operations concurrently and wait for both
/// to settle.
///
/// Neither dispatch waits on the other and neither outcome short-circuits
/// the other: a failure on one side still lets the other run to completion.
/// Outcomes are returned in dispatch order.
pub async fn settle_pair<A, B, T, E>(left: A, right: B) -> (Result<T, E>, Result<T, E>)
where
    A: Future<Output = Result<T, E>>,
    B: Future<Output = Result<T, E>>,
{
    tokio::join!(left, right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Barrier;

    #[tokio::test]
    async fn both_outcomes_settle() {
        let (left, right): (Result<u32, String>, Result<u32, String>) =
            settle_pair(async { Ok(1) }, async { Err("service down".to_string()) }).await;

        assert_eq!(left.unwrap(), 1);
        assert_eq!(right.unwrap_err(), "service down");
    }

    #[tokio::test]
    async fn operations_overlap_rather_than_serialize() {
        // Each side blocks until the other arrives; this only completes if
        // both futures are in flight at once.
        let barrier = Arc::new(Barrier::new(2));
        let left_barrier = barrier.clone();
        let right_barrier = barrier.clone();

        let settled = tokio::time::timeout(
            Duration::from_secs(5),
            settle_pair::<_, _, (), String>(
                async move {
                    left_barrier.wait().await;
                    Ok(())
                },
                async move {
                    right_barrier.wait().await;
                    Ok(())
                },
            ),
        )
        .await
        .expect("concurrent settlement should not dead-lock");

        assert!(settled.0.is_ok() && settled.1.is_ok());
    }
}
