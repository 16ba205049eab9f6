//! Runs operation lists with bounded retry.

use crate::error::{Phase, SyncError};
use crate::ops::{OpOutcome, Operation};
use crate::store::{GraphStore, StoreError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Applies operations in order, retrying each one a fixed number of times.
///
/// Exhausting the retries of one operation aborts the rest of the call.
/// Operations already applied stay applied.
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    max_attempts: u32,
    retry_delay: Duration,
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

impl BatchExecutor {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Applies every operation of one batch.
    pub fn execute(
        &self,
        store: &dyn GraphStore,
        ops: &[Operation],
        phase: Phase,
        batch_index: usize,
    ) -> Result<OpOutcome, SyncError> {
        let mut total = OpOutcome::default();
        for op in ops {
            total += self.run(phase, batch_index, || op.apply(store))?;
        }
        debug!(
            "{} batch {}: {} ops, {} nodes created, {} deleted, {} edges created",
            phase,
            batch_index,
            ops.len(),
            total.nodes_created + total.tombstones_created,
            total.nodes_deleted,
            total.edges_created + total.edges_restored,
        );
        Ok(total)
    }

    /// Runs `step` until it succeeds or the attempts are used up.
    pub fn run<T, F>(&self, phase: Phase, batch_index: usize, mut step: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Result<T, StoreError>,
    {
        let mut attempt = 1;
        loop {
            match step() {
                Ok(value) => return Ok(value),
                Err(source) if attempt >= self.max_attempts => {
                    return Err(SyncError::Batch {
                        phase,
                        batch_index,
                        attempts: attempt,
                        source,
                    });
                }
                Err(e) => {
                    warn!(
                        "{} batch {} attempt {}/{} failed: {}",
                        phase, batch_index, attempt, self.max_attempts, e
                    );
                    attempt += 1;
                    if !self.retry_delay.is_zero() {
                        thread::sleep(self.retry_delay);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{record, FlakyStore};
    use std::sync::atomic::Ordering;

    fn creates(n: usize) -> Vec<Operation> {
        (0..n)
            .map(|i| Operation::CreateNode {
                record: record("main", &format!("C{}", i), None),
            })
            .collect()
    }

    #[test]
    fn test_transient_failure_is_retried() {
        let store = FlakyStore::failing_nodes(2);
        let executor = BatchExecutor::new(3, Duration::ZERO);

        let outcome = executor
            .execute(&store, &creates(2), Phase::Nodes, 0)
            .unwrap();
        assert_eq!(outcome.nodes_created, 2);
        assert_eq!(store.node_calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_exhausted_retries_report_batch() {
        let store = FlakyStore::failing_nodes(5);
        let executor = BatchExecutor::new(3, Duration::ZERO);

        let err = executor
            .execute(&store, &creates(2), Phase::Nodes, 4)
            .unwrap_err();
        match err {
            SyncError::Batch {
                phase,
                batch_index,
                attempts,
                ..
            } => {
                assert_eq!(phase, Phase::Nodes);
                assert_eq!(batch_index, 4);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {}", other),
        }
        // The second operation never ran.
        assert_eq!(store.node_calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.stats().unwrap().node_count, 0);
    }
}
