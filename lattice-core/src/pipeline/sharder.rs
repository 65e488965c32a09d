//! Deterministic worker sharding
//!
//! Splits the key-dimension domain into contiguous, disjoint, gap-free
//! sub-ranges, one per worker. Workers coordinate through range ownership
//! only, never through shared mutable state.

use tracing::debug;

use crate::array::KeyRange;
use crate::error::{LatticeError, Result};

/// Contiguous range splitter over the key domain
#[derive(Debug, Clone)]
pub struct WorkerSharder {
    domain: KeyRange,
    num_workers: usize,
}

impl WorkerSharder {
    pub fn new(domain: KeyRange, num_workers: usize) -> Self {
        Self {
            domain,
            num_workers: num_workers.max(1),
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Shard ranges for all workers; worker `i` gets roughly the i-th 1/N
    /// fraction. Trailing workers may receive empty ranges when the domain
    /// has fewer keys than workers.
    pub fn assign(&self) -> Vec<KeyRange> {
        let total = self.domain.len();
        let n = self.num_workers as u64;
        let base = total / n;
        let remainder = total % n;

        let mut shards = Vec::with_capacity(self.num_workers);
        let mut start = self.domain.start;
        for worker in 0..n {
            let rows = base + if worker < remainder { 1 } else { 0 };
            let end = start + rows as i64 - 1;
            shards.push(KeyRange::new(start, end));
            start = end + 1;
        }

        debug!(
            start = self.domain.start,
            end = self.domain.end,
            workers = self.num_workers,
            "sharded key domain"
        );
        shards
    }

    /// Shard range owned by one worker
    pub fn range_for_worker(&self, worker_id: usize) -> Result<KeyRange> {
        if worker_id >= self.num_workers {
            return Err(LatticeError::InvalidConfig {
                reason: format!(
                    "worker {} out of range for {} workers",
                    worker_id, self.num_workers
                ),
            });
        }
        Ok(self.assign()[worker_id])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shards_cover_domain_exactly_once() {
        let sharder = WorkerSharder::new(KeyRange::new(0, 99), 4);
        let shards = sharder.assign();
        assert_eq!(shards.len(), 4);

        let mut keys = Vec::new();
        for shard in &shards {
            keys.extend(shard.start..=shard.end);
        }
        assert_eq!(keys, (0..=99).collect::<Vec<i64>>());
    }

    #[test]
    fn test_uneven_split_front_loads_remainder() {
        let sharder = WorkerSharder::new(KeyRange::new(0, 9), 3);
        let shards = sharder.assign();
        assert_eq!(shards[0].len(), 4);
        assert_eq!(shards[1].len(), 3);
        assert_eq!(shards[2].len(), 3);
    }

    #[test]
    fn test_more_workers_than_keys() {
        let sharder = WorkerSharder::new(KeyRange::new(0, 1), 4);
        let shards = sharder.assign();
        let non_empty: usize = shards.iter().filter(|s| !s.is_empty()).count();
        assert_eq!(non_empty, 2);
    }

    #[test]
    fn test_assignment_is_deterministic() {
        let sharder = WorkerSharder::new(KeyRange::new(5, 104), 7);
        assert_eq!(sharder.assign(), sharder.assign());
    }

    #[test]
    fn test_worker_id_out_of_range() {
        let sharder = WorkerSharder::new(KeyRange::new(0, 9), 2);
        assert!(sharder.range_for_worker(2).is_err());
    }
}
