//! Buffered batch assembly
//!
//! Reads forward through a key range in byte-budgeted chunks, optionally
//! shuffles within the buffered window, and slices the result into
//! fixed-size batches. All schemas are driven in lock-step over the same
//! key ranges with the same permutation, so row `i` of every emitted batch
//! group originates from the same key.

use std::collections::VecDeque;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use super::buffer::{Batch, Buffer};
use crate::array::KeyRange;
use crate::error::{LatticeError, Result};
use crate::schema::TensorSchema;

/// Configuration for one batch stream
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Rows per emitted batch
    pub batch_size: usize,
    /// Byte budget per read chunk; 0 disables buffering and shuffling
    pub buffer_bytes: usize,
    /// Local shuffle window in rows; 0 disables shuffling
    pub shuffle_buffer_size: usize,
    /// Shuffle seed
    pub seed: u64,
}

/// Lock-step batch iterator over one or more schemas
///
/// Not restartable mid-epoch; request a fresh stream for the next epoch.
pub struct BatchStream {
    schemas: Vec<Arc<dyn TensorSchema>>,
    remaining: KeyRange,
    config: AssemblerConfig,
    rows_per_chunk: u64,
    rng: StdRng,
    leftover: Option<Vec<Buffer>>,
    ready: VecDeque<Vec<Batch>>,
    done: bool,
}

impl BatchStream {
    pub fn new(
        schemas: Vec<Arc<dyn TensorSchema>>,
        range: KeyRange,
        config: AssemblerConfig,
    ) -> Self {
        // Chunk size honors the byte budget but never drops below one batch;
        // a zero budget degenerates to exact batch-sized pass-through reads.
        let rows_per_chunk = if config.buffer_bytes == 0 {
            config.batch_size as u64
        } else {
            let row_bytes = schemas
                .iter()
                .map(|s| s.estimated_row_bytes())
                .max()
                .unwrap_or(1)
                .max(1);
            (config.buffer_bytes / row_bytes).max(config.batch_size) as u64
        };

        debug!(
            start = range.start,
            end = range.end,
            rows_per_chunk,
            batch_size = config.batch_size,
            "batch stream opened"
        );

        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            schemas,
            remaining: range,
            config,
            rows_per_chunk: rows_per_chunk.max(1),
            rng,
            leftover: None,
            ready: VecDeque::new(),
            done: false,
        }
    }

    fn shuffle_enabled(&self) -> bool {
        self.config.shuffle_buffer_size > 0 && self.config.buffer_bytes > 0
    }

    /// Permutation that shuffles rows within windows of
    /// `shuffle_buffer_size`, local to this buffer
    fn window_permutation(&mut self, rows: usize) -> Vec<usize> {
        let mut perm: Vec<usize> = (0..rows).collect();
        let window = self.config.shuffle_buffer_size.min(rows).max(1);
        let mut start = 0;
        while start < rows {
            let end = (start + window).min(rows);
            perm[start..end].shuffle(&mut self.rng);
            start = end;
        }
        perm
    }

    /// Read the next chunk, shuffle, merge leftovers, and slice batches
    fn fill(&mut self) -> Result<()> {
        let chunk = self.remaining.take(self.rows_per_chunk);
        self.remaining.start = chunk.end + 1;

        let mut buffers = Vec::with_capacity(self.schemas.len());
        for schema in &self.schemas {
            buffers.push(schema.read(chunk)?);
        }
        let rows = chunk.len() as usize;
        if buffers.iter().any(|b| b.num_rows() != rows) {
            return Err(LatticeError::internal(
                "schemas disagree on chunk row count",
            ));
        }

        if self.shuffle_enabled() {
            let perm = self.window_permutation(rows);
            for buffer in &mut buffers {
                *buffer = buffer.select_rows(&perm);
            }
        }

        if let Some(leftover) = self.leftover.take() {
            let mut merged = Vec::with_capacity(buffers.len());
            for (prev, next) in leftover.into_iter().zip(buffers) {
                merged.push(Buffer::concat(&[prev, next])?);
            }
            buffers = merged;
        }

        self.slice_batches(buffers);
        Ok(())
    }

    fn slice_batches(&mut self, buffers: Vec<Buffer>) {
        let rows = buffers.first().map_or(0, |b| b.num_rows());
        let batch_size = self.config.batch_size;
        let full = rows / batch_size;

        for b in 0..full {
            let idx: Vec<usize> = (b * batch_size..(b + 1) * batch_size).collect();
            let group: Vec<Batch> = buffers
                .iter()
                .map(|buf| buf.select_rows(&idx).into_batch())
                .collect();
            self.ready.push_back(group);
        }

        let tail = rows % batch_size;
        self.leftover = if tail > 0 {
            let idx: Vec<usize> = (rows - tail..rows).collect();
            Some(buffers.iter().map(|buf| buf.select_rows(&idx)).collect())
        } else {
            None
        };
    }

    fn flush_leftover(&mut self) {
        if let Some(leftover) = self.leftover.take() {
            let group: Vec<Batch> = leftover.into_iter().map(Buffer::into_batch).collect();
            if group.first().map_or(0, |b| b.num_rows()) > 0 {
                self.ready.push_back(group);
            }
        }
    }
}

impl Iterator for BatchStream {
    type Item = Result<Vec<Batch>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(group) = self.ready.pop_front() {
                return Some(Ok(group));
            }
            if self.done {
                return None;
            }
            if self.remaining.is_empty() {
                // Only the final batch of an epoch may be short
                self.flush_leftover();
                self.done = true;
                continue;
            }
            if let Err(e) = self.fill() {
                self.done = true;
                self.leftover = None;
                return Some(Err(e));
            }
        }
    }
}
