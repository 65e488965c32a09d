//! Loader facade
//!
//! Owns one tensor schema for X and one for Y, validates the pair at
//! construction, and drives the batch assembler in lock-step so emitted
//! (X, Y) batch pairs align row-for-row. `ChannelLoader` fans worker
//! streams into a tokio channel for parallel consumption.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use super::assembler::{AssemblerConfig, BatchStream};
use super::buffer::Batch;
use super::sharder::WorkerSharder;
use crate::array::KeyRange;
use crate::error::{LatticeError, Result};
use crate::schema::{ArrayParams, TensorSchema, TransformMap};
use crate::tensor::TensorKind;
use crate::{DEFAULT_BATCH_SIZE, DEFAULT_BUFFER_BYTES, DEFAULT_SEED};

/// Configuration for the loader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Rows per emitted batch
    pub batch_size: usize,
    /// Byte budget per read chunk; 0 disables buffering and shuffling
    pub buffer_bytes: usize,
    /// Local shuffle window in rows; 0 disables shuffling
    pub shuffle_buffer_size: usize,
    /// Degree of parallel sharding
    pub num_workers: usize,
    /// Base seed for shuffle permutations
    pub seed: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            buffer_bytes: DEFAULT_BUFFER_BYTES,
            shuffle_buffer_size: 0,
            num_workers: 1,
            seed: DEFAULT_SEED,
        }
    }
}

/// Paired X/Y batch loader
pub struct Loader {
    x: Arc<dyn TensorSchema>,
    y: Arc<dyn TensorSchema>,
    config: LoaderConfig,
    sharder: WorkerSharder,
    epoch: AtomicU64,
}

impl Loader {
    /// Build schemas for both sides and validate the pairing
    pub fn new(x_params: &ArrayParams, y_params: &ArrayParams, config: LoaderConfig) -> Result<Self> {
        Self::with_transforms(
            x_params,
            y_params,
            &TransformMap::new(),
            &TransformMap::new(),
            config,
        )
    }

    /// As [`Loader::new`], with per-kind transform tables for each side
    pub fn with_transforms(
        x_params: &ArrayParams,
        y_params: &ArrayParams,
        x_transforms: &TransformMap,
        y_transforms: &TransformMap,
        config: LoaderConfig,
    ) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(LatticeError::InvalidConfig {
                reason: "batch_size must be at least 1".into(),
            });
        }

        let x: Arc<dyn TensorSchema> = Arc::from(x_params.to_schema(x_transforms)?);
        let y: Arc<dyn TensorSchema> = Arc::from(y_params.to_schema(y_transforms)?);

        if x.row_count() != y.row_count() {
            return Err(LatticeError::RowCountMismatch {
                x_rows: x.row_count(),
                y_rows: y.row_count(),
            });
        }
        if config.num_workers > 1
            && (x.kind() != TensorKind::Dense || y.kind() != TensorKind::Dense)
        {
            // Sparse row boundaries cannot be predetermined without a dense
            // index, so the domain cannot be split safely.
            return Err(LatticeError::not_supported(
                "multiple workers are not supported with sparse arrays",
            ));
        }

        let sharder = WorkerSharder::new(x.key_bounds(), config.num_workers.max(1));
        debug!(
            rows = x.row_count(),
            workers = sharder.num_workers(),
            "loader constructed"
        );

        Ok(Self {
            x,
            y,
            config,
            sharder,
            epoch: AtomicU64::new(0),
        })
    }

    /// Rows along the key dimension (identical for X and Y)
    pub fn row_count(&self) -> u64 {
        self.x.row_count()
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    fn assembler_config(&self, epoch: u64, worker_id: usize) -> AssemblerConfig {
        // Deterministic per-epoch, per-worker seed derivation
        let seed = self
            .config
            .seed
            .wrapping_add(epoch.wrapping_mul(0x9E37_79B9_7F4A_7C15))
            .wrapping_add(worker_id as u64);
        AssemblerConfig {
            batch_size: self.config.batch_size,
            buffer_bytes: self.config.buffer_bytes,
            shuffle_buffer_size: self.config.shuffle_buffer_size,
            seed,
        }
    }

    fn stream_over(&self, range: KeyRange, epoch: u64, worker_id: usize) -> PairStream {
        PairStream {
            inner: BatchStream::new(
                vec![self.x.clone(), self.y.clone()],
                range,
                self.assembler_config(epoch, worker_id),
            ),
        }
    }

    /// Fresh single-stream epoch over the full key domain
    pub fn batches(&self) -> PairStream {
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed);
        self.stream_over(self.x.key_bounds(), epoch, 0)
    }

    /// Fresh epoch as one independent stream per worker shard
    pub fn worker_streams(&self) -> Vec<PairStream> {
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed);
        self.sharder
            .assign()
            .into_iter()
            .enumerate()
            .map(|(worker_id, range)| self.stream_over(range, epoch, worker_id))
            .collect()
    }

    /// Spawn one blocking task per worker and deliver batch pairs over a
    /// channel; dropping the returned loader cancels the workers.
    pub fn spawn(&self, channel_size: usize) -> ChannelLoader {
        let (sender, receiver) = mpsc::channel(channel_size.max(1));
        let mut handles = Vec::with_capacity(self.sharder.num_workers());
        for (worker_id, stream) in self.worker_streams().into_iter().enumerate() {
            let sender = sender.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                for item in stream {
                    if sender.blocking_send(item).is_err() {
                        debug!(worker_id, "consumer dropped, stopping worker");
                        return;
                    }
                }
                debug!(worker_id, "worker shard exhausted");
            }));
        }
        ChannelLoader {
            receiver,
            handles,
            batches_loaded: 0,
        }
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("x_kind", &self.x.kind())
            .field("y_kind", &self.y.kind())
            .field("config", &self.config)
            .field("sharder", &self.sharder)
            .field("epoch", &self.epoch)
            .finish()
    }
}

/// Iterator over paired (X, Y) batches for one worker and one epoch
pub struct PairStream {
    inner: BatchStream,
}

impl Iterator for PairStream {
    type Item = Result<(Batch, Batch)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next()? {
            Ok(mut group) => {
                debug_assert_eq!(group.len(), 2);
                let y = group.pop()?;
                let x = group.pop()?;
                Some(Ok((x, y)))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Channel-fed loader over all worker streams of one epoch
pub struct ChannelLoader {
    receiver: mpsc::Receiver<Result<(Batch, Batch)>>,
    handles: Vec<tokio::task::JoinHandle<()>>,
    batches_loaded: u64,
}

impl ChannelLoader {
    /// Next batch pair from any worker; `None` once every shard is drained
    pub async fn next_batch(&mut self) -> Option<Result<(Batch, Batch)>> {
        let item = self.receiver.recv().await?;
        if item.is_ok() {
            self.batches_loaded += 1;
        }
        Some(item)
    }

    /// Total batch pairs delivered so far
    pub fn batches_loaded(&self) -> u64 {
        self.batches_loaded
    }

    /// Stop consuming and wait for worker tasks to finish
    pub async fn shutdown(mut self) {
        self.receiver.close();
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        debug!(batches = self.batches_loaded, "channel loader shutdown");
    }
}
