//! Buffered, shuffled, sharded read pipeline
//!
//! Turns key-range reads from tensor schemas into fixed-size batch pairs.

pub mod assembler;
pub mod buffer;
pub mod loader;
pub mod sharder;

pub use assembler::{AssemblerConfig, BatchStream};
pub use buffer::{Batch, Buffer};
pub use loader::{ChannelLoader, Loader, LoaderConfig, PairStream};
pub use sharder::WorkerSharder;
