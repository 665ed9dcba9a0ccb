//! Run an external command over a large text file in parallel, one command
//! per line-aligned byte range.
//!
//! The pipeline is strictly two-phase: [`scan`] makes a single forward pass
//! over the input and derives a [`PartitionPlan`]; [`dispatch`] then runs one
//! worker per range, each with its own file handle and its own subprocess.

/// Use mimalloc as the global allocator for all binaries.
/// Better thread-local caching for the per-worker buffers.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod common;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod scan;

pub use config::RunConfig;
pub use dispatch::{RunSummary, WorkerReport, run};
pub use error::{Error, Result};
pub use scan::PartitionPlan;
