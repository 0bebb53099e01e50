//! Batch Scheduler and run orchestration.
//!
//! The central scheduling decision lives here: extraction (CPU-bound
//! deconstructor calls) fans out across a bounded worker pool, while batch
//! submission to the inference gateway is strictly serialized because the
//! accelerator is a single exclusive resource. Admission of new batches is
//! gated on host memory.

pub mod memory;
pub mod runner;
pub mod scheduler;

pub use memory::{MemoryGate, MemoryProbe, ProcMeminfo};
pub use runner::{AnalysisRunner, RunReport};
pub use scheduler::{BatchScheduler, PreparedPage, WindowBatch};

use thiserror::Error;

use crate::checkpoint::CheckpointError;
use crate::db::DatabaseError;
use crate::inference::InferenceError;
use crate::intelligence::IntelligenceError;
use crate::registry::RegistryError;
use crate::segment::SegmentError;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Intelligence store error: {0}")]
    Intelligence(#[from] IntelligenceError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Segmenter error: {0}")]
    Segment(#[from] SegmentError),

    #[error("Batch {batch_id} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        batch_id: String,
        attempts: u32,
        last_error: String,
    },

    #[error("{consecutive} consecutive inference failures, aborting run: {last_error}")]
    ConsecutiveFailures {
        consecutive: u32,
        last_error: String,
    },
}

impl AnalysisError {
    pub(crate) fn from_inference(batch_id: &str, attempts: u32, e: &InferenceError) -> Self {
        Self::RetriesExhausted {
            batch_id: batch_id.to_string(),
            attempts,
            last_error: e.to_string(),
        }
    }
}
