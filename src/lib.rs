//! SteinLine: a resilient pipeline that turns a directory tree of evidence
//! files into a deduplicated store of timestamped facts.
//!
//! The flow is linear: the registry discovers files by content fingerprint,
//! the deconstructor extracts text, the segmenter cuts it into overlapping
//! windows, the batch runner pushes windows through a serialized inference
//! gateway, and the intelligence store commits parsed facts together with
//! the resume bookkeeping. Every stage is crash-tolerant; re-running after
//! an interruption continues instead of restarting.

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod db;
pub mod events;
pub mod extract;
pub mod inference;
pub mod intelligence;
pub mod registry;
pub mod segment;
pub mod timeline;

pub use batch::{AnalysisError, AnalysisRunner, RunReport};
pub use config::{ProjectConfig, SkipPolicy};
pub use db::Database;
pub use events::{CancelToken, EventSink, PipelineEvent};
pub use intelligence::Fact;
