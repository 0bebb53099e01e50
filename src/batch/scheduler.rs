//! Page preparation: parallel extraction, segmentation, batch forming.
//!
//! A "page" is one pull of pending fingerprints in discovery order. The
//! scheduler extracts the page's files on a bounded worker pool, segments
//! each text on the coordinating thread, and hands the runner an ordered
//! window stream plus the per-fingerprint window counts it needs to know
//! when a fingerprint is complete.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use crossbeam_channel::unbounded;
use uuid::Uuid;

use crate::events::{EventSink, PipelineEvent};
use crate::extract::{Deconstructor, ExtractError};
use crate::registry::store::PendingFile;
use crate::segment::{segment, SegmentError, Window};

/// One serialized unit of inference work.
#[derive(Debug)]
pub struct WindowBatch {
    pub id: String,
    pub windows: Vec<Window>,
    pub created_at: DateTime<Utc>,
}

impl WindowBatch {
    pub fn new(windows: Vec<Window>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            windows,
            created_at: Utc::now(),
        }
    }
}

/// Extraction and segmentation output for one page of pending files.
#[derive(Debug, Default)]
pub struct PreparedPage {
    /// Windows in discovery order; windows of one fingerprint are
    /// contiguous and in segment order.
    pub windows: Vec<Window>,
    /// Window count per fingerprint, for completion tracking.
    pub window_counts: HashMap<String, usize>,
    /// Display name per fingerprint, for prompt context.
    pub file_names: HashMap<String, String>,
    /// Fingerprints that produced no windows (skipped or empty text).
    /// These must still be marked processed or they recycle forever.
    pub empty: Vec<String>,
    /// Files dropped with a skip event.
    pub skipped: u64,
}

pub struct BatchScheduler<'a> {
    deconstructor: &'a dyn Deconstructor,
    window_size: usize,
    window_stride: usize,
    workers: usize,
    sink: &'a dyn EventSink,
}

impl<'a> BatchScheduler<'a> {
    pub fn new(
        deconstructor: &'a dyn Deconstructor,
        window_size: usize,
        window_stride: usize,
        workers: usize,
        sink: &'a dyn EventSink,
    ) -> Self {
        Self {
            deconstructor,
            window_size,
            window_stride,
            workers: workers.max(1),
            sink,
        }
    }

    /// Extract and segment one page of pending files. Extraction runs on
    /// the worker pool; results are reassembled in input order so window
    /// order stays deterministic regardless of worker timing.
    pub fn prepare(&self, pending: &[PendingFile]) -> Result<PreparedPage, SegmentError> {
        let mut extracted: Vec<Option<Result<String, ExtractError>>> =
            (0..pending.len()).map(|_| None).collect();

        let (work_tx, work_rx) = unbounded::<(usize, String)>();
        let (result_tx, result_rx) = unbounded::<(usize, Result<String, ExtractError>)>();
        for (i, file) in pending.iter().enumerate() {
            let _ = work_tx.send((i, file.path.clone()));
        }
        drop(work_tx);

        std::thread::scope(|scope| {
            for _ in 0..self.workers.min(pending.len().max(1)) {
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for (i, path) in work_rx.iter() {
                        let outcome = self.deconstructor.extract(Path::new(&path));
                        let _ = result_tx.send((i, outcome));
                    }
                });
            }
            drop(result_tx);
            for (i, outcome) in result_rx.iter() {
                extracted[i] = Some(outcome);
            }
        });

        let mut page = PreparedPage::default();
        for (file, outcome) in pending.iter().zip(extracted) {
            let text = match outcome {
                Some(Ok(text)) => text,
                Some(Err(e)) => {
                    tracing::warn!(path = %file.path, reason = e.reason(), error = %e, "Skipping file");
                    self.sink.emit(PipelineEvent::FileSkipped {
                        path: file.path.clone(),
                        reason: e.reason().to_string(),
                    });
                    page.skipped += 1;
                    page.empty.push(file.fingerprint.clone());
                    continue;
                }
                // Worker pool delivered every queued index; unreachable.
                None => continue,
            };
            if text.trim().is_empty() {
                page.empty.push(file.fingerprint.clone());
                continue;
            }

            let windows = segment(&file.fingerprint, &text, self.window_size, self.window_stride)?;
            if windows.is_empty() {
                page.empty.push(file.fingerprint.clone());
                continue;
            }
            page.window_counts
                .insert(file.fingerprint.clone(), windows.len());
            page.file_names
                .insert(file.fingerprint.clone(), display_name(&file.path));
            page.windows.extend(windows);
        }
        Ok(page)
    }
}

fn display_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
