//! The analysis run: pull pending work, gate on memory, submit serialized
//! batches, commit per fingerprint, checkpoint after every commit.
//!
//! Resume correctness rests on two rules. Facts for a fingerprint are
//! buffered until its last window is parsed and then committed together
//! with the `processed` flip, so a crash can never record a half-analyzed
//! file as done. The checkpoint is saved strictly after each commit, so it
//! can lag the database but never lead it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::checkpoint::CheckpointManager;
use crate::config::ProjectConfig;
use crate::db::Database;
use crate::events::{CancelToken, EventSink, PipelineEvent};
use crate::extract::Deconstructor;
use crate::inference::prompt::build_prompt;
use crate::inference::InferenceClient;
use crate::intelligence::{Fact, IntelligenceStore};
use crate::intelligence::parser::parse_completion;
use crate::registry::store::{pending_files, processed_count, total_count};

use super::memory::{MemoryGate, MemoryProbe};
use super::scheduler::{BatchScheduler, WindowBatch};
use super::AnalysisError;

/// Outcome of one `run` call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Fingerprints committed during this run.
    pub processed: u64,
    /// Facts in the store when the run ended.
    pub total_facts: u64,
    pub batches: u64,
    pub parse_errors: u64,
    pub skipped_files: u64,
    pub cancelled: bool,
}

pub struct AnalysisRunner<'a> {
    config: &'a ProjectConfig,
    deconstructor: &'a dyn Deconstructor,
    client: &'a dyn InferenceClient,
    probe: &'a dyn MemoryProbe,
    sink: &'a dyn EventSink,
    cancel: CancelToken,
}

impl<'a> AnalysisRunner<'a> {
    pub fn new(
        config: &'a ProjectConfig,
        deconstructor: &'a dyn Deconstructor,
        client: &'a dyn InferenceClient,
        probe: &'a dyn MemoryProbe,
        sink: &'a dyn EventSink,
        cancel: CancelToken,
    ) -> Self {
        Self {
            config,
            deconstructor,
            client,
            probe,
            sink,
            cancel,
        }
    }

    /// Drive the pipeline until the registry has no pending fingerprints,
    /// cancellation is requested, or inference fails past the retry policy.
    /// Safe to call again after any of the three: already-committed
    /// fingerprints are never resubmitted.
    pub fn run(&self, db: &Database) -> Result<RunReport, AnalysisError> {
        let conn = db.connect()?;
        let store = IntelligenceStore::new(db.connect()?);
        let checkpoint = CheckpointManager::beside_database(db.path());

        if let Some(cursor) = checkpoint.load() {
            tracing::info!(
                processed = cursor.processed,
                last_fp = %cursor.last_fp,
                "Resuming from checkpoint"
            );
        }

        let total = total_count(&conn)?;
        let mut processed = processed_count(&conn)?;
        let mut total_facts = store.fact_count()?;
        tracing::info!(total, processed, total_facts, "Analysis run starting");

        let gate = MemoryGate::new(
            self.probe,
            self.config.memory_ceiling,
            Duration::from_secs(self.config.memory_poll_secs),
        );
        let scheduler = BatchScheduler::new(
            self.deconstructor,
            self.config.window_size,
            self.config.window_stride,
            self.config.cpu_workers,
            self.sink,
        );

        let mut report = RunReport::default();
        let mut consecutive_failures: u32 = 0;
        let page_limit = self.config.max_batch_windows.max(1);

        'run: loop {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let pending = pending_files(&conn, page_limit)?;
            if pending.is_empty() {
                checkpoint.clear()?;
                tracing::info!(processed, total_facts, "Analysis complete");
                self.sink.emit(PipelineEvent::EngineIdle {
                    processed,
                    total_facts,
                });
                break;
            }

            if !gate.wait_for_headroom(&self.cancel, self.sink) {
                report.cancelled = true;
                break;
            }

            let page = scheduler.prepare(&pending)?;
            report.skipped_files += page.skipped;

            // Zero-window fingerprints commit immediately, or they would be
            // pulled again on every page.
            for fp in &page.empty {
                store.commit(fp, &[])?;
                processed += 1;
                report.processed += 1;
                checkpoint.save(processed, fp, total_facts)?;
            }

            let mut buffered: HashMap<String, Vec<Fact>> = HashMap::new();
            let mut remaining = page.window_counts.clone();

            for chunk in page.windows.chunks(page_limit) {
                if self.cancel.is_cancelled() {
                    report.cancelled = true;
                    break 'run;
                }
                if !gate.wait_for_headroom(&self.cancel, self.sink) {
                    report.cancelled = true;
                    break 'run;
                }

                let batch = WindowBatch::new(chunk.to_vec());
                let prompts: Vec<String> = batch
                    .windows
                    .iter()
                    .map(|w| {
                        let name = page
                            .file_names
                            .get(&w.fingerprint)
                            .map(String::as_str)
                            .unwrap_or("unknown");
                        build_prompt(name, w.index, &w.text)
                    })
                    .collect();

                let started = Instant::now();
                self.sink.emit(PipelineEvent::BatchStarted {
                    batch_id: batch.id.clone(),
                    window_count: batch.windows.len(),
                });
                let completions =
                    self.submit_with_retry(&batch.id, &prompts, &mut consecutive_failures)?;
                report.batches += 1;

                let mut batch_facts = 0usize;
                for (window, completion) in batch.windows.iter().zip(&completions) {
                    let outcome = parse_completion(completion, &window.fingerprint, window.index);
                    if outcome.degraded() {
                        tracing::warn!(
                            fingerprint = %window.fingerprint,
                            window_index = window.index,
                            "Completion did not parse into facts"
                        );
                        self.sink.emit(PipelineEvent::ParseError {
                            fingerprint: window.fingerprint.clone(),
                            window_index: window.index,
                        });
                        report.parse_errors += 1;
                    }
                    batch_facts += outcome.facts.len();
                    buffered
                        .entry(window.fingerprint.clone())
                        .or_default()
                        .extend(outcome.facts);

                    let done = match remaining.get_mut(&window.fingerprint) {
                        Some(left) => {
                            *left -= 1;
                            *left == 0
                        }
                        None => false,
                    };
                    if done {
                        remaining.remove(&window.fingerprint);
                        let facts = buffered.remove(&window.fingerprint).unwrap_or_default();
                        let committed = store.commit(&window.fingerprint, &facts)?;
                        total_facts += committed.inserted;
                        processed += 1;
                        report.processed += 1;
                        checkpoint.save(processed, &window.fingerprint, total_facts)?;
                        tracing::debug!(
                            fingerprint = %window.fingerprint,
                            inserted = committed.inserted,
                            deduplicated = committed.deduplicated,
                            "Fingerprint committed"
                        );
                    }
                }

                self.sink.emit(PipelineEvent::BatchCompleted {
                    batch_id: batch.id,
                    facts: batch_facts,
                    duration_ms: started.elapsed().as_millis() as u64,
                });
            }
        }

        report.total_facts = total_facts;
        Ok(report)
    }

    /// One batch through the serialized gateway, with bounded retry and
    /// linear backoff. Exhausted retries and the consecutive-failure
    /// ceiling both abort the run; the checkpoint stays on disk either way.
    fn submit_with_retry(
        &self,
        batch_id: &str,
        prompts: &[String],
        consecutive_failures: &mut u32,
    ) -> Result<Vec<String>, AnalysisError> {
        let max_attempts = self.config.max_batch_retries.max(1);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.client.complete(prompts) {
                Ok(completions) => {
                    *consecutive_failures = 0;
                    return Ok(completions);
                }
                Err(e) => {
                    *consecutive_failures += 1;
                    tracing::warn!(
                        batch_id,
                        attempt,
                        consecutive = *consecutive_failures,
                        error = %e,
                        "Batch inference failed"
                    );
                    self.sink.emit(PipelineEvent::BatchError {
                        batch_id: batch_id.to_string(),
                        retry: attempt,
                        error: e.to_string(),
                    });

                    if *consecutive_failures >= self.config.max_consecutive_failures.max(1) {
                        let fatal = AnalysisError::ConsecutiveFailures {
                            consecutive: *consecutive_failures,
                            last_error: e.to_string(),
                        };
                        self.sink.emit(PipelineEvent::FatalError {
                            error: fatal.to_string(),
                        });
                        return Err(fatal);
                    }
                    if attempt >= max_attempts {
                        let fatal = AnalysisError::from_inference(batch_id, attempt, &e);
                        self.sink.emit(PipelineEvent::FatalError {
                            error: fatal.to_string(),
                        });
                        return Err(fatal);
                    }
                    std::thread::sleep(Duration::from_secs(
                        self.config.retry_backoff_secs * attempt as u64,
                    ));
                }
            }
        }
    }
}
