//! Inference Gateway contract and implementations.
//!
//! The accelerator is a single exclusive resource: the scheduler guarantees
//! at most one in-flight `complete()` call. Implementations must return one
//! completion per prompt, in order — per-item failures become empty
//! completions, never a short list.

pub mod ollama;
pub mod prompt;

pub use ollama::OllamaClient;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Cannot reach inference server at {0}")]
    Connection(String),

    #[error("Inference request timed out after {0}s")]
    Timeout(u64),

    #[error("Inference server error (HTTP {status}): {body}")]
    Server { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing failed: {0}")]
    ResponseParsing(String),

    #[error("No suitable model available on the inference server")]
    NoModelAvailable,
}

/// Batch-completion contract for the accelerator-bound engine.
pub trait InferenceClient: Send + Sync {
    /// Complete every prompt in the batch. The returned vector has exactly
    /// `prompts.len()` entries in input order; an entry may be empty when
    /// that single item failed. A transport-level failure errors the whole
    /// batch instead.
    fn complete(&self, prompts: &[String]) -> Result<Vec<String>, InferenceError>;

    /// Models the server can currently run.
    fn list_models(&self) -> Result<Vec<String>, InferenceError>;

    fn is_model_available(&self, model: &str) -> Result<bool, InferenceError> {
        Ok(self.list_models()?.iter().any(|m| m.starts_with(model)))
    }
}

/// Scripted client for tests: replays queued batch outcomes and counts calls.
pub struct MockClient {
    outcomes: Mutex<Vec<Result<Vec<String>, InferenceError>>>,
    fallback: String,
    calls: AtomicUsize,
}

impl MockClient {
    /// Every prompt gets `response` back.
    pub fn respond_with(response: &str) -> Self {
        Self {
            outcomes: Mutex::new(Vec::new()),
            fallback: response.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue an outcome for the next `complete` call; once the queue drains,
    /// the fallback response applies.
    pub fn push_outcome(self, outcome: Result<Vec<String>, InferenceError>) -> Self {
        self.outcomes.lock().unwrap().push(outcome);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InferenceClient for MockClient {
    fn complete(&self, prompts: &[String]) -> Result<Vec<String>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            Ok(vec![self.fallback.clone(); prompts.len()])
        } else {
            outcomes.remove(0)
        }
    }

    fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        Ok(vec!["mock".to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_returns_one_completion_per_prompt() {
        let client = MockClient::respond_with("{}");
        let prompts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let out = client.complete(&prompts).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(client.calls(), 1);
    }

    #[test]
    fn mock_replays_queued_outcomes_first() {
        let client = MockClient::respond_with("fallback")
            .push_outcome(Err(InferenceError::Timeout(5)));
        assert!(client.complete(&["p".to_string()]).is_err());
        assert_eq!(client.complete(&["p".to_string()]).unwrap()[0], "fallback");
    }

    #[test]
    fn default_availability_uses_prefix_match() {
        let client = MockClient::respond_with("");
        assert!(client.is_model_available("mock").unwrap());
        assert!(!client.is_model_available("other").unwrap());
    }
}
