//! Ollama HTTP client: the shipped Inference Gateway implementation.
//!
//! Ollama serves one generation at a time per model, which matches the
//! pipeline's serialized batch submission. A batch is completed item by
//! item; an item-level server error degrades to an empty completion while a
//! transport failure errors the whole batch.

use serde::{Deserialize, Serialize};

use super::{prompt::SYSTEM_PROMPT, InferenceClient, InferenceError};

pub struct OllamaClient {
    base_url: String,
    model: String,
    num_ctx: usize,
    timeout_secs: u64,
    client: reqwest::blocking::Client,
}

impl OllamaClient {
    pub fn new(
        base_url: &str,
        model: &str,
        num_ctx: usize,
        timeout_secs: u64,
    ) -> Result<Self, InferenceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| InferenceError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            num_ctx,
            timeout_secs,
            client,
        })
    }

    fn generate_one(&self, prompt: &str) -> Result<String, InferenceError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            system: SYSTEM_PROMPT,
            stream: false,
            options: GenerateOptions {
                num_ctx: self.num_ctx,
                temperature: 0.0,
            },
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_connect() {
                InferenceError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                InferenceError::Timeout(self.timeout_secs)
            } else {
                InferenceError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(InferenceError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| InferenceError::ResponseParsing(e.to_string()))?;
        Ok(parsed.response)
    }
}

impl InferenceClient for OllamaClient {
    fn complete(&self, prompts: &[String]) -> Result<Vec<String>, InferenceError> {
        let mut completions = Vec::with_capacity(prompts.len());
        for (i, prompt) in prompts.iter().enumerate() {
            match self.generate_one(prompt) {
                Ok(text) => completions.push(text),
                // Transport failures abort the batch so the scheduler can
                // retry it whole; a server-side item failure keeps the
                // one-result-per-prompt contract with an empty marker.
                Err(e @ InferenceError::Connection(_)) | Err(e @ InferenceError::Timeout(_)) => {
                    return Err(e)
                }
                Err(e) => {
                    tracing::warn!(item = i, error = %e, "Completion failed for one prompt");
                    completions.push(String::new());
                }
            }
        }
        Ok(completions)
    }

    fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().map_err(|e| {
            if e.is_connect() {
                InferenceError::Connection(self.base_url.clone())
            } else {
                InferenceError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(InferenceError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TagsResponse = response
            .json()
            .map_err(|e| InferenceError::ResponseParsing(e.to_string()))?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    num_ctx: usize,
    temperature: f64,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}
