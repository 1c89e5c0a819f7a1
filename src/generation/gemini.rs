//! HTTP client for a `generateContent`-style text-generation API.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{prompt, GenerationFuture, ReplyGenerator, ReplyRequest};
use crate::config::GenerationConfig;
use crate::{AppError, Result};

/// [`ReplyGenerator`] backed by the hosted generation API.
pub struct HttpReplyGenerator {
    client: Client,
    url: String,
    api_key: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl HttpReplyGenerator {
    /// Build a client from configuration. Credentials must already be loaded.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            config.endpoint.trim_end_matches('/'),
            config.model
        );
        Ok(Self {
            client,
            url,
            api_key: config.api_key.clone(),
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            contents: [RequestContent {
                parts: [RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::GenerationUnavailable(format!(
                "generation service returned {status}: {detail}"
            )));
        }

        let parsed: GenerateResponse = response.json().await?;
        let text = extract_text(parsed)?;
        debug!(chars = text.len(), "generation succeeded");
        Ok(text)
    }
}

/// Concatenated text of the first candidate.
fn extract_text(response: GenerateResponse) -> Result<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::GenerationUnavailable(
            "generation service returned no text".into(),
        ));
    }
    Ok(trimmed.to_owned())
}

impl ReplyGenerator for HttpReplyGenerator {
    fn generate_reply<'a>(&'a self, request: &'a ReplyRequest) -> GenerationFuture<'a> {
        Box::pin(async move { self.generate(&prompt::reply_prompt(request)).await })
    }

    fn generate_report<'a>(&'a self, prompt: &'a str) -> GenerationFuture<'a> {
        Box::pin(self.generate(prompt))
    }
}
