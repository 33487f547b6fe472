//! Gemini REST adapter with the Google Search grounding tool.
//!
//! Single-shot calls hit `models/{model}:generateContent`; streamed calls hit
//! `models/{model}:streamGenerateContent?alt=sse` and concatenate the text of
//! every event.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use medcontact_shared::{Credential, MedContactError, ProviderConfig, Result};

use crate::{ProviderError, ProviderFactory, SearchProvider};

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("MedContact/", env!("CARGO_PKG_VERSION"));

/// API version path segment.
const API_VERSION: &str = "v1beta";

/// How much of an error body to keep in messages.
const ERROR_BODY_PREVIEW: usize = 200;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    tools: Vec<Tool>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

fn request_body(prompt: &str) -> GenerateRequest<'_> {
    GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![Part { text: prompt }],
        }],
        tools: vec![Tool {
            google_search: GoogleSearch {},
        }],
        generation_config: GenerationConfig {
            temperature: 0.0,
            response_mime_type: "text/plain",
        },
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Builds [`GeminiProvider`]s sharing one HTTP connection pool.
#[derive(Debug, Clone)]
pub struct GeminiFactory {
    client: Client,
    base_url: Url,
    model: String,
    stream: bool,
}

impl GeminiFactory {
    /// Create a factory from the `[provider]` config section.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| {
            MedContactError::config(format!("invalid provider base_url '{}': {e}", config.base_url))
        })?;

        if config.model.trim().is_empty() {
            return Err(MedContactError::config("provider model must not be empty"));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| MedContactError::Provider(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            model: config.model.trim().to_string(),
            stream: config.stream,
        })
    }

    fn endpoint(&self) -> Result<Url> {
        let method = if self.stream {
            "streamGenerateContent"
        } else {
            "generateContent"
        };
        let mut url = self
            .base_url
            .join(&format!("{API_VERSION}/models/{}:{method}", self.model))
            .map_err(|e| MedContactError::Provider(format!("invalid endpoint: {e}")))?;
        if self.stream {
            url.query_pairs_mut().append_pair("alt", "sse");
        }
        Ok(url)
    }
}

impl ProviderFactory for GeminiFactory {
    type Provider = GeminiProvider;

    fn connect(&self, credential: &Credential) -> Result<GeminiProvider> {
        let key = credential.expose();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_graphic()) {
            return Err(MedContactError::Provider(format!(
                "malformed credential {credential}: keys must be non-empty printable ASCII"
            )));
        }

        Ok(GeminiProvider {
            client: self.client.clone(),
            endpoint: self.endpoint()?,
            credential: credential.clone(),
            stream: self.stream,
        })
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// A Gemini channel bound to one API key.
pub struct GeminiProvider {
    client: Client,
    endpoint: Url,
    credential: Credential,
    stream: bool,
}

#[async_trait]
impl SearchProvider for GeminiProvider {
    #[instrument(skip_all, fields(key = %self.credential, stream = self.stream))]
    async fn complete(&self, prompt: &str) -> std::result::Result<String, ProviderError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-goog-api-key", self.credential.expose())
            .json(&request_body(prompt))
            .send()
            .await
            .map_err(|e| ProviderError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Transient(format!("body read failed: {e}")))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let text = if self.stream {
            parse_sse_body(&body)?
        } else {
            let parsed: GenerateResponse = serde_json::from_str(&body).map_err(|e| {
                ProviderError::Transient(format!("undecodable response: {e}"))
            })?;
            parsed.text()
        };

        debug!(chars = text.len(), "provider responded");

        if text.trim().is_empty() {
            return Err(ProviderError::Transient("empty response text".into()));
        }
        Ok(text)
    }
}

/// Map a non-success HTTP status to a retry classification.
fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
    let message = format!("HTTP {status}: {preview}");
    match status.as_u16() {
        400 | 401 | 403 | 404 => ProviderError::Fatal(message),
        _ => ProviderError::Transient(message),
    }
}

/// Concatenate the candidate text of every `data:` event in an SSE body.
fn parse_sse_body(body: &str) -> std::result::Result<String, ProviderError> {
    let mut text = String::new();
    for line in body.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            continue;
        }
        let event: GenerateResponse = serde_json::from_str(data)
            .map_err(|e| ProviderError::Transient(format!("undecodable stream event: {e}")))?;
        text.push_str(&event.text());
    }
    Ok(text)
}
