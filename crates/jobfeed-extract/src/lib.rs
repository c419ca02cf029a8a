//! LLM-backed field extraction for job postings and resumes over an
//! OpenAI-compatible chat-completions API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jobfeed_core::{ExtractedJobRecord, JobCategory, Resume};
use jobfeed_storage::{classify_reqwest_error, classify_status, BackoffPolicy, RetryDisposition};
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const CRATE_NAME: &str = "jobfeed-extract";

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_MAX_INPUT_CHARS: usize = 24_000;

/// Why an extraction produced no record. Callers skip the job and keep going.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("llm request failed: {0}")]
    Transport(String),
    #[error("llm api returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("llm returned no content")]
    EmptyResponse,
    #[error("llm output does not match the schema: {0}")]
    Schema(String),
    #[error("invalid llm configuration: {0}")]
    Config(String),
}

/// Turns unstructured posting text or HTML into an [`ExtractedJobRecord`].
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract_job(&self, content: &str) -> Result<ExtractedJobRecord, ExtractionError>;
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub max_input_chars: usize,
    /// Applied to rate limits, server errors and transport failures.
    pub backoff: BackoffPolicy,
}

impl LlmConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(60),
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    content: Option<String>,
}

/// Minimal chat-completions client returning the raw JSON-mode answer.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl ChatClient {
    pub fn new(config: LlmConfig) -> Result<Self, ExtractionError> {
        if config.api_key.trim().is_empty() {
            return Err(ExtractionError::Config("api key is empty".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ExtractionError::Config(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    pub async fn complete_json(&self, system: &str, user: &str) -> Result<String, ExtractionError> {
        let start = Instant::now();
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let backoff = self.config.backoff;
        let mut attempt = 0;
        let response = loop {
            let sent = self
                .http
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&request)
                .send()
                .await;
            match sent {
                Ok(resp) if resp.status().is_success() => break resp,
                Ok(resp) => {
                    let status = resp.status();
                    if retry_allowed(classify_status(status), attempt, &backoff) {
                        debug!(attempt, status = status.as_u16(), "retrying llm request");
                        tokio::time::sleep(backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    let body = resp.text().await.unwrap_or_default();
                    warn!(status = %status, "llm api error");
                    return Err(ExtractionError::Api {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(err) => {
                    if retry_allowed(classify_reqwest_error(&err), attempt, &backoff) {
                        debug!(attempt, error = %err, "retrying llm request");
                        tokio::time::sleep(backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    warn!(error = %err, "llm request failed");
                    return Err(ExtractionError::Transport(err.to_string()));
                }
            }
        };

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Schema(e.to_string()))?;

        debug!(
            model = %self.config.model,
            duration_ms = start.elapsed().as_millis(),
            "llm chat completion"
        );

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(ExtractionError::EmptyResponse)
    }
}

fn retry_allowed(disposition: RetryDisposition, attempt: usize, backoff: &BackoffPolicy) -> bool {
    disposition == RetryDisposition::Retryable && attempt < backoff.max_retries
}

/// Truncates to at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

/// Strips a surrounding Markdown code fence, if present.
pub fn strip_code_fences(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

fn drop_nulls(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(drop_nulls);
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(drop_nulls),
        _ => {}
    }
}

/// Parses a JSON-object answer into `T`. Anything else is a schema mismatch.
///
/// Null members are treated as absent so that "missing" answers fall back to defaults.
pub fn parse_structured<T: DeserializeOwned>(content: &str) -> Result<T, ExtractionError> {
    let body = strip_code_fences(content);
    if body.is_empty() {
        return Err(ExtractionError::EmptyResponse);
    }
    let mut value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ExtractionError::Schema(e.to_string()))?;
    if !value.is_object() {
        return Err(ExtractionError::Schema("expected a JSON object".into()));
    }
    drop_nulls(&mut value);
    serde_json::from_value(value).map_err(|e| ExtractionError::Schema(e.to_string()))
}

fn schema_text<T: JsonSchema>() -> String {
    serde_json::to_string_pretty(&schema_for!(T)).unwrap_or_default()
}

const JOB_SYSTEM_PROMPT: &str = "You are an information extraction assistant. \
Analyze job posting content and return structured data as a single JSON object that \
follows the given schema. Never fabricate information. Use null or [] where data is \
missing. Respond only with valid JSON, without commentary or markdown.";

pub fn job_prompt(content: &str) -> String {
    let categories = JobCategory::ALL
        .iter()
        .map(|c| format!("- {}", c.label()))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Read the job posting below and extract data according to this JSON schema:\n\n\
         {schema}\n\n\
         job_category must be exactly one of:\n{categories}\n\n\
         job_employment_types uses values such as \"full-time\", \"part-time\", \"contractor\", \"internship\".\n\n\
         --- JOB CONTENT START ---\n{content}\n--- JOB CONTENT END ---",
        schema = schema_text::<ExtractedJobRecord>(),
    )
}

const RESUME_SYSTEM_PROMPT: &str = "You are an expert information extractor. Only extract \
relevant information from the resume and do not modify it. Provide keywords relevant for \
a job search. Return null for any missing value. Respond only with valid JSON matching \
the schema.";

const TAILOR_SYSTEM_PROMPT: &str = "You are a human resources expert who tailors resumes \
to job descriptions. Do not add new information or modify facts in the master resume. \
Only include skills and projects that are present in the resume and relevant to the job. \
The summary must capture the candidate's value and fit for the job, and keywords must \
come from the candidate's skills, projects and experience. Respond only with valid JSON \
in the same structure as the master resume.";

pub fn resume_prompt(text: &str) -> String {
    format!(
        "Extract information from the resume below and return it as JSON matching this schema:\n\n\
         {schema}\n\nResume text:\n{text}",
        schema = schema_text::<Resume>(),
    )
}

pub fn tailor_prompt(job: &str, master: &Resume) -> String {
    let master = serde_json::to_string_pretty(master).unwrap_or_default();
    format!(
        "Master resume:\n{master}\n\nJob description:\n{job}\n\n\
         Return a JSON object with the same structure as the master resume, tailored for this job."
    )
}

/// Field extractor and resume assistant backed by [`ChatClient`].
#[derive(Debug, Clone)]
pub struct LlmExtractor {
    client: ChatClient,
}

impl LlmExtractor {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }

    fn clip<'a>(&self, content: &'a str) -> &'a str {
        truncate_chars(content, self.client.config().max_input_chars)
    }

    pub async fn extract_resume(&self, text: &str) -> Result<Resume, ExtractionError> {
        let answer = self
            .client
            .complete_json(RESUME_SYSTEM_PROMPT, &resume_prompt(self.clip(text)))
            .await?;
        parse_structured(&answer)
    }

    pub async fn tailor_resume(&self, job: &str, master: &Resume) -> Result<Resume, ExtractionError> {
        let answer = self
            .client
            .complete_json(TAILOR_SYSTEM_PROMPT, &tailor_prompt(self.clip(job), master))
            .await?;
        parse_structured(&answer)
    }
}

#[async_trait]
impl FieldExtractor for LlmExtractor {
    async fn extract_job(&self, content: &str) -> Result<ExtractedJobRecord, ExtractionError> {
        let answer = self
            .client
            .complete_json(JOB_SYSTEM_PROMPT, &job_prompt(self.clip(content)))
            .await?;
        parse_structured(&answer)
    }
}
