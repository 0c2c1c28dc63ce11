use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const TEMPERATURE: f64 = 0.2;
const MAX_OUTPUT_TOKENS: u32 = 8192;

/// Safety filtering is disabled for every category: review prompts are full
/// of source code that trips content filters, and a blocked reply would
/// silently drop findings.
const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Seam for the review model. The orchestrator only ever sees this trait.
pub trait ModelClient {
    /// Send one prompt, get the raw reply text back.
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Blocking client for the Gemini `generateContent` API.
pub struct GeminiClient {
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default, rename = "usageMetadata")]
    usage: Option<UsageMetadata>,
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
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(default, rename = "totalTokenCount")]
    total_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{API_BASE}/{}:generateContent?key={}",
            self.model, self.api_key
        )
    }
}

impl ModelClient for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        let safety: Vec<serde_json::Value> = SAFETY_CATEGORIES
            .iter()
            .map(|category| {
                serde_json::json!({"category": category, "threshold": "BLOCK_NONE"})
            })
            .collect();
        let body = serde_json::json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": TEMPERATURE,
                "maxOutputTokens": MAX_OUTPUT_TOKENS,
            },
            "safetySettings": safety,
        });

        debug!(model = %self.model, prompt_chars = prompt.len(), "calling review model");

        let response = match ureq::post(&self.endpoint())
            .set("Content-Type", "application/json")
            .send_json(body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Err(Error::ModelCall(format!(
                    "model API returned {code}: {}",
                    server_message(&body)
                )));
            }
            Err(e) => {
                return Err(Error::ModelCall(format!("model API request failed: {e}")));
            }
        };

        let parsed: GenerateResponse = response
            .into_json()
            .map_err(|e| Error::ModelCall(format!("invalid model API response: {e}")))?;

        if let Some(ref usage) = parsed.usage {
            debug!(total_tokens = usage.total_token_count, "model reply received");
        }

        Ok(first_candidate_text(parsed))
    }
}

/// Text of the first candidate's first part, or empty when the reply carries
/// no usable candidate. An empty reply is handled downstream by the lenient
/// output parser, not treated as a transport failure.
fn first_candidate_text(response: GenerateResponse) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().next())
        .map(|part| part.text)
        .unwrap_or_default()
}

/// Pull the structured `error.message` out of an API error body, falling back
/// to the (truncated) raw body.
fn server_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorResponse>(body) {
        return parsed.error.message;
    }
    let mut raw: String = body.chars().take(200).collect();
    if raw.is_empty() {
        raw = "no response body".to_string();
    }
    raw
}
