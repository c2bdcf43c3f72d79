//! Before/after narrative report.
//!
//! The generator walks the configured models in order, retrying each up to
//! `max_attempts` times, and never fails: when every attempt errors it returns
//! a fixed neutral payload.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::capture::types::FeatureRecord;
use crate::config::LLMConfig;
use crate::services::comparison::{self, MetricDelta};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub before: FeatureRecord,
    #[serde(default)]
    pub after: Option<FeatureRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonReport {
    /// 0..=100
    #[serde(alias = "neuroScore")]
    pub score: f64,
    #[serde(alias = "keyShift")]
    pub headline: String,
    #[serde(alias = "detailedAnalysis")]
    pub narrative: String,
    #[serde(default, alias = "visualCues")]
    pub observations: Vec<String>,
}

pub const NEUTRAL_SCORE: f64 = 50.0;

impl ComparisonReport {
    pub fn neutral(reason: &str) -> Self {
        Self {
            score: NEUTRAL_SCORE,
            headline: "Analysis temporarily limited".to_string(),
            narrative: format!(
                "The report service could not complete the analysis ({reason}). \
                 The biometric data is intact and shown alongside."
            ),
            observations: vec!["Compatibility mode".to_string()],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm is disabled")]
    Disabled,
    #[error("llm request timed out")]
    Timeout,
    #[error("llm network error: {0}")]
    Network(String),
    #[error("llm api error: status={status}, message={message}")]
    ApiError { status: u16, message: String },
    #[error("llm returned an empty reply")]
    EmptyReply,
    #[error("llm reply is not a valid report: {0}")]
    InvalidReply(String),
}

/// One text-generation backend. `model` selects among the backend's models.
pub trait ReportBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn generate<'a>(
        &'a self,
        model: &'a str,
        request: &'a ReportRequest,
    ) -> BoxFuture<'a, Result<String, LlmError>>;
}

/// Strips markdown fences, then takes the span from the first `{` to the last `}`.
pub fn extract_json(text: &str) -> Option<&str> {
    let mut body = text.trim();
    if let Some(start) = body.find("```") {
        let after_fence = &body[start + 3..];
        let after_lang = after_fence
            .strip_prefix("json")
            .or_else(|| after_fence.strip_prefix("JSON"))
            .unwrap_or(after_fence);
        body = match after_lang.find("```") {
            Some(end) => &after_lang[..end],
            None => after_lang,
        };
    }
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}

pub fn parse_report(text: &str) -> Result<ComparisonReport, LlmError> {
    let json = extract_json(text).ok_or_else(|| LlmError::InvalidReply("no JSON object".to_string()))?;
    let mut report: ComparisonReport =
        serde_json::from_str(json).map_err(|e| LlmError::InvalidReply(e.to_string()))?;
    if !report.score.is_finite() {
        return Err(LlmError::InvalidReply("score is not a number".to_string()));
    }
    report.score = report.score.clamp(0.0, 100.0);
    Ok(report)
}

#[derive(Clone)]
pub struct ReportGenerator {
    backend: Option<Arc<dyn ReportBackend>>,
    models: Vec<String>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl ReportGenerator {
    pub fn new(
        backend: Arc<dyn ReportBackend>,
        models: Vec<String>,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            backend: Some(backend),
            models,
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    /// Always answers with the neutral payload.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            models: Vec::new(),
            max_attempts: 1,
            retry_delay: Duration::ZERO,
        }
    }

    pub fn from_config(config: &LLMConfig) -> Self {
        if !config.enabled {
            tracing::info!("Report generation disabled, neutral reports only");
            return Self::disabled();
        }
        let backend: Arc<dyn ReportBackend> = if config.mock {
            Arc::new(MockBackend)
        } else {
            Arc::new(GeminiBackend::new(config))
        };
        tracing::info!(backend = backend.name(), models = ?config.models, "Report generator ready");
        Self::new(
            backend,
            config.models.clone(),
            config.max_attempts,
            Duration::from_millis(config.retry_delay_ms),
        )
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.as_ref().map_or("disabled", |b| b.name())
    }

    pub async fn generate(&self, request: &ReportRequest) -> ComparisonReport {
        let Some(backend) = &self.backend else {
            return ComparisonReport::neutral(&LlmError::Disabled.to_string());
        };

        let mut last_error = LlmError::EmptyReply;
        for model in &self.models {
            for attempt in 1..=self.max_attempts {
                let outcome = match backend.generate(model, request).await {
                    Ok(text) => parse_report(&text),
                    Err(e) => Err(e),
                };
                match outcome {
                    Ok(report) => {
                        tracing::info!(model = %model, attempt, score = report.score, "Report generated");
                        return report;
                    }
                    Err(e) => {
                        tracing::warn!(model = %model, attempt, error = %e, "Report attempt failed");
                        last_error = e;
                    }
                }
                if attempt < self.max_attempts {
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }

        tracing::error!(error = %last_error, "All report attempts failed, using neutral payload");
        ComparisonReport::neutral(&last_error.to_string())
    }
}

/// Gemini-style `generateContent` over HTTPS.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl GeminiBackend {
    pub fn new(config: &LLMConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn prompt(request: &ReportRequest) -> Result<String, LlmError> {
        let payload =
            serde_json::to_string_pretty(request).map_err(|e| LlmError::InvalidReply(e.to_string()))?;
        Ok(format!(
            "Compare the biometric captures below. Reply with one JSON object \
             {{\"score\": number 0-100, \"headline\": string, \"narrative\": string, \
             \"observations\": [string]}}.\n\n{payload}"
        ))
    }

    async fn call(&self, model: &str, request: &ReportRequest) -> Result<String, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::ApiError {
                status: 401,
                message: "missing api key".to_string(),
            });
        }
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": Self::prompt(request)? }] }],
            "generationConfig": { "responseMimeType": "application/json" },
        });
        let url = format!("{}/models/{}:generateContent", self.api_url, model);

        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let reply: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;
        let text = reply["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string);
        text.ok_or(LlmError::EmptyReply)
    }
}

impl ReportBackend for GeminiBackend {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn generate<'a>(
        &'a self,
        model: &'a str,
        request: &'a ReportRequest,
    ) -> BoxFuture<'a, Result<String, LlmError>> {
        Box::pin(self.call(model, request))
    }
}

/// Deterministic offline backend; scores from the metric deltas.
pub struct MockBackend;

impl MockBackend {
    fn render(request: &ReportRequest) -> String {
        let rows = comparison::compare(&request.before, request.after.as_ref());
        let improved: Vec<&MetricDelta> = rows.iter().filter(|r| r.improved == Some(true)).collect();
        let judged = rows.iter().filter(|r| r.improved.is_some()).count();

        let score = if judged == 0 {
            NEUTRAL_SCORE
        } else {
            (improved.len() as f64 / judged as f64 * 100.0).round()
        };
        let observations: Vec<String> = improved
            .iter()
            .map(|r| format!("{} {:+.1}", r.label, r.delta.unwrap_or_default()))
            .collect();

        serde_json::json!({
            "score": score,
            "headline": if request.after.is_some() { "Mock comparison" } else { "Mock baseline" },
            "narrative": format!("{} of {} tracked metrics improved.", improved.len(), judged),
            "observations": observations,
        })
        .to_string()
    }
}

impl ReportBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn generate<'a>(
        &'a self,
        _model: &'a str,
        request: &'a ReportRequest,
    ) -> BoxFuture<'a, Result<String, LlmError>> {
        let text = Self::render(request);
        Box::pin(async move { Ok(text) })
    }
}
