use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::ports::{LlmClient, LlmClientError};

pub const REPLICATE_API_BASE: &str = "https://api.replicate.com/v1";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Runs completions as Replicate predictions.
///
/// The prediction is created with `Prefer: wait`, so short generations come
/// back finished. Anything still running is polled through its `urls.get`
/// link until it reaches a terminal status or the timeout elapses.
pub struct ReplicateClient {
    client: Client,
    base_url: String,
    api_token: String,
    model: String,
    version: Option<String>,
    max_new_tokens: usize,
    temperature: f32,
    system_prompt: Option<String>,
    poll_interval: Duration,
    timeout: Duration,
}

#[derive(Serialize)]
struct PredictionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    input: PredictionInput<'a>,
}

#[derive(Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_prompt: Option<&'a str>,
    max_new_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    id: Option<String>,
    status: PredictionStatus,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    Aborted,
    #[serde(other)]
    Unknown,
}

impl PredictionStatus {
    fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Canceled | Self::Aborted
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Aborted => "aborted",
            Self::Unknown => "unknown",
        }
    }
}

impl ReplicateClient {
    pub fn new(api_token: String, model: String, version: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: REPLICATE_API_BASE.to_string(),
            api_token,
            model,
            version: version.filter(|v| !v.is_empty()),
            max_new_tokens: 512,
            temperature: 0.75,
            system_prompt: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_generation(mut self, max_new_tokens: usize, temperature: f32) -> Self {
        self.max_new_tokens = max_new_tokens;
        self.temperature = temperature;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt.filter(|p| !p.is_empty());
        self
    }

    pub fn with_polling(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.timeout = timeout;
        self
    }

    /// Pinned versions go through `/predictions`; bare model names use the
    /// model's own endpoint, which runs its latest version.
    fn create_url(&self) -> String {
        match self.version {
            Some(_) => format!("{}/predictions", self.base_url),
            None => format!("{}/models/{}/predictions", self.base_url, self.model),
        }
    }

    async fn create_prediction(&self, prompt: &str) -> Result<Prediction, LlmClientError> {
        let body = PredictionRequest {
            version: self.version.as_deref(),
            input: PredictionInput {
                prompt,
                system_prompt: self.system_prompt.as_deref(),
                max_new_tokens: self.max_new_tokens,
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(self.create_url())
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmClientError::ApiRequestFailed(e.to_string()))?;

        Self::decode(response).await
    }

    async fn fetch_prediction(&self, url: &str) -> Result<Prediction, LlmClientError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| LlmClientError::ApiRequestFailed(e.to_string()))?;

        Self::decode(response).await
    }

    async fn decode(response: reqwest::Response) -> Result<Prediction, LlmClientError> {
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmClientError::RateLimited);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmClientError::ApiRequestFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| LlmClientError::InvalidResponse(e.to_string()))
    }
}

/// Language models on Replicate stream tokens, so `output` is usually an
/// array of string fragments.
fn collect_output(output: Option<Value>) -> Result<String, LlmClientError> {
    match output {
        Some(Value::String(text)) => Ok(text),
        Some(Value::Array(parts)) => parts
            .into_iter()
            .map(|part| match part {
                Value::String(s) => Ok(s),
                other => Err(LlmClientError::InvalidResponse(format!(
                    "unexpected output fragment: {other}"
                ))),
            })
            .collect(),
        Some(other) => Err(LlmClientError::InvalidResponse(format!(
            "unexpected output: {other}"
        ))),
        None => Err(LlmClientError::InvalidResponse(
            "prediction succeeded without output".to_string(),
        )),
    }
}

fn error_message(error: Option<Value>) -> String {
    match error {
        Some(Value::String(message)) => message,
        Some(Value::Null) | None => "no error detail".to_string(),
        Some(other) => other.to_string(),
    }
}

impl ReplicateClient {
    async fn run_prediction(&self, prompt: &str) -> Result<String, LlmClientError> {
        let mut prediction = self.create_prediction(prompt).await?;

        while !prediction.status.is_terminal() {
            let Some(urls) = prediction.urls.as_ref() else {
                return Err(LlmClientError::InvalidResponse(
                    "running prediction has no polling url".to_string(),
                ));
            };

            tracing::debug!(
                prediction_id = prediction.id.as_deref().unwrap_or_default(),
                status = prediction.status.as_str(),
                "Waiting for prediction"
            );
            tokio::time::sleep(self.poll_interval).await;

            let url = urls.get.clone();
            prediction = self.fetch_prediction(&url).await?;
        }

        tracing::debug!(
            prediction_id = prediction.id.as_deref().unwrap_or_default(),
            status = prediction.status.as_str(),
            "Prediction finished"
        );

        match prediction.status {
            PredictionStatus::Succeeded => collect_output(prediction.output),
            status => Err(LlmClientError::PredictionFailed {
                status: status.as_str().to_string(),
                message: error_message(prediction.error),
            }),
        }
    }
}

#[async_trait]
impl LlmClient for ReplicateClient {
    /// The timeout covers the `Prefer: wait` create call as well as polling.
    #[tracing::instrument(skip(self, prompt), fields(model = %self.model))]
    async fn complete(&self, prompt: &str) -> Result<String, LlmClientError> {
        tokio::time::timeout(self.timeout, self.run_prediction(prompt))
            .await
            .map_err(|_| {
                tracing::warn!(timeout = ?self.timeout, "Prediction timed out");
                LlmClientError::Timeout(self.timeout)
            })?
    }
}
