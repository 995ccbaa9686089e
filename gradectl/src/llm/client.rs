use crate::config::{ApiSettings, PromptSettings};
use crate::error::{Error, Result};
use crate::llm::prompt;
use reqwest::blocking::Client;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

/// Everything the model needs to grade one capture.
#[derive(Debug, Clone)]
pub struct GradingRequest<'a> {
    /// PNG-encoded screenshot
    pub image_png: Vec<u8>,
    pub reference_answer: Option<&'a str>,
    pub question_context: Option<&'a str>,
}

/// A backend that turns a grading request into reply text.
pub trait Inference {
    fn complete(&self, request: &GradingRequest) -> Result<String>;
}

/// Client for an OpenAI-compatible chat-completions endpoint (vLLM, DashScope, OpenAI).
pub struct InferenceClient {
    client: Client,
    api: ApiSettings,
    prompts: PromptSettings,
}

impl InferenceClient {
    pub fn new(api: ApiSettings, prompts: PromptSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api,
            prompts,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api.base_url.trim_end_matches('/'))
    }
}

impl Inference for InferenceClient {
    /// Send one request. No retries happen here.
    fn complete(&self, request: &GradingRequest) -> Result<String> {
        let endpoint = self.endpoint();
        let body = prompt::request_body(&self.api, &self.prompts, request);

        let mut http = self.client.post(&endpoint).json(&body);
        if let Some(key) = self.api.api_key.as_deref() {
            http = http.bearer_auth(key);
        }

        let started = Instant::now();
        let response = http.send()?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text()?;
        let json: Value = serde_json::from_str(&text)
            .map_err(|e| Error::InvalidResponse(format!("Response is not JSON: {}", e)))?;
        debug!(
            endpoint = %endpoint,
            model = %self.api.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Inference reply received"
        );

        prompt::extract_reply(&json).ok_or_else(|| {
            Error::InvalidResponse("No choices[0].message.content in response".to_string())
        })
    }
}
