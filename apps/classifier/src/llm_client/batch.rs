//! Offline batch submission through the Anthropic Message Batches API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{check_status, ChatMessage, LlmClient, LlmError};

/// One request inside a batch. `custom_id` comes back unchanged with the result.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub custom_id: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    InProgress,
    Canceling,
    Ended,
}

/// A single result from a finished batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub custom_id: String,
    pub outcome: Result<String, String>,
}

#[async_trait]
pub trait BatchModel: Send + Sync {
    /// Submits the requests and returns the provider's batch id.
    async fn submit(&self, requests: &[BatchRequest]) -> Result<String, LlmError>;

    async fn status(&self, batch_id: &str) -> Result<BatchStatus, LlmError>;

    async fn results(&self, batch_id: &str) -> Result<Vec<BatchItem>, LlmError>;
}

#[derive(Debug, Serialize)]
struct CreateBatch<'a> {
    requests: Vec<BatchEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct BatchEntry<'a> {
    custom_id: &'a str,
    params: super::AnthropicRequest<'a>,
}

#[derive(Debug, Deserialize)]
struct BatchInfo {
    id: String,
    processing_status: BatchStatus,
    #[serde(default)]
    results_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultLine {
    custom_id: String,
    result: ResultBody,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResultBody {
    Succeeded { message: super::LlmResponse },
    Errored { error: serde_json::Value },
    Canceled,
    Expired,
}

impl LlmClient {
    async fn batch_info(&self, batch_id: &str) -> Result<BatchInfo, LlmError> {
        let url = self.endpoint(&format!("/v1/messages/batches/{batch_id}"));
        let response = check_status(self.authorized(self.client.get(&url)).send().await?).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl BatchModel for LlmClient {
    async fn submit(&self, requests: &[BatchRequest]) -> Result<String, LlmError> {
        let entries = requests
            .iter()
            .map(|r| {
                Ok(BatchEntry {
                    custom_id: &r.custom_id,
                    params: self.build_request(&r.messages)?,
                })
            })
            .collect::<Result<Vec<_>, LlmError>>()?;
        let url = self.endpoint("/v1/messages/batches");
        let response = self
            .authorized(self.client.post(&url))
            .json(&CreateBatch { requests: entries })
            .send()
            .await?;
        let info: BatchInfo = check_status(response).await?.json().await?;
        info!("Submitted batch {} with {} requests", info.id, requests.len());
        Ok(info.id)
    }

    async fn status(&self, batch_id: &str) -> Result<BatchStatus, LlmError> {
        Ok(self.batch_info(batch_id).await?.processing_status)
    }

    async fn results(&self, batch_id: &str) -> Result<Vec<BatchItem>, LlmError> {
        let info = self.batch_info(batch_id).await?;
        let Some(results_url) = info.results_url else {
            return Err(LlmError::Api {
                status: 409,
                message: format!("batch {batch_id} has no results yet"),
            });
        };
        let response = check_status(self.authorized(self.client.get(&results_url)).send().await?).await?;
        let body = response.text().await?;
        let items = parse_results(&body)?;
        debug!("Batch {} returned {} results", batch_id, items.len());
        Ok(items)
    }
}

/// Results arrive as JSON Lines, one object per request.
fn parse_results(body: &str) -> Result<Vec<BatchItem>, LlmError> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let parsed: ResultLine = serde_json::from_str(line)?;
            let outcome = match parsed.result {
                ResultBody::Succeeded { message } => message
                    .text()
                    .map(String::from)
                    .ok_or_else(|| "LLM returned empty content".to_string()),
                ResultBody::Errored { error } => Err(error_message(&error)),
                ResultBody::Canceled => Err("batch request was canceled".to_string()),
                ResultBody::Expired => Err("batch request expired".to_string()),
            };
            Ok(BatchItem {
                custom_id: parsed.custom_id,
                outcome,
            })
        })
        .collect()
}

fn error_message(error: &serde_json::Value) -> String {
    error
        .pointer("/error/message")
        .or_else(|| error.get("message"))
        .and_then(|m| m.as_str())
        .map(String::from)
        .unwrap_or_else(|| error.to_string())
}
