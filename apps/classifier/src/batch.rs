//! Bulk mode: submit a case's uncached prompts as one provider batch, poll it, and
//! pour the finished responses into the response cache. A later `classify` then
//! resolves every prompt from the cache without a live call.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{checked_component, CacheError, ResponseCache};
use crate::case::Case;
use crate::errors::AppError;
use crate::llm_client::batch::{BatchModel, BatchRequest, BatchStatus};
use crate::runner::{ClassificationRunner, ErrorCachePolicy};
use crate::session::CaseChatSession;

const BATCH_DIR: &str = "_batches";

/// One submission of a case's prompts to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub record_id: Uuid,
    pub case_id: String,
    pub provider_batch_id: String,
    pub prompts: Vec<String>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl BatchRecord {
    pub fn new(case_id: impl Into<String>, provider_batch_id: impl Into<String>, prompts: Vec<String>) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            case_id: case_id.into(),
            provider_batch_id: provider_batch_id.into(),
            prompts,
            submitted_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn has_ended(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// Batch records kept next to the response cache, one JSON file per case:
/// `<cache root>/_batches/<case_id>.json`.
#[derive(Debug, Clone)]
pub struct BatchRecordStore {
    root: PathBuf,
}

impl BatchRecordStore {
    pub fn new(cache: &ResponseCache) -> Self {
        Self {
            root: cache.root().join(BATCH_DIR),
        }
    }

    fn path(&self, case_id: &str) -> Result<PathBuf, CacheError> {
        Ok(self.root.join(format!("{}.json", checked_component(case_id)?)))
    }

    /// Records for a case in submission order. Empty when none were ever made.
    pub async fn load(&self, case_id: &str) -> Result<Vec<BatchRecord>, AppError> {
        let path = self.path(case_id)?;
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(CacheError::Io { path, source }.into()),
        };
        serde_json::from_str(&raw)
            .map_err(|e| AppError::Batch(format!("corrupt batch record {}: {e}", path.display())))
    }

    pub async fn save(&self, case_id: &str, records: &[BatchRecord]) -> Result<(), AppError> {
        let path = self.path(case_id)?;
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| CacheError::Io {
                path: self.root.clone(),
                source,
            })?;
        let body = serde_json::to_string_pretty(records)
            .map_err(|e| AppError::Batch(format!("cannot encode batch records: {e}")))?;
        fs::write(&path, body)
            .await
            .map_err(|source| CacheError::Io { path, source })?;
        Ok(())
    }

    pub async fn append(&self, record: BatchRecord) -> Result<(), AppError> {
        let mut records = self.load(&record.case_id).await?;
        let case_id = record.case_id.clone();
        records.push(record);
        self.save(&case_id, &records).await
    }
}

/// Drives bulk mode for the prompts, selection and error policy of a runner.
pub struct BatchRunner {
    runner: ClassificationRunner,
    cache: ResponseCache,
    store: BatchRecordStore,
    model: Arc<dyn BatchModel>,
}

impl BatchRunner {
    pub fn new(runner: ClassificationRunner, model: Arc<dyn BatchModel>) -> Result<Self, AppError> {
        let cache = runner
            .cache()
            .cloned()
            .ok_or_else(|| AppError::Config("batch mode needs a response cache".to_string()))?;
        let store = BatchRecordStore::new(&cache);
        Ok(Self {
            runner,
            cache,
            store,
            model,
        })
    }

    /// Submits every selected prompt that has no cache entry yet. Returns `None` when
    /// all of them are already cached.
    pub async fn submit_case(&self, path: &Path) -> Result<Option<BatchRecord>, AppError> {
        let case = Case::load(path).await?;
        let session = CaseChatSession::new(self.runner.prompts(), &case);

        let mut requests = Vec::new();
        for prompt in session.next_prompt().filter(|p| self.runner.is_selected(p)) {
            if self.cache.read(&case.id, &prompt.name).await?.is_some() {
                continue;
            }
            requests.push(BatchRequest {
                custom_id: prompt.name.clone(),
                messages: session.conversation(prompt),
            });
        }

        if requests.is_empty() {
            info!(case_id = %case.id, "All prompts cached, nothing to submit");
            return Ok(None);
        }

        let provider_batch_id = self
            .model
            .submit(&requests)
            .await
            .map_err(|e| AppError::Llm(e.to_string()))?;
        let prompts = requests.into_iter().map(|r| r.custom_id).collect();
        let record = BatchRecord::new(case.id.clone(), provider_batch_id, prompts);
        info!(
            case_id = %case.id,
            batch_id = %record.provider_batch_id,
            "Submitted {} prompts",
            record.prompts.len()
        );
        self.store.append(record.clone()).await?;
        Ok(Some(record))
    }

    /// Status of the most recent submission. Every submission not yet seen finished is
    /// asked about, and each one that has ended gets `ended_at` stamped, so an older batch
    /// stays retrievable while a newer one is in flight. `None` when the case was never
    /// submitted.
    pub async fn poll_case(&self, case_id: &str) -> Result<Option<BatchStatus>, AppError> {
        let mut records = self.store.load(case_id).await?;
        if records.is_empty() {
            return Ok(None);
        }
        let mut stamped = false;
        let mut latest = BatchStatus::Ended;
        for record in records.iter_mut() {
            let status = if record.has_ended() {
                BatchStatus::Ended
            } else {
                let status = self
                    .model
                    .status(&record.provider_batch_id)
                    .await
                    .map_err(|e| AppError::Llm(e.to_string()))?;
                info!(case_id, batch_id = %record.provider_batch_id, ?status, "Polled batch");
                if status == BatchStatus::Ended {
                    record.ended_at = Some(Utc::now());
                    stamped = true;
                }
                status
            };
            latest = status;
        }
        if stamped {
            self.store.save(case_id, &records).await?;
        }
        Ok(Some(latest))
    }

    /// Polls until the latest submission ends.
    pub async fn wait_case(&self, case_id: &str, interval: Duration) -> Result<(), AppError> {
        loop {
            match self.poll_case(case_id).await? {
                None => {
                    return Err(AppError::Batch(format!("no batch submitted for case {case_id}")))
                }
                Some(BatchStatus::Ended) => return Ok(()),
                Some(_) => tokio::time::sleep(interval).await,
            }
        }
    }

    /// Writes the responses of the most recent finished submission into the cache and
    /// returns how many entries were written.
    pub async fn retrieve_case(&self, case_id: &str) -> Result<usize, AppError> {
        let records = self.store.load(case_id).await?;
        let Some(record) = records.iter().rev().find(|r| r.has_ended()) else {
            return Err(AppError::Batch(format!(
                "no finished batch for case {case_id}; poll it first"
            )));
        };
        let items = self
            .model
            .results(&record.provider_batch_id)
            .await
            .map_err(|e| AppError::Llm(e.to_string()))?;

        let mut written = 0;
        for item in items {
            if self.runner.prompts().get(&item.custom_id).is_none() {
                warn!(case_id, custom_id = %item.custom_id, "Ignoring result for unknown prompt");
                continue;
            }
            match item.outcome {
                Ok(text) => {
                    self.cache.write(case_id, &item.custom_id, &text).await?;
                    written += 1;
                }
                Err(message) => {
                    warn!(case_id, prompt = %item.custom_id, "Batch request failed: {message}");
                    if self.runner.options().error_cache == ErrorCachePolicy::Store {
                        self.cache.write(case_id, &item.custom_id, &message).await?;
                        written += 1;
                    }
                }
            }
        }
        info!(case_id, batch_id = %record.provider_batch_id, "Retrieved {written} responses");
        Ok(written)
    }
}
