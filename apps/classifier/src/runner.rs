//! Classification Runner: runs every selected prompt for one case.
//!
//! Flow per case: load case → build session (judgment bound) → for each prompt in
//! declared order: cache lookup → (mock | LLM call + rate-limit pause) → cache write →
//! parse. A failing prompt degrades to an error-shaped result for its own column group;
//! only case-load, configuration and cache storage errors leave this module.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cache::ResponseCache;
use crate::case::Case;
use crate::errors::AppError;
use crate::llm_client::ChatModel;
use crate::prompt::{PromptResult, PromptSet, PromptSpec, Record};
use crate::session::CaseChatSession;

/// What to do with the error text when a live LLM call fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorCachePolicy {
    /// Leave the cache untouched; the prompt is retried on the next run.
    #[default]
    Skip,
    /// Store the error text as the response; later runs reuse it until the cache is bypassed.
    Store,
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Use `mock_response()` instead of calling the LLM. Never writes the cache.
    pub dry_run: bool,
    /// Skip cache reads. Fresh responses still overwrite the cached ones.
    pub bypass_cache: bool,
    /// Pause after every live call.
    pub rate_limit: Duration,
    pub error_cache: ErrorCachePolicy,
    /// Prompt names to run. Empty means all.
    pub only: Vec<String>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            bypass_cache: false,
            rate_limit: Duration::from_secs(60),
            error_cache: ErrorCachePolicy::Skip,
            only: Vec::new(),
        }
    }
}

/// Where a prompt's raw response came from. Reported as progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Llm,
    Mock,
    Failed,
}

impl ResponseSource {
    fn as_str(self) -> &'static str {
        match self {
            ResponseSource::Cache => "cache",
            ResponseSource::Llm => "llm",
            ResponseSource::Mock => "mock",
            ResponseSource::Failed => "failed",
        }
    }
}

/// Results for one case, keyed by prompt name in the order the prompts ran.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub file: String,
    pub mnc: String,
    results: Vec<(String, PromptResult)>,
}

impl ClassificationResult {
    pub fn new(file: impl Into<String>, mnc: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            mnc: mnc.into(),
            results: Vec::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, result: PromptResult) {
        let name = name.into();
        match self.results.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = result,
            None => self.results.push((name, result)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PromptResult> {
        self.results
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r)
    }
}

impl Serialize for ClassificationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.results.len() + 2))?;
        map.serialize_entry("file", &self.file)?;
        map.serialize_entry("mnc", &self.mnc)?;
        for (name, result) in &self.results {
            map.serialize_entry(name, result)?;
        }
        map.end()
    }
}

pub struct ClassificationRunner {
    prompts: PromptSet,
    model: Option<Arc<dyn ChatModel>>,
    cache: Option<ResponseCache>,
    options: RunnerOptions,
}

impl ClassificationRunner {
    /// A live runner needs a model; a dry run does not. Unknown prompt names in
    /// `options.only` are rejected here, before any case is touched.
    pub fn new(
        prompts: PromptSet,
        model: Option<Arc<dyn ChatModel>>,
        cache: Option<ResponseCache>,
        options: RunnerOptions,
    ) -> Result<Self, AppError> {
        if !options.dry_run && model.is_none() {
            return Err(AppError::Config(
                "a live run needs an LLM client".to_string(),
            ));
        }
        if let Some(unknown) = options.only.iter().find(|n| prompts.get(n).is_none()) {
            return Err(AppError::Config(format!("unknown prompt '{unknown}'")));
        }
        Ok(Self {
            prompts,
            model,
            cache,
            options,
        })
    }

    pub fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    pub(crate) fn is_selected(&self, prompt: &PromptSpec) -> bool {
        self.options.only.is_empty() || self.options.only.iter().any(|n| *n == prompt.name)
    }

    /// Column headers for `as_columns`: `file`, `mnc`, then every prompt's headers.
    pub fn headers(&self) -> Vec<String> {
        let mut headers = vec!["file".to_string(), "mnc".to_string()];
        for prompt in self.prompts.iter() {
            headers.extend(prompt.headers());
        }
        headers
    }

    /// Classifies one case file. Fails only if the case cannot be loaded or the cache
    /// storage fails.
    pub async fn classify(&self, path: &Path) -> Result<ClassificationResult, AppError> {
        let case = Case::load(path).await?;
        let session = CaseChatSession::new(&self.prompts, &case);
        info!(case_id = %case.id, mnc = %case.mnc, "Classifying case");

        if !self.options.dry_run {
            // The provider is stateless: the system preamble is the leading message of
            // every live call rather than a call of its own.
            debug!(
                case_id = %case.id,
                "Case introduction {} chars, system prompt {} chars sent with each prompt",
                session.intro().len(),
                session.start_chat().content.len()
            );
        }

        let mut result =
            ClassificationResult::new(case.path.display().to_string(), case.mnc.clone());
        for prompt in session.next_prompt().filter(|p| self.is_selected(p)) {
            let prompt_result = self.run_prompt(&case.id, &session, prompt).await?;
            result.insert(prompt.name.clone(), prompt_result);
        }
        Ok(result)
    }

    /// Classifies every file in turn, handing each result to `on_result` as soon as its
    /// case finishes. A case that cannot be loaded is logged and skipped; any other error,
    /// including one returned by `on_result`, aborts the run. Returns the number of cases
    /// classified.
    pub async fn classify_all<F>(
        &self,
        paths: &[PathBuf],
        mut on_result: F,
    ) -> Result<usize, AppError>
    where
        F: FnMut(ClassificationResult) -> anyhow::Result<()>,
    {
        let mut classified = 0;
        for path in paths {
            match self.classify(path).await {
                Ok(result) => {
                    on_result(result)?;
                    classified += 1;
                }
                Err(e) if e.is_case_local() => warn!("Skipping case: {e}"),
                Err(e) => return Err(e),
            }
        }
        Ok(classified)
    }

    async fn run_prompt(
        &self,
        case_id: &str,
        session: &CaseChatSession<'_>,
        prompt: &PromptSpec,
    ) -> Result<PromptResult, AppError> {
        if !self.options.bypass_cache {
            if let Some(cache) = &self.cache {
                if let Some(cached) = cache.read(case_id, &prompt.name).await? {
                    report(case_id, prompt, ResponseSource::Cache);
                    return Ok(prompt.parse(&cached));
                }
            }
        }

        let conversation = session.conversation(prompt);

        if self.options.dry_run {
            report(case_id, prompt, ResponseSource::Mock);
            return Ok(prompt.parse(&prompt.mock_response()));
        }

        let Some(model) = &self.model else {
            return Err(AppError::Config("a live run needs an LLM client".to_string()));
        };

        report(case_id, prompt, ResponseSource::Llm);
        match model.complete(&conversation).await {
            Ok(response) => {
                if let Some(cache) = &self.cache {
                    cache.write(case_id, &prompt.name, &response).await?;
                }
                if !self.options.rate_limit.is_zero() {
                    info!(case_id, "Pausing for {:?}", self.options.rate_limit);
                    tokio::time::sleep(self.options.rate_limit).await;
                }
                Ok(prompt.parse(&response))
            }
            Err(e) => {
                let message = e.to_string();
                report(case_id, prompt, ResponseSource::Failed);
                error!(case_id, prompt = %prompt.name, "LLM call failed: {message}");
                if self.options.error_cache == ErrorCachePolicy::Store {
                    if let Some(cache) = &self.cache {
                        cache.write(case_id, &prompt.name, &message).await?;
                    }
                }
                Ok(prompt.wrap_error(&message))
            }
        }
    }

    /// Fixed-width row aligned with `headers()`.
    pub fn as_columns(&self, result: &ClassificationResult) -> Vec<Value> {
        let mut columns = vec![
            Value::String(result.file.clone()),
            Value::String(result.mnc.clone()),
        ];
        for prompt in self.prompts.iter() {
            columns.extend(prompt.collimate(result.get(&prompt.name)));
        }
        columns
    }

    /// Flat composite-key view. Prompts that did not run contribute no keys.
    pub fn as_dict(&self, result: &ClassificationResult) -> Record {
        let mut flat = Record::new();
        flat.insert("file".to_string(), Value::String(result.file.clone()));
        flat.insert("mnc".to_string(), Value::String(result.mnc.clone()));
        for prompt in self.prompts.iter() {
            if let Some(r) = result.get(&prompt.name) {
                flat.extend(prompt.flatten(r));
            }
        }
        flat
    }
}

fn report(case_id: &str, prompt: &PromptSpec, source: ResponseSource) {
    info!(case_id, prompt = %prompt.name, source = source.as_str(), "[{case_id}] {}", prompt.name);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::llm_client::{ChatMessage, LlmError, Role};
    use crate::prompt::{FieldSpec, ReturnShape};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    /// Returns canned replies by prompt-name marker and records every conversation.
    #[derive(Default)]
    pub(crate) struct FakeModel {
        pub replies: Vec<(String, Result<String, String>)>,
        pub calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl FakeModel {
        pub fn replying(replies: &[(&str, Result<&str, &str>)]) -> Self {
            Self {
                replies: replies
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.map(String::from).map_err(String::from)))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatModel for FakeModel {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
            self.calls.lock().unwrap().push(messages.to_vec());
            let user = messages
                .iter()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.as_str())
                .unwrap_or_default();
            for (marker, reply) in &self.replies {
                if user.contains(marker.as_str()) {
                    return reply.clone().map_err(|message| LlmError::Api {
                        status: 529,
                        message,
                    });
                }
            }
            Err(LlmError::EmptyContent)
        }
    }

    pub(crate) fn prompt_set() -> PromptSet {
        PromptSet::new(
            "You are a legal research assistant.",
            "Judgment:\n{judgment}",
            vec![
                PromptSpec::new("summary", "SUMMARY: summarise the case.", ReturnShape::Text, vec![]),
                PromptSpec::new(
                    "dates",
                    "DATES: answer about dates.",
                    ReturnShape::Object,
                    vec![
                        FieldSpec::new("filing_date", "When filed?", "2010-06-05"),
                        FieldSpec::new("hearing_date", "When heard?", "2011-02-01"),
                    ],
                ),
                PromptSpec::new(
                    "parties",
                    "PARTIES: list the parties.",
                    ReturnShape::Array { repeats: 2 },
                    vec![
                        FieldSpec::new("name", "Name?", "John Smith"),
                        FieldSpec::new("role", "Role?", "Plaintiff"),
                    ],
                ),
            ],
        )
        .unwrap()
    }

    pub(crate) fn write_case(dir: &TempDir, stem: &str, mnc: &str) -> PathBuf {
        let path = dir.path().join(format!("{stem}.json"));
        std::fs::write(
            &path,
            json!({"mnc": mnc, "judgment": "1 The plaintiff seeks provision."}).to_string(),
        )
        .unwrap();
        path
    }

    fn live(model: Arc<FakeModel>, cache: Option<ResponseCache>, options: RunnerOptions) -> ClassificationRunner {
        ClassificationRunner::new(prompt_set(), Some(model), cache, options).unwrap()
    }

    fn no_pause() -> RunnerOptions {
        RunnerOptions {
            rate_limit: Duration::ZERO,
            ..RunnerOptions::default()
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_llm() {
        let dir = tempdir().unwrap();
        let case = write_case(&dir, "case1", "M-1");
        let cache = ResponseCache::new(dir.path().join("cache"));
        cache.write("case1", "summary", "ok").await.unwrap();

        let model = Arc::new(FakeModel::default());
        let options = RunnerOptions {
            only: vec!["summary".to_string()],
            ..no_pause()
        };
        let runner = live(model.clone(), Some(cache), options);
        let result = runner.classify(&case).await.unwrap();

        assert_eq!(model.call_count(), 0);
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"file": case.display().to_string(), "mnc": "M-1", "summary": "ok"})
        );
    }

    #[tokio::test]
    async fn test_dry_run_uses_mock_and_never_writes_cache() {
        let dir = tempdir().unwrap();
        let case = write_case(&dir, "case1", "M-1");
        let cache = ResponseCache::new(dir.path().join("cache"));
        let options = RunnerOptions {
            dry_run: true,
            ..no_pause()
        };
        let runner =
            ClassificationRunner::new(prompt_set(), None, Some(cache.clone()), options).unwrap();
        let result = runner.classify(&case).await.unwrap();

        let summary = runner.prompts().get("summary").unwrap();
        assert_eq!(
            result.get("summary"),
            Some(&summary.parse(&summary.mock_response()))
        );
        let PromptResult::Array(parties) = result.get("parties").unwrap() else {
            panic!("expected array result");
        };
        assert_eq!(parties.len(), 2);
        assert!(!cache.exists("case1").await.unwrap());
    }

    #[tokio::test]
    async fn test_dry_run_still_reads_cache() {
        let dir = tempdir().unwrap();
        let case = write_case(&dir, "case1", "M-1");
        let cache = ResponseCache::new(dir.path().join("cache"));
        cache.write("case1", "summary", "from cache").await.unwrap();
        let options = RunnerOptions {
            dry_run: true,
            ..no_pause()
        };
        let runner = ClassificationRunner::new(prompt_set(), None, Some(cache), options).unwrap();
        let result = runner.classify(&case).await.unwrap();
        assert_eq!(
            result.get("summary"),
            Some(&PromptResult::Text("from cache".to_string()))
        );
    }

    #[tokio::test]
    async fn test_live_miss_calls_llm_with_system_and_caches_raw_response() {
        let dir = tempdir().unwrap();
        let case = write_case(&dir, "case1", "M-1");
        let cache = ResponseCache::new(dir.path().join("cache"));
        let model = Arc::new(FakeModel::replying(&[
            ("SUMMARY", Ok("A family provision claim.")),
            ("DATES", Ok("```json\n{\"filing_date\": \"2010-06-05\"}\n```")),
            ("PARTIES", Ok("[{\"name\": \"Jane Doe\", \"role\": \"Defendant\"}]")),
        ]));
        let runner = live(model.clone(), Some(cache.clone()), no_pause());
        let result = runner.classify(&case).await.unwrap();

        assert_eq!(model.call_count(), 3);
        let calls = model.calls.lock().unwrap();
        assert_eq!(calls[0][0].role, Role::System);
        assert_eq!(calls[0][0].content, "You are a legal research assistant.");
        assert!(calls[0][1].content.contains("1 The plaintiff seeks provision."));
        drop(calls);

        assert_eq!(
            cache.read("case1", "dates").await.unwrap().as_deref(),
            Some("```json\n{\"filing_date\": \"2010-06-05\"}\n```")
        );
        let flat = runner.as_dict(&result);
        assert_eq!(flat["summary"], json!("A family provision claim."));
        assert_eq!(flat["dates:filing_date"], json!("2010-06-05"));
        assert_eq!(flat["dates:hearing_date"], json!(""));
        assert_eq!(flat["parties:1:name"], json!("Jane Doe"));
        assert!(!flat.contains_key("parties:2:name"));
    }

    #[tokio::test]
    async fn test_failed_prompt_does_not_abort_case() {
        let dir = tempdir().unwrap();
        let case = write_case(&dir, "case1", "M-1");
        let model = Arc::new(FakeModel::replying(&[
            ("SUMMARY", Ok("fine")),
            ("DATES", Err("Overloaded")),
            ("PARTIES", Ok("not json at all")),
        ]));
        let runner = live(model, None, no_pause());
        let result = runner.classify(&case).await.unwrap();

        assert_eq!(result.get("summary"), Some(&PromptResult::Text("fine".to_string())));
        let columns = runner.as_columns(&result);
        assert_eq!(columns.len(), runner.headers().len());
        // file, mnc, summary, dates:filing_date, dates:hearing_date, parties...
        assert!(columns[3].as_str().unwrap().contains("Overloaded"));
        assert_eq!(columns[4], json!(""));
        assert!(columns[5].as_str().unwrap().contains("could not parse"));
    }

    #[tokio::test]
    async fn test_skip_policy_retries_failed_prompt_next_run() {
        let dir = tempdir().unwrap();
        let case = write_case(&dir, "case1", "M-1");
        let cache = ResponseCache::new(dir.path().join("cache"));
        let model = Arc::new(FakeModel::replying(&[("SUMMARY", Err("quota exceeded"))]));
        let options = RunnerOptions {
            only: vec!["summary".to_string()],
            error_cache: ErrorCachePolicy::Skip,
            ..no_pause()
        };
        let runner = live(model.clone(), Some(cache.clone()), options);
        runner.classify(&case).await.unwrap();
        assert!(cache.read("case1", "summary").await.unwrap().is_none());
        runner.classify(&case).await.unwrap();
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_store_policy_caches_error_text() {
        let dir = tempdir().unwrap();
        let case = write_case(&dir, "case1", "M-1");
        let cache = ResponseCache::new(dir.path().join("cache"));
        let model = Arc::new(FakeModel::replying(&[("SUMMARY", Err("quota exceeded"))]));
        let options = RunnerOptions {
            only: vec!["summary".to_string()],
            error_cache: ErrorCachePolicy::Store,
            ..no_pause()
        };
        let runner = live(model.clone(), Some(cache.clone()), options);
        let first = runner.classify(&case).await.unwrap();
        let second = runner.classify(&case).await.unwrap();

        assert_eq!(model.call_count(), 1);
        assert!(cache
            .read("case1", "summary")
            .await
            .unwrap()
            .unwrap()
            .contains("quota exceeded"));
        assert_eq!(first.get("summary"), second.get("summary"));
    }

    #[tokio::test]
    async fn test_stored_provider_error_stays_error_shaped_on_rerun() {
        let dir = tempdir().unwrap();
        let case = write_case(&dir, "case1", "M-1");
        let cache = ResponseCache::new(dir.path().join("cache"));
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let model = Arc::new(FakeModel::replying(&[("DATES", Err(body))]));
        let options = RunnerOptions {
            only: vec!["dates".to_string()],
            error_cache: ErrorCachePolicy::Store,
            ..no_pause()
        };
        let runner = live(model.clone(), Some(cache), options);

        let first = runner.as_columns(&runner.classify(&case).await.unwrap());
        let second = runner.as_columns(&runner.classify(&case).await.unwrap());

        assert_eq!(model.call_count(), 1);
        // file, mnc, summary, dates:filing_date, dates:hearing_date, ...
        for columns in [&first, &second] {
            assert!(columns[3].as_str().unwrap().contains("API error (status 529)"));
            assert_eq!(columns[4], json!(""));
        }
    }

    #[tokio::test]
    async fn test_bypass_cache_forces_call_and_refreshes_entry() {
        let dir = tempdir().unwrap();
        let case = write_case(&dir, "case1", "M-1");
        let cache = ResponseCache::new(dir.path().join("cache"));
        cache.write("case1", "summary", "stale").await.unwrap();
        let model = Arc::new(FakeModel::replying(&[("SUMMARY", Ok("fresh"))]));
        let options = RunnerOptions {
            only: vec!["summary".to_string()],
            bypass_cache: true,
            ..no_pause()
        };
        let runner = live(model.clone(), Some(cache.clone()), options);
        let result = runner.classify(&case).await.unwrap();

        assert_eq!(model.call_count(), 1);
        assert_eq!(result.get("summary"), Some(&PromptResult::Text("fresh".to_string())));
        assert_eq!(cache.read("case1", "summary").await.unwrap().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_unselected_prompts_keep_row_width() {
        let dir = tempdir().unwrap();
        let case = write_case(&dir, "case1", "M-1");
        let options = RunnerOptions {
            dry_run: true,
            only: vec!["dates".to_string()],
            ..no_pause()
        };
        let runner = ClassificationRunner::new(prompt_set(), None, None, options).unwrap();
        let result = runner.classify(&case).await.unwrap();

        assert!(result.get("summary").is_none());
        assert!(result.get("parties").is_none());
        let columns = runner.as_columns(&result);
        assert_eq!(columns.len(), runner.headers().len());
        assert_eq!(columns[2], json!(""));
        assert_eq!(columns[3], json!("2010-06-05"));
        let flat = runner.as_dict(&result);
        assert!(!flat.contains_key("summary"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_pauses_after_every_live_call() {
        let dir = tempdir().unwrap();
        let case = write_case(&dir, "case1", "M-1");
        let model = Arc::new(FakeModel::replying(&[
            ("SUMMARY", Ok("a")),
            ("DATES", Ok("{}")),
            ("PARTIES", Ok("[]")),
        ]));
        let options = RunnerOptions {
            rate_limit: Duration::from_secs(60),
            ..RunnerOptions::default()
        };
        let runner = live(model, None, options);
        let started = tokio::time::Instant::now();
        runner.classify(&case).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(180));
    }

    #[tokio::test]
    async fn test_classify_all_skips_unloadable_cases() {
        let dir = tempdir().unwrap();
        let good = write_case(&dir, "good", "M-1");
        let missing = dir.path().join("missing.json");
        let options = RunnerOptions {
            dry_run: true,
            ..no_pause()
        };
        let runner = ClassificationRunner::new(prompt_set(), None, None, options).unwrap();
        let mut results = Vec::new();
        let classified = runner
            .classify_all(&[missing, good], |r| {
                results.push(r);
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(classified, 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].mnc, "M-1");
    }

    #[tokio::test]
    async fn test_classify_all_hands_over_each_case_as_it_finishes() {
        let dir = tempdir().unwrap();
        let first = write_case(&dir, "first", "M-1");
        let second = write_case(&dir, "second", "M-2");
        let options = RunnerOptions {
            dry_run: true,
            ..no_pause()
        };
        let runner = ClassificationRunner::new(prompt_set(), None, None, options).unwrap();
        let mut written = Vec::new();
        let err = runner
            .classify_all(&[first, second], |r| {
                if r.mnc == "M-2" {
                    anyhow::bail!("disk full");
                }
                written.push(r.mnc);
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(written, vec!["M-1"]);
    }

    #[tokio::test]
    async fn test_single_case_load_error_propagates() {
        let dir = tempdir().unwrap();
        let options = RunnerOptions {
            dry_run: true,
            ..no_pause()
        };
        let runner = ClassificationRunner::new(prompt_set(), None, None, options).unwrap();
        let err = runner.classify(&dir.path().join("missing.json")).await.unwrap_err();
        assert!(err.is_case_local());
    }

    #[test]
    fn test_live_runner_requires_model() {
        let result = ClassificationRunner::new(prompt_set(), None, None, no_pause());
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_unknown_selection_rejected() {
        let options = RunnerOptions {
            dry_run: true,
            only: vec!["nonexistent".to_string()],
            ..no_pause()
        };
        let result = ClassificationRunner::new(prompt_set(), None, None, options);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_headers_lead_with_file_and_mnc() {
        let runner = ClassificationRunner::new(
            prompt_set(),
            None,
            None,
            RunnerOptions {
                dry_run: true,
                ..no_pause()
            },
        )
        .unwrap();
        assert_eq!(
            runner.headers(),
            vec![
                "file",
                "mnc",
                "summary",
                "dates:filing_date",
                "dates:hearing_date",
                "parties:1:name",
                "parties:1:role",
                "parties:2:name",
                "parties:2:role",
            ]
        );
    }
}
