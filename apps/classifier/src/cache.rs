//! Response cache: raw LLM output stored per (case id, prompt name).
//!
//! Layout is one directory per case, one plain-text file per prompt:
//! `<root>/<case_id>/<prompt_name>`. Only raw responses are stored, never parsed
//! results, so every entry stays re-parseable when prompt parsing changes.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid cache key component '{0}'")]
    InvalidKey(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Filesystem-backed response cache.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    root: PathBuf,
}

impl ResponseCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stores `text` under (case_id, prompt_name), creating the case directory if needed.
    /// A second write to the same key replaces the first.
    pub async fn write(&self, case_id: &str, prompt_name: &str, text: &str) -> Result<(), CacheError> {
        let dir = self.case_dir(case_id)?;
        fs::create_dir_all(&dir).await.map_err(|source| CacheError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = dir.join(checked_component(prompt_name)?);
        fs::write(&path, text)
            .await
            .map_err(|source| CacheError::Io { path: path.clone(), source })?;
        debug!(case_id, prompt = prompt_name, bytes = text.len(), "cached response");
        Ok(())
    }

    /// Returns the cached text, or `None` if nothing was stored for this key.
    pub async fn read(&self, case_id: &str, prompt_name: &str) -> Result<Option<String>, CacheError> {
        let path = self.case_dir(case_id)?.join(checked_component(prompt_name)?);
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }

    /// Whether any response at all has been cached for this case.
    pub async fn exists(&self, case_id: &str) -> Result<bool, CacheError> {
        let dir = self.case_dir(case_id)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(source) => return Err(CacheError::Io { path: dir, source }),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| CacheError::Io { path: dir.clone(), source })?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_file {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn case_dir(&self, case_id: &str) -> Result<PathBuf, CacheError> {
        Ok(self.root.join(checked_component(case_id)?))
    }
}

/// Keys become path components, so anything that could escape the cache root is refused.
pub(crate) fn checked_component(key: &str) -> Result<&str, CacheError> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0']);
    if bad {
        Err(CacheError::InvalidKey(key.to_string()))
    } else {
        Ok(key)
    }
}
