use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::AppError;

/// One judgment to classify, as read from a case file.
///
/// The case file is a JSON document with at least an `mnc` (matter identifier) and a
/// `judgment` body. The whole document is kept as the judgment payload; the core never
/// looks inside it beyond `mnc`.
#[derive(Debug, Clone)]
pub struct Case {
    pub id: String,
    pub path: PathBuf,
    pub mnc: String,
    pub judgment: Value,
}

impl Case {
    pub async fn load(path: &Path) -> Result<Self, AppError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::case_load(path, e))?;
        Self::from_json(path, &raw)
    }

    pub fn from_json(path: &Path, raw: &str) -> Result<Self, AppError> {
        let id = case_id(path).ok_or_else(|| AppError::case_load(path, "no file stem"))?;
        let judgment: Value =
            serde_json::from_str(raw).map_err(|e| AppError::case_load(path, e))?;
        let mnc = judgment
            .get("mnc")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::case_load(path, "missing matter identifier 'mnc'"))?
            .to_string();
        Ok(Self {
            id,
            path: path.to_path_buf(),
            mnc,
            judgment,
        })
    }
}

/// Stable case id: the file name without its extension.
pub fn case_id(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
}
