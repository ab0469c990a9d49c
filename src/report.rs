use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::response::{ErrorPayload, ParseResponse};

#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub generated_at: DateTime<Utc>,
    pub files: Vec<FileOutcome>,
}

#[derive(Debug, Serialize)]
pub struct FileOutcome {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    pub outcome: ParseResponse,
}

impl FileOutcome {
    pub fn new(path: &Path, outcome: ParseResponse) -> Result<Self> {
        Ok(Self {
            path: path.to_string_lossy().to_string(),
            sha256: Some(file_digest(path)?),
            outcome,
        })
    }

    /// Entry for a file that could not be decoded as a pipeline. The digest
    /// is omitted when the file itself is unreadable.
    pub fn load_failure(path: &Path, err: &anyhow::Error) -> Self {
        Self {
            path: path.to_string_lossy().to_string(),
            sha256: file_digest(path).ok(),
            outcome: ParseResponse::Error(
                ErrorPayload::message("Failed to load pipeline").with_detail(format!("{err:#}")),
            ),
        }
    }
}

pub fn file_digest(path: &Path) -> Result<String> {
    let content = std::fs::read(path)
        .with_context(|| format!("Failed to read file for digest: {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn write_report(path: &Path, files: Vec<FileOutcome>) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create report directory: {}", parent.display())
        })?;
    }

    let report = ValidationReport {
        generated_at: Utc::now(),
        files,
    };

    let file = File::create(path)
        .with_context(|| format!("Failed to create report: {}", path.display()))?;
    serde_yaml::to_writer(file, &report)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;

    Ok(())
}
