use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure of the blob store capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("transient storage failure: {0}")]
    Transient(String),
}

/// Failure of a remote service (vision, generation, rendering, mail).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("malformed service response: {0}")]
    Protocol(String),
}

/// Step of the per-image pipeline that can abort an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStage {
    Fetch,
    Detect,
    Generate,
}

impl fmt::Display for ItemStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemStage::Fetch => "fetch",
            ItemStage::Detect => "detect",
            ItemStage::Generate => "generate",
        };
        f.write_str(s)
    }
}

/// An image that was dropped from the batch output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{stage} failed for {key}: {message}")]
pub struct ItemFailure {
    pub key: String,
    pub stage: ItemStage,
    pub message: String,
}

impl ItemFailure {
    pub fn new(key: &str, stage: ItemStage, err: impl fmt::Display) -> Self {
        Self {
            key: key.to_string(),
            stage,
            message: err.to_string(),
        }
    }
}
