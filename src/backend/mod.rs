pub mod local;
pub mod script;
pub mod types;

use crate::{
    classify::DamageLabel,
    error::{ServiceError, StorageError},
};

pub use types::{Attachment, BridgeDiag, ImageId, ImageRef, Notification, ReportDocument};

/// Blob store: buckets of byte objects addressed by `/`-separated keys.
pub trait Storage: Send + Sync {
    fn list_keys(&self, bucket: &str) -> Result<Vec<String>, StorageError>;
    fn get_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;
    fn put_bytes(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError>;
}

/// Vision label detection.
pub trait LabelDetector: Send + Sync {
    fn detect(
        &self,
        image: &ImageRef<'_>,
        max_labels: u32,
        min_confidence: f32,
    ) -> Result<Vec<DamageLabel>, ServiceError>;
}

/// Report text generation from an image and its damage labels.
pub trait ReportGenerator: Send + Sync {
    fn generate(&self, image: &[u8], labels: &[DamageLabel]) -> Result<String, ServiceError>;
}

/// Renders a report document (PDF) to bytes.
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, doc: &ReportDocument) -> Result<Vec<u8>, ServiceError>;
}

/// Outbound mail delivery.
pub trait Notifier: Send + Sync {
    fn send(&self, notification: &Notification) -> Result<(), ServiceError>;
}
