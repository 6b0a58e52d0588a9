use crate::classify::DamageLabel;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageId {
    pub bucket: String,
    pub key: String,
}

impl ImageId {
    pub fn new(bucket: &str, key: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    pub fn as_image_ref(&self) -> ImageRef<'_> {
        ImageRef::Stored {
            bucket: &self.bucket,
            key: &self.key,
        }
    }
}

/// How an image is handed to label detection: by reference to the stored
/// object, or inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRef<'a> {
    Stored { bucket: &'a str, key: &'a str },
    Inline(&'a [u8]),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub title: String,
    pub labels: Vec<String>,
    pub body: String,
}

impl ReportDocument {
    pub fn new(source_key: &str, labels: &[DamageLabel], report: &str) -> Self {
        let labels = if labels.is_empty() {
            vec!["No labels detected".to_string()]
        } else {
            labels.iter().map(|l| l.name.clone()).collect()
        };
        Self {
            title: format!("Damage Analysis Report: {source_key}"),
            labels,
            body: report.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    #[serde(skip)]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub attachment: Option<Attachment>,
}

// Bridge replies. Every script answers with `ok` and, on failure, `error`
// plus an optional machine-readable `error_kind`.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeDiag {
    pub python_exe: String,
    pub python_version: String,
    #[serde(default)]
    pub region: Option<String>,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyStatus {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListOut {
    #[serde(flatten)]
    pub status: ReplyStatus,
    #[serde(default)]
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetOut {
    #[serde(flatten)]
    pub status: ReplyStatus,
    #[serde(default)]
    pub data_b64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectOut {
    #[serde(flatten)]
    pub status: ReplyStatus,
    #[serde(default)]
    pub response: Option<DetectLabelsResponse>,
}

/// Label detection response as returned by the vision service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectLabelsResponse {
    #[serde(rename = "Labels", default)]
    pub labels: Vec<VisionLabel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionLabel {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Confidence")]
    pub confidence: f32,
}

impl From<VisionLabel> for DamageLabel {
    fn from(v: VisionLabel) -> Self {
        DamageLabel::new(v.name, v.confidence)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOut {
    #[serde(flatten)]
    pub status: ReplyStatus,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderOut {
    #[serde(flatten)]
    pub status: ReplyStatus,
    #[serde(default)]
    pub pdf_b64: String,
}
