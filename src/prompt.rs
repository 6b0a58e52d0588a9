//! Prompt text and request/response shaping for the report model.

use crate::{classify::DamageLabel, config::Generation, error::ServiceError};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

pub fn report_prompt(labels: &[DamageLabel]) -> String {
    let labels_json = serde_json::to_string(labels).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Analyze the following image for damage. Detected potential damage indicators: {labels_json}\n\
         Provide a detailed damage assessment including:\n\
         1. Type and extent of damage\n\
         2. Estimated repair complexity\n\
         3. Potential repair cost range\n\
         4. Recommendations for next steps\n\
         Be specific and use the detected labels as context."
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    pub anthropic_version: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Image { source: ImageSource },
    Text { text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

impl ModelRequest {
    /// One user turn: the base64 image followed by the damage prompt.
    pub fn for_report(cfg: &Generation, image: &[u8], labels: &[DamageLabel]) -> Self {
        Self {
            anthropic_version: cfg.anthropic_version.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            messages: vec![Message {
                role: "user".into(),
                content: vec![
                    ContentPart::Image {
                        source: ImageSource {
                            kind: "base64".into(),
                            media_type: cfg.media_type.clone(),
                            data: STANDARD.encode(image),
                        },
                    },
                    ContentPart::Text {
                        text: report_prompt(labels),
                    },
                ],
            }],
        }
    }
}

/// Pulls `content[0].text` out of a model response body.
pub fn response_text(body: &serde_json::Value) -> Result<String, ServiceError> {
    body.get("content")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("text"))
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| ServiceError::Protocol("model response has no content[0].text".into()))
}
