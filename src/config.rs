use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub detection: Detection,
    #[serde(default)]
    pub classification: Classification,
    #[serde(default)]
    pub generation: Generation,
    #[serde(default)]
    pub reports: Reports,
    #[serde(default)]
    pub notification: Notification,
    #[serde(default)]
    pub bridge: Bridge,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
    #[serde(default)]
    pub security: Security,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// A stable, normalization-friendly string for hashing.
    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub job_name: String,
    pub max_parallel_items: usize,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            job_name: "default".into(),
            max_parallel_items: 1,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub out_dir: String,
    pub scripts_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            out_dir: "out".into(),
            scripts_dir: "scripts".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Storage {
    /// "local" (directory per bucket) or "script" (bridge to a blob store).
    pub backend: String,
    pub local_root: String,
    pub report_prefix: String,
}
impl Default for Storage {
    fn default() -> Self {
        Self {
            backend: "local".into(),
            local_root: "buckets".into(),
            report_prefix: "reports/".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub max_labels: u32,
    pub min_confidence: f32,
    pub image_source: ImageSource,
}

/// How detection gets at the image. Unknown values fail at load time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    /// Reference to the stored object; nothing is re-uploaded.
    #[default]
    Stored,
    /// Bytes sent with the request.
    Inline,
}

impl Default for Detection {
    fn default() -> Self {
        Self {
            max_labels: 10,
            min_confidence: 70.0,
            image_source: ImageSource::Stored,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Classification {
    pub extra_keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub model_id: String,
    pub anthropic_version: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub media_type: String,
}
impl Default for Generation {
    fn default() -> Self {
        Self {
            model_id: "anthropic.claude-3-sonnet-20240229-v1:0".into(),
            anthropic_version: "bedrock-2023-05-31".into(),
            max_tokens: 300,
            temperature: 0.7,
            media_type: "image/jpeg".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reports {
    /// "text" or "pdf".
    pub format: String,
}
impl Default for Reports {
    fn default() -> Self {
        Self {
            format: "text".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub sender: String,
    pub subject_prefix: String,
}
impl Default for Notification {
    fn default() -> Self {
        Self {
            sender: "reports@example.com".into(),
            subject_prefix: "Damage Report for".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bridge {
    pub python_exe: String,
    pub timeout_seconds: u64,
    pub region: String,
    #[serde(default)]
    pub env: std::collections::BTreeMap<String, String>,
}
impl Default for Bridge {
    fn default() -> Self {
        Self {
            python_exe: "python3".into(),
            timeout_seconds: 120,
            region: "us-east-1".into(),
            env: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debug {
    pub keep_script_stderr: bool,
    pub dump_effective_config: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            keep_script_stderr: true,
            dump_effective_config: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Security {
    pub reject_path_traversal: bool,
    pub pin_scripts_dir: bool,
}
impl Default for Security {
    fn default() -> Self {
        Self {
            reject_path_traversal: true,
            pin_scripts_dir: true,
        }
    }
}
