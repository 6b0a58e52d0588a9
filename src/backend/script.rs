use super::{
    DocumentRenderer, ImageRef, LabelDetector, Notification, Notifier, ReportDocument,
    ReportGenerator, Storage,
    types::{BridgeDiag, DetectOut, GenerateOut, GetOut, ListOut, RenderOut, ReplyStatus},
};
use crate::{
    classify::DamageLabel,
    config::Config,
    error::{ServiceError, StorageError},
    prompt::{ModelRequest, response_text},
};
use anyhow::{Context, Result, anyhow};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const STORAGE_SCRIPT: &str = "storage.py";
pub const DETECT_SCRIPT: &str = "detect_labels.py";
pub const GENERATE_SCRIPT: &str = "generate_report.py";
pub const RENDER_SCRIPT: &str = "render_pdf.py";
pub const EMAIL_SCRIPT: &str = "send_email.py";

/// Talks to the cloud services through small helper scripts: one JSON object
/// in on stdin, one JSON object out on stdout.
pub struct ScriptBridge {
    cfg: Config,
    scripts_dir: PathBuf,
    python_exe: PathBuf,
}

impl ScriptBridge {
    /// `required` lists the scripts this run will call; each must exist.
    pub fn new(cfg: &Config, required: &[&str]) -> Result<Self> {
        let scripts_dir = PathBuf::from(&cfg.paths.scripts_dir);
        if cfg.security.pin_scripts_dir {
            let cwd = std::env::current_dir().with_context(|| "current_dir")?;
            let canon = scripts_dir
                .canonicalize()
                .with_context(|| format!("canonicalize scripts_dir: {}", scripts_dir.display()))?;
            if !canon.starts_with(&cwd) {
                return Err(anyhow!(
                    "scripts_dir is outside cwd while pin_scripts_dir=true: {}",
                    canon.display()
                ));
            }
        }
        for script in required {
            let path = scripts_dir.join(script);
            if !path.exists() {
                return Err(anyhow!("missing script: {}", path.display()));
            }
        }
        let python_exe = resolve_python_exe(&cfg.bridge.python_exe);
        Ok(Self {
            cfg: cfg.clone(),
            scripts_dir,
            python_exe,
        })
    }

    /// Asks `script` to report on its interpreter and credentials.
    pub fn doctor(&self, script: &str) -> Result<BridgeDiag> {
        let script = self.script(script);
        self.run_json(&script, &serde_json::json!({"cmd": "doctor"}), self.timeout())
    }

    fn script(&self, name: &str) -> PathBuf {
        self.scripts_dir.join(name)
    }

    fn timeout(&self) -> Option<u64> {
        if self.cfg.bridge.timeout_seconds > 0 {
            Some(self.cfg.bridge.timeout_seconds)
        } else {
            None
        }
    }

    fn call<O: for<'de> serde::Deserialize<'de>>(
        &self,
        name: &str,
        req: &serde_json::Value,
    ) -> Result<O> {
        self.run_json(&self.script(name), req, self.timeout())
    }

    fn run_json<I: serde::Serialize, O: for<'de> serde::Deserialize<'de>>(
        &self,
        script: &Path,
        input: &I,
        timeout_seconds: Option<u64>,
    ) -> Result<O> {
        debug!(
            "bridge run {} timeout={:?}",
            script.display(),
            timeout_seconds
        );
        let mut cmd = Command::new(&self.python_exe);
        cmd.arg(script);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        for (k, v) in &self.cfg.bridge.env {
            cmd.env(k, v);
        }
        if !self.cfg.bridge.region.is_empty() {
            cmd.env("AWS_REGION", &self.cfg.bridge.region);
        }

        let request = serde_json::to_vec(input)?;
        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning bridge: {}", script.display()))?;

        let output = exchange(&mut child, request, timeout_seconds.map(Duration::from_secs))
            .with_context(|| format!("bridge call: {}", script.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "bridge script failed: {}\n{}",
                script.display(),
                stderr
            ));
        }

        if self.cfg.debug.keep_script_stderr && !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("bridge stderr {}: {}", script.display(), stderr.trim());
        }

        let out: O = serde_json::from_slice(&output.stdout)
            .with_context(|| format!("parsing bridge JSON output: {}", script.display()))?;
        Ok(out)
    }
}

fn resolve_python_exe(raw: &str) -> PathBuf {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
        if let Ok(env_val) = std::env::var("DAMAGE_CHECK_PYTHON") {
            let p = expand_tilde(&env_val);
            if p.exists() {
                return p;
            }
        }
        return PathBuf::from("python3");
    }
    expand_tilde(raw)
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

fn storage_failure(status: &ReplyStatus, bucket: &str, key: &str) -> StorageError {
    let msg = status
        .error
        .clone()
        .unwrap_or_else(|| "storage bridge returned ok=false".to_string());
    match status.error_kind.as_deref() {
        Some("not_found") => StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        Some("access_denied") => StorageError::AccessDenied(msg),
        _ => StorageError::Transient(msg),
    }
}

fn service_failure(status: &ReplyStatus, what: &str) -> ServiceError {
    let msg = status
        .error
        .clone()
        .unwrap_or_else(|| format!("{what} returned ok=false"));
    match status.error_kind.as_deref() {
        Some("rejected") | Some("invalid") => ServiceError::Rejected(msg),
        _ => ServiceError::Unavailable(msg),
    }
}

fn bridge_down(err: anyhow::Error) -> ServiceError {
    ServiceError::Unavailable(format!("{err:#}"))
}

impl Storage for ScriptBridge {
    fn list_keys(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        let req = serde_json::json!({"cmd": "list", "bucket": bucket});
        let out: ListOut = self
            .call(STORAGE_SCRIPT, &req)
            .map_err(|e| StorageError::Transient(format!("{e:#}")))?;
        if !out.status.ok {
            return Err(storage_failure(&out.status, bucket, ""));
        }
        Ok(out.keys)
    }

    fn get_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let req = serde_json::json!({"cmd": "get", "bucket": bucket, "key": key});
        let out: GetOut = self
            .call(STORAGE_SCRIPT, &req)
            .map_err(|e| StorageError::Transient(format!("{e:#}")))?;
        if !out.status.ok {
            return Err(storage_failure(&out.status, bucket, key));
        }
        STANDARD
            .decode(out.data_b64.as_bytes())
            .map_err(|e| StorageError::Transient(format!("invalid base64 payload: {e}")))
    }

    fn put_bytes(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError> {
        let req = serde_json::json!({
            "cmd": "put",
            "bucket": bucket,
            "key": key,
            "content_type": content_type,
            "data_b64": STANDARD.encode(bytes),
        });
        let out: ReplyStatus = self
            .call(STORAGE_SCRIPT, &req)
            .map_err(|e| StorageError::Transient(format!("{e:#}")))?;
        if !out.ok {
            return Err(storage_failure(&out, bucket, key));
        }
        Ok(())
    }
}

impl LabelDetector for ScriptBridge {
    fn detect(
        &self,
        image: &ImageRef<'_>,
        max_labels: u32,
        min_confidence: f32,
    ) -> Result<Vec<DamageLabel>, ServiceError> {
        let image = match image {
            ImageRef::Stored { bucket, key } => {
                serde_json::json!({"S3Object": {"Bucket": bucket, "Name": key}})
            }
            ImageRef::Inline(bytes) => serde_json::json!({"Bytes": STANDARD.encode(bytes)}),
        };
        let req = serde_json::json!({
            "cmd": "detect_labels",
            "Image": image,
            "MaxLabels": max_labels,
            "MinConfidence": min_confidence,
        });
        let out: DetectOut = self.call(DETECT_SCRIPT, &req).map_err(bridge_down)?;
        if !out.status.ok {
            return Err(service_failure(&out.status, "label detection"));
        }
        let response = out
            .response
            .ok_or_else(|| ServiceError::Protocol("detect reply has no response".into()))?;
        Ok(response.labels.into_iter().map(DamageLabel::from).collect())
    }
}

impl ReportGenerator for ScriptBridge {
    fn generate(&self, image: &[u8], labels: &[DamageLabel]) -> Result<String, ServiceError> {
        let body = ModelRequest::for_report(&self.cfg.generation, image, labels);
        let req = serde_json::json!({
            "cmd": "invoke_model",
            "model_id": &self.cfg.generation.model_id,
            "content_type": "application/json",
            "body": body,
        });
        let out: GenerateOut = self.call(GENERATE_SCRIPT, &req).map_err(bridge_down)?;
        if !out.status.ok {
            return Err(service_failure(&out.status, "report generation"));
        }
        let body = out
            .body
            .ok_or_else(|| ServiceError::Protocol("generate reply has no body".into()))?;
        response_text(&body)
    }
}

impl DocumentRenderer for ScriptBridge {
    fn render(&self, doc: &ReportDocument) -> Result<Vec<u8>, ServiceError> {
        let req = serde_json::json!({"cmd": "render", "document": doc});
        let out: RenderOut = self.call(RENDER_SCRIPT, &req).map_err(bridge_down)?;
        if !out.status.ok {
            return Err(service_failure(&out.status, "pdf render"));
        }
        STANDARD
            .decode(out.pdf_b64.as_bytes())
            .map_err(|e| ServiceError::Protocol(format!("invalid base64 pdf: {e}")))
    }
}

impl Notifier for ScriptBridge {
    fn send(&self, notification: &Notification) -> Result<(), ServiceError> {
        let attachment = notification.attachment.as_ref().map(|a| {
            serde_json::json!({
                "filename": a.filename,
                "content_type": a.content_type,
                "data_b64": STANDARD.encode(&a.data),
            })
        });
        let req = serde_json::json!({
            "cmd": "send",
            "from": notification.from,
            "to": notification.to,
            "subject": notification.subject,
            "html_body": notification.html_body,
            "attachment": attachment,
        });
        let out: ReplyStatus = self.call(EMAIL_SCRIPT, &req).map_err(bridge_down)?;
        if !out.ok {
            return Err(service_failure(&out, "email"));
        }
        Ok(())
    }
}

/// Feeds `request` to the child and collects its output. The deadline covers
/// the whole exchange, writing stdin included. On every error return the
/// child has been killed and reaped.
fn exchange(child: &mut Child, request: Vec<u8>, timeout: Option<Duration>) -> Result<Output> {
    let stdin = child.stdin.take();
    let stdout_thread = drain(child.stdout.take(), "stdout");
    let stderr_thread = drain(child.stderr.take(), "stderr");

    // A script that never reads stdin must not stall the caller on a full pipe.
    let writer = std::thread::spawn(move || -> std::io::Result<()> {
        if let Some(mut stdin) = stdin {
            stdin.write_all(&request)?;
            stdin.flush()?;
        }
        Ok(())
    });

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                reap(child);
                return Err(e).with_context(|| "try_wait");
            }
        }

        if let Some(limit) = timeout {
            if start.elapsed() > limit {
                warn!("bridge process timed out after {:?}", limit);
                reap(child);
                // Reader and writer threads may still be tied to pipes held by
                // grandchildren; they are left to finish on their own.
                return Err(anyhow!("bridge process exceeded timeout ({:?})", limit));
            }
        }

        std::thread::sleep(Duration::from_millis(20));
    };

    let written = writer
        .join()
        .map_err(|_| anyhow!("stdin writer thread panicked"))?;
    let stdout = stdout_thread
        .join()
        .map_err(|_| anyhow!("stdout reader thread panicked"))??;
    let stderr = stderr_thread
        .join()
        .map_err(|_| anyhow!("stderr reader thread panicked"))??;

    match written {
        // The script answered without reading all of its input; its exit
        // status and reply decide the outcome.
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
            debug!("bridge stdin closed early: {e}");
        }
        Err(e) => return Err(e).with_context(|| "writing bridge request"),
        Ok(()) => {}
    }

    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

fn drain<R: Read + Send + 'static>(
    reader: Option<R>,
    what: &'static str,
) -> std::thread::JoinHandle<Result<Vec<u8>>> {
    std::thread::spawn(move || -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut r) = reader {
            r.read_to_end(&mut buf)
                .with_context(|| format!("read {what}"))?;
        }
        Ok(buf)
    })
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
