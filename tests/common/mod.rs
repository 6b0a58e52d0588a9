#![allow(dead_code)]

use damage_check::{
    backend::{
        DocumentRenderer, ImageRef, LabelDetector, Notification, Notifier, ReportDocument,
        ReportGenerator, Storage,
    },
    classify::DamageLabel,
    error::{ServiceError, StorageError},
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// In-memory blob store. Objects are listed in key order.
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<BTreeMap<(String, String), (Vec<u8>, String)>>,
    pub fail_list: bool,
    pub fail_get: HashSet<String>,
    pub fail_put: bool,
}

impl MemoryStorage {
    pub fn with_images(bucket: &str, keys: &[&str]) -> Self {
        let s = Self::default();
        for k in keys {
            s.insert(bucket, k, image_bytes(k), "image/jpeg");
        }
        s
    }

    pub fn insert(&self, bucket: &str, key: &str, bytes: Vec<u8>, content_type: &str) {
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            (bytes, content_type.to_string()),
        );
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<(Vec<u8>, String)> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn keys_in(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }
}

impl Storage for MemoryStorage {
    fn list_keys(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        if self.fail_list {
            return Err(StorageError::AccessDenied(format!("list {bucket}")));
        }
        Ok(self.keys_in(bucket))
    }

    fn get_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        if self.fail_get.contains(key) {
            return Err(StorageError::Transient(format!("get {key}")));
        }
        self.object(bucket, key)
            .map(|(bytes, _)| bytes)
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    fn put_bytes(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError> {
        if self.fail_put {
            return Err(StorageError::Transient("simulated put failure".into()));
        }
        self.insert(bucket, key, bytes.to_vec(), content_type);
        Ok(())
    }
}

/// Image payload stored for `key`; generator fakes key off these bytes.
pub fn image_bytes(key: &str) -> Vec<u8> {
    format!("img:{key}").into_bytes()
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectCall {
    pub stored_key: Option<String>,
    pub inline: bool,
    pub max_labels: u32,
    pub min_confidence: f32,
}

/// Returns the same labels for every image unless a key is overridden.
#[derive(Default)]
pub struct FakeDetector {
    pub labels: Vec<DamageLabel>,
    pub per_key: HashMap<String, Vec<DamageLabel>>,
    pub fail_keys: HashSet<String>,
    pub calls: Mutex<Vec<DetectCall>>,
}

impl FakeDetector {
    pub fn returning(labels: Vec<DamageLabel>) -> Self {
        Self {
            labels,
            ..Default::default()
        }
    }
}

impl LabelDetector for FakeDetector {
    fn detect(
        &self,
        image: &ImageRef<'_>,
        max_labels: u32,
        min_confidence: f32,
    ) -> Result<Vec<DamageLabel>, ServiceError> {
        let key = match image {
            ImageRef::Stored { key, .. } => Some(key.to_string()),
            ImageRef::Inline(_) => None,
        };
        self.calls.lock().unwrap().push(DetectCall {
            stored_key: key.clone(),
            inline: key.is_none(),
            max_labels,
            min_confidence,
        });
        if let Some(k) = &key {
            if self.fail_keys.contains(k) {
                return Err(ServiceError::Unavailable("throttled".into()));
            }
            if let Some(labels) = self.per_key.get(k) {
                return Ok(labels.clone());
            }
        }
        Ok(self.labels.clone())
    }
}

#[derive(Default)]
pub struct FakeGenerator {
    pub fail_keys: HashSet<String>,
    pub seen_labels: Mutex<Vec<Vec<DamageLabel>>>,
}

impl ReportGenerator for FakeGenerator {
    fn generate(&self, image: &[u8], labels: &[DamageLabel]) -> Result<String, ServiceError> {
        let text = String::from_utf8_lossy(image).to_string();
        let key = text.trim_start_matches("img:").to_string();
        self.seen_labels.lock().unwrap().push(labels.to_vec());
        if self.fail_keys.contains(&key) {
            return Err(ServiceError::Rejected("bad image".into()));
        }
        let names: Vec<&str> = labels.iter().map(|l| l.name.as_str()).collect();
        Ok(format!("report for {key}: {}", names.join(", ")))
    }
}

#[derive(Default)]
pub struct FakeRenderer {
    pub fail: bool,
}

impl DocumentRenderer for FakeRenderer {
    fn render(&self, doc: &ReportDocument) -> Result<Vec<u8>, ServiceError> {
        if self.fail {
            return Err(ServiceError::Unavailable("renderer down".into()));
        }
        Ok(format!("%PDF {}", doc.title).into_bytes())
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    pub fail_subjects_containing: Option<String>,
    pub sent: Mutex<Vec<Notification>>,
}

impl Notifier for FakeNotifier {
    fn send(&self, notification: &Notification) -> Result<(), ServiceError> {
        if let Some(needle) = &self.fail_subjects_containing {
            if notification.subject.contains(needle.as_str()) {
                return Err(ServiceError::Unavailable("smtp down".into()));
            }
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub fn label(name: &str, confidence: f32) -> DamageLabel {
    DamageLabel::new(name, confidence)
}

/// Collects formatted log output for the current thread.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Runs `f` with a plain-text subscriber writing into this capture.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || sink.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
