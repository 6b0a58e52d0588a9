use crate::{
    backend::{
        DocumentRenderer, ImageId, ImageRef, LabelDetector, ReportDocument, ReportGenerator,
        Storage,
    },
    classify::{DamageClassifier, DamageKeywordSet},
    config::{Config, ImageSource},
    error::{ItemFailure, ItemStage, StorageError},
    report::{BatchReport, PersistFailure, PersistedReport, ProcessingResult},
    util::{is_eligible_image, report_key},
};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
    mpsc,
};
use std::time::Instant;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

/// Runs every eligible image in a bucket through
/// fetch → detect → classify → generate → (persist).
///
/// Items are independent: a failure is logged, recorded in
/// [`BatchReport::failures`] and the run moves on.
pub struct Pipeline {
    cfg: Config,
    classifier: DamageClassifier,
    storage: Arc<dyn Storage>,
    detector: Arc<dyn LabelDetector>,
    generator: Arc<dyn ReportGenerator>,
    renderer: Option<Arc<dyn DocumentRenderer>>,
}

/// Everything one item produced. `result` is what the batch output sees.
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub result: Result<ProcessingResult, ItemFailure>,
    pub persisted: Option<PersistedReport>,
    pub persist_failure: Option<PersistFailure>,
}

impl Pipeline {
    pub fn new(
        cfg: &Config,
        storage: Arc<dyn Storage>,
        detector: Arc<dyn LabelDetector>,
        generator: Arc<dyn ReportGenerator>,
    ) -> Self {
        let keywords = DamageKeywordSet::with_extra(&cfg.classification.extra_keywords);
        Self {
            cfg: cfg.clone(),
            classifier: DamageClassifier::new(keywords),
            storage,
            detector,
            generator,
            renderer: None,
        }
    }

    /// Persist reports as rendered PDF documents instead of plain text.
    pub fn with_renderer(mut self, renderer: Arc<dyn DocumentRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn list_eligible(&self, source: &str) -> Result<Vec<String>, StorageError> {
        let keys = self.storage.list_keys(source)?;
        Ok(keys.into_iter().filter(|k| is_eligible_image(k)).collect())
    }

    /// Processes every eligible image. A listing failure yields an empty
    /// report with `enumeration_error` set; it is never returned as an error.
    pub fn process_all(&self, source: &str, destination: Option<&str>) -> BatchReport {
        match self.try_process_all(source, destination) {
            Ok(report) => report,
            Err(err) => {
                error!("listing images failed bucket={source}: {err}");
                BatchReport {
                    source_bucket: source.to_string(),
                    destination_bucket: destination.map(str::to_string),
                    enumeration_error: Some(err.to_string()),
                    ..Default::default()
                }
            }
        }
    }

    /// Like [`Pipeline::process_all`] but surfaces a listing failure.
    pub fn try_process_all(
        &self,
        source: &str,
        destination: Option<&str>,
    ) -> Result<BatchReport, StorageError> {
        let started = Instant::now();
        let keys = self.list_eligible(source)?;

        let mut report = BatchReport {
            source_bucket: source.to_string(),
            destination_bucket: destination.map(str::to_string),
            eligible_keys: keys.clone(),
            ..Default::default()
        };

        if keys.is_empty() {
            warn!("no images found in bucket={source}");
            return Ok(report);
        }

        info!(
            "batch start bucket={source} images={} destination={:?}",
            keys.len(),
            destination
        );

        for outcome in self.run_items(source, &keys, destination) {
            match outcome.result {
                Ok(result) => report.results.push(result),
                Err(failure) => report.failures.push(failure),
            }
            report.persisted.extend(outcome.persisted);
            report.persist_failures.extend(outcome.persist_failure);
        }

        info!(
            "batch done bucket={source} ok={} failed={} persist_failed={} elapsed_ms={}",
            report.results.len(),
            report.failures.len(),
            report.persist_failures.len(),
            started.elapsed().as_millis()
        );
        Ok(report)
    }

    /// Outcomes come back in the order of `keys`, whatever the worker count.
    fn run_items(
        &self,
        source: &str,
        keys: &[String],
        destination: Option<&str>,
    ) -> Vec<ItemOutcome> {
        let workers = self.cfg.global.max_parallel_items.max(1).min(keys.len());
        if workers <= 1 {
            return keys
                .iter()
                .map(|key| self.process_one(source, key, destination))
                .collect();
        }

        debug!("running {} items on {} workers", keys.len(), workers);
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel();
        std::thread::scope(|s| {
            for _ in 0..workers {
                let tx = tx.clone();
                let next = &next;
                s.spawn(move || {
                    loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(key) = keys.get(i) else { break };
                        let outcome = self.process_one(source, key, destination);
                        if tx.send((i, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(tx);

        let mut slots: Vec<(usize, ItemOutcome)> = rx.into_iter().collect();
        slots.sort_by_key(|(i, _)| *i);
        slots.into_iter().map(|(_, outcome)| outcome).collect()
    }

    pub fn process_one(&self, source: &str, key: &str, destination: Option<&str>) -> ItemOutcome {
        let image = ImageId::new(source, key);
        let result = match self.analyze(&image) {
            Ok(result) => result,
            Err(failure) => {
                error!(
                    "error processing key={} stage={}: {}",
                    failure.key, failure.stage, failure.message
                );
                return ItemOutcome {
                    result: Err(failure),
                    persisted: None,
                    persist_failure: None,
                };
            }
        };

        let (persisted, persist_failure) = match destination {
            Some(bucket) => match self.persist(bucket, &result) {
                Ok(p) => (Some(p), None),
                Err(f) => {
                    warn!(
                        "failed to save report for key={} to {}: {}",
                        f.source_key, f.report_key, f.message
                    );
                    (None, Some(f))
                }
            },
            None => (None, None),
        };

        ItemOutcome {
            result: Ok(result),
            persisted,
            persist_failure,
        }
    }

    fn analyze(&self, image: &ImageId) -> Result<ProcessingResult, ItemFailure> {
        let key = image.key.as_str();
        let bytes = self
            .storage
            .get_bytes(&image.bucket, key)
            .map_err(|e| ItemFailure::new(key, ItemStage::Fetch, e))?;
        debug!("fetched key={key} bytes={}", bytes.len());

        let image_ref = match self.cfg.detection.image_source {
            ImageSource::Inline => ImageRef::Inline(&bytes),
            ImageSource::Stored => image.as_image_ref(),
        };
        let detected = self
            .detector
            .detect(
                &image_ref,
                self.cfg.detection.max_labels,
                self.cfg.detection.min_confidence,
            )
            .map_err(|e| ItemFailure::new(key, ItemStage::Detect, e))?;

        let damage_labels = self.classifier.classify(&detected);
        info!(
            "labels key={key} detected={} damage={}",
            detected.len(),
            damage_labels.len()
        );

        let report = self
            .generator
            .generate(&bytes, &damage_labels)
            .map_err(|e| ItemFailure::new(key, ItemStage::Generate, e))?;
        debug!("report key={key} chars={}", report.len());

        Ok(ProcessingResult {
            source_key: key.to_string(),
            damage_labels,
            report,
        })
    }

    fn persist(
        &self,
        bucket: &str,
        result: &ProcessingResult,
    ) -> Result<PersistedReport, PersistFailure> {
        let now = OffsetDateTime::now_utc();
        let prefix = &self.cfg.storage.report_prefix;

        let (key, body, content_type) = match &self.renderer {
            Some(renderer) => {
                let pdf_key = report_key(prefix, &result.source_key, now, "pdf");
                let doc =
                    ReportDocument::new(&result.source_key, &result.damage_labels, &result.report);
                match renderer.render(&doc) {
                    Ok(pdf) => (pdf_key, pdf, "application/pdf"),
                    Err(e) => {
                        return Err(PersistFailure {
                            source_key: result.source_key.clone(),
                            report_key: pdf_key,
                            message: format!("render failed: {e}"),
                        });
                    }
                }
            }
            None => {
                let txt_key = report_key(prefix, &result.source_key, now, "txt");
                (txt_key, result.report.clone().into_bytes(), "text/plain")
            }
        };

        match self
            .storage
            .put_bytes(bucket, &key, &body, content_type)
        {
            Ok(()) => {
                info!("saved report key={} to {bucket}/{key}", result.source_key);
                Ok(PersistedReport {
                    source_key: result.source_key.clone(),
                    bucket: bucket.to_string(),
                    report_key: key,
                })
            }
            Err(e) => Err(PersistFailure {
                source_key: result.source_key.clone(),
                report_key: key,
                message: e.to_string(),
            }),
        }
    }
}
