use crate::{
    backend::{Attachment, Notification, Notifier},
    config::Config,
    pipeline::Pipeline,
    report::{BatchReport, ProcessingResult},
    util::base_filename,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub source_key: String,
    pub recipient: String,
    pub sent: bool,
    pub attached: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyReport {
    pub batch: BatchReport,
    pub deliveries: Vec<Delivery>,
}

/// Runs a batch into the processed bucket, then mails one report per image.
pub struct NotificationOrchestrator {
    pipeline: Pipeline,
    notifier: Arc<dyn Notifier>,
    processed_bucket: String,
    sender: String,
    subject_prefix: String,
}

impl NotificationOrchestrator {
    pub fn new(
        cfg: &Config,
        pipeline: Pipeline,
        notifier: Arc<dyn Notifier>,
        processed_bucket: &str,
    ) -> Self {
        Self {
            pipeline,
            notifier,
            processed_bucket: processed_bucket.to_string(),
            sender: cfg.notification.sender.clone(),
            subject_prefix: cfg.notification.subject_prefix.clone(),
        }
    }

    pub fn process_and_notify(&self, source: &str, recipient: &str) -> NotifyReport {
        let batch = self
            .pipeline
            .process_all(source, Some(&self.processed_bucket));

        let deliveries = batch
            .results
            .iter()
            .map(|result| self.deliver(&batch, result, recipient))
            .collect();

        NotifyReport { batch, deliveries }
    }

    fn deliver(&self, batch: &BatchReport, result: &ProcessingResult, recipient: &str) -> Delivery {
        let attachment = self.attachment_for(batch, &result.source_key);
        let attached = attachment.as_ref().map(|a| a.filename.clone());
        let notification = Notification {
            from: self.sender.clone(),
            to: recipient.to_string(),
            subject: format!("{} {}", self.subject_prefix, result.source_key),
            html_body: email_body(result),
            attachment,
        };

        match self.notifier.send(&notification) {
            Ok(()) => {
                info!("email sent to {recipient} for key={}", result.source_key);
                Delivery {
                    source_key: result.source_key.clone(),
                    recipient: recipient.to_string(),
                    sent: true,
                    attached,
                    error: None,
                }
            }
            Err(e) => {
                error!("failed to send email for key={}: {e}", result.source_key);
                Delivery {
                    source_key: result.source_key.clone(),
                    recipient: recipient.to_string(),
                    sent: false,
                    attached,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn attachment_for(&self, batch: &BatchReport, source_key: &str) -> Option<Attachment> {
        let persisted = batch.persisted_key(source_key)?;
        match self
            .pipeline
            .storage()
            .get_bytes(&persisted.bucket, &persisted.report_key)
        {
            Ok(data) => Some(Attachment {
                filename: base_filename(&persisted.report_key).to_string(),
                content_type: content_type_for(&persisted.report_key).to_string(),
                data,
            }),
            Err(e) => {
                warn!("could not attach report {}: {e}", persisted.report_key);
                None
            }
        }
    }
}

fn content_type_for(key: &str) -> &'static str {
    if key.to_ascii_lowercase().ends_with(".pdf") {
        "application/pdf"
    } else {
        "text/plain"
    }
}

/// HTML body of a report email.
pub fn email_body(result: &ProcessingResult) -> String {
    let labels = result
        .damage_labels
        .iter()
        .map(|l| escape_html(&l.name))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "<html>\n<body>\n\
         <h2>Damage Report</h2>\n\
         <p><strong>Image:</strong> {}</p>\n\
         <p><strong>Damage Labels:</strong> {}</p>\n\
         <h3>Detailed Report</h3>\n\
         <p>{}</p>\n\
         </body>\n</html>\n",
        escape_html(&result.source_key),
        labels,
        escape_html(&result.report)
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
