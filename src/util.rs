use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use time::{
    OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339, macros::format_description,
};

pub fn ensure_dir(p: &Path) -> Result<()> {
    std::fs::create_dir_all(p).with_context(|| format!("create_dir_all {}", p.display()))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    format!("{:x}", h.finalize())
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// `YYYYMMDD_HHMMSS` in UTC. Sortable, unique only to the second.
pub fn compact_timestamp(at: OffsetDateTime) -> String {
    let fmt = format_description!("[year][month][day]_[hour][minute][second]");
    at.to_offset(UtcOffset::UTC)
        .format(fmt)
        .unwrap_or_else(|_| "19700101_000000".to_string())
}

/// True for keys ending in `.jpg` or `.jpeg`, any case.
pub fn is_eligible_image(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    lower.ends_with(".jpg") || lower.ends_with(".jpeg")
}

/// Last `/`-separated segment of an object key.
pub fn base_filename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// `{prefix}{base}_{YYYYMMDD_HHMMSS}.{ext}`, e.g. `reports/home.jpg_20240101_120000.txt`.
pub fn report_key(prefix: &str, source_key: &str, at: OffsetDateTime, ext: &str) -> String {
    format!(
        "{}{}_{}.{}",
        prefix,
        base_filename(source_key),
        compact_timestamp(at),
        ext
    )
}
