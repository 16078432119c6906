//! CDXJ line construction.
//!
//! A CDXJ line is `<searchable-url> <14-digit timestamp> <json>\n`, where the
//! searchable URL is the SURT of the record's target URI and the JSON object
//! carries enough metadata to fetch the record back out of its WARC file:
//! the gzip member's offset and compressed length plus the file's basename.

use chrono::{DateTime, Utc};
use data_encoding::BASE32;
use serde::Serialize;
use sha1::{Digest, Sha1};

use crate::surt::surt;

/// JSON metadata carried by one CDXJ line.
///
/// Field order here is serialization order.
#[derive(Debug, Clone, Serialize)]
pub struct CdxjMeta {
    /// The original WARC-Target-URI.
    pub url: String,
    /// Content type of the entity body, `warc/revisit` for revisit records.
    pub mime: String,
    /// HTTP status code.
    pub status: u16,
    /// Payload digest, `sha1:<base32>` unless the record supplied its own.
    pub digest: String,
    /// Compressed length of the enclosing gzip member.
    pub length: u64,
    /// Byte offset of the enclosing gzip member in its WARC file.
    pub offset: u64,
    /// Basename of the WARC file holding the record.
    pub filename: String,
}

/// Render a WARC-Date as the 14-digit `YYYYMMDDHHMMSS` form CDX uses.
pub fn timestamp14(date: &DateTime<Utc>) -> String {
    date.format("%Y%m%d%H%M%S").to_string()
}

/// Render a raw SHA-1 digest the way WARC tooling does: `sha1:` + base32.
pub fn sha1_label(payload_sha1: &[u8; 20]) -> String {
    format!("sha1:{}", BASE32.encode(payload_sha1))
}

/// Incremental SHA-1 over an entity body, for records that did not bring a
/// WARC-Payload-Digest of their own.
#[derive(Default)]
pub struct PayloadDigester {
    hasher: Sha1,
}

impl PayloadDigester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finalize(self) -> String {
        let digest: [u8; 20] = self.hasher.finalize().into();
        sha1_label(&digest)
    }
}

/// Assemble one CDXJ line, `\n`-terminated.
///
/// Returns `None` when the record has no usable searchable URL or its status
/// is 0 (no parseable HTTP status line); such records are not indexable.
pub fn cdxj_line(target_uri: &str, timestamp: &DateTime<Utc>, meta: &CdxjMeta) -> Option<String> {
    if meta.status == 0 {
        return None;
    }
    let key = surt(target_uri)?;
    let json = serde_json::to_string(meta).ok()?;
    Some(format!("{} {} {}\n", key, timestamp14(timestamp), json))
}
