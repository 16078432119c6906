//! The `datapackage.json` manifest and its digest file.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::sign::SignedData;
use crate::zip::EntrySummary;

/// WACZ format version stamped into every manifest.
pub const WACZ_VERSION: &str = "1.1.1";

/// `<name> <version>` of this implementation.
pub const SOFTWARE: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

/// One manifest row per ZIP entry (except the digest file itself).
#[derive(Debug, Clone, Serialize)]
pub struct ResourceRecord {
    /// Final path component of the entry.
    pub name: String,
    /// Full path inside the archive.
    pub path: String,
    /// `sha256:` + lowercase hex.
    pub hash: String,
    /// Uncompressed size.
    pub bytes: u64,
}

impl ResourceRecord {
    /// Build a manifest row from what the ZIP writer observed.
    pub fn from_entry(entry: &EntrySummary) -> Self {
        let name = entry
            .path
            .rsplit('/')
            .next()
            .unwrap_or(entry.path.as_str())
            .to_owned();
        ResourceRecord {
            name,
            path: entry.path.clone(),
            hash: format!("sha256:{}", entry.sha256),
            bytes: entry.bytes,
        }
    }
}

/// The manifest, serialized with 2-space indentation for byte stability.
///
/// Field order here is serialization order.
#[derive(Debug, Serialize)]
pub struct Datapackage {
    pub created: String,
    pub wacz_version: String,
    pub software: String,
    pub resources: Vec<ResourceRecord>,
    pub title: String,
    pub description: String,
    #[serde(rename = "mainPageUrl", skip_serializing_if = "Option::is_none")]
    pub main_page_url: Option<String>,
    #[serde(rename = "mainPageDate", skip_serializing_if = "Option::is_none")]
    pub main_page_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extras: Option<serde_json::Value>,
}

impl Datapackage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        created: &DateTime<Utc>,
        resources: Vec<ResourceRecord>,
        title: Option<&str>,
        description: Option<&str>,
        main_page_url: Option<String>,
        main_page_date: Option<String>,
        extras: Option<serde_json::Value>,
    ) -> Self {
        Datapackage {
            created: created.to_rfc3339_opts(SecondsFormat::Secs, true),
            wacz_version: WACZ_VERSION.to_owned(),
            software: SOFTWARE.to_owned(),
            resources,
            title: title.unwrap_or("WACZ").to_owned(),
            description: description.unwrap_or("").to_owned(),
            main_page_url,
            main_page_date,
            extras,
        }
    }

    /// Serialize the manifest exactly as it will appear in the archive.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}

/// Contents of `datapackage-digest.json`.
#[derive(Debug, Serialize)]
pub struct DigestFile {
    pub path: String,
    pub hash: String,
    #[serde(rename = "signedData", skip_serializing_if = "Option::is_none")]
    pub signed_data: Option<SignedData>,
}

impl DigestFile {
    /// Hash the manifest bytes as they sit in the archive.
    pub fn for_manifest(manifest_bytes: &[u8]) -> Self {
        DigestFile {
            path: "datapackage.json".to_owned(),
            hash: format!("sha256:{}", hex::encode(Sha256::digest(manifest_bytes))),
            signed_data: None,
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}
