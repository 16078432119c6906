//! Packaging configuration.
//!
//! Required options (inputs, output) are validated at construction and fail
//! it when unusable. Optional options are validated by their setters: an
//! invalid value is dropped with a warning and the run proceeds without it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use log::warn;
use uuid::Uuid;

use crate::error::{PackError, PackResult};
use crate::sign::{Signer, DEFAULT_SIGNER_DEADLINE};

/// Time source for `created` stamps.
///
/// Injected so tests (and anyone who needs reproducible bundles) can pin the
/// clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of page identifiers: 32 hex digits, no delimiters.
pub trait PageIds: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random 128-bit identifiers.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPageIds;

impl PageIds for RandomPageIds {
    fn next_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

/// Everything a packaging run needs to know.
pub struct WaczConfig {
    pub(crate) inputs: Vec<PathBuf>,
    pub(crate) output: PathBuf,
    pub(crate) detect_pages: bool,
    pub(crate) title: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) main_page_url: Option<String>,
    pub(crate) main_page_date: Option<String>,
    pub(crate) extras: Option<serde_json::Value>,
    pub(crate) signer: Option<Arc<dyn Signer>>,
    pub(crate) signer_deadline: Duration,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) page_ids: Arc<dyn PageIds>,
}

impl std::fmt::Debug for WaczConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaczConfig")
            .field("inputs", &self.inputs)
            .field("output", &self.output)
            .field("detect_pages", &self.detect_pages)
            .field("title", &self.title)
            .field("description", &self.description)
            .field("main_page_url", &self.main_page_url)
            .field("main_page_date", &self.main_page_date)
            .field("extras", &self.extras)
            .field("signer_deadline", &self.signer_deadline)
            .finish_non_exhaustive()
    }
}

impl WaczConfig {
    /// Validate the required options and build a config with defaults for
    /// everything else.
    ///
    /// Inputs are filtered to `.warc` / `.warc.gz` files; anything else is
    /// dropped with a warning. An empty list after filtering is
    /// [`PackError::InputNotFound`]; an output path not ending in `.wacz` is
    /// [`PackError::ConfigInvalid`].
    pub fn new<I, P>(inputs: I, output: impl Into<PathBuf>) -> PackResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let output = output.into();
        if !output
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".wacz"))
        {
            return Err(PackError::ConfigInvalid(format!(
                "output {} does not end in .wacz",
                output.display()
            )));
        }

        let mut filtered = Vec::new();
        for input in inputs {
            let input = input.into();
            let name = input
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            if name.ends_with(".warc") || name.ends_with(".warc.gz") {
                filtered.push(input);
            } else {
                warn!("skipping non-WARC input {}", input.display());
            }
        }
        if filtered.is_empty() {
            return Err(PackError::InputNotFound);
        }

        Ok(WaczConfig {
            inputs: filtered,
            output,
            detect_pages: true,
            title: None,
            description: None,
            main_page_url: None,
            main_page_date: None,
            extras: None,
            signer: None,
            signer_deadline: DEFAULT_SIGNER_DEADLINE,
            clock: Arc::new(SystemClock),
            page_ids: Arc::new(RandomPageIds),
        })
    }

    /// Enable or disable page inference (on by default).
    pub fn detect_pages(mut self, detect: bool) -> Self {
        self.detect_pages = detect;
        self
    }

    /// Set the bundle title. Trimmed; an empty result is dropped.
    pub fn title(mut self, title: &str) -> Self {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            warn!("dropping empty title");
        } else {
            self.title = Some(trimmed.to_owned());
        }
        self
    }

    /// Set the bundle description. Trimmed; an empty result is dropped.
    pub fn description(mut self, description: &str) -> Self {
        let trimmed = description.trim();
        if trimmed.is_empty() {
            warn!("dropping empty description");
        } else {
            self.description = Some(trimmed.to_owned());
        }
        self
    }

    /// Set `mainPageUrl`. An unparseable or non-HTTP URL is dropped with a
    /// warning.
    pub fn main_page_url(mut self, raw: &str) -> Self {
        match url::Url::parse(raw) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
                self.main_page_url = Some(raw.to_owned());
            }
            Ok(parsed) => {
                warn!(
                    "dropping mainPageUrl {raw:?}: unsupported scheme {}",
                    parsed.scheme()
                );
            }
            Err(e) => {
                warn!("dropping invalid mainPageUrl {raw:?}: {e}");
            }
        }
        self
    }

    /// Set `mainPageDate`. A value that is not ISO-8601 is dropped with a
    /// warning; valid values are normalized to UTC.
    pub fn main_page_date(mut self, raw: &str) -> Self {
        match DateTime::parse_from_rfc3339(raw) {
            Ok(parsed) => {
                self.main_page_date = Some(
                    parsed
                        .with_timezone(&Utc)
                        .to_rfc3339_opts(SecondsFormat::Secs, true),
                );
            }
            Err(e) => {
                warn!("dropping invalid mainPageDate {raw:?}: {e}");
            }
        }
        self
    }

    /// Attach a JSON object included under `extras` in the manifest. A value
    /// that is not an object is dropped with a warning.
    pub fn extras(mut self, extras: serde_json::Value) -> Self {
        if extras.is_object() {
            self.extras = Some(extras);
        } else {
            warn!("dropping extras: not a JSON object");
        }
        self
    }

    /// Attach a signing collaborator.
    pub fn signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Override the signer deadline (default 30 s).
    pub fn signer_deadline(mut self, deadline: Duration) -> Self {
        self.signer_deadline = deadline;
        self
    }

    /// Inject a time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Inject a page-identifier source.
    pub fn page_ids(mut self, page_ids: Arc<dyn PageIds>) -> Self {
        self.page_ids = page_ids;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_must_be_wacz() {
        let err = WaczConfig::new(["a.warc"], "x.zip").unwrap_err();
        assert!(matches!(err, PackError::ConfigInvalid(_)));
    }

    #[test]
    fn empty_inputs_are_not_found() {
        let err = WaczConfig::new(Vec::<PathBuf>::new(), "out.wacz").unwrap_err();
        assert!(matches!(err, PackError::InputNotFound));
    }

    #[test]
    fn non_warc_inputs_are_filtered() {
        let err = WaczConfig::new(["notes.txt", "crawl.zip"], "out.wacz").unwrap_err();
        assert!(matches!(err, PackError::InputNotFound));

        let config = WaczConfig::new(["notes.txt", "crawl.warc.gz"], "out.wacz").unwrap();
        assert_eq!(config.inputs.len(), 1);
    }

    #[test]
    fn invalid_optionals_are_dropped() {
        let config = WaczConfig::new(["a.warc"], "out.wacz")
            .unwrap()
            .main_page_url("ftp://example.com/")
            .main_page_date("not-a-date")
            .title("   ")
            .extras(serde_json::json!(["not", "an", "object"]));
        assert!(config.main_page_url.is_none());
        assert!(config.main_page_date.is_none());
        assert!(config.title.is_none());
        assert!(config.extras.is_none());
    }

    #[test]
    fn valid_optionals_are_kept() {
        let config = WaczConfig::new(["a.warc"], "out.wacz")
            .unwrap()
            .main_page_url("https://example.com/start")
            .main_page_date("2023-02-22T13:00:00+01:00")
            .title("  My Crawl  ")
            .description("a description")
            .extras(serde_json::json!({"collection": "test"}));
        assert_eq!(
            config.main_page_url.as_deref(),
            Some("https://example.com/start")
        );
        // Normalized to UTC.
        assert_eq!(
            config.main_page_date.as_deref(),
            Some("2023-02-22T12:00:00Z")
        );
        assert_eq!(config.title.as_deref(), Some("My Crawl"));
        assert_eq!(config.description.as_deref(), Some("a description"));
    }

    #[test]
    fn random_page_ids_are_32_hex() {
        let id = RandomPageIds.next_id();
        assert_eq!(id.len(), 32);
        assert!(id.bytes().all(|b| b.is_ascii_hexdigit()));
    }
}
