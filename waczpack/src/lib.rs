//! Package WARC files into WACZ web archive bundles.
//!
//! A WACZ (Web Archive Collection Zipped) bundle is a deterministically
//! structured ZIP container that ships original WARC payloads alongside a
//! sorted, two-level CDXJ index, a page list, a data-package manifest, and an
//! optional signed digest. Replay engines rely on the bundle's internal
//! layout and integrity metadata for random-access retrieval, so every entry
//! here is produced to be byte-addressable:
//!
//! ```text
//! indexes/index.cdx.gz       # ZipNum-sharded gzip of sorted CDXJ lines
//! indexes/index.idx          # text IDX with !meta header + one line per shard
//! pages/pages.jsonl          # header line + one JSON object per page
//! archive/<basename>         # original WARC files, byte-for-byte
//! datapackage.json           # manifest with resources
//! datapackage-digest.json    # hash of manifest + optional signature
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use waczpack::{pack, WaczConfig};
//!
//! let config = WaczConfig::new(["crawl.warc.gz"], "crawl.wacz")?
//!     .title("My crawl")
//!     .main_page_url("https://example.com/");
//! pack(config)?;
//! # Ok::<(), waczpack::PackError>(())
//! ```
//!
//! A [`Run`] gives finer control: manual pages, a cancellation token, and
//! the manifest timestamp after completion. Logging goes through the `log`
//! facade; install any logger to observe progress.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod cdxj;
pub mod config;
pub mod datapackage;
mod error;
mod http;
pub mod index;
mod indexer;
pub mod pages;
pub mod sign;
pub mod surt;
pub mod zip;
pub mod zipnum;

mod run;

pub use config::{Clock, PageIds, RandomPageIds, SystemClock, WaczConfig};
pub use error::{PackError, PackResult};
pub use run::{pack, Run};
pub use sign::{SignError, SignedData, Signer, SignerIdentity};

/// Cooperative cancellation handle for a packaging run.
///
/// Cancellation is check-on-await: workers and the orchestrator poll the
/// token at their suspension points, stop, and the run returns
/// [`PackError::Cancelled`] after deleting any partial output.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
