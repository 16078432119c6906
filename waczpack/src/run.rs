//! The one-shot packaging run.
//!
//! A [`Run`] is configured once, optionally fed manual pages, and consumed by
//! a single call to [`Run::process`]. The pipeline is strictly sequenced:
//! index the inputs in parallel, harvest the sorted results, emit the ZipNum
//! index pair, emit the page list, stream the WARC bodies, then close with
//! the manifest and its digest. Any failure (or cancellation) tears the
//! partially written output back down.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use log::{info, warn};

use crate::config::WaczConfig;
use crate::datapackage::{Datapackage, DigestFile, ResourceRecord};
use crate::error::{PackError, PackResult};
use crate::pages::{self, PageInfo};
use crate::sign::sign_with_deadline;
use crate::zip::ZipWriter;
use crate::{indexer, zipnum, CancelToken};

/// A configured, not-yet-executed packaging run.
pub struct Run {
    config: WaczConfig,
    manual_pages: Vec<PageInfo>,
    detect_pages: bool,
    consumed: bool,
    cancel: CancelToken,
    datapackage_date: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(config: WaczConfig) -> Self {
        let detect_pages = config.detect_pages;
        Run {
            config,
            manual_pages: Vec::new(),
            detect_pages,
            consumed: false,
            cancel: CancelToken::new(),
            datapackage_date: None,
        }
    }

    /// A token that cancels this run cooperatively when triggered.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// The `created` timestamp of the emitted manifest, once one exists.
    pub fn datapackage_date(&self) -> Option<DateTime<Utc>> {
        self.datapackage_date
    }

    /// Record a page by hand instead of inferring pages from the crawl.
    ///
    /// The first manual page disables page inference for the remainder of
    /// the run. An unparseable URL is dropped with a warning.
    pub fn add_page(&mut self, url: &str, title: Option<&str>) {
        if url::Url::parse(url).is_err() {
            warn!("dropping manual page with invalid URL {url:?}");
            return;
        }
        self.detect_pages = false;
        self.manual_pages.push(PageInfo {
            url: url.to_owned(),
            title: title
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_owned),
            ts: None,
        });
    }

    /// Execute the run. At most one call may ever be made; subsequent calls
    /// fail with [`PackError::AlreadyConsumed`].
    ///
    /// On any failure the partially written output file is removed.
    pub fn process(&mut self) -> PackResult<()> {
        if self.consumed {
            return Err(PackError::AlreadyConsumed);
        }
        self.consumed = true;

        let result = self.execute();
        if result.is_err() {
            if let Err(e) = fs::remove_file(&self.config.output) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        "could not remove partial output {}: {e}",
                        self.config.output.display()
                    );
                }
            }
        }
        result
    }

    fn checkpoint(&self) -> PackResult<()> {
        if self.cancel.is_cancelled() {
            Err(PackError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn execute(&mut self) -> PackResult<()> {
        self.checkpoint()?;
        info!(
            "packaging {} input(s) into {}",
            self.config.inputs.len(),
            self.config.output.display()
        );

        let mut indexes =
            indexer::index_warcs(&self.config.inputs, self.detect_pages, &self.cancel)?;
        for page in self.manual_pages.drain(..) {
            indexes.insert_page(page);
        }
        self.checkpoint()?;

        let file = File::create(&self.config.output).map_err(PackError::WriteFailed)?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let mut resources: Vec<ResourceRecord> = Vec::new();

        // Two-level CDXJ index.
        let index_pair = zipnum::build(indexes.cdx_lines()).map_err(PackError::WriteFailed)?;
        let entry = zip.append("indexes/index.cdx.gz", &index_pair.cdx_gz)?;
        resources.push(ResourceRecord::from_entry(&entry));
        let entry = zip.append("indexes/index.idx", index_pair.idx.as_bytes())?;
        resources.push(ResourceRecord::from_entry(&entry));
        self.checkpoint()?;

        // Page list.
        let jsonl = pages::to_jsonl(indexes.pages(), &*self.config.page_ids);
        let entry = zip.append("pages/pages.jsonl", &jsonl)?;
        resources.push(ResourceRecord::from_entry(&entry));

        // Original WARC bodies, streamed and hashed on the way through.
        for input in &self.config.inputs {
            self.checkpoint()?;
            let entry = stream_archive_member(&mut zip, input)?;
            resources.push(ResourceRecord::from_entry(&entry));
        }
        drop(indexes);

        // Manifest over everything appended so far.
        let created = self.config.clock.now();
        self.datapackage_date = Some(created);
        let package = Datapackage::new(
            &created,
            resources,
            self.config.title.as_deref(),
            self.config.description.as_deref(),
            self.config.main_page_url.clone(),
            self.config.main_page_date.clone(),
            self.config.extras.clone(),
        );
        let package_bytes = package
            .to_bytes()
            .map_err(|e| PackError::WriteFailed(e.into()))?;
        zip.append("datapackage.json", &package_bytes)?;

        // Digest, optionally signed. The digest entry is the one entry that
        // is not itself a manifest resource.
        let mut digest = DigestFile::for_manifest(&package_bytes);
        if let Some(signer) = &self.config.signer {
            self.checkpoint()?;
            let created_str = created.to_rfc3339_opts(SecondsFormat::Secs, true);
            let signed = sign_with_deadline(
                signer,
                &digest.hash,
                &created_str,
                self.config.signer_deadline,
            )?;
            signed
                .validate(&digest.hash)
                .map_err(PackError::SignatureInvalid)?;
            digest.signed_data = Some(signed);
        }
        let digest_bytes = digest
            .to_bytes()
            .map_err(|e| PackError::WriteFailed(e.into()))?;
        zip.append("datapackage-digest.json", &digest_bytes)?;

        zip.finish()?;
        info!("wrote {}", self.config.output.display());
        Ok(())
    }
}

/// Append one input WARC under `archive/`, byte for byte.
fn stream_archive_member(
    zip: &mut ZipWriter<BufWriter<File>>,
    input: &Path,
) -> PackResult<crate::zip::EntrySummary> {
    let basename = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let entry_name = format!("archive/{basename}");

    let file = File::open(input).map_err(PackError::WriteFailed)?;
    let len = file.metadata().map_err(PackError::WriteFailed)?.len();
    let mut reader = BufReader::new(file);
    Ok(zip.append_stream(&entry_name, len, &mut reader)?)
}

/// Validate a configuration and run it to completion.
pub fn pack(config: WaczConfig) -> PackResult<()> {
    Run::new(config).process()
}
