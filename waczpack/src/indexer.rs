//! Fans WARC indexing across input files and merges the results.
//!
//! Each input file is scanned by one worker task: records stream through the
//! reader once, producing CDXJ lines and page candidates for that file. The
//! orchestrator merges completed batches serially in input order, so the
//! final index never depends on which task finished first.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use log::{debug, info, trace, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use warcread::{Compression, RecordReader};

use crate::cdxj::{cdxj_line, CdxjMeta, PayloadDigester};
use crate::error::{PackError, PackResult};
use crate::http;
use crate::index::SortedIndexes;
use crate::pages::{self, PageInfo, TITLE_SCAN_LIMIT};
use crate::CancelToken;

/// A page candidate pending request-method resolution.
struct PageCandidate {
    page: PageInfo,
    /// WARC-Record-ID of the response record.
    record_id: Option<String>,
    /// WARC-Concurrent-To of the response record, if any.
    concurrent_to: Option<String>,
}

/// Request methods observed in a file, keyed both ways: by the request's own
/// record ID and by the record it declared itself concurrent to.
#[derive(Default)]
struct RequestMethods {
    by_request_id: HashMap<String, String>,
    by_concurrent_to: HashMap<String, String>,
}

impl RequestMethods {
    fn record(&mut self, request_id: Option<&str>, concurrent_to: Option<&str>, method: String) {
        if let Some(id) = request_id {
            self.by_request_id
                .entry(id.to_owned())
                .or_insert_with(|| method.clone());
        }
        if let Some(id) = concurrent_to {
            self.by_concurrent_to
                .entry(id.to_owned())
                .or_insert(method);
        }
    }

    /// The method of the request paired with a response, when one was seen.
    fn resolve(&self, candidate: &PageCandidate) -> Option<&str> {
        if let Some(id) = &candidate.record_id {
            if let Some(method) = self.by_concurrent_to.get(id) {
                return Some(method);
            }
        }
        candidate
            .concurrent_to
            .as_ref()
            .and_then(|id| self.by_request_id.get(id))
            .map(String::as_str)
    }
}

/// Index every input file, in parallel, into one sorted result.
///
/// Worker parallelism is `min(available cores, inputs)`. The first failing
/// task aborts the others cooperatively and its error is surfaced wrapped in
/// [`PackError::IndexingFailed`]; partial batches are discarded.
pub fn index_warcs(
    inputs: &[PathBuf],
    detect_pages: bool,
    cancel: &CancelToken,
) -> PackResult<SortedIndexes> {
    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(inputs.len())
        .max(1);
    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| {
            PackError::IndexingFailed(Box::new(PackError::ConfigInvalid(format!(
                "could not build worker pool: {e}"
            ))))
        })?;
    info!(
        "indexing {} input file(s) across {} worker(s)",
        inputs.len(),
        workers
    );

    let abort = AtomicBool::new(false);
    let first_error: Mutex<Option<(usize, PackError)>> = Mutex::new(None);

    let batches: Vec<Option<SortedIndexes>> = pool.install(|| {
        inputs
            .par_iter()
            .enumerate()
            .map(|(position, path)| {
                if cancel.is_cancelled() || abort.load(Ordering::Relaxed) {
                    return None;
                }
                match scan_file(path, detect_pages, cancel) {
                    Ok(batch) => Some(batch),
                    Err(error) => {
                        abort.store(true, Ordering::Relaxed);
                        let mut slot = match first_error.lock() {
                            Ok(guard) => guard,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        match &*slot {
                            Some((earlier, _)) if *earlier < position => {}
                            _ => *slot = Some((position, error)),
                        }
                        None
                    }
                }
            })
            .collect()
    });

    let first_error = match first_error.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };
    if let Some((_, error)) = first_error {
        return Err(match error {
            PackError::Cancelled => PackError::Cancelled,
            other => PackError::IndexingFailed(Box::new(other)),
        });
    }
    if cancel.is_cancelled() {
        return Err(PackError::Cancelled);
    }

    let mut merged = SortedIndexes::new();
    for batch in batches.into_iter().flatten() {
        merged.merge(batch);
    }
    info!(
        "indexed {} CDXJ line(s), {} page(s)",
        merged.cdx_len(),
        merged.page_count()
    );
    Ok(merged)
}

/// Scan one WARC file into a local sorted batch.
fn scan_file(path: &Path, detect_pages: bool, cancel: &CancelToken) -> PackResult<SortedIndexes> {
    let malformed = |source: Box<dyn std::error::Error + Send + Sync>| PackError::MalformedWarc {
        path: path.to_owned(),
        source,
    };

    let file = File::open(path).map_err(|e| malformed(Box::new(e)))?;
    let mut input = BufReader::new(file);
    let compression =
        Compression::detect(&mut input).map_err(|e| malformed(Box::new(e)))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut reader = RecordReader::new(input, compression);
    let mut batch = SortedIndexes::new();
    let mut candidates: Vec<PageCandidate> = Vec::new();
    let mut methods = RequestMethods::default();
    let mut records = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(PackError::Cancelled);
        }

        let mut record = match reader.next_record() {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(e) => return Err(malformed(Box::new(e))),
        };
        records += 1;

        let warc_type = record
            .header
            .warc_type()
            .unwrap_or("")
            .to_ascii_lowercase();
        match warc_type.as_str() {
            "response" | "revisit" => {
                let is_revisit = warc_type == "revisit";
                let target_uri = record.header.target_uri().map(str::to_owned);
                let date = record.header.warc_date_parsed();
                // Bracket-stripped so it matches WARC-Concurrent-To values
                // from paired request records.
                let record_id = record.header.field_uri("WARC-Record-ID").map(str::to_owned);
                let concurrent_to = record.header.field_uri("WARC-Concurrent-To").map(str::to_owned);
                let header_digest = record.header.payload_digest().map(str::to_owned);
                let record_content_type = record.header.content_type().map(str::to_owned);

                let is_http = record_content_type
                    .as_deref()
                    .is_some_and(|ct| ct.starts_with("application/http"));
                let head = if is_http {
                    http::read_response_head(&mut record).map_err(|e| malformed(Box::new(e)))?
                } else {
                    None
                };
                let status = head.as_ref().map(|h| h.status).unwrap_or(0);
                let body_mime = head.as_ref().and_then(|h| h.content_type.clone());

                let page_worthy = !is_revisit
                    && detect_pages
                    && pages::qualifies(status, body_mime.as_deref(), None);
                let need_digest = header_digest.is_none();

                // One pass over the entity body feeds both the fallback
                // digest and the title scan, chunk by chunk off the reader's
                // own buffer.
                let mut digester = PayloadDigester::new();
                let mut title_buf: Vec<u8> = Vec::new();
                loop {
                    let taken = {
                        let buf = record.fill_buf().map_err(|e| malformed(Box::new(e)))?;
                        if buf.is_empty() {
                            break;
                        }
                        if need_digest {
                            digester.update(buf);
                        }
                        if page_worthy && title_buf.len() < TITLE_SCAN_LIMIT {
                            let room = TITLE_SCAN_LIMIT - title_buf.len();
                            title_buf.extend_from_slice(&buf[..buf.len().min(room)]);
                        }
                        buf.len()
                    };
                    record.consume(taken);
                }

                let offset = record.member_offset();
                let length = record.finish().map_err(|e| malformed(Box::new(e)))?;

                let (target_uri, date) = match (target_uri, date) {
                    (Some(uri), Some(date)) => (uri, date),
                    _ => {
                        warn!(
                            "{}: record {} lacks target URI or date, not indexed",
                            filename,
                            record_id.as_deref().unwrap_or("<missing>")
                        );
                        continue;
                    }
                };

                let mime = if is_revisit {
                    "warc/revisit".to_owned()
                } else {
                    // Fall back to the record's own Content-Type, parameters
                    // stripped, for non-HTTP response records.
                    body_mime.clone().unwrap_or_else(|| {
                        record_content_type
                            .as_deref()
                            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_owned())
                            .unwrap_or_default()
                    })
                };
                let digest = match header_digest {
                    Some(digest) => digest,
                    None => digester.finalize(),
                };
                let meta = CdxjMeta {
                    url: target_uri.clone(),
                    mime,
                    status,
                    digest,
                    length,
                    offset,
                    filename: filename.clone(),
                };
                match cdxj_line(&target_uri, &date, &meta) {
                    Some(line) => batch.insert_cdx(line),
                    None => {
                        debug!("{}: record for {} not indexable", filename, target_uri);
                        continue;
                    }
                }

                if page_worthy {
                    candidates.push(PageCandidate {
                        page: PageInfo {
                            url: target_uri,
                            title: pages::extract_title(&title_buf),
                            ts: Some(date),
                        },
                        record_id,
                        concurrent_to,
                    });
                }
            }
            "request" if detect_pages => {
                let request_id = record.header.field_uri("WARC-Record-ID").map(str::to_owned);
                let concurrent_to = record.header.field_uri("WARC-Concurrent-To").map(str::to_owned);
                let method =
                    http::read_request_method(&mut record).map_err(|e| malformed(Box::new(e)))?;
                if let Some(method) = method {
                    methods.record(request_id.as_deref(), concurrent_to.as_deref(), method);
                }
                record.finish().map_err(|e| malformed(Box::new(e)))?;
            }
            other => {
                trace!("{}: skipping {} record", filename, other);
                record.finish().map_err(|e| malformed(Box::new(e)))?;
            }
        }
    }

    for candidate in candidates {
        match methods.resolve(&candidate) {
            Some(method) if !method.eq_ignore_ascii_case("GET") => {
                debug!(
                    "{}: {} fetched with {}, not a page",
                    filename, candidate.page.url, method
                );
            }
            _ => batch.insert_page(candidate.page),
        }
    }

    info!("{}: scanned {} record(s)", filename, records);
    Ok(batch)
}
