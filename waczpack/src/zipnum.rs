//! ZipNum shared index emission.
//!
//! The sorted CDXJ lines are cut into fixed-size shards; each shard is
//! compressed as one independent gzip member and appended to
//! `indexes/index.cdx.gz`, while a small text IDX cross-references every
//! member by offset and length so a reader can binary-search the IDX and
//! decompress only the shard it needs.

use std::io::{self, Write};

use flate2::write::GzEncoder;
use log::debug;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Number of CDXJ lines per shard.
pub const SHARD_LIMIT: usize = 3000;

/// First line of the IDX file, byte-exact.
pub const IDX_META: &str = "!meta 0 {\"format\": \"cdxj-gzip-1.0\", \"filename\": \"index.cdx.gz\"}\n";

/// Name of the compressed index the IDX lines point into.
const CDX_GZ_NAME: &str = "index.cdx.gz";

/// JSON metadata carried by one IDX line, referencing a gzip member inside
/// `index.cdx.gz`.
#[derive(Debug, Serialize)]
struct IdxMeta<'a> {
    offset: u64,
    length: u64,
    digest: String,
    filename: &'a str,
}

/// The two index files, built in memory.
#[derive(Debug, Default)]
pub struct ZipNumIndex {
    /// Concatenated gzip members, one per shard.
    pub cdx_gz: Vec<u8>,
    /// `!meta` header plus one line per shard.
    pub idx: String,
}

/// Build the two-level index from already-sorted CDXJ lines.
///
/// Lines must arrive in ascending byte order, each `\n`-terminated. An empty
/// input produces a zero-byte `cdx_gz` and an IDX holding only the `!meta`
/// header; a final partial shard is emitted like any other.
pub fn build<'a, I>(lines: I) -> io::Result<ZipNumIndex>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut index = ZipNumIndex {
        cdx_gz: Vec::new(),
        idx: String::from(IDX_META),
    };

    let mut shard: Vec<&str> = Vec::with_capacity(SHARD_LIMIT);
    let mut shards = 0usize;
    for line in lines {
        shard.push(line);
        if shard.len() == SHARD_LIMIT {
            flush_shard(&mut index, &shard)?;
            shard.clear();
            shards += 1;
        }
    }
    if !shard.is_empty() {
        flush_shard(&mut index, &shard)?;
        shards += 1;
    }

    debug!(
        "zipnum index: {} shard(s), {} compressed byte(s)",
        shards,
        index.cdx_gz.len()
    );
    Ok(index)
}

/// Compress one shard as a gzip member, append it, and add its IDX line.
fn flush_shard(index: &mut ZipNumIndex, shard: &[&str]) -> io::Result<()> {
    let offset = index.cdx_gz.len() as u64;

    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    for line in shard {
        encoder.write_all(line.as_bytes())?;
    }
    let member = encoder.finish()?;

    let digest = format!("sha256:{}", hex::encode(Sha256::digest(&member)));
    let meta = IdxMeta {
        offset,
        length: member.len() as u64,
        digest,
        filename: CDX_GZ_NAME,
    };
    index.cdx_gz.extend_from_slice(&member);

    // The IDX key is the first space-delimited token of the shard's first
    // line, i.e. its SURT.
    let first_line = shard[0];
    let key = first_line
        .split(' ')
        .next()
        .unwrap_or(first_line.trim_end());
    let json = serde_json::to_string(&meta).map_err(io::Error::other)?;
    index.idx.push_str(key);
    index.idx.push(' ');
    index.idx.push_str(&json);
    index.idx.push('\n');
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::bufread::MultiGzDecoder;

    use super::*;

    fn lines(n: usize) -> Vec<String> {
        // Zero-padded keys keep the synthetic lines presorted.
        (0..n)
            .map(|i| format!("com,example)/p{i:05} 20230222120000 {{\"status\":200}}\n"))
            .collect()
    }

    fn decode_all(gz: &[u8]) -> String {
        let mut out = String::new();
        MultiGzDecoder::new(gz)
            .read_to_string(&mut out)
            .expect("index.cdx.gz should decode");
        out
    }

    #[test]
    fn empty_input_is_meta_only() {
        let index = build(std::iter::empty()).unwrap();
        assert!(index.cdx_gz.is_empty());
        assert_eq!(index.idx, IDX_META);
    }

    #[test]
    fn single_partial_shard() {
        let lines = lines(2);
        let index = build(lines.iter().map(String::as_str)).unwrap();

        assert_eq!(index.idx.lines().count(), 2); // !meta + one shard
        assert_eq!(decode_all(&index.cdx_gz), lines.concat());

        let idx_line = index.idx.lines().nth(1).unwrap();
        assert!(idx_line.starts_with("com,example)/p00000 {"));
    }

    #[test]
    fn shard_boundary_keeps_every_line() {
        let lines = lines(SHARD_LIMIT + 1);
        let index = build(lines.iter().map(String::as_str)).unwrap();

        // Two shards: one full, one holding the single remaining line.
        assert_eq!(index.idx.lines().count(), 3);
        assert_eq!(decode_all(&index.cdx_gz), lines.concat());

        // The second shard starts where the first one ends.
        let meta_of = |line: &str| -> serde_json::Value {
            serde_json::from_str(line.splitn(2, ' ').nth(1).unwrap()).unwrap()
        };
        let first = meta_of(index.idx.lines().nth(1).unwrap());
        let second = meta_of(index.idx.lines().nth(2).unwrap());
        assert_eq!(first["offset"], 0);
        assert_eq!(second["offset"], first["length"]);
        assert_eq!(
            first["length"].as_u64().unwrap() + second["length"].as_u64().unwrap(),
            index.cdx_gz.len() as u64
        );
        assert_eq!(second["filename"], "index.cdx.gz");

        // The second shard's key is the 3001st line's SURT.
        assert!(index
            .idx
            .lines()
            .nth(2)
            .unwrap()
            .starts_with("com,example)/p03000 "));
    }

    #[test]
    fn each_idx_slice_is_a_valid_member_with_digest() {
        let lines = lines(SHARD_LIMIT + 5);
        let index = build(lines.iter().map(String::as_str)).unwrap();

        for idx_line in index.idx.lines().skip(1) {
            let meta: serde_json::Value =
                serde_json::from_str(idx_line.splitn(2, ' ').nth(1).unwrap()).unwrap();
            let offset = meta["offset"].as_u64().unwrap() as usize;
            let length = meta["length"].as_u64().unwrap() as usize;
            let member = &index.cdx_gz[offset..offset + length];

            let mut decoded = String::new();
            flate2::bufread::GzDecoder::new(member)
                .read_to_string(&mut decoded)
                .expect("member should decode in isolation");
            assert!(!decoded.is_empty());
            assert!(decoded.ends_with('\n'));

            use sha2::{Digest, Sha256};
            let expected = format!("sha256:{}", hex::encode(Sha256::digest(member)));
            assert_eq!(meta["digest"], serde_json::Value::String(expected));
        }
    }
}
