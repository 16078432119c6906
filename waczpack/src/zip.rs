//! Streaming ZIP container writer.
//!
//! WACZ bundles are plain PKZIP archives whose payloads are already
//! compressed where it matters, so every entry is written with the STORE
//! method. Entries append in order; each one streams through a SHA-256 and
//! CRC-32 tee so callers get resource metadata without a second read. The
//! CRC lands in the local header by back-patching through `Seek` once the
//! entry's bytes are on disk, and ZIP64 records are emitted whenever sizes,
//! offsets, or entry counts outgrow the classic field widths.

use std::collections::HashSet;
use std::io::{self, Read, Seek, SeekFrom, Write};

use flate2::Crc;
use log::trace;
use sha2::{Digest, Sha256};
use thiserror::Error;

const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
const EOCD_SIG: u32 = 0x0605_4b50;
const EOCD64_SIG: u32 = 0x0606_4b50;
const EOCD64_LOCATOR_SIG: u32 = 0x0706_4b50;
const ZIP64_EXTRA_ID: u16 = 0x0001;

const VERSION_STORE: u16 = 20;
const VERSION_ZIP64: u16 = 45;

// All entries share a fixed DOS timestamp (1980-01-01 00:00:00) so output
// bytes depend only on content.
const DOS_TIME: u16 = 0;
const DOS_DATE: u16 = 0x21;

const U16_MAX: usize = 0xFFFF;
const U32_MAX: u64 = 0xFFFF_FFFF;

const COPY_BUF_LEN: usize = 64 * 1024;

/// Errors from the ZIP writer.
#[derive(Debug, Error)]
pub enum ZipError {
    /// Two entries may not share a name.
    #[error("duplicate ZIP entry name: {0}")]
    DuplicateEntry(String),
    /// A streamed entry did not produce the byte count promised up front.
    #[error("entry {name}: expected {expected} bytes, wrote {actual}")]
    LengthMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// What the writer learned about an appended entry.
#[derive(Debug, Clone)]
pub struct EntrySummary {
    /// Entry path inside the archive.
    pub path: String,
    /// Uncompressed (= stored) byte count.
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the entry content.
    pub sha256: String,
}

struct CentralEntry {
    name: String,
    crc: u32,
    size: u64,
    header_offset: u64,
}

/// An append-only, STORE-method ZIP writer.
pub struct ZipWriter<W: Write + Seek> {
    sink: W,
    entries: Vec<CentralEntry>,
    names: HashSet<String>,
    offset: u64,
}

impl<W: Write + Seek> ZipWriter<W> {
    pub fn new(sink: W) -> Self {
        ZipWriter {
            sink,
            entries: Vec::new(),
            names: HashSet::new(),
            offset: 0,
        }
    }

    /// Append an in-memory entry.
    pub fn append(&mut self, name: &str, data: &[u8]) -> Result<EntrySummary, ZipError> {
        self.append_stream(name, data.len() as u64, &mut &data[..])
    }

    /// Append an entry by streaming `expected_len` bytes from a reader.
    ///
    /// The length must be known up front (it is written into the local
    /// header); a reader that yields a different number of bytes is an
    /// error, since the archive would be corrupt.
    pub fn append_stream<R: Read>(
        &mut self,
        name: &str,
        expected_len: u64,
        reader: &mut R,
    ) -> Result<EntrySummary, ZipError> {
        if !self.names.insert(name.to_owned()) {
            return Err(ZipError::DuplicateEntry(name.to_owned()));
        }

        let header_offset = self.offset;
        let zip64 = expected_len >= U32_MAX;
        trace!("zip entry {} at offset {}", name, header_offset);

        // Local file header, CRC patched after the data is written.
        self.w32(LOCAL_HEADER_SIG)?;
        self.w16(if zip64 { VERSION_ZIP64 } else { VERSION_STORE })?;
        self.w16(0)?; // general purpose flags
        self.w16(0)?; // method: STORE
        self.w16(DOS_TIME)?;
        self.w16(DOS_DATE)?;
        self.w32(0)?; // crc placeholder
        let masked = if zip64 { U32_MAX } else { expected_len };
        self.w32(masked as u32)?; // compressed size
        self.w32(masked as u32)?; // uncompressed size
        self.w16(name.len() as u16)?;
        self.w16(if zip64 { 20 } else { 0 })?; // extra length
        self.write_bytes(name.as_bytes())?;
        if zip64 {
            self.w16(ZIP64_EXTRA_ID)?;
            self.w16(16)?;
            self.w64(expected_len)?; // uncompressed
            self.w64(expected_len)?; // compressed
        }

        // Stream the data through the CRC and SHA-256 tees.
        let mut crc = Crc::new();
        let mut sha = Sha256::new();
        let mut written = 0u64;
        let mut buf = vec![0u8; COPY_BUF_LEN];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            crc.update(&buf[..n]);
            sha.update(&buf[..n]);
            self.write_bytes(&buf[..n])?;
            written += n as u64;
        }
        if written != expected_len {
            return Err(ZipError::LengthMismatch {
                name: name.to_owned(),
                expected: expected_len,
                actual: written,
            });
        }

        // Back-patch the CRC now that it is known.
        self.sink.flush()?;
        self.sink.seek(SeekFrom::Start(header_offset + 14))?;
        self.sink.write_all(&crc.sum().to_le_bytes())?;
        self.sink.seek(SeekFrom::Start(self.offset))?;

        self.entries.push(CentralEntry {
            name: name.to_owned(),
            crc: crc.sum(),
            size: expected_len,
            header_offset,
        });

        Ok(EntrySummary {
            path: name.to_owned(),
            bytes: expected_len,
            sha256: hex::encode(sha.finalize()),
        })
    }

    /// Write the central directory and end-of-directory records, returning
    /// the underlying sink.
    pub fn finish(mut self) -> Result<W, ZipError> {
        let central_offset = self.offset;

        for i in 0..self.entries.len() {
            let entry = &self.entries[i];
            let (name, crc, size, header_offset) = (
                entry.name.clone(),
                entry.crc,
                entry.size,
                entry.header_offset,
            );
            let size_64 = size >= U32_MAX;
            let offset_64 = header_offset >= U32_MAX;
            let mut extra_len: u16 = 0;
            if size_64 {
                extra_len += 16;
            }
            if offset_64 {
                extra_len += 8;
            }
            if extra_len > 0 {
                extra_len += 4; // extra field header
            }

            self.w32(CENTRAL_HEADER_SIG)?;
            self.w16(VERSION_ZIP64)?; // version made by
            self.w16(if size_64 || offset_64 {
                VERSION_ZIP64
            } else {
                VERSION_STORE
            })?;
            self.w16(0)?; // flags
            self.w16(0)?; // method: STORE
            self.w16(DOS_TIME)?;
            self.w16(DOS_DATE)?;
            self.w32(crc)?;
            let masked_size = if size_64 { U32_MAX } else { size };
            self.w32(masked_size as u32)?;
            self.w32(masked_size as u32)?;
            self.w16(name.len() as u16)?;
            self.w16(extra_len)?;
            self.w16(0)?; // comment length
            self.w16(0)?; // disk number start
            self.w16(0)?; // internal attributes
            self.w32(0)?; // external attributes
            let masked_offset = if offset_64 { U32_MAX } else { header_offset };
            self.w32(masked_offset as u32)?;
            self.write_bytes(name.as_bytes())?;
            if extra_len > 0 {
                self.w16(ZIP64_EXTRA_ID)?;
                self.w16(extra_len - 4)?;
                if size_64 {
                    self.w64(size)?; // uncompressed
                    self.w64(size)?; // compressed
                }
                if offset_64 {
                    self.w64(header_offset)?;
                }
            }
        }

        let central_size = self.offset - central_offset;
        let needs_eocd64 = self.entries.len() > U16_MAX
            || central_offset >= U32_MAX
            || central_size >= U32_MAX
            || self
                .entries
                .iter()
                .any(|e| e.size >= U32_MAX || e.header_offset >= U32_MAX);

        if needs_eocd64 {
            let eocd64_offset = self.offset;
            self.w32(EOCD64_SIG)?;
            self.w64(44)?; // size of the remainder of this record
            self.w16(VERSION_ZIP64)?;
            self.w16(VERSION_ZIP64)?;
            self.w32(0)?; // this disk
            self.w32(0)?; // central directory disk
            self.w64(self.entries.len() as u64)?;
            self.w64(self.entries.len() as u64)?;
            self.w64(central_size)?;
            self.w64(central_offset)?;

            self.w32(EOCD64_LOCATOR_SIG)?;
            self.w32(0)?; // disk holding the EOCD64
            self.w64(eocd64_offset)?;
            self.w32(1)?; // total disks
        }

        self.w32(EOCD_SIG)?;
        self.w16(0)?; // this disk
        self.w16(0)?; // central directory disk
        let masked_count = self.entries.len().min(U16_MAX) as u16;
        self.w16(masked_count)?;
        self.w16(masked_count)?;
        self.w32(central_size.min(U32_MAX) as u32)?;
        self.w32(central_offset.min(U32_MAX) as u32)?;
        self.w16(0)?; // comment length

        self.sink.flush()?;
        Ok(self.sink)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.sink.write_all(bytes)?;
        self.offset += bytes.len() as u64;
        Ok(())
    }

    fn w16(&mut self, v: u16) -> io::Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    fn w32(&mut self, v: u32) -> io::Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    fn w64(&mut self, v: u64) -> io::Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use sha2::{Digest, Sha256};

    use super::*;

    fn le16(bytes: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([bytes[at], bytes[at + 1]])
    }

    fn le32(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    #[test]
    fn store_entries_have_correct_local_headers() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.append("dir/a.txt", b"hello zip").unwrap();
        writer.append("b.bin", &[0u8; 16]).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        // First local header sits at offset 0.
        assert_eq!(le32(&bytes, 0), LOCAL_HEADER_SIG);
        assert_eq!(le16(&bytes, 8), 0, "method must be STORE");
        let crc = le32(&bytes, 14);
        assert_ne!(crc, 0, "crc should have been back-patched");
        assert_eq!(le32(&bytes, 18), 9, "compressed size");
        assert_eq!(le32(&bytes, 22), 9, "uncompressed size");
        assert_eq!(le16(&bytes, 26) as usize, "dir/a.txt".len());
        assert_eq!(&bytes[30..39], b"dir/a.txt");
        assert_eq!(&bytes[39..48], b"hello zip");

        {
            let mut crc_check = Crc::new();
            crc_check.update(b"hello zip");
            assert_eq!(crc, crc_check.sum());
        }

        // EOCD trails the file and counts both entries.
        let eocd_at = bytes.len() - 22;
        assert_eq!(le32(&bytes, eocd_at), EOCD_SIG);
        assert_eq!(le16(&bytes, eocd_at + 10), 2, "total entries");
        let cd_offset = le32(&bytes, eocd_at + 16) as usize;
        assert_eq!(le32(&bytes, cd_offset), CENTRAL_HEADER_SIG);
    }

    #[test]
    fn summary_reports_sha256_and_length() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let summary = writer.append("a", b"content").unwrap();
        assert_eq!(summary.path, "a");
        assert_eq!(summary.bytes, 7);
        assert_eq!(summary.sha256, hex::encode(Sha256::digest(b"content")));
    }

    #[test]
    fn duplicate_names_are_fatal() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.append("same", b"1").unwrap();
        match writer.append("same", b"2") {
            Err(ZipError::DuplicateEntry(name)) => assert_eq!(name, "same"),
            other => panic!("expected DuplicateEntry, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn short_streams_are_rejected() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let mut reader: &[u8] = b"only-9b";
        match writer.append_stream("s", 32, &mut reader) {
            Err(ZipError::LengthMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 32);
                assert_eq!(actual, 7);
            }
            other => panic!("expected LengthMismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn entries_are_byte_identical_when_read_back() {
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.append("big", &payload).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let name_len = le16(&bytes, 26) as usize;
        let extra_len = le16(&bytes, 28) as usize;
        let data_at = 30 + name_len + extra_len;
        assert_eq!(&bytes[data_at..data_at + payload.len()], &payload[..]);
    }
}
