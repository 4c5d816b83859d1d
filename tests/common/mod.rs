//! Shared test utilities for integration tests.
//!
//! [`ZipBuilder`] writes small archives byte by byte so tests control every
//! header field, including the odd ones real archivers produce (data
//! descriptors, mismatched extra fields, foreign leading markers).
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::DeflateEncoder;

pub const METHOD_STORED: u16 = 0;
pub const METHOD_DEFLATE: u16 = 8;
pub const METHOD_BZIP2: u16 = 12;

/// 2024-03-15
pub const DOS_DATE: u16 = (44 << 9) | (3 << 5) | 15;
/// 13:45:30
pub const DOS_TIME: u16 = (13 << 11) | (45 << 5) | 15;

/// The reference text used by the seek tests
pub fn about_text() -> Vec<u8> {
    fs::read(Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/about.txt"))
        .expect("fixture about.txt")
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("deflate into memory");
    encoder.finish().expect("finish deflate")
}

/// One entry as it will be written
#[derive(Debug, Clone)]
pub struct EntrySpec {
    pub name: Vec<u8>,
    pub data: Vec<u8>,
    pub method: u16,
    pub flags: u16,
    /// Zero the local sizes and append a signed data descriptor
    pub data_descriptor: bool,
    /// Also zero the sizes in the central record
    pub zero_central_sizes: bool,
    pub local_extra: Vec<u8>,
    pub central_extra: Vec<u8>,
    /// Saturate the central sizes and offset and carry them in a 0x0001 extra
    pub zip64_extra: bool,
    /// Size declared in the 0x0001 extra instead of the real one
    pub zip64_declared_size: Option<u64>,
}

impl EntrySpec {
    pub fn new(name: &str, data: &[u8], method: u16) -> Self {
        Self {
            name: name.as_bytes().to_vec(),
            data: data.to_vec(),
            method,
            flags: 0,
            data_descriptor: false,
            zero_central_sizes: false,
            local_extra: Vec::new(),
            central_extra: Vec::new(),
            zip64_extra: false,
            zip64_declared_size: None,
        }
    }

    pub fn with_descriptor(mut self, zero_central_sizes: bool) -> Self {
        self.flags |= 0x0008;
        self.data_descriptor = true;
        self.zero_central_sizes = zero_central_sizes;
        self
    }

    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_local_extra(mut self, extra: &[u8]) -> Self {
        self.local_extra = extra.to_vec();
        self
    }

    pub fn with_central_extra(mut self, extra: &[u8]) -> Self {
        self.central_extra = extra.to_vec();
        self
    }

    pub fn with_raw_name(mut self, name: &[u8]) -> Self {
        self.name = name.to_vec();
        self
    }

    pub fn with_zip64_extra(mut self) -> Self {
        self.zip64_extra = true;
        self
    }

    /// ZIP64 extra declaring `size` for both sizes, whatever the data is
    pub fn with_zip64_size(mut self, size: u64) -> Self {
        self.zip64_extra = true;
        self.zip64_declared_size = Some(size);
        self
    }

    fn payload(&self) -> Vec<u8> {
        match self.method {
            METHOD_DEFLATE => deflate(&self.data),
            _ => self.data.clone(),
        }
    }
}

/// Byte-level ZIP writer for tests
#[derive(Debug, Default, Clone)]
pub struct ZipBuilder {
    leading: Vec<u8>,
    entries: Vec<EntrySpec>,
    comment: Vec<u8>,
    zip64: bool,
    saturated_disks: bool,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written before the first local header
    pub fn leading(mut self, bytes: &[u8]) -> Self {
        self.leading = bytes.to_vec();
        self
    }

    pub fn stored(self, name: &str, data: &[u8]) -> Self {
        self.entry(EntrySpec::new(name, data, METHOD_STORED))
    }

    pub fn deflated(self, name: &str, data: &[u8]) -> Self {
        self.entry(EntrySpec::new(name, data, METHOD_DEFLATE))
    }

    pub fn directory(self, name: &str) -> Self {
        self.entry(EntrySpec::new(name, b"", METHOD_STORED))
    }

    pub fn entry(mut self, spec: EntrySpec) -> Self {
        self.entries.push(spec);
        self
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    /// End with a ZIP64 end record and locator; the classic record only
    /// carries 0xFFFF / 0xFFFFFFFF markers
    pub fn zip64(mut self) -> Self {
        self.zip64 = true;
        self
    }

    /// Also set the classic disk number fields to 0xFFFF
    pub fn saturated_disks(mut self) -> Self {
        self.saturated_disks = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = self.leading.clone();
        let mut central = Vec::new();

        for spec in &self.entries {
            let payload = spec.payload();
            let crc = crc32fast::hash(&spec.data);
            let compressed = payload.len() as u32;
            let uncompressed = spec.data.len() as u32;
            let lfh_offset = out.len() as u32;

            let (local_crc, local_compressed, local_uncompressed) = if spec.data_descriptor {
                (0, 0, 0)
            } else {
                (crc, compressed, uncompressed)
            };
            out.extend_from_slice(&0x04034b50u32.to_le_bytes());
            put_u16(&mut out, 20);
            put_u16(&mut out, spec.flags);
            put_u16(&mut out, spec.method);
            put_u16(&mut out, DOS_TIME);
            put_u16(&mut out, DOS_DATE);
            put_u32(&mut out, local_crc);
            put_u32(&mut out, local_compressed);
            put_u32(&mut out, local_uncompressed);
            put_u16(&mut out, spec.name.len() as u16);
            put_u16(&mut out, spec.local_extra.len() as u16);
            out.extend_from_slice(&spec.name);
            out.extend_from_slice(&spec.local_extra);
            out.extend_from_slice(&payload);
            if spec.data_descriptor {
                put_u32(&mut out, 0x08074b50);
                put_u32(&mut out, crc);
                put_u32(&mut out, compressed);
                put_u32(&mut out, uncompressed);
            }

            let (central_compressed, central_uncompressed) = if spec.zip64_extra {
                (u32::MAX, u32::MAX)
            } else if spec.zero_central_sizes {
                (0, 0)
            } else {
                (compressed, uncompressed)
            };
            let mut central_extra = spec.central_extra.clone();
            if spec.zip64_extra {
                let declared_uncompressed = spec.zip64_declared_size.unwrap_or(uncompressed as u64);
                let declared_compressed = spec.zip64_declared_size.unwrap_or(compressed as u64);
                put_u16(&mut central_extra, 0x0001);
                put_u16(&mut central_extra, 24);
                put_u64(&mut central_extra, declared_uncompressed);
                put_u64(&mut central_extra, declared_compressed);
                put_u64(&mut central_extra, lfh_offset as u64);
            }
            central.extend_from_slice(&0x02014b50u32.to_le_bytes());
            put_u16(&mut central, 20);
            put_u16(&mut central, 20);
            put_u16(&mut central, spec.flags);
            put_u16(&mut central, spec.method);
            put_u16(&mut central, DOS_TIME);
            put_u16(&mut central, DOS_DATE);
            put_u32(&mut central, crc);
            put_u32(&mut central, central_compressed);
            put_u32(&mut central, central_uncompressed);
            put_u16(&mut central, spec.name.len() as u16);
            put_u16(&mut central, central_extra.len() as u16);
            put_u16(&mut central, 0); // comment
            put_u16(&mut central, 0); // disk
            put_u16(&mut central, 0); // internal attributes
            put_u32(&mut central, 0); // external attributes
            put_u32(&mut central, if spec.zip64_extra { u32::MAX } else { lfh_offset });
            central.extend_from_slice(&spec.name);
            central.extend_from_slice(&central_extra);
        }

        let cd_offset = out.len() as u32;
        out.extend_from_slice(&central);
        let mut end = if self.zip64 {
            let eocd64_offset = out.len() as u64;
            out.extend_from_slice(&eocd64(
                self.entries.len() as u64,
                central.len() as u64,
                cd_offset as u64,
            ));
            put_u32(&mut out, 0x07064b50);
            put_u32(&mut out, 0); // disk holding the ZIP64 end record
            put_u64(&mut out, eocd64_offset);
            put_u32(&mut out, 1); // total disks
            eocd(u16::MAX, u32::MAX, u32::MAX, self.comment.len() as u16)
        } else {
            eocd(
                self.entries.len() as u16,
                central.len() as u32,
                cd_offset,
                self.comment.len() as u16,
            )
        };
        if self.saturated_disks {
            end[4..8].copy_from_slice(&[0xFF; 4]);
        }
        out.extend_from_slice(&end);
        out.extend_from_slice(&self.comment);
        out
    }

    /// Write the archive to `dir/name` and return its path
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, self.build()).expect("write archive");
        path
    }
}

/// A bare 22-byte End of Central Directory record
pub fn eocd(entries: u16, cd_size: u32, cd_offset: u32, comment_len: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(22);
    put_u32(&mut out, 0x06054b50);
    put_u16(&mut out, 0);
    put_u16(&mut out, 0);
    put_u16(&mut out, entries);
    put_u16(&mut out, entries);
    put_u32(&mut out, cd_size);
    put_u32(&mut out, cd_offset);
    put_u16(&mut out, comment_len);
    out
}

/// A 56-byte ZIP64 End of Central Directory record for a single disk
pub fn eocd64(entries: u64, cd_size: u64, cd_offset: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(56);
    put_u32(&mut out, 0x06064b50);
    put_u64(&mut out, 44); // size of the remaining record
    put_u16(&mut out, 45);
    put_u16(&mut out, 45);
    put_u32(&mut out, 0);
    put_u32(&mut out, 0);
    put_u64(&mut out, entries);
    put_u64(&mut out, entries);
    put_u64(&mut out, cd_size);
    put_u64(&mut out, cd_offset);
    out
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}
