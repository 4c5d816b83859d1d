//! Low-level ZIP archive parser.
//!
//! This module turns the bytes of a container into a list of
//! [`ZipEntry`] records. It is a pure function of the container
//! contents: it owns no cache and keeps no state between scans.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Check the leading magic so obviously foreign files fail fast
//! 2. Find the End of Central Directory (EOCD) by scanning backward
//! 3. If ZIP64, read the ZIP64 EOCD for large file support
//! 4. Walk the Central Directory until exactly its declared size is consumed
//! 5. Read each Local File Header to learn where the entry data begins
//!
//! Any short read or inconsistent record aborts the scan; a partial entry
//! list is never returned.

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::{Decompress, FlushDecompress, Status};
use std::io::{self, Cursor, Read, Seek, SeekFrom};

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::io::HostFile;

use super::charset;
use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Block size used when scanning backward for the EOCD signature
const EOCD_SCAN_BLOCK: usize = 4096;

/// Blocks overlap by this much so a signature split across two reads is seen
const SIGNATURE_OVERLAP: usize = 3;

/// Compressed bytes fed per step when measuring a descriptor-terminated stream
const MEASURE_CHUNK: usize = 64 * 1024;

/// How the container announced itself in its first four bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// Starts with a local file header
    Standard,
    /// Starts with an End of Central Directory record
    Empty,
    /// Starts with a spanning or split marker; parsed as a single volume
    Split,
}

/// Low-level ZIP file parser.
///
/// Borrows an open host file for the duration of one scan.
///
/// ## Example
///
/// ```ignore
/// let mut file = fs.open(path)?;
/// let entries = ZipParser::new(&mut *file, stat.size).list_files()?;
/// ```
pub struct ZipParser<'a> {
    /// The underlying data source
    file: &'a mut dyn HostFile,
    /// Total size of the archive in bytes
    size: u64,
    /// Set when the archive is only supported best-effort
    degraded: bool,
}

impl<'a> ZipParser<'a> {
    /// Create a new parser for an open container of `size` bytes.
    pub fn new(file: &'a mut dyn HostFile, size: u64) -> Self {
        Self {
            file,
            size,
            degraded: false,
        }
    }

    /// Read exactly `buf.len()` bytes at `offset`.
    ///
    /// A short read is reported as a corrupt header at that offset.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if offset
            .checked_add(buf.len() as u64)
            .is_none_or(|end| end > self.size)
        {
            return Err(Error::corrupt(offset, "record extends past end of container"));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::corrupt(offset, "unexpected end of container")
            } else {
                Error::Io(e)
            }
        })
    }

    /// Check the leading signature of the container.
    pub fn check_magic(&mut self) -> Result<ContainerKind> {
        if self.size < EndOfCentralDirectory::SIZE as u64 {
            return Err(Error::InvalidFormat(format!(
                "container is {} bytes, smaller than an end of central directory record",
                self.size
            )));
        }

        let mut magic = [0u8; 4];
        self.read_at(0, &mut magic)?;
        match u32::from_le_bytes(magic) {
            LFH_SIGNATURE => Ok(ContainerKind::Standard),
            EndOfCentralDirectory::SIGNATURE => Ok(ContainerKind::Empty),
            DATA_DESCRIPTOR_SIGNATURE | SPLIT_MARKER_SIGNATURE => {
                warn!("Split or spanned archive marker found; reading it as a single volume");
                self.degraded = true;
                Ok(ContainerKind::Split)
            }
            other => Err(Error::InvalidFormat(format!(
                "unrecognized signature {other:#010x}"
            ))),
        }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// The trailing comment may be up to 65535 bytes, so the record can sit
    /// anywhere in the last `65535 + 22` bytes. That window is read backward
    /// in overlapping blocks. A candidate whose comment length reaches
    /// exactly to end-of-file is accepted immediately; otherwise the
    /// candidate nearest end-of-file whose comment still fits wins.
    ///
    /// # Returns
    ///
    /// A tuple of (EOCD record, offset of EOCD in file).
    pub fn find_eocd(&mut self) -> Result<(EndOfCentralDirectory, u64)> {
        let eocd_size = EndOfCentralDirectory::SIZE as u64;
        if self.size < eocd_size {
            return Err(Error::EocdNotFound);
        }

        // Optimization: First try the simple case where there's no comment.
        let tail = self.size - eocd_size;
        let mut buf = [0u8; EndOfCentralDirectory::SIZE];
        self.read_at(tail, &mut buf)?;
        if buf[0..4] == EndOfCentralDirectory::MAGIC && buf[20..22] == [0, 0] {
            return Ok((EndOfCentralDirectory::from_bytes(&buf, tail)?, tail));
        }

        // Candidate positions lie in [window_start, tail]
        let window_start = self.size.saturating_sub(MAX_COMMENT_SIZE + eocd_size);
        let mut block_end = tail + 4;
        let mut fallback: Option<(EndOfCentralDirectory, u64)> = None;
        let mut block = vec![0u8; EOCD_SCAN_BLOCK];

        loop {
            let block_start = block_end
                .saturating_sub(EOCD_SCAN_BLOCK as u64)
                .max(window_start);
            let len = (block_end - block_start) as usize;
            self.read_at(block_start, &mut block[..len])?;

            for i in (0..len.saturating_sub(3)).rev() {
                if block[i..i + 4] != EndOfCentralDirectory::MAGIC {
                    continue;
                }
                let pos = block_start + i as u64;
                self.read_at(pos, &mut buf)?;
                let eocd = EndOfCentralDirectory::from_bytes(&buf, pos)?;
                let record_end = pos + eocd_size + eocd.comment_len as u64;

                if record_end == self.size {
                    return Ok((eocd, pos));
                }
                if record_end < self.size && fallback.is_none() {
                    fallback = Some((eocd, pos));
                }
            }

            if block_start == window_start {
                break;
            }
            block_end = block_start + SIGNATURE_OVERLAP as u64;
        }

        match fallback {
            Some((eocd, pos)) => {
                warn!(
                    "End of central directory at {pos:#x} is followed by {} unaccounted bytes",
                    self.size - pos - eocd_size - eocd.comment_len as u64
                );
                Ok((eocd, pos))
            }
            None => Err(Error::EocdNotFound),
        }
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// Called when the regular EOCD indicates ZIP64 extensions are needed
    /// (fields set to 0xFFFF or 0xFFFFFFFF).
    pub fn read_zip64_eocd(&mut self, eocd_offset: u64) -> Result<Zip64EOCD> {
        // The ZIP64 EOCD Locator is located immediately before the regular EOCD
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .ok_or_else(|| Error::corrupt(eocd_offset, "no room for ZIP64 locator"))?;
        let mut locator_buf = [0u8; Zip64EOCDLocator::SIZE];
        self.read_at(locator_offset, &mut locator_buf)?;
        let locator = Zip64EOCDLocator::from_bytes(&locator_buf, locator_offset)?;

        // Read the actual ZIP64 EOCD from the offset specified in the locator
        let mut eocd64_buf = [0u8; Zip64EOCD::MIN_SIZE];
        self.read_at(locator.eocd64_offset, &mut eocd64_buf)?;
        Zip64EOCD::from_bytes(&eocd64_buf, locator.eocd64_offset)
    }

    /// List all files in the ZIP archive.
    ///
    /// Entries whose names contain a `..` segment or collapse to an empty
    /// name are dropped before the local headers are consulted.
    pub fn list_files(&mut self) -> Result<Vec<ZipEntry>> {
        if self.check_magic()? == ContainerKind::Empty {
            debug!("Container holds an empty archive");
        }

        let (eocd, eocd_offset) = self.find_eocd()?;

        // Get Central Directory info, using ZIP64 if needed. ZIP64 writers
        // may saturate the classic disk fields, so disks come from the same record.
        let (disk_number, disk_with_cd, cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset)?;
            (
                eocd64.disk_number,
                eocd64.disk_with_cd,
                eocd64.cd_offset,
                eocd64.cd_size,
                eocd64.total_entries,
            )
        } else {
            (
                eocd.disk_number as u32,
                eocd.disk_with_cd as u32,
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };
        if disk_number != 0 || disk_with_cd != 0 {
            warn!(
                "Multi-volume archive (disk {disk_number} of central directory {disk_with_cd}); reading this volume only"
            );
            self.degraded = true;
        }

        if cd_offset
            .checked_add(cd_size)
            .is_none_or(|end| end > eocd_offset)
        {
            return Err(Error::corrupt(
                eocd_offset,
                format!("central directory ({cd_size} bytes at {cd_offset:#x}) exceeds file bounds"),
            ));
        }

        // Read the entire Central Directory in one request
        let mut cd_data = vec![0u8; cd_size as usize];
        self.read_at(cd_offset, &mut cd_data)?;

        let mut entries = Vec::new();
        let mut cursor = Cursor::new(cd_data.as_slice());
        while cursor.position() < cd_size {
            let record_offset = cd_offset + cursor.position();
            let entry = Self::parse_cdfh(&mut cursor, record_offset)?;
            entries.push(entry);
        }

        if entries.len() as u64 != total_entries {
            warn!(
                "Central directory holds {} entries but end record declares {}",
                entries.len(),
                total_entries
            );
        }

        entries.retain(|entry| {
            if entry.file_name.is_empty() {
                debug!("Dropping entry whose name has no segments");
                return false;
            }
            let unsafe_name = charset::has_parent_traversal(&entry.file_name);
            if unsafe_name {
                warn!("Dropping entry with parent traversal: {}", entry.file_name);
            }
            !unsafe_name
        });

        for entry in &mut entries {
            self.resolve_data_offset(entry)?;
        }

        Ok(entries)
    }

    /// Parse a Central Directory File Header from a cursor.
    ///
    /// The cursor must be positioned at the start of a CDFH; on success it is
    /// left just past the entry's comment. The returned entry still has its
    /// data offset unset.
    fn parse_cdfh(cursor: &mut Cursor<&[u8]>, record_offset: u64) -> Result<ZipEntry> {
        let data = *cursor.get_ref();
        let start = cursor.position() as usize;
        if data.len() - start < CDFH_MIN_SIZE {
            return Err(Error::corrupt(record_offset, "truncated central directory header"));
        }

        // Read and verify the signature (PK\x01\x02)
        let signature = cursor.read_u32::<LittleEndian>()?;
        if signature != CDFH_SIGNATURE {
            return Err(Error::corrupt(
                record_offset,
                format!("bad central directory signature {signature:#010x}"),
            ));
        }

        // Read fixed-size header fields
        let version_made_by = cursor.read_u16::<LittleEndian>()?;
        let version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;
        let comment_length = cursor.read_u16::<LittleEndian>()?;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let _external_attrs = cursor.read_u32::<LittleEndian>()?;
        let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

        let name_start = start + CDFH_MIN_SIZE;
        let extra_start = name_start + file_name_length as usize;
        let comment_start = extra_start + extra_field_length as usize;
        let record_end = comment_start + comment_length as usize;
        if record_end > data.len() {
            return Err(Error::corrupt(
                record_offset,
                "central directory header overruns the directory",
            ));
        }

        // Decode the name once; the entry only ever carries the canonical form
        let raw_name = &data[name_start..extra_start];
        let file_name = charset::canonicalize(&charset::decode_name(raw_name, flags & FLAG_UTF8 != 0));

        // ZIP64 extended information lives in extra field 0x0001.
        // Fields are present only if the corresponding header field is 0xFFFFFFFF
        let mut extra = Cursor::new(&data[extra_start..comment_start]);
        let extra_end = extra_field_length as u64;
        while extra.position() + 4 <= extra_end {
            let header_id = extra.read_u16::<LittleEndian>()?;
            let field_size = extra.read_u16::<LittleEndian>()? as u64;
            let field_end = (extra.position() + field_size).min(extra_end);

            if header_id == 0x0001 {
                if uncompressed_size == 0xFFFFFFFF && extra.position() + 8 <= field_end {
                    uncompressed_size = extra.read_u64::<LittleEndian>()?;
                }
                if compressed_size == 0xFFFFFFFF && extra.position() + 8 <= field_end {
                    compressed_size = extra.read_u64::<LittleEndian>()?;
                }
                if lfh_offset == 0xFFFFFFFF && extra.position() + 8 <= field_end {
                    lfh_offset = extra.read_u64::<LittleEndian>()?;
                }
            }
            extra.set_position(field_end);
        }

        // Skip over the file comment (we don't use it)
        cursor.set_position(record_end as u64);

        Ok(ZipEntry {
            signature,
            version_made_by,
            version_needed,
            flags,
            compression_method: CompressionMethod::from_u16(compression_method),
            last_mod_time,
            last_mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name_length,
            extra_field_length,
            comment_length,
            lfh_offset,
            offset: 0,
            file_name,
        })
    }

    /// Fill in the data offset of an entry from its Local File Header.
    ///
    /// The local extra field frequently differs in length from the central
    /// one, so it is always read from the local header.
    fn resolve_data_offset(&mut self, entry: &mut ZipEntry) -> Result<()> {
        let mut lfh_buf = [0u8; LFH_SIZE];
        self.read_at(entry.lfh_offset, &mut lfh_buf)?;
        let lfh = LocalFileHeader::from_bytes(&lfh_buf, entry.lfh_offset)?;

        // Data starts after: LFH (30 bytes) + filename + local extra field
        entry.offset = entry.lfh_offset
            + LFH_SIZE as u64
            + entry.file_name_length as u64
            + lfh.extra_field_length as u64;

        if entry.has_data_descriptor()
            && entry.compressed_size == 0
            && entry.uncompressed_size == 0
            && entry.compression_method == CompressionMethod::Deflate
        {
            self.recover_from_descriptor(entry)?;
        }

        if entry.data_end() > self.size {
            if self.degraded {
                warn!(
                    "Entry {} extends past this volume; its data will be unreadable",
                    entry.file_name
                );
            } else {
                return Err(Error::corrupt(
                    entry.lfh_offset,
                    format!("data of '{}' extends past end of container", entry.file_name),
                ));
            }
        }

        Ok(())
    }

    /// Recover sizes and CRC of a descriptor-terminated entry whose central
    /// record was written with zeroed sizes.
    ///
    /// The deflate stream is self-terminating, so it is inflated once to
    /// find where the compressed bytes end; the descriptor follows there.
    fn recover_from_descriptor(&mut self, entry: &mut ZipEntry) -> Result<()> {
        let (consumed, produced) = self.measure_deflate_stream(entry)?;
        let descriptor_offset = entry.offset + consumed;
        let available = (self.size - descriptor_offset).min(DataDescriptor::MAX_SIZE as u64);
        let mut buf = [0u8; DataDescriptor::MAX_SIZE];
        self.read_at(descriptor_offset, &mut buf[..available as usize])?;
        let descriptor = DataDescriptor::from_bytes(&buf[..available as usize], descriptor_offset)?;

        if descriptor.compressed_size != consumed || descriptor.uncompressed_size != produced {
            warn!(
                "Data descriptor of {} disagrees with its stream ({}/{} vs {}/{}); trusting the stream",
                entry.file_name,
                descriptor.compressed_size,
                descriptor.uncompressed_size,
                consumed,
                produced
            );
        } else {
            debug!("Recovered sizes of {} from its data descriptor", entry.file_name);
        }

        entry.crc32 = descriptor.crc32;
        entry.compressed_size = consumed;
        entry.uncompressed_size = produced;
        Ok(())
    }

    /// Inflate a raw deflate stream starting at the entry's data offset.
    ///
    /// # Returns
    ///
    /// (compressed bytes consumed, uncompressed bytes produced)
    fn measure_deflate_stream(&mut self, entry: &ZipEntry) -> Result<(u64, u64)> {
        let mut inflater = Decompress::new(false);
        let mut input = vec![0u8; MEASURE_CHUNK];
        let mut output = vec![0u8; MEASURE_CHUNK];
        let mut next = entry.offset;

        loop {
            let len = (self.size.saturating_sub(next)).min(MEASURE_CHUNK as u64) as usize;
            if len == 0 {
                return Err(Error::corrupt(
                    entry.lfh_offset,
                    format!("deflate stream of '{}' never ends", entry.file_name),
                ));
            }
            self.read_at(next, &mut input[..len])?;

            let mut start = 0;
            while start < len {
                let before = inflater.total_in();
                let status = inflater
                    .decompress(&input[start..len], &mut output, FlushDecompress::None)
                    .map_err(|e| Error::Decode {
                        name: entry.file_name.clone(),
                        reason: e.to_string(),
                    })?;
                start += (inflater.total_in() - before) as usize;
                if status == Status::StreamEnd {
                    return Ok((inflater.total_in(), inflater.total_out()));
                }
                if status == Status::BufError {
                    break;
                }
            }
            next = entry.offset + inflater.total_in();
        }
    }
}
