use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};

use crate::error::{Error, Result};

use super::index::{ContainerIndex, ZipIndex};
use super::stream::EntryStream;
use super::structures::ZipEntry;

const COPY_BLOCK: usize = 64 * 1024;

/// Copy a whole entry into `writer`, checking its length and CRC-32.
pub(crate) fn copy_verified<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    entry: &ZipEntry,
) -> Result<u64> {
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; COPY_BLOCK];
    let mut written = 0u64;

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n])?;
        written += n as u64;
    }

    if written != entry.uncompressed_size {
        return Err(Error::Decode {
            name: entry.file_name.clone(),
            reason: format!(
                "produced {written} bytes, expected {}",
                entry.uncompressed_size
            ),
        });
    }
    let actual = hasher.finalize();
    if actual != entry.crc32 {
        return Err(Error::CrcMismatch {
            name: entry.file_name.clone(),
            expected: entry.crc32,
            actual,
        });
    }
    Ok(written)
}

/// What to do when an extraction target already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overwrite {
    /// Leave the existing file alone
    #[default]
    Skip,
    /// Replace it
    Always,
}

/// Options for [`ZipExtractor::extract_archive`]
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Ignore directory structure inside the archive
    pub junk_paths: bool,
    pub overwrite: Overwrite,
}

/// Totals reported by [`ZipExtractor::extract_archive`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub extracted: usize,
    pub skipped: usize,
    pub bytes: u64,
}

/// ZIP file extractor
pub struct ZipExtractor {
    index: Arc<ZipIndex>,
}

impl ZipExtractor {
    pub fn new(index: Arc<ZipIndex>) -> Self {
        Self { index }
    }

    /// List all files in the archive
    pub fn list_files(&self, container: &Path) -> Result<Arc<ContainerIndex>> {
        self.index.list(container)
    }

    /// Stream one entry to any writer, verifying it on the way
    pub fn extract_to_writer<W: Write>(
        &self,
        container: &Path,
        entry: &ZipEntry,
        writer: &mut W,
    ) -> Result<u64> {
        let mut stream = EntryStream::open(&**self.index.host(), container, entry)?;
        let written = copy_verified(&mut stream, writer, entry)?;
        stream.close();
        Ok(written)
    }

    /// Extract file to disk.
    ///
    /// Data is staged in a temporary file next to the target and renamed
    /// into place, so a failed extraction never leaves a partial file.
    pub fn extract_to_file(
        &self,
        container: &Path,
        entry: &ZipEntry,
        output_path: &Path,
    ) -> Result<u64> {
        // Create parent directories if needed
        let parent = match output_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let mut staging = tempfile::NamedTempFile::new_in(parent)?;
        let written = self.extract_to_writer(container, entry, staging.as_file_mut())?;
        staging.persist(output_path).map_err(|e| Error::Io(e.error))?;
        Ok(written)
    }

    /// Extract every file entry accepted by `filter` below `dest`.
    ///
    /// Directory entries only create directories. The first failing entry
    /// aborts the extraction.
    pub fn extract_archive<F>(
        &self,
        container: &Path,
        dest: &Path,
        options: &ExtractOptions,
        mut filter: F,
    ) -> Result<ExtractSummary>
    where
        F: FnMut(&ZipEntry) -> bool,
    {
        let index = self.index.list(container)?;
        let mut summary = ExtractSummary::default();

        for entry in index.entries() {
            if entry.is_directory() {
                if !options.junk_paths {
                    fs::create_dir_all(dest.join(&entry.file_name))?;
                }
                continue;
            }
            if !filter(entry) {
                continue;
            }

            let output_path = Self::output_path(dest, entry, options.junk_paths);
            if output_path.exists() && options.overwrite == Overwrite::Skip {
                warn!("Skipping {} (file exists)", output_path.display());
                summary.skipped += 1;
                continue;
            }

            debug!("Extracting {} to {}", entry.file_name, output_path.display());
            summary.bytes += self.extract_to_file(container, entry, &output_path)?;
            summary.extracted += 1;
        }

        Ok(summary)
    }

    /// Determine the output path of an entry below `dest`
    pub fn output_path(dest: &Path, entry: &ZipEntry, junk_paths: bool) -> PathBuf {
        let file_name = if junk_paths {
            // Junk paths: use only the base filename, ignore directory structure
            entry
                .file_name
                .rsplit('/')
                .next()
                .unwrap_or(&entry.file_name)
        } else {
            // Preserve directory structure from archive
            entry.file_name.as_str()
        };
        dest.join(file_name)
    }
}
