//! Scratch-file extraction policy.
//!
//! Backward seeks over deflate data replay the stream from the start, so a
//! large entry that is seeked around (a video inside an archive, say)
//! degrades quadratically. Entries above a threshold are therefore
//! extracted once to a scratch directory and served from there. Whether
//! that happens is decided by an explicit [`CachePolicy`] and can be turned
//! off per request with [`OpenOptions`].
//!
//! Copies are named after a CRC-32 of their key, so they survive restarts
//! and rebuilds. Nothing removes them automatically; a copy of an older
//! container version simply stops being looked up.
//! [`CachePolicy::clear_scratch`] reclaims the directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;

use crate::error::{Error, Result};
use crate::io::HostFs;

use super::extractor::copy_verified;
use super::stream::EntryStream;
use super::structures::{CompressionMethod, ZipEntry};

/// Default size above which deflate entries are extracted to scratch
pub const DEFAULT_CACHE_THRESHOLD: u64 = 4 * 1024 * 1024;

/// When and where large deflate entries are extracted before streaming.
///
/// # Example
///
/// ```rust
/// use zipfs::CachePolicy;
///
/// let policy = CachePolicy::new()
///     .threshold(16 * 1024 * 1024)
///     .scratch_dir(std::env::temp_dir().join("my-cache"));
/// assert!(policy.enabled);
/// ```
#[derive(Debug, Clone)]
pub struct CachePolicy {
    /// Master switch for scratch extraction. Default: true.
    pub enabled: bool,

    /// Entries strictly larger than this many uncompressed bytes are
    /// extracted. Default: 4 MiB.
    pub threshold: u64,

    /// Directory receiving extracted copies. Default: `<tmp>/zipfs-cache`.
    pub scratch_dir: PathBuf,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: DEFAULT_CACHE_THRESHOLD,
            scratch_dir: std::env::temp_dir().join("zipfs-cache"),
        }
    }
}

impl CachePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that always inflates live
    pub fn disabled() -> Self {
        Self::default().enabled(false)
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn threshold(mut self, bytes: u64) -> Self {
        self.threshold = bytes;
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Whether opening `entry` with `options` goes through a scratch copy
    pub fn should_extract(&self, entry: &ZipEntry, options: &OpenOptions) -> bool {
        self.enabled
            && !options.no_cache
            && entry.compression_method == CompressionMethod::Deflate
            && entry.uncompressed_size > self.threshold
    }

    /// Stable scratch location for one entry of one container version
    pub fn scratch_path(
        &self,
        container: &Path,
        modified: Option<SystemTime>,
        entry: &ZipEntry,
    ) -> PathBuf {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(container.to_string_lossy().as_bytes());
        hasher.update(&[0]);
        match modified.and_then(|t| t.duration_since(UNIX_EPOCH).ok()) {
            Some(since) => {
                hasher.update(&[1]);
                hasher.update(&since.as_nanos().to_le_bytes());
            }
            None => hasher.update(&[0]),
        }
        hasher.update(entry.file_name.as_bytes());
        hasher.update(&entry.lfh_offset.to_le_bytes());

        let base: String = entry
            .file_name
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.scratch_dir
            .join(format!("{:08x}-{}", hasher.finalize(), base))
    }

    /// Remove every scratch copy from the scratch directory.
    ///
    /// Other files in the directory are left alone. A missing directory
    /// holds nothing. Returns the number of copies removed.
    pub fn clear_scratch(&self) -> Result<usize> {
        let listing = match fs::read_dir(&self.scratch_dir) {
            Ok(listing) => listing,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for dirent in listing {
            let dirent = dirent?;
            if dirent.file_type()?.is_file() && is_scratch_name(&dirent.file_name().to_string_lossy()) {
                fs::remove_file(dirent.path())?;
                removed += 1;
            }
        }
        debug!(
            "Removed {removed} scratch copies from {}",
            self.scratch_dir.display()
        );
        Ok(removed)
    }
}

/// `<8 hex digits>-<base name>`, as produced by [`CachePolicy::scratch_path`]
fn is_scratch_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 9 && bytes[8] == b'-' && bytes[..8].iter().all(u8::is_ascii_hexdigit)
}

/// Per-request options carried in the query part of an archive URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// Skip scratch extraction even for large entries
    pub no_cache: bool,
}

impl OpenOptions {
    /// Parse `key=value&flag` style options; unknown keys are ignored.
    ///
    /// `cache=no`, `cache=0`, `cache=false`, `cache=off` and a bare
    /// `nocache` disable scratch extraction.
    pub fn from_query(query: &str) -> Self {
        let mut options = Self::default();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match (key, value) {
                ("nocache", _) => options.no_cache = true,
                ("cache", "no" | "0" | "false" | "off") => options.no_cache = true,
                _ => {}
            }
        }
        options
    }
}

/// Make sure a verified scratch copy of `entry` exists and return its path.
///
/// An existing copy of the right size is reused; otherwise the entry is
/// inflated into a temporary file in the scratch directory, checked against
/// its CRC-32 and moved into place.
pub fn materialize(
    host: &dyn HostFs,
    policy: &CachePolicy,
    container: &Path,
    modified: Option<SystemTime>,
    entry: &ZipEntry,
) -> Result<PathBuf> {
    let path = policy.scratch_path(container, modified, entry);
    if let Ok(stat) = host.stat(&path) {
        if !stat.is_dir && stat.size == entry.uncompressed_size {
            debug!("Reusing scratch copy {}", path.display());
            return Ok(path);
        }
    }

    fs::create_dir_all(&policy.scratch_dir)?;
    debug!(
        "Extracting {} ({} bytes) to scratch {}",
        entry.file_name,
        entry.uncompressed_size,
        path.display()
    );

    let mut staging = tempfile::NamedTempFile::new_in(&policy.scratch_dir)?;
    let mut stream = EntryStream::open(host, container, entry)?;
    copy_verified(&mut stream, staging.as_file_mut(), entry)?;
    stream.close();
    staging.persist(&path).map_err(|e| Error::Io(e.error))?;
    Ok(path)
}
