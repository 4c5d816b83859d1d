//! Filesystem-shaped access to archives.
//!
//! [`ArchiveFs`] exposes the two primitives a virtual-filesystem dispatcher
//! plugs in for the `zip://` scheme: a file primitive (open, stat, exists)
//! and a directory primitive (one listing level per call).
//!
//! ## Example
//!
//! ```no_run
//! use std::io::Read;
//! use zipfs::{ArchiveFs, ArchiveUrl};
//!
//! fn main() -> zipfs::Result<()> {
//!     let fs = ArchiveFs::local();
//!     let root = ArchiveUrl::new("/media/docs.zip");
//!     for item in fs.list_dir(&root)? {
//!         println!("{} {}", if item.is_dir { "d" } else { "-" }, item.label);
//!     }
//!
//!     let mut text = String::new();
//!     fs.open(&root.join("README.txt"))?.read_to_string(&mut text)?;
//!     Ok(())
//! }
//! ```

pub mod hierarchy;
pub mod url;

use std::io;
use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::error::{Error, Result};
use crate::io::{HostFs, LocalFs};
use crate::zip::{
    CachePolicy, CompressionMethod, EntryStream, ZipEntry, ZipExtractor, ZipIndex, check_openable,
    has_parent_traversal, materialize,
};

pub use hierarchy::{ArchiveMember, Child, ChildKind, ListingItem, reconstruct_level};
pub use url::{ArchiveUrl, SCHEME};

/// Result of [`ArchiveFs::stat`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStat {
    pub is_dir: bool,
    /// Uncompressed size; 0 for directories
    pub size: u64,
    pub compressed_size: u64,
    pub method: Option<CompressionMethod>,
    pub crc32: Option<u32>,
    /// Raw DOS (date, time) of the entry, if it has one
    pub dos_time: Option<(u16, u16)>,
}

impl EntryStat {
    fn directory() -> Self {
        Self {
            is_dir: true,
            size: 0,
            compressed_size: 0,
            method: None,
            crc32: None,
            dos_time: None,
        }
    }
}

/// File and directory primitives over archives on a host filesystem
pub struct ArchiveFs {
    index: Arc<ZipIndex>,
    policy: CachePolicy,
}

impl ArchiveFs {
    pub fn new(host: Arc<dyn HostFs>) -> Self {
        Self::with_index(Arc::new(ZipIndex::new(host)), CachePolicy::default())
    }

    /// Share an existing index registry, e.g. between several front ends
    pub fn with_index(index: Arc<ZipIndex>, policy: CachePolicy) -> Self {
        Self { index, policy }
    }

    /// Archives on the local filesystem
    pub fn local() -> Self {
        Self::new(Arc::new(LocalFs::new()))
    }

    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn index(&self) -> &Arc<ZipIndex> {
        &self.index
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn extractor(&self) -> ZipExtractor {
        ZipExtractor::new(Arc::clone(&self.index))
    }

    fn check_inner(url: &ArchiveUrl) -> Result<()> {
        if has_parent_traversal(url.inner()) {
            return Err(Error::PathTraversal {
                path: url.inner().to_string(),
            });
        }
        Ok(())
    }

    /// List one directory level with the default item conversion
    pub fn list_dir(&self, url: &ArchiveUrl) -> Result<Vec<ListingItem>> {
        self.list_dir_with(url, |child| ListingItem::from(child))
    }

    /// List one directory level, converting each child with `convert`.
    ///
    /// Fails with [`Error::NotFound`] if the inner path is neither the
    /// root nor a directory of the archive.
    pub fn list_dir_with<T, F>(&self, url: &ArchiveUrl, convert: F) -> Result<Vec<T>>
    where
        F: for<'a> FnMut(Child<'a, ZipEntry>) -> T,
    {
        Self::check_inner(url)?;
        let index = self.index.list(url.container())?;
        if !url.is_root() && index.find_dir(url.inner()).is_none() && !index.has_children(url.inner()) {
            return Err(Error::NotFound {
                path: url.inner().to_string(),
            });
        }
        Ok(reconstruct_level(index.entries(), url, convert))
    }

    /// Open an entry for reading.
    ///
    /// The archive root and directories, explicit or implied, fail with an
    /// [`io::ErrorKind::IsADirectory`] error. Large deflate entries are
    /// served from a scratch copy when the cache policy and the URL options
    /// allow it.
    pub fn open(&self, url: &ArchiveUrl) -> Result<EntryStream> {
        Self::check_inner(url)?;
        let index = self.index.list(url.container())?;
        let Some(entry) = index.find(url.inner()) else {
            let is_dir = url.is_root()
                || index.find_dir(url.inner()).is_some()
                || index.has_children(url.inner());
            if is_dir {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::IsADirectory,
                    format!("'{}' is a directory", url.inner()),
                )));
            }
            return Err(Error::NotFound {
                path: url.inner().to_string(),
            });
        };
        check_openable(entry)?;

        let host = &**self.index.host();
        if self.policy.should_extract(entry, &url.open_options()) {
            let scratch = materialize(host, &self.policy, url.container(), index.modified(), entry)?;
            return EntryStream::open_scratch(host, &scratch, entry);
        }
        EntryStream::open(host, url.container(), entry)
    }

    /// Stat a path inside an archive without opening it.
    ///
    /// The archive root and any path with entries below it are directories.
    pub fn stat(&self, url: &ArchiveUrl) -> Result<EntryStat> {
        Self::check_inner(url)?;
        let index = self.index.list(url.container())?;
        if url.is_root() {
            return Ok(EntryStat::directory());
        }

        if let Some(entry) = index.find(url.inner()) {
            return Ok(EntryStat {
                is_dir: entry.is_directory(),
                size: entry.uncompressed_size,
                compressed_size: entry.compressed_size,
                method: Some(entry.compression_method),
                crc32: Some(entry.crc32),
                dos_time: Some((entry.last_mod_date, entry.last_mod_time)),
            });
        }
        if let Some(entry) = index.find_dir(url.inner()) {
            return Ok(EntryStat {
                dos_time: Some((entry.last_mod_date, entry.last_mod_time)),
                ..EntryStat::directory()
            });
        }
        if index.has_children(url.inner()) {
            return Ok(EntryStat::directory());
        }

        Err(Error::NotFound {
            path: url.inner().to_string(),
        })
    }

    /// Whether a path inside an archive exists
    pub fn exists(&self, url: &ArchiveUrl) -> bool {
        match self.stat(url) {
            Ok(_) => true,
            Err(e) => {
                debug!("{url} does not exist: {e}");
                false
            }
        }
    }

    /// Forget the cached entry table of a container
    pub fn invalidate(&self, container: &Path) -> bool {
        self.index.invalidate(container)
    }
}
