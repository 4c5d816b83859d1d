//! Central directory index with a per-container cache.
//!
//! [`ZipIndex`] is an explicitly constructed registry: callers own it and
//! share it (usually behind an `Arc`) between listing and open requests.
//! Published entry lists are immutable and handed out as
//! `Arc<ContainerIndex>`, so readers never hold the registry lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::io::{HostFs, HostStat};

use super::parser::ZipParser;
use super::structures::ZipEntry;

/// Entry table of one container, valid for one modification time
#[derive(Debug)]
pub struct ContainerIndex {
    entries: Vec<ZipEntry>,
    modified: Option<SystemTime>,
    size: u64,
}

impl ContainerIndex {
    pub fn new(entries: Vec<ZipEntry>, modified: Option<SystemTime>, size: u64) -> Self {
        Self {
            entries,
            modified,
            size,
        }
    }

    /// Entries in central directory order
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Host modification time recorded at scan time
    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    fn is_current(&self, stat: &HostStat) -> bool {
        self.modified == stat.modified && self.size == stat.size
    }

    /// Find the entry with exactly this canonical name
    pub fn find(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|e| e.file_name == name)
    }

    /// Find an explicit directory entry (`name/`)
    pub fn find_dir(&self, name: &str) -> Option<&ZipEntry> {
        self.entries
            .iter()
            .find(|e| e.is_directory() && e.file_name.trim_end_matches('/') == name)
    }

    /// Whether any entry lives below `name`, explicit directory or not
    pub fn has_children(&self, name: &str) -> bool {
        if name.is_empty() {
            return !self.entries.is_empty();
        }
        self.entries.iter().any(|e| {
            e.file_name.len() > name.len() + 1
                && e.file_name.starts_with(name)
                && e.file_name.as_bytes()[name.len()] == b'/'
        })
    }
}

/// Process-wide registry of scanned containers.
///
/// Every lookup, insert and invalidation goes through one mutex. Scans run
/// outside the lock, so a slow container never blocks lookups of others.
pub struct ZipIndex {
    fs: Arc<dyn HostFs>,
    cache: Mutex<HashMap<PathBuf, Arc<ContainerIndex>>>,
}

impl ZipIndex {
    pub fn new(fs: Arc<dyn HostFs>) -> Self {
        Self {
            fs,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The host primitive this index reads containers through
    pub fn host(&self) -> &Arc<dyn HostFs> {
        &self.fs
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<ContainerIndex>>> {
        self.cache.lock().unwrap_or_else(|poisoned| {
            warn!("Index cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Return the entry table of a container, scanning it if the cached
    /// table is missing or stale.
    ///
    /// A failed scan leaves any previous table for the path removed and
    /// publishes nothing. If another scan or an invalidation changed the
    /// cached table while this call was scanning, the cache is left as that
    /// call left it.
    pub fn list(&self, container: &Path) -> Result<Arc<ContainerIndex>> {
        let stat = self.fs.stat(container)?;
        if stat.is_dir {
            return Err(Error::InvalidFormat(format!(
                "{} is a directory, not an archive",
                container.display()
            )));
        }

        let observed = self.cache().get(container).cloned();
        if let Some(index) = &observed {
            if index.is_current(&stat) {
                debug!("Index cache hit for {}", container.display());
                return Ok(Arc::clone(index));
            }
            debug!("Index for {} is stale, rescanning", container.display());
        }

        let scanned = self.scan(container, &stat);

        // Publish only over the table this call saw; a concurrent scan or
        // invalidate that got there first wins.
        let mut cache = self.cache();
        let unchanged = match (cache.get(container), &observed) {
            (Some(current), Some(seen)) => Arc::ptr_eq(current, seen),
            (None, None) => true,
            _ => false,
        };
        if !unchanged {
            debug!(
                "Index for {} changed during the scan, not publishing",
                container.display()
            );
        }
        match scanned {
            Ok(index) => {
                let index = Arc::new(index);
                if unchanged {
                    cache.insert(container.to_path_buf(), Arc::clone(&index));
                }
                Ok(index)
            }
            Err(e) => {
                if unchanged {
                    cache.remove(container);
                }
                Err(e)
            }
        }
    }

    fn scan(&self, container: &Path, stat: &HostStat) -> Result<ContainerIndex> {
        debug!("Scanning central directory of {}", container.display());
        let mut file = self.fs.open(container)?;
        let entries = ZipParser::new(&mut *file, stat.size).list_files()?;
        debug!("Indexed {} entries in {}", entries.len(), container.display());
        Ok(ContainerIndex::new(entries, stat.modified, stat.size))
    }

    /// Drop the cached table of a container changed out-of-band.
    ///
    /// Returns whether a table was cached.
    pub fn invalidate(&self, container: &Path) -> bool {
        self.cache().remove(container).is_some()
    }

    /// Drop every cached table
    pub fn clear(&self) {
        self.cache().clear();
    }

    /// Number of containers currently cached
    pub fn cached_containers(&self) -> usize {
        self.cache().len()
    }
}
