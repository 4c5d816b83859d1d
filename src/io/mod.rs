//! Host file access.
//!
//! The archive layer never touches the filesystem directly; it goes through
//! [`HostFs`], a narrow stat/open primitive over the backing container and
//! any scratch files. Seeking and reading happen on the returned
//! [`HostFile`]; closing is dropping it.

mod local;

pub use local::LocalFs;

use std::io::{self, Read, Seek};
use std::path::Path;
use std::time::SystemTime;

/// Metadata returned by [`HostFs::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostStat {
    /// Size of the file in bytes.
    pub size: u64,
    /// Last modification time, if the host reports one.
    pub modified: Option<SystemTime>,
    /// Whether the path names a directory.
    pub is_dir: bool,
}

/// An open, seekable host file.
pub trait HostFile: Read + Seek + Send {}

impl<T: Read + Seek + Send> HostFile for T {}

/// Trait for the generic seekable file primitive the archive layer consumes
pub trait HostFs: Send + Sync {
    /// Stat a path without opening it
    fn stat(&self, path: &Path) -> io::Result<HostStat>;

    /// Open a path for reading
    fn open(&self, path: &Path) -> io::Result<Box<dyn HostFile>>;
}
