//! # zipfs
//!
//! An archive-backed virtual filesystem layer for ZIP files.
//!
//! This library indexes the central directory of a ZIP container, exposes
//! every entry as a seekable byte stream (inflating DEFLATE entries on the
//! fly or passing stored entries through), and rebuilds one level of a
//! directory listing for any path inside the archive.
//!
//! ## Features
//!
//! - Central directory index cached per container and invalidated by mtime
//! - Backward EOCD scan that tolerates 64 KiB comments and forged signatures
//! - Seekable entry streams for STORED and DEFLATE entries
//! - Scratch-file extraction of large entries, under an explicit policy
//! - ZIP64, data descriptors and code page 437 names
//! - Entries with `..` segments are never surfaced
//!
//! ## Example
//!
//! ```no_run
//! use std::io::{Read, Seek, SeekFrom};
//! use zipfs::{ArchiveFs, ArchiveUrl};
//!
//! fn main() -> zipfs::Result<()> {
//!     let fs = ArchiveFs::local();
//!     let url: ArchiveUrl = "zip://%2Fmedia%2Fdocs.zip/about.txt".parse()?;
//!
//!     let mut stream = fs.open(&url)?;
//!     stream.seek(SeekFrom::Start(100))?;
//!     let mut buf = [0u8; 20];
//!     stream.read_exact(&mut buf)?;
//!     println!("{} of {} bytes", String::from_utf8_lossy(&buf), stream.length());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod vfs;
pub mod zip;

pub use cli::Cli;
pub use error::{Error, Result};
pub use io::{HostFile, HostFs, HostStat, LocalFs};
pub use vfs::{ArchiveFs, ArchiveUrl, EntryStat, ListingItem};
pub use zip::{CachePolicy, EntryStream, OpenOptions, ZipEntry, ZipIndex};
