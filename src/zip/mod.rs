//! ZIP archive indexing and entry streaming.
//!
//! ## Architecture
//!
//! - `structures`: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - `parser`: Stateless parsing of a container into a list of entries
//! - `index`: Per-container cache of parsed entry lists, keyed by path and mtime
//! - `stream`: Seekable decode sessions over single entries
//! - `scratch`: Policy for extracting large deflate entries before streaming
//! - `extractor`: Verified extraction to writers, files and directories
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! Listing only touches the EOCD, the Central Directory and the fixed part of
//! each local header. Entry data is read lazily by streams.
//!
//! ## Supported Features
//!
//! - Standard ZIP format and ZIP64 extensions
//! - STORED (no compression) and DEFLATE methods
//! - Data descriptors, including central records with zeroed sizes
//! - UTF-8 and code page 437 entry names
//!
//! ## Limitations
//!
//! - No encryption support
//! - Split and multi-volume archives are read best-effort as one volume
//! - No BZIP2, LZMA, or other compression methods

mod charset;
mod extractor;
mod index;
mod parser;
mod scratch;
mod stream;
mod structures;

pub use charset::{canonicalize, decode_cp437, decode_name, has_parent_traversal};
pub use extractor::{ExtractOptions, ExtractSummary, Overwrite, ZipExtractor};
pub use index::{ContainerIndex, ZipIndex};
pub use parser::{ContainerKind, ZipParser};
pub use scratch::{CachePolicy, DEFAULT_CACHE_THRESHOLD, OpenOptions, materialize};
pub use stream::{EntryStream, check_openable};
pub use structures::*;
