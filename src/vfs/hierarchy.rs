//! Flat-to-hierarchy reconstruction.
//!
//! Archives store a flat list of `/`-separated names; directories often
//! have no entry of their own. [`reconstruct_level`] turns such a list into
//! the children of one directory. It is pure: the same entries and URL
//! always give the same listing, and it can run concurrently for any number
//! of directories over one shared entry list.

use std::collections::HashSet;

use crate::zip::{CompressionMethod, ZipEntry};

use super::url::ArchiveUrl;

/// Anything with a `/`-separated path inside an archive
pub trait ArchiveMember {
    fn member_path(&self) -> &str;
}

impl ArchiveMember for ZipEntry {
    fn member_path(&self) -> &str {
        &self.file_name
    }
}

/// What a reconstructed child is
#[derive(Debug)]
pub enum ChildKind<'a, E> {
    /// A directory, explicit or implied by deeper entries
    Directory,
    /// A leaf; the entry carries size and method metadata
    File(&'a E),
}

/// One child of the listed directory, before conversion
#[derive(Debug)]
pub struct Child<'a, E> {
    /// Single path segment naming the child
    pub name: &'a str,
    /// Container URL plus accumulated segments and the request's options
    pub url: ArchiveUrl,
    pub kind: ChildKind<'a, E>,
    /// First entry that produced this child
    pub source: &'a E,
}

impl<E> Child<'_, E> {
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, ChildKind::Directory)
    }
}

/// Entries created by macOS archivers that shadow real files
pub fn is_shadow_artifact(path: &str) -> bool {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    if segments.clone().next() == Some("__MACOSX") {
        return true;
    }
    segments.any(|s| s.starts_with("._") || s == ".DS_Store")
}

/// Produce the children of `dir` from a flat entry list.
///
/// Entries outside `dir`, the entry naming `dir` itself and shadow
/// artifacts are skipped. Several entries collapsing onto one child
/// directory yield it once, at the position of the first. Leaf files are
/// passed through in entry order.
pub fn reconstruct_level<'a, E, T, F>(entries: &'a [E], dir: &ArchiveUrl, mut convert: F) -> Vec<T>
where
    E: ArchiveMember,
    F: FnMut(Child<'a, E>) -> T,
{
    let request: Vec<&str> = dir.segments().collect();
    let depth = request.len();
    let mut seen_dirs: HashSet<&'a str> = HashSet::new();
    let mut items = Vec::new();

    for entry in entries {
        let raw = entry.member_path();
        if is_shadow_artifact(raw) {
            continue;
        }

        let segments: Vec<&'a str> = raw.split('/').filter(|s| !s.is_empty()).collect();
        // The requested directory itself, or something above or beside it
        if segments.len() <= depth || segments[..depth] != request[..] {
            continue;
        }

        let name = segments[depth];
        let is_dir = segments.len() > depth + 1 || raw.ends_with('/');
        if is_dir && !seen_dirs.insert(name) {
            continue;
        }

        let kind = if is_dir {
            ChildKind::Directory
        } else {
            ChildKind::File(entry)
        };
        items.push(convert(Child {
            name,
            url: dir.join(name),
            kind,
            source: entry,
        }));
    }

    items
}

/// Default listing item handed to directory-listing callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingItem {
    pub label: String,
    pub url: ArchiveUrl,
    pub is_dir: bool,
    /// Uncompressed size; 0 for directories
    pub size: u64,
    pub compressed_size: u64,
    /// Lets callers choose between streamed decompression and a raw copy
    pub method: Option<CompressionMethod>,
    /// Raw DOS (date, time) of the entry
    pub dos_time: Option<(u16, u16)>,
}

impl From<Child<'_, ZipEntry>> for ListingItem {
    fn from(child: Child<'_, ZipEntry>) -> Self {
        match child.kind {
            ChildKind::Directory => Self {
                label: child.name.to_string(),
                url: child.url,
                is_dir: true,
                size: 0,
                compressed_size: 0,
                method: None,
                dos_time: None,
            },
            ChildKind::File(entry) => Self {
                label: child.name.to_string(),
                url: child.url,
                is_dir: false,
                size: entry.uncompressed_size,
                compressed_size: entry.compressed_size,
                method: Some(entry.compression_method),
                dos_time: Some((entry.last_mod_date, entry.last_mod_time)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl ArchiveMember for &str {
        fn member_path(&self) -> &str {
            self
        }
    }

    fn level(entries: &[&str], inner: &str) -> Vec<(String, bool)> {
        let dir = ArchiveUrl::new("/c.zip").with_inner(inner);
        reconstruct_level(entries, &dir, |c| (c.name.to_string(), c.is_dir()))
    }

    fn pairs(expected: &[(&str, bool)]) -> Vec<(String, bool)> {
        expected.iter().map(|(n, d)| (n.to_string(), *d)).collect()
    }

    #[test]
    fn root_and_one_level_down() {
        let entries = ["a/b.txt", "a/c/d.txt", "e.txt"];
        assert_eq!(level(&entries, ""), pairs(&[("a", true), ("e.txt", false)]));
        assert_eq!(level(&entries, "a"), pairs(&[("b.txt", false), ("c", true)]));
        assert_eq!(level(&entries, "a/c"), pairs(&[("d.txt", false)]));
        assert!(level(&entries, "e.txt").is_empty());
        assert!(level(&entries, "missing").is_empty());
    }

    #[test]
    fn explicit_directories_coalesce() {
        let entries = ["docs/", "docs/a", "docs/b/", "docs/b/c", "empty/"];
        assert_eq!(level(&entries, ""), pairs(&[("docs", true), ("empty", true)]));
        assert_eq!(level(&entries, "docs"), pairs(&[("a", false), ("b", true)]));
        assert!(level(&entries, "empty").is_empty());
    }

    #[test]
    fn similar_prefixes_do_not_leak() {
        let entries = ["ab/x", "a/y"];
        assert_eq!(level(&entries, "a"), pairs(&[("y", false)]));
    }

    #[test]
    fn shadow_artifacts_are_hidden() {
        let entries = ["__MACOSX/a/._b", "a/._b", "a/b", "a/.DS_Store"];
        assert_eq!(level(&entries, ""), pairs(&[("a", true)]));
        assert_eq!(level(&entries, "a"), pairs(&[("b", false)]));
    }

    #[test]
    fn child_urls_keep_container_and_options() {
        let entries = ["a/b.txt"];
        let dir = ArchiveUrl::new("/c.zip").with_inner("a").with_options("cache=no");
        let urls = reconstruct_level(&entries[..], &dir, |c| c.url);
        assert_eq!(urls, [ArchiveUrl::new("/c.zip").with_inner("a/b.txt").with_options("cache=no")]);
    }
}
