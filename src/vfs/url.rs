//! Addressing of entries inside archives.
//!
//! An archive URL composes the host path of the container with an inner
//! path and free-form query options:
//!
//! ```text
//! zip://%2Fmedia%2Fmovies.zip/extras/trailer.mkv?cache=no
//! ```
//!
//! The container path is percent-encoded into the authority so it can never
//! be confused with the inner path. Options are carried verbatim onto every
//! URL derived with [`ArchiveUrl::join`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::zip::OpenOptions;

/// Scheme marking "interpret as living inside an archive"
pub const SCHEME: &str = "zip";

/// Address of a path inside an archive
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveUrl {
    container: PathBuf,
    inner: String,
    options: String,
}

impl ArchiveUrl {
    /// The root of `container`
    pub fn new(container: impl Into<PathBuf>) -> Self {
        Self {
            container: container.into(),
            inner: String::new(),
            options: String::new(),
        }
    }

    /// Replace the inner path; separators are normalized
    pub fn with_inner(mut self, inner: &str) -> Self {
        self.inner = normalize_inner(inner);
        self
    }

    /// Replace the query options (without the leading `?`)
    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = options.into();
        self
    }

    pub fn container(&self) -> &Path {
        &self.container
    }

    /// Inner path, `/`-separated, empty for the archive root
    pub fn inner(&self) -> &str {
        &self.inner
    }

    pub fn options(&self) -> &str {
        &self.options
    }

    pub fn open_options(&self) -> OpenOptions {
        OpenOptions::from_query(&self.options)
    }

    pub fn is_root(&self) -> bool {
        self.inner.is_empty()
    }

    /// Segments of the inner path
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.inner.split('/').filter(|s| !s.is_empty())
    }

    /// A child of this URL; container and options are kept
    pub fn join(&self, segment: &str) -> Self {
        let inner = if self.inner.is_empty() {
            normalize_inner(segment)
        } else {
            normalize_inner(&format!("{}/{}", self.inner, segment))
        };
        Self {
            container: self.container.clone(),
            inner,
            options: self.options.clone(),
        }
    }
}

/// `\` becomes `/`; empty and `.` segments are dropped
fn normalize_inner(inner: &str) -> String {
    inner
        .replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn percent_encode(text: &str, keep_slash: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for &b in text.as_bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') || (keep_slash && b == b'/') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn percent_decode(text: &str) -> Result<String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| Error::InvalidUrl(text.to_string()))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| Error::InvalidUrl(text.to_string()))
}

impl fmt::Display for ArchiveUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SCHEME}://{}/{}",
            percent_encode(&self.container.to_string_lossy(), false),
            percent_encode(&self.inner, true)
        )?;
        if !self.options.is_empty() {
            write!(f, "?{}", self.options)?;
        }
        Ok(())
    }
}

impl FromStr for ArchiveUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix(SCHEME)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(|| Error::InvalidUrl(s.to_string()))?;
        let (location, options) = rest.split_once('?').unwrap_or((rest, ""));
        let (host, inner) = location.split_once('/').unwrap_or((location, ""));
        if host.is_empty() {
            return Err(Error::InvalidUrl(s.to_string()));
        }

        Ok(Self::new(percent_decode(host)?)
            .with_inner(&percent_decode(inner)?)
            .with_options(options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse() {
        let url = ArchiveUrl::new("/media/My Files/a.zip")
            .with_inner("docs/read me?.txt")
            .with_options("cache=no");
        let text = url.to_string();
        assert_eq!(
            text,
            "zip://%2Fmedia%2FMy%20Files%2Fa.zip/docs/read%20me%3F.txt?cache=no"
        );
        assert_eq!(text.parse::<ArchiveUrl>().unwrap(), url);
    }

    #[test]
    fn join_keeps_options() {
        let root = ArchiveUrl::new("/a.zip").with_options("flatten&x=1");
        let child = root.join("dir").join("file.txt");
        assert_eq!(child.inner(), "dir/file.txt");
        assert_eq!(child.options(), "flatten&x=1");
        assert_eq!(child.container(), Path::new("/a.zip"));
        assert_eq!(child.segments().collect::<Vec<_>>(), ["dir", "file.txt"]);
    }

    #[test]
    fn inner_paths_are_normalized() {
        let url = ArchiveUrl::new("/a.zip").with_inner("\\dir\\\\sub/./f");
        assert_eq!(url.inner(), "dir/sub/f");
        assert!(ArchiveUrl::new("/a.zip").with_inner("/").is_root());
    }

    #[test]
    fn rejects_malformed() {
        assert!("http://x/y".parse::<ArchiveUrl>().is_err());
        assert!("zip:///inner".parse::<ArchiveUrl>().is_err());
        assert!("zip://%zz/inner".parse::<ArchiveUrl>().is_err());
        assert!("zip://%2Fa.zip".parse::<ArchiveUrl>().unwrap().is_root());
    }
}
