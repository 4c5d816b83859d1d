//! Error types for archive-backed filesystem operations.
//!
//! Every fallible operation in the library returns [`Result<T>`]. The
//! variants of [`Error`] fall into four groups:
//!
//! | Group | Variants | Effect |
//! |-------|----------|--------|
//! | Host I/O | [`Io`][Error::Io] | fatal to the current operation |
//! | Format | [`InvalidFormat`][Error::InvalidFormat], [`CorruptHeader`][Error::CorruptHeader], [`EocdNotFound`][Error::EocdNotFound] | scan aborts, nothing is cached |
//! | Policy | [`Encrypted`][Error::Encrypted], [`UnsupportedMethod`][Error::UnsupportedMethod], [`PathTraversal`][Error::PathTraversal] | entry is not openable |
//! | Decode | [`Decode`][Error::Decode], [`CrcMismatch`][Error::CrcMismatch] | only the affected session fails |

use std::io;

/// Errors produced while indexing, streaming or listing archives.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error from the host file primitive.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The container is not a ZIP archive, or a signature is garbled.
    #[error("Invalid ZIP format: {0}")]
    InvalidFormat(String),

    /// A header is truncated or points outside the container.
    #[error("Corrupt header at offset {offset:#x}: {reason}")]
    CorruptHeader {
        /// Byte offset of the offending record.
        offset: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// No End-Of-Central-Directory record was found in the search window.
    #[error("End of central directory record not found")]
    EocdNotFound,

    /// The entry is encrypted (general-purpose bit 0 or 6).
    #[error("Entry '{name}' is encrypted")]
    Encrypted {
        /// Archive-internal name of the entry.
        name: String,
    },

    /// The entry uses a compression method other than stored or deflate.
    #[error("Entry '{name}' uses unsupported compression method {method}")]
    UnsupportedMethod {
        /// Archive-internal name of the entry.
        name: String,
        /// Raw method code from the central directory.
        method: u16,
    },

    /// A path contains a parent-traversal segment.
    #[error("Path '{path}' escapes its root")]
    PathTraversal {
        /// The offending path.
        path: String,
    },

    /// The addressed entry does not exist in the archive.
    #[error("No entry '{path}' in archive")]
    NotFound {
        /// The inner path that was requested.
        path: String,
    },

    /// The inflate engine failed; the session that hit this is unusable.
    #[error("Failed to decode entry '{name}': {reason}")]
    Decode {
        /// Archive-internal name of the entry.
        name: String,
        /// Engine or stream failure description.
        reason: String,
    },

    /// Extracted bytes do not match the recorded CRC-32.
    #[error("CRC mismatch for '{name}': expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        /// Archive-internal name of the entry.
        name: String,
        /// CRC-32 from the central directory.
        expected: u32,
        /// CRC-32 of the bytes actually produced.
        actual: u32,
    },

    /// An archive URL could not be parsed.
    #[error("Invalid archive URL '{0}'")]
    InvalidUrl(String),
}

impl Error {
    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        Self::CorruptHeader {
            offset,
            reason: reason.into(),
        }
    }

    /// Whether this error means the container bytes are not a usable archive.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidFormat(_) | Self::CorruptHeader { .. } | Self::EocdNotFound
        )
    }

    /// Whether this error is a deliberate refusal rather than corruption.
    pub fn is_policy_rejection(&self) -> bool {
        matches!(
            self,
            Self::Encrypted { .. } | Self::UnsupportedMethod { .. } | Self::PathTraversal { .. }
        )
    }

    /// Whether this error came from decoding entry data.
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::CrcMismatch { .. })
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::NotFound { .. } => io::Error::new(io::ErrorKind::NotFound, err),
            Error::InvalidUrl(_) => io::Error::new(io::ErrorKind::InvalidInput, err),
            Error::Encrypted { .. }
            | Error::UnsupportedMethod { .. }
            | Error::PathTraversal { .. } => io::Error::new(io::ErrorKind::Unsupported, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_disjoint() {
        let format = Error::EocdNotFound;
        let policy = Error::Encrypted { name: "a".into() };
        let decode = Error::Decode {
            name: "a".into(),
            reason: "bad".into(),
        };

        assert!(format.is_format_error() && !format.is_policy_rejection());
        assert!(policy.is_policy_rejection() && !policy.is_format_error());
        assert!(decode.is_decode_error() && !decode.is_policy_rejection());
    }

    #[test]
    fn io_conversion_keeps_kind() {
        let err: io::Error = Error::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "eof")).into();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let err: io::Error = Error::NotFound { path: "x".into() }.into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        let err: io::Error = Error::corrupt(4, "short").into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
