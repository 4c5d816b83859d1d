//! Seekable byte stream over one archive entry.
//!
//! An [`EntryStream`] is a decode session: it owns its own handle on the
//! container, its inflate engine and its cursors. Sessions are never shared;
//! two readers of the same entry open two sessions.
//!
//! Seeking a stored entry is offset arithmetic. Deflate data has no random
//! access, so a forward seek inflates and discards up to the target, and a
//! backward seek restarts the engine at the start of the entry and replays
//! forward. Repeated backward seeks on a large entry are therefore
//! expensive; see [`CachePolicy`](super::CachePolicy) for the scratch-file
//! fallback that avoids them.

use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use flate2::{Decompress, FlushDecompress, Status};
use log::{debug, trace};

use crate::error::{Error, Result};
use crate::io::{HostFile, HostFs};

use super::structures::{CompressionMethod, ZipEntry};

/// Compressed bytes pulled from the container per refill
const INPUT_CHUNK: usize = 64 * 1024;

/// Block size of the read-and-discard loop used by forward seeks
const DISCARD_BLOCK: usize = 128 * 1024;

/// Reject entries that can never be opened.
///
/// Encrypted entries and methods other than stored/deflate are refused up
/// front so a session is never created for them.
pub fn check_openable(entry: &ZipEntry) -> Result<()> {
    if entry.is_encrypted() {
        return Err(Error::Encrypted {
            name: entry.file_name.clone(),
        });
    }
    if let CompressionMethod::Unknown(method) = entry.compression_method {
        return Err(Error::UnsupportedMethod {
            name: entry.file_name.clone(),
            method,
        });
    }
    Ok(())
}

enum Backend {
    /// Pass-through reads against the container
    Stored(Box<dyn HostFile>),
    /// Live inflate of the compressed bytes
    Deflate(Box<InflateState>),
    /// Fully extracted copy of the entry
    Scratch(Box<dyn HostFile>),
    Closed,
}

struct InflateState {
    file: Box<dyn HostFile>,
    inflater: Decompress,
    /// Absolute container offset of the next compressed byte to fetch
    compressed_position: u64,
    input: Vec<u8>,
    input_start: usize,
    input_end: usize,
    needs_restart: bool,
    /// Set once the engine fails; the session cannot recover from it
    failed: Option<String>,
}

impl InflateState {
    fn new(file: Box<dyn HostFile>, entry: &ZipEntry) -> Self {
        Self {
            file,
            inflater: Decompress::new(false),
            compressed_position: entry.offset,
            input: vec![0u8; INPUT_CHUNK],
            input_start: 0,
            input_end: 0,
            needs_restart: true,
            failed: None,
        }
    }

    fn restart(&mut self, entry: &ZipEntry) -> io::Result<()> {
        self.inflater.reset(false);
        self.file.seek(SeekFrom::Start(entry.offset))?;
        self.compressed_position = entry.offset;
        self.input_start = 0;
        self.input_end = 0;
        self.needs_restart = false;
        Ok(())
    }

    fn refill(&mut self, entry: &ZipEntry) -> io::Result<()> {
        let remaining = entry.data_end().saturating_sub(self.compressed_position);
        if remaining == 0 {
            return Ok(());
        }
        let len = remaining.min(INPUT_CHUNK as u64) as usize;
        let n = self.file.read(&mut self.input[..len])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("container ends inside the data of '{}'", entry.file_name),
            ));
        }
        self.compressed_position += n as u64;
        self.input_start = 0;
        self.input_end = n;
        Ok(())
    }

    fn fail(&mut self, entry: &ZipEntry, reason: String) -> io::Error {
        self.failed = Some(reason.clone());
        Error::Decode {
            name: entry.file_name.clone(),
            reason,
        }
        .into()
    }

    /// Inflate into `out`, returning at least one byte unless `out` is empty.
    fn inflate(&mut self, entry: &ZipEntry, out: &mut [u8]) -> io::Result<usize> {
        if let Some(reason) = &self.failed {
            return Err(Error::Decode {
                name: entry.file_name.clone(),
                reason: format!("session unusable after earlier failure: {reason}"),
            }
            .into());
        }
        if self.needs_restart {
            self.restart(entry)?;
        }

        loop {
            if self.input_start == self.input_end {
                self.refill(entry)?;
            }

            let before_in = self.inflater.total_in();
            let before_out = self.inflater.total_out();
            let status = match self.inflater.decompress(
                &self.input[self.input_start..self.input_end],
                out,
                FlushDecompress::None,
            ) {
                Ok(status) => status,
                Err(e) => return Err(self.fail(entry, e.to_string())),
            };
            let consumed = (self.inflater.total_in() - before_in) as usize;
            let produced = (self.inflater.total_out() - before_out) as usize;
            self.input_start += consumed;

            if produced > 0 {
                return Ok(produced);
            }
            if status == Status::StreamEnd {
                return Err(self.fail(entry, "deflate stream ended before the declared size".into()));
            }
            if consumed == 0 {
                return Err(self.fail(entry, "compressed data exhausted before the declared size".into()));
            }
        }
    }
}

/// A seekable reader over the uncompressed bytes of one entry
pub struct EntryStream {
    entry: ZipEntry,
    backend: Backend,
    /// Uncompressed read cursor
    position: u64,
}

impl EntryStream {
    /// Open a session that reads the entry out of its container.
    pub fn open(host: &dyn HostFs, container: &Path, entry: &ZipEntry) -> Result<Self> {
        check_openable(entry)?;
        let file = host.open(container)?;
        let backend = match entry.compression_method {
            CompressionMethod::Deflate => Backend::Deflate(Box::new(InflateState::new(file, entry))),
            _ => Backend::Stored(file),
        };
        debug!(
            "Opened {} ({}, {} bytes) in {}",
            entry.file_name,
            entry.compression_method.name(),
            entry.uncompressed_size,
            container.display()
        );
        Ok(Self {
            entry: entry.clone(),
            backend,
            position: 0,
        })
    }

    /// Open a session that reads an already extracted copy of the entry.
    pub fn open_scratch(host: &dyn HostFs, scratch: &Path, entry: &ZipEntry) -> Result<Self> {
        let stat = host.stat(scratch)?;
        if stat.size != entry.uncompressed_size {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "scratch copy {} has {} bytes, expected {}",
                    scratch.display(),
                    stat.size,
                    entry.uncompressed_size
                ),
            )));
        }
        let file = host.open(scratch)?;
        debug!("Opened {} from scratch copy {}", entry.file_name, scratch.display());
        Ok(Self {
            entry: entry.clone(),
            backend: Backend::Scratch(file),
            position: 0,
        })
    }

    /// Uncompressed size, known without inflating anything
    pub fn length(&self) -> u64 {
        self.entry.uncompressed_size
    }

    /// Current uncompressed position
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn entry(&self) -> &ZipEntry {
        &self.entry
    }

    /// Whether reads are served from a scratch copy
    pub fn is_scratch(&self) -> bool {
        matches!(self.backend, Backend::Scratch(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.backend, Backend::Closed)
    }

    /// Release the container handle and inflate state. Calling it again is a no-op.
    pub fn close(&mut self) {
        if !self.is_closed() {
            trace!("Closing {}", self.entry.file_name);
            self.backend = Backend::Closed;
        }
    }

    /// Read into `buf` until it is full or the entry ends.
    fn read_passthrough(
        file: &mut dyn HostFile,
        start: u64,
        buf: &mut [u8],
        name: &str,
    ) -> io::Result<usize> {
        file.seek(SeekFrom::Start(start))?;
        let n = file.read(buf)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("container ends inside the data of '{name}'"),
            ));
        }
        Ok(n)
    }

    /// Inflate and drop `count` bytes
    fn discard(&mut self, mut count: u64) -> io::Result<()> {
        if count == 0 {
            return Ok(());
        }
        let mut sink = vec![0u8; (count.min(DISCARD_BLOCK as u64)) as usize];
        while count > 0 {
            let len = count.min(sink.len() as u64) as usize;
            let n = self.read(&mut sink[..len])?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("'{}' ended while seeking", self.entry.file_name),
                ));
            }
            count -= n as u64;
        }
        Ok(())
    }
}

fn closed_error() -> io::Error {
    io::Error::other("entry stream is closed")
}

impl Read for EntryStream {
    /// Reads stop at the declared size; reading at the end returns 0.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.entry.uncompressed_size.saturating_sub(self.position);
        let want = remaining.min(buf.len() as u64) as usize;
        if want == 0 {
            return if self.is_closed() { Err(closed_error()) } else { Ok(0) };
        }

        let n = match &mut self.backend {
            Backend::Stored(file) => {
                // Never cross the compressed-size boundary
                let stored_left = self.entry.compressed_size.saturating_sub(self.position);
                let want = (want as u64).min(stored_left) as usize;
                if want == 0 {
                    return Ok(0);
                }
                Self::read_passthrough(
                    file.as_mut(),
                    self.entry.offset + self.position,
                    &mut buf[..want],
                    &self.entry.file_name,
                )?
            }
            Backend::Scratch(file) => Self::read_passthrough(
                file.as_mut(),
                self.position,
                &mut buf[..want],
                &self.entry.file_name,
            )?,
            Backend::Deflate(state) => state.inflate(&self.entry, &mut buf[..want])?,
            Backend::Closed => return Err(closed_error()),
        };

        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for EntryStream {
    /// Seeking past the end of the entry is rejected.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let size = self.entry.uncompressed_size;
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => size.checked_add_signed(delta),
        }
        .filter(|target| *target <= size)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek to {pos:?} is outside '{}' ({size} bytes)", self.entry.file_name),
            )
        })?;

        match &mut self.backend {
            Backend::Stored(_) | Backend::Scratch(_) => self.position = target,
            Backend::Deflate(state) => {
                if target < self.position {
                    trace!(
                        "Backward seek in {} from {} to {target}, replaying from start",
                        self.entry.file_name, self.position
                    );
                    state.needs_restart = true;
                    self.position = 0;
                }
                self.discard(target - self.position)?;
            }
            Backend::Closed => return Err(closed_error()),
        }
        Ok(self.position)
    }
}

impl std::fmt::Debug for EntryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match self.backend {
            Backend::Stored(_) => "stored",
            Backend::Deflate(_) => "deflate",
            Backend::Scratch(_) => "scratch",
            Backend::Closed => "closed",
        };
        f.debug_struct("EntryStream")
            .field("name", &self.entry.file_name)
            .field("backend", &backend)
            .field("position", &self.position)
            .field("length", &self.entry.uncompressed_size)
            .finish()
    }
}
