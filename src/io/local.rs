use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{HostFile, HostFs, HostStat};

/// Local filesystem access with read accounting
#[derive(Debug, Default, Clone)]
pub struct LocalFs {
    bytes_read: Arc<AtomicU64>,
}

impl LocalFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get total bytes read through every file opened by this instance
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }
}

impl HostFs for LocalFs {
    fn stat(&self, path: &Path) -> io::Result<HostStat> {
        let meta = std::fs::metadata(path)?;
        Ok(HostStat {
            size: meta.len(),
            modified: meta.modified().ok(),
            is_dir: meta.is_dir(),
        })
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn HostFile>> {
        let file = File::open(path)?;
        Ok(Box::new(CountingFile {
            file,
            counter: Arc::clone(&self.bytes_read),
        }))
    }
}

/// A local file that reports every successful read to its owner's counter
struct CountingFile {
    file: File,
    counter: Arc<AtomicU64>,
}

impl Read for CountingFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read(buf)?;
        self.counter.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

impl Seek for CountingFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn counts_bytes_across_handles() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();

        let fs = LocalFs::new();
        let stat = fs.stat(tmp.path()).unwrap();
        assert_eq!(stat.size, 10);
        assert!(!stat.is_dir);
        assert_eq!(fs.bytes_read(), 0);

        let mut a = fs.open(tmp.path()).unwrap();
        let mut buf = [0u8; 4];
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"0123");

        let mut b = fs.open(tmp.path()).unwrap();
        b.seek(SeekFrom::Start(8)).unwrap();
        let mut rest = Vec::new();
        b.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"89");

        assert_eq!(fs.bytes_read(), 6);
    }
}
