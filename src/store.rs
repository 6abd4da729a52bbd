//! Random-access byte stores that a module is parsed from and patched in.

use crate::error::{RelError, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

/// Value reported for every byte requested beyond the end of a store.
pub const PAST_END_FILL: u8 = 0xFF;

/// Explicit-offset access to the bytes of a module.
///
/// Every operation names its offset; callers never depend on a shared cursor position.
pub trait ByteStore {
    /// Current length of the store in bytes.
    fn length(&mut self) -> io::Result<u64>;

    /// Fills `buf` with the bytes starting at `offset`.
    ///
    /// Returns how many bytes actually came from the store. The remainder of `buf` is set to
    /// [`PAST_END_FILL`].
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes all of `data` at `offset`, growing the store if needed.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;
}

impl<T: Read + Write + Seek> ByteStore for T {
    fn length(&mut self) -> io::Result<u64> {
        self.seek(SeekFrom::End(0))
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        for byte in &mut buf[filled..] {
            *byte = PAST_END_FILL;
        }
        Ok(filled)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.write_all(data)
    }
}

/// Opens `path` for read-write random access.
pub fn open_store<P: AsRef<Path>>(path: P) -> Result<File> {
    let path = path.as_ref();
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| RelError::StoreUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(path = %path.display(), "Opened module store");
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_past_end_is_filled() {
        let mut store = Cursor::new(vec![1u8, 2, 3]);
        let mut buf = [0u8; 5];
        assert_eq!(store.read_at(1, &mut buf).unwrap(), 2);
        assert_eq!(buf, [2, 3, 0xFF, 0xFF, 0xFF]);

        assert_eq!(store.read_at(10, &mut buf).unwrap(), 0);
        assert_eq!(buf, [0xFF; 5]);
    }

    #[test]
    fn write_grows_store() {
        let mut store = Cursor::new(vec![0u8; 2]);
        store.write_at(1, &[7, 8, 9]).unwrap();
        assert_eq!(store.length().unwrap(), 4);
        assert_eq!(store.into_inner(), vec![0, 7, 8, 9]);
    }

    #[test]
    fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_store(dir.path().join("missing.rel")).unwrap_err();
        assert!(matches!(err, RelError::StoreUnavailable { .. }));
    }
}
