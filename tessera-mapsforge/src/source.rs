use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::MapsforgeError;

/// Random access storage holding a map file.
///
/// Implementations must be safe to call from several threads at once. Reads never share a
/// cursor, every call is independent.
pub trait MapSource: Send + Sync {
    /// Reads exactly `len` bytes starting at `offset`.
    ///
    /// Reads extending past [`MapSource::size`] fail without allocating the buffer.
    fn read_at(&self, offset: u64, len: usize) -> Result<Bytes, MapsforgeError>;

    /// Total size of the stored data in bytes.
    fn size(&self) -> Result<u64, MapsforgeError>;
}

fn out_of_bounds(offset: u64, len: usize, size: u64) -> MapsforgeError {
    MapsforgeError::Io(format!(
        "read of {len} bytes at {offset} is out of bounds ({size} bytes)"
    ))
}

/// Map file on the local file system.
///
/// A new file handle is opened for every read.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Creates a source for the file. The file is not opened until the first read.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MapSource for FileSource {
    fn read_at(&self, offset: u64, len: usize) -> Result<Bytes, MapsforgeError> {
        let mut file = File::open(&self.path)?;
        let size = file.metadata()?.len();
        let fits = offset.checked_add(len as u64).is_some_and(|end| end <= size);
        if !fits {
            return Err(out_of_bounds(offset, len, size));
        }

        file.seek(SeekFrom::Start(offset))?;

        let mut buf = vec![0; len];
        file.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    fn size(&self) -> Result<u64, MapsforgeError> {
        Ok(std::fs::metadata(&self.path)?.len())
    }
}

/// Map file held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    /// Creates a source over the bytes.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl MapSource for MemorySource {
    fn read_at(&self, offset: u64, len: usize) -> Result<Bytes, MapsforgeError> {
        let start = usize::try_from(offset)
            .map_err(|_| MapsforgeError::Io(format!("offset {offset} is out of range")))?;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| out_of_bounds(offset, len, self.data.len() as u64))?;

        Ok(self.data.slice(start..end))
    }

    fn size(&self) -> Result<u64, MapsforgeError> {
        Ok(self.data.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn memory_source_reads_are_bounded() {
        let source = MemorySource::new(vec![1u8, 2, 3, 4]);
        assert_eq!(source.read_at(1, 2).unwrap().as_ref(), &[2, 3]);
        assert_eq!(source.read_at(4, 0).unwrap().len(), 0);
        assert_matches!(source.read_at(3, 2), Err(MapsforgeError::Io(_)));
    }

    #[test]
    fn file_reads_past_the_end_fail_before_reading() {
        let path = std::env::temp_dir().join(format!("tessera-source-{}.bin", std::process::id()));
        std::fs::write(&path, [1u8, 2, 3, 4]).unwrap();

        let source = FileSource::new(&path);
        assert_eq!(source.size().unwrap(), 4);
        assert_eq!(source.read_at(2, 2).unwrap().as_ref(), &[3, 4]);
        assert_matches!(source.read_at(2, 3), Err(MapsforgeError::Io(_)));
        assert_matches!(source.read_at(0, usize::MAX), Err(MapsforgeError::Io(_)));
        assert_matches!(source.read_at(u64::MAX, 1), Err(MapsforgeError::Io(_)));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_is_io_error() {
        let source = FileSource::new("/nonexistent/map.map");
        assert_matches!(source.read_at(0, 1), Err(MapsforgeError::Io(_)));
    }
}
