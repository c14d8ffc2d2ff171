//! Dataset locations that hand out independent readers.
//!
//! A tile read must never share a file handle with a concurrent read, so the
//! raster keeps a [`ByteSource`] rather than a reader and calls
//! [`ByteSource::open`] once per tile.

use std::fs::File;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use super::range_reader::{check_range, RangeReader};
use crate::error::IoError;

/// A location from which fresh [`RangeReader`]s can be opened.
pub trait ByteSource: Send + Sync + 'static {
    /// Reader type produced by [`open`](ByteSource::open).
    type Reader: RangeReader;

    /// Open a new, independent reader.
    fn open(&self) -> Result<Self::Reader, IoError>;

    /// Identifier for logging.
    fn identifier(&self) -> &str;
}

// =============================================================================
// Local files
// =============================================================================

/// A raster stored on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    identifier: String,
}

impl LocalFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let identifier = path.display().to_string();
        Self { path, identifier }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for LocalFile {
    type Reader = FileRangeReader;

    fn open(&self) -> Result<FileRangeReader, IoError> {
        FileRangeReader::open(&self.path)
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// Reader over an open file handle, owned by a single tile read.
#[derive(Debug)]
pub struct FileRangeReader {
    file: File,
    size: u64,
    identifier: String,
}

impl FileRangeReader {
    /// Open `path` for positional reads.
    pub fn open(path: &Path) -> Result<Self, IoError> {
        let identifier = path.display().to_string();
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(identifier.clone()),
            _ => IoError::File {
                path: identifier.clone(),
                message: e.to_string(),
            },
        })?;
        let size = file
            .metadata()
            .map_err(|e| IoError::File {
                path: identifier.clone(),
                message: e.to_string(),
            })?
            .len();

        Ok(Self {
            file,
            size,
            identifier,
        })
    }

    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
        use std::os::windows::fs::FileExt;
        let mut read = 0;
        while read < buf.len() {
            let n = self.file.seek_read(&mut buf[read..], offset + read as u64)?;
            if n == 0 {
                return Err(std::io::ErrorKind::UnexpectedEof.into());
            }
            read += n;
        }
        Ok(())
    }
}

impl RangeReader for FileRangeReader {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.size)?;

        let mut buf = vec![0u8; len];
        self.read_at(&mut buf, offset).map_err(|e| IoError::File {
            path: self.identifier.clone(),
            message: e.to_string(),
        })?;
        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// In-memory datasets
// =============================================================================

/// A raster held in memory. Cloning the underlying [`Bytes`] is cheap, so every
/// reader gets its own view.
#[derive(Debug, Clone)]
pub struct InMemory {
    data: Bytes,
    identifier: String,
}

impl InMemory {
    pub fn new(data: impl Into<Bytes>, identifier: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            identifier: identifier.into(),
        }
    }
}

impl ByteSource for InMemory {
    type Reader = BytesReader;

    fn open(&self) -> Result<BytesReader, IoError> {
        Ok(BytesReader {
            data: self.data.clone(),
            identifier: self.identifier.clone(),
        })
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// Reader over an in-memory buffer.
#[derive(Debug, Clone)]
pub struct BytesReader {
    data: Bytes,
    identifier: String,
}

impl BytesReader {
    pub fn new(data: impl Into<Bytes>, identifier: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            identifier: identifier.into(),
        }
    }
}

impl RangeReader for BytesReader {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.data.len() as u64)?;
        let start = offset as usize;
        Ok(self.data.slice(start..start + len))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
