//! Fixed-length block file for block-level random access I/O.

use acorn_common::{AcornError, BlockNumber, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A random access file composed of blocks of a fixed length.
///
/// Blocks are the unit of I/O: every read and write covers exactly one
/// block-sized buffer at `block * block_size`. Writes past the current end of
/// file extend it; the contents of never-written blocks are undefined and
/// callers must not rely on them.
pub struct BlockFile {
    /// The underlying file handle.
    file: File,
    /// Path the file was opened at.
    path: PathBuf,
    /// Number of bytes per block.
    block_size: usize,
}

impl BlockFile {
    /// Opens (or creates) a block file at the given path.
    pub fn open(path: impl Into<PathBuf>, block_size: usize) -> Result<Self> {
        let path = path.into();
        if block_size == 0 {
            return Err(AcornError::InvalidParameter {
                name: "block_size".to_string(),
                value: block_size.to_string(),
            });
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        Ok(Self {
            file,
            path,
            block_size,
        })
    }

    /// Returns the path the file was opened at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of bytes per block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the current file length in bytes.
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Returns true if the file holds no bytes.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Reads the block at the given index into `buf`.
    ///
    /// Returns the number of bytes read. A read past end of file returns
    /// fewer than `block_size` bytes and leaves the remainder of `buf`
    /// untouched.
    pub fn read_block(&mut self, block: BlockNumber, buf: &mut [u8]) -> Result<usize> {
        self.check_access(block, buf.len())?;

        self.file
            .seek(SeekFrom::Start(block as u64 * self.block_size as u64))?;

        let mut total = 0;
        while total < buf.len() {
            let n = self.file.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    /// Writes `buf` to the block at the given index, extending the file if
    /// the block lies past the current end.
    pub fn write_block(&mut self, block: BlockNumber, buf: &[u8]) -> Result<()> {
        self.check_access(block, buf.len())?;

        self.file
            .seek(SeekFrom::Start(block as u64 * self.block_size as u64))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    /// Flushes file contents and metadata to the storage device.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn check_access(&self, block: BlockNumber, buf_len: usize) -> Result<()> {
        if block < 0 {
            return Err(AcornError::InvalidParameter {
                name: "block".to_string(),
                value: block.to_string(),
            });
        }
        if buf_len != self.block_size {
            return Err(AcornError::BlockSizeMismatch {
                expected: self.block_size,
                actual: buf_len,
            });
        }
        Ok(())
    }
}
