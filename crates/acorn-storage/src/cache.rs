//! Write-back block cache.

use crate::block_file::BlockFile;
use crate::freelist::FreeList;
use acorn_common::{AcornError, BlockNumber, Result};
use bytes::{Bytes, BytesMut};

/// A cached block: its number, its bytes, and whether the bytes have been
/// written through the cache but not yet persisted to the file.
#[derive(Debug, Clone)]
struct CacheEntry {
    block: BlockNumber,
    bytes: Bytes,
    dirty: bool,
}

/// Bounded write-back cache over a [`BlockFile`], plus the block allocator.
///
/// Entries live in an ordered list: index 0 is the most recently admitted
/// entry and the tail is the eviction candidate. Reads are satisfied from the
/// list, promoting a block from the file on a miss; writes replace an entry's
/// bytes and mark it dirty, deferring the file write until a flush or until
/// capacity pressure forces one.
///
/// Admission when full scans from the tail for the last clean entry and
/// evicts it; if every entry is dirty the whole cache is flushed, the tail is
/// dropped, and the newcomer is installed at the front. A dirty entry is
/// never evicted without being written.
pub struct BlockCache {
    /// Maximum number of resident entries.
    capacity: usize,
    /// Resident entries, most recently admitted first.
    entries: Vec<CacheEntry>,
    /// The underlying block file.
    file: BlockFile,
    /// Allocator of block numbers.
    free: FreeList,
}

impl BlockCache {
    /// Creates a cache over the given file with an empty free list.
    ///
    /// The high-water mark is seeded from the file length, so blocks already
    /// present in the file are never handed out as fresh allocations.
    pub fn new(capacity: usize, file: BlockFile) -> Result<Self> {
        Self::with_free_list(capacity, file, Vec::new())
    }

    /// Creates a cache over the given file with a restored free-list stack
    /// (bottom to top).
    pub fn with_free_list(
        capacity: usize,
        file: BlockFile,
        unallocated: Vec<BlockNumber>,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(AcornError::InvalidParameter {
                name: "capacity".to_string(),
                value: capacity.to_string(),
            });
        }
        let high_water = (file.len()? / file.block_size() as u64) as BlockNumber - 1;
        Ok(Self {
            capacity,
            entries: Vec::with_capacity(capacity),
            file,
            free: FreeList::with_blocks(high_water, unallocated),
        })
    }

    /// Returns the underlying block file.
    pub fn file(&self) -> &BlockFile {
        &self.file
    }

    /// Returns the maximum number of resident entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of resident entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries are resident.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the free-list stack, bottom to top.
    pub fn free_blocks(&self) -> &[BlockNumber] {
        self.free.blocks()
    }

    /// Reads the bytes of the given block.
    ///
    /// On a miss the block is fetched from the file into a fresh clean entry.
    /// A block past the end of the file reads as zero-filled; callers must
    /// never rely on the contents of unwritten blocks.
    pub fn read(&mut self, block: BlockNumber) -> Result<Bytes> {
        self.check_block(block)?;

        if let Some(i) = self.position_of(block) {
            return Ok(self.entries[i].bytes.clone());
        }

        let mut buf = BytesMut::zeroed(self.file.block_size());
        self.file.read_block(block, &mut buf)?;
        let bytes = buf.freeze();

        self.admit(CacheEntry {
            block,
            bytes: bytes.clone(),
            dirty: false,
        })?;
        Ok(bytes)
    }

    /// Writes the bytes of the given block through the cache.
    ///
    /// The file is not touched until the entry is flushed.
    pub fn write(&mut self, block: BlockNumber, bytes: Bytes) -> Result<()> {
        self.check_block(block)?;
        if bytes.len() != self.file.block_size() {
            return Err(AcornError::BlockSizeMismatch {
                expected: self.file.block_size(),
                actual: bytes.len(),
            });
        }

        match self.position_of(block) {
            Some(i) => {
                self.entries[i].bytes = bytes;
                self.entries[i].dirty = true;
                Ok(())
            }
            None => self.admit(CacheEntry {
                block,
                bytes,
                dirty: true,
            }),
        }
    }

    /// Returns the next unallocated block number.
    ///
    /// The allocator does not touch the cache; the caller is expected to
    /// write the new block promptly.
    pub fn allocate(&mut self) -> BlockNumber {
        self.free.allocate()
    }

    /// Returns the given block to the free list.
    ///
    /// A resident entry for the block has its dirty bit cleared: its contents
    /// no longer need to reach the file.
    pub fn deallocate(&mut self, block: BlockNumber) {
        if let Some(i) = self.position_of(block) {
            self.entries[i].dirty = false;
        }
        self.free.deallocate(block);
    }

    /// Writes every dirty entry to the file and clears its dirty bit.
    pub fn flush(&mut self) -> Result<()> {
        for entry in &mut self.entries {
            if entry.dirty {
                self.file.write_block(entry.block, &entry.bytes)?;
                entry.dirty = false;
            }
        }
        Ok(())
    }

    /// Flushes the cache and syncs the file to the storage device.
    pub fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.file.sync()
    }

    /// Installs a new entry at the front, evicting per the admission policy
    /// when the cache is at capacity.
    fn admit(&mut self, entry: CacheEntry) -> Result<()> {
        if self.entries.len() == self.capacity {
            match self.last_clean_index() {
                // Evict the last clean entry, shifting the prefix down.
                Some(t) => {
                    self.entries.remove(t);
                }
                // Every entry is dirty: persist them all, then drop the tail.
                None => {
                    self.flush()?;
                    self.entries.pop();
                }
            }
        }
        self.entries.insert(0, entry);
        Ok(())
    }

    fn position_of(&self, block: BlockNumber) -> Option<usize> {
        self.entries.iter().position(|e| e.block == block)
    }

    fn last_clean_index(&self) -> Option<usize> {
        self.entries.iter().rposition(|e| !e.dirty)
    }

    fn check_block(&self, block: BlockNumber) -> Result<()> {
        if block < 0 {
            return Err(AcornError::CorruptBlock {
                block,
                reason: "negative block number".to_string(),
            });
        }
        Ok(())
    }
}
