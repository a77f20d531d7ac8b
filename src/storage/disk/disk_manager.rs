use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{OrdexError, PageId, Result, PAGE_SIZE};

/// DiskManager reads and writes fixed-size pages at page-indexed offsets in a
/// single backing file. The byte offset of page `p` is `p * PAGE_SIZE`; there
/// is no file-level header.
///
/// The manager is a narrow wrapper: it owns the open file handle and a pair of
/// I/O counters, and knows nothing about page contents. Writes are followed by
/// an fsync so a successful return means the bytes are durable.
pub struct DiskManager {
    file: Mutex<File>,
    /// Number of pages the file holds, kept current across writes
    num_pages: AtomicU32,
    /// Number of page reads performed
    num_reads: AtomicU32,
    /// Number of page writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens the backing file at the given path, creating it if absent.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let num_pages = (file.metadata()?.len() / PAGE_SIZE as u64) as u32;

        Ok(Self {
            file: Mutex::new(file),
            num_pages: AtomicU32::new(num_pages),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Writes exactly one page at the page's offset and forces it to disk.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");

        let offset = page_id.as_u32() as u64 * PAGE_SIZE as u64;
        let mut file = self.file.lock();

        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.write_all(data))
            .map_err(|e| OrdexError::IoWriteFailed(page_id, e))?;
        file.sync_data()
            .map_err(|e| OrdexError::IoFlushFailed(page_id, e))?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        self.num_pages
            .fetch_max(page_id.as_u32() + 1, Ordering::Relaxed);
        Ok(())
    }

    /// Reads one page into the provided buffer.
    ///
    /// A short read at end-of-file is not an error: the page was allocated but
    /// never written, so the missing tail is zero-filled and the call succeeds.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");

        let offset = page_id.as_u32() as u64 * PAGE_SIZE as u64;
        let mut file = self.file.lock();

        file.seek(SeekFrom::Start(offset))
            .map_err(|e| OrdexError::IoReadFailed(page_id, e))?;

        let mut filled = 0;
        while filled < PAGE_SIZE {
            match file.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(OrdexError::IoReadFailed(page_id, e)),
            }
        }
        data[filled..].fill(0);

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Number of pages in the backing file. A reopened database continues
    /// allocating page ids from here.
    pub fn num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::Relaxed)
    }

    /// Returns the number of page reads performed.
    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of page writes performed.
    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.file.get_mut().sync_all();
    }
}
