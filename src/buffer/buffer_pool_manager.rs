use std::collections::{HashMap, LinkedList};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::warn;
use parking_lot::Mutex;

use crate::common::{FrameId, OrdexError, PageId, Result, INVALID_PAGE_ID};
use crate::storage::disk::DiskManager;

use super::{FrameHeader, LruKReplacer, ReadPageGuard, WritePageGuard};

/// Pool state shared with guard release callbacks.
struct PoolState {
    /// The fixed frame array
    frames: Vec<Arc<FrameHeader>>,
    /// Page table: resident page id -> frame id (bijective over residents)
    page_table: Mutex<HashMap<PageId, FrameId>>,
    /// Frames not currently holding any page
    free_list: Mutex<LinkedList<FrameId>>,
    /// Eviction policy
    replacer: LruKReplacer,
}

/// BufferPoolManager caches disk pages in a fixed set of in-memory frames and
/// mediates every page access of the index.
///
/// Pages are handed out as RAII guards; a guard holds a pin for its lifetime,
/// and a frame is only eligible for eviction once every pin on it is gone.
/// When no free frame remains, the LRU-K replacer chooses a victim, which is
/// flushed first if dirty.
pub struct BufferPoolManager {
    pool_size: usize,
    /// Monotonic page id allocator; the pool owns page numbering
    next_page_id: AtomicU32,
    state: Arc<PoolState>,
    disk_manager: Arc<DiskManager>,
}

impl BufferPoolManager {
    /// Creates a pool with `pool_size` frames and an LRU-K replacer with the
    /// given k over the provided disk manager.
    pub fn new(pool_size: usize, k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = LinkedList::new();

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            // Continue numbering after whatever the backing file already holds
            next_page_id: AtomicU32::new(disk_manager.num_pages()),
            state: Arc::new(PoolState {
                frames,
                page_table: Mutex::new(HashMap::new()),
                free_list: Mutex::new(free_list),
                replacer: LruKReplacer::new(k, pool_size),
            }),
            disk_manager,
        }
    }

    /// Allocates a fresh page id and returns its zeroed frame, pinned for
    /// writing.
    ///
    /// Fails with `PoolExhausted` when no frame is free and none is evictable.
    pub fn new_page(&self) -> Result<WritePageGuard> {
        let frame_id = self.acquire_frame()?;
        let page_id = PageId::new(self.next_page_id.fetch_add(1, Ordering::SeqCst));

        let frame = &self.state.frames[frame_id.as_usize()];
        frame.reset();
        frame.set_page_id(page_id);

        self.state.page_table.lock().insert(page_id, frame_id);
        self.pin_frame(frame_id);

        Ok(WritePageGuard::new(
            page_id,
            Arc::clone(frame),
            self.release_fn(),
        ))
    }

    /// Returns the page pinned for reading, loading it from disk if it is not
    /// resident.
    pub fn read_page(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame_id = self.fetch_frame(page_id)?;
        Ok(ReadPageGuard::new(
            page_id,
            Arc::clone(&self.state.frames[frame_id.as_usize()]),
            self.release_fn(),
        ))
    }

    /// Returns the page pinned for writing, loading it from disk if it is not
    /// resident.
    pub fn write_page(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame_id = self.fetch_frame(page_id)?;
        Ok(WritePageGuard::new(
            page_id,
            Arc::clone(&self.state.frames[frame_id.as_usize()]),
            self.release_fn(),
        ))
    }

    /// Writes a resident dirty page through to disk.
    ///
    /// Returns true if the page was clean or was flushed; false if the page is
    /// not resident or the write failed.
    pub fn flush_page(&self, page_id: PageId) -> bool {
        let page_table = self.state.page_table.lock();
        let Some(&frame_id) = page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.state.frames[frame_id.as_usize()];
        if !frame.is_dirty() {
            return true;
        }

        let data = frame.read_data();
        if let Err(e) = self.disk_manager.write_page(page_id, &data[..]) {
            warn!("flush of page {} failed: {}", page_id, e);
            return false;
        }
        frame.set_dirty(false);
        true
    }

    /// Flushes every resident page; true only if all flushes succeeded.
    pub fn flush_all_pages(&self) -> bool {
        let page_ids: Vec<PageId> = self.state.page_table.lock().keys().copied().collect();

        let mut all_flushed = true;
        for page_id in page_ids {
            all_flushed = self.flush_page(page_id) && all_flushed;
        }
        all_flushed
    }

    /// Drops a page from the pool, returning its frame to the free list and
    /// discarding the replacer history.
    ///
    /// Returns `Ok(false)` if the page is not resident and `RemoveOfPinned`
    /// if it is still pinned. The on-disk bytes are left as they are.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut page_table = self.state.page_table.lock();
        let Some(&frame_id) = page_table.get(&page_id) else {
            return Ok(false);
        };

        self.state.replacer.remove(frame_id)?;
        page_table.remove(&page_id);
        self.state.frames[frame_id.as_usize()].reset();
        self.state.free_list.lock().push_back(frame_id);
        Ok(true)
    }

    /// Returns the pin count of a resident page, or None if not resident.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let page_table = self.state.page_table.lock();
        page_table
            .get(&page_id)
            .map(|&frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.free_list.lock().len()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    /// Pins a frame and refreshes its standing with the replacer.
    fn pin_frame(&self, frame_id: FrameId) {
        self.state.frames[frame_id.as_usize()].pin();
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);
    }

    /// The release callback shared by all guards: drop one pin and mark the
    /// frame evictable once the last pin is gone.
    fn release_fn(&self) -> super::page_guard::ReleaseFn {
        let state = Arc::clone(&self.state);
        Box::new(move |page_id| {
            let page_table = state.page_table.lock();
            if let Some(&frame_id) = page_table.get(&page_id) {
                if state.frames[frame_id.as_usize()].unpin() == 0 {
                    state.replacer.set_evictable(frame_id, true);
                }
            }
        })
    }

    /// Brings a page into a frame (if needed) and pins it.
    fn fetch_frame(&self, page_id: PageId) -> Result<FrameId> {
        if page_id == INVALID_PAGE_ID {
            return Err(OrdexError::InvalidPageId(page_id));
        }

        {
            let page_table = self.state.page_table.lock();
            if let Some(&frame_id) = page_table.get(&page_id) {
                self.pin_frame(frame_id);
                return Ok(frame_id);
            }
        }

        let frame_id = self.acquire_frame()?;
        let frame = &self.state.frames[frame_id.as_usize()];

        let read_result = {
            let mut data = frame.write_data();
            self.disk_manager.read_page(page_id, &mut data[..])
        };
        if let Err(e) = read_result {
            // The read failed; hand the frame back rather than leaking it.
            self.state.free_list.lock().push_back(frame_id);
            return Err(e);
        }

        frame.set_page_id(page_id);
        frame.set_dirty(false);
        self.state.page_table.lock().insert(page_id, frame_id);
        self.pin_frame(frame_id);

        Ok(frame_id)
    }

    /// Obtains an empty frame: from the free list if possible, otherwise by
    /// evicting the replacer's victim (flushing it first when dirty).
    fn acquire_frame(&self) -> Result<FrameId> {
        {
            let mut free_list = self.state.free_list.lock();
            if let Some(frame_id) = free_list.pop_front() {
                return Ok(frame_id);
            }
        }

        let frame_id = self
            .state
            .replacer
            .evict()
            .map_err(|_| OrdexError::PoolExhausted)?;
        let frame = &self.state.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            let data = frame.read_data();
            if let Err(e) = self.disk_manager.write_page(old_page_id, &data[..]) {
                // The victim keeps its frame; restore its standing with the
                // replacer so a later allocation can try again.
                drop(data);
                self.state.replacer.record_access(frame_id);
                self.state.replacer.set_evictable(frame_id, true);
                return Err(e);
            }
        }

        self.state.page_table.lock().remove(&old_page_id);
        frame.reset();
        Ok(frame_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_bpm(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = BufferPoolManager::new(pool_size, 2, dm);
        (bpm, temp_file)
    }

    #[test]
    fn test_buffer_pool_new() {
        let (bpm, _temp) = create_bpm(10);
        assert_eq!(bpm.pool_size(), 10);
        assert_eq!(bpm.free_frame_count(), 10);
    }

    #[test]
    fn test_new_page_is_pinned_and_zeroed() {
        let (bpm, _temp) = create_bpm(10);

        let guard = bpm.new_page().unwrap();
        let page_id = guard.page_id();
        assert_eq!(page_id, PageId::new(0));
        assert_eq!(bpm.get_pin_count(page_id), Some(1));
        assert!(guard.data().iter().all(|&b| b == 0));

        drop(guard);
        assert_eq!(bpm.get_pin_count(page_id), Some(0));
        assert_eq!(bpm.free_frame_count(), 9);
    }

    #[test]
    fn test_page_ids_are_monotonic() {
        let (bpm, _temp) = create_bpm(10);
        for i in 0..5u32 {
            assert_eq!(bpm.new_page().unwrap().page_id(), PageId::new(i));
        }
    }

    #[test]
    fn test_read_write_round_trip() {
        let (bpm, _temp) = create_bpm(10);

        let page_id = {
            let mut guard = bpm.new_page().unwrap();
            guard.data_mut()[0] = 42;
            guard.data_mut()[100] = 255;
            guard.page_id()
        };

        let guard = bpm.read_page(page_id).unwrap();
        assert_eq!(guard.data()[0], 42);
        assert_eq!(guard.data()[100], 255);
    }

    #[test]
    fn test_pin_accounting_across_guards() {
        let (bpm, _temp) = create_bpm(10);

        let page_id = bpm.new_page().unwrap().page_id();

        let g1 = bpm.read_page(page_id).unwrap();
        let g2 = bpm.read_page(page_id).unwrap();
        assert_eq!(bpm.get_pin_count(page_id), Some(2));

        drop(g1);
        assert_eq!(bpm.get_pin_count(page_id), Some(1));
        drop(g2);
        assert_eq!(bpm.get_pin_count(page_id), Some(0));
    }

    #[test]
    fn test_eviction_reuses_frames() {
        let (bpm, _temp) = create_bpm(3);

        for i in 0..3u32 {
            let mut guard = bpm.new_page().unwrap();
            guard.data_mut()[0] = i as u8;
        }
        assert_eq!(bpm.free_frame_count(), 0);

        // A fourth page forces an eviction.
        let guard = bpm.new_page().unwrap();
        assert_eq!(guard.page_id(), PageId::new(3));
    }

    #[test]
    fn test_dirty_victim_is_flushed_before_reuse() {
        let (bpm, _temp) = create_bpm(1);

        let first = {
            let mut guard = bpm.new_page().unwrap();
            guard.data_mut()[7] = 0xAB;
            guard.page_id()
        };
        let writes_before = bpm.disk_manager().num_writes();

        // Allocating a second page must evict the first, flushing it.
        let _guard = bpm.new_page().unwrap();
        assert_eq!(bpm.disk_manager().num_writes(), writes_before + 1);
        drop(_guard);

        // Reloading the first page sees the flushed bytes.
        let guard = bpm.read_page(first).unwrap();
        assert_eq!(guard.data()[7], 0xAB);
    }

    #[test]
    fn test_pool_exhausted_when_all_pinned() {
        let (bpm, _temp) = create_bpm(2);

        let _g1 = bpm.new_page().unwrap();
        let _g2 = bpm.new_page().unwrap();

        assert!(matches!(bpm.new_page(), Err(OrdexError::PoolExhausted)));
    }

    #[test]
    fn test_flush_page() {
        let (bpm, temp) = create_bpm(10);

        let page_id = {
            let mut guard = bpm.new_page().unwrap();
            guard.data_mut()[0] = 42;
            guard.page_id()
        };

        assert!(bpm.flush_page(page_id));
        // A clean page flushes trivially.
        assert!(bpm.flush_page(page_id));
        // A page that is not resident does not.
        assert!(!bpm.flush_page(PageId::new(999)));

        drop(bpm);
        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        let bpm2 = BufferPoolManager::new(10, 2, dm);
        let guard = bpm2.read_page(page_id).unwrap();
        assert_eq!(guard.data()[0], 42);
    }

    #[test]
    fn test_flush_all_pages() {
        let (bpm, temp) = create_bpm(10);

        let mut page_ids = Vec::new();
        for i in 0..5u8 {
            let mut guard = bpm.new_page().unwrap();
            guard.data_mut()[0] = i;
            page_ids.push(guard.page_id());
        }

        assert!(bpm.flush_all_pages());

        drop(bpm);
        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        let bpm2 = BufferPoolManager::new(10, 2, dm);
        for (i, &page_id) in page_ids.iter().enumerate() {
            let guard = bpm2.read_page(page_id).unwrap();
            assert_eq!(guard.data()[0], i as u8);
        }
    }

    #[test]
    fn test_delete_page() {
        let (bpm, _temp) = create_bpm(10);

        let page_id = bpm.new_page().unwrap().page_id();

        {
            let _guard = bpm.read_page(page_id).unwrap();
            assert!(matches!(
                bpm.delete_page(page_id),
                Err(OrdexError::RemoveOfPinned(_))
            ));
        }

        assert!(bpm.delete_page(page_id).unwrap());
        assert_eq!(bpm.get_pin_count(page_id), None);
        assert_eq!(bpm.free_frame_count(), 10);

        // Deleting a non-resident page reports false.
        assert!(!bpm.delete_page(page_id).unwrap());
    }
}
