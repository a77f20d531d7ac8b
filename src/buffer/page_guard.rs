use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::FrameHeader;

/// Callback invoked when a guard is dropped; undoes the pin taken when the
/// guard was created.
pub(crate) type ReleaseFn = Box<dyn FnOnce(PageId) + Send + Sync>;

struct GuardState {
    page_id: PageId,
    frame: Arc<FrameHeader>,
    release: Option<ReleaseFn>,
}

impl GuardState {
    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.page_id);
        }
    }
}

/// RAII handle to a pinned page for reading.
///
/// The pin taken by the buffer pool is held for the guard's lifetime and
/// released on drop, at which point the frame becomes evictable again once
/// its pin count reaches zero.
pub struct ReadPageGuard {
    state: GuardState,
}

impl ReadPageGuard {
    pub(crate) fn new(page_id: PageId, frame: Arc<FrameHeader>, release: ReleaseFn) -> Self {
        Self {
            state: GuardState {
                page_id,
                frame,
                release: Some(release),
            },
        }
    }

    pub fn page_id(&self) -> PageId {
        self.state.page_id
    }

    /// Latches the page bytes for reading.
    pub fn data(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.state.frame.read_data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        self.state.release();
    }
}

/// RAII handle to a pinned page for writing.
///
/// Taking the mutable byte latch marks the frame dirty, so the pool knows to
/// flush it before the frame can be reused. The pin is released on drop.
pub struct WritePageGuard {
    state: GuardState,
}

impl WritePageGuard {
    pub(crate) fn new(page_id: PageId, frame: Arc<FrameHeader>, release: ReleaseFn) -> Self {
        Self {
            state: GuardState {
                page_id,
                frame,
                release: Some(release),
            },
        }
    }

    pub fn page_id(&self) -> PageId {
        self.state.page_id
    }

    /// Latches the page bytes for reading.
    pub fn data(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.state.frame.read_data()
    }

    /// Latches the page bytes for writing and marks the frame dirty.
    pub fn data_mut(&mut self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.state.frame.set_dirty(true);
        self.state.frame.write_data()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.state.release();
    }
}
