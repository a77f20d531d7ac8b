use thiserror::Error;

use super::types::{FrameId, PageId};

/// Errors surfaced by the storage engine
#[derive(Error, Debug)]
pub enum OrdexError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("read of page {0} failed")]
    IoReadFailed(PageId, #[source] std::io::Error),

    #[error("write of page {0} failed")]
    IoWriteFailed(PageId, #[source] std::io::Error),

    #[error("flush of page {0} to disk failed")]
    IoFlushFailed(PageId, #[source] std::io::Error),

    #[error("page carries unknown type tag {0}")]
    InvalidPageType(u32),

    #[error("invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("buffer pool exhausted: no free frame and no evictable frame")]
    PoolExhausted,

    #[error("all frames are pinned")]
    AllPinned,

    #[error("frame {0} cannot be removed while pinned")]
    RemoveOfPinned(FrameId),

    #[error("buffer of {got} bytes is too small to hold {needed} bytes")]
    BufferTooSmall { needed: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, OrdexError>;
