//! Ordex - a single-node, disk-backed ordered index
//!
//! This crate implements the paged storage core of a database index: pages on
//! disk, a buffer pool that caches them in a fixed number of in-memory frames,
//! and a B+Tree that organizes unique 64-bit integer keys to record ids over
//! those pages. The buffer pool lets the index address far more data than fits
//! in memory while keeping lookups logarithmic.
//!
//! # Architecture
//!
//! The system is organized into three layers:
//!
//! - **Storage Layer** (`storage`): disk I/O at page granularity
//!   - `DiskManager`: reads and writes fixed-size pages in a single backing file
//!
//! - **Buffer Pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: fetches pages from disk and caches them in frames
//!   - `LruKReplacer`: LRU-K page replacement policy with scan resistance
//!   - `FrameHeader`: per-frame metadata and page bytes
//!   - `ReadPageGuard`/`WritePageGuard`: RAII guards that pin pages while in use
//!
//! - **Index** (`index`): the ordered map itself
//!   - `BTreeIndex`: B+Tree insert and point lookup over buffered pages
//!   - `Node`: leaf and inner page codecs
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ordex::buffer::BufferPoolManager;
//! use ordex::index::{BTreeIndex, IndexOptions};
//! use ordex::storage::disk::DiskManager;
//!
//! // Open (or create) the backing file
//! let disk_manager = Arc::new(DiskManager::new("index.db").unwrap());
//!
//! // Cache up to 64 pages with LRU-2 replacement
//! let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));
//!
//! // Build an index and use it
//! let mut index = BTreeIndex::new(bpm, IndexOptions::default());
//! assert!(index.insert(42, 7).unwrap());
//! assert_eq!(index.get(42).unwrap(), Some(7));
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{FrameId, OrdexError, PageId, RecordId, Result, SlotId};
