mod buffer_pool_manager;
mod frame_header;
mod lru_k_replacer;
mod page_guard;

pub use buffer_pool_manager::*;
pub use frame_header::*;
pub use lru_k_replacer::*;
pub use page_guard::{ReadPageGuard, WritePageGuard};
