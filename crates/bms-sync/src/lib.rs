//! Shared bounded buffers crossing core boundaries: the inter-core
//! sample queue (fast core -> slow core) and the history ring
//! (slow core -> HTTP handler).
//!
//! Both use a brief non-sleeping critical section around head/count/slot
//! writes; neither ever suspends a caller.

mod history;
mod queue;

pub use history::{HistoryRing, HISTORY_CAPACITY, HISTORY_ENTRY_MAXLEN};
pub use queue::IntercoreQueue;
