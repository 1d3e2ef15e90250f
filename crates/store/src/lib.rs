//! Session Store - canonical chat state with a durable mirror
//!
//! Owns the ordered session collection and the current selection, and
//! mirrors every mutation to an injected snapshot-storage port. Restricted
//! sessions are filtered out of both hydration and every write.

pub mod session_store;
pub mod storage;

pub use session_store::SessionStore;
pub use storage::{FileStorage, MemoryStorage, SnapshotStorage};
