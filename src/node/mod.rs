//! Local node management
//!
//! - `manager` - beam-node process lifecycle (start with fast sync and
//!   optional owner key, stop, liveness)
//! - `scanner` - sync status derived from the node's log tail

pub mod manager;
pub mod scanner;

pub use scanner::SyncStatus;
