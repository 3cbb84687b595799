//! Process supervision primitives
//!
//! Everything the supervisor needs to own an external OS process:
//!
//! - `spawn`  - start/stop a managed process with log redirection
//! - `table`  - process-table lookups by command-line signature
//! - `port`   - reclaim a TCP port from whatever is listening on it
//! - `health` - bounded-time condition polling

pub mod health;
pub mod port;
pub mod spawn;
pub mod table;

pub use spawn::{ManagedProcess, ProcessKind, SpawnSpec};
