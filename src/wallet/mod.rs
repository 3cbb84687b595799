//! Wallet management
//!
//! - `secret` - in-memory credential wrapper with redacted display
//! - `store`  - wallet directories and the beam-wallet CLI (create,
//!   restore, delete, list)
//! - `api`    - lifecycle of the wallet-api serving process
//! - `broker` - owner-key export with the wallet.db lock handoff

pub mod api;
pub mod broker;
pub mod secret;
pub mod store;

pub use secret::Secret;
