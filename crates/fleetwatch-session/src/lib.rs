//! Session orchestration and host storage.
//!
//! Provides:
//! - `SessionController` - Resolve a host, poll it, run client actions
//! - `Session` - Handle to one live client session
//! - Storage implementations (memory, SQLite)

pub mod controller;
pub mod storage;

pub use controller::{Session, SessionController, SessionError, SessionState};
