//! SSH-backed remote command execution.
//!
//! Provides:
//! - `SshShell` - Opens one password-authenticated connection per operation
//! - `SshSession` - Runs commands over that connection and collects their output

pub mod client;

pub use client::{SshSession, SshShell};
