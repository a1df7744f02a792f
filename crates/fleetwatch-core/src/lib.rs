//! Core types for monitoring and driving a fleet of compose hosts.
//!
//! This crate provides the fundamental building blocks:
//! - `HostRecord` - Host metadata read on every poll and action
//! - `classify` - Active compose configuration to environment label
//! - `StatusSnapshot`, `PipelineEvent`, `SessionEvent` - What a client receives
//! - `Settings` - Process-wide login, timings and remote layout
//! - Storage, remote shell and sink traits

pub mod classify;
pub mod event;
pub mod host;
pub mod settings;
pub mod traits;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use classify::{ConfigStatus, classify, classify_raw, split_config_files};
pub use event::{Action, Phase, PipelineEvent, SessionEvent, StatusSnapshot, UnknownAction};
pub use host::{HostId, HostRecord, SshTarget};
pub use settings::{Login, RemoteLayout, Settings};
pub use traits::{
    CommandOutput, EventSink, HostStore, RemoteCommand, RemoteSession, RemoteShell, ShellError,
    StoreError,
};
