//! Remote work against a single host.
//!
//! Provides:
//! - Command building for status listing and pipeline steps
//! - `poll_status` - Compose status snapshot that never fails
//! - `PipelineRunner` - Ordered, fail-fast pipeline actions

pub mod command;
pub mod pipeline;
pub mod status;

pub use command::{CommandBuildError, CommandBuilder, Plan, Step};
pub use pipeline::{PipelineOutcome, PipelineRunner, StepFailure, StepOutcome};
pub use status::{interpret_listing, poll_status};
