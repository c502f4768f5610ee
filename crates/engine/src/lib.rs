// Core job-queue engine modules

pub mod commands;
pub mod config;
pub mod executor;
pub mod files;
pub mod jobs;
pub mod navigation;
pub mod queue;
pub mod relocate;
pub mod session;
pub mod session_log;
pub mod subtitles;
pub mod time_value;
pub mod tools;

// Re-export commonly used types
pub use config::{AppConfig, RuntimeConfig};
pub use executor::{BatchExecutor, ExecutionError, ExecutionReport, ProgressSink};
pub use files::{FileRegistry, MediaFile};
pub use jobs::{Job, JobArgs, JobRecord, OperationKind};
pub use queue::{JobQueue, Rejection};
pub use session::{InputEvent, Session, SessionAction};
pub use session_log::ActivityLog;
pub use time_value::TimeValue;
pub use tools::{SystemToolRunner, Tool, ToolRunner, ToolSet};
