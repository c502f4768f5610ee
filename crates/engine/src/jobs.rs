use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::time_value::TimeValue;

/// The operations a job can request.
///
/// Declaration order is execution order within one file: captions are
/// extracted before they are shifted, and a file is sliced before it is
/// compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    ExtractCc,
    ShiftCc,
    Slice,
    Compress,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::ExtractCc,
        OperationKind::ShiftCc,
        OperationKind::Slice,
        OperationKind::Compress,
    ];

    /// Short name shown in the execution screen headers
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::ExtractCc => "Extract",
            OperationKind::ShiftCc => "Shift",
            OperationKind::Slice => "Slice",
            OperationKind::Compress => "Compress",
        }
    }
}

/// Typed arguments of a job, one variant per operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum JobArgs {
    ExtractCc {
        page: u16,
    },
    ShiftCc {
        shift: TimeValue,
        max: TimeValue,
        negative: bool,
    },
    Slice {
        start: TimeValue,
        end: TimeValue,
    },
    Compress,
}

impl JobArgs {
    pub fn operation(&self) -> OperationKind {
        match self {
            JobArgs::ExtractCc { .. } => OperationKind::ExtractCc,
            JobArgs::ShiftCc { .. } => OperationKind::ShiftCc,
            JobArgs::Slice { .. } => OperationKind::Slice,
            JobArgs::Compress => OperationKind::Compress,
        }
    }
}

/// One requested operation on one file.
///
/// `file_index` is a lookup key into the file registry, never an owning
/// reference. Two jobs are equal only if the file and every argument match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub file_index: usize,
    pub args: JobArgs,
}

impl Job {
    pub fn new(file_index: usize, args: JobArgs) -> Self {
        Self { file_index, args }
    }

    pub fn operation(&self) -> OperationKind {
        self.args.operation()
    }

    /// Queue ordering key; keeps a file's jobs contiguous and in execution order
    pub fn sort_key(&self) -> (usize, OperationKind) {
        (self.file_index, self.operation())
    }

    pub fn label(&self) -> String {
        match &self.args {
            JobArgs::ExtractCc { page } => format!("Extract ttpage {}", page),
            JobArgs::ShiftCc {
                shift,
                max,
                negative,
            } => {
                let direction = if *negative { "<--" } else { "-->" };
                format!("Shift CC {} ({}), Capped at {}", shift, direction, max)
            }
            JobArgs::Slice { start, end } => format!("Slice: ({} --> {})", start, end),
            JobArgs::Compress => "Compress file (and add CC, if any)".to_string(),
        }
    }
}

/// Serialized form of an added job, written to the activity log so a later
/// run can rebuild the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub file: PathBuf,
    pub label: String,
    pub job: JobArgs,
}

impl JobRecord {
    pub fn new(file: &Path, job: &Job) -> Self {
        Self {
            file: file.to_path_buf(),
            label: job.label(),
            job: job.args.clone(),
        }
    }
}
