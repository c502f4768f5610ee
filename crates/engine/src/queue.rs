use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

use crate::files::{FileRegistry, MediaFile};
use crate::jobs::{Job, JobArgs, OperationKind};
use crate::time_value::TimeValue;
use crate::tools::{Tool, ToolSet};

/// Why a queue mutation was refused. The display text is what the status
/// line shows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Cannot add job of this type, since the program '{0}' was not found")]
    ToolMissing(Tool),
    #[error("Invalid operation for this filetype!")]
    InvalidOperationForType,
    #[error("Not added, already in job-list!")]
    Duplicate,
    #[error("Cannot slice from greater time to smaller ({start} > {end})")]
    InvalidRange { start: TimeValue, end: TimeValue },
    #[error("Cannot remove file with jobs pending")]
    JobsPending,
    #[error("No file with index {0}")]
    UnknownFile(usize),
    #[error("{0:?} is not among the selected files")]
    NotSelected(PathBuf),
}

/// Pending jobs, kept sorted by `(file_index, operation)` with at most one
/// job per pair.
#[derive(Debug, Clone, Default)]
pub struct JobQueue {
    jobs: Vec<Job>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn jobs_for(&self, file_index: usize) -> impl Iterator<Item = &Job> {
        self.jobs.iter().filter(move |j| j.file_index == file_index)
    }

    pub fn has_jobs_for(&self, file_index: usize) -> bool {
        self.jobs_for(file_index).next().is_some()
    }

    /// Start and end of the file's slice job, if it has one.
    pub fn slice_for(&self, file_index: usize) -> Option<(TimeValue, TimeValue)> {
        self.jobs_for(file_index).find_map(|j| match j.args {
            JobArgs::Slice { start, end } => Some((start, end)),
            _ => None,
        })
    }

    /// Validate and insert a job.
    ///
    /// Checks run in a fixed order: tool availability, file type, duplicate,
    /// then slice range. A file that gains its second or later job pushes the
    /// files below it down one row.
    pub fn add_job(
        &mut self,
        job: Job,
        files: &mut FileRegistry,
        tools: &ToolSet,
    ) -> Result<(), Rejection> {
        let file = files
            .get(job.file_index)
            .ok_or(Rejection::UnknownFile(job.file_index))?;
        check_job(&job, file, tools)?;

        if self
            .jobs_for(job.file_index)
            .any(|j| j.operation() == job.operation())
        {
            return Err(Rejection::Duplicate);
        }

        if let JobArgs::Slice { start, end } = job.args {
            if start > end {
                return Err(Rejection::InvalidRange { start, end });
            }
        }

        if self.has_jobs_for(job.file_index) {
            files.shift_rows_from(job.file_index + 1, 1);
        }

        debug!("Queued {} for file {}", job.label(), job.file_index);
        self.jobs.push(job);
        self.jobs.sort_by_key(Job::sort_key);
        Ok(())
    }

    /// Drop every job for the file and give back the extra rows it used.
    /// Returns the number of jobs removed.
    pub fn remove_all_for_file(&mut self, file_index: usize, files: &mut FileRegistry) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|j| j.file_index != file_index);
        let removed = before - self.jobs.len();
        if removed > 1 {
            files.shift_rows_from(file_index + 1, -((removed - 1) as isize));
        }
        removed
    }

    /// Remove a file from the selection. Refused while it still has jobs.
    pub fn forget_file(
        &mut self,
        file_index: usize,
        files: &mut FileRegistry,
    ) -> Result<MediaFile, Rejection> {
        if self.has_jobs_for(file_index) {
            return Err(Rejection::JobsPending);
        }
        let removed = files
            .forget(file_index)
            .ok_or(Rejection::UnknownFile(file_index))?;
        // Later files moved down one index; keep their jobs pointing at them
        for job in self.jobs.iter_mut().filter(|j| j.file_index > file_index) {
            job.file_index -= 1;
        }
        Ok(removed)
    }
}

fn check_job(job: &Job, file: &MediaFile, tools: &ToolSet) -> Result<(), Rejection> {
    if let Some(tool) = Tool::for_operation(job.operation()) {
        if !tools.contains(tool) {
            return Err(Rejection::ToolMissing(tool));
        }
    }
    if file.is_subtitle() && job.operation() != OperationKind::ShiftCc {
        return Err(Rejection::InvalidOperationForType);
    }
    Ok(())
}
