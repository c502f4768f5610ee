use anyhow::anyhow;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::commands::{template_for, Bindings};
use crate::config::RuntimeConfig;
use crate::files::{FileRegistry, MediaFile};
use crate::jobs::{Job, JobArgs, OperationKind};
use crate::relocate::{move_with_backup, RelocateError};
use crate::session_log::{ActivityLog, LogLevel};
use crate::subtitles::ShiftSpec;
use crate::tools::{StreamEvent, ToolCommand, ToolRunner};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("source file does not exist, cannot continue: {0:?}")]
    MissingArtifact(PathBuf),
    #[error("job {0} refers to a file that is no longer selected")]
    UnknownFile(usize),
    #[error("job {job} failed: {error:#}")]
    Tool { job: usize, error: anyhow::Error },
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<RelocateError> for ExecutionError {
    fn from(err: RelocateError) -> Self {
        match err {
            RelocateError::MissingSource(path) => ExecutionError::MissingArtifact(path),
            RelocateError::Io { from, source, .. } => ExecutionError::Io { path: from, source },
        }
    }
}

/// Receives what the batch is doing, for display.
pub trait ProgressSink {
    fn batch_started(&mut self, total: usize);
    fn job_started(&mut self, number: usize, total: usize, operation: OperationKind);
    fn progress(&mut self, text: &str, percent: Option<f64>);
    fn output_line(&mut self, text: &str);
    fn job_finished(&mut self, number: usize);
    fn file_finished(&mut self, file: &MediaFile, relocation: Option<&Relocation>);
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn batch_started(&mut self, _total: usize) {}
    fn job_started(&mut self, _number: usize, _total: usize, _operation: OperationKind) {}
    fn progress(&mut self, _text: &str, _percent: Option<f64>) {}
    fn output_line(&mut self, _text: &str) {}
    fn job_finished(&mut self, _number: usize) {}
    fn file_finished(&mut self, _file: &MediaFile, _relocation: Option<&Relocation>) {}
}

/// Intermediate outputs produced so far for the current file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactStack {
    pub subtitle: Option<PathBuf>,
    pub cut: Option<PathBuf>,
    pub compressed: Option<PathBuf>,
}

impl ArtifactStack {
    /// The newest artifact together with the accumulated name suffix and
    /// the extension it should carry at its destination.
    pub fn final_artifact(&self) -> Option<(&Path, String, &'static str)> {
        let mut suffix = String::new();
        let mut latest = None;
        if let Some(srt) = &self.subtitle {
            suffix.push_str("_TXT");
            latest = Some((srt.as_path(), "srt"));
        }
        if let Some(cut) = &self.cut {
            suffix.push_str("_CUT");
            latest = Some((cut.as_path(), "mkv"));
        }
        if let Some(cmp) = &self.compressed {
            suffix.push_str("_CMP");
            latest = Some((cmp.as_path(), "mkv"));
        }
        latest.map(|(path, ext)| (path, suffix, ext))
    }

    /// Where the final artifact of `file` goes inside `destination_dir`.
    pub fn destination(&self, file: &MediaFile, destination_dir: &Path) -> Option<(PathBuf, PathBuf)> {
        self.final_artifact().map(|(source, suffix, ext)| {
            let name = format!("{}{}.{}", file.stem(), suffix, ext);
            (source.to_path_buf(), destination_dir.join(name))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub file_index: usize,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub backup: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub jobs_run: usize,
    pub jobs_skipped: usize,
    pub relocated: Vec<Relocation>,
}

/// Runs the queue strictly in order, one job at a time, threading each
/// file's artifacts through its jobs.
pub struct BatchExecutor<'a, R: ToolRunner> {
    runner: R,
    config: &'a RuntimeConfig,
    log: &'a ActivityLog,
}

impl<'a, R: ToolRunner> BatchExecutor<'a, R> {
    pub fn new(runner: R, config: &'a RuntimeConfig, log: &'a ActivityLog) -> Self {
        Self {
            runner,
            config,
            log,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn into_runner(self) -> R {
        self.runner
    }

    pub async fn run(
        &mut self,
        jobs: &[Job],
        files: &FileRegistry,
        sink: &mut dyn ProgressSink,
    ) -> Result<ExecutionReport, ExecutionError> {
        let temp_dir = self.config.app.temp_dir.clone();
        std::fs::create_dir_all(&temp_dir).map_err(|source| ExecutionError::Io {
            path: temp_dir.clone(),
            source,
        })?;

        let total = jobs.len();
        let mut report = ExecutionReport::default();
        let mut stack = ArtifactStack::default();
        sink.batch_started(total);
        info!("Processing {} batch jobs", total);

        for (position, job) in jobs.iter().enumerate() {
            let number = position + 1;
            let file = files
                .get(job.file_index)
                .ok_or(ExecutionError::UnknownFile(job.file_index))?;

            if position == 0 || jobs[position - 1].file_index != job.file_index {
                stack = ArtifactStack::default();
            }

            let ran = self
                .run_job(number, total, job, file, &mut stack, sink)
                .await?;
            if ran {
                report.jobs_run += 1;
            } else {
                report.jobs_skipped += 1;
            }

            let last_for_file = jobs
                .get(position + 1)
                .map_or(true, |next| next.file_index != job.file_index);
            if last_for_file {
                let relocation = self.relocate(file, &stack)?;
                sink.file_finished(file, relocation.as_ref());
                report.relocated.extend(relocation);
            }
        }

        self.log
            .info(&format!("{} jobs processed successfully", report.jobs_run));
        Ok(report)
    }

    /// Returns false when the job had nothing to work on.
    async fn run_job(
        &mut self,
        number: usize,
        total: usize,
        job: &Job,
        file: &MediaFile,
        stack: &mut ArtifactStack,
        sink: &mut dyn ProgressSink,
    ) -> Result<bool, ExecutionError> {
        let tool_error = |error: anyhow::Error| ExecutionError::Tool { job: number, error };
        let temp_dir = &self.config.app.temp_dir;
        let original = file.path();

        if let JobArgs::ShiftCc {
            shift,
            max,
            negative,
        } = job.args
        {
            let target = if file.is_subtitle() {
                Some(original.clone())
            } else {
                stack.subtitle.clone()
            };
            let Some(target) = target else {
                warn!("No subtitles to shift for {:?}, skipping job {}", original, number);
                return Ok(false);
            };

            self.log.info(&format!("Started processing job {}", number));
            sink.job_started(number, total, job.operation());
            let spec = ShiftSpec::new(shift, max, negative);
            self.runner
                .shift_subtitles(&target, &spec)
                .map_err(tool_error)?;
            sink.output_line(&job.label());
            sink.job_finished(number);
            self.log.info(&format!("Finished processing job {}", number));
            return Ok(true);
        }

        let (command, artifact) = self
            .build_command(job, file, stack, temp_dir)
            .map_err(tool_error)?;

        self.log.info(&format!("CMD: {}", command));
        self.log.info(&format!("Started processing job {}", number));
        sink.job_started(number, total, job.operation());

        let verbose = self.config.verbose;
        let mut on_event = |event: StreamEvent| match &event {
            StreamEvent::Progress(text) => sink.progress(text, event.percent()),
            StreamEvent::Line(text) if verbose => sink.output_line(text),
            StreamEvent::Line(_) => {}
        };
        if let Err(e) = self.runner.run_tool(&command, &mut on_event).await {
            error!("Job {} failed: {:#}", number, e);
            self.log
                .entry(LogLevel::Error, &format!("Job {} failed: {:#}", number, e));
            return Err(tool_error(e));
        }

        match job.operation() {
            OperationKind::ExtractCc => stack.subtitle = Some(artifact),
            OperationKind::Slice => stack.cut = Some(artifact),
            OperationKind::Compress => stack.compressed = Some(artifact),
            OperationKind::ShiftCc => {}
        }

        sink.job_finished(number);
        self.log.info(&format!("Finished processing job {}", number));
        Ok(true)
    }

    fn build_command(
        &self,
        job: &Job,
        file: &MediaFile,
        stack: &ArtifactStack,
        temp_dir: &Path,
    ) -> anyhow::Result<(ToolCommand, PathBuf)> {
        let template = template_for(job.operation())
            .ok_or_else(|| anyhow!("{} has no external command", job.operation().as_str()))?;
        let original = file.path();
        let stem = file.stem();

        let (bindings, output, with_suffix) = match &job.args {
            JobArgs::ExtractCc { page } => {
                let output = temp_dir.join(format!("{}.srt", stem));
                let bindings = Bindings::new()
                    .set("output", path_arg(&output))
                    .set("page", page.to_string())
                    .set("input", path_arg(&original));
                (bindings, output, false)
            }
            JobArgs::Slice { start, end } => {
                let input = stack.cut.clone().unwrap_or_else(|| original.clone());
                let output = temp_dir.join(format!("{}_cut.mkv", stem));
                let bindings = Bindings::new()
                    .set("output", path_arg(&output))
                    .set("start", start.to_clock())
                    .set("end", end.to_clock())
                    .set("input", path_arg(&input));
                (bindings, output, false)
            }
            JobArgs::Compress => {
                let input = stack.cut.clone().unwrap_or_else(|| original.clone());
                let input_stem = input
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| stem.clone());
                let output = temp_dir.join(format!("{}_cmp.mkv", input_stem));
                let mut bindings = Bindings::new()
                    .set("quality", format_quality(self.config.app.compress_quality))
                    .set("output", path_arg(&output))
                    .set("input", path_arg(&input));
                let subtitles = subtitles_for(stack, file);
                if let Some(srt) = &subtitles {
                    bindings = bindings.set("subtitles", path_arg(srt));
                }
                (bindings, output, subtitles.is_some())
            }
            JobArgs::ShiftCc { .. } => {
                return Err(anyhow!("Shift CC runs in-process"));
            }
        };

        let command = template.render(&bindings, with_suffix)?;
        Ok((command, output))
    }

    fn relocate(
        &self,
        file: &MediaFile,
        stack: &ArtifactStack,
    ) -> Result<Option<Relocation>, ExecutionError> {
        let Some((source, destination)) = stack.destination(file, &self.config.destination_dir)
        else {
            return Ok(None);
        };

        match move_with_backup(&source, &destination) {
            Ok(backup) => {
                info!("Moved {:?} to {:?}", source, destination);
                Ok(Some(Relocation {
                    file_index: file.index,
                    source,
                    destination,
                    backup,
                }))
            }
            Err(e) => {
                self.log.critical(&e.to_string());
                error!("{}", e);
                Err(e.into())
            }
        }
    }
}

/// Subtitles to embed when compressing: the extracted track if there is
/// one, else a `.srt` next to the original.
fn subtitles_for(stack: &ArtifactStack, file: &MediaFile) -> Option<PathBuf> {
    if let Some(srt) = stack.subtitle.as_ref().filter(|p| p.exists()) {
        return Some(srt.clone());
    }
    let sibling = file.directory.join(format!("{}.srt", file.stem()));
    sibling.exists().then_some(sibling)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn format_quality(quality: f32) -> String {
    format!("{:.1}", quality)
}
