use anyhow::Result;
use movietools_engine::config::{AppConfig, RuntimeConfig};
use movietools_engine::executor::{BatchExecutor, ExecutionError, NullProgress};
use movietools_engine::files::FileRegistry;
use movietools_engine::jobs::{Job, JobArgs};
use movietools_engine::queue::JobQueue;
use movietools_engine::session_log::ActivityLog;
use movietools_engine::subtitles::ShiftSpec;
use movietools_engine::time_value::TimeValue;
use movietools_engine::tools::{StreamEvent, ToolCommand, ToolRunner, ToolSet};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Records every call and writes the declared output file, like a tool would.
#[derive(Default)]
struct RecordingRunner {
    commands: Vec<ToolCommand>,
    shifted: Vec<PathBuf>,
    create_outputs: bool,
}

impl RecordingRunner {
    fn new() -> Self {
        Self {
            create_outputs: true,
            ..Default::default()
        }
    }
}

impl ToolRunner for RecordingRunner {
    async fn run_tool(
        &mut self,
        command: &ToolCommand,
        on_event: &mut dyn FnMut(StreamEvent),
    ) -> Result<()> {
        on_event(StreamEvent::Progress("Progress: 50%".to_string()));
        on_event(StreamEvent::Line("working".to_string()));
        if self.create_outputs {
            if let Some(output) = command.value_of("-o") {
                fs::write(output, format!("made by {}", command.program))?;
            }
        }
        self.commands.push(command.clone());
        Ok(())
    }

    fn shift_subtitles(&mut self, path: &Path, _spec: &ShiftSpec) -> Result<()> {
        self.shifted.push(path.to_path_buf());
        Ok(())
    }
}

struct Fixture {
    _dir: TempDir,
    config: RuntimeConfig,
    files: FileRegistry,
    media: PathBuf,
}

fn fixture(names: &[&str]) -> Fixture {
    let dir = TempDir::new().unwrap();
    let media = dir.path().join("media");
    let temp = dir.path().join("scratch");
    let dest = dir.path().join("done");
    fs::create_dir_all(&media).unwrap();
    fs::create_dir_all(&dest).unwrap();

    let paths: Vec<PathBuf> = names
        .iter()
        .map(|n| {
            let p = media.join(n);
            fs::write(&p, b"original").unwrap();
            p
        })
        .collect();

    let app = AppConfig {
        temp_dir: temp,
        ..AppConfig::default()
    };
    let files = FileRegistry::from_paths(&paths, &app).unwrap();
    let media = files.get(0).unwrap().directory.clone();
    let config = RuntimeConfig::new(app, dest, ToolSet::all());
    Fixture {
        _dir: dir,
        config,
        files,
        media,
    }
}

fn queue_of(fx: &mut Fixture, jobs: Vec<Job>) -> JobQueue {
    let mut queue = JobQueue::new();
    for job in jobs {
        queue.add_job(job, &mut fx.files, &fx.config.tools).unwrap();
    }
    queue
}

fn slice(file: usize, start: &str, end: &str) -> Job {
    Job::new(
        file,
        JobArgs::Slice {
            start: TimeValue::parse(start).unwrap(),
            end: TimeValue::parse(end).unwrap(),
        },
    )
}

#[tokio::test]
async fn test_compress_consumes_cut_artifact() {
    let mut fx = fixture(&["movie.ts"]);
    let queue = queue_of(
        &mut fx,
        vec![Job::new(0, JobArgs::Compress), slice(0, "00:10:00", "00:20:00")],
    );
    let log = ActivityLog::disabled();
    let mut executor = BatchExecutor::new(RecordingRunner::new(), &fx.config, &log);

    let report = executor
        .run(queue.jobs(), &fx.files, &mut NullProgress)
        .await
        .unwrap();
    let runner = executor.into_runner();

    let original = fx.media.join("movie.ts");
    let cut = fx.config.app.temp_dir.join("movie_cut.mkv");
    assert_eq!(runner.commands.len(), 2);

    let splitter = &runner.commands[0];
    assert_eq!(splitter.program, "mkvmerge");
    assert_eq!(splitter.value_of("--split"), Some("parts:00:10:00-00:20:00"));
    assert_eq!(splitter.args.last().map(PathBuf::from), Some(original));

    let transcoder = &runner.commands[1];
    assert_eq!(transcoder.program, "HandBrakeCLI");
    assert_eq!(transcoder.value_of("-i").map(PathBuf::from), Some(cut));
    assert_eq!(transcoder.value_of("--srt-file"), None);

    assert_eq!(report.jobs_run, 2);
    assert_eq!(report.relocated.len(), 1);
    let moved = &report.relocated[0];
    assert_eq!(moved.destination, fx.config.destination_dir.join("movie_CUT_CMP.mkv"));
    assert_eq!(moved.backup, None);
    assert!(moved.destination.exists());
    assert!(!moved.source.exists());
}

#[tokio::test]
async fn test_existing_destination_is_backed_up() {
    let mut fx = fixture(&["movie.ts"]);
    let queue = queue_of(&mut fx, vec![Job::new(0, JobArgs::Compress)]);
    let existing = fx.config.destination_dir.join("movie_CMP.mkv");
    fs::write(&existing, b"older result").unwrap();

    let log = ActivityLog::disabled();
    let mut executor = BatchExecutor::new(RecordingRunner::new(), &fx.config, &log);
    let report = executor
        .run(queue.jobs(), &fx.files, &mut NullProgress)
        .await
        .unwrap();

    let backup = fx.config.destination_dir.join("movie_CMP.mkv_BACKUP0");
    assert_eq!(report.relocated[0].backup.as_ref(), Some(&backup));
    assert_eq!(fs::read(&backup).unwrap(), b"older result");
    assert_eq!(fs::read_to_string(&existing).unwrap(), "made by HandBrakeCLI");
}

#[tokio::test]
async fn test_missing_artifact_aborts_batch() {
    let mut fx = fixture(&["a.ts", "b.ts"]);
    let queue = queue_of(
        &mut fx,
        vec![Job::new(0, JobArgs::Compress), Job::new(1, JobArgs::Compress)],
    );
    let log = ActivityLog::disabled();
    let runner = RecordingRunner::default();
    let mut executor = BatchExecutor::new(runner, &fx.config, &log);

    let err = executor
        .run(queue.jobs(), &fx.files, &mut NullProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::MissingArtifact(_)));
    // The second file never started
    assert_eq!(executor.runner().commands.len(), 1);
}

#[tokio::test]
async fn test_extracted_subtitles_are_shifted_and_embedded() {
    let mut fx = fixture(&["show.ts"]);
    let shift = Job::new(
        0,
        JobArgs::ShiftCc {
            shift: TimeValue::from_hms(0, 0, 5),
            max: TimeValue::ZERO,
            negative: true,
        },
    );
    let queue = queue_of(
        &mut fx,
        vec![
            Job::new(0, JobArgs::Compress),
            shift,
            Job::new(0, JobArgs::ExtractCc { page: 398 }),
        ],
    );
    let log = ActivityLog::disabled();
    let mut executor = BatchExecutor::new(RecordingRunner::new(), &fx.config, &log);
    let report = executor
        .run(queue.jobs(), &fx.files, &mut NullProgress)
        .await
        .unwrap();
    let runner = executor.into_runner();

    let srt = fx.config.app.temp_dir.join("show.srt");
    assert_eq!(runner.commands[0].program, "ccextractor");
    assert_eq!(runner.commands[0].value_of("-tpage"), Some("398"));
    assert_eq!(runner.shifted, vec![srt.clone()]);
    assert_eq!(
        runner.commands[1].value_of("--srt-file").map(PathBuf::from),
        Some(srt)
    );
    assert_eq!(
        report.relocated[0].destination,
        fx.config.destination_dir.join("show_TXT_CMP.mkv")
    );
}

#[tokio::test]
async fn test_sibling_subtitles_are_embedded() {
    let mut fx = fixture(&["film.mkv"]);
    let sibling = fx.media.join("film.srt");
    fs::write(&sibling, b"1\n00:00:01,000 --> 00:00:02,000\nhi\n").unwrap();
    let queue = queue_of(&mut fx, vec![Job::new(0, JobArgs::Compress)]);

    let log = ActivityLog::disabled();
    let mut executor = BatchExecutor::new(RecordingRunner::new(), &fx.config, &log);
    executor
        .run(queue.jobs(), &fx.files, &mut NullProgress)
        .await
        .unwrap();
    let runner = executor.into_runner();
    assert_eq!(
        runner.commands[0].value_of("--srt-file").map(PathBuf::from),
        Some(sibling)
    );
}

#[tokio::test]
async fn test_shift_without_subtitles_is_skipped() {
    let mut fx = fixture(&["plain.ts"]);
    let shift = Job::new(
        0,
        JobArgs::ShiftCc {
            shift: TimeValue::ZERO,
            max: TimeValue::ZERO,
            negative: false,
        },
    );
    let queue = queue_of(&mut fx, vec![shift]);
    let log = ActivityLog::disabled();
    let mut executor = BatchExecutor::new(RecordingRunner::new(), &fx.config, &log);
    let report = executor
        .run(queue.jobs(), &fx.files, &mut NullProgress)
        .await
        .unwrap();

    assert_eq!(report.jobs_run, 0);
    assert_eq!(report.jobs_skipped, 1);
    assert!(report.relocated.is_empty());
    assert!(executor.runner().shifted.is_empty());
}

#[tokio::test]
async fn test_artifact_stack_resets_between_files() {
    let mut fx = fixture(&["one.ts", "two.ts"]);
    let queue = queue_of(
        &mut fx,
        vec![slice(0, "00:00:10", "00:00:20"), Job::new(1, JobArgs::Compress)],
    );
    let log = ActivityLog::disabled();
    let mut executor = BatchExecutor::new(RecordingRunner::new(), &fx.config, &log);
    let report = executor
        .run(queue.jobs(), &fx.files, &mut NullProgress)
        .await
        .unwrap();
    let runner = executor.into_runner();

    // The second file's compress must start from its own original
    assert_eq!(
        runner.commands[1].value_of("-i").map(PathBuf::from),
        Some(fx.media.join("two.ts"))
    );
    let names: Vec<_> = report
        .relocated
        .iter()
        .map(|r| r.destination.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["one_CUT.mkv", "two_CMP.mkv"]);
}

#[tokio::test]
async fn test_subtitle_input_is_shifted_in_place() {
    let mut fx = fixture(&["captions.srt"]);
    let shift = Job::new(
        0,
        JobArgs::ShiftCc {
            shift: TimeValue::from_hms(0, 0, 2),
            max: TimeValue::ZERO,
            negative: false,
        },
    );
    let queue = queue_of(&mut fx, vec![shift]);
    let log = ActivityLog::disabled();
    let mut executor = BatchExecutor::new(RecordingRunner::new(), &fx.config, &log);
    let report = executor
        .run(queue.jobs(), &fx.files, &mut NullProgress)
        .await
        .unwrap();

    assert_eq!(report.jobs_run, 1);
    assert!(report.relocated.is_empty());
    assert_eq!(executor.runner().shifted, vec![fx.media.join("captions.srt")]);
    assert!(executor.runner().commands.is_empty());
}
