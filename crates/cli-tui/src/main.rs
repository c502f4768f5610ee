use anyhow::{bail, Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use movietools_engine::config::{load_config, AppConfig, RuntimeConfig, DEFAULT_CONFIG_PATH};
use movietools_engine::executor::BatchExecutor;
use movietools_engine::files::FileRegistry;
use movietools_engine::jobs::JobRecord;
use movietools_engine::relocate::quarantine_stale_artifacts;
use movietools_engine::session::{InputEvent, Session, SessionAction};
use movietools_engine::session_log::{parse_last_session, read_all, ActivityLog};
use movietools_engine::tools::{is_root, launch_preview, power_off, SystemToolRunner, ToolSet};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::Terminal;
use std::fs::OpenOptions;
use std::io::{stdout, Stdout};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod progress;
mod ui;

use progress::TerminalProgress;

/// Queue slicing, compression and closed-caption jobs for recorded video files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media files to work with
    files: Vec<PathBuf>,

    /// Power off the computer when all jobs are done (needs root)
    #[arg(short, long)]
    shutdown: bool,

    /// Show all output from external programs while executing
    #[arg(short, long)]
    verbose: bool,

    /// Print the activity log and exit
    #[arg(short, long)]
    log: bool,

    /// Rebuild the job queue of the previous session
    #[arg(short, long)]
    reload: bool,

    /// Move finished files to this directory
    #[arg(short, long, value_name = "DIR")]
    outdir: Option<PathBuf>,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

/// Diagnostics go to a file; the terminal belongs to the interface.
fn init_tracing(path: &Path) {
    let file = match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("  Cannot write trace log {:?}: {}", path, e);
            return;
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_target(false)
        .with_ansi(false)
        .init();
}

fn wait_for_enter(prompt: &str) -> Result<()> {
    eprintln!("{}", prompt);
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(())
}

/// Map a key to a session input. Unbound keys give `None`.
fn map_key(key: &KeyEvent) -> Option<InputEvent> {
    match key.code {
        KeyCode::Up => Some(InputEvent::Up),
        KeyCode::Down => Some(InputEvent::Down),
        KeyCode::Left => Some(InputEvent::Left),
        KeyCode::Right => Some(InputEvent::Right),
        KeyCode::Enter => Some(InputEvent::Enter),
        KeyCode::Esc => Some(InputEvent::Back),
        KeyCode::Char(' ') => Some(InputEvent::ToggleExecuteMenu),
        KeyCode::Char('q') => Some(InputEvent::Quit),
        KeyCode::Char(c) => c.to_digit(10).map(|d| InputEvent::Digit(d as u8)),
        _ => None,
    }
}

/// Jobs of the previous session, plus its files appended to the selection
/// when they still exist and are not selected already.
fn load_previous_session(
    app: &AppConfig,
    files: &mut FileRegistry,
) -> Result<Vec<JobRecord>> {
    let text = read_all(&app.activity_log)?;
    let records = parse_last_session(&text)?;
    for record in &records {
        if !record.file.exists() || files.index_of_path(&record.file).is_some() {
            continue;
        }
        if let Err(e) = files.push(&record.file, app) {
            warn!("Not reloading {:?}: {}", record.file, e);
        }
    }
    info!("Reloaded {} job records", records.len());
    Ok(records)
}

type Tui = Terminal<CrosstermBackend<Stdout>>;

/// Restores the terminal however the program leaves the screen.
struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
        let _ = crossterm::execute!(stdout(), crossterm::terminal::LeaveAlternateScreen);
    }
}

fn setup_terminal() -> Result<(Tui, TerminalGuard)> {
    crossterm::terminal::enable_raw_mode()?;
    let guard = TerminalGuard;
    let mut out = stdout();
    crossterm::execute!(out, crossterm::terminal::EnterAlternateScreen)?;
    let terminal = Terminal::new(CrosstermBackend::new(out))?;
    Ok((terminal, guard))
}

/// Next key press, ignoring releases and repeats.
fn next_key() -> Result<KeyEvent> {
    loop {
        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press {
                return Ok(key);
            }
        }
    }
}

/// Drive the session until the user executes or quits. Returns true to execute.
fn run_session<B: Backend>(terminal: &mut Terminal<B>, session: &mut Session) -> Result<bool> {
    loop {
        terminal.draw(|f| ui::render(f, session))?;

        let key = next_key()?;
        let Some(input) = map_key(&key) else {
            continue;
        };
        match session.handle(input) {
            SessionAction::None => {}
            SessionAction::Preview(path) => match launch_preview(&path) {
                Ok(true) => session.set_status("VLC started"),
                Ok(false) => session.set_status("VLC is already running!"),
                Err(e) => {
                    warn!("Preview failed: {:#}", e);
                    session.set_status(format!("{:#}", e));
                }
            },
            SessionAction::Execute => return Ok(true),
            SessionAction::Quit => return Ok(false),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
    let config_path = match args.config {
        Some(ref path) => Some(path.as_path()),
        None if default_path.exists() => Some(default_path.as_path()),
        None => None,
    };
    let app = load_config(config_path).context("Failed to load configuration")?;
    init_tracing(&app.trace_log);
    info!("movietools v{}", env!("CARGO_PKG_VERSION"));

    if args.log {
        let text = read_all(&app.activity_log)?;
        print!("{}", text);
        return Ok(());
    }

    let destination_dir = match args.outdir {
        Some(ref dir) if dir.is_dir() => dir
            .canonicalize()
            .with_context(|| format!("Failed to resolve {:?}", dir))?,
        Some(_) => bail!("Output directory does not exist! Exiting...."),
        None => std::env::current_dir().context("Failed to read the working directory")?,
    };

    let mut files = FileRegistry::from_paths(&args.files, &app)?;
    let records = if args.reload {
        load_previous_session(&app, &mut files)?
    } else {
        Vec::new()
    };
    if files.is_empty() {
        bail!("No files to work with. Cannot continue...");
    }

    if args.shutdown && !is_root().context("Failed to check user id")? {
        bail!("Cannot run shutdown on exit, unless run as root user! Exiting....");
    }

    let log = ActivityLog::open(&app.activity_log);
    if !log.is_enabled() {
        wait_for_enter(&format!(
            "  {:?} could not be accessed. Logging will be disabled. (Enter to continue)",
            app.activity_log
        ))?;
    }

    let tools = ToolSet::probe();
    info!("Tools found: {:?}", tools.iter().collect::<Vec<_>>());
    let stale = quarantine_stale_artifacts(&app.temp_dir)
        .with_context(|| format!("Failed to prepare {:?}", app.temp_dir))?;
    if !stale.is_empty() {
        info!("Set aside {} stale artifacts", stale.len());
    }

    let mut config = RuntimeConfig::new(app, destination_dir, tools);
    config.verbose = args.verbose;
    config.shutdown = args.shutdown;

    log.info("movietools started");
    let mut session = Session::new(files, &config, &log);
    let mut rejected = 0;
    for record in &records {
        if let Err(rejection) = session.replay(record) {
            warn!("Reloaded job for {:?} rejected: {}", record.file, rejection);
            rejected += 1;
        }
    }
    if !records.is_empty() {
        session.set_status(format!(
            "Reloaded {} jobs, {} rejected",
            records.len() - rejected,
            rejected
        ));
    }

    let (mut terminal, guard) = setup_terminal()?;
    if !run_session(&mut terminal, &mut session)? {
        drop(guard);
        log.info("Program terminated by user");
        println!("\n Program terminated by user\n");
        return Ok(());
    }

    let (files, queue) = session.into_parts();
    let mut sink = TerminalProgress::new(&mut terminal);
    let mut executor = BatchExecutor::new(SystemToolRunner, &config, &log);
    let outcome = executor.run(queue.jobs(), &files, &mut sink).await;
    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            error!("Batch aborted: {}", e);
            sink.note(format!("Batch aborted: {}", e));
            sink.note("Press any key to leave");
            next_key()?;
            drop(sink);
            drop(guard);
            log.info("Program terminated by error");
            return Err(e).context("Batch aborted");
        }
    };

    if config.shutdown {
        drop(sink);
        drop(guard);
        log.info("Program terminated normally");
        return power_off();
    }

    sink.finish();
    next_key()?;
    drop(sink);
    drop(guard);
    log.info("Program terminated normally");
    println!(
        "\n{} jobs processed, terminating normally\n",
        report.jobs_run
    );
    Ok(())
}
