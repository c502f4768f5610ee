use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::jobs::OperationKind;
use crate::subtitles::{shift_file, ShiftSpec};

/// External programs the batch and the preview rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tool {
    CcExtractor,
    MkvMerge,
    HandBrake,
    Vlc,
}

impl Tool {
    pub const ALL: [Tool; 4] = [Tool::CcExtractor, Tool::MkvMerge, Tool::HandBrake, Tool::Vlc];

    pub fn binary(&self) -> &'static str {
        match self {
            Tool::CcExtractor => "ccextractor",
            Tool::MkvMerge => "mkvmerge",
            Tool::HandBrake => "HandBrakeCLI",
            Tool::Vlc => "vlc",
        }
    }

    /// The program a job of this kind needs; subtitle shifting runs in-process.
    pub fn for_operation(operation: OperationKind) -> Option<Tool> {
        match operation {
            OperationKind::ExtractCc => Some(Tool::CcExtractor),
            OperationKind::ShiftCc => None,
            OperationKind::Slice => Some(Tool::MkvMerge),
            OperationKind::Compress => Some(Tool::HandBrake),
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

/// Tools found on this host, probed once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolSet {
    available: BTreeSet<Tool>,
}

impl ToolSet {
    pub fn probe() -> Self {
        let mut set = ToolSet::default();
        for tool in Tool::ALL {
            if probe_tool(tool.binary()) {
                debug!("Found {}", tool);
                set.available.insert(tool);
            } else {
                warn!("{} not found on PATH", tool);
            }
        }
        set
    }

    pub fn with(tools: &[Tool]) -> Self {
        Self {
            available: tools.iter().copied().collect(),
        }
    }

    pub fn all() -> Self {
        Self::with(&Tool::ALL)
    }

    pub fn contains(&self, tool: Tool) -> bool {
        self.available.contains(&tool)
    }

    pub fn iter(&self) -> impl Iterator<Item = Tool> + '_ {
        self.available.iter().copied()
    }
}

pub fn probe_tool(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Run a short command to completion and return its stdout.
pub fn run_external(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to execute {}", program))?;

    if !output.status.success() {
        return Err(anyhow!(
            "{} {} failed with exit code: {:?}",
            program,
            args.join(" "),
            output.status.code()
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub fn is_root() -> Result<bool> {
    let uid = run_external("id", &["-u"])?;
    Ok(uid.trim() == "0")
}

pub fn power_off() -> Result<()> {
    info!("Powering off host");
    run_external("shutdown", &["-h", "now"]).map(|_| ())
}

/// Start the video player on `path` unless one is already running.
/// Returns false when a player was already open.
pub fn launch_preview(path: &Path) -> Result<bool> {
    let running = run_external("pgrep", &["-x", Tool::Vlc.binary()])
        .map(|out| !out.trim().is_empty())
        .unwrap_or(false);
    if running {
        return Ok(false);
    }

    Command::new(Tool::Vlc.binary())
        .arg(path)
        .args(["--play-and-exit", "--no-fullscreen"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to start {}", Tool::Vlc))?;
    Ok(true)
}

/// A fully rendered external command: program plus argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Value following `flag`, e.g. the output path after `-o`
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(|s| s.as_str())
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// One unit of streamed tool output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Text up to and including a `%` marker
    Progress(String),
    /// A complete output line
    Line(String),
}

impl StreamEvent {
    /// Percentage carried by a progress marker, if it parses
    pub fn percent(&self) -> Option<f64> {
        static PERCENT: OnceLock<Option<Regex>> = OnceLock::new();
        let StreamEvent::Progress(text) = self else {
            return None;
        };
        let re = PERCENT
            .get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%$").ok())
            .as_ref()?;
        re.captures(text.trim_end())
            .and_then(|caps| caps[1].parse::<f64>().ok())
            .map(|p| p.clamp(0.0, 100.0))
    }
}

/// Splits a byte stream into progress markers and lines.
#[derive(Debug, Default)]
pub struct StreamSplitter {
    pending: Vec<u8>,
}

impl StreamSplitter {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for &byte in bytes {
            match byte {
                b'\n' | b'\r' => {
                    let text = self.take();
                    if !text.trim().is_empty() {
                        events.push(StreamEvent::Line(text));
                    }
                }
                b'%' => {
                    self.pending.push(byte);
                    events.push(StreamEvent::Progress(self.take().trim().to_string()));
                }
                _ => self.pending.push(byte),
            }
        }
        events
    }

    /// Flush whatever is left once the stream closes
    pub fn finish(&mut self) -> Option<StreamEvent> {
        let text = self.take();
        (!text.trim().is_empty()).then_some(StreamEvent::Line(text))
    }

    fn take(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// The seam between the batch executor and the outside world.
#[allow(async_fn_in_trait)]
pub trait ToolRunner {
    /// Run a command to completion, reporting its output as it streams.
    async fn run_tool(
        &mut self,
        command: &ToolCommand,
        on_event: &mut dyn FnMut(StreamEvent),
    ) -> Result<()>;

    /// Rewrite a subtitle file in place with shifted timings.
    fn shift_subtitles(&mut self, path: &Path, spec: &ShiftSpec) -> Result<()>;
}

/// Runs real processes on this host.
#[derive(Debug, Default)]
pub struct SystemToolRunner;

impl ToolRunner for SystemToolRunner {
    async fn run_tool(
        &mut self,
        command: &ToolCommand,
        on_event: &mut dyn FnMut(StreamEvent),
    ) -> Result<()> {
        use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
        use tokio::process::Command;

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| anyhow!("Failed to spawn {}: {}", command.program, e))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("Failed to capture stderr"))?;

        // Collect stderr for diagnostics
        let stderr_task = tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();
            let mut output = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                output.push(line);
            }
            output
        });

        let mut splitter = StreamSplitter::default();
        let mut buf = [0u8; 4096];
        loop {
            let read = stdout.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            for event in splitter.feed(&buf[..read]) {
                on_event(event);
            }
        }
        if let Some(event) = splitter.finish() {
            on_event(event);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| anyhow!("Failed to wait for {}: {}", command.program, e))?;

        let stderr_lines = stderr_task
            .await
            .map_err(|e| anyhow!("Failed to read stderr: {}", e))?;

        if !status.success() {
            let tail = stderr_lines.len().saturating_sub(20);
            return Err(anyhow!(
                "{} failed with exit code: {:?}\nStderr:\n{}",
                command.program,
                status.code(),
                stderr_lines[tail..].join("\n")
            ));
        }

        Ok(())
    }

    fn shift_subtitles(&mut self, path: &Path, spec: &ShiftSpec) -> Result<()> {
        let summary = shift_file(path, spec)?;
        debug!(
            "Shifted {:?}: kept {} of {} cues, backup at {:?}",
            path, summary.kept, summary.total, summary.backup
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tool_for_operation() {
        assert_eq!(Tool::for_operation(OperationKind::ExtractCc), Some(Tool::CcExtractor));
        assert_eq!(Tool::for_operation(OperationKind::Slice), Some(Tool::MkvMerge));
        assert_eq!(Tool::for_operation(OperationKind::Compress), Some(Tool::HandBrake));
        assert_eq!(Tool::for_operation(OperationKind::ShiftCc), None);
    }

    #[test]
    fn test_tool_set_membership() {
        let set = ToolSet::with(&[Tool::MkvMerge]);
        assert!(set.contains(Tool::MkvMerge));
        assert!(!set.contains(Tool::HandBrake));
        assert_eq!(ToolSet::all().iter().count(), Tool::ALL.len());
    }

    #[test]
    fn test_splitter_separates_progress_and_lines() {
        let mut splitter = StreamSplitter::default();
        let events = splitter.feed(b"Progress: 10%Progress: 55%\ndone writing\n\n");
        assert_eq!(
            events,
            vec![
                StreamEvent::Progress("Progress: 10%".to_string()),
                StreamEvent::Progress("Progress: 55%".to_string()),
                StreamEvent::Line("done writing".to_string()),
            ]
        );
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn test_splitter_keeps_partial_lines_between_chunks() {
        let mut splitter = StreamSplitter::default();
        assert!(splitter.feed(b"Encoding: task 1 of 1, 4").is_empty());
        let events = splitter.feed(b"2.50 %\rtrailing");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].percent(), Some(42.5));
        assert_eq!(splitter.finish(), Some(StreamEvent::Line("trailing".to_string())));
    }

    #[test]
    fn test_percent_only_for_progress() {
        assert_eq!(StreamEvent::Line("50%".to_string()).percent(), None);
        assert_eq!(StreamEvent::Progress("no number %".to_string()).percent(), None);
        assert_eq!(StreamEvent::Progress("Progress: 100%".to_string()).percent(), Some(100.0));
    }

    #[test]
    fn test_command_display_quotes_spaces() {
        let cmd = ToolCommand::new("mkvmerge")
            .arg("-o")
            .arg("/tmp/My Movie_cut.mkv")
            .arg("in.mkv");
        assert_eq!(cmd.to_string(), "mkvmerge -o '/tmp/My Movie_cut.mkv' in.mkv");
        assert_eq!(cmd.value_of("-o"), Some("/tmp/My Movie_cut.mkv"));
        assert_eq!(cmd.value_of("-i"), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Splitting never loses non-marker text, however the stream is chunked.
        #[test]
        fn prop_splitter_chunking_is_irrelevant(
            text in "[a-z0-9 %\n]{0,80}",
            cut in 0usize..80,
        ) {
            let bytes = text.as_bytes();
            let cut = cut.min(bytes.len());

            let mut whole = StreamSplitter::default();
            let mut expected = whole.feed(bytes);
            expected.extend(whole.finish());

            let mut chunked = StreamSplitter::default();
            let mut actual = chunked.feed(&bytes[..cut]);
            actual.extend(chunked.feed(&bytes[cut..]));
            actual.extend(chunked.finish());

            prop_assert_eq!(actual, expected);
        }
    }
}
