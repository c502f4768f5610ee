use movietools_engine::executor::{ProgressSink, Relocation};
use movietools_engine::files::MediaFile;
use movietools_engine::jobs::OperationKind;
use ratatui::backend::Backend;
use ratatui::Terminal;
use tracing::warn;

use crate::ui;

/// Lines of tool output kept for the execution screen
const MAX_TRANSCRIPT: usize = 500;

/// What the execution screen shows.
#[derive(Debug, Clone, Default)]
pub struct ExecutionView {
    pub total: usize,
    pub current: usize,
    pub operation: Option<OperationKind>,
    /// Latest progress marker, e.g. `Encoding: task 1 of 1, 45.20 %`
    pub progress: String,
    pub percent: Option<f64>,
    pub transcript: Vec<String>,
    pub finished: bool,
}

impl ExecutionView {
    fn push(&mut self, line: String) {
        self.transcript.push(line);
        if self.transcript.len() > MAX_TRANSCRIPT {
            let excess = self.transcript.len() - MAX_TRANSCRIPT;
            self.transcript.drain(..excess);
        }
    }
}

/// Progress sink that redraws the execution screen after every event.
pub struct TerminalProgress<'t, B: Backend> {
    terminal: &'t mut Terminal<B>,
    view: ExecutionView,
}

impl<'t, B: Backend> TerminalProgress<'t, B> {
    pub fn new(terminal: &'t mut Terminal<B>) -> Self {
        Self {
            terminal,
            view: ExecutionView::default(),
        }
    }

    pub fn view(&self) -> &ExecutionView {
        &self.view
    }

    /// Mark the batch as done and show the closing prompt.
    pub fn finish(&mut self) {
        self.view.finished = true;
        self.redraw();
    }

    pub fn note(&mut self, line: impl Into<String>) {
        self.view.push(line.into());
        self.redraw();
    }

    fn redraw(&mut self) {
        if let Err(e) = self
            .terminal
            .draw(|f| ui::render_execution(f, &self.view))
        {
            warn!("Failed to draw execution screen: {}", e);
        }
    }
}

impl<B: Backend> ProgressSink for TerminalProgress<'_, B> {
    fn batch_started(&mut self, total: usize) {
        self.view.total = total;
        self.view.push(format!("Processing {} jobs", total));
        self.redraw();
    }

    fn job_started(&mut self, number: usize, total: usize, operation: OperationKind) {
        self.view.current = number;
        self.view.total = total;
        self.view.operation = Some(operation);
        self.view.progress.clear();
        self.view.percent = None;
        self.view.push(format!(
            "------ Running job {} of {}: ({}) ------",
            number,
            total,
            operation.as_str()
        ));
        self.redraw();
    }

    fn progress(&mut self, text: &str, percent: Option<f64>) {
        self.view.progress = text.to_string();
        if percent.is_some() {
            self.view.percent = percent;
        }
        self.redraw();
    }

    fn output_line(&mut self, text: &str) {
        self.view.push(format!("  {}", text));
        self.redraw();
    }

    fn job_finished(&mut self, number: usize) {
        self.view.push(format!("------ Job #{} done! ------", number));
        self.redraw();
    }

    fn file_finished(&mut self, file: &MediaFile, relocation: Option<&Relocation>) {
        self.view
            .push(format!("  All jobs processed for \"{}\"", file.filename));
        match relocation {
            Some(moved) => {
                if let Some(backup) = &moved.backup {
                    self.view
                        .push(format!("    Previous result kept as {:?}", backup));
                }
                self.view
                    .push(format!("    Processed file moved to {:?}", moved.destination));
            }
            None => self.view.push("    Nothing to move".to_string()),
        }
        self.redraw();
    }
}
