use std::path::PathBuf;
use tracing::debug;

use crate::config::RuntimeConfig;
use crate::files::{FileRegistry, MediaFile};
use crate::jobs::{Job, JobArgs, JobRecord};
use crate::navigation::{
    compress_items, execute_items, extract_items, file_actions_items, forget_items,
    remove_jobs_items, shift_items, slice_items, EditKey, EditOutcome, FieldEditor, FieldValue,
    ItemAction, MenuId, MenuItem, NavigationStack,
};
use crate::queue::{JobQueue, Rejection};
use crate::session_log::ActivityLog;
use crate::time_value::TimeValue;
use crate::tools::Tool;

/// Rows kept between the selected file and the edge of the list before it scrolls
pub const SCROLL_MARGIN: isize = 3;

const DEFAULT_VIEWPORT_ROWS: usize = 20;

/// Logical inputs, already decoded from raw keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Up,
    Down,
    Left,
    Right,
    Enter,
    Back,
    ToggleExecuteMenu,
    Digit(u8),
    Quit,
}

/// Something the caller has to do after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    None,
    Preview(PathBuf),
    Execute,
    Quit,
}

/// A field being edited in place: which item of the top menu, and the editor.
#[derive(Debug, Clone)]
pub struct ActiveEdit {
    pub item: usize,
    pub editor: FieldEditor,
}

/// The whole interactive state between startup and execution.
pub struct Session<'a> {
    config: &'a RuntimeConfig,
    log: &'a ActivityLog,
    files: FileRegistry,
    queue: JobQueue,
    nav: NavigationStack,
    editing: Option<ActiveEdit>,
    status: String,
    overlay: bool,
    viewport_rows: usize,
}

impl<'a> Session<'a> {
    pub fn new(files: FileRegistry, config: &'a RuntimeConfig, log: &'a ActivityLog) -> Self {
        let nav = NavigationStack::new(files.len());
        Self {
            config,
            log,
            files,
            queue: JobQueue::new(),
            nav,
            editing: None,
            status: "INIT".to_string(),
            overlay: false,
            viewport_rows: DEFAULT_VIEWPORT_ROWS,
        }
    }

    pub fn files(&self) -> &FileRegistry {
        &self.files
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn navigation(&self) -> &NavigationStack {
        &self.nav
    }

    pub fn editing(&self) -> Option<&ActiveEdit> {
        self.editing.as_ref()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// Whether the player controls panel is showing
    pub fn overlay_visible(&self) -> bool {
        self.overlay
    }

    pub fn selected_index(&self) -> usize {
        self.nav.root_selection()
    }

    pub fn selected_file(&self) -> Option<&MediaFile> {
        self.files.get(self.selected_index())
    }

    pub fn set_viewport_rows(&mut self, rows: usize) {
        self.viewport_rows = rows.max(1);
    }

    /// Hand the selection and queue over for execution.
    pub fn into_parts(self) -> (FileRegistry, JobQueue) {
        (self.files, self.queue)
    }

    pub fn handle(&mut self, event: InputEvent) -> SessionAction {
        if self.editing.is_some() {
            self.handle_edit(event);
            return SessionAction::None;
        }

        match event {
            InputEvent::Quit => return SessionAction::Quit,
            InputEvent::Up => self.move_up(),
            InputEvent::Down => self.move_down(),
            InputEvent::Enter | InputEvent::Right => return self.enter(),
            InputEvent::Back | InputEvent::Left => self.back(),
            InputEvent::ToggleExecuteMenu => self.toggle_execute(),
            InputEvent::Digit(_) => {}
        }
        SessionAction::None
    }

    fn handle_edit(&mut self, event: InputEvent) {
        let key = match event {
            InputEvent::Up => EditKey::Up,
            InputEvent::Down => EditKey::Down,
            InputEvent::Left => EditKey::Left,
            InputEvent::Right => EditKey::Right,
            InputEvent::Enter | InputEvent::Back => EditKey::Enter,
            InputEvent::Digit(d) => EditKey::Digit(d),
            InputEvent::ToggleExecuteMenu | InputEvent::Quit => return,
        };
        let Some(active) = self.editing.as_mut() else {
            return;
        };
        if active.editor.handle(key) == EditOutcome::Committed {
            let item = active.item;
            let value = active.editor.value();
            self.editing = None;
            if let Some(field) = self.nav.top_mut().and_then(|ctx| ctx.field_mut(item)) {
                field.value = value;
            }
            self.status = "OK".to_string();
        }
    }

    fn move_up(&mut self) {
        if self.nav.is_root() {
            let selected = self.nav.cursor().position();
            if selected > 0 {
                self.scroll_into_view(selected - 1);
            }
        }
        self.nav.cursor_mut().prev();
        self.status = "OK".to_string();
    }

    fn move_down(&mut self) {
        if self.nav.is_root() {
            let selected = self.nav.cursor().position();
            if selected + 1 < self.files.len() {
                self.scroll_into_view(selected + 1);
            }
        }
        self.nav.cursor_mut().next();
        self.status = "OK".to_string();
    }

    /// Scroll the file list one row at a time until `index` sits at least
    /// `SCROLL_MARGIN` rows from either edge, or the list runs out. Short
    /// viewports shrink the margin so the two edges never overlap.
    fn scroll_into_view(&mut self, index: usize) {
        let rows = self.viewport_rows as isize;
        let margin = SCROLL_MARGIN.min((rows - 1).max(0) / 2);
        loop {
            let Some(row) = self.files.get(index).map(|f| f.display_position) else {
                return;
            };
            let top = self.files.get(0).map_or(0, |f| f.display_position);
            let bottom = self.content_bottom();
            if row < margin && top < 0 {
                self.files.scroll(1);
            } else if row > rows - 1 - margin && bottom > rows - 1 {
                self.files.scroll(-1);
            } else {
                return;
            }
        }
    }

    /// Last row used by the file list, counting the extra job rows of the last file.
    fn content_bottom(&self) -> isize {
        self.files
            .iter()
            .map(|f| {
                let extra = self.queue.jobs_for(f.index).count().saturating_sub(1) as isize;
                f.display_position + extra
            })
            .max()
            .unwrap_or(0)
    }

    fn enter(&mut self) -> SessionAction {
        if self.files.is_empty() {
            self.status = "No files to work with".to_string();
            return SessionAction::None;
        }

        if self.nav.is_root() {
            self.nav.push(MenuId::FileActions, file_actions_items());
            return SessionAction::None;
        }
        let Some(item) = self.nav.current_item().cloned() else {
            return SessionAction::None;
        };

        match item {
            MenuItem::Field(field) => {
                let editor = FieldEditor::new(&field.value);
                self.status = editor.help().to_string();
                self.editing = Some(ActiveEdit {
                    item: self.nav.cursor().position(),
                    editor,
                });
            }
            MenuItem::Label { action, .. } => return self.activate(action),
        }
        SessionAction::None
    }

    fn activate(&mut self, action: ItemAction) -> SessionAction {
        match action {
            ItemAction::Open(id) => self.open_menu(id),
            ItemAction::AddJob => self.add_job_from_menu(),
            ItemAction::Preview => return self.preview(),
            ItemAction::RemoveJobs => self.remove_jobs(),
            ItemAction::Forget => self.forget(),
            ItemAction::Execute => return SessionAction::Execute,
        }
        SessionAction::None
    }

    fn open_menu(&mut self, id: MenuId) {
        let items = match id {
            MenuId::SliceParams => slice_items(),
            MenuId::CompressParams => compress_items(),
            MenuId::ExtractParams => extract_items(self.config.app.teletext_page),
            MenuId::ShiftParams => {
                let (shift, max) = self.shift_defaults(self.selected_index());
                shift_items(shift, max)
            }
            MenuId::RemoveJobs => remove_jobs_items(),
            MenuId::Forget => forget_items(),
            MenuId::FileActions => file_actions_items(),
            MenuId::Execute => execute_items(),
        };
        self.nav.push(id, items);
    }

    /// Defaults for a new shift job: start and length of the file's slice,
    /// or zero when it has none.
    pub fn shift_defaults(&self, file_index: usize) -> (TimeValue, TimeValue) {
        match self.queue.slice_for(file_index) {
            Some((start, end)) => (start, end - start),
            None => (TimeValue::ZERO, TimeValue::ZERO),
        }
    }

    fn preview(&mut self) -> SessionAction {
        if !self.config.tools.contains(Tool::Vlc) {
            self.status = format!(
                "Cannot preview video, since the program '{}' was not found",
                Tool::Vlc
            );
            return SessionAction::None;
        }
        match self.selected_file() {
            Some(file) => {
                let path = file.path();
                self.overlay = true;
                SessionAction::Preview(path)
            }
            None => SessionAction::None,
        }
    }

    fn add_job_from_menu(&mut self) {
        let Some(ctx) = self.nav.top() else {
            return;
        };
        let args = match job_args(ctx.id, &ctx.values()) {
            Ok(args) => args,
            Err(message) => {
                self.status = message;
                return;
            }
        };
        let job = Job::new(self.selected_index(), args);
        match self.add(job) {
            Ok(label) => {
                self.status = format!("Added job: {}", label);
                self.overlay = false;
                self.nav.pop_all();
            }
            Err(rejection) => self.status = rejection.to_string(),
        }
    }

    /// Queue a job and record it in the activity log. Returns its label.
    fn add(&mut self, job: Job) -> Result<String, Rejection> {
        let path = self
            .files
            .get(job.file_index)
            .map(|f| f.path())
            .ok_or(Rejection::UnknownFile(job.file_index))?;
        self.queue
            .add_job(job.clone(), &mut self.files, &self.config.tools)?;
        self.log.record_job_added(&JobRecord::new(&path, &job));
        Ok(job.label())
    }

    /// Run a job from an earlier session through the normal validation.
    pub fn replay(&mut self, record: &JobRecord) -> Result<(), Rejection> {
        let index = self
            .files
            .index_of_path(&record.file)
            .ok_or_else(|| Rejection::NotSelected(record.file.clone()))?;
        let label = self.add(Job::new(index, record.job.clone()))?;
        debug!("Reloaded {} for {:?}", label, record.file);
        Ok(())
    }

    fn remove_jobs(&mut self) {
        let index = self.selected_index();
        let removed = self.queue.remove_all_for_file(index, &mut self.files);
        if let Some(file) = self.files.get(index) {
            self.log
                .info(&format!("All jobs for \"{}\" removed", file.filename));
        }
        debug!("Removed {} jobs for file {}", removed, index);
        self.status = "All jobs for selected file removed".to_string();
        self.nav.pop_all();
    }

    fn forget(&mut self) {
        let index = self.selected_index();
        match self.queue.forget_file(index, &mut self.files) {
            Ok(file) => {
                self.status = format!("Forgot about \"{}\"", file.filename);
                self.log.info(&self.status);
                self.nav.pop_all();
                self.nav.resize_root(self.files.len());
            }
            Err(rejection) => self.status = rejection.to_string(),
        }
    }

    fn back(&mut self) {
        self.overlay = false;
        self.nav.pop();
    }

    fn toggle_execute(&mut self) {
        if self.nav.top_id() == Some(MenuId::Execute) {
            self.nav.pop();
        } else {
            self.nav.push(MenuId::Execute, execute_items());
        }
    }
}

/// Build typed job arguments from a parameter menu's field values.
fn job_args(menu: MenuId, values: &[&FieldValue]) -> Result<JobArgs, String> {
    let time = |i: usize| -> Result<TimeValue, String> {
        match values.get(i) {
            Some(FieldValue::Time(text)) => TimeValue::parse(text).map_err(|e| e.to_string()),
            _ => Err(format!("Missing time field {}", i)),
        }
    };

    match menu {
        MenuId::SliceParams => Ok(JobArgs::Slice {
            start: time(0)?,
            end: time(1)?,
        }),
        MenuId::CompressParams => Ok(JobArgs::Compress),
        MenuId::ExtractParams => match values.first() {
            Some(FieldValue::Digits(text)) => text
                .parse::<u16>()
                .map(|page| JobArgs::ExtractCc { page })
                .map_err(|_| format!("Invalid teletext page '{}'", text)),
            _ => Err("Missing teletext page".to_string()),
        },
        MenuId::ShiftParams => {
            let negative = match values.get(2) {
                Some(FieldValue::Toggle(b)) => *b,
                _ => true,
            };
            Ok(JobArgs::ShiftCc {
                shift: time(0)?,
                max: time(1)?,
                negative,
            })
        }
        other => Err(format!("{:?} does not create jobs", other)),
    }
}
