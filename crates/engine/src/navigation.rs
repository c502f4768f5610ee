//! Nested menu state: contexts, cursors, and in-place field editing.
//!
//! Contexts carry only logical nesting and selection. Where a menu is drawn
//! is decided by the layout code from this state.

use crate::time_value::TimeValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgePolicy {
    /// Stop at the first and last position
    Clamp,
    /// Cycle around modulo the length
    Wrap,
}

/// Bounded position over `[0, len - 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    position: usize,
    len: usize,
    policy: EdgePolicy,
}

impl Cursor {
    pub fn new(len: usize, policy: EdgePolicy) -> Self {
        Self {
            position: 0,
            len,
            policy,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn policy(&self) -> EdgePolicy {
        self.policy
    }

    pub fn next(&mut self) {
        if self.len == 0 {
            return;
        }
        self.position = match self.policy {
            EdgePolicy::Clamp => (self.position + 1).min(self.len - 1),
            EdgePolicy::Wrap => (self.position + 1) % self.len,
        };
    }

    pub fn prev(&mut self) {
        if self.len == 0 {
            return;
        }
        self.position = match (self.policy, self.position) {
            (EdgePolicy::Clamp, 0) => 0,
            (EdgePolicy::Wrap, 0) => self.len - 1,
            (_, p) => p - 1,
        };
    }

    pub fn set(&mut self, position: usize) {
        self.position = position.min(self.len.saturating_sub(1));
    }

    /// Change the range, keeping the position inside it.
    pub fn resize(&mut self, len: usize) {
        self.len = len;
        self.set(self.position);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuId {
    FileActions,
    SliceParams,
    CompressParams,
    ExtractParams,
    ShiftParams,
    RemoveJobs,
    Forget,
    Execute,
}

/// What selecting a label item does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemAction {
    Open(MenuId),
    AddJob,
    Preview,
    RemoveJobs,
    Forget,
    Execute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Time(String),
    Digits(String),
    Toggle(bool),
}

impl FieldValue {
    pub fn time(value: TimeValue) -> Self {
        FieldValue::Time(value.to_clock())
    }

    pub fn display(&self) -> String {
        match self {
            FieldValue::Time(s) | FieldValue::Digits(s) => s.clone(),
            FieldValue::Toggle(b) => if *b { "True" } else { "False" }.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditableField {
    pub label: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuItem {
    Label { text: String, action: ItemAction },
    Field(EditableField),
}

impl MenuItem {
    pub fn label(text: &str, action: ItemAction) -> Self {
        MenuItem::Label {
            text: text.to_string(),
            action,
        }
    }

    pub fn field(label: &str, value: FieldValue) -> Self {
        MenuItem::Field(EditableField {
            label: label.to_string(),
            value,
        })
    }

    pub fn text(&self) -> &str {
        match self {
            MenuItem::Label { text, .. } => text,
            MenuItem::Field(field) => &field.label,
        }
    }

    /// Width in cells the item needs when drawn.
    pub fn width(&self) -> usize {
        match self {
            MenuItem::Label { text, .. } => text.chars().count(),
            MenuItem::Field(field) => {
                field.label.chars().count() + field.value.display().chars().count() + 2
            }
        }
    }
}

/// One level of nested selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuContext {
    pub id: MenuId,
    pub items: Vec<MenuItem>,
    /// Item that opened the child menu while one is stacked above this one
    pub highlighted: Option<usize>,
    /// Cursor of the level below, restored verbatim on pop
    pub parent_cursor: Cursor,
}

impl MenuContext {
    pub fn field(&self, index: usize) -> Option<&EditableField> {
        match self.items.get(index) {
            Some(MenuItem::Field(field)) => Some(field),
            _ => None,
        }
    }

    pub fn field_mut(&mut self, index: usize) -> Option<&mut EditableField> {
        match self.items.get_mut(index) {
            Some(MenuItem::Field(field)) => Some(field),
            _ => None,
        }
    }

    /// Field values in item order, skipping labels.
    pub fn values(&self) -> Vec<&FieldValue> {
        self.items
            .iter()
            .filter_map(|item| match item {
                MenuItem::Field(field) => Some(&field.value),
                MenuItem::Label { .. } => None,
            })
            .collect()
    }
}

pub fn file_actions_items() -> Vec<MenuItem> {
    vec![
        MenuItem::label("Slice", ItemAction::Open(MenuId::SliceParams)),
        MenuItem::label("Compress", ItemAction::Open(MenuId::CompressParams)),
        MenuItem::label("Extract CC", ItemAction::Open(MenuId::ExtractParams)),
        MenuItem::label("Shift CC", ItemAction::Open(MenuId::ShiftParams)),
        MenuItem::label("Remove Jobs", ItemAction::Open(MenuId::RemoveJobs)),
        MenuItem::label("Forget", ItemAction::Open(MenuId::Forget)),
    ]
}

pub fn slice_items() -> Vec<MenuItem> {
    vec![
        MenuItem::field("Start:", FieldValue::time(TimeValue::ZERO)),
        MenuItem::field("End:", FieldValue::time(TimeValue::ZERO)),
        MenuItem::label("Preview", ItemAction::Preview),
        MenuItem::label("<Add Job>", ItemAction::AddJob),
    ]
}

pub fn compress_items() -> Vec<MenuItem> {
    vec![MenuItem::label("<Add Job>", ItemAction::AddJob)]
}

pub fn extract_items(page: u16) -> Vec<MenuItem> {
    vec![
        MenuItem::field("Teletext page:", FieldValue::Digits(page.to_string())),
        MenuItem::label("<Add Job>", ItemAction::AddJob),
    ]
}

pub fn shift_items(shift: TimeValue, max: TimeValue) -> Vec<MenuItem> {
    vec![
        MenuItem::field("Shift:", FieldValue::time(shift)),
        MenuItem::field("Max:", FieldValue::time(max)),
        MenuItem::field("Negative:", FieldValue::Toggle(true)),
        MenuItem::label("<Add Job>", ItemAction::AddJob),
    ]
}

pub fn remove_jobs_items() -> Vec<MenuItem> {
    vec![MenuItem::label("<Remove>", ItemAction::RemoveJobs)]
}

pub fn forget_items() -> Vec<MenuItem> {
    vec![MenuItem::label("<Forget>", ItemAction::Forget)]
}

pub fn execute_items() -> Vec<MenuItem> {
    vec![MenuItem::label("Execute", ItemAction::Execute)]
}

/// The stack of open menus above the file list.
///
/// Exactly one cursor is active: the innermost context's, or the file list's
/// when nothing is pushed. Pushing parks the active cursor in the new
/// context; popping hands it back unchanged.
#[derive(Debug, Clone)]
pub struct NavigationStack {
    active: Cursor,
    contexts: Vec<MenuContext>,
}

impl NavigationStack {
    pub fn new(file_count: usize) -> Self {
        Self {
            active: Cursor::new(file_count, EdgePolicy::Clamp),
            contexts: Vec::new(),
        }
    }

    pub fn cursor(&self) -> &Cursor {
        &self.active
    }

    pub fn cursor_mut(&mut self) -> &mut Cursor {
        &mut self.active
    }

    pub fn depth(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_root(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn top(&self) -> Option<&MenuContext> {
        self.contexts.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut MenuContext> {
        self.contexts.last_mut()
    }

    pub fn top_id(&self) -> Option<MenuId> {
        self.top().map(|c| c.id)
    }

    pub fn contexts(&self) -> &[MenuContext] {
        &self.contexts
    }

    /// Index of the selected file, wherever the active cursor is.
    pub fn root_selection(&self) -> usize {
        match self.contexts.first() {
            Some(first) => first.parent_cursor.position(),
            None => self.active.position(),
        }
    }

    /// Item under the active cursor of the innermost menu
    pub fn current_item(&self) -> Option<&MenuItem> {
        self.top().and_then(|c| c.items.get(self.active.position()))
    }

    pub fn push(&mut self, id: MenuId, items: Vec<MenuItem>) {
        let position = self.active.position();
        if let Some(top) = self.contexts.last_mut() {
            top.highlighted = Some(position);
        }
        let child = Cursor::new(items.len(), EdgePolicy::Wrap);
        let parent_cursor = std::mem::replace(&mut self.active, child);
        self.contexts.push(MenuContext {
            id,
            items,
            highlighted: None,
            parent_cursor,
        });
    }

    pub fn pop(&mut self) -> Option<MenuContext> {
        let popped = self.contexts.pop()?;
        self.active = popped.parent_cursor;
        if let Some(top) = self.contexts.last_mut() {
            top.highlighted = None;
        }
        Some(popped)
    }

    pub fn pop_all(&mut self) {
        while self.pop().is_some() {}
    }

    /// Resize the file-list cursor after files were added or forgotten.
    pub fn resize_root(&mut self, file_count: usize) {
        match self.contexts.first_mut() {
            Some(first) => first.parent_cursor.resize(file_count),
            None => self.active.resize(file_count),
        }
    }
}

/// Outcome of one key while a field is being edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Editing,
    Committed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKey {
    Up,
    Down,
    Left,
    Right,
    Enter,
    Digit(u8),
}

/// In-place editor for one field.
///
/// Digit fields use a clamping cursor over the characters and hop over `:`
/// separators. Toggles flip on up and down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEditor {
    chars: Vec<char>,
    cursor: Cursor,
    toggle: Option<bool>,
    kind: FieldValue,
}

impl FieldEditor {
    pub fn new(value: &FieldValue) -> Self {
        let (chars, toggle) = match value {
            FieldValue::Time(s) | FieldValue::Digits(s) => (s.chars().collect::<Vec<_>>(), None),
            FieldValue::Toggle(b) => (Vec::new(), Some(*b)),
        };
        Self {
            cursor: Cursor::new(chars.len(), EdgePolicy::Clamp),
            chars,
            toggle,
            kind: value.clone(),
        }
    }

    pub fn position(&self) -> usize {
        self.cursor.position()
    }

    pub fn is_toggle(&self) -> bool {
        self.toggle.is_some()
    }

    pub fn help(&self) -> &'static str {
        if self.is_toggle() {
            "UP/DOWN changes state, ENTER accepts changes"
        } else {
            "UP/DOWN cycles digit, ENTER accepts changes"
        }
    }

    pub fn value(&self) -> FieldValue {
        let text: String = self.chars.iter().collect();
        match (&self.kind, self.toggle) {
            (_, Some(b)) => FieldValue::Toggle(b),
            (FieldValue::Time(_), None) => FieldValue::Time(text),
            _ => FieldValue::Digits(text),
        }
    }

    pub fn handle(&mut self, key: EditKey) -> EditOutcome {
        if let Some(state) = self.toggle.as_mut() {
            return match key {
                EditKey::Up | EditKey::Down => {
                    *state = !*state;
                    EditOutcome::Editing
                }
                EditKey::Left | EditKey::Enter => EditOutcome::Committed,
                _ => EditOutcome::Editing,
            };
        }

        match key {
            EditKey::Up => self.adjust(1),
            EditKey::Down => self.adjust(-1),
            EditKey::Right => self.advance(),
            EditKey::Left => {
                if self.cursor.position() == 0 {
                    return EditOutcome::Committed;
                }
                self.retreat();
            }
            EditKey::Enter => return EditOutcome::Committed,
            EditKey::Digit(d) => {
                if let (Some(slot), Some(c)) = (
                    self.chars.get_mut(self.cursor.position()),
                    char::from_digit(d as u32, 10),
                ) {
                    if slot.is_ascii_digit() {
                        *slot = c;
                    }
                }
                self.advance();
            }
        }
        EditOutcome::Editing
    }

    fn adjust(&mut self, delta: i32) {
        if let Some(slot) = self.chars.get_mut(self.cursor.position()) {
            if let Some(digit) = slot.to_digit(10) {
                let next = (digit as i32 + delta).clamp(0, 9) as u32;
                if let Some(c) = char::from_digit(next, 10) {
                    *slot = c;
                }
            }
        }
    }

    fn on_separator(&self) -> bool {
        self.chars
            .get(self.cursor.position())
            .is_some_and(|c| !c.is_ascii_digit())
    }

    // Separators (`:` and the `.`/`,` before milliseconds) are never edited
    fn advance(&mut self) {
        let mut last = self.cursor.position();
        self.cursor.next();
        while self.on_separator() && self.cursor.position() != last {
            last = self.cursor.position();
            self.cursor.next();
        }
    }

    fn retreat(&mut self) {
        let mut last = self.cursor.position();
        self.cursor.prev();
        while self.on_separator() && self.cursor.position() != last {
            last = self.cursor.position();
            self.cursor.prev();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_with_fraction_keeps_separator() {
        let mut editor = FieldEditor::new(&FieldValue::Time("00:10:00.250".to_string()));
        for d in [0, 0, 1, 1, 0, 5, 9, 9, 9] {
            assert_eq!(editor.handle(EditKey::Digit(d)), EditOutcome::Editing);
        }
        assert_eq!(editor.value(), FieldValue::Time("00:11:05.999".to_string()));

        // Stepping back over the fraction point lands on the seconds digit
        for _ in 0..3 {
            editor.handle(EditKey::Left);
        }
        assert_eq!(editor.position(), 7);
        editor.handle(EditKey::Up);
        assert_eq!(editor.value(), FieldValue::Time("00:11:06.999".to_string()));
    }

    #[test]
    fn test_cursor_policies() {
        let mut wrap = Cursor::new(3, EdgePolicy::Wrap);
        wrap.prev();
        assert_eq!(wrap.position(), 2);
        wrap.next();
        assert_eq!(wrap.position(), 0);

        let mut clamp = Cursor::new(3, EdgePolicy::Clamp);
        clamp.prev();
        assert_eq!(clamp.position(), 0);
        for _ in 0..5 {
            clamp.next();
        }
        assert_eq!(clamp.position(), 2);

        let mut empty = Cursor::new(0, EdgePolicy::Wrap);
        empty.next();
        empty.prev();
        assert_eq!(empty.position(), 0);
    }

    #[test]
    fn test_push_marks_parent_highlight() {
        let mut nav = NavigationStack::new(2);
        nav.push(MenuId::FileActions, file_actions_items());
        nav.cursor_mut().set(3);
        nav.push(MenuId::ShiftParams, shift_items(TimeValue::ZERO, TimeValue::ZERO));
        assert_eq!(nav.contexts()[0].highlighted, Some(3));

        nav.pop();
        assert_eq!(nav.contexts()[0].highlighted, None);
        assert_eq!(nav.cursor().position(), 3);
        assert_eq!(nav.top_id(), Some(MenuId::FileActions));
    }

    #[test]
    fn test_time_editing_skips_separators() {
        let mut editor = FieldEditor::new(&FieldValue::Time("00:00:00".to_string()));
        assert_eq!(editor.handle(EditKey::Digit(1)), EditOutcome::Editing);
        editor.handle(EditKey::Digit(2));
        // Landed after the first separator
        assert_eq!(editor.position(), 3);
        editor.handle(EditKey::Up);
        editor.handle(EditKey::Up);
        editor.handle(EditKey::Left);
        assert_eq!(editor.position(), 1);
        editor.handle(EditKey::Down);
        assert_eq!(editor.value(), FieldValue::Time("11:20:00".to_string()));

        // Digits never carry past 9 or below 0
        editor.handle(EditKey::Left);
        editor.handle(EditKey::Down);
        editor.handle(EditKey::Down);
        assert_eq!(editor.value(), FieldValue::Time("01:20:00".to_string()));
        assert_eq!(editor.handle(EditKey::Left), EditOutcome::Committed);
    }

    #[test]
    fn test_editing_clamps_at_end() {
        let mut editor = FieldEditor::new(&FieldValue::Digits("398".to_string()));
        for d in [7, 7, 7, 1] {
            editor.handle(EditKey::Digit(d));
        }
        assert_eq!(editor.value(), FieldValue::Digits("771".to_string()));
        assert_eq!(editor.position(), 2);
        assert_eq!(editor.handle(EditKey::Enter), EditOutcome::Committed);
    }

    #[test]
    fn test_toggle_editing() {
        let mut editor = FieldEditor::new(&FieldValue::Toggle(true));
        assert!(editor.help().starts_with("UP/DOWN changes state"));
        editor.handle(EditKey::Up);
        editor.handle(EditKey::Digit(4));
        assert_eq!(editor.value(), FieldValue::Toggle(false));
        assert_eq!(editor.handle(EditKey::Left), EditOutcome::Committed);
    }
}
