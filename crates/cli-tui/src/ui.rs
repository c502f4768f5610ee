//! Layout: turns session state into widgets. Nothing here mutates the queue
//! or the menus; the only thing written back is the file list's viewport height.

use movietools_engine::files::ColorTag;
use movietools_engine::navigation::{MenuContext, MenuId, MenuItem};
use movietools_engine::session::Session;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, Paragraph},
    Frame,
};

use crate::progress::ExecutionView;

const PLAYER_CONTROLS: [(&str, &str); 7] = [
    ("Pause", "<Space>"),
    ("Faster", "<+>"),
    ("Slower", "<->"),
    ("10 sec backwards", "<ALT + LEFT>"),
    ("10 sec forwards", "<ALT + RIGHT>"),
    ("1 min backwards", "<CTRL + LEFT>"),
    ("1 min forwards", "<CTRL + RIGHT>"),
];

#[derive(Debug, Clone)]
struct Palette {
    file_even: Color,
    file_odd: Color,
    selected: Color,
    border: Color,
    menu_border: Color,
    field_value: Color,
    status_bg: Color,
    status_fg: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            file_even: Color::White,
            file_odd: Color::Cyan,
            selected: Color::Yellow,
            border: Color::DarkGray,
            menu_border: Color::Green,
            field_value: Color::LightBlue,
            status_bg: Color::Blue,
            status_fg: Color::White,
        }
    }
}

impl Palette {
    fn row(&self, color: ColorTag) -> Style {
        match color {
            ColorTag::Even => Style::default().fg(self.file_even),
            ColorTag::Odd => Style::default().fg(self.file_odd),
        }
    }

    fn highlight(&self) -> Style {
        Style::default()
            .fg(self.selected)
            .add_modifier(Modifier::BOLD)
    }

    fn cursor(&self) -> Style {
        Style::default()
            .fg(Color::Black)
            .bg(self.selected)
            .add_modifier(Modifier::BOLD)
    }
}

/// Draw the interactive screen.
pub fn render(f: &mut Frame, session: &mut Session) {
    let palette = Palette::default();
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(f.area());

    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(outer[0]);

    let rows = panes[0].height.saturating_sub(2) as usize;
    session.set_viewport_rows(rows);

    render_files(f, session, panes[0], &palette);
    render_jobs(f, session, panes[1], &palette);
    render_menus(f, session, panes[0], &palette);
    if session.overlay_visible() {
        render_player_controls(f, &palette);
    }
    render_status(f, session.status(), outer[1], &palette);
}

fn more_title(hidden: usize) -> Line<'static> {
    if hidden == 0 {
        Line::default()
    } else {
        Line::from(format!(" [{} more] ", hidden))
    }
}

/// Keep the tail of a long name, which is where episodes differ.
fn shorten(name: &str, width: usize) -> String {
    let len = name.chars().count();
    if len <= width || width < 8 {
        return name.to_string();
    }
    let keep = width - 6;
    let tail: String = name.chars().skip(len - keep).collect();
    format!("[<--] {}", tail)
}

fn render_files(f: &mut Frame, session: &Session, area: Rect, palette: &Palette) {
    let rows = area.height.saturating_sub(2) as usize;
    let width = area.width.saturating_sub(2) as usize;
    let selected = session.selected_index();

    let mut lines = vec![Line::default(); rows];
    let mut hidden = 0;
    for file in session.files().iter() {
        let row = file.display_position;
        if row < 0 || row as usize >= rows {
            hidden += 1;
            continue;
        }
        let style = if file.index == selected {
            palette.highlight()
        } else {
            palette.row(file.color)
        };
        lines[row as usize] = Line::from(Span::styled(shorten(&file.filename, width), style));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(palette.border))
        .title("Media Files:")
        .title_bottom(more_title(hidden));
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_jobs(f: &mut Frame, session: &Session, area: Rect, palette: &Palette) {
    let rows = area.height.saturating_sub(2) as usize;
    let selected = session.selected_index();

    let mut lines = vec![Line::default(); rows];
    let mut hidden = 0;
    let mut previous = None;
    let mut offset = 0isize;
    for job in session.queue().jobs() {
        if previous != Some(job.file_index) {
            previous = Some(job.file_index);
            offset = 0;
        }
        let Some(file) = session.files().get(job.file_index) else {
            continue;
        };
        let row = file.display_position + offset;
        offset += 1;
        if row < 0 || row as usize >= rows {
            hidden += 1;
            continue;
        }
        let style = if job.file_index == selected {
            palette.highlight()
        } else {
            palette.row(file.color)
        };
        lines[row as usize] = Line::from(Span::styled(job.label(), style));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(palette.border))
        .title("Jobs:")
        .title_bottom(more_title(hidden));
    f.render_widget(Paragraph::new(lines).block(block), area);
}

/// Text of one menu row, with the value right-aligned for fields.
fn item_line(
    item: &MenuItem,
    inner_width: usize,
    style: Style,
    edit: Option<(String, Option<usize>)>,
    palette: &Palette,
) -> Line<'static> {
    match item {
        MenuItem::Label { text, .. } => Line::from(Span::styled(text.clone(), style)),
        MenuItem::Field(field) => {
            let (value, caret) = edit.unwrap_or_else(|| (field.value.display(), None));
            let gap = inner_width
                .saturating_sub(field.label.chars().count() + value.chars().count())
                .max(1);
            let mut spans = vec![
                Span::styled(field.label.clone(), style),
                Span::raw(" ".repeat(gap)),
            ];
            let value_style = Style::default().fg(palette.field_value);
            match caret {
                Some(pos) => {
                    for (i, c) in value.chars().enumerate() {
                        let s = if i == pos {
                            value_style.add_modifier(Modifier::REVERSED)
                        } else {
                            value_style
                        };
                        spans.push(Span::styled(c.to_string(), s));
                    }
                }
                None => spans.push(Span::styled(value, value_style)),
            }
            Line::from(spans)
        }
    }
}

fn menu_rect(ctx: &MenuContext, x: u16, y: u16, frame: Rect) -> Rect {
    let inner = ctx.items.iter().map(MenuItem::width).max().unwrap_or(0) as u16 + 2;
    let width = (inner + 2).min(frame.width);
    let height = (ctx.items.len() as u16 + 2).min(frame.height);
    let x = x.min(frame.right().saturating_sub(width));
    let y = y.min(frame.bottom().saturating_sub(height));
    Rect::new(x, y, width, height)
}

fn render_menus(f: &mut Frame, session: &Session, files_area: Rect, palette: &Palette) {
    let frame = f.area();
    let nav = session.navigation();
    let contexts = nav.contexts();
    let selected_row = session
        .selected_file()
        .map_or(0, |file| file.display_position.max(0) as u16);

    let mut anchor = (
        files_area.x + files_area.width / 3,
        files_area.y + 1 + selected_row,
    );
    for (depth, ctx) in contexts.iter().enumerate() {
        let is_top = depth + 1 == contexts.len();
        let area = if ctx.id == MenuId::Execute {
            let probe = menu_rect(ctx, 0, 0, frame);
            let x = frame.x + frame.width.saturating_sub(probe.width) / 2;
            let y = frame.y + frame.height.saturating_sub(probe.height) / 2;
            menu_rect(ctx, x, y, frame)
        } else {
            menu_rect(ctx, anchor.0, anchor.1, frame)
        };
        let inner_width = area.width.saturating_sub(4) as usize;

        let active = if is_top {
            Some(nav.cursor().position())
        } else {
            ctx.highlighted
        };
        let lines: Vec<Line> = ctx
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let style = match active {
                    Some(p) if p == i && is_top => palette.cursor(),
                    Some(p) if p == i => palette.highlight(),
                    _ => Style::default(),
                };
                let edit = session
                    .editing()
                    .filter(|e| is_top && e.item == i)
                    .map(|e| {
                        let caret = (!e.editor.is_toggle()).then(|| e.editor.position());
                        (e.editor.value().display(), caret)
                    });
                item_line(item, inner_width, style, edit, palette)
            })
            .collect();

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.menu_border));
        f.render_widget(Clear, area);
        f.render_widget(Paragraph::new(lines).block(block), area);

        // Children open to the right, level with the item that opened them
        let opener = ctx.highlighted.unwrap_or(0) as u16;
        anchor = (area.right().saturating_sub(2), area.y + 1 + opener);
    }
}

fn render_player_controls(f: &mut Frame, palette: &Palette) {
    let frame = f.area();
    let label_width = PLAYER_CONTROLS
        .iter()
        .map(|(label, key)| label.len() + key.len() + 2)
        .max()
        .unwrap_or(0) as u16;
    let width = (label_width + 4).min(frame.width);
    let height = (PLAYER_CONTROLS.len() as u16 + 2).min(frame.height);
    let area = Rect::new(
        frame.x + frame.width.saturating_sub(width) / 2,
        frame.bottom().saturating_sub(height + 1),
        width,
        height,
    );

    let inner = width.saturating_sub(4) as usize;
    let lines: Vec<Line> = PLAYER_CONTROLS
        .iter()
        .map(|(label, key)| {
            let gap = inner.saturating_sub(label.len() + key.len()).max(1);
            Line::from(vec![
                Span::raw(label.to_string()),
                Span::raw(" ".repeat(gap)),
                Span::styled(key.to_string(), Style::default().fg(palette.field_value)),
            ])
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(palette.menu_border))
        .title(" VLC Controls ");
    f.render_widget(Clear, area);
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_status(f: &mut Frame, status: &str, area: Rect, palette: &Palette) {
    let style = Style::default().fg(palette.status_fg).bg(palette.status_bg);
    let line = Line::from(vec![
        Span::styled("Status: ", style.add_modifier(Modifier::BOLD)),
        Span::styled(status.to_string(), style),
    ]);
    f.render_widget(Paragraph::new(line).style(style), area);
}

/// Draw the execution screen.
pub fn render_execution(f: &mut Frame, view: &ExecutionView) {
    let palette = Palette::default();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(f.area());

    let title = match view.operation {
        Some(op) => format!(" Job {} of {}: {} ", view.current, view.total, op.as_str()),
        None => format!(" {} jobs queued ", view.total),
    };
    let ratio = view.percent.map_or(0.0, |p| (p / 100.0).clamp(0.0, 1.0));
    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.border))
                .title(title),
        )
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio)
        .label(view.progress.clone());
    f.render_widget(gauge, chunks[0]);

    let visible = chunks[1].height.saturating_sub(2) as usize;
    let start = view.transcript.len().saturating_sub(visible);
    let lines: Vec<Line> = view.transcript[start..]
        .iter()
        .map(|l| Line::from(l.as_str()))
        .collect();
    let transcript = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.border))
            .title("Output"),
    );
    f.render_widget(transcript, chunks[1]);

    let footer = if view.finished {
        "  All files processed, press any key"
    } else {
        "  Working..."
    };
    render_status(f, footer, chunks[2], &palette);
}
