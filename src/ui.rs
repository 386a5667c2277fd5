use crate::app::{App, Geometry};
use crate::bars::Bar;
use crate::config::Theme;
use crate::context::Settings;
use crate::directory::Directory;
use crate::entry::{human_size, Entry};
use crate::keys::InputState;
use crate::preview::{format_time, Preview, PreviewData};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{LineGauge, Paragraph};
use ratatui::Frame;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const MAX_PARENT_COLUMNS: usize = 2;

struct Styles {
    base: Style,
    accent: Style,
    selection: Style,
    directory: Style,
    symlink: Style,
    broken: Style,
    executable: Style,
    marked: Style,
    bar: Style,
}

impl Styles {
    fn new(theme: &Theme) -> Self {
        let fg = |value: &str| Style::default().fg(parse_color(value));
        Self {
            base: Style::default()
                .fg(parse_color(&theme.foreground))
                .bg(parse_color(&theme.background)),
            accent: fg(&theme.accent).add_modifier(Modifier::BOLD),
            selection: Style::default()
                .fg(parse_color(&theme.selection_fg))
                .bg(parse_color(&theme.selection_bg))
                .add_modifier(Modifier::BOLD),
            directory: fg(&theme.directory).add_modifier(Modifier::BOLD),
            symlink: fg(&theme.symlink),
            broken: fg(&theme.broken),
            executable: fg(&theme.executable).add_modifier(Modifier::BOLD),
            marked: fg(&theme.marked).add_modifier(Modifier::BOLD),
            bar: fg(&theme.bar),
        }
    }

    fn entry(&self, entry: &Entry) -> Style {
        let style = if entry.symlink && !entry.exists {
            self.broken
        } else if entry.is_dir() {
            self.directory
        } else if entry.symlink {
            self.symlink
        } else if entry.executable {
            self.executable
        } else {
            self.base
        };
        if entry.marked {
            style.patch(self.marked)
        } else {
            style
        }
    }
}

pub fn scroll_offset(cursor: usize, len: usize, rows: usize) -> usize {
    if rows == 0 || len <= rows {
        return 0;
    }
    cursor.saturating_sub(rows / 2).min(len - rows)
}

pub fn render(frame: &mut Frame, app: &App, preview: Option<&Preview>, theme: &Theme) -> Geometry {
    let styles = Styles::new(theme);
    let settings = app.context().settings();
    let bars = app.bars().bars();

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(bars.len() as u16),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_title(frame, rows[0], app, &settings, &styles);
    let geometry = render_columns(frame, rows[1], app, preview, &settings, &styles);
    render_bars(frame, rows[2], &bars, &settings, &styles);
    render_status(frame, rows[3], app, &settings, &styles);
    geometry
}

fn render_title(frame: &mut Frame, area: Rect, app: &App, settings: &Settings, styles: &Styles) {
    let pwd = app.navigator().pwd_path();
    let mut spans = vec![Span::styled(
        display(&pwd.to_string_lossy(), settings),
        styles.accent,
    )];
    if let Some(entry) = app.navigator().current_entry() {
        if pwd.parent().is_some() {
            spans.push(Span::styled("/", styles.accent));
        }
        spans.push(Span::styled(
            display(&entry.basename, settings),
            styles.base.add_modifier(Modifier::BOLD),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)).style(styles.base), area);
}

fn render_columns(
    frame: &mut Frame,
    area: Rect,
    app: &App,
    preview: Option<&Preview>,
    settings: &Settings,
    styles: &Styles,
) -> Geometry {
    let stack = app.navigator().stack();
    let parents = &stack[stack.len().saturating_sub(MAX_PARENT_COLUMNS + 1)..stack.len() - 1];

    let mut constraints: Vec<Constraint> = parents.iter().map(|_| Constraint::Fill(1)).collect();
    constraints.push(Constraint::Fill(3));
    if settings.preview {
        constraints.push(Constraint::Fill(4));
    }
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);

    let mut geometry = Geometry {
        top: area.y,
        rows: area.height,
        ..Geometry::default()
    };
    for (dir, column) in parents.iter().zip(columns.iter()) {
        let column = padded(*column);
        render_directory(frame, column, &dir.read(), settings, styles, false);
        geometry.parents.push((column.x, column.width));
    }

    let current = padded(columns[parents.len()]);
    render_directory(frame, current, &app.navigator().pwd().read(), settings, styles, true);
    geometry.current = (current.x, current.width);

    if settings.preview {
        if let Some(&column) = columns.get(parents.len() + 1) {
            geometry.preview = Some((column.x, column.width));
            render_preview(frame, column, app, preview, settings, styles);
        }
    }
    geometry
}

fn padded(area: Rect) -> Rect {
    Rect {
        width: area.width.saturating_sub(1),
        ..area
    }
}

fn render_directory(
    frame: &mut Frame,
    area: Rect,
    dir: &Directory,
    settings: &Settings,
    styles: &Styles,
    focused: bool,
) {
    if let Some(label) = placeholder(dir) {
        let style = if dir.has_error() { styles.broken } else { styles.base };
        frame.render_widget(Paragraph::new(label).style(style), area);
        return;
    }

    let rows = area.height as usize;
    let width = area.width as usize;
    let offset = scroll_offset(dir.cursor(), dir.len(), rows);
    let lines: Vec<Line> = dir
        .entries()
        .iter()
        .enumerate()
        .skip(offset)
        .take(rows)
        .map(|(index, entry)| {
            let pointed = index == dir.cursor();
            entry_line(entry, width, pointed, focused, settings, styles)
        })
        .collect();
    frame.render_widget(Paragraph::new(lines).style(styles.base), area);
}

fn placeholder(dir: &Directory) -> Option<&'static str> {
    if dir.has_error() {
        Some("not accessible")
    } else if !dir.is_empty() {
        None
    } else if dir.is_read() {
        Some("empty")
    } else {
        Some("loading...")
    }
}

fn entry_line(
    entry: &Entry,
    width: usize,
    pointed: bool,
    focused: bool,
    settings: &Settings,
    styles: &Styles,
) -> Line<'static> {
    let info = if entry.infostring.is_empty() {
        String::new()
    } else {
        format!(" {}", entry.infostring)
    };
    let info_width = if info.width() < width { info.width() } else { 0 };
    let name = fit(&display(&format!(" {}", entry.basename), settings), width - info_width);
    let gap = width.saturating_sub(name.width() + info_width);

    let mut style = styles.entry(entry);
    if pointed {
        style = if focused {
            style.patch(styles.selection)
        } else {
            style.add_modifier(Modifier::REVERSED)
        };
    }
    if pointed && !settings.wide_bar {
        return Line::from(vec![
            Span::styled(name, style),
            Span::styled(" ".repeat(gap), styles.base),
            Span::styled(fit(&info, info_width), styles.base),
        ]);
    }
    let mut text = name;
    text.push_str(&" ".repeat(gap));
    text.push_str(&fit(&info, info_width));
    Line::from(Span::styled(text, style))
}

fn render_preview(
    frame: &mut Frame,
    area: Rect,
    app: &App,
    preview: Option<&Preview>,
    settings: &Settings,
    styles: &Styles,
) {
    let Some(entry) = app.navigator().current_entry() else {
        return;
    };
    if entry.is_dir() {
        if let Some(dir) = app.navigator().cache().get(&entry.path) {
            render_directory(frame, padded(area), &dir.read(), settings, styles, false);
        }
        return;
    }
    if !settings.file_preview {
        return;
    }
    let Some(preview) = preview.filter(|preview| preview.path == entry.path) else {
        return;
    };
    let rows = area.height as usize;
    let lines: Vec<Line> = match &preview.data {
        PreviewData::Text(text) => text
            .lines()
            .take(rows)
            .map(|line| Line::from(fit(&display(&line.replace('\t', "    "), settings), area.width as usize)))
            .collect(),
        PreviewData::Binary { size, kind } => vec![Line::from(format!(
            "binary, {}{}",
            human_size(*size),
            kind.as_deref().map(|kind| format!(", {kind}")).unwrap_or_default()
        ))],
        PreviewData::Empty => vec![Line::from("empty")],
    };
    frame.render_widget(Paragraph::new(lines).style(styles.base), area);
}

fn render_bars(frame: &mut Frame, area: Rect, bars: &[std::sync::Arc<Bar>], settings: &Settings, styles: &Styles) {
    for (index, bar) in bars.iter().enumerate() {
        let row = Rect {
            y: area.y + index as u16,
            height: 1,
            ..area
        };
        if row.y >= area.y + area.height {
            break;
        }
        let gauge = LineGauge::default()
            .filled_style(styles.bar)
            .unfilled_style(styles.base)
            .label(display(&bar.text(), settings))
            .ratio(bar.done().clamp(0.0, 1.0));
        frame.render_widget(gauge, row);
    }
}

fn render_status(frame: &mut Frame, area: Rect, app: &App, settings: &Settings, styles: &Styles) {
    let left = match app.input_state() {
        InputState::Prompt(_) | InputState::Prefix => display(app.buffer(), settings),
        InputState::Ignoring => "...".to_string(),
        InputState::Empty => app
            .navigator()
            .current_entry()
            .map(|entry| entry_summary(&entry))
            .unwrap_or_default(),
    };

    let dir = app.navigator().pwd().read();
    let mut right = Vec::new();
    if dir.marked_size() > 0 || dir.marked().next().is_some() {
        right.push(format!("marked {}", human_size(dir.marked_size())));
    }
    if let Some(free) = dir.free_space() {
        right.push(format!("{} free", human_size(free)));
    }
    if let Some(filter) = dir.filter() {
        right.push(format!("filter {}", filter.as_str()));
    }
    right.push(if dir.is_empty() {
        "0/0".to_string()
    } else {
        format!("{}/{}", dir.cursor() + 1, dir.len())
    });
    drop(dir);
    let right = right.join("  ");

    let width = area.width as usize;
    let left = fit(&left, width.saturating_sub(right.width() + 1));
    let gap = width.saturating_sub(left.width() + right.width());
    let line = Line::from(vec![
        Span::styled(left, styles.base),
        Span::raw(" ".repeat(gap)),
        Span::styled(right, styles.accent),
    ]);
    frame.render_widget(Paragraph::new(line).style(styles.base), area);
}

fn entry_summary(entry: &Entry) -> String {
    let mut parts = vec![entry.rights.clone()];
    if entry.is_file() {
        parts.push(human_size(entry.size));
    }
    if let Some(mtime) = format_time(entry.mtime) {
        parts.push(mtime);
    }
    if let Some(target) = &entry.link_target {
        parts.push(format!("-> {}", target.display()));
    }
    parts.join(" ")
}

fn display(text: &str, settings: &Settings) -> String {
    if settings.ascii_only {
        text.chars()
            .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
            .collect()
    } else {
        text.chars().map(|c| if c.is_control() { '?' } else { c }).collect()
    }
}

fn fit(text: &str, width: usize) -> String {
    let mut used = 0;
    let mut out = String::new();
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        used += w;
        out.push(c);
    }
    out
}

fn parse_color(value: &str) -> Color {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix('#') {
        if hex.len() == 6 && hex.is_ascii() {
            let parse = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
            if let (Some(r), Some(g), Some(b)) = (parse(0..2), parse(2..4), parse(4..6)) {
                return Color::Rgb(r, g, b);
            }
        }
    }
    match value.to_ascii_lowercase().as_str() {
        "black" => Color::Black,
        "red" => Color::Red,
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "blue" => Color::Blue,
        "magenta" => Color::Magenta,
        "cyan" => Color::Cyan,
        "white" => Color::White,
        "gray" | "grey" => Color::Gray,
        "darkgray" | "darkgrey" => Color::DarkGray,
        "lightred" => Color::LightRed,
        "lightgreen" => Color::LightGreen,
        "lightyellow" => Color::LightYellow,
        "lightblue" => Color::LightBlue,
        "lightmagenta" => Color::LightMagenta,
        "lightcyan" => Color::LightCyan,
        _ => Color::Reset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::DefaultApps;
    use crate::config::Config;
    use crate::context::{no_redraw, Context};
    use crate::markers::Bookmarks;
    use crate::mime::MimeTable;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use std::fs;

    #[test]
    fn scroll_keeps_cursor_visible() {
        assert_eq!(scroll_offset(0, 5, 10), 0);
        assert_eq!(scroll_offset(3, 100, 10), 0);
        assert_eq!(scroll_offset(50, 100, 10), 45);
        assert_eq!(scroll_offset(99, 100, 10), 90);
        assert_eq!(scroll_offset(4, 4, 0), 0);
    }

    #[test]
    fn fit_counts_wide_characters() {
        assert_eq!(fit("abcdef", 3), "abc");
        assert_eq!(fit("日本語", 5), "日本");
        assert_eq!(fit("ab", 10), "ab");
    }

    #[test]
    fn ascii_only_masks_other_characters() {
        let mut settings = Settings::default();
        settings.ascii_only = true;
        assert_eq!(display("naïve", &settings), "na?ve");
        settings.ascii_only = false;
        assert_eq!(display("naïve\n", &settings), "naïve?");
    }

    #[test]
    fn parses_hex_and_named_colors() {
        assert_eq!(parse_color("#102030"), Color::Rgb(0x10, 0x20, 0x30));
        assert_eq!(parse_color("LightBlue"), Color::LightBlue);
        assert_eq!(parse_color("nonsense"), Color::Reset);
        assert_eq!(parse_color("#aé€"), Color::Reset);
    }

    #[test]
    fn draws_listing_and_reports_columns() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap().join("work");
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("notes.txt"), b"hello").unwrap();
        let config = Config::default();
        let context = Context::new(Settings::from_config(&config), MimeTable::builtin());
        let app = App::new(
            context,
            &config,
            &root,
            Bookmarks::load_from(tmp.path().join("bookmarks.toml")),
            Box::new(DefaultApps::with_editor("vi")),
            no_redraw(),
        )
        .unwrap();

        let mut terminal = Terminal::new(TestBackend::new(80, 12)).unwrap();
        let mut geometry = Geometry::default();
        terminal
            .draw(|frame| geometry = render(frame, &app, None, &config.theme))
            .unwrap();

        let screen: String = terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(screen.contains("notes.txt"));
        assert!(screen.contains("sub"));
        assert_eq!(geometry.top, 1);
        assert_eq!(geometry.rows, 10);
        assert_eq!(geometry.parents.len(), 2);
        assert!(geometry.preview.is_some());
        assert!(geometry.current.0 > geometry.parents[1].0);
    }
}
