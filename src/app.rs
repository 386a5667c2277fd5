use crate::apps::{parse_run_spec, shell_escape, Dispatch, Handler, Launch, RunContext};
use crate::bars::BarRegistry;
use crate::config::Config;
use crate::context::{Context, Redraw};
use crate::directory::SharedDir;
use crate::entry::Entry;
use crate::keys::{
    parse_prompt, ArgKind, Command, InputMachine, InputState, KeyMap, MouseAction, MouseKey,
    MouseRecord, PromptInput, PromptKind, Resolution, Toggle, MOUSE,
};
use crate::markers::{Bookmarks, MarkerError};
use crate::navigator::{pattern, Hints, Navigator, SearchMethod};
use crate::scheduler::Scheduler;
use crate::ui::scroll_offset;
use regex::Regex;
use std::env;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

const UNIQUE_HINT_PAUSE: Duration = Duration::from_millis(500);
const NO_HINT_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Bookmarks(#[from] MarkerError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Quit,
    Redraw,
    Run(Launch),
    Open(PathBuf),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Geometry {
    pub parents: Vec<(u16, u16)>,
    pub current: (u16, u16),
    pub preview: Option<(u16, u16)>,
    pub top: u16,
    pub rows: u16,
}

enum Column {
    Parent(usize),
    Current,
    Preview,
}

impl Geometry {
    fn column_at(&self, x: u16) -> Option<Column> {
        let inside = |(start, width): (u16, u16)| x >= start && x < start.saturating_add(width);
        if inside(self.current) {
            return Some(Column::Current);
        }
        if self.preview.is_some_and(inside) {
            return Some(Column::Preview);
        }
        let depth = self.parents.len();
        self.parents
            .iter()
            .position(|&span| inside(span))
            .map(|index| Column::Parent(depth - index))
    }
}

pub struct App {
    context: Arc<Context>,
    scheduler: Scheduler,
    navigator: Navigator,
    bars: BarRegistry,
    bookmarks: Bookmarks,
    keymap: KeyMap,
    input: InputMachine,
    dispatch: Box<dyn Dispatch>,
    copy: Vec<PathBuf>,
    cut: bool,
    search: String,
    search_method: SearchMethod,
    search_reset: bool,
    filter_backup: Option<Option<Regex>>,
    trash: PathBuf,
    geometry: Geometry,
    mouse: Option<MouseRecord>,
    effects: Vec<Effect>,
}

impl App {
    pub fn new(
        context: Arc<Context>,
        config: &Config,
        start: &Path,
        mut bookmarks: Bookmarks,
        dispatch: Box<dyn Dispatch>,
        redraw: Redraw,
    ) -> Result<Self, AppError> {
        let scheduler = Scheduler::start(
            Arc::clone(&context),
            config.scheduler.policy,
            config.scheduler.interval(),
            Arc::clone(&redraw),
        )?;
        let navigator = Navigator::new(Arc::clone(&context), start, &scheduler);
        bookmarks.set('0', navigator.pwd_path());
        let keymap = KeyMap::new(context.settings().confirm_suffix());
        let mut app = Self {
            bars: BarRegistry::new(redraw, config.bars.redraw_interval()),
            trash: config.trash_dir(),
            context,
            scheduler,
            navigator,
            bookmarks,
            keymap,
            input: InputMachine::new(),
            dispatch,
            copy: Vec::new(),
            cut: false,
            search: String::new(),
            search_method: SearchMethod::Regexp,
            search_reset: false,
            filter_backup: None,
            geometry: Geometry::default(),
            mouse: None,
            effects: Vec::new(),
        };
        app.load_pointed_dir();
        Ok(app)
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn bars(&self) -> &BarRegistry {
        &self.bars
    }

    pub fn bookmarks(&self) -> &Bookmarks {
        &self.bookmarks
    }

    pub fn copy_buffer(&self) -> &[PathBuf] {
        &self.copy
    }

    pub fn is_cut(&self) -> bool {
        self.cut
    }

    pub fn search_string(&self) -> &str {
        &self.search
    }

    pub fn buffer(&self) -> &str {
        self.input.buffer()
    }

    pub fn input_state(&self) -> InputState {
        self.input.state(&self.keymap, Instant::now())
    }

    pub fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = geometry;
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    pub fn press(&mut self, token: &str) {
        let now = Instant::now();
        if !self.input.accept(token, now) {
            return;
        }
        let buffer = self.input.buffer().to_string();
        match self.keymap.resolve(&buffer) {
            Resolution::Command(command) => {
                self.input.clear();
                self.run_command(command);
            }
            Resolution::Argument { kind, key } => {
                self.input.clear();
                self.run_argument(kind, key);
            }
            Resolution::Prompt { kind, text } => self.run_prompt(kind, &text, now),
            Resolution::Pending => {}
            Resolution::Invalid => {
                log::trace!("dropping key buffer {buffer:?}");
                self.input.clear();
            }
        }
        self.drop_filter_backup();
        self.load_pointed_dir();
    }

    fn drop_filter_backup(&mut self) {
        if self.filter_backup.is_none() {
            return;
        }
        if let Resolution::Prompt {
            kind: PromptKind::Filter,
            ..
        } = self.keymap.resolve(self.input.buffer())
        {
            return;
        }
        let previous = self.filter_backup.take().flatten();
        self.pwd().write().set_filter(previous, &self.context);
    }

    pub fn press_mouse(&mut self, record: MouseRecord) {
        if !self.context.settings().mouse {
            return;
        }
        self.mouse = Some(record);
        self.input.clear();
        self.press(MOUSE);
    }

    pub fn tick(&mut self) {
        let pwd = Arc::clone(self.navigator.pwd());
        if pwd.refresh(false, &self.context) {
            self.scheduler.enqueue(&pwd);
        }
    }

    pub fn after_external(&mut self) {
        self.scheduler.run();
        let pwd = Arc::clone(self.navigator.pwd());
        pwd.invalidate();
        self.scheduler.enqueue(&pwd);
    }

    pub fn before_external(&mut self) {
        self.scheduler.pause();
    }

    pub fn shutdown(&mut self) -> Result<(), AppError> {
        self.bookmarks.save()?;
        Ok(())
    }

    fn load_pointed_dir(&mut self) {
        if self.context.settings().preview {
            self.navigator.pointed_dir(&self.scheduler);
        }
    }

    fn pwd(&self) -> SharedDir {
        Arc::clone(self.navigator.pwd())
    }

    fn refresh_pwd(&self) {
        let pwd = self.pwd();
        pwd.invalidate();
        pwd.refresh(false, &self.context);
        self.scheduler.enqueue(&pwd);
    }

    fn remember_dir(&mut self) {
        self.bookmarks.remember(self.navigator.pwd_path());
    }

    fn enter(&mut self, target: &Path) -> bool {
        self.navigator.enter_dir(target, &self.scheduler)
    }

    fn half_page(&self) -> isize {
        (self.geometry.rows / 2).max(1) as isize
    }

    fn run_command(&mut self, command: Command) {
        match command {
            Command::Back => {
                self.navigator.descend(&self.scheduler);
            }
            Command::Up => self.navigator.move_cursor(-1),
            Command::Down => self.navigator.move_cursor(1),
            Command::Top => self.navigator.set_cursor(0),
            Command::Bottom => self.navigator.set_cursor(usize::MAX),
            Command::HalfPageDown => self.navigator.move_cursor(self.half_page()),
            Command::HalfPageUp => self.navigator.move_cursor(-self.half_page()),
            Command::Open { mode, flags } => self.open(mode, flags),
            Command::SearchNext => self.quicksearch(1),
            Command::SearchPrevious => self.quicksearch(-1),
            Command::FindBy(method) => {
                self.search_method = method;
                self.search_reset = true;
                self.quicksearch(1);
            }
            Command::Goto(path) => {
                self.remember_dir();
                self.enter(Path::new(path));
            }
            Command::PreviousDir => self.jump_bookmark('`'),
            Command::ToggleMark => {
                let pwd = self.pwd();
                let mut dir = pwd.write();
                let cursor = dir.cursor();
                dir.toggle_mark(cursor);
                dir.move_cursor(1);
            }
            Command::InvertMarks => self.pwd().write().invert_marks(),
            Command::ClearMarks => self.pwd().write().clear_marks(),
            Command::Copy => {
                self.copy = self.selection_paths();
                self.cut = false;
            }
            Command::Cut => {
                self.copy = self.selection_paths();
                self.cut = true;
            }
            Command::Paste => self.paste(),
            Command::KillFirstBar => {
                self.bars.kill_first();
            }
            Command::KillLastBar => {
                self.bars.kill_last();
            }
            Command::Trash => self.trash_selection(),
            Command::Delete => self.delete_selection(),
            Command::Sort { key, reverse } => {
                self.context.update_sort(|settings| {
                    settings.sort = key;
                    settings.sort_reverse = reverse;
                });
                self.resort();
            }
            Command::Toggle(toggle) => self.toggle(toggle),
            Command::Refresh => {
                let pwd = self.pwd();
                pwd.refresh(true, &self.context);
                pwd.write().recompute_width();
            }
            Command::ReloadAll => {
                self.navigator.cache().invalidate_all();
                self.keymap = KeyMap::new(self.context.settings().confirm_suffix());
                let pwd = self.navigator.pwd_path();
                self.enter(&pwd);
            }
            Command::Shell => {
                let shell = env::var("SHELL").unwrap_or_else(|_| "sh".to_string());
                let command =
                    format!("clear; ls --color=auto --group-directories-first; {shell}");
                self.launch_inside(command, false);
            }
            Command::DiskUsage => {
                self.launch_inside("du --max-depth=1 -h | less".to_string(), false);
            }
            Command::Edit => self.run_selection(0, "", Some("editor".to_string())),
            Command::SeedRename => {
                if let Some(entry) = self.navigator.current_entry() {
                    self.input.set_buffer(format!("cw {}", entry.basename));
                }
            }
            Command::Quit => self.effects.push(Effect::Quit),
            Command::Redraw => self.effects.push(Effect::Redraw),
            Command::Mouse => self.handle_mouse(),
        }
    }

    fn run_argument(&mut self, kind: ArgKind, key: char) {
        match kind {
            ArgKind::SetBookmark => {
                let pwd = self.navigator.pwd_path();
                self.bookmarks.set(key, pwd);
            }
            ArgKind::UnsetBookmark => {
                self.bookmarks.remove(key);
            }
            ArgKind::JumpBookmark => self.jump_bookmark(key),
            ArgKind::MoveToBookmark => {
                let Some(target) = self.bookmarks.get(key).map(Path::to_path_buf) else {
                    return;
                };
                let sources = self.selection_paths();
                if let Err(err) = self.bars.start_move(&sources, &target) {
                    log::error!("cannot move to {}: {err}", target.display());
                }
                self.pwd().write().clear_marks();
            }
        }
    }

    fn jump_bookmark(&mut self, key: char) {
        let Some(target) = self.bookmarks.get(key).map(Path::to_path_buf) else {
            return;
        };
        if target == self.navigator.pwd_path() {
            return;
        }
        let previous = self.navigator.pwd_path();
        if self.enter(&target) {
            self.bookmarks.remember(previous);
        }
    }

    fn run_prompt(&mut self, kind: PromptKind, text: &str, now: Instant) {
        let input = parse_prompt(text);
        match kind {
            PromptKind::Search => match input {
                PromptInput::Editing(text) => {
                    if !text.is_empty() {
                        self.navigator.search(&text, 0, false);
                    }
                }
                PromptInput::Commit(text) => {
                    self.input.clear();
                    self.search_method = SearchMethod::Regexp;
                    self.search = text;
                }
                PromptInput::Cancel => self.input.clear(),
            },
            PromptKind::Filter => self.filter_prompt(input),
            PromptKind::Find => {
                self.search_method = SearchMethod::Regexp;
                match input {
                    PromptInput::Editing(text) => {
                        if text.is_empty() {
                            return;
                        }
                        match self.navigator.hints(&text) {
                            Hints::Unique => {
                                self.input.clear();
                                self.open(0, "a");
                                self.input.ignore_for(UNIQUE_HINT_PAUSE, now);
                            }
                            Hints::None => {
                                self.input.clear();
                                self.input.ignore_for(NO_HINT_PAUSE, now);
                            }
                            Hints::Many | Hints::Invalid => {}
                        }
                    }
                    PromptInput::Commit(text) => {
                        self.input.clear();
                        if !text.is_empty() {
                            self.search = text;
                        }
                    }
                    PromptInput::Cancel => self.input.clear(),
                }
            }
            _ => match input {
                PromptInput::Editing(_) => {}
                PromptInput::Cancel => self.input.clear(),
                PromptInput::Commit(text) => {
                    self.input.clear();
                    self.commit_prompt(kind, text);
                }
            },
        }
    }

    fn filter_prompt(&mut self, input: PromptInput) {
        let pwd = self.pwd();
        if self.filter_backup.is_none() {
            self.filter_backup = Some(pwd.read().filter().cloned());
        }
        match input {
            PromptInput::Editing(text) => {
                if text.is_empty() {
                    pwd.write().set_filter(None, &self.context);
                } else if let Some(rx) = pattern(&text) {
                    pwd.write().set_filter(Some(rx), &self.context);
                }
            }
            PromptInput::Commit(text) => {
                self.input.clear();
                self.filter_backup = None;
                let filter = if text.is_empty() { None } else { pattern(&text) };
                if text.is_empty() || filter.is_some() {
                    pwd.write().set_filter(filter, &self.context);
                }
            }
            PromptInput::Cancel => {
                self.input.clear();
                let previous = self.filter_backup.take().flatten();
                pwd.write().set_filter(previous, &self.context);
            }
        }
    }

    fn commit_prompt(&mut self, kind: PromptKind, text: String) {
        let result = match kind {
            PromptKind::Mkdir => self.make_dir(&text),
            PromptKind::Touch => self.touch(&text),
            PromptKind::Rename => self.rename(text),
            PromptKind::Cd => {
                let previous = self.navigator.pwd_path();
                if self.enter(Path::new(&text)) {
                    self.bookmarks.remember(previous);
                }
                Ok(())
            }
            PromptKind::Shell => {
                let (wait, command) = match text.strip_prefix('!') {
                    Some(rest) => (true, rest.to_string()),
                    None => (false, text),
                };
                self.launch_inside(command, wait);
                Ok(())
            }
            PromptKind::Run => {
                let (mode, flags, app) = parse_run_spec(&text);
                self.run_selection(mode, &flags, app);
                Ok(())
            }
            PromptKind::Grep => {
                let marked: Vec<String> = self
                    .pwd()
                    .read()
                    .marked()
                    .map(|entry| shell_escape(&entry.basename))
                    .collect();
                let files = if marked.is_empty() {
                    "*".to_string()
                } else {
                    marked.join(" ")
                };
                let command = format!(
                    "grep --color=always --line-number -e {} -r {files} | less -R",
                    shell_escape(&text)
                );
                self.launch_inside(command, false);
                Ok(())
            }
            PromptKind::Search | PromptKind::Filter | PromptKind::Find => Ok(()),
        };
        if let Err(err) = result {
            log::warn!("{} failed: {err}", kind.label());
        }
    }

    fn make_dir(&mut self, name: &str) -> Result<(), AppError> {
        let path = self.navigator.resolve(Path::new(name));
        fs::create_dir(&path)?;
        self.refresh_pwd();
        self.navigator.point_at(&path);
        Ok(())
    }

    fn touch(&mut self, name: &str) -> Result<(), AppError> {
        let path = self.navigator.resolve(Path::new(name));
        OpenOptions::new().create(true).append(true).open(&path)?;
        self.refresh_pwd();
        self.navigator.point_at(&path);
        Ok(())
    }

    fn rename(&mut self, mut name: String) -> Result<(), AppError> {
        let selection = self.navigator.selection();
        match selection.as_slice() {
            [] => Ok(()),
            [entry] => {
                if !name.contains('.') && !entry.extension.is_empty() {
                    name.push('.');
                    name.push_str(&entry.extension);
                }
                let target = self.navigator.resolve(Path::new(&name));
                if fs::rename(&entry.path, &target).is_err() {
                    self.bars.start_move(&[entry.path.clone()], &target)?;
                }
                self.refresh_pwd();
                self.navigator.point_at(&target);
                Ok(())
            }
            entries => {
                let target = self.navigator.resolve(Path::new(&name));
                let sources: Vec<PathBuf> = entries.iter().map(|e| e.path.clone()).collect();
                self.bars.start_move(&sources, &target)?;
                self.pwd().write().clear_marks();
                Ok(())
            }
        }
    }

    fn selection_paths(&self) -> Vec<PathBuf> {
        self.navigator
            .selection()
            .into_iter()
            .map(|entry| entry.path)
            .collect()
    }

    fn paste(&mut self) {
        if self.copy.is_empty() {
            return;
        }
        let destination = self.navigator.pwd_path();
        let started = if self.cut {
            self.cut = false;
            self.bars.start_move(&self.copy, &destination)
        } else {
            self.bars.start_copy(&self.copy, &destination)
        };
        if let Err(err) = started {
            log::error!("paste failed: {err}");
        }
    }

    /// Moves the selection to the trash in one bar and puts the trashed
    /// paths in the copy buffer. Empty entries, symlinks and entries
    /// already in the trash are deleted instead.
    fn trash_selection(&mut self) {
        let mut trashable = Vec::new();
        for entry in self.navigator.selection() {
            let entry = Entry::probe(&entry.path);
            if !entry.exists && !entry.symlink {
                continue;
            }
            let keep = !entry.symlink && !entry.is_in(&self.trash) && entry.size > 0;
            if keep {
                trashable.push(entry.path);
                continue;
            }
            let removed = if entry.is_dir() && !entry.symlink {
                fs::remove_dir(&entry.path)
            } else {
                fs::remove_file(&entry.path)
            };
            if let Err(err) = removed {
                log::warn!("cannot remove {}: {err}", entry.path.display());
            }
        }

        self.copy.clear();
        self.cut = false;
        if !trashable.is_empty() {
            if let Err(err) = fs::create_dir_all(&self.trash) {
                log::error!("cannot create trash {}: {err}", self.trash.display());
                return;
            }
            match self.bars.start_move(&trashable, &self.trash) {
                Ok(handle) => self.copy = handle.targets().to_vec(),
                Err(err) => log::error!("cannot start trash move: {err}"),
            }
        }
        self.pwd().write().clear_marks();
        self.refresh_pwd();
    }

    fn delete_selection(&mut self) {
        for entry in self.navigator.selection() {
            let removed = match fs::symlink_metadata(&entry.path) {
                Ok(meta) if meta.is_dir() => fs::remove_dir_all(&entry.path),
                Ok(_) => fs::remove_file(&entry.path),
                Err(err) => Err(err),
            };
            if let Err(err) = removed {
                log::warn!("cannot delete {}: {err}", entry.path.display());
            }
        }
        self.pwd().write().clear_marks();
        self.refresh_pwd();
    }

    fn resort(&self) {
        for dir in self.navigator.stack() {
            dir.write().sort(&self.context);
        }
    }

    fn toggle(&mut self, toggle: Toggle) {
        match toggle {
            Toggle::Confirm => {
                self.context.update(|settings| settings.confirm = !settings.confirm);
                self.keymap = KeyMap::new(self.context.settings().confirm_suffix());
            }
            Toggle::WideBar => self.context.update(|s| s.wide_bar = !s.wide_bar),
            Toggle::Preview => self.context.update(|s| s.preview = !s.preview),
            Toggle::FilePreview => self.context.update(|s| s.file_preview = !s.file_preview),
            Toggle::AsciiOnly => self.context.update(|s| s.ascii_only = !s.ascii_only),
            Toggle::Hidden => {
                self.context.update(|s| s.show_hidden = !s.show_hidden);
                for dir in self.navigator.stack() {
                    dir.refresh(false, &self.context);
                    self.scheduler.enqueue(dir);
                }
            }
            Toggle::DirsFirst => {
                self.context.update_sort(|s| s.dirs_first = !s.dirs_first);
                self.resort();
            }
        }
    }

    fn quicksearch(&mut self, n: isize) {
        self.navigator.quicksearch(
            n,
            self.search_method,
            &self.search,
            self.search_reset,
            self.dispatch.as_ref(),
        );
        self.search_reset = false;
    }

    fn open(&mut self, mode: u32, flags: &str) {
        let Some(entry) = self.navigator.current_entry() else {
            return;
        };
        if entry.is_dir() {
            self.enter(&entry.path);
        } else {
            self.run_selection(mode, flags, None);
        }
    }

    fn run_selection(&mut self, mode: u32, flags: &str, app: Option<String>) {
        let pwd = self.pwd();
        let handler = {
            let dir = pwd.read();
            let Some(entry) = dir.pointed() else {
                return;
            };
            entry
                .handler(self.dispatch.as_ref(), self.context.mime())
                .clone()
        };
        let Some(current) = self.navigator.current_entry() else {
            return;
        };

        let mut context = RunContext::new(Vec::new(), mode);
        if let Handler::App { base_flags, .. } = &handler {
            context.apply_flags(base_flags);
        }
        context.apply_flags(flags);
        context.files = if context.all {
            self.selection_paths()
        } else {
            vec![current.path.clone()]
        };

        let app = app.or_else(|| handler.name().map(str::to_string));
        match app.and_then(|app| self.dispatch.command(&app, &context)) {
            Some(command) => {
                log::info!("run: {command}");
                self.effects
                    .push(Effect::Run(context.launch(command, self.navigator.pwd_path())));
            }
            None => self.effects.push(Effect::Open(current.path)),
        }
    }

    fn launch_inside(&mut self, command: String, wait: bool) {
        let cwd = self.navigator.pwd_path();
        self.effects.push(Effect::Run(Launch::inside(command, cwd, wait)));
        self.scheduler.enqueue(self.navigator.pwd());
    }

    fn handle_mouse(&mut self) {
        let Some(record) = self.mouse.take() else {
            return;
        };
        match record.button {
            MouseKey::WheelUp => {
                self.navigator.move_cursor(-1);
                return;
            }
            MouseKey::WheelDown => {
                self.navigator.move_cursor(1);
                return;
            }
            MouseKey::Left | MouseKey::Right => {}
            MouseKey::Middle | MouseKey::None => return,
        }
        if matches!(record.action, MouseAction::Release | MouseAction::Move | MouseAction::Drag) {
            return;
        }
        let geometry = self.geometry.clone();
        if record.y < geometry.top || record.y >= geometry.top + geometry.rows {
            return;
        }
        let row = (record.y - geometry.top) as usize;
        let left = record.is_left();
        let mode = if record.ctrl { 1 } else { 0 };
        match geometry.column_at(record.x) {
            Some(Column::Parent(depth)) => {
                for _ in 0..depth {
                    self.navigator.descend(&self.scheduler);
                }
                if left {
                    self.point_row(row);
                }
            }
            Some(Column::Current) => {
                self.point_row(row);
                if !left || record.action == MouseAction::DoubleClick {
                    self.open(mode, "a");
                }
            }
            Some(Column::Preview) => {
                let was_dir = self.navigator.current_entry().is_some_and(|e| e.is_dir());
                self.open(mode, "a");
                if left && was_dir {
                    self.point_row(row);
                }
            }
            None => {}
        }
    }

    fn point_row(&self, row: usize) {
        let pwd = self.pwd();
        let mut dir = pwd.write();
        let offset = scroll_offset(dir.cursor(), dir.len(), self.geometry.rows as usize);
        dir.set_cursor(offset + row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::DefaultApps;
    use crate::context::{no_redraw, Settings};
    use crate::mime::MimeTable;

    struct Fixture {
        _tmp: tempfile::TempDir,
        root: PathBuf,
        trash: PathBuf,
        app: App,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().canonicalize().unwrap();
        let root = base.join("work");
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("a.txt"), b"alpha").unwrap();
        fs::write(root.join("b.txt"), b"beta").unwrap();
        let trash = base.join("trash");
        let mut config = Config::default();
        config.trash = trash.to_string_lossy().into_owned();
        let context = Context::new(Settings::from_config(&config), MimeTable::builtin());
        let app = App::new(
            context,
            &config,
            &root,
            Bookmarks::load_from(base.join("bookmarks.toml")),
            Box::new(DefaultApps::with_editor("vi")),
            no_redraw(),
        )
        .unwrap();
        Fixture {
            _tmp: tmp,
            root,
            trash,
            app,
        }
    }

    fn press_all(app: &mut App, tokens: &[&str]) {
        for token in tokens {
            app.press(token);
        }
    }

    fn current(app: &App) -> String {
        app.navigator().current_entry().unwrap().basename
    }

    #[test]
    fn movement_keys_move_cursor() {
        let mut fx = fixture();
        assert_eq!(current(&fx.app), "sub");
        press_all(&mut fx.app, &["j", "j"]);
        assert_eq!(current(&fx.app), "b.txt");
        press_all(&mut fx.app, &["g", "g"]);
        assert_eq!(current(&fx.app), "sub");
        fx.app.press("G");
        assert_eq!(current(&fx.app), "b.txt");
    }

    #[test]
    fn unrelated_key_after_prefix_resets_buffer() {
        let mut fx = fixture();
        fx.app.press("d");
        assert_eq!(fx.app.buffer(), "d");
        fx.app.press("z");
        assert_eq!(fx.app.buffer(), "");
        assert!(fx.root.join("sub").exists());
        assert!(fx.app.bars().is_empty());
    }

    #[test]
    fn mkdir_prompt_creates_directory() {
        let mut fx = fixture();
        for c in "mkdir new".chars() {
            fx.app.press(&c.to_string());
        }
        assert_eq!(fx.app.input_state(), InputState::Prompt(PromptKind::Mkdir));
        fx.app.press("<cr>");
        assert!(fx.root.join("new").is_dir());
        assert_eq!(fx.app.buffer(), "");
        assert_eq!(current(&fx.app), "new");
    }

    #[test]
    fn escape_cancels_prompt() {
        let mut fx = fixture();
        for c in "touch x".chars() {
            fx.app.press(&c.to_string());
        }
        fx.app.press("<esc>");
        assert_eq!(fx.app.buffer(), "");
        assert!(!fx.root.join("x").exists());
    }

    #[test]
    fn rename_keeps_extension() {
        let mut fx = fixture();
        press_all(&mut fx.app, &["j", "c", "w", " ", "z", "<cr>"]);
        assert!(fx.root.join("z.txt").is_file());
        assert!(!fx.root.join("a.txt").exists());
    }

    #[test]
    fn seed_rename_fills_buffer() {
        let mut fx = fixture();
        press_all(&mut fx.app, &["j", "A"]);
        assert_eq!(fx.app.buffer(), "cw a.txt");
    }

    #[test]
    fn invalid_filter_keeps_listing() {
        let mut fx = fixture();
        fx.app.press("j");
        press_all(&mut fx.app, &["F", " ", "("]);
        let pwd = fx.app.navigator().pwd().clone();
        assert_eq!(pwd.read().len(), 3);
        assert_eq!(pwd.read().cursor(), 1);
        press_all(&mut fx.app, &["<bs>", "a"]);
        assert_eq!(pwd.read().len(), 1);
        fx.app.press("<esc>");
        assert_eq!(pwd.read().len(), 3);
        assert_eq!(fx.app.buffer(), "");
    }

    #[test]
    fn clearing_the_line_cancels_the_filter() {
        let mut fx = fixture();
        let pwd = fx.app.navigator().pwd().clone();
        press_all(&mut fx.app, &["F", " ", "a"]);
        assert_eq!(pwd.read().len(), 1);
        fx.app.press("<c-u>");
        assert_eq!(fx.app.buffer(), "");
        assert_eq!(pwd.read().len(), 3);
        assert!(pwd.read().filter().is_none());

        press_all(&mut fx.app, &["F", " ", "t", "x", "t", "<cr>"]);
        assert_eq!(pwd.read().len(), 2);
        press_all(&mut fx.app, &["F", " ", "a", "<esc>"]);
        assert_eq!(pwd.read().len(), 2);
        assert_eq!(pwd.read().filter().map(|rx| rx.as_str()), Some("txt"));
    }

    #[test]
    fn find_with_unique_match_opens_directory() {
        let mut fx = fixture();
        press_all(&mut fx.app, &["f", "f", "s", "u"]);
        assert_eq!(fx.app.navigator().pwd_path(), fx.root.join("sub"));
        assert_eq!(fx.app.buffer(), "");
        assert_eq!(fx.app.input_state(), InputState::Ignoring);
    }

    #[test]
    fn sort_command_reorders() {
        let mut fx = fixture();
        press_all(&mut fx.app, &["S", "N"]);
        let names: Vec<String> = fx
            .app
            .navigator()
            .pwd()
            .read()
            .entries()
            .iter()
            .map(|e| e.basename.clone())
            .collect();
        assert_eq!(names, ["b.txt", "a.txt", "sub"]);
    }

    #[test]
    fn bookmarks_jump_and_remember() {
        let mut fx = fixture();
        press_all(&mut fx.app, &["m", "w", "l"]);
        assert_eq!(fx.app.navigator().pwd_path(), fx.root.join("sub"));
        press_all(&mut fx.app, &["'", "w"]);
        assert_eq!(fx.app.navigator().pwd_path(), fx.root);
        fx.app.press("<tab>");
        assert_eq!(fx.app.navigator().pwd_path(), fx.root.join("sub"));
    }

    #[test]
    fn backspace_on_empty_buffer_goes_up() {
        let mut fx = fixture();
        fx.app.press("l");
        fx.app.press("<bs>");
        assert_eq!(fx.app.navigator().pwd_path(), fx.root);
        assert_eq!(current(&fx.app), "sub");
    }

    #[test]
    fn opening_a_file_queues_a_command() {
        let mut fx = fixture();
        press_all(&mut fx.app, &["j", "l"]);
        let effects = fx.app.take_effects();
        match effects.as_slice() {
            [Effect::Run(launch)] => {
                assert!(launch.command.starts_with("vi "));
                assert!(launch.command.contains("a.txt"));
                assert_eq!(launch.cwd, fx.root);
            }
            other => panic!("unexpected effects {other:?}"),
        }
    }

    #[test]
    fn shell_prompt_with_bang_waits() {
        let mut fx = fixture();
        press_all(&mut fx.app, &["!", "!", "e", "c", "h", "o", "<cr>"]);
        assert_eq!(
            fx.app.take_effects(),
            [Effect::Run(Launch::inside("echo", fx.root.clone(), true))]
        );
    }

    #[test]
    fn quit_keys() {
        let mut fx = fixture();
        press_all(&mut fx.app, &["Z", "Z"]);
        assert_eq!(fx.app.take_effects(), [Effect::Quit]);
        press_all(&mut fx.app, &[":", "q", "<cr>"]);
        assert_eq!(fx.app.take_effects(), [Effect::Quit]);
    }

    #[test]
    fn empty_file_is_deleted_not_trashed() {
        let mut fx = fixture();
        fs::write(fx.root.join("c.txt"), b"").unwrap();
        fx.app.press("<c-r>");
        press_all(&mut fx.app, &["G", "d", "d", "D"]);
        assert!(!fx.root.join("c.txt").exists());
        assert!(fx.app.bars().is_empty());
        assert!(!fx.trash.join("c.txt").exists());
    }

    #[test]
    fn mouse_click_points_at_row() {
        let mut fx = fixture();
        fx.app.set_geometry(Geometry {
            parents: vec![(0, 10)],
            current: (10, 20),
            preview: Some((30, 30)),
            top: 1,
            rows: 20,
        });
        fx.app.press_mouse(MouseRecord {
            button: MouseKey::Left,
            action: MouseAction::Press,
            x: 12,
            y: 3,
            ctrl: false,
            shift: false,
            alt: false,
        });
        assert_eq!(current(&fx.app), "b.txt");
        fx.app.press_mouse(MouseRecord {
            button: MouseKey::WheelUp,
            action: MouseAction::Press,
            x: 12,
            y: 3,
            ctrl: false,
            shift: false,
            alt: false,
        });
        assert_eq!(current(&fx.app), "a.txt");
    }

    #[test]
    fn toggles_flip_settings() {
        let mut fx = fixture();
        press_all(&mut fx.app, &["t", "w"]);
        assert!(!fx.app.context().settings().wide_bar);
        press_all(&mut fx.app, &["t", "h"]);
        assert!(fx.app.context().settings().show_hidden);
        press_all(&mut fx.app, &["t", "!"]);
        assert!(!fx.app.context().settings().confirm);
    }

    #[test]
    fn trash_without_confirmation_moves_file() {
        let mut fx = fixture();
        press_all(&mut fx.app, &["t", "!", "j", "d", "d"]);
        assert!(fx.app.bars().wait_idle(Duration::from_secs(5)));
        assert!(!fx.root.join("a.txt").exists());
        assert!(fx.trash.join("a.txt").is_file());
        assert_eq!(fx.app.copy_buffer(), [fx.trash.join("a.txt")]);
        assert!(!fx.app.is_cut());
    }
}
