use crate::entry::{Entry, EntryKind};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handler {
    None,
    App { name: String, base_flags: String },
}

impl Handler {
    fn app(name: &str, base_flags: &str) -> Self {
        Self::App {
            name: name.to_string(),
            base_flags: base_flags.to_string(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::App { name, .. } => Some(name),
        }
    }
}

pub trait Dispatch: Send + Sync {
    fn resolve(&self, entry: &Entry, mime: Option<&str>) -> Handler;

    fn command(&self, app: &str, context: &RunContext) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct DefaultApps {
    editor: String,
}

impl DefaultApps {
    pub fn new() -> Self {
        let editor = env::var("VISUAL")
            .or_else(|_| env::var("EDITOR"))
            .unwrap_or_else(|_| "vi".to_string());
        Self { editor }
    }

    pub fn with_editor(editor: impl Into<String>) -> Self {
        Self {
            editor: editor.into(),
        }
    }
}

impl Default for DefaultApps {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatch for DefaultApps {
    fn resolve(&self, entry: &Entry, mime: Option<&str>) -> Handler {
        if !entry.exists || entry.kind == EntryKind::Directory {
            return Handler::None;
        }
        let ext = entry.extension.to_ascii_lowercase();
        match (mime.unwrap_or(""), ext.as_str()) {
            (mime, _) if mime.starts_with("video/") => Handler::app("mplayer", "d"),
            (_, "wav") => Handler::app("aplay", ""),
            (mime, _) if mime.starts_with("audio/") => Handler::app("mplayer", ""),
            ("application/pdf", _) => Handler::app("evince", "d"),
            (mime, _) if mime.starts_with("image/") => Handler::app("feh", "d"),
            (_, "html" | "htm" | "swf") => Handler::app("firefox", "d"),
            (_, "zip" | "rar" | "tar" | "gz" | "7z" | "jar" | "bz2" | "xz") => {
                Handler::app("aunpack", "")
            }
            (_, "smc" | "swc") => Handler::app("zsnes", "d"),
            _ if entry.executable => Handler::app("exec", ""),
            _ => Handler::app("editor", ""),
        }
    }

    fn command(&self, app: &str, context: &RunContext) -> Option<String> {
        let files = context.quoted_files();
        if files.is_empty() {
            return None;
        }
        let command = match app {
            "feh" => match context.mode {
                1 => format!("feh -F {files}"),
                2 => format!("gimp {files}"),
                4 => format!("feh --bg-scale {files}"),
                5 => format!("feh --bg-tile {files}"),
                6 => format!("feh --bg-center {files}"),
                _ => format!("feh {files}"),
            },
            "mplayer" => match context.mode {
                1 => format!("mplayer -vm sdl -sid 0 {files}"),
                _ => format!("mplayer -fs -sid 0 {files}"),
            },
            "zsnes" => match context.mode {
                1 => format!("zsnes -ad sdl -o {files}"),
                _ => format!("zsnes -ad sdl -u -o {files}"),
            },
            "aplay" => format!("aplay -q {files}"),
            "exec" => files,
            "editor" => format!("{} {files}", self.editor),
            other => format!("{other} {files}"),
        };
        Some(command)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunContext {
    pub files: Vec<PathBuf>,
    pub mode: u32,
    pub all: bool,
    pub detach: bool,
    pub new_term: bool,
    pub wait: bool,
}

impl RunContext {
    pub fn new(files: Vec<PathBuf>, mode: u32) -> Self {
        Self {
            files,
            mode,
            ..Self::default()
        }
    }

    pub fn apply_flags(&mut self, flags: &str) {
        for flag in flags.chars() {
            let value = flag.is_ascii_lowercase();
            match flag.to_ascii_lowercase() {
                'a' => self.all = value,
                'd' | 'e' => self.detach = value,
                't' => self.new_term = value,
                'w' => self.wait = value,
                _ => {}
            }
        }
    }

    fn quoted_files(&self) -> String {
        self.files
            .iter()
            .map(|path| shell_escape(&path.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn launch(&self, command: String, cwd: PathBuf) -> Launch {
        Launch {
            command,
            cwd,
            detach: self.detach,
            new_term: self.new_term,
            wait: self.wait,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub command: String,
    pub cwd: PathBuf,
    pub detach: bool,
    pub new_term: bool,
    pub wait: bool,
}

impl Launch {
    pub fn inside(command: impl Into<String>, cwd: PathBuf, wait: bool) -> Self {
        Self {
            command: command.into(),
            cwd,
            detach: false,
            new_term: false,
            wait,
        }
    }
}

pub fn parse_run_spec(text: &str) -> (u32, String, Option<String>) {
    let (info, app) = match text.split_once(':') {
        Some((info, app)) => (info.trim(), Some(app.trim().to_string())),
        None => (text.trim(), None),
    };
    let digits: String = info.chars().take_while(|c| c.is_ascii_digit()).collect();
    let flags: String = info[digits.len()..]
        .chars()
        .take_while(|c| "adetwADETW".contains(*c))
        .collect();
    let mode = digits.parse().unwrap_or(0);
    (mode, flags, app.filter(|app| !app.is_empty()))
}

pub fn shell_escape(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime::MimeTable;

    fn entry_named(dir: &std::path::Path, name: &str) -> Entry {
        let path = dir.join(name);
        std::fs::write(&path, b"content").unwrap();
        Entry::probe(&path)
    }

    #[test]
    fn resolves_by_mime_family() {
        let dir = tempfile::tempdir().unwrap();
        let apps = DefaultApps::with_editor("vi");
        let table = MimeTable::builtin();
        let movie = entry_named(dir.path(), "clip.mkv");
        let image = entry_named(dir.path(), "photo.png");
        let text = entry_named(dir.path(), "notes.txt");
        assert_eq!(movie.handler(&apps, &table), &Handler::app("mplayer", "d"));
        assert_eq!(image.handler(&apps, &table), &Handler::app("feh", "d"));
        assert_eq!(text.handler(&apps, &table).name(), Some("editor"));
    }

    #[test]
    fn directories_have_no_handler() {
        let dir = tempfile::tempdir().unwrap();
        let apps = DefaultApps::with_editor("vi");
        let entry = Entry::probe(dir.path());
        assert_eq!(entry.handler(&apps, &MimeTable::builtin()), &Handler::None);
    }

    #[test]
    fn modes_select_command_variants() {
        let apps = DefaultApps::with_editor("vi");
        let context = RunContext::new(vec![PathBuf::from("/tmp/it's.png")], 1);
        assert_eq!(
            apps.command("feh", &context).unwrap(),
            "feh -F '/tmp/it'\\''s.png'"
        );
        let context = RunContext::new(vec![PathBuf::from("/a b.txt")], 0);
        assert_eq!(apps.command("editor", &context).unwrap(), "vi '/a b.txt'");
    }

    #[test]
    fn uppercase_flags_invert() {
        let mut context = RunContext::new(Vec::new(), 0);
        context.apply_flags("dw");
        assert!(context.detach && context.wait);
        context.apply_flags("D");
        assert!(!context.detach);
        assert!(context.wait);
    }

    #[test]
    fn run_spec_parses_mode_flags_and_app() {
        assert_eq!(parse_run_spec("1d:gimp"), (1, "d".to_string(), Some("gimp".to_string())));
        assert_eq!(parse_run_spec("tw"), (0, "tw".to_string(), None));
        assert_eq!(parse_run_spec(""), (0, String::new(), None));
    }
}
