use crate::config::SortKey;
use crate::navigator::SearchMethod;
use crossterm::event::{
    KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const BACKSPACE: &str = "<bs>";
pub const CLEAR_LINE: &str = "<c-u>";
pub const MOUSE: &str = "<mouse>";

const MULTI_CLICK: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Confirm,
    WideBar,
    Preview,
    FilePreview,
    Hidden,
    AsciiOnly,
    DirsFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Back,
    Up,
    Down,
    Top,
    Bottom,
    HalfPageDown,
    HalfPageUp,
    Open { mode: u32, flags: &'static str },
    SearchNext,
    SearchPrevious,
    FindBy(SearchMethod),
    Goto(&'static str),
    PreviousDir,
    ToggleMark,
    InvertMarks,
    ClearMarks,
    Copy,
    Cut,
    Paste,
    KillFirstBar,
    KillLastBar,
    Trash,
    Delete,
    Sort { key: SortKey, reverse: bool },
    Toggle(Toggle),
    Refresh,
    ReloadAll,
    Shell,
    DiskUsage,
    Edit,
    SeedRename,
    Quit,
    Redraw,
    Mouse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Mkdir,
    Touch,
    Rename,
    Cd,
    Shell,
    Search,
    Filter,
    Find,
    Run,
    Grep,
}

impl PromptKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Mkdir => "mkdir",
            Self::Touch => "touch",
            Self::Rename => "rename",
            Self::Cd => "cd",
            Self::Shell => "shell",
            Self::Search => "search",
            Self::Filter => "filter",
            Self::Find => "find",
            Self::Run => "run",
            Self::Grep => "grep",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    SetBookmark,
    UnsetBookmark,
    JumpBookmark,
    MoveToBookmark,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Command(Command),
    Prompt { kind: PromptKind, text: String },
    Argument { kind: ArgKind, key: char },
    Pending,
    Invalid,
}

#[derive(Debug, Default)]
struct Node {
    children: HashMap<String, Node>,
    command: Option<Command>,
    prompt: Option<PromptKind>,
    argument: Option<ArgKind>,
}

/// Trie of every bound key sequence.
///
/// A prompt node swallows whatever follows it. An argument node takes one
/// more single-character token, unless that token continues a longer
/// binding (so `mk` is read as the start of `mkdir`).
#[derive(Debug)]
pub struct KeyMap {
    root: Node,
}

impl KeyMap {
    pub fn new(confirm: &str) -> Self {
        let mut map = Self {
            root: Node::default(),
        };

        for (keys, command) in [
            ("<bs>", Command::Back),
            ("h", Command::Back),
            ("H", Command::Back),
            ("<left>", Command::Back),
            ("k", Command::Up),
            ("<up>", Command::Up),
            ("j", Command::Down),
            ("<down>", Command::Down),
            ("gg", Command::Top),
            ("<home>", Command::Top),
            ("G", Command::Bottom),
            ("<end>", Command::Bottom),
            ("J", Command::HalfPageDown),
            ("<pgdn>", Command::HalfPageDown),
            ("K", Command::HalfPageUp),
            ("<pgup>", Command::HalfPageUp),
            ("l", Command::Open { mode: 0, flags: "a" }),
            ("L", Command::Open { mode: 1, flags: "a" }),
            ("i", Command::Open { mode: 0, flags: "A" }),
            ("I", Command::Open { mode: 1, flags: "A" }),
            ("<cr>", Command::Open { mode: 0, flags: "A" }),
            ("<right>", Command::Open { mode: 0, flags: "A" }),
            ("n", Command::SearchNext),
            ("N", Command::SearchPrevious),
            ("fs", Command::FindBy(SearchMethod::Size)),
            ("fm", Command::FindBy(SearchMethod::Mtime)),
            ("fc", Command::FindBy(SearchMethod::Ctime)),
            ("fh", Command::FindBy(SearchMethod::Handler)),
            ("g0", Command::Goto("/")),
            ("gh", Command::Goto("~")),
            ("gu", Command::Goto("/usr")),
            ("ge", Command::Goto("/etc")),
            ("gm", Command::Goto("/media")),
            ("gn", Command::Goto("/mnt")),
            ("gt", Command::Goto("~/.trash")),
            ("gs", Command::Goto("/srv")),
            ("<tab>", Command::PreviousDir),
            (" ", Command::ToggleMark),
            ("v", Command::InvertMarks),
            ("V", Command::ClearMarks),
            ("yy", Command::Copy),
            ("cp", Command::Copy),
            ("cut", Command::Cut),
            ("p", Command::Paste),
            ("x", Command::KillFirstBar),
            ("X", Command::KillLastBar),
            ("t!", Command::Toggle(Toggle::Confirm)),
            ("tw", Command::Toggle(Toggle::WideBar)),
            ("tp", Command::Toggle(Toggle::Preview)),
            ("tf", Command::Toggle(Toggle::FilePreview)),
            ("th", Command::Toggle(Toggle::Hidden)),
            ("tu", Command::Toggle(Toggle::AsciiOnly)),
            ("td", Command::Toggle(Toggle::DirsFirst)),
            ("R", Command::Refresh),
            ("<c-r>", Command::ReloadAll),
            ("s", Command::Shell),
            ("du", Command::DiskUsage),
            ("E", Command::Edit),
            ("A", Command::SeedRename),
            ("ZZ", Command::Quit),
            ("Q", Command::Quit),
            ("<c-d>", Command::Quit),
            (":q<cr>", Command::Quit),
            ("<redraw>", Command::Redraw),
            (MOUSE, Command::Mouse),
        ] {
            map.bind(keys, command);
        }

        for (letter, key) in [
            ('n', SortKey::Name),
            ('e', SortKey::Extension),
            ('t', SortKey::Type),
            ('s', SortKey::Size),
            ('m', SortKey::Mtime),
            ('c', SortKey::Ctime),
        ] {
            map.bind(&format!("S{letter}"), Command::Sort { key, reverse: false });
            map.bind(
                &format!("S{}", letter.to_ascii_uppercase()),
                Command::Sort { key, reverse: true },
            );
        }

        map.bind(&format!("dd{confirm}"), Command::Trash);
        map.bind(&format!("delete{confirm}"), Command::Delete);

        for (keys, kind) in [
            ("mkdir", PromptKind::Mkdir),
            ("touch", PromptKind::Touch),
            ("cw", PromptKind::Rename),
            ("mv", PromptKind::Rename),
            ("rename", PromptKind::Rename),
            ("cd", PromptKind::Cd),
            ("!", PromptKind::Shell),
            ("/", PromptKind::Search),
            ("F", PromptKind::Filter),
            ("ff", PromptKind::Find),
            ("fr", PromptKind::Find),
            ("r", PromptKind::Run),
            ("grep", PromptKind::Grep),
        ] {
            map.node_mut(keys).prompt = Some(kind);
        }

        for (keys, kind) in [
            ("m", ArgKind::SetBookmark),
            ("um", ArgKind::UnsetBookmark),
            ("`", ArgKind::JumpBookmark),
            ("'", ArgKind::JumpBookmark),
            ("go", ArgKind::JumpBookmark),
            ("o", ArgKind::MoveToBookmark),
        ] {
            map.node_mut(keys).argument = Some(kind);
        }

        map
    }

    fn bind(&mut self, keys: &str, command: Command) {
        self.node_mut(keys).command = Some(command);
    }

    fn node_mut(&mut self, keys: &str) -> &mut Node {
        let mut node = &mut self.root;
        for token in tokenize(keys) {
            node = node.children.entry(token.to_string()).or_default();
        }
        node
    }

    pub fn resolve(&self, buffer: &str) -> Resolution {
        let tokens = tokenize(buffer);
        if tokens.is_empty() {
            return Resolution::Invalid;
        }
        let mut node = &self.root;
        let mut prompt: Option<(PromptKind, usize)> = None;
        for (index, token) in tokens.iter().enumerate() {
            if let Some(kind) = node.prompt {
                prompt = Some((kind, index));
            }
            match node.children.get(*token) {
                Some(next) => node = next,
                None => {
                    if let Some(kind) = node.argument {
                        if index + 1 == tokens.len() {
                            if let Some(key) = single_char(token) {
                                return Resolution::Argument { kind, key };
                            }
                        }
                    }
                    return match prompt {
                        Some((kind, start)) => Resolution::Prompt {
                            kind,
                            text: tokens[start..].concat(),
                        },
                        None => Resolution::Invalid,
                    };
                }
            }
        }

        if let Some(command) = node.command {
            Resolution::Command(command)
        } else if let Some(kind) = node.prompt {
            Resolution::Prompt {
                kind,
                text: String::new(),
            }
        } else if !node.children.is_empty() || node.argument.is_some() {
            Resolution::Pending
        } else {
            Resolution::Invalid
        }
    }
}

fn single_char(token: &str) -> Option<char> {
    if token == "<lt>" {
        return Some('<');
    }
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

pub fn tokenize(buffer: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut rest = buffer;
    while let Some(first) = rest.chars().next() {
        let len = if first == '<' {
            match rest.find('>') {
                Some(end) if end > 1 && rest[1..end].chars().all(is_token_char) => end + 1,
                _ => 1,
            }
        } else {
            first.len_utf8()
        };
        tokens.push(&rest[..len]);
        rest = &rest[len..];
    }
    tokens
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptInput {
    Editing(String),
    Commit(String),
    Cancel,
}

pub fn parse_prompt(text: &str) -> PromptInput {
    if text.ends_with("<esc>") {
        return PromptInput::Cancel;
    }
    match text.strip_suffix("<cr>") {
        Some(body) => PromptInput::Commit(decode_text(body)),
        None => PromptInput::Editing(decode_text(text)),
    }
}

fn decode_text(text: &str) -> String {
    let text = text.strip_prefix(' ').unwrap_or(text);
    text.replace("<lt>", "<")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    Empty,
    Prefix,
    Prompt(PromptKind),
    Ignoring,
}

#[derive(Debug, Default)]
pub struct InputMachine {
    buffer: String,
    ignore_until: Option<Instant>,
}

impl InputMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn set_buffer(&mut self, buffer: String) {
        self.buffer = buffer;
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn ignore_for(&mut self, duration: Duration, now: Instant) {
        self.ignore_until = Some(now + duration);
    }

    pub fn is_ignoring(&self, now: Instant) -> bool {
        self.ignore_until.is_some_and(|until| now < until)
    }

    pub fn accept(&mut self, token: &str, now: Instant) -> bool {
        if self.is_ignoring(now) {
            return false;
        }
        self.ignore_until = None;
        match token {
            BACKSPACE => {
                if self.buffer.is_empty() {
                    self.buffer.push_str(BACKSPACE);
                } else {
                    let keep = tokenize(&self.buffer)
                        .split_last()
                        .map(|(_, head)| head.iter().map(|t| t.len()).sum())
                        .unwrap_or(0);
                    self.buffer.truncate(keep);
                }
            }
            CLEAR_LINE => self.buffer.clear(),
            _ => self.buffer.push_str(token),
        }
        true
    }

    pub fn state(&self, keymap: &KeyMap, now: Instant) -> InputState {
        if self.is_ignoring(now) {
            return InputState::Ignoring;
        }
        if self.buffer.is_empty() {
            return InputState::Empty;
        }
        match keymap.resolve(&self.buffer) {
            Resolution::Prompt { kind, .. } => InputState::Prompt(kind),
            _ => InputState::Prefix,
        }
    }
}

pub fn token_from_key(event: &KeyEvent) -> Option<String> {
    if event.kind == KeyEventKind::Release {
        return None;
    }
    let ctrl = event.modifiers.contains(KeyModifiers::CONTROL);
    let shift = event.modifiers.contains(KeyModifiers::SHIFT);
    let alt = event.modifiers.contains(KeyModifiers::ALT);
    let token = match event.code {
        KeyCode::Char(c) if ctrl => {
            let c = c.to_ascii_lowercase();
            if c == 'l' {
                "<redraw>".to_string()
            } else {
                format!("<c-{c}>")
            }
        }
        KeyCode::Char('<') => "<lt>".to_string(),
        KeyCode::Char(c) if alt => format!("<a-{c}>"),
        KeyCode::Char(c) => c.to_string(),
        KeyCode::Enter => "<cr>".to_string(),
        KeyCode::Esc => "<esc>".to_string(),
        KeyCode::Backspace => BACKSPACE.to_string(),
        KeyCode::Tab => "<tab>".to_string(),
        KeyCode::BackTab => "<s-tab>".to_string(),
        KeyCode::Up => arrow("up", ctrl, shift),
        KeyCode::Down => arrow("down", ctrl, shift),
        KeyCode::Left => arrow("left", ctrl, shift),
        KeyCode::Right => arrow("right", ctrl, shift),
        KeyCode::Home => "<home>".to_string(),
        KeyCode::End => "<end>".to_string(),
        KeyCode::PageUp => "<pgup>".to_string(),
        KeyCode::PageDown => "<pgdn>".to_string(),
        KeyCode::Delete => "<del>".to_string(),
        KeyCode::Insert => "<ins>".to_string(),
        KeyCode::F(n) => format!("<f{n}>"),
        _ => return None,
    };
    Some(token)
}

fn arrow(name: &str, ctrl: bool, shift: bool) -> String {
    match (ctrl, shift) {
        (true, _) => format!("<c-{name}>"),
        (false, true) => format!("<s-{name}>"),
        (false, false) => format!("<{name}>"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseKey {
    Left,
    Right,
    Middle,
    WheelUp,
    WheelDown,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseAction {
    Press,
    Release,
    DoubleClick,
    TripleClick,
    Drag,
    Move,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseRecord {
    pub button: MouseKey,
    pub action: MouseAction,
    pub x: u16,
    pub y: u16,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl MouseRecord {
    pub fn is_left(&self) -> bool {
        self.button == MouseKey::Left
    }

    pub fn is_right(&self) -> bool {
        self.button == MouseKey::Right
    }
}

#[derive(Debug, Default)]
pub struct MouseDecoder {
    last: Option<(Instant, MouseKey, u16, u16, u8)>,
}

impl MouseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, event: &MouseEvent, now: Instant) -> MouseRecord {
        let (button, mut action) = match event.kind {
            MouseEventKind::Down(button) => (mouse_key(button), MouseAction::Press),
            MouseEventKind::Up(button) => (mouse_key(button), MouseAction::Release),
            MouseEventKind::Drag(button) => (mouse_key(button), MouseAction::Drag),
            MouseEventKind::ScrollUp => (MouseKey::WheelUp, MouseAction::Press),
            MouseEventKind::ScrollDown => (MouseKey::WheelDown, MouseAction::Press),
            _ => (MouseKey::None, MouseAction::Move),
        };
        let (x, y) = (event.column, event.row);
        if action == MouseAction::Press && matches!(button, MouseKey::Left | MouseKey::Right) {
            let count = match self.last {
                Some((at, last_button, lx, ly, count))
                    if last_button == button
                        && lx == x
                        && ly == y
                        && now.duration_since(at) <= MULTI_CLICK =>
                {
                    count + 1
                }
                _ => 1,
            };
            self.last = Some((now, button, x, y, count));
            action = match count {
                1 => MouseAction::Press,
                2 => MouseAction::DoubleClick,
                _ => MouseAction::TripleClick,
            };
        }
        MouseRecord {
            button,
            action,
            x,
            y,
            ctrl: event.modifiers.contains(KeyModifiers::CONTROL),
            shift: event.modifiers.contains(KeyModifiers::SHIFT),
            alt: event.modifiers.contains(KeyModifiers::ALT),
        }
    }
}

fn mouse_key(button: MouseButton) -> MouseKey {
    match button {
        MouseButton::Left => MouseKey::Left,
        MouseButton::Right => MouseKey::Right,
        MouseButton::Middle => MouseKey::Middle,
    }
}
