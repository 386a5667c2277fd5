use clap::Parser;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture, Event};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use millr::app::{App, Effect, Geometry};
use millr::apps::{DefaultApps, Launch};
use millr::config::Config;
use millr::context::{Context, Settings};
use millr::keys::{token_from_key, MouseDecoder};
use millr::markers::Bookmarks;
use millr::mime::MimeTable;
use millr::preview::{self, Preview, PreviewError};
use millr::ui;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use simplelog::WriteLogger;
use std::env;
use std::error::Error;
use std::fs::{self, File};
use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc as tokio_mpsc;

const INPUT_POLL: Duration = Duration::from_millis(100);

/// Multi-column terminal file browser.
#[derive(Debug, Parser)]
#[command(name = "millr", version, about)]
struct Args {
    /// Directory to start in, or a file to point at.
    path: Option<String>,
    /// Terminate every other running millr and exit.
    #[arg(short, long)]
    kill: bool,
}

enum AppEvent {
    Input(Event),
    Redraw,
    Preview {
        id: u64,
        result: Result<Preview, PreviewError>,
    },
}

type Tui = Terminal<CrosstermBackend<Stdout>>;

struct TerminalGuard {
    mouse: bool,
}

impl TerminalGuard {
    fn enter(mouse: bool) -> io::Result<Self> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen, cursor::Hide)?;
        if mouse {
            execute!(io::stdout(), EnableMouseCapture)?;
        }
        Ok(Self { mouse })
    }

    fn suspend(&self) -> io::Result<()> {
        if self.mouse {
            execute!(io::stdout(), DisableMouseCapture)?;
        }
        execute!(io::stdout(), LeaveAlternateScreen, cursor::Show)?;
        disable_raw_mode()
    }

    fn resume(&self) -> io::Result<()> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen, cursor::Hide)?;
        if self.mouse {
            execute!(io::stdout(), EnableMouseCapture)?;
        }
        Ok(())
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if self.mouse {
            let _ = execute!(io::stdout(), DisableMouseCapture);
        }
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, cursor::Show);
    }
}

fn spawn_input(tx: tokio_mpsc::UnboundedSender<AppEvent>, paused: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || loop {
        if paused.load(Ordering::SeqCst) {
            thread::sleep(INPUT_POLL);
            continue;
        }
        match event::poll(INPUT_POLL) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(_) => break,
        }
        match event::read() {
            Ok(event) => {
                if tx.send(AppEvent::Input(event)).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    })
}

fn init_logging(config: &Config) {
    let Some(dir) = dirs::cache_dir().map(|dir| dir.join("millr")) else {
        return;
    };
    if fs::create_dir_all(&dir).is_err() {
        return;
    }
    if let Ok(file) = File::create(dir.join("millr.log")) {
        let _ = WriteLogger::init(config.log_filter(), simplelog::Config::default(), file);
    }
}

fn kill_others() -> usize {
    let system = sysinfo::System::new_all();
    let me = sysinfo::get_current_pid().ok();
    system
        .processes()
        .iter()
        .filter(|(pid, process)| Some(**pid) != me && process.name() == "millr")
        .filter(|(_, process)| process.kill())
        .count()
}

fn start_location(arg: Option<&str>) -> (PathBuf, Option<PathBuf>) {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    let Some(arg) = arg else {
        return (cwd, None);
    };
    let raw = arg.strip_prefix("file://").unwrap_or(arg);
    let path = cwd.join(millr::config::expand_home(raw));
    if path.is_dir() {
        (path, None)
    } else if path.exists() {
        match path.parent() {
            Some(parent) => (parent.to_path_buf(), Some(path.clone())),
            None => (cwd, None),
        }
    } else {
        (cwd, None)
    }
}

struct Previewer {
    request_id: u64,
    path: Option<PathBuf>,
    current: Option<Preview>,
}

impl Previewer {
    fn request(&mut self, app: &App, tx: &tokio_mpsc::UnboundedSender<AppEvent>) {
        let settings = app.context().settings();
        let target = app
            .navigator()
            .current_entry()
            .filter(|entry| entry.is_file() && settings.preview && settings.file_preview)
            .map(|entry| entry.path);
        if target == self.path {
            return;
        }
        self.path = target.clone();
        self.current = None;
        let Some(path) = target else {
            return;
        };
        self.request_id = self.request_id.wrapping_add(1);
        let id = self.request_id;
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = preview::load(&path).await;
            let _ = tx.send(AppEvent::Preview { id, result });
        });
    }

    fn apply(&mut self, id: u64, result: Result<Preview, PreviewError>) -> bool {
        if id != self.request_id {
            return false;
        }
        match result {
            Ok(preview) => self.current = Some(preview),
            Err(err) => {
                log::debug!("preview failed: {err}");
                self.current = None;
            }
        }
        true
    }
}

fn spawn_detached(launch: &Launch) -> io::Result<()> {
    let mut command = if launch.new_term {
        let terminal = env::var("TERMCMD").unwrap_or_else(|_| "x-terminal-emulator".to_string());
        let mut command = Command::new(terminal);
        command.arg("-e").arg("sh").arg("-c").arg(&launch.command);
        command
    } else {
        let mut command = Command::new("sh");
        command.arg("-c").arg(&launch.command);
        command
    };
    command
        .current_dir(&launch.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(())
}

fn run_inside(terminal: &mut Tui, guard: &TerminalGuard, launch: &Launch) -> io::Result<()> {
    guard.suspend()?;
    let status = Command::new("sh")
        .arg("-c")
        .arg(&launch.command)
        .current_dir(&launch.cwd)
        .status();
    match &status {
        Ok(status) if !status.success() => log::info!("`{}` exited with {status}", launch.command),
        Ok(_) => {}
        Err(err) => log::warn!("cannot run `{}`: {err}", launch.command),
    }
    if launch.wait {
        println!("Press ENTER to continue");
        let mut line = String::new();
        let _ = io::stdin().read_line(&mut line);
    }
    guard.resume()?;
    terminal.clear()
}

fn draw(terminal: &mut Tui, app: &mut App, previewer: &Previewer, config: &Config) -> io::Result<()> {
    let mut geometry = Geometry::default();
    terminal.draw(|frame| geometry = ui::render(frame, app, previewer.current.as_ref(), &config.theme))?;
    app.set_geometry(geometry);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    if args.kill {
        let killed = kill_others();
        println!("killed {killed} process(es)");
        return Ok(());
    }

    let config = Config::load()?;
    init_logging(&config);
    log::info!("millr starting");

    let (start, point_at) = start_location(args.path.as_deref());
    let context = Context::new(Settings::from_config(&config), MimeTable::load());

    let (tx, mut rx) = tokio_mpsc::unbounded_channel();
    let redraw_tx = tx.clone();
    let redraw: millr::context::Redraw = Arc::new(move || {
        let _ = redraw_tx.send(AppEvent::Redraw);
    });

    let mut app = App::new(
        context,
        &config,
        &start,
        Bookmarks::load(),
        Box::new(DefaultApps::new()),
        redraw,
    )?;
    if let Some(path) = point_at {
        app.navigator().point_at(&path);
    }

    let guard = TerminalGuard::enter(config.mouse)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
    terminal.clear()?;

    let paused = Arc::new(AtomicBool::new(false));
    let _input_handle = spawn_input(tx.clone(), Arc::clone(&paused));
    let mut mouse = MouseDecoder::new();
    let mut previewer = Previewer {
        request_id: 0,
        path: None,
        current: None,
    };

    previewer.request(&app, &tx);
    draw(&mut terminal, &mut app, &previewer, &config)?;

    'events: loop {
        let event = match tokio::time::timeout(config.input.timeout(), rx.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(_) => {
                app.tick();
                previewer.request(&app, &tx);
                draw(&mut terminal, &mut app, &previewer, &config)?;
                continue;
            }
        };

        match event {
            AppEvent::Input(Event::Key(key)) => {
                if let Some(token) = token_from_key(&key) {
                    app.press(&token);
                }
            }
            AppEvent::Input(Event::Mouse(event)) => {
                app.press_mouse(mouse.decode(&event, Instant::now()));
            }
            AppEvent::Input(_) | AppEvent::Redraw => {}
            AppEvent::Preview { id, result } => {
                if !previewer.apply(id, result) {
                    continue;
                }
            }
        }

        for effect in app.take_effects() {
            match effect {
                Effect::Quit => break 'events,
                Effect::Redraw => terminal.clear()?,
                Effect::Open(path) => {
                    if let Err(err) = open::that_detached(&path) {
                        log::warn!("cannot open {}: {err}", path.display());
                    }
                }
                Effect::Run(launch) if launch.detach || launch.new_term => {
                    if let Err(err) = spawn_detached(&launch) {
                        log::warn!("cannot start `{}`: {err}", launch.command);
                    }
                }
                Effect::Run(launch) => {
                    paused.store(true, Ordering::SeqCst);
                    app.before_external();
                    let result = run_inside(&mut terminal, &guard, &launch);
                    app.after_external();
                    paused.store(false, Ordering::SeqCst);
                    result?;
                }
            }
        }

        previewer.request(&app, &tx);
        draw(&mut terminal, &mut app, &previewer, &config)?;
    }

    drop(guard);
    if let Err(err) = app.shutdown() {
        log::error!("{err}");
    }
    log::info!("millr exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_argument_points_at_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("readme.md");
        fs::write(&file, b"x").unwrap();
        let arg = format!("file://{}", file.display());
        let (start, point_at) = start_location(Some(&arg));
        assert_eq!(start, tmp.path());
        assert_eq!(point_at.as_deref(), Some(file.as_path()));
    }

    #[test]
    fn missing_path_falls_back_to_cwd() {
        let (start, point_at) = start_location(Some("/definitely/not/here"));
        assert_eq!(start, env::current_dir().unwrap());
        assert!(point_at.is_none());
    }

    #[test]
    fn kill_flag_parses() {
        let args = Args::try_parse_from(["millr", "-k"]).unwrap();
        assert!(args.kill);
        let args = Args::try_parse_from(["millr", "/tmp"]).unwrap();
        assert_eq!(args.path.as_deref(), Some("/tmp"));
    }
}
