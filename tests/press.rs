use millr::app::App;
use millr::apps::DefaultApps;
use millr::config::Config;
use millr::context::{no_redraw, Context, Settings};
use millr::markers::Bookmarks;
use millr::mime::MimeTable;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

struct Session {
    _tmp: TempDir,
    work: PathBuf,
    trash: PathBuf,
    app: App,
}

fn session() -> Session {
    let tmp = tempfile::tempdir().unwrap();
    let base = tmp.path().canonicalize().unwrap();
    let work = base.join("work");
    fs::create_dir_all(work.join("inbox")).unwrap();
    fs::write(work.join("report.txt"), b"quarterly numbers").unwrap();
    fs::write(work.join("todo.md"), b"- ship it").unwrap();

    let mut config = Config::default();
    config.trash = base.join("trash").to_string_lossy().into_owned();
    let context = Context::new(Settings::from_config(&config), MimeTable::builtin());
    let app = App::new(
        context,
        &config,
        &work,
        Bookmarks::load_from(base.join("bookmarks.toml")),
        Box::new(DefaultApps::with_editor("vi")),
        no_redraw(),
    )
    .unwrap();
    Session {
        _tmp: tmp,
        trash: base.join("trash"),
        work,
        app,
    }
}

fn press(app: &mut App, keys: &[&str]) {
    for key in keys {
        app.press(key);
    }
}

fn point_at(app: &App, path: &Path) {
    app.navigator().point_at(path);
    assert_eq!(app.navigator().current_entry().unwrap().path, path);
}

fn names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|item| item.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn confirmed_trash_moves_selection_once() {
    let mut s = session();
    point_at(&s.app, &s.work.join("report.txt"));

    press(&mut s.app, &["d", "d"]);
    assert_eq!(s.app.buffer(), "dd");
    assert!(s.app.bars().is_empty());
    assert!(s.work.join("report.txt").exists());

    s.app.press("D");
    assert_eq!(s.app.buffer(), "");
    assert!(s.app.bars().wait_idle(Duration::from_secs(10)));

    assert_eq!(names(&s.trash), ["report.txt"]);
    assert!(!s.work.join("report.txt").exists());
    assert_eq!(s.app.copy_buffer(), [s.trash.join("report.txt")]);
}

#[test]
fn broken_sequence_does_nothing() {
    let mut s = session();
    point_at(&s.app, &s.work.join("report.txt"));
    press(&mut s.app, &["d", "z"]);
    assert_eq!(s.app.buffer(), "");
    assert!(s.app.bars().is_empty());
    assert!(s.work.join("report.txt").exists());
    assert!(!s.trash.exists());
}

#[test]
fn copy_and_paste_into_subdirectory() {
    let mut s = session();
    point_at(&s.app, &s.work.join("todo.md"));
    press(&mut s.app, &["y", "y"]);
    assert_eq!(s.app.copy_buffer(), [s.work.join("todo.md")]);

    point_at(&s.app, &s.work.join("inbox"));
    s.app.press("l");
    assert_eq!(s.app.navigator().pwd_path(), s.work.join("inbox"));
    s.app.press("p");
    assert!(s.app.bars().wait_idle(Duration::from_secs(10)));

    assert_eq!(fs::read(s.work.join("inbox/todo.md")).unwrap(), b"- ship it");
    assert!(s.work.join("todo.md").exists());
}

#[test]
fn cut_marked_files_and_paste_moves_them() {
    let mut s = session();
    point_at(&s.app, &s.work.join("report.txt"));
    press(&mut s.app, &[" ", " "]);
    {
        let pwd = s.app.navigator().pwd().read();
        let marked: Vec<&str> = pwd.marked().map(|e| e.basename.as_str()).collect();
        assert_eq!(marked, ["report.txt", "todo.md"]);
    }
    press(&mut s.app, &["c", "u", "t"]);
    assert!(s.app.is_cut());

    press(&mut s.app, &["g", "g", "l", "p"]);
    assert!(s.app.bars().wait_idle(Duration::from_secs(10)));
    assert_eq!(names(&s.work.join("inbox")), ["report.txt", "todo.md"]);
    assert_eq!(names(&s.work), ["inbox"]);
    assert!(!s.app.is_cut());
}

#[test]
fn bookmark_zero_is_the_start_directory() {
    let mut s = session();
    press(&mut s.app, &["g", "g", "l"]);
    assert_eq!(s.app.navigator().pwd_path(), s.work.join("inbox"));
    press(&mut s.app, &["'", "0"]);
    assert_eq!(s.app.navigator().pwd_path(), s.work);
}
