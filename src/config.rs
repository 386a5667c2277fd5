use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub show_hidden: bool,
    pub sort: SortKey,
    pub sort_reverse: bool,
    pub dirs_first: bool,
    pub preview: bool,
    pub file_preview: bool,
    pub confirm: bool,
    pub confirm_string: String,
    pub ascii_only: bool,
    pub wide_bar: bool,
    pub mouse: bool,
    pub trash: String,
    pub log_level: String,
    pub scheduler: SchedulerConfig,
    pub bars: BarsConfig,
    pub input: InputConfig,
    pub theme: Theme,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            show_hidden: false,
            sort: SortKey::Name,
            sort_reverse: false,
            dirs_first: true,
            preview: true,
            file_preview: true,
            confirm: true,
            confirm_string: "D".to_string(),
            ascii_only: false,
            wide_bar: true,
            mouse: true,
            trash: "~/.trash".to_string(),
            log_level: "info".to_string(),
            scheduler: SchedulerConfig::default(),
            bars: BarsConfig::default(),
            input: InputConfig::default(),
            theme: Theme::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let fallback = Self::default();
        if let Ok(path) = env::var("MILLR_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return load_from_path(&path);
            }
            let _ = write_default_config(&path, &fallback);
            return Ok(fallback);
        }

        let paths = default_paths();
        for path in &paths {
            if path.exists() {
                return load_from_path(path);
            }
        }
        if let Some(path) = paths.first() {
            let _ = write_default_config(path, &fallback);
        }

        Ok(fallback)
    }

    pub fn trash_dir(&self) -> PathBuf {
        expand_home(&self.trash)
    }

    pub fn log_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Name,
    Extension,
    Type,
    Size,
    Ctime,
    Mtime,
}

impl SortKey {
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_lowercase() {
            'n' => Some(Self::Name),
            'e' => Some(Self::Extension),
            't' => Some(Self::Type),
            's' => Some(Self::Size),
            'c' => Some(Self::Ctime),
            'm' => Some(Self::Mtime),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Extension => "ext",
            Self::Type => "type",
            Self::Size => "size",
            Self::Ctime => "ctime",
            Self::Mtime => "mtime",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerPolicy {
    Cooperative,
    Signaled,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub policy: SchedulerPolicy,
    pub interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: SchedulerPolicy::Cooperative,
            interval_ms: 100,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BarsConfig {
    pub redraw_ms: u64,
}

impl Default for BarsConfig {
    fn default() -> Self {
        Self { redraw_ms: 500 }
    }
}

impl BarsConfig {
    pub fn redraw_interval(&self) -> Duration {
        Duration::from_millis(self.redraw_ms.max(10))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InputConfig {
    pub timeout_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self { timeout_ms: 1000 }
    }
}

impl InputConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(10))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Theme {
    pub background: String,
    pub foreground: String,
    pub selection_bg: String,
    pub selection_fg: String,
    pub accent: String,
    pub directory: String,
    pub symlink: String,
    pub broken: String,
    pub executable: String,
    pub marked: String,
    pub bar: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: "reset".to_string(),
            foreground: "white".to_string(),
            selection_bg: "blue".to_string(),
            selection_fg: "black".to_string(),
            accent: "cyan".to_string(),
            directory: "lightblue".to_string(),
            symlink: "cyan".to_string(),
            broken: "red".to_string(),
            executable: "green".to_string(),
            marked: "yellow".to_string(),
            bar: "green".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    Missing(PathBuf),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub fn expand_home(value: &str) -> PathBuf {
    if value == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = value.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(value)
}

fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        Err(err) => return Err(ConfigError::Io(err)),
    };
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => Ok(toml::from_str(&content)?),
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
        _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    }
}

fn write_default_config(path: &Path, config: &Config) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::to_string(config)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))?,
        _ => toml::to_string_pretty(config)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))?,
    };
    fs::write(path, content)
}

fn default_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(dir) = dirs::config_dir() {
        let base = dir.join("millr");
        paths.push(base.join("config.toml"));
        paths.push(base.join("config.yaml"));
        paths.push(base.join("config.yml"));
    }

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".millr.toml"));
        paths.push(home.join(".millr.yaml"));
        paths.push(home.join(".millr.yml"));
    }

    paths
}
