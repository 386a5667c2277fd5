use crate::config::{Config, SortKey};
use crate::mime::MimeTable;
use parking_lot::RwLock;
use std::sync::Arc;

pub type Redraw = Arc<dyn Fn() + Send + Sync>;

pub fn no_redraw() -> Redraw {
    Arc::new(|| {})
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
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
    pub sort_generation: u64,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            show_hidden: config.show_hidden,
            sort: config.sort,
            sort_reverse: config.sort_reverse,
            dirs_first: config.dirs_first,
            preview: config.preview,
            file_preview: config.file_preview,
            confirm: config.confirm,
            confirm_string: config.confirm_string.clone(),
            ascii_only: config.ascii_only,
            wide_bar: config.wide_bar,
            mouse: config.mouse,
            sort_generation: 1,
        }
    }

    pub fn confirm_suffix(&self) -> &str {
        if self.confirm {
            &self.confirm_string
        } else {
            ""
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug)]
pub struct Context {
    settings: RwLock<Settings>,
    mime: MimeTable,
}

impl Context {
    pub fn new(settings: Settings, mime: MimeTable) -> Arc<Self> {
        Arc::new(Self {
            settings: RwLock::new(settings),
            mime,
        })
    }

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    pub fn sort_generation(&self) -> u64 {
        self.settings.read().sort_generation
    }

    pub fn update(&self, apply: impl FnOnce(&mut Settings)) {
        apply(&mut self.settings.write());
    }

    pub fn update_sort(&self, apply: impl FnOnce(&mut Settings)) {
        let mut settings = self.settings.write();
        apply(&mut settings);
        settings.sort_generation += 1;
    }

    pub fn mime(&self) -> &MimeTable {
        &self.mime
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_updates_bump_generation() {
        let context = Context::new(Settings::default(), MimeTable::builtin());
        let before = context.sort_generation();
        context.update(|settings| settings.preview = false);
        assert_eq!(context.sort_generation(), before);
        context.update_sort(|settings| settings.sort_reverse = true);
        assert_eq!(context.sort_generation(), before + 1);
        assert!(context.settings().sort_reverse);
    }

    #[test]
    fn confirm_suffix_follows_toggle() {
        let mut settings = Settings::default();
        assert_eq!(settings.confirm_suffix(), "D");
        settings.confirm = false;
        assert_eq!(settings.confirm_suffix(), "");
    }
}
