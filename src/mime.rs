use std::collections::HashMap;
use std::fs;
use std::path::Path;

const SYSTEM_TABLE: &str = "/etc/mime.types";

const BUILTIN: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("rs", "text/x-rust"),
    ("c", "text/x-c"),
    ("h", "text/x-c"),
    ("py", "text/x-python"),
    ("rb", "text/x-ruby"),
    ("sh", "application/x-sh"),
    ("toml", "application/toml"),
    ("json", "application/json"),
    ("yaml", "application/x-yaml"),
    ("yml", "application/x-yaml"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("xml", "application/xml"),
    ("pdf", "application/pdf"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("webp", "image/webp"),
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("flac", "audio/flac"),
    ("wav", "audio/x-wav"),
    ("avi", "video/x-msvideo"),
    ("mkv", "video/x-matroska"),
    ("mp4", "video/mp4"),
    ("mpg", "video/mpeg"),
    ("mpeg", "video/mpeg"),
    ("ogv", "video/ogg"),
    ("webm", "video/webm"),
    ("flv", "video/x-flv"),
    ("wmv", "video/x-ms-wmv"),
    ("zip", "application/zip"),
    ("tar", "application/x-tar"),
    ("gz", "application/gzip"),
    ("bz2", "application/x-bzip2"),
    ("xz", "application/x-xz"),
    ("7z", "application/x-7z-compressed"),
    ("rar", "application/vnd.rar"),
    ("jar", "application/java-archive"),
    ("swf", "application/x-shockwave-flash"),
];

#[derive(Debug, Clone, Default)]
pub struct MimeTable {
    by_extension: HashMap<String, String>,
}

impl MimeTable {
    pub fn load() -> Self {
        let mut table = Self::builtin();
        if let Ok(content) = fs::read_to_string(SYSTEM_TABLE) {
            table.merge(&content);
        }
        if let Some(home) = dirs::home_dir() {
            table.merge_file(&home.join(".mime.types"));
        }
        log::debug!("mime table holds {} extensions", table.len());
        table
    }

    pub fn builtin() -> Self {
        let by_extension = BUILTIN
            .iter()
            .map(|(ext, mime)| (ext.to_string(), mime.to_string()))
            .collect();
        Self { by_extension }
    }

    fn merge_file(&mut self, path: &Path) {
        if let Ok(content) = fs::read_to_string(path) {
            self.merge(&content);
        }
    }

    pub fn merge(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let Some(mime) = fields.next() else {
                continue;
            };
            for ext in fields {
                self.by_extension
                    .insert(ext.to_ascii_lowercase(), mime.to_string());
            }
        }
    }

    pub fn lookup(&self, extension: &str) -> Option<&str> {
        if extension.is_empty() {
            return None;
        }
        self.by_extension
            .get(&extension.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_extension.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty()
    }
}
