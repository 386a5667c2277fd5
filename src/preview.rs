use std::path::{Path, PathBuf};
use std::time::SystemTime;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::fs::{self, File};
use tokio::io::AsyncReadExt;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

const PREVIEW_LIMIT: usize = 65536;

const TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewData {
    Text(String),
    Binary { size: u64, kind: Option<String> },
    Empty,
}

#[derive(Debug, Clone)]
pub struct Preview {
    pub path: PathBuf,
    pub data: PreviewData,
    pub owner: String,
    pub modified: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn load(path: &Path) -> Result<Preview, PreviewError> {
    let metadata = fs::metadata(path).await?;
    let owner = owner_string(&metadata);
    let modified = metadata.modified().ok().and_then(format_time);
    if !metadata.is_file() {
        return Ok(Preview {
            path: path.to_path_buf(),
            data: PreviewData::Empty,
            owner,
            modified,
        });
    }

    let mut file = File::open(path).await?;
    let mut buf = vec![0u8; PREVIEW_LIMIT];
    let mut read_len = 0;
    while read_len < buf.len() {
        let read = file.read(&mut buf[read_len..]).await?;
        if read == 0 {
            break;
        }
        read_len += read;
    }
    buf.truncate(read_len);

    Ok(Preview {
        path: path.to_path_buf(),
        data: classify(&buf, metadata.len()),
        owner,
        modified,
    })
}

fn classify(buf: &[u8], size: u64) -> PreviewData {
    if buf.is_empty() {
        return PreviewData::Empty;
    }
    let kind = infer::get(buf).map(|kind| kind.mime_type().to_string());
    if kind.is_none() && !buf.contains(&0) {
        if let Some(text) = utf8_prefix(buf) {
            return PreviewData::Text(text.to_string());
        }
    }
    PreviewData::Binary { size, kind }
}

fn utf8_prefix(buf: &[u8]) -> Option<&str> {
    match std::str::from_utf8(buf) {
        Ok(text) => Some(text),
        Err(err) if err.error_len().is_none() => std::str::from_utf8(&buf[..err.valid_up_to()]).ok(),
        Err(_) => None,
    }
}

pub fn format_time(time: SystemTime) -> Option<String> {
    let timestamp = OffsetDateTime::from(time);
    let timestamp = match time::UtcOffset::current_local_offset() {
        Ok(offset) => timestamp.to_offset(offset),
        Err(_) => timestamp,
    };
    timestamp.format(TIME_FORMAT).ok()
}

#[cfg(unix)]
fn owner_string(metadata: &std::fs::Metadata) -> String {
    format!("{}:{}", metadata.uid(), metadata.gid())
}

#[cfg(not(unix))]
fn owner_string(_: &std::fs::Metadata) -> String {
    "-".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn text_files_preview_as_text() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notes.md");
        std::fs::write(&path, "# title\nbody\n").unwrap();
        let preview = load(&path).await.unwrap();
        assert_eq!(preview.data, PreviewData::Text("# title\nbody\n".into()));
        assert!(preview.modified.is_some());
    }

    #[tokio::test]
    async fn binary_and_empty_files() {
        let tmp = tempfile::tempdir().unwrap();
        let png = tmp.path().join("x.png");
        std::fs::write(&png, [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0]).unwrap();
        let preview = load(&png).await.unwrap();
        assert_eq!(
            preview.data,
            PreviewData::Binary {
                size: 10,
                kind: Some("image/png".into())
            }
        );

        let empty = tmp.path().join("empty");
        std::fs::write(&empty, b"").unwrap();
        assert_eq!(load(&empty).await.unwrap().data, PreviewData::Empty);
        assert_eq!(load(tmp.path()).await.unwrap().data, PreviewData::Empty);
    }

    #[test]
    fn truncated_utf8_is_still_text() {
        let bytes = "héllo".as_bytes();
        assert_eq!(utf8_prefix(&bytes[..2]), Some("h"));
        assert_eq!(utf8_prefix(&[0xff, 0x41]), None);
    }
}
