use crate::error::StampError;
use chrono::NaiveDateTime;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use url::Url;

const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// `<host>_<YYYYMMDD_HHMMSS>.pdf`, relative to the working directory.
pub fn default_output_path(url: &Url, fetched_at: &NaiveDateTime) -> PathBuf {
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .map(|host| {
            host.chars()
                .map(|c| match c {
                    'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' => c,
                    _ => '_',
                })
                .collect::<String>()
        })
        .unwrap_or_else(|| "page".to_string());

    PathBuf::from(format!(
        "{host}_{}.pdf",
        fetched_at.format(FILE_TIMESTAMP_FORMAT)
    ))
}

/// Writes `bytes` to `path`, replacing any existing file.
///
/// The data goes to a temporary file next to `path` first, so on failure the
/// destination is either untouched or absent.
pub fn write_output(path: &Path, bytes: &[u8]) -> Result<(), StampError> {
    let write_error = |source| StampError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir).map_err(write_error)?;
    file.write_all(bytes).map_err(write_error)?;
    file.as_file().sync_all().map_err(write_error)?;
    file.persist(path).map_err(|err| write_error(err.error))?;
    tracing::debug!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}
