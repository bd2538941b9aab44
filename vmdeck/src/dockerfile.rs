//! Dockerfile authoring.

use crate::errors::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

pub const FILE_NAME: &str = "Dockerfile";

/// Starting point for a small Python service.
pub const TEMPLATE: &str = r#"FROM python:3.9-slim

# Add these environment variables
ENV LANG C.UTF-8
ENV LC_ALL C.UTF-8

WORKDIR /app
COPY requirements.txt .
RUN pip install --no-cache-dir -r requirements.txt
COPY . .
EXPOSE 8000
CMD ["python", "app.py"]"#;

/// Write `content` to `<dir>/Dockerfile` and return the path written.
///
/// Surrounding whitespace is trimmed before writing. An existing file is
/// only replaced when `overwrite` is set.
pub async fn save(dir: &Path, content: &str, overwrite: bool) -> Result<PathBuf> {
    if dir.as_os_str().is_empty() {
        return Err(Error::Validation("target directory is required".into()));
    }
    let content = content.trim();
    if content.is_empty() {
        return Err(Error::Validation("Dockerfile content is empty".into()));
    }
    if !fs::metadata(dir).await.map(|m| m.is_dir()).unwrap_or(false) {
        return Err(Error::Validation(format!(
            "directory {} does not exist",
            dir.display()
        )));
    }

    let path = dir.join(FILE_NAME);
    if overwrite {
        fs::write(&path, content).await?;
    } else {
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::AlreadyExists(path))
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(content.as_bytes()).await?;
        // tokio files finish writes in the background until flushed
        file.flush().await?;
    }
    info!(path = %path.display(), overwrite, "Dockerfile saved");
    Ok(path)
}
