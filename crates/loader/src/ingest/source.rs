//! Source — directory enumeration as a stream of files.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio_stream::Stream;
use tracing::{info, warn};

/// A file read fully into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Cannot list directory {}: {source}", .path.display())]
    ListDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Cannot read file {name}: {source}")]
    ReadFile {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Stream every regular file in `dir`, sorted by name, one read at a time.
///
/// A listing failure yields a single `ReadError::ListDir` and ends the
/// stream; a failed file read yields `ReadError::ReadFile` and the stream
/// moves on to the next file.
pub fn read_dir(dir: impl Into<PathBuf>) -> impl Stream<Item = Result<SourceFile, ReadError>> {
    let dir = dir.into();
    async_stream::stream! {
        let mut files = match list_files(&dir).await {
            Ok(files) => files,
            Err(source) => {
                yield Err(ReadError::ListDir { path: dir.clone(), source });
                return;
            }
        };
        files.sort();

        for (name, path) in files {
            info!(file = %name, "reading file");
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    let content = decode(&name, bytes);
                    yield Ok(SourceFile { name, content });
                }
                Err(source) => {
                    yield Err(ReadError::ReadFile { name, source });
                }
            }
        }
    }
}

async fn list_files(dir: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        // follows symlinks
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if is_file {
            files.push((entry.file_name().to_string_lossy().into_owned(), path));
        }
    }
    Ok(files)
}

fn decode(name: &str, bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            warn!(file = %name, "file is not valid UTF-8, replacing invalid bytes");
            String::from_utf8_lossy(err.as_bytes()).into_owned()
        }
    }
}
