//! File trees that resolve request paths to sliceable, streamable files.
//!
//! [`DirectoryTree`] serves a directory on disk; [`MemoryTree`] holds files
//! in memory (embedded assets, tests). Both resolve paths the same way: the
//! query string is dropped, segments are percent-decoded, and anything that
//! could escape the root resolves as not found.

use std::collections::HashMap;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use url::Url;

const INDEX_FILE: &str = "index.html";
const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum FsError {
    #[error("no file at {0:?}")]
    NotFound(String),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

pub type FileReader = Box<dyn AsyncRead + Send + Unpin>;

/// A file, or a byte window onto one.
#[async_trait]
pub trait FileResource: Send + Sync {
    fn size(&self) -> u64;

    /// MIME type
    fn content_type(&self) -> &str;

    /// The bytes `[start, end)` of this resource, clamped to its size.
    /// `end: None` means through the end.
    fn slice(&self, start: u64, end: Option<u64>) -> Box<dyn FileResource>;

    /// Opens the bytes for reading.
    async fn stream(&self) -> io::Result<FileReader>;
}

#[async_trait]
pub trait FileTree: Send + Sync + 'static {
    async fn open_file(&self, path: &str) -> Result<Box<dyn FileResource>, FsError>;
}

/// Clamps a slice request to `[0, size]` with `start <= end`.
fn clamp_window(size: u64, start: u64, end: Option<u64>) -> (u64, u64) {
    let end = end.unwrap_or(size).min(size);
    let start = start.min(end);
    (start, end)
}

/// Decoded, safe path segments for a request target.
///
/// Returns `None` for targets that are not absolute paths or that contain
/// segments which cannot name a file under the root.
pub fn resolve_segments(target: &str) -> Option<Vec<String>> {
    if !target.starts_with('/') {
        return None;
    }

    let url = Url::parse(&format!("http://localhost{target}")).ok()?;
    let trailing_slash = url.path().ends_with('/');

    let mut segments = Vec::new();
    for raw in url.path_segments()? {
        if raw.is_empty() {
            continue;
        }
        let segment = percent_decode_str(raw).decode_utf8().ok()?;
        if segment == "." {
            continue;
        }
        if segment == ".." || segment.contains(['/', '\\', '\0']) {
            return None;
        }
        segments.push(segment.into_owned());
    }

    if trailing_slash || segments.is_empty() {
        segments.push(INDEX_FILE.to_string());
    }

    Some(segments)
}

/// Serves files from a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectoryTree {
    root: PathBuf,
}

impl DirectoryTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl FileTree for DirectoryTree {
    async fn open_file(&self, path: &str) -> Result<Box<dyn FileResource>, FsError> {
        let segments = resolve_segments(path).ok_or_else(|| FsError::NotFound(path.to_string()))?;
        let full: PathBuf = segments.iter().fold(self.root.clone(), |p, s| p.join(s));

        let meta = match tokio::fs::metadata(&full).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(FsError::NotFound(path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if !meta.is_file() {
            return Err(FsError::NotFound(path.to_string()));
        }

        let content_type = mime_guess::from_path(&full)
            .first_raw()
            .unwrap_or(OCTET_STREAM)
            .to_string();

        Ok(Box::new(DiskFile {
            path: full,
            offset: 0,
            len: meta.len(),
            content_type,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct DiskFile {
    path: PathBuf,
    offset: u64,
    len: u64,
    content_type: String,
}

#[async_trait]
impl FileResource for DiskFile {
    fn size(&self) -> u64 {
        self.len
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn slice(&self, start: u64, end: Option<u64>) -> Box<dyn FileResource> {
        let (start, end) = clamp_window(self.len, start, end);
        Box::new(DiskFile {
            path: self.path.clone(),
            offset: self.offset + start,
            len: end - start,
            content_type: self.content_type.clone(),
        })
    }

    async fn stream(&self) -> io::Result<FileReader> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        if self.offset > 0 {
            file.seek(SeekFrom::Start(self.offset)).await?;
        }
        Ok(Box::new(file.take(self.len)))
    }
}

/// Serves files held in memory, keyed by their normalized path.
#[derive(Debug, Clone, Default)]
pub struct MemoryTree {
    files: HashMap<String, MemoryFile>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file. Paths that cannot be served are ignored.
    pub fn insert(
        &mut self,
        path: &str,
        data: impl Into<Bytes>,
        content_type: impl Into<String>,
    ) -> &mut Self {
        match resolve_segments(path) {
            Some(segments) => {
                self.files.insert(
                    segments.join("/"),
                    MemoryFile {
                        data: data.into(),
                        content_type: content_type.into(),
                    },
                );
            }
            None => tracing::warn!(path, "Ignoring unservable in-memory file path"),
        }
        self
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_file(
        mut self,
        path: &str,
        data: impl Into<Bytes>,
        content_type: impl Into<String>,
    ) -> Self {
        self.insert(path, data, content_type);
        self
    }
}

#[async_trait]
impl FileTree for MemoryTree {
    async fn open_file(&self, path: &str) -> Result<Box<dyn FileResource>, FsError> {
        resolve_segments(path)
            .and_then(|segments| self.files.get(&segments.join("/")))
            .map(|file| Box::new(file.clone()) as Box<dyn FileResource>)
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct MemoryFile {
    data: Bytes,
    content_type: String,
}

impl MemoryFile {
    pub fn new(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
        }
    }
}

#[async_trait]
impl FileResource for MemoryFile {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn slice(&self, start: u64, end: Option<u64>) -> Box<dyn FileResource> {
        let (start, end) = clamp_window(self.size(), start, end);
        Box::new(MemoryFile {
            data: self.data.slice(start as usize..end as usize),
            content_type: self.content_type.clone(),
        })
    }

    async fn stream(&self) -> io::Result<FileReader> {
        Ok(Box::new(io::Cursor::new(self.data.clone())))
    }
}
