//! The `UpstreamReader` contract (§6) and a local-disk-backed
//! implementation used for tests and demos.
//!
//! Authentication and transport to the real network share are out of
//! scope (§1); this module plays the same role the teacher crate's
//! `ShadowFS` example plays for the NFS `Vfs` trait — a concrete
//! implementation backed by the host filesystem, useful for driving the
//! cache engine end to end without a real remote share.

use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::tree::NodeKind;

/// One entry returned by [`UpstreamReader::enumerate`].
#[derive(Clone, Debug)]
pub struct UpstreamEntry {
    pub name: String,
    pub kind: NodeKind,
    pub size: u64,
    pub created: SystemTime,
    pub modified: SystemTime,
    pub accessed: SystemTime,
    pub attributes: u32,
}

/// Abstract capability the cache engine needs from "the network": read a
/// whole file, read a byte range (for `NeverCache` paths), and enumerate a
/// directory. Transport, auth, and retry policy belong to the concrete
/// implementation.
#[async_trait]
pub trait UpstreamReader: Send + Sync {
    async fn read_all(&self, location: &str) -> Result<Vec<u8>>;

    async fn read_range(&self, location: &str, offset: u64, length: u32) -> Result<Vec<u8>>;

    async fn enumerate(&self, location: &str) -> Result<Vec<UpstreamEntry>>;
}

/// An `UpstreamReader` backed by an ordinary local directory tree, using
/// `\`-joined child locations the way the spec's `UpstreamLocation` is
/// composed during enumeration (§3).
pub struct LocalUpstreamReader {
    base: PathBuf,
}

impl LocalUpstreamReader {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        LocalUpstreamReader { base: base.into() }
    }

    fn resolve(&self, location: &str) -> PathBuf {
        if location.is_empty() {
            return self.base.clone();
        }
        let relative = location.replace('\\', "/");
        self.base.join(relative.trim_start_matches('/'))
    }

    pub fn join_child(parent: &str, child: &str) -> String {
        if parent.is_empty() {
            child.to_string()
        } else {
            format!("{parent}\\{child}")
        }
    }
}

#[async_trait]
impl UpstreamReader for LocalUpstreamReader {
    async fn read_all(&self, location: &str) -> Result<Vec<u8>> {
        let path = self.resolve(location);
        tokio::fs::read(&path).await.map_err(|e| Error::Io(format!("{}: {e}", path.display())))
    }

    async fn read_range(&self, location: &str, offset: u64, length: u32) -> Result<Vec<u8>> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        let path = self.resolve(location);
        let mut file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| Error::Io(format!("{}: {e}", path.display())))?;
        file.seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(|e| Error::Io(e.to_string()))?;
        let mut buf = vec![0u8; length as usize];
        let read = file.read(&mut buf).await.map_err(|e| Error::Io(e.to_string()))?;
        buf.truncate(read);
        Ok(buf)
    }

    async fn enumerate(&self, location: &str) -> Result<Vec<UpstreamEntry>> {
        let path = self.resolve(location);
        let mut entries = Vec::new();
        let mut read_dir = match tokio::fs::read_dir(&path).await {
            Ok(rd) => rd,
            // Missing/inaccessible upstream paths do not fail init (§4.4).
            Err(_) => return Ok(entries),
        };

        while let Some(entry) = read_dir.next_entry().await.map_err(|e| Error::Io(e.to_string()))? {
            let meta = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(UpstreamEntry {
                name,
                kind: if meta.is_dir() { NodeKind::Dir } else { NodeKind::File },
                size: meta.len(),
                created: meta.created().unwrap_or(SystemTime::now()),
                modified: meta.modified().unwrap_or(SystemTime::now()),
                accessed: meta.accessed().unwrap_or(SystemTime::now()),
                attributes: 0,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reads_whole_file_and_ranges() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cl.exe"), b"0123456789").unwrap();
        let reader = LocalUpstreamReader::new(dir.path());

        assert_eq!(reader.read_all("cl.exe").await.unwrap(), b"0123456789");
        assert_eq!(reader.read_range("cl.exe", 2, 4).await.unwrap(), b"2345");
    }

    #[tokio::test]
    async fn enumerate_missing_directory_is_empty_not_error() {
        let dir = TempDir::new().unwrap();
        let reader = LocalUpstreamReader::new(dir.path());
        let entries = reader.enumerate("does/not/exist").await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn enumerate_lists_files_and_dirs() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("bin")).unwrap();
        std::fs::write(dir.path().join("bin").join("cl.exe"), b"x").unwrap();
        let reader = LocalUpstreamReader::new(dir.path());

        let entries = reader.enumerate("bin").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "cl.exe");
        assert_eq!(entries[0].kind, NodeKind::File);
    }
}
