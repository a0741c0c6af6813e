//! `read_directory(path, filter?)` (§4.9).

use crate::error::{Error, Result};
use crate::glob;
use crate::path::VirtualPath;
use crate::tree::NodeKind;

use super::{log_operation, system_time_secs, Facade};

/// One entry returned by `read_directory`.
#[derive(Clone, Debug)]
pub struct DirEntry {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub created_unix: i64,
    pub modified_unix: i64,
}

/// Lists the directory at `path`, sorted by name (§4.3), optionally
/// restricted to entries whose *name* (not full path) matches `filter`.
/// `path` must name a directory; a file path or a missing path is
/// `Error::NotFound`.
pub fn read_directory(facade: &Facade, path: &str, filter: Option<&str>) -> Result<Vec<DirEntry>> {
    let vp = VirtualPath::normalize(path);
    log_operation("read_directory", &vp);

    let context = facade.context();
    context.metrics.filesystem_operation("read_directory");
    let node = context.tree.find(&vp).ok_or(Error::NotFound)?;
    if node.kind != NodeKind::Dir {
        return Err(Error::NotFound);
    }

    let case = context.tree.case_sensitivity();
    let entries = context
        .tree
        .children(&vp)
        .into_iter()
        .filter(|child| match filter {
            Some(pattern) => glob::matches(&child.name, pattern, case),
            None => true,
        })
        .map(|child| DirEntry {
            name: child.name,
            is_directory: child.kind == NodeKind::Dir,
            size: child.size,
            created_unix: system_time_secs(child.times.created),
            modified_unix: system_time_secs(child.times.modified),
        })
        .collect();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrateConfig;
    use crate::context::Context;
    use crate::upstream::LocalUpstreamReader;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn facade_over(dir: &TempDir) -> Facade {
        let toml = format!(
            "[[compiler_root]]\nvirtual_root = \"/msvc\"\nupstream_root = \"{}\"\n",
            dir.path().display().to_string().replace('\\', "\\\\")
        );
        let config = CrateConfig::parse(&toml).unwrap();
        let upstream: Arc<dyn crate::upstream::UpstreamReader + Send + Sync> =
            Arc::new(LocalUpstreamReader::new(dir.path()));
        let context = Context::build_with_defaults(config, upstream).await;
        Facade::new(Arc::new(context))
    }

    #[tokio::test]
    async fn lists_children_sorted_by_name() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("bin")).unwrap();
        std::fs::write(dir.path().join("bin").join("zeta.exe"), b"z").unwrap();
        std::fs::write(dir.path().join("bin").join("alpha.exe"), b"a").unwrap();
        let facade = facade_over(&dir).await;

        let entries = read_directory(&facade, "/msvc/bin", None).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["alpha.exe", "zeta.exe"]);
    }

    #[tokio::test]
    async fn filter_matches_against_name_only() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cl.exe"), b"x").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"x").unwrap();
        let facade = facade_over(&dir).await;

        let entries = read_directory(&facade, "/msvc", Some("*.exe")).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "cl.exe");
    }

    #[tokio::test]
    async fn reading_a_file_path_is_not_found() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cl.exe"), b"x").unwrap();
        let facade = facade_over(&dir).await;

        assert!(matches!(read_directory(&facade, "/msvc/cl.exe", None), Err(Error::NotFound)));
    }
}
