//! `get_attributes(path)` (§4.9).

use crate::error::{Error, Result};
use crate::path::VirtualPath;
use crate::policy::CachePolicy;
use crate::tree::NodeKind;

use super::{log_operation, system_time_secs, Facade};

/// Attributes returned for a virtual path, independent of whether the
/// underlying bytes are cached yet.
#[derive(Clone, Debug)]
pub struct FileAttributes {
    pub virtual_path: VirtualPath,
    pub is_directory: bool,
    pub size: u64,
    pub attributes: u32,
    pub created_unix: i64,
    pub modified_unix: i64,
    pub policy: CachePolicy,
}

/// Returns attributes from the `CacheEntry` (via the Cache Entry Table),
/// falling back to the Directory Tree node directly for paths that have
/// never been opened. Unknown paths return `Error::NotFound`.
pub fn get_attributes(facade: &Facade, path: &str) -> Result<FileAttributes> {
    let vp = VirtualPath::normalize(path);
    log_operation("get_attributes", &vp);

    let context = facade.context();
    context.metrics.filesystem_operation("get_attributes");
    if let Some(node) = context.tree.find(&vp) {
        let policy = context.policy.policy_for(&vp);
        return Ok(FileAttributes {
            virtual_path: vp,
            is_directory: node.kind == NodeKind::Dir,
            size: node.size,
            attributes: node.attributes,
            created_unix: system_time_secs(node.times.created),
            modified_unix: system_time_secs(node.times.modified),
            policy,
        });
    }

    let entry = context.table.get(&vp).ok_or(Error::NotFound)?;
    Ok(FileAttributes {
        virtual_path: vp,
        is_directory: false,
        size: entry.size(),
        attributes: entry.attributes,
        created_unix: system_time_secs(entry.created),
        modified_unix: system_time_secs(entry.modified),
        policy: entry.policy,
    })
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
        std::fs::write(dir.path().join("cl.exe"), b"exe").unwrap();
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
    async fn returns_attributes_for_a_known_file() {
        let dir = TempDir::new().unwrap();
        let facade = facade_over(&dir).await;

        let attrs = get_attributes(&facade, "/msvc/cl.exe").unwrap();
        assert!(!attrs.is_directory);
        assert_eq!(attrs.size, 3);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let dir = TempDir::new().unwrap();
        let facade = facade_over(&dir).await;

        assert!(matches!(get_attributes(&facade, "/msvc/missing.h"), Err(Error::NotFound)));
    }
}
