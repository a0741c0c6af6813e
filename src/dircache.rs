//! Directory Cache (C4, §4.4): populates the [`DirectoryTree`] from the
//! upstream shares once at startup.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::warn;

use crate::path::VirtualPath;
use crate::policy::CompilerRoot;
use crate::tree::{DirectoryTree, NodeKind, NodeTimes};
use crate::upstream::{LocalUpstreamReader, UpstreamReader};

/// Cap on recursion depth during enumeration, guarding against pathological
/// upstream structures (junction loops the cycle check doesn't catch, or
/// simply absurdly deep trees). §4.4 requires at least 50.
pub const MAX_ENUMERATION_DEPTH: usize = 64;

/// Builds the [`DirectoryTree`] by enumerating each [`CompilerRoot`]'s
/// upstream directory, recursively, once.
pub struct DirectoryCache<'a> {
    reader: &'a (dyn UpstreamReader + Sync),
}

impl<'a> DirectoryCache<'a> {
    pub fn new(reader: &'a (dyn UpstreamReader + Sync)) -> Self {
        DirectoryCache { reader }
    }

    /// Populates `tree` with every compiler root's subtree. Missing or
    /// inaccessible upstream paths do not fail this call; the affected
    /// subtree is simply left shallower (§4.4).
    pub async fn build(&self, tree: &Arc<DirectoryTree>, roots: &[CompilerRoot]) {
        for root in roots {
            tree.add_dir(&root.virtual_root, root.upstream_root.clone());
            self.enumerate_recursive(tree, &root.virtual_root, &root.upstream_root, 0, &mut Vec::new())
                .await;
        }
    }

    fn enumerate_recursive<'f>(
        &'f self,
        tree: &'f Arc<DirectoryTree>,
        virtual_dir: &'f VirtualPath,
        upstream_dir: &'f str,
        depth: usize,
        visited: &'f mut Vec<String>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + 'f>> {
        Box::pin(async move {
            if depth >= MAX_ENUMERATION_DEPTH {
                warn!(virtual_dir = %virtual_dir, "directory cache: max enumeration depth reached");
                return;
            }
            // Cycle detection: junctions/symlinks pointing back at an
            // ancestor upstream location must not recurse forever.
            if visited.iter().any(|v| v == upstream_dir) {
                warn!(upstream_dir, "directory cache: cycle detected, skipping");
                return;
            }
            visited.push(upstream_dir.to_string());

            let entries = match self.reader.enumerate(upstream_dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(upstream_dir, error = %e, "directory cache: enumeration failed, subtree left empty");
                    visited.pop();
                    return;
                }
            };

            // Breadth-first within a directory, depth-first across
            // subdirectories via the recursive call below.
            let mut subdirs = VecDeque::new();
            for entry in entries {
                let child_vp = virtual_dir.join(&entry.name);
                let child_upstream = LocalUpstreamReader::join_child(upstream_dir, &entry.name);
                let times = NodeTimes {
                    created: entry.created,
                    accessed: entry.accessed,
                    modified: entry.modified,
                };
                match entry.kind {
                    NodeKind::File => {
                        tree.add_file(&child_vp, child_upstream, entry.size, times);
                    }
                    NodeKind::Dir => {
                        tree.add_dir(&child_vp, child_upstream.clone());
                        subdirs.push_back((child_vp, child_upstream));
                    }
                }
            }

            for (child_vp, child_upstream) in subdirs {
                self.enumerate_recursive(tree, &child_vp, &child_upstream, depth + 1, visited).await;
            }

            visited.pop();
        })
    }
}
