//! Compiler roots and the cache policy engine (C5, §4.5).

use crate::glob::{self, CaseSensitivity};
use crate::path::VirtualPath;

/// Classification a path is given on first entry creation (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CachePolicy {
    AlwaysCache,
    OnDemand,
    NeverCache,
}

/// A configured `(virtual_root, upstream_root, patterns)` triple (§3).
#[derive(Clone, Debug)]
pub struct CompilerRoot {
    pub virtual_root: VirtualPath,
    pub upstream_root: String,
    pub cache_always: Vec<String>,
    pub prefetch: Vec<String>,
    pub size_budget_bytes: Option<u64>,
}

impl CompilerRoot {
    pub fn new(virtual_root: VirtualPath, upstream_root: String) -> Self {
        CompilerRoot {
            virtual_root,
            upstream_root,
            cache_always: Vec::new(),
            prefetch: Vec::new(),
            size_budget_bytes: None,
        }
    }
}

/// Maps virtual paths to a [`CachePolicy`] using the longest matching
/// compiler root. Pure: the same `(path, roots)` pair always yields the
/// same policy (§4.5).
pub struct PolicyEngine {
    roots: Vec<CompilerRoot>,
    case: CaseSensitivity,
}

impl PolicyEngine {
    pub fn new(roots: Vec<CompilerRoot>, case: CaseSensitivity) -> Self {
        PolicyEngine { roots, case }
    }

    pub fn roots(&self) -> &[CompilerRoot] {
        &self.roots
    }

    /// Finds the compiler root whose `virtual_root` is the longest
    /// boundary-respecting prefix of `vp`.
    pub fn root_for(&self, vp: &VirtualPath) -> Option<&CompilerRoot> {
        self.roots
            .iter()
            .filter(|root| root.virtual_root.is_boundary_prefix_of(vp, self.is_insensitive()))
            .max_by_key(|root| root.virtual_root.as_str().len())
    }

    fn is_insensitive(&self) -> bool {
        matches!(self.case, CaseSensitivity::Insensitive)
    }

    /// `policy_for` from §4.5: empty paths, the root, or paths outside
    /// every compiler root all yield `NeverCache`.
    pub fn policy_for(&self, vp: &VirtualPath) -> CachePolicy {
        let Some(root) = self.root_for(vp) else {
            return CachePolicy::NeverCache;
        };
        if vp.as_str() == root.virtual_root.as_str() {
            // The root directory itself: no relative path to test against
            // `cache_always`, so it is on-demand (directory listing only).
            return CachePolicy::OnDemand;
        }
        let relative = root.virtual_root.relative_to(vp);
        if glob::matches_any(&relative, &root.cache_always, self.case) {
            CachePolicy::AlwaysCache
        } else {
            CachePolicy::OnDemand
        }
    }
}
