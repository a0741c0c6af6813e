//! The virtual directory tree (C3, §4.3): an in-memory trie of virtual
//! paths populated once at startup and read concurrently thereafter.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::SystemTime;

use crate::glob::CaseSensitivity;
use crate::path::VirtualPath;

/// Whether a node is a file or a directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Dir,
    File,
}

/// Timestamps carried on a node, mirroring the attribute triple the
/// upstream share reports.
#[derive(Clone, Copy, Debug)]
pub struct NodeTimes {
    pub created: SystemTime,
    pub accessed: SystemTime,
    pub modified: SystemTime,
}

impl Default for NodeTimes {
    fn default() -> Self {
        let now = SystemTime::now();
        NodeTimes { created: now, accessed: now, modified: now }
    }
}

/// A single entry in the directory tree.
///
/// Invariant: `virtual_path` is exactly the concatenation of this node's
/// ancestor names, `/`-separated (§3).
#[derive(Clone, Debug)]
pub struct DirectoryNode {
    pub name: String,
    pub virtual_path: VirtualPath,
    pub upstream_location: String,
    pub kind: NodeKind,
    pub size: u64,
    pub times: NodeTimes,
    pub attributes: u32,
    children: BTreeMap<String, DirectoryNode>,
}

impl DirectoryNode {
    fn new_dir(name: String, virtual_path: VirtualPath, upstream_location: String) -> Self {
        DirectoryNode {
            name,
            virtual_path,
            upstream_location,
            kind: NodeKind::Dir,
            size: 0,
            times: NodeTimes::default(),
            attributes: 0,
            children: BTreeMap::new(),
        }
    }

    fn key(name: &str, case: CaseSensitivity) -> String {
        match case {
            CaseSensitivity::Insensitive => name.to_lowercase(),
            CaseSensitivity::Sensitive => name.to_string(),
        }
    }

    /// Children sorted by name, as returned to enumeration callers (§4.3,
    /// §4.9: "sorted by name for determinism").
    pub fn children(&self) -> Vec<&DirectoryNode> {
        self.children.values().collect()
    }
}

/// Populated once at startup by the Directory Cache (C4), then read
/// concurrently by the Cache Entry Table and Filesystem Facade.
///
/// A single `RwLock` is sufficient: writes only happen during the build
/// phase (§4.3 design note), after which every access is a shared read.
pub struct DirectoryTree {
    root: RwLock<DirectoryNode>,
    case: CaseSensitivity,
}

impl DirectoryTree {
    pub fn new(case: CaseSensitivity) -> Self {
        DirectoryTree {
            root: RwLock::new(DirectoryNode::new_dir(
                String::new(),
                VirtualPath::root(),
                String::new(),
            )),
            case,
        }
    }

    pub fn case_sensitivity(&self) -> CaseSensitivity {
        self.case
    }

    /// Read-only trie walk.
    pub fn find(&self, vp: &VirtualPath) -> Option<DirectoryNode> {
        let root = self.root.read().expect("directory tree lock poisoned");
        Self::walk(&root, vp, self.case).cloned()
    }

    fn walk<'a>(
        node: &'a DirectoryNode,
        vp: &VirtualPath,
        case: CaseSensitivity,
    ) -> Option<&'a DirectoryNode> {
        if vp.is_root() {
            return Some(node);
        }
        let mut current = node;
        for segment in vp.segments() {
            let key = DirectoryNode::key(segment, case);
            current = current.children.get(&key)?;
        }
        Some(current)
    }

    /// Creates missing ancestors as directories and returns the leaf,
    /// upserting its `kind` to `kind` (§4.3 `create_path`).
    pub fn create_path(&self, vp: &VirtualPath, kind: NodeKind) -> DirectoryNode {
        let mut root = self.root.write().expect("directory tree lock poisoned");
        let case = self.case;
        if vp.is_root() {
            root.kind = NodeKind::Dir;
            return root.clone();
        }
        let mut current = &mut *root;
        let segments = vp.segments();
        let mut path_so_far = VirtualPath::root();
        for (i, segment) in segments.iter().enumerate() {
            path_so_far = path_so_far.join(segment);
            let key = DirectoryNode::key(segment, case);
            let is_last = i == segments.len() - 1;
            current = current.children.entry(key).or_insert_with(|| {
                DirectoryNode::new_dir(segment.to_string(), path_so_far.clone(), String::new())
            });
            if is_last {
                current.kind = kind;
            }
        }
        current.clone()
    }

    /// Idempotent upsert of a file node (§4.3 `add_file`).
    pub fn add_file(
        &self,
        vp: &VirtualPath,
        upstream_location: String,
        size: u64,
        times: NodeTimes,
    ) {
        let node = self.create_path(vp, NodeKind::File);
        self.update(vp, |n| {
            n.kind = NodeKind::File;
            n.upstream_location = upstream_location;
            n.size = size;
            n.times = times;
        });
        let _ = node;
    }

    /// Idempotent upsert of a directory node (§4.3 `add_dir`).
    pub fn add_dir(&self, vp: &VirtualPath, upstream_location: String) {
        self.create_path(vp, NodeKind::Dir);
        self.update(vp, |n| {
            n.kind = NodeKind::Dir;
            n.upstream_location = upstream_location;
        });
    }

    fn update(&self, vp: &VirtualPath, f: impl FnOnce(&mut DirectoryNode)) {
        let mut root = self.root.write().expect("directory tree lock poisoned");
        if vp.is_root() {
            f(&mut root);
            return;
        }
        let mut current = &mut *root;
        let case = self.case;
        for segment in vp.segments() {
            let key = DirectoryNode::key(segment, case);
            match current.children.get_mut(&key) {
                Some(child) => current = child,
                None => return,
            }
        }
        f(current);
    }

    /// Children of `vp`, sorted by name, or an empty vec if `vp` is
    /// missing or is a file.
    pub fn children(&self, vp: &VirtualPath) -> Vec<DirectoryNode> {
        let root = self.root.read().expect("directory tree lock poisoned");
        match Self::walk(&root, vp, self.case) {
            Some(node) if node.kind == NodeKind::Dir => {
                node.children().into_iter().cloned().collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        fn count(node: &DirectoryNode) -> usize {
            1 + node.children.values().map(count).sum::<usize>()
        }
        count(&self.root.read().expect("directory tree lock poisoned"))
    }

    /// Every `File` node reachable under `vp`, depth-first. Used by startup
    /// prefetch (§3) to find which files under a compiler root match its
    /// `prefetch` patterns without the caller needing to walk the tree
    /// itself.
    pub fn files_under(&self, vp: &VirtualPath) -> Vec<DirectoryNode> {
        let root = self.root.read().expect("directory tree lock poisoned");
        let Some(start) = Self::walk(&root, vp, self.case) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        Self::collect_files(start, &mut out);
        out
    }

    fn collect_files(node: &DirectoryNode, out: &mut Vec<DirectoryNode>) {
        match node.kind {
            NodeKind::File => out.push(node.clone()),
            NodeKind::Dir => {
                for child in node.children.values() {
                    Self::collect_files(child, out);
                }
            }
        }
    }
}
