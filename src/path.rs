//! Virtual path normalization (C1, §4.1).

use std::borrow::Borrow;
use std::fmt;

/// A `/`-rooted, forward-slash-normalized, trailing-slash-stripped path.
///
/// Construct with [`VirtualPath::normalize`]; there is no way to build one
/// that skips normalization, so every `VirtualPath` in the system is already
/// canonical.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualPath(String);

impl VirtualPath {
    /// Normalizes an arbitrary string per §4.1:
    /// 1. empty, `\`, or `/` → `/`
    /// 2. every `\` becomes `/`
    /// 3. a leading `/` is added if missing
    /// 4. a trailing `/` is stripped unless the result is `/`
    ///
    /// No `.`/`..` collapsing is performed; such segments are literal names.
    pub fn normalize(input: &str) -> Self {
        if input.is_empty() || input == "/" || input == "\\" {
            return VirtualPath("/".to_string());
        }

        let mut out = String::with_capacity(input.len() + 1);
        if !input.starts_with('/') && !input.starts_with('\\') {
            out.push('/');
        }
        for c in input.chars() {
            out.push(if c == '\\' { '/' } else { c });
        }
        if out.len() > 1 && out.ends_with('/') {
            out.pop();
        }
        VirtualPath(out)
    }

    pub fn root() -> Self {
        VirtualPath("/".to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the final path segment, or the empty string for the root.
    pub fn file_name(&self) -> &str {
        if self.is_root() {
            return "";
        }
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// Path of the parent directory, or `None` for the root.
    pub fn parent(&self) -> Option<VirtualPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(VirtualPath::root()),
            Some(idx) => Some(VirtualPath(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Segments of the path, root excluded. `/a/b` yields `["a", "b"]`.
    pub fn segments(&self) -> Vec<&str> {
        if self.is_root() {
            return Vec::new();
        }
        self.0.trim_start_matches('/').split('/').collect()
    }

    /// Joins a single child segment onto this path.
    pub fn join(&self, child: &str) -> VirtualPath {
        if self.is_root() {
            VirtualPath::normalize(&format!("/{child}"))
        } else {
            VirtualPath::normalize(&format!("{}/{child}", self.0))
        }
    }

    /// `true` if `self` is `other`, or a boundary-respecting prefix of it:
    /// the next character in `other` past `self`'s length must be `/` or
    /// absent. Used by the Policy Engine (§4.5) to find the longest
    /// matching compiler root without matching `/compilers/msvc/14.40` as a
    /// prefix of `/compilers/msvc/14.40x`.
    pub fn is_boundary_prefix_of(&self, other: &VirtualPath, case_insensitive: bool) -> bool {
        let (a, b) = if case_insensitive {
            (self.0.to_lowercase(), other.0.to_lowercase())
        } else {
            (self.0.clone(), other.0.clone())
        };
        if self.is_root() {
            return true;
        }
        if !b.starts_with(a.as_str()) {
            return false;
        }
        match b.as_bytes().get(a.len()) {
            None => true,
            Some(b'/') => true,
            _ => false,
        }
    }

    /// The portion of `other` following this path and its boundary `/`.
    /// Requires `self.is_boundary_prefix_of(other, ..)`.
    pub fn relative_to(&self, other: &VirtualPath) -> String {
        if self.is_root() {
            return other.0.trim_start_matches('/').to_string();
        }
        other.0[self.0.len()..].trim_start_matches('/').to_string()
    }
}

impl fmt::Debug for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPath({:?})", self.0)
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for VirtualPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VirtualPath {
    fn from(s: &str) -> Self {
        VirtualPath::normalize(s)
    }
}

impl From<String> for VirtualPath {
    fn from(s: String) -> Self {
        VirtualPath::normalize(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_cases_from_scenario_one() {
        let cases = [
            ("", "/"),
            ("/", "/"),
            ("\\", "/"),
            ("\\msvc-14.40", "/msvc-14.40"),
            ("/msvc-14.40/", "/msvc-14.40"),
            ("msvc-14.40", "/msvc-14.40"),
        ];
        for (input, expected) in cases {
            assert_eq!(VirtualPath::normalize(input).as_str(), expected, "input={input:?}");
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        for input in ["", "/", "\\", "a/b/c", "/a/b/c/", "a\\b\\c"] {
            let once = VirtualPath::normalize(input);
            let twice = VirtualPath::normalize(once.as_str());
            assert_eq!(once.as_str(), twice.as_str());
        }
    }

    #[test]
    fn dot_segments_are_literal() {
        assert_eq!(VirtualPath::normalize("/a/../b").as_str(), "/a/../b");
        assert_eq!(VirtualPath::normalize("/./a").as_str(), "/./a");
    }

    #[test]
    fn boundary_prefix_rejects_non_boundary_match() {
        let root = VirtualPath::normalize("/compilers/msvc/14.40.33807-14.40.33811.0");
        let inside = VirtualPath::normalize(
            "/compilers/msvc/14.40.33807-14.40.33811.0/bin/Hostx64/x64/cl.exe",
        );
        let lookalike = VirtualPath::normalize("/compilers/msvc/14.40.33807/bin/cl.exe");

        assert!(root.is_boundary_prefix_of(&inside, false));
        assert!(!root.is_boundary_prefix_of(&lookalike, false));
    }

    #[test]
    fn relative_to_strips_root_and_boundary_slash() {
        let root = VirtualPath::normalize("/compilers/msvc");
        let child = VirtualPath::normalize("/compilers/msvc/bin/cl.exe");
        assert_eq!(root.relative_to(&child), "bin/cl.exe");

        let top = VirtualPath::root();
        assert_eq!(top.relative_to(&child), "compilers/msvc/bin/cl.exe");
    }
}
