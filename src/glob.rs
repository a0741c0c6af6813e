//! Glob pattern matching over normalized virtual paths (C2, §4.2).
//!
//! Supports `?` (one character, never a separator), `*` (zero or more
//! characters within a segment) and `**` (zero or more full segments, able
//! to cross separators). Matching is anchored at both ends and done via a
//! bottom-up table over (path position, pattern token), so a `*` nested
//! inside a `**` segment gets its own backtrack choice instead of sharing
//! one frontier with the enclosing `**` — `O(path_len * token_count)` time
//! and space, still bounded regardless of how many wildcards a pattern has.

/// Whether glob and name comparisons fold case. Wired to config rather than
/// `cfg(windows)` so tests can pin either behavior (§9 design notes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaseSensitivity {
    Sensitive,
    Insensitive,
}

impl CaseSensitivity {
    pub fn platform_default() -> Self {
        if cfg!(windows) {
            CaseSensitivity::Insensitive
        } else {
            CaseSensitivity::Sensitive
        }
    }

    fn chars_equal(self, a: char, b: char) -> bool {
        match self {
            CaseSensitivity::Sensitive => a == b,
            CaseSensitivity::Insensitive => a.to_ascii_lowercase() == b.to_ascii_lowercase(),
        }
    }
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Tests whether `path` matches `pattern` in its entirety.
pub fn matches(path: &str, pattern: &str, case: CaseSensitivity) -> bool {
    let path: Vec<char> = path.chars().collect();
    let tokens = tokenize(pattern);
    matches_tokens(&path, &tokens, case)
}

/// One unit of a compiled pattern. `**` is its own token distinct from `*`
/// so the two wildcard kinds never share a backtrack frontier.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Token {
    Lit(char),
    Any,
    Star,
    DoubleStar,
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if i + 1 < chars.len() && chars[i + 1] == '*' => {
                tokens.push(Token::DoubleStar);
                i += 2;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '?' => {
                tokens.push(Token::Any);
                i += 1;
            }
            c => {
                tokens.push(Token::Lit(c));
                i += 1;
            }
        }
    }
    tokens
}

/// Tests whether `path` matches any pattern in `patterns`.
pub fn matches_any(path: &str, patterns: &[String], case: CaseSensitivity) -> bool {
    patterns.iter().any(|p| matches(path, p, case))
}

/// Sanity-checks a pattern at config-load time rather than discovering it's
/// unusable the first time a path is tested against it (§4.2/§4.12).
///
/// `**` only has a defined meaning as a whole path segment ("zero or more
/// full segments"); glued to other characters in the same segment (`a**`,
/// `**b`) it has no segment boundary to expand against, so that's rejected
/// rather than silently falling back to literal-star behavior.
pub fn validate_pattern(pattern: &str) -> Result<(), String> {
    if pattern.trim().is_empty() {
        return Err("pattern is empty".to_string());
    }
    for segment in pattern.split(|c| is_separator(c)) {
        if segment.contains("**") && segment != "**" {
            return Err(format!("'**' must occupy a whole path segment, found in '{segment}'"));
        }
    }
    Ok(())
}

/// Where a zero-width match of `tokens[t]` (a `Star`/`DoubleStar`) resumes.
/// `**` that occupies a whole segment is always adjacent to a separator
/// literal on at least one side (`validate_pattern` enforces this); matching
/// it as zero segments must fold away a directly-following separator too,
/// or `"stdio.h"` would never satisfy `"**/stdio.h"` (there's no `/` left
/// in the path for that literal to consume).
fn zero_width_target(tokens: &[Token], t: usize) -> usize {
    if matches!(tokens[t], Token::DoubleStar)
        && t + 1 < tokens.len()
        && matches!(tokens[t + 1], Token::Lit(c) if is_separator(c))
    {
        t + 2
    } else {
        t + 1
    }
}

/// Bottom-up table match: `table[p][t]` is whether `path[p..]` matches
/// `tokens[t..]`. Filled from the end backward so every cell only depends
/// on cells already computed, giving each `Star`/`DoubleStar` token its own
/// independent "skip" (zero-width) vs. "consume one char" choice rather
/// than sharing a single remembered frontier with any other wildcard in the
/// same pattern.
fn matches_tokens(path: &[char], tokens: &[Token], case: CaseSensitivity) -> bool {
    let plen = path.len();
    let tlen = tokens.len();
    // table[p][t]: does path[p..] match tokens[t..]?
    let mut table = vec![vec![false; tlen + 1]; plen + 1];
    table[plen][tlen] = true;
    for t in (0..tlen).rev() {
        table[plen][t] = matches!(tokens[t], Token::Star | Token::DoubleStar)
            && table[plen][zero_width_target(tokens, t)];
    }

    for p in (0..plen).rev() {
        for t in (0..tlen).rev() {
            table[p][t] = match tokens[t] {
                Token::Lit(c) => case.chars_equal(path[p], c) && table[p + 1][t + 1],
                Token::Any => !is_separator(path[p]) && table[p + 1][t + 1],
                Token::Star => {
                    // Zero-width: skip the star. Or consume one non-separator
                    // char and stay on the same star.
                    table[p][zero_width_target(tokens, t)] || (!is_separator(path[p]) && table[p + 1][t])
                }
                Token::DoubleStar => {
                    // Same as `Star` but may also consume a separator, and
                    // its zero-width skip may fold in a following one too.
                    table[p][zero_width_target(tokens, t)] || table[p + 1][t]
                }
            };
        }
    }

    table[0][0]
}
