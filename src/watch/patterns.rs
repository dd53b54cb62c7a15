// src/watch/patterns.rs

//! Watch pattern grammar.
//!
//! - `*` matches any sequence within one path segment, never `/`.
//! - `**` matches any number of segments, including zero.
//! - A leading `./` is stripped.
//! - `.` watches the immediate directory contents, not descendants.
//! - A pattern with no `*` is a literal path that must exist at registration
//!   time (checked by the watcher, which knows the root directory).
//!
//! The recursive `/...` convention of some build tools is deliberately not
//! supported.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::errors::{Result, WatchrunError};

/// Compiled watch patterns for a single task, matched against paths relative
/// to the task's directory.
#[derive(Debug, Clone)]
pub struct WatchPatterns {
    set: GlobSet,
    literals: Vec<String>,
    watch_dot: bool,
}

impl WatchPatterns {
    pub fn compile(patterns: &[String]) -> Result<WatchPatterns> {
        let mut builder = GlobSetBuilder::new();
        let mut literals = Vec::new();
        let mut watch_dot = false;

        for raw in patterns {
            let pat = raw.strip_prefix("./").unwrap_or(raw);

            if pat == "." {
                watch_dot = true;
            } else if pat.contains('*') {
                let glob = GlobBuilder::new(pat)
                    .literal_separator(true)
                    .build()
                    .map_err(|err| {
                        WatchrunError::WatchSetup(format!("invalid watch pattern '{raw}': {err}"))
                    })?;
                builder.add(glob);
            } else {
                literals.push(pat.to_string());
            }
        }

        let set = builder
            .build()
            .map_err(|err| WatchrunError::WatchSetup(format!("building watch patterns: {err}")))?;

        Ok(WatchPatterns {
            set,
            literals,
            watch_dot,
        })
    }

    /// Wildcard-free patterns; the watcher requires these paths to exist when
    /// the registration is made.
    pub fn literals(&self) -> &[String] {
        &self.literals
    }

    /// Whether `rel` (a `/`-separated path relative to the task directory)
    /// is covered by these patterns.
    pub fn matches(&self, rel: &str) -> bool {
        if self.watch_dot && !rel.contains('/') {
            return true;
        }
        if self.literals.iter().any(|lit| lit == rel) {
            return true;
        }
        self.set.is_match(rel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(patterns: &[&str]) -> WatchPatterns {
        let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        WatchPatterns::compile(&patterns).unwrap()
    }

    #[test]
    fn star_stays_within_one_segment() {
        let pats = compile(&["src/*.js"]);
        assert!(pats.matches("src/app.js"));
        assert!(!pats.matches("src/website/app.js"));
    }

    #[test]
    fn double_star_crosses_segments() {
        let pats = compile(&["src/**/*.js"]);
        assert!(pats.matches("src/app.js"));
        assert!(pats.matches("src/website/deep/app.js"));
        assert!(!pats.matches("lib/app.js"));
    }

    #[test]
    fn bare_double_star_matches_everything() {
        let pats = compile(&["**"]);
        assert!(pats.matches("file"));
        assert!(pats.matches("a/b/c"));
    }

    #[test]
    fn leading_dot_slash_is_stripped() {
        let pats = compile(&["./some/path/file.txt"]);
        assert!(pats.matches("some/path/file.txt"));
        assert_eq!(pats.literals(), ["some/path/file.txt"]);
    }

    #[test]
    fn dot_watches_direct_entries_only() {
        let pats = compile(&["."]);
        assert!(pats.matches("file"));
        assert!(!pats.matches("sub/file"));
    }

    #[test]
    fn literal_matches_exactly() {
        let pats = compile(&["notes.md"]);
        assert!(pats.matches("notes.md"));
        assert!(!pats.matches("docs/notes.md"));
        assert!(!pats.matches("notes.md.bak"));
    }

    #[test]
    fn invalid_glob_is_a_setup_error() {
        let patterns = vec!["src/[".to_string()];
        // '[' without '*' is treated as a literal path, so add a '*' to force
        // glob compilation of the broken character class.
        let patterns_bad = vec!["src/[*".to_string()];
        assert!(WatchPatterns::compile(&patterns).is_ok());
        assert!(WatchPatterns::compile(&patterns_bad).is_err());
    }
}
