//! Path filtering for watched trees.

use std::path::{Path, PathBuf};

use glob::Pattern;

/// Glob patterns ignored when none are configured.
///
/// Covers VCS metadata, dependency folders, bytecode caches and editor
/// swap/backup files.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "**/.git",
    "**/.git/**",
    "**/.hg",
    "**/.hg/**",
    "**/.svn",
    "**/.svn/**",
    "**/node_modules",
    "**/node_modules/**",
    "**/__pycache__",
    "**/__pycache__/**",
    "**/*.swp",
    "**/*.swx",
    "**/*~",
    "**/.DS_Store",
];

/// Decides which event paths reach the debouncer.
///
/// Patterns are matched against the path relative to the watch root it lives
/// under, or against the full path if it is outside every root.
#[derive(Debug)]
pub(crate) struct PathFilter {
    roots: Vec<PathBuf>,
    ignore: Vec<Pattern>,
    include: Vec<Pattern>,
}

impl PathFilter {
    /// Compile a filter.
    ///
    /// Roots are kept both as given and canonicalized, since some backends
    /// report resolved paths (e.g. `/private/var` on macOS).
    pub fn new(
        roots: &[PathBuf],
        ignore_patterns: &[String],
        watch_patterns: &[String],
    ) -> Result<Self, glob::PatternError> {
        let mut all_roots = Vec::with_capacity(roots.len() * 2);
        for root in roots {
            all_roots.push(root.clone());
            if let Ok(canonical) = root.canonicalize()
                && &canonical != root
            {
                all_roots.push(canonical);
            }
        }

        Ok(Self {
            roots: all_roots,
            ignore: compile(ignore_patterns)?,
            include: compile(watch_patterns)?,
        })
    }

    /// Whether events for `path` should be recorded.
    pub fn allows(&self, path: &Path) -> bool {
        let relative = self
            .roots
            .iter()
            .find_map(|root| path.strip_prefix(root).ok())
            .unwrap_or(path);

        if self
            .ignore
            .iter()
            .any(|p| p.matches_path(relative) || p.matches_path(path))
        {
            return false;
        }

        self.include.is_empty() || self.include.iter().any(|p| p.matches_path(relative))
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, glob::PatternError> {
    patterns.iter().map(|p| Pattern::new(p)).collect()
}
