//! Path sandbox: working-directory-scoped path resolution.
//!
//! The normalize-then-canonicalize-then-prefix-compare algorithm is lifted
//! directly from the teacher's `tools::filesystem::FileSystemTool::validate_path`
//! — including its handling of paths that don't exist yet by canonicalizing
//! the nearest existing ancestor, which defeats symlink tricks in parent
//! directories that a naive string-prefix check would miss.

use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxError {
    /// Path escapes both `cwd` and every allowed directory.
    PathTraversal(String),
    /// A canonicalization step hit an I/O error (e.g. permission denied, or
    /// no existing ancestor at all).
    Io(String),
}

impl std::fmt::Display for SandboxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxError::PathTraversal(p) => write!(f, "path escapes sandbox: {}", p),
            SandboxError::Io(msg) => write!(f, "sandbox I/O error: {}", msg),
        }
    }
}

impl std::error::Error for SandboxError {}

/// Working-directory-scoped path resolver.
pub struct PathSandbox {
    cwd: PathBuf,
    allowed_dirs: Vec<PathBuf>,
}

impl PathSandbox {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            allowed_dirs: Vec::new(),
        }
    }

    pub fn with_allowed_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.allowed_dirs = dirs;
        self
    }

    /// Resolve `input` to an absolute path guaranteed to lie inside `cwd` or
    /// one of `allowed_dirs`.
    ///
    /// - Relative inputs are joined to `cwd`, normalized (`.`/`..` resolved
    ///   lexically first), then canonicalized and checked against `cwd`.
    /// - Absolute inputs are accepted if they resolve inside `cwd`, else if
    ///   they resolve inside any allowed directory, else rejected.
    pub fn validate_path(&self, input: &str) -> Result<PathBuf, SandboxError> {
        let input_path = Path::new(input);
        let candidate = if input_path.is_absolute() {
            input_path.to_path_buf()
        } else {
            normalize_join(&self.cwd, input_path)
        };

        let canonical = canonicalize_nearest(&candidate)?;

        let cwd_canonical = canonicalize_nearest(&self.cwd)?;
        if canonical.starts_with(&cwd_canonical) {
            return Ok(candidate);
        }

        for dir in &self.allowed_dirs {
            if let Ok(dir_canonical) = canonicalize_nearest(dir) {
                if canonical.starts_with(&dir_canonical) {
                    return Ok(candidate);
                }
            }
        }

        Err(SandboxError::PathTraversal(input.to_string()))
    }

    /// Return a `cwd`-relative path if `absolute` lies inside `cwd`, else the
    /// original absolute path verbatim. Never returns a path starting with
    /// `..`.
    pub fn to_relative_path(&self, absolute: &Path) -> PathBuf {
        if let Ok(cwd_canonical) = canonicalize_nearest(&self.cwd) {
            if let Ok(candidate_canonical) = canonicalize_nearest(absolute) {
                if let Ok(stripped) = candidate_canonical.strip_prefix(&cwd_canonical) {
                    return stripped.to_path_buf();
                }
            }
        }
        absolute.to_path_buf()
    }
}

/// Lexically resolve `.`/`..` components of `relative` joined onto `base`,
/// without touching the filesystem.
fn normalize_join(base: &Path, relative: &Path) -> PathBuf {
    let mut normalized = base.to_path_buf();
    for component in relative.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            _ => {}
        }
    }
    normalized
}

/// Canonicalize `path` if it exists; otherwise canonicalize the nearest
/// existing ancestor and reconstruct the non-existent suffix under it. This
/// is what catches a symlink planted in a not-yet-created parent directory.
fn canonicalize_nearest(path: &Path) -> Result<PathBuf, SandboxError> {
    if path.exists() {
        return path
            .canonicalize()
            .map_err(|e| SandboxError::Io(e.to_string()));
    }
    let mut ancestor = path;
    loop {
        match ancestor.parent() {
            Some(parent) => {
                if parent.exists() {
                    let canonical_parent = parent
                        .canonicalize()
                        .map_err(|e| SandboxError::Io(e.to_string()))?;
                    let suffix = path.strip_prefix(parent).unwrap_or(path);
                    return Ok(canonical_parent.join(suffix));
                }
                ancestor = parent;
            }
            None => {
                return Err(SandboxError::Io(
                    "no existing ancestor found".to_string(),
                ))
            }
        }
    }
}
