//! Transcript-path sanitization: the single reusable primitive the file
//! watcher and the (stubbed) docs endpoints both need, centralized rather
//! than re-implemented at each call site.

use std::path::{Path, PathBuf};

/// Canonicalizes `candidate` and returns it only if the canonical path lies
/// beneath one of `allowed_roots` (also canonicalized). Returns `None` for a
/// path that doesn't exist, escapes every root via `..` or a symlink, or
/// can't be canonicalized at all.
pub fn resolve_under(candidate: &Path, allowed_roots: &[PathBuf]) -> Option<PathBuf> {
    let canonical = candidate.canonicalize().ok()?;
    for root in allowed_roots {
        if let Ok(canonical_root) = root.canonicalize() {
            if canonical.starts_with(&canonical_root) {
                return Some(canonical);
            }
        }
    }
    None
}
