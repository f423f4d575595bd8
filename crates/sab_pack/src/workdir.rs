//! Lookup of sibling files in the folder being extracted.
//!
//! Patterns are globs matched against the whole file name. The game ships files whose
//! first letter changes case between releases, so lookups usually start with `*`
//! (`*lobal.map` finds both `Global.map` and `global.map`).

use std::path::{Path, PathBuf};

use glob::Pattern;

use crate::error::Result;

/// Whether the file name `name` matches the glob `pattern`
pub fn matches_pattern(name: &str, pattern: &str) -> Result<bool> {
    Ok(Pattern::new(pattern)?.matches(name))
}

/// Finds the first file of `dir`, in name order, matching `pattern`.
pub fn find_file(dir: &Path, pattern: &str) -> Result<Option<PathBuf>> {
    let pattern = Pattern::new(pattern)?;
    let mut candidates = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| pattern.matches(name))
        })
        .collect::<Vec<_>>();

    candidates.sort();
    Ok(candidates.into_iter().next())
}
