use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::{DirEntry, WalkDir};

/// Read a file that is allowed to be absent.
///
/// Missing files yield `None` silently; any other failure is logged and
/// treated the same way, since a configuration layer that cannot be read
/// contributes nothing.
pub(crate) fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(s) => Some(s),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!("failed reading {}: {e}", path.display());
            None
        }
    }
}

fn is_ignored(e: &DirEntry) -> bool {
    let name = e.file_name().to_string_lossy();
    e.depth() > 0 && (name.starts_with('.') || name.ends_with('~'))
}

/// Expand a configuration path that may be a single file or a directory
/// tree of files, the way portage treats `/etc/portage/package.*`.
///
/// Directory entries are returned in lexical order; hidden files and `~`
/// backups are skipped.
pub(crate) fn config_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    if !path.is_dir() {
        return Vec::new();
    }

    WalkDir::new(path)
        .sort_by_file_name()
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !is_ignored(e))
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(err) => {
                warn!("failed walking {}: {err}", path.display());
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

/// Strip a trailing `# comment` and surrounding whitespace from a
/// configuration line.
pub(crate) fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => line[..idx].trim(),
        None => line.trim(),
    }
}
