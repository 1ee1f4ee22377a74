use std::path::{Path, PathBuf};

use tracing::debug;

use crate::atom::strip_repo;
use crate::utils::{config_files, read_optional, strip_comment};

/// One `atom flag -flag ...` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageUseEntry {
    /// Atom token as written, `::repo` suffix included.
    pub atom: String,
    /// Flag tokens in order; a leading `-` disables.
    pub flags: Vec<String>,
    /// File the line came from, if loaded from disk.
    pub source: Option<PathBuf>,
}

impl PackageUseEntry {
    fn parse(line: &str, source: Option<&Path>) -> Option<PackageUseEntry> {
        let mut tokens = strip_comment(line).split_whitespace();
        let atom = tokens.next()?;
        Some(PackageUseEntry {
            atom: atom.to_string(),
            flags: tokens.map(str::to_string).collect(),
            source: source.map(Path::to_path_buf),
        })
    }

    /// Whether this line applies to `category/package` at `version`.
    ///
    /// A line applies when its atom is the bare key or the exact-version
    /// atom `=category/package-version`.
    pub fn applies_to(&self, key: &str, version: &str) -> bool {
        let atom = strip_repo(&self.atom);
        if atom == key {
            return true;
        }
        match atom.strip_prefix('=').and_then(|a| a.strip_prefix(key)) {
            Some(rest) => !version.is_empty() && rest.strip_prefix('-') == Some(version),
            None => false,
        }
    }
}

/// Per-package USE overrides, as found under `/etc/portage/package.use`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageUse {
    entries: Vec<PackageUseEntry>,
}

impl PackageUse {
    /// Parse the text of a single file.
    pub fn parse(text: &str) -> PackageUse {
        PackageUse {
            entries: text
                .lines()
                .filter_map(|line| PackageUseEntry::parse(line, None))
                .collect(),
        }
    }

    /// Load from a file or a directory tree of files, in lexical order.
    ///
    /// A missing path yields no entries.
    pub fn load(path: &Path) -> PackageUse {
        let mut entries = Vec::new();
        for file in config_files(path) {
            if let Some(text) = read_optional(&file) {
                entries.extend(
                    text.lines()
                        .filter_map(|line| PackageUseEntry::parse(line, Some(&file))),
                );
            }
        }
        debug!("loaded {} package.use entries from {}", entries.len(), path.display());
        PackageUse { entries }
    }

    pub fn entries(&self) -> &[PackageUseEntry] {
        &self.entries
    }

    /// Flags from every line that applies to `key` at `version`, in load
    /// order, so later lines win when applied in sequence.
    ///
    /// # Examples
    ///
    /// ```
    /// use portage_inspect::PackageUse;
    ///
    /// let config = PackageUse::parse("\
    /// media-video/mpv vaapi -lua
    /// =media-video/mpv-0.38.0 lua
    /// media-video/ffmpeg x265
    /// ");
    /// assert_eq!(config.flags_for("media-video/mpv", "0.38.0"), ["vaapi", "-lua", "lua"]);
    /// assert_eq!(config.flags_for("media-video/mpv", "0.37.0"), ["vaapi", "-lua"]);
    /// ```
    pub fn flags_for(&self, key: &str, version: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.applies_to(key, version))
            .flat_map(|e| e.flags.iter().map(String::as_str))
            .collect()
    }
}

fn first_token(line: &str) -> Option<&str> {
    strip_comment(line).split_whitespace().next()
}

/// Drop every line of `text` whose atom token is exactly `atom`.
///
/// Comments, blank lines and lines for other atoms are kept verbatim.
pub fn remove_atom(text: &str, atom: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        if first_token(line) != Some(atom) {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// Replace the flags configured for `atom` with a single new line.
///
/// # Examples
///
/// ```
/// use portage_inspect::package_use;
///
/// let text = "# local\napp-misc/foo bar\napp-misc/baz qux\n";
/// assert_eq!(
///     package_use::set_flags(text, "app-misc/foo", &["-bar", "gtk"]),
///     "# local\napp-misc/baz qux\napp-misc/foo -bar gtk\n"
/// );
/// ```
pub fn set_flags<S: AsRef<str>>(text: &str, atom: &str, flags: &[S]) -> String {
    let mut out = remove_atom(text, atom);
    out.push_str(atom);
    for flag in flags {
        out.push(' ');
        out.push_str(flag.as_ref());
    }
    out.push('\n');
    out
}
