use std::fmt;
use std::path::Path;

use tracing::debug;

use crate::keyword::Keyword;
use crate::utils::{read_optional, strip_comment};

/// Header written at the top of a managed keyword file.
pub const HEADER: &str = "\
# This file is managed by portage-inspect
# Manual changes may be overwritten
# Keyword unmasks for packages installed through portage-inspect";

/// One `atom keyword...` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordEntry {
    pub atom: String,
    /// Accepted keywords; empty means the default testing keyword.
    pub keywords: Vec<Keyword>,
}

impl fmt::Display for KeywordEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.atom)?;
        for kw in &self.keywords {
            write!(f, " {kw}")?;
        }
        Ok(())
    }
}

/// A `package.accept_keywords` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptKeywords {
    entries: Vec<KeywordEntry>,
}

impl AcceptKeywords {
    /// Parse file contents. Comments and blank lines are dropped; invalid
    /// keyword tokens are skipped.
    pub fn parse(text: &str) -> AcceptKeywords {
        let mut entries = Vec::new();
        for line in text.lines() {
            let mut tokens = strip_comment(line).split_whitespace();
            let Some(atom) = tokens.next() else {
                continue;
            };
            let keywords = tokens
                .filter_map(|token| match token.parse() {
                    Ok(kw) => Some(kw),
                    Err(e) => {
                        debug!("skipping accept_keywords token: {e}");
                        None
                    }
                })
                .collect();
            entries.push(KeywordEntry {
                atom: atom.to_string(),
                keywords,
            });
        }
        AcceptKeywords { entries }
    }

    /// Load a file; a missing file is empty.
    pub fn load(path: &Path) -> AcceptKeywords {
        read_optional(path)
            .map(|text| AcceptKeywords::parse(&text))
            .unwrap_or_default()
    }

    pub fn entries(&self) -> &[KeywordEntry] {
        &self.entries
    }

    /// Whether an entry exists for `atom`.
    pub fn contains(&self, atom: &str) -> bool {
        self.entries.iter().any(|e| e.atom == atom)
    }

    /// Atoms with an entry, in file order.
    pub fn atoms(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.atom.as_str()).collect()
    }

    /// Accept `keyword` for `atom`.
    ///
    /// Returns `false` and leaves the file untouched when `atom` already
    /// has an entry.
    ///
    /// # Examples
    ///
    /// ```
    /// use portage_inspect::{AcceptKeywords, Keyword};
    ///
    /// let mut file = AcceptKeywords::default();
    /// assert!(file.unmask("=dev-util/foo-1.0", &Keyword::testing("amd64")));
    /// assert!(!file.unmask("=dev-util/foo-1.0", &Keyword::testing("arm64")));
    /// assert!(file.render().ends_with("\n=dev-util/foo-1.0 ~amd64\n"));
    /// ```
    pub fn unmask(&mut self, atom: &str, keyword: &Keyword) -> bool {
        if self.contains(atom) {
            debug!("{atom} already has an accept_keywords entry");
            return false;
        }
        self.entries.push(KeywordEntry {
            atom: atom.to_string(),
            keywords: vec![keyword.clone()],
        });
        true
    }

    /// Drop every entry for `atom`; `false` when there was none.
    pub fn remove(&mut self, atom: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.atom != atom);
        self.entries.len() != before
    }

    /// File contents: the header, a blank line, then one line per entry.
    pub fn render(&self) -> String {
        let mut out = format!("{HEADER}\n\n");
        for entry in &self.entries {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use indoc::indoc;
    use tempfile::tempdir;

    use crate::keyword::Stability;

    const FILE: &str = indoc! {"
        # This file is managed by portage-inspect

        =www-client/chromium-131.0.6778.85 ~amd64
        app-misc/foo ** # no keywords upstream
        dev-lang/rust
    "};

    #[test]
    fn parse_entries() {
        let file = AcceptKeywords::parse(FILE);
        assert_eq!(
            file.atoms(),
            ["=www-client/chromium-131.0.6778.85", "app-misc/foo", "dev-lang/rust"]
        );
        assert_eq!(file.entries()[1].keywords[0].stability, Stability::Any);
        assert!(file.entries()[2].keywords.is_empty());
        assert!(file.contains("dev-lang/rust"));
        assert!(!file.contains("dev-lang"));
    }

    #[test]
    fn remove_entry() {
        let mut file = AcceptKeywords::parse(FILE);
        assert!(file.remove("app-misc/foo"));
        assert!(!file.remove("app-misc/foo"));
        assert_eq!(file.entries().len(), 2);
    }

    #[test]
    fn render_replaces_comments_with_header() {
        let mut file = AcceptKeywords::parse(FILE);
        file.unmask("=dev-util/bar-2", &Keyword::testing("arm64"));
        let expected = format!(
            "{HEADER}\n\n\
             =www-client/chromium-131.0.6778.85 ~amd64\n\
             app-misc/foo **\n\
             dev-lang/rust\n\
             =dev-util/bar-2 ~arm64\n"
        );
        assert_eq!(file.render(), expected);
    }

    #[test]
    fn load_missing_and_present() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("discover_unmask");
        assert!(AcceptKeywords::load(&path).entries().is_empty());
        fs::write(&path, FILE).unwrap();
        assert_eq!(AcceptKeywords::load(&path).entries().len(), 3);
    }
}
