use std::fmt;
use std::str::FromStr;

use portage_atom::{Cpn, Cpv};

use crate::error::{Error, Result};

/// Version comparison operator prefixing a bounded or exact atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `=`
    Equal,
    /// `~`: any revision of the given version.
    Approximate,
    /// `>=`
    GreaterOrEqual,
    /// `>`
    Greater,
}

impl Operator {
    /// Split a leading operator off `s`.
    ///
    /// Two-character operators are tried first so `<=` is never read as `<`.
    pub fn split(s: &str) -> (Option<Operator>, &str) {
        const PREFIXES: [(&str, Operator); 6] = [
            ("<=", Operator::LessOrEqual),
            (">=", Operator::GreaterOrEqual),
            ("<", Operator::Less),
            (">", Operator::Greater),
            ("=", Operator::Equal),
            ("~", Operator::Approximate),
        ];

        for (prefix, op) in PREFIXES {
            if let Some(rest) = s.strip_prefix(prefix) {
                return (Some(op), rest);
            }
        }
        (None, s)
    }

    /// The textual form of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Less => "<",
            Operator::LessOrEqual => "<=",
            Operator::Equal => "=",
            Operator::Approximate => "~",
            Operator::GreaterOrEqual => ">=",
            Operator::Greater => ">",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A package atom: `[op]category/package[-version][::repo]`.
///
/// Category and package keep their original case; comparisons against
/// installed records go through [`Atom::matches_key`], which ignores case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Atom {
    /// Leading version operator, if any.
    pub operator: Option<Operator>,
    /// Category name (e.g. `dev-libs`).
    pub category: String,
    /// Package name without version (e.g. `openssl`).
    pub package: String,
    /// Version suffix including any revision (e.g. `3.0.13-r1`).
    pub version: Option<String>,
    /// Repository suffix after `::`.
    pub repo: Option<String>,
}

impl Atom {
    /// Parse an atom string.
    ///
    /// # Examples
    ///
    /// ```
    /// use portage_inspect::{Atom, Operator};
    ///
    /// let atom = Atom::parse(">=dev-libs/openssl-3.0.13-r1::gentoo").unwrap();
    /// assert_eq!(atom.operator, Some(Operator::GreaterOrEqual));
    /// assert_eq!(atom.key(), "dev-libs/openssl");
    /// assert_eq!(atom.version.as_deref(), Some("3.0.13-r1"));
    /// assert_eq!(atom.repo.as_deref(), Some("gentoo"));
    /// ```
    pub fn parse(input: &str) -> Result<Atom> {
        let (body, repo) = match input.split_once("::") {
            Some((body, repo)) if !repo.is_empty() => (body, Some(repo.to_string())),
            Some(_) => return Err(Error::InvalidAtom(input.to_string())),
            None => (input, None),
        };

        let (operator, body) = Operator::split(body);

        let (category, rest) = body
            .split_once('/')
            .ok_or_else(|| Error::InvalidAtom(format!("{input}: missing category")))?;
        if category.is_empty() || rest.is_empty() || rest.contains('/') {
            return Err(Error::InvalidAtom(input.to_string()));
        }

        // `=cat/pkg-1.2*` matches every version with that prefix
        let body = match operator {
            Some(Operator::Equal) => body.strip_suffix('*').unwrap_or(body),
            _ => body,
        };

        // a versioned name wins; `font-adobe-100dpi` has no valid version
        // after its last `-digit` and stays a bare package name
        let (cpn, version) = match Cpv::parse(body) {
            Ok(cpv) => {
                // keep the version as written, glob included
                let version = rest
                    .strip_prefix(cpv.package())
                    .and_then(|v| v.strip_prefix('-'))
                    .map(str::to_string);
                (cpv.cpn, version)
            }
            Err(_) if operator.is_some() => {
                return Err(Error::InvalidAtom(format!(
                    "{input}: operator without a valid version"
                )));
            }
            Err(_) => {
                let cpn = Cpn::parse(body)
                    .map_err(|e| Error::InvalidAtom(format!("{input}: {e}")))?;
                (cpn, None)
            }
        };

        Ok(Atom {
            operator,
            category: cpn.category,
            package: cpn.package,
            version,
            repo,
        })
    }

    /// The unversioned `category/package` key.
    pub fn key(&self) -> String {
        format!("{}/{}", self.category, self.package)
    }

    /// The exact-version form `=category/package-version`.
    ///
    /// Unversioned atoms return their bare key.
    pub fn exact(&self) -> String {
        match self.version {
            Some(ref version) => format!("={}/{}-{}", self.category, self.package, version),
            None => self.key(),
        }
    }

    /// Case-insensitive comparison against another `category/package` key.
    pub fn matches_key(&self, key: &str) -> bool {
        match key.split_once('/') {
            Some((category, package)) => {
                self.category.eq_ignore_ascii_case(category)
                    && self.package.eq_ignore_ascii_case(package)
            }
            None => false,
        }
    }
}

impl FromStr for Atom {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Atom::parse(s)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(op) = self.operator {
            write!(f, "{op}")?;
        }
        write!(f, "{}/{}", self.category, self.package)?;
        if let Some(ref version) = self.version {
            write!(f, "-{version}")?;
        }
        if let Some(ref repo) = self.repo {
            write!(f, "::{repo}")?;
        }
        Ok(())
    }
}

/// Split `name-version` at the first dash that is followed by a digit.
///
/// This yields the longest digit-led trailing segment, so revisions stay
/// attached to the version: `foo-bar-2.1-r1` splits into `foo-bar` and
/// `2.1-r1`. Names without such a segment return `None` for the version.
///
/// Only suited to the version column of emerge reports; package names such
/// as `font-adobe-100dpi` are split wrongly. Use [`Atom::parse`] to read
/// atoms.
pub fn split_version(s: &str) -> (&str, Option<&str>) {
    let bytes = s.as_bytes();
    for i in 1..bytes.len().saturating_sub(1) {
        if bytes[i] == b'-' && bytes[i + 1].is_ascii_digit() {
            return (&s[..i], Some(&s[i + 1..]));
        }
    }
    (s, None)
}

/// Drop a `::repository` suffix from an atom token.
pub fn strip_repo(token: &str) -> &str {
    match token.find("::") {
        Some(idx) if idx > 0 => &token[..idx],
        _ => token,
    }
}

/// Extract the version of an atom token, looking only past the category.
pub fn version_of(token: &str) -> Option<&str> {
    let name = token.rsplit_once('/').map_or(token, |(_, name)| name);
    split_version(name).1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_unversioned() {
        let atom = Atom::parse("app-editors/vim").unwrap();
        assert_eq!(atom.operator, None);
        assert_eq!(atom.category, "app-editors");
        assert_eq!(atom.package, "vim");
        assert_eq!(atom.version, None);
        assert_eq!(atom.repo, None);
    }

    #[test]
    fn parse_exact_with_repo() {
        let atom = Atom::parse("=www-client/google-chrome-beta-143.0.7499.4::gentoo").unwrap();
        assert_eq!(atom.operator, Some(Operator::Equal));
        assert_eq!(atom.package, "google-chrome-beta");
        assert_eq!(atom.version.as_deref(), Some("143.0.7499.4"));
        assert_eq!(atom.repo.as_deref(), Some("gentoo"));
        assert_eq!(atom.exact(), "=www-client/google-chrome-beta-143.0.7499.4");
    }

    #[test]
    fn parse_operators() {
        for (s, op) in [
            ("<cat/pkg-1", Operator::Less),
            ("<=cat/pkg-1", Operator::LessOrEqual),
            ("=cat/pkg-1", Operator::Equal),
            ("~cat/pkg-1", Operator::Approximate),
            (">=cat/pkg-1", Operator::GreaterOrEqual),
            (">cat/pkg-1", Operator::Greater),
        ] {
            let atom = Atom::parse(s).unwrap();
            assert_eq!(atom.operator, Some(op), "{s}");
            assert_eq!(atom.to_string(), s);
        }
    }

    #[test]
    fn versioned_without_operator() {
        let atom = Atom::parse("dev-libs/openssl-3.0.13-r1").unwrap();
        assert_eq!(atom.operator, None);
        assert_eq!(atom.version.as_deref(), Some("3.0.13-r1"));
    }

    #[test]
    fn invalid_atoms() {
        assert!(Atom::parse("vim").is_err());
        assert!(Atom::parse("/vim").is_err());
        assert!(Atom::parse("app-editors/").is_err());
        assert!(Atom::parse("a/b/c").is_err());
        assert!(Atom::parse("=app-editors/vim").is_err());
        assert!(Atom::parse("app-editors/vim::").is_err());
    }

    #[test]
    fn key_matching_ignores_case() {
        let atom = Atom::parse("dev-qt/QtCore-5.15").unwrap();
        assert!(atom.matches_key("dev-qt/qtcore"));
        assert!(!atom.matches_key("dev-qt/qtgui"));
        assert!(!atom.matches_key("qtcore"));
    }

    #[test]
    fn split_version_longest_suffix() {
        assert_eq!(split_version("foo-bar-2.1"), ("foo-bar", Some("2.1")));
        assert_eq!(split_version("foo-2.1-r3"), ("foo", Some("2.1-r3")));
        assert_eq!(split_version("foo-bar"), ("foo-bar", None));
        assert_eq!(split_version("foo-"), ("foo-", None));
        assert_eq!(split_version(""), ("", None));
    }

    #[test]
    fn digit_segment_in_package_name() {
        let atom = Atom::parse("media-fonts/font-adobe-100dpi").unwrap();
        assert_eq!(atom.key(), "media-fonts/font-adobe-100dpi");
        assert_eq!(atom.version, None);

        let atom = Atom::parse("=media-fonts/font-bh-75dpi-1.0.4-r1::gentoo").unwrap();
        assert_eq!(atom.package, "font-bh-75dpi");
        assert_eq!(atom.version.as_deref(), Some("1.0.4-r1"));
        assert_eq!(atom.exact(), "=media-fonts/font-bh-75dpi-1.0.4-r1");
    }

    #[test]
    fn version_glob() {
        let atom = Atom::parse("=dev-lang/python-3.12*").unwrap();
        assert_eq!(atom.key(), "dev-lang/python");
        assert_eq!(atom.version.as_deref(), Some("3.12*"));
        assert_eq!(atom.to_string(), "=dev-lang/python-3.12*");
    }

    #[test]
    fn strip_repo_suffix() {
        assert_eq!(strip_repo("cat/pkg-1.0::gentoo"), "cat/pkg-1.0");
        assert_eq!(strip_repo("cat/pkg-1.0"), "cat/pkg-1.0");
        assert_eq!(strip_repo("::gentoo"), "::gentoo");
    }

    #[test]
    fn version_of_skips_category() {
        assert_eq!(version_of("=cat/foo-bar-2.1"), Some("2.1"));
        assert_eq!(version_of("=x11-libs/gtk+-3.24.41"), Some("3.24.41"));
        assert_eq!(version_of("=cat/foo"), None);
    }
}
