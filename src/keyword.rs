use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Stability level of an architecture keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stability {
    /// Stable on the architecture (`amd64`).
    Stable,
    /// Testing on the architecture (`~amd64`).
    Testing,
    /// Known broken on the architecture (`-amd64`).
    Disabled,
    /// No keywords at all, accepted only through `**`.
    Any,
}

/// An architecture keyword as it appears in `KEYWORDS`, in emerge mask
/// reports and in `package.accept_keywords` entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Keyword {
    /// Architecture name (`amd64`, `arm64`) or `*`.
    pub arch: String,
    /// Stability classification.
    pub stability: Stability,
}

impl Keyword {
    /// A testing keyword for `arch` (`~arch`).
    pub fn testing(arch: &str) -> Keyword {
        Keyword {
            arch: arch.to_string(),
            stability: Stability::Testing,
        }
    }

    /// Parse a space-separated keyword list.
    ///
    /// # Examples
    ///
    /// ```
    /// use portage_inspect::{Keyword, Stability};
    ///
    /// let kws = Keyword::parse_line("amd64 ~arm64 -x86 **").unwrap();
    /// assert_eq!(kws.len(), 4);
    /// assert_eq!(kws[1].stability, Stability::Testing);
    /// assert_eq!(kws[3].stability, Stability::Any);
    /// ```
    pub fn parse_line(input: &str) -> Result<Vec<Keyword>> {
        input
            .split_whitespace()
            .map(|token| token.parse())
            .collect()
    }
}

fn valid_arch(arch: &str) -> bool {
    arch == "*"
        || (!arch.is_empty()
            && arch
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'))
}

impl FromStr for Keyword {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "**" {
            return Ok(Keyword {
                arch: "*".to_string(),
                stability: Stability::Any,
            });
        }

        let (arch, stability) = if let Some(arch) = s.strip_prefix('~') {
            (arch, Stability::Testing)
        } else if let Some(arch) = s.strip_prefix('-') {
            (arch, Stability::Disabled)
        } else {
            (s, Stability::Stable)
        };

        if !valid_arch(arch) {
            return Err(Error::InvalidKeyword(s.to_string()));
        }

        Ok(Keyword {
            arch: arch.to_string(),
            stability,
        })
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.stability {
            Stability::Stable => write!(f, "{}", self.arch),
            Stability::Testing => write!(f, "~{}", self.arch),
            Stability::Disabled => write!(f, "-{}", self.arch),
            Stability::Any => write!(f, "**"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_each_stability() {
        let kw: Keyword = "amd64".parse().unwrap();
        assert_eq!(kw.stability, Stability::Stable);
        let kw: Keyword = "~arm64".parse().unwrap();
        assert_eq!(kw.arch, "arm64");
        assert_eq!(kw.stability, Stability::Testing);
        let kw: Keyword = "-x86".parse().unwrap();
        assert_eq!(kw.stability, Stability::Disabled);
        let kw: Keyword = "**".parse().unwrap();
        assert_eq!(kw.stability, Stability::Any);
    }

    #[test]
    fn testing_wildcard() {
        let kw: Keyword = "~*".parse().unwrap();
        assert_eq!(kw.arch, "*");
        assert_eq!(kw.stability, Stability::Testing);
    }

    #[test]
    fn display_round_trip() {
        for s in ["amd64", "~arm64", "-x86", "**", "~*", "amd64-linux"] {
            let kw: Keyword = s.parse().unwrap();
            assert_eq!(kw.to_string(), s);
        }
    }

    #[test]
    fn invalid_keywords() {
        for s in ["", "~", "-", "~amd64)", "keyword,"] {
            assert!(s.parse::<Keyword>().is_err(), "{s:?}");
        }
    }

    #[test]
    fn testing_constructor() {
        assert_eq!(Keyword::testing("amd64").to_string(), "~amd64");
    }
}
