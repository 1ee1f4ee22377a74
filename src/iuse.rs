use std::fmt;
use std::str::FromStr;

use indexmap::IndexSet;

use crate::error::{Error, Result};

/// Prefix shared by all locale flags.
///
/// Locale flags are driven solely by the `L10N` variable, see
/// [`UseLayers`](crate::UseLayers).
pub const LOCALE_FLAG_PREFIX: &str = "l10n_";

/// Default state for an IUSE flag.
///
/// Flags may be prefixed with `+` (enabled by default) or `-` (disabled by
/// default) in the `IUSE` variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IUseDefault {
    /// `+flag`: enabled by default.
    Enabled,
    /// `-flag`: disabled by default.
    Disabled,
}

/// A single USE flag entry from the `IUSE` variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IUse {
    /// The USE flag name (without prefix).
    pub name: String,
    /// Optional default state prefix (`+` or `-`).
    pub default: Option<IUseDefault>,
}

impl IUse {
    /// Parse a space-separated `IUSE` line into a list of flags.
    ///
    /// # Examples
    ///
    /// ```
    /// use portage_inspect::{IUse, IUseDefault};
    ///
    /// let flags = IUse::parse_line("+ssl -debug l10n_de").unwrap();
    /// assert_eq!(flags.len(), 3);
    /// assert_eq!(flags[0].default, Some(IUseDefault::Enabled));
    /// assert_eq!(flags[1].default, Some(IUseDefault::Disabled));
    /// assert!(flags[2].is_locale());
    /// ```
    pub fn parse_line(input: &str) -> Result<Vec<IUse>> {
        input
            .split_whitespace()
            .map(|token| token.parse())
            .collect()
    }

    /// Like [`IUse::parse_line`], but drops malformed tokens instead of
    /// failing. Used for text scraped out of recipes.
    pub fn parse_line_lossy(input: &str) -> Vec<IUse> {
        input
            .split_whitespace()
            .filter_map(|token| match token.parse() {
                Ok(flag) => Some(flag),
                Err(e) => {
                    tracing::debug!("skipping IUSE token: {e}");
                    None
                }
            })
            .collect()
    }

    /// Ordered, de-duplicated flag names of an IUSE list.
    pub fn names(flags: &[IUse]) -> IndexSet<String> {
        flags.iter().map(|flag| flag.name.clone()).collect()
    }

    /// Whether this is a locale flag (`l10n_*`).
    pub fn is_locale(&self) -> bool {
        is_locale_flag(&self.name)
    }
}

/// Whether `name` is a locale flag (`l10n_*`).
pub fn is_locale_flag(name: &str) -> bool {
    name.starts_with(LOCALE_FLAG_PREFIX)
}

impl FromStr for IUse {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidIUse("empty IUSE entry".to_string()));
        }

        let (name, default) = if let Some(name) = s.strip_prefix('+') {
            (name, Some(IUseDefault::Enabled))
        } else if let Some(name) = s.strip_prefix('-') {
            (name, Some(IUseDefault::Disabled))
        } else {
            (s, None)
        };

        if name.is_empty() {
            return Err(Error::InvalidIUse(s.to_string()));
        }

        Ok(IUse {
            name: name.to_string(),
            default,
        })
    }
}

impl fmt::Display for IUse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.default {
            Some(IUseDefault::Enabled) => write!(f, "+{}", self.name),
            Some(IUseDefault::Disabled) => write!(f, "-{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}
