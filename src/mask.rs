use crate::keyword::{Keyword, Stability};

/// One reason a package version is masked, as reported by emerge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskReason {
    /// Keyword not accepted (`~amd64 keyword`, `** keyword`, or a bare `~amd64`).
    Keyword(Keyword),
    /// The version carries no keyword for the architecture at all.
    MissingKeyword,
    /// Hard masked through `package.mask`.
    PackageMask,
    /// License not accepted (`GPL-2 license(s)`).
    License(Vec<String>),
    /// Anything else, kept verbatim.
    Other(String),
}

impl MaskReason {
    /// Classify a single reason fragment.
    pub fn parse(s: &str) -> MaskReason {
        let s = s.trim();

        if let Some(kw) = s.strip_suffix(" keyword") {
            let kw = kw.trim();
            if kw == "missing" {
                return MaskReason::MissingKeyword;
            }
            if let Ok(keyword) = kw.parse() {
                return MaskReason::Keyword(keyword);
            }
        }

        if s == "package.mask" {
            return MaskReason::PackageMask;
        }

        if let Some(licenses) = s.strip_suffix(" license(s)") {
            return MaskReason::License(
                licenses.split_whitespace().map(str::to_string).collect(),
            );
        }

        // bare keyword tokens as listed in the keyword-change report
        if s.starts_with('~') || s == "**" {
            if let Ok(keyword) = s.parse() {
                return MaskReason::Keyword(keyword);
            }
        }

        MaskReason::Other(s.to_string())
    }

    /// Split a free-text reason on `,` and classify each fragment.
    ///
    /// # Examples
    ///
    /// ```
    /// use portage_inspect::{Keyword, MaskReason};
    ///
    /// let reasons = MaskReason::parse_list("package.mask, ~amd64 keyword");
    /// assert_eq!(reasons[0], MaskReason::PackageMask);
    /// assert_eq!(reasons[1], MaskReason::Keyword(Keyword::testing("amd64")));
    /// ```
    pub fn parse_list(reason: &str) -> Vec<MaskReason> {
        reason
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(MaskReason::parse)
            .collect()
    }

    /// The keyword to accept to lift this reason, if it is keyword-related.
    pub fn keyword(&self) -> Option<Keyword> {
        match self {
            MaskReason::Keyword(kw) if kw.stability != Stability::Disabled => Some(kw.clone()),
            MaskReason::MissingKeyword => Some(Keyword {
                arch: "*".to_string(),
                stability: Stability::Any,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_reasons() {
        assert_eq!(
            MaskReason::parse("~amd64 keyword"),
            MaskReason::Keyword(Keyword::testing("amd64"))
        );
        assert_eq!(MaskReason::parse("missing keyword"), MaskReason::MissingKeyword);
        let any = MaskReason::parse("** keyword");
        assert_eq!(any.keyword().map(|k| k.to_string()).as_deref(), Some("**"));
    }

    #[test]
    fn bare_keyword() {
        assert_eq!(
            MaskReason::parse("~arm64"),
            MaskReason::Keyword(Keyword::testing("arm64"))
        );
    }

    #[test]
    fn hard_mask_and_license() {
        assert_eq!(MaskReason::parse("package.mask"), MaskReason::PackageMask);
        assert_eq!(
            MaskReason::parse("google-chrome license(s)"),
            MaskReason::License(vec!["google-chrome".to_string()])
        );
        assert_eq!(MaskReason::PackageMask.keyword(), None);
    }

    #[test]
    fn unknown_kept_verbatim() {
        assert_eq!(
            MaskReason::parse("EAPI 9"),
            MaskReason::Other("EAPI 9".to_string())
        );
    }

    #[test]
    fn list_split() {
        let reasons = MaskReason::parse_list("package.mask, ~amd64 keyword, ");
        assert_eq!(reasons.len(), 2);
        assert!(MaskReason::parse_list("").is_empty());
    }

    #[test]
    fn disabled_keyword_has_no_unmask() {
        let reason = MaskReason::parse("-amd64 keyword");
        assert!(matches!(reason, MaskReason::Keyword(_)));
        assert_eq!(reason.keyword(), None);
    }
}
