use tracing::debug;
use winnow::ascii::{space0, space1};
use winnow::combinator::alt;
use winnow::prelude::*;
use winnow::token::{one_of, rest, take_till, take_until};

use crate::atom::{strip_repo, version_of, Atom, Operator};
use crate::keyword::Keyword;
use crate::mask::MaskReason;

/// Phrases emerge prints before a list of required keyword or mask changes.
const UNMASK_MARKERS: [&str; 2] = [
    "keyword changes are necessary",
    "mask changes are necessary",
];

/// A package that would be merged, taken from one `[ebuild ...]` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Exact-version atom (`=cat/pkg-1.0`), repository suffix removed.
    pub atom: String,
    /// Version part of the atom, if one could be found.
    pub version: Option<String>,
    /// Tokens of the `USE="..."` assignment, verbatim and in order.
    pub use_flags: Vec<String>,
}

/// Which part of the report a masked entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskSource {
    /// An `=cat/pkg-ver keyword` line under a "changes are necessary" header.
    ChangeList,
    /// A `- cat/pkg-ver (masked by: ...)` candidate line.
    MaskedBy,
}

/// A package version that cannot be merged without an unmask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskedPackage {
    /// The atom token as printed.
    pub atom: String,
    /// Free-text reason.
    pub reason: String,
    /// Where in the report the entry was found.
    pub source: MaskSource,
}

impl MaskedPackage {
    /// The classified reasons.
    pub fn reasons(&self) -> Vec<MaskReason> {
        MaskReason::parse_list(&self.reason)
    }

    /// The first keyword that would lift the mask, if any.
    pub fn keyword(&self) -> Option<Keyword> {
        self.reasons().iter().find_map(MaskReason::keyword)
    }

    /// The atom in the form `package.accept_keywords` expects.
    ///
    /// A versioned atom without an operator becomes `=cat/pkg-ver`. The
    /// repository suffix is dropped.
    pub fn exact_atom(&self) -> String {
        let token = strip_repo(&self.atom);
        match Atom::parse(token) {
            Ok(atom) if atom.operator.is_none() => atom.exact(),
            _ => token.to_string(),
        }
    }

    fn key(&self) -> &str {
        Operator::split(strip_repo(&self.atom)).1
    }
}

/// What a caller should do after a dry run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The merge can proceed.
    Ready,
    /// Some packages have to be unmasked first.
    NeedsUnmask,
    /// The dry run failed for another reason; see the raw output.
    Failed,
}

/// Structured result of interpreting `emerge --pretend` output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DryRunResult {
    /// Whether interpretation completed. Always `true` for parsed output;
    /// combine with the exit code through [`DryRunResult::outcome`].
    pub success: bool,
    /// The combined text that was interpreted.
    pub output: String,
    /// Packages that would be merged, in output order.
    pub dependencies: Vec<Dependency>,
    /// Packages needing an unmask, de-duplicated by atom.
    pub masked: Vec<MaskedPackage>,
    /// Whether any unmask is required.
    pub needs_unmask: bool,
}

impl DryRunResult {
    /// Interpret the combined stdout and stderr of a dry run.
    ///
    /// This never fails: unrecognized lines are skipped, so garbage input
    /// yields an empty result.
    ///
    /// # Examples
    ///
    /// ```
    /// use portage_inspect::DryRunResult;
    ///
    /// let output = "\
    /// [ebuild  N     ] dev-libs/foo-1.2::gentoo  USE=\"ssl -debug\" 0 KiB
    /// - dev-libs/bar-2.0::gentoo (masked by: ~amd64 keyword)
    /// ";
    /// let result = DryRunResult::parse(output);
    /// assert_eq!(result.dependencies[0].atom, "=dev-libs/foo-1.2");
    /// assert_eq!(result.dependencies[0].use_flags, ["ssl", "-debug"]);
    /// assert!(result.needs_unmask);
    /// assert_eq!(result.masked[0].reason, "~amd64 keyword");
    /// ```
    pub fn parse(output: &str) -> DryRunResult {
        let mut result = DryRunResult {
            success: false,
            output: output.to_string(),
            ..Default::default()
        };

        if UNMASK_MARKERS.iter().any(|m| output.contains(m)) {
            result.needs_unmask = true;
            for line in output.lines() {
                if let Some(entry) = change_list_entry(line) {
                    result.push_masked(entry);
                }
            }
        }

        for line in output.lines() {
            if line.trim().is_empty() {
                continue;
            }

            let mut input = line;
            if let Ok((atom, reason)) = masked_line(&mut input) {
                result.needs_unmask = true;
                result.push_masked(MaskedPackage {
                    atom: atom.to_string(),
                    reason: reason.trim().to_string(),
                    source: MaskSource::MaskedBy,
                });
                continue;
            }

            let mut input = line;
            if let Ok((atom, remainder)) = ebuild_line(&mut input) {
                result.dependencies.push(dependency(atom, remainder));
            }
        }

        debug!(
            "dry run: {} dependencies, {} masked, needs unmask: {}",
            result.dependencies.len(),
            result.masked.len(),
            result.needs_unmask
        );

        result.success = true;
        result
    }

    /// Combine the interpretation with the dry run's exit code.
    ///
    /// A failing dry run commonly still carries a complete masked-package
    /// report, so a required unmask takes precedence over the exit code.
    pub fn outcome(&self, exit_code: i32) -> Outcome {
        if self.needs_unmask {
            Outcome::NeedsUnmask
        } else if exit_code == 0 && self.success {
            Outcome::Ready
        } else {
            Outcome::Failed
        }
    }

    fn push_masked(&mut self, entry: MaskedPackage) {
        if !self.masked.iter().any(|m| m.key() == entry.key()) {
            self.masked.push(entry);
        }
    }
}

/// `=cat/pkg-1.0 ~amd64` lines listed under a change header.
fn change_list_entry(line: &str) -> Option<MaskedPackage> {
    let trimmed = line.trim();
    if !trimmed.starts_with('=') {
        return None;
    }
    let (atom, reason) = trimmed
        .split_once(char::is_whitespace)
        .unwrap_or((trimmed, ""));
    if !atom.contains('/') {
        return None;
    }
    Some(MaskedPackage {
        atom: atom.to_string(),
        reason: reason.trim().to_string(),
        source: MaskSource::ChangeList,
    })
}

fn dependency(token: &str, remainder: &str) -> Dependency {
    let token = strip_repo(token);
    let atom = if token.starts_with('=') {
        token.to_string()
    } else {
        format!("={token}")
    };
    let version = version_of(&atom).map(str::to_string);
    let use_flags = find_use_flags(remainder)
        .map(|flags| flags.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    Dependency {
        atom,
        version,
        use_flags,
    }
}

// Winnow parsers

/// `- cat/pkg-1.0::repo (masked by: REASON)`
fn masked_line<'s>(input: &mut &'s str) -> ModalResult<(&'s str, &'s str)> {
    space0.parse_next(input)?;
    '-'.parse_next(input)?;
    space0.parse_next(input)?;
    let atom = take_till(1.., char::is_whitespace).parse_next(input)?;
    take_until(0.., "(masked by:").parse_next(input)?;
    "(masked by:".parse_next(input)?;
    space0.parse_next(input)?;
    let reason = take_till(1.., ')').parse_next(input)?;
    ')'.parse_next(input)?;
    Ok((atom, reason))
}

/// `[ebuild  N     ] cat/pkg-1.0::repo  USE="..." ...`
fn ebuild_line<'s>(input: &mut &'s str) -> ModalResult<(&'s str, &'s str)> {
    space0.parse_next(input)?;
    "[ebuild".parse_next(input)?;
    take_till(0.., ']').parse_next(input)?;
    ']'.parse_next(input)?;
    space1.parse_next(input)?;
    let atom = take_till(1.., char::is_whitespace).parse_next(input)?;
    let remainder = rest.parse_next(input)?;
    Ok((atom, remainder))
}

/// `USE="..."` or `USE_FLAGS='...'`
fn use_assignment<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    alt(("USE_FLAGS=", "USE=")).parse_next(input)?;
    one_of(['"', '\'']).parse_next(input)?;
    let flags = take_till(0.., ['"', '\'']).parse_next(input)?;
    one_of(['"', '\'']).parse_next(input)?;
    Ok(flags)
}

/// Find the first USE assignment anywhere in `s`.
fn find_use_flags(s: &str) -> Option<&str> {
    s.match_indices("USE").find_map(|(idx, _)| {
        let mut input = &s[idx..];
        use_assignment(&mut input).ok()
    })
}
