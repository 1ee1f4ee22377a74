use std::path::Path;

use tracing::debug;
use winnow::ascii::{space0, space1};
use winnow::combinator::opt;
use winnow::prelude::*;
use winnow::token::{literal, rest};

use crate::iuse::LOCALE_FLAG_PREFIX;
use crate::utils::{config_files, read_optional};

/// How an assignment combines with earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `VAR=value`
    Set,
    /// `VAR+=value`
    Append,
}

/// One assignment to a variable, with the value already unquoted and any
/// continuation lines joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Replace or append.
    pub op: AssignOp,
    /// The unquoted value.
    pub value: String,
}

fn assignment_header<'s>(input: &mut &'s str, name: &str) -> ModalResult<(AssignOp, &'s str)> {
    space0.parse_next(input)?;
    opt(("export", space1)).parse_next(input)?;
    literal(name).parse_next(input)?;
    space0.parse_next(input)?;
    let append = opt('+').parse_next(input)?.is_some();
    '='.parse_next(input)?;
    space0.parse_next(input)?;
    let value = rest.parse_next(input)?;
    let op = if append {
        AssignOp::Append
    } else {
        AssignOp::Set
    };
    Ok((op, value))
}

/// Count occurrences of `quote` in `s` that are not preceded by a backslash.
fn unescaped_quotes(s: &str, quote: char) -> usize {
    let mut count = 0;
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            count += 1;
        }
    }
    count
}

/// Strip one layer of surrounding quotes.
///
/// A trailing `# comment` after the closing quote is dropped as well.
fn unquote(value: &str) -> &str {
    let value = value.trim();
    let Some(quote) = value.chars().next().filter(|c| *c == '"' || *c == '\'') else {
        return value;
    };
    match value[1..].rfind(quote) {
        Some(end) => {
            let trailing = value[end + 2..].trim();
            if trailing.is_empty() || trailing.starts_with('#') {
                &value[1..end + 1]
            } else {
                value
            }
        }
        None => value,
    }
}

/// Collect every assignment to `name` in `text`, in file order.
///
/// Handles single or double quotes, quoted values spanning several lines,
/// backslash continuations, blank lines and `#` comment lines. The lines of
/// a multi-line value are joined with single spaces.
pub fn assignments(text: &str, name: &str) -> Vec<Assignment> {
    let mut found = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut input = trimmed;
        let Ok((op, first)) = assignment_header(&mut input, name) else {
            continue;
        };

        let mut current = first.trim();
        let quote = current.chars().next().filter(|c| *c == '"' || *c == '\'');
        let mut in_quotes = quote.is_some();
        let mut first_line = true;
        let mut pieces = Vec::new();

        loop {
            let continued = current.ends_with('\\');

            if let (true, Some(q)) = (in_quotes, quote) {
                // the opening quote itself is not counted
                let scanned = if first_line { &current[1..] } else { current };
                if unescaped_quotes(scanned, q) % 2 == 1 {
                    in_quotes = false;
                }
            }

            let piece = if continued {
                &current[..current.len() - 1]
            } else {
                current
            };
            let piece = piece.trim();
            if !piece.is_empty() {
                pieces.push(piece);
            }

            if !continued && !in_quotes {
                break;
            }
            match lines.next() {
                Some(next) => current = next.trim(),
                None => break,
            }
            first_line = false;
        }

        let joined = pieces.join(" ");
        found.push(Assignment {
            op,
            value: unquote(&joined).trim().to_string(),
        });
    }

    found
}

/// Read the final value of `name` from make.conf-style `text`.
///
/// `VAR=` replaces the value accumulated so far, `VAR+=` appends with a
/// separating space. A variable that is never assigned reads as an empty
/// string.
///
/// # Examples
///
/// ```
/// use portage_inspect::read_variable;
///
/// let text = "USE=\"X -Y\"\n# USE=\"ignored\"\nUSE+='wayland'\n";
/// assert_eq!(read_variable(text, "USE"), "X -Y wayland");
/// assert_eq!(read_variable(text, "L10N"), "");
/// ```
pub fn read_variable(text: &str, name: &str) -> String {
    let mut value = String::new();
    for assignment in assignments(text, name) {
        match assignment.op {
            AssignOp::Set => value = assignment.value,
            AssignOp::Append => {
                if !value.is_empty() && !assignment.value.is_empty() {
                    value.push(' ');
                }
                value.push_str(&assignment.value);
            }
        }
    }
    value
}

/// The global make.conf settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MakeConf {
    text: String,
}

impl MakeConf {
    /// Wrap make.conf contents.
    pub fn parse(text: &str) -> MakeConf {
        MakeConf {
            text: text.to_string(),
        }
    }

    /// Load make.conf from a file or a directory of files (read in lexical
    /// order, as if concatenated). A missing path yields empty settings.
    pub fn load(path: &Path) -> MakeConf {
        let mut text = String::new();
        for file in config_files(path) {
            if let Some(contents) = read_optional(&file) {
                debug!("read make.conf: {}", file.display());
                text.push_str(&contents);
                text.push('\n');
            }
        }
        MakeConf { text }
    }

    /// Final value of a variable, empty when unassigned.
    pub fn var(&self, name: &str) -> String {
        read_variable(&self.text, name)
    }

    /// Tokens of the global `USE` variable, minus prefixes preserved.
    pub fn use_flags(&self) -> Vec<String> {
        split_tokens(&self.var("USE"))
    }

    /// Raw `L10N` entries (`de`, `pt-BR`).
    pub fn locales(&self) -> Vec<String> {
        split_tokens(&self.var("L10N"))
    }

    /// `L10N` entries mapped to their locale flag names (`l10n_de`).
    pub fn locale_flags(&self) -> Vec<String> {
        self.locales()
            .into_iter()
            .map(|locale| format!("{LOCALE_FLAG_PREFIX}{locale}"))
            .collect()
    }
}

fn split_tokens(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}
