use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::iuse::IUse;
use crate::process;
use crate::utils::read_optional;
use crate::vars::assignments;

/// Source of a recipe's computed IUSE.
///
/// The result keeps the `+`/`-` default prefixes. Closures with the same
/// shape implement the trait, which is how tests stand in for `portageq`.
pub trait MetadataQuery {
    /// IUSE of `category/package` at `version`.
    fn iuse(&self, atom: &str, version: &str) -> Result<Vec<IUse>>;
}

impl<F> MetadataQuery for F
where
    F: Fn(&str, &str) -> Result<Vec<IUse>>,
{
    fn iuse(&self, atom: &str, version: &str) -> Result<Vec<IUse>> {
        self(atom, version)
    }
}

/// Queries metadata through portage's `portageq` tool.
///
/// Unlike the textual fallbacks this sees eclass-generated flags, such as
/// the per-locale `l10n_*` flags.
#[derive(Debug, Clone)]
pub struct Portageq {
    program: PathBuf,
    root: String,
    timeout: Duration,
}

impl Default for Portageq {
    fn default() -> Self {
        Portageq {
            program: PathBuf::from("portageq"),
            root: "/".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl Portageq {
    /// Use a specific portageq binary.
    pub fn with_program<P: Into<PathBuf>>(mut self, program: P) -> Self {
        self.program = program.into();
        self
    }

    /// Query against a different target root.
    pub fn with_root(mut self, root: &str) -> Self {
        self.root = root.to_string();
        self
    }

    /// Hard limit for each invocation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn query(&self, args: &[&str]) -> Result<String> {
        let output = process::run(
            Command::new(&self.program).args(args),
            Some(self.timeout),
        )?;
        if !output.status.success() {
            return Err(Error::Command(format!(
                "portageq {}: {}: {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// The repository configuration in `repos.conf` syntax, see
    /// [`Repositories::parse`](crate::Repositories::parse).
    pub fn repositories_configuration(&self) -> Result<String> {
        self.query(&["repositories_configuration", self.root.as_str()])
    }
}

impl MetadataQuery for Portageq {
    fn iuse(&self, atom: &str, version: &str) -> Result<Vec<IUse>> {
        let cpv = format!("{atom}-{version}");
        let output = self.query(&[
            "metadata",
            self.root.as_str(),
            "ebuild",
            cpv.as_str(),
            "IUSE",
        ])?;
        IUse::parse_line(&output)
    }
}

/// Path of the recipe for `category/package` at `version` in a repository.
pub fn ebuild_path(repo: &Path, atom: &str, version: &str) -> PathBuf {
    let package = atom.rsplit_once('/').map_or(atom, |(_, package)| package);
    repo.join(atom).join(format!("{package}-{version}.ebuild"))
}

/// IUSE from a repository's `metadata/md5-cache` entry.
///
/// Returns `None` when the repository has no cache entry for the version.
pub fn md5_cache_iuse(repo: &Path, atom: &str, version: &str) -> Option<Vec<IUse>> {
    let path = repo
        .join("metadata/md5-cache")
        .join(format!("{atom}-{version}"));
    let data = read_optional(&path)?;
    debug!("reading IUSE from {}", path.display());

    let iuse = data
        .lines()
        .filter_map(|line| line.split_once('='))
        .find(|(key, _)| *key == "IUSE")
        .map(|(_, value)| IUse::parse_line_lossy(value))
        .unwrap_or_default();
    Some(iuse)
}

/// IUSE scraped from the recipe text.
///
/// Every `IUSE=` and `IUSE+=` assignment is accumulated, since recipes
/// extend the list incrementally. Flags generated by eclasses are invisible
/// here. Returns `None` when the recipe does not exist.
pub fn ebuild_iuse(repo: &Path, atom: &str, version: &str) -> Option<Vec<IUse>> {
    let path = ebuild_path(repo, atom, version);
    let data = read_optional(&path)?;
    debug!("scraping IUSE from {}", path.display());

    let values: Vec<String> = assignments(&data, "IUSE")
        .into_iter()
        .map(|a| a.value)
        .collect();
    Some(IUse::parse_line_lossy(&values.join(" ")))
}
