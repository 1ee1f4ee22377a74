use std::fs;
use std::path::{Path, PathBuf};

use portage_atom::{Cpv, Slot, Version};
use tracing::{debug, warn};

use crate::iuse::IUse;
use crate::utils::read_optional;

/// The record of one installed package in `/var/db/pkg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    /// `category/package` as named on disk.
    pub atom: String,
    /// Installed version, revision included.
    pub version: String,
    /// Flags the package was built with (`USE`).
    pub use_flags: Vec<String>,
    /// Flags the package declared (`IUSE`).
    pub iuse: Vec<IUse>,
    pub slot: Option<Slot>,
    /// Repository the package was installed from.
    pub repository: Option<String>,
}

fn parse_slot(s: &str) -> Option<Slot> {
    match s.split_once('/') {
        _ if s.is_empty() => None,
        Some((slot, subslot)) => Some(Slot::with_subslot(slot, subslot)),
        None => Some(Slot::new(s)),
    }
}

fn read_field(dir: &Path, name: &str) -> Option<String> {
    read_optional(&dir.join(name))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn subdirs(path: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("cannot list {}: {e}", path.display());
            return Vec::new();
        }
    };

    let mut dirs: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

/// One `category/package-version` record directory.
struct RecordDir {
    atom: String,
    version: String,
    parsed: Version,
    path: PathBuf,
}

impl RecordDir {
    fn parse(category: &str, path: PathBuf) -> Option<RecordDir> {
        let name = file_name(&path)?;
        let cpv = Cpv::parse(&format!("{category}/{name}")).ok()?;
        // the version as spelled on disk, not re-rendered
        let version = name.strip_prefix(cpv.package())?.strip_prefix('-')?;
        Some(RecordDir {
            atom: cpv.cpn.to_string(),
            version: version.to_string(),
            parsed: cpv.version,
            path,
        })
    }
}

/// Reader for the installed-package database.
#[derive(Debug, Clone)]
pub struct InstalledDb {
    path: PathBuf,
}

impl InstalledDb {
    /// Open the database rooted at `path` (usually `/var/db/pkg`).
    pub fn new<P: Into<PathBuf>>(path: P) -> InstalledDb {
        InstalledDb { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record directories of the packages installed under `category/package`,
    /// matched case-insensitively.
    fn entries(&self, atom: &str) -> Vec<RecordDir> {
        let Some((category, package)) = atom.split_once('/') else {
            return Vec::new();
        };

        let mut found = Vec::new();
        for cat_dir in subdirs(&self.path) {
            let Some(cat) = file_name(&cat_dir) else {
                continue;
            };
            if !cat.eq_ignore_ascii_case(category) {
                continue;
            }
            found.extend(
                subdirs(&cat_dir)
                    .into_iter()
                    .filter_map(|dir| RecordDir::parse(cat, dir))
                    .filter(|record| {
                        record
                            .atom
                            .split_once('/')
                            .is_some_and(|(_, pkg)| pkg.eq_ignore_ascii_case(package))
                    }),
            );
        }
        found
    }

    /// The installed version of `category/package`, if any.
    ///
    /// With several slots installed the highest version is returned.
    pub fn find_version(&self, atom: &str) -> Option<String> {
        self.entries(atom)
            .into_iter()
            .max_by(|a, b| a.parsed.cmp(&b.parsed))
            .map(|record| record.version)
    }

    /// Read the record of `atom` at `version`.
    ///
    /// When no directory matches the version exactly, a revision of it
    /// (`version-rN`) is accepted.
    pub fn package(&self, atom: &str, version: &str) -> Option<InstalledPackage> {
        let entries = self.entries(atom);
        let revision = format!("{version}-r");
        let record = entries
            .iter()
            .find(|r| r.version == version)
            .or_else(|| entries.iter().find(|r| r.version.starts_with(&revision)))?;
        Some(self.read(record))
    }

    fn read(&self, record: &RecordDir) -> InstalledPackage {
        let dir = record.path.as_path();
        debug!("reading installed record {}", dir.display());

        let use_flags = read_field(dir, "USE")
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        let iuse = read_field(dir, "IUSE")
            .map(|s| IUse::parse_line_lossy(&s))
            .unwrap_or_default();

        InstalledPackage {
            atom: record.atom.clone(),
            version: record.version.clone(),
            use_flags,
            iuse,
            slot: read_field(dir, "SLOT").and_then(|s| parse_slot(&s)),
            repository: read_field(dir, "repository"),
        }
    }

    /// Every installed package, sorted by category then directory name.
    pub fn packages(&self) -> Vec<InstalledPackage> {
        let mut packages = Vec::new();
        for cat_dir in subdirs(&self.path) {
            let Some(cat) = file_name(&cat_dir) else {
                continue;
            };
            for pkg_dir in subdirs(&cat_dir) {
                match RecordDir::parse(cat, pkg_dir.clone()) {
                    Some(record) => packages.push(self.read(&record)),
                    None => warn!("invalid entry in package database: {}", pkg_dir.display()),
                }
            }
        }
        packages
    }
}
