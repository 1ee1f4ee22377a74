use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use ini::Ini;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::utils::{config_files, read_optional};

/// A configured ebuild repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    /// Repository name (`gentoo`, `guru`).
    pub name: String,
    /// Checkout location on disk.
    pub location: PathBuf,
    /// Higher priorities are consulted first.
    pub priority: i32,
    /// `sync-type` (`git`, `rsync`, ...).
    pub sync_type: Option<String>,
    /// `sync-uri`.
    pub sync_uri: Option<String>,
    /// `auto-sync`, defaults to enabled.
    pub auto_sync: bool,
}

impl Repository {
    /// A repository with default settings.
    pub fn new<P: Into<PathBuf>>(name: &str, location: P) -> Repository {
        Repository {
            name: name.to_string(),
            location: location.into(),
            priority: 0,
            sync_type: None,
            sync_uri: None,
            auto_sync: true,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" => Some(true),
        "no" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// A snapshot of the repository configuration.
///
/// Iteration is by priority, highest first, then by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Repositories {
    repos: Vec<Repository>,
}

impl Repositories {
    /// Build a set from explicit entries.
    pub fn new(repos: Vec<Repository>) -> Repositories {
        let mut repos = repos;
        repos.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.name.cmp(&b.name))
        });
        Repositories { repos }
    }

    fn sections(text: &str, source: &str) -> Result<Vec<Repository>> {
        let ini = Ini::load_from_str(text)
            .map_err(|e| Error::InvalidReposConf(format!("{source}: {e}")))?;

        let mut repos = Vec::new();
        for (section, settings) in ini.iter() {
            let name = match section {
                Some(s) if s != "DEFAULT" => s,
                _ => continue,
            };

            let Some(location) = settings.get("location") else {
                warn!("{source}: repository {name}: missing location field");
                continue;
            };

            let priority = match settings.get("priority").map(str::parse) {
                Some(Ok(p)) => p,
                Some(Err(e)) => {
                    warn!("{source}: repository {name}: invalid priority: {e}");
                    0
                }
                None => 0,
            };

            repos.push(Repository {
                name: name.to_string(),
                location: PathBuf::from(location),
                priority,
                sync_type: settings.get("sync-type").map(str::to_string),
                sync_uri: settings.get("sync-uri").map(str::to_string),
                auto_sync: settings
                    .get("auto-sync")
                    .and_then(parse_bool)
                    .unwrap_or(true),
            });
        }
        Ok(repos)
    }

    /// Parse `repos.conf` syntax, as found on disk or printed by
    /// `portageq repositories_configuration`.
    ///
    /// # Examples
    ///
    /// ```
    /// use portage_inspect::Repositories;
    ///
    /// let repos = Repositories::parse("\
    /// [DEFAULT]
    /// main-repo = gentoo
    ///
    /// [gentoo]
    /// location = /var/db/repos/gentoo
    /// priority = -1000
    ///
    /// [guru]
    /// location = /var/db/repos/guru
    /// ").unwrap();
    /// assert_eq!(repos.names(), ["guru", "gentoo"]);
    /// ```
    pub fn parse(text: &str) -> Result<Repositories> {
        Ok(Repositories::new(Repositories::sections(text, "repos.conf")?))
    }

    /// Load `repos.conf` from a file or a directory of files.
    ///
    /// Files are read in lexical order and a later definition of a name
    /// replaces an earlier one. A missing path yields an empty set.
    pub fn load(path: &Path) -> Result<Repositories> {
        let mut by_name = IndexMap::new();
        for file in config_files(path) {
            let Some(text) = read_optional(&file) else {
                continue;
            };
            let source = file.display().to_string();
            let repos = Repositories::sections(&text, &source)?;
            let names: Vec<_> = repos.iter().map(|r| r.name.as_str()).collect();
            info!("loading repos.conf: {source}: {}", names.join(", "));
            for repo in repos {
                by_name.insert(repo.name.clone(), repo);
            }
        }
        Ok(Repositories::new(by_name.into_values().collect()))
    }

    /// Look up a repository by name.
    pub fn get(&self, name: &str) -> Option<&Repository> {
        self.repos.iter().find(|r| r.name == name)
    }

    /// Location of a named repository.
    pub fn location(&self, name: &str) -> Option<&Path> {
        self.get(name).map(|r| r.location.as_path())
    }

    /// Repository names in iteration order.
    pub fn names(&self) -> Vec<&str> {
        self.repos.iter().map(|r| r.name.as_str()).collect()
    }

    /// Iterate by priority.
    pub fn iter(&self) -> std::slice::Iter<'_, Repository> {
        self.repos.iter()
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }
}

impl<'a> IntoIterator for &'a Repositories {
    type Item = &'a Repository;
    type IntoIter = std::slice::Iter<'a, Repository>;

    fn into_iter(self) -> Self::IntoIter {
        self.repos.iter()
    }
}

/// An explicit configuration snapshot: the filesystem root every portage
/// path is resolved under, plus the repositories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    root: PathBuf,
    repos: Repositories,
}

impl Default for Config {
    fn default() -> Self {
        Config::new("/", Repositories::default())
    }
}

impl Config {
    /// Build a configuration from parts.
    pub fn new<P: Into<PathBuf>>(root: P, repos: Repositories) -> Config {
        Config {
            root: root.into(),
            repos,
        }
    }

    /// Load the configuration under `root`.
    ///
    /// Repositories come from `etc/portage/repos.conf`; without one, a
    /// `gentoo` repository at `var/db/repos/gentoo` is assumed.
    pub fn load<P: Into<PathBuf>>(root: P) -> Result<Config> {
        let root = root.into();
        let mut repos = Repositories::load(&root.join("etc/portage/repos.conf"))?;
        if repos.is_empty() {
            info!("no repos.conf found, assuming the gentoo repository");
            repos = Repositories::new(vec![Repository::new(
                "gentoo",
                root.join("var/db/repos/gentoo"),
            )]);
        }
        Ok(Config { root, repos })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repos(&self) -> &Repositories {
        &self.repos
    }

    /// Global settings: `etc/portage/make.conf`.
    pub fn make_conf(&self) -> PathBuf {
        self.root.join("etc/portage/make.conf")
    }

    /// Per-package USE overrides: `etc/portage/package.use`.
    pub fn package_use(&self) -> PathBuf {
        self.root.join("etc/portage/package.use")
    }

    /// Keyword unmasks: `etc/portage/package.accept_keywords`.
    pub fn accept_keywords(&self) -> PathBuf {
        self.root.join("etc/portage/package.accept_keywords")
    }

    /// Repository configuration: `etc/portage/repos.conf`.
    pub fn repos_conf(&self) -> PathBuf {
        self.root.join("etc/portage/repos.conf")
    }

    /// Installed-package database: `var/db/pkg`.
    pub fn pkg_db(&self) -> PathBuf {
        self.root.join("var/db/pkg")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use indoc::indoc;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    const REPOS_CONF: &str = indoc! {"
        [DEFAULT]
        main-repo = gentoo

        [gentoo]
        location = /var/db/repos/gentoo
        sync-type = git
        sync-uri = https://github.com/gentoo-mirror/gentoo.git
        priority = -1000

        [guru]
        location = /var/db/repos/guru
        sync-type = git
        auto-sync = no
    "};

    #[test]
    fn parse_repositories() {
        let repos = Repositories::parse(REPOS_CONF).unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(repos.names(), ["guru", "gentoo"]);

        let gentoo = repos.get("gentoo").unwrap();
        assert_eq!(gentoo.priority, -1000);
        assert_eq!(gentoo.sync_type.as_deref(), Some("git"));
        assert!(gentoo.auto_sync);
        assert!(!repos.get("guru").unwrap().auto_sync);
        assert_eq!(
            repos.location("guru"),
            Some(Path::new("/var/db/repos/guru"))
        );
        assert!(repos.get("DEFAULT").is_none());
    }

    #[traced_test]
    #[test]
    fn missing_location_skipped() {
        let repos = Repositories::parse("[broken]\nsync-type = git\n").unwrap();
        assert!(repos.is_empty());
        assert!(logs_contain("missing location field"));
    }

    #[test]
    fn directory_later_file_wins() {
        let dir = tempdir().unwrap();
        let conf = dir.path().join("repos.conf");
        fs::create_dir(&conf).unwrap();
        fs::write(conf.join("gentoo.conf"), "[gentoo]\nlocation = /a\n").unwrap();
        fs::write(
            conf.join("zz-local.conf"),
            "[gentoo]\nlocation = /b\n[local]\nlocation = /c\npriority = 50\n",
        )
        .unwrap();

        let repos = Repositories::load(&conf).unwrap();
        assert_eq!(repos.names(), ["local", "gentoo"]);
        assert_eq!(repos.location("gentoo"), Some(Path::new("/b")));
    }

    #[test]
    fn load_missing_is_empty() {
        let dir = tempdir().unwrap();
        assert!(Repositories::load(&dir.path().join("repos.conf"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn config_paths_and_fallback() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.make_conf(), dir.path().join("etc/portage/make.conf"));
        assert_eq!(config.pkg_db(), dir.path().join("var/db/pkg"));
        assert_eq!(config.repos().names(), ["gentoo"]);
        assert_eq!(
            config.repos().location("gentoo"),
            Some(dir.path().join("var/db/repos/gentoo").as_path())
        );
    }

    #[test]
    fn config_reads_repos_conf() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("etc/portage")).unwrap();
        fs::write(dir.path().join("etc/portage/repos.conf"), REPOS_CONF).unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.repos().names(), ["guru", "gentoo"]);
    }
}
