use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use crate::atom::Atom;
use crate::config::{Config, Repository};
use crate::error::Result;
use crate::installed::InstalledDb;
use crate::iuse::{IUse, IUseDefault};
use crate::metadata_xml;
use crate::package_use::PackageUse;
use crate::query::{ebuild_iuse, md5_cache_iuse, MetadataQuery, Portageq};
use crate::vars::MakeConf;

/// The USE flags a build of one package version would use.
///
/// `enabled` and `disabled` are disjoint subsets of `iuse`; flags with no
/// signal from any layer are in neither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveUseFlags {
    /// Declared flags, in declaration order.
    pub iuse: IndexSet<String>,
    pub enabled: IndexSet<String>,
    pub disabled: IndexSet<String>,
    /// Flag descriptions from `metadata.xml`.
    pub descriptions: IndexMap<String, String>,
}

impl EffectiveUseFlags {
    pub fn is_enabled(&self, flag: &str) -> bool {
        self.enabled.contains(flag)
    }

    pub fn is_disabled(&self, flag: &str) -> bool {
        self.disabled.contains(flag)
    }
}

#[derive(Debug, Default)]
struct Dispositions {
    enabled: IndexSet<String>,
    disabled: IndexSet<String>,
}

impl Dispositions {
    fn enable(&mut self, flag: &str) {
        self.disabled.shift_remove(flag);
        self.enabled.insert(flag.to_string());
    }

    fn disable(&mut self, flag: &str) {
        self.enabled.shift_remove(flag);
        self.disabled.insert(flag.to_string());
    }

    /// Apply a `flag` or `-flag` token.
    fn apply(&mut self, token: &str) {
        match token.strip_prefix('-') {
            Some(flag) => self.disable(flag),
            None => self.enable(token),
        }
    }
}

/// The configuration layers feeding one resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UseLayers {
    /// Declared flags with their defaults.
    pub iuse: Vec<IUse>,
    /// Global `USE` tokens.
    pub global_use: Vec<String>,
    /// Wanted locale flags (`l10n_de`), derived from `L10N`.
    pub locales: Vec<String>,
    /// Per-package override tokens, in application order.
    pub package_use: Vec<String>,
    /// Flags recorded for the installed package, when there is a record.
    pub installed: Option<Vec<String>>,
}

impl UseLayers {
    /// Merge the layers.
    ///
    /// Global `USE` seeds the state, IUSE defaults overwrite it, and
    /// per-package tokens overwrite both. Locale flags ignore all of that:
    /// they are enabled exactly when listed in `locales`. An installed
    /// record replaces the result wholesale. Flags outside IUSE are
    /// dropped at the end.
    ///
    /// # Examples
    ///
    /// ```
    /// use portage_inspect::{IUse, UseLayers};
    ///
    /// let layers = UseLayers {
    ///     iuse: IUse::parse_line("+gtk qt5 l10n_de l10n_fr").unwrap(),
    ///     global_use: vec!["qt5".into(), "-gtk".into()],
    ///     locales: vec!["l10n_de".into()],
    ///     ..Default::default()
    /// };
    /// let flags = layers.resolve();
    /// assert_eq!(flags.enabled.iter().collect::<Vec<_>>(), ["gtk", "qt5", "l10n_de"]);
    /// assert_eq!(flags.disabled.iter().collect::<Vec<_>>(), ["l10n_fr"]);
    /// ```
    pub fn resolve(&self) -> EffectiveUseFlags {
        let iuse = IUse::names(&self.iuse);
        let mut state = Dispositions::default();

        for token in &self.global_use {
            state.apply(token);
        }

        for flag in &self.iuse {
            if flag.is_locale() {
                if self.locales.contains(&flag.name) {
                    state.enable(&flag.name);
                } else {
                    state.disable(&flag.name);
                }
                continue;
            }
            match flag.default {
                Some(IUseDefault::Enabled) => state.enable(&flag.name),
                Some(IUseDefault::Disabled) => state.disable(&flag.name),
                None => (),
            }
        }

        for token in &self.package_use {
            state.apply(token);
        }

        if let Some(ref installed) = self.installed {
            state = Dispositions::default();
            for flag in installed {
                state.enable(flag);
            }
            for flag in &iuse {
                if !state.enabled.contains(flag) {
                    state.disable(flag);
                }
            }
        }

        let enabled = iuse
            .iter()
            .filter(|f| state.enabled.contains(*f))
            .cloned()
            .collect();
        let disabled = iuse
            .iter()
            .filter(|f| state.disabled.contains(*f))
            .cloned()
            .collect();

        EffectiveUseFlags {
            iuse,
            enabled,
            disabled,
            descriptions: IndexMap::new(),
        }
    }
}

/// Per-version package data that does not depend on local configuration.
#[derive(Debug, Default)]
struct BaseInfo {
    iuse: Vec<IUse>,
    descriptions: IndexMap<String, String>,
}

type CacheKey = (String, String);

/// Computes effective USE flags against a configuration snapshot.
///
/// IUSE and flag descriptions are memoized per `(atom, version)`; the
/// configuration files are re-read on every call. Build a new resolver, or
/// call [`Resolver::invalidate`], when repositories may have changed.
#[derive(Debug)]
pub struct Resolver<Q = Portageq> {
    config: Config,
    query: Q,
    cache: RwLock<HashMap<CacheKey, Arc<BaseInfo>>>,
}

impl Resolver<Portageq> {
    /// A resolver querying `portageq` against the configured root.
    pub fn new(config: Config) -> Self {
        let root = config.root().to_string_lossy().into_owned();
        let query = Portageq::default().with_root(&root);
        Resolver::with_query(config, query)
    }
}

impl<Q: MetadataQuery> Resolver<Q> {
    /// A resolver with a custom metadata query.
    pub fn with_query(config: Config, query: Q) -> Self {
        Resolver {
            config,
            query,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn installed_db(&self) -> InstalledDb {
        InstalledDb::new(self.config.pkg_db())
    }

    /// Drop all memoized package data.
    pub fn invalidate(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// First repository, by priority, carrying the package directory.
    fn package_repo(&self, key: &str) -> Option<&Repository> {
        self.config
            .repos()
            .iter()
            .find(|repo| repo.location.join(key).is_dir())
    }

    fn fallback_iuse(&self, key: &str, version: &str) -> Option<Vec<IUse>> {
        self.config.repos().iter().find_map(|repo| {
            md5_cache_iuse(&repo.location, key, version)
                .or_else(|| ebuild_iuse(&repo.location, key, version))
        })
    }

    fn load_base_info(&self, key: &str, version: &str) -> BaseInfo {
        let iuse = match self.query.iuse(key, version) {
            Ok(iuse) => {
                debug!("{key}-{version}: {} IUSE flags from metadata query", iuse.len());
                Some(iuse)
            }
            Err(e) => {
                warn!("metadata query for {key}-{version} failed, reading repository files: {e}");
                None
            }
        };
        let iuse = iuse
            .or_else(|| self.fallback_iuse(key, version))
            .unwrap_or_default();

        let descriptions = self
            .package_repo(key)
            .map(|repo| metadata_xml::load(&repo.location.join(key).join("metadata.xml")))
            .unwrap_or_default();

        BaseInfo { iuse, descriptions }
    }

    fn base_info(&self, key: &str, version: &str) -> Arc<BaseInfo> {
        let cache_key = (key.to_string(), version.to_string());
        if let Some(info) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&cache_key)
        {
            return info.clone();
        }

        let info = Arc::new(self.load_base_info(key, version));
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cache_key, info.clone());
        info
    }

    /// Effective USE flags of `atom` at `version`.
    ///
    /// `atom` may carry the version itself, in which case `version` may be
    /// empty; for an installed package with no version given, the installed
    /// one is used. Only a malformed atom is an error. Unreadable layers
    /// contribute nothing.
    pub fn resolve(
        &self,
        atom: &str,
        version: &str,
        installed: bool,
    ) -> Result<EffectiveUseFlags> {
        let atom = Atom::parse(atom)?;
        let key = atom.key();
        let db = self.installed_db();

        let version = match (version, atom.version) {
            ("", Some(v)) => v,
            ("", None) if installed => db.find_version(&key).unwrap_or_default(),
            (v, _) => v.to_string(),
        };
        if version.is_empty() {
            debug!("{key}: no version to resolve against");
        }

        let base = self.base_info(&key, &version);
        let make_conf = MakeConf::load(&self.config.make_conf());
        let package_use = PackageUse::load(&self.config.package_use());

        let record = if installed {
            let record = db.package(&key, &version);
            if record.is_none() {
                warn!("{key}-{version} is marked installed but has no database record");
            }
            record
        } else {
            None
        };

        // recipes gone from every repository still have their recorded IUSE
        let iuse = match record {
            Some(ref pkg) if base.iuse.is_empty() => pkg.iuse.clone(),
            _ => base.iuse.clone(),
        };

        let layers = UseLayers {
            iuse,
            global_use: make_conf.use_flags(),
            locales: make_conf.locale_flags(),
            package_use: package_use
                .flags_for(&key, &version)
                .into_iter()
                .map(str::to_string)
                .collect(),
            installed: record.map(|pkg| pkg.use_flags),
        };
        debug!(
            "{key}-{version}: {} IUSE, {} global USE, {} locales, {} package.use tokens, installed: {}",
            layers.iuse.len(),
            layers.global_use.len(),
            layers.locales.len(),
            layers.package_use.len(),
            layers.installed.is_some()
        );

        let mut flags = layers.resolve();
        flags.descriptions = base.descriptions.clone();
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use indoc::indoc;
    use tempfile::{tempdir, TempDir};
    use tracing_test::traced_test;

    use crate::config::Repositories;
    use crate::error::Error;

    fn tokens(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    fn set(flags: &IndexSet<String>) -> Vec<&str> {
        flags.iter().map(String::as_str).collect()
    }

    #[test]
    fn iuse_default_overrides_global_disable() {
        let flags = UseLayers {
            iuse: IUse::parse_line("+Y Z").unwrap(),
            global_use: tokens("X -Y"),
            ..Default::default()
        }
        .resolve();
        // X is enabled globally but not declared, so it is filtered out
        assert_eq!(set(&flags.enabled), ["Y"]);
        assert!(flags.disabled.is_empty());
        assert!(!flags.is_enabled("Z") && !flags.is_disabled("Z"));
    }

    #[test]
    fn locale_flags_follow_l10n_only() {
        let flags = UseLayers {
            iuse: IUse::parse_line("+l10n_de +l10n_fr l10n_ja").unwrap(),
            global_use: tokens("l10n_fr l10n_ja"),
            locales: tokens("l10n_ja"),
            ..Default::default()
        }
        .resolve();
        assert_eq!(set(&flags.enabled), ["l10n_ja"]);
        assert_eq!(set(&flags.disabled), ["l10n_de", "l10n_fr"]);
    }

    #[test]
    fn package_use_wins_last() {
        let flags = UseLayers {
            iuse: IUse::parse_line("+a b -c l10n_de").unwrap(),
            global_use: tokens("b"),
            package_use: tokens("-a -b c -c c l10n_de"),
            ..Default::default()
        }
        .resolve();
        assert_eq!(set(&flags.enabled), ["c", "l10n_de"]);
        assert_eq!(set(&flags.disabled), ["a", "b"]);
    }

    #[test]
    fn installed_record_is_terminal() {
        let flags = UseLayers {
            iuse: IUse::parse_line("foo +bar").unwrap(),
            global_use: tokens("bar -foo"),
            package_use: tokens("bar"),
            installed: Some(tokens("foo amd64")),
            ..Default::default()
        }
        .resolve();
        assert_eq!(set(&flags.enabled), ["foo"]);
        assert_eq!(set(&flags.disabled), ["bar"]);
    }

    #[test]
    fn empty_installed_record_disables_everything() {
        let flags = UseLayers {
            iuse: IUse::parse_line("+a b").unwrap(),
            installed: Some(vec![]),
            ..Default::default()
        }
        .resolve();
        assert!(flags.enabled.is_empty());
        assert_eq!(set(&flags.disabled), ["a", "b"]);
    }

    #[test]
    fn results_are_disjoint_subsets() {
        let flags = UseLayers {
            iuse: IUse::parse_line("a -b +c l10n_de d").unwrap(),
            global_use: tokens("-a b x -y l10n_de"),
            locales: tokens("l10n_en"),
            package_use: tokens("a -c z"),
            ..Default::default()
        }
        .resolve();
        assert!(flags.enabled.is_disjoint(&flags.disabled));
        assert!(flags.enabled.iter().all(|f| flags.iuse.contains(f)));
        assert!(flags.disabled.iter().all(|f| flags.iuse.contains(f)));
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// A root with one repository holding `media-video/player-2.0`.
    fn system() -> (TempDir, Config) {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let repo = root.join("var/db/repos/gentoo");

        write(
            &root.join("etc/portage/make.conf"),
            indoc! {r#"
                USE="wayland -pulseaudio"
                L10N="de"
            "#},
        );
        write(
            &root.join("etc/portage/package.use/player"),
            "media-video/player -wayland\n=media-video/player-2.0 pulseaudio\n",
        );
        write(
            &repo.join("media-video/player/player-2.0.ebuild"),
            "EAPI=8\nIUSE=\"+alsa pulseaudio wayland\"\nIUSE+=\" l10n_de l10n_fr\"\n",
        );
        write(
            &repo.join("media-video/player/metadata.xml"),
            indoc! {r#"
                <pkgmetadata>
                    <use><flag name="wayland">Wayland output</flag></use>
                </pkgmetadata>
            "#},
        );

        let config = Config::new(
            root,
            Repositories::new(vec![Repository::new("gentoo", repo)]),
        );
        (dir, config)
    }

    fn failing(_: &str, _: &str) -> Result<Vec<IUse>> {
        Err(Error::Command("portageq: not found".to_string()))
    }

    #[traced_test]
    #[test]
    fn resolve_with_recipe_fallback() {
        let (_dir, config) = system();
        let resolver = Resolver::with_query(config, failing);

        let flags = resolver.resolve("media-video/player", "2.0", false).unwrap();
        assert_eq!(
            set(&flags.iuse),
            ["alsa", "pulseaudio", "wayland", "l10n_de", "l10n_fr"]
        );
        assert_eq!(set(&flags.enabled), ["alsa", "pulseaudio", "l10n_de"]);
        assert_eq!(set(&flags.disabled), ["wayland", "l10n_fr"]);
        assert_eq!(flags.descriptions["wayland"], "Wayland output");
        assert!(logs_contain("metadata query for media-video/player-2.0 failed"));
    }

    #[test]
    fn resolve_versioned_atom() {
        let (_dir, config) = system();
        let resolver = Resolver::with_query(config, failing);
        let flags = resolver.resolve("=media-video/player-2.0", "", false).unwrap();
        assert!(flags.is_enabled("pulseaudio"));
    }

    #[test]
    fn resolve_installed_detects_version() {
        let (dir, config) = system();
        write(
            &dir.path().join("var/db/pkg/media-video/player-2.0/USE"),
            "amd64 wayland l10n_fr\n",
        );
        let resolver = Resolver::with_query(config, failing);

        let flags = resolver.resolve("media-video/player", "", true).unwrap();
        assert_eq!(set(&flags.enabled), ["wayland", "l10n_fr"]);
        assert_eq!(set(&flags.disabled), ["alsa", "pulseaudio", "l10n_de"]);
    }

    #[test]
    fn installed_package_with_digit_segment() {
        let (dir, config) = system();
        write(
            &dir.path().join("var/db/pkg/media-fonts/font-adobe-100dpi-1.0.4/USE"),
            "nls\n",
        );
        let query = |atom: &str, version: &str| -> Result<Vec<IUse>> {
            assert_eq!((atom, version), ("media-fonts/font-adobe-100dpi", "1.0.4"));
            IUse::parse_line("nls +truetype")
        };
        let resolver = Resolver::with_query(config, query);

        let flags = resolver
            .resolve("media-fonts/font-adobe-100dpi", "", true)
            .unwrap();
        assert_eq!(set(&flags.enabled), ["nls"]);
        assert_eq!(set(&flags.disabled), ["truetype"]);
    }

    #[traced_test]
    #[test]
    fn installed_without_record() {
        let (_dir, config) = system();
        let resolver = Resolver::with_query(config, failing);
        let flags = resolver.resolve("media-video/player", "2.0", true).unwrap();
        assert!(flags.is_enabled("alsa"));
        assert!(logs_contain("has no database record"));
    }

    #[test]
    fn query_result_is_cached_until_invalidated() {
        let (_dir, config) = system();
        let calls = AtomicUsize::new(0);
        let query = |atom: &str, version: &str| -> Result<Vec<IUse>> {
            assert_eq!((atom, version), ("media-video/player", "2.0"));
            calls.fetch_add(1, Ordering::SeqCst);
            IUse::parse_line("+alsa vaapi")
        };
        let resolver = Resolver::with_query(config, query);

        let flags = resolver.resolve("media-video/player", "2.0", false).unwrap();
        assert_eq!(set(&flags.iuse), ["alsa", "vaapi"]);
        resolver.resolve("media-video/player", "2.0", false).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        resolver.invalidate();
        resolver.resolve("media-video/player", "2.0", false).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn configuration_is_reread() {
        let (dir, config) = system();
        let resolver = Resolver::with_query(config, failing);
        assert!(resolver
            .resolve("media-video/player", "2.0", false)
            .unwrap()
            .is_enabled("alsa"));

        write(
            &dir.path().join("etc/portage/package.use/zz"),
            "media-video/player -alsa\n",
        );
        assert!(resolver
            .resolve("media-video/player", "2.0", false)
            .unwrap()
            .is_disabled("alsa"));
    }

    #[test]
    fn unknown_package_is_empty() {
        let (_dir, config) = system();
        let resolver = Resolver::with_query(config, failing);
        let flags = resolver.resolve("app-misc/nothing", "1.0", false).unwrap();
        assert_eq!(flags, EffectiveUseFlags::default());
    }

    #[test]
    fn invalid_atom() {
        let (_dir, config) = system();
        let resolver = Resolver::with_query(config, failing);
        assert!(matches!(
            resolver.resolve("not an atom", "1.0", false),
            Err(Error::InvalidAtom(_))
        ));
    }
}
