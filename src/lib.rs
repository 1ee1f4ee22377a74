//! Interpret Gentoo portage output and configuration.
//!
//! This crate covers two jobs a package front-end needs from portage
//! without linking against it:
//!
//! - **Dry-run interpretation**: turn the text of `emerge --pretend` into
//!   the list of packages that would be merged and the packages that need
//!   keyword or mask changes first ([`DryRunResult`]).
//! - **Effective USE flags**: compute which flags a build of a package
//!   version would use, by layering IUSE defaults, `make.conf`,
//!   `package.use` and the installed-package database ([`Resolver`]).
//!
//! Supporting readers cover `make.conf` style variables ([`read_variable`]),
//! `repos.conf` ([`Repositories`]), `metadata.xml` flag descriptions and the
//! `package.use` and `package.accept_keywords` files.
//!
//! # Examples
//!
//! Interpret a dry run:
//!
//! ```
//! use portage_inspect::{DryRunResult, Outcome};
//!
//! let output = "\
//! [ebuild  N     ] media-video/mpv-0.38.0::gentoo  USE=\"vaapi -lua\"
//!
//! The following keyword changes are necessary to proceed:
//! # required by media-video/mpv-0.38.0::gentoo
//! =media-libs/libplacebo-7.349.0 ~amd64
//! ";
//! let result = DryRunResult::parse(output);
//! assert_eq!(result.dependencies[0].atom, "=media-video/mpv-0.38.0");
//! assert_eq!(result.dependencies[0].use_flags, ["vaapi", "-lua"]);
//! assert_eq!(result.masked[0].atom, "=media-libs/libplacebo-7.349.0");
//! assert_eq!(result.outcome(1), Outcome::NeedsUnmask);
//! ```
//!
//! Resolve USE flags from explicit layers:
//!
//! ```
//! use portage_inspect::{IUse, UseLayers};
//!
//! let flags = UseLayers {
//!     iuse: IUse::parse_line("+Y Z").unwrap(),
//!     global_use: vec!["X".into(), "-Y".into()],
//!     ..Default::default()
//! }
//! .resolve();
//! assert!(flags.is_enabled("Y"));
//! assert!(!flags.is_enabled("X"));
//! ```

mod accept_keywords;
mod atom;
mod config;
mod emerge;
mod error;
mod installed;
mod iuse;
mod keyword;
mod mask;
pub mod metadata_xml;
pub mod package_use;
mod pretend;
mod process;
mod query;
mod resolve;
mod utils;
mod vars;

// Re-export public types
pub use accept_keywords::{AcceptKeywords, KeywordEntry};
pub use atom::{split_version, strip_repo, version_of, Atom, Operator};
pub use config::{Config, Repositories, Repository};
pub use emerge::{install_args, pretend_args, uninstall_args, Emerge, PretendRun};
pub use error::{Error, Result};
pub use installed::{InstalledDb, InstalledPackage};
pub use iuse::{is_locale_flag, IUse, IUseDefault, LOCALE_FLAG_PREFIX};
pub use keyword::{Keyword, Stability};
pub use mask::MaskReason;
pub use package_use::{PackageUse, PackageUseEntry};
pub use pretend::{Dependency, DryRunResult, MaskSource, MaskedPackage, Outcome};
pub use query::{ebuild_iuse, ebuild_path, md5_cache_iuse, MetadataQuery, Portageq};
pub use resolve::{EffectiveUseFlags, Resolver, UseLayers};
pub use vars::{assignments, read_variable, AssignOp, Assignment, MakeConf};
