//! Layered configuration.
//!
//! Sources, lowest priority first:
//!
//! 1. built-in defaults,
//! 2. a TOML, YAML or JSON file (an explicit path, or `config.toml` in the
//!    platform configuration directory when present),
//! 3. `BINDERY_` environment variables, with `__` separating nested keys
//!    (`BINDERY_ORGANIZE__DRAIN_MS=500`).
//!
//! The merged result is validated before it is returned.

pub mod error;
mod models;

pub use crate::models::{
    CatalogConfig, Config, CoversConfig, DEFAULT_DRAIN_MS, DEFAULT_TEMPLATE, GroupingStrategy, LibraryConfig,
    OrganizeConfig, RootConfig,
};
use crate::error::{ErrorKind, Result};
use crate::models::APPLICATION;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "BINDERY_";
/// Upper bound on the watcher drain interval; relocation blocks for this long.
const MAX_DRAIN_MS: u64 = 5_000;

impl Config {
    /// Load, merge and validate configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_file);
        match &path {
            Some(path) => tracing::debug!(path = %path.display(), "Loading configuration file"),
            None => tracing::debug!("No configuration file; using defaults and environment"),
        }
        let config: Self = Self::figment(path.as_deref()).extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// The merged (but unvalidated) sources.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
            figment = match extension.as_deref() {
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => figment.merge(Toml::file(path)),
            };
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn default_file() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", APPLICATION)
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .filter(|path| path.is_file())
    }

    /// Check values that deserialize fine but can't work together.
    pub fn validate(&self) -> Result<()> {
        if self.organize.template.trim().is_empty() {
            exn::bail!(ErrorKind::invalid("organize.template", "must not be empty"));
        }
        if self.organize.drain_ms > MAX_DRAIN_MS {
            exn::bail!(ErrorKind::invalid(
                "organize.drain_ms",
                format!("must be at most {MAX_DRAIN_MS}")
            ));
        }
        let mut library_ids = HashSet::new();
        let mut root_ids = HashSet::new();
        for library in &self.libraries {
            if !library_ids.insert(library.id) {
                exn::bail!(ErrorKind::invalid(
                    "libraries.id",
                    format!("duplicate library id {}", library.id)
                ));
            }
            if library.roots.is_empty() {
                exn::bail!(ErrorKind::invalid(
                    format!("libraries.{}.roots", library.id),
                    "at least one root is required"
                ));
            }
            for root in &library.roots {
                // Catalogued files are keyed by root id alone.
                if !root_ids.insert(root.id) {
                    exn::bail!(ErrorKind::invalid(
                        "libraries.roots.id",
                        format!("duplicate root id {}", root.id)
                    ));
                }
                if !root.path.is_absolute() {
                    exn::bail!(ErrorKind::invalid(
                        format!("libraries.{}.roots.{}.path", library.id, root.id),
                        "must be absolute"
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn library(&self, id: i64) -> Option<&LibraryConfig> {
        self.libraries.iter().find(|library| library.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    fn library(id: i64, roots: &[(i64, &str)]) -> LibraryConfig {
        LibraryConfig {
            id,
            name: format!("Library {id}"),
            strategy: GroupingStrategy::default(),
            watch: false,
            roots: roots
                .iter()
                .map(|(id, path)| RootConfig { id: *id, path: PathBuf::from(path) })
                .collect(),
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.organize.template, "{{ title }}");
        assert_eq!(config.organize.drain_ms, 300);
        assert!(!config.catalog.soft_delete);
        assert!(config.covers.path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_toml_with_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "bindery.toml",
                r#"
                    [catalog]
                    path = "/var/lib/bindery/catalog.db"
                    soft_delete = true

                    [organize]
                    template = "{{ series.name }}/{{ title }}"

                    [[libraries]]
                    id = 1
                    name = "Books"
                    strategy = "book_per_folder"
                    watch = true
                    roots = [{ id = 10, path = "/srv/books" }]
                "#,
            )?;
            jail.set_env("BINDERY_ORGANIZE__DRAIN_MS", "500");
            let config = Config::load(Some(Path::new("bindery.toml"))).map_err(|e| e.to_string())?;
            assert!(config.catalog.soft_delete);
            assert_eq!(config.organize.template, "{{ series.name }}/{{ title }}");
            assert_eq!(config.organize.drain_ms, 500);
            let books = config.library(1).unwrap();
            assert_eq!(books.strategy, GroupingStrategy::BookPerFolder);
            assert!(books.watch);
            assert_eq!(books.roots, vec![RootConfig { id: 10, path: PathBuf::from("/srv/books") }]);
            Ok(())
        });
    }

    #[test]
    fn test_load_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "bindery.yaml",
                r#"
                    libraries:
                      - id: 2
                        name: Audiobooks
                        roots:
                          - id: 20
                            path: /srv/audio
                "#,
            )?;
            let config = Config::load(Some(Path::new("bindery.yaml"))).map_err(|e| e.to_string())?;
            let audio = config.library(2).unwrap();
            assert_eq!(audio.strategy, GroupingStrategy::AutoDetect);
            assert!(!audio.watch);
            assert_eq!(config.organize.drain_ms, DEFAULT_DRAIN_MS);
            Ok(())
        });
    }

    #[test]
    fn test_malformed_file_fails_to_load() {
        Jail::expect_with(|jail| {
            jail.create_file("bindery.toml", "[organize]\ndrain_ms = \"soon\"")?;
            let err = Config::load(Some(Path::new("bindery.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Load));
            Ok(())
        });
    }

    #[rstest]
    #[case::duplicate_library(vec![library(1, &[(1, "/a")]), library(1, &[(2, "/b")])], "libraries.id")]
    #[case::duplicate_root(vec![library(1, &[(1, "/a")]), library(2, &[(1, "/b")])], "libraries.roots.id")]
    #[case::relative_root(vec![library(1, &[(1, "books")])], "libraries.1.roots.1.path")]
    #[case::no_roots(vec![library(1, &[])], "libraries.1.roots")]
    fn test_invalid_libraries(#[case] libraries: Vec<LibraryConfig>, #[case] expected_field: &str) {
        let config = Config { libraries, ..Default::default() };
        let err = config.validate().unwrap_err();
        match &*err {
            ErrorKind::Invalid { field, .. } => assert_eq!(field, expected_field),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_drain_interval_is_bounded() {
        let mut config = Config::default();
        config.organize.drain_ms = 5_000;
        assert!(config.validate().is_ok());
        config.organize.drain_ms = 5_001;
        assert!(config.validate().is_err());
        config.organize.drain_ms = 300;
        config.organize.template = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
