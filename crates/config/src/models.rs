use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub(crate) const APPLICATION: &str = "bindery";
pub const DEFAULT_TEMPLATE: &str = "{{ title }}";
pub const DEFAULT_DRAIN_MS: u64 = 300;

/// How files discovered on an initial scan are grouped into books.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingStrategy {
    /// Folder-centric fuzzy grouping by name, series number and similarity.
    #[default]
    AutoDetect,
    /// Every folder is one book.
    BookPerFolder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// SQLite database file
    pub path: PathBuf,
    /// Mark books deleted instead of removing their rows
    pub soft_delete: bool,
}
impl Default for CatalogConfig {
    fn default() -> Self {
        let path = directories::ProjectDirs::from("", "", APPLICATION)
            .map(|dirs| dirs.data_dir().join("catalog.db"))
            .unwrap_or_else(|| PathBuf::from("catalog.db"));
        Self { path, soft_delete: false }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoversConfig {
    /// Directory for generated covers; covers are not kept when unset
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizeConfig {
    /// Naming policy: an `upon` template rendering a book file's path
    pub template: String,
    /// How long to let the watcher settle before moving files (milliseconds)
    pub drain_ms: u64,
}
impl Default for OrganizeConfig {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            drain_ms: DEFAULT_DRAIN_MS,
        }
    }
}
impl OrganizeConfig {
    pub fn drain(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootConfig {
    /// Stable identifier; stored with every catalogued file
    pub id: i64,
    /// Absolute directory
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryConfig {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub strategy: GroupingStrategy,
    /// Whether a filesystem watcher observes this library
    #[serde(default)]
    pub watch: bool,
    pub roots: Vec<RootConfig>,
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub covers: CoversConfig,
    pub organize: OrganizeConfig,
    pub libraries: Vec<LibraryConfig>,
}
