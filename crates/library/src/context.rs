use crate::covers::CoverCache;
use crate::error::{ErrorKind, Result};
use crate::processor::ProcessorRegistry;
use crate::scan::ScanLocks;
use crate::template::PathGenerator;
use crate::watch::{NoopWatcher, Watcher};
use bindery_catalog::Repository;
use bindery_config::{Config, DEFAULT_DRAIN_MS, DEFAULT_TEMPLATE};
use exn::ResultExt;
use std::sync::Arc;
use std::time::Duration;

/// Everything scans and relocations share across libraries.
pub struct Context {
    pub catalog: Repository,
    pub watcher: Arc<dyn Watcher>,
    pub processors: ProcessorRegistry,
    pub covers: Option<CoverCache>,
    /// Naming policy for relocation
    pub template: PathGenerator,
    /// How long to let the watcher settle before moving files
    pub drain: Duration,
    /// Mark books deleted instead of removing them
    pub soft_delete: bool,
    pub locks: ScanLocks,
}
impl Context {
    /// Context with the default naming template, no watcher and no cover cache.
    pub fn new(catalog: Repository) -> Result<Self> {
        Ok(Self {
            catalog,
            watcher: Arc::new(NoopWatcher),
            processors: ProcessorRegistry::default(),
            covers: None,
            template: DEFAULT_TEMPLATE.parse::<PathGenerator>()?,
            drain: Duration::from_millis(DEFAULT_DRAIN_MS),
            soft_delete: false,
            locks: ScanLocks::default(),
        })
    }

    /// Fails with [`ErrorKind::Config`] if the naming template does not
    /// compile.
    pub fn from_config(config: &Config, catalog: Repository, watcher: Arc<dyn Watcher>) -> Result<Self> {
        let template = config.organize.template.parse::<PathGenerator>().or_raise(|| ErrorKind::Config)?;
        Ok(Self {
            catalog,
            watcher,
            processors: ProcessorRegistry::default(),
            covers: config.covers.path.clone().map(CoverCache::new),
            template,
            drain: config.organize.drain(),
            soft_delete: config.catalog.soft_delete,
            locks: ScanLocks::default(),
        })
    }

    pub fn with_processors(mut self, processors: ProcessorRegistry) -> Self {
        self.processors = processors;
        self
    }
}
