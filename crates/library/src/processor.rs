//! Per-format metadata extraction.
//!
//! Real extractors (EPUB OPF, PDF info, audio tags, ...) are provided by the
//! embedding application as [`FormatProcessor`]s. Anything without a
//! registered processor, or whose processor fails, falls back to
//! [`FilenameProcessor`].

use crate::error::Result;
use async_trait::async_trait;
use bindery_catalog::BookMetadata;
use bindery_naming::{display_title, extract_series_info};
use bindery_storage::{BookFormat, DiscoveredFile, StorageBackend};
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait FormatProcessor: Send + Sync {
    fn supported_types(&self) -> &[BookFormat];

    async fn process_file(&self, backend: &dyn StorageBackend, file: &DiscoveredFile) -> Result<BookMetadata>;

    /// Encoded cover image, if the file carries one.
    async fn generate_cover(&self, backend: &dyn StorageBackend, file: &DiscoveredFile) -> Result<Option<Vec<u8>>>;
}

/// Metadata from the file name alone. Never produces a cover.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilenameProcessor;
impl FilenameProcessor {
    pub fn metadata(file_name: &str) -> BookMetadata {
        let title = display_title(file_name);
        let series = extract_series_info(&title);
        BookMetadata {
            title: (!title.is_empty()).then_some(title),
            series_name: series.as_ref().map(|s| s.base_title.clone()),
            series_number: series.map(|s| s.number),
        }
    }
}

#[async_trait]
impl FormatProcessor for FilenameProcessor {
    fn supported_types(&self) -> &[BookFormat] {
        &BookFormat::ALL
    }

    async fn process_file(&self, _backend: &dyn StorageBackend, file: &DiscoveredFile) -> Result<BookMetadata> {
        Ok(Self::metadata(&file.file_name))
    }

    async fn generate_cover(&self, _backend: &dyn StorageBackend, _file: &DiscoveredFile) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<BookFormat, Arc<dyn FormatProcessor>>,
}
impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor for every format it supports, replacing earlier
    /// registrations for those formats.
    pub fn register(&mut self, processor: Arc<dyn FormatProcessor>) -> &mut Self {
        for format in processor.supported_types() {
            self.processors.insert(*format, Arc::clone(&processor));
        }
        self
    }

    pub fn get(&self, format: BookFormat) -> Option<&Arc<dyn FormatProcessor>> {
        self.processors.get(&format)
    }

    /// Metadata for a file. Never fails: a failing processor is logged and the
    /// file name is used instead.
    pub async fn metadata(&self, backend: &dyn StorageBackend, file: &DiscoveredFile) -> BookMetadata {
        if let Some(processor) = self.get(file.format) {
            match processor.process_file(backend, file).await {
                Ok(metadata) => return metadata,
                Err(e) => tracing::warn!(file = %file.path_key(), error = %e, "Processor failed, using file name"),
            }
        }
        FilenameProcessor::metadata(&file.file_name)
    }

    pub async fn cover(&self, backend: &dyn StorageBackend, file: &DiscoveredFile) -> Result<Option<Vec<u8>>> {
        match self.get(file.format) {
            Some(processor) => processor.generate_cover(backend, file).await,
            None => Ok(None),
        }
    }
}
