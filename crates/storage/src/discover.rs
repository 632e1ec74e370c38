use crate::error::Error;
use crate::path::split;
use crate::{BookFormat, DiscoveredFile, StorageBackend};
use futures::StreamExt;
use std::collections::BTreeMap;
use tracing::instrument;

/// Minimum number of audio tracks for a directory to be treated as one
/// folder-based unit.
const MIN_FOLDER_TRACKS: usize = 2;

/// Result of walking one root.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Units found, sorted by location.
    pub files: Vec<DiscoveredFile>,
    /// Entries that could not be read; they are reported and skipped.
    pub errors: Vec<Error>,
}

struct Member {
    name: String,
    format: BookFormat,
    size: u64,
}

/// Walk a root and produce its [`DiscoveredFile`]s.
///
/// Files with unknown extensions and hidden entries are ignored. A directory
/// other than the root whose known files are all audio, with at least two of
/// them, is emitted once as a folder-based unit in place of its tracks.
#[instrument(skip(backend), fields(root = backend.root_id()))]
pub async fn discover(backend: &dyn StorageBackend) -> Discovery {
    let root_id = backend.root_id();
    let mut discovery = Discovery::default();
    let mut directories: BTreeMap<String, Vec<Member>> = BTreeMap::new();

    let mut stream = backend.list_stream(None);
    while let Some(result) = stream.next().await {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(root = root_id, error = %err, "Skipping unreadable entry");
                discovery.errors.push(err);
                continue;
            },
        };
        let Some(format) = BookFormat::from_path(&entry.path) else {
            tracing::trace!(path = %entry.path.display(), "Ignoring unknown format");
            continue;
        };
        match split(&entry.path) {
            Ok((sub_path, name)) => directories.entry(sub_path).or_default().push(Member {
                name,
                format,
                size: entry.size,
            }),
            Err(err) => {
                tracing::warn!(root = root_id, path = %entry.path.display(), error = %err, "Skipping unrepresentable path");
                discovery.errors.push(err);
            },
        }
    }

    for (sub_path, mut members) in directories {
        members.sort_by(|a, b| a.name.cmp(&b.name));
        let is_folder_unit = !sub_path.is_empty()
            && members.len() >= MIN_FOLDER_TRACKS
            && members.iter().all(|m| m.format.is_audio());
        if is_folder_unit {
            let (parent, dir_name) = match sub_path.rsplit_once('/') {
                Some((parent, dir_name)) => (parent.to_string(), dir_name.to_string()),
                None => (String::new(), sub_path.clone()),
            };
            discovery.files.push(DiscoveredFile {
                root_id,
                sub_path: parent,
                file_name: dir_name,
                format: members[0].format,
                folder_based: true,
                size: members.iter().map(|m| m.size).sum(),
            });
            continue;
        }
        discovery.files.extend(members.into_iter().map(|m| DiscoveredFile {
            root_id,
            sub_path: sub_path.clone(),
            file_name: m.name,
            format: m.format,
            folder_based: false,
            size: m.size,
        }));
    }

    discovery.files.sort();
    tracing::debug!(
        root = root_id,
        files = discovery.files.len(),
        errors = discovery.errors.len(),
        "Discovery complete"
    );
    discovery
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use tempfile::TempDir;

    fn setup(files: &[(&str, usize)]) -> (TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        for (path, len) in files {
            let absolute = temp_dir.path().join(path);
            std::fs::create_dir_all(absolute.parent().unwrap()).unwrap();
            std::fs::write(absolute, vec![1u8; *len]).unwrap();
        }
        let backend = LocalBackend::new(7, temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    fn locations(discovery: &Discovery) -> Vec<(String, String, bool)> {
        discovery
            .files
            .iter()
            .map(|f| (f.sub_path.clone(), f.file_name.clone(), f.folder_based))
            .collect()
    }

    #[tokio::test]
    async fn test_discovers_known_formats_only() {
        let (_temp_dir, backend) = setup(&[
            ("Dune.epub", 10),
            ("notes.txt", 10),
            ("Silo/Silo.epub", 10),
            ("Silo/cover.jpg", 10),
            (".hidden/Secret.epub", 10),
        ]);
        let discovery = discover(&backend).await;
        assert!(discovery.errors.is_empty());
        assert_eq!(
            locations(&discovery),
            vec![
                ("".to_string(), "Dune.epub".to_string(), false),
                ("Silo".to_string(), "Silo.epub".to_string(), false),
            ]
        );
        assert!(discovery.files.iter().all(|f| f.root_id == 7));
    }

    #[tokio::test]
    async fn test_multi_track_folder_becomes_one_unit() {
        let (_temp_dir, backend) = setup(&[
            ("Weir/Project Hail Mary/02.mp3", 20),
            ("Weir/Project Hail Mary/01.mp3", 10),
            ("Weir/Project Hail Mary/cover.jpg", 5),
        ]);
        let discovery = discover(&backend).await;
        assert_eq!(discovery.files.len(), 1);
        let unit = &discovery.files[0];
        assert_eq!(unit.sub_path, "Weir");
        assert_eq!(unit.file_name, "Project Hail Mary");
        assert!(unit.folder_based);
        assert_eq!(unit.format, BookFormat::Mp3);
        assert_eq!(unit.size, 30);
    }

    #[tokio::test]
    async fn test_folder_with_ebook_keeps_individual_files() {
        let (_temp_dir, backend) = setup(&[
            ("Silo/01.mp3", 10),
            ("Silo/02.mp3", 10),
            ("Silo/Silo.epub", 10),
        ]);
        let discovery = discover(&backend).await;
        assert_eq!(discovery.files.len(), 3);
        assert!(discovery.files.iter().all(|f| !f.folder_based));
    }

    #[tokio::test]
    async fn test_single_track_and_root_tracks_stay_files() {
        let (_temp_dir, backend) = setup(&[
            ("Silo/Silo.m4b", 10),
            ("a.mp3", 10),
            ("b.mp3", 10),
        ]);
        let discovery = discover(&backend).await;
        assert_eq!(
            locations(&discovery),
            vec![
                ("".to_string(), "a.mp3".to_string(), false),
                ("".to_string(), "b.mp3".to_string(), false),
                ("Silo".to_string(), "Silo.m4b".to_string(), false),
            ]
        );
    }

    #[tokio::test]
    async fn test_top_level_folder_unit() {
        let (_temp_dir, backend) = setup(&[("Dune/01.flac", 10), ("Dune/02.flac", 10)]);
        let discovery = discover(&backend).await;
        assert_eq!(locations(&discovery), vec![("".to_string(), "Dune".to_string(), true)]);
    }
}
