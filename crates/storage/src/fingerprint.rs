//! Sparse content fingerprints.
//!
//! Hashing whole archives and audiobooks on every scan is far too slow, so a
//! file's identity is taken from up to twelve 1 KiB samples at exponentially
//! spaced offsets (0, 1 KiB, 4 KiB, 16 KiB, ... 1 GiB). Bytes between samples
//! do not contribute: this is an identity, not an integrity check.
//!
//! A folder-based unit (multi-track audiobook) is identified by its first
//! audio track plus the number of tracks.

use crate::error::{ErrorKind, Result};
use crate::{BookFormat, EntryKind, StorageBackend};
use std::path::Path;
use tracing::instrument;

const BLOCK_SIZE: usize = 1024;
const FIRST_SHIFT: i32 = -1;
const LAST_SHIFT: i32 = 10;

/// Offsets sampled for a file, in order. The first sample (shift `-1`) is
/// taken at the start of the file.
fn sample_offsets() -> impl Iterator<Item = u64> {
    (FIRST_SHIFT..=LAST_SHIFT).map(|i| match i < 0 {
        true => 0,
        false => (BLOCK_SIZE as u64) << (2 * i),
    })
}

fn digest(bytes: impl AsRef<[u8]>) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// Fingerprint a regular file: 32 lowercase hex characters.
///
/// Sampling stops at the first offset at or beyond the end of the file; the
/// last sample may be short.
#[instrument(skip(backend), fields(root = backend.root_id()))]
pub async fn fingerprint_file(backend: &dyn StorageBackend, path: &Path) -> Result<String> {
    let entry = backend.stat(path).await?;
    if !entry.is_file() {
        exn::bail!(ErrorKind::UnexpectedKind(path.to_path_buf()));
    }
    let mut sampled = Vec::with_capacity(BLOCK_SIZE * 12);
    for offset in sample_offsets() {
        if offset >= entry.size {
            break;
        }
        sampled.extend(backend.read_at(path, offset, BLOCK_SIZE).await?);
    }
    Ok(digest(sampled))
}

/// Fingerprint a folder-based unit from its first audio track (by name) and
/// the number of audio tracks directly inside it.
///
/// # Errors
///
/// [`EmptyFolder`](ErrorKind::EmptyFolder) when the folder holds no audio
/// tracks; callers must not substitute a placeholder hash.
#[instrument(skip(backend), fields(root = backend.root_id()))]
pub async fn fingerprint_folder(backend: &dyn StorageBackend, path: &Path) -> Result<String> {
    let mut tracks: Vec<_> = backend
        .list_dir(Some(path))
        .await?
        .into_iter()
        .filter(|entry| entry.is_file() && BookFormat::from_path(&entry.path).is_some_and(|f| f.is_audio()))
        .collect();
    tracks.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    let Some(first) = tracks.first() else {
        exn::bail!(ErrorKind::EmptyFolder(path.to_path_buf()));
    };
    let first_hash = fingerprint_file(backend, &first.path).await?;
    Ok(digest(format!("{first_hash}_{}", tracks.len())))
}

/// Fingerprint either a file or a folder-based unit.
pub async fn fingerprint(backend: &dyn StorageBackend, path: &Path, folder_based: bool) -> Result<String> {
    match folder_based {
        true => {
            if backend.kind(path).await? != Some(EntryKind::Directory) {
                exn::bail!(ErrorKind::UnexpectedKind(path.to_path_buf()));
            }
            fingerprint_folder(backend, path).await
        },
        false => fingerprint_file(backend, path).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use rstest::rstest;
    use tempfile::TempDir;

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn setup(files: &[(&str, Vec<u8>)]) -> (TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        for (path, data) in files {
            let absolute = temp_dir.path().join(path);
            std::fs::create_dir_all(absolute.parent().unwrap()).unwrap();
            std::fs::write(absolute, data).unwrap();
        }
        let backend = LocalBackend::new(1, temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    #[test]
    fn test_sample_offsets() {
        let offsets: Vec<u64> = sample_offsets().collect();
        assert_eq!(offsets.len(), 12);
        assert_eq!(&offsets[..5], &[0, 1024, 4096, 16384, 65536]);
        assert_eq!(offsets[11], 1024 << 20);
    }

    #[tokio::test]
    async fn test_fingerprint_is_deterministic() {
        let (_temp_dir, backend) = setup(&[("book.epub", patterned(10_000))]);
        let first = fingerprint_file(&backend, Path::new("book.epub")).await.unwrap();
        let second = fingerprint_file(&backend, Path::new("book.epub")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[tokio::test]
    async fn test_small_file_hashes_whole_content() {
        let (_temp_dir, backend) = setup(&[("tiny.epub", b"hello".to_vec())]);
        let hash = fingerprint_file(&backend, Path::new("tiny.epub")).await.unwrap();
        assert_eq!(hash, format!("{:x}", md5::compute(b"hello")));
    }

    // A 10,000 byte file is sampled at 0..1024, 1024..2048 and 4096..5120.
    #[rstest]
    #[case::inside_first_block(100, false)]
    #[case::inside_second_block(2000, false)]
    #[case::between_samples(3000, true)]
    #[case::inside_third_block(4100, false)]
    #[case::after_last_sample(9000, true)]
    #[tokio::test]
    async fn test_modification(#[case] byte: usize, #[case] unchanged: bool) {
        let mut data = patterned(10_000);
        let (temp_dir, backend) = setup(&[("book.epub", data.clone())]);
        let before = fingerprint_file(&backend, Path::new("book.epub")).await.unwrap();
        data[byte] ^= 0xFF;
        std::fs::write(temp_dir.path().join("book.epub"), &data).unwrap();
        let after = fingerprint_file(&backend, Path::new("book.epub")).await.unwrap();
        assert_eq!(before == after, unchanged);
    }

    #[tokio::test]
    async fn test_appending_beyond_last_sample_is_invisible() {
        let mut data = patterned(10_000);
        let (temp_dir, backend) = setup(&[("book.epub", data.clone())]);
        let before = fingerprint_file(&backend, Path::new("book.epub")).await.unwrap();
        data.extend(std::iter::repeat_n(7u8, 6_000));
        std::fs::write(temp_dir.path().join("book.epub"), &data).unwrap();
        let after = fingerprint_file(&backend, Path::new("book.epub")).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let (_temp_dir, backend) = setup(&[]);
        let err = fingerprint_file(&backend, Path::new("gone.epub")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_folder_fingerprint() {
        let (temp_dir, backend) = setup(&[
            ("Book/02.mp3", patterned(3000)),
            ("Book/01.mp3", patterned(2000)),
            ("Book/cover.jpg", patterned(50)),
        ]);
        let first_hash = fingerprint_file(&backend, Path::new("Book/01.mp3")).await.unwrap();
        let hash = fingerprint(&backend, Path::new("Book"), true).await.unwrap();
        assert_eq!(hash, format!("{:x}", md5::compute(format!("{first_hash}_2"))));

        // Adding a track changes the folder's identity.
        std::fs::write(temp_dir.path().join("Book/03.mp3"), patterned(10)).unwrap();
        assert_ne!(fingerprint(&backend, Path::new("Book"), true).await.unwrap(), hash);
    }

    #[tokio::test]
    async fn test_folder_without_audio_is_empty() {
        let (_temp_dir, backend) = setup(&[("Book/cover.jpg", patterned(50))]);
        let err = fingerprint_folder(&backend, Path::new("Book")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::EmptyFolder(_)));
    }

    #[tokio::test]
    async fn test_kind_mismatch() {
        let (_temp_dir, backend) = setup(&[("Book/01.mp3", patterned(50))]);
        let err = fingerprint(&backend, Path::new("Book"), false).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnexpectedKind(_)));
        let err = fingerprint(&backend, Path::new("Book/01.mp3"), true).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnexpectedKind(_)));
    }
}
