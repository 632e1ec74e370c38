use crate::error::{Error, ErrorKind};
use crate::models::{BookId, FileId};
use bindery_storage::{BookFormat, DiscoveredFile, PathKey, RootId};
use exn::ResultExt;
use time::UtcDateTime;

/// One persisted file (or folder-based unit) of a book.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogFile {
    pub id: FileId,
    pub book_id: BookId,
    pub root_id: RootId,
    /// `/`-joined parent directory, `""` at the root
    pub sub_path: String,
    pub file_name: String,
    pub is_primary: bool,
    pub folder_based: bool,
    pub format: BookFormat,
    /// Size in bytes when last observed (sum of tracks for folder units)
    pub size: u64,
    /// Fingerprint captured when the file was first catalogued; never changes
    pub initial_hash: String,
    /// Fingerprint from the most recent verification
    pub current_hash: String,
    pub added_at: UtcDateTime,
}
impl CatalogFile {
    pub fn path_key(&self) -> PathKey {
        PathKey::new(self.root_id, self.sub_path.clone(), self.file_name.clone())
    }

    /// Whether the file's content has drifted since it was first seen.
    pub fn has_drifted(&self) -> bool {
        self.initial_hash != self.current_hash
    }
}

/// A file about to be catalogued. Its fingerprint seeds both hashes.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFile {
    pub root_id: RootId,
    pub sub_path: String,
    pub file_name: String,
    pub is_primary: bool,
    pub folder_based: bool,
    pub format: BookFormat,
    pub size: u64,
    pub hash: String,
}
impl NewFile {
    pub fn from_discovered(file: &DiscoveredFile, hash: impl Into<String>, is_primary: bool) -> Self {
        Self {
            root_id: file.root_id,
            sub_path: file.sub_path.clone(),
            file_name: file.file_name.clone(),
            is_primary,
            folder_based: file.folder_based,
            format: file.format,
            size: file.size,
            hash: hash.into(),
        }
    }
}

/// New location of a relocated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation {
    pub file_id: FileId,
    pub root_id: RootId,
    pub sub_path: String,
    pub file_name: String,
}

#[derive(sqlx::FromRow)]
pub(crate) struct FileRow {
    pub(crate) id: i64,
    pub(crate) book_id: i64,
    pub(crate) root_id: i64,
    pub(crate) sub_path: String,
    pub(crate) file_name: String,
    pub(crate) is_primary: bool,
    pub(crate) folder_based: bool,
    pub(crate) format: String,
    pub(crate) file_size: i64,
    pub(crate) initial_hash: String,
    pub(crate) current_hash: String,
    pub(crate) added_at: i64,
}
impl TryFrom<FileRow> for CatalogFile {
    type Error = Error;
    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            book_id: row.book_id,
            root_id: row.root_id,
            sub_path: row.sub_path,
            file_name: row.file_name,
            is_primary: row.is_primary,
            folder_based: row.folder_based,
            format: row
                .format
                .parse::<BookFormat>()
                .or_raise(|| ErrorKind::InvalidData("book format"))?,
            size: u64::try_from(row.file_size).or_raise(|| ErrorKind::InvalidData("file size"))?,
            initial_hash: row.initial_hash,
            current_hash: row.current_hash,
            added_at: UtcDateTime::from_unix_timestamp(row.added_at).or_raise(|| ErrorKind::InvalidData("added date"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(format: &str, file_size: i64) -> FileRow {
        FileRow {
            id: 1,
            book_id: 2,
            root_id: 3,
            sub_path: "Silo".to_string(),
            file_name: "Silo.epub".to_string(),
            is_primary: true,
            folder_based: false,
            format: format.to_string(),
            file_size,
            initial_hash: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
            current_hash: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
            added_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_row_to_model() {
        let file = CatalogFile::try_from(row("epub", 1024)).unwrap();
        assert_eq!(file.format, BookFormat::Epub);
        assert_eq!(file.size, 1024);
        assert_eq!(file.path_key(), PathKey::new(3, "Silo", "Silo.epub"));
        assert_eq!(file.added_at.unix_timestamp(), 1_700_000_000);
        assert!(!file.has_drifted());
    }

    #[test]
    fn test_invalid_rows() {
        let err = CatalogFile::try_from(row("docx", 1024)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("book format")));
        let err = CatalogFile::try_from(row("epub", -1)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("file size")));
    }
}
