use crate::error::{Error, ErrorKind};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::Path;
use std::str::FromStr;

/// A book, comic or audio format recognised by file extension.
///
/// Anything not listed here is ignored by discovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BookFormat {
    Epub,
    Pdf,
    Fb2,
    Mobi,
    Azw3,
    Cbz,
    Cbr,
    Cb7,
    Mp3,
    M4a,
    M4b,
    Flac,
    Ogg,
    Opus,
    Aac,
}

impl BookFormat {
    pub const ALL: [BookFormat; 15] = [
        Self::Epub,
        Self::Pdf,
        Self::Fb2,
        Self::Mobi,
        Self::Azw3,
        Self::Cbz,
        Self::Cbr,
        Self::Cb7,
        Self::Mp3,
        Self::M4a,
        Self::M4b,
        Self::Flac,
        Self::Ogg,
        Self::Opus,
        Self::Aac,
    ];

    /// Detect the format from a file extension (case-insensitive).
    ///
    /// Directories and extension-less names return `None`, as do names whose
    /// "extension" is merely an unrelated dot (`Mr. Mercedes`).
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        Self::ALL.into_iter().find(|format| format.extension() == ext)
    }

    /// Canonical lower-case extension, without the dot. Also used as the
    /// persisted format tag.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Epub => "epub",
            Self::Pdf => "pdf",
            Self::Fb2 => "fb2",
            Self::Mobi => "mobi",
            Self::Azw3 => "azw3",
            Self::Cbz => "cbz",
            Self::Cbr => "cbr",
            Self::Cb7 => "cb7",
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
            Self::M4b => "m4b",
            Self::Flac => "flac",
            Self::Ogg => "ogg",
            Self::Opus => "opus",
            Self::Aac => "aac",
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            Self::Mp3 | Self::M4a | Self::M4b | Self::Flac | Self::Ogg | Self::Opus | Self::Aac
        )
    }

    pub fn is_comic(&self) -> bool {
        matches!(self, Self::Cbz | Self::Cbr | Self::Cb7)
    }

    pub fn is_ebook(&self) -> bool {
        !self.is_audio() && !self.is_comic()
    }

    /// Preference when choosing a book's primary file; higher wins.
    ///
    /// Reflowable ebooks beat fixed layouts, which beat comics, which beat
    /// audio. Single-file audiobooks beat loose tracks.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Epub => 100,
            Self::Azw3 => 90,
            Self::Mobi => 85,
            Self::Fb2 => 80,
            Self::Pdf => 70,
            Self::Cbz => 60,
            Self::Cbr => 55,
            Self::Cb7 => 50,
            Self::M4b => 40,
            Self::M4a => 35,
            Self::Flac => 30,
            Self::Opus => 28,
            Self::Ogg => 26,
            Self::Mp3 => 25,
            Self::Aac => 20,
        }
    }
}

impl Display for BookFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.extension())
    }
}

impl FromStr for BookFormat {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::from_extension(s.trim().trim_start_matches('.')) {
            Some(format) => Ok(format),
            None => exn::bail!(ErrorKind::UnsupportedFormat(s.to_string())),
        }
    }
}
