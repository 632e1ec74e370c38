//! Comparable keys for book file names.
//!
//! Everything that decides whether two files belong to the same book works on
//! *keys*, never on raw names: [`normalize_key`] lower-cases a name and strips
//! its extension, format tags, author suffix and trailing article;
//! [`strip_edition`] additionally removes edition noise. Keys are compared
//! exactly or with [`similarity`], and numbered entries are told apart with
//! [`extract_series_info`] and [`trailing_number`].
//!
//! All functions are pure and cheap enough to call in tight loops.

mod consts;
mod key;
mod series;
mod similarity;

pub use crate::key::{display_title, normalize_key, strip_edition};
pub use crate::series::{SeriesInfo, extract_series_info, trailing_number};
pub use crate::similarity::similarity;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edition_variants_reduce_to_the_same_key() {
        let audio = strip_edition(&normalize_key("Silo (Unabridged).m4b"));
        let ebook = strip_edition(&normalize_key("Silo.epub"));
        assert_eq!(audio, "silo");
        assert_eq!(audio, ebook);
    }

    #[test]
    fn test_fileless_title_matches_slugged_file_name() {
        let title = normalize_key("Project Hail Mary");
        let file = normalize_key("project-hail-mary.epub");
        assert!(similarity(&title, &file) >= 0.85);
    }

    #[test]
    fn test_series_entries_are_told_apart() {
        let first = extract_series_info(&normalize_key("Silo Book 1.m4b")).unwrap();
        let second = extract_series_info(&normalize_key("Silo Book 2.m4b")).unwrap();
        assert_eq!(first.base_title, second.base_title);
        assert_ne!(first.number, second.number);
    }
}
