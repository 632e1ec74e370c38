use crate::consts::{SERIES_REGEX, TRAILING_NUMBER_REGEX, TRAILING_SEPARATOR_REGEX};

/// Base titles shorter than this are too generic to identify a series
/// ("book 3", "#4").
const MIN_BASE_TITLE_CHARS: usize = 3;

/// A key's position within a series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesInfo {
    /// Key with the series marker and everything after it removed
    pub base_title: String,
    /// Position in the series; may be fractional ("book 2.5" novellas)
    pub number: f64,
}

/// Detect a series marker (`book 3`, `bk. 3`, `vol. 2`, `volume 2`,
/// `part 4`, `pt 4`, `#4`) in a key.
///
/// ```
/// use bindery_naming::extract_series_info;
/// let info = extract_series_info("silo book 2").unwrap();
/// assert_eq!(info.base_title, "silo");
/// assert_eq!(info.number, 2.0);
/// assert!(extract_series_info("book 3").is_none());
/// ```
pub fn extract_series_info(key: &str) -> Option<SeriesInfo> {
    let captures = SERIES_REGEX.captures(key)?;
    let base_title = captures.name("base")?.as_str();
    let base_title = TRAILING_SEPARATOR_REGEX.replace(base_title.trim(), "").to_string();
    if base_title.chars().count() < MIN_BASE_TITLE_CHARS {
        return None;
    }
    let number = captures.name("number")?.as_str().parse().ok()?;
    Some(SeriesInfo { base_title, number })
}

/// The number a key ends with, if any.
///
/// ```
/// use bindery_naming::trailing_number;
/// assert_eq!(trailing_number("book1"), Some(1));
/// assert_eq!(trailing_number("silo 2"), Some(2));
/// assert_eq!(trailing_number("silo"), None);
/// ```
pub fn trailing_number(key: &str) -> Option<u32> {
    TRAILING_NUMBER_REGEX.captures(key)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("silo book 2", "silo", 2.0)]
    #[case("the expanse, book 3", "the expanse", 3.0)]
    #[case("dune bk. 4", "dune", 4.0)]
    #[case("saga vol. 2", "saga", 2.0)]
    #[case("saga volume 10", "saga", 10.0)]
    #[case("the stand part 4", "the stand", 4.0)]
    #[case("the stand pt 4", "the stand", 4.0)]
    #[case("discworld #4", "discworld", 4.0)]
    #[case("discworld (#4)", "discworld", 4.0)]
    #[case("wool - book 1.5", "wool", 1.5)]
    #[case("mistborn book 1 the final empire", "mistborn", 1.0)]
    fn test_extract_series_info(#[case] key: &str, #[case] base: &str, #[case] number: f64) {
        let info = extract_series_info(key).unwrap();
        assert_eq!(info.base_title, base);
        assert_eq!(info.number, number);
    }

    #[rstest]
    #[case("book 3")]
    #[case("#4")]
    #[case("it book 2")]
    #[case("silo")]
    #[case("bookworm 3")]
    #[case("apartment 3")]
    #[case("silo 2")]
    fn test_extract_series_info_none(#[case] key: &str) {
        assert_eq!(extract_series_info(key), None);
    }

    #[rstest]
    #[case("book1", Some(1))]
    #[case("silo 2", Some(2))]
    #[case("silo 2 ", Some(2))]
    #[case("2001 a space odyssey", None)]
    #[case("silo", None)]
    #[case("", None)]
    fn test_trailing_number(#[case] key: &str, #[case] expected: Option<u32>) {
        assert_eq!(trailing_number(key), expected);
    }
}
