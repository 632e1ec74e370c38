use crate::consts::{
    AUTHOR_SUFFIX_REGEX, EDITION_WORD_REGEX, EMPTY_BRACKETS_REGEX, FORMAT_TAG_REGEX, KNOWN_EXTENSION_REGEX,
    ORDINAL_EDITION_REGEX, TRAILING_ARTICLE_REGEX, TRAILING_SEPARATOR_REGEX, WHITESPACE_REGEX,
};

fn collapse_whitespace(value: &str) -> String {
    WHITESPACE_REGEX.replace_all(value, " ").trim().to_string()
}

/// Human-readable title for a file or folder name, case preserved.
///
/// Removes a known book/audio extension, underscores, bracketed format tags
/// and a trailing `- Author Name`, then moves a trailing article to the
/// front.
///
/// ```
/// use bindery_naming::display_title;
/// assert_eq!(display_title("Martian, The - Andy Weir.epub"), "The Martian");
/// assert_eq!(display_title("Mr. Mercedes"), "Mr. Mercedes");
/// ```
pub fn display_title(file_name: &str) -> String {
    let name = KNOWN_EXTENSION_REGEX.replace(file_name, "");
    let name = name.replace('_', " ");
    let name = FORMAT_TAG_REGEX.replace_all(&name, " ");
    let name = collapse_whitespace(&name);
    let name = match AUTHOR_SUFFIX_REGEX.find(&name) {
        // Never strip a "suffix" that is the whole name.
        Some(suffix) if suffix.start() > 0 => name[..suffix.start()].to_string(),
        _ => name,
    };
    let name = TRAILING_ARTICLE_REGEX.replace(&name, "$2 $1");
    collapse_whitespace(&name)
}

/// The grouping key for a file or folder name: its [`display_title`],
/// lower-cased.
///
/// ```
/// use bindery_naming::normalize_key;
/// assert_eq!(normalize_key("Silo_(Unabridged) [m4b].m4b"), "silo (unabridged)");
/// assert_eq!(normalize_key("Hobbit, The.epub"), "the hobbit");
/// ```
pub fn normalize_key(file_name: &str) -> String {
    display_title(file_name).to_lowercase()
}

/// Remove edition and format descriptors from a key, along with the empty
/// brackets and dangling separators they leave behind.
///
/// ```
/// use bindery_naming::strip_edition;
/// assert_eq!(strip_edition("silo (unabridged)"), "silo");
/// assert_eq!(strip_edition("dune - 2nd edition"), "dune");
/// ```
pub fn strip_edition(key: &str) -> String {
    let stripped = ORDINAL_EDITION_REGEX.replace_all(key, " ");
    let stripped = EDITION_WORD_REGEX.replace_all(&stripped, " ");
    let mut stripped = collapse_whitespace(&stripped);
    // "(special edition)" collapses to "( )" first; repeat until stable so
    // nested leftovers go too.
    while EMPTY_BRACKETS_REGEX.is_match(&stripped) {
        stripped = collapse_whitespace(&EMPTY_BRACKETS_REGEX.replace_all(&stripped, " "));
    }
    collapse_whitespace(&TRAILING_SEPARATOR_REGEX.replace(&stripped, ""))
}
