use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// Same set of extensions as discovery recognises. Anything else after a dot
// is part of the name ("Mr. Mercedes", "Vol. 2").
regex!(
    KNOWN_EXTENSION_REGEX,
    r"(?i)\.(?:epub|pdf|fb2|mobi|azw3|cbz|cbr|cb7|mp3|m4a|m4b|flac|ogg|opus|aac)$"
);
regex!(
    FORMAT_TAG_REGEX,
    r"(?i)[\[(]\s*(?:pdf|epub|cbz|cbr|cb7|mobi|azw3?|fb2|mp3|m4a|m4b|flac|ogg|opus|aac|audiobook|audio\s*book|ebook|e-book|retail)\s*[\])]"
);
// One to four capitalised words (or initials) after a spaced dash at the end.
regex!(AUTHOR_SUFFIX_REGEX, r"\s+-\s+(?:\p{Lu}[\p{L}'.]*\s*){1,4}$");
regex!(TRAILING_ARTICLE_REGEX, r"(?i)^(.+?),\s*(the|an|a)$");
regex!(WHITESPACE_REGEX, r"\s+");

regex!(ORDINAL_EDITION_REGEX, r"(?i)\b\d+(?:st|nd|rd|th)\s+(?:anniversary\s+)?edition\b");
regex!(
    EDITION_WORD_REGEX,
    r"(?i)\b(?:anniversary|special|collector'?s|deluxe|definitive|illustrated|revised|expanded|remastered|unabridged|abridged|audiobook|ebook|edition)\b"
);
regex!(EMPTY_BRACKETS_REGEX, r"[\[(]\s*[\])]");
regex!(TRAILING_SEPARATOR_REGEX, r"[\s\-_:,.]+$");

regex!(
    SERIES_REGEX,
    r"(?i)^(?P<base>.*?)[\s,:\-(\[]*(?:\b(?:book|bk|volume|vol|part|pt)\.?\s*|#\s*)(?P<number>\d+(?:\.\d+)?)\b"
);
regex!(TRAILING_NUMBER_REGEX, r"(\d+)\s*$");
