//! Path templating for library file organization.
//!
//! Converts a catalogued book and one of its files into a deterministic path
//! using a user-configured [upon] template. The template syntax follows upon's
//! Mustache-like conventions (`{{ variable }}`, `{{ value|formatter }}`),
//! extended with library-specific formatters and functions:
//!
//! - **`slug`**: Converts strings to URL-safe slugs, stripping quotation marks
//!   first to avoid artifacts like leading/trailing hyphens.
//! - **`truncate`**: Truncates strings to a maximum byte length at a character
//!   boundary, usable as either `truncate(value, n)` or `{{ value|truncate: n }}`.
//!
//! # Template Variables
//!
//! | Variable        | Type             | Description                                       |
//! |-----------------|------------------|---------------------------------------------------|
//! | `book`          | `String`         | The catalog book ID                               |
//! | `title`         | `String`         | Book title (falls back to the primary file name)  |
//! | `series.name`   | `Option<String>` | Series name                                       |
//! | `series.number` | `Option<String>` | Position within the series (`2`, `2.5`)           |
//! | `format`        | `String`         | Format of the file being placed (`epub`, `m4b`)   |
//! | `stem`          | `String`         | Current file name without its extension           |
//! | `author`        | `Option<String>` | Reserved for metadata extractors; currently unset |
//!
//! # Example
//!
//! ```
//! use bindery_library::PathGenerator;
//!
//! let generator: PathGenerator = "{{ series.name|slug }}/{{ title|slug }}".parse().unwrap();
//! assert_eq!(generator.render("Silo", Some("Silo"), None).unwrap(), "silo/silo");
//! ```

use crate::error::{Error, ErrorKind, Result};
use bindery_catalog::{CatalogBook, CatalogFile};
use bindery_naming::display_title;
use bindery_storage::validate_path;
use exn::{OptionExt, ResultExt};
use std::str::FromStr;
use tracing::instrument;
use upon::{Engine, Template};

/// Generates deterministic paths from book metadata and a user-defined
/// template string.
///
/// Constructed via [`FromStr`], which compiles the template eagerly so that
/// syntax errors surface at creation time rather than at render time. The
/// compiled template is reusable across many [`generate`](Self::generate) calls.
///
/// Generated paths are normalized (trimmed, deduplicated separators) and
/// validated by [`bindery_storage::validate_path`] to prevent directory traversal.
pub struct PathGenerator {
    engine: Engine<'static>,
    template: Template<'static>,
}
impl FromStr for PathGenerator {
    type Err = Error;

    /// Registers the `slug` formatter and `truncate` function before compiling,
    /// so both are available in the template. Returns [`ErrorKind::Template`] if
    /// the template syntax is invalid.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut engine = Engine::new();
        addons::configure(&mut engine);
        // Compile the template early so we can fail-fast in construction.
        let template = engine.compile(s.to_string()).or_raise(|| ErrorKind::Template)?;
        Ok(Self { engine, template })
    }
}
impl PathGenerator {
    /// Renders the target path (relative to a root) of one of a book's files.
    ///
    /// Regular files get their format's extension appended; folder-based
    /// units are directories and keep the bare rendered path.
    ///
    /// ```text
    /// "{{ title }}", Silo.m4b          → "Silo.m4b"
    /// "{{ title }}", Silo/ (tracks)    → "Silo"
    /// ```
    #[instrument(skip_all, fields(book = book.id, file = file.id))]
    pub fn generate(&self, book: &CatalogBook, file: &CatalogFile) -> Result<String> {
        let path = self.render_value(Self::parameters(book, file))?;
        match file.folder_based {
            true => Ok(path),
            false => Ok(format!("{path}.{}", file.format.extension())),
        }
    }

    /// Renders the template from a title and optional series alone, without
    /// any file extension. Handy for previews.
    pub fn render(&self, title: &str, series_name: Option<&str>, series_number: Option<f64>) -> Result<String> {
        self.render_value(upon::value! {
            book: "",
            title: title,
            series: upon::value! {
                name: series_name,
                number: series_number.map(format_number),
            },
            format: "",
            stem: title,
            author: Option::<String>::None,
        })
    }

    fn render_value(&self, value: upon::Value) -> Result<String> {
        let path = self
            .template
            .render(&self.engine, value)
            .to_string()
            .or_raise(|| ErrorKind::Template)?;
        Self::normalize(path)
    }

    /// Trims each path segment, drops empty ones (unset optional variables),
    /// joins them with `/`, then validates via [`bindery_storage::validate_path`].
    fn normalize(s: impl Into<String>) -> Result<String> {
        let path = s
            .into()
            .split('/')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        if path.is_empty() {
            exn::bail!(ErrorKind::Template);
        }
        validate_path(&path).or_raise(|| ErrorKind::Template).and_then(|p| {
            p.to_str()
                .map(|p| p.to_string())
                // Infallible: input was String, so won't fail. Here for completeness.
                .ok_or_raise(|| ErrorKind::Template)
        })
    }

    /// Builds the [`upon::Value`] map exposed to the template engine.
    fn parameters(book: &CatalogBook, file: &CatalogFile) -> upon::Value {
        let stem = match file.folder_based {
            true => file.file_name.clone(),
            false => file
                .file_name
                .rsplit_once('.')
                .map(|(stem, _)| stem.to_string())
                .unwrap_or_else(|| file.file_name.clone()),
        };
        // Untitled books are named after their primary file, so that every
        // file of the book lands next to the others.
        let title = book
            .metadata
            .title
            .clone()
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| display_title(&book.primary_file().unwrap_or(file).file_name));
        upon::value! {
            book: book.id.to_string(),
            title: title,
            series: upon::value! {
                name: book.metadata.series_name.clone(),
                number: book.metadata.series_number.map(format_number),
            },
            format: file.format.extension(),
            stem: stem,
            author: Option::<String>::None,
        }
    }
}

/// `2.0` renders as `2`, `2.5` as `2.5`.
fn format_number(number: f64) -> String {
    number.to_string()
}

/// Custom [`upon`] extensions for path-safe string manipulation.
mod addons {
    use rslug::slugify;
    use std::fmt::Write;
    use upon::{Engine, Value, fmt as upon_fmt};

    /// Custom formatter that converts strings to URL-safe slugs.
    ///
    /// Strips quotation marks before slugifying to avoid awkward slug output
    /// like `"hello"` becoming `-hello-`.
    fn slug_formatter(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
        match value {
            Value::String(s) => {
                let marks = [
                    '\u{0027}', '\u{0022}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{201E}', '\u{201B}',
                    '\u{0060}', '\u{00AB}', '\u{00BB}', '\u{2039}', '\u{203A}',
                ];
                let stripped: String = s.chars().filter(|c| !marks.contains(c)).collect();
                write!(f, "{}", slugify!(&stripped))?
            },
            // Unset series and authors render as nothing.
            Value::None => {},
            v => upon_fmt::default(f, v)?,
        };
        Ok(())
    }

    fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> String {
        s[..s.floor_char_boundary(max_bytes)].to_string()
    }

    pub(crate) fn configure(engine: &mut Engine<'_>) {
        engine.add_formatter("slug", slug_formatter);
        engine.add_function("truncate", truncate_to_char_boundary);
        // Optional variables (`series.name`, `author`) are common; an unset
        // one renders as an empty string instead of failing the render.
        engine.set_default_formatter(&optional_formatter);
    }

    fn optional_formatter(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
        match value {
            Value::None => Ok(()),
            v => upon_fmt::default(f, v),
        }
    }
}
