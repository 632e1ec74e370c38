//! Moving books to the paths their naming template gives them.
//!
//! [`relocate_book`] moves every file of one book as a unit: files are staged
//! under hidden names, committed to their targets, and the catalog is updated
//! in a single transaction. Any failure along the way puts every file back
//! where it was.
//!
//! [`organize`] streams the relocation of every book in a library.

pub mod error;
mod relocate;
mod stream;

pub use self::relocate::{Action, relocate_book};
pub use self::stream::{OrganizeEvent, organize};
