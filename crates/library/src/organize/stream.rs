use crate::Context;
use crate::error::{ErrorKind as LibraryErrorKind, Result as LibraryResult};
use crate::library::Library;
use crate::organize::error::{ErrorKind as OrganizeErrorKind, Result as OrganizeResult};
use crate::organize::relocate::{Action, relocate_book};
use async_stream::stream;
use bindery_storage::RootId;
use exn::ResultExt;
use futures::Stream;

/// Progress events emitted by [`organize`] as it works through a library's
/// books.
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started), exactly once.
/// 2. [`DiscoveryComplete`](Self::DiscoveryComplete), exactly once, with the
///    number of books that have files.
/// 3. [`Relocated`](Self::Relocated), zero or more times, one per book.
/// 4. [`Complete`](Self::Complete), exactly once.
///
/// Failing to read the catalog terminates the stream early, in which case
/// [`Complete`](Self::Complete) is never emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrganizeEvent {
    Started,
    DiscoveryComplete(u64),
    /// A book was relocated, or was already in place.
    Relocated(Action),
    Complete,
}

/// Streams [`OrganizeEvent`]s while relocating every book of `library` to
/// its template-derived path.
///
/// Books go to `target_root` when given, otherwise they stay on the root
/// their primary file is on. Books are relocated one at a time: moves of
/// different books may share directories, and the watcher is paused per
/// book. A failing book is surfaced as an `Err` item without terminating the
/// stream.
pub fn organize<'a>(
    ctx: &'a Context,
    library: &'a Library,
    target_root: Option<RootId>,
) -> impl Stream<Item = LibraryResult<OrganizeEvent>> + 'a {
    // `rustfmt` does not format macro-specific syntax such as
    // `for await` even using the parentheses trick.
    stream! {
        for await event in organize_inner(ctx, library, target_root) {
            yield event.or_raise(|| LibraryErrorKind::Organize);
        }
    }
}

fn organize_inner<'a>(
    ctx: &'a Context,
    library: &'a Library,
    target_root: Option<RootId>,
) -> impl Stream<Item = OrganizeResult<OrganizeEvent>> + 'a {
    // `rustfmt` does not format macros that use braces. Wrap in parentheses!
    stream!({
        yield Ok(OrganizeEvent::Started);

        let books = match ctx.catalog.find_by_library(library.id).await.or_raise(|| OrganizeErrorKind::Catalog) {
            Ok(books) => books.into_iter().filter(|book| book.has_files()).collect::<Vec<_>>(),
            Err(e) => {
                yield Err(e);
                return;
            },
        };
        yield Ok(OrganizeEvent::DiscoveryComplete(u64::try_from(books.len()).unwrap_or(u64::MAX)));

        for book in &books {
            let Some(root) = target_root.or_else(|| book.primary_file().map(|file| file.root_id)) else {
                yield Err(exn::Exn::from(OrganizeErrorKind::NoFiles));
                continue;
            };
            yield relocate_book(ctx, library, book, root).await.map(OrganizeEvent::Relocated);
        }

        yield Ok(OrganizeEvent::Complete);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::Scanner;
    use crate::testing::fixture;
    use bindery_config::GroupingStrategy;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_organize_library() {
        let mut fixture = fixture(
            &["incoming/silo.epub", "incoming/silo.pdf", "Dune.epub", "Books/Wool.epub"],
            GroupingStrategy::AutoDetect,
        )
        .await;
        fixture.ctx.template = "Books/{{ title }}".parse().unwrap();
        Scanner::new(&fixture.ctx).scan_library(&fixture.library).await.unwrap();
        // A book whose primary file has gone missing fails on its own.
        fixture.remove("Dune.epub");

        let events: Vec<_> = organize(&fixture.ctx, &fixture.library, None).collect().await;
        assert_eq!(events.len(), 6);
        assert!(matches!(&events[0], Ok(OrganizeEvent::Started)));
        assert!(matches!(&events[1], Ok(OrganizeEvent::DiscoveryComplete(3))));
        assert!(matches!(&events[5], Ok(OrganizeEvent::Complete)));

        let outcomes = &events[2..5];
        let failed = outcomes.iter().filter(|event| event.is_err()).count();
        let relocated = outcomes
            .iter()
            .filter(|event| matches!(event, Ok(OrganizeEvent::Relocated(Action::Relocated { files: 2, .. }))))
            .count();
        let in_place = outcomes
            .iter()
            .filter(|event| matches!(event, Ok(OrganizeEvent::Relocated(Action::AlreadyCorrect(_)))))
            .count();
        assert_eq!((failed, relocated, in_place), (1, 1, 1));

        assert!(fixture.exists("Books/silo.epub"));
        assert!(fixture.exists("Books/silo.pdf"));
        assert!(fixture.exists("Books/Wool.epub"));
    }
}
