//! Grouping of discovered files into books.
//!
//! Used for every file that could not be matched to an existing book: on the
//! first scan of a library that is all of them. Files are always bucketed by
//! `(root, sub-path)` first, so two files in different folders never end up
//! in the same book.
//!
//! Under [`GroupingStrategy::AutoDetect`] each folder is then split again by
//! comparing its files against the folder's own name:
//!
//! 1. a numbered series entry whose base title matches the folder name gets a
//!    group of its own per number (`Silo/Silo Book 2.m4b`),
//! 2. a file whose key matches the folder name joins the folder's group, split
//!    by trailing number (`Silo/Silo (Unabridged).m4b` with `Silo/Silo.epub`),
//! 3. everything else is clustered by key similarity.
//!
//! Files at the root of a library are only ever grouped by exact key: a loose
//! root is usually a pile of unrelated books, where fuzzy merging does more
//! harm than good.

use bindery_config::GroupingStrategy;
use bindery_naming::{extract_series_info, normalize_key, similarity, strip_edition, trailing_number};
use bindery_storage::{DiscoveredFile, RootId};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// A file joins its folder's group when its key is this similar to the folder name.
const FOLDER_MATCH_THRESHOLD: f64 = 0.6;
/// Two leftover files in the same folder are clustered at this similarity.
const CLUSTER_THRESHOLD: f64 = 0.7;

/// Opaque identity of a group within one grouping call. Never stored.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    root_id: RootId,
    sub_path: String,
    label: String,
}
impl Display for GroupKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}:{}#{}", self.root_id, self.sub_path, self.label)
    }
}

/// Groups in a stable order; members are sorted by location.
pub type Groups = BTreeMap<GroupKey, Vec<DiscoveredFile>>;

/// Comparable forms of a file name.
pub(crate) struct Keys {
    /// Output of [`normalize_key`]
    pub(crate) key: String,
    /// Edition-stripped key, or the plain key when stripping leaves nothing
    /// ("Special.epub").
    pub(crate) stripped: String,
}
impl Keys {
    pub(crate) fn new(name: &str) -> Self {
        let key = normalize_key(name);
        let stripped = match strip_edition(&key) {
            stripped if stripped.is_empty() => key.clone(),
            stripped => stripped,
        };
        Self { key, stripped }
    }
}

/// Group files into candidate books.
///
/// The result depends only on the set of files given, not on their order.
pub fn group_files(files: &[DiscoveredFile], strategy: GroupingStrategy) -> Groups {
    let mut folders: BTreeMap<(RootId, &str), Vec<&DiscoveredFile>> = BTreeMap::new();
    for file in files {
        folders.entry((file.root_id, file.sub_path.as_str())).or_default().push(file);
    }

    let mut groups = Groups::new();
    for ((root_id, sub_path), mut members) in folders {
        members.sort();
        let labelled = match (sub_path.is_empty(), strategy) {
            (true, _) => by_exact_key(&members),
            (false, GroupingStrategy::BookPerFolder) => members.iter().map(|file| (String::new(), *file)).collect(),
            (false, GroupingStrategy::AutoDetect) => by_folder(folder_name(sub_path), &members),
        };
        for (label, file) in labelled {
            let key = GroupKey {
                root_id,
                sub_path: sub_path.to_string(),
                label,
            };
            groups.entry(key).or_default().push(file.clone());
        }
    }
    for members in groups.values_mut() {
        members.sort();
    }
    tracing::debug!(files = files.len(), groups = groups.len(), ?strategy, "Grouped files");
    groups
}

fn folder_name(sub_path: &str) -> &str {
    sub_path.rsplit('/').next().unwrap_or(sub_path)
}

fn by_exact_key<'a>(members: &[&'a DiscoveredFile]) -> Vec<(String, &'a DiscoveredFile)> {
    members
        .iter()
        .map(|file| (format!("key:{}", normalize_key(&file.file_name)), *file))
        .collect()
}

/// Exact, substring (either direction) or similar enough.
fn matches_folder(key: &str, folder: &str) -> bool {
    key == folder || key.contains(folder) || folder.contains(key) || similarity(key, folder) >= FOLDER_MATCH_THRESHOLD
}

fn by_folder<'a>(folder: &str, members: &[&'a DiscoveredFile]) -> Vec<(String, &'a DiscoveredFile)> {
    let folder = Keys::new(folder).stripped;
    let mut labelled = Vec::with_capacity(members.len());
    let mut leftovers = Vec::new();

    for file in members {
        let keys = Keys::new(&file.file_name);
        if let Some(series) = extract_series_info(&keys.key)
            && matches_folder(&strip_edition(&series.base_title), &folder)
        {
            labelled.push((format!("series:{}", series.number), *file));
            continue;
        }
        if matches_folder(&keys.stripped, &folder) {
            let label = match trailing_number(&keys.stripped) {
                Some(number) => format!("folder:{number}"),
                None => "folder".to_string(),
            };
            labelled.push((label, *file));
            continue;
        }
        leftovers.push((keys, *file));
    }

    let mut clusters = DisjointSet::new(leftovers.len());
    for i in 0..leftovers.len() {
        for j in (i + 1)..leftovers.len() {
            if should_cluster(&leftovers[i].0.stripped, &leftovers[j].0.stripped) {
                clusters.union(i, j);
            }
        }
    }
    // Name each cluster after its smallest key: unique, since equal keys
    // always end up in the same cluster.
    let mut names: BTreeMap<usize, &str> = BTreeMap::new();
    for (i, (keys, _)) in leftovers.iter().enumerate() {
        let name = names.entry(clusters.find(i)).or_insert(keys.stripped.as_str());
        if keys.stripped.as_str() < *name {
            *name = keys.stripped.as_str();
        }
    }
    for (i, (_, file)) in leftovers.iter().enumerate() {
        let name = names.get(&clusters.find(i)).copied().unwrap_or_default();
        labelled.push((format!("cluster:{name}"), *file));
    }
    labelled
}

fn should_cluster(a: &str, b: &str) -> bool {
    if let (Some(x), Some(y)) = (trailing_number(a), trailing_number(b))
        && x != y
    {
        return false;
    }
    a.contains(b) || b.contains(a) || similarity(a, b) >= CLUSTER_THRESHOLD
}

/// Union-find over indices.
struct DisjointSet {
    parent: Vec<usize>,
}
impl DisjointSet {
    fn new(len: usize) -> Self {
        Self { parent: (0..len).collect() }
    }

    fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = i;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a != b {
            // Lower index wins, keeping roots stable.
            self.parent[a.max(b)] = a.min(b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindery_storage::BookFormat;
    use rstest::rstest;

    fn file(path: &str) -> DiscoveredFile {
        let (sub_path, file_name) = match path.rsplit_once('/') {
            Some((sub_path, file_name)) => (sub_path.to_string(), file_name.to_string()),
            None => (String::new(), path.to_string()),
        };
        DiscoveredFile {
            root_id: 1,
            format: BookFormat::from_path(&file_name).unwrap_or(BookFormat::M4b),
            folder_based: BookFormat::from_path(&file_name).is_none(),
            sub_path,
            file_name,
            size: 1,
        }
    }

    /// Membership only, as sorted lists of paths.
    fn membership(groups: &Groups) -> Vec<Vec<String>> {
        let mut membership: Vec<Vec<String>> = groups
            .values()
            .map(|members| members.iter().map(|f| f.path_key().to_string()).collect())
            .collect();
        membership.sort();
        membership
    }

    fn group_paths(paths: &[&str], strategy: GroupingStrategy) -> Vec<Vec<String>> {
        let files: Vec<_> = paths.iter().map(|p| file(p)).collect();
        membership(&group_files(&files, strategy))
    }

    #[test]
    fn test_folder_centric_grouping() {
        let groups = group_paths(
            &["Silo/Silo (Unabridged).m4b", "Silo/Silo.epub", "Silo/Silo Book 2.m4b"],
            GroupingStrategy::AutoDetect,
        );
        assert_eq!(
            groups,
            vec![
                vec!["1:Silo/Silo (Unabridged).m4b".to_string(), "1:Silo/Silo.epub".to_string()],
                vec!["1:Silo/Silo Book 2.m4b".to_string()],
            ]
        );
    }

    #[test]
    fn test_no_fuzzy_merging_at_root() {
        let groups = group_paths(&["Dune.epub", "Dune (1965).pdf", "dune.pdf"], GroupingStrategy::AutoDetect);
        assert_eq!(
            groups,
            vec![
                vec!["1:Dune (1965).pdf".to_string()],
                vec!["1:Dune.epub".to_string(), "1:dune.pdf".to_string()],
            ]
        );
    }

    #[test]
    fn test_folders_never_merge() {
        let groups = group_paths(&["A/Silo.epub", "B/Silo.epub"], GroupingStrategy::AutoDetect);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_folder_split_by_trailing_number() {
        let groups = group_paths(
            &["Wool/Wool 1.epub", "Wool/Wool 1.m4b", "Wool/Wool 2.epub"],
            GroupingStrategy::AutoDetect,
        );
        assert_eq!(
            groups,
            vec![
                vec!["1:Wool/Wool 1.epub".to_string(), "1:Wool/Wool 1.m4b".to_string()],
                vec!["1:Wool/Wool 2.epub".to_string()],
            ]
        );
    }

    #[test]
    fn test_leftovers_cluster_by_similarity() {
        let groups = group_paths(
            &[
                "Sci-Fi/Project Hail Mary.epub",
                "Sci-Fi/Project Hail Mary (Audiobook).m4b",
                "Sci-Fi/The Martian.epub",
                "Sci-Fi/Martian, The.pdf",
                "Sci-Fi/Artemis 1.epub",
                "Sci-Fi/Artemis 2.epub",
            ],
            GroupingStrategy::AutoDetect,
        );
        assert_eq!(
            groups,
            vec![
                vec!["1:Sci-Fi/Artemis 1.epub".to_string()],
                vec!["1:Sci-Fi/Artemis 2.epub".to_string()],
                vec!["1:Sci-Fi/Martian, The.pdf".to_string(), "1:Sci-Fi/The Martian.epub".to_string()],
                vec![
                    "1:Sci-Fi/Project Hail Mary (Audiobook).m4b".to_string(),
                    "1:Sci-Fi/Project Hail Mary.epub".to_string(),
                ],
            ]
        );
    }

    #[test]
    fn test_book_per_folder() {
        let groups = group_paths(
            &["Misc/Silo.epub", "Misc/Dune.epub", "Dune.epub", "Dune (1965).pdf"],
            GroupingStrategy::BookPerFolder,
        );
        assert_eq!(
            groups,
            vec![
                vec!["1:Dune (1965).pdf".to_string()],
                vec!["1:Dune.epub".to_string()],
                vec!["1:Misc/Dune.epub".to_string(), "1:Misc/Silo.epub".to_string()],
            ]
        );
    }

    #[rstest]
    #[case::auto(GroupingStrategy::AutoDetect)]
    #[case::per_folder(GroupingStrategy::BookPerFolder)]
    fn test_grouping_is_order_independent(#[case] strategy: GroupingStrategy) {
        let paths = [
            "Silo/Silo (Unabridged).m4b",
            "Silo/Silo.epub",
            "Silo/Silo Book 2.m4b",
            "Sci-Fi/Project Hail Mary.epub",
            "Sci-Fi/Project Hail Mary (Audiobook).m4b",
            "Sci-Fi/The Martian.epub",
            "Dune.epub",
            "Dune (1965).pdf",
        ];
        let forward: Vec<_> = paths.iter().map(|p| file(p)).collect();
        let mut backward = forward.clone();
        backward.reverse();
        let mut shuffled = forward.clone();
        shuffled.swap(0, 5);
        shuffled.swap(2, 7);
        let expected = group_files(&forward, strategy);
        assert_eq!(group_files(&backward, strategy), expected);
        assert_eq!(group_files(&shuffled, strategy), expected);
    }

    #[test]
    fn test_disjoint_set() {
        let mut set = DisjointSet::new(5);
        set.union(3, 4);
        set.union(4, 1);
        assert_eq!(set.find(3), 1);
        assert_eq!(set.find(4), 1);
        assert_ne!(set.find(0), set.find(1));
        assert_eq!(set.find(2), 2);
    }
}
