use bulkfs_core::{ErrorKind, PathItem};
use bulkfs_walk::{EnumerationOrder, Enumerator};
use std::fs;
use std::path::PathBuf;
use strum::IntoEnumIterator;
use tempfile::TempDir;

/// Builds:
/// ```text
/// tree/
///   b.txt
///   a.txt
///   sub/
///     inner.txt
///     deep/
///       leaf.txt
/// ```
fn build_tree() -> (TempDir, PathItem) {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("tree");
    fs::create_dir_all(root.join("sub/deep")).unwrap();
    fs::write(root.join("b.txt"), b"bb").unwrap();
    fs::write(root.join("a.txt"), b"a").unwrap();
    fs::write(root.join("sub/inner.txt"), b"inner").unwrap();
    fs::write(root.join("sub/deep/leaf.txt"), b"leaf").unwrap();

    let seed = PathItem::seed(&root.to_string_lossy()).unwrap();
    (temp, seed)
}

fn walk(seed: &PathItem, order: EnumerationOrder) -> Vec<PathItem> {
    Enumerator::new(seed, order)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn names(items: &[PathItem]) -> Vec<PathBuf> {
    items.iter().map(|item| item.relative_to_root()).collect()
}

#[test]
fn test_files_then_directories() {
    let (_temp, seed) = build_tree();
    let items = walk(&seed, EnumerationOrder::FilesThenDirectories);

    let expected: Vec<PathBuf> = [
        "tree",
        "tree/a.txt",
        "tree/b.txt",
        "tree/sub",
        "tree/sub/inner.txt",
        "tree/sub/deep",
        "tree/sub/deep/leaf.txt",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();
    assert_eq!(names(&items), expected);
}

#[test]
fn test_directories_then_files() {
    let (_temp, seed) = build_tree();
    let items = walk(&seed, EnumerationOrder::DirectoriesThenFiles);

    let expected: Vec<PathBuf> = [
        "tree",
        "tree/sub",
        "tree/sub/deep",
        "tree/sub/deep/leaf.txt",
        "tree/sub/inner.txt",
        "tree/a.txt",
        "tree/b.txt",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();
    assert_eq!(names(&items), expected);
}

#[test]
fn test_children_then_parent() {
    let (_temp, seed) = build_tree();
    let items = walk(&seed, EnumerationOrder::ChildrenThenParent);

    assert_eq!(items.len(), 7);
    assert_eq!(items.last().unwrap().path(), seed.path());

    // Every directory comes after everything below it.
    for (index, item) in items.iter().enumerate() {
        if !item.is_directory() {
            continue;
        }
        for later in &items[index + 1..] {
            assert!(
                !later.path().starts_with(item.path()),
                "{} yielded after its parent {}",
                later,
                item
            );
        }
    }
}

#[test]
fn test_parent_then_children() {
    let (_temp, seed) = build_tree();
    let items = walk(&seed, EnumerationOrder::ParentThenChildren);

    assert_eq!(items.len(), 7);
    assert_eq!(items[0].path(), seed.path());
    for (index, item) in items.iter().enumerate() {
        if let Some(parent) = item.parent().filter(|p| !p.is_root()) {
            let parent_index = items.iter().position(|i| i == parent).unwrap();
            assert!(parent_index < index);
        }
    }
}

#[test]
fn test_walk_is_repeatable() {
    let (_temp, seed) = build_tree();
    for order in EnumerationOrder::iter() {
        assert_eq!(names(&walk(&seed, order)), names(&walk(&seed, order)));
    }
}

#[test]
fn test_walked_items_are_sized() {
    let (_temp, seed) = build_tree();
    let items = walk(&seed, EnumerationOrder::FilesThenDirectories);

    let total: u64 = items.iter().map(|i| i.queued_size().unwrap()).sum();
    assert_eq!(total, 2 + 1 + 5 + 4);
    assert!(items[0].contents_listed());
}

#[test]
fn test_missing_root_fails() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("gone");
    fs::create_dir(&dir).unwrap();
    let seed = PathItem::seed(&dir.to_string_lossy()).unwrap();
    fs::remove_dir(&dir).unwrap();

    let err = Enumerator::new(&seed, EnumerationOrder::ParentThenChildren)
        .err()
        .unwrap();
    assert_eq!(err.kind, ErrorKind::PathNotFound);
}

#[test]
fn test_file_root() {
    let (temp, _seed) = build_tree();
    let file = temp.path().join("tree/a.txt");
    let seed = PathItem::seed(&file.to_string_lossy()).unwrap();

    let items = walk(&seed, EnumerationOrder::ChildrenThenParent);
    assert_eq!(items, vec![seed]);
}

#[cfg(unix)]
#[test]
fn test_symlinks_are_not_followed() {
    let (temp, seed) = build_tree();
    let outside = temp.path().join("outside");
    fs::create_dir(&outside).unwrap();
    fs::write(outside.join("secret.txt"), b"x").unwrap();
    std::os::unix::fs::symlink(&outside, temp.path().join("tree/link")).unwrap();

    let items = walk(&seed, EnumerationOrder::ParentThenChildren);
    let link = items
        .iter()
        .find(|i| i.relative_path() == "link")
        .unwrap();
    assert!(!link.is_directory());
    assert!(items.iter().all(|i| i.relative_path() != "secret.txt"));
}

#[cfg(unix)]
#[test]
fn test_unreadable_subdirectory_continues() {
    use std::os::unix::fs::PermissionsExt;

    let (temp, seed) = build_tree();
    let locked = temp.path().join("tree/sub");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Root ignores permission bits.
    if fs::read_dir(&locked).is_ok() {
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let results: Vec<_> = Enumerator::new(&seed, EnumerationOrder::FilesThenDirectories)
        .unwrap()
        .collect();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    let ok: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert!(ok.iter().any(|i| i.relative_path() == "a.txt"));
    assert!(ok.iter().any(|i| i.relative_path() == "b.txt"));
    assert!(ok.iter().all(|i| i.relative_path() != "inner.txt"));
}

#[cfg(unix)]
#[test]
fn test_unusable_folder_name_drops_its_contents() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("tree");
    fs::create_dir_all(root.join(" ")).unwrap();
    fs::write(root.join(" /inner.txt"), b"inner").unwrap();
    fs::write(root.join("inner.txt"), b"real").unwrap();
    fs::write(root.join("z.txt"), b"z").unwrap();
    let seed = PathItem::seed(&root.to_string_lossy()).unwrap();

    for order in EnumerationOrder::iter() {
        let results: Vec<_> = Enumerator::new(&seed, order).unwrap().collect();

        let errors: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(errors.len(), 1, "{order}");
        assert_eq!(errors[0].item.path(), root.join(" "));
        assert_eq!(errors[0].error.kind, ErrorKind::PathNotFound);

        let mut paths: Vec<PathBuf> = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|item| item.path().to_path_buf())
            .collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![root.clone(), root.join("inner.txt"), root.join("z.txt")],
            "{order}"
        );
    }
}
