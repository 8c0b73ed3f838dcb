// SPDX-License-Identifier: MIT

use crate::{
    core::{errors::*, utils::path_utils::split_path},
    fs::fat32::tree::{DirectoryNode, DirectoryTree},
};

/// What the last path component is allowed to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    File,
    Dir,
    Any,
}

impl Lookup {
    fn accepts(self, node: &DirectoryNode) -> bool {
        match self {
            Lookup::File => !node.is_dir,
            Lookup::Dir => node.is_dir,
            Lookup::Any => true,
        }
    }
}

/// Resolves `path` to a single node.
pub fn resolve<'t>(tree: &'t DirectoryTree, path: &str, want: Lookup) -> FsResolverResult<&'t DirectoryNode> {
    let chain = resolve_chain(tree, path, want)?;
    chain.last().copied().ok_or(FsResolverError::Other("Empty ancestor chain"))
}

/// Resolves `path` to its ancestor chain: the root first, the target last.
///
/// Every intermediate component must be a directory; names match exactly.
/// Any miss fails the whole lookup.
pub fn resolve_chain<'t>(
    tree: &'t DirectoryTree,
    path: &str,
    want: Lookup,
) -> FsResolverResult<Vec<&'t DirectoryNode>> {
    let components = split_path(path);
    let mut chain = Vec::with_capacity(components.len() + 1);
    let mut current = tree.root();
    chain.push(current);

    for (i, name) in components.iter().enumerate() {
        let is_last = i + 1 == components.len();
        let next = tree.find_child(current, name).ok_or(FsResolverError::NotFound)?;

        if !is_last && !next.is_dir {
            return Err(FsResolverError::WrongKind);
        }
        chain.push(next);
        current = next;
    }

    if !want.accepts(current) {
        return Err(FsResolverError::WrongKind);
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::fat32::test_utils::*;

    fn sample_tree() -> DirectoryTree {
        let mut image = formatted_image();
        let mut vol = mount(&mut image);
        vol.copy_from_host("/a.txt", &mut &b"x"[..], 1).unwrap();
        vol.tree().clone()
    }

    fn tree_with_dirs() -> DirectoryTree {
        let mut image = image_with_dirs(&["docs", "docs/deep"]);
        let mut vol = mount(&mut image);
        vol.copy_from_host("/docs/deep/readme.md", &mut &b"y"[..], 1).unwrap();
        vol.copy_from_host("/top.txt", &mut &b"z"[..], 1).unwrap();
        vol.tree().clone()
    }

    #[test]
    fn root_and_empty_paths() {
        let tree = sample_tree();
        for path in ["", "/", "//"] {
            let node = resolve(&tree, path, Lookup::Dir).unwrap();
            assert!(node.is_root());
            assert_eq!(resolve_chain(&tree, path, Lookup::Any).unwrap().len(), 1);
        }
        assert_eq!(resolve(&tree, "/", Lookup::File).unwrap_err(), FsResolverError::WrongKind);
    }

    #[test]
    fn resolves_nested_paths() {
        let tree = tree_with_dirs();
        let chain = resolve_chain(&tree, "/docs/deep/readme.md", Lookup::File).unwrap();
        let names: Vec<&str> = chain.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["", "docs", "deep", "readme.md"]);

        let node = resolve(&tree, "docs//deep/", Lookup::Dir).unwrap();
        assert_eq!(node.name, "deep");
        assert!(resolve(&tree, "/top.txt", Lookup::Any).is_ok());
    }

    #[test]
    fn misses_are_terminal() {
        let tree = tree_with_dirs();
        assert_eq!(
            resolve(&tree, "/docs/missing/readme.md", Lookup::Any).unwrap_err(),
            FsResolverError::NotFound
        );
        assert_eq!(
            resolve(&tree, "/top.txt/readme.md", Lookup::Any).unwrap_err(),
            FsResolverError::WrongKind
        );
        assert_eq!(resolve(&tree, "/docs", Lookup::File).unwrap_err(), FsResolverError::WrongKind);
        // Names match exactly.
        assert_eq!(resolve(&tree, "/TOP.TXT", Lookup::Any).unwrap_err(), FsResolverError::NotFound);
    }
}
