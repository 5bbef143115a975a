// SPDX-License-Identifier: MIT OR Apache-2.0

//! Utility functions for forage

use std::path::{Path, PathBuf};

/// The name of the catalog directory
pub const CATALOG_DIR: &str = ".forage";

/// Result of finding a catalog root
#[derive(Debug)]
pub struct CatalogRoot {
    /// The directory containing the .forage folder
    pub root: PathBuf,
    /// The full path to the .forage folder
    pub catalog_path: PathBuf,
    /// Whether this is the current directory or a parent
    pub is_parent: bool,
}

/// Find the nearest .forage catalog directory by walking up from the given
/// path. Returns None if no .forage directory is found.
pub fn find_catalog_root(start: impl AsRef<Path>) -> Option<CatalogRoot> {
    let mut current = start.as_ref().to_path_buf();

    // Canonicalize to handle relative paths
    if let Ok(canonical) = current.canonicalize() {
        current = canonical;
    }

    let original = current.clone();

    loop {
        let catalog_path = current.join(CATALOG_DIR);
        if catalog_path.exists() && catalog_path.is_dir() {
            return Some(CatalogRoot {
                root: current.clone(),
                catalog_path,
                is_parent: current != original,
            });
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Get the root directory that contains the catalog.
/// Falls back to the given path if no catalog is found.
pub fn get_root_with_catalog(path: impl AsRef<Path>) -> PathBuf {
    match find_catalog_root(&path) {
        Some(root) => root.root,
        None => path.as_ref().to_path_buf(),
    }
}
