// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::pattern::{self, Wildcard};

/// File name pattern of target-files archives.
pub const TARGET_FILES_PATTERN: &str = "*-target_files-*.zip";
/// File name pattern of flashable image archives.
pub const IMAGES_PATTERN: &str = "*-img-*.zip";

#[derive(Debug, Error)]
pub enum Error {
    #[error("No file matching {pattern:?} found in {directory:?}")]
    NotFound { directory: PathBuf, pattern: String },
    #[error("Failed to search directory: {0:?}")]
    Walk(PathBuf, #[source] walkdir::Error),
    #[error("Invalid pattern")]
    Pattern(#[from] pattern::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Recursively search `directory` for non-directory entries whose file name
/// matches `pattern`. The results are in sorted traversal order.
pub fn find_all(directory: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let wildcard = Wildcard::new(pattern)?;
    let mut result = vec![];

    for entry in WalkDir::new(directory).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Walk(directory.to_owned(), e))?;

        if entry.file_type().is_dir() {
            continue;
        }

        if entry
            .file_name()
            .to_str()
            .is_some_and(|n| wildcard.is_match(n))
        {
            result.push(entry.into_path());
        }
    }

    Ok(result)
}

/// Find the archive in `directory` matching `pattern`. If multiple files
/// match, the first one in sorted traversal order is used and the rest are
/// reported in a warning.
pub fn find_archive(directory: &Path, pattern: &str) -> Result<PathBuf> {
    let mut matches = find_all(directory, pattern)?.into_iter();

    let Some(first) = matches.next() else {
        return Err(Error::NotFound {
            directory: directory.to_owned(),
            pattern: pattern.to_owned(),
        });
    };

    let ignored = matches.collect::<Vec<_>>();
    if !ignored.is_empty() {
        warn!("Multiple files match {pattern:?}; using {first:?} and ignoring {ignored:?}");
    }

    debug!("Found {pattern:?}: {first:?}");

    Ok(first)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use assert_matches::assert_matches;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn finds_nested_archive() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("dist/raven");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("raven-target_files-1234.zip"), b"").unwrap();
        fs::write(nested.join("raven-img-1234.zip"), b"").unwrap();

        assert_eq!(
            find_archive(temp_dir.path(), TARGET_FILES_PATTERN).unwrap(),
            nested.join("raven-target_files-1234.zip"),
        );
        assert_eq!(
            find_archive(temp_dir.path(), IMAGES_PATTERN).unwrap(),
            nested.join("raven-img-1234.zip"),
        );
    }

    #[test]
    fn first_match_wins() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("b-img-2.zip"), b"").unwrap();
        fs::write(temp_dir.path().join("a-img-1.zip"), b"").unwrap();

        assert_eq!(
            find_archive(temp_dir.path(), IMAGES_PATTERN).unwrap(),
            temp_dir.path().join("a-img-1.zip"),
        );
    }

    #[test]
    fn missing_archive() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("unrelated.zip"), b"").unwrap();

        assert_matches!(
            find_archive(temp_dir.path(), TARGET_FILES_PATTERN),
            Err(Error::NotFound { .. })
        );
    }
}
