// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
};

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::stream;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to walk directory: {0:?}")]
    Walk(PathBuf, #[source] walkdir::Error),
    #[error("Failed to create directory: {0:?}")]
    CreateDir(PathBuf, #[source] io::Error),
    #[error("Failed to copy {0:?} -> {1:?}")]
    Copy(PathBuf, PathBuf, #[source] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Recursively copy `source` into `target`. Symlinks are followed and copied
/// as regular files or directories. Any entry named `exclude`, at any depth,
/// is skipped along with everything below it. Existing files in `target` are
/// overwritten. Returns the number of copied files.
pub fn mirror_dir(
    source: &Path,
    target: &Path,
    exclude: &str,
    cancel_signal: &AtomicBool,
) -> Result<u64> {
    let walker = WalkDir::new(source)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != exclude);

    let mut count = 0;

    for entry in walker {
        let entry = entry.map_err(|e| Error::Walk(source.to_owned(), e))?;
        let Ok(relative_path) = entry.path().strip_prefix(source) else {
            continue;
        };
        let output_path = target.join(relative_path);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&output_path).map_err(|e| Error::CreateDir(output_path, e))?;
            continue;
        }

        stream::check_cancel(cancel_signal)
            .map_err(|e| Error::Copy(entry.path().to_owned(), output_path.clone(), e))?;

        debug!("Copying {:?} -> {output_path:?}", entry.path());

        fs::copy(entry.path(), &output_path)
            .map_err(|e| Error::Copy(entry.path().to_owned(), output_path, e))?;

        count += 1;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn excludes_logs_at_any_depth() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("device");
        let target = temp_dir.path().join("out");

        fs::create_dir_all(source.join("logs")).unwrap();
        fs::create_dir_all(source.join("sub/logs")).unwrap();
        fs::write(source.join("logs/build.log"), "log").unwrap();
        fs::write(source.join("sub/logs/build.log"), "log").unwrap();
        fs::write(source.join("sub/file.txt"), "file").unwrap();
        fs::write(source.join("top.txt"), "top").unwrap();

        let cancel_signal = AtomicBool::new(false);
        let n = mirror_dir(&source, &target, "logs", &cancel_signal).unwrap();

        assert_eq!(n, 2);
        assert_eq!(fs::read_to_string(target.join("top.txt")).unwrap(), "top");
        assert_eq!(fs::read_to_string(target.join("sub/file.txt")).unwrap(), "file");
        assert!(!target.join("logs").exists());
        assert!(!target.join("sub/logs").exists());
    }

    #[cfg(unix)]
    #[test]
    fn follows_symlinks() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("device");
        let target = temp_dir.path().join("out");
        let real = temp_dir.path().join("real.zip");

        fs::create_dir_all(&source).unwrap();
        fs::write(&real, "contents").unwrap();
        std::os::unix::fs::symlink(&real, source.join("link.zip")).unwrap();

        let cancel_signal = AtomicBool::new(false);
        mirror_dir(&source, &target, "logs", &cancel_signal).unwrap();

        let metadata = fs::symlink_metadata(target.join("link.zip")).unwrap();
        assert!(metadata.file_type().is_file());
        assert_eq!(
            fs::read_to_string(target.join("link.zip")).unwrap(),
            "contents",
        );
    }
}
