// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;
use zip::{CompressionMethod, ZipArchive, ZipWriter, result::ZipError, write::SimpleFileOptions};

use crate::{
    pattern::{self, Wildcard},
    stream, util,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to open archive: {0:?}")]
    Open(PathBuf, #[source] io::Error),
    #[error("Failed to read archive: {0:?}")]
    Read(PathBuf, #[source] ZipError),
    #[error("Failed to extract entry {1:?} from archive: {0:?}")]
    Extract(PathBuf, String, #[source] io::Error),
    #[error("Entry has an unsafe path: {0:?}")]
    UnsafePath(String),
    #[error("Pattern {pattern:?} matched nothing in archive: {archive:?}")]
    NoMatch { archive: PathBuf, pattern: String },
    #[error("Invalid pattern")]
    Pattern(#[from] pattern::Error),
    #[error("Failed to walk directory: {0:?}")]
    Walk(PathBuf, #[source] walkdir::Error),
    #[error("Path cannot be stored in an archive: {0:?}")]
    UnsupportedPath(PathBuf),
    #[error("Failed to add {1:?} to archive: {0:?}")]
    Add(PathBuf, PathBuf, #[source] io::Error),
    #[error("Failed to write archive: {0:?}")]
    Write(PathBuf, #[source] ZipError),
    #[error("Failed to create archive: {0:?}")]
    Create(PathBuf, #[source] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Entries at or above this size need the zip64 extensions.
const ZIP64_THRESHOLD: u64 = 0xffffffff;

/// A zip archive opened for reading. Only supports what is needed for pulling
/// individual files out of Android build artifacts.
#[derive(Debug)]
pub struct Archive {
    path: PathBuf,
    inner: ZipArchive<BufReader<File>>,
}

impl Archive {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::Open(path.to_owned(), e))?;
        let inner = ZipArchive::new(BufReader::new(file))
            .map_err(|e| Error::Read(path.to_owned(), e))?;

        Ok(Self {
            path: path.to_owned(),
            inner,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Iterate over entry names in the order they appear in the archive.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.file_names()
    }

    /// Check if an entry with the exact name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.names().any(|n| n == name)
    }

    /// Check if at least one entry matches `pattern`.
    pub fn contains_match(&self, pattern: &Wildcard) -> bool {
        self.names().any(|n| pattern.is_match(n))
    }

    /// Extract every entry matching at least one of `patterns` into
    /// `directory`, overwriting existing files. Every pattern must match at
    /// least one entry. Returns the number of extracted entries.
    pub fn extract(
        &mut self,
        patterns: &[impl AsRef<str>],
        directory: &Path,
        cancel_signal: &AtomicBool,
    ) -> Result<usize> {
        let wildcards = pattern::compile_all(patterns)?;
        let mut matched = vec![false; wildcards.len()];

        let count = self.extract_filtered(
            |name| {
                let mut any = false;

                for (wildcard, m) in wildcards.iter().zip(matched.iter_mut()) {
                    if wildcard.is_match(name) {
                        *m = true;
                        any = true;
                    }
                }

                any
            },
            directory,
            cancel_signal,
        )?;

        if let Some(index) = matched.iter().position(|m| !m) {
            return Err(Error::NoMatch {
                archive: self.path.clone(),
                pattern: wildcards[index].as_str().to_owned(),
            });
        }

        Ok(count)
    }

    /// Extract every entry into `directory`.
    pub fn extract_all(&mut self, directory: &Path, cancel_signal: &AtomicBool) -> Result<usize> {
        self.extract_filtered(|_| true, directory, cancel_signal)
    }

    fn extract_filtered(
        &mut self,
        mut filter: impl FnMut(&str) -> bool,
        directory: &Path,
        cancel_signal: &AtomicBool,
    ) -> Result<usize> {
        let mut count = 0;

        for index in 0..self.inner.len() {
            let mut entry = self
                .inner
                .by_index(index)
                .map_err(|e| Error::Read(self.path.clone(), e))?;
            let name = entry.name().to_owned();

            if !filter(&name) {
                continue;
            }

            let relative_path = entry
                .enclosed_name()
                .map(|p| p.to_path_buf())
                .ok_or_else(|| Error::UnsafePath(name.clone()))?;
            let output_path = directory.join(relative_path);

            debug!("Extracting {name:?} -> {output_path:?}");

            let extract_err = |e| Error::Extract(self.path.clone(), name.clone(), e);

            if entry.is_dir() {
                fs::create_dir_all(&output_path).map_err(extract_err)?;
                count += 1;
                continue;
            }

            let parent = util::parent_path(&output_path);
            fs::create_dir_all(parent).map_err(extract_err)?;

            // A previously extracted copy may be read-only.
            match fs::remove_file(&output_path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(extract_err(e)),
                _ => {}
            }

            let mut writer = File::create(&output_path)
                .map(BufWriter::new)
                .map_err(extract_err)?;
            stream::copy(&mut entry, &mut writer, cancel_signal).map_err(extract_err)?;
            writer.flush().map_err(extract_err)?;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::{fs::Permissions, os::unix::fs::PermissionsExt};

                fs::set_permissions(&output_path, Permissions::from_mode(mode & 0o7777))
                    .map_err(extract_err)?;
            }

            count += 1;
        }

        Ok(count)
    }
}

/// Archive the contents of `directory` into `output` with entry names relative
/// to `directory`. If `output` is inside `directory`, it is never added to
/// itself. The archive is written to a temporary file next to `output` and
/// only moved into place once it is complete.
pub fn create_from_dir(
    directory: &Path,
    output: &Path,
    cancel_signal: &AtomicBool,
) -> Result<()> {
    let mut inputs = vec![];

    for entry in WalkDir::new(directory).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Walk(directory.to_owned(), e))?;

        if entry.path() == output {
            continue;
        }

        let relative_path = entry
            .path()
            .strip_prefix(directory)
            .ok()
            .and_then(util::archive_path)
            .ok_or_else(|| Error::UnsupportedPath(entry.path().to_owned()))?;

        inputs.push((entry.into_path(), relative_path));
    }

    let create_err = |e| Error::Create(output.to_owned(), e);
    let temp_file = NamedTempFile::with_prefix_in(".mixbuild", util::parent_path(output))
        .map_err(create_err)?;
    let mut zip_writer = ZipWriter::new(BufWriter::new(temp_file));

    for (path, name) in inputs {
        let add_err = |e| Error::Add(output.to_owned(), path.clone(), e);
        let metadata = fs::metadata(&path).map_err(add_err)?;

        #[allow(unused_mut)]
        let mut options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(metadata.len() >= ZIP64_THRESHOLD);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            options = options.unix_permissions(metadata.permissions().mode() & 0o7777);
        }

        if metadata.is_dir() {
            zip_writer
                .add_directory(format!("{name}/"), options)
                .map_err(|e| Error::Write(output.to_owned(), e))?;
            continue;
        }

        debug!("Adding {path:?} as {name:?}");

        zip_writer
            .start_file(name, options)
            .map_err(|e| Error::Write(output.to_owned(), e))?;

        let reader = File::open(&path).map_err(add_err)?;
        stream::copy(reader, &mut zip_writer, cancel_signal).map_err(add_err)?;
    }

    let buf_writer = zip_writer
        .finish()
        .map_err(|e| Error::Write(output.to_owned(), e))?;
    let temp_file = buf_writer
        .into_inner()
        .map_err(|e| create_err(e.into_error()))?;

    temp_file
        .persist(output)
        .map_err(|e| create_err(e.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{fs, io::Write, sync::atomic::AtomicBool};

    use assert_matches::assert_matches;
    use tempfile::TempDir;
    use zip::{ZipWriter, write::SimpleFileOptions};

    use super::*;

    fn build_archive(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);

        for (name, data) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }

        writer.finish().unwrap();
    }

    #[test]
    fn extract_matching_entries() {
        let temp_dir = TempDir::new().unwrap();
        let zip_path = temp_dir.path().join("aosp-target_files-1.zip");
        build_archive(
            &zip_path,
            &[
                ("IMAGES/system.img", b"system"),
                ("IMAGES/vendor.img", b"vendor"),
                ("META/misc_info.txt", b"misc"),
                ("META/ab_partitions.txt", b"ab"),
            ],
        );

        let output = temp_dir.path().join("out");
        let cancel_signal = AtomicBool::new(false);
        let mut archive = Archive::open(&zip_path).unwrap();

        let n = archive
            .extract(&["IMAGES/system.img", "META/*"], &output, &cancel_signal)
            .unwrap();

        assert_eq!(n, 3);
        assert_eq!(fs::read(output.join("IMAGES/system.img")).unwrap(), b"system");
        assert_eq!(fs::read(output.join("META/misc_info.txt")).unwrap(), b"misc");
        assert!(!output.join("IMAGES/vendor.img").exists());
    }

    #[test]
    fn extract_requires_every_pattern() {
        let temp_dir = TempDir::new().unwrap();
        let zip_path = temp_dir.path().join("a.zip");
        build_archive(&zip_path, &[("IMAGES/system.img", b"system")]);

        let cancel_signal = AtomicBool::new(false);
        let mut archive = Archive::open(&zip_path).unwrap();

        assert_matches!(
            archive.extract(
                &["IMAGES/system.img", "IMAGES/product.img"],
                temp_dir.path(),
                &cancel_signal,
            ),
            Err(Error::NoMatch { pattern, .. }) if pattern == "IMAGES/product.img"
        );
    }

    #[cfg(unix)]
    #[test]
    fn extract_replaces_read_only_file() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("original.zip");
        let patched = temp_dir.path().join("patched.zip");
        build_archive(&original, &[("IMAGES/system.img", b"original")]);
        build_archive(&patched, &[("IMAGES/system.img", b"patched")]);

        let output = temp_dir.path().join("out");
        let cancel_signal = AtomicBool::new(false);

        Archive::open(&original)
            .unwrap()
            .extract(&["IMAGES/system.img"], &output, &cancel_signal)
            .unwrap();

        let system_img = output.join("IMAGES/system.img");
        fs::set_permissions(&system_img, fs::Permissions::from_mode(0o444)).unwrap();

        Archive::open(&patched)
            .unwrap()
            .extract(&["IMAGES/system.img"], &output, &cancel_signal)
            .unwrap();

        assert_eq!(fs::read(&system_img).unwrap(), b"patched");
    }

    #[test]
    fn open_missing_archive() {
        let temp_dir = TempDir::new().unwrap();

        assert_matches!(
            Archive::open(&temp_dir.path().join("missing.zip")),
            Err(Error::Open(_, _))
        );
    }

    #[test]
    fn create_excludes_itself() {
        let temp_dir = TempDir::new().unwrap();
        let images = temp_dir.path().join("images");
        fs::create_dir_all(images.join("sub")).unwrap();
        fs::write(images.join("system.img"), b"system").unwrap();
        fs::write(images.join("sub/extra.txt"), b"extra").unwrap();
        // Stale output from a previous run.
        fs::write(images.join("mixed.zip"), b"stale").unwrap();

        let output = images.join("mixed.zip");
        let cancel_signal = AtomicBool::new(false);
        create_from_dir(&images, &output, &cancel_signal).unwrap();

        let archive = Archive::open(&output).unwrap();
        let mut names = archive.names().map(|n| n.to_owned()).collect::<Vec<_>>();
        names.sort();

        assert_eq!(names, ["sub/", "sub/extra.txt", "system.img"]);
    }
}
