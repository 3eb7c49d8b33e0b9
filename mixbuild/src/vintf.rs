// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! VINTF compatibility checking with `checkvintf`.
//!
//! `checkvintf --dump-file-list` prints the on-device paths it needs. Those are
//! mapped to the directories inside target-files archives where the same files
//! live, so that only the relevant entries are extracted.

use std::{
    collections::BTreeMap,
    ffi::OsString,
    path::{Path, PathBuf},
};

use phf::phf_map;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    format::zip::Archive,
    pattern::{self, Wildcard},
    tool::{self, ToolEnv},
};

pub const CHECKVINTF: &str = "checkvintf";

pub type AliasTable = phf::Map<&'static str, &'static [&'static str]>;

/// Mount points provided by the system build and where they live in a
/// target-files archive, in probing order.
pub static SYSTEM_DIRS: AliasTable = phf_map! {
    "/system" => &["SYSTEM"],
    "/product" => &["PRODUCT", "SYSTEM/product"],
    "/system_ext" => &["SYSTEM_EXT", "SYSTEM/system_ext"],
};

/// Mount points provided by the device build.
pub static DEVICE_DIRS: AliasTable = phf_map! {
    "/vendor" => &["VENDOR"],
    "/odm" => &["ODM", "VENDOR/odm"],
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("checkvintf failed")]
    Tool(#[from] tool::Error),
    #[error("Invalid pattern")]
    Pattern(#[from] pattern::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Patterns of entries to extract from each side's target-files archive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileLists {
    pub system: Vec<String>,
    pub device: Vec<String>,
}

/// Find the mount point in `table` that `path` is under. If several match,
/// the longest one wins.
pub fn find_mount_point(
    table: &AliasTable,
    path: &str,
) -> Option<(&'static str, &'static [&'static str])> {
    table
        .entries()
        .filter(|(k, _)| {
            path.strip_prefix(**k)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
        .max_by_key(|(k, _)| k.len())
        .map(|(k, v)| (*k, *v))
}

/// Compute the candidate archive patterns for the directory `path` (which
/// ends in `/`). Each candidate directory of the matching mount point yields
/// one pattern. Returns an empty list if no mount point matches.
pub fn candidate_patterns(table: &AliasTable, path: &str) -> Vec<String> {
    let Some((mount_point, candidates)) = find_mount_point(table, path) else {
        return vec![];
    };
    let rest = &path[mount_point.len()..];

    candidates
        .iter()
        .map(|c| format!("{c}{rest}*"))
        .collect()
}

/// Append the patterns for `path` that match at least one entry in `archive`.
fn add_existing(
    table: &AliasTable,
    path: &str,
    archive: &Archive,
    output: &mut Vec<String>,
) -> Result<()> {
    for candidate in candidate_patterns(table, path) {
        let wildcard = Wildcard::new(&candidate)?;

        if archive.contains_match(&wildcard) {
            debug!("{path:?} -> {candidate:?} in {:?}", archive.path());
            output.push(candidate);
        }
    }

    Ok(())
}

/// Map the required paths reported by `checkvintf` to patterns in the system
/// and device target-files archives. Only directory entries (ending with `/`)
/// are considered.
pub fn build_file_lists(
    required: &[String],
    system_archive: &Archive,
    device_archive: &Archive,
) -> Result<FileLists> {
    let mut lists = FileLists::default();

    for path in required.iter().filter(|p| p.ends_with('/')) {
        add_existing(&SYSTEM_DIRS, path, system_archive, &mut lists.system)?;
        add_existing(&DEVICE_DIRS, path, device_archive, &mut lists.device)?;
    }

    Ok(lists)
}

/// Ask `checkvintf` which files it needs to perform a compatibility check.
pub fn dump_file_list(env: &ToolEnv) -> Result<Vec<String>> {
    let mut command = env.command(CHECKVINTF)?;
    command.arg("--dump-file-list");

    let output = tool::run_capture(&mut command)?;

    Ok(output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| l.to_owned())
        .collect())
}

/// Map each mount point to the first of its candidate directories that exists
/// under `directory`.
pub fn dir_mappings(directory: &Path) -> BTreeMap<&'static str, PathBuf> {
    let mut result = BTreeMap::new();

    for (mount_point, candidates) in SYSTEM_DIRS.entries().chain(DEVICE_DIRS.entries()) {
        if let Some(dir) = candidates
            .iter()
            .map(|c| directory.join(c))
            .find(|p| p.is_dir())
        {
            result.insert(*mount_point, dir);
        }
    }

    result
}

/// Run `checkvintf --check-compat` against an extracted artifacts directory.
/// An incompatibility is reported as a command failure.
pub fn check_compat(env: &ToolEnv, directory: &Path) -> Result<()> {
    info!("Checking VINTF compatibility of {directory:?}");

    let mut command = env.command(CHECKVINTF)?;
    command.arg("--check-compat");

    for (mount_point, dir) in dir_mappings(directory) {
        let mut mapping = OsString::from(mount_point);
        mapping.push(":");
        mapping.push(dir);

        command.arg("--dirmap");
        command.arg(mapping);
    }

    tool::run(&mut command)?;

    Ok(())
}
