// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
    time::Instant,
};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::{
    config::{MixConfig, VendorPatch},
    format::{self, zip::Archive},
    locate,
    merge::{self, MergeOptions},
    mirror, props,
    stream::check_cancel,
    tool::{self, ToolEnv},
    vintf::{self, FileLists},
};

pub const SYSTEM_IMG_PATH: &str = "IMAGES/system.img";
pub const VBMETA_IMG_PATH: &str = "IMAGES/vbmeta.img";
pub const PRODUCT_IMG_PATH: &str = "IMAGES/product.img";
pub const SYSTEM_BUILD_PROP_PATH: &str = "SYSTEM/build.prop";

/// Entries always pulled from the device target-files archive.
pub const DEVICE_FIXED_PATTERNS: [&str; 2] = ["*/build.prop", "META/*"];

/// Name of the merged archive inside the device images directory.
pub const MIXED_ZIP: &str = "mixed.zip";

/// Subtree of the device build directory that is not copied to the output.
pub const LOGS_DIR: &str = "logs";

/// The input archives of a run.
#[derive(Clone, Debug)]
pub struct Archives {
    pub system_target_files: PathBuf,
    pub device_target_files: PathBuf,
    pub device_images: PathBuf,
}

impl Archives {
    pub fn locate(config: &MixConfig) -> Result<Self> {
        let system_target_files =
            locate::find_archive(&config.system_dir, locate::TARGET_FILES_PATTERN)
                .context("Failed to find system target-files archive")?;
        let device_target_files =
            locate::find_archive(&config.device_dir, locate::TARGET_FILES_PATTERN)
                .context("Failed to find device target-files archive")?;
        let device_images = locate::find_archive(&config.device_dir, locate::IMAGES_PATTERN)
            .context("Failed to find device images archive")?;

        info!("System target files: {system_target_files:?}");
        info!("Device target files: {device_target_files:?}");
        info!("Device images: {device_images:?}");

        Ok(Self {
            system_target_files,
            device_target_files,
            device_images,
        })
    }
}

/// Scratch space for a single run. Everything is deleted when this is dropped,
/// no matter how the run ends.
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    pub fn new(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("mixbuild.");

        let dir = match parent {
            Some(p) => builder.tempdir_in(p),
            None => builder.tempdir(),
        }
        .context("Failed to create temporary directory")?;

        let scratch = Self { dir };

        for path in [
            scratch.device_artifacts(),
            scratch.device_images(),
            scratch.system_artifacts(),
        ] {
            fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create directory: {path:?}"))?;
        }

        debug!("Scratch directory: {:?}", scratch.path());

        Ok(scratch)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Files extracted from the device target-files archive.
    pub fn device_artifacts(&self) -> PathBuf {
        self.path().join("device_artifacts")
    }

    /// Contents of the device images archive. This is what gets merged.
    pub fn device_images(&self) -> PathBuf {
        self.path().join("device_images")
    }

    /// Files extracted from the system target-files archive.
    pub fn system_artifacts(&self) -> PathBuf {
        self.path().join("system_artifacts")
    }

    pub fn system_images(&self) -> PathBuf {
        self.system_artifacts().join("IMAGES")
    }

    pub fn otatools(&self) -> PathBuf {
        self.path().join("otatools")
    }
}

/// Determine the extra security patch level argument for the modify script.
/// It is only passed when the device's patch level differs from the system's.
pub fn security_patch_arg<'a>(
    system_spl: Option<&str>,
    device_spl: Option<&'a str>,
) -> Option<&'a str> {
    match device_spl {
        Some(spl) if system_spl != Some(spl) => Some(spl),
        Some(_) => None,
        None => {
            if system_spl.is_some() {
                warn!("Device build has no {}", props::PROP_SECURITY_PATCH);
            }
            None
        }
    }
}

fn read_security_patch(path: &Path) -> Result<Option<String>> {
    let spl = props::read_prop(path, props::PROP_SECURITY_PATCH)
        .with_context(|| format!("Failed to read properties: {path:?}"))?;

    debug!("{} in {path:?}: {spl:?}", props::PROP_SECURITY_PATCH);

    Ok(spl)
}

fn extract_system(
    config: &MixConfig,
    archives: &Archives,
    lists: &FileLists,
    scratch: &Scratch,
    cancel_signal: &AtomicBool,
) -> Result<()> {
    info!("Extracting system build artifacts");

    let mut archive = Archive::open(&archives.system_target_files)?;
    let mut patterns = vec![
        SYSTEM_IMG_PATH.to_owned(),
        VBMETA_IMG_PATH.to_owned(),
        SYSTEM_BUILD_PROP_PATH.to_owned(),
    ];

    if config.include_product && archive.contains(PRODUCT_IMG_PATH) {
        patterns.push(PRODUCT_IMG_PATH.to_owned());
    }

    patterns.extend(lists.system.iter().cloned());

    archive
        .extract(&patterns, &scratch.system_artifacts(), cancel_signal)
        .context("Failed to extract system build artifacts")?;

    Ok(())
}

fn extract_device(
    archives: &Archives,
    lists: &FileLists,
    scratch: &Scratch,
    cancel_signal: &AtomicBool,
) -> Result<()> {
    info!("Extracting device build artifacts");

    let mut patterns = DEVICE_FIXED_PATTERNS
        .iter()
        .map(|p| (*p).to_owned())
        .collect::<Vec<_>>();
    patterns.extend(lists.device.iter().cloned());

    Archive::open(&archives.device_target_files)?
        .extract(&patterns, &scratch.device_artifacts(), cancel_signal)
        .context("Failed to extract device build artifacts")?;

    info!("Extracting device images");

    Archive::open(&archives.device_images)?
        .extract_all(&scratch.device_images(), cancel_signal)
        .context("Failed to extract device images")?;

    Ok(())
}

/// Run the modify script on a copy of the system target-files archive and
/// re-extract the system image from it. Returns the path to the copy.
fn patch_system(
    patch: &VendorPatch,
    archives: &Archives,
    env: &ToolEnv,
    scratch: &Scratch,
    cancel_signal: &AtomicBool,
) -> Result<PathBuf> {
    info!("Patching system image for vendor version {}", patch.vendor_version);

    let file_name = archives
        .system_target_files
        .file_name()
        .ok_or_else(|| anyhow!("No file name: {:?}", archives.system_target_files))?;
    let copy = scratch.path().join(file_name);

    // The modify script edits the archive in place.
    fs::copy(&archives.system_target_files, &copy)
        .with_context(|| format!("Failed to copy {:?}", archives.system_target_files))?;

    let system_spl =
        read_security_patch(&scratch.system_artifacts().join(SYSTEM_BUILD_PROP_PATH))?;
    let device_spl =
        read_security_patch(&scratch.device_artifacts().join(SYSTEM_BUILD_PROP_PATH))?;

    let mut command = env.command(&patch.modify_script)?;
    command.arg(&patch.vendor_version);
    command.arg(&copy);

    if let Some(spl) = security_patch_arg(system_spl.as_deref(), device_spl.as_deref()) {
        info!("Security patch level differs; passing {spl} to the modify script");
        command.arg(spl);
    }

    tool::run(&mut command).context("Failed to modify system target files")?;

    Archive::open(&copy)?
        .extract(&[SYSTEM_IMG_PATH], &scratch.system_artifacts(), cancel_signal)
        .context("Failed to extract patched system image")?;

    Ok(copy)
}

/// Overlay the system's VINTF files onto the device artifacts and run the
/// compatibility check against the combination.
fn check_compat(
    system_target_files: &Path,
    lists: &FileLists,
    env: &ToolEnv,
    scratch: &Scratch,
    cancel_signal: &AtomicBool,
) -> Result<()> {
    if !lists.system.is_empty() {
        Archive::open(system_target_files)?
            .extract(&lists.system, &scratch.device_artifacts(), cancel_signal)
            .context("Failed to overlay system VINTF files")?;
    }

    vintf::check_compat(env, &scratch.device_artifacts())
        .context("VINTF compatibility check failed")?;

    Ok(())
}

fn repackage(
    config: &MixConfig,
    archives: &Archives,
    scratch: &Scratch,
    cancel_signal: &AtomicBool,
) -> Result<()> {
    let device_images = scratch.device_images();
    let mixed_zip = device_images.join(MIXED_ZIP);

    info!("Creating {mixed_zip:?}");
    format::zip::create_from_dir(&device_images, &mixed_zip, cancel_signal)
        .context("Failed to create merged images archive")?;

    info!("Copying device build to {:?}", config.output_dir);
    mirror::mirror_dir(&config.device_dir, &config.output_dir, LOGS_DIR, cancel_signal)
        .context("Failed to copy device build")?;

    let file_name = archives
        .device_images
        .file_name()
        .ok_or_else(|| anyhow!("No file name: {:?}", archives.device_images))?;

    for (source, target) in [
        (mixed_zip, config.output_dir.join(file_name)),
        (
            device_images.join(merge::ANDROID_INFO),
            config.output_dir.join(merge::ANDROID_INFO),
        ),
    ] {
        fs::copy(&source, &target)
            .with_context(|| format!("Failed to copy {source:?} -> {target:?}"))?;
    }

    Ok(())
}

/// Build a mixed build as described by `config`.
pub fn run(config: &MixConfig, cancel_signal: &AtomicBool) -> Result<()> {
    let start = Instant::now();

    let archives = Archives::locate(config)?;
    let scratch = Scratch::new(config.temp_dir.as_deref())?;

    let env = match &config.otatools_zip {
        Some(path) => ToolEnv::stage(path, &scratch.otatools(), cancel_signal)
            .context("Failed to stage host tools")?,
        None => ToolEnv::default(),
    };

    check_cancel(cancel_signal)?;

    let lists = if env.is_staged() {
        info!("Collecting VINTF file list");

        let required = vintf::dump_file_list(&env).context("Failed to get VINTF file list")?;
        let system_archive = Archive::open(&archives.system_target_files)?;
        let device_archive = Archive::open(&archives.device_target_files)?;

        vintf::build_file_lists(&required, &system_archive, &device_archive)?
    } else {
        FileLists::default()
    };

    extract_system(config, &archives, &lists, &scratch, cancel_signal)?;
    check_cancel(cancel_signal)?;

    extract_device(&archives, &lists, &scratch, cancel_signal)?;
    check_cancel(cancel_signal)?;

    let system_target_files = match &config.vendor_patch {
        Some(patch) => patch_system(patch, &archives, &env, &scratch, cancel_signal)?,
        None => archives.system_target_files.clone(),
    };
    check_cancel(cancel_signal)?;

    if env.is_staged() {
        check_compat(&system_target_files, &lists, &env, &scratch, cancel_signal)?;
        check_cancel(cancel_signal)?;
    }

    info!("Merging images");
    merge::merge_images(
        &scratch.device_images(),
        &scratch.system_images(),
        &MergeOptions {
            include_product: config.include_product,
            skip_vbmeta_replace: config.skip_vbmeta_replace,
            vbmeta_override: config.vbmeta_override.as_deref(),
            boot_override: config.boot_override.as_deref(),
        },
        cancel_signal,
    )
    .context("Failed to merge images")?;
    check_cancel(cancel_signal)?;

    repackage(config, &archives, &scratch, cancel_signal)?;

    info!("Completed after {:.1}s", start.elapsed().as_secs_f64());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spl_argument_only_on_mismatch() {
        assert_eq!(
            security_patch_arg(Some("2023-01-01"), Some("2023-02-01")),
            Some("2023-02-01"),
        );
        assert_eq!(security_patch_arg(Some("2023-01-01"), Some("2023-01-01")), None);
        assert_eq!(security_patch_arg(None, Some("2023-01-01")), Some("2023-01-01"));
        assert_eq!(security_patch_arg(Some("2023-01-01"), None), None);
        assert_eq!(security_patch_arg(None, None), None);
    }
}
