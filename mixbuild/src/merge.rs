// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
};

use cap_std::{ambient_authority, fs::Dir};
use thiserror::Error;
use tracing::{debug, info};

use crate::stream;

pub const ANDROID_INFO: &str = "android-info.txt";
pub const SYSTEM_IMG: &str = "system.img";
pub const PRODUCT_IMG: &str = "product.img";
pub const VBMETA_IMG: &str = "vbmeta.img";
pub const BOOT_IMG: &str = "boot.img";

/// `android-info.txt` lines ending with this declare a product partition.
pub const PRODUCT_PARTITION_SUFFIX: &str = "partition-exists=product";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to open directory: {0:?}")]
    OpenDir(PathBuf, #[source] io::Error),
    #[error("Failed to replace {0:?} with {1:?}")]
    Replace(String, PathBuf, #[source] io::Error),
    #[error("Failed to remove {0:?}")]
    Remove(String, #[source] io::Error),
    #[error("Failed to update {0:?}")]
    UpdateInfo(&'static str, #[source] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Copy, Debug, Default)]
pub struct MergeOptions<'a> {
    pub include_product: bool,
    pub skip_vbmeta_replace: bool,
    pub vbmeta_override: Option<&'a Path>,
    pub boot_override: Option<&'a Path>,
}

/// Remove every line declaring a product partition.
pub fn remove_product_partition(contents: &str) -> String {
    contents
        .split_inclusive('\n')
        .filter(|line| {
            !line
                .trim_end_matches(['\n', '\r'])
                .ends_with(PRODUCT_PARTITION_SUFFIX)
        })
        .collect()
}

/// Overwrite `name` in `directory` with the contents of `source`.
fn replace_file(
    directory: &Dir,
    name: &str,
    source: &Path,
    cancel_signal: &AtomicBool,
) -> Result<()> {
    debug!("Replacing {name:?} with {source:?}");

    let replace_err = |e| Error::Replace(name.to_owned(), source.to_owned(), e);

    let reader = File::open(source).map_err(replace_err)?;
    let writer = directory.create(name).map_err(replace_err)?;
    let mut writer = BufWriter::new(writer.into_std());

    stream::copy(reader, &mut writer, cancel_signal).map_err(replace_err)?;
    writer.flush().map_err(replace_err)?;

    Ok(())
}

/// Replace `name` only if the device build already has it.
fn replace_existing(
    directory: &Dir,
    name: &str,
    source: &Path,
    cancel_signal: &AtomicBool,
) -> Result<bool> {
    if !directory.exists(name) {
        debug!("Not adding {name:?} because the device build does not have it");
        return Ok(false);
    }

    replace_file(directory, name, source, cancel_signal)?;

    Ok(true)
}

/// Merge the system build's images into the extracted device images.
pub fn merge_images(
    device_images: &Path,
    system_images: &Path,
    options: &MergeOptions,
    cancel_signal: &AtomicBool,
) -> Result<()> {
    let authority = ambient_authority();
    let directory = Dir::open_ambient_dir(device_images, authority)
        .map_err(|e| Error::OpenDir(device_images.to_owned(), e))?;

    info!("Replacing {SYSTEM_IMG}");
    replace_file(
        &directory,
        SYSTEM_IMG,
        &system_images.join(SYSTEM_IMG),
        cancel_signal,
    )?;

    if options.include_product {
        let system_product = system_images.join(PRODUCT_IMG);

        if system_product.is_file() {
            info!("Replacing {PRODUCT_IMG}");
            replace_file(&directory, PRODUCT_IMG, &system_product, cancel_signal)?;
        } else {
            info!("System build has no {PRODUCT_IMG}; removing it from the device build");

            if directory.exists(PRODUCT_IMG) {
                directory
                    .remove_file(PRODUCT_IMG)
                    .map_err(|e| Error::Remove(PRODUCT_IMG.to_owned(), e))?;
            }

            let contents = directory
                .read_to_string(ANDROID_INFO)
                .map_err(|e| Error::UpdateInfo(ANDROID_INFO, e))?;
            directory
                .write(ANDROID_INFO, remove_product_partition(&contents))
                .map_err(|e| Error::UpdateInfo(ANDROID_INFO, e))?;
        }
    }

    if !options.skip_vbmeta_replace {
        let source = options
            .vbmeta_override
            .map_or_else(|| system_images.join(VBMETA_IMG), |p| p.to_owned());

        if replace_existing(&directory, VBMETA_IMG, &source, cancel_signal)? {
            info!("Replaced {VBMETA_IMG} with {source:?}");
        }
    }

    if let Some(source) = options.boot_override {
        if replace_existing(&directory, BOOT_IMG, source, cancel_signal)? {
            info!("Replaced {BOOT_IMG} with {source:?}");
        }
    }

    Ok(())
}
