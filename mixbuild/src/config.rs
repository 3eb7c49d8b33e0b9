// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    io,
    path::{self, Path, PathBuf},
};

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Vendor version (-v) and modify script (-m) must be specified together")]
    IncompleteVendorPatch,
    #[error("Missing required argument: {0}")]
    MissingArgument(&'static str),
    #[error("File does not exist: {0:?}")]
    MissingFile(PathBuf),
    #[error("Failed to resolve path: {0:?}")]
    ResolvePath(PathBuf, #[source] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Optional inputs, as given on the command line, before validation.
#[derive(Clone, Debug, Default)]
pub struct MixOptions {
    pub vendor_version: Option<String>,
    pub modify_script: Option<PathBuf>,
    pub vbmeta_override: Option<PathBuf>,
    pub boot_override: Option<PathBuf>,
    pub otatools_zip: Option<PathBuf>,
    pub include_product: bool,
    pub skip_vbmeta_replace: bool,
    pub temp_dir: Option<PathBuf>,
}

/// Modification of the system image for an older vendor build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VendorPatch {
    pub vendor_version: String,
    pub modify_script: PathBuf,
}

/// Validated configuration for a single run.
#[derive(Clone, Debug)]
pub struct MixConfig {
    pub system_dir: PathBuf,
    pub device_dir: PathBuf,
    pub output_dir: PathBuf,
    pub vendor_patch: Option<VendorPatch>,
    pub vbmeta_override: Option<PathBuf>,
    pub boot_override: Option<PathBuf>,
    /// Only set if the archive exists.
    pub otatools_zip: Option<PathBuf>,
    pub include_product: bool,
    pub skip_vbmeta_replace: bool,
    /// Parent directory for the scratch directory. Defaults to the system
    /// temporary directory.
    pub temp_dir: Option<PathBuf>,
}

fn require_file(path: Option<PathBuf>) -> Result<Option<PathBuf>> {
    match path {
        Some(p) if !p.exists() => Err(Error::MissingFile(p)),
        p => Ok(p),
    }
}

impl MixConfig {
    /// Validate the inputs. No archive is opened here.
    pub fn resolve(
        system_dir: &Path,
        device_dir: &Path,
        output_dir: &Path,
        options: MixOptions,
    ) -> Result<Self> {
        let vendor_patch = match (options.vendor_version, options.modify_script) {
            (Some(vendor_version), Some(modify_script)) => {
                if !modify_script.exists() {
                    return Err(Error::MissingFile(modify_script));
                }

                // A bare file name would otherwise be looked up in PATH.
                let modify_script = path::absolute(&modify_script)
                    .map_err(|e| Error::ResolvePath(modify_script.clone(), e))?;

                Some(VendorPatch {
                    vendor_version,
                    modify_script,
                })
            }
            (None, None) => None,
            _ => return Err(Error::IncompleteVendorPatch),
        };

        let vbmeta_override = require_file(options.vbmeta_override)?;
        let boot_override = require_file(options.boot_override)?;

        let otatools_zip = match options.otatools_zip {
            Some(p) if p.is_file() => Some(p),
            Some(p) => {
                warn!("otatools archive not found: {p:?}; skipping VINTF compatibility check");
                None
            }
            None => {
                warn!("No otatools archive specified; skipping VINTF compatibility check");
                None
            }
        };

        Ok(Self {
            system_dir: system_dir.to_owned(),
            device_dir: device_dir.to_owned(),
            output_dir: output_dir.to_owned(),
            vendor_patch,
            vbmeta_override,
            boot_override,
            otatools_zip,
            include_product: options.include_product,
            skip_vbmeta_replace: options.skip_vbmeta_replace,
            temp_dir: options.temp_dir,
        })
    }
}
