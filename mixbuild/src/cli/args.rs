// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    io::{self, IsTerminal},
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::Result;
use clap::{CommandFactory, Parser, ValueEnum, error::ErrorKind};
use clap_complete::Shell;
use thiserror::Error;
use tracing::Level;

use crate::{
    cli::completion,
    config::{self, MixConfig, MixOptions},
    pipeline,
};

/// Invalid command line. Reported without the error chain.
#[derive(Debug, Error)]
pub enum UsageError {
    #[error("{0}")]
    Parse(#[source] clap::Error),
    #[error("{0}")]
    Config(#[from] config::Error),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Message only.
    #[default]
    Short,
    /// Level and message.
    Medium,
    /// Timestamp, level, target, and message.
    Long,
}

const HEADING_PATCH: &str = "System patch options";
const HEADING_MERGE: &str = "Merge options";
const HEADING_OTHER: &str = "Other options";

/// Create a mixed build from a system build and a device build.
///
/// The device build's images are combined with the system build's system image
/// (and optionally its product image and vbmeta image). The device build
/// directory is copied to the output directory, excluding logs, with the
/// images archive and android-info.txt replaced by the merged versions.
#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    /// Vendor version to patch the system image for.
    ///
    /// Must be used together with -m.
    #[arg(
        short = 'v',
        long,
        value_name = "VENDOR_VERSION",
        help_heading = HEADING_PATCH
    )]
    pub vendor_version: Option<String>,

    /// Script for modifying the system target files.
    ///
    /// The script is invoked as:
    ///
    /// <script> <vendor version> <target files zip> [<device security patch>]
    ///
    /// The security patch level is only passed if it differs between the
    /// system and device builds.
    #[arg(
        short = 'm',
        long,
        value_name = "MODIFY_SCRIPT",
        value_parser,
        help_heading = HEADING_PATCH
    )]
    pub modify_script: Option<PathBuf>,

    /// Replace vbmeta.img with this image instead of the system build's.
    #[arg(
        short = 'p',
        long = "vbmeta",
        value_name = "VBMETA_PATH",
        value_parser,
        help_heading = HEADING_MERGE
    )]
    pub vbmeta_override: Option<PathBuf>,

    /// Replace boot.img with this image.
    #[arg(
        short = 'b',
        long = "boot",
        value_name = "BOOT_PATH",
        value_parser,
        help_heading = HEADING_MERGE
    )]
    pub boot_override: Option<PathBuf>,

    /// otatools.zip containing checkvintf for the VINTF compatibility check.
    ///
    /// If omitted, the compatibility check is skipped.
    #[arg(
        short = 't',
        long = "otatools",
        value_name = "OTATOOLS_ZIP",
        value_parser,
        help_heading = HEADING_PATCH
    )]
    pub otatools_zip: Option<PathBuf>,

    /// Include product.img from the system build.
    ///
    /// If the system build has no product.img, the device's product.img is
    /// removed instead.
    #[arg(short = 's', long, help_heading = HEADING_MERGE)]
    pub include_product: bool,

    /// Keep the device build's vbmeta.img.
    #[arg(short = 'd', long, help_heading = HEADING_MERGE)]
    pub skip_vbmeta_replace: bool,

    /// Directory to create the temporary working directory in.
    #[arg(long, value_name = "DIR", value_parser, help_heading = HEADING_OTHER)]
    pub tmp_dir: Option<PathBuf>,

    /// Lowest log message severity to output.
    #[arg(
        long,
        value_name = "LEVEL",
        default_value_t,
        value_enum,
        help_heading = HEADING_OTHER
    )]
    pub log_level: LogLevel,

    /// Output format for log messages.
    #[arg(
        long,
        value_name = "FORMAT",
        default_value_t,
        value_enum,
        help_heading = HEADING_OTHER
    )]
    pub log_format: LogFormat,

    /// Print shell completion config and exit.
    #[arg(long, value_name = "SHELL", value_parser, help_heading = HEADING_OTHER)]
    pub completion: Option<Shell>,

    /// Directory containing the system build's target files.
    #[arg(value_name = "SYSTEM_BUILD_DIR", required_unless_present = "completion")]
    pub system_dir: Option<PathBuf>,

    /// Directory containing the device build's target files and images.
    #[arg(value_name = "DEVICE_BUILD_DIR", required_unless_present = "completion")]
    pub device_dir: Option<PathBuf>,

    /// Output directory.
    #[arg(value_name = "OUT_DIR", required_unless_present = "completion")]
    pub output_dir: Option<PathBuf>,
}

impl Cli {
    /// Validate the arguments and build the configuration for a run.
    pub fn to_config(&self) -> Result<MixConfig, config::Error> {
        let (Some(system_dir), Some(device_dir), Some(output_dir)) =
            (&self.system_dir, &self.device_dir, &self.output_dir)
        else {
            return Err(config::Error::MissingArgument(
                "SYSTEM_BUILD_DIR DEVICE_BUILD_DIR OUT_DIR",
            ));
        };

        MixConfig::resolve(
            system_dir,
            device_dir,
            output_dir,
            MixOptions {
                vendor_version: self.vendor_version.clone(),
                modify_script: self.modify_script.clone(),
                vbmeta_override: self.vbmeta_override.clone(),
                boot_override: self.boot_override.clone(),
                otatools_zip: self.otatools_zip.clone(),
                include_product: self.include_product,
                skip_vbmeta_replace: self.skip_vbmeta_replace,
                temp_dir: self.tmp_dir.clone(),
            },
        )
    }
}

/// Full help text, shown after any error.
pub fn help_text() -> String {
    Cli::command().render_help().to_string()
}

pub fn init_logging(log_level: LogLevel, log_format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_max_level(Level::from(log_level));

    match log_format {
        LogFormat::Short => builder
            .without_time()
            .with_level(false)
            .with_target(false)
            .init(),
        LogFormat::Medium => builder.without_time().with_target(false).init(),
        LogFormat::Long => builder.init(),
    }
}

pub fn main(logging_initialized: &AtomicBool, cancel_signal: &AtomicBool) -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.print()?;
            return Ok(());
        }
        Err(e) => return Err(UsageError::Parse(e).into()),
    };

    if let Some(shell) = cli.completion {
        return completion::completion_main(shell);
    }

    init_logging(cli.log_level, cli.log_format);
    logging_initialized.store(true, Ordering::SeqCst);

    let config = cli.to_config().map_err(UsageError::Config)?;

    pipeline::run(&config, cancel_signal)
}
