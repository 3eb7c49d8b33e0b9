// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Running external tools.
//!
//! The process environment is never modified. Instead, a [`ToolEnv`] carries
//! the extra search paths for tools unpacked from an otatools archive and
//! applies them to each [`Command`] it creates.

use std::{
    env::{self, JoinPathsError},
    ffi::{OsStr, OsString},
    fs,
    io,
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    sync::atomic::AtomicBool,
};

use thiserror::Error;
use tracing::{debug, info};

use crate::{format::zip::Archive, util::DebugString};

/// Entries of an otatools archive needed for running host tools.
pub const OTATOOLS_PATTERNS: [&str; 2] = ["bin/*", "lib64/*"];

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to run command: {0:?}")]
    CommandSpawn(DebugString, #[source] io::Error),
    #[error("Command failed with status: {1}: {0:?}")]
    CommandExecution(DebugString, ExitStatus),
    #[error("Command output is not valid UTF-8: {0:?}")]
    InvalidOutput(DebugString),
    #[error("Failed to stage tools from: {0:?}")]
    Stage(PathBuf, #[source] crate::format::zip::Error),
    #[error("Failed to create directory: {0:?}")]
    CreateDir(PathBuf, #[source] io::Error),
    #[error("Invalid search path entry: {0:?}")]
    SearchPath(PathBuf, #[source] JoinPathsError),
}

type Result<T> = std::result::Result<T, Error>;

/// Search paths for host tools. The default value uses the inherited
/// environment as is.
#[derive(Clone, Debug, Default)]
pub struct ToolEnv {
    bin_dir: Option<PathBuf>,
    lib_dir: Option<PathBuf>,
}

impl ToolEnv {
    /// Unpack `bin/*` and `lib64/*` from an otatools archive into `directory`
    /// and return an environment that runs tools from there.
    pub fn stage(
        otatools_zip: &Path,
        directory: &Path,
        cancel_signal: &AtomicBool,
    ) -> Result<Self> {
        info!("Staging host tools from {otatools_zip:?}");

        fs::create_dir_all(directory).map_err(|e| Error::CreateDir(directory.to_owned(), e))?;

        let mut archive =
            Archive::open(otatools_zip).map_err(|e| Error::Stage(otatools_zip.to_owned(), e))?;
        archive
            .extract(&OTATOOLS_PATTERNS, directory, cancel_signal)
            .map_err(|e| Error::Stage(otatools_zip.to_owned(), e))?;

        Ok(Self {
            bin_dir: Some(directory.join("bin")),
            lib_dir: Some(directory.join("lib64")),
        })
    }

    pub fn is_staged(&self) -> bool {
        self.bin_dir.is_some()
    }

    /// Build a command for `program`. Bare program names are looked up in the
    /// staged `bin` directory first.
    pub fn command(&self, program: impl AsRef<OsStr>) -> Result<Command> {
        let program = program.as_ref();
        let mut command = match &self.bin_dir {
            Some(dir) if Path::new(program).components().count() == 1 => {
                let candidate = dir.join(program);
                if candidate.is_file() {
                    Command::new(candidate)
                } else {
                    Command::new(program)
                }
            }
            _ => Command::new(program),
        };

        if let Some(dir) = &self.bin_dir {
            command.env("PATH", prepend_search_path(dir, "PATH")?);
        }
        if let Some(dir) = &self.lib_dir {
            command.env("LD_LIBRARY_PATH", prepend_search_path(dir, "LD_LIBRARY_PATH")?);
        }

        Ok(command)
    }
}

/// Put `dir` in front of the search path in the environment variable `var`.
fn prepend_search_path(dir: &Path, var: &str) -> Result<OsString> {
    let mut paths = vec![dir.to_owned()];

    if let Some(existing) = env::var_os(var) {
        paths.extend(env::split_paths(&existing));
    }

    env::join_paths(paths).map_err(|e| Error::SearchPath(dir.to_owned(), e))
}

/// Run a command to completion with inherited stdout and stderr. A non-zero
/// exit status is an error.
pub fn run(command: &mut Command) -> Result<()> {
    debug!("Running: {command:?}");

    command.stdin(Stdio::null());

    let status = command
        .status()
        .map_err(|e| Error::CommandSpawn(DebugString::new(&*command), e))?;

    if !status.success() {
        return Err(Error::CommandExecution(DebugString::new(&*command), status));
    }

    Ok(())
}

/// Run a command to completion and capture its stdout. A non-zero exit status
/// is an error.
pub fn run_capture(command: &mut Command) -> Result<String> {
    debug!("Running: {command:?}");

    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::inherit());

    let output = command
        .output()
        .map_err(|e| Error::CommandSpawn(DebugString::new(&*command), e))?;

    if !output.status.success() {
        return Err(Error::CommandExecution(
            DebugString::new(&*command),
            output.status,
        ));
    }

    String::from_utf8(output.stdout)
        .map_err(|_| Error::InvalidOutput(DebugString::new(&*command)))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn unstaged_command_is_plain() {
        let env = ToolEnv::default();
        let command = env.command("checkvintf").unwrap();

        assert!(!env.is_staged());
        assert_eq!(command.get_program(), "checkvintf");
        assert_eq!(command.get_envs().count(), 0);
    }

    #[test]
    fn staged_command_prepends_search_paths() {
        let env = ToolEnv {
            bin_dir: Some(PathBuf::from("/scratch/otatools/bin")),
            lib_dir: Some(PathBuf::from("/scratch/otatools/lib64")),
        };
        let command = env.command("checkvintf").unwrap();

        let envs = command
            .get_envs()
            .map(|(k, v)| (k.to_owned(), v.map(|v| v.to_owned())))
            .collect::<Vec<_>>();
        let path = envs
            .iter()
            .find(|(k, _)| k == "PATH")
            .and_then(|(_, v)| v.clone())
            .unwrap();

        assert_eq!(
            env::split_paths(&path).next().as_deref(),
            Some(Path::new("/scratch/otatools/bin")),
        );
        assert!(envs.iter().any(|(k, _)| k == "LD_LIBRARY_PATH"));
    }
}
