// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs,
    path::Path,
    process::{Command, Output},
};

use tempfile::TempDir;

fn mixbuild(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mixbuild"))
        .args(args)
        .current_dir(cwd)
        .output()
        .unwrap()
}

fn create_build_dirs(temp_dir: &TempDir) {
    for name in ["system", "device"] {
        fs::create_dir_all(temp_dir.path().join(name)).unwrap();
    }
}

#[test]
fn missing_archive_prints_usage() {
    let temp_dir = TempDir::new().unwrap();
    create_build_dirs(&temp_dir);

    let output = mixbuild(&["system", "device", "out"], temp_dir.path());
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("No file matching"), "{stderr}");
    assert!(stderr.contains("Usage:"), "{stderr}");
    assert!(!temp_dir.path().join("out").exists());
}

#[test]
fn vendor_version_without_script_prints_usage() {
    let temp_dir = TempDir::new().unwrap();
    create_build_dirs(&temp_dir);

    let output = mixbuild(&["-v", "29", "system", "device", "out"], temp_dir.path());
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("must be specified together"), "{stderr}");
    assert!(stderr.contains("Usage:"), "{stderr}");
}

#[test]
fn too_few_arguments_prints_usage() {
    let temp_dir = TempDir::new().unwrap();

    let output = mixbuild(&["system", "device"], temp_dir.path());
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Usage:"), "{stderr}");
}

#[test]
fn help_exits_successfully() {
    let temp_dir = TempDir::new().unwrap();

    let output = mixbuild(&["--help"], temp_dir.path());

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage:"));
}
