// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! mixbuild assembles a mixed build: a device image archive whose system
//! partition comes from a separate system build (eg. a GSI) while everything
//! else comes from the device build.
//!
//! Like the CLI, the Rust APIs are only meant to be consumed by the `mixbuild`
//! binary and its tests. They can change at any time.

pub mod cli;
pub mod config;
pub mod format;
pub mod locate;
pub mod merge;
pub mod mirror;
pub mod pattern;
pub mod pipeline;
pub mod props;
pub mod stream;
pub mod tool;
pub mod util;
pub mod vintf;
