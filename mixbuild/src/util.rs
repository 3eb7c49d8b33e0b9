// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fmt,
    path::{Component, Path},
};

/// A string that is printed with [`fmt::Display`] semantics when formatted
/// with [`fmt::Debug`]. This is used to store the debug representation of
/// values that can't be stored in error types directly, like [`std::process::Command`].
#[derive(Clone, PartialEq, Eq)]
pub struct DebugString(String);

impl DebugString {
    pub fn new<T: fmt::Debug + ?Sized>(value: &T) -> Self {
        Self(format!("{value:?}"))
    }
}

impl fmt::Debug for DebugString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Get the non-empty parent of a path. If the path has no parent in the string,
/// then `.` is returned. This does not perform any filesystem operations.
pub fn parent_path(path: &Path) -> &Path {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            return parent;
        }
    }

    Path::new(".")
}

/// Convert a path relative to some root into a `/`-separated archive path.
pub fn archive_path(relative: &Path) -> Option<String> {
    let mut result = String::new();

    for component in relative.components() {
        let Component::Normal(c) = component else {
            return None;
        };

        if !result.is_empty() {
            result.push('/');
        }
        result.push_str(c.to_str()?);
    }

    Some(result)
}
