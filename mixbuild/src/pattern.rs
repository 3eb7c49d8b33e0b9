// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to compile wildcard pattern: {0:?}")]
    Compile(String, #[source] regex::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// An `unzip`-style wildcard pattern. `*` matches any sequence of characters,
/// including `/`, and `?` matches exactly one character. All other characters
/// match literally. The whole input must match.
#[derive(Clone)]
pub struct Wildcard {
    pattern: String,
    regex: Regex,
}

impl Wildcard {
    pub fn new(pattern: &str) -> Result<Self> {
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push_str("(?s)^");

        let mut literal = [0u8; 4];

        for c in pattern.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                c => expr.push_str(&regex::escape(c.encode_utf8(&mut literal))),
            }
        }

        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| Error::Compile(pattern.to_owned(), e))?;

        Ok(Self {
            pattern: pattern.to_owned(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&self, input: &str) -> bool {
        self.regex.is_match(input)
    }
}

impl fmt::Debug for Wildcard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Wildcard").field(&self.pattern).finish()
    }
}

/// Compile a list of patterns, failing on the first invalid one.
pub fn compile_all(patterns: &[impl AsRef<str>]) -> Result<Vec<Wildcard>> {
    patterns.iter().map(|p| Wildcard::new(p.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_crosses_separators() {
        let w = Wildcard::new("SYSTEM/etc/vintf/*").unwrap();

        assert!(w.is_match("SYSTEM/etc/vintf/manifest.xml"));
        assert!(w.is_match("SYSTEM/etc/vintf/manifest/foo.xml"));
        assert!(w.is_match("SYSTEM/etc/vintf/"));
        assert!(!w.is_match("SYSTEM/etc/vintf"));
        assert!(!w.is_match("VENDOR/etc/vintf/manifest.xml"));
    }

    #[test]
    fn archive_names() {
        let w = Wildcard::new("*-target_files-*.zip").unwrap();

        assert!(w.is_match("aosp_arm64-target_files-eng.user.zip"));
        assert!(!w.is_match("aosp_arm64-img-eng.user.zip"));
        assert!(!w.is_match("aosp_arm64-target_files-eng.zip.sha256"));

        let w = Wildcard::new("*-img-*.zip").unwrap();

        assert!(w.is_match("raven-img-123456.zip"));
        assert!(!w.is_match("raven-target_files-123456.zip"));
    }

    #[test]
    fn question_mark_and_literals() {
        let w = Wildcard::new("IMAGES/system?.img").unwrap();

        assert!(w.is_match("IMAGES/system_.img"));
        assert!(!w.is_match("IMAGES/system.img"));

        let w = Wildcard::new("IMAGES/system.img").unwrap();

        assert!(w.is_match("IMAGES/system.img"));
        assert!(!w.is_match("IMAGES/systemXimg"));
    }

    #[test]
    fn build_prop_anywhere() {
        let w = Wildcard::new("*/build.prop").unwrap();

        assert!(w.is_match("SYSTEM/build.prop"));
        assert!(w.is_match("VENDOR/build.prop"));
        assert!(!w.is_match("build.prop"));
    }
}
