// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{collections::BTreeMap, fs, io, path::Path};

/// Security patch level of a build.
pub const PROP_SECURITY_PATCH: &str = "ro.build.version.security_patch";

/// Parse the contents of a `build.prop` file. Blank lines, comments, and lines
/// without `=` (eg. `import` statements) are skipped. Later assignments
/// override earlier ones.
pub fn parse_props(data: &str) -> BTreeMap<String, String> {
    let mut result = BTreeMap::new();

    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        result.insert(k.trim().to_owned(), v.trim().to_owned());
    }

    result
}

/// Read a single property from a `build.prop` file. The file must exist, but
/// the property does not have to.
pub fn read_prop(path: &Path, key: &str) -> io::Result<Option<String>> {
    let data = fs::read(path)?;
    let mut props = parse_props(&String::from_utf8_lossy(&data));

    Ok(props.remove(key))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn parse_build_prop() {
        let props = parse_props(
            "# begin build properties\n\
             ro.build.version.security_patch=2023-01-01\n\
             import /vendor/build.prop\n\
             \n\
             ro.product.name = raven \n\
             ro.build.version.security_patch=2023-02-01\n",
        );

        assert_eq!(props[PROP_SECURITY_PATCH], "2023-02-01");
        assert_eq!(props["ro.product.name"], "raven");
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn value_may_contain_equals() {
        let props = parse_props("ro.build.flavor=a=b\n");

        assert_eq!(props["ro.build.flavor"], "a=b");
    }

    #[test]
    fn read_prop_tolerates_invalid_utf8() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("build.prop");
        let mut data = b"ro.product.model=Pixel \xff\xfe\n".to_vec();
        data.extend_from_slice(b"ro.build.version.security_patch=2023-02-01\n");
        fs::write(&path, data).unwrap();

        assert_eq!(
            read_prop(&path, PROP_SECURITY_PATCH).unwrap().as_deref(),
            Some("2023-02-01"),
        );
        assert_eq!(read_prop(&path, "ro.missing").unwrap(), None);
    }
}
