// src/core/paths.rs

use std::path::{Path, PathBuf};

use crate::core::err::BuildError;
use crate::core::value::Value;

/// A file inside the source tree, as a normalized path string. Paths
/// beginning `//` are relative to the source root; paths beginning with a
/// single `/` are system-absolute. A null (empty) value is the "not set"
/// sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceFile(String);

/// A directory inside the source tree. Non-null values always begin with a
/// slash and end with a slash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceDir(String);

impl SourceFile {
    pub fn new(value: impl Into<String>) -> Self {
        let v: String = value.into();
        debug_assert!(v.is_empty() || v.starts_with('/'));
        debug_assert!(!v.ends_with('/'));
        Self(v)
    }

    pub fn value(&self) -> &str {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_source_absolute(&self) -> bool {
        self.0.starts_with("//")
    }

    pub fn is_system_absolute(&self) -> bool {
        self.0.starts_with('/') && !self.is_source_absolute()
    }

    /// The directory containing this file, including the trailing slash.
    pub fn dir(&self) -> SourceDir {
        let offset = find_filename_offset(&self.0);
        SourceDir(self.0[..offset].to_string())
    }

    /// Resolves against the OS path of the source root.
    pub fn resolve(&self, source_root: &Path) -> PathBuf {
        resolve_path(&self.0, source_root)
    }
}

impl SourceDir {
    /// Builds a dir from a string, appending the trailing slash if absent.
    pub fn new(value: impl Into<String>) -> Self {
        let mut v: String = value.into();
        if v.is_empty() {
            return Self(v);
        }
        if !v.ends_with('/') {
            v.push('/');
        }
        debug_assert!(v.starts_with('/'));
        Self(v)
    }

    pub fn value(&self) -> &str {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_source_absolute(&self) -> bool {
        self.0.starts_with("//")
    }

    pub fn is_system_absolute(&self) -> bool {
        self.0.starts_with('/') && !self.is_source_absolute()
    }

    /// Resolves a possibly-relative file path against this directory.
    /// Returns a null file for inputs that can't name a file (empty, or
    /// ending in a slash).
    pub fn resolve_relative_file(&self, p: &str) -> SourceFile {
        if p.is_empty() || p.ends_with('/') {
            return SourceFile::default();
        }
        if p.starts_with('/') {
            let mut value = p.to_string();
            normalize_path(&mut value);
            return SourceFile(value);
        }
        let mut value = format!("{}{}", self.0, p);
        normalize_path(&mut value);
        SourceFile(value)
    }

    /// Resolves a possibly-relative dir path against this directory.
    pub fn resolve_relative_dir(&self, p: &str) -> SourceDir {
        if p.is_empty() {
            return SourceDir::default();
        }
        if p.starts_with('/') {
            let mut value = p.to_string();
            normalize_path(&mut value);
            return Self::new(value);
        }
        let mut value = format!("{}{}", self.0, p);
        normalize_path(&mut value);
        Self::new(value)
    }

    /// Resolves against the OS path of the source root.
    pub fn resolve(&self, source_root: &Path) -> PathBuf {
        resolve_path(&self.0, source_root)
    }
}

fn resolve_path(value: &str, source_root: &Path) -> PathBuf {
    if value.is_empty() {
        return PathBuf::new();
    }
    if let Some(source_relative) = value.strip_prefix("//") {
        source_root.join(source_relative)
    } else {
        PathBuf::from(value)
    }
}

/// Byte offset of the first character of the filename part, which is 0 when
/// the whole string is a filename.
pub fn find_filename_offset(path: &str) -> usize {
    path.rfind('/').map(|i| i + 1).unwrap_or(0)
}

/// The extension without the dot, or empty when there is none.
pub fn find_extension(path: &str) -> &str {
    let filename = &path[find_filename_offset(path)..];
    match filename.rfind('.') {
        Some(i) => &filename[i + 1..],
        None => "",
    }
}

/// The filename with directory and extension stripped, used by the
/// `{{source_name_part}}` substitution.
pub fn find_filename_no_extension(path: &str) -> &str {
    let filename = &path[find_filename_offset(path)..];
    match filename.rfind('.') {
        Some(i) => &filename[..i],
        None => filename,
    }
}

/// Collapses `.` and `..` components and duplicate separators in place.
/// `..` never ascends above a leading `/` or `//`; in relative paths,
/// leading `..` components are preserved. A `..` that consumed a component
/// keeps the slash preceding it, so `//foo/bar/..` is `//foo/`.
pub fn normalize_path(path: &mut String) {
    let input = path.clone();
    let (prefix, rest) = if let Some(r) = input.strip_prefix("//") {
        ("//", r)
    } else if let Some(r) = input.strip_prefix('/') {
        ("/", r)
    } else {
        ("", input.as_str())
    };
    let is_absolute = !prefix.is_empty();

    let raw: Vec<&str> = rest.split('/').collect();
    let mut components: Vec<&str> = Vec::new();
    let mut trailing_slash = rest.ends_with('/');

    for (i, comp) in raw.iter().enumerate() {
        let is_last = i == raw.len() - 1;
        match *comp {
            "" => {} // Duplicate or trailing separator.
            "." => {
                if is_last {
                    trailing_slash = true;
                }
            }
            ".." => {
                if components.last().is_some_and(|c| *c != "..") {
                    components.pop();
                    if is_last {
                        trailing_slash = true;
                    }
                } else if !is_absolute {
                    components.push("..");
                    if is_last {
                        trailing_slash = false;
                    }
                } else if is_last {
                    // Eaten at the top of an absolute path.
                    trailing_slash = false;
                }
            }
            name => {
                components.push(name);
                if is_last {
                    trailing_slash = false;
                }
            }
        }
    }

    let mut result = String::with_capacity(input.len());
    result.push_str(prefix);
    result.push_str(&components.join("/"));
    if trailing_slash && !components.is_empty() {
        result.push('/');
    }
    *path = result;
}

/// For a source-absolute dir like `//base/i18n/`, produces the relative
/// path back up to the source root (`../../`). An empty result means the
/// dir already is the root.
pub fn invert_dir(dir: &SourceDir) -> String {
    let value = dir.value();
    if value.is_empty() {
        return String::new();
    }

    debug_assert!(value.starts_with('/'));
    let begin = if value.starts_with("//") { 2 } else { 1 };

    let mut out = String::new();
    for c in value[begin..].chars() {
        if c == '/' {
            out.push_str("../");
        }
    }
    out
}

/// Checks that a path string points inside the build output directory,
/// which is required for everything a build writes.
pub fn ensure_string_is_in_output_dir(
    output_dir: &SourceDir,
    s: &str,
    originating: &Value,
) -> Result<(), BuildError> {
    let dir_str = output_dir.value();
    // The trailing slash of the dir is not significant for the check.
    let prefix = &dir_str[..dir_str.len().saturating_sub(1)];
    if !prefix.is_empty() && s.starts_with(prefix) {
        return Ok(());
    }
    Err(BuildError::with_help(
        originating.origin_range(),
        "File is not inside the output directory.",
        format!(
            "The given file should be in the output directory. Normally you would\n\
             specify \"$relative_target_output_dir/foo\" or \"$relative_target_gen_dir/foo\".\n\
             I interpreted this as \"{s}\"."
        ),
    ))
}
