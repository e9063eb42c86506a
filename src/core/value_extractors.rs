// src/core/value_extractors.rs

use crate::core::err::BuildError;
use crate::core::label::Label;
use crate::core::paths::{SourceDir, SourceFile};
use crate::core::value::Value;

/// Extracts a list of plain strings.
pub fn extract_list_of_string_values(value: &Value) -> Result<Vec<String>, BuildError> {
    let list = value.require_list()?;
    let mut out = Vec::with_capacity(list.len());
    for item in list {
        out.push(item.require_string()?.to_string());
    }
    Ok(out)
}

/// Extracts a list of files resolved against the current directory.
/// System-absolute paths are rejected: everything a build reads should be
/// inside the source tree.
pub fn extract_list_of_relative_files(
    value: &Value,
    current_dir: &SourceDir,
) -> Result<Vec<SourceFile>, BuildError> {
    let list = value.require_list()?;
    let mut out = Vec::with_capacity(list.len());
    for item in list {
        let file = current_dir.resolve_relative_file(item.require_string()?);
        if file.is_system_absolute() {
            return Err(BuildError::with_help(
                item.origin_range(),
                "System-absolute file path.",
                "You can't list a system-absolute file path here. Please include only\n\
                 files in the source tree. Maybe you meant to begin with two slashes to\n\
                 indicate an absolute path in the source tree?",
            ));
        }
        out.push(file);
    }
    Ok(out)
}

/// Extracts a list of directories resolved against the current directory.
pub fn extract_list_of_relative_dirs(
    value: &Value,
    current_dir: &SourceDir,
) -> Result<Vec<SourceDir>, BuildError> {
    let list = value.require_list()?;
    let mut out = Vec::with_capacity(list.len());
    for item in list {
        out.push(current_dir.resolve_relative_dir(item.require_string()?));
    }
    Ok(out)
}

/// Extracts a list of labels resolved against the current directory and
/// toolchain.
pub fn extract_list_of_labels(
    value: &Value,
    current_dir: &SourceDir,
    current_toolchain: &Label,
) -> Result<Vec<Label>, BuildError> {
    let list = value.require_list()?;
    let mut out = Vec::with_capacity(list.len());
    for item in list {
        out.push(Label::resolve(current_dir, current_toolchain, item)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_reject_non_string_elements() {
        let good = Value::list(None, vec![Value::string(None, "a")]);
        assert_eq!(extract_list_of_string_values(&good).unwrap(), vec!["a"]);

        let bad = Value::list(None, vec![Value::integer(None, 1)]);
        assert!(extract_list_of_string_values(&bad).is_err());
        assert!(extract_list_of_string_values(&Value::string(None, "x")).is_err());
    }

    #[test]
    fn relative_files_resolve_and_reject_system_absolute() {
        let dir = SourceDir::new("//base/");
        let v = Value::list(
            None,
            vec![
                Value::string(None, "a.cc"),
                Value::string(None, "//other/b.cc"),
            ],
        );
        let files = extract_list_of_relative_files(&v, &dir).unwrap();
        assert_eq!(files[0].value(), "//base/a.cc");
        assert_eq!(files[1].value(), "//other/b.cc");

        let bad = Value::list(None, vec![Value::string(None, "/abs/a.cc")]);
        assert!(extract_list_of_relative_files(&bad, &dir).is_err());
    }

    #[test]
    fn labels_resolve_against_current_context() {
        let dir = SourceDir::new("//chrome/");
        let tc = Label::new(SourceDir::new("//tc/"), "d", SourceDir::default(), "");
        let v = Value::list(None, vec![Value::string(None, ":renderer")]);
        let labels = extract_list_of_labels(&v, &dir, &tc).unwrap();
        assert_eq!(labels[0].user_visible_name(false), "//chrome:renderer");
    }
}
