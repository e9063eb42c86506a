// src/core/label.rs

use crate::core::err::BuildError;
use crate::core::paths::SourceDir;
use crate::core::value::Value;

/// The fully-qualified name of an item: `dir:name(toolchain_dir:toolchain_name)`.
/// Labels are the sole identity in the item graph. A null label (null dir)
/// is the sentinel used briefly while the default toolchain name is still
/// unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    dir: SourceDir,
    name: String,
    toolchain_dir: SourceDir,
    toolchain_name: String,
}

impl Label {
    pub fn new(
        dir: SourceDir,
        name: impl Into<String>,
        toolchain_dir: SourceDir,
        toolchain_name: impl Into<String>,
    ) -> Self {
        Self {
            dir,
            name: name.into(),
            toolchain_dir,
            toolchain_name: toolchain_name.into(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.dir.is_null()
    }

    pub fn dir(&self) -> &SourceDir {
        &self.dir
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn toolchain_dir(&self) -> &SourceDir {
        &self.toolchain_dir
    }

    pub fn toolchain_name(&self) -> &str {
        &self.toolchain_name
    }

    /// The toolchain part as its own (toolchain-less) label.
    pub fn toolchain_label(&self) -> Label {
        Label::new(
            self.toolchain_dir.clone(),
            self.toolchain_name.clone(),
            SourceDir::default(),
            String::new(),
        )
    }

    pub fn toolchains_equal(&self, other: &Label) -> bool {
        self.toolchain_dir == other.toolchain_dir && self.toolchain_name == other.toolchain_name
    }

    /// Resolves a label string from a build file relative to the current
    /// directory and toolchain. Accepted forms:
    ///
    ///   `//dir:name`    absolute in the source tree
    ///   `:name`         target in the current build file
    ///   `//dir`         implicit name from the last path component
    ///   `sub/dir:name`  relative to the current directory
    ///
    /// plus an optional `(toolchain_label)` suffix.
    pub fn resolve(
        current_dir: &SourceDir,
        current_toolchain: &Label,
        input: &Value,
    ) -> Result<Label, BuildError> {
        let input_string = input.require_string().map_err(|_| {
            BuildError::new(input.origin_range(), "Dependency is not a string.")
        })?;
        if input_string.is_empty() {
            return Err(BuildError::new(
                input.origin_range(),
                "Dependency string is empty.",
            ));
        }

        let mut label = Label::default();
        resolve_into(
            current_dir,
            current_toolchain,
            input,
            input_string,
            &mut label,
            true,
        )?;
        Ok(label)
    }

    /// Formats this label for the user: `//dir:name` or
    /// `//dir:name(//tc_dir:tc_name)`.
    pub fn user_visible_name(&self, include_toolchain: bool) -> String {
        if self.dir.is_null() {
            return String::new();
        }

        let mut ret = String::with_capacity(self.dir.value().len() + self.name.len() + 2);
        ret.push_str(&dir_with_no_trailing_slash(&self.dir));
        ret.push(':');
        ret.push_str(&self.name);

        if include_toolchain {
            ret.push('(');
            if !self.toolchain_dir.is_null() && !self.toolchain_name.is_empty() {
                ret.push_str(&dir_with_no_trailing_slash(&self.toolchain_dir));
                ret.push(':');
                ret.push_str(&self.toolchain_name);
            }
            ret.push(')');
        }
        ret
    }
}

fn dir_with_no_trailing_slash(dir: &SourceDir) -> String {
    let v = dir.value();
    // Careful not to trim "/" or "//" themselves.
    if v.len() > 2 {
        v[..v.len() - 1].to_string()
    } else {
        v.to_string()
    }
}

/// Splits and resolves one label string. When `allow_toolchain` is false a
/// `(...)` part is an error, which is how recursively-parsed toolchain
/// labels are prevented from nesting further.
fn resolve_into(
    current_dir: &SourceDir,
    current_toolchain: &Label,
    original_value: &Value,
    input: &str,
    out: &mut Label,
    allow_toolchain: bool,
) -> Result<(), BuildError> {
    let path_separator = input.find([':', '(']);

    let (location_piece, name_piece, toolchain_piece) = match path_separator {
        None => (input, "", ""),
        Some(sep) => {
            let location = &input[..sep];
            let toolchain_separator = input[sep..].find('(').map(|i| i + sep);
            match toolchain_separator {
                None => (location, &input[sep + 1..], ""),
                Some(tc_sep) => {
                    if !allow_toolchain {
                        return Err(BuildError::with_help(
                            original_value.origin_range(),
                            "Toolchain has a toolchain.",
                            "Your toolchain definition (inside the parens) seems to itself \
                             have a\ntoolchain. Don't do this.",
                        ));
                    }
                    let name = if tc_sep > sep {
                        &input[sep + 1..tc_sep]
                    } else {
                        ""
                    };
                    if !input.ends_with(')') {
                        return Err(BuildError::with_help(
                            original_value.origin_range(),
                            "Bad toolchain name.",
                            "The toolchain name must end in a \")\" at the end of the label.",
                        ));
                    }
                    (location, name, &input[tc_sep + 1..input.len() - 1])
                }
            }
        }
    };

    if location_piece.is_empty() && name_piece.is_empty() {
        return Err(BuildError::new(
            original_value.origin_range(),
            "This doesn't specify a dependency.",
        ));
    }

    // Labels may not start with a single slash; everything lives inside the
    // source root.
    if location_piece.starts_with('/') && !location_piece.starts_with("//") {
        return Err(BuildError::with_help(
            original_value.origin_range(),
            "Label can't start with a single slash.",
            "Labels must be either relative (no slash at the beginning) or be absolute\n\
             inside the source root (two slashes at the beginning).",
        ));
    }

    out.dir = if location_piece.is_empty() {
        current_dir.clone()
    } else {
        current_dir.resolve_relative_dir(location_piece)
    };

    if name_piece.is_empty() {
        // Implicit name from the last path component.
        let loc = out.dir.value();
        if loc.len() <= 1 {
            return Err(BuildError::new(
                original_value.origin_range(),
                "This dependency name is empty.",
            ));
        }
        let trimmed = &loc[..loc.len() - 1];
        let next_to_last_slash = trimmed.rfind('/').unwrap_or(0);
        out.name = trimmed[next_to_last_slash + 1..].to_string();
        if out.name.is_empty() {
            return Err(BuildError::new(
                original_value.origin_range(),
                "This dependency name is empty.",
            ));
        }
    } else {
        out.name = name_piece.to_string();
    }

    if allow_toolchain {
        if toolchain_piece.is_empty() {
            out.toolchain_dir = current_toolchain.dir.clone();
            out.toolchain_name = current_toolchain.name.clone();
        } else {
            let mut tc = Label::default();
            resolve_into(
                current_dir,
                current_toolchain,
                original_value,
                toolchain_piece,
                &mut tc,
                false,
            )?;
            out.toolchain_dir = tc.dir;
            out.toolchain_name = tc.name;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_toolchain() -> Label {
        Label::new(SourceDir::new("//tc/"), "default", SourceDir::default(), "")
    }

    fn resolve(input: &str) -> Result<Label, BuildError> {
        let current = SourceDir::new("//chrome/");
        Label::resolve(&current, &default_toolchain(), &Value::string(None, input))
    }

    #[test]
    fn absolute_label() {
        let l = resolve("//base:base_i18n").unwrap();
        assert_eq!(l.dir().value(), "//base/");
        assert_eq!(l.name(), "base_i18n");
        assert_eq!(l.toolchain_dir().value(), "//tc/");
        assert_eq!(l.toolchain_name(), "default");
    }

    #[test]
    fn name_only_uses_current_dir() {
        let l = resolve(":renderer").unwrap();
        assert_eq!(l.dir().value(), "//chrome/");
        assert_eq!(l.name(), "renderer");
    }

    #[test]
    fn implicit_name_from_last_component() {
        let l = resolve("//base").unwrap();
        assert_eq!(l.dir().value(), "//base/");
        assert_eq!(l.name(), "base");

        let l = resolve("//base/i18n").unwrap();
        assert_eq!(l.dir().value(), "//base/i18n/");
        assert_eq!(l.name(), "i18n");
    }

    #[test]
    fn relative_label() {
        let l = resolve("renderer:core").unwrap();
        assert_eq!(l.dir().value(), "//chrome/renderer/");
        assert_eq!(l.name(), "core");
    }

    #[test]
    fn explicit_toolchain() {
        let l = resolve("//base:base(//build:win64)").unwrap();
        assert_eq!(l.toolchain_dir().value(), "//build/");
        assert_eq!(l.toolchain_name(), "win64");
    }

    #[test]
    fn toolchain_may_not_nest() {
        assert!(resolve("//base:b(//tc:x(//tc:y))").is_err());
    }

    #[test]
    fn error_cases() {
        assert!(resolve("").is_err());
        assert!(resolve(":").is_err());
        assert!(resolve("/base:b").is_err());
        assert!(resolve("//base:b(//tc:x").is_err()); // Missing ")".
        assert!(Label::resolve(
            &SourceDir::new("//a/"),
            &default_toolchain(),
            &Value::integer(None, 3)
        )
        .is_err());
    }

    #[test]
    fn user_visible_name_formats() {
        let l = resolve("//base:base").unwrap();
        assert_eq!(l.user_visible_name(false), "//base:base");
        assert_eq!(l.user_visible_name(true), "//base:base(//tc:default)");

        let toolchainless = l.toolchain_label();
        assert_eq!(toolchainless.user_visible_name(true), "//tc:default()");
    }
}
