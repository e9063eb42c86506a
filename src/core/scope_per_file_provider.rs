// src/core/scope_per_file_provider.rs

use std::sync::Arc;

use crate::core::paths::{SourceFile, invert_dir};
use crate::core::scope::ProgrammaticProvider;
use crate::core::settings::Settings;
use crate::core::toolchain_manager;
use crate::core::value::Value;
use crate::core::variables;

/// Serves the read-only built-in variables whose values depend on which
/// file is being evaluated: toolchain names and the relative output/gen
/// directories. Registered on the root scope of every build-file
/// invocation.
pub struct ScopePerFileProvider {
    settings: Arc<Settings>,
    source_file: SourceFile,
}

impl ScopePerFileProvider {
    pub fn new(settings: Arc<Settings>, source_file: SourceFile) -> Self {
        Self {
            settings,
            source_file,
        }
    }

    /// `//out/gird/` -> `out/gird`.
    fn root_output_dir_no_slash(&self) -> String {
        let build_settings = self.settings.build_settings();
        let dir = build_settings.build_dir().value().to_string();
        dir.trim_start_matches('/').trim_end_matches('/').to_string()
    }

    fn root_gen_dir_no_slash(&self) -> String {
        format!("{}/gen", self.root_output_dir_no_slash())
    }

    /// Relative path from the current file's directory up to the source
    /// root, `.` when the file is at the root.
    fn relative_root_no_slash(&self) -> String {
        let inverted = invert_dir(&self.source_file.dir());
        if inverted.is_empty() {
            ".".to_string()
        } else {
            inverted.trim_end_matches('/').to_string()
        }
    }

    /// `//foo/bar/` -> `foo/bar`; empty at the source root.
    fn file_dir_no_slash(&self) -> String {
        let dir = self.source_file.dir().value().to_string();
        dir.trim_start_matches('/').trim_end_matches('/').to_string()
    }

    fn join_dir(base: String, sub: &str) -> String {
        if sub.is_empty() {
            base
        } else {
            format!("{base}/{sub}")
        }
    }
}

impl ProgrammaticProvider for ScopePerFileProvider {
    fn get_programmatic_value(&self, ident: &str) -> Option<Value> {
        match ident {
            variables::CURRENT_TOOLCHAIN => Some(Value::string(
                None,
                self.settings.toolchain_label().user_visible_name(false),
            )),
            variables::DEFAULT_TOOLCHAIN => {
                let build_settings = self.settings.build_settings();
                toolchain_manager::get_default_toolchain(&build_settings)
                    .map(|label| Value::string(None, label.user_visible_name(false)))
            }
            variables::INTERPRETER_PATH => {
                let build_settings = self.settings.build_settings();
                Some(Value::string(
                    None,
                    build_settings.interpreter_path().display().to_string(),
                ))
            }
            variables::RELATIVE_BUILD_TO_SOURCE_ROOT_DIR => {
                let build_settings = self.settings.build_settings();
                let inverted = invert_dir(build_settings.build_dir());
                let trimmed = inverted.trim_end_matches('/');
                Some(Value::string(
                    None,
                    if trimmed.is_empty() { "." } else { trimmed },
                ))
            }
            variables::RELATIVE_ROOT_OUTPUT_DIR => Some(Value::string(
                None,
                format!(
                    "{}/{}",
                    self.relative_root_no_slash(),
                    self.root_output_dir_no_slash()
                ),
            )),
            variables::RELATIVE_ROOT_GEN_DIR => Some(Value::string(
                None,
                format!(
                    "{}/{}",
                    self.relative_root_no_slash(),
                    self.root_gen_dir_no_slash()
                ),
            )),
            variables::RELATIVE_TARGET_OUTPUT_DIR => {
                let base = format!(
                    "{}/{}/obj",
                    self.relative_root_no_slash(),
                    self.root_output_dir_no_slash()
                );
                Some(Value::string(
                    None,
                    Self::join_dir(base, &self.file_dir_no_slash()),
                ))
            }
            variables::RELATIVE_TARGET_GEN_DIR => {
                let base = format!(
                    "{}/{}",
                    self.relative_root_no_slash(),
                    self.root_gen_dir_no_slash()
                );
                Some(Value::string(
                    None,
                    Self::join_dir(base, &self.file_dir_no_slash()),
                ))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The dir helpers are pure string functions; the toolchain-dependent
    // values need a full build and are covered by the end-to-end tests.

    fn provider_for(file: &str) -> ScopePerFileProvider {
        ScopePerFileProvider::new(Settings::for_tests(), SourceFile::new(file))
    }

    #[test]
    fn relative_root_walks_up_from_the_file_dir() {
        assert_eq!(provider_for("//BUILD.gird").relative_root_no_slash(), ".");
        assert_eq!(provider_for("//foo/BUILD.gird").relative_root_no_slash(), "..");
        assert_eq!(
            provider_for("//foo/bar/BUILD.gird").relative_root_no_slash(),
            "../.."
        );
    }

    #[test]
    fn file_dir_strips_decorations() {
        assert_eq!(provider_for("//BUILD.gird").file_dir_no_slash(), "");
        assert_eq!(provider_for("//foo/bar/BUILD.gird").file_dir_no_slash(), "foo/bar");
    }
}
