// src/core/variables.rs

//! Names of the variables with special meaning to the generators and the
//! per-file programmatic provider. Kept in one place so that generators,
//! providers and documentation agree.

// Per-file built-ins, served by the programmatic provider.
pub const CURRENT_TOOLCHAIN: &str = "current_toolchain";
pub const DEFAULT_TOOLCHAIN: &str = "default_toolchain";
pub const INTERPRETER_PATH: &str = "interpreter_path";
pub const RELATIVE_BUILD_TO_SOURCE_ROOT_DIR: &str = "relative_build_to_source_root_dir";
pub const RELATIVE_ROOT_OUTPUT_DIR: &str = "relative_root_output_dir";
pub const RELATIVE_ROOT_GEN_DIR: &str = "relative_root_gen_dir";
pub const RELATIVE_TARGET_OUTPUT_DIR: &str = "relative_target_output_dir";
pub const RELATIVE_TARGET_GEN_DIR: &str = "relative_target_gen_dir";

// Target variables read by the generators.
pub const ALL_DEPENDENT_CONFIGS: &str = "all_dependent_configs";
pub const CONFIGS: &str = "configs";
pub const DATA: &str = "data";
pub const DATA_DEPS: &str = "datadeps";
pub const DEPS: &str = "deps";
pub const DIRECT_DEPENDENT_CONFIGS: &str = "direct_dependent_configs";
pub const SOURCES: &str = "sources";
pub const TARGET_NAME: &str = "target_name";

// Script (custom) target variables.
pub const ARGS: &str = "args";
pub const OUTPUTS: &str = "outputs";
pub const SCRIPT: &str = "script";

// Copy target variables.
pub const DEST_DIR: &str = "destdir";

// Config values, read for configs and binary targets alike.
pub const CFLAGS: &str = "cflags";
pub const CFLAGS_C: &str = "cflags_c";
pub const CFLAGS_CC: &str = "cflags_cc";
pub const CFLAGS_OBJC: &str = "cflags_objc";
pub const CFLAGS_OBJCC: &str = "cflags_objcc";
pub const DEFINES: &str = "defines";
pub const INCLUDES: &str = "includes";
pub const LDFLAGS: &str = "ldflags";

// Mode switches.
pub const COMPONENT_MODE: &str = "component_mode";

// System vars seeded into every base config.
pub const IS_LINUX: &str = "is_linux";
pub const IS_MAC: &str = "is_mac";
pub const IS_POSIX: &str = "is_posix";
pub const IS_WIN: &str = "is_win";
