// src/constants.rs

/// Name of the build description file looked up in every directory a label
/// points into.
pub const BUILD_FILE_NAME: &str = "BUILD.gird";

/// Dotfile marking the source root. Found by walking up from the starting
/// directory.
pub const DOT_FILE_NAME: &str = ".girder";

/// Default build output directory, as a source-absolute dir.
pub const DEFAULT_BUILD_DIR: &str = "//out/gird/";

/// File name of the emitted manifest inside the build directory.
pub const MANIFEST_FILE_NAME: &str = "girder.manifest.json";

/// Root build file evaluated for the default toolchain.
pub const ROOT_BUILD_FILE: &str = "//BUILD.gird";
