// src/core/config_values.rs

use crate::core::paths::SourceDir;

/// The compile/link flag fragments carried by a config, and set directly on
/// binary targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigValues {
    pub includes: Vec<SourceDir>,
    pub defines: Vec<String>,
    pub cflags: Vec<String>,
    pub cflags_c: Vec<String>,
    pub cflags_cc: Vec<String>,
    pub cflags_objc: Vec<String>,
    pub cflags_objcc: Vec<String>,
    pub ldflags: Vec<String>,
}

impl ConfigValues {
    pub fn is_empty(&self) -> bool {
        self.includes.is_empty()
            && self.defines.is_empty()
            && self.cflags.is_empty()
            && self.cflags_c.is_empty()
            && self.cflags_cc.is_empty()
            && self.cflags_objc.is_empty()
            && self.cflags_objcc.is_empty()
            && self.ldflags.is_empty()
    }

    /// Appends everything from another record, preserving order. Used when
    /// flattening a target's config set for the back-ends.
    pub fn append(&mut self, other: &ConfigValues) {
        self.includes.extend(other.includes.iter().cloned());
        self.defines.extend(other.defines.iter().cloned());
        self.cflags.extend(other.cflags.iter().cloned());
        self.cflags_c.extend(other.cflags_c.iter().cloned());
        self.cflags_cc.extend(other.cflags_cc.iter().cloned());
        self.cflags_objc.extend(other.cflags_objc.iter().cloned());
        self.cflags_objcc.extend(other.cflags_objcc.iter().cloned());
        self.ldflags.extend(other.ldflags.iter().cloned());
    }
}
