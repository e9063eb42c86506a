// src/core/item.rs

use crate::core::config::Config;
use crate::core::label::Label;
use crate::core::target::Target;
use crate::core::toolchain::Toolchain;

/// A named entity participating in the dependency graph.
#[derive(Debug, Clone)]
pub enum Item {
    Target(Target),
    Config(Config),
    Toolchain(Toolchain),
}

impl Item {
    pub fn label(&self) -> &Label {
        match self {
            Self::Target(t) => &t.label,
            Self::Config(c) => &c.label,
            Self::Toolchain(t) => &t.label,
        }
    }

    /// Name for the kind of item, used in error messages like
    /// "Previously you specified a config with this name instead."
    pub fn item_type_name(&self) -> &'static str {
        match self {
            Self::Target(_) => "target",
            Self::Config(_) => "config",
            Self::Toolchain(_) => "toolchain",
        }
    }

    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Self::Target(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_config(&self) -> Option<&Config> {
        match self {
            Self::Config(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_toolchain(&self) -> Option<&Toolchain> {
        match self {
            Self::Toolchain(t) => Some(t),
            _ => None,
        }
    }
}
