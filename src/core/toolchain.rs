// src/core/toolchain.rs

use crate::core::label::Label;

/// The fixed set of tools a toolchain can define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolType {
    Cc,
    Cxx,
    ObjC,
    ObjCxx,
    Asm,
    Alink,
    Solink,
    Link,
    Stamp,
    Copy,
}

impl ToolType {
    pub const ALL: [ToolType; 10] = [
        Self::Cc,
        Self::Cxx,
        Self::ObjC,
        Self::ObjCxx,
        Self::Asm,
        Self::Alink,
        Self::Solink,
        Self::Link,
        Self::Stamp,
        Self::Copy,
    ];

    /// Maps the name used in `tool("...")` declarations. Unknown names are
    /// rejected by the caller.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cc" => Some(Self::Cc),
            "cxx" => Some(Self::Cxx),
            "objc" => Some(Self::ObjC),
            "objcxx" => Some(Self::ObjCxx),
            "asm" => Some(Self::Asm),
            "alink" => Some(Self::Alink),
            "solink" => Some(Self::Solink),
            "link" => Some(Self::Link),
            "stamp" => Some(Self::Stamp),
            "copy" => Some(Self::Copy),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Cc => "cc",
            Self::Cxx => "cxx",
            Self::ObjC => "objc",
            Self::ObjCxx => "objcxx",
            Self::Asm => "asm",
            Self::Alink => "alink",
            Self::Solink => "solink",
            Self::Link => "link",
            Self::Stamp => "stamp",
            Self::Copy => "copy",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Cc => 0,
            Self::Cxx => 1,
            Self::ObjC => 2,
            Self::ObjCxx => 3,
            Self::Asm => 4,
            Self::Alink => 5,
            Self::Solink => 6,
            Self::Link => 7,
            Self::Stamp => 8,
            Self::Copy => 9,
        }
    }
}

/// The command template strings for one tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tool {
    pub command: String,
    pub depfile: String,
    pub deps: String,
    pub description: String,
    pub pool: String,
    pub restat: String,
    pub rspfile: String,
    pub rspfile_content: String,
}

impl Tool {
    pub fn is_empty(&self) -> bool {
        self.command.is_empty()
            && self.depfile.is_empty()
            && self.deps.is_empty()
            && self.description.is_empty()
            && self.pool.is_empty()
            && self.restat.is_empty()
            && self.rspfile.is_empty()
            && self.rspfile_content.is_empty()
    }
}

/// A named collection of tool command templates. Participates in the item
/// graph so targets can depend on their toolchain having been loaded. The
/// label never changes and may be read from any thread; the tools must not
/// be read until the graph node is resolved.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub label: Label,
    tools: [Tool; 10],
}

impl Toolchain {
    pub fn new(label: Label) -> Self {
        Self {
            label,
            tools: Default::default(),
        }
    }

    pub fn tool(&self, tool_type: ToolType) -> &Tool {
        &self.tools[tool_type.index()]
    }

    pub fn set_tool(&mut self, tool_type: ToolType, tool: Tool) {
        self.tools[tool_type.index()] = tool;
    }
}
