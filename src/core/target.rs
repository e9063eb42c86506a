// src/core/target.rs

use std::collections::BTreeSet;

use crate::core::config_values::ConfigValues;
use crate::core::label::Label;
use crate::core::location::LocationRange;
use crate::core::paths::{SourceDir, SourceFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputType {
    #[default]
    Unknown,
    Group,
    Executable,
    SharedLibrary,
    StaticLibrary,
    CopyFiles,
    Custom,
}

impl OutputType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Group => "group",
            Self::Executable => "executable",
            Self::SharedLibrary => "shared_library",
            Self::StaticLibrary => "static_library",
            Self::CopyFiles => "copy",
            Self::Custom => "custom",
        }
    }
}

/// The values for script (custom) targets: the script to run, its argument
/// templates and the declared outputs.
#[derive(Debug, Clone, Default)]
pub struct ScriptValues {
    pub script: SourceFile,
    pub args: Vec<String>,
    pub outputs: Vec<SourceFile>,
}

/// A producible artefact together with its dependencies and flags. Created
/// in a skeletal form when first referenced; the generator fills in the
/// rest when the declaration executes, and the resolver adds the inherited
/// state when all dependencies are resolved.
#[derive(Debug, Clone, Default)]
pub struct Target {
    pub label: Label,
    pub output_type: OutputType,

    pub sources: Vec<SourceFile>,
    pub data: Vec<SourceFile>,

    /// Linked dependencies.
    pub deps: Vec<Label>,
    /// Non-linked dependencies.
    pub data_deps: Vec<Label>,

    pub configs: Vec<Label>,
    /// Configs pushed to every dependent, direct and indirect.
    pub all_dependent_configs: Vec<Label>,
    /// Configs pushed only to direct dependents.
    pub direct_dependent_configs: Vec<Label>,

    /// Libraries gathered from transitive deps, to be linked into the final
    /// binary. Not pushed beyond shared-library boundaries.
    pub inherited_libraries: BTreeSet<Label>,

    /// Flags set directly on this target (binary targets only).
    pub config_values: ConfigValues,
    /// Script values (custom targets only).
    pub script_values: ScriptValues,
    /// Destination (copy targets only).
    pub dest_dir: SourceDir,

    /// Set once the declaration for this target has executed, along with
    /// where it was, for duplicate-definition errors.
    pub generated: bool,
    pub generator_range: LocationRange,
}

impl Target {
    pub fn new(label: Label) -> Self {
        Self {
            label,
            ..Default::default()
        }
    }

    pub fn is_linkable(&self) -> bool {
        matches!(
            self.output_type,
            OutputType::StaticLibrary | OutputType::SharedLibrary
        )
    }

    /// Runs when this target's node is resolved: pulls dependent configs
    /// and inherited libraries up from each resolved dependency.
    ///
    /// - A dep's all-dependent configs attach here and keep propagating.
    /// - A dep's direct-dependent configs attach here only.
    /// - Linkable deps enter the inherited-libraries set.
    /// - A dep's own inherited libraries are merged unless the dep is a
    ///   shared library or executable, which encapsulate their transitive
    ///   libraries.
    pub fn pull_dependent_info(&mut self, lookup: &dyn Fn(&Label) -> Option<Target>) {
        for dep_label in self.deps.clone() {
            let Some(dep) = lookup(&dep_label) else {
                continue;
            };

            for config in &dep.all_dependent_configs {
                self.configs.push(config.clone());
                self.all_dependent_configs.push(config.clone());
            }
            for config in &dep.direct_dependent_configs {
                self.configs.push(config.clone());
            }

            if dep.is_linkable() {
                self.inherited_libraries.insert(dep.label.clone());
            }

            if dep.output_type != OutputType::SharedLibrary
                && dep.output_type != OutputType::Executable
            {
                for lib in &dep.inherited_libraries {
                    self.inherited_libraries.insert(lib.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::paths::SourceDir;
    use std::collections::HashMap;

    fn label(name: &str) -> Label {
        Label::new(SourceDir::new("//"), name, SourceDir::new("//tc/"), "d")
    }

    fn target(name: &str, output_type: OutputType) -> Target {
        let mut t = Target::new(label(name));
        t.output_type = output_type;
        t
    }

    fn resolve_order(map: &mut HashMap<String, Target>, order: &[&str]) {
        for name in order {
            let mut t = map.remove(*name).expect("target exists");
            let snapshot = map.clone();
            t.pull_dependent_info(&move |l| {
                snapshot.get(l.name()).cloned()
            });
            map.insert((*name).to_string(), t);
        }
    }

    #[test]
    fn all_dependent_configs_propagate_transitively() {
        // A -> B -> C, where C declares an all-dependent config.
        let mut c = target("c", OutputType::StaticLibrary);
        c.all_dependent_configs.push(label("x_cfg"));
        let mut b = target("b", OutputType::StaticLibrary);
        b.deps.push(label("c"));
        let mut a = target("a", OutputType::Executable);
        a.deps.push(label("b"));

        let mut map = HashMap::new();
        map.insert("c".to_string(), c);
        map.insert("b".to_string(), b);
        map.insert("a".to_string(), a);
        resolve_order(&mut map, &["c", "b", "a"]);

        assert!(map["b"].configs.contains(&label("x_cfg")));
        assert!(map["a"].configs.contains(&label("x_cfg")));
        assert!(!map["c"].configs.contains(&label("x_cfg")));
    }

    #[test]
    fn direct_dependent_configs_reach_only_direct_dependents() {
        let mut c = target("c", OutputType::StaticLibrary);
        c.direct_dependent_configs.push(label("d_cfg"));
        let mut b = target("b", OutputType::StaticLibrary);
        b.deps.push(label("c"));
        let mut a = target("a", OutputType::Executable);
        a.deps.push(label("b"));

        let mut map = HashMap::new();
        map.insert("c".to_string(), c);
        map.insert("b".to_string(), b);
        map.insert("a".to_string(), a);
        resolve_order(&mut map, &["c", "b", "a"]);

        assert!(map["b"].configs.contains(&label("d_cfg")));
        assert!(!map["a"].configs.contains(&label("d_cfg")));
    }

    #[test]
    fn shared_libraries_block_transitive_library_inheritance() {
        let base = target("base", OutputType::StaticLibrary);
        let util = target("util", OutputType::StaticLibrary);
        let mut shim = target("shim", OutputType::SharedLibrary);
        shim.deps.push(label("base"));
        shim.deps.push(label("util"));
        let mut app = target("app", OutputType::Executable);
        app.deps.push(label("shim"));

        let mut map = HashMap::new();
        map.insert("base".to_string(), base);
        map.insert("util".to_string(), util);
        map.insert("shim".to_string(), shim);
        map.insert("app".to_string(), app);
        resolve_order(&mut map, &["base", "util", "shim", "app"]);

        let shim_libs: Vec<&str> = map["shim"]
            .inherited_libraries
            .iter()
            .map(|l| l.name())
            .collect();
        assert_eq!(shim_libs, vec!["base", "util"]);

        let app_libs: Vec<&str> = map["app"]
            .inherited_libraries
            .iter()
            .map(|l| l.name())
            .collect();
        assert_eq!(app_libs, vec!["shim"]);
    }

    #[test]
    fn static_libraries_pass_inherited_libraries_through() {
        let base = target("base", OutputType::StaticLibrary);
        let mut mid = target("mid", OutputType::StaticLibrary);
        mid.deps.push(label("base"));
        let mut app = target("app", OutputType::Executable);
        app.deps.push(label("mid"));

        let mut map = HashMap::new();
        map.insert("base".to_string(), base);
        map.insert("mid".to_string(), mid);
        map.insert("app".to_string(), app);
        resolve_order(&mut map, &["base", "mid", "app"]);

        let app_libs: Vec<&str> = map["app"]
            .inherited_libraries
            .iter()
            .map(|l| l.name())
            .collect();
        assert_eq!(app_libs, vec!["base", "mid"]);
    }
}
