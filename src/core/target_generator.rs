// src/core/target_generator.rs

use std::sync::Arc;

use log::debug;

use crate::core::config;
use crate::core::config_values_generator::generate_config_values;
use crate::core::err::BuildError;
use crate::core::item_tree::TreeOps;
use crate::core::label::Label;
use crate::core::parse_tree::ParseNode;
use crate::core::paths::{SourceDir, ensure_string_is_in_output_dir};
use crate::core::scope::Scope;
use crate::core::target::{OutputType, Target};
use crate::core::target_manager;
use crate::core::toolchain_manager;
use crate::core::value::Value;
use crate::core::value_extractors::{
    extract_list_of_labels, extract_list_of_relative_files, extract_list_of_string_values,
};
use crate::core::variables;

/// Runs the generator for one target declaration: claims the label in the
/// item graph, reads the populated block scope into a `Target` payload,
/// records the dependency edges, and marks generation complete.
///
/// `output_type_name` is the name of the declaring function (`executable`,
/// `group`, ...), already resolved for `component`.
pub fn generate_target(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
    output_type_name: &str,
    input_dir: &SourceDir,
) -> Result<(), BuildError> {
    let output_type = match output_type_name {
        "group" => OutputType::Group,
        "executable" => OutputType::Executable,
        "shared_library" => OutputType::SharedLibrary,
        "static_library" => OutputType::StaticLibrary,
        "copy" => OutputType::CopyFiles,
        "custom" => OutputType::Custom,
        _ => {
            return Err(function.make_error_with_help(
                "Not a known output type.",
                format!("\"{output_type_name}\" doesn't name a target type."),
            ));
        }
    };

    if args.len() != 1 || args[0].as_string().is_none() {
        return Err(function.make_error_with_help(
            "Target generator requires one string argument.",
            "Otherwise I'm not sure what to call this target.",
        ));
    }
    let name = args[0].as_string().unwrap_or_default().to_string();

    let settings = scope.settings().clone();
    let build_settings = settings.build_settings();
    let toolchain_label = settings.toolchain_label();
    let label = Label::new(
        input_dir.clone(),
        name,
        toolchain_label.dir().clone(),
        toolchain_label.name(),
    );

    if build_settings.scheduler().verbose_logging() {
        build_settings
            .scheduler()
            .log("Generating target", label.user_visible_name(true));
    } else {
        debug!("generating target {}", label.user_visible_name(true));
    }

    // Claim the label: this catches duplicate declarations and mismatched
    // kinds before we invest in reading the block.
    {
        let mut guard = build_settings.item_tree().lock();
        let mut ops = TreeOps::new(&mut guard, &build_settings);
        target_manager::get_target(&mut ops, &label, function.range(), None)?;
        let fires = std::mem::take(&mut ops.fire);
        drop(ops);
        drop(guard);
        toolchain_manager::fire(&build_settings, fires);
    }

    // Read the block scope into the payload. No locks are held while the
    // scope is consulted.
    let mut target = Target::new(label.clone());
    target.output_type = output_type;
    target.generated = true;
    target.generator_range = function.range();

    {
        let mut generator = TargetGenerator {
            scope: &mut *scope,
            function,
            input_dir,
            toolchain_label: &toolchain_label,
            target: &mut target,
        };
        generator.fill_dependent_configs()?;
        generator.fill_data()?;
        generator.fill_dependencies()?;
        match output_type {
            OutputType::Executable | OutputType::SharedLibrary | OutputType::StaticLibrary => {
                generator.fill_sources()?;
                generator.fill_configs()?;
            }
            OutputType::Group => {}
            OutputType::CopyFiles => {
                generator.fill_sources()?;
                generator.fill_dest_dir()?;
            }
            OutputType::Custom => {
                generator.fill_sources()?;
                generator.fill_script()?;
                generator.fill_script_args()?;
                generator.fill_outputs()?;
            }
            OutputType::Unknown => unreachable!("mapped above"),
        }
    }
    if matches!(
        output_type,
        OutputType::Executable | OutputType::SharedLibrary | OutputType::StaticLibrary
    ) {
        // Flags set directly on the target use the same reader as configs.
        target.config_values = generate_config_values(scope, input_dir)?;
    }

    // Wire the graph: config and dep references become edges (creating
    // referenced nodes and scheduling their files as needed), binary and
    // copy targets wait on their toolchain, and the node flips to defined.
    let mut guard = build_settings.item_tree().lock();
    let mut ops = TreeOps::new(&mut guard, &build_settings);

    for config_label in target
        .configs
        .iter()
        .chain(&target.all_dependent_configs)
        .chain(&target.direct_dependent_configs)
    {
        config::get_or_create_config(&mut ops, config_label, function.range(), Some(&label))?;
    }
    for dep_label in target.deps.iter().chain(&target.data_deps) {
        target_manager::get_target(&mut ops, dep_label, function.range(), Some(&label))?;
    }

    // Script outputs don't depend on the toolchain, so custom targets (and
    // groups, which build nothing) skip the toolchain edge.
    if matches!(
        output_type,
        OutputType::Executable
            | OutputType::SharedLibrary
            | OutputType::StaticLibrary
            | OutputType::CopyFiles
    ) {
        toolchain_manager::ensure_toolchain_item_node(&mut ops, &toolchain_label);
        ops.add_dependency(&label, &toolchain_label, function.range())?;
    }

    target_manager::target_generation_complete(&mut ops, &label, target)?;

    let fires = std::mem::take(&mut ops.fire);
    drop(ops);
    drop(guard);
    toolchain_manager::fire(&build_settings, fires);
    Ok(())
}

struct TargetGenerator<'a, 'b, 'c> {
    scope: &'a mut Scope<'b>,
    function: &'c Arc<ParseNode>,
    input_dir: &'c SourceDir,
    toolchain_label: &'c Label,
    target: &'a mut Target,
}

impl TargetGenerator<'_, '_, '_> {
    fn fill_sources(&mut self) -> Result<(), BuildError> {
        if let Some(value) = self.scope.get_value(variables::SOURCES, true) {
            self.target.sources = extract_list_of_relative_files(&value, self.input_dir)?;
        }
        Ok(())
    }

    fn fill_data(&mut self) -> Result<(), BuildError> {
        if let Some(value) = self.scope.get_value(variables::DATA, true) {
            self.target.data = extract_list_of_relative_files(&value, self.input_dir)?;
        }
        Ok(())
    }

    fn fill_configs(&mut self) -> Result<(), BuildError> {
        if let Some(value) = self.scope.get_value(variables::CONFIGS, true) {
            self.target.configs =
                extract_list_of_labels(&value, self.input_dir, self.toolchain_label)?;
        }
        Ok(())
    }

    fn fill_dependent_configs(&mut self) -> Result<(), BuildError> {
        if let Some(value) = self.scope.get_value(variables::ALL_DEPENDENT_CONFIGS, true) {
            self.target.all_dependent_configs =
                extract_list_of_labels(&value, self.input_dir, self.toolchain_label)?;
        }
        if let Some(value) = self
            .scope
            .get_value(variables::DIRECT_DEPENDENT_CONFIGS, true)
        {
            self.target.direct_dependent_configs =
                extract_list_of_labels(&value, self.input_dir, self.toolchain_label)?;
        }
        Ok(())
    }

    fn fill_dependencies(&mut self) -> Result<(), BuildError> {
        if let Some(value) = self.scope.get_value(variables::DEPS, true) {
            self.target.deps =
                extract_list_of_labels(&value, self.input_dir, self.toolchain_label)?;
        }
        if let Some(value) = self.scope.get_value(variables::DATA_DEPS, true) {
            self.target.data_deps =
                extract_list_of_labels(&value, self.input_dir, self.toolchain_label)?;
        }
        Ok(())
    }

    fn fill_script(&mut self) -> Result<(), BuildError> {
        let Some(value) = self.scope.get_value(variables::SCRIPT, true) else {
            return Err(self
                .function
                .make_error("This target type requires a \"script\"."));
        };
        let script = value.require_string()?;
        self.target.script_values.script = self.input_dir.resolve_relative_file(script);
        Ok(())
    }

    fn fill_script_args(&mut self) -> Result<(), BuildError> {
        if let Some(value) = self.scope.get_value(variables::ARGS, true) {
            self.target.script_values.args = extract_list_of_string_values(&value)?;
        }
        Ok(())
    }

    fn fill_outputs(&mut self) -> Result<(), BuildError> {
        let Some(value) = self.scope.get_value(variables::OUTPUTS, true) else {
            return Ok(());
        };
        let outputs = extract_list_of_relative_files(&value, self.input_dir)?;

        // Everything a build step writes must land in the output dir.
        let build_dir = self
            .scope
            .settings()
            .build_settings()
            .build_dir()
            .clone();
        let elements = value.as_list().unwrap_or_default();
        for (output, element) in outputs.iter().zip(elements) {
            ensure_string_is_in_output_dir(&build_dir, output.value(), element)?;
        }
        self.target.script_values.outputs = outputs;
        Ok(())
    }

    fn fill_dest_dir(&mut self) -> Result<(), BuildError> {
        let Some(value) = self.scope.get_value(variables::DEST_DIR, true) else {
            return Err(self
                .function
                .make_error("This target type requires a \"destdir\"."));
        };
        let dest = value.require_string()?.to_string();

        let build_dir = self
            .scope
            .settings()
            .build_settings()
            .build_dir()
            .clone();
        let resolved = self.input_dir.resolve_relative_dir(&dest);
        ensure_string_is_in_output_dir(&build_dir, resolved.value(), &value)?;
        self.target.dest_dir = resolved;
        Ok(())
    }
}
