// src/core/functions_target.rs

use std::sync::Arc;

use crate::core::err::BuildError;
use crate::core::functions::{
    ensure_not_processing_build_config, ensure_not_processing_import, fill_target_block_scope,
    source_dir_for_function_call,
};
use crate::core::parse_tree::{self, ParseNode};
use crate::core::scope::Scope;
use crate::core::target_generator::generate_target;
use crate::core::value::{Value, ValueKind};
use crate::core::variables;

/// The shared body of the target-declaring functions: run the user block
/// in a child scope seeded with the target defaults, hand the populated
/// scope to the generator, then make sure nothing in the block went
/// unused.
fn execute_generic_target(
    target_type: &str,
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
    block: &Arc<ParseNode>,
) -> Result<Value, BuildError> {
    ensure_not_processing_import(function, scope)?;
    ensure_not_processing_build_config(function, scope)?;
    let input_dir = source_dir_for_function_call(scope, function)?;

    scope.push_frame();
    let result = fill_target_block_scope(scope, function, target_type, args)
        .and_then(|_| parse_tree::execute_block_in_scope(block, scope))
        .and_then(|_| generate_target(scope, function, args, target_type, &input_dir))
        .and_then(|_| scope.check_top_frame_for_unused());
    scope.pop_frame();

    result.map(|_| Value::none())
}

pub fn run_custom(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
    block: &Arc<ParseNode>,
) -> Result<Value, BuildError> {
    execute_generic_target("custom", scope, function, args, block)
}

pub fn run_executable(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
    block: &Arc<ParseNode>,
) -> Result<Value, BuildError> {
    execute_generic_target("executable", scope, function, args, block)
}

pub fn run_group(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
    block: &Arc<ParseNode>,
) -> Result<Value, BuildError> {
    execute_generic_target("group", scope, function, args, block)
}

pub fn run_shared_library(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
    block: &Arc<ParseNode>,
) -> Result<Value, BuildError> {
    execute_generic_target("shared_library", scope, function, args, block)
}

pub fn run_static_library(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
    block: &Arc<ParseNode>,
) -> Result<Value, BuildError> {
    execute_generic_target("static_library", scope, function, args, block)
}

/// A test is just an executable with a name that signals intent.
pub fn run_test(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
    block: &Arc<ParseNode>,
) -> Result<Value, BuildError> {
    execute_generic_target("executable", scope, function, args, block)
}

/// A component resolves to a shared or static library depending on the
/// global `component_mode` variable.
pub fn run_component(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
    block: &Arc<ParseNode>,
) -> Result<Value, BuildError> {
    const HELP: &str = "You're declaring a component here but have not defined \
                        \"component_mode\" to\neither \"shared_library\" or \
                        \"static_library\".";

    let Some(mode_value) = scope.get_value(variables::COMPONENT_MODE, true) else {
        return Err(function.make_error_with_help("No component mode set.", HELP));
    };
    let mode = match &mode_value.kind {
        ValueKind::String(s) if s == "shared_library" || s == "static_library" => s.clone(),
        _ => return Err(function.make_error_with_help("Invalid component mode set.", HELP)),
    };

    execute_generic_target(&mode, scope, function, args, block)
}

/// Copy targets use the executed-block flavour: the dispatcher already ran
/// the block, we read the resulting scope.
pub fn run_copy(
    function: &Arc<ParseNode>,
    args: &[Value],
    scope: &mut Scope<'_>,
) -> Result<Value, BuildError> {
    ensure_not_processing_import(function, scope)?;
    ensure_not_processing_build_config(function, scope)?;
    let input_dir = source_dir_for_function_call(scope, function)?;
    generate_target(scope, function, args, "copy", &input_dir)?;
    Ok(Value::none())
}
