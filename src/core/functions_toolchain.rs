// src/core/functions_toolchain.rs

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::core::err::BuildError;
use crate::core::functions::{
    ensure_not_processing_build_config, ensure_not_processing_import, ensure_single_string_arg,
    source_dir_for_function_call,
};
use crate::core::item_tree::TreeOps;
use crate::core::label::Label;
use crate::core::parse_tree::{self, ParseNode};
use crate::core::paths::SourceDir;
use crate::core::scope::Scope;
use crate::core::toolchain::{Tool, ToolType, Toolchain};
use crate::core::toolchain_manager;
use crate::core::value::Value;

/// Threads the toolchain currently being defined from `toolchain(...)`
/// down to the `tool(...)` calls in its block, via the scope's property
/// map.
struct OpenToolchain(RefCell<Toolchain>);

pub fn run_toolchain(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
    block: &Arc<ParseNode>,
) -> Result<Value, BuildError> {
    ensure_not_processing_import(function, scope)?;
    ensure_not_processing_build_config(function, scope)?;

    // Toolchain labels don't themselves carry a toolchain part.
    let name = ensure_single_string_arg(function, args)?.to_string();
    let input_dir = source_dir_for_function_call(scope, function)?;
    let label = Label::new(input_dir, name, SourceDir::default(), "");

    let build_settings = scope.settings().build_settings();
    if build_settings.scheduler().verbose_logging() {
        build_settings
            .scheduler()
            .log("Generating toolchain", label.user_visible_name(false));
    }

    let open = Rc::new(OpenToolchain(RefCell::new(Toolchain::new(label.clone()))));

    scope.push_frame();
    scope.set_property(open.clone());
    let result = parse_tree::execute_block_in_scope(block, scope)
        .and_then(|_| scope.check_top_frame_for_unused());
    scope.clear_property::<OpenToolchain>();
    scope.pop_frame();
    result?;

    let toolchain = open.0.borrow().clone();

    // Install the definition and mark the graph node defined so targets
    // waiting on this toolchain can resolve.
    let mut guard = build_settings.item_tree().lock();
    let mut ops = TreeOps::new(&mut guard, &build_settings);
    toolchain_manager::set_toolchain_definition(&mut ops, toolchain, function.range())?;
    ops.mark_defined(&label)?;
    let fires = std::mem::take(&mut ops.fire);
    drop(ops);
    drop(guard);
    toolchain_manager::fire(&build_settings, fires);

    Ok(Value::none())
}

pub fn run_tool(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
    block: &Arc<ParseNode>,
) -> Result<Value, BuildError> {
    let Some(open) = scope.get_property::<OpenToolchain>() else {
        return Err(function.make_error_with_help(
            "tool() called outside of toolchain().",
            "The tool() function can only be used inside a toolchain() definition.",
        ));
    };

    let tool_name = ensure_single_string_arg(function, args)?.to_string();
    let Some(tool_type) = ToolType::from_name(&tool_name) else {
        return Err(BuildError::new(args[0].origin_range(), "Unknown tool type."));
    };

    scope.push_frame();
    let result = parse_tree::execute_block_in_scope(block, scope).and_then(|_| {
        let tool = Tool {
            command: read_string(scope, "command")?,
            depfile: read_string(scope, "depfile")?,
            deps: read_string(scope, "deps")?,
            description: read_string(scope, "description")?,
            pool: read_string(scope, "pool")?,
            restat: read_string(scope, "restat")?,
            rspfile: read_string(scope, "rspfile")?,
            rspfile_content: read_string(scope, "rspfile_content")?,
        };
        scope.check_top_frame_for_unused()?;
        Ok(tool)
    });
    scope.pop_frame();

    open.0.borrow_mut().set_tool(tool_type, result?);
    Ok(Value::none())
}

/// Reads an optional string variable out of the tool block; absent means
/// empty.
fn read_string(scope: &mut Scope<'_>, name: &str) -> Result<String, BuildError> {
    match scope.get_value(name, true) {
        Some(value) => Ok(value.require_string()?.to_string()),
        None => Ok(String::new()),
    }
}
