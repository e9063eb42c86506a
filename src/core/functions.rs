// src/core/functions.rs

use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;

use crate::core::config;
use crate::core::config_values_generator::generate_config_values;
use crate::core::err::BuildError;
use crate::core::functions_file;
use crate::core::functions_target;
use crate::core::functions_toolchain;
use crate::core::item_tree::TreeOps;
use crate::core::label::Label;
use crate::core::parse_tree::{self, ParseNode};
use crate::core::paths::SourceDir;
use crate::core::pattern::PatternList;
use crate::core::scope::Scope;
use crate::core::toolchain_manager;
use crate::core::value::{Value, ValueType};
use crate::core::variables;

/// Takes the block node unexecuted and controls its execution itself
/// (toolchain, template, the target types).
pub type GenericBlockFunction = fn(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
    block: &Arc<ParseNode>,
) -> Result<Value, BuildError>;

/// Gets the block pre-executed by the dispatcher in a fresh child scope
/// and receives that populated scope (config, declare_args, copy).
pub type ExecutedBlockFunction = fn(
    function: &Arc<ParseNode>,
    args: &[Value],
    block_scope: &mut Scope<'_>,
) -> Result<Value, BuildError>;

/// Takes no block at all.
pub type NoBlockFunction = fn(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
) -> Result<Value, BuildError>;

pub enum FunctionInfo {
    GenericBlock(GenericBlockFunction),
    ExecutedBlock(ExecutedBlockFunction),
    NoBlock(NoBlockFunction),
}

lazy_static! {
    /// The built-in function table. Anything not in here dispatches to a
    /// template of the same name, if one is in scope.
    static ref FUNCTIONS: HashMap<&'static str, FunctionInfo> = {
        use FunctionInfo::{ExecutedBlock, GenericBlock, NoBlock};
        let mut map: HashMap<&'static str, FunctionInfo> = HashMap::new();

        // Declarations.
        map.insert("config", ExecutedBlock(run_config));
        map.insert("toolchain", GenericBlock(functions_toolchain::run_toolchain));
        map.insert("tool", GenericBlock(functions_toolchain::run_tool));
        map.insert("component", GenericBlock(functions_target::run_component));
        map.insert("copy", ExecutedBlock(functions_target::run_copy));
        map.insert("custom", GenericBlock(functions_target::run_custom));
        map.insert("executable", GenericBlock(functions_target::run_executable));
        map.insert("group", GenericBlock(functions_target::run_group));
        map.insert("shared_library", GenericBlock(functions_target::run_shared_library));
        map.insert("static_library", GenericBlock(functions_target::run_static_library));
        map.insert("test", GenericBlock(functions_target::run_test));

        // Control & meta.
        map.insert("assert", NoBlock(run_assert));
        map.insert("declare_args", ExecutedBlock(run_declare_args));
        map.insert("print", NoBlock(run_print));
        map.insert("set_default_toolchain", NoBlock(run_set_default_toolchain));
        map.insert("set_defaults", GenericBlock(run_set_defaults));
        map.insert(
            "set_sources_assignment_filter",
            NoBlock(run_set_sources_assignment_filter),
        );
        map.insert("template", GenericBlock(run_template));

        // Files & I/O helpers.
        map.insert("exec_script", NoBlock(functions_file::run_exec_script));
        map.insert("import", NoBlock(run_import));
        map.insert(
            "process_file_template",
            NoBlock(functions_file::run_process_file_template),
        );
        map.insert("read_file", NoBlock(functions_file::run_read_file));
        map.insert("write_file", NoBlock(functions_file::run_write_file));

        map
    };
}

/// Dispatches one function call: built-ins by flavour, then templates.
pub fn run_function(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
    block: Option<&Arc<ParseNode>>,
) -> Result<Value, BuildError> {
    let Some((name_token, _, _)) = function.as_function_call() else {
        return Err(function.make_error("Expected a function call."));
    };
    let name = name_token.text.clone();

    let Some(info) = FUNCTIONS.get(name.as_str()) else {
        // Not a built-in; check for a template.
        if let Some(template) = scope.get_template(&name) {
            return run_template_invocation(scope, function, args, block, &template);
        }
        return Err(function.make_error("Unknown function."));
    };

    match info {
        FunctionInfo::GenericBlock(runner) => {
            let Some(block) = block else {
                return Err(needs_block_error(function));
            };
            runner(scope, function, args, block)
        }
        FunctionInfo::ExecutedBlock(runner) => {
            let Some(block) = block else {
                return Err(needs_block_error(function));
            };
            scope.push_frame();
            let result = parse_tree::execute_block_in_scope(block, scope)
                .and_then(|_| runner(function, args, scope));
            scope.pop_frame();
            result
        }
        FunctionInfo::NoBlock(runner) => {
            if block.is_some() {
                return Err(function.make_error_with_help(
                    "This function call does not take a block.",
                    "Remove the { } after the call.",
                ));
            }
            runner(scope, function, args)
        }
    }
}

fn needs_block_error(function: &Arc<ParseNode>) -> BuildError {
    function.make_error_with_help(
        "This function call requires a block.",
        "The block's \"{\" must be on the same line as the function call's \")\".",
    )
}

/// Invokes a stored template: the call-site block executes first so the
/// template body observes whatever the caller set, then the body runs in
/// the same scope.
fn run_template_invocation(
    scope: &mut Scope<'_>,
    invocation: &Arc<ParseNode>,
    args: &[Value],
    block: Option<&Arc<ParseNode>>,
    template: &Arc<ParseNode>,
) -> Result<Value, BuildError> {
    ensure_not_processing_import(invocation, scope)?;
    let Some(block) = block else {
        return Err(needs_block_error(invocation));
    };
    let Some((name_token, _, Some(template_block))) = template.as_function_call() else {
        return Err(invocation.make_error("Template has no block."));
    };
    let template_type = name_token.text.clone();
    let template_block = template_block.clone();

    scope.push_frame();
    let result = fill_target_block_scope(scope, invocation, &template_type, args)
        .and_then(|_| parse_tree::execute_block_in_scope(block, scope))
        .and_then(|_| parse_tree::execute_block_in_scope(&template_block, scope));
    scope.pop_frame();
    result.map(|_| Value::none())
}

// Shared pre-condition helpers -------------------------------------------------

/// Declarations are not valid from imported files, which exist to define
/// defaults, variables and templates.
pub fn ensure_not_processing_import(
    node: &Arc<ParseNode>,
    scope: &Scope<'_>,
) -> Result<(), BuildError> {
    if scope.is_processing_import() {
        return Err(node.make_error_with_help(
            "Not valid from an import.",
            "Imports are for defining defaults, variables and templates. Declarations\n\
             belong in a regular build file.",
        ));
    }
    Ok(())
}

/// Declarations are not valid from the build configuration script either.
pub fn ensure_not_processing_build_config(
    node: &Arc<ParseNode>,
    scope: &Scope<'_>,
) -> Result<(), BuildError> {
    if scope.is_processing_build_config() {
        return Err(node.make_error_with_help(
            "Not valid from the build config.",
            "The build config script sets up the execution environment; declarations\n\
             belong in a regular build file.",
        ));
    }
    Ok(())
}

/// Validates the single-string-argument signature shared by most
/// declarations.
pub fn ensure_single_string_arg<'v>(
    function: &Arc<ParseNode>,
    args: &'v [Value],
) -> Result<&'v str, BuildError> {
    if args.len() != 1 {
        return Err(function.make_error_with_help(
            "Incorrect arguments.",
            "This function requires a single string argument.",
        ));
    }
    args[0].verify_type(ValueType::String)?;
    Ok(args[0].as_string().unwrap_or_default())
}

/// The directory of the build file containing this function call, resolved
/// through the source repository.
pub fn source_dir_for_function_call(
    scope: &Scope<'_>,
    function: &Arc<ParseNode>,
) -> Result<SourceDir, BuildError> {
    use crate::core::err::SourceAccess as _;

    let file_id = function.range().begin.file;
    let build_settings = scope.settings().build_settings();
    let name = build_settings
        .input_file_manager()
        .file_label(file_id)
        .ok_or_else(|| function.make_error("Can't determine the current directory."))?;
    Ok(crate::core::paths::SourceFile::new(name).dir())
}

pub fn toolchain_label_for_scope(scope: &Scope<'_>) -> Label {
    scope.settings().toolchain_label()
}

/// Builds the label a declaration in this scope produces: current
/// directory, given name, current toolchain.
pub fn make_label_for_scope(
    scope: &Scope<'_>,
    function: &Arc<ParseNode>,
    name: &str,
) -> Result<Label, BuildError> {
    let input_dir = source_dir_for_function_call(scope, function)?;
    let toolchain = toolchain_label_for_scope(scope);
    Ok(Label::new(
        input_dir,
        name,
        toolchain.dir().clone(),
        toolchain.name(),
    ))
}

/// Sets up the frame a target-like block executes in: merges any target
/// defaults for the type and binds `target_name` to the declaration's
/// argument (pre-marked used so bodies that ignore it don't error).
pub fn fill_target_block_scope(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    target_type: &str,
    args: &[Value],
) -> Result<(), BuildError> {
    if let Some(defaults) = scope.get_target_defaults(target_type).cloned() {
        defaults.merge_to_scope(scope, function.range(), "target defaults")?;
    }

    let name = ensure_single_string_arg(function, args)?.to_string();
    scope.set_value(
        variables::TARGET_NAME,
        Value::string(Some(function.clone()), name),
        Some(function.clone()),
    );
    scope.mark_used(variables::TARGET_NAME);
    Ok(())
}

// assert ----------------------------------------------------------------------

fn run_assert(
    _scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
) -> Result<Value, BuildError> {
    if args.len() != 1 {
        return Err(function.make_error_with_help(
            "Wrong number of arguments.",
            "assert() takes one argument.",
        ));
    }
    if args[0].interpret_as_int() == 0 {
        let mut err = function.make_error("Assertion failed.");
        // Showing where the asserted value was set helps when the argument
        // is a plain variable; skip it when the value originates from the
        // assert line itself.
        if let Some(origin) = &args[0].origin {
            let origin_range = origin.range();
            let call_range = function.range();
            if origin_range.begin.file != call_range.begin.file
                || origin_range.begin.line != call_range.begin.line
            {
                err.append_sub_error(BuildError::new(origin_range, "This is where it was set."));
            }
        }
        return Err(err);
    }
    Ok(Value::none())
}

// config ----------------------------------------------------------------------

fn run_config(
    function: &Arc<ParseNode>,
    args: &[Value],
    scope: &mut Scope<'_>,
) -> Result<Value, BuildError> {
    let name = ensure_single_string_arg(function, args)?.to_string();
    ensure_not_processing_import(function, scope)?;
    ensure_not_processing_build_config(function, scope)?;

    let label = make_label_for_scope(scope, function, &name)?;
    let build_settings = scope.settings().build_settings();
    if build_settings.scheduler().verbose_logging() {
        build_settings
            .scheduler()
            .log("Generating config", label.user_visible_name(true));
    }

    let input_dir = source_dir_for_function_call(scope, function)?;
    let values = generate_config_values(scope, &input_dir)?;

    let mut guard = build_settings.item_tree().lock();
    let mut ops = TreeOps::new(&mut guard, &build_settings);
    config::define_config(&mut ops, &label, function.range(), values)?;
    let fires = std::mem::take(&mut ops.fire);
    drop(ops);
    drop(guard);
    toolchain_manager::fire(&build_settings, fires);
    Ok(Value::none())
}

// declare_args ----------------------------------------------------------------

const DECLARED_ARGS_GUARD: &str = "@@declared_args";

fn run_declare_args(
    function: &Arc<ParseNode>,
    args: &[Value],
    scope: &mut Scope<'_>,
) -> Result<Value, BuildError> {
    if !args.is_empty() {
        return Err(function.make_error("declare_args takes no arguments."));
    }

    // Must be at the root of the build config: the dispatcher pushed the
    // block frame, so the root frame is directly below us.
    if !scope.is_processing_build_config() || scope.frame_count() != 2 || scope.has_base() {
        return Err(function.make_error_with_help(
            "declare_args called incorrectly.",
            "It must be called only from the build config script, at its root scope.",
        ));
    }

    if let Some(previous) = scope.get_value_no_mark(DECLARED_ARGS_GUARD) {
        let mut err = function.make_error("Duplicate call to declare_args.");
        err.append_sub_error(BuildError::new(
            previous.origin_range(),
            "See the original call.",
        ));
        return Err(err);
    }

    // The variables set in the block are the overridable defaults; promote
    // them to the enclosing scope.
    for (name, value) in scope.top_frame_values() {
        scope.set_value_in_root(&name, value);
    }
    // The guard name is unrepresentable in the language, so it can't clash.
    scope.set_value_in_root(
        DECLARED_ARGS_GUARD,
        Value::integer(Some(function.clone()), 1),
    );
    Ok(Value::none())
}

// import ----------------------------------------------------------------------

fn run_import(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
) -> Result<Value, BuildError> {
    let path = ensure_single_string_arg(function, args)?.to_string();
    ensure_not_processing_import(function, scope)?;

    let input_dir = source_dir_for_function_call(scope, function)?;
    let import_file = input_dir.resolve_relative_file(&path);
    if import_file.is_null() {
        return Err(function.make_error("Invalid import file name."));
    }

    let settings = scope.settings().clone();
    settings
        .import_manager()
        .do_import(scope, function, &import_file)?;
    Ok(Value::none())
}

// print -----------------------------------------------------------------------

fn run_print(
    _scope: &mut Scope<'_>,
    _function: &Arc<ParseNode>,
    args: &[Value],
) -> Result<Value, BuildError> {
    // Build files run in parallel, so prints from different files may
    // interleave. That's documented behavior for a debugging aid.
    let rendered: Vec<String> = args.iter().map(Value::to_display_string).collect();
    println!("{}", rendered.join(" "));
    Ok(Value::none())
}

// set_defaults ----------------------------------------------------------------

fn run_set_defaults(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
    block: &Arc<ParseNode>,
) -> Result<Value, BuildError> {
    let target_type = ensure_single_string_arg(function, args)?.to_string();

    // Setting defaults for a type twice anywhere in the chain is rejected,
    // including "overriding" from a nested scope.
    if scope.get_target_defaults(&target_type).is_some() {
        return Err(function.make_error("Target defaults were already set for this type."));
    }

    scope.push_frame();
    let result = fill_target_block_scope(scope, function, &target_type, args)
        .and_then(|_| parse_tree::execute_block_in_scope(block, scope));
    let defaults = scope.pop_frame();
    result?;

    scope.set_target_defaults(&target_type, defaults);
    Ok(Value::none())
}

// set_default_toolchain -------------------------------------------------------

fn run_set_default_toolchain(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
) -> Result<Value, BuildError> {
    if !scope.is_processing_build_config() {
        return Err(function.make_error_with_help(
            "Must be called from the build config.",
            "set_default_toolchain can only be called from the build configuration file.",
        ));
    }

    // The build config runs again for every non-default toolchain; those
    // runs must not reset the default, so this is a no-op for them.
    if !scope.is_processing_default_build_config() {
        return Ok(Value::none());
    }

    ensure_single_string_arg(function, args)?;
    let current_dir = source_dir_for_function_call(scope, function)?;
    let current_toolchain = toolchain_label_for_scope(scope);
    let label = Label::resolve(&current_dir, &current_toolchain, &args[0])?;

    let build_settings = scope.settings().build_settings();
    toolchain_manager::set_default_toolchain(&build_settings, label, function.range())?;
    Ok(Value::none())
}

// set_sources_assignment_filter -----------------------------------------------

fn run_set_sources_assignment_filter(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
) -> Result<Value, BuildError> {
    if args.len() != 1 {
        return Err(function.make_error("set_sources_assignment_filter takes one argument."));
    }
    let filter = PatternList::from_value(&args[0])?;
    scope.set_sources_assignment_filter(filter);
    Ok(Value::none())
}

// template --------------------------------------------------------------------

fn run_template(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
    _block: &Arc<ParseNode>,
) -> Result<Value, BuildError> {
    let name = ensure_single_string_arg(function, args)?.to_string();

    if let Some(existing) = scope.get_template(&name) {
        let mut err = function.make_error_with_help(
            "Duplicate template definition.",
            "A template with this name was already defined.",
        );
        err.append_sub_error(BuildError::new(existing.range(), "Previous definition."));
        return Err(err);
    }

    // The whole call node is stored; invocation re-executes its block.
    scope.add_template(&name, function.clone());
    Ok(Value::none())
}
