// src/core/functions_file.rs

use std::sync::Arc;

use crate::core::err::BuildError;
use crate::core::file_template::FileTemplate;
use crate::core::functions::source_dir_for_function_call;
use crate::core::input_conversion::convert_input_to_value;
use crate::core::parse_tree::ParseNode;
use crate::core::paths::ensure_string_is_in_output_dir;
use crate::core::scope::Scope;
use crate::core::value::{Value, ValueKind};
use crate::system::executor;

/// read_file(filename, input_conversion)
///
/// Reads a file relative to the build file and converts the contents. The
/// file is registered as a gen-dependency so its changes invalidate the
/// generated output.
pub fn run_read_file(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
) -> Result<Value, BuildError> {
    if args.len() != 2 {
        return Err(function.make_error_with_help(
            "Wrong number of arguments to read_file.",
            "I expected read_file(filename, input_conversion).",
        ));
    }
    let name = args[0].require_string()?;

    let current_dir = source_dir_for_function_call(scope, function)?;
    let source_file = current_dir.resolve_relative_file(name);
    if source_file.is_null() {
        return Err(BuildError::new(args[0].origin_range(), "Invalid file name."));
    }

    let settings = scope.settings().clone();
    let build_settings = settings.build_settings();
    let file_path = build_settings.get_full_path(&source_file);

    // Everything must be recomputed if the read file changes.
    build_settings
        .scheduler()
        .add_gen_dependency(file_path.clone());

    let contents = std::fs::read_to_string(&file_path).map_err(|_| {
        BuildError::with_help(
            args[0].origin_range(),
            "Could not read file.",
            format!("I resolved this to \"{}\".", file_path.display()),
        )
    })?;

    convert_input_to_value(&settings, &contents, function, &args[1])
}

/// write_file(filename, data)
///
/// The file must be inside the output directory. A list is written
/// one-item-per-line with no quoting or brackets.
pub fn run_write_file(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
) -> Result<Value, BuildError> {
    if args.len() != 2 {
        return Err(function.make_error_with_help(
            "Wrong number of arguments to write_file.",
            "I expected write_file(filename, data).",
        ));
    }
    let name = args[0].require_string()?;

    let current_dir = source_dir_for_function_call(scope, function)?;
    let source_file = current_dir.resolve_relative_file(name);
    if source_file.is_null() {
        return Err(BuildError::new(args[0].origin_range(), "Invalid file name."));
    }

    let build_settings = scope.settings().build_settings();
    ensure_string_is_in_output_dir(build_settings.build_dir(), source_file.value(), &args[0])?;

    let mut contents = String::new();
    match &args[1].kind {
        ValueKind::List(items) => {
            for item in items {
                contents.push_str(&item.to_display_string());
                contents.push('\n');
            }
        }
        _ => contents.push_str(&args[1].to_display_string()),
    }

    let file_path = build_settings.get_full_path(&source_file);
    if let Some(parent) = file_path.parent() {
        std::fs::create_dir_all(parent).map_err(|_| {
            function.make_error_with_help(
                "Unable to create directory.",
                format!("I was using \"{}\".", parent.display()),
            )
        })?;
    }
    std::fs::write(&file_path, contents).map_err(|_| {
        function.make_error_with_help(
            "Unable to write file.",
            format!("I was writing \"{}\".", file_path.display()),
        )
    })?;
    Ok(Value::none())
}

/// exec_script(script, arguments, input_conversion, file_dependencies)
///
/// Runs a helper script through the configured interpreter with the build
/// file's directory as the current directory, capturing stdout. Everything
/// after the script path is optional; without an input_conversion the
/// result is discarded. The script and any listed file dependencies are
/// registered as gen-dependencies.
pub fn run_exec_script(
    scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
) -> Result<Value, BuildError> {
    if args.is_empty() || args.len() > 4 {
        return Err(function.make_error_with_help(
            "Wrong number of arguments to exec_script.",
            "I expected exec_script(script, arguments, input_conversion, file_dependencies)\n\
             with everything but the script optional.",
        ));
    }
    let script_name = args[0].require_string()?;

    let current_dir = source_dir_for_function_call(scope, function)?;
    let script_file = current_dir.resolve_relative_file(script_name);
    if script_file.is_null() {
        return Err(BuildError::new(args[0].origin_range(), "Invalid script name."));
    }

    let script_args = match args.get(1) {
        Some(list) => crate::core::value_extractors::extract_list_of_string_values(list)?,
        None => Vec::new(),
    };

    let settings = scope.settings().clone();
    let build_settings = settings.build_settings();
    let script_path = build_settings.get_full_path(&script_file);

    // The generated output depends on the script itself and on anything
    // the caller says the script reads.
    build_settings
        .scheduler()
        .add_gen_dependency(script_path.clone());
    if let Some(deps) = args.get(3) {
        let dep_files = crate::core::value_extractors::extract_list_of_relative_files(
            deps,
            &current_dir,
        )?;
        for dep in dep_files {
            build_settings
                .scheduler()
                .add_gen_dependency(build_settings.get_full_path(&dep));
        }
    }

    if build_settings.scheduler().verbose_logging() {
        build_settings
            .scheduler()
            .log("Executing script", script_file.value());
    }

    let cwd = build_settings.get_full_dir_path(&current_dir);
    let output = executor::run_script_and_capture_output(
        build_settings.interpreter_path(),
        &script_path,
        &script_args,
        &cwd,
    )
    .map_err(|e| {
        function.make_error_with_help("Script failed to run.", e.to_string())
    })?;

    match args.get(2) {
        Some(conversion) => convert_input_to_value(&settings, &output, function, conversion),
        None => Ok(Value::none()),
    }
}

/// process_file_template(source_list, template)
///
/// Applies each template pattern to each source, producing the cross
/// product. Used for computing output file names from input files.
pub fn run_process_file_template(
    _scope: &mut Scope<'_>,
    function: &Arc<ParseNode>,
    args: &[Value],
) -> Result<Value, BuildError> {
    if args.len() != 2 {
        return Err(function.make_error("Expected two arguments."));
    }

    let template = FileTemplate::from_value(&args[1])?;
    let mut results = Vec::new();
    template.apply(&args[0], Some(function.clone()), &mut results)?;
    Ok(Value::list(Some(function.clone()), results))
}
