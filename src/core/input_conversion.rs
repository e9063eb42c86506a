// src/core/input_conversion.rs

use std::sync::Arc;

use crate::core::err::BuildError;
use crate::core::parse_tree::{self, ParseNode};
use crate::core::parser;
use crate::core::scope::Scope;
use crate::core::settings::Settings;
use crate::core::tokenizer;
use crate::core::value::{Value, ValueKind};

/// Converts the textual result of `read_file` or `exec_script` into a
/// value, according to the conversion mode string:
///
///   "string"      the contents as one string
///   "list lines"  a list with one string per line, trailing blank lines
///                 trimmed
///   "value"       parse the contents as a single expression literal
pub fn convert_input_to_value(
    settings: &Arc<Settings>,
    input: &str,
    origin: &Arc<ParseNode>,
    conversion: &Value,
) -> Result<Value, BuildError> {
    let mode = conversion.require_string()?;
    match mode {
        "value" => parse_value(settings, input, origin),
        "string" => Ok(Value::string(Some(origin.clone()), input)),
        "list lines" => Ok(parse_lines(input, origin)),
        _ => Err(BuildError::with_help(
            conversion.origin_range(),
            "Not a valid input conversion mode.",
            "I expected \"string\", \"list lines\" or \"value\".",
        )),
    }
}

fn parse_lines(input: &str, origin: &Arc<ParseNode>) -> Value {
    let mut lines: Vec<&str> = input.split('\n').collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    Value::list(
        Some(origin.clone()),
        lines
            .into_iter()
            .map(|l| Value::string(Some(origin.clone()), l))
            .collect(),
    )
}

/// Parses the input as if it were a literal rvalue in a build file. The
/// text is interned as a synthetic file so parse errors render with the
/// offending content.
fn parse_value(
    settings: &Arc<Settings>,
    input: &str,
    origin: &Arc<ParseNode>,
) -> Result<Value, BuildError> {
    let build_settings = settings.build_settings();
    let file_id = build_settings
        .input_file_manager()
        .intern_synthetic("<script result>", input.to_string());

    let parsed = tokenizer::tokenize(file_id, input)
        .and_then(parser::parse_expression)
        .map_err(|nested| make_parse_err(input, origin, Some(nested)))?;

    // Empty input means the script returned nothing.
    let Some(expression) = parsed else {
        return Ok(Value::none());
    };

    // Only lists and literals are valid results; identifiers or operators
    // would make the result depend on evaluation context.
    if expression.as_list_contents().is_none() && expression.as_literal_token().is_none() {
        return Err(make_parse_err(input, origin, None));
    }

    let mut scope = Scope::new(settings.clone());
    let mut result = parse_tree::execute(&expression, &mut scope)
        .map_err(|nested| make_parse_err(input, origin, Some(nested)))?;

    // The value's origins point into the synthetic expression; re-home them
    // onto the function call that produced the input.
    recursively_set_origin(&mut result, origin);
    Ok(result)
}

fn recursively_set_origin(value: &mut Value, origin: &Arc<ParseNode>) {
    value.set_origin(Some(origin.clone()));
    if let ValueKind::List(items) = &mut value.kind {
        for item in items {
            recursively_set_origin(item, origin);
        }
    }
}

fn make_parse_err(input: &str, origin: &Arc<ParseNode>, nested: Option<BuildError>) -> BuildError {
    let mut help = "When parsing a result as a \"value\" it should look like a list:\n  \
                    [ \"a\", \"b\", 5 ]\nor a single literal:\n  \"my result\"\nbut instead \
                    I got this, which I find very confusing:\n"
        .to_string();
    help.push_str(example_of_bad_input(input).as_str());

    let mut err = BuildError::with_help(
        origin.range(),
        "Script result wasn't a valid value.",
        help,
    );
    if let Some(nested) = nested {
        err.append_sub_error(nested);
    }
    err
}

/// The first interesting bit of some script output, for error messages.
fn example_of_bad_input(input: &str) -> String {
    let mut result = input.trim().to_string();
    let mut trimmed = false;

    if let Some(newline) = result.find('\n') {
        result.truncate(newline);
        trimmed = true;
    }
    let result_trimmed = result.trim();

    const MAX_SIZE: usize = 50;
    let mut out = result_trimmed.to_string();
    if out.len() > MAX_SIZE {
        let mut end = MAX_SIZE;
        while !out.is_char_boundary(end) {
            end -= 1;
        }
        out.truncate(end);
        trimmed = true;
    }
    if trimmed {
        out.push_str("...");
    }
    out
}
