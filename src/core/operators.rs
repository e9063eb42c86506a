// src/core/operators.rs

use std::sync::Arc;

use crate::core::err::BuildError;
use crate::core::parse_tree::{self, ParseNode};
use crate::core::pattern::PatternList;
use crate::core::scope::Scope;
use crate::core::token::{Token, TokenKind};
use crate::core::value::{Value, ValueKind};

/// Assignments to this variable are routed through the sources-assignment
/// filter.
const SOURCES_VAR: &str = "sources";

pub fn is_unary_operator(token: &Token) -> bool {
    token.kind == TokenKind::Operator && token.text == "!"
}

pub fn is_binary_operator(token: &Token) -> bool {
    token.kind == TokenKind::Operator
        && matches!(
            token.text.as_str(),
            "=" | "+=" | "-=" | "+" | "-" | "==" | "!=" | "<=" | ">=" | "<" | ">" | "&&" | "||"
        )
}

pub fn execute_unary_operator(
    op_node: &Arc<ParseNode>,
    expr: Value,
) -> Result<Value, BuildError> {
    Ok(Value::integer(
        Some(op_node.clone()),
        i64::from(expr.interpret_as_int() == 0),
    ))
}

/// Evaluates a binary-operator node. The lvalue operators evaluate only the
/// right side; everything else evaluates left then right eagerly (there is
/// no short-circuiting in this language).
pub fn execute_binary_operator(
    scope: &mut Scope<'_>,
    op_node: &Arc<ParseNode>,
) -> Result<Value, BuildError> {
    let Some((left, op, right)) = op_node.as_binary_op() else {
        return Err(op_node.make_error("Expected a binary operator."));
    };
    let op = op.clone();
    let left = left.clone();
    let right = right.clone();

    // Operators that take an lvalue.
    if matches!(op.text.as_str(), "=" | "+=" | "-=") {
        let Some(dest) = left.as_identifier_token() else {
            let mut err = BuildError::at_token_with_help(
                &op,
                "Operator requires an lvalue.",
                "The thing on the left is not an identifier.",
            );
            err.append_range(left.range());
            return Err(err);
        };
        let dest = dest.clone();

        let right_value = parse_tree::execute(&right, scope)?;
        if right_value.is_none() {
            let mut err = BuildError::at_token_with_help(
                &op,
                "Operator requires an rvalue.",
                "The thing on the right does not evaluate to a value.",
            );
            err.append_range(right.range());
            return Err(err);
        }

        return match op.text.as_str() {
            "=" => execute_equals(scope, op_node, &left, &dest, right_value),
            "+=" => execute_plus_equals(scope, op_node, &dest, right_value, &op),
            "-=" => execute_minus_equals(scope, op_node, &dest, right_value, &op),
            _ => unreachable!(),
        };
    }

    let left_value = parse_tree::execute(&left, scope)?;
    if left_value.is_none() {
        let mut err = BuildError::at_token_with_help(
            &op,
            "Operator requires a value.",
            "The thing on the left does not evaluate to a value.",
        );
        err.append_range(left.range());
        return Err(err);
    }
    let right_value = parse_tree::execute(&right, scope)?;
    if right_value.is_none() {
        let mut err = BuildError::at_token_with_help(
            &op,
            "Operator requires a value.",
            "The thing on the right does not evaluate to a value.",
        );
        err.append_range(right.range());
        return Err(err);
    }

    match op.text.as_str() {
        "+" => execute_plus(op_node, left_value, right_value, &op),
        "-" => execute_minus(op_node, left_value, right_value, &op),
        "==" => Ok(bool_value(op_node, left_value == right_value)),
        "!=" => Ok(bool_value(op_node, left_value != right_value)),
        "<" | "<=" | ">" | ">=" => execute_comparison(op_node, &op, left_value, right_value),
        "&&" => Ok(bool_value(
            op_node,
            left_value.interpret_as_int() != 0 && right_value.interpret_as_int() != 0,
        )),
        "||" => Ok(bool_value(
            op_node,
            left_value.interpret_as_int() != 0 || right_value.interpret_as_int() != 0,
        )),
        other => Err(BuildError::at_token(
            &op,
            format!("Unknown binary operator \"{other}\"."),
        )),
    }
}

fn bool_value(op_node: &Arc<ParseNode>, b: bool) -> Value {
    Value::integer(Some(op_node.clone()), i64::from(b))
}

// Assignment ------------------------------------------------------------------

fn execute_equals(
    scope: &mut Scope<'_>,
    op_node: &Arc<ParseNode>,
    left_node: &Arc<ParseNode>,
    dest: &Token,
    right_value: Value,
) -> Result<Value, BuildError> {
    if let Some(old_value) = scope.get_value_no_mark(&dest.text).cloned() {
        if scope.is_set_but_unused(&dest.text) {
            // Re-assigning a value that was never read is an error, except
            // that an empty list may be overwritten: `x = []` is the
            // idiomatic clear before rebuilding a list.
            let is_empty_list = matches!(&old_value.kind, ValueKind::List(l) if l.is_empty());
            if !is_empty_list {
                let mut err = BuildError::with_help(
                    left_node.range(),
                    "Overwriting unused variable.",
                    format!(
                        "This overwrites a previous assignment to \"{}\" that had no effect.",
                        dest.text
                    ),
                );
                err.append_sub_error(BuildError::with_help(
                    old_value.origin_range(),
                    "Previously set here.",
                    "Maybe you wanted \"+=\" to append instead?",
                ));
                return Err(err);
            }
        } else if let (Some(old_list), Some(new_list)) =
            (old_value.as_list(), right_value.as_list())
        {
            // Clobbering a nonempty list with another nonempty list almost
            // always means the append operator was intended.
            if !old_list.is_empty() && !new_list.is_empty() {
                let mut err = BuildError::with_help(
                    left_node.range(),
                    "Replacing nonempty list.",
                    format!(
                        "This overwrites a previously-defined nonempty list (length {}).",
                        old_list.len()
                    ),
                );
                err.append_sub_error(BuildError::with_help(
                    old_value.origin_range(),
                    "for previous definition",
                    format!(
                        "with another one (length {}). Did you mean \"+=\" to append\n\
                         instead? If you really want to do this, do\n  {} = []\nbefore \
                         reassigning.",
                        new_list.len(),
                        dest.text
                    ),
                ));
                return Err(err);
            }
        }
    }

    if right_value.as_list().is_some() && dest.text == SOURCES_VAR {
        // Assigning to sources: route the elements through the filter.
        let filter = scope.get_sources_assignment_filter().cloned();
        let mut filtered = Value::list(Some(op_node.clone()), Vec::new());
        append_filtered_sources(filter.as_ref(), &right_value, &mut filtered);
        scope.set_value(&dest.text, filtered, Some(op_node.clone()));
    } else {
        // The whole operator node is recorded as the origin so that later
        // diagnostics (unused assignment, previous definition) can point
        // at the assignment.
        scope.set_value(&dest.text, right_value, Some(op_node.clone()));
    }
    Ok(Value::none())
}

/// Appends `source` (a string or a list) to the list in `dest`, dropping
/// string elements matched by the filter.
fn append_filtered_sources(filter: Option<&PatternList>, source: &Value, dest: &mut Value) {
    let dest_list = dest.as_list_mut().expect("dest must be a list");

    let passes = |v: &Value| match filter {
        Some(f) if !f.is_empty() => !f.matches_value(v),
        _ => true,
    };

    match &source.kind {
        ValueKind::List(items) => {
            for item in items {
                if passes(item) {
                    dest_list.push(item.clone());
                }
            }
        }
        _ => {
            if passes(source) {
                dest_list.push(source.clone());
            }
        }
    }
}

// Compound assignment ---------------------------------------------------------

fn execute_plus_equals(
    scope: &mut Scope<'_>,
    op_node: &Arc<ParseNode>,
    dest: &Token,
    right_value: Value,
    op: &Token,
) -> Result<Value, BuildError> {
    let filter = if dest.text == SOURCES_VAR {
        scope.get_sources_assignment_filter().cloned()
    } else {
        None
    };

    let Some(left_value) = scope.get_value_forced_to_current(&dest.text) else {
        return Err(BuildError::at_token_with_help(
            dest,
            "Undefined variable for +=.",
            "I don't have something with this name in scope now.",
        ));
    };

    value_plus_equals(op, left_value, right_value, false, filter.as_ref())?;
    left_value.set_origin(Some(op_node.clone()));
    // Appending clears the used flag so the final value must still be read.
    scope.mark_unused(&dest.text);
    Ok(Value::none())
}

fn execute_minus_equals(
    scope: &mut Scope<'_>,
    op_node: &Arc<ParseNode>,
    dest: &Token,
    right_value: Value,
    op: &Token,
) -> Result<Value, BuildError> {
    let Some(left_value) = scope.get_value_forced_to_current(&dest.text) else {
        return Err(BuildError::at_token_with_help(
            dest,
            "Undefined variable for -=.",
            "I don't have something with this name in scope now.",
        ));
    };

    value_minus_equals(op, left_value, &right_value, false)?;
    left_value.set_origin(Some(op_node.clone()));
    scope.mark_unused(&dest.text);
    Ok(Value::none())
}

/// In-place `left + right`. `allow_type_conversion` permits changing the
/// type of the left value, which is set for `+` and cleared for `+=`.
fn value_plus_equals(
    op: &Token,
    left: &mut Value,
    right: Value,
    allow_type_conversion: bool,
    sources_filter: Option<&PatternList>,
) -> Result<(), BuildError> {
    match (&mut left.kind, &right.kind) {
        (ValueKind::Integer(l), ValueKind::Integer(r)) => {
            *l += *r;
            Ok(())
        }
        (ValueKind::Integer(l), ValueKind::String(r)) if allow_type_conversion => {
            let combined = format!("{l}{r}");
            left.kind = ValueKind::String(combined);
            Ok(())
        }
        (ValueKind::String(l), ValueKind::Integer(r)) => {
            l.push_str(&r.to_string());
            Ok(())
        }
        (ValueKind::String(l), ValueKind::String(r)) => {
            l.push_str(r);
            Ok(())
        }
        (ValueKind::List(_), ValueKind::Integer(_) | ValueKind::String(_) | ValueKind::List(_)) => {
            append_filtered_sources(sources_filter, &right, left);
            Ok(())
        }
        _ => Err(incompatible_types_error(op, "add", left, &right)),
    }
}

fn value_minus_equals(
    op: &Token,
    left: &mut Value,
    right: &Value,
    _allow_type_conversion: bool,
) -> Result<(), BuildError> {
    match (&mut left.kind, &right.kind) {
        (ValueKind::Integer(l), ValueKind::Integer(r)) => {
            *l -= *r;
            Ok(())
        }
        (ValueKind::List(items), _) => remove_matches_from_list(items, right),
        _ => Err(incompatible_types_error(op, "subtract", left, right)),
    }
}

/// Removes all occurrences of `to_remove` from the list. A list on the
/// right removes each of its elements in turn. Removing something that
/// isn't there is an error.
fn remove_matches_from_list(list: &mut Vec<Value>, to_remove: &Value) -> Result<(), BuildError> {
    match &to_remove.kind {
        ValueKind::Integer(_) | ValueKind::String(_) => {
            let before = list.len();
            list.retain(|v| v != to_remove);
            if list.len() == before {
                return Err(BuildError::with_help(
                    to_remove.origin_range(),
                    "Item not found",
                    format!(
                        "You were trying to remove \"{}\"\nfrom the list but it wasn't there.",
                        to_remove.to_display_string()
                    ),
                ));
            }
            Ok(())
        }
        ValueKind::List(items) => {
            for item in items {
                remove_matches_from_list(list, item)?;
            }
            Ok(())
        }
        ValueKind::None => Ok(()),
    }
}

fn incompatible_types_error(op: &Token, verb: &str, left: &Value, right: &Value) -> BuildError {
    BuildError::at_token_with_help(
        op,
        format!("Incompatible types to {verb}."),
        format!(
            "I see a {} and a {}.",
            left.value_type().describe(),
            right.value_type().describe()
        ),
    )
}

// Plus/minus ------------------------------------------------------------------

fn execute_plus(
    op_node: &Arc<ParseNode>,
    left: Value,
    right: Value,
    op: &Token,
) -> Result<Value, BuildError> {
    let mut result = left;
    value_plus_equals(op, &mut result, right, true, None)?;
    result.set_origin(Some(op_node.clone()));
    Ok(result)
}

fn execute_minus(
    op_node: &Arc<ParseNode>,
    left: Value,
    right: Value,
    op: &Token,
) -> Result<Value, BuildError> {
    let mut result = left;
    value_minus_equals(op, &mut result, &right, true)?;
    result.set_origin(Some(op_node.clone()));
    Ok(result)
}

// Comparison ------------------------------------------------------------------

fn execute_comparison(
    op_node: &Arc<ParseNode>,
    op: &Token,
    left: Value,
    right: Value,
) -> Result<Value, BuildError> {
    let (Some(l), Some(r)) = (left.as_integer(), right.as_integer()) else {
        let mut err = BuildError::at_token_with_help(
            op,
            "Comparison requires two integers.",
            "This operator can only compare two integers.",
        );
        err.append_range(left.origin_range());
        err.append_range(right.origin_range());
        return Err(err);
    };

    let result = match op.text.as_str() {
        "<" => l < r,
        "<=" => l <= r,
        ">" => l > r,
        ">=" => l >= r,
        _ => unreachable!(),
    };
    Ok(bool_value(op_node, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::location::FileId;
    use crate::core::parse_tree::execute_block_in_scope;
    use crate::core::parser::parse;
    use crate::core::pattern::PatternList;
    use crate::core::settings::Settings;
    use crate::core::tokenizer::tokenize;

    fn eval(scope: &mut Scope<'_>, input: &str) -> Result<(), BuildError> {
        let root = parse(tokenize(FileId(0), input)?)?;
        execute_block_in_scope(&root, scope).map(|_| ())
    }

    fn eval_new(input: &str) -> (Scope<'static>, Result<(), BuildError>) {
        let mut scope = Scope::new(Settings::for_tests());
        let result = eval(&mut scope, input);
        (scope, result)
    }

    fn get_int(scope: &mut Scope<'_>, name: &str) -> i64 {
        scope.get_value(name, true).unwrap().as_integer().unwrap()
    }

    fn get_string(scope: &mut Scope<'_>, name: &str) -> String {
        scope
            .get_value(name, true)
            .unwrap()
            .as_string()
            .unwrap()
            .to_string()
    }

    fn get_string_list(scope: &mut Scope<'_>, name: &str) -> Vec<String> {
        scope
            .get_value(name, true)
            .unwrap()
            .as_list()
            .unwrap()
            .iter()
            .map(|v| v.as_string().unwrap().to_string())
            .collect()
    }

    #[test]
    fn integer_arithmetic() {
        let (mut scope, r) = eval_new("x = 5 + 2");
        r.unwrap();
        assert_eq!(get_int(&mut scope, "x"), 7);
    }

    #[test]
    fn no_precedence_chains_to_the_right() {
        // 5 - 2 - 1 parses as 5 - (2 - 1): the documented quirk.
        let (mut scope, r) = eval_new("x = 5 - 2 - 1");
        r.unwrap();
        assert_eq!(get_int(&mut scope, "x"), 4);
    }

    #[test]
    fn string_concatenation_with_conversion() {
        let (mut scope, r) = eval_new("a = \"x\" + \"y\"\nb = \"v\" + 2\nc = 1 + \"a\"");
        r.unwrap();
        assert_eq!(get_string(&mut scope, "a"), "xy");
        assert_eq!(get_string(&mut scope, "b"), "v2");
        assert_eq!(get_string(&mut scope, "c"), "1a");
    }

    #[test]
    fn list_append_and_concat() {
        let (mut scope, r) = eval_new("x = [\"a\"]\nx += \"b\"\nx += [\"c\", \"d\"]");
        r.unwrap();
        assert_eq!(get_string_list(&mut scope, "x"), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn list_minus_removes_all_occurrences() {
        let (mut scope, r) = eval_new("x = [\"a\", \"b\", \"a\"]\nx -= \"a\"");
        r.unwrap();
        assert_eq!(get_string_list(&mut scope, "x"), vec!["b"]);
    }

    #[test]
    fn list_minus_list_removes_each_element() {
        let (mut scope, r) = eval_new("x = [\"a\", \"b\", \"c\"]\nx -= [\"a\", \"c\"]");
        r.unwrap();
        assert_eq!(get_string_list(&mut scope, "x"), vec!["b"]);
    }

    #[test]
    fn removing_missing_item_is_an_error() {
        let (_, r) = eval_new("x = [\"a\"]\nx -= \"zzz\"");
        assert_eq!(r.unwrap_err().message, "Item not found");
    }

    #[test]
    fn plus_equals_then_minus_equals_is_identity() {
        let (mut scope, r) = eval_new("x = [\"a\", \"b\"]\nx += \"c\"\nx -= \"c\"");
        r.unwrap();
        assert_eq!(get_string_list(&mut scope, "x"), vec!["a", "b"]);

        let (mut scope, r) = eval_new("n = 10\nn += 4\nn -= 4");
        r.unwrap();
        assert_eq!(get_int(&mut scope, "n"), 10);
    }

    #[test]
    fn compound_assignment_requires_existing_variable() {
        let (_, r) = eval_new("x += 1");
        assert!(r.unwrap_err().message.contains("Undefined variable"));
        let (_, r) = eval_new("x -= 1");
        assert!(r.unwrap_err().message.contains("Undefined variable"));
    }

    #[test]
    fn overwriting_unused_variable_is_an_error() {
        let (_, r) = eval_new("x = 1\nx = 2");
        let err = r.unwrap_err();
        assert_eq!(err.message, "Overwriting unused variable.");
        assert_eq!(err.sub_errors[0].message, "Previously set here.");
    }

    #[test]
    fn replacing_nonempty_list_is_an_error_and_clearing_is_not() {
        // The first list is "used" here by reading it, leaving the
        // nonempty-list replacement as the failing check.
        let (_, r) = eval_new("x = [1]\ny = x\nx = [2]\nassertion = y");
        let err = r.unwrap_err();
        assert_eq!(err.message, "Replacing nonempty list.");

        let (mut scope, r) = eval_new("x = [1]\ny = x\nx = []\nx = [2]\nz = y");
        r.unwrap();
        assert_eq!(
            scope.get_value("x", true).unwrap().as_list().unwrap().len(),
            1
        );
    }

    #[test]
    fn self_assignment_preserves_value() {
        let mut scope = Scope::new(Settings::for_tests());
        eval(&mut scope, "x = 41").unwrap();
        // Reading x on the right marks it used, so this is not an
        // "overwriting unused variable" error.
        eval(&mut scope, "x = x").unwrap();
        assert_eq!(get_int(&mut scope, "x"), 41);
    }

    #[test]
    fn sources_assignment_is_filtered() {
        let mut scope = Scope::new(Settings::for_tests());
        let patterns = Value::list(None, vec![Value::string(None, "*_win.cc")]);
        scope.set_sources_assignment_filter(PatternList::from_value(&patterns).unwrap());

        eval(
            &mut scope,
            "sources = [\"a.cc\", \"a_win.cc\", \"b.cc\"]",
        )
        .unwrap();
        assert_eq!(get_string_list(&mut scope, "sources"), vec!["a.cc", "b.cc"]);

        eval(&mut scope, "sources += [\"c_win.cc\", \"c.cc\"]").unwrap();
        assert_eq!(
            get_string_list(&mut scope, "sources"),
            vec!["a.cc", "b.cc", "c.cc"]
        );
    }

    #[test]
    fn filter_does_not_apply_to_other_variables() {
        let mut scope = Scope::new(Settings::for_tests());
        let patterns = Value::list(None, vec![Value::string(None, "*_win.cc")]);
        scope.set_sources_assignment_filter(PatternList::from_value(&patterns).unwrap());

        eval(&mut scope, "inputs = [\"a_win.cc\"]").unwrap();
        assert_eq!(get_string_list(&mut scope, "inputs"), vec!["a_win.cc"]);
    }

    #[test]
    fn structural_equality_across_kinds() {
        let (mut scope, r) = eval_new(
            "a = [1, \"x\"] == [1, \"x\"]\nb = [1] == [2]\nc = 1 == \"1\"\nd = 2 != 3",
        );
        r.unwrap();
        assert_eq!(get_int(&mut scope, "a"), 1);
        assert_eq!(get_int(&mut scope, "b"), 0);
        assert_eq!(get_int(&mut scope, "c"), 0);
        assert_eq!(get_int(&mut scope, "d"), 1);
    }

    #[test]
    fn relational_operators_require_integers() {
        let (mut scope, r) = eval_new("a = 1 < 2\nb = 3 <= 3\nc = 4 > 5\nd = 4 >= 5");
        r.unwrap();
        assert_eq!(get_int(&mut scope, "a"), 1);
        assert_eq!(get_int(&mut scope, "b"), 1);
        assert_eq!(get_int(&mut scope, "c"), 0);
        assert_eq!(get_int(&mut scope, "d"), 0);

        let (_, r) = eval_new("x = \"a\" < \"b\"");
        assert_eq!(r.unwrap_err().message, "Comparison requires two integers.");
    }

    #[test]
    fn logical_operators_use_truthiness() {
        let (mut scope, r) = eval_new(
            "a = 1 && \"x\"\nb = 1 && \"\"\nc = 0 || [1]\nd = 0 || []\ne = !0\nf = !\"x\"",
        );
        r.unwrap();
        assert_eq!(get_int(&mut scope, "a"), 1);
        assert_eq!(get_int(&mut scope, "b"), 0);
        assert_eq!(get_int(&mut scope, "c"), 1);
        assert_eq!(get_int(&mut scope, "d"), 0);
        assert_eq!(get_int(&mut scope, "e"), 1);
        assert_eq!(get_int(&mut scope, "f"), 0);
    }

    #[test]
    fn subtracting_strings_is_an_error() {
        let (_, r) = eval_new("x = \"ab\" - \"b\"");
        assert!(r.unwrap_err().message.contains("Incompatible types"));
    }
}
