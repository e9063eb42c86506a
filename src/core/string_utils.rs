// src/core/string_utils.rs

use crate::core::err::BuildError;
use crate::core::location::{Location, LocationRange};
use crate::core::scope::Scope;
use crate::core::token::{Token, TokenKind};
use crate::core::tokenizer::{is_identifier_continuing_char, is_identifier_first_char};

/// Builds an error range pointing inside a string token. The offset is
/// relative to the string contents (the opening quote is skipped).
fn err_inside_string_token(
    token: &Token,
    offset: usize,
    size: usize,
    message: impl Into<String>,
    help: impl Into<String>,
) -> BuildError {
    let begin = Location::new(
        token.range.begin.file,
        token.range.begin.line,
        token.range.begin.column + offset as u32 + 1,
    );
    let end = Location::new(begin.file, begin.line, begin.column + size as u32);
    BuildError::with_help(LocationRange::new(begin, end), message, help)
}

/// Expands a string literal against the scope: applies the `\\`, `\"`, `\$`
/// escapes and substitutes embedded `$identifier` / `${identifier}`
/// references with the display form of the variable's value. Reading a
/// variable this way counts as using it.
pub fn expand_string_literal(scope: &mut Scope<'_>, token: &Token) -> Result<String, BuildError> {
    debug_assert_eq!(token.kind, TokenKind::String);
    debug_assert!(token.text.len() >= 2);

    // The token text includes the surrounding quotes.
    let input = &token.text.as_bytes()[1..token.text.len() - 1];
    let inner_str = &token.text[1..token.text.len() - 1];

    let mut output = String::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        match input[i] {
            b'\\' => {
                if i + 1 < input.len() {
                    match input[i + 1] {
                        b'\\' | b'"' | b'$' => {
                            output.push(input[i + 1] as char);
                            i += 2;
                            continue;
                        }
                        _ => {}
                    }
                }
                // Everything else has no meaning, pass the backslash.
                output.push('\\');
                i += 1;
            }
            b'$' => {
                let (identifier, consumed_to) = locate_inline_identifier(token, inner_str, i)?;
                append_identifier_value(scope, token, inner_str, i, &identifier, &mut output)?;
                i = consumed_to;
            }
            _ => {
                output.push(input[i] as char);
                i += 1;
            }
        }
    }
    Ok(output)
}

/// Parses the identifier following the `$` at byte `dollar` of the string
/// contents. Returns the identifier and the index just past what was
/// consumed.
fn locate_inline_identifier(
    token: &Token,
    inner: &str,
    dollar: usize,
) -> Result<(String, usize), BuildError> {
    let bytes = inner.as_bytes();
    let mut i = dollar + 1;
    if i == bytes.len() {
        return Err(err_inside_string_token(
            token,
            dollar,
            1,
            "$ at end of string.",
            "I was expecting an identifier after the $.",
        ));
    }

    let has_brackets = bytes[i] == b'{';
    if has_brackets {
        i += 1;
        if i == bytes.len() {
            return Err(err_inside_string_token(
                token,
                dollar,
                2,
                "${ at end of string.",
                "I was expecting an identifier inside the ${...}.",
            ));
        }
    }

    if !is_identifier_first_char(bytes[i]) {
        return Err(err_inside_string_token(
            token,
            dollar,
            i - dollar + 1,
            "$ not followed by an identifier char.",
            "If you want a literal $ use \"\\$\".",
        ));
    }
    let begin = i;
    i += 1;
    while i < bytes.len() && is_identifier_continuing_char(bytes[i]) {
        i += 1;
    }
    let end = i;

    if has_brackets {
        if i == bytes.len() {
            return Err(err_inside_string_token(
                token,
                dollar,
                i - dollar,
                "Unterminated ${...",
                "",
            ));
        }
        if bytes[i] != b'}' {
            return Err(err_inside_string_token(
                token,
                i,
                1,
                "Not an identifier in string expansion.",
                "The contents of ${...} should be an identifier.",
            ));
        }
        i += 1; // Consume the closing bracket.
    }

    Ok((inner[begin..end].to_string(), i))
}

fn append_identifier_value(
    scope: &mut Scope<'_>,
    token: &Token,
    _inner: &str,
    dollar: usize,
    identifier: &str,
    output: &mut String,
) -> Result<(), BuildError> {
    let Some(value) = scope.get_value(identifier, true) else {
        return Err(err_inside_string_token(
            token,
            dollar,
            identifier.len() + 1,
            "Undefined identifier in string expansion.",
            format!("\"{identifier}\" is not currently in scope."),
        ));
    };
    output.push_str(&value.to_display_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scope::Scope;
    use crate::core::settings::Settings;
    use crate::core::value::Value;

    fn string_token(text: &str) -> Token {
        Token::new(TokenKind::String, text, LocationRange::none())
    }

    fn expand(scope: &mut Scope<'_>, text: &str) -> Result<String, BuildError> {
        expand_string_literal(scope, &string_token(text))
    }

    #[test]
    fn plain_strings_pass_through() {
        let mut scope = Scope::new(Settings::for_tests());
        assert_eq!(expand(&mut scope, "\"hello\"").unwrap(), "hello");
        assert_eq!(expand(&mut scope, "\"\"").unwrap(), "");
    }

    #[test]
    fn escapes_are_applied() {
        let mut scope = Scope::new(Settings::for_tests());
        assert_eq!(expand(&mut scope, "\"a\\\"b\"").unwrap(), "a\"b");
        assert_eq!(expand(&mut scope, "\"a\\$b\"").unwrap(), "a$b");
        assert_eq!(expand(&mut scope, "\"a\\\\b\"").unwrap(), "a\\b");
        // Unknown escapes pass the backslash through.
        assert_eq!(expand(&mut scope, "\"a\\nb\"").unwrap(), "a\\nb");
    }

    #[test]
    fn dollar_expansion_both_forms() {
        let mut scope = Scope::new(Settings::for_tests());
        scope.set_value("name", Value::string(None, "foo"), None);
        assert_eq!(expand(&mut scope, "\"$name.cc\"").unwrap(), "foo.cc");
        assert_eq!(
            expand(&mut scope, "\"${name}_code_gen\"").unwrap(),
            "foo_code_gen"
        );
    }

    #[test]
    fn expansion_counts_as_a_use() {
        let mut scope = Scope::new(Settings::for_tests());
        scope.set_value("name", Value::string(None, "foo"), None);
        assert!(scope.is_set_but_unused("name"));
        expand(&mut scope, "\"$name\"").unwrap();
        assert!(!scope.is_set_but_unused("name"));
    }

    #[test]
    fn integer_values_render_as_digits() {
        let mut scope = Scope::new(Settings::for_tests());
        scope.set_value("n", Value::integer(None, 12), None);
        assert_eq!(expand(&mut scope, "\"v$n\"").unwrap(), "v12");
    }

    #[test]
    fn expansion_errors() {
        let mut scope = Scope::new(Settings::for_tests());
        assert!(expand(&mut scope, "\"$\"").is_err()); // $ at end.
        assert!(expand(&mut scope, "\"${\"").is_err()); // ${ at end.
        assert!(expand(&mut scope, "\"$1\"").is_err()); // Not an identifier.
        assert!(expand(&mut scope, "\"${x\"").is_err()); // Unterminated.
        assert!(expand(&mut scope, "\"$missing\"").is_err()); // Undefined.
    }
}
