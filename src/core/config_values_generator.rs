// src/core/config_values_generator.rs

use crate::core::config_values::ConfigValues;
use crate::core::err::BuildError;
use crate::core::paths::SourceDir;
use crate::core::scope::Scope;
use crate::core::value_extractors::{extract_list_of_relative_dirs, extract_list_of_string_values};
use crate::core::variables;

/// Reads the flag variables out of an executed block scope into a
/// `ConfigValues` record. Used for `config(...)` declarations and for the
/// values set directly on binary targets. Absent variables mean empty
/// lists.
pub fn generate_config_values(
    scope: &mut Scope<'_>,
    input_dir: &SourceDir,
) -> Result<ConfigValues, BuildError> {
    let mut values = ConfigValues::default();

    if let Some(value) = scope.get_value(variables::INCLUDES, true) {
        values.includes = extract_list_of_relative_dirs(&value, input_dir)?;
    }

    fill_string_list(scope, variables::DEFINES, &mut values.defines)?;
    fill_string_list(scope, variables::CFLAGS, &mut values.cflags)?;
    fill_string_list(scope, variables::CFLAGS_C, &mut values.cflags_c)?;
    fill_string_list(scope, variables::CFLAGS_CC, &mut values.cflags_cc)?;
    fill_string_list(scope, variables::CFLAGS_OBJC, &mut values.cflags_objc)?;
    fill_string_list(scope, variables::CFLAGS_OBJCC, &mut values.cflags_objcc)?;
    fill_string_list(scope, variables::LDFLAGS, &mut values.ldflags)?;

    Ok(values)
}

fn fill_string_list(
    scope: &mut Scope<'_>,
    name: &str,
    dest: &mut Vec<String>,
) -> Result<(), BuildError> {
    if let Some(value) = scope.get_value(name, true) {
        *dest = extract_list_of_string_values(&value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::settings::Settings;
    use crate::core::value::Value;

    #[test]
    fn reads_present_variables_and_leaves_the_rest_empty() {
        let mut scope = Scope::new(Settings::for_tests());
        scope.set_value(
            "defines",
            Value::list(None, vec![Value::string(None, "FOO")]),
            None,
        );
        scope.set_value(
            "includes",
            Value::list(None, vec![Value::string(None, "inc")]),
            None,
        );

        let values =
            generate_config_values(&mut scope, &SourceDir::new("//base/")).unwrap();
        assert_eq!(values.defines, vec!["FOO"]);
        assert_eq!(values.includes[0].value(), "//base/inc/");
        assert!(values.cflags.is_empty());
    }

    #[test]
    fn reading_counts_as_use() {
        let mut scope = Scope::new(Settings::for_tests());
        scope.set_value(
            "cflags",
            Value::list(None, vec![Value::string(None, "-O2")]),
            None,
        );
        generate_config_values(&mut scope, &SourceDir::new("//")).unwrap();
        assert!(!scope.is_set_but_unused("cflags"));
    }

    #[test]
    fn type_errors_propagate() {
        let mut scope = Scope::new(Settings::for_tests());
        scope.set_value("defines", Value::integer(None, 3), None);
        assert!(generate_config_values(&mut scope, &SourceDir::new("//")).is_err());
    }
}
