// src/core/file_template.rs

use std::sync::Arc;

use crate::core::err::BuildError;
use crate::core::parse_tree::ParseNode;
use crate::core::paths::find_filename_no_extension;
use crate::core::value::{Value, ValueKind};

const SOURCE_SUBST: &str = "{{source}}";
const SOURCE_NAME_PART_SUBST: &str = "{{source_name_part}}";

#[derive(Debug, Clone)]
enum Subrange {
    Literal(String),
    /// The entire source filename including path.
    Source,
    /// The basename with extension removed.
    NamePart,
}

/// The filename pattern mini-language used by `process_file_template` and
/// script targets. Each pattern string is decomposed into literal runs and
/// substitution markers; applying N patterns to M sources yields N×M
/// outputs, source-major.
#[derive(Debug, Clone, Default)]
pub struct FileTemplate {
    templates: Vec<Vec<Subrange>>,
}

impl FileTemplate {
    /// Builds from a value that is either a single pattern string or a list
    /// of pattern strings.
    pub fn from_value(value: &Value) -> Result<Self, BuildError> {
        let mut result = Self::default();
        match &value.kind {
            ValueKind::String(s) => result.parse_one_template_string(s),
            ValueKind::List(items) => {
                for item in items {
                    result.parse_one_template_string(item.require_string()?);
                }
            }
            _ => {
                return Err(BuildError::with_help(
                    value.origin_range(),
                    "File template must be a string or list.",
                    "",
                ));
            }
        }
        Ok(result)
    }

    pub fn from_strings(patterns: &[String]) -> Self {
        let mut result = Self::default();
        for p in patterns {
            result.parse_one_template_string(p);
        }
        result
    }

    /// Applies every pattern to every source in the list, appending the
    /// results to `dest`.
    pub fn apply(
        &self,
        sources: &Value,
        origin: Option<Arc<ParseNode>>,
        dest: &mut Vec<Value>,
    ) -> Result<(), BuildError> {
        let list = sources.require_list()?;
        dest.reserve(list.len() * self.templates.len());

        for source in list {
            let source_str = source.require_string()?;
            for out in self.apply_string(source_str) {
                dest.push(Value::string(origin.clone(), out));
            }
        }
        Ok(())
    }

    /// Applies every pattern to one source string.
    pub fn apply_string(&self, source: &str) -> Vec<String> {
        let name_part = find_filename_no_extension(source);

        self.templates
            .iter()
            .map(|template| {
                let mut out = String::new();
                for subrange in template {
                    match subrange {
                        Subrange::Literal(l) => out.push_str(l),
                        Subrange::Source => out.push_str(source),
                        Subrange::NamePart => out.push_str(name_part),
                    }
                }
                out
            })
            .collect()
    }

    fn parse_one_template_string(&mut self, pattern: &str) {
        let mut template = Vec::new();
        let mut cur = 0;
        while cur < pattern.len() {
            let Some(next) = pattern[cur..].find("{{").map(|i| i + cur) else {
                template.push(Subrange::Literal(pattern[cur..].to_string()));
                break;
            };
            if next > cur {
                template.push(Subrange::Literal(pattern[cur..next].to_string()));
            }

            if pattern[next..].starts_with(SOURCE_SUBST) {
                template.push(Subrange::Source);
                cur = next + SOURCE_SUBST.len();
            } else if pattern[next..].starts_with(SOURCE_NAME_PART_SUBST) {
                template.push(Subrange::NamePart);
                cur = next + SOURCE_NAME_PART_SUBST.len();
            } else {
                // Not a known substitution: treat the brace as a literal and
                // keep scanning.
                template.push(Subrange::Literal("{".to_string()));
                cur = next + 1;
            }
        }
        self.templates.push(template);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_patterns(patterns: &[&str], sources: &[&str]) -> Vec<String> {
        let template =
            FileTemplate::from_strings(&patterns.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        let sources = Value::list(
            None,
            sources.iter().map(|s| Value::string(None, *s)).collect(),
        );
        let mut out = Vec::new();
        template.apply(&sources, None, &mut out).unwrap();
        out.iter().map(|v| v.as_string().unwrap().to_string()).collect()
    }

    #[test]
    fn source_substitutes_whole_path() {
        assert_eq!(
            apply_patterns(&["gen/{{source}}.o"], &["//foo/bar.cc"]),
            vec!["gen///foo/bar.cc.o"]
        );
    }

    #[test]
    fn source_name_part_strips_path_and_extension() {
        assert_eq!(
            apply_patterns(&["gen/{{source_name_part}}.cc"], &["//idl/interface.idl"]),
            vec!["gen/interface.cc"]
        );
    }

    #[test]
    fn n_patterns_by_m_sources_is_source_major() {
        assert_eq!(
            apply_patterns(
                &["{{source_name_part}}.cc", "{{source_name_part}}.h"],
                &["a.idl", "b.idl"]
            ),
            vec!["a.cc", "a.h", "b.cc", "b.h"]
        );
    }

    #[test]
    fn unknown_substitution_is_a_literal_brace() {
        assert_eq!(
            apply_patterns(&["{{unknown}}.x"], &["a.idl"]),
            vec!["{{unknown}}.x"]
        );
    }

    #[test]
    fn from_value_accepts_string_or_list_only() {
        assert!(FileTemplate::from_value(&Value::string(None, "{{source}}")).is_ok());
        assert!(FileTemplate::from_value(&Value::integer(None, 2)).is_err());
    }
}
