// src/core/pattern.rs

use regex::Regex;

use crate::core::err::BuildError;
use crate::core::value::{Value, ValueKind};

/// One filename pattern for the sources-assignment filter. `*` matches any
/// run of characters (including none, and including slashes); everything
/// else is literal. Matching is whole-string.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
    original: String,
}

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, BuildError> {
        let escaped: Vec<String> = pattern.split('*').map(|c| regex::escape(c)).collect();
        let re = format!("^{}$", escaped.join(".*"));

        let regex = Regex::new(&re).map_err(|e| {
            BuildError::bare(
                format!("Invalid filter pattern \"{pattern}\"."),
                e.to_string(),
            )
        })?;
        Ok(Self {
            regex,
            original: pattern.to_string(),
        })
    }

    pub fn matches(&self, s: &str) -> bool {
        self.regex.is_match(s)
    }

    pub fn original(&self) -> &str {
        &self.original
    }
}

/// The pattern list installed by `set_sources_assignment_filter`. An element
/// is filtered out when any pattern matches it.
#[derive(Debug, Clone, Default)]
pub struct PatternList {
    patterns: Vec<Pattern>,
}

impl PatternList {
    pub fn from_value(value: &Value) -> Result<Self, BuildError> {
        let mut patterns = Vec::new();
        match &value.kind {
            ValueKind::String(s) => patterns.push(Pattern::new(s)?),
            ValueKind::List(items) => {
                for item in items {
                    patterns.push(Pattern::new(item.require_string()?)?);
                }
            }
            _ => {
                return Err(BuildError::with_help(
                    value.origin_range(),
                    "Sources assignment filter must be a list of strings.",
                    "",
                ));
            }
        }
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, s: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(s))
    }

    /// String values are matched on their contents; all other value kinds
    /// never match.
    pub fn matches_value(&self, value: &Value) -> bool {
        match value.as_string() {
            Some(s) => self.matches(s),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_patterns_match_whole_string_only() {
        let p = Pattern::new("foo.cc").unwrap();
        assert!(p.matches("foo.cc"));
        assert!(!p.matches("barfoo.cc"));
        assert!(!p.matches("foo.cc.h"));
    }

    #[test]
    fn star_matches_any_run() {
        let p = Pattern::new("*_win.cc").unwrap();
        assert!(p.matches("a_win.cc"));
        assert!(p.matches("foo/bar_win.cc"));
        assert!(!p.matches("a_win.cc.old"));
        assert!(!p.matches("a.cc"));
    }

    #[test]
    fn star_in_the_middle() {
        let p = Pattern::new("win/*.cc").unwrap();
        assert!(p.matches("win/x.cc"));
        assert!(p.matches("win/sub/x.cc"));
        assert!(!p.matches("mac/x.cc"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let p = Pattern::new("a.b").unwrap();
        assert!(p.matches("a.b"));
        assert!(!p.matches("axb"));
    }

    #[test]
    fn list_matches_when_any_pattern_matches() {
        let v = Value::list(
            None,
            vec![
                Value::string(None, "*_win.cc"),
                Value::string(None, "*_mac.mm"),
            ],
        );
        let list = PatternList::from_value(&v).unwrap();
        assert!(list.matches("a_win.cc"));
        assert!(list.matches("a_mac.mm"));
        assert!(!list.matches("a.cc"));
        assert!(!list.matches_value(&Value::integer(None, 3)));
    }
}
