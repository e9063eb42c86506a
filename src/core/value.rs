// src/core/value.rs

use std::fmt;
use std::sync::Arc;

use crate::core::err::BuildError;
use crate::core::location::LocationRange;
use crate::core::parse_tree::ParseNode;

/// Discriminant names, used in type-mismatch diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    None,
    Integer,
    String,
    List,
}

impl ValueType {
    pub fn describe(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Integer => "integer",
            Self::String => "string",
            Self::List => "list",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ValueKind {
    None,
    Integer(i64),
    String(String),
    List(Vec<Value>),
}

/// A value in the interpreter. The origin is the AST node that produced it,
/// used to blame errors back to source; internally-generated values have no
/// origin.
#[derive(Debug, Clone)]
pub struct Value {
    pub kind: ValueKind,
    pub origin: Option<Arc<ParseNode>>,
}

impl Value {
    pub fn none() -> Self {
        Self {
            kind: ValueKind::None,
            origin: None,
        }
    }

    pub fn integer(origin: Option<Arc<ParseNode>>, v: i64) -> Self {
        Self {
            kind: ValueKind::Integer(v),
            origin,
        }
    }

    pub fn string(origin: Option<Arc<ParseNode>>, v: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::String(v.into()),
            origin,
        }
    }

    pub fn list(origin: Option<Arc<ParseNode>>, v: Vec<Value>) -> Self {
        Self {
            kind: ValueKind::List(v),
            origin,
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self.kind {
            ValueKind::None => ValueType::None,
            ValueKind::Integer(_) => ValueType::Integer,
            ValueKind::String(_) => ValueType::String,
            ValueKind::List(_) => ValueType::List,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self.kind, ValueKind::None)
    }

    pub fn set_origin(&mut self, origin: Option<Arc<ParseNode>>) {
        self.origin = origin;
    }

    /// The range of the node that produced this value, if known.
    pub fn origin_range(&self) -> LocationRange {
        self.origin
            .as_ref()
            .map(|n| n.range())
            .unwrap_or_else(LocationRange::none)
    }

    pub fn as_string(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self.kind {
            ValueKind::Integer(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match &self.kind {
            ValueKind::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match &mut self.kind {
            ValueKind::List(l) => Some(l),
            _ => None,
        }
    }

    /// Boolean interpretation: `0`, `""`, `[]` and none are false,
    /// everything else is true.
    pub fn interpret_as_int(&self) -> i64 {
        let truthy = match &self.kind {
            ValueKind::None => false,
            ValueKind::Integer(i) => *i != 0,
            ValueKind::String(s) => !s.is_empty(),
            ValueKind::List(l) => !l.is_empty(),
        };
        i64::from(truthy)
    }

    /// Errors unless this value has the given type, blaming the value's
    /// origin.
    pub fn verify_type(&self, expected: ValueType) -> Result<(), BuildError> {
        if self.value_type() == expected {
            return Ok(());
        }
        Err(BuildError::with_help(
            self.origin_range(),
            format!(
                "This is not a {}.",
                expected.describe()
            ),
            format!("Instead I see a {}.", self.value_type().describe()),
        ))
    }

    /// Errors unless this value is a string, returning its contents.
    pub fn require_string(&self) -> Result<&str, BuildError> {
        self.verify_type(ValueType::String)?;
        Ok(self.as_string().unwrap_or_default())
    }

    pub fn require_list(&self) -> Result<&[Value], BuildError> {
        self.verify_type(ValueType::List)?;
        Ok(self.as_list().unwrap_or_default())
    }

    /// Display form used by `print`, `write_file` and string expansion.
    /// Strings render without quotes at the top level; strings nested in
    /// lists are quoted.
    pub fn to_display_string(&self) -> String {
        match &self.kind {
            ValueKind::String(s) => s.clone(),
            other => render_nested(other),
        }
    }
}

fn render_nested(kind: &ValueKind) -> String {
    match kind {
        ValueKind::None => "<none>".to_string(),
        ValueKind::Integer(i) => i.to_string(),
        ValueKind::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        ValueKind::List(l) => {
            let inner: Vec<String> = l.iter().map(|v| render_nested(&v.kind)).collect();
            format!("[{}]", inner.join(", "))
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

/// Comparison is structural over the contents only; origins are ignored.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (ValueKind::None, ValueKind::None) => true,
            (ValueKind::Integer(a), ValueKind::Integer(b)) => a == b,
            (ValueKind::String(a), ValueKind::String(b)) => a == b,
            (ValueKind::List(a), ValueKind::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_structural_and_ignores_origin() {
        assert_eq!(Value::integer(None, 5), Value::integer(None, 5));
        assert_ne!(Value::integer(None, 5), Value::string(None, "5"));
        assert_eq!(
            Value::list(None, vec![Value::string(None, "a")]),
            Value::list(None, vec![Value::string(None, "a")])
        );
    }

    #[test]
    fn truthiness() {
        assert_eq!(Value::none().interpret_as_int(), 0);
        assert_eq!(Value::integer(None, 0).interpret_as_int(), 0);
        assert_eq!(Value::integer(None, -2).interpret_as_int(), 1);
        assert_eq!(Value::string(None, "").interpret_as_int(), 0);
        assert_eq!(Value::string(None, "x").interpret_as_int(), 1);
        assert_eq!(Value::list(None, vec![]).interpret_as_int(), 0);
        assert_eq!(
            Value::list(None, vec![Value::none()]).interpret_as_int(),
            1
        );
    }

    #[test]
    fn display_quotes_strings_only_in_lists() {
        assert_eq!(Value::string(None, "hi").to_display_string(), "hi");
        let l = Value::list(
            None,
            vec![Value::string(None, "a"), Value::integer(None, 3)],
        );
        assert_eq!(l.to_display_string(), "[\"a\", 3]");
    }

    #[test]
    fn verify_type_reports_actual_type() {
        let err = Value::integer(None, 1).verify_type(ValueType::String).unwrap_err();
        assert!(err.help.contains("integer"));
    }
}
