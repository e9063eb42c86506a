// src/core/parse_tree.rs

use std::fmt::Write as _;
use std::sync::Arc;

use crate::core::err::BuildError;
use crate::core::functions;
use crate::core::location::LocationRange;
use crate::core::operators;
use crate::core::scope::Scope;
use crate::core::string_utils;
use crate::core::token::{Token, TokenKind};
use crate::core::value::{Value, ValueType};

/// A node in the AST. Children are reference-counted so that templates and
/// value origins can retain nodes for the lifetime of the run; the input
/// file manager keeps every parsed root alive, and everything else hangs
/// off those roots.
#[derive(Debug)]
pub enum ParseNode {
    Literal {
        token: Token,
    },
    Identifier {
        token: Token,
    },
    /// List subscript: `base[index]`.
    Accessor {
        base: Token,
        index: Arc<ParseNode>,
    },
    UnaryOp {
        op: Token,
        operand: Arc<ParseNode>,
    },
    BinaryOp {
        op: Token,
        left: Arc<ParseNode>,
        right: Arc<ParseNode>,
    },
    List {
        begin: Token,
        end: Token,
        contents: Vec<Arc<ParseNode>>,
    },
    Block {
        /// Whether executing this block pushes a nested scope. The file
        /// root block is executed directly in the file scope instead.
        has_scope: bool,
        begin: Option<Token>,
        end: Option<Token>,
        statements: Vec<Arc<ParseNode>>,
    },
    Condition {
        if_token: Token,
        condition: Arc<ParseNode>,
        if_true: Arc<ParseNode>,
        /// Either a block (plain `else`) or another condition (`else if`).
        if_false: Option<Arc<ParseNode>>,
    },
    FunctionCall {
        function: Token,
        /// Always a `List` node holding the arguments.
        args: Arc<ParseNode>,
        block: Option<Arc<ParseNode>>,
    },
}

impl ParseNode {
    /// The full source span of this node.
    pub fn range(&self) -> LocationRange {
        match self {
            Self::Literal { token } | Self::Identifier { token } => token.range,
            Self::Accessor { base, index } => base.range.union(index.range()),
            Self::UnaryOp { op, operand } => op.range.union(operand.range()),
            Self::BinaryOp { left, right, .. } => left.range().union(right.range()),
            Self::List { begin, end, .. } => begin.range.union(end.range),
            Self::Block { begin, end, .. } => match (begin, end) {
                (Some(b), Some(e)) => b.range.union(e.range),
                (Some(b), None) => b.range,
                _ => LocationRange::none(),
            },
            Self::Condition {
                if_token,
                if_true,
                if_false,
                ..
            } => {
                let tail = if_false.as_ref().unwrap_or(if_true);
                if_token.range.union(tail.range())
            }
            Self::FunctionCall {
                function,
                args,
                block,
            } => {
                let tail = block.as_ref().unwrap_or(args);
                function.range.union(tail.range())
            }
        }
    }

    /// The span blamed by [`ParseNode::make_error`]. Narrower than
    /// `range()` for operators and calls, where pointing at the operator or
    /// function name reads better than underlining whole sub-expressions.
    pub fn blame_range(&self) -> LocationRange {
        match self {
            Self::BinaryOp { op, .. } | Self::UnaryOp { op, .. } => op.range,
            Self::Condition { if_token, .. } => if_token.range,
            Self::FunctionCall { function, .. } => function.range,
            Self::List { begin, .. } => begin.range,
            Self::Block { begin, .. } => {
                begin.as_ref().map(|t| t.range).unwrap_or_else(LocationRange::none)
            }
            _ => self.range(),
        }
    }

    pub fn make_error(&self, message: impl Into<String>) -> BuildError {
        BuildError::new(self.blame_range(), message)
    }

    pub fn make_error_with_help(
        &self,
        message: impl Into<String>,
        help: impl Into<String>,
    ) -> BuildError {
        BuildError::with_help(self.blame_range(), message, help)
    }

    pub fn is_statement_without_effect(&self) -> bool {
        matches!(
            self,
            Self::Literal { .. } | Self::Identifier { .. } | Self::List { .. } | Self::UnaryOp { .. }
        )
    }

    pub fn as_identifier_token(&self) -> Option<&Token> {
        match self {
            Self::Identifier { token } => Some(token),
            _ => None,
        }
    }

    pub fn as_literal_token(&self) -> Option<&Token> {
        match self {
            Self::Literal { token } => Some(token),
            _ => None,
        }
    }

    pub fn as_block_statements(&self) -> Option<&[Arc<ParseNode>]> {
        match self {
            Self::Block { statements, .. } => Some(statements),
            _ => None,
        }
    }

    pub fn as_list_contents(&self) -> Option<&[Arc<ParseNode>]> {
        match self {
            Self::List { contents, .. } => Some(contents),
            _ => None,
        }
    }

    pub fn as_binary_op(&self) -> Option<(&Arc<ParseNode>, &Token, &Arc<ParseNode>)> {
        match self {
            Self::BinaryOp { left, op, right } => Some((left, op, right)),
            _ => None,
        }
    }

    pub fn as_function_call(&self) -> Option<(&Token, &Arc<ParseNode>, Option<&Arc<ParseNode>>)> {
        match self {
            Self::FunctionCall {
                function,
                args,
                block,
            } => Some((function, args, block.as_ref())),
            _ => None,
        }
    }

    /// Indented structural dump used by the parser tests.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(&mut out, 0);
        out
    }

    fn dump_into(&self, out: &mut String, indent: usize) {
        let pad = " ".repeat(indent);
        match self {
            Self::Literal { token } => {
                let _ = writeln!(out, "{pad}LITERAL({})", token.text);
            }
            Self::Identifier { token } => {
                let _ = writeln!(out, "{pad}IDENTIFIER({})", token.text);
            }
            Self::Accessor { base, index } => {
                let _ = writeln!(out, "{pad}ACCESSOR({})", base.text);
                index.dump_into(out, indent + 1);
            }
            Self::UnaryOp { op, operand } => {
                let _ = writeln!(out, "{pad}UNARY({})", op.text);
                operand.dump_into(out, indent + 1);
            }
            Self::BinaryOp { op, left, right } => {
                let _ = writeln!(out, "{pad}BINARY({})", op.text);
                left.dump_into(out, indent + 1);
                right.dump_into(out, indent + 1);
            }
            Self::List { contents, .. } => {
                let _ = writeln!(out, "{pad}LIST");
                for c in contents {
                    c.dump_into(out, indent + 1);
                }
            }
            Self::Block { statements, .. } => {
                let _ = writeln!(out, "{pad}BLOCK");
                for s in statements {
                    s.dump_into(out, indent + 1);
                }
            }
            Self::Condition {
                condition,
                if_true,
                if_false,
                ..
            } => {
                let _ = writeln!(out, "{pad}CONDITION");
                condition.dump_into(out, indent + 1);
                if_true.dump_into(out, indent + 1);
                if let Some(f) = if_false {
                    f.dump_into(out, indent + 1);
                }
            }
            Self::FunctionCall {
                function,
                args,
                block,
            } => {
                let _ = writeln!(out, "{pad}FUNCTION({})", function.text);
                args.dump_into(out, indent + 1);
                if let Some(b) = block {
                    b.dump_into(out, indent + 1);
                }
            }
        }
    }
}

/// Evaluates one node against the given scope.
pub fn execute(node: &Arc<ParseNode>, scope: &mut Scope<'_>) -> Result<Value, BuildError> {
    match &**node {
        ParseNode::Literal { token } => execute_literal(node, token, scope),
        ParseNode::Identifier { token } => scope
            .get_value(&token.text, true)
            .ok_or_else(|| node.make_error("Undefined identifier")),
        ParseNode::Accessor { base, index } => execute_accessor(node, base, index, scope),
        ParseNode::UnaryOp { operand, .. } => {
            let operand_value = execute(operand, scope)?;
            operators::execute_unary_operator(node, operand_value)
        }
        ParseNode::BinaryOp { .. } => operators::execute_binary_operator(scope, node),
        ParseNode::List { contents, .. } => {
            let mut results = Vec::with_capacity(contents.len());
            for item in contents {
                let v = execute(item, scope)?;
                if v.is_none() {
                    return Err(item.make_error_with_help(
                        "This does not evaluate to a value.",
                        "I can't do something with nothing.",
                    ));
                }
                results.push(v);
            }
            Ok(Value::list(Some(node.clone()), results))
        }
        ParseNode::Block { has_scope, .. } => {
            if *has_scope {
                scope.push_frame();
                if let Err(e) = execute_block_in_scope(node, scope) {
                    scope.pop_frame();
                    return Err(e);
                }
                let data = scope.pop_frame_checked()?;
                drop(data);
                Ok(Value::none())
            } else {
                execute_block_in_scope(node, scope)
            }
        }
        ParseNode::Condition {
            if_token,
            condition,
            if_true,
            if_false,
        } => {
            let cond = execute(condition, scope)?;
            if cond.is_none() {
                let mut err = condition.make_error_with_help(
                    "This does not evaluate to a value.",
                    "The if statement needs something to test.",
                );
                err.append_range(if_token.range);
                return Err(err);
            }

            if cond.interpret_as_int() != 0 {
                execute_block_in_scope(if_true, scope)?;
            } else if let Some(else_node) = if_false {
                // A plain else block inherits our scope; an else-if is
                // another condition and handles its own scoping.
                if else_node.as_block_statements().is_some() {
                    execute_block_in_scope(else_node, scope)?;
                } else {
                    execute(else_node, scope)?;
                }
            }
            Ok(Value::none())
        }
        ParseNode::FunctionCall { args, block, .. } => {
            let args_value = execute(args, scope)?;
            let args_list = match args_value.kind {
                crate::core::value::ValueKind::List(l) => l,
                _ => Vec::new(),
            };
            functions::run_function(scope, node, &args_list, block.as_ref())
        }
    }
}

/// Executes the statements of a block directly in the given scope, without
/// pushing a frame. Statements that can have no effect are rejected to
/// catch typos.
pub fn execute_block_in_scope(
    block: &Arc<ParseNode>,
    scope: &mut Scope<'_>,
) -> Result<Value, BuildError> {
    let Some(statements) = block.as_block_statements() else {
        return Err(block.make_error("Expected a block."));
    };

    for statement in statements {
        if statement.is_statement_without_effect() {
            return Err(statement.make_error_with_help(
                "This statement has no effect.",
                "Either delete it or do something with the result.",
            ));
        }
        execute(statement, scope)?;
    }
    Ok(Value::none())
}

fn execute_literal(
    node: &Arc<ParseNode>,
    token: &Token,
    scope: &mut Scope<'_>,
) -> Result<Value, BuildError> {
    match token.kind {
        TokenKind::Integer => {
            let parsed: i64 = token
                .text
                .parse()
                .map_err(|_| node.make_error("This does not look like an integer."))?;
            Ok(Value::integer(Some(node.clone()), parsed))
        }
        TokenKind::String => {
            let expanded = string_utils::expand_string_literal(scope, token)?;
            Ok(Value::string(Some(node.clone()), expanded))
        }
        _ => Err(node.make_error("Unexpected literal kind.")),
    }
}

fn execute_accessor(
    node: &Arc<ParseNode>,
    base: &Token,
    index: &Arc<ParseNode>,
    scope: &mut Scope<'_>,
) -> Result<Value, BuildError> {
    let index_value = execute(index, scope)?;
    index_value.verify_type(ValueType::Integer)?;
    let index_int = index_value.as_integer().unwrap_or(0);

    let base_value = scope
        .get_value(&base.text, true)
        .ok_or_else(|| node.make_error("Undefined identifier."))?;
    base_value.verify_type(ValueType::List)?;
    let list = base_value.as_list().unwrap_or_default();

    if index_int < 0 {
        return Err(BuildError::with_help(
            index.range(),
            "Negative list subscript.",
            format!("You gave me {index_int}."),
        ));
    }
    let index_usize = index_int as usize;
    if index_usize >= list.len() {
        return Err(BuildError::with_help(
            index.range(),
            "List subscript out of range.",
            format!(
                "You gave me {} but I was expecting something from 0 to {}, inclusive.",
                index_int,
                list.len() as i64 - 1
            ),
        ));
    }

    Ok(list[index_usize].clone())
}
