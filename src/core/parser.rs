// src/core/parser.rs

use std::sync::Arc;

use crate::core::err::BuildError;
use crate::core::location::{Location, LocationRange};
use crate::core::operators::{is_binary_operator, is_unary_operator};
use crate::core::parse_tree::ParseNode;
use crate::core::token::{Token, TokenKind};

/// Parses a whole file into a root block. The root block has no braces and
/// is executed directly in the file scope.
pub fn parse(tokens: Vec<Token>) -> Result<Arc<ParseNode>, BuildError> {
    let mut parser = Parser::new(tokens);
    let root = parser.parse_block(false)?;
    Ok(root)
}

/// Parses a single expression, used for the `"value"` input conversion.
/// Empty input yields `None`.
pub fn parse_expression(tokens: Vec<Token>) -> Result<Option<Arc<ParseNode>>, BuildError> {
    if tokens.is_empty() {
        return Ok(None);
    }
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr()?;
    Ok(Some(expr))
}

struct Parser {
    tokens: Vec<Token>,
    cur: usize,
}

fn same_line(a: &Token, b: &Token) -> bool {
    a.range.begin.line == b.range.begin.line
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, cur: 0 }
    }

    fn at_end(&self) -> bool {
        self.cur >= self.tokens.len()
    }

    fn cur_token(&self) -> &Token {
        &self.tokens[self.cur]
    }

    fn has_next(&self) -> bool {
        self.cur + 1 < self.tokens.len()
    }

    fn next_token(&self) -> &Token {
        &self.tokens[self.cur + 1]
    }

    fn eof_error(&self, message: &str, help: &str) -> BuildError {
        match self.tokens.last() {
            Some(last) => BuildError::with_help(last.range, message, help),
            None => BuildError::with_help(
                LocationRange::new(Location::none(), Location::none()),
                message,
                help,
            ),
        }
    }

    /// block := "{" statement* "}"
    ///
    /// Blocks at the file scope don't need braces, so `need_braces` is false
    /// for the root invocation only.
    fn parse_block(&mut self, need_braces: bool) -> Result<Arc<ParseNode>, BuildError> {
        let mut begin = None;
        if need_braces {
            if self.at_end() {
                return Err(self.eof_error(
                    "Got EOF when looking for { for the block.",
                    "It should have been right after here.",
                ));
            }
            if !self.cur_token().is_scoper_equal("{") {
                return Err(BuildError::with_help(
                    self.cur_token().range,
                    "Expecting { for a block.",
                    "All blocks use curly braces.",
                ));
            }
            begin = Some(self.cur_token().clone());
            self.cur += 1;
        }

        let mut statements = Vec::new();
        while !self.at_end() && !self.cur_token().is_scoper_equal("}") {
            let statement = if self.cur_token().is_identifier_equal("if") {
                self.parse_condition()?
            } else if self.cur_token().is_scoper_equal("{") {
                self.parse_block(true)?
            } else {
                self.parse_expr()?
            };
            statements.push(statement);
        }

        let mut end = None;
        if need_braces {
            if self.at_end() || !self.cur_token().is_scoper_equal("}") {
                let begin_token = begin.as_ref().map(|t| t.range).unwrap_or_default();
                return Err(BuildError::with_help(
                    begin_token,
                    "Expecting }",
                    "I ran into the end of the file looking for the closing brace\n\
                     corresponding to this one.",
                ));
            }
            end = Some(self.cur_token().clone());
            self.cur += 1;
        }

        Ok(Arc::new(ParseNode::Block {
            has_scope: need_braces,
            begin,
            end,
            statements,
        }))
    }

    /// conditional := "if" "(" expression ")" block
    ///                [ "else" (conditional | block) ]
    fn parse_condition(&mut self) -> Result<Arc<ParseNode>, BuildError> {
        let if_token = self.cur_token().clone();
        self.cur += 1;

        if self.at_end() || !self.cur_token().is_scoper_equal("(") {
            return Err(BuildError::at_token(&if_token, "Expecting \"(\" after \"if\"."));
        }
        let open_paren = self.cur_token().clone();
        self.cur += 1;
        if self.at_end() {
            return Err(BuildError::at_token(&if_token, "Unexpected EOF inside if condition."));
        }

        let condition = self.parse_expr()?;

        if self.at_end() || !self.cur_token().is_scoper_equal(")") {
            return Err(BuildError::at_token_with_help(
                &open_paren,
                "Expecting \")\" for the \"if\" condition.",
                "You didn't finish the thought you started here.",
            ));
        }
        self.cur += 1;

        let if_true = self.parse_block(true)?;

        let mut if_false = None;
        if !self.at_end() && self.cur_token().is_identifier_equal("else") {
            self.cur += 1;
            if self.at_end() {
                return Err(self.eof_error("Ran into the end of the file after \"else\".", ""));
            }
            if self.cur_token().is_identifier_equal("if") {
                if_false = Some(self.parse_condition()?);
            } else if self.cur_token().is_scoper_equal("{") {
                if_false = Some(self.parse_block(true)?);
            } else {
                return Err(BuildError::with_help(
                    self.cur_token().range,
                    "Expected \"if\" or \"{\" after \"else\".",
                    "This is neither of those things.",
                ));
            }
        }

        Ok(Arc::new(ParseNode::Condition {
            if_token,
            condition,
            if_true,
            if_false,
        }))
    }

    /// expression := primary (binop expression)?
    ///
    /// Note that binary operators are chained right-associatively and carry
    /// no precedence at all: `a - b + c` parses as `a - (b + c)` and
    /// `a || b && c` as `a || (b && c)`. Changing this means changing the
    /// grammar, the evaluator, and the test suite together.
    fn parse_expr(&mut self) -> Result<Arc<ParseNode>, BuildError> {
        let left = self.parse_primary()?;
        if self.at_end() {
            return Ok(left);
        }

        if is_binary_operator(self.cur_token()) {
            let op = self.cur_token().clone();
            self.cur += 1;
            if self.at_end() {
                return Err(BuildError::at_token_with_help(
                    &op,
                    "Unexpected EOF in expression.",
                    "I was looking for the right-hand side of this operator.",
                ));
            }
            let right = self.parse_expr()?;
            return Ok(Arc::new(ParseNode::BinaryOp { op, left, right }));
        }

        Ok(left)
    }

    /// Everything but binary operators, which need the lookahead handled by
    /// `parse_expr`.
    fn parse_primary(&mut self) -> Result<Arc<ParseNode>, BuildError> {
        if self.at_end() {
            return Err(self.eof_error("Expected an expression.", ""));
        }

        let token = self.cur_token().clone();

        if is_unary_operator(&token) {
            self.cur += 1;
            if self.at_end() {
                return Err(BuildError::at_token_with_help(
                    &token,
                    "Expected an expression.",
                    "This operator needs something to operate on.",
                ));
            }
            let operand = self.parse_expr()?;
            return Ok(Arc::new(ParseNode::UnaryOp { op: token, operand }));
        }

        if token.is_scoper_equal("(") {
            return self.parse_paren_expression();
        }

        // Function calls: identifier directly followed by an open paren.
        if token.kind == TokenKind::Identifier
            && self.has_next()
            && self.next_token().is_scoper_equal("(")
        {
            return self.parse_function_call();
        }

        if token.is_scoper_equal("[") {
            return self.parse_list("]");
        }

        if token.kind == TokenKind::String || token.kind == TokenKind::Integer {
            self.cur += 1;
            return Ok(Arc::new(ParseNode::Literal { token }));
        }

        // Accessors: the "[" must be on the same line as the identifier to
        // disambiguate from a following (useless but legal) list statement.
        if token.kind == TokenKind::Identifier
            && self.has_next()
            && self.next_token().is_scoper_equal("[")
            && same_line(&token, self.next_token())
        {
            return self.parse_accessor();
        }

        if token.kind == TokenKind::Identifier {
            self.cur += 1;
            return Ok(Arc::new(ParseNode::Identifier { token }));
        }

        if token.kind == TokenKind::Separator {
            return Err(BuildError::at_token_with_help(
                &token,
                "Unexpected comma.",
                "A comma only belongs between items of a list.",
            ));
        }
        if token.is_scoper_equal("{") {
            return Err(BuildError::at_token_with_help(
                &token,
                "Unexpected token.",
                "A \"{\" scope can't go here, it must be a statement in a block.",
            ));
        }
        Err(BuildError::at_token_with_help(
            &token,
            "Unexpected token.",
            "I was really hoping for something else here.",
        ))
    }

    /// accessor := identifier "[" expression "]", with the "[" known to be
    /// present on the same line.
    fn parse_accessor(&mut self) -> Result<Arc<ParseNode>, BuildError> {
        let base = self.cur_token().clone();
        self.cur += 2; // Identifier and the "[" the caller already saw.

        if self.at_end() {
            return Err(self.eof_error("Got EOF when looking for the list index.", ""));
        }
        let index = self.parse_expr()?;
        if self.at_end() {
            return Err(self.eof_error("Got EOF when looking for the list accessor ]", ""));
        }

        if !self.cur_token().is_scoper_equal("]") {
            return Err(BuildError::with_help(
                self.cur_token().range,
                "Expecting ]",
                "You started a list access but didn't terminate it.",
            ));
        }
        self.cur += 1;

        Ok(Arc::new(ParseNode::Accessor { base, index }))
    }

    /// function_call := identifier "(" list_contents ")" [ block ]
    ///
    /// The "{" of the optional block must be on the same line as the ")" to
    /// disambiguate from a following standalone scoping block.
    fn parse_function_call(&mut self) -> Result<Arc<ParseNode>, BuildError> {
        let function = self.cur_token().clone();
        self.cur += 1; // Now on the "(".

        let args = self.parse_list(")")?;

        let mut block = None;
        if !self.at_end() && self.cur_token().is_scoper_equal("{") {
            let args_end = &self.tokens[self.cur - 1];
            debug_assert!(args_end.is_scoper_equal(")"));
            if same_line(args_end, self.cur_token()) {
                block = Some(self.parse_block(true)?);
            }
        }

        Ok(Arc::new(ParseNode::FunctionCall {
            function,
            args,
            block,
        }))
    }

    /// list_contents := [ (expression ",")* expression [","] ]
    ///
    /// Also used for function arguments, so the closing token is a
    /// parameter. The current token is the opener.
    fn parse_list(&mut self, expected_end: &str) -> Result<Arc<ParseNode>, BuildError> {
        let begin = self.cur_token().clone();
        self.cur += 1;

        let mut contents = Vec::new();
        let mut need_separator = false;
        loop {
            if self.at_end() {
                return Err(BuildError::at_token_with_help(
                    &begin,
                    "EOF found when parsing the list.",
                    format!("I expected a \"{expected_end}\" corresponding to this one."),
                ));
            }
            if self.cur_token().is_scoper_equal(expected_end) {
                let end = self.cur_token().clone();
                self.cur += 1;
                return Ok(Arc::new(ParseNode::List {
                    begin,
                    end,
                    contents,
                }));
            }

            if need_separator {
                let prev: &Arc<ParseNode> = contents
                    .last()
                    .expect("separator is only required after an item");
                let prev_range = prev.range();
                let mut err = BuildError::with_help(
                    LocationRange::new(prev_range.end, prev_range.end),
                    "Need comma separating items in the list.",
                    "You probably need a comma after this.",
                );
                err.append_range(prev_range);
                return Err(err);
            }

            let expr = self.parse_expr()?;
            contents.push(expr);

            need_separator = true;
            if !self.at_end() && self.cur_token().kind == TokenKind::Separator {
                self.cur += 1;
                need_separator = false;
            }
        }
    }

    /// paren_expression := "(" expression ")"
    fn parse_paren_expression(&mut self) -> Result<Arc<ParseNode>, BuildError> {
        let open_paren = self.cur_token().clone();
        self.cur += 1;

        let inner = self.parse_expr()?;

        if self.at_end() {
            return Err(BuildError::at_token_with_help(
                &open_paren,
                "EOF found when parsing the expression.",
                "I was looking for a \")\" corresponding to this one.",
            ));
        }
        if !self.cur_token().is_scoper_equal(")") {
            return Err(BuildError::at_token_with_help(
                &open_paren,
                "Expected \")\" for the expression.",
                "I was looking for a \")\" corresponding to this one.",
            ));
        }
        self.cur += 1;
        Ok(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::location::FileId;
    use crate::core::tokenizer::tokenize;

    fn parse_input(input: &str) -> Result<Arc<ParseNode>, BuildError> {
        parse(tokenize(FileId(0), input)?)
    }

    fn check_dump(input: &str, expected: &str) {
        let root = parse_input(input).expect("parse failed");
        assert_eq!(root.dump(), expected, "for input: {input}");
    }

    fn check_error_at(input: &str, line: u32, column: u32) {
        let err = match tokenize(FileId(0), input) {
            Err(e) => e,
            Ok(tokens) => parse(tokens).expect_err("expected a parse error"),
        };
        assert_eq!(
            (err.range.begin.line, err.range.begin.column),
            (line, column),
            "for input: {input}"
        );
    }

    #[test]
    fn empty_file_parses_to_empty_block() {
        let root = parse_input("").unwrap();
        assert_eq!(root.as_block_statements().unwrap().len(), 0);
    }

    #[test]
    fn simple_assignment() {
        check_dump(
            "a=2",
            "BLOCK\n BINARY(=)\n  IDENTIFIER(a)\n  LITERAL(2)\n",
        );
    }

    #[test]
    fn binary_operators_chain_right() {
        // No precedence: everything nests to the right.
        check_dump(
            "x = a - b + c",
            "BLOCK\n BINARY(=)\n  IDENTIFIER(x)\n  BINARY(-)\n   IDENTIFIER(a)\n   BINARY(+)\n    IDENTIFIER(b)\n    IDENTIFIER(c)\n",
        );
        check_dump(
            "x = a || b && c",
            "BLOCK\n BINARY(=)\n  IDENTIFIER(x)\n  BINARY(||)\n   IDENTIFIER(a)\n   BINARY(&&)\n    IDENTIFIER(b)\n    IDENTIFIER(c)\n",
        );
    }

    #[test]
    fn condition_with_else_if_chain() {
        check_dump(
            "if(1) { a = 2 } else if (0) { a = 3 } else { a = 4 }",
            "BLOCK\n CONDITION\n  LITERAL(1)\n  BLOCK\n   BINARY(=)\n    IDENTIFIER(a)\n    LITERAL(2)\n  CONDITION\n   LITERAL(0)\n   BLOCK\n    BINARY(=)\n     IDENTIFIER(a)\n     LITERAL(3)\n   BLOCK\n    BINARY(=)\n     IDENTIFIER(a)\n     LITERAL(4)\n",
        );
    }

    #[test]
    fn function_call_with_block_on_same_line() {
        check_dump(
            "foo(\"a\") { b = 1 }",
            "BLOCK\n FUNCTION(foo)\n  LIST\n   LITERAL(\"a\")\n  BLOCK\n   BINARY(=)\n    IDENTIFIER(b)\n    LITERAL(1)\n",
        );
    }

    #[test]
    fn block_on_next_line_is_not_attached_to_call() {
        // The "{" on the following line is a standalone scoping block, not
        // the function's block.
        check_dump(
            "foo(\"a\")\n{ b = 1 }",
            "BLOCK\n FUNCTION(foo)\n  LIST\n   LITERAL(\"a\")\n BLOCK\n  BINARY(=)\n   IDENTIFIER(b)\n   LITERAL(1)\n",
        );
    }

    #[test]
    fn accessor_requires_bracket_on_same_line() {
        check_dump(
            "x = a[0]",
            "BLOCK\n BINARY(=)\n  IDENTIFIER(x)\n  ACCESSOR(a)\n   LITERAL(0)\n",
        );
    }

    #[test]
    fn zero_argument_call_is_legal() {
        check_dump("f()", "BLOCK\n FUNCTION(f)\n  LIST\n");
    }

    #[test]
    fn list_allows_trailing_comma() {
        check_dump(
            "x = [1, 2,]",
            "BLOCK\n BINARY(=)\n  IDENTIFIER(x)\n  LIST\n   LITERAL(1)\n   LITERAL(2)\n",
        );
    }

    #[test]
    fn list_missing_comma_is_an_error() {
        assert!(parse_input("x = [1 2]").is_err());
    }

    #[test]
    fn bare_statements_have_no_effect() {
        // These only fail at execution time; the parser accepts them.
        assert!(parse_input("[1]").is_ok());
        let root = parse_input("[1]").unwrap();
        assert!(root.as_block_statements().unwrap()[0].is_statement_without_effect());
    }

    #[test]
    fn error_locations() {
        check_error_at("a = \"xxx", 1, 5); // Unterminated string.
        check_error_at("for(", 1, 4); // EOF inside the argument list.
        check_error_at("as{", 1, 3); // Block not allowed in expression slot.
        check_error_at("a = b; c = d", 1, 6); // Semicolon is not a token.
        check_error_at("if(1) { a = }", 1, 13); // Missing rvalue.
    }

    #[test]
    fn else_requires_if_or_block() {
        assert!(parse_input("if (1) { a = 1 } else 2").is_err());
    }

    #[test]
    fn parse_expression_of_empty_input_is_none() {
        assert!(parse_expression(Vec::new()).unwrap().is_none());
    }

    #[test]
    fn whole_file_range_covers_statements() {
        let root = parse_input("a = 1\nb = 2").unwrap();
        let statements = root.as_block_statements().unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].range().begin.line, 1);
        assert_eq!(statements[1].range().begin.line, 2);
    }
}
