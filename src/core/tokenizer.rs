// src/core/tokenizer.rs

use crate::core::err::BuildError;
use crate::core::location::{FileId, Location, LocationRange};
use crate::core::token::{Token, TokenKind};

/// Two-character operators, tried before the one-character ones so that
/// lexing is maximal-munch.
const TWO_CHAR_OPERATORS: [&str; 8] = ["==", "!=", "<=", ">=", "+=", "-=", "&&", "||"];
const ONE_CHAR_OPERATORS: [u8; 6] = [b'=', b'+', b'-', b'<', b'>', b'!'];

pub fn is_identifier_first_char(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

pub fn is_identifier_continuing_char(c: u8) -> bool {
    is_identifier_first_char(c) || c.is_ascii_digit()
}

fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n')
}

fn is_scoper(c: u8) -> bool {
    matches!(c, b'(' | b')' | b'{' | b'}' | b'[' | b']')
}

/// Byte offset of the start of the 1-based `n`th line. Used for building
/// multi-line diagnostics. An `n` past the last line returns the offset just
/// past the final newline.
pub fn byte_offset_of_nth_line(text: &str, n: u32) -> usize {
    if n <= 1 {
        return 0;
    }
    let mut line = 1;
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            line += 1;
            if line == n {
                return i + 1;
            }
        }
    }
    text.len()
}

/// Produces the token stream for one file. Comments are consumed here and
/// never reach the parser. Errors on unterminated strings, invalid numeric
/// literals, escapes at EOF and unknown characters.
pub fn tokenize(file: FileId, text: &str) -> Result<Vec<Token>, BuildError> {
    Tokenizer::new(file, text).run()
}

struct Tokenizer<'a> {
    file: FileId,
    text: &'a str,
    bytes: &'a [u8],
    cur: usize,
    line: u32,
    column: u32,
}

impl<'a> Tokenizer<'a> {
    fn new(file: FileId, text: &'a str) -> Self {
        Self {
            file,
            text,
            bytes: text.as_bytes(),
            cur: 0,
            line: 1,
            column: 1,
        }
    }

    fn run(mut self) -> Result<Vec<Token>, BuildError> {
        let mut tokens = Vec::new();
        while !self.at_end() {
            self.skip_whitespace();
            if self.at_end() {
                break;
            }

            let c = self.bytes[self.cur];
            if c == b'#' {
                // Comment to end of line, stripped from the stream.
                self.classify_comment();
                continue;
            }

            let token = self.next_token()?;
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, BuildError> {
        let begin = self.location();
        let start = self.cur;
        let c = self.bytes[self.cur];

        let kind = if c.is_ascii_digit() || (c == b'-' && self.next_is_digit()) {
            self.advance(); // Sign or first digit.
            while !self.at_end() && self.bytes[self.cur].is_ascii_digit() {
                self.advance();
            }
            // A digit run flowing directly into an identifier is a typo like
            // "123abc", not two tokens.
            if !self.at_end() && is_identifier_first_char(self.bytes[self.cur]) {
                return Err(BuildError::with_help(
                    self.range_from(begin),
                    "This is not a valid number.",
                    "A number can not run directly into an identifier.",
                ));
            }
            TokenKind::Integer
        } else if c == b'"' {
            self.consume_string(begin)?;
            TokenKind::String
        } else if is_identifier_first_char(c) {
            self.advance();
            while !self.at_end() && is_identifier_continuing_char(self.bytes[self.cur]) {
                self.advance();
            }
            TokenKind::Identifier
        } else if is_scoper(c) {
            self.advance();
            TokenKind::Scoper
        } else if c == b',' {
            self.advance();
            TokenKind::Separator
        } else if let Some(len) = self.match_operator() {
            for _ in 0..len {
                self.advance();
            }
            TokenKind::Operator
        } else {
            self.advance();
            return Err(BuildError::with_help(
                self.range_from(begin),
                "Invalid token.",
                "I have no idea what this is.",
            ));
        };

        Ok(Token::new(
            kind,
            &self.text[start..self.cur],
            self.range_from(begin),
        ))
    }

    /// Consumes a double-quoted string including the closing quote. The
    /// opening quote is at the current position.
    fn consume_string(&mut self, begin: Location) -> Result<(), BuildError> {
        self.advance(); // Opening quote.
        while !self.at_end() {
            match self.bytes[self.cur] {
                b'\\' => {
                    self.advance();
                    if self.at_end() {
                        return Err(BuildError::with_help(
                            self.range_from(begin),
                            "Escape at end of file.",
                            "The backslash has nothing to escape.",
                        ));
                    }
                    self.advance(); // Whatever is escaped, even a quote.
                }
                b'"' => {
                    self.advance();
                    return Ok(());
                }
                b'\n' => {
                    return Err(BuildError::with_help(
                        self.range_from(begin),
                        "Unterminated string literal.",
                        "Strings can not span lines. Did you forget the closing quote?",
                    ));
                }
                _ => self.advance(),
            }
        }
        Err(BuildError::with_help(
            self.range_from(begin),
            "Unterminated string literal.",
            "I got to the end of the file looking for the closing quote.",
        ))
    }

    fn classify_comment(&mut self) {
        while !self.at_end() && self.bytes[self.cur] != b'\n' {
            self.advance();
        }
    }

    /// Length of the operator at the current position, longest match first.
    fn match_operator(&self) -> Option<usize> {
        if self.cur + 1 < self.bytes.len() {
            let pair = &self.text[self.cur..self.cur + 2];
            if TWO_CHAR_OPERATORS.contains(&pair) {
                return Some(2);
            }
        }
        if ONE_CHAR_OPERATORS.contains(&self.bytes[self.cur]) {
            return Some(1);
        }
        None
    }

    fn skip_whitespace(&mut self) {
        while !self.at_end() && is_whitespace(self.bytes[self.cur]) {
            self.advance();
        }
    }

    fn next_is_digit(&self) -> bool {
        self.cur + 1 < self.bytes.len() && self.bytes[self.cur + 1].is_ascii_digit()
    }

    fn advance(&mut self) {
        if self.bytes[self.cur] == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.cur += 1;
    }

    fn at_end(&self) -> bool {
        self.cur >= self.bytes.len()
    }

    fn location(&self) -> Location {
        Location::new(self.file, self.line, self.column)
    }

    fn range_from(&self, begin: Location) -> LocationRange {
        LocationRange::new(begin, self.location())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(input: &str, expected: &[(TokenKind, &str)]) {
        let tokens = tokenize(FileId(0), input).expect("tokenize failed");
        let got: Vec<(TokenKind, &str)> = tokens
            .iter()
            .map(|t| (t.kind, t.text.as_str()))
            .collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn empty_and_whitespace_produce_no_tokens() {
        check("", &[]);
        check("  \n\r", &[]);
    }

    #[test]
    fn identifiers() {
        check("  foo ", &[(TokenKind::Identifier, "foo")]);
        check("_x9", &[(TokenKind::Identifier, "_x9")]);
    }

    #[test]
    fn integers_including_negative() {
        check(
            "  123 -123 ",
            &[(TokenKind::Integer, "123"), (TokenKind::Integer, "-123")],
        );
    }

    #[test]
    fn strings_keep_quotes_in_text() {
        check(
            "  \"foo\" \"bar\\\"baz\" \"asdf\\\\\" ",
            &[
                (TokenKind::String, "\"foo\""),
                (TokenKind::String, "\"bar\\\"baz\""),
                (TokenKind::String, "\"asdf\\\\\""),
            ],
        );
    }

    #[test]
    fn operators_are_maximal_munch() {
        check(
            "- + = += -= != ==  < > <= >= && ||",
            &[
                (TokenKind::Operator, "-"),
                (TokenKind::Operator, "+"),
                (TokenKind::Operator, "="),
                (TokenKind::Operator, "+="),
                (TokenKind::Operator, "-="),
                (TokenKind::Operator, "!="),
                (TokenKind::Operator, "=="),
                (TokenKind::Operator, "<"),
                (TokenKind::Operator, ">"),
                (TokenKind::Operator, "<="),
                (TokenKind::Operator, ">="),
                (TokenKind::Operator, "&&"),
                (TokenKind::Operator, "||"),
            ],
        );
    }

    #[test]
    fn scopers_and_separator() {
        check(
            "{[ ]} (),",
            &[
                (TokenKind::Scoper, "{"),
                (TokenKind::Scoper, "["),
                (TokenKind::Scoper, "]"),
                (TokenKind::Scoper, "}"),
                (TokenKind::Scoper, "("),
                (TokenKind::Scoper, ")"),
                (TokenKind::Separator, ","),
            ],
        );
    }

    #[test]
    fn function_call_with_block() {
        check(
            "fun(\"foo\") {\nfoo = 12}",
            &[
                (TokenKind::Identifier, "fun"),
                (TokenKind::Scoper, "("),
                (TokenKind::String, "\"foo\""),
                (TokenKind::Scoper, ")"),
                (TokenKind::Scoper, "{"),
                (TokenKind::Identifier, "foo"),
                (TokenKind::Operator, "="),
                (TokenKind::Integer, "12"),
                (TokenKind::Scoper, "}"),
            ],
        );
    }

    #[test]
    fn comments_are_stripped() {
        check(
            "a = 1 # trailing\n# whole line\nb",
            &[
                (TokenKind::Identifier, "a"),
                (TokenKind::Operator, "="),
                (TokenKind::Integer, "1"),
                (TokenKind::Identifier, "b"),
            ],
        );
    }

    #[test]
    fn locations_track_lines_and_columns() {
        let tokens = tokenize(FileId(7), "1 2 \"three\"\n  4").unwrap();
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0].range.begin, Location::new(FileId(7), 1, 1));
        assert_eq!(tokens[1].range.begin, Location::new(FileId(7), 1, 3));
        assert_eq!(tokens[2].range.begin, Location::new(FileId(7), 1, 5));
        assert_eq!(tokens[3].range.begin, Location::new(FileId(7), 2, 3));
    }

    #[test]
    fn token_text_matches_original_byte_range() {
        // Rendering each token's text in order reproduces the non-comment,
        // non-whitespace input.
        let input = "x = [\"a\", 2]";
        let tokens = tokenize(FileId(0), input).unwrap();
        let rebuilt: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(rebuilt, vec!["x", "=", "[", "\"a\"", ",", "2", "]"]);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(tokenize(FileId(0), "\"abc").is_err());
        assert!(tokenize(FileId(0), "\"abc\nd\"").is_err());
    }

    #[test]
    fn escape_at_eof_is_an_error() {
        assert!(tokenize(FileId(0), "\"abc\\").is_err());
    }

    #[test]
    fn number_running_into_identifier_is_an_error() {
        assert!(tokenize(FileId(0), "123abc").is_err());
    }

    #[test]
    fn unknown_character_is_an_error() {
        assert!(tokenize(FileId(0), "a = 1 @").is_err());
    }

    #[test]
    fn byte_offset_of_nth_line_finds_line_starts() {
        assert_eq!(byte_offset_of_nth_line("foo", 1), 0);

        let input = "aaa\nxaa\n\nya";
        assert_eq!(input.as_bytes()[byte_offset_of_nth_line(input, 2)], b'x');
        assert_eq!(input.as_bytes()[byte_offset_of_nth_line(input, 4)], b'y');

        let input2 = "a\n";
        assert_eq!(byte_offset_of_nth_line(input2, 1), 0);
        assert_eq!(byte_offset_of_nth_line(input2, 2), 2);
    }
}
