//! Comment stripping for C-family source text.
//!
//! A single left-to-right pass removes `//` line comments and `/* */` block
//! comments. String and character literals are copied verbatim, including
//! escape sequences, so comment markers inside them survive:
//!
//! ```
//! use gpt_analyzer::strip::strip_comments;
//!
//! let out = strip_comments(b"puts(\"// kept\"); // dropped\n");
//! assert_eq!(out, b"puts(\"// kept\"); \n");
//! ```
//!
//! Unterminated comments and literals are not errors. The scan stops when
//! the input runs out and returns whatever was emitted so far.

/// Lexical state of the scanner at a cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LexState {
    #[default]
    Normal,
    InLineComment,
    InBlockComment,
    InString,
    InCharLiteral,
}

impl LexState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LexState::Normal => "normal",
            LexState::InLineComment => "line comment",
            LexState::InBlockComment => "block comment",
            LexState::InString => "string literal",
            LexState::InCharLiteral => "character literal",
        }
    }

    /// Whether input ending in this state left a construct open.
    ///
    /// A line comment at end of input is complete; everything else that
    /// isn't `Normal` was cut off.
    pub fn is_unterminated(&self) -> bool {
        matches!(
            self,
            LexState::InBlockComment | LexState::InString | LexState::InCharLiteral
        )
    }
}

impl std::fmt::Display for LexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output of a strip pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stripped {
    /// Source with comments removed.
    pub text: Vec<u8>,
    /// State the scanner was in when the input ran out.
    pub end_state: LexState,
}

/// Finite-state comment scanner.
#[derive(Debug, Default)]
pub struct CommentStripper {
    state: LexState,
}

impl CommentStripper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lexical state.
    pub fn state(&self) -> LexState {
        self.state
    }

    /// Strip comments from `source`.
    ///
    /// The scanner is reset to `Normal` before the pass, so one stripper can
    /// be reused across files.
    pub fn strip(&mut self, source: &[u8]) -> Stripped {
        self.state = LexState::Normal;
        let mut out = Vec::with_capacity(source.len());
        let mut i = 0;

        while i < source.len() {
            let c = source[i];
            let next = source.get(i + 1).copied();

            match self.state {
                LexState::Normal => match (c, next) {
                    (b'/', Some(b'/')) => {
                        self.state = LexState::InLineComment;
                        i += 2;
                    }
                    (b'/', Some(b'*')) => {
                        self.state = LexState::InBlockComment;
                        i += 2;
                    }
                    _ => {
                        if c == b'"' {
                            self.state = LexState::InString;
                        } else if c == b'\'' {
                            self.state = LexState::InCharLiteral;
                        }
                        out.push(c);
                        i += 1;
                    }
                },
                LexState::InLineComment => {
                    if c == b'\n' {
                        self.state = LexState::Normal;
                        out.push(c);
                    }
                    i += 1;
                }
                LexState::InBlockComment => {
                    if c == b'*' && next == Some(b'/') {
                        self.state = LexState::Normal;
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
                LexState::InString | LexState::InCharLiteral => {
                    let quote = if self.state == LexState::InString {
                        b'"'
                    } else {
                        b'\''
                    };
                    match next {
                        // Escape pair is atomic: `\"` can't close the literal.
                        Some(escaped) if c == b'\\' => {
                            out.push(c);
                            out.push(escaped);
                            i += 2;
                        }
                        _ => {
                            if c == quote {
                                self.state = LexState::Normal;
                            }
                            out.push(c);
                            i += 1;
                        }
                    }
                }
            }
        }

        debug_assert!(out.len() <= source.len());

        Stripped {
            text: out,
            end_state: self.state,
        }
    }
}

/// Remove `//` and `/* */` comments from C-family source, keeping literals.
pub fn strip_comments(source: &[u8]) -> Vec<u8> {
    CommentStripper::new().strip(source).text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_str(s: &str) -> String {
        String::from_utf8(strip_comments(s.as_bytes())).unwrap()
    }

    #[test]
    fn test_clean_code_unchanged() {
        let src = "int main(void) {\n    return a / b * c;\n}\n";
        assert_eq!(strip_str(src), src);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(strip_comments(b""), b"");
    }

    #[test]
    fn test_line_comment_keeps_newline() {
        assert_eq!(strip_str("a;// comment\nb;"), "a;\nb;");
    }

    #[test]
    fn test_block_comment_removed() {
        assert_eq!(strip_str("int /* width */ w;"), "int  w;");
        assert_eq!(strip_str("/* a\n b\n c */x"), "x");
    }

    #[test]
    fn test_literals_preserved() {
        let src = "\"a // not a comment\" /* also not */ 'x'";
        assert_eq!(strip_str(src), "\"a // not a comment\"  'x'");
    }

    #[test]
    fn test_escaped_quote_inside_string() {
        let src = r#""he said \"hi // there\"""#;
        assert_eq!(strip_str(src), src);
    }

    #[test]
    fn test_escaped_quote_inside_char() {
        let src = "char q = '\\''; // quote\nchar s = '/';";
        assert_eq!(strip_str(src), "char q = '\\''; \nchar s = '/';");
    }

    #[test]
    fn test_escaped_backslash_closes_string() {
        // "\\" is a complete literal; the following // starts a comment.
        let src = "p = \"\\\\\"; // path sep";
        assert_eq!(strip_str(src), "p = \"\\\\\"; ");
    }

    #[test]
    fn test_unterminated_block_comment() {
        let mut stripper = CommentStripper::new();
        let result = stripper.strip(b"int x; /* never closed");
        assert_eq!(result.text, b"int x; ");
        assert_eq!(result.end_state, LexState::InBlockComment);
        assert!(result.end_state.is_unterminated());
    }

    #[test]
    fn test_unterminated_string_kept() {
        let result = CommentStripper::new().strip(b"s = \"open // still string");
        assert_eq!(result.text, b"s = \"open // still string");
        assert_eq!(result.end_state, LexState::InString);
    }

    #[test]
    fn test_trailing_backslash_in_literal() {
        let result = CommentStripper::new().strip(b"c = '\\");
        assert_eq!(result.text, b"c = '\\");
        assert_eq!(result.end_state, LexState::InCharLiteral);
    }

    #[test]
    fn test_line_comment_at_eof_is_not_unterminated() {
        let result = CommentStripper::new().strip(b"x; // tail");
        assert_eq!(result.text, b"x; ");
        assert_eq!(result.end_state, LexState::InLineComment);
        assert!(!result.end_state.is_unterminated());
    }

    #[test]
    fn test_slash_star_slash_does_not_close() {
        assert_eq!(strip_str("a/*/ b */c"), "ac");
    }

    #[test]
    fn test_lone_slash_at_end() {
        assert_eq!(strip_str("x = y /"), "x = y /");
    }

    #[test]
    fn test_non_utf8_bytes_pass_through() {
        let src = [b'a', 0xff, b'/', b'/', 0xfe, b'\n', 0xc3];
        assert_eq!(strip_comments(&src), vec![b'a', 0xff, b'\n', 0xc3]);
    }

    #[test]
    fn test_stripper_reusable() {
        let mut stripper = CommentStripper::new();
        let first = stripper.strip(b"/* open");
        assert_eq!(first.end_state, LexState::InBlockComment);

        let second = stripper.strip(b"int y;");
        assert_eq!(second.text, b"int y;");
        assert_eq!(second.end_state, LexState::Normal);
    }

    #[test]
    fn test_output_never_longer_than_input() {
        let inputs: &[&[u8]] = &[
            b"",
            b"//",
            b"/*",
            b"\"\\",
            b"'a' \"b\" /* c */ // d\n e",
            b"\\\\\\\"\"\"''/**/",
        ];
        for input in inputs {
            assert!(strip_comments(input).len() <= input.len());
        }
    }
}
