//! Tokenizer for schema text.
//!
//! Produces a flat token list terminated by [`TokenKind::Eof`]. Malformed
//! literals are reported and skipped so the parser still sees the rest of
//! the file.

use crate::diagnostic::{Diagnostic, DiagnosticKind, Diagnostics, Span};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Ident(String),
    Int(u64),
    Float(f64),
    Str(String),
    Symbol(char),
    Eof,
}

impl TokenKind {
    pub(crate) fn describe(&self) -> String {
        match self {
            TokenKind::Ident(s) => format!("'{s}'"),
            TokenKind::Int(v) => format!("'{v}'"),
            TokenKind::Float(v) => format!("'{v}'"),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Symbol(c) => format!("'{c}'"),
            TokenKind::Eof => "end of file".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) span: Span,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    column: u32,
    file: &'a str,
    diagnostics: &'a mut Diagnostics,
}

/// Splits `text` into tokens, reporting lexical errors into `diagnostics`
pub(crate) fn tokenize(file: &str, text: &str, diagnostics: &mut Diagnostics) -> Vec<Token> {
    let mut lexer = Lexer {
        chars: text.chars().peekable(),
        line: 1,
        column: 1,
        file,
        diagnostics,
    };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return tokens;
        }
    }
}

impl Lexer<'_> {
    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next()
    }

    fn error(&mut self, span: Span, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::error(
            DiagnosticKind::Syntax,
            self.file,
            span,
            message,
        ));
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => match self.peek_second() {
                    Some('/') => {
                        while let Some(c) = self.bump() {
                            if c == '\n' {
                                break;
                            }
                        }
                    }
                    Some('*') => {
                        let start = Span::new(self.line, self.column);
                        self.bump();
                        self.bump();
                        let mut closed = false;
                        while let Some(c) = self.bump() {
                            if c == '*' && self.peek() == Some('/') {
                                self.bump();
                                closed = true;
                                break;
                            }
                        }
                        if !closed {
                            self.error(start, "unterminated block comment");
                        }
                    }
                    _ => return,
                },
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Token {
        loop {
            self.skip_trivia();
            let span = Span::new(self.line, self.column);
            let Some(c) = self.peek() else {
                return Token {
                    kind: TokenKind::Eof,
                    span,
                };
            };

            let kind = if c.is_ascii_alphabetic() || c == '_' {
                Some(TokenKind::Ident(self.ident()))
            } else if c.is_ascii_digit()
                || (c == '.' && self.peek_second().is_some_and(|n| n.is_ascii_digit()))
            {
                self.number(span)
            } else if c == '"' || c == '\'' {
                self.string(span).map(TokenKind::Str)
            } else {
                self.bump();
                if "{}[]()<>;,=.-+:/".contains(c) {
                    Some(TokenKind::Symbol(c))
                } else {
                    self.error(span, format!("unexpected character '{c}'"));
                    None
                }
            };

            if let Some(kind) = kind {
                return Token { kind, span };
            }
        }
    }

    fn ident(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        out
    }

    fn number(&mut self, span: Span) -> Option<TokenKind> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            let exponent_sign =
                (c == '-' || c == '+') && matches!(text.chars().last(), Some('e' | 'E'))
                    && !text.starts_with("0x")
                    && !text.starts_with("0X");
            if c.is_ascii_alphanumeric() || c == '.' || exponent_sign {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }

        let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16).ok().map(TokenKind::Int)
        } else if text.contains(['.', 'e', 'E']) {
            text.parse::<f64>().ok().map(TokenKind::Float)
        } else if text.len() > 1 && text.starts_with('0') {
            u64::from_str_radix(&text[1..], 8).ok().map(TokenKind::Int)
        } else {
            text.parse::<u64>().ok().map(TokenKind::Int)
        };

        if parsed.is_none() {
            self.error(span, format!("invalid numeric literal '{text}'"));
        }
        parsed
    }

    fn string(&mut self, span: Span) -> Option<String> {
        let quote = self.bump()?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    self.error(span, "unterminated string literal");
                    return None;
                }
                Some(c) if c == quote => return Some(out),
                Some('\\') => {
                    let escape_span = Span::new(self.line, self.column);
                    match self.escape() {
                        Some(c) => out.push(c),
                        None => self.error(escape_span, "invalid escape sequence"),
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn escape(&mut self) -> Option<char> {
        let c = self.bump()?;
        let escaped = match c {
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'a' => '\u{7}',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            '\\' | '\'' | '"' | '?' => c,
            'x' | 'X' => return self.radix_escape(16, 2),
            'u' => return self.radix_escape(16, 4),
            'U' => return self.radix_escape(16, 8),
            '0'..='7' => {
                let mut value = c.to_digit(8)?;
                for _ in 0..2 {
                    match self.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            self.bump();
                        }
                        None => break,
                    }
                }
                return char::from_u32(value);
            }
            _ => return None,
        };
        Some(escaped)
    }

    fn radix_escape(&mut self, radix: u32, max_digits: usize) -> Option<char> {
        let mut value = 0u32;
        let mut digits = 0;
        while digits < max_digits {
            match self.peek().and_then(|d| d.to_digit(radix)) {
                Some(d) => {
                    value = value * radix + d;
                    self.bump();
                    digits += 1;
                }
                None => break,
            }
        }
        if digits == 0 {
            return None;
        }
        char::from_u32(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        let mut diagnostics = Diagnostics::new();
        let tokens = tokenize("t.proto", text, &mut diagnostics);
        assert!(diagnostics.is_empty(), "{diagnostics}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_idents_symbols_and_numbers() {
        assert_eq!(
            kinds("int32 x = 0x1F;"),
            vec![
                TokenKind::Ident("int32".into()),
                TokenKind::Ident("x".into()),
                TokenKind::Symbol('='),
                TokenKind::Int(31),
                TokenKind::Symbol(';'),
                TokenKind::Eof,
            ]
        );
        assert_eq!(kinds("017")[0], TokenKind::Int(15));
        assert_eq!(kinds("1.5e3")[0], TokenKind::Float(1500.0));
    }

    #[test]
    fn test_comments_are_skipped() {
        let k = kinds("// line\n/* block\n comment */ message");
        assert_eq!(k, vec![TokenKind::Ident("message".into()), TokenKind::Eof]);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\n\"b\x41\101""#)[0],
            TokenKind::Str("a\n\"bAA".into())
        );
    }

    #[test]
    fn test_positions() {
        let mut diagnostics = Diagnostics::new();
        let tokens = tokenize("t.proto", "a\n  b", &mut diagnostics);
        assert_eq!(tokens[1].span, Span::new(2, 3));
    }

    #[test]
    fn test_errors_are_collected() {
        let mut diagnostics = Diagnostics::new();
        let tokens = tokenize("t.proto", "a $ b # \"open", &mut diagnostics);
        assert_eq!(diagnostics.len(), 3);
        assert_eq!(tokens.last().map(|t| &t.kind), Some(&TokenKind::Eof));
    }
}
