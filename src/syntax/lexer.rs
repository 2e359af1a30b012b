//! Tokenizer for standard-mode source.

use crate::errors::{RigError, SourceContext};
use crate::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(String),
    /// Identifiers and keywords; the parser tells them apart.
    Word(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// A line terminator separates this token from the previous one.
    pub newline_before: bool,
}

// Longest first.
const PUNCTUATORS: &[&str] = &[
    ">>>=", "===", "!==", ">>>", "<<=", ">>=", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||",
    "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "{", "}", "(", ")", "[", "]",
    ";", ",", "<", ">", "+", "-", "*", "/", "%", "&", "|", "^", "!", "~", "?", ":", ".", "=",
];

pub struct Lexer<'a> {
    source: &'a SourceContext,
    text: &'a str,
    pos: usize,
    scripting: bool,
    newline: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a SourceContext, scripting: bool) -> Self {
        Self {
            source,
            text: &source.content,
            pos: 0,
            scripting,
            newline: false,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, RigError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let start = self.pos;
            let newline_before = std::mem::take(&mut self.newline);
            let Some(ch) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    span: Span::new(start, start),
                    newline_before,
                });
                return Ok(tokens);
            };

            let kind = if ch.is_ascii_digit()
                || (ch == '.' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()))
            {
                self.number()?
            } else if ch == '"' || ch == '\'' {
                self.string(ch)?
            } else if is_ident_start(ch) {
                self.word()
            } else {
                self.punct()?
            };
            tokens.push(Token {
                kind,
                span: Span::new(start, self.pos),
                newline_before,
            });
        }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.text[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn error(&self, message: impl Into<String>, start: usize) -> RigError {
        self.source
            .syntax_error(message, Span::new(start, (self.pos).max(start + 1)))
    }

    fn at_line_start(&self) -> bool {
        self.text[..self.pos]
            .chars()
            .rev()
            .take_while(|c| *c != '\n')
            .all(|c| c == ' ' || c == '\t')
    }

    fn skip_line(&mut self) {
        self.pos = self.text[self.pos..]
            .find('\n')
            .map_or(self.text.len(), |i| self.pos + i);
    }

    fn skip_trivia(&mut self) -> Result<(), RigError> {
        while let Some(ch) = self.peek() {
            match ch {
                '\n' | '\u{2028}' | '\u{2029}' => {
                    self.newline = true;
                    self.bump();
                }
                ' ' | '\t' | '\r' | '\u{b}' | '\u{c}' | '\u{a0}' | '\u{feff}' => {
                    self.bump();
                }
                '/' if self.peek_at(1) == Some('/') => self.skip_line(),
                '/' if self.peek_at(1) == Some('*') => {
                    let start = self.pos;
                    let Some(len) = self.text[start + 2..].find("*/") else {
                        self.pos = self.text.len();
                        return Err(self.error("unterminated comment", start));
                    };
                    if self.text[start..start + 2 + len].contains('\n') {
                        self.newline = true;
                    }
                    self.pos = start + 2 + len + 2;
                }
                '#' if (self.pos == 0 && self.peek_at(1) == Some('!'))
                    || (self.scripting && self.at_line_start()) =>
                {
                    self.skip_line()
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn number(&mut self) -> Result<TokenKind, RigError> {
        let start = self.pos;
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.bump();
            }
            let digits = &self.text[digits_start..self.pos];
            return u64::from_str_radix(digits, 16)
                .map(|n| TokenKind::Number(n as f64))
                .map_err(|_| self.error("invalid hex literal", start));
        }

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let mark = self.pos;
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
            } else {
                self.pos = mark;
            }
        }
        if self.peek().is_some_and(is_ident_start) {
            return Err(self.error("identifier starts immediately after number", start));
        }
        self.text[start..self.pos]
            .parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| self.error("invalid number", start))
    }

    fn string(&mut self, quote: char) -> Result<TokenKind, RigError> {
        let start = self.pos;
        self.bump();
        let mut value = String::new();
        loop {
            let Some(ch) = self.bump() else {
                return Err(self.error("unterminated string literal", start));
            };
            match ch {
                c if c == quote => return Ok(TokenKind::Str(value)),
                '\n' => return Err(self.error("unterminated string literal", start)),
                '\\' => self.escape(&mut value, start)?,
                c => value.push(c),
            }
        }
    }

    fn escape(&mut self, out: &mut String, start: usize) -> Result<(), RigError> {
        let Some(ch) = self.bump() else {
            return Err(self.error("unterminated string literal", start));
        };
        match ch {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !self.peek().is_some_and(|c| c.is_ascii_digit()) => out.push('\0'),
            'x' => {
                let code = self.hex_digits(2, start)?;
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            'u' => {
                let code = self.hex_digits(4, start)?;
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            // Line continuation.
            '\r' => {
                if self.peek() == Some('\n') {
                    self.bump();
                }
            }
            '\n' => {}
            other => out.push(other),
        }
        Ok(())
    }

    fn hex_digits(&mut self, count: usize, start: usize) -> Result<u32, RigError> {
        let digits = self.text.get(self.pos..self.pos + count).unwrap_or("");
        let code = u32::from_str_radix(digits, 16)
            .map_err(|_| self.error("invalid escape sequence", start))?;
        self.pos += count;
        Ok(code)
    }

    fn word(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_part) {
            self.bump();
        }
        TokenKind::Word(self.text[start..self.pos].to_string())
    }

    fn punct(&mut self) -> Result<TokenKind, RigError> {
        let rest = &self.text[self.pos..];
        match PUNCTUATORS.iter().find(|p| rest.starts_with(**p)) {
            Some(p) => {
                self.pos += p.len();
                Ok(TokenKind::Punct(p))
            }
            None => {
                let start = self.pos;
                let ch = self.bump().unwrap_or(' ');
                Err(self.error(format!("unexpected character '{ch}'"), start))
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit() || c.is_numeric()
}

pub fn tokenize(source: &SourceContext, scripting: bool) -> Result<Vec<Token>, RigError> {
    Lexer::new(source, scripting).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str, scripting: bool) -> Vec<TokenKind> {
        tokenize(&SourceContext::from_file("t.js", src), scripting)
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn punctuators_prefer_the_longest_match() {
        assert_eq!(
            kinds("a >>>= b <<= 1", false),
            vec![
                TokenKind::Word("a".into()),
                TokenKind::Punct(">>>="),
                TokenKind::Word("b".into()),
                TokenKind::Punct("<<="),
                TokenKind::Number(1.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "A\x42\n""#, false),
            vec![
                TokenKind::Str("it's".into()),
                TokenKind::Str("AB\n".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn hash_lines_are_comments_only_in_scripting_mode() {
        assert_eq!(
            kinds("# note\nx", true),
            vec![TokenKind::Word("x".into()), TokenKind::Eof]
        );
        assert!(tokenize(&SourceContext::from_file("t.js", "# note\nx"), false).is_err());
    }

    #[test]
    fn newline_flag_is_set_across_line_breaks() {
        let tokens = tokenize(&SourceContext::from_file("t.js", "a\n/* c */ b /*\n*/ c"), false)
            .expect("tokenize");
        let flags: Vec<bool> = tokens.iter().map(|t| t.newline_before).collect();
        assert_eq!(flags, vec![false, true, true, false]);
    }

    #[test]
    fn numbers() {
        assert_eq!(
            kinds("0x1F 1.5e2 .25 7", false),
            vec![
                TokenKind::Number(31.0),
                TokenKind::Number(150.0),
                TokenKind::Number(0.25),
                TokenKind::Number(7.0),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn unterminated_string_is_a_syntax_error() {
        let err = tokenize(&SourceContext::from_file("t.js", "'abc\n'"), false).expect_err("error");
        assert_eq!(err.error_type(), crate::errors::ErrorType::Syntax);
    }
}
