//! Lexer for the snippet front end
//!
//! The lexer converts one source buffer (the snippet or an included header) into
//! a flat token stream:
//! - Keywords, identifiers, and operators
//! - Integer, floating, character and string literals
//! - Whole preprocessing directive lines, left for the parser to interpret
//! - Comments and whitespace are skipped

#![allow(clippy::cast_possible_truncation)] // Spans are u32; buffers > 4GB are unsupported

mod span;
mod token;

pub use span::{FileId, LineIndex, Location, Span};
pub use token::TokenKind;

use logos::Logos;
use thiserror::Error;

/// A token with its kind, span, and source text
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub lexeme: String,
}

impl Token {
    #[must_use]
    pub fn new(kind: TokenKind, span: Span, lexeme: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            lexeme: lexeme.into(),
        }
    }
}

/// Lexer error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexError {
    #[error("invalid character '{0}' in source")]
    UnexpectedChar(char),
    #[error("unterminated /* comment")]
    UnterminatedBlockComment,
}

/// A lexer error with location information
#[derive(Debug, Clone)]
pub struct SpannedError {
    pub error: LexError,
    pub span: Span,
}

impl SpannedError {
    #[must_use]
    pub fn new(error: LexError, span: Span) -> Self {
        Self { error, span }
    }
}

impl std::fmt::Display for SpannedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.error, self.span)
    }
}

impl std::error::Error for SpannedError {}

/// The snippet lexer
pub struct Lexer<'source> {
    inner: logos::Lexer<'source, TokenKind>,
    file: FileId,
    errors: Vec<SpannedError>,
    finished: bool,
}

impl<'source> Lexer<'source> {
    /// Create a lexer for one buffer
    #[must_use]
    pub fn new(source: &'source str, file: FileId) -> Self {
        Self {
            inner: TokenKind::lexer(source),
            file,
            errors: Vec::new(),
            finished: false,
        }
    }

    /// Tokenize a whole buffer, returning all tokens (ending with `Eof`) and any errors
    #[must_use]
    pub fn tokenize(source: &str, file: FileId) -> (Vec<Token>, Vec<SpannedError>) {
        let mut lexer = Lexer::new(source, file);
        let mut tokens = Vec::new();
        while let Some(token) = lexer.next_token() {
            tokens.push(token);
        }
        (tokens, lexer.errors)
    }

    /// Get the next token; yields `Eof` exactly once, then `None`
    pub fn next_token(&mut self) -> Option<Token> {
        if self.finished {
            return None;
        }

        match self.inner.next() {
            Some(Ok(TokenKind::UnterminatedComment)) => {
                let start = self.inner.span().start;
                let end = self.inner.source().len();
                self.errors.push(SpannedError::new(
                    LexError::UnterminatedBlockComment,
                    Span::from_range(self.file, start..start + 2),
                ));
                // The rest of the buffer is inside the comment.
                self.finished = true;
                Some(Token::new(
                    TokenKind::Eof,
                    Span::from_range(self.file, end..end),
                    "",
                ))
            }
            Some(Ok(kind)) => Some(Token::new(
                kind,
                Span::from_range(self.file, self.inner.span()),
                self.inner.slice(),
            )),
            Some(Err(())) => {
                let span = Span::from_range(self.file, self.inner.span());
                let slice = self.inner.slice();
                let invalid = slice.chars().next().unwrap_or('\0');
                self.errors
                    .push(SpannedError::new(LexError::UnexpectedChar(invalid), span));
                Some(Token::new(TokenKind::Error, span, slice))
            }
            None => {
                self.finished = true;
                let end = self.inner.source().len();
                Some(Token::new(
                    TokenKind::Eof,
                    Span::from_range(self.file, end..end),
                    "",
                ))
            }
        }
    }

    /// Errors collected so far
    #[must_use]
    pub fn errors(&self) -> &[SpannedError] {
        &self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::tokenize(source, FileId::MAIN)
            .0
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lex_function_definition() {
        assert_eq!(
            kinds("int add(int a, int b) { return a + b; }"),
            vec![
                TokenKind::Int,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::Int,
                TokenKind::Ident,
                TokenKind::Comma,
                TokenKind::Int,
                TokenKind::Ident,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Return,
                TokenKind::Ident,
                TokenKind::Plus,
                TokenKind::Ident,
                TokenKind::Semicolon,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_numeric_literals() {
        assert_eq!(
            kinds("42 0x2Au 10UL 0.5 1e3 .25f 3.f"),
            vec![
                TokenKind::IntLit,
                TokenKind::HexLit,
                TokenKind::IntLit,
                TokenKind::FloatLit,
                TokenKind::FloatLit,
                TokenKind::FloatLit,
                TokenKind::FloatLit,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_skips_comments() {
        assert_eq!(
            kinds("a // line\n /* block\n comment */ b"),
            vec![TokenKind::Ident, TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn lex_directive_line() {
        let (tokens, errors) = Lexer::tokenize("#include <math.h>\nint x;", FileId::MAIN);
        assert!(errors.is_empty());
        assert_eq!(tokens[0].kind, TokenKind::Directive);
        assert_eq!(tokens[0].lexeme, "#include <math.h>");
        assert_eq!(tokens[1].kind, TokenKind::Int);
    }

    #[test]
    fn lex_operators_longest_match() {
        assert_eq!(
            kinds("a <<= b >> c && !d"),
            vec![
                TokenKind::Ident,
                TokenKind::ShlEq,
                TokenKind::Ident,
                TokenKind::Shr,
                TokenKind::Ident,
                TokenKind::AndAnd,
                TokenKind::Bang,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_reports_invalid_character() {
        let (tokens, errors) = Lexer::tokenize("int @x;", FileId::MAIN);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error, LexError::UnexpectedChar('@'));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Error));
    }

    #[test]
    fn lex_reports_unterminated_comment() {
        let (tokens, errors) = Lexer::tokenize("int x; /* never closed", FileId::MAIN);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error, LexError::UnterminatedBlockComment);
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
    }

    #[test]
    fn lex_spans_carry_file() {
        let (tokens, _) = Lexer::tokenize("x", FileId(2));
        assert_eq!(tokens[0].span, Span::in_file(FileId(2), 0, 1));
    }
}
