//! Parser for the C / C++ snippet subset
//!
//! Recursive descent for declarations and statements, with a Pratt parser
//! (top-down operator precedence) for binary expressions. Typedef names are
//! tracked while parsing, as C requires, and `#include` lines splice the
//! header's tokens into the stream in place.
//!
//! # Example
//!
//! ```
//! use snipjit_core::parser::Parser;
//! use snipjit_core::source::Language;
//!
//! let unit = Parser::parse_source("int add(int a, int b) { return a + b; }", Language::default());
//! assert!(unit.is_ok());
//! ```

mod error;
mod headers;

pub use error::{ExpectedToken, ParseError, ParseErrorKind};
pub use headers::HeaderSearch;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::ast::{
    BinOp, Block, CType, DeclId, Expr, ExprId, ExprKind, FloatSuffix, FunctionDecl, Ident,
    IncDec, IntRank, IntSuffix, LanguageLinkage, LocalDecl, Param, Stmt, StmtKind, Storage,
    TranslationUnit, UnaryOp,
};
use crate::lexer::{FileId, Lexer, Span, Token, TokenKind};
use crate::source::{Language, SourceMap, INPUT_NAME};

/// Result type for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Deepest statement and expression nesting accepted, clang's default
/// bracket depth
///
/// Checking and code generation walk the tree recursively, so this also
/// bounds their recursion.
pub const MAX_NESTING_DEPTH: usize = 256;

/// Everything the parser produced, including partial results after errors
#[derive(Debug)]
pub struct ParseOutput {
    pub unit: TranslationUnit,
    pub errors: Vec<ParseError>,
}

impl ParseOutput {
    /// True when a fatal error cut parsing short
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.errors.iter().any(ParseError::is_fatal)
    }
}

/// Type keywords seen in one declaration
#[derive(Debug, Default)]
struct TypeKeywords {
    void: bool,
    bool: bool,
    char: bool,
    short: bool,
    int: bool,
    long: u8,
    float: bool,
    double: bool,
    signed: bool,
    unsigned: bool,
}

impl TypeKeywords {
    fn add(&mut self, kind: TokenKind) -> Result<(), ParseErrorKind> {
        let duplicate = match kind {
            TokenKind::Void => std::mem::replace(&mut self.void, true),
            TokenKind::Bool => std::mem::replace(&mut self.bool, true),
            TokenKind::Char => std::mem::replace(&mut self.char, true),
            TokenKind::Short => std::mem::replace(&mut self.short, true),
            TokenKind::Int => std::mem::replace(&mut self.int, true),
            TokenKind::Float => std::mem::replace(&mut self.float, true),
            TokenKind::Double => std::mem::replace(&mut self.double, true),
            TokenKind::Signed => std::mem::replace(&mut self.signed, true),
            TokenKind::Unsigned => std::mem::replace(&mut self.unsigned, true),
            TokenKind::Long => {
                self.long += 1;
                self.long > 2
            }
            _ => false,
        };
        if duplicate {
            let message = if kind == TokenKind::Long {
                "'long long long' is too long for the front end".to_string()
            } else {
                format!("duplicate {kind} declaration specifier")
            };
            return Err(ParseErrorKind::InvalidTypeSpecifiers(message));
        }
        Ok(())
    }

    fn any(&self) -> bool {
        self.void
            || self.bool
            || self.char
            || self.short
            || self.int
            || self.long > 0
            || self.float
            || self.double
            || self.signed
            || self.unsigned
    }

    fn resolve(&self) -> Result<CType, ParseErrorKind> {
        let invalid = |msg: &str| Err(ParseErrorKind::InvalidTypeSpecifiers(msg.to_string()));
        if self.signed && self.unsigned {
            return invalid("cannot combine 'signed' with 'unsigned'");
        }
        let sign = self.signed || self.unsigned;
        let bases = [self.void, self.bool, self.char, self.float, self.double]
            .iter()
            .filter(|&&b| b)
            .count();
        let sizes = usize::from(self.short) + usize::from(self.long > 0);

        if self.double && self.long > 0 {
            return Err(ParseErrorKind::Unsupported("'long double' is"));
        }
        if bases > 1 || sizes > 1 || (bases == 1 && (sizes > 0 || self.int)) {
            return invalid("cannot combine these type specifiers");
        }
        if sign && (self.void || self.bool || self.float || self.double) {
            return invalid("'signed' and 'unsigned' only apply to integer types");
        }

        let ty = if self.void {
            CType::Void
        } else if self.bool {
            CType::Bool
        } else if self.float {
            CType::Float
        } else if self.double {
            CType::Double
        } else {
            let rank = if self.char {
                IntRank::Char
            } else if self.short {
                IntRank::Short
            } else if self.long == 2 {
                IntRank::LongLong
            } else if self.long == 1 {
                IntRank::Long
            } else {
                IntRank::Int
            };
            CType::Integer {
                rank,
                signed: !self.unsigned,
            }
        };
        Ok(ty)
    }
}

/// Declaration specifiers: the type plus qualifiers and storage class
#[derive(Debug, Clone, Copy)]
struct Specifiers {
    ty: CType,
    is_const: bool,
    storage: Storage,
    typedef: bool,
    span: Span,
}

/// The snippet parser
pub struct Parser<'a> {
    /// All tokens, with included headers spliced in
    tokens: Vec<Token>,
    /// Current position in the token stream
    position: usize,
    /// Collected errors, lexer errors included
    errors: Vec<ParseError>,
    sources: &'a mut SourceMap,
    headers: &'a HeaderSearch<'a>,
    included: HashSet<String>,
    typedefs: HashMap<String, CType>,
    language: Language,
    /// Linkage applied to function declarations (changed by `extern "C"`)
    linkage: LanguageLinkage,
    next_expr: u32,
    next_decl: u32,
    /// Current nesting level, checked against [`MAX_NESTING_DEPTH`]
    depth: usize,
    /// Set after a fatal error; parsing stops
    fatal: bool,
}

impl<'a> Parser<'a> {
    /// Create a parser over a buffer already registered in `sources`
    pub fn new(
        sources: &'a mut SourceMap,
        file: FileId,
        headers: &'a HeaderSearch<'a>,
        language: Language,
    ) -> Self {
        let text = sources.shared_text(file).unwrap_or_else(|| Arc::from(""));
        let (tokens, lex_errors) = Lexer::tokenize(&text, file);
        let errors = lex_errors
            .into_iter()
            .map(|e| ParseError::new(ParseErrorKind::Lex(e.error), e.span))
            .collect();
        let linkage = if language.is_cxx() {
            LanguageLinkage::Cxx
        } else {
            LanguageLinkage::C
        };
        Self {
            tokens,
            position: 0,
            errors,
            sources,
            headers,
            included: HashSet::new(),
            typedefs: HashMap::new(),
            language,
            linkage,
            next_expr: 0,
            next_decl: 0,
            depth: 0,
            fatal: false,
        }
    }

    /// Parse a whole translation unit, resolving includes through `headers`
    pub fn parse_translation_unit(
        sources: &'a mut SourceMap,
        file: FileId,
        headers: &'a HeaderSearch<'a>,
        language: Language,
    ) -> ParseOutput {
        let mut parser = Parser::new(sources, file, headers, language);
        let unit = parser.translation_unit();
        ParseOutput {
            unit,
            errors: parser.errors,
        }
    }

    /// Parse standalone source text with only the builtin headers available
    pub fn parse_source(source: &str, language: Language) -> Result<TranslationUnit, Vec<ParseError>> {
        let mut sources = SourceMap::new();
        let file = sources.add(INPUT_NAME, source);
        let headers = HeaderSearch::builtin_only(language);
        let output = Parser::parse_translation_unit(&mut sources, file, &headers, language);
        if output.errors.is_empty() {
            Ok(output.unit)
        } else {
            Err(output.errors)
        }
    }

    // ==================== Token Management ====================

    fn current(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.position.min(last)]
    }

    fn current_kind(&self) -> TokenKind {
        self.current().kind
    }

    fn peek_kind(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.position + offset)
            .map_or(TokenKind::Eof, |t| t.kind)
    }

    fn is_eof(&self) -> bool {
        self.current_kind() == TokenKind::Eof
    }

    /// Advance to the next token; never moves past `Eof`
    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::Eof {
            self.position += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current_kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(ExpectedToken::Token(kind)))
        }
    }

    /// Expect a closing token, describing what it closes
    fn expect_after(
        &mut self,
        kind: TokenKind,
        expected: &'static str,
        context: &'static str,
    ) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(ParseError::new(
                ParseErrorKind::ExpectedAfter { expected, context },
                self.current().span,
            ))
        }
    }

    fn expect_ident(&mut self) -> ParseResult<Ident> {
        let token = self.current().clone();
        if token.kind == TokenKind::Ident {
            self.advance();
            Ok(Ident::new(token.lexeme, token.span))
        } else {
            Err(ParseError::new(ParseErrorKind::ExpectedIdentifier, token.span))
        }
    }

    fn unexpected(&self, expected: ExpectedToken) -> ParseError {
        let found = self.current_kind();
        let kind = if found == TokenKind::Eof {
            ParseErrorKind::UnexpectedEof
        } else {
            ParseErrorKind::UnexpectedToken { found, expected }
        };
        ParseError::new(kind, self.current().span)
    }

    fn error(&mut self, error: ParseError) {
        // Anything after a fatal error is fallout from it
        if self.fatal {
            return;
        }
        if error.is_fatal() {
            self.fatal = true;
        }
        self.errors.push(error);
    }

    /// Enter one more level of nesting
    fn descend(&mut self) -> ParseResult<()> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ParseError::new(
                ParseErrorKind::NestingTooDeep(MAX_NESTING_DEPTH),
                self.current().span,
            )
            .with_hint("split the code into smaller functions or statements"));
        }
        self.depth += 1;
        Ok(())
    }

    fn nested<T>(&mut self, parse: fn(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        self.descend()?;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expr(&mut self, kind: ExprKind, span: Span) -> Expr {
        let id = ExprId(self.next_expr);
        self.next_expr += 1;
        Expr::new(id, kind, span)
    }

    fn decl_id(&mut self) -> DeclId {
        let id = DeclId(self.next_decl);
        self.next_decl += 1;
        id
    }

    fn is_typedef_name(&self, token: &Token) -> bool {
        token.kind == TokenKind::Ident && self.typedefs.contains_key(&token.lexeme)
    }

    /// Does the current token begin a type name (for casts and sizeof)?
    fn at_type_name(&self, offset: usize) -> bool {
        match self.tokens.get(self.position + offset) {
            Some(token) => {
                token.kind.is_type_keyword()
                    || token.kind == TokenKind::Const
                    || self.is_typedef_name(token)
            }
            None => false,
        }
    }

    /// Does the current token begin a declaration?
    fn at_declaration(&self) -> bool {
        let kind = self.current_kind();
        kind.is_type_keyword()
            || kind.is_decl_specifier()
            || matches!(kind, TokenKind::Struct | TokenKind::Union | TokenKind::Enum)
            || (self.is_typedef_name(self.current()) && self.peek_kind(1) == TokenKind::Ident)
    }

    // ==================== Preprocessing ====================

    fn directive(&mut self) {
        let token = self.advance();
        let text = token.lexeme[1..].trim();
        if text.is_empty() {
            return;
        }
        let split = text
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(text.len());
        let (name, rest) = text.split_at(split);
        match name {
            "include" => {
                if let Err(e) = self.include(rest.trim(), token.span) {
                    self.error(e);
                }
            }
            "pragma" => {}
            other => self.error(ParseError::new(
                ParseErrorKind::UnsupportedDirective(other.to_string()),
                token.span,
            )),
        }
    }

    fn include(&mut self, spec: &str, span: Span) -> ParseResult<()> {
        let (close, quoted) = match spec.chars().next() {
            Some('<') => ('>', false),
            Some('"') => ('"', true),
            _ => return Err(ParseError::new(ParseErrorKind::MalformedInclude, span)),
        };
        let name = spec[1..]
            .find(close)
            .map(|end| &spec[1..=end])
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ParseError::new(ParseErrorKind::MalformedInclude, span))?;

        if !self.included.insert(name.to_string()) {
            return Ok(());
        }
        let Some(text) = self.headers.find(name, quoted) else {
            return Err(ParseError::new(
                ParseErrorKind::HeaderNotFound(name.to_string()),
                span,
            ));
        };

        let file = self.sources.add(name, text.into_owned());
        let text = self.sources.shared_text(file).unwrap_or_else(|| Arc::from(""));
        let (mut tokens, lex_errors) = Lexer::tokenize(&text, file);
        tokens.retain(|t| t.kind != TokenKind::Eof);
        for e in lex_errors {
            self.error(ParseError::new(ParseErrorKind::Lex(e.error), e.span));
        }
        let rest = self.tokens.split_off(self.position);
        self.tokens.extend(tokens);
        self.tokens.extend(rest);
        Ok(())
    }

    // ==================== Declarations ====================

    fn translation_unit(&mut self) -> TranslationUnit {
        let mut unit = TranslationUnit::default();
        while !self.is_eof() && !self.fatal {
            self.external_declaration(&mut unit.functions);
        }
        unit
    }

    fn external_declaration(&mut self, out: &mut Vec<FunctionDecl>) {
        match self.current_kind() {
            TokenKind::Directive => self.directive(),
            TokenKind::Semicolon => {
                self.advance();
            }
            TokenKind::Extern if self.peek_kind(1) == TokenKind::StringLit => {
                let linked = self.descend().and_then(|()| {
                    let linked = self.linkage_specification(out);
                    self.depth -= 1;
                    linked
                });
                if let Err(e) = linked {
                    self.error(e);
                    self.synchronize();
                }
            }
            _ => match self.declaration() {
                Ok(Some(function)) => out.push(function),
                Ok(None) => {}
                Err(e) => {
                    self.error(e);
                    self.synchronize();
                }
            },
        }
    }

    /// `extern "C" { ... }` or `extern "C" declaration`
    fn linkage_specification(&mut self, out: &mut Vec<FunctionDecl>) -> ParseResult<()> {
        let start = self.advance().span;
        let language = self.advance();
        if !self.language.is_cxx() {
            self.error(ParseError::new(
                ParseErrorKind::LinkageSpecInC,
                start.to(language.span),
            ));
        }
        let linkage = match language.lexeme.trim_matches('"') {
            "C" => LanguageLinkage::C,
            "C++" => LanguageLinkage::Cxx,
            other => {
                return Err(ParseError::new(
                    ParseErrorKind::UnknownLinkage(other.to_string()),
                    language.span,
                ))
            }
        };

        let saved = std::mem::replace(&mut self.linkage, linkage);
        if self.eat(TokenKind::LBrace).is_some() {
            while !self.check(TokenKind::RBrace) && !self.is_eof() && !self.fatal {
                self.external_declaration(out);
            }
            self.linkage = saved;
            if !self.fatal {
                self.expect_after(TokenKind::RBrace, "}", "linkage specification")?;
            }
        } else {
            self.external_declaration(out);
            self.linkage = saved;
        }
        Ok(())
    }

    fn decl_specifiers(&mut self) -> ParseResult<Specifiers> {
        let start = self.current().span;
        let mut keywords = TypeKeywords::default();
        let mut named: Option<CType> = None;
        let mut is_const = false;
        let mut storage = Storage::None;
        let mut typedef = false;

        loop {
            let token = self.current().clone();
            match token.kind {
                TokenKind::Const => is_const = true,
                TokenKind::Inline => {}
                TokenKind::Typedef => typedef = true,
                TokenKind::Static | TokenKind::Extern => {
                    let requested = if token.kind == TokenKind::Static {
                        Storage::Static
                    } else {
                        Storage::Extern
                    };
                    if storage != Storage::None && storage != requested {
                        return Err(ParseError::new(
                            ParseErrorKind::InvalidTypeSpecifiers(
                                "cannot combine 'static' with 'extern'".to_string(),
                            ),
                            token.span,
                        ));
                    }
                    storage = requested;
                }
                TokenKind::Struct | TokenKind::Union | TokenKind::Enum => {
                    return Err(ParseError::new(
                        ParseErrorKind::Unsupported("struct, union and enum types are"),
                        token.span,
                    ));
                }
                kind if kind.is_type_keyword() => {
                    if named.is_some() {
                        return Err(ParseError::new(
                            ParseErrorKind::InvalidTypeSpecifiers(format!(
                                "cannot combine {kind} with a typedef name"
                            )),
                            token.span,
                        ));
                    }
                    keywords
                        .add(kind)
                        .map_err(|e| ParseError::new(e, token.span))?;
                }
                TokenKind::Ident
                    if named.is_none() && !keywords.any() && self.is_typedef_name(&token) =>
                {
                    named = self.typedefs.get(&token.lexeme).copied();
                }
                _ => break,
            }
            self.advance();
        }

        let span = start.to(self.tokens[self.position.saturating_sub(1)].span);
        let ty = match named {
            Some(ty) => ty,
            None if keywords.any() => keywords
                .resolve()
                .map_err(|e| ParseError::new(e, span))?,
            None => {
                return Err(ParseError::new(ParseErrorKind::ExpectedType, self.current().span)
                    .with_hint("implicit int is not supported; add a type"))
            }
        };
        Ok(Specifiers {
            ty,
            is_const,
            storage,
            typedef,
            span,
        })
    }

    fn reject_pointer(&self) -> ParseResult<()> {
        if matches!(
            self.current_kind(),
            TokenKind::Star | TokenKind::Amp | TokenKind::AndAnd
        ) {
            return Err(ParseError::new(
                ParseErrorKind::Unsupported("pointer and reference types are"),
                self.current().span,
            ));
        }
        Ok(())
    }

    fn reject_array(&self) -> ParseResult<()> {
        if self.check(TokenKind::LBracket) {
            return Err(ParseError::new(
                ParseErrorKind::Unsupported("array types are"),
                self.current().span,
            ));
        }
        Ok(())
    }

    /// A file-scope declaration; returns the function it declares, if any
    fn declaration(&mut self) -> ParseResult<Option<FunctionDecl>> {
        let specs = self.decl_specifiers()?;
        if specs.typedef {
            self.typedef_declarators(specs)?;
            return Ok(None);
        }
        self.reject_pointer()?;
        let name = self.expect_ident()?;
        if !self.check(TokenKind::LParen) {
            return Err(ParseError::new(
                ParseErrorKind::Unsupported("global variables are"),
                name.span,
            ));
        }

        let params = self.param_list()?;
        let body = if self.check(TokenKind::LBrace) {
            Some(self.block()?)
        } else {
            self.expect_after(TokenKind::Semicolon, ";", "function declaration")?;
            None
        };
        let end = self.tokens[self.position.saturating_sub(1)].span;
        Ok(Some(FunctionDecl {
            span: specs.span.to(end),
            name,
            ret: specs.ty,
            params,
            storage: specs.storage,
            linkage: self.linkage,
            body,
        }))
    }

    fn typedef_declarators(&mut self, specs: Specifiers) -> ParseResult<()> {
        loop {
            self.reject_pointer()?;
            let name = self.expect_ident()?;
            self.reject_array()?;
            self.typedefs.insert(name.name, specs.ty);
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect_after(TokenKind::Semicolon, ";", "typedef")?;
        Ok(())
    }

    fn param_list(&mut self) -> ParseResult<Vec<Param>> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if self.eat(TokenKind::RParen).is_some() {
            return Ok(params);
        }
        if self.check(TokenKind::Void) && self.peek_kind(1) == TokenKind::RParen {
            self.advance();
            self.advance();
            return Ok(params);
        }

        loop {
            if self.check(TokenKind::Ellipsis) {
                return Err(ParseError::new(
                    ParseErrorKind::Unsupported("variadic functions are"),
                    self.current().span,
                ));
            }
            let specs = self.decl_specifiers()?;
            self.reject_pointer()?;
            let name = if self.check(TokenKind::Ident) {
                Some(self.expect_ident()?)
            } else {
                None
            };
            self.reject_array()?;
            if specs.ty.is_void() {
                return Err(ParseError::new(
                    ParseErrorKind::InvalidTypeSpecifiers(
                        "'void' must be the first and only parameter".to_string(),
                    ),
                    specs.span,
                ));
            }
            let span = name.as_ref().map_or(specs.span, |n| specs.span.to(n.span));
            params.push(Param {
                id: self.decl_id(),
                name,
                ty: specs.ty,
                is_const: specs.is_const,
                span,
            });
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect_after(TokenKind::RParen, ")", "parameter list")?;
        Ok(params)
    }

    // ==================== Statements ====================

    fn block(&mut self) -> ParseResult<Block> {
        let open = self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_eof() && !self.fatal {
            if self.check(TokenKind::Directive) {
                self.directive();
                continue;
            }
            match self.statement() {
                Ok(stmt) => stmts.push(stmt),
                Err(e) => {
                    self.error(e);
                    self.synchronize_in_block();
                }
            }
        }
        if self.fatal {
            return Ok(Block {
                stmts,
                span: open.span,
            });
        }
        let close = self.expect_after(TokenKind::RBrace, "}", "block")?;
        Ok(Block {
            stmts,
            span: open.span.to(close.span),
        })
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        self.nested(Self::bare_statement)
    }

    fn bare_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.current().span;
        let kind = match self.current_kind() {
            TokenKind::LBrace => StmtKind::Block(self.block()?),
            TokenKind::Semicolon => {
                self.advance();
                StmtKind::Empty
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.check(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.expect_after(TokenKind::Semicolon, ";", "return statement")?;
                StmtKind::Return(value)
            }
            TokenKind::If => self.if_stmt()?,
            TokenKind::While => {
                self.advance();
                let cond = self.paren_condition()?;
                let body = Box::new(self.statement()?);
                StmtKind::While { cond, body }
            }
            TokenKind::Do => {
                self.advance();
                let body = Box::new(self.statement()?);
                self.expect_after(TokenKind::While, "while", "do/while loop body")?;
                let cond = self.paren_condition()?;
                self.expect_after(TokenKind::Semicolon, ";", "do/while statement")?;
                StmtKind::DoWhile { body, cond }
            }
            TokenKind::For => self.for_stmt()?,
            TokenKind::Break => {
                self.advance();
                self.expect_after(TokenKind::Semicolon, ";", "break")?;
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                self.expect_after(TokenKind::Semicolon, ";", "continue")?;
                StmtKind::Continue
            }
            _ if self.at_declaration() => return self.local_declaration(),
            _ => {
                let expr = self.expression()?;
                self.expect_after(TokenKind::Semicolon, ";", "expression")?;
                StmtKind::Expr(expr)
            }
        };
        let end = self.tokens[self.position.saturating_sub(1)].span;
        Ok(Stmt::new(kind, start.to(end)))
    }

    fn paren_condition(&mut self) -> ParseResult<Expr> {
        self.expect(TokenKind::LParen)?;
        let cond = self.expression()?;
        self.expect_after(TokenKind::RParen, ")", "condition")?;
        Ok(cond)
    }

    fn if_stmt(&mut self) -> ParseResult<StmtKind> {
        self.advance();
        let cond = self.paren_condition()?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.eat(TokenKind::Else).is_some() {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(StmtKind::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn for_stmt(&mut self) -> ParseResult<StmtKind> {
        self.advance();
        self.expect(TokenKind::LParen)?;

        let init = if self.eat(TokenKind::Semicolon).is_some() {
            None
        } else if self.at_declaration() {
            Some(Box::new(self.local_declaration()?))
        } else {
            let start = self.current().span;
            let expr = self.expression()?;
            let end = self.expect_after(TokenKind::Semicolon, ";", "for-loop initializer")?;
            Some(Box::new(Stmt::new(StmtKind::Expr(expr), start.to(end.span))))
        };
        let cond = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_after(TokenKind::Semicolon, ";", "for-loop condition")?;
        let step = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_after(TokenKind::RParen, ")", "for-loop header")?;
        let body = Box::new(self.statement()?);
        Ok(StmtKind::For {
            init,
            cond,
            step,
            body,
        })
    }

    fn local_declaration(&mut self) -> ParseResult<Stmt> {
        let specs = self.decl_specifiers()?;
        if specs.typedef {
            self.typedef_declarators(specs)?;
            let end = self.tokens[self.position.saturating_sub(1)].span;
            return Ok(Stmt::new(StmtKind::Empty, specs.span.to(end)));
        }
        match specs.storage {
            Storage::Static => {
                return Err(ParseError::new(
                    ParseErrorKind::Unsupported("static local variables are"),
                    specs.span,
                ))
            }
            Storage::Extern => {
                return Err(ParseError::new(
                    ParseErrorKind::Unsupported("block-scope extern declarations are"),
                    specs.span,
                ))
            }
            Storage::None => {}
        }
        if specs.ty.is_void() {
            return Err(ParseError::new(
                ParseErrorKind::InvalidTypeSpecifiers(
                    "variable has incomplete type 'void'".to_string(),
                ),
                specs.span,
            ));
        }

        let mut decls = Vec::new();
        loop {
            self.reject_pointer()?;
            let name = self.expect_ident()?;
            if self.check(TokenKind::LParen) {
                return Err(ParseError::new(
                    ParseErrorKind::Unsupported("local function declarations are"),
                    name.span,
                ));
            }
            self.reject_array()?;
            let init = if self.eat(TokenKind::Eq).is_some() {
                Some(self.assignment_expr()?)
            } else {
                None
            };
            let span = match &init {
                Some(init) => name.span.to(init.span),
                None => name.span,
            };
            decls.push(LocalDecl {
                id: self.decl_id(),
                name,
                ty: specs.ty,
                is_const: specs.is_const,
                init,
                span,
            });
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        let end = self.expect_after(TokenKind::Semicolon, ";", "declaration")?;
        Ok(Stmt::new(StmtKind::Decl(decls), specs.span.to(end.span)))
    }

    // ==================== Expressions ====================

    /// Parse an expression
    pub fn expression(&mut self) -> ParseResult<Expr> {
        self.assignment_expr()
    }

    fn assignment_expr(&mut self) -> ParseResult<Expr> {
        self.nested(Self::assignment)
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        let target = self.conditional_expr()?;
        let kind = self.current_kind();
        if !kind.is_assignment() {
            return Ok(target);
        }
        self.advance();
        let op = match kind {
            TokenKind::PlusEq => Some(BinOp::Add),
            TokenKind::MinusEq => Some(BinOp::Sub),
            TokenKind::StarEq => Some(BinOp::Mul),
            TokenKind::SlashEq => Some(BinOp::Div),
            TokenKind::PercentEq => Some(BinOp::Rem),
            TokenKind::AmpEq => Some(BinOp::BitAnd),
            TokenKind::PipeEq => Some(BinOp::BitOr),
            TokenKind::CaretEq => Some(BinOp::BitXor),
            TokenKind::ShlEq => Some(BinOp::Shl),
            TokenKind::ShrEq => Some(BinOp::Shr),
            _ => None,
        };
        // Right associative: a = b = c
        let value = self.assignment_expr()?;
        let span = target.span.to(value.span);
        Ok(self.expr(
            ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            span,
        ))
    }

    fn conditional_expr(&mut self) -> ParseResult<Expr> {
        let cond = self.parse_precedence(1)?;
        if self.eat(TokenKind::Question).is_none() {
            return Ok(cond);
        }
        let then_expr = self.expression()?;
        self.expect_after(TokenKind::Colon, ":", "'?' branch")?;
        let else_expr = self.nested(Self::conditional_expr)?;
        let span = cond.span.to(else_expr.span);
        Ok(self.expr(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            span,
        ))
    }

    /// Parse a binary expression with the given minimum precedence
    fn parse_precedence(&mut self, min_prec: u8) -> ParseResult<Expr> {
        let depth = self.depth;
        let result = self.binary_chain(min_prec);
        self.depth = depth;
        result
    }

    /// Each operator in a chain deepens the left operand's tree by one level
    fn binary_chain(&mut self, min_prec: u8) -> ParseResult<Expr> {
        let mut left = self.unary_expr()?;

        while let Some(op) = self.infix_op() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.descend()?;
            self.advance(); // consume operator
            // All C binary operators are left associative
            let right = self.parse_precedence(prec + 1)?;
            let span = left.span.to(right.span);
            left = self.expr(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(left),
                    rhs: Box::new(right),
                },
                span,
            );
        }

        Ok(left)
    }

    fn infix_op(&self) -> Option<BinOp> {
        let op = match self.current_kind() {
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Percent => BinOp::Rem,
            TokenKind::Shl => BinOp::Shl,
            TokenKind::Shr => BinOp::Shr,
            TokenKind::Amp => BinOp::BitAnd,
            TokenKind::Pipe => BinOp::BitOr,
            TokenKind::Caret => BinOp::BitXor,
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::NotEq => BinOp::Ne,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::LtEq => BinOp::Le,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::GtEq => BinOp::Ge,
            TokenKind::AndAnd => BinOp::And,
            TokenKind::OrOr => BinOp::Or,
            _ => return None,
        };
        Some(op)
    }

    fn type_name(&mut self) -> ParseResult<CType> {
        let specs = self.decl_specifiers()?;
        if specs.storage != Storage::None || specs.typedef {
            return Err(ParseError::new(ParseErrorKind::ExpectedType, specs.span));
        }
        self.reject_pointer()?;
        Ok(specs.ty)
    }

    fn unary_expr(&mut self) -> ParseResult<Expr> {
        let start = self.current().span;
        let op = match self.current_kind() {
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.nested(Self::unary_expr)?;
            let span = start.to(operand.span);
            return Ok(self.expr(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            ));
        }

        match self.current_kind() {
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let op = if self.advance().kind == TokenKind::PlusPlus {
                    IncDec::PreInc
                } else {
                    IncDec::PreDec
                };
                let target = self.nested(Self::unary_expr)?;
                let span = start.to(target.span);
                Ok(self.expr(
                    ExprKind::IncDec {
                        op,
                        target: Box::new(target),
                    },
                    span,
                ))
            }
            TokenKind::Sizeof => {
                self.advance();
                if self.check(TokenKind::LParen) && self.at_type_name(1) {
                    self.advance();
                    let ty = self.type_name()?;
                    let close = self.expect_after(TokenKind::RParen, ")", "type name")?;
                    Ok(self.expr(ExprKind::SizeofType(ty), start.to(close.span)))
                } else {
                    let operand = self.nested(Self::unary_expr)?;
                    let span = start.to(operand.span);
                    Ok(self.expr(ExprKind::SizeofExpr(Box::new(operand)), span))
                }
            }
            TokenKind::LParen if self.at_type_name(1) => {
                self.advance();
                let ty = self.type_name()?;
                self.expect_after(TokenKind::RParen, ")", "cast type")?;
                let operand = self.nested(Self::unary_expr)?;
                let span = start.to(operand.span);
                Ok(self.expr(
                    ExprKind::Cast {
                        ty,
                        expr: Box::new(operand),
                    },
                    span,
                ))
            }
            _ => self.postfix_expr(),
        }
    }

    fn postfix_expr(&mut self) -> ParseResult<Expr> {
        let depth = self.depth;
        let result = self.postfix_chain();
        self.depth = depth;
        result
    }

    fn postfix_chain(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary_expr()?;
        loop {
            match self.current_kind() {
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    self.descend()?;
                    let token = self.advance();
                    let op = if token.kind == TokenKind::PlusPlus {
                        IncDec::PostInc
                    } else {
                        IncDec::PostDec
                    };
                    let span = expr.span.to(token.span);
                    expr = self.expr(
                        ExprKind::IncDec {
                            op,
                            target: Box::new(expr),
                        },
                        span,
                    );
                }
                TokenKind::LParen => {
                    self.descend()?;
                    let ExprKind::Ident(callee) = expr.kind else {
                        return Err(ParseError::new(
                            ParseErrorKind::Unsupported("calls through expressions are"),
                            expr.span,
                        ));
                    };
                    let args = self.arg_list()?;
                    let end = self.tokens[self.position.saturating_sub(1)].span;
                    let span = expr.span.to(end);
                    expr = self.expr(ExprKind::Call { callee, args }, span);
                }
                TokenKind::LBracket => {
                    return Err(ParseError::new(
                        ParseErrorKind::Unsupported("array subscripts are"),
                        self.current().span,
                    ))
                }
                TokenKind::Dot => {
                    return Err(ParseError::new(
                        ParseErrorKind::Unsupported("member access is"),
                        self.current().span,
                    ))
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn arg_list(&mut self) -> ParseResult<Vec<Expr>> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if self.eat(TokenKind::RParen).is_some() {
            return Ok(args);
        }
        loop {
            args.push(self.assignment_expr()?);
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect_after(TokenKind::RParen, ")", "call arguments")?;
        Ok(args)
    }

    fn primary_expr(&mut self) -> ParseResult<Expr> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::IntLit | TokenKind::HexLit => {
                self.advance();
                let (value, suffix, decimal) = parse_int(&token.lexeme)
                    .map_err(|e| ParseError::new(ParseErrorKind::InvalidNumber(e), token.span))?;
                Ok(self.expr(
                    ExprKind::IntLit {
                        value,
                        suffix,
                        decimal,
                    },
                    token.span,
                ))
            }
            TokenKind::FloatLit => {
                self.advance();
                let (value, suffix) = parse_float(&token.lexeme)
                    .map_err(|e| ParseError::new(ParseErrorKind::InvalidNumber(e), token.span))?;
                Ok(self.expr(ExprKind::FloatLit { value, suffix }, token.span))
            }
            TokenKind::CharLit => {
                self.advance();
                let value = parse_char(&token.lexeme).map_err(|e| {
                    ParseError::new(ParseErrorKind::InvalidCharacter(e), token.span)
                })?;
                Ok(self.expr(ExprKind::CharLit(value), token.span))
            }
            TokenKind::StringLit => {
                let mut span = self.advance().span;
                while let Some(next) = self.eat(TokenKind::StringLit) {
                    span = span.to(next.span);
                }
                Ok(self.expr(ExprKind::StringLit, span))
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                Ok(self.expr(ExprKind::BoolLit(token.kind == TokenKind::True), token.span))
            }
            TokenKind::Ident => {
                self.advance();
                Ok(self.expr(
                    ExprKind::Ident(Ident::new(token.lexeme, token.span)),
                    token.span,
                ))
            }
            TokenKind::LParen => {
                self.advance();
                let mut inner = self.expression()?;
                let close = self.expect_after(TokenKind::RParen, ")", "expression")?;
                inner.span = token.span.to(close.span);
                Ok(inner)
            }
            TokenKind::Eof => Err(ParseError::new(ParseErrorKind::UnexpectedEof, token.span)),
            _ => Err(ParseError::new(ParseErrorKind::ExpectedExpression, token.span)),
        }
    }

    // ==================== Error Recovery ====================

    /// Skip to the end of the current file-scope declaration
    fn synchronize(&mut self) {
        let mut depth = 0usize;
        while !self.is_eof() {
            match self.current_kind() {
                TokenKind::Semicolon if depth == 0 => {
                    self.advance();
                    return;
                }
                TokenKind::Directive if depth == 0 => return,
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    self.advance();
                    if depth <= 1 {
                        return;
                    }
                    depth -= 1;
                    continue;
                }
                _ => {}
            }
            self.advance();
        }
    }

    /// Skip to the end of the current statement inside a block
    fn synchronize_in_block(&mut self) {
        let mut depth = 0usize;
        while !self.is_eof() {
            match self.current_kind() {
                TokenKind::Semicolon if depth == 0 => {
                    self.advance();
                    return;
                }
                TokenKind::RBrace if depth == 0 => return,
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth -= 1,
                _ => {}
            }
            self.advance();
        }
    }
}

/// Split an integer literal into its value and suffix
fn parse_int(lexeme: &str) -> Result<(u64, IntSuffix, bool), String> {
    let digits_end = lexeme
        .rfind(|c: char| !matches!(c, 'u' | 'U' | 'l' | 'L'))
        .map_or(0, |i| i + 1);
    let (digits, suffix_text) = lexeme.split_at(digits_end);

    let invalid = || format!("invalid suffix '{suffix_text}' on integer constant");
    let u: &[char] = &['u', 'U'];
    let (unsigned, longs) = match suffix_text.strip_prefix(u) {
        Some(rest) => (true, rest),
        None => match suffix_text.strip_suffix(u) {
            Some(rest) => (true, rest),
            None => (false, suffix_text),
        },
    };
    let suffix = IntSuffix {
        unsigned,
        longs: match longs {
            "" => 0,
            "l" | "L" => 1,
            "ll" | "LL" => 2,
            _ => return Err(invalid()),
        },
    };

    let (radix, body) = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        (16, hex)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };
    let value = u64::from_str_radix(body, radix)
        .map_err(|_| format!("integer constant '{lexeme}' is out of range or malformed"))?;
    Ok((value, suffix, radix == 10))
}

fn parse_float(lexeme: &str) -> Result<(f64, FloatSuffix), String> {
    let (body, suffix) = match lexeme.chars().last() {
        Some('f' | 'F') => (&lexeme[..lexeme.len() - 1], FloatSuffix::F),
        Some('l' | 'L') => (&lexeme[..lexeme.len() - 1], FloatSuffix::L),
        _ => (lexeme, FloatSuffix::None),
    };
    body.parse::<f64>()
        .map(|value| (value, suffix))
        .map_err(|_| format!("malformed floating constant '{lexeme}'"))
}

/// Decode a character literal, quotes included
fn parse_char(lexeme: &str) -> Result<u8, String> {
    let inner = &lexeme[1..lexeme.len() - 1];
    let Some(escaped) = inner.strip_prefix('\\') else {
        return match inner.as_bytes() {
            [byte] => Ok(*byte),
            _ => Err(format!("multi-byte character {lexeme} not supported")),
        };
    };
    let value = match escaped {
        "n" => b'\n',
        "t" => b'\t',
        "r" => b'\r',
        "0" => 0,
        "\\" => b'\\',
        "'" => b'\'',
        "\"" => b'"',
        "?" => b'?',
        "a" => 0x07,
        "b" => 0x08,
        "f" => 0x0c,
        "v" => 0x0b,
        _ if escaped.starts_with('x') => u8::from_str_radix(&escaped[1..], 16)
            .map_err(|_| format!("hex escape in {lexeme} is out of range"))?,
        _ if escaped.chars().all(|c| c.is_digit(8)) => u8::from_str_radix(escaped, 8)
            .map_err(|_| format!("octal escape in {lexeme} is out of range"))?,
        _ => return Err(format!("unknown escape sequence in {lexeme}")),
    };
    Ok(value)
}
