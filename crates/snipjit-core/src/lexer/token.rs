//! Token types for the snippet lexer

use logos::Logos;

/// The kind of token produced by the lexer
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\r\n\f\v]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum TokenKind {
    // ========== Keywords ==========
    #[token("void")]
    Void,
    #[token("_Bool")]
    #[token("bool")]
    Bool,
    #[token("char")]
    Char,
    #[token("short")]
    Short,
    #[token("int")]
    Int,
    #[token("long")]
    Long,
    #[token("float")]
    Float,
    #[token("double")]
    Double,
    #[token("signed")]
    Signed,
    #[token("unsigned")]
    Unsigned,
    #[token("const")]
    Const,
    #[token("static")]
    Static,
    #[token("extern")]
    Extern,
    #[token("inline")]
    Inline,
    #[token("typedef")]
    Typedef,
    #[token("struct")]
    Struct,
    #[token("union")]
    Union,
    #[token("enum")]
    Enum,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("do")]
    Do,
    #[token("for")]
    For,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("sizeof")]
    Sizeof,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // ========== Literals ==========
    /// Decimal or octal integer literal with optional suffix
    #[regex(r"[0-9]+[uUlL]*")]
    IntLit,

    /// Hexadecimal integer literal with optional suffix
    #[regex(r"0[xX][0-9a-fA-F]+[uUlL]*")]
    HexLit,

    /// Floating literal, optionally suffixed with `f`
    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?[fFlL]?")]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?[fFlL]?")]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+[fFlL]?")]
    FloatLit,

    /// Character literal: 'a', '\n', '\x41', '\101'
    #[regex(r"'([^'\\\n]|\\[^\n]|\\x[0-9a-fA-F]+|\\[0-7][0-7]?[0-7]?)'")]
    CharLit,

    /// String literal (only meaningful in `extern "C"`)
    #[regex(r#""([^"\\\n]|\\[^\n])*""#)]
    StringLit,

    // ========== Identifiers ==========
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    // ========== Preprocessor ==========
    /// A whole preprocessing directive line, interpreted by the parser
    #[regex(r"#[^\n]*")]
    Directive,

    // ========== Operators ==========
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,

    #[token("=")]
    Eq,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,
    #[token("&=")]
    AmpEq,
    #[token("|=")]
    PipeEq,
    #[token("^=")]
    CaretEq,
    #[token("<<=")]
    ShlEq,
    #[token(">>=")]
    ShrEq,

    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,

    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,

    #[token("?")]
    Question,
    #[token(":")]
    Colon,

    // ========== Delimiters ==========
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("...")]
    Ellipsis,

    /// Opening of a block comment that never closes
    #[token("/*")]
    UnterminatedComment,

    // ========== Special ==========
    /// Lexical error recovery token (not matched by logos)
    Error,

    /// End of buffer (not matched by logos)
    Eof,
}

impl TokenKind {
    /// Returns true for keywords that can begin a declaration's type
    #[must_use]
    pub const fn is_type_keyword(&self) -> bool {
        matches!(
            self,
            Self::Void
                | Self::Bool
                | Self::Char
                | Self::Short
                | Self::Int
                | Self::Long
                | Self::Float
                | Self::Double
                | Self::Signed
                | Self::Unsigned
        )
    }

    /// Returns true for qualifiers and storage classes that may prefix a declaration
    #[must_use]
    pub const fn is_decl_specifier(&self) -> bool {
        matches!(
            self,
            Self::Const | Self::Static | Self::Extern | Self::Inline | Self::Typedef
        )
    }

    /// Returns true for assignment operators
    #[must_use]
    pub const fn is_assignment(&self) -> bool {
        matches!(
            self,
            Self::Eq
                | Self::PlusEq
                | Self::MinusEq
                | Self::StarEq
                | Self::SlashEq
                | Self::PercentEq
                | Self::AmpEq
                | Self::PipeEq
                | Self::CaretEq
                | Self::ShlEq
                | Self::ShrEq
        )
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Void => "'void'",
            Self::Bool => "'bool'",
            Self::Char => "'char'",
            Self::Short => "'short'",
            Self::Int => "'int'",
            Self::Long => "'long'",
            Self::Float => "'float'",
            Self::Double => "'double'",
            Self::Signed => "'signed'",
            Self::Unsigned => "'unsigned'",
            Self::Const => "'const'",
            Self::Static => "'static'",
            Self::Extern => "'extern'",
            Self::Inline => "'inline'",
            Self::Typedef => "'typedef'",
            Self::Struct => "'struct'",
            Self::Union => "'union'",
            Self::Enum => "'enum'",
            Self::Return => "'return'",
            Self::If => "'if'",
            Self::Else => "'else'",
            Self::While => "'while'",
            Self::Do => "'do'",
            Self::For => "'for'",
            Self::Break => "'break'",
            Self::Continue => "'continue'",
            Self::Sizeof => "'sizeof'",
            Self::True => "'true'",
            Self::False => "'false'",
            Self::IntLit | Self::HexLit => "integer literal",
            Self::FloatLit => "floating literal",
            Self::CharLit => "character literal",
            Self::StringLit => "string literal",
            Self::Ident => "identifier",
            Self::Directive => "preprocessing directive",
            Self::Plus => "'+'",
            Self::Minus => "'-'",
            Self::Star => "'*'",
            Self::Slash => "'/'",
            Self::Percent => "'%'",
            Self::PlusPlus => "'++'",
            Self::MinusMinus => "'--'",
            Self::Eq => "'='",
            Self::PlusEq => "'+='",
            Self::MinusEq => "'-='",
            Self::StarEq => "'*='",
            Self::SlashEq => "'/='",
            Self::PercentEq => "'%='",
            Self::AmpEq => "'&='",
            Self::PipeEq => "'|='",
            Self::CaretEq => "'^='",
            Self::ShlEq => "'<<='",
            Self::ShrEq => "'>>='",
            Self::EqEq => "'=='",
            Self::NotEq => "'!='",
            Self::Lt => "'<'",
            Self::LtEq => "'<='",
            Self::Gt => "'>'",
            Self::GtEq => "'>='",
            Self::AndAnd => "'&&'",
            Self::OrOr => "'||'",
            Self::Bang => "'!'",
            Self::Tilde => "'~'",
            Self::Amp => "'&'",
            Self::Pipe => "'|'",
            Self::Caret => "'^'",
            Self::Shl => "'<<'",
            Self::Shr => "'>>'",
            Self::Question => "'?'",
            Self::Colon => "':'",
            Self::LParen => "'('",
            Self::RParen => "')'",
            Self::LBrace => "'{'",
            Self::RBrace => "'}'",
            Self::LBracket => "'['",
            Self::RBracket => "']'",
            Self::Semicolon => "';'",
            Self::Comma => "','",
            Self::Dot => "'.'",
            Self::Ellipsis => "'...'",
            Self::UnterminatedComment => "'/*'",
            Self::Error => "invalid token",
            Self::Eof => "end of input",
        };
        f.write_str(text)
    }
}
