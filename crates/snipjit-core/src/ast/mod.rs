//! Syntax tree for the C / C++ snippet subset
//!
//! Typedef names are resolved while parsing, so every type in the tree is a
//! plain [`CType`]. Expressions and local declarations carry ids that the
//! semantic pass keys its results on.

mod expr;
mod stmt;
mod types;

pub use expr::*;
pub use stmt::*;
pub use types::*;

pub use crate::lexer::Span;

/// An identifier with its source location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    #[must_use]
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

/// Storage class written on a function declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Storage {
    #[default]
    None,
    Extern,
    Static,
}

/// Language linkage of a declaration (`extern "C"` in C++)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageLinkage {
    C,
    Cxx,
}

/// A function parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub id: DeclId,
    pub name: Option<Ident>,
    pub ty: CType,
    pub is_const: bool,
    pub span: Span,
}

/// A function prototype or definition
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Ident,
    pub ret: CType,
    pub params: Vec<Param>,
    pub storage: Storage,
    pub linkage: LanguageLinkage,
    /// `None` for a prototype
    pub body: Option<Block>,
    pub span: Span,
}

impl FunctionDecl {
    #[must_use]
    pub fn is_definition(&self) -> bool {
        self.body.is_some()
    }
}

/// A whole translation unit: the snippet with its headers spliced in
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TranslationUnit {
    pub functions: Vec<FunctionDecl>,
}

impl TranslationUnit {
    /// Function definitions, in source order
    pub fn definitions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.functions.iter().filter(|f| f.is_definition())
    }
}
