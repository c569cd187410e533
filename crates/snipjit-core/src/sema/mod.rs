//! Semantic analysis for the snippet subset
//!
//! The checker resolves names, assigns a [`CType`] to every expression,
//! merges repeated function declarations and decides each function's
//! external symbol. Its results are side tables keyed by [`ExprId`] and
//! [`DeclId`] that code generation reads.

mod checker;
mod mangle;

pub use checker::Checker;
pub use mangle::mangle_function;

use std::collections::HashMap;

use crate::ast::{CType, DataModel, DeclId, ExprId, Span};
use crate::source::Language;

/// Visibility of a function outside the module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    /// Visible to the JIT session by symbol name
    External,
    /// `static`: private to the module
    Internal,
}

/// Everything known about one function name
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    /// Name as written in source
    pub name: String,
    /// External symbol, mangled for C++ linkage
    pub symbol: String,
    pub ret: CType,
    pub params: Vec<CType>,
    pub linkage: Linkage,
    /// A body was seen
    pub defined: bool,
    /// Called from at least one definition
    pub used: bool,
    /// First declaration
    pub span: Span,
}

/// What an identifier expression refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Local(DeclId),
    Function(usize),
}

/// A parameter or local variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalInfo {
    pub ty: CType,
    pub is_const: bool,
}

/// Results of checking one translation unit
#[derive(Debug, Clone)]
pub struct Semantics {
    pub language: Language,
    pub model: DataModel,
    /// Functions in first-declaration order
    pub functions: Vec<FunctionInfo>,
    index: HashMap<String, usize>,
    /// Type of every checked expression
    pub expr_types: HashMap<ExprId, CType>,
    /// Type an operator computes in, for binary and compound assignment
    /// expressions (after the usual arithmetic conversions)
    pub op_types: HashMap<ExprId, CType>,
    /// Referent of identifiers and calls
    pub bindings: HashMap<ExprId, Binding>,
    pub locals: HashMap<DeclId, LocalInfo>,
}

impl Semantics {
    fn new(language: Language, model: DataModel) -> Self {
        Self {
            language,
            model,
            functions: Vec::new(),
            index: HashMap::new(),
            expr_types: HashMap::new(),
            op_types: HashMap::new(),
            bindings: HashMap::new(),
            locals: HashMap::new(),
        }
    }

    /// Index of a function by source name
    #[must_use]
    pub fn function_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[must_use]
    pub fn function(&self, name: &str) -> Option<&FunctionInfo> {
        self.function_index(name).map(|i| &self.functions[i])
    }

    /// Type of an expression; unchecked expressions read as `int`
    #[must_use]
    pub fn expr_type(&self, id: ExprId) -> CType {
        self.expr_types.get(&id).copied().unwrap_or(CType::INT)
    }

    /// Type a binary operator computes in
    #[must_use]
    pub fn op_type(&self, id: ExprId) -> CType {
        self.op_types.get(&id).copied().unwrap_or(CType::INT)
    }

    #[must_use]
    pub fn local(&self, id: DeclId) -> Option<LocalInfo> {
        self.locals.get(&id).copied()
    }

    /// Type of comparison and logical results: `int` in C, `bool` in C++
    #[must_use]
    pub fn truth_type(&self) -> CType {
        if self.language.is_cxx() {
            CType::Bool
        } else {
            CType::INT
        }
    }
}
