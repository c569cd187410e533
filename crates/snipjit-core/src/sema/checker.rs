//! Type checker for the snippet subset
//!
//! Reports problems through a [`DiagnosticReporter`] and keeps going, so one
//! run surfaces as many errors as possible. After an error the offending
//! expression is treated as `int` to avoid cascades.

use std::collections::HashMap;

use crate::ast::{
    BinOp, Block, CType, DataModel, DeclId, Expr, ExprKind, FloatSuffix, FunctionDecl, Ident,
    IntRank, IntSuffix, LanguageLinkage, Span, Stmt, StmtKind, Storage, TranslationUnit, UnaryOp,
};
use crate::diagnostics::DiagnosticReporter;
use crate::source::Language;

use super::mangle::mangle_function;
use super::{Binding, FunctionInfo, Linkage, LocalInfo, Semantics};

/// State for the function body being checked
struct FunctionContext {
    name: String,
    ret: CType,
    is_main: bool,
    loop_depth: usize,
    scopes: Vec<HashMap<String, DeclId>>,
}

/// Type checker for one translation unit
pub struct Checker<'r, 'a> {
    reporter: &'r mut DiagnosticReporter<'a>,
    semantics: Semantics,
    /// Source linkage of each function, for `extern "C"` consistency
    language_linkage: Vec<LanguageLinkage>,
    context: Option<FunctionContext>,
}

impl<'r, 'a> Checker<'r, 'a> {
    pub fn new(
        language: Language,
        model: DataModel,
        reporter: &'r mut DiagnosticReporter<'a>,
    ) -> Self {
        Self {
            reporter,
            semantics: Semantics::new(language, model),
            language_linkage: Vec::new(),
            context: None,
        }
    }

    /// Check a translation unit
    pub fn check(mut self, unit: &TranslationUnit) -> Semantics {
        for function in &unit.functions {
            self.declare_function(function);
        }
        for function in unit.definitions() {
            self.check_definition(function);
        }
        for info in &self.semantics.functions {
            if info.linkage == Linkage::Internal && info.used && !info.defined {
                self.reporter.error(
                    info.span,
                    format!("function '{}' has internal linkage but is not defined", info.name),
                );
            }
        }
        self.semantics
    }

    fn is_cxx(&self) -> bool {
        self.semantics.language.is_cxx()
    }

    // ==================== Declarations ====================

    fn declare_function(&mut self, decl: &FunctionDecl) {
        let name = decl.name.name.as_str();
        let params: Vec<CType> = decl.params.iter().map(|p| p.ty).collect();
        let is_main = name == "main";

        if is_main && decl.ret != CType::INT {
            self.reporter
                .error(decl.name.span, "'main' must return 'int'");
        }
        if is_main && decl.storage == Storage::Static {
            self.reporter
                .error(decl.name.span, "'main' is not allowed to be declared static");
        }
        self.check_param_names(decl);

        let linkage = if decl.storage == Storage::Static {
            Linkage::Internal
        } else {
            Linkage::External
        };

        let Some(index) = self.semantics.function_index(name) else {
            let symbol = if decl.linkage == LanguageLinkage::C || is_main {
                name.to_string()
            } else {
                mangle_function(name, &params)
            };
            let index = self.semantics.functions.len();
            self.semantics.functions.push(FunctionInfo {
                name: name.to_string(),
                symbol,
                ret: decl.ret,
                params,
                linkage,
                defined: decl.is_definition(),
                used: false,
                span: decl.name.span,
            });
            self.semantics.index.insert(name.to_string(), index);
            self.language_linkage.push(decl.linkage);
            return;
        };

        let previous = self.semantics.functions[index].clone();
        if previous.params != params || previous.ret != decl.ret {
            let message = if self.is_cxx() && previous.params != params {
                format!("overloading '{name}' is not supported")
            } else {
                format!("conflicting types for '{name}'")
            };
            self.reporter.error(decl.name.span, message);
            self.reporter
                .note(previous.span, "previous declaration is here");
            return;
        }
        // A redeclaration without a linkage specification inherits `extern "C"`
        if self.language_linkage[index] == LanguageLinkage::Cxx
            && decl.linkage == LanguageLinkage::C
        {
            self.reporter.error(
                decl.name.span,
                format!("declaration of '{name}' has a different language linkage"),
            );
            self.reporter
                .note(previous.span, "previous declaration is here");
        }
        if linkage == Linkage::Internal && previous.linkage == Linkage::External {
            self.reporter.error(
                decl.name.span,
                format!("static declaration of '{name}' follows non-static declaration"),
            );
            self.reporter
                .note(previous.span, "previous declaration is here");
        }
        if decl.is_definition() {
            if previous.defined {
                self.reporter
                    .error(decl.name.span, format!("redefinition of '{name}'"));
                self.reporter
                    .note(previous.span, "previous definition is here");
            }
            self.semantics.functions[index].defined = true;
        }
    }

    fn check_param_names(&mut self, decl: &FunctionDecl) {
        let mut seen: HashMap<&str, Span> = HashMap::new();
        for param in &decl.params {
            let Some(name) = &param.name else { continue };
            if let Some(&previous) = seen.get(name.name.as_str()) {
                self.reporter
                    .error(name.span, format!("redefinition of parameter '{}'", name.name));
                self.reporter
                    .note(previous, "previous declaration is here");
            } else {
                seen.insert(&name.name, name.span);
            }
        }
    }

    fn check_definition(&mut self, decl: &FunctionDecl) {
        let Some(body) = &decl.body else { return };
        let mut scope = HashMap::new();
        for param in &decl.params {
            self.semantics.locals.insert(
                param.id,
                LocalInfo {
                    ty: param.ty,
                    is_const: param.is_const,
                },
            );
            if let Some(name) = &param.name {
                scope.insert(name.name.clone(), param.id);
            }
        }
        self.context = Some(FunctionContext {
            name: decl.name.name.clone(),
            ret: decl.ret,
            is_main: decl.name.name == "main",
            loop_depth: 0,
            // Parameters share the outermost block scope
            scopes: vec![scope],
        });

        for stmt in &body.stmts {
            self.check_stmt(stmt);
        }

        let ctx = self.context.take();
        if let Some(ctx) = ctx {
            if !ctx.ret.is_void() && !ctx.is_main && !block_always_returns(body) {
                self.reporter.warning(
                    body.span,
                    "non-void function does not return a value in all control paths",
                );
            }
        }
    }

    // ==================== Scopes ====================

    fn ctx(&mut self) -> &mut FunctionContext {
        self.context
            .as_mut()
            .unwrap_or_else(|| unreachable!("statements are only checked inside a function"))
    }

    fn push_scope(&mut self) {
        self.ctx().scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.ctx().scopes.pop();
    }

    fn lookup_local(&self, name: &str) -> Option<DeclId> {
        let ctx = self.context.as_ref()?;
        ctx.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    // ==================== Statements ====================

    fn check_block(&mut self, block: &Block) {
        self.push_scope();
        for stmt in &block.stmts {
            self.check_stmt(stmt);
        }
        self.pop_scope();
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Decl(decls) => {
                for decl in decls {
                    if let Some(init) = &decl.init {
                        let ty = self.check_expr(init);
                        if ty.is_void() {
                            self.reporter.error(
                                init.span,
                                format!(
                                    "initializing '{}' with an expression of incompatible type 'void'",
                                    decl.ty
                                ),
                            );
                        }
                    }
                    self.semantics.locals.insert(
                        decl.id,
                        LocalInfo {
                            ty: decl.ty,
                            is_const: decl.is_const,
                        },
                    );
                    let name = decl.name.name.clone();
                    let scope = self.ctx().scopes.last_mut();
                    let previous = scope.and_then(|s| s.insert(name, decl.id));
                    if previous.is_some() {
                        self.reporter.error(
                            decl.name.span,
                            format!("redefinition of '{}'", decl.name.name),
                        );
                    }
                }
            }
            StmtKind::Expr(expr) => {
                self.check_expr(expr);
            }
            StmtKind::Return(value) => self.check_return(value.as_ref(), stmt.span),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.check_condition(cond);
                self.check_nested(then_branch);
                if let Some(else_branch) = else_branch {
                    self.check_nested(else_branch);
                }
            }
            StmtKind::While { cond, body } => {
                self.check_condition(cond);
                self.check_loop_body(body);
            }
            StmtKind::DoWhile { body, cond } => {
                self.check_loop_body(body);
                self.check_condition(cond);
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                self.push_scope();
                if let Some(init) = init {
                    self.check_stmt(init);
                }
                if let Some(cond) = cond {
                    self.check_condition(cond);
                }
                if let Some(step) = step {
                    self.check_expr(step);
                }
                self.check_loop_body(body);
                self.pop_scope();
            }
            StmtKind::Break | StmtKind::Continue => {
                if self.ctx().loop_depth == 0 {
                    let keyword = if matches!(stmt.kind, StmtKind::Break) {
                        "break"
                    } else {
                        "continue"
                    };
                    self.reporter.error(
                        stmt.span,
                        format!("'{keyword}' statement not in loop statement"),
                    );
                }
            }
            StmtKind::Block(block) => self.check_block(block),
            StmtKind::Empty => {}
        }
    }

    /// A sub-statement gets its own scope, like a block
    fn check_nested(&mut self, stmt: &Stmt) {
        self.push_scope();
        self.check_stmt(stmt);
        self.pop_scope();
    }

    fn check_loop_body(&mut self, body: &Stmt) {
        self.ctx().loop_depth += 1;
        self.check_nested(body);
        self.ctx().loop_depth -= 1;
    }

    fn check_condition(&mut self, cond: &Expr) {
        if self.check_expr(cond).is_void() {
            self.reporter.error(
                cond.span,
                "statement requires expression of scalar type ('void' invalid)",
            );
        }
    }

    fn check_return(&mut self, value: Option<&Expr>, span: Span) {
        let value_ty = value.map(|v| (self.check_expr(v), v.span));
        let is_cxx = self.is_cxx();
        let ctx = self.ctx();
        let (name, ret) = (ctx.name.clone(), ctx.ret);
        match value_ty {
            Some((ty, value_span)) if ret.is_void() && !ty.is_void() => {
                self.reporter.error(
                    value_span,
                    format!("void function '{name}' should not return a value"),
                );
            }
            Some((ty, value_span)) if !ret.is_void() && ty.is_void() => {
                self.reporter.error(
                    value_span,
                    format!("returning 'void' from a function with incompatible result type '{ret}'"),
                );
            }
            None if !ret.is_void() => {
                let message = format!("non-void function '{name}' should return a value");
                if is_cxx {
                    self.reporter.error(span, message);
                } else {
                    self.reporter.warning(span, message);
                }
            }
            _ => {}
        }
    }

    // ==================== Expressions ====================

    fn check_expr(&mut self, expr: &Expr) -> CType {
        let ty = self.expr_kind_type(expr);
        self.semantics.expr_types.insert(expr.id, ty);
        ty
    }

    fn expr_kind_type(&mut self, expr: &Expr) -> CType {
        match &expr.kind {
            ExprKind::IntLit {
                value,
                suffix,
                decimal,
            } => self.int_literal_type(*value, *suffix, *decimal).unwrap_or_else(|| {
                self.reporter.error(
                    expr.span,
                    "integer literal is too large to be represented in any integer type",
                );
                CType::INT
            }),
            ExprKind::FloatLit { suffix, .. } => match suffix {
                FloatSuffix::None => CType::Double,
                FloatSuffix::F => CType::Float,
                FloatSuffix::L => {
                    self.reporter
                        .error(expr.span, "'long double' literals are not supported");
                    CType::Double
                }
            },
            ExprKind::CharLit(_) => {
                if self.is_cxx() {
                    CType::CHAR
                } else {
                    CType::INT
                }
            }
            ExprKind::BoolLit(_) => self.semantics.truth_type(),
            ExprKind::StringLit => {
                self.reporter
                    .error(expr.span, "string literals are not supported");
                CType::INT
            }
            ExprKind::Ident(ident) => {
                if let Some(id) = self.lookup_local(&ident.name) {
                    self.semantics.bindings.insert(expr.id, Binding::Local(id));
                    return self.semantics.locals[&id].ty;
                }
                if self.semantics.function_index(&ident.name).is_some() {
                    self.reporter.error(
                        expr.span,
                        format!(
                            "function '{}' can only be called; function values are not supported",
                            ident.name
                        ),
                    );
                } else {
                    self.reporter.error(
                        expr.span,
                        format!("use of undeclared identifier '{}'", ident.name),
                    );
                }
                CType::INT
            }
            ExprKind::Call { callee, args } => self.check_call(expr, callee, args),
            ExprKind::Cast { ty, expr: operand } => {
                let operand_ty = self.check_expr(operand);
                if operand_ty.is_void() && !ty.is_void() {
                    self.reporter.error(
                        operand.span,
                        "operand of type 'void' where arithmetic type is required",
                    );
                }
                *ty
            }
            ExprKind::SizeofType(ty) => {
                self.check_sizeof(*ty, expr.span);
                self.semantics.model.size_type()
            }
            ExprKind::SizeofExpr(operand) => {
                let ty = self.check_expr(operand);
                self.check_sizeof(ty, expr.span);
                self.semantics.model.size_type()
            }
            ExprKind::Unary { op, operand } => {
                let ty = self.check_expr(operand);
                if ty.is_void() || (*op == UnaryOp::BitNot && ty.is_floating()) {
                    self.reporter.error(
                        expr.span,
                        format!("invalid argument type '{ty}' to unary expression"),
                    );
                    return CType::INT;
                }
                match op {
                    UnaryOp::Not => self.semantics.truth_type(),
                    UnaryOp::Plus | UnaryOp::Neg | UnaryOp::BitNot => ty.promoted(),
                }
            }
            ExprKind::IncDec { target, .. } => {
                let ty = self.check_expr(target);
                self.check_assignable(target);
                if ty == CType::Bool {
                    self.reporter.error(
                        expr.span,
                        "incrementing or decrementing 'bool' is not supported",
                    );
                }
                ty
            }
            ExprKind::Binary { op, lhs, rhs } => self.check_binary(expr, *op, lhs, rhs),
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                self.check_condition(cond);
                let then_ty = self.check_expr(then_expr);
                let else_ty = self.check_expr(else_expr);
                match (then_ty.is_void(), else_ty.is_void()) {
                    (true, true) => CType::Void,
                    (false, false) => then_ty.common(else_ty, self.semantics.model),
                    _ => {
                        self.reporter.error(
                            expr.span,
                            format!(
                                "incompatible operand types ('{then_ty}' and '{else_ty}')"
                            ),
                        );
                        CType::INT
                    }
                }
            }
            ExprKind::Assign { op, target, value } => {
                let target_ty = self.check_expr(target);
                let value_ty = self.check_expr(value);
                self.check_assignable(target);
                if value_ty.is_void() {
                    self.reporter.error(
                        value.span,
                        format!("assigning to '{target_ty}' from incompatible type 'void'"),
                    );
                    return target_ty;
                }
                if let Some(op) = op {
                    if let Some(op_ty) =
                        self.binary_operation_type(*op, target_ty, value_ty, expr.span)
                    {
                        self.semantics.op_types.insert(expr.id, op_ty);
                    }
                }
                target_ty
            }
        }
    }

    fn check_sizeof(&mut self, ty: CType, span: Span) {
        if ty.is_void() {
            self.reporter.error(
                span,
                "invalid application of 'sizeof' to an incomplete type 'void'",
            );
        }
    }

    fn check_call(&mut self, expr: &Expr, callee: &Ident, args: &[Expr]) -> CType {
        let arg_types: Vec<(CType, Span)> =
            args.iter().map(|a| (self.check_expr(a), a.span)).collect();

        if let Some(id) = self.lookup_local(&callee.name) {
            let ty = self.semantics.locals[&id].ty;
            self.reporter.error(
                callee.span,
                format!("called object type '{ty}' is not a function"),
            );
            return CType::INT;
        }
        let Some(index) = self.semantics.function_index(&callee.name) else {
            let message = if self.is_cxx() {
                format!("use of undeclared identifier '{}'", callee.name)
            } else {
                format!(
                    "call to undeclared function '{}'; ISO C99 and later do not support implicit function declarations",
                    callee.name
                )
            };
            self.reporter.error(callee.span, message);
            return CType::INT;
        };

        self.semantics.bindings.insert(expr.id, Binding::Function(index));
        let function = &mut self.semantics.functions[index];
        function.used = true;
        let (params, ret, declared) = (function.params.clone(), function.ret, function.span);

        if params.len() != args.len() {
            let which = if args.len() > params.len() {
                "too many"
            } else {
                "too few"
            };
            self.reporter.error(
                expr.span,
                format!(
                    "{which} arguments to function call, expected {}, have {}",
                    params.len(),
                    args.len()
                ),
            );
            self.reporter
                .note(declared, format!("'{}' declared here", callee.name));
            return ret;
        }
        for ((ty, span), param) in arg_types.into_iter().zip(params) {
            if ty.is_void() {
                self.reporter.error(
                    span,
                    format!("passing 'void' to parameter of incompatible type '{param}'"),
                );
            }
        }
        ret
    }

    fn check_assignable(&mut self, target: &Expr) {
        let binding = self.semantics.bindings.get(&target.id).copied();
        match (&target.kind, binding) {
            (ExprKind::Ident(ident), Some(Binding::Local(id))) => {
                let local = self.semantics.locals[&id];
                if local.is_const {
                    self.reporter.error(
                        target.span,
                        format!(
                            "cannot assign to variable '{}' with const-qualified type 'const {}'",
                            ident.name, local.ty
                        ),
                    );
                }
            }
            // Undeclared names were already reported
            (ExprKind::Ident(_), None) => {}
            _ => self
                .reporter
                .error(target.span, "expression is not assignable"),
        }
    }

    fn check_binary(&mut self, expr: &Expr, op: BinOp, lhs: &Expr, rhs: &Expr) -> CType {
        let lhs_ty = self.check_expr(lhs);
        let rhs_ty = self.check_expr(rhs);

        if op.is_logical() {
            if lhs_ty.is_void() || rhs_ty.is_void() {
                self.invalid_operands(expr.span, lhs_ty, rhs_ty);
            }
            return self.semantics.truth_type();
        }

        let Some(op_ty) = self.binary_operation_type(op, lhs_ty, rhs_ty, expr.span) else {
            return CType::INT;
        };
        self.semantics.op_types.insert(expr.id, op_ty);
        if op.is_comparison() {
            self.semantics.truth_type()
        } else {
            op_ty
        }
    }

    /// Type an arithmetic, bitwise, shift or comparison operator computes in
    fn binary_operation_type(
        &mut self,
        op: BinOp,
        lhs: CType,
        rhs: CType,
        span: Span,
    ) -> Option<CType> {
        let invalid = lhs.is_void()
            || rhs.is_void()
            || (op.is_integer_only() && (lhs.is_floating() || rhs.is_floating()));
        if invalid {
            self.invalid_operands(span, lhs, rhs);
            return None;
        }
        if op.is_shift() {
            Some(lhs.promoted())
        } else {
            Some(lhs.common(rhs, self.semantics.model))
        }
    }

    fn invalid_operands(&mut self, span: Span, lhs: CType, rhs: CType) {
        self.reporter.error(
            span,
            format!("invalid operands to binary expression ('{lhs}' and '{rhs}')"),
        );
    }

    fn int_literal_type(&self, value: u64, suffix: IntSuffix, decimal: bool) -> Option<CType> {
        let ranks: &[IntRank] = match suffix.longs {
            0 => &[IntRank::Int, IntRank::Long, IntRank::LongLong],
            1 => &[IntRank::Long, IntRank::LongLong],
            _ => &[IntRank::LongLong],
        };
        let model = self.semantics.model;
        let fits = |ty: CType| {
            let bits = ty.bits(model);
            if ty.is_signed() {
                value <= (1u64 << (bits - 1)) - 1
            } else {
                bits >= 64 || value < (1u64 << bits)
            }
        };
        ranks.iter().find_map(|&rank| {
            let signed = CType::Integer { rank, signed: true };
            let unsigned = CType::Integer {
                rank,
                signed: false,
            };
            if suffix.unsigned {
                fits(unsigned).then_some(unsigned)
            } else if fits(signed) {
                Some(signed)
            } else if !decimal && fits(unsigned) {
                Some(unsigned)
            } else {
                None
            }
        })
    }
}

/// Does control never fall off the end of this block?
///
/// Conservative: loops only count when their condition is absent or a
/// nonzero literal and the body has no `break`.
fn block_always_returns(block: &Block) -> bool {
    block.stmts.iter().any(always_returns)
}

fn always_returns(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) => true,
        StmtKind::Block(block) => block_always_returns(block),
        StmtKind::If {
            then_branch,
            else_branch: Some(else_branch),
            ..
        } => always_returns(then_branch) && always_returns(else_branch),
        StmtKind::While { cond, body } => is_true_literal(cond) && !breaks_out(body),
        StmtKind::DoWhile { body, cond } => {
            always_returns(body) || (is_true_literal(cond) && !breaks_out(body))
        }
        StmtKind::For { cond, body, .. } => {
            cond.as_ref().map_or(true, is_true_literal) && !breaks_out(body)
        }
        _ => false,
    }
}

fn is_true_literal(expr: &Expr) -> bool {
    match expr.kind {
        ExprKind::IntLit { value, .. } => value != 0,
        ExprKind::BoolLit(value) => value,
        _ => false,
    }
}

/// Does a `break` in this statement leave the enclosing loop?
fn breaks_out(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Break => true,
        StmtKind::Block(block) => block.stmts.iter().any(breaks_out),
        StmtKind::If {
            then_branch,
            else_branch,
            ..
        } => breaks_out(then_branch) || else_branch.as_deref().is_some_and(breaks_out),
        // A break inside a nested loop only leaves that loop
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{DiagnosticSink, Severity};
    use crate::parser::Parser;
    use crate::source::{CStandard, CxxStandard, SourceMap, INPUT_NAME};

    const C: Language = Language::C(CStandard::C11);
    const CXX: Language = Language::Cxx(CxxStandard::Cxx17);

    fn check(source: &str, language: Language) -> (Semantics, DiagnosticSink) {
        let unit = Parser::parse_source(source, language).expect("source should parse");
        let mut sources = SourceMap::new();
        sources.add(INPUT_NAME, source);
        let mut sink = DiagnosticSink::new();
        let semantics = {
            let mut reporter = DiagnosticReporter::new(&mut sink, &sources);
            Checker::new(language, DataModel::LP64, &mut reporter).check(&unit)
        };
        (semantics, sink)
    }

    fn messages(sink: &DiagnosticSink, severity: Severity) -> Vec<&str> {
        sink.iter()
            .filter(|e| e.severity == severity)
            .map(|e| e.message.as_str())
            .collect()
    }

    #[test]
    fn symbols_follow_language_linkage() {
        let source = "extern \"C\" double sin(double);
            int add(int a, int b) { return a + b; }
            double doSin(double x) { return sin(x); }
            int main() { return add(1, 2); }";
        let (semantics, sink) = check(source, CXX);
        assert!(sink.is_empty(), "{sink}");
        assert_eq!(semantics.function("sin").unwrap().symbol, "sin");
        assert_eq!(semantics.function("add").unwrap().symbol, "_Z3addii");
        assert_eq!(semantics.function("doSin").unwrap().symbol, "_Z5doSind");
        assert_eq!(semantics.function("main").unwrap().symbol, "main");
        assert!(semantics.function("sin").unwrap().used);
        assert!(!semantics.function("doSin").unwrap().used);
    }

    #[test]
    fn c_names_are_not_mangled() {
        let (semantics, _) = check("static int helper(void) { return 1; }", C);
        let helper = semantics.function("helper").unwrap();
        assert_eq!(helper.symbol, "helper");
        assert_eq!(helper.linkage, Linkage::Internal);
    }

    #[test]
    fn usual_arithmetic_conversions_are_recorded() {
        let source = "double f(int a, double b) { return a * b; }
            unsigned g(unsigned a, int b) { return a + b; }";
        let (semantics, sink) = check(source, C);
        assert!(sink.is_empty(), "{sink}");
        let mut types: Vec<CType> = semantics.op_types.values().copied().collect();
        types.sort_by_key(|t| t.name());
        assert_eq!(types, [CType::Double, CType::UINT]);
    }

    #[test]
    fn comparison_type_depends_on_language() {
        let source = "int f(int a) { return a < 3; }";
        let (c, _) = check(source, C);
        let (cxx, _) = check(source, CXX);
        assert!(!c.expr_types.values().any(|&t| t == CType::Bool));
        assert!(cxx.expr_types.values().any(|&t| t == CType::Bool));
    }

    #[test]
    fn literal_types() {
        let source =
            "long long f(void) { return 2147483647 + 2147483648 + 0xFFFFFFFF + 1u + 'a'; }";
        let (semantics, sink) = check(source, C);
        assert!(sink.is_empty(), "{sink}");
        let names: Vec<&str> = semantics.expr_types.values().map(|t| t.name()).collect();
        assert!(names.contains(&"long"));
        assert!(names.contains(&"unsigned int"));
    }

    #[test]
    fn reports_undeclared_identifier() {
        let (_, sink) = check("int f(void) { return missing_value; }", C);
        assert_eq!(
            messages(&sink, Severity::Error),
            ["use of undeclared identifier 'missing_value'"]
        );
    }

    #[test]
    fn reports_implicit_declaration_in_c() {
        let (_, sink) = check("int f(void) { return missing(); }", C);
        assert!(messages(&sink, Severity::Error)[0].starts_with("call to undeclared function 'missing'"));
    }

    #[test]
    fn reports_argument_count() {
        let (_, sink) = check("int g(int a); int f(void) { return g(1, 2); }", C);
        assert_eq!(
            messages(&sink, Severity::Error),
            ["too many arguments to function call, expected 1, have 2"]
        );
        assert_eq!(messages(&sink, Severity::Note), ["'g' declared here"]);
    }

    #[test]
    fn reports_conflicting_types_with_note() {
        let (_, sink) = check("int f(int a); double f(int a);", C);
        assert_eq!(messages(&sink, Severity::Error), ["conflicting types for 'f'"]);
        assert_eq!(
            messages(&sink, Severity::Note),
            ["previous declaration is here"]
        );

        let (_, sink) = check("int f(int a); int f(double a);", CXX);
        assert_eq!(
            messages(&sink, Severity::Error),
            ["overloading 'f' is not supported"]
        );
    }

    #[test]
    fn reports_redefinition() {
        let (_, sink) = check("int f(void) { return 1; } int f(void) { return 2; }", C);
        assert_eq!(messages(&sink, Severity::Error), ["redefinition of 'f'"]);
    }

    #[test]
    fn reports_const_and_non_lvalue_assignment() {
        let source = "int f(const int a) { int b = 1; a = 2; (b + 1) = 3; return b; }";
        let (_, sink) = check(source, C);
        assert_eq!(
            messages(&sink, Severity::Error),
            [
                "cannot assign to variable 'a' with const-qualified type 'const int'",
                "expression is not assignable"
            ]
        );
    }

    #[test]
    fn reports_void_misuse() {
        let source = "void v(void); int f(void) { int x = v(); return x + v(); }";
        let (_, sink) = check(source, C);
        let errors = messages(&sink, Severity::Error);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("initializing 'int'"));
        assert!(errors[1].starts_with("invalid operands"));
    }

    #[test]
    fn reports_float_operands_to_integer_operators() {
        let (_, sink) = check("double f(double a) { return a % 2; }", C);
        assert_eq!(
            messages(&sink, Severity::Error),
            ["invalid operands to binary expression ('double' and 'int')"]
        );
    }

    #[test]
    fn return_without_value() {
        let source = "int f(int a) { if (a) return; return 1; }";
        let (_, c) = check(source, C);
        assert_eq!(c.count(Severity::Warning), 1);
        let (_, cxx) = check(source, CXX);
        assert_eq!(cxx.count(Severity::Error), 1);
    }

    #[test]
    fn main_must_return_int() {
        let (_, sink) = check("void main(void) {}", C);
        assert_eq!(messages(&sink, Severity::Error), ["'main' must return 'int'"]);
    }

    #[test]
    fn break_outside_loop() {
        let (_, sink) = check("int f(void) { break; return 0; }", C);
        assert_eq!(
            messages(&sink, Severity::Error),
            ["'break' statement not in loop statement"]
        );
    }

    #[test]
    fn missing_return_warns() {
        let (_, sink) = check("int f(int a) { if (a) return 1; }", C);
        assert_eq!(
            messages(&sink, Severity::Warning),
            ["non-void function does not return a value in all control paths"]
        );

        let source = "int g(int a) { for (;;) { if (a) return 1; } }
            int h(int a) { if (a) return 1; else return 2; }
            int main(void) { }";
        let (_, sink) = check(source, C);
        assert!(sink.is_empty(), "{sink}");
    }

    #[test]
    fn scopes_shadow_and_end() {
        let source = "int f(int a) { { int a = 2; a++; } int b = a; { int b = 3; } return b; }";
        let (semantics, sink) = check(source, C);
        assert!(sink.is_empty(), "{sink}");
        assert_eq!(semantics.locals.len(), 4);

        let (_, sink) = check("int f(void) { { int x = 1; } return x; }", C);
        assert_eq!(sink.count(Severity::Error), 1);
    }

    #[test]
    fn duplicate_local_is_an_error() {
        let (_, sink) = check("int f(int a) { int a = 1; return a; }", C);
        assert_eq!(messages(&sink, Severity::Error), ["redefinition of 'a'"]);
    }

    #[test]
    fn static_function_must_be_defined_when_called() {
        let (_, sink) = check("static int g(int); int f(void) { return g(1); }", C);
        assert_eq!(
            messages(&sink, Severity::Error),
            ["function 'g' has internal linkage but is not defined"]
        );
        let (_, sink) = check("static int g(int); int f(void) { return 1; }", C);
        assert!(sink.is_empty(), "{sink}");
    }
}
