//! Lowering of a single function body

use std::collections::HashMap;

use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::{
    types, Block, ExtFuncData, ExternalName, FuncRef, InstBuilder, UserExternalName, Value,
};
use cranelift_frontend::{FunctionBuilder, Variable};

use crate::ast::{
    BinOp, Block as BodyBlock, CType, DataModel, DeclId, Expr, ExprKind, FunctionDecl, IncDec,
    Stmt, StmtKind, UnaryOp,
};
use crate::ir::IrModule;
use crate::sema::{Binding, Semantics};

use super::clif_type;

/// Jump targets of the innermost enclosing loop
#[derive(Clone, Copy)]
struct LoopTargets {
    continue_to: Block,
    break_to: Block,
}

/// Internal state for compiling a single function
pub(super) struct FunctionCompiler<'a, 'b> {
    builder: &'a mut FunctionBuilder<'b>,
    semantics: &'a Semantics,
    module: &'a IrModule,
    /// Declaration slot of each function, by function index
    slots: &'a [Option<u32>],
    model: DataModel,
    ret: CType,

    /// Callees imported into this function so far, by declaration slot
    callees: HashMap<u32, FuncRef>,
    loops: Vec<LoopTargets>,

    /// Whether the current block has a terminator (jump/return)
    block_terminated: bool,
}

impl<'a, 'b> FunctionCompiler<'a, 'b> {
    pub(super) fn new(
        builder: &'a mut FunctionBuilder<'b>,
        semantics: &'a Semantics,
        module: &'a IrModule,
        slots: &'a [Option<u32>],
        ret: CType,
    ) -> Self {
        Self {
            builder,
            semantics,
            module,
            slots,
            model: semantics.model,
            ret,
            callees: HashMap::new(),
            loops: Vec::new(),
            block_terminated: false,
        }
    }

    /// Compile the function definition
    pub(super) fn compile(&mut self, decl: &FunctionDecl) {
        let Some(body) = &decl.body else { return };

        let entry = self.builder.create_block();
        self.builder.append_block_params_for_function_params(entry);
        self.builder.switch_to_block(entry);

        let params: Vec<Value> = self.builder.block_params(entry).to_vec();
        for (param, value) in decl.params.iter().zip(params) {
            let var = self.declare_local(param.id, param.ty);
            self.builder.def_var(var, value);
        }

        self.compile_block(body);

        // Falling off the end returns zero (`main` returns 0)
        if !self.block_terminated {
            if self.ret.is_void() {
                self.builder.ins().return_(&[]);
            } else {
                let zero = self.zero(self.ret);
                self.builder.ins().return_(&[zero]);
            }
            self.block_terminated = true;
        }

        self.builder.seal_all_blocks();
    }

    // ==================== Blocks ====================

    fn declare_local(&mut self, id: DeclId, ty: CType) -> Variable {
        let var = Variable::from_u32(id.0);
        self.builder.declare_var(var, clif_type(ty, self.model));
        var
    }

    fn switch_to(&mut self, block: Block) {
        self.builder.switch_to_block(block);
        self.block_terminated = false;
    }

    /// Jump to `target` unless the current block already ended
    fn jump_to(&mut self, target: Block) {
        if !self.block_terminated {
            self.builder.ins().jump(target, &[]);
            self.block_terminated = true;
        }
    }

    /// Continue in a block nothing branches to (code after return/break)
    fn start_unreachable(&mut self) {
        self.block_terminated = true;
        let block = self.builder.create_block();
        self.switch_to(block);
    }

    // ==================== Statements ====================

    fn compile_block(&mut self, block: &BodyBlock) {
        for stmt in &block.stmts {
            self.compile_stmt(stmt);
        }
    }

    fn compile_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Decl(decls) => {
                for decl in decls {
                    // The initializer sees the enclosing scope, so evaluate it first
                    let value = match &decl.init {
                        Some(init) => self.rvalue(init, decl.ty),
                        None => self.zero(decl.ty),
                    };
                    let var = self.declare_local(decl.id, decl.ty);
                    self.builder.def_var(var, value);
                }
            }
            StmtKind::Expr(expr) => {
                self.compile_expr(expr);
            }
            StmtKind::Return(value) => self.compile_return(value.as_ref()),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.compile_if(cond, then_branch, else_branch.as_deref()),
            StmtKind::While { cond, body } => self.compile_while(cond, body),
            StmtKind::DoWhile { body, cond } => self.compile_do_while(body, cond),
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => self.compile_for(init.as_deref(), cond.as_ref(), step.as_ref(), body),
            StmtKind::Break | StmtKind::Continue => {
                if let Some(targets) = self.loops.last().copied() {
                    let target = if matches!(stmt.kind, StmtKind::Break) {
                        targets.break_to
                    } else {
                        targets.continue_to
                    };
                    self.jump_to(target);
                }
                self.start_unreachable();
            }
            StmtKind::Block(block) => self.compile_block(block),
            StmtKind::Empty => {}
        }
    }

    fn compile_return(&mut self, value: Option<&Expr>) {
        let ret = self.ret;
        match value {
            Some(expr) if !ret.is_void() => {
                let value = self.rvalue(expr, ret);
                self.builder.ins().return_(&[value]);
            }
            Some(expr) => {
                self.compile_expr(expr);
                self.builder.ins().return_(&[]);
            }
            None if ret.is_void() => {
                self.builder.ins().return_(&[]);
            }
            None => {
                let zero = self.zero(ret);
                self.builder.ins().return_(&[zero]);
            }
        }
        self.start_unreachable();
    }

    fn compile_if(&mut self, cond: &Expr, then_branch: &Stmt, else_branch: Option<&Stmt>) {
        let then_block = self.builder.create_block();
        let merge_block = self.builder.create_block();
        let else_block = if else_branch.is_some() {
            self.builder.create_block()
        } else {
            merge_block
        };

        let flag = self.condition(cond);
        self.builder
            .ins()
            .brif(flag, then_block, &[], else_block, &[]);

        self.switch_to(then_block);
        self.compile_stmt(then_branch);
        self.jump_to(merge_block);

        if let Some(else_branch) = else_branch {
            self.switch_to(else_block);
            self.compile_stmt(else_branch);
            self.jump_to(merge_block);
        }

        self.switch_to(merge_block);
    }

    fn compile_while(&mut self, cond: &Expr, body: &Stmt) {
        let header = self.builder.create_block();
        let body_block = self.builder.create_block();
        let exit = self.builder.create_block();

        self.jump_to(header);
        self.switch_to(header);
        let flag = self.condition(cond);
        self.builder.ins().brif(flag, body_block, &[], exit, &[]);

        self.switch_to(body_block);
        self.compile_loop_body(body, header, exit);
        self.jump_to(header);

        self.switch_to(exit);
    }

    fn compile_do_while(&mut self, body: &Stmt, cond: &Expr) {
        let body_block = self.builder.create_block();
        let cond_block = self.builder.create_block();
        let exit = self.builder.create_block();

        self.jump_to(body_block);
        self.switch_to(body_block);
        self.compile_loop_body(body, cond_block, exit);
        self.jump_to(cond_block);

        self.switch_to(cond_block);
        let flag = self.condition(cond);
        self.builder.ins().brif(flag, body_block, &[], exit, &[]);

        self.switch_to(exit);
    }

    fn compile_for(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        step: Option<&Expr>,
        body: &Stmt,
    ) {
        if let Some(init) = init {
            self.compile_stmt(init);
        }

        let header = self.builder.create_block();
        let body_block = self.builder.create_block();
        let step_block = self.builder.create_block();
        let exit = self.builder.create_block();

        self.jump_to(header);
        self.switch_to(header);
        match cond {
            Some(cond) => {
                let flag = self.condition(cond);
                self.builder.ins().brif(flag, body_block, &[], exit, &[]);
                self.block_terminated = true;
            }
            None => self.jump_to(body_block),
        }

        self.switch_to(body_block);
        self.compile_loop_body(body, step_block, exit);
        self.jump_to(step_block);

        self.switch_to(step_block);
        if let Some(step) = step {
            self.compile_expr(step);
        }
        self.jump_to(header);

        self.switch_to(exit);
    }

    fn compile_loop_body(&mut self, body: &Stmt, continue_to: Block, break_to: Block) {
        self.loops.push(LoopTargets {
            continue_to,
            break_to,
        });
        self.compile_stmt(body);
        self.loops.pop();
    }

    // ==================== Expressions ====================

    fn expr_type(&self, expr: &Expr) -> CType {
        self.semantics.expr_type(expr.id)
    }

    /// Compile an expression; `None` for `void` results
    fn compile_expr(&mut self, expr: &Expr) -> Option<Value> {
        let ty = self.expr_type(expr);
        match &expr.kind {
            ExprKind::IntLit { value, .. } => Some(self.iconst(ty, *value as i64)),
            ExprKind::FloatLit { value, .. } => Some(self.fconst(ty, *value)),
            // Plain char is signed
            ExprKind::CharLit(byte) => Some(self.iconst(ty, i64::from(*byte as i8))),
            ExprKind::BoolLit(value) => Some(self.iconst(ty, i64::from(*value))),
            ExprKind::StringLit => Some(self.zero(ty)),
            ExprKind::Ident(_) => match self.semantics.bindings.get(&expr.id).copied() {
                Some(Binding::Local(id)) => Some(self.builder.use_var(Variable::from_u32(id.0))),
                _ => Some(self.zero(ty)),
            },
            ExprKind::Call { args, .. } => self.compile_call(expr, args),
            ExprKind::Cast {
                ty: target,
                expr: operand,
            } => {
                if target.is_void() {
                    self.compile_expr(operand);
                    return None;
                }
                Some(self.rvalue(operand, *target))
            }
            ExprKind::SizeofType(operand) => {
                Some(self.iconst(ty, operand.size_bytes(self.model) as i64))
            }
            // The operand is not evaluated
            ExprKind::SizeofExpr(operand) => {
                let operand_ty = self.expr_type(operand);
                Some(self.iconst(ty, operand_ty.size_bytes(self.model) as i64))
            }
            ExprKind::Unary { op, operand } => Some(self.compile_unary(*op, operand, ty)),
            ExprKind::IncDec { op, target } => Some(self.compile_inc_dec(*op, target, ty)),
            ExprKind::Binary { op, lhs, rhs } => Some(self.compile_binary(expr, *op, lhs, rhs)),
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => self.compile_conditional(cond, then_expr, else_expr, ty),
            ExprKind::Assign { op, target, value } => {
                Some(self.compile_assign(expr, *op, target, value, ty))
            }
        }
    }

    /// Value of a non-void expression in its own type
    fn value(&mut self, expr: &Expr) -> Value {
        match self.compile_expr(expr) {
            Some(value) => value,
            None => self.zero(CType::INT),
        }
    }

    /// Value of an expression converted to `to`
    fn rvalue(&mut self, expr: &Expr, to: CType) -> Value {
        let from = self.expr_type(expr);
        let value = self.value(expr);
        self.convert(value, from, to)
    }

    /// A value `brif` can test directly
    fn condition(&mut self, expr: &Expr) -> Value {
        let ty = self.expr_type(expr);
        let value = self.value(expr);
        if ty.is_floating() {
            self.is_nonzero(value, ty)
        } else {
            value
        }
    }

    fn compile_unary(&mut self, op: UnaryOp, operand: &Expr, ty: CType) -> Value {
        match op {
            UnaryOp::Plus => self.rvalue(operand, ty),
            UnaryOp::Neg => {
                let value = self.rvalue(operand, ty);
                if ty.is_floating() {
                    self.builder.ins().fneg(value)
                } else {
                    self.builder.ins().ineg(value)
                }
            }
            UnaryOp::BitNot => {
                let value = self.rvalue(operand, ty);
                self.builder.ins().bnot(value)
            }
            UnaryOp::Not => {
                let operand_ty = self.expr_type(operand);
                let value = self.value(operand);
                let flag = self.is_zero(value, operand_ty);
                self.convert(flag, CType::Bool, ty)
            }
        }
    }

    fn compile_inc_dec(&mut self, op: IncDec, target: &Expr, ty: CType) -> Value {
        let Some(Binding::Local(id)) = self.semantics.bindings.get(&target.id).copied() else {
            return self.zero(ty);
        };
        let var = Variable::from_u32(id.0);
        let current = self.builder.use_var(var);
        let updated = if ty.is_floating() {
            let one = self.fconst(ty, 1.0);
            if op.is_increment() {
                self.builder.ins().fadd(current, one)
            } else {
                self.builder.ins().fsub(current, one)
            }
        } else {
            let delta = if op.is_increment() { 1 } else { -1 };
            self.builder.ins().iadd_imm(current, delta)
        };
        self.builder.def_var(var, updated);
        if op.is_prefix() {
            updated
        } else {
            current
        }
    }

    fn compile_binary(&mut self, expr: &Expr, op: BinOp, lhs: &Expr, rhs: &Expr) -> Value {
        let ty = self.expr_type(expr);
        if op.is_logical() {
            return self.compile_logical(op, lhs, rhs, ty);
        }

        let op_ty = self.semantics.op_type(expr.id);
        let a = self.rvalue(lhs, op_ty);
        let b = self.rvalue(rhs, op_ty);
        if op.is_comparison() {
            let flag = self.compare(op, op_ty, a, b);
            return self.convert(flag, CType::Bool, ty);
        }
        self.arith(op, op_ty, a, b)
    }

    /// `&&` and `||`: the right operand only runs when it decides the result
    fn compile_logical(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, ty: CType) -> Value {
        let rhs_block = self.builder.create_block();
        let merge_block = self.builder.create_block();
        self.builder
            .append_block_param(merge_block, clif_type(ty, self.model));

        let flag = self.condition(lhs);
        let decided = self.iconst(ty, i64::from(op == BinOp::Or));
        if op == BinOp::And {
            self.builder
                .ins()
                .brif(flag, rhs_block, &[], merge_block, &[decided]);
        } else {
            self.builder
                .ins()
                .brif(flag, merge_block, &[decided], rhs_block, &[]);
        }

        self.switch_to(rhs_block);
        let rhs_ty = self.expr_type(rhs);
        let value = self.value(rhs);
        let rhs_flag = self.is_nonzero(value, rhs_ty);
        let result = self.convert(rhs_flag, CType::Bool, ty);
        self.builder.ins().jump(merge_block, &[result]);

        self.switch_to(merge_block);
        self.builder.block_params(merge_block)[0]
    }

    fn compile_conditional(
        &mut self,
        cond: &Expr,
        then_expr: &Expr,
        else_expr: &Expr,
        ty: CType,
    ) -> Option<Value> {
        let then_block = self.builder.create_block();
        let else_block = self.builder.create_block();
        let merge_block = self.builder.create_block();
        if !ty.is_void() {
            self.builder
                .append_block_param(merge_block, clif_type(ty, self.model));
        }

        let flag = self.condition(cond);
        self.builder
            .ins()
            .brif(flag, then_block, &[], else_block, &[]);

        for (block, arm) in [(then_block, then_expr), (else_block, else_expr)] {
            self.switch_to(block);
            if ty.is_void() {
                self.compile_expr(arm);
                self.builder.ins().jump(merge_block, &[]);
            } else {
                let value = self.rvalue(arm, ty);
                self.builder.ins().jump(merge_block, &[value]);
            }
        }

        self.switch_to(merge_block);
        if ty.is_void() {
            None
        } else {
            Some(self.builder.block_params(merge_block)[0])
        }
    }

    /// `a = b` and `a op= b`, which computes `a = (T)(a op b)`
    fn compile_assign(
        &mut self,
        expr: &Expr,
        op: Option<BinOp>,
        target: &Expr,
        value: &Expr,
        ty: CType,
    ) -> Value {
        let Some(Binding::Local(id)) = self.semantics.bindings.get(&target.id).copied() else {
            self.compile_expr(value);
            return self.zero(ty);
        };
        let var = Variable::from_u32(id.0);
        let updated = match op {
            None => self.rvalue(value, ty),
            Some(op) => {
                let op_ty = self.semantics.op_type(expr.id);
                let current = self.builder.use_var(var);
                let a = self.convert(current, ty, op_ty);
                let b = self.rvalue(value, op_ty);
                let result = self.arith(op, op_ty, a, b);
                self.convert(result, op_ty, ty)
            }
        };
        self.builder.def_var(var, updated);
        updated
    }

    fn compile_call(&mut self, expr: &Expr, args: &[Expr]) -> Option<Value> {
        let semantics = self.semantics;
        let Some(Binding::Function(index)) = semantics.bindings.get(&expr.id).copied() else {
            for arg in args {
                self.compile_expr(arg);
            }
            return None;
        };
        let info = &semantics.functions[index];
        let slot = self.slots.get(index).copied().flatten()?;

        let values: Vec<Value> = args
            .iter()
            .zip(&info.params)
            .map(|(arg, &param)| self.rvalue(arg, param))
            .collect();
        let callee = self.callee(slot);
        let call = self.builder.ins().call(callee, &values);
        if info.ret.is_void() {
            None
        } else {
            Some(self.builder.inst_results(call)[0])
        }
    }

    /// Import a declaration into this function, once
    fn callee(&mut self, slot: u32) -> FuncRef {
        if let Some(&func_ref) = self.callees.get(&slot) {
            return func_ref;
        }
        let signature = self.module.declarations()[slot as usize].signature.clone();
        let name = self
            .builder
            .func
            .declare_imported_user_function(UserExternalName::new(0, slot));
        let signature = self.builder.import_signature(signature);
        let func_ref = self.builder.import_function(ExtFuncData {
            name: ExternalName::user(name),
            signature,
            colocated: false,
        });
        self.callees.insert(slot, func_ref);
        func_ref
    }

    // ==================== Operators ====================

    fn arith(&mut self, op: BinOp, ty: CType, a: Value, b: Value) -> Value {
        let ins = self.builder.ins();
        if ty.is_floating() {
            return match op {
                BinOp::Add => ins.fadd(a, b),
                BinOp::Sub => ins.fsub(a, b),
                BinOp::Mul => ins.fmul(a, b),
                BinOp::Div => ins.fdiv(a, b),
                // Integer-only operators never reach here with float operands
                _ => a,
            };
        }
        let signed = ty.is_signed();
        match op {
            BinOp::Add => ins.iadd(a, b),
            BinOp::Sub => ins.isub(a, b),
            BinOp::Mul => ins.imul(a, b),
            BinOp::Div if signed => ins.sdiv(a, b),
            BinOp::Div => ins.udiv(a, b),
            BinOp::Rem if signed => ins.srem(a, b),
            BinOp::Rem => ins.urem(a, b),
            BinOp::Shl => ins.ishl(a, b),
            BinOp::Shr if signed => ins.sshr(a, b),
            BinOp::Shr => ins.ushr(a, b),
            BinOp::BitAnd => ins.band(a, b),
            BinOp::BitOr => ins.bor(a, b),
            BinOp::BitXor => ins.bxor(a, b),
            _ => a,
        }
    }

    /// Comparison as an `i8` flag
    fn compare(&mut self, op: BinOp, ty: CType, a: Value, b: Value) -> Value {
        if ty.is_floating() {
            let cc = match op {
                BinOp::Eq => FloatCC::Equal,
                BinOp::Ne => FloatCC::NotEqual,
                BinOp::Lt => FloatCC::LessThan,
                BinOp::Le => FloatCC::LessThanOrEqual,
                BinOp::Gt => FloatCC::GreaterThan,
                _ => FloatCC::GreaterThanOrEqual,
            };
            return self.builder.ins().fcmp(cc, a, b);
        }
        let signed = ty.is_signed();
        let cc = match (op, signed) {
            (BinOp::Eq, _) => IntCC::Equal,
            (BinOp::Ne, _) => IntCC::NotEqual,
            (BinOp::Lt, true) => IntCC::SignedLessThan,
            (BinOp::Lt, false) => IntCC::UnsignedLessThan,
            (BinOp::Le, true) => IntCC::SignedLessThanOrEqual,
            (BinOp::Le, false) => IntCC::UnsignedLessThanOrEqual,
            (BinOp::Gt, true) => IntCC::SignedGreaterThan,
            (BinOp::Gt, false) => IntCC::UnsignedGreaterThan,
            (_, true) => IntCC::SignedGreaterThanOrEqual,
            (_, false) => IntCC::UnsignedGreaterThanOrEqual,
        };
        self.builder.ins().icmp(cc, a, b)
    }

    // ==================== Conversions ====================

    fn is_nonzero(&mut self, value: Value, ty: CType) -> Value {
        if ty.is_floating() {
            let zero = self.zero(ty);
            self.builder.ins().fcmp(FloatCC::NotEqual, value, zero)
        } else {
            self.builder.ins().icmp_imm(IntCC::NotEqual, value, 0)
        }
    }

    fn is_zero(&mut self, value: Value, ty: CType) -> Value {
        if ty.is_floating() {
            let zero = self.zero(ty);
            self.builder.ins().fcmp(FloatCC::Equal, value, zero)
        } else {
            self.builder.ins().icmp_imm(IntCC::Equal, value, 0)
        }
    }

    /// C conversion of `value` from `from` to `to`
    fn convert(&mut self, value: Value, from: CType, to: CType) -> Value {
        if from == to || from.is_void() || to.is_void() {
            return value;
        }
        if to == CType::Bool {
            return self.is_nonzero(value, from);
        }

        let target = clif_type(to, self.model);
        match (from.is_floating(), to.is_floating()) {
            (true, true) => {
                if to == CType::Double {
                    self.builder.ins().fpromote(target, value)
                } else {
                    self.builder.ins().fdemote(target, value)
                }
            }
            (false, true) => {
                // Integer sources narrower than 32 bits are widened first
                let wide = if from.bits(self.model) < 32 {
                    self.resize(value, from, CType::INT)
                } else {
                    value
                };
                if from.is_signed() {
                    self.builder.ins().fcvt_from_sint(target, wide)
                } else {
                    self.builder.ins().fcvt_from_uint(target, wide)
                }
            }
            (true, false) => {
                let bits = to.bits(self.model);
                let wide = if bits > 32 { types::I64 } else { types::I32 };
                let converted = if to.is_signed() {
                    self.builder.ins().fcvt_to_sint_sat(wide, value)
                } else {
                    self.builder.ins().fcvt_to_uint_sat(wide, value)
                };
                if bits < 32 {
                    self.builder.ins().ireduce(target, converted)
                } else {
                    converted
                }
            }
            (false, false) => self.resize(value, from, to),
        }
    }

    /// Integer-to-integer conversion: extend by the source's signedness or truncate
    fn resize(&mut self, value: Value, from: CType, to: CType) -> Value {
        let (from_bits, to_bits) = (from.bits(self.model), to.bits(self.model));
        let target = clif_type(to, self.model);
        if to_bits > from_bits {
            if from.is_signed() {
                self.builder.ins().sextend(target, value)
            } else {
                self.builder.ins().uextend(target, value)
            }
        } else if to_bits < from_bits {
            self.builder.ins().ireduce(target, value)
        } else {
            value
        }
    }

    // ==================== Constants ====================

    /// Integer constant of type `ty`, truncated to its width
    fn iconst(&mut self, ty: CType, value: i64) -> Value {
        let clif = clif_type(ty, self.model);
        let bits = clif.bits();
        let imm = if bits >= 64 {
            value
        } else {
            value & ((1i64 << bits) - 1)
        };
        self.builder.ins().iconst(clif, imm)
    }

    fn fconst(&mut self, ty: CType, value: f64) -> Value {
        if ty == CType::Float {
            self.builder.ins().f32const(value as f32)
        } else {
            self.builder.ins().f64const(value)
        }
    }

    fn zero(&mut self, ty: CType) -> Value {
        if ty.is_floating() {
            self.fconst(ty, 0.0)
        } else {
            self.iconst(ty, 0)
        }
    }
}
