//! Cranelift IR generation
//!
//! Lowers a checked [`TranslationUnit`] into an [`IrModule`]. The
//! declaration table is laid out in [`Semantics::functions`] order:
//! definitions become exports (or locals for `static`), and functions that
//! are only declared become imports if some body calls them. Prototypes that
//! nothing calls are dropped so they never reach the linker.

mod function;

use cranelift_codegen::ir::{AbiParam, Function, Signature, UserFuncName};
use cranelift_codegen::isa::TargetIsa;
use cranelift_codegen::verify_function;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use thiserror::Error;

use crate::ast::{CType, DataModel, TranslationUnit};
use crate::ir::{DeclLinkage, IrModule};
use crate::sema::{FunctionInfo, Linkage, Semantics};

use function::FunctionCompiler;

/// Errors from IR generation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("function '{0}' has a body but no declaration slot")]
    MissingDeclaration(String),

    #[error("generated IR for '{function}' failed verification: {message}")]
    Verifier { function: String, message: String },
}

/// Cranelift type holding a value of `ty`
///
/// `void` has no representation; callers never ask for it.
pub(crate) fn clif_type(ty: CType, model: DataModel) -> cranelift_codegen::ir::Type {
    use cranelift_codegen::ir::types;
    match ty {
        CType::Float => types::F32,
        CType::Double => types::F64,
        _ => match ty.bits(model) {
            8 => types::I8,
            16 => types::I16,
            32 => types::I32,
            _ => types::I64,
        },
    }
}

/// ABI parameter for `ty`, with the extension C requires for narrow integers
fn abi_param(ty: CType, model: DataModel) -> AbiParam {
    let param = AbiParam::new(clif_type(ty, model));
    if ty.is_integral() && ty.bits(model) < 32 {
        if ty.is_signed() {
            param.sext()
        } else {
            param.uext()
        }
    } else {
        param
    }
}

/// Native signature of a function
pub(crate) fn signature_of(info: &FunctionInfo, model: DataModel, isa: &dyn TargetIsa) -> Signature {
    let mut sig = Signature::new(isa.default_call_conv());
    sig.params
        .extend(info.params.iter().map(|&ty| abi_param(ty, model)));
    if !info.ret.is_void() {
        sig.returns.push(abi_param(info.ret, model));
    }
    sig
}

/// Generate the IR module for a checked translation unit
///
/// The unit must have passed semantic analysis without errors.
pub fn generate(
    unit: &TranslationUnit,
    semantics: &Semantics,
    isa: &dyn TargetIsa,
    module_name: &str,
) -> Result<IrModule, CodegenError> {
    let model = semantics.model;
    let mut module = IrModule::new(module_name, isa.triple().to_string());

    // Declaration slot of each function, by function index
    let mut slots: Vec<Option<u32>> = Vec::with_capacity(semantics.functions.len());
    for info in &semantics.functions {
        let linkage = match (info.defined, info.linkage) {
            (true, Linkage::External) => Some(DeclLinkage::Export),
            (true, Linkage::Internal) => Some(DeclLinkage::Local),
            (false, _) if info.used => Some(DeclLinkage::Import),
            (false, _) => None,
        };
        slots.push(linkage.map(|linkage| {
            module.declare(info.symbol.clone(), linkage, signature_of(info, model, isa))
        }));
    }

    let mut builder_ctx = FunctionBuilderContext::new();
    for decl in unit.definitions() {
        let name = decl.name.name.as_str();
        let slot = semantics
            .function_index(name)
            .and_then(|index| slots[index])
            .ok_or_else(|| CodegenError::MissingDeclaration(name.to_string()))?;
        let signature = module
            .declaration(slot)
            .map(|d| d.signature.clone())
            .ok_or_else(|| CodegenError::MissingDeclaration(name.to_string()))?;

        let mut func = Function::with_name_signature(UserFuncName::user(0, slot), signature);
        {
            let mut builder = FunctionBuilder::new(&mut func, &mut builder_ctx);
            FunctionCompiler::new(&mut builder, semantics, &module, &slots, decl.ret).compile(decl);
            builder.finalize();
        }

        verify_function(&func, isa).map_err(|errors| CodegenError::Verifier {
            function: name.to_string(),
            message: errors.to_string(),
        })?;
        module.add_function(func);
    }

    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{DiagnosticReporter, DiagnosticSink};
    use crate::parser::Parser;
    use crate::sema::Checker;
    use crate::source::{CStandard, CxxStandard, Language, SourceMap};
    use crate::options::OptLevel;
    use crate::target::target_isa;

    fn lower(source: &str, language: Language) -> IrModule {
        let unit = Parser::parse_source(source, language).unwrap();
        let isa = target_isa(None, OptLevel::None).unwrap();
        let model = DataModel::for_target(&isa.triple().to_string(), isa.pointer_bits());
        let sources = SourceMap::new();
        let mut sink = DiagnosticSink::new();
        let semantics = {
            let mut reporter = DiagnosticReporter::new(&mut sink, &sources);
            Checker::new(language, model, &mut reporter).check(&unit)
        };
        assert!(!sink.has_error(), "{sink}");
        generate(&unit, &semantics, &*isa, "test").unwrap()
    }

    fn c(source: &str) -> IrModule {
        lower(source, Language::C(CStandard::C17))
    }

    fn clif(module: &IrModule) -> String {
        module
            .functions()
            .iter()
            .map(|f| f.display().to_string())
            .collect()
    }

    #[test]
    fn declaration_table_follows_first_declaration_order() {
        let module = c("double sin(double);\n\
             double cos(double);\n\
             static int helper(int x) { return x; }\n\
             double wave(double x) { return sin(x) + helper(1); }\n");
        let table: Vec<(&str, DeclLinkage)> = module
            .declarations()
            .iter()
            .map(|d| (d.name.as_str(), d.linkage))
            .collect();
        // cos is never called, so it is not declared at all
        assert_eq!(
            table,
            [
                ("sin", DeclLinkage::Import),
                ("helper", DeclLinkage::Local),
                ("wave", DeclLinkage::Export),
            ]
        );
        assert_eq!(module.functions().len(), 2);
    }

    #[test]
    fn cxx_symbols_are_mangled() {
        let module = lower(
            "int add(int a, int b) { return a + b; }\n\
             extern \"C\" int plain(int a) { return add(a, a); }\n",
            Language::Cxx(CxxStandard::Cxx17),
        );
        assert_eq!(module.find("_Z3addii"), Some(0));
        assert_eq!(module.find("plain"), Some(1));
    }

    #[test]
    fn signedness_selects_instructions() {
        let text = clif(&c("int sdiv(int a, int b) { return a / b; }\n\
             unsigned udiv(unsigned a, unsigned b) { return a / b; }\n\
             int sshr(int a) { return a >> 1; }\n\
             unsigned ushr(unsigned a) { return a >> 1; }\n"));
        assert!(text.contains("sdiv"));
        assert!(text.contains("udiv"));
        assert!(text.contains("sshr"));
        assert!(text.contains("ushr"));
    }

    #[test]
    fn narrow_integers_are_extended_at_the_abi() {
        let module = c("signed char f(unsigned char c, short s) { return c + s; }\n");
        let sig = &module.declarations()[0].signature;
        assert_eq!(sig.params[0].extension, cranelift_codegen::ir::ArgumentExtension::Uext);
        assert_eq!(sig.params[1].extension, cranelift_codegen::ir::ArgumentExtension::Sext);
        assert_eq!(sig.returns[0].extension, cranelift_codegen::ir::ArgumentExtension::Sext);
    }

    #[test]
    fn mixed_arithmetic_converts() {
        let text = clif(&c("double f(int a, float b) { return a * b; }\n"));
        assert!(text.contains("fcvt_from_sint"));
        assert!(text.contains("fpromote"));
    }

    #[test]
    fn control_flow_verifies() {
        // generate() verifies every function; reaching the assertion is the test
        let module = c("int collatz(int n) {\n\
                 int steps = 0;\n\
                 while (n != 1) {\n\
                     if (n % 2 == 0) n /= 2; else n = 3 * n + 1;\n\
                     steps++;\n\
                     if (steps > 1000) break;\n\
                 }\n\
                 return steps;\n\
             }\n\
             int sum(int n) {\n\
                 int total = 0;\n\
                 for (int i = 0; i < n; ++i) { if (i == 3) continue; total += i; }\n\
                 do { total--; } while (total > 100);\n\
                 return n > 0 && total ? total : -1;\n\
             }\n\
             void nothing(void) { return; }\n\
             int main(void) { }\n");
        assert_eq!(module.functions().len(), 4);
    }

    #[test]
    fn code_after_return_is_accepted() {
        let module = c("int f(int x) { return x; x = 2; return 3; }\n");
        assert_eq!(module.functions().len(), 1);
    }

    #[test]
    fn prototype_only_module_is_empty() {
        let module = c("int f(int);\n");
        assert!(module.declarations().is_empty());
        assert!(module.is_empty());
    }
}
