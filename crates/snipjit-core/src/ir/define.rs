//! Define an [`IrModule`] into a Cranelift `Module` (JIT or object)

use cranelift_module::{FuncId, Module};
use thiserror::Error;

use super::{function_index, IrModule};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DefineError {
    #[error("failed to declare '{name}': {message}")]
    Declare { name: String, message: String },

    #[error("'{name}' was assigned id {found}, expected {expected}")]
    OutOfOrder {
        name: String,
        expected: u32,
        found: u32,
    },

    #[error("function body names unknown declaration {0}")]
    UnknownDeclaration(u32),

    #[error("failed to compile '{name}': {message}")]
    Compile { name: String, message: String },
}

/// Result of defining a module
#[derive(Debug, Default)]
pub struct DefinedModule {
    /// Backend id of each declaration, by declaration index
    pub ids: Vec<FuncId>,
    /// `(symbol, disassembly)` per defined function, when requested
    pub assembly: Vec<(String, String)>,
}

/// Declare every entry of the declaration table, then compile every body
///
/// Declarations go into `module` in table order, so they must be the first
/// functions the module sees: body references use table indices as ids.
pub fn define_module<M: Module>(
    module: &mut M,
    ir: &IrModule,
    capture_assembly: bool,
) -> Result<DefinedModule, DefineError> {
    let mut defined = DefinedModule::default();

    for (index, decl) in ir.declarations().iter().enumerate() {
        let id = module
            .declare_function(&decl.name, decl.linkage.to_module(), &decl.signature)
            .map_err(|e| DefineError::Declare {
                name: decl.name.clone(),
                message: e.to_string(),
            })?;
        if id.as_u32() as usize != index {
            return Err(DefineError::OutOfOrder {
                name: decl.name.clone(),
                expected: index as u32,
                found: id.as_u32(),
            });
        }
        defined.ids.push(id);
    }

    let mut ctx = module.make_context();
    for function in ir.functions() {
        let index = function_index(function).unwrap_or(u32::MAX);
        let (Some(&id), Some(decl)) = (defined.ids.get(index as usize), ir.declaration(index))
        else {
            return Err(DefineError::UnknownDeclaration(index));
        };

        ctx.func = function.clone();
        ctx.set_disasm(capture_assembly);
        module
            .define_function(id, &mut ctx)
            .map_err(|e| DefineError::Compile {
                name: decl.name.clone(),
                message: e.to_string(),
            })?;
        if capture_assembly {
            if let Some(text) = ctx.compiled_code().and_then(|code| code.vcode.clone()) {
                defined.assembly.push((decl.name.clone(), text));
            }
        }
        module.clear_context(&mut ctx);
    }

    Ok(defined)
}
