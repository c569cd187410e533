//! IR modules handed from the front end to the JIT
//!
//! An [`IrModule`] is a set of Cranelift functions plus an ordered
//! declaration table. Function bodies refer to callees (and name themselves)
//! with `UserExternalName { namespace: 0, index }`, where `index` is a slot
//! in that table. The same numbering is used for the ids a
//! `cranelift_module::Module` hands out, so a module can be defined into a
//! JIT or object backend without renaming anything.
//!
//! `IrModule` is deliberately not `Clone`: it moves from the compilation
//! result into exactly one consumer.

pub mod binary;
mod define;
pub mod text;

pub use define::{define_module, DefineError, DefinedModule};

use cranelift_codegen::ir::{Function, Signature, UserFuncName};

/// How a declared function is linked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclLinkage {
    /// Defined here and visible by name to the session
    Export,
    /// Defined here, private to the module (`static`)
    Local,
    /// Defined elsewhere; resolved against symbol libraries at link time
    Import,
}

impl DeclLinkage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            DeclLinkage::Export => "export",
            DeclLinkage::Local => "local",
            DeclLinkage::Import => "import",
        }
    }

    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "export" => Some(DeclLinkage::Export),
            "local" => Some(DeclLinkage::Local),
            "import" => Some(DeclLinkage::Import),
            _ => None,
        }
    }

    pub(crate) const fn to_module(self) -> cranelift_module::Linkage {
        match self {
            DeclLinkage::Export => cranelift_module::Linkage::Export,
            DeclLinkage::Local => cranelift_module::Linkage::Local,
            DeclLinkage::Import => cranelift_module::Linkage::Import,
        }
    }
}

/// One entry in the declaration table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// External symbol name
    pub name: String,
    pub linkage: DeclLinkage,
    pub signature: Signature,
}

/// A compiled translation unit in Cranelift IR
#[derive(Debug, PartialEq)]
pub struct IrModule {
    name: String,
    triple: String,
    declarations: Vec<Declaration>,
    functions: Vec<Function>,
}

impl IrModule {
    #[must_use]
    pub fn new(name: impl Into<String>, triple: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            triple: triple.into(),
            declarations: Vec::new(),
            functions: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target triple the module was generated for
    #[must_use]
    pub fn triple(&self) -> &str {
        &self.triple
    }

    /// Architecture component of the triple
    #[must_use]
    pub fn architecture(&self) -> &str {
        self.triple.split('-').next().unwrap_or_default()
    }

    /// Append a declaration and return its index
    pub fn declare(
        &mut self,
        name: impl Into<String>,
        linkage: DeclLinkage,
        signature: Signature,
    ) -> u32 {
        let index = self.declarations.len() as u32;
        self.declarations.push(Declaration {
            name: name.into(),
            linkage,
            signature,
        });
        index
    }

    /// Add a function body; its name must be `u0:<declaration index>`
    pub fn add_function(&mut self, function: Function) {
        self.functions.push(function);
    }

    #[must_use]
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    #[must_use]
    pub fn declaration(&self, index: u32) -> Option<&Declaration> {
        self.declarations.get(index as usize)
    }

    /// Index of the declaration with this symbol name
    #[must_use]
    pub fn find(&self, name: &str) -> Option<u32> {
        self.declarations
            .iter()
            .position(|d| d.name == name)
            .map(|i| i as u32)
    }

    #[must_use]
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Imported declarations, in declaration order
    pub fn imports(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations
            .iter()
            .filter(|d| d.linkage == DeclLinkage::Import)
    }

    /// Exported declarations, in declaration order
    pub fn exports(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations
            .iter()
            .filter(|d| d.linkage == DeclLinkage::Export)
    }

    /// A module with no function bodies has nothing to execute
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Declaration index a function body names itself with
#[must_use]
pub fn function_index(function: &Function) -> Option<u32> {
    match &function.name {
        UserFuncName::User(name) if name.namespace == 0 => Some(name.index),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_codegen::ir::{AbiParam, UserFuncName};
    use cranelift_codegen::ir::types::I32;
    use cranelift_codegen::isa::CallConv;

    fn signature() -> Signature {
        let mut sig = Signature::new(CallConv::SystemV);
        sig.params.push(AbiParam::new(I32));
        sig.returns.push(AbiParam::new(I32));
        sig
    }

    #[test]
    fn declarations_are_indexed_in_order() {
        let mut module = IrModule::new("m", "x86_64-unknown-linux-gnu");
        assert_eq!(module.declare("f", DeclLinkage::Export, signature()), 0);
        assert_eq!(module.declare("g", DeclLinkage::Import, signature()), 1);
        assert_eq!(module.find("g"), Some(1));
        assert_eq!(module.imports().count(), 1);
        assert_eq!(module.exports().next().map(|d| d.name.as_str()), Some("f"));
        assert_eq!(module.architecture(), "x86_64");
        assert!(module.is_empty());
    }

    #[test]
    fn function_index_reads_user_name() {
        let function = Function::with_name_signature(UserFuncName::user(0, 3), signature());
        assert_eq!(function_index(&function), Some(3));
        let other = Function::with_name_signature(UserFuncName::user(1, 3), signature());
        assert_eq!(function_index(&other), None);
    }

    #[test]
    fn linkage_names_round_trip() {
        for linkage in [DeclLinkage::Export, DeclLinkage::Local, DeclLinkage::Import] {
            assert_eq!(DeclLinkage::parse(linkage.as_str()), Some(linkage));
        }
        assert_eq!(DeclLinkage::parse("weak"), None);
    }
}
