//! snipjit - compile a C/C++ snippet in-process and call into it
//!
//! This crate provides the whole pipeline:
//! - Lexer and Parser: the snippet front end, with builtin headers
//! - Sema: name resolution, type checking and C++ name mangling
//! - Codegen: lowering to Cranelift IR
//! - IR: modules plus their text and binary interchange formats
//! - Driver: configuration, diagnostics and emission
//! - JIT: symbol environments, sessions and entry points
//! - Pipeline: source text to invoked result

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lexer module - tokenization of snippet source
pub mod lexer;

/// Abstract Syntax Tree of the accepted C/C++ subset
pub mod ast;

/// Parser module - converts tokens into AST, resolving includes
pub mod parser;

/// Semantic analysis
pub mod sema;

/// Cranelift IR generation
pub mod codegen;

/// IR modules and their serialized forms
pub mod ir;

/// Source buffers and language tags
pub mod source;

/// Diagnostic capture and the fatal-error scope
pub mod diagnostics;

/// Compile options
pub mod options;

/// Target ISA construction
pub mod target;

/// Native type mapping for calls across the JIT boundary
/// Calling through raw function addresses requires unsafe code
#[allow(unsafe_code, clippy::missing_safety_doc)]
pub mod abi;

/// JIT execution module (Cranelift-based)
/// JIT requires unsafe code for memory management and function pointers
#[allow(unsafe_code, clippy::missing_safety_doc)]
pub mod jit;

/// Front-end driver
pub mod driver;

/// End-to-end compile and run
pub mod pipeline;

/// TOML configuration
pub mod config;

/// Subscriber setup for `tracing` output
pub mod logging;

/// Test utilities - helpers for compiling and calling snippets
pub mod testutil;

/// Convenience re-export of source types
pub use source::{Language, SourceUnit};

/// Convenience re-export of compile options
pub use options::{CompileOptions, EmissionKind, OptLevel};

/// Convenience re-export of diagnostics
pub use diagnostics::{DiagnosticEntry, DiagnosticSink, Severity};

/// Convenience re-export of the driver
pub use driver::{Compilation, FrontEndDriver, FrontEndFailure};

/// Convenience re-export of JIT types
pub use jit::{EntryPoint, JitSession, NativeSymbolEnvironment, SymbolBinding};

/// Convenience re-export of the pipeline
pub use pipeline::{LoadedProgram, Pipeline, PipelineError};

/// Convenience re-export of configuration
pub use config::PipelineConfig;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn run_c_snippet() {
        let result: i32 = Pipeline::default()
            .run(
                SourceUnit::c("int add(int a, int b) { return a + b; }\n"),
                "add",
                (20_i32, 22_i32),
            )
            .unwrap();
        assert_eq!(result, 42);
    }
}
