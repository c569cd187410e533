//! Test utilities for snipjit
//!
//! Helpers for compiling snippets and calling into them, shared by unit
//! tests, integration tests and benchmarks.

use crate::abi::{NativeArgs, NativeReturn};
use crate::diagnostics::DiagnosticSink;
use crate::driver::FrontEndDriver;
use crate::ir::IrModule;
use crate::options::{CompileOptions, EmissionKind};
use crate::pipeline::{LoadedProgram, Pipeline};
use crate::source::SourceUnit;

/// Result type for test helpers
pub type TestResult<T> = Result<T, String>;

/// Compile a C snippet to an IR module through `emission`
///
/// # Errors
/// Returns the diagnostic transcript if compilation fails
pub fn compile_c(source: &str, emission: EmissionKind) -> TestResult<IrModule> {
    compile_unit(SourceUnit::c(source), emission)
}

/// Compile a source unit to an IR module through `emission`
///
/// # Errors
/// Returns the diagnostic transcript if compilation fails
pub fn compile_unit(source: SourceUnit, emission: EmissionKind) -> TestResult<IrModule> {
    FrontEndDriver::new(CompileOptions::default().with_emission(emission))
        .compile(source)
        .map_err(|failure| format!("Compile error: {failure}\n{}", failure.transcript()))?
        .into_module()
        .map_err(|e| e.to_string())
}

/// Diagnostics from compiling a C snippet, whether or not it succeeded
pub fn diagnostics_for(source: &str) -> DiagnosticSink {
    match FrontEndDriver::default().compile(SourceUnit::c(source)) {
        Ok(compilation) => compilation.diagnostics,
        Err(failure) => failure.diagnostics,
    }
}

/// Compile and link a C snippet against the math preset
///
/// # Errors
/// Returns error if compilation or linking fails
pub fn load_c(source: &str) -> TestResult<LoadedProgram> {
    Pipeline::default()
        .load(SourceUnit::c(source))
        .map_err(|e| format!("Load error: {e}"))
}

/// Compile a C snippet and call one of its functions
///
/// # Errors
/// Returns error if any pipeline stage fails
pub fn call_c<A: NativeArgs, R: NativeReturn>(source: &str, entry: &str, args: A) -> TestResult<R> {
    Pipeline::default()
        .run(SourceUnit::c(source), entry, args)
        .map_err(|e| format!("Pipeline error: {e}"))
}

/// Evaluate a C `int` expression
///
/// # Errors
/// Returns error if the expression does not compile
pub fn eval_int(expr: &str) -> TestResult<i32> {
    call_c(&format!("int eval(void) {{ return {expr}; }}\n"), "eval", ())
}

/// Evaluate a C `double` expression; `<math.h>` is included
///
/// # Errors
/// Returns error if the expression does not compile
pub fn eval_double(expr: &str) -> TestResult<f64> {
    call_c(
        &format!("#include <math.h>\ndouble eval(void) {{ return {expr}; }}\n"),
        "eval",
        (),
    )
}
