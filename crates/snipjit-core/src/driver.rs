//! Front-end driver: source text and options in, IR module or failure out
//!
//! The driver owns one [`DiagnosticSink`] per compilation, created before
//! anything else runs. It configures the compilation in a fixed order
//! (input, header search, target, code generation), runs the front end
//! inside a [`FatalErrorScope`], and then hands the generated module to the
//! emitter matching the requested [`EmissionKind`]. Text and binary
//! emission serialize the module and parse it back, so what comes out is
//! exactly what a consumer of those formats would see.

use std::fmt::{self, Write as _};
use std::panic;
use std::sync::Arc;
use std::thread;

use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_object::{ObjectBuilder, ObjectModule};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ast::DataModel;
use crate::codegen;
use crate::diagnostics::{
    BackendFault, DiagnosticEntry, DiagnosticReporter, DiagnosticSink, FatalErrorScope, Severity,
};
use crate::ir::{self, binary, text, IrModule};
use crate::options::{CompileOptions, EmissionKind};
use crate::parser::{HeaderSearch, Parser};
use crate::sema::Checker;
use crate::source::{SourceMap, SourceUnit, INPUT_NAME};
use crate::target;

/// Stack reserved for the front-end thread
///
/// Sized for source nested to [`MAX_NESTING_DEPTH`](crate::parser::MAX_NESTING_DEPTH)
/// levels in unoptimized builds, through parsing, checking and code
/// generation.
pub const FRONT_END_STACK_SIZE: usize = 32 * 1024 * 1024;

/// Stage at which a compilation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Options or input rejected before the front end ran
    InvalidConfiguration,
    /// The front end or backend aborted
    ActionFailed,
    /// Diagnostics at Error or Fatal severity were recorded
    DiagnosticErrors,
    /// The module could not be serialized, re-parsed or lowered
    EmissionFailed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::InvalidConfiguration => "invalid configuration",
            FailureKind::ActionFailed => "compilation action failed",
            FailureKind::DiagnosticErrors => "compilation produced errors",
            FailureKind::EmissionFailed => "emission failed",
        })
    }
}

/// A rejected compilation, with every diagnostic recorded on the way
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("front-end failure: {kind} ({} diagnostic(s))", .diagnostics.len())]
pub struct FrontEndFailure {
    pub kind: FailureKind,
    pub diagnostics: DiagnosticSink,
}

impl FrontEndFailure {
    /// Rendered diagnostics, one per line
    #[must_use]
    pub fn transcript(&self) -> String {
        self.diagnostics.transcript()
    }
}

/// The requested emission kind does not yield an IR module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("emission kind '{kind}' does not produce an IR module")]
pub struct NotAModule {
    pub kind: EmissionKind,
}

/// What a successful compilation produced
#[derive(Debug)]
pub enum Artifact {
    Module(IrModule),
    Object(Vec<u8>),
    Assembly(String),
}

impl Artifact {
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Artifact::Module(_) => "module",
            Artifact::Object(_) => "object",
            Artifact::Assembly(_) => "assembly",
        }
    }
}

/// A successful compilation
#[derive(Debug)]
pub struct Compilation {
    pub artifact: Artifact,
    /// Notes and warnings recorded along the way
    pub diagnostics: DiagnosticSink,
    /// Serialized output: IR text, IR container, object or assembly bytes.
    /// Empty for in-memory emission.
    pub output: Vec<u8>,
    /// Stage-by-stage log of what the driver did
    pub verbose: String,
    emission: EmissionKind,
}

impl Compilation {
    #[must_use]
    pub fn emission(&self) -> EmissionKind {
        self.emission
    }

    #[must_use]
    pub fn module(&self) -> Option<&IrModule> {
        match &self.artifact {
            Artifact::Module(module) => Some(module),
            _ => None,
        }
    }

    /// Take the IR module out of the compilation
    pub fn into_module(self) -> Result<IrModule, NotAModule> {
        match self.artifact {
            Artifact::Module(module) => Ok(module),
            _ => Err(NotAModule {
                kind: self.emission,
            }),
        }
    }
}

/// Runs the front end for a fixed set of options
#[derive(Debug, Clone, Default)]
pub struct FrontEndDriver {
    options: CompileOptions,
}

impl FrontEndDriver {
    #[must_use]
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile one source unit
    ///
    /// Fails when configuration is rejected, when the front end or backend
    /// aborts, or when any diagnostic reaches Error severity, even if a
    /// module was produced.
    ///
    /// The calling thread blocks while the work runs on a front-end thread
    /// with a [`FRONT_END_STACK_SIZE`] stack, so how deeply the source may
    /// nest does not depend on the caller's stack.
    pub fn compile(&self, source: SourceUnit) -> Result<Compilation, FrontEndFailure> {
        thread::scope(|threads| {
            let worker_source = source.clone();
            let worker = thread::Builder::new()
                .name("snipjit-front-end".to_string())
                .stack_size(FRONT_END_STACK_SIZE)
                .spawn_scoped(threads, move || self.compile_here(worker_source));
            match worker {
                Ok(worker) => worker
                    .join()
                    .unwrap_or_else(|payload| panic::resume_unwind(payload)),
                Err(error) => {
                    warn!(
                        target: "snipjit::driver",
                        %error,
                        "front-end thread unavailable, compiling on the calling thread"
                    );
                    self.compile_here(source)
                }
            }
        })
    }

    fn compile_here(&self, source: SourceUnit) -> Result<Compilation, FrontEndFailure> {
        let mut sink = DiagnosticSink::new();
        let mut verbose = String::new();
        let scope = FatalErrorScope::install();
        let options = &self.options;
        let language = source.language();

        // Input
        if source.text().is_empty() {
            return Err(configuration_error(sink, "no input: source text is empty"));
        }
        let mut sources = SourceMap::new();
        let file = sources.add(INPUT_NAME, source.text());
        let _ = writeln!(
            verbose,
            "input: {INPUT_NAME} ({language}, {} bytes)",
            source.text().len()
        );

        // Header search
        let headers = HeaderSearch::new(options.headers, &options.virtual_headers, language);
        let _ = writeln!(
            verbose,
            "headers: builtin={} system={} c++={} virtual={}",
            options.headers.use_builtin_includes,
            options.headers.use_standard_system_includes,
            options.headers.use_standard_cxx_includes,
            options.virtual_headers.len()
        );

        // Target
        if !options.code_model.is_supported() {
            return Err(configuration_error(
                sink,
                format!("code model '{}' is not supported", options.code_model),
            ));
        }
        let isa = match target::target_isa(options.target.as_deref(), options.opt_level) {
            Ok(isa) => isa,
            Err(e) => return Err(configuration_error(sink, e.to_string())),
        };
        let model = DataModel::for_target(&isa.triple().to_string(), isa.pointer_bits());
        let _ = writeln!(
            verbose,
            "target: {} (code model {})",
            isa.triple(),
            options.code_model
        );

        // Code generation
        let _ = writeln!(
            verbose,
            "codegen: opt_level={} emit={}",
            options.opt_level.as_setting(),
            options.emission
        );
        debug!(
            target: "snipjit::driver",
            triple = %isa.triple(),
            %language,
            emission = %options.emission,
            "compilation configured"
        );

        let parsed =
            scope.run(|| Parser::parse_translation_unit(&mut sources, file, &headers, language));
        let output = match parsed {
            Ok(output) => output,
            Err(fault) => return Err(action_failed(sink, &fault)),
        };
        let mut reporter =
            DiagnosticReporter::new(&mut sink, &sources).warnings_as_errors(options.warnings_as_errors);
        for error in &output.errors {
            let severity = if error.is_fatal() {
                Severity::Fatal
            } else {
                Severity::Error
            };
            let message = match &error.hint {
                Some(hint) => format!("{} (hint: {hint})", error.kind),
                None => error.kind.to_string(),
            };
            reporter.report(severity, Some(error.span), message);
        }
        if !output.errors.is_empty() {
            drop(reporter);
            return Err(failure(FailureKind::DiagnosticErrors, sink));
        }
        let unit = output.unit;
        let _ = writeln!(verbose, "parse: {} function(s)", unit.functions.len());

        let checked = scope.run(|| Checker::new(language, model, &mut reporter).check(&unit));
        let semantics = match checked {
            Ok(semantics) => semantics,
            Err(fault) => {
                drop(reporter);
                return Err(action_failed(sink, &fault));
            }
        };
        if reporter.has_error() {
            drop(reporter);
            return Err(failure(FailureKind::DiagnosticErrors, sink));
        }

        let generated = scope.run(|| {
            codegen::generate(&unit, &semantics, &*isa, &options.module_name)
        });
        let module = match generated {
            Ok(Ok(module)) => module,
            Ok(Err(error)) => {
                reporter.fatal(None, format!("error in backend: {error}"));
                drop(reporter);
                return Err(failure(FailureKind::ActionFailed, sink));
            }
            Err(fault) => {
                drop(reporter);
                return Err(action_failed(sink, &fault));
            }
        };
        drop(reporter);
        let _ = writeln!(
            verbose,
            "codegen: {} declaration(s), {} function(s)",
            module.declarations().len(),
            module.functions().len()
        );

        let emitted = scope
            .run(|| emit(options.emission, module, &isa))
            .unwrap_or_else(|fault| Err(fault.to_string()));
        let (artifact, output) = match emitted {
            Ok(emitted) => emitted,
            Err(message) => {
                sink.record(DiagnosticEntry::new(Severity::Fatal, message));
                return Err(failure(FailureKind::EmissionFailed, sink));
            }
        };
        let _ = writeln!(
            verbose,
            "emit: {} ({} bytes)",
            artifact.kind_name(),
            output.len()
        );

        if sink.has_error() {
            return Err(failure(FailureKind::DiagnosticErrors, sink));
        }

        info!(
            target: "snipjit::driver",
            emission = %options.emission,
            artifact = artifact.kind_name(),
            warnings = sink.count(Severity::Warning),
            "compilation succeeded"
        );
        Ok(Compilation {
            artifact,
            diagnostics: sink,
            output,
            verbose,
            emission: options.emission,
        })
    }
}

fn failure(kind: FailureKind, diagnostics: DiagnosticSink) -> FrontEndFailure {
    warn!(
        target: "snipjit::driver",
        %kind,
        errors = diagnostics.count(Severity::Error) + diagnostics.count(Severity::Fatal),
        "compilation failed"
    );
    FrontEndFailure { kind, diagnostics }
}

fn configuration_error(mut sink: DiagnosticSink, message: impl Into<String>) -> FrontEndFailure {
    sink.record(DiagnosticEntry::new(Severity::Error, message));
    failure(FailureKind::InvalidConfiguration, sink)
}

fn action_failed(mut sink: DiagnosticSink, fault: &BackendFault) -> FrontEndFailure {
    sink.record(DiagnosticEntry::new(Severity::Fatal, fault.to_string()));
    failure(FailureKind::ActionFailed, sink)
}

type Emitted = (Artifact, Vec<u8>);

fn emit(kind: EmissionKind, module: IrModule, isa: &OwnedTargetIsa) -> Result<Emitted, String> {
    match kind {
        EmissionKind::InMemory => Ok(emit_in_memory(module)),
        EmissionKind::IrText => emit_text(&module),
        EmissionKind::IrBinary => emit_binary(&module),
        EmissionKind::Object => emit_object(&module, isa),
        EmissionKind::Assembly => emit_assembly(&module, isa),
    }
}

fn emit_in_memory(module: IrModule) -> Emitted {
    (Artifact::Module(module), Vec::new())
}

fn emit_text(module: &IrModule) -> Result<Emitted, String> {
    let bytes = text::to_text(module).into_bytes();
    let parsed = text::from_text(&bytes).map_err(|e| format!("re-parsing IR text: {e}"))?;
    Ok((Artifact::Module(parsed), bytes))
}

fn emit_binary(module: &IrModule) -> Result<Emitted, String> {
    let bytes = binary::to_binary(module).map_err(|e| format!("writing IR container: {e}"))?;
    let parsed =
        binary::from_binary(&bytes).map_err(|e| format!("re-parsing IR container: {e}"))?;
    Ok((Artifact::Module(parsed), bytes))
}

fn emit_object(module: &IrModule, isa: &OwnedTargetIsa) -> Result<Emitted, String> {
    let (bytes, _) = lower_native(module, isa, false)?;
    Ok((Artifact::Object(bytes.clone()), bytes))
}

fn emit_assembly(module: &IrModule, isa: &OwnedTargetIsa) -> Result<Emitted, String> {
    let (_, functions) = lower_native(module, isa, true)?;
    let mut assembly = String::new();
    for (name, body) in functions {
        let _ = writeln!(assembly, "{name}:");
        assembly.push_str(&body);
        if !body.ends_with('\n') {
            assembly.push('\n');
        }
    }
    let bytes = assembly.clone().into_bytes();
    Ok((Artifact::Assembly(assembly), bytes))
}

/// Compile a module to an object file, optionally capturing disassembly
fn lower_native(
    module: &IrModule,
    isa: &OwnedTargetIsa,
    capture_assembly: bool,
) -> Result<(Vec<u8>, Vec<(String, String)>), String> {
    let builder = ObjectBuilder::new(
        Arc::clone(isa),
        module.name(),
        cranelift_module::default_libcall_names(),
    )
    .map_err(|e| format!("creating object builder: {e}"))?;
    let mut object = ObjectModule::new(builder);
    let defined = ir::define_module(&mut object, module, capture_assembly)
        .map_err(|e| format!("error in backend: {e}"))?;
    let bytes = object
        .finish()
        .emit()
        .map_err(|e| format!("writing object file: {e}"))?;
    Ok((bytes, defined.assembly))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::DeclLinkage;
    use crate::options::{CodeModel, HeaderSearchPolicy};

    const ADD: &str = "int add(int a, int b) { return a + b; }\n";

    fn compile(options: CompileOptions, source: &str) -> Result<Compilation, FrontEndFailure> {
        FrontEndDriver::new(options).compile(SourceUnit::c(source))
    }

    #[test]
    fn in_memory_module() {
        let compilation = compile(CompileOptions::default(), ADD).unwrap();
        assert!(compilation.diagnostics.is_empty());
        assert!(compilation.output.is_empty());
        let module = compilation.into_module().unwrap();
        assert_eq!(module.find("add"), Some(0));
        assert_eq!(module.functions().len(), 1);
    }

    #[test]
    fn text_emission_keeps_its_output() {
        let compilation = compile(
            CompileOptions::default().with_emission(EmissionKind::IrText),
            ADD,
        )
        .unwrap();
        let output = String::from_utf8(compilation.output.clone()).unwrap();
        assert!(output.starts_with(text::HEADER));
        assert!(output.ends_with('\n'));
        assert!(compilation.verbose.contains("emit: module"));
        let module = compilation.into_module().unwrap();
        assert_eq!(module.declarations()[0].linkage, DeclLinkage::Export);
    }

    #[test]
    fn binary_emission_round_trips() {
        let compilation = compile(
            CompileOptions::default().with_emission(EmissionKind::IrBinary),
            ADD,
        )
        .unwrap();
        assert_eq!(&compilation.output[..4], &binary::MAGIC);
        assert!(compilation.module().is_some());
    }

    #[test]
    fn object_and_assembly_are_not_modules() {
        let object = compile(
            CompileOptions::default().with_emission(EmissionKind::Object),
            ADD,
        )
        .unwrap();
        assert!(matches!(&object.artifact, Artifact::Object(bytes) if !bytes.is_empty()));
        assert_eq!(
            object.into_module().unwrap_err(),
            NotAModule {
                kind: EmissionKind::Object
            }
        );

        let assembly = compile(
            CompileOptions::default().with_emission(EmissionKind::Assembly),
            ADD,
        )
        .unwrap();
        match &assembly.artifact {
            Artifact::Assembly(text) => assert!(text.starts_with("add:")),
            other => panic!("expected assembly, got {}", other.kind_name()),
        }
    }

    #[test]
    fn empty_input_is_a_configuration_error() {
        let failure = compile(CompileOptions::default(), "").unwrap_err();
        assert_eq!(failure.kind, FailureKind::InvalidConfiguration);
        assert!(failure.diagnostics.has_error());
    }

    #[test]
    fn unknown_target_is_a_configuration_error() {
        let failure = compile(CompileOptions::default().with_target("bogus-arch"), ADD).unwrap_err();
        assert_eq!(failure.kind, FailureKind::InvalidConfiguration);
        assert!(failure.transcript().contains("bogus-arch"));
    }

    #[test]
    fn unsupported_code_model_is_rejected() {
        let failure = compile(
            CompileOptions::default().with_code_model(CodeModel::Large),
            ADD,
        )
        .unwrap_err();
        assert_eq!(failure.kind, FailureKind::InvalidConfiguration);
    }

    #[test]
    fn syntax_errors_are_recorded() {
        let failure = compile(CompileOptions::default(), "int f( { return 1; }\n").unwrap_err();
        assert_eq!(failure.kind, FailureKind::DiagnosticErrors);
        assert!(failure.diagnostics.max_severity() >= Some(Severity::Error));
        assert!(failure.diagnostics.entries()[0].location.is_some());
    }

    #[test]
    fn semantic_errors_are_recorded() {
        let failure = compile(CompileOptions::default(), "int f(void) { return y; }\n").unwrap_err();
        assert_eq!(failure.kind, FailureKind::DiagnosticErrors);
        assert!(failure.diagnostics.has_error());
    }

    #[test]
    fn warnings_do_not_fail_unless_promoted() {
        let source = "int f(int x) { if (x) return 1; }\n";
        let compilation = compile(CompileOptions::default(), source).unwrap();
        assert_eq!(compilation.diagnostics.count(Severity::Warning), 1);

        let failure = compile(CompileOptions::default().warnings_as_errors(true), source).unwrap_err();
        assert_eq!(failure.kind, FailureKind::DiagnosticErrors);
        assert_eq!(failure.diagnostics.count(Severity::Error), 1);
    }

    #[test]
    fn missing_header_is_fatal() {
        let failure = compile(
            CompileOptions::default().with_header_policy(HeaderSearchPolicy::none()),
            "#include <math.h>\ndouble f(double x) { return sin(x); }\n",
        )
        .unwrap_err();
        assert_eq!(failure.diagnostics.max_severity(), Some(Severity::Fatal));
    }

    fn nested_parens(depth: usize) -> String {
        format!(
            "int f(void) {{ return {}1{}; }}\n",
            "(".repeat(depth),
            ")".repeat(depth)
        )
    }

    #[test]
    fn deep_nesting_is_a_fatal_diagnostic() {
        for depth in [2_000, 5_000, 20_000] {
            let failure = compile(CompileOptions::default(), &nested_parens(depth)).unwrap_err();
            assert_eq!(failure.kind, FailureKind::DiagnosticErrors);
            assert_eq!(failure.diagnostics.len(), 1, "{}", failure.transcript());
            let entry = &failure.diagnostics.entries()[0];
            assert_eq!(entry.severity, Severity::Fatal);
            assert!(entry.message.starts_with("nesting too deep"), "{}", entry.message);
        }
    }

    #[test]
    fn nesting_up_to_the_limit_compiles() {
        let parens = compile(CompileOptions::default(), &nested_parens(200)).unwrap();
        assert!(parens.diagnostics.is_empty());

        let chain = format!("int f(int x) {{ return x{}; }}\n", " + 1".repeat(200));
        let compilation = compile(
            CompileOptions::default().with_emission(EmissionKind::IrText),
            &chain,
        )
        .unwrap();
        assert!(compilation.module().is_some());
    }

    #[test]
    fn compilation_leaves_no_scope_behind() {
        let before = FatalErrorScope::depth();
        compile(CompileOptions::default(), ADD).unwrap();
        compile(CompileOptions::default(), "int broken(\n").unwrap_err();
        assert_eq!(FatalErrorScope::depth(), before);
    }

    #[test]
    fn front_end_faults_become_fatal_diagnostics() {
        let scope = FatalErrorScope::install();
        let fault = scope
            .run(|| -> usize { panic!("token stream ended early") })
            .unwrap_err();
        let failure = action_failed(DiagnosticSink::new(), &fault);
        assert_eq!(failure.kind, FailureKind::ActionFailed);
        assert_eq!(
            failure.diagnostics.entries(),
            [DiagnosticEntry::new(
                Severity::Fatal,
                "error in backend: token stream ended early"
            )]
        );
    }

    #[test]
    fn virtual_headers_are_included() {
        let compilation = compile(
            CompileOptions::default().with_header("helpers.h", "int twice(int x);\n"),
            "#include \"helpers.h\"\nint f(int x) { return twice(x); }\n",
        )
        .unwrap();
        let module = compilation.into_module().unwrap();
        assert_eq!(module.imports().count(), 1);
    }
}
