//! Source text to callable function, end to end
//!
//! A [`Pipeline`] runs the stages in order: compile, create a session,
//! install symbols, ingest the module, look up the entry point, invoke it.
//! The first failing stage ends the run and nothing partial is returned.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::abi::{NativeArgs, NativeReturn};
use crate::config::PipelineConfig;
use crate::diagnostics::DiagnosticSink;
use crate::driver::{FrontEndDriver, FrontEndFailure, NotAModule};
use crate::jit::{
    EntryPoint, InvokeError, JitSession, NativeSymbolEnvironment, SessionConfig, SessionError,
};
use crate::options::CompileOptions;
use crate::source::{Language, SourceUnit};

/// Errors from any pipeline stage
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    FrontEnd(#[from] FrontEndFailure),

    #[error(transparent)]
    NotAModule(#[from] NotAModule),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error("entry point '{0}' not found")]
    EntryPointNotFound(String),
}

impl PipelineError {
    /// Compiler diagnostics, when the front end rejected the source
    #[must_use]
    pub fn diagnostics(&self) -> Option<&DiagnosticSink> {
        match self {
            PipelineError::FrontEnd(failure) => Some(&failure.diagnostics),
            _ => None,
        }
    }
}

/// Compile-and-run configuration, reusable across many sources
#[derive(Debug, Clone)]
pub struct Pipeline {
    language: Language,
    options: CompileOptions,
    session: SessionConfig,
    environment: Arc<NativeSymbolEnvironment>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

impl Pipeline {
    /// A pipeline linking against the math preset
    #[must_use]
    pub fn new(options: CompileOptions) -> Self {
        Self {
            language: Language::default(),
            options,
            session: SessionConfig::default(),
            environment: Arc::new(NativeSymbolEnvironment::math()),
        }
    }

    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            language: config.language,
            options: config.compile.clone(),
            session: config.session.clone(),
            environment: Arc::new(NativeSymbolEnvironment::math()),
        }
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Arc<NativeSymbolEnvironment>) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn with_session_config(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    #[must_use]
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    #[must_use]
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    #[must_use]
    pub fn environment(&self) -> &Arc<NativeSymbolEnvironment> {
        &self.environment
    }

    /// Wrap text in a source unit of the configured language
    #[must_use]
    pub fn source(&self, text: &str) -> SourceUnit {
        SourceUnit::new(text, self.language)
    }

    /// Compile `source` and link it into a fresh session
    pub fn load(&self, source: SourceUnit) -> Result<LoadedProgram, PipelineError> {
        debug!(target: "snipjit::pipeline", language = %source.language(), "compiling");
        let compilation = FrontEndDriver::new(self.options.clone()).compile(source)?;
        let diagnostics = compilation.diagnostics.clone();
        let module = compilation.into_module()?;

        debug!(target: "snipjit::pipeline", module = module.name(), "creating session");
        let mut session = JitSession::create_with(self.session.clone())?;
        self.environment.install_into(&mut session)?;
        session.ingest(module)?;

        Ok(LoadedProgram {
            session,
            diagnostics,
        })
    }

    /// Compile `source`, then call `entry` with `args`
    pub fn run<A: NativeArgs, R: NativeReturn>(
        &self,
        source: SourceUnit,
        entry: &str,
        args: A,
    ) -> Result<R, PipelineError> {
        let program = self.load(source)?;
        let result = program.call(entry, args)?;
        info!(target: "snipjit::pipeline", entry, "entry point returned");
        Ok(result)
    }
}

/// A compiled and linked program, ready for lookups
#[derive(Debug)]
pub struct LoadedProgram {
    session: JitSession,
    diagnostics: DiagnosticSink,
}

impl LoadedProgram {
    /// See [`JitSession::lookup`] for how names are matched
    pub fn lookup(&self, name: &str) -> Option<EntryPoint<'_>> {
        self.session.lookup(name)
    }

    /// Look up `name` and call it with a checked signature
    pub fn call<A: NativeArgs, R: NativeReturn>(&self, name: &str, args: A) -> Result<R, PipelineError> {
        let entry = self
            .lookup(name)
            .ok_or_else(|| PipelineError::EntryPointNotFound(name.to_string()))?;
        Ok(entry.invoke(args)?)
    }

    pub fn session(&self) -> &JitSession {
        &self.session
    }

    /// Warnings and notes from compilation
    pub fn diagnostics(&self) -> &DiagnosticSink {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use crate::driver::FailureKind;
    use crate::jit::SessionState;
    use crate::options::EmissionKind;

    #[test]
    fn run_calls_the_entry_point() {
        let square: i64 = Pipeline::default()
            .run(
                SourceUnit::cxx("long long square(long long x) { return x * x; }\n"),
                "_Z6squarex",
                (12_i64,),
            )
            .unwrap();
        assert_eq!(square, 144);
    }

    #[test]
    fn loaded_program_keeps_warnings() {
        let program = Pipeline::default()
            .load(SourceUnit::c("int f(int x) { if (x) return 1; }\n"))
            .unwrap();
        assert_eq!(program.diagnostics().count(Severity::Warning), 1);
        assert_eq!(program.session().state(), SessionState::Ready);
        assert_eq!(program.call::<_, i32>("f", (1_i32,)).unwrap(), 1);
    }

    #[test]
    fn missing_entry_point() {
        let error = Pipeline::default()
            .run::<_, i32>(SourceUnit::c("int f(void) { return 1; }\n"), "g", ())
            .unwrap_err();
        assert!(matches!(error, PipelineError::EntryPointNotFound(name) if name == "g"));
    }

    #[test]
    fn wrong_call_signature_is_caught() {
        let error = Pipeline::default()
            .run::<_, f64>(SourceUnit::c("int f(int x) { return x; }\n"), "f", (1_i32,))
            .unwrap_err();
        assert!(matches!(error, PipelineError::Invoke(InvokeError::SignatureMismatch { .. })));
    }

    #[test]
    fn object_emission_cannot_be_loaded() {
        let error = Pipeline::new(CompileOptions::default().with_emission(EmissionKind::Object))
            .load(SourceUnit::c("int f(void) { return 1; }\n"))
            .unwrap_err();
        assert!(matches!(
            error,
            PipelineError::NotAModule(NotAModule {
                kind: EmissionKind::Object
            })
        ));
    }

    #[test]
    fn front_end_failures_carry_diagnostics() {
        let error = Pipeline::default()
            .load(SourceUnit::c("int f(void) { return }\n"))
            .unwrap_err();
        let diagnostics = error.diagnostics().unwrap();
        assert!(diagnostics.has_error());
        assert!(matches!(
            error,
            PipelineError::FrontEnd(FrontEndFailure {
                kind: FailureKind::DiagnosticErrors,
                ..
            })
        ));
    }

    #[test]
    fn language_comes_from_config() {
        let config = PipelineConfig::from_toml_str("language = \"c99\"\n").unwrap();
        let pipeline = Pipeline::from_config(&config);
        let source = pipeline.source("int one(void) { return 1; }\n");
        assert!(!source.language().is_cxx());
        assert_eq!(pipeline.run::<_, i32>(source, "one", ()).unwrap(), 1);
    }
}
