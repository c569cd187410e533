//! JIT session lifecycle: symbol installation, module ingestion, lookup

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_jit::{JITBuilder, JITModule};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{InvokeError, LinkError, NativeSymbolEnvironment, SessionError, SessionResult};
use crate::abi::{FunctionDescriptor, NativeArgs, NativeReturn};
use crate::diagnostics::FatalErrorScope;
use crate::ir::{define_module, DeclLinkage, DefineError, IrModule};
use crate::options::OptLevel;
use crate::target;

/// Where imports are looked up when a module is ingested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SymbolResolution {
    /// Only installed symbol environments
    #[default]
    EnvironmentOnly,
    /// Installed environments first, then symbols exported by this process
    EnvironmentThenProcess,
}

/// Session settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Target triple; the host when unset
    pub target: Option<String>,
    pub opt_level: OptLevel,
    pub resolution: SymbolResolution,
}

/// Lifecycle of a [`JitSession`]; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Created,
    SymbolsInstalled,
    ModuleLoaded,
    Ready,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Created => "created",
            SessionState::SymbolsInstalled => "symbols-installed",
            SessionState::ModuleLoaded => "module-loaded",
            SessionState::Ready => "ready",
        })
    }
}

struct ExportedFunction {
    address: *const u8,
    descriptor: Option<FunctionDescriptor>,
}

struct LoadedModule {
    jit: JITModule,
    exports: HashMap<String, ExportedFunction>,
}

/// An execution context for one IR module
///
/// Owns the generated machine code, which is released when the session is
/// dropped. Entry points borrow the session, so they cannot outlive it.
pub struct JitSession {
    config: SessionConfig,
    isa: OwnedTargetIsa,
    state: SessionState,
    libraries: Vec<Arc<NativeSymbolEnvironment>>,
    loaded: Option<LoadedModule>,
}

impl JitSession {
    /// Create a session for the host
    pub fn create() -> SessionResult<Self> {
        Self::create_with(SessionConfig::default())
    }

    pub fn create_with(config: SessionConfig) -> SessionResult<Self> {
        let isa = target::target_isa(config.target.as_deref(), config.opt_level)
            .map_err(|e| SessionError::EngineUnavailable(e.to_string()))?;
        let runs_here =
            target::runs_on_host(&*isa).map_err(|e| SessionError::EngineUnavailable(e.to_string()))?;
        if !runs_here {
            return Err(SessionError::EngineUnavailable(format!(
                "code for '{}' cannot execute on this host",
                isa.triple()
            )));
        }

        debug!(target: "snipjit::jit", triple = %isa.triple(), "session created");
        Ok(Self {
            config,
            isa,
            state: SessionState::Created,
            libraries: Vec::new(),
            loaded: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Triple of the code this session generates
    pub fn triple(&self) -> String {
        self.isa.triple().to_string()
    }

    /// Installed environments, in link order
    pub fn libraries(&self) -> &[Arc<NativeSymbolEnvironment>] {
        &self.libraries
    }

    /// Append a symbol environment to the link order
    ///
    /// Must happen before [`ingest`](Self::ingest). Earlier environments win
    /// when names collide.
    pub fn install_symbols(&mut self, environment: Arc<NativeSymbolEnvironment>) -> SessionResult<()> {
        self.expect_state(
            "install symbols",
            &[SessionState::Created, SessionState::SymbolsInstalled],
        )?;
        debug!(
            target: "snipjit::jit",
            symbols = environment.len(),
            position = self.libraries.len(),
            "symbol environment installed"
        );
        self.libraries.push(environment);
        self.state = SessionState::SymbolsInstalled;
        Ok(())
    }

    /// Link `module` into the session and finalize its code
    ///
    /// Every import is resolved before any code is generated, and a link
    /// failure leaves the session unchanged. A backend failure while
    /// finalizing leaves it in [`SessionState::ModuleLoaded`] with nothing to
    /// look up.
    pub fn ingest(&mut self, module: IrModule) -> SessionResult<()> {
        self.expect_state(
            "ingest a module",
            &[SessionState::Created, SessionState::SymbolsInstalled],
        )?;

        let host = target::architecture(&*self.isa);
        if module.architecture() != host {
            return Err(LinkError::TargetMismatch {
                module: module.triple().to_string(),
                host: self.triple(),
            }
            .into());
        }

        let symbols = self.resolve_imports(&module)?;

        let mut builder = JITBuilder::with_isa(
            Arc::clone(&self.isa),
            cranelift_module::default_libcall_names(),
        );
        for (name, address) in &symbols {
            builder.symbol(name.as_str(), *address);
        }
        let mut jit = JITModule::new(builder);

        let scope = FatalErrorScope::install();
        let defined = match scope.run(|| define_module(&mut jit, &module, false)) {
            Ok(Ok(defined)) => defined,
            Ok(Err(error)) => {
                release(jit);
                return Err(link_error(error).into());
            }
            Err(fault) => {
                release(jit);
                return Err(LinkError::Backend(fault.message).into());
            }
        };
        self.state = SessionState::ModuleLoaded;
        debug!(target: "snipjit::jit", functions = module.functions().len(), "module defined");

        let finalized = scope
            .run(|| jit.finalize_definitions())
            .map_err(|fault| fault.message)
            .and_then(|result| result.map_err(|e| e.to_string()));
        if let Err(message) = finalized {
            warn!(target: "snipjit::jit", %message, "finalizing module failed");
            release(jit);
            return Err(LinkError::Backend(message).into());
        }

        let mut exports = HashMap::new();
        for (index, decl) in module.declarations().iter().enumerate() {
            if decl.linkage != DeclLinkage::Export {
                continue;
            }
            exports.insert(
                decl.name.clone(),
                ExportedFunction {
                    address: jit.get_finalized_function(defined.ids[index]),
                    descriptor: FunctionDescriptor::from_signature(&decl.signature),
                },
            );
        }

        info!(
            target: "snipjit::jit",
            module = module.name(),
            functions = module.functions().len(),
            exports = exports.len(),
            imports = symbols.len(),
            "module ingested"
        );
        self.loaded = Some(LoadedModule { jit, exports });
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Resolve an exported function by its exact symbol name
    ///
    /// Returns `None` when nothing by that name is exported or no module is
    /// ready. Repeated lookups yield the same address.
    ///
    /// Symbol names are the linker's names. C functions and C++ functions
    /// declared `extern "C"` keep their source name; other C++ functions are
    /// exported under their Itanium mangling (`int add(int, int)` becomes
    /// `_Z3addii`).
    pub fn lookup(&self, name: &str) -> Option<EntryPoint<'_>> {
        if self.state != SessionState::Ready {
            return None;
        }
        let (name, export) = self.loaded.as_ref()?.exports.get_key_value(name)?;
        Some(EntryPoint {
            name,
            address: export.address,
            descriptor: export.descriptor.as_ref(),
            _session: PhantomData,
        })
    }

    /// Names of all exported functions
    pub fn exports(&self) -> impl Iterator<Item = &str> {
        self.loaded
            .iter()
            .flat_map(|loaded| loaded.exports.keys().map(String::as_str))
    }

    fn expect_state(&self, operation: &'static str, allowed: &[SessionState]) -> SessionResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Address for every import, or every name that could not be found
    fn resolve_imports(&self, module: &IrModule) -> Result<Vec<(String, *const u8)>, LinkError> {
        let mut resolved = Vec::new();
        let mut unresolved = Vec::new();

        for decl in module.imports() {
            let binding = self
                .libraries
                .iter()
                .find_map(|library| library.get(&decl.name));
            if let Some(binding) = binding {
                let expected = FunctionDescriptor::from_signature(&decl.signature);
                if expected.as_ref() != Some(binding.descriptor()) {
                    return Err(LinkError::SignatureMismatch {
                        name: decl.name.clone(),
                        expected: expected.map_or_else(|| "<non-scalar>".to_string(), |d| d.to_string()),
                        found: binding.descriptor().to_string(),
                    });
                }
                resolved.push((decl.name.clone(), binding.address()));
                continue;
            }

            let from_process = match self.config.resolution {
                SymbolResolution::EnvironmentOnly => None,
                SymbolResolution::EnvironmentThenProcess => process_symbol(&decl.name),
            };
            match from_process {
                Some(address) => {
                    debug!(target: "snipjit::jit", symbol = %decl.name, "resolved from process");
                    resolved.push((decl.name.clone(), address));
                }
                None => unresolved.push(decl.name.clone()),
            }
        }

        if unresolved.is_empty() {
            Ok(resolved)
        } else {
            warn!(target: "snipjit::jit", symbols = ?unresolved, "unresolved imports");
            Err(LinkError::UnresolvedSymbol { names: unresolved })
        }
    }
}

impl fmt::Debug for JitSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JitSession")
            .field("triple", &self.isa.triple())
            .field("state", &self.state)
            .field("libraries", &self.libraries.len())
            .finish_non_exhaustive()
    }
}

impl Drop for JitSession {
    fn drop(&mut self) {
        if let Some(loaded) = self.loaded.take() {
            debug!(target: "snipjit::jit", "releasing generated code");
            release(loaded.jit);
        }
    }
}

fn release(jit: JITModule) {
    // SAFETY: every pointer into this module's code is either owned by the
    // module itself or borrowed through an `EntryPoint` tied to the session
    unsafe { jit.free_memory() };
}

fn link_error(error: DefineError) -> LinkError {
    match error {
        DefineError::Compile { name, message } => LinkError::Codegen {
            function: name,
            message,
        },
        other => LinkError::Backend(other.to_string()),
    }
}

#[cfg(unix)]
fn process_symbol(name: &str) -> Option<*const u8> {
    let name = std::ffi::CString::new(name).ok()?;
    // SAFETY: `name` is a valid NUL-terminated string and RTLD_DEFAULT is
    // always a valid handle
    let address = unsafe { libc::dlsym(libc::RTLD_DEFAULT, name.as_ptr()) };
    (!address.is_null()).then_some(address as *const u8)
}

#[cfg(not(unix))]
fn process_symbol(_name: &str) -> Option<*const u8> {
    None
}

/// A callable function exported by a ready session
#[derive(Debug, Clone, Copy)]
pub struct EntryPoint<'s> {
    name: &'s str,
    address: *const u8,
    descriptor: Option<&'s FunctionDescriptor>,
    _session: PhantomData<&'s JitSession>,
}

impl EntryPoint<'_> {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn address(&self) -> *const u8 {
        self.address
    }

    /// `None` when the signature has no scalar representation
    pub fn descriptor(&self) -> Option<&FunctionDescriptor> {
        self.descriptor
    }

    /// Call the function after checking `(A...) -> R` against its descriptor
    pub fn invoke<A: NativeArgs, R: NativeReturn>(&self, args: A) -> Result<R, InvokeError> {
        let requested = FunctionDescriptor::new(A::value_types(), R::TYPE);
        match self.descriptor {
            Some(descriptor) if *descriptor == requested => {
                // SAFETY: the descriptor matches, and the code is alive for 's
                Ok(unsafe { args.call(self.address) })
            }
            descriptor => Err(InvokeError::SignatureMismatch {
                name: self.name.to_string(),
                expected: descriptor.map_or_else(|| "<non-scalar>".to_string(), ToString::to_string),
                found: requested.to_string(),
            }),
        }
    }

    /// Call the function without checking its signature
    ///
    /// # Safety
    ///
    /// The function's C signature must be exactly `(A...) -> R`.
    pub unsafe fn invoke_unchecked<A: NativeArgs, R: NativeReturn>(&self, args: A) -> R {
        // SAFETY: upheld by the caller
        unsafe { args.call(self.address) }
    }
}
