//! JIT execution of IR modules (Cranelift-based)
//!
//! # Architecture
//!
//! ```text
//! NativeSymbolEnvironment ─┐
//!                          ├─→ JitSession::ingest → JITModule → EntryPoint
//! IrModule ────────────────┘
//! ```
//!
//! A [`JitSession`] owns the generated code. Symbol environments are
//! registered before a module is ingested, and every import the module names
//! is resolved against them up front, so a missing symbol is reported as
//! [`LinkError::UnresolvedSymbol`] instead of faulting when called.
//!
//! # Calling Convention
//!
//! Generated functions use the platform C calling convention. Callers reach
//! them through [`EntryPoint::invoke`], which compares the Rust call
//! signature with the function's [`FunctionDescriptor`](crate::abi::FunctionDescriptor)
//! first, or through the unchecked [`EntryPoint::invoke_unchecked`].

mod native;
mod session;
mod symbols;

pub use session::{EntryPoint, JitSession, SessionConfig, SessionState, SymbolResolution};
pub use symbols::{NativeSymbolEnvironment, SymbolBinding};

use thiserror::Error;

/// Errors from creating or driving a [`JitSession`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No usable native code generator for this process
    #[error("JIT engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Operation called out of order
    #[error("cannot {operation} in state '{state}'")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Errors raised while linking a module into a session
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Imports not found in any registered library
    #[error("unresolved external symbol(s): {}", .names.join(", "))]
    UnresolvedSymbol { names: Vec<String> },

    /// An import resolved to a binding with a different signature
    #[error("symbol '{name}' is called as {expected} but bound as {found}")]
    SignatureMismatch {
        name: String,
        expected: String,
        found: String,
    },

    /// The module was generated for another architecture
    #[error("module targets '{module}' but the session runs on '{host}'")]
    TargetMismatch { module: String, host: String },

    /// The backend rejected a function body
    #[error("failed to compile '{function}': {message}")]
    Codegen { function: String, message: String },

    /// Unrecoverable backend failure
    #[error("error in backend: {0}")]
    Backend(String),
}

/// Errors from building a symbol environment
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SymbolError {
    #[error("symbol '{0}' is bound more than once")]
    DuplicateBinding(String),
}

/// Errors from a checked call into generated code
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvokeError {
    #[error("'{name}' has signature {expected} but was called as {found}")]
    SignatureMismatch {
        name: String,
        expected: String,
        found: String,
    },
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
