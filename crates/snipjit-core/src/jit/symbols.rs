//! Named native functions that generated code may call

use std::collections::HashMap;
use std::sync::Arc;

use super::{native, JitSession, SessionError, SymbolError};
use crate::abi::{FunctionDescriptor, NativeFunction};

/// A host function bound under a C symbol name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolBinding {
    name: String,
    // Stored as an integer so bindings can be shared across threads
    address: usize,
    descriptor: FunctionDescriptor,
}

impl SymbolBinding {
    /// Bind a typed `extern "C"` function
    pub fn new<F: NativeFunction>(name: impl Into<String>, function: F) -> Self {
        Self {
            name: name.into(),
            address: function.address() as usize,
            descriptor: F::descriptor(),
        }
    }

    /// Bind a raw function address
    ///
    /// # Safety
    ///
    /// `address` must point to a C function matching `descriptor` that stays
    /// alive for as long as any session using this binding.
    pub unsafe fn from_raw(
        name: impl Into<String>,
        address: *const u8,
        descriptor: FunctionDescriptor,
    ) -> Self {
        Self {
            name: name.into(),
            address: address as usize,
            descriptor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> *const u8 {
        self.address as *const u8
    }

    pub fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }
}

/// An immutable set of symbol bindings
///
/// Environments are shared through `Arc` and may be installed into any number
/// of sessions. Names are unique within one environment.
#[derive(Debug, Clone, Default)]
pub struct NativeSymbolEnvironment {
    bindings: Vec<SymbolBinding>,
    index: HashMap<String, usize>,
}

impl NativeSymbolEnvironment {
    pub fn build(bindings: impl IntoIterator<Item = SymbolBinding>) -> Result<Self, SymbolError> {
        bindings
            .into_iter()
            .try_fold(Self::empty(), |env, binding| env.with(binding))
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// `<math.h>` functions plus `abs` and `labs`
    pub fn math() -> Self {
        Self::build(native::math_bindings())
            .unwrap_or_else(|e| unreachable!("math preset is well formed: {e}"))
    }

    /// Add one binding
    pub fn with(mut self, binding: SymbolBinding) -> Result<Self, SymbolError> {
        if self.index.contains_key(binding.name()) {
            return Err(SymbolError::DuplicateBinding(binding.name));
        }
        self.index.insert(binding.name.clone(), self.bindings.len());
        self.bindings.push(binding);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&SymbolBinding> {
        self.index.get(name).map(|&i| &self.bindings[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(SymbolBinding::name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SymbolBinding> {
        self.bindings.iter()
    }

    /// Register this environment with `session`
    pub fn install_into(self: &Arc<Self>, session: &mut JitSession) -> Result<(), SessionError> {
        session.install_symbols(Arc::clone(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::ValueType;

    extern "C" fn twice(x: i32) -> i32 {
        x * 2
    }

    #[test]
    fn lookup_by_name() {
        let env = NativeSymbolEnvironment::build([SymbolBinding::new(
            "twice",
            twice as extern "C" fn(i32) -> i32,
        )])
        .unwrap();
        let binding = env.get("twice").unwrap();
        assert_eq!(
            binding.descriptor(),
            &FunctionDescriptor::new([ValueType::I32], Some(ValueType::I32))
        );
        assert_eq!(binding.address(), twice as extern "C" fn(i32) -> i32 as *const u8);
        assert!(env.get("thrice").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let binding = SymbolBinding::new("twice", twice as extern "C" fn(i32) -> i32);
        let result = NativeSymbolEnvironment::build([binding.clone(), binding]);
        assert_eq!(result.unwrap_err(), SymbolError::DuplicateBinding("twice".into()));
    }

    #[test]
    fn math_preset() {
        let env = NativeSymbolEnvironment::math();
        assert!(env.contains("sin"));
        assert!(env.contains("labs"));
        assert_eq!(
            env.get("pow").unwrap().descriptor().to_string(),
            "(f64, f64) -> f64"
        );
        assert!(!env.contains("printf"));
    }

    #[test]
    fn environments_are_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NativeSymbolEnvironment>();
    }
}
