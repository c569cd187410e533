//! Type mapping between Rust callers and JIT-compiled functions
//!
//! A [`FunctionDescriptor`] is a signature reduced to the scalar types that
//! cross the native boundary. Symbol bindings carry one derived from their
//! Rust function pointer type, and generated code gets one derived from its
//! Cranelift signature, so both sides can be compared before anything runs.
//!
//! Calls use the platform C calling convention, which is what
//! `TargetIsa::default_call_conv` selects for generated code.

use std::fmt;

use cranelift_codegen::ir::{types, AbiParam, Signature, Type as ClifType};
use cranelift_codegen::isa::CallConv;

/// A scalar type passed across the native boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl ValueType {
    /// Map a Cranelift type; vectors and references have no equivalent
    #[must_use]
    pub fn from_clif(ty: ClifType) -> Option<Self> {
        match ty {
            types::I8 => Some(ValueType::I8),
            types::I16 => Some(ValueType::I16),
            types::I32 => Some(ValueType::I32),
            types::I64 => Some(ValueType::I64),
            types::F32 => Some(ValueType::F32),
            types::F64 => Some(ValueType::F64),
            _ => None,
        }
    }

    #[must_use]
    pub const fn to_clif(self) -> ClifType {
        match self {
            ValueType::I8 => types::I8,
            ValueType::I16 => types::I16,
            ValueType::I32 => types::I32,
            ValueType::I64 => types::I64,
            ValueType::F32 => types::F32,
            ValueType::F64 => types::F64,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ValueType::I8 => "i8",
            ValueType::I16 => "i16",
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameter and return types of a native function
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionDescriptor {
    pub params: Vec<ValueType>,
    /// `None` for `void`
    pub ret: Option<ValueType>,
}

impl FunctionDescriptor {
    #[must_use]
    pub fn new(params: impl Into<Vec<ValueType>>, ret: Option<ValueType>) -> Self {
        Self {
            params: params.into(),
            ret,
        }
    }

    /// Describe a Cranelift signature
    ///
    /// Returns `None` for multi-value returns and non-scalar types. Argument
    /// extension attributes are not part of the descriptor.
    #[must_use]
    pub fn from_signature(signature: &Signature) -> Option<Self> {
        let params = signature
            .params
            .iter()
            .map(|p| ValueType::from_clif(p.value_type))
            .collect::<Option<Vec<_>>>()?;
        let ret = match signature.returns.as_slice() {
            [] => None,
            [ret] => Some(ValueType::from_clif(ret.value_type)?),
            _ => return None,
        };
        Some(Self { params, ret })
    }

    /// Cranelift signature for this descriptor
    #[must_use]
    pub fn to_signature(&self, call_conv: CallConv) -> Signature {
        let mut signature = Signature::new(call_conv);
        signature
            .params
            .extend(self.params.iter().map(|t| AbiParam::new(t.to_clif())));
        if let Some(ret) = self.ret {
            signature.returns.push(AbiParam::new(ret.to_clif()));
        }
        signature
    }
}

impl fmt::Display for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        match self.ret {
            Some(ret) => write!(f, ") -> {ret}"),
            None => f.write_str(") -> void"),
        }
    }
}

/// A Rust type that crosses the native boundary as a single scalar
pub trait NativeType: Copy {
    const TYPE: ValueType;
}

macro_rules! native_type {
    ($($ty:ty => $value:ident),* $(,)?) => {
        $(
            impl NativeType for $ty {
                const TYPE: ValueType = ValueType::$value;
            }
        )*
    };
}

native_type! {
    bool => I8,
    i8 => I8,
    u8 => I8,
    i16 => I16,
    u16 => I16,
    i32 => I32,
    u32 => I32,
    i64 => I64,
    u64 => I64,
    f32 => F32,
    f64 => F64,
}

/// A Rust type a native function can return (`()` for `void`)
pub trait NativeReturn {
    const TYPE: Option<ValueType>;
}

impl NativeReturn for () {
    const TYPE: Option<ValueType> = None;
}

macro_rules! native_return {
    ($($ty:ty),*) => {
        $(
            impl NativeReturn for $ty {
                const TYPE: Option<ValueType> = Some(<$ty as NativeType>::TYPE);
            }
        )*
    };
}

native_return!(bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

/// A tuple of arguments for calling a native function by address
pub trait NativeArgs {
    fn value_types() -> Vec<ValueType>;

    /// Call the C function at `address` with these arguments
    ///
    /// # Safety
    ///
    /// `address` must point to a live function whose C signature is exactly
    /// `(Self...) -> R`.
    unsafe fn call<R: NativeReturn>(self, address: *const u8) -> R;
}

/// A C function pointer that can be registered as a symbol binding
pub trait NativeFunction: Copy {
    fn descriptor() -> FunctionDescriptor;

    fn address(self) -> *const u8;
}

macro_rules! native_arity {
    ($($arg:ident),*) => {
        impl<$($arg: NativeType),*> NativeArgs for ($($arg,)*) {
            fn value_types() -> Vec<ValueType> {
                vec![$($arg::TYPE),*]
            }

            #[allow(non_snake_case)]
            unsafe fn call<R: NativeReturn>(self, address: *const u8) -> R {
                // SAFETY: the caller guarantees `address` has this exact signature
                let function = unsafe {
                    std::mem::transmute::<*const u8, extern "C" fn($($arg),*) -> R>(address)
                };
                let ($($arg,)*) = self;
                function($($arg),*)
            }
        }

        impl<R: NativeReturn, $($arg: NativeType),*> NativeFunction for extern "C" fn($($arg),*) -> R {
            fn descriptor() -> FunctionDescriptor {
                let params: Vec<ValueType> = vec![$($arg::TYPE),*];
                FunctionDescriptor::new(params, R::TYPE)
            }

            fn address(self) -> *const u8 {
                self as *const u8
            }
        }

        impl<R: NativeReturn, $($arg: NativeType),*> NativeFunction for unsafe extern "C" fn($($arg),*) -> R {
            fn descriptor() -> FunctionDescriptor {
                let params: Vec<ValueType> = vec![$($arg::TYPE),*];
                FunctionDescriptor::new(params, R::TYPE)
            }

            fn address(self) -> *const u8 {
                self as *const u8
            }
        }
    };
}

native_arity!();
native_arity!(A);
native_arity!(A, B);
native_arity!(A, B, C);
native_arity!(A, B, C, D);
native_arity!(A, B, C, D, E);
native_arity!(A, B, C, D, E, F);

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn add(a: i32, b: i32) -> i32 {
        a + b
    }

    extern "C" fn scale(x: f64, by: f32) -> f64 {
        x * f64::from(by)
    }

    extern "C" fn nothing() {}

    #[test]
    fn descriptors_from_rust_types() {
        assert_eq!(
            <extern "C" fn(i32, i32) -> i32 as NativeFunction>::descriptor(),
            FunctionDescriptor::new([ValueType::I32, ValueType::I32], Some(ValueType::I32))
        );
        assert_eq!(
            <extern "C" fn() as NativeFunction>::descriptor().to_string(),
            "() -> void"
        );
        assert_eq!(<(f64, u8)>::value_types(), [ValueType::F64, ValueType::I8]);
    }

    #[test]
    fn descriptor_round_trips_through_signature() {
        let descriptor =
            FunctionDescriptor::new([ValueType::F64, ValueType::I64], Some(ValueType::F32));
        let signature = descriptor.to_signature(CallConv::SystemV);
        assert_eq!(FunctionDescriptor::from_signature(&signature), Some(descriptor));
    }

    #[test]
    fn extension_attributes_are_ignored() {
        let mut signature = Signature::new(CallConv::SystemV);
        signature.params.push(AbiParam::new(types::I8).sext());
        assert_eq!(
            FunctionDescriptor::from_signature(&signature),
            Some(FunctionDescriptor::new([ValueType::I8], None))
        );
    }

    #[test]
    fn multi_value_returns_have_no_descriptor() {
        let mut signature = Signature::new(CallConv::SystemV);
        signature.returns.push(AbiParam::new(types::I32));
        signature.returns.push(AbiParam::new(types::I32));
        assert_eq!(FunctionDescriptor::from_signature(&signature), None);
    }

    #[test]
    fn calls_through_an_address() {
        let address = (add as extern "C" fn(i32, i32) -> i32).address();
        // SAFETY: `address` is `add`
        let sum: i32 = unsafe { (2_i32, 40_i32).call(address) };
        assert_eq!(sum, 42);

        let address = (scale as extern "C" fn(f64, f32) -> f64).address();
        // SAFETY: `address` is `scale`
        let scaled: f64 = unsafe { (1.5_f64, 2.0_f32).call(address) };
        assert!((scaled - 3.0).abs() < f64::EPSILON);

        let address = (nothing as extern "C" fn()).address();
        // SAFETY: `address` is `nothing`
        unsafe { ().call::<()>(address) };
    }
}
