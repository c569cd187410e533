//! Host math functions exposed to generated code
//!
//! These are `extern "C"` shims over the standard library, bound under the
//! C library names a snippet declares through `<math.h>` and `<stdlib.h>`.

use libc::{c_int, c_long};

use super::symbols::SymbolBinding;

macro_rules! unary {
    ($ty:ty; $($name:ident => $method:ident),* $(,)?) => {
        $(
            extern "C" fn $name(x: $ty) -> $ty {
                x.$method()
            }
        )*
    };
}

unary! { f64;
    sin => sin, cos => cos, tan => tan,
    asin => asin, acos => acos, atan => atan,
    sinh => sinh, cosh => cosh, tanh => tanh,
    exp => exp, exp2 => exp2,
    log => ln, log2 => log2, log10 => log10,
    sqrt => sqrt, cbrt => cbrt, fabs => abs,
    floor => floor, ceil => ceil, round => round, trunc => trunc,
}

unary! { f32;
    sinf => sin, cosf => cos, tanf => tan,
    expf => exp, logf => ln, sqrtf => sqrt,
    fabsf => abs, floorf => floor, ceilf => ceil,
}

extern "C" fn atan2(y: f64, x: f64) -> f64 {
    y.atan2(x)
}

extern "C" fn pow(x: f64, y: f64) -> f64 {
    x.powf(y)
}

extern "C" fn powf(x: f32, y: f32) -> f32 {
    x.powf(y)
}

// `%` on floats truncates like C's fmod
extern "C" fn fmod(x: f64, y: f64) -> f64 {
    x % y
}

extern "C" fn hypot(x: f64, y: f64) -> f64 {
    x.hypot(y)
}

extern "C" fn fmin(x: f64, y: f64) -> f64 {
    x.min(y)
}

extern "C" fn fmax(x: f64, y: f64) -> f64 {
    x.max(y)
}

extern "C" fn abs(x: c_int) -> c_int {
    x.wrapping_abs()
}

extern "C" fn labs(x: c_long) -> c_long {
    x.wrapping_abs()
}

macro_rules! bindings {
    ($($name:ident: ($($arg:ty),*) -> $ret:ty),* $(,)?) => {
        vec![$(
            SymbolBinding::new(stringify!($name), $name as extern "C" fn($($arg),*) -> $ret)
        ),*]
    };
}

/// Bindings for the math preset
pub(super) fn math_bindings() -> Vec<SymbolBinding> {
    bindings![
        sin: (f64) -> f64,
        cos: (f64) -> f64,
        tan: (f64) -> f64,
        asin: (f64) -> f64,
        acos: (f64) -> f64,
        atan: (f64) -> f64,
        atan2: (f64, f64) -> f64,
        sinh: (f64) -> f64,
        cosh: (f64) -> f64,
        tanh: (f64) -> f64,
        exp: (f64) -> f64,
        exp2: (f64) -> f64,
        log: (f64) -> f64,
        log2: (f64) -> f64,
        log10: (f64) -> f64,
        pow: (f64, f64) -> f64,
        sqrt: (f64) -> f64,
        cbrt: (f64) -> f64,
        fabs: (f64) -> f64,
        floor: (f64) -> f64,
        ceil: (f64) -> f64,
        round: (f64) -> f64,
        trunc: (f64) -> f64,
        fmod: (f64, f64) -> f64,
        hypot: (f64, f64) -> f64,
        fmin: (f64, f64) -> f64,
        fmax: (f64, f64) -> f64,
        sinf: (f32) -> f32,
        cosf: (f32) -> f32,
        tanf: (f32) -> f32,
        expf: (f32) -> f32,
        logf: (f32) -> f32,
        powf: (f32, f32) -> f32,
        sqrtf: (f32) -> f32,
        fabsf: (f32) -> f32,
        floorf: (f32) -> f32,
        ceilf: (f32) -> f32,
        abs: (c_int) -> c_int,
        labs: (c_long) -> c_long,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_semantics() {
        assert_eq!(fmod(-7.5, 2.0), -1.5);
        assert_eq!(round(-2.5), -3.0);
        assert_eq!(abs(c_int::MIN), c_int::MIN);
        assert_eq!(labs(-4), 4);
        assert!(fmin(f64::NAN, 1.0) == 1.0);
    }

    #[test]
    fn math_table_names_are_unique() {
        let bindings = math_bindings();
        let mut names: Vec<&str> = bindings.iter().map(SymbolBinding::name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), bindings.len());
    }
}
