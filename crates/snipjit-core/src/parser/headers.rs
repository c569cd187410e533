//! In-memory header search for `#include`
//!
//! Nothing is read from the file system. Headers come from two places: the
//! caller's virtual headers and a small builtin set covering the C math and
//! integer headers.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::options::HeaderSearchPolicy;
use crate::source::Language;

const MATH_DECLS: &str = "\
double sin(double); double cos(double); double tan(double);
double asin(double); double acos(double); double atan(double);
double atan2(double, double);
double sinh(double); double cosh(double); double tanh(double);
double exp(double); double exp2(double);
double log(double); double log2(double); double log10(double);
double pow(double, double); double sqrt(double); double cbrt(double);
double fabs(double); double floor(double); double ceil(double);
double round(double); double trunc(double);
double fmod(double, double); double hypot(double, double);
double fmin(double, double); double fmax(double, double);
float sinf(float); float cosf(float); float tanf(float);
float expf(float); float logf(float); float powf(float, float);
float sqrtf(float); float fabsf(float); float floorf(float); float ceilf(float);
";

const STDLIB_DECLS: &str = "\
int abs(int);
long labs(long);
";

const STDINT_DECLS: &str = "\
typedef signed char int8_t;
typedef short int16_t;
typedef int int32_t;
typedef long long int64_t;
typedef unsigned char uint8_t;
typedef unsigned short uint16_t;
typedef unsigned int uint32_t;
typedef unsigned long long uint64_t;
";

// bool, true and false are keywords in every accepted dialect
const STDBOOL_DECLS: &str = "#pragma once\n";

/// Which builtin set a header name belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    /// C headers, wrapped in `extern "C"` when included from C++
    C(&'static str),
    /// `<cname>` C++ headers
    Cxx(&'static str),
}

fn builtin(name: &str) -> Option<Builtin> {
    Some(match name {
        "math.h" => Builtin::C(MATH_DECLS),
        "stdlib.h" => Builtin::C(STDLIB_DECLS),
        "stdint.h" => Builtin::C(STDINT_DECLS),
        "stdbool.h" => Builtin::C(STDBOOL_DECLS),
        "cmath" => Builtin::Cxx(MATH_DECLS),
        "cstdlib" => Builtin::Cxx(STDLIB_DECLS),
        "cstdint" => Builtin::Cxx(STDINT_DECLS),
        _ => return None,
    })
}

/// Resolves header names to header text
pub struct HeaderSearch<'a> {
    policy: HeaderSearchPolicy,
    virtual_headers: Option<&'a BTreeMap<String, String>>,
    language: Language,
}

impl<'a> HeaderSearch<'a> {
    #[must_use]
    pub fn new(
        policy: HeaderSearchPolicy,
        virtual_headers: &'a BTreeMap<String, String>,
        language: Language,
    ) -> Self {
        Self {
            policy,
            virtual_headers: Some(virtual_headers),
            language,
        }
    }

    /// Builtin headers only
    #[must_use]
    pub fn builtin_only(language: Language) -> Self {
        Self {
            policy: HeaderSearchPolicy::default(),
            virtual_headers: None,
            language,
        }
    }

    /// Look up a header; `quoted` is true for `#include "name"`
    #[must_use]
    pub fn find(&self, name: &str, quoted: bool) -> Option<Cow<'a, str>> {
        if quoted {
            self.find_virtual(name).or_else(|| self.find_builtin(name))
        } else {
            self.find_builtin(name).or_else(|| self.find_virtual(name))
        }
    }

    fn find_virtual(&self, name: &str) -> Option<Cow<'a, str>> {
        self.virtual_headers
            .and_then(|headers| headers.get(name))
            .map(|text| Cow::Borrowed(text.as_str()))
    }

    fn find_builtin(&self, name: &str) -> Option<Cow<'a, str>> {
        let system =
            self.policy.use_builtin_includes || self.policy.use_standard_system_includes;
        if !system {
            return None;
        }
        match builtin(name)? {
            Builtin::C(decls) if self.language.is_cxx() => {
                Some(Cow::Owned(format!("extern \"C\" {{\n{decls}}}\n")))
            }
            Builtin::C(decls) => Some(Cow::Borrowed(decls)),
            Builtin::Cxx(decls)
                if self.language.is_cxx() && self.policy.use_standard_cxx_includes =>
            {
                Some(Cow::Owned(format!("extern \"C\" {{\n{decls}}}\n")))
            }
            Builtin::Cxx(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{CStandard, CxxStandard};

    const C: Language = Language::C(CStandard::C11);
    const CXX: Language = Language::Cxx(CxxStandard::Cxx17);

    #[test]
    fn c_headers_are_wrapped_for_cxx() {
        let c = HeaderSearch::builtin_only(C).find("math.h", false).unwrap();
        assert!(c.starts_with("double sin(double);"));

        let cxx = HeaderSearch::builtin_only(CXX).find("math.h", false).unwrap();
        assert!(cxx.starts_with("extern \"C\" {"));
    }

    #[test]
    fn cxx_headers_need_cxx() {
        assert!(HeaderSearch::builtin_only(C).find("cmath", false).is_none());
        assert!(HeaderSearch::builtin_only(CXX).find("cmath", false).is_some());

        let headers = BTreeMap::new();
        let policy = HeaderSearchPolicy {
            use_standard_cxx_includes: false,
            ..HeaderSearchPolicy::default()
        };
        let search = HeaderSearch::new(policy, &headers, CXX);
        assert!(search.find("cmath", false).is_none());
        assert!(search.find("math.h", false).is_some());
    }

    #[test]
    fn policy_disables_builtins() {
        let headers = BTreeMap::new();
        let search = HeaderSearch::new(HeaderSearchPolicy::none(), &headers, C);
        assert!(search.find("math.h", false).is_none());
    }

    #[test]
    fn quoted_includes_prefer_virtual_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("math.h".to_string(), "int shadow(void);".to_string());
        let search = HeaderSearch::new(HeaderSearchPolicy::default(), &headers, C);
        assert_eq!(search.find("math.h", true).unwrap(), "int shadow(void);");
        assert!(search.find("math.h", false).unwrap().contains("sin"));
        assert!(search.find("nope.h", true).is_none());
    }
}
