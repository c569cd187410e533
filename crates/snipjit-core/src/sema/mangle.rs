//! Itanium C++ name mangling for the scalar subset

use crate::ast::{CType, IntRank};

/// Builtin type code in the Itanium ABI
fn type_code(ty: CType) -> char {
    match ty {
        CType::Void => 'v',
        CType::Bool => 'b',
        CType::Float => 'f',
        CType::Double => 'd',
        CType::Integer { rank, signed } => match (rank, signed) {
            (IntRank::Char, true) => 'c',
            (IntRank::Char, false) => 'h',
            (IntRank::Short, true) => 's',
            (IntRank::Short, false) => 't',
            (IntRank::Int, true) => 'i',
            (IntRank::Int, false) => 'j',
            (IntRank::Long, true) => 'l',
            (IntRank::Long, false) => 'm',
            (IntRank::LongLong, true) => 'x',
            (IntRank::LongLong, false) => 'y',
        },
    }
}

/// Mangle a free function in the global namespace
///
/// `add(int, int)` becomes `_Z3addii`; an empty parameter list is encoded as `v`.
#[must_use]
pub fn mangle_function(name: &str, params: &[CType]) -> String {
    let mut out = format!("_Z{}{}", name.len(), name);
    if params.is_empty() {
        out.push('v');
    } else {
        out.extend(params.iter().map(|&ty| type_code(ty)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mangles_builtin_types() {
        assert_eq!(mangle_function("add", &[CType::INT, CType::INT]), "_Z3addii");
        assert_eq!(mangle_function("doSin", &[CType::Double]), "_Z5doSind");
        assert_eq!(mangle_function("tick", &[]), "_Z4tickv");
        let ull = CType::Integer {
            rank: IntRank::LongLong,
            signed: false,
        };
        assert_eq!(
            mangle_function("mix", &[CType::Bool, CType::CHAR, ull, CType::Float]),
            "_Z3mixbcyf"
        );
    }
}
