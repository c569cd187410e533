//! Scalar C types understood by the front end

use std::fmt;

/// Integer conversion rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IntRank {
    Char,
    Short,
    Int,
    Long,
    LongLong,
}

/// Widths that depend on the target's data model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataModel {
    pub long_bits: u8,
    pub pointer_bits: u8,
}

impl DataModel {
    /// LP64: 64-bit `long` and pointers
    pub const LP64: DataModel = DataModel {
        long_bits: 64,
        pointer_bits: 64,
    };

    /// LLP64 (Windows): 32-bit `long`, 64-bit pointers
    pub const LLP64: DataModel = DataModel {
        long_bits: 32,
        pointer_bits: 64,
    };

    /// Data model for a target triple and pointer width
    #[must_use]
    pub fn for_target(triple: &str, pointer_bits: u8) -> Self {
        let long_bits = if triple.contains("windows") {
            32
        } else {
            pointer_bits
        };
        Self {
            long_bits,
            pointer_bits,
        }
    }

    /// Type of `sizeof` expressions (`size_t`)
    #[must_use]
    pub const fn size_type(self) -> CType {
        if self.long_bits == self.pointer_bits {
            CType::Integer {
                rank: IntRank::Long,
                signed: false,
            }
        } else {
            CType::Integer {
                rank: IntRank::LongLong,
                signed: false,
            }
        }
    }
}

/// A scalar C type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CType {
    Void,
    Bool,
    Integer { rank: IntRank, signed: bool },
    Float,
    Double,
}

impl CType {
    pub const INT: CType = CType::Integer {
        rank: IntRank::Int,
        signed: true,
    };
    pub const UINT: CType = CType::Integer {
        rank: IntRank::Int,
        signed: false,
    };
    pub const CHAR: CType = CType::Integer {
        rank: IntRank::Char,
        signed: true,
    };
    pub const LONG: CType = CType::Integer {
        rank: IntRank::Long,
        signed: true,
    };

    #[must_use]
    pub const fn is_void(self) -> bool {
        matches!(self, CType::Void)
    }

    #[must_use]
    pub const fn is_floating(self) -> bool {
        matches!(self, CType::Float | CType::Double)
    }

    /// Integer types including `bool`
    #[must_use]
    pub const fn is_integral(self) -> bool {
        matches!(self, CType::Bool | CType::Integer { .. })
    }

    #[must_use]
    pub const fn is_arithmetic(self) -> bool {
        !self.is_void()
    }

    #[must_use]
    pub const fn is_signed(self) -> bool {
        matches!(self, CType::Integer { signed: true, .. })
    }

    /// Width in bits; `void` has none
    #[must_use]
    pub const fn bits(self, model: DataModel) -> u32 {
        match self {
            CType::Void => 0,
            CType::Bool => 8,
            CType::Integer { rank, .. } => match rank {
                IntRank::Char => 8,
                IntRank::Short => 16,
                IntRank::Int => 32,
                IntRank::Long => model.long_bits as u32,
                IntRank::LongLong => 64,
            },
            CType::Float => 32,
            CType::Double => 64,
        }
    }

    /// `sizeof` in bytes
    #[must_use]
    pub const fn size_bytes(self, model: DataModel) -> u64 {
        (self.bits(model) / 8) as u64
    }

    /// Integer promotion: anything narrower than `int` becomes `int`
    #[must_use]
    pub fn promoted(self) -> CType {
        match self {
            CType::Bool => CType::INT,
            CType::Integer { rank, .. } if rank < IntRank::Int => CType::INT,
            other => other,
        }
    }

    /// The usual arithmetic conversions for a binary operator
    #[must_use]
    pub fn common(self, other: CType, model: DataModel) -> CType {
        if self == CType::Double || other == CType::Double {
            return CType::Double;
        }
        if self == CType::Float || other == CType::Float {
            return CType::Float;
        }
        let (a, b) = (self.promoted(), other.promoted());
        let (
            CType::Integer {
                rank: ra,
                signed: sa,
            },
            CType::Integer {
                rank: rb,
                signed: sb,
            },
        ) = (a, b)
        else {
            return a;
        };
        if sa == sb {
            return if ra >= rb { a } else { b };
        }
        let (signed_rank, unsigned_rank) = if sa { (ra, rb) } else { (rb, ra) };
        let (signed_ty, unsigned_ty) = if sa { (a, b) } else { (b, a) };
        if unsigned_rank >= signed_rank {
            unsigned_ty
        } else if signed_ty.bits(model) > unsigned_ty.bits(model) {
            signed_ty
        } else {
            CType::Integer {
                rank: signed_rank,
                signed: false,
            }
        }
    }

    /// Spelling used in diagnostics
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            CType::Void => "void",
            CType::Bool => "bool",
            CType::Float => "float",
            CType::Double => "double",
            CType::Integer { rank, signed } => match (rank, signed) {
                (IntRank::Char, true) => "char",
                (IntRank::Char, false) => "unsigned char",
                (IntRank::Short, true) => "short",
                (IntRank::Short, false) => "unsigned short",
                (IntRank::Int, true) => "int",
                (IntRank::Int, false) => "unsigned int",
                (IntRank::Long, true) => "long",
                (IntRank::Long, false) => "unsigned long",
                (IntRank::LongLong, true) => "long long",
                (IntRank::LongLong, false) => "unsigned long long",
            },
        }
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
