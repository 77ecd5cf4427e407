//! Data types carried by RTL expressions.
//!
//! The lifter only needs a small type vocabulary: primitive scalars with a
//! domain and a bit size, and fixed-length arrays used to describe the lane
//! layout of vector values. Every expression reports one of these so that
//! assignments can be checked against the width of their destination.

use std::fmt;

/// Interpretation of the bits of a primitive value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    /// Raw bits with no further interpretation.
    Word,
    SignedInt,
    UnsignedInt,
    Real,
    Pointer,
    /// No value; the result type of calls made only for their side effects.
    Void,
}

/// A scalar type: a domain plus a bit size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrimitiveType {
    pub domain: Domain,
    pub bits: u32,
}

impl PrimitiveType {
    pub const VOID: Self = Self::new(Domain::Void, 0);
    pub const BYTE: Self = Self::word(8);
    pub const WORD32: Self = Self::word(32);
    pub const WORD64: Self = Self::word(64);
    pub const INT32: Self = Self::int(32);
    pub const REAL32: Self = Self::real(32);
    pub const REAL64: Self = Self::real(64);

    pub const fn new(domain: Domain, bits: u32) -> Self {
        Self { domain, bits }
    }

    pub const fn word(bits: u32) -> Self {
        Self::new(Domain::Word, bits)
    }

    pub const fn int(bits: u32) -> Self {
        Self::new(Domain::SignedInt, bits)
    }

    pub const fn uint(bits: u32) -> Self {
        Self::new(Domain::UnsignedInt, bits)
    }

    pub const fn real(bits: u32) -> Self {
        Self::new(Domain::Real, bits)
    }

    pub const fn ptr(bits: u32) -> Self {
        Self::new(Domain::Pointer, bits)
    }

    /// Size in whole bytes, rounding partial bytes up.
    pub const fn size(&self) -> u32 {
        self.bits.div_ceil(8)
    }

    /// Short suffix used when rendering constants, e.g. `32`, `i32`, `r64`.
    pub fn suffix(&self) -> String {
        match self.domain {
            Domain::Word => format!("{}", self.bits),
            Domain::SignedInt => format!("i{}", self.bits),
            Domain::UnsignedInt => format!("u{}", self.bits),
            Domain::Real => format!("r{}", self.bits),
            Domain::Pointer => format!("p{}", self.bits),
            Domain::Void => "void".to_string(),
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.domain {
            Domain::Word if self.bits == 8 => write!(f, "byte"),
            Domain::Word => write!(f, "word{}", self.bits),
            Domain::SignedInt => write!(f, "int{}", self.bits),
            Domain::UnsignedInt => write!(f, "uint{}", self.bits),
            Domain::Real => write!(f, "real{}", self.bits),
            Domain::Pointer => write!(f, "ptr{}", self.bits),
            Domain::Void => write!(f, "void"),
        }
    }
}

/// Type of an expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    Prim(PrimitiveType),
    /// `count` consecutive lanes of `elem`.
    Array { elem: Box<DataType>, count: u32 },
}

impl DataType {
    pub const fn word(bits: u32) -> Self {
        DataType::Prim(PrimitiveType::word(bits))
    }

    pub fn array(elem: DataType, count: u32) -> Self {
        DataType::Array {
            elem: Box::new(elem),
            count,
        }
    }

    pub fn bit_size(&self) -> u32 {
        match self {
            DataType::Prim(p) => p.bits,
            DataType::Array { elem, count } => elem.bit_size() * count,
        }
    }

    pub fn size(&self) -> u32 {
        self.bit_size().div_ceil(8)
    }

    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self {
            DataType::Prim(p) => Some(*p),
            DataType::Array { .. } => None,
        }
    }

    pub fn is_real(&self) -> bool {
        matches!(self, DataType::Prim(p) if p.domain == Domain::Real)
    }
}

impl From<PrimitiveType> for DataType {
    fn from(p: PrimitiveType) -> Self {
        DataType::Prim(p)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Prim(p) => write!(f, "{p}"),
            DataType::Array { elem, count } => write!(f, "(arr {elem} {count})"),
        }
    }
}

/// Scalar interpretation of one vector lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaneKind {
    /// Integer lane whose signedness the instruction does not care about.
    Int,
    Signed,
    Unsigned,
    Float,
    Polynomial,
}

/// Element type applied uniformly across the lanes of a vector register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementType {
    pub kind: LaneKind,
    pub bits: u32,
}

impl ElementType {
    pub const fn new(kind: LaneKind, bits: u32) -> Self {
        Self { kind, bits }
    }

    /// Lane tag as it appears in vector intrinsic names: `i8`, `s16`, `u32`, `f64`.
    pub fn name(&self) -> String {
        let c = match self.kind {
            LaneKind::Int => 'i',
            LaneKind::Signed => 's',
            LaneKind::Unsigned => 'u',
            LaneKind::Float => 'f',
            LaneKind::Polynomial => 'p',
        };
        format!("{c}{}", self.bits)
    }

    /// Tag used in conversion intrinsic names, where signed lanes are `i`.
    pub fn conversion_tag(&self) -> String {
        let c = match self.kind {
            LaneKind::Int | LaneKind::Signed => 'i',
            LaneKind::Unsigned => 'u',
            LaneKind::Float => 'f',
            LaneKind::Polynomial => 'p',
        };
        format!("{c}{}", self.bits)
    }

    /// The primitive type of a single lane.
    pub fn primitive(&self) -> PrimitiveType {
        match self.kind {
            LaneKind::Int | LaneKind::Polynomial => PrimitiveType::word(self.bits),
            LaneKind::Signed => PrimitiveType::int(self.bits),
            LaneKind::Unsigned => PrimitiveType::uint(self.bits),
            LaneKind::Float => PrimitiveType::real(self.bits),
        }
    }
}
