//! Intrinsic pseudo-procedures.
//!
//! Operations that RTL cannot express as ordinary arithmetic (lane permutes,
//! saturating arithmetic, table lookups, packed conversions...) are emitted as
//! calls to intrinsics. An intrinsic is described structurally by an
//! [`IntrinsicDescriptor`]; its name string is produced only by
//! [`IntrinsicDescriptor::canonical_name`], so two equal descriptors can never
//! render differently. The names are a stable contract with the stages that
//! consume RTL.

use super::types::ElementType;
use hashbrown::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Operation performed by an intrinsic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntrinsicKind {
    // Lane-wise binary operations.
    Vabd,
    Vadd,
    Vand,
    Vbic,
    Vceq,
    Vcge,
    Vcgt,
    Veor,
    Vmax,
    Vmin,
    Vmul,
    Vorn,
    Vorr,
    Vpadd,
    Vqadd,
    Vqsub,
    Vshl,
    Vsub,
    // Lane-wise unary operations.
    Vabs,
    Vmov,
    Vmvn,
    VmvnImm,
    Vneg,
    Vdup,
    // Whole-register operations.
    Vbsl,
    Vext,
    Vtbl,
    Vcvt,
    // Structured memory transfers.
    Vld1Multi,
    Vld2,
    Vld3,
    Vld4,
    Vst1Multi,
    Vst2,
    Vst3,
    Vst4,
    // Scalar math library functions.
    Trunc,
    Sqrt,
    Sqrtf,
    Fabs,
    Fabsf,
}

/// Static facts about an intrinsic kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntrinsicInfo {
    pub kind: IntrinsicKind,
    /// Base of the canonical name.
    pub base: &'static str,
    /// Vector intrinsics carry a `__v` prefix; math library functions do not.
    pub vector: bool,
    /// Number of arguments, if fixed.
    pub arity: Option<usize>,
    /// Whether the intrinsic only computes a value (no memory side effects).
    pub pure: bool,
}

impl IntrinsicKind {
    pub const ALL: &'static [IntrinsicKind] = &[
        IntrinsicKind::Vabd,
        IntrinsicKind::Vadd,
        IntrinsicKind::Vand,
        IntrinsicKind::Vbic,
        IntrinsicKind::Vceq,
        IntrinsicKind::Vcge,
        IntrinsicKind::Vcgt,
        IntrinsicKind::Veor,
        IntrinsicKind::Vmax,
        IntrinsicKind::Vmin,
        IntrinsicKind::Vmul,
        IntrinsicKind::Vorn,
        IntrinsicKind::Vorr,
        IntrinsicKind::Vpadd,
        IntrinsicKind::Vqadd,
        IntrinsicKind::Vqsub,
        IntrinsicKind::Vshl,
        IntrinsicKind::Vsub,
        IntrinsicKind::Vabs,
        IntrinsicKind::Vmov,
        IntrinsicKind::Vmvn,
        IntrinsicKind::VmvnImm,
        IntrinsicKind::Vneg,
        IntrinsicKind::Vdup,
        IntrinsicKind::Vbsl,
        IntrinsicKind::Vext,
        IntrinsicKind::Vtbl,
        IntrinsicKind::Vcvt,
        IntrinsicKind::Vld1Multi,
        IntrinsicKind::Vld2,
        IntrinsicKind::Vld3,
        IntrinsicKind::Vld4,
        IntrinsicKind::Vst1Multi,
        IntrinsicKind::Vst2,
        IntrinsicKind::Vst3,
        IntrinsicKind::Vst4,
        IntrinsicKind::Trunc,
        IntrinsicKind::Sqrt,
        IntrinsicKind::Sqrtf,
        IntrinsicKind::Fabs,
        IntrinsicKind::Fabsf,
    ];

    pub const fn info(self) -> IntrinsicInfo {
        use IntrinsicKind::*;
        const fn vec(kind: IntrinsicKind, base: &'static str, arity: usize) -> IntrinsicInfo {
            IntrinsicInfo { kind, base, vector: true, arity: Some(arity), pure: true }
        }
        const fn math(kind: IntrinsicKind, base: &'static str) -> IntrinsicInfo {
            IntrinsicInfo { kind, base, vector: false, arity: Some(1), pure: true }
        }
        match self {
            Vabd => vec(self, "vabd", 2),
            Vadd => vec(self, "vadd", 2),
            Vand => vec(self, "vand", 2),
            Vbic => vec(self, "vbic", 2),
            Vceq => vec(self, "vceq", 2),
            Vcge => vec(self, "vcge", 2),
            Vcgt => vec(self, "vcgt", 2),
            Veor => vec(self, "veor", 2),
            Vmax => vec(self, "vmax", 2),
            Vmin => vec(self, "vmin", 2),
            Vmul => vec(self, "vmul", 2),
            Vorn => vec(self, "vorn", 2),
            Vorr => vec(self, "vorr", 2),
            Vpadd => vec(self, "vpadd", 2),
            Vqadd => vec(self, "vqadd", 2),
            Vqsub => vec(self, "vqsub", 2),
            Vshl => vec(self, "vshl", 2),
            Vsub => vec(self, "vsub", 2),
            Vabs => vec(self, "vabs", 1),
            Vmov => vec(self, "vmov", 1),
            Vmvn => vec(self, "vmvn", 1),
            VmvnImm => vec(self, "vmvn_imm", 1),
            Vneg => vec(self, "vneg", 1),
            Vdup => vec(self, "vdup", 1),
            Vbsl => vec(self, "vbsl", 3),
            Vext => vec(self, "vext", 3),
            Vtbl => vec(self, "vtbl", 2),
            Vcvt => vec(self, "vcvt", 1),
            Vld1Multi => vec(self, "vld1_multi", 1),
            Vld2 => vec(self, "vld2", 1),
            Vld3 => vec(self, "vld3", 1),
            Vld4 => vec(self, "vld4", 1),
            Vst1Multi => IntrinsicInfo { kind: self, base: "vst1_multi", vector: true, arity: Some(2), pure: false },
            Vst2 => IntrinsicInfo { kind: self, base: "vst2", vector: true, arity: Some(2), pure: false },
            Vst3 => IntrinsicInfo { kind: self, base: "vst3", vector: true, arity: Some(2), pure: false },
            Vst4 => IntrinsicInfo { kind: self, base: "vst4", vector: true, arity: Some(2), pure: false },
            Trunc => math(self, "trunc"),
            Sqrt => math(self, "sqrt"),
            Sqrtf => math(self, "sqrtf"),
            Fabs => math(self, "fabs"),
            Fabsf => math(self, "fabsf"),
        }
    }
}

/// One parameter of an intrinsic instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntrinsicParam {
    /// Lane type, rendered with its lane tag (`s16`, `f32`...).
    Elem(ElementType),
    /// One side of a conversion, rendered with its conversion tag (`i32`, `u16`, `f64`).
    Conv(ElementType),
    /// A bit width.
    Bits(u32),
}

impl fmt::Display for IntrinsicParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntrinsicParam::Elem(e) => f.write_str(&e.name()),
            IntrinsicParam::Conv(e) => f.write_str(&e.conversion_tag()),
            IntrinsicParam::Bits(b) => write!(f, "{b}"),
        }
    }
}

/// Structured identity of an intrinsic instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntrinsicDescriptor {
    pub kind: IntrinsicKind,
    pub params: Vec<IntrinsicParam>,
}

impl IntrinsicDescriptor {
    pub fn new(kind: IntrinsicKind, params: Vec<IntrinsicParam>) -> Self {
        Self { kind, params }
    }

    pub fn plain(kind: IntrinsicKind) -> Self {
        Self::new(kind, Vec::new())
    }

    pub fn with_elem(kind: IntrinsicKind, elem: ElementType) -> Self {
        Self::new(kind, vec![IntrinsicParam::Elem(elem)])
    }

    pub fn with_bits(kind: IntrinsicKind, bits: u32) -> Self {
        Self::new(kind, vec![IntrinsicParam::Bits(bits)])
    }

    /// The name by which downstream stages know this intrinsic.
    ///
    /// Vector intrinsics are `__<base>` followed by `_<param>` for each
    /// parameter in order, e.g. `__vbic_i32`, `__vdup_32`,
    /// `__vld1_multi_32_i32`, `__vcvt_f32_i32`. Math library functions are
    /// their bare base name (`sqrtf`, `trunc`).
    pub fn canonical_name(&self) -> String {
        let info = self.kind.info();
        let mut name = String::new();
        if info.vector {
            name.push_str("__");
        }
        name.push_str(info.base);
        for param in &self.params {
            name.push('_');
            name.push_str(&param.to_string());
        }
        name
    }

    pub fn info(&self) -> IntrinsicInfo {
        self.kind.info()
    }
}

impl fmt::Display for IntrinsicDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_name())
    }
}

/// Read-only registry of every intrinsic kind the lifter can emit.
#[derive(Debug)]
pub struct IntrinsicCatalog {
    by_base: HashMap<&'static str, IntrinsicKind>,
}

impl IntrinsicCatalog {
    fn build() -> Self {
        let by_base = IntrinsicKind::ALL
            .iter()
            .map(|kind| (kind.info().base, *kind))
            .collect();
        Self { by_base }
    }

    /// The process-wide catalog, shared by all rewrite sessions.
    pub fn global() -> &'static IntrinsicCatalog {
        static CATALOG: OnceLock<IntrinsicCatalog> = OnceLock::new();
        CATALOG.get_or_init(Self::build)
    }

    /// Find the kind whose base name is `base` (`"vbic"`, `"sqrtf"`...).
    pub fn lookup(&self, base: &str) -> Option<IntrinsicKind> {
        self.by_base.get(base).copied()
    }

    pub fn len(&self) -> usize {
        self.by_base.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_base.is_empty()
    }

    pub fn kinds(&self) -> impl Iterator<Item = IntrinsicKind> + '_ {
        self.by_base.values().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::LaneKind;

    const I32: ElementType = ElementType::new(LaneKind::Int, 32);
    const U8: ElementType = ElementType::new(LaneKind::Unsigned, 8);

    #[test]
    fn test_vector_names() {
        assert_eq!(
            IntrinsicDescriptor::with_elem(IntrinsicKind::Vbic, I32).canonical_name(),
            "__vbic_i32"
        );
        assert_eq!(
            IntrinsicDescriptor::with_elem(IntrinsicKind::Vmov, U8).canonical_name(),
            "__vmov_u8"
        );
        assert_eq!(
            IntrinsicDescriptor::with_bits(IntrinsicKind::Vdup, 32).canonical_name(),
            "__vdup_32"
        );
        assert_eq!(IntrinsicDescriptor::plain(IntrinsicKind::Vext).canonical_name(), "__vext");
        assert_eq!(
            IntrinsicDescriptor::with_elem(IntrinsicKind::VmvnImm, I32).canonical_name(),
            "__vmvn_imm_i32"
        );
    }

    #[test]
    fn test_math_names_have_no_prefix() {
        assert_eq!(IntrinsicDescriptor::plain(IntrinsicKind::Sqrt).canonical_name(), "sqrt");
        assert_eq!(IntrinsicDescriptor::plain(IntrinsicKind::Trunc).canonical_name(), "trunc");
    }

    #[test]
    fn test_conversion_and_transfer_names() {
        let f32 = ElementType::new(LaneKind::Float, 32);
        let s32 = ElementType::new(LaneKind::Signed, 32);
        let cvt = IntrinsicDescriptor::new(
            IntrinsicKind::Vcvt,
            vec![IntrinsicParam::Conv(s32), IntrinsicParam::Conv(f32)],
        );
        assert_eq!(cvt.canonical_name(), "__vcvt_i32_f32");

        let ld = IntrinsicDescriptor::new(
            IntrinsicKind::Vld1Multi,
            vec![IntrinsicParam::Bits(32), IntrinsicParam::Elem(I32)],
        );
        assert_eq!(ld.canonical_name(), "__vld1_multi_32_i32");
    }

    #[test]
    fn test_equal_descriptors_render_identically() {
        for kind in IntrinsicKind::ALL {
            let a = IntrinsicDescriptor::with_elem(*kind, U8);
            let b = IntrinsicDescriptor::with_elem(*kind, ElementType::new(LaneKind::Unsigned, 8));
            assert_eq!(a, b);
            assert_eq!(a.canonical_name(), b.canonical_name());
        }
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = IntrinsicCatalog::global();
        assert_eq!(catalog.len(), IntrinsicKind::ALL.len());
        assert_eq!(catalog.kinds().count(), IntrinsicKind::ALL.len());
        assert_eq!(catalog.lookup("vbic"), Some(IntrinsicKind::Vbic));
        assert_eq!(catalog.lookup("vld1_multi"), Some(IntrinsicKind::Vld1Multi));
        assert_eq!(catalog.lookup("sqrtf"), Some(IntrinsicKind::Sqrtf));
        assert_eq!(catalog.lookup("nope"), None);
        assert!(!catalog.lookup("vst2").unwrap().info().pure);
    }
}
