//! Decoded AArch32 vector instructions.
//!
//! A [`DecodedInstruction`] is produced once by a decoder (or by the listing
//! parser in this crate) and is read-only to the rewriters.

use crate::core::memory::Address;
use crate::core::register_file::{Reg, RegisterFile};
use crate::core::types::{ElementType, LaneKind};
use std::fmt;

/// Instruction classes the rewriters know about.
///
/// Every variant is dispatched exhaustively; encodings that have no rewriter
/// yet are listed explicitly and lift to an unimplemented outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Vabd,
    Vabs,
    Vadd,
    Vand,
    Vbic,
    Vbsl,
    Vceq,
    Vcge,
    Vcgt,
    Vcmp,
    Vcmpe,
    Vcvt,
    Vcvtr,
    Vdiv,
    Vdup,
    Veor,
    Vext,
    Vfma,
    Vfms,
    Vld1,
    Vld2,
    Vld3,
    Vld4,
    Vldmia,
    Vldr,
    Vmax,
    Vmin,
    Vmla,
    Vmls,
    Vmov,
    Vmrs,
    Vmsr,
    Vmul,
    Vmvn,
    Vneg,
    Vorn,
    Vorr,
    Vpadd,
    Vpop,
    Vpush,
    Vqadd,
    Vqsub,
    Vshl,
    Vsqrt,
    Vst1,
    Vst2,
    Vst3,
    Vst4,
    Vstmdb,
    Vstmia,
    Vstr,
    Vsub,
    Vtbl,
    // No rewriter yet.
    Vcnt,
    Vrecpe,
    Vrev64,
    Vrsqrte,
    Vswp,
    Vtrn,
    Vuzp,
    Vzip,
    /// Text or encoding that could not be decoded.
    Invalid,
}

const MNEMONICS: &[(&str, Opcode)] = &[
    ("vabd", Opcode::Vabd),
    ("vabs", Opcode::Vabs),
    ("vadd", Opcode::Vadd),
    ("vand", Opcode::Vand),
    ("vbic", Opcode::Vbic),
    ("vbsl", Opcode::Vbsl),
    ("vceq", Opcode::Vceq),
    ("vcge", Opcode::Vcge),
    ("vcgt", Opcode::Vcgt),
    ("vcmp", Opcode::Vcmp),
    ("vcmpe", Opcode::Vcmpe),
    ("vcvt", Opcode::Vcvt),
    ("vcvtr", Opcode::Vcvtr),
    ("vdiv", Opcode::Vdiv),
    ("vdup", Opcode::Vdup),
    ("veor", Opcode::Veor),
    ("vext", Opcode::Vext),
    ("vfma", Opcode::Vfma),
    ("vfms", Opcode::Vfms),
    ("vld1", Opcode::Vld1),
    ("vld2", Opcode::Vld2),
    ("vld3", Opcode::Vld3),
    ("vld4", Opcode::Vld4),
    ("vldmia", Opcode::Vldmia),
    ("vldr", Opcode::Vldr),
    ("vmax", Opcode::Vmax),
    ("vmin", Opcode::Vmin),
    ("vmla", Opcode::Vmla),
    ("vmls", Opcode::Vmls),
    ("vmov", Opcode::Vmov),
    ("vmrs", Opcode::Vmrs),
    ("vmsr", Opcode::Vmsr),
    ("vmul", Opcode::Vmul),
    ("vmvn", Opcode::Vmvn),
    ("vneg", Opcode::Vneg),
    ("vorn", Opcode::Vorn),
    ("vorr", Opcode::Vorr),
    ("vpadd", Opcode::Vpadd),
    ("vpop", Opcode::Vpop),
    ("vpush", Opcode::Vpush),
    ("vqadd", Opcode::Vqadd),
    ("vqsub", Opcode::Vqsub),
    ("vshl", Opcode::Vshl),
    ("vsqrt", Opcode::Vsqrt),
    ("vst1", Opcode::Vst1),
    ("vst2", Opcode::Vst2),
    ("vst3", Opcode::Vst3),
    ("vst4", Opcode::Vst4),
    ("vstmdb", Opcode::Vstmdb),
    ("vstmia", Opcode::Vstmia),
    ("vstr", Opcode::Vstr),
    ("vsub", Opcode::Vsub),
    ("vtbl", Opcode::Vtbl),
    ("vcnt", Opcode::Vcnt),
    ("vrecpe", Opcode::Vrecpe),
    ("vrev64", Opcode::Vrev64),
    ("vrsqrte", Opcode::Vrsqrte),
    ("vswp", Opcode::Vswp),
    ("vtrn", Opcode::Vtrn),
    ("vuzp", Opcode::Vuzp),
    ("vzip", Opcode::Vzip),
];

impl Opcode {
    pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
        let lower = mnemonic.to_ascii_lowercase();
        MNEMONICS
            .iter()
            .find(|(m, _)| *m == lower)
            .map(|(_, op)| *op)
    }

    pub fn mnemonic(self) -> &'static str {
        if self == Opcode::Invalid {
            return "(bad)";
        }
        MNEMONICS
            .iter()
            .find(|(_, op)| *op == self)
            .map_or("?", |(m, _)| *m)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Lane width used when an instruction's element tag yields no width.
///
/// Some encodings reach the rewriters without an element size. They are
/// treated as having 8-bit lanes. This is a known defect that existing
/// output depends on; do not change it without migrating consumers.
pub const FALLBACK_LANE_BITS: u32 = 8;

/// Element type modifier of a vector instruction (`.i32`, `.f64`, `.s32.f32`...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorData {
    /// The instruction carries no element type.
    Invalid,
    Elem(ElementType),
    /// A conversion, destination type first.
    Convert { dst: ElementType, src: ElementType },
}

impl VectorData {
    pub fn elem(self) -> Option<ElementType> {
        match self {
            VectorData::Elem(e) => Some(e),
            _ => None,
        }
    }

    /// Lane width in bits, zero if the tag names no single element type.
    pub fn lane_bits(self) -> u32 {
        match self {
            VectorData::Elem(e) => e.bits,
            VectorData::Invalid | VectorData::Convert { .. } => 0,
        }
    }

    /// Lane width, substituting [`FALLBACK_LANE_BITS`] for a zero width.
    pub fn lane_bits_or_fallback(self) -> u32 {
        match self.lane_bits() {
            0 => {
                log::debug!("No lane width for {self}, assuming {FALLBACK_LANE_BITS} bits");
                FALLBACK_LANE_BITS
            }
            bits => bits,
        }
    }

    /// The element type, or untyped lanes of the fallback width.
    pub fn lane_type(self) -> ElementType {
        match self {
            VectorData::Elem(e) if e.bits != 0 => e,
            _ => ElementType::new(LaneKind::Int, self.lane_bits_or_fallback()),
        }
    }

    /// Parse one element tag without the leading dot: `i32`, `s16`, `f64`, `32`.
    pub fn parse_elem(tag: &str) -> Option<ElementType> {
        let lower = tag.to_ascii_lowercase();
        let (kind, digits) = match lower.chars().next()? {
            'i' => (LaneKind::Int, &lower[1..]),
            's' => (LaneKind::Signed, &lower[1..]),
            'u' => (LaneKind::Unsigned, &lower[1..]),
            'f' => (LaneKind::Float, &lower[1..]),
            'p' => (LaneKind::Polynomial, &lower[1..]),
            c if c.is_ascii_digit() => (LaneKind::Int, lower.as_str()),
            _ => return None,
        };
        let bits: u32 = digits.parse().ok()?;
        matches!(bits, 8 | 16 | 32 | 64).then(|| ElementType::new(kind, bits))
    }
}

impl fmt::Display for VectorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorData::Invalid => Ok(()),
            VectorData::Elem(e) => write!(f, ".{}", e.name()),
            VectorData::Convert { dst, src } => write!(f, ".{}.{}", dst.name(), src.name()),
        }
    }
}

/// A memory operand: `[base, index]`, `[base, #offset]` or `[base]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryOperand {
    pub base: Option<Reg>,
    pub index: Option<Reg>,
    pub offset: i32,
    /// Alignment hint in bits (`[r0:64]`).
    pub align: Option<u32>,
}

impl MemoryOperand {
    pub fn base(base: Reg) -> Self {
        Self {
            base: Some(base),
            index: None,
            offset: 0,
            align: None,
        }
    }

    pub fn with_offset(base: Reg, offset: i32) -> Self {
        Self {
            offset,
            ..Self::base(base)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Register(Reg),
    /// Consecutive registers in listed order.
    RegisterList(Vec<Reg>),
    Memory(MemoryOperand),
    Immediate(u64),
    ElementType(ElementType),
}

/// A decoded vector instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub address: Address,
    pub length: u32,
    pub opcode: Opcode,
    pub vector_data: VectorData,
    pub operands: Vec<Operand>,
    /// The base register is updated by the access.
    pub writeback: bool,
    /// Executed only when the condition holds; `None` is always.
    pub condition: Option<&'static str>,
}

impl DecodedInstruction {
    pub fn new(address: Address, opcode: Opcode, vector_data: VectorData, operands: Vec<Operand>) -> Self {
        Self {
            address,
            length: 4,
            opcode,
            vector_data,
            operands,
            writeback: false,
            condition: None,
        }
    }

    pub fn with_writeback(mut self) -> Self {
        self.writeback = true;
        self
    }

    /// Listing text of the instruction.
    pub fn render(&self, regs: &RegisterFile) -> String {
        let mut text = format!(
            "{}{}{}",
            self.opcode,
            self.condition.unwrap_or(""),
            self.vector_data
        );
        for (i, op) in self.operands.iter().enumerate() {
            text.push_str(if i == 0 { " " } else { ", " });
            match op {
                Operand::Register(reg) => {
                    text.push_str(regs.name(*reg));
                    if i == 0 && self.writeback && is_list_transfer(self.opcode) {
                        text.push('!');
                    }
                }
                Operand::RegisterList(list) => {
                    let names: Vec<_> = list.iter().map(|r| regs.name(*r)).collect();
                    text.push_str(&format!("{{{}}}", names.join(", ")));
                }
                Operand::Memory(mem) => {
                    text.push('[');
                    text.push_str(mem.base.map_or("?", |b| regs.name(b)));
                    if let Some(align) = mem.align {
                        text.push_str(&format!(":{align}"));
                    }
                    if mem.offset != 0 {
                        text.push_str(&format!(", #{}", mem.offset));
                    }
                    text.push(']');
                    match mem.index {
                        Some(index) => text.push_str(&format!(", {}", regs.name(index))),
                        None if self.writeback => text.push('!'),
                        None => {}
                    }
                }
                Operand::Immediate(value) => text.push_str(&format!("#{value:#x}")),
                Operand::ElementType(e) => text.push_str(&e.name()),
            }
        }
        text
    }
}

fn is_list_transfer(opcode: Opcode) -> bool {
    matches!(opcode, Opcode::Vldmia | Opcode::Vstmia | Opcode::Vstmdb)
}
