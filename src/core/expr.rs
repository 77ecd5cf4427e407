//! RTL expression trees.
//!
//! Expressions are plain owned trees. Leaves are registers, flag groups,
//! temporaries, constants, fixed addresses and procedure references; inner
//! nodes cover memory access, arithmetic, conversions, sequences (concatenation,
//! most-significant part first), bit slices, intrinsic calls and condition
//! codes. Every expression knows its [`DataType`].

use super::intrinsic::IntrinsicDescriptor;
use super::memory::{mask, Address};
use super::register_file::Reg;
use super::types::{DataType, Domain, PrimitiveType};
use std::fmt;

/// A typed constant. The value is stored zero-extended and masked to the type width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Constant {
    pub dt: PrimitiveType,
    pub value: u64,
}

impl Constant {
    pub fn new(dt: PrimitiveType, value: u64) -> Self {
        Self {
            dt,
            value: value & mask(dt.bits),
        }
    }

    pub fn word(bits: u32, value: u64) -> Self {
        Self::new(PrimitiveType::word(bits), value)
    }

    pub fn int32(value: i32) -> Self {
        Self::new(PrimitiveType::INT32, value as u32 as u64)
    }

    /// The value sign-extended from the type width.
    pub fn as_i64(&self) -> i64 {
        let bits = self.dt.bits;
        if bits == 0 || bits >= 64 {
            return self.value as i64;
        }
        let shift = 64 - bits;
        ((self.value << shift) as i64) >> shift
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dt.domain == Domain::SignedInt {
            write!(f, "{}<{}>", self.as_i64(), self.dt.suffix())
        } else if self.value < 10 {
            write!(f, "{}<{}>", self.value, self.dt.suffix())
        } else {
            write!(f, "0x{:X}<{}>", self.value, self.dt.suffix())
        }
    }
}

/// A reference to an architectural register.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegisterRef {
    pub reg: Reg,
    pub name: String,
    pub dt: PrimitiveType,
}

/// A reference to a flag group of a status register.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlagGroupRef {
    pub register: Reg,
    pub mask: u64,
    pub name: String,
    pub dt: PrimitiveType,
}

/// A synthesized value with no hardware location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Temporary {
    pub id: u32,
    pub dt: DataType,
}

impl Temporary {
    pub fn name(&self) -> String {
        format!("v{}", self.id)
    }
}

/// A symbolic reference to a procedure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcedureRef {
    pub name: String,
    pub address: Option<Address>,
}

/// A memory access at `ea`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryAccess {
    pub ea: Box<Expression>,
    pub dt: DataType,
}

/// Call of an intrinsic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntrinsicCall {
    pub descriptor: IntrinsicDescriptor,
    pub args: Vec<Expression>,
    pub dt: DataType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    FNeg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    IAdd,
    ISub,
    IMul,
    FAdd,
    FSub,
    FMul,
    FDiv,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::IAdd => "+",
            BinaryOp::ISub => "-",
            BinaryOp::IMul => "*",
            BinaryOp::FAdd => "+",
            BinaryOp::FSub => "-",
            BinaryOp::FMul => "*",
            BinaryOp::FDiv => "/",
        }
    }
}

/// An RTL expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expression {
    Register(RegisterRef),
    FlagGroup(FlagGroupRef),
    Temporary(Temporary),
    Constant(Constant),
    Address(Address),
    Procedure(ProcedureRef),
    Memory(MemoryAccess),
    Unary {
        op: UnaryOp,
        expr: Box<Expression>,
        dt: DataType,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
        dt: DataType,
    },
    Conversion {
        expr: Box<Expression>,
        from: DataType,
        to: DataType,
    },
    /// Concatenation of `parts`, most significant first.
    Sequence { parts: Vec<Expression>, dt: DataType },
    /// `dt.bit_size()` bits of `expr` starting at bit `offset`.
    Slice {
        expr: Box<Expression>,
        dt: DataType,
        offset: u32,
    },
    Intrinsic(IntrinsicCall),
    /// Condition codes resulting from evaluating the inner expression.
    Condition { expr: Box<Expression>, dt: DataType },
}

impl Expression {
    pub fn data_type(&self) -> DataType {
        match self {
            Expression::Register(r) => r.dt.into(),
            Expression::FlagGroup(g) => g.dt.into(),
            Expression::Temporary(t) => t.dt.clone(),
            Expression::Constant(c) => c.dt.into(),
            Expression::Address(a) => a.data_type().into(),
            Expression::Procedure(p) => {
                PrimitiveType::ptr(p.address.map_or(32, |a| a.bits)).into()
            }
            Expression::Memory(m) => m.dt.clone(),
            Expression::Unary { dt, .. }
            | Expression::Binary { dt, .. }
            | Expression::Sequence { dt, .. }
            | Expression::Slice { dt, .. } => dt.clone(),
            Expression::Conversion { to, .. } => to.clone(),
            Expression::Intrinsic(call) => call.dt.clone(),
            Expression::Condition { dt, .. } => dt.clone(),
        }
    }

    pub fn bit_size(&self) -> u32 {
        self.data_type().bit_size()
    }

    pub fn constant(c: Constant) -> Self {
        Expression::Constant(c)
    }

    pub fn word(bits: u32, value: u64) -> Self {
        Expression::Constant(Constant::word(bits, value))
    }

    pub fn mem(dt: impl Into<DataType>, ea: Expression) -> Self {
        Expression::Memory(MemoryAccess {
            ea: Box::new(ea),
            dt: dt.into(),
        })
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        let dt = left.data_type();
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            dt,
        }
    }

    pub fn iadd(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOp::IAdd, left, right)
    }

    /// `left + n`, with `n` a signed constant of the same width as `left`.
    pub fn iadd_s(left: Expression, n: i64) -> Self {
        let bits = left.bit_size();
        let c = Constant::new(PrimitiveType::int(bits), n as u64);
        Self::iadd(left, Expression::Constant(c))
    }

    /// `left - n`, with `n` a signed constant of the same width as `left`.
    pub fn isub_s(left: Expression, n: i64) -> Self {
        let bits = left.bit_size();
        let c = Constant::new(PrimitiveType::int(bits), n as u64);
        Self::binary(BinaryOp::ISub, left, Expression::Constant(c))
    }

    pub fn fadd(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOp::FAdd, left, right)
    }

    pub fn fsub(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOp::FSub, left, right)
    }

    pub fn fmul(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOp::FMul, left, right)
    }

    pub fn fdiv(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOp::FDiv, left, right)
    }

    pub fn unary(op: UnaryOp, expr: Expression) -> Self {
        let dt = expr.data_type();
        Expression::Unary {
            op,
            expr: Box::new(expr),
            dt,
        }
    }

    pub fn convert(expr: Expression, from: impl Into<DataType>, to: impl Into<DataType>) -> Self {
        Expression::Conversion {
            expr: Box::new(expr),
            from: from.into(),
            to: to.into(),
        }
    }

    /// Concatenate `parts`, the first part landing in the most significant bits.
    pub fn seq(parts: Vec<Expression>) -> Self {
        let bits = parts.iter().map(Expression::bit_size).sum();
        Expression::Sequence {
            parts,
            dt: DataType::word(bits),
        }
    }

    pub fn slice(expr: Expression, dt: impl Into<DataType>, offset: u32) -> Self {
        Expression::Slice {
            expr: Box::new(expr),
            dt: dt.into(),
            offset,
        }
    }

    pub fn intrinsic(
        descriptor: IntrinsicDescriptor,
        dt: impl Into<DataType>,
        args: Vec<Expression>,
    ) -> Self {
        if let Some(arity) = descriptor.info().arity {
            debug_assert_eq!(arity, args.len(), "{descriptor} called with wrong arity");
        }
        Expression::Intrinsic(IntrinsicCall {
            descriptor,
            args,
            dt: dt.into(),
        })
    }

    /// Condition codes of `expr`, typed as the flag group receiving them.
    pub fn cond(expr: Expression, dt: impl Into<DataType>) -> Self {
        Expression::Condition {
            expr: Box::new(expr),
            dt: dt.into(),
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            Expression::Address(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<Constant> {
        match self {
            Expression::Constant(c) => Some(*c),
            _ => None,
        }
    }

    /// Destructure `left + right`.
    pub fn as_iadd(&self) -> Option<(&Expression, &Expression)> {
        match self {
            Expression::Binary {
                op: BinaryOp::IAdd,
                left,
                right,
                ..
            } => Some((left, right)),
            _ => None,
        }
    }

    fn is_compound(&self) -> bool {
        matches!(self, Expression::Binary { .. })
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Register(r) => f.write_str(&r.name),
            Expression::FlagGroup(g) => f.write_str(&g.name),
            Expression::Temporary(t) => f.write_str(&t.name()),
            Expression::Constant(c) => write!(f, "{c}"),
            Expression::Address(a) => write!(f, "{a}"),
            Expression::Procedure(p) => f.write_str(&p.name),
            Expression::Memory(m) => write!(f, "Mem[{}:{}]", m.ea, m.dt),
            Expression::Unary { op, expr, .. } => {
                let sym = match op {
                    UnaryOp::FNeg => "-",
                };
                if expr.is_compound() {
                    write!(f, "{sym}({expr})")
                } else {
                    write!(f, "{sym}{expr}")
                }
            }
            Expression::Binary { op, left, right, .. } => {
                if left.is_compound() {
                    write!(f, "({left})")?;
                } else {
                    write!(f, "{left}")?;
                }
                write!(f, " {} ", op.symbol())?;
                if right.is_compound() {
                    write!(f, "({right})")
                } else {
                    write!(f, "{right}")
                }
            }
            Expression::Conversion { expr, from, to } => {
                write!(f, "CONVERT({expr}, {from}, {to})")
            }
            Expression::Sequence { parts, .. } => {
                f.write_str("SEQ(")?;
                write_list(f, parts)?;
                f.write_str(")")
            }
            Expression::Slice { expr, dt, offset } => write!(f, "SLICE({expr}, {dt}, {offset})"),
            Expression::Intrinsic(call) => {
                write!(f, "{}(", call.descriptor)?;
                write_list(f, &call.args)?;
                f.write_str(")")
            }
            Expression::Condition { expr, .. } => write!(f, "cond({expr})"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expression]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}
