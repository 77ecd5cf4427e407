// The operand resolver turns the operands of a decoded AArch32 instruction into RTL
// expressions. Registers resolve to register references, narrowed by a slice when the caller
// expects fewer bits than the register holds. Register lists become one sequence in listed
// order. Memory operands become a memory access over base + index + offset; a memory operand
// without a base register cannot be resolved and reports a malformed operand. Immediates
// become constants of the expected width. Resolution only reads the instruction and the
// register file.

//! Operand resolution for AArch32 rewriters.

use super::instruction::{DecodedInstruction, MemoryOperand, Operand};
use super::registers::PC;
use crate::core::context::RewriteContext;
use crate::core::error::RewriteError;
use crate::core::expr::{BinaryOp, Constant, Expression};
use crate::core::register_file::Reg;
use crate::core::types::{DataType, PrimitiveType};

/// Rewrite context of one AArch32 instruction.
pub type Ctx<'a> = RewriteContext<'a, DecodedInstruction>;

/// Offset of the value read from `pc` relative to the instruction address.
const PC_READ_OFFSET: i64 = 8;

/// How an operand is going to be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl<'a> Ctx<'a> {
    pub fn operand(&self, index: usize) -> Result<&'a Operand, RewriteError> {
        self.instr().operands.get(index).ok_or_else(|| {
            RewriteError::malformed(format!(
                "{} has no operand {}",
                self.instr().opcode,
                index
            ))
        })
    }

    pub fn operand_count(&self) -> usize {
        self.instr().operands.len()
    }

    /// Resolve operand `index`.
    ///
    /// `width` is the number of bits the caller expects. A register read
    /// narrower than the register is sliced from its low bits; a register
    /// write always names the whole register. Memory operands need a width.
    pub fn resolve(
        &self,
        index: usize,
        width: Option<u32>,
        access: Access,
    ) -> Result<Expression, RewriteError> {
        match self.operand(index)? {
            Operand::Register(reg) => {
                let expr = self.reg(*reg);
                match width {
                    Some(bits) if access == Access::Read && bits < expr.bit_size() => {
                        Ok(Expression::slice(expr, PrimitiveType::word(bits), 0))
                    }
                    _ => Ok(expr),
                }
            }
            Operand::RegisterList(regs) => self.sequence(regs),
            Operand::Memory(mem) => {
                let bits = width.ok_or_else(|| {
                    RewriteError::malformed("memory operand accessed without a width")
                })?;
                let ea = self.effective_address(mem)?;
                Ok(Expression::mem(PrimitiveType::word(bits), ea))
            }
            Operand::Immediate(value) => {
                if access == Access::Write {
                    return Err(RewriteError::malformed("immediate used as a destination"));
                }
                let bits = width.unwrap_or(32);
                Ok(Expression::Constant(Constant::word(bits, *value)))
            }
            Operand::ElementType(e) => Err(RewriteError::malformed(format!(
                "element type {} is not a value",
                e.name()
            ))),
        }
    }

    /// Read operand `index` at its natural width.
    pub fn read(&self, index: usize) -> Result<Expression, RewriteError> {
        self.resolve(index, None, Access::Read)
    }

    /// Read operand `index` as a `bits`-wide value.
    pub fn read_as(&self, index: usize, bits: u32) -> Result<Expression, RewriteError> {
        self.resolve(index, Some(bits), Access::Read)
    }

    /// The location written through operand `index`.
    pub fn write(&self, index: usize) -> Result<Expression, RewriteError> {
        self.resolve(index, None, Access::Write)
    }

    pub fn register_operand(&self, index: usize) -> Result<Reg, RewriteError> {
        match self.operand(index)? {
            Operand::Register(reg) => Ok(*reg),
            _ => Err(RewriteError::malformed(format!(
                "operand {index} is not a register"
            ))),
        }
    }

    pub fn register_list(&self, index: usize) -> Result<&'a [Reg], RewriteError> {
        match self.operand(index)? {
            Operand::RegisterList(regs) if !regs.is_empty() => Ok(regs),
            _ => Err(RewriteError::malformed(format!(
                "operand {index} is not a register list"
            ))),
        }
    }

    pub fn memory_operand(&self, index: usize) -> Result<&'a MemoryOperand, RewriteError> {
        match self.operand(index)? {
            Operand::Memory(mem) => Ok(mem),
            _ => Err(RewriteError::malformed(format!(
                "operand {index} is not a memory operand"
            ))),
        }
    }

    /// Concatenate `regs`, the first register in the most significant bits.
    pub fn sequence(&self, regs: &[Reg]) -> Result<Expression, RewriteError> {
        if regs.is_empty() {
            return Err(RewriteError::malformed("empty register list"));
        }
        Ok(Expression::seq(regs.iter().map(|r| self.reg(*r)).collect()))
    }

    /// Address computed by a memory operand.
    pub fn effective_address(&self, mem: &MemoryOperand) -> Result<Expression, RewriteError> {
        let base = mem
            .base
            .ok_or_else(|| RewriteError::malformed("memory operand has no base register"))?;
        if base == PC {
            let addr = self
                .address()
                .offset(PC_READ_OFFSET + i64::from(mem.offset));
            return Ok(Expression::Address(addr));
        }
        let mut ea = self.reg(base);
        if let Some(index) = mem.index {
            ea = Expression::iadd(ea, self.reg(index));
        }
        if mem.offset != 0 {
            ea = self.displaced(ea, i64::from(mem.offset));
        }
        Ok(ea)
    }

    /// `base + delta`, written as a subtraction when `delta` is negative.
    pub fn displaced(&self, base: Expression, delta: i64) -> Expression {
        if delta < 0 {
            Expression::isub_s(base, -delta)
        } else {
            Expression::iadd_s(base, delta)
        }
    }

    /// `expr`, zero-extended to `bits` by concatenating zero high bits.
    pub fn zero_extend(&self, expr: Expression, bits: u32) -> Expression {
        let have = expr.bit_size();
        if have >= bits {
            return expr;
        }
        Expression::seq(vec![Expression::word(bits - have, 0), expr])
    }

    /// Narrow a register value to `dt`, staging the slice in a temporary.
    pub fn narrowed(&mut self, reg: Reg, dt: PrimitiveType) -> Result<Expression, RewriteError> {
        let full = self.reg(reg);
        if full.bit_size() <= dt.bits {
            return Ok(full);
        }
        let tmp = self.temp(dt);
        self.assign(tmp.clone(), Expression::slice(full, dt, 0))?;
        Ok(tmp)
    }
}

/// Lane-wise array type covering `total_bits` with lanes of `elem`.
pub fn lanes(elem: PrimitiveType, total_bits: u32) -> Result<DataType, RewriteError> {
    if elem.bits == 0 || total_bits % elem.bits != 0 {
        return Err(RewriteError::malformed(format!(
            "{total_bits} bits cannot be split into {elem} lanes"
        )));
    }
    Ok(DataType::array(elem.into(), total_bits / elem.bits))
}

/// Binary operator for integer or float arithmetic on lanes of `elem`.
pub fn arith(float: bool, int_op: BinaryOp, float_op: BinaryOp) -> BinaryOp {
    if float {
        float_op
    } else {
        int_op
    }
}
