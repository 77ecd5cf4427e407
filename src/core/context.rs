// RewriteContext bundles everything an opcode rewriter may touch while lifting a single
// instruction: the decoded instruction, the emission buffer, the temporary allocator, the
// instruction class, and read-only access to the register file.
// Handlers receive it by mutable reference and cannot reach any other state, so one
// instruction's lift can never observe or disturb another's. The context is created by the
// architecture's rewrite entry point and consumed by finish() when the handler returns.

//! Per-instruction rewrite session.

use super::error::RewriteError;
use super::expr::{Expression, FlagGroupRef, RegisterRef, Temporary};
use super::memory::Address;
use super::register_file::{Reg, RegBitSet, RegisterFile};
use super::rtl::{InstrClass, RtlCluster, RtlEmitter};
use super::types::{DataType, PrimitiveType};

/// State owned by one instruction's lift.
pub struct RewriteContext<'a, I> {
    instr: &'a I,
    address: Address,
    length: u32,
    registers: &'a RegisterFile,
    /// Emission buffer.
    pub m: RtlEmitter,
    iclass: InstrClass,
    next_temp: u32,
    defs: RegBitSet,
}

impl<'a, I> RewriteContext<'a, I> {
    pub fn new(instr: &'a I, address: Address, length: u32, registers: &'a RegisterFile) -> Self {
        Self {
            instr,
            address,
            length,
            registers,
            m: RtlEmitter::new(),
            iclass: InstrClass::Linear,
            next_temp: 0,
            defs: RegBitSet::new(),
        }
    }

    pub fn instr(&self) -> &'a I {
        self.instr
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn registers(&self) -> &'a RegisterFile {
        self.registers
    }

    pub fn class(&self) -> InstrClass {
        self.iclass
    }

    pub fn set_class(&mut self, class: InstrClass) {
        self.iclass = class;
    }

    /// Reference to `reg` at its full architectural width.
    pub fn reg(&self, reg: Reg) -> Expression {
        let bits = self.registers.width(reg);
        Expression::Register(RegisterRef {
            reg,
            name: self.registers.name(reg).to_string(),
            dt: PrimitiveType::word(bits),
        })
    }

    /// Reference to a named flag group, typed as wide as its mask.
    pub fn flag_group(&self, name: &str) -> Result<Expression, RewriteError> {
        let group = self
            .registers
            .flag_group(name)
            .ok_or_else(|| RewriteError::fault(format!("no flag group {name}")))?;
        Ok(Expression::FlagGroup(FlagGroupRef {
            register: group.register,
            mask: group.mask,
            name: group.name.clone(),
            dt: PrimitiveType::word(group.mask.count_ones()),
        }))
    }

    /// Allocate a fresh temporary of type `dt`.
    pub fn temp(&mut self, dt: impl Into<DataType>) -> Expression {
        let id = self.next_temp;
        self.next_temp += 1;
        Expression::Temporary(Temporary { id, dt: dt.into() })
    }

    /// Emit `dst = src`.
    ///
    /// The source must have exactly the width of the destination; a rewriter
    /// that computes a narrower value has to widen it explicitly first.
    pub fn assign(&mut self, dst: Expression, src: Expression) -> Result<(), RewriteError> {
        let (dst_bits, src_bits) = (dst.bit_size(), src.bit_size());
        if dst_bits != src_bits {
            return Err(RewriteError::fault(format!(
                "assignment of {src_bits}-bit value to {dst_bits}-bit {dst}"
            )));
        }
        if let Expression::Register(r) = &dst {
            self.defs.set(r.reg);
        }
        self.m.assign(dst, src);
        Ok(())
    }

    /// Downgrade the instruction to invalid, discarding anything emitted so far.
    pub fn invalid(&mut self) {
        self.iclass = InstrClass::Invalid;
        self.m.invalid();
        self.defs.clear_all();
    }

    pub fn is_invalid(&self) -> bool {
        self.iclass == InstrClass::Invalid
    }

    pub fn finish(mut self) -> RtlCluster {
        RtlCluster {
            address: self.address,
            length: self.length,
            class: self.iclass,
            instrs: self.m.take(),
            defs: self.defs,
        }
    }
}
