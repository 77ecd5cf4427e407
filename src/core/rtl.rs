//! RTL statements and the per-instruction emission buffer.

use super::expr::Expression;
use super::memory::Address;
use super::register_file::RegBitSet;
use std::fmt;

/// Control-flow classification of a lifted instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrClass {
    /// Falls through to the next instruction.
    Linear,
    /// Unconditional transfer of control.
    Transfer,
    /// Conditional transfer of control.
    Conditional,
    Call,
    Return,
    /// The instruction could not be lifted.
    Invalid,
}

impl fmt::Display for InstrClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstrClass::Linear => "linear",
            InstrClass::Transfer => "transfer",
            InstrClass::Conditional => "conditional",
            InstrClass::Call => "call",
            InstrClass::Return => "return",
            InstrClass::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// One register-transfer statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtlStatement {
    Assignment { dst: Expression, src: Expression },
    Branch { condition: Expression, target: Address },
    Goto { target: Expression },
    Call { target: Expression },
    Return,
    /// An expression evaluated only for its side effects.
    SideEffect { expr: Expression },
    Invalid,
    Nop,
}

impl RtlStatement {
    pub fn is_invalid(&self) -> bool {
        matches!(self, RtlStatement::Invalid)
    }
}

impl fmt::Display for RtlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtlStatement::Assignment { dst, src } => write!(f, "{dst} = {src}"),
            RtlStatement::Branch { condition, target } => {
                write!(f, "if ({condition}) branch {target}")
            }
            RtlStatement::Goto { target } => write!(f, "goto {target}"),
            RtlStatement::Call { target } => write!(f, "call {target}"),
            RtlStatement::Return => f.write_str("return"),
            RtlStatement::SideEffect { expr } => write!(f, "{expr}"),
            RtlStatement::Invalid => f.write_str("<invalid>"),
            RtlStatement::Nop => f.write_str("nop"),
        }
    }
}

/// The RTL of one machine instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtlCluster {
    pub address: Address,
    /// Length of the machine instruction in bytes.
    pub length: u32,
    pub class: InstrClass,
    pub instrs: Vec<RtlStatement>,
    /// Registers assigned by the statements.
    pub defs: RegBitSet,
}

impl RtlCluster {
    /// A cluster consisting of a single invalid marker.
    pub fn invalid(address: Address, length: u32) -> Self {
        Self {
            address,
            length,
            class: InstrClass::Invalid,
            instrs: vec![RtlStatement::Invalid],
            defs: RegBitSet::new(),
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.class == InstrClass::Invalid
    }

    /// The statements rendered one per element, as printed by `Display`.
    pub fn lines(&self) -> Vec<String> {
        self.instrs.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for RtlCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}({}): {}", self.address, self.length, self.class)?;
        for stmt in &self.instrs {
            writeln!(f, "    {stmt}")?;
        }
        Ok(())
    }
}

/// Ordered statement buffer for the instruction being lifted.
#[derive(Debug, Default)]
pub struct RtlEmitter {
    instrs: Vec<RtlStatement>,
}

impl RtlEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, stmt: RtlStatement) {
        log::trace!("  emit {stmt}");
        self.instrs.push(stmt);
    }

    pub fn assign(&mut self, dst: Expression, src: Expression) {
        self.emit(RtlStatement::Assignment { dst, src });
    }

    pub fn goto(&mut self, target: Expression) {
        self.emit(RtlStatement::Goto { target });
    }

    pub fn branch(&mut self, condition: Expression, target: Address) {
        self.emit(RtlStatement::Branch { condition, target });
    }

    pub fn call(&mut self, target: Expression) {
        self.emit(RtlStatement::Call { target });
    }

    pub fn ret(&mut self) {
        self.emit(RtlStatement::Return);
    }

    pub fn side_effect(&mut self, expr: Expression) {
        self.emit(RtlStatement::SideEffect { expr });
    }

    pub fn nop(&mut self) {
        self.emit(RtlStatement::Nop);
    }

    /// Discard everything emitted so far and leave a single invalid marker.
    pub fn invalid(&mut self) {
        self.instrs.clear();
        self.instrs.push(RtlStatement::Invalid);
    }

    pub fn statements(&self) -> &[RtlStatement] {
        &self.instrs
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    pub fn take(&mut self) -> Vec<RtlStatement> {
        std::mem::take(&mut self.instrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PrimitiveType;

    #[test]
    fn test_invalid_discards_partial_rtl() {
        let mut m = RtlEmitter::new();
        m.assign(Expression::word(32, 1), Expression::word(32, 2));
        m.nop();
        m.invalid();
        assert_eq!(m.statements(), &[RtlStatement::Invalid]);
    }

    #[test]
    fn test_statement_display() {
        let target = Expression::mem(
            PrimitiveType::WORD32,
            Expression::Address(Address::ptr32(0x00401000)),
        );
        assert_eq!(
            RtlStatement::Goto { target }.to_string(),
            "goto Mem[00401000:word32]"
        );
        assert_eq!(RtlStatement::Invalid.to_string(), "<invalid>");
    }

    #[test]
    fn test_invalid_cluster() {
        let c = RtlCluster::invalid(Address::ptr32(0x1000), 4);
        assert!(c.is_invalid());
        assert_eq!(c.lines(), vec!["<invalid>".to_string()]);
        assert_eq!(c.to_string(), "00001000(4): invalid\n    <invalid>\n");
    }
}
