// AArch32 support: the register file, decoded vector instructions, the operand resolver,
// the vector opcode rewriters and a listing parser standing in for a byte decoder.
// Arm32Lifter ties them together. rewrite() lifts one instruction and reports the raw
// outcome; lift() applies the outcome policy for a single instruction and lift_all()
// runs a batch through a ScanSession, which records what could not be lifted.

//! AArch32 vector instruction lifting.

pub mod instruction;
pub mod listing;
pub mod operand;
pub mod registers;
pub mod vector;

pub use instruction::{DecodedInstruction, MemoryOperand, Opcode, Operand, VectorData};
pub use operand::Ctx;

use crate::core::error::{LiftError, LiftResult, RewriteError};
use crate::core::register_file::RegisterFile;
use crate::core::rtl::RtlCluster;
use crate::core::session::ScanSession;

/// Lifts decoded AArch32 instructions to RTL.
pub struct Arm32Lifter {
    registers: RegisterFile,
}

impl Arm32Lifter {
    pub fn new() -> LiftResult<Self> {
        Ok(Self {
            registers: registers::register_file()?,
        })
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    /// Rewrite one instruction. On error nothing of the partial rewrite survives.
    pub fn rewrite(&self, instr: &DecodedInstruction) -> Result<RtlCluster, RewriteError> {
        log::trace!("{}: {}", instr.address, instr.render(&self.registers));
        let mut ctx = Ctx::new(instr, instr.address, instr.length, &self.registers);
        vector::rewrite(&mut ctx)?;
        Ok(ctx.finish())
    }

    /// Lift one instruction.
    ///
    /// Malformed and unimplemented instructions lift to an invalid cluster.
    /// A contract violation is returned as an error.
    pub fn lift(&self, instr: &DecodedInstruction) -> LiftResult<RtlCluster> {
        match self.rewrite(instr) {
            Ok(cluster) => Ok(cluster),
            Err(RewriteError::Fault { reason }) => Err(LiftError::ContractViolation {
                address: instr.address,
                reason,
            }),
            Err(err) => {
                log::debug!("{}: {err}", instr.address);
                Ok(RtlCluster::invalid(instr.address, instr.length))
            }
        }
    }

    /// Lift a sequence of instructions, recording every outcome in `session`.
    pub fn lift_all(
        &self,
        session: &ScanSession<'_>,
        instrs: &[DecodedInstruction],
    ) -> Vec<RtlCluster> {
        instrs
            .iter()
            .map(|instr| {
                let text = instr.render(&self.registers);
                session.lift(
                    instr.address,
                    instr.length,
                    &text,
                    instr.opcode.mnemonic(),
                    || self.rewrite(instr),
                )
            })
            .collect()
    }

    /// Parse a disassembly listing with this lifter's register names.
    pub fn parse_listing(&self, text: &str) -> LiftResult<Vec<DecodedInstruction>> {
        listing::parse_listing(&self.registers, text)
    }
}
