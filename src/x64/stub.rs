// StubLifter decodes x86-64 machine code with iced-x86 and lifts the handful of instructions
// that make up a PLT entry: indirect and direct jumps, calls, pushes of the relocation index,
// returns and padding. Anything else is reported as unimplemented. window() produces the RTL
// the trampoline matchers look at: padding is skipped and lifting stops after the first
// control transfer.

//! x86-64 PLT stub lifting.

use super::registers::{self, RSP};
use crate::core::error::{LiftResult, RewriteError};
use crate::core::expr::Expression;
use crate::core::memory::Address;
use crate::core::register_file::RegisterFile;
use crate::core::rtl::{InstrClass, RtlCluster, RtlStatement};
use crate::core::session::ScanSession;
use crate::core::types::PrimitiveType;
use crate::core::RewriteContext;
use iced_x86::{Decoder, DecoderOptions, Formatter, Instruction, IntelFormatter, Mnemonic, OpKind, Register};

type Ctx<'a> = RewriteContext<'a, Instruction>;

/// Lifts decoded x86-64 instructions to RTL.
pub struct StubLifter {
    registers: RegisterFile,
}

impl StubLifter {
    pub fn new() -> LiftResult<Self> {
        Ok(Self {
            registers: registers::register_file()?,
        })
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    /// Decode every instruction in `bytes`, the first one located at `ip`.
    ///
    /// Decoding stops at the first byte sequence that is not an instruction.
    pub fn decode(bytes: &[u8], ip: u64) -> Vec<Instruction> {
        let mut decoder = Decoder::with_ip(64, bytes, ip, DecoderOptions::NONE);
        let mut instrs = Vec::new();
        while decoder.can_decode() {
            let instr = decoder.decode();
            if instr.is_invalid() {
                log::trace!("Undecodable bytes at {ip:#x}+{}", instrs.len());
                break;
            }
            instrs.push(instr);
        }
        instrs
    }

    /// Rewrite one instruction.
    pub fn rewrite(&self, instr: &Instruction) -> Result<RtlCluster, RewriteError> {
        let mut ctx = Ctx::new(
            instr,
            Address::ptr64(instr.ip()),
            instr.len() as u32,
            &self.registers,
        );
        rewrite(&mut ctx)?;
        Ok(ctx.finish())
    }

    /// Lift every instruction in `bytes`, recording outcomes in `session`.
    pub fn lift_all(&self, session: &ScanSession<'_>, bytes: &[u8], ip: u64) -> Vec<RtlCluster> {
        Self::decode(bytes, ip)
            .iter()
            .map(|instr| {
                let text = format_instruction(instr);
                let mnemonic = mnemonic_name(instr.mnemonic());
                session.lift(
                    Address::ptr64(instr.ip()),
                    instr.len() as u32,
                    &text,
                    &mnemonic,
                    || self.rewrite(instr),
                )
            })
            .collect()
    }

    /// RTL of a stub from its first instruction up to the first transfer of control.
    ///
    /// Padding (`endbr64`, `nop`) contributes nothing. An instruction that cannot
    /// be lifted ends the window with an invalid statement.
    pub fn window(&self, bytes: &[u8], ip: u64) -> Vec<RtlStatement> {
        let mut window = Vec::new();
        for instr in Self::decode(bytes, ip) {
            if is_padding(&instr) {
                continue;
            }
            match self.rewrite(&instr) {
                Ok(cluster) => {
                    let class = cluster.class;
                    window.extend(cluster.instrs);
                    if class != InstrClass::Linear {
                        break;
                    }
                }
                Err(err) => {
                    log::debug!("{:#x}: {}: {err}", instr.ip(), format_instruction(&instr));
                    window.push(RtlStatement::Invalid);
                    break;
                }
            }
        }
        window
    }
}

/// Intel syntax text of an instruction.
pub fn format_instruction(instr: &Instruction) -> String {
    let mut formatter = IntelFormatter::new();
    let mut text = String::new();
    formatter.format(instr, &mut text);
    text
}

fn mnemonic_name(mnemonic: Mnemonic) -> String {
    format!("{mnemonic:?}").to_lowercase()
}

fn is_padding(instr: &Instruction) -> bool {
    matches!(instr.mnemonic(), Mnemonic::Endbr64 | Mnemonic::Nop)
}

fn rewrite(ctx: &mut Ctx<'_>) -> Result<(), RewriteError> {
    let instr = ctx.instr();
    match instr.mnemonic() {
        Mnemonic::Endbr64 | Mnemonic::Nop => ctx.m.nop(),
        Mnemonic::Jmp => {
            let target = transfer_target(ctx)?;
            ctx.set_class(InstrClass::Transfer);
            ctx.m.goto(target);
        }
        Mnemonic::Call => {
            let target = transfer_target(ctx)?;
            ctx.set_class(InstrClass::Call);
            ctx.m.call(target);
        }
        Mnemonic::Ret => {
            ctx.set_class(InstrClass::Return);
            ctx.m.ret();
        }
        Mnemonic::Push => push(ctx)?,
        other => {
            return Err(RewriteError::Unimplemented {
                mnemonic: mnemonic_name(other),
                detail: format_instruction(instr),
            })
        }
    }
    Ok(())
}

/// Destination of a jump or call: a fixed address, a register or a memory slot.
fn transfer_target(ctx: &Ctx<'_>) -> Result<Expression, RewriteError> {
    let instr = ctx.instr();
    match instr.op0_kind() {
        OpKind::NearBranch64 | OpKind::NearBranch32 | OpKind::NearBranch16 => {
            Ok(Expression::Address(Address::ptr64(instr.near_branch_target())))
        }
        OpKind::Register => register(ctx, instr.op0_register()),
        OpKind::Memory => Ok(Expression::mem(PrimitiveType::WORD64, effective_address(ctx)?)),
        kind => Err(RewriteError::malformed(format!("transfer through {kind:?}"))),
    }
}

/// `push src`: `rsp = rsp - 8` followed by the store.
fn push(ctx: &mut Ctx<'_>) -> Result<(), RewriteError> {
    let instr = ctx.instr();
    let value = match instr.op0_kind() {
        OpKind::Immediate8to64 => Expression::word(64, instr.immediate8to64() as u64),
        OpKind::Immediate32to64 => Expression::word(64, instr.immediate32to64() as u64),
        OpKind::Register => register(ctx, instr.op0_register())?,
        OpKind::Memory => Expression::mem(PrimitiveType::WORD64, effective_address(ctx)?),
        kind => return Err(RewriteError::malformed(format!("push of {kind:?}"))),
    };
    let sp = ctx.reg(RSP);
    ctx.assign(sp.clone(), Expression::isub_s(sp.clone(), 8))?;
    ctx.assign(Expression::mem(PrimitiveType::WORD64, sp), value)
}

fn register(ctx: &Ctx<'_>, reg: Register) -> Result<Expression, RewriteError> {
    registers::from_iced(reg)
        .map(|r| ctx.reg(r))
        .ok_or_else(|| RewriteError::malformed(format!("register {reg:?}")))
}

/// Effective address of the memory operand.
///
/// RIP-relative operands are folded to the absolute address they name.
fn effective_address(ctx: &Ctx<'_>) -> Result<Expression, RewriteError> {
    let instr = ctx.instr();
    if instr.is_ip_rel_memory_operand() {
        return Ok(Expression::Address(Address::ptr64(instr.ip_rel_memory_address())));
    }
    if instr.memory_index() != Register::None {
        return Err(RewriteError::Unimplemented {
            mnemonic: mnemonic_name(instr.mnemonic()),
            detail: "indexed memory operand".to_string(),
        });
    }
    let disp = instr.memory_displacement64();
    if instr.memory_base() == Register::None {
        return Ok(Expression::Address(Address::ptr64(disp)));
    }
    let base = register(ctx, instr.memory_base())?;
    Ok(match disp as i64 {
        0 => base,
        d => Expression::iadd_s(base, d),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::TestContext;

    fn lines(lifter: &StubLifter, bytes: &[u8], ip: u64) -> Vec<String> {
        StubLifter::decode(bytes, ip)
            .iter()
            .flat_map(|i| lifter.rewrite(i).unwrap().lines())
            .collect()
    }

    #[test]
    fn test_rip_relative_jump() {
        let lifter = StubLifter::new().unwrap();
        // jmp qword ptr [rip+0x2ff2]
        let bytes = [0xFF, 0x25, 0xF2, 0x2F, 0x00, 0x00];
        let cluster = lifter
            .rewrite(&StubLifter::decode(&bytes, 0x1020)[0])
            .unwrap();
        assert_eq!(cluster.class, InstrClass::Transfer);
        assert_eq!(cluster.length, 6);
        assert_eq!(cluster.lines(), vec!["goto Mem[0000000000004018:word64]"]);
    }

    #[test]
    fn test_push_and_direct_jump() {
        let lifter = StubLifter::new().unwrap();
        // push 3; jmp 0x1010
        let bytes = [0x68, 0x03, 0x00, 0x00, 0x00, 0xE9, 0xD6, 0xFF, 0xFF, 0xFF];
        assert_eq!(
            lines(&lifter, &bytes, 0x1030),
            vec![
                "rsp = rsp - 8<i64>",
                "Mem[rsp:word64] = 3<64>",
                "goto 0000000000001010",
            ]
        );
    }

    #[test]
    fn test_register_based_operands() {
        let lifter = StubLifter::new().unwrap();
        // push qword ptr [rbx+8]; jmp rax
        let bytes = [0xFF, 0x73, 0x08, 0xFF, 0xE0];
        assert_eq!(
            lines(&lifter, &bytes, 0),
            vec![
                "rsp = rsp - 8<i64>",
                "Mem[rsp:word64] = Mem[rbx + 8<i64>:word64]",
                "goto rax",
            ]
        );
    }

    #[test]
    fn test_window_skips_padding() {
        let lifter = StubLifter::new().unwrap();
        // endbr64; bnd jmp qword ptr [rip+0x2fc5]; nop dword ptr [rax+rax]
        let bytes = [
            0xF3, 0x0F, 0x1E, 0xFA, 0xF2, 0xFF, 0x25, 0xC5, 0x2F, 0x00, 0x00, 0x0F, 0x1F, 0x44,
            0x00, 0x00,
        ];
        let window = lifter.window(&bytes, 0x1050);
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].to_string(), "goto Mem[0000000000004020:word64]");
    }

    #[test]
    fn test_unsupported_instruction() {
        let lifter = StubLifter::new().unwrap();
        // mov eax, 1
        let bytes = [0xB8, 0x01, 0x00, 0x00, 0x00];
        let err = lifter
            .rewrite(&StubLifter::decode(&bytes, 0)[0])
            .unwrap_err();
        assert!(matches!(err, RewriteError::Unimplemented { ref mnemonic, .. } if mnemonic == "mov"));
        assert_eq!(lifter.window(&bytes, 0), vec![RtlStatement::Invalid]);
    }

    #[test]
    fn test_lift_all_records_outcomes() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let lifter = StubLifter::new().unwrap();
        // endbr64; mov eax, 1; ret
        let bytes = [0xF3, 0x0F, 0x1E, 0xFA, 0xB8, 0x01, 0x00, 0x00, 0x00, 0xC3];
        let clusters = lifter.lift_all(&session, &bytes, 0x2000);
        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters[0].lines(), vec!["nop"]);
        assert!(clusters[1].is_invalid());
        assert_eq!(clusters[2].class, InstrClass::Return);

        let stats = session.stats();
        assert_eq!(stats.instructions_lifted, 2);
        assert_eq!(stats.unimplemented, 1);
        assert_eq!(session.samples()[0].text, "mov eax,1");
    }
}
