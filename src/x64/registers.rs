//! x86-64 general purpose registers, numbered the way the instruction
//! encoding numbers them.

use crate::core::register_file::{Reg, RegisterFile, RegisterFileError};
use iced_x86::Register;

pub const GP_BANK: u8 = 0;

const GP64_NAMES: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15",
];

pub const RSP: Reg = Reg::new(GP_BANK, 4);
pub const RIP: Reg = Reg::new(1, 0);

/// Build the x86-64 register file.
pub fn register_file() -> Result<RegisterFile, RegisterFileError> {
    let mut regs = RegisterFile::new(64);
    for (id, name) in GP64_NAMES.iter().enumerate() {
        regs.define(Reg::new(GP_BANK, id as u8), *name, 64)?;
    }
    regs.define(RIP, "rip", 64)?;
    regs.set_stack_pointer(RSP);
    Ok(regs)
}

/// Map a decoded 64-bit register to its register file entry.
pub fn from_iced(reg: Register) -> Option<Reg> {
    if reg == Register::RIP {
        return Some(RIP);
    }
    if !reg.is_gpr64() {
        return None;
    }
    Some(Reg::new(GP_BANK, reg.number() as u8))
}
