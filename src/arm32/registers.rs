//! AArch32 register file: core registers, the VFP/NEON register banks with
//! their aliasing, and the VFP system registers.

use crate::core::register_file::{Reg, RegisterFile, RegisterFileError};

pub const GP_BANK: u8 = 0;
pub const S_BANK: u8 = 1;
pub const D_BANK: u8 = 2;
pub const Q_BANK: u8 = 3;
pub const SYS_BANK: u8 = 4;

pub const SP: Reg = Reg::new(GP_BANK, 13);
pub const LR: Reg = Reg::new(GP_BANK, 14);
pub const PC: Reg = Reg::new(GP_BANK, 15);

pub const FPSID: Reg = Reg::new(SYS_BANK, 0);
pub const FPSCR: Reg = Reg::new(SYS_BANK, 1);
pub const FPEXC: Reg = Reg::new(SYS_BANK, 2);
pub const MVFR0: Reg = Reg::new(SYS_BANK, 3);
pub const MVFR1: Reg = Reg::new(SYS_BANK, 4);
pub const MVFR2: Reg = Reg::new(SYS_BANK, 5);

/// Condition flags of FPSCR, as written by `vcmp`.
pub const NZCV: &str = "NZCV";
pub const NZCV_MASK: u64 = 0xF000_0000;

pub const fn r(n: u8) -> Reg {
    Reg::new(GP_BANK, n)
}

pub const fn s(n: u8) -> Reg {
    Reg::new(S_BANK, n)
}

pub const fn d(n: u8) -> Reg {
    Reg::new(D_BANK, n)
}

pub const fn q(n: u8) -> Reg {
    Reg::new(Q_BANK, n)
}

/// Alternative names accepted in listings.
pub const ALIASES: &[(&str, Reg)] = &[
    ("r13", SP),
    ("r14", LR),
    ("r15", PC),
    ("ip", r(12)),
    ("fp", r(11)),
    ("sl", r(10)),
    ("sb", r(9)),
];

/// Build the AArch32 register file.
///
/// `s2n` and `s2n+1` are the low and high halves of `d<n>` for `n < 16`, and
/// `d2n` and `d2n+1` the low and high halves of `q<n>`.
pub fn register_file() -> Result<RegisterFile, RegisterFileError> {
    let mut regs = RegisterFile::new(32);

    for n in 0..13 {
        regs.define(r(n), format!("r{n}"), 32)?;
    }
    regs.define(SP, "sp", 32)?;
    regs.define(LR, "lr", 32)?;
    regs.define(PC, "pc", 32)?;
    regs.set_stack_pointer(SP);

    for n in 0..16 {
        regs.define(q(n), format!("q{n}"), 128)?;
    }
    for n in 0..32 {
        regs.define(d(n), format!("d{n}"), 64)?;
        regs.alias(d(n), q(n / 2), 64 * (n as u32 % 2))?;
    }
    for n in 0..32 {
        regs.define(s(n), format!("s{n}"), 32)?;
        regs.alias(s(n), d(n / 2), 32 * (n as u32 % 2))?;
    }

    regs.define(FPSID, "fpsid", 32)?;
    regs.define(FPSCR, "fpscr", 32)?;
    regs.define(FPEXC, "fpexc", 32)?;
    regs.define(MVFR0, "mvfr0", 32)?;
    regs.define(MVFR1, "mvfr1", 32)?;
    regs.define(MVFR2, "mvfr2", 32)?;
    regs.define_flag_group(FPSCR, NZCV_MASK, NZCV);

    Ok(regs)
}

/// Look up a register by its listing name, accepting the usual aliases.
pub fn lookup(regs: &RegisterFile, name: &str) -> Option<Reg> {
    let lower = name.to_ascii_lowercase();
    regs.by_name(&lower).or_else(|| {
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == lower)
            .map(|(_, reg)| *reg)
    })
}

/// VFP system registers by the selector encoded in `vmrs`/`vmsr`.
pub const SYSTEM_REGISTERS: &[(u64, Reg)] = &[
    (0, FPSID),
    (1, FPSCR),
    (5, MVFR2),
    (6, MVFR1),
    (7, MVFR0),
    (8, FPEXC),
];

/// Map a VFP system register selector to its register.
pub fn system_register(selector: u64) -> Option<Reg> {
    SYSTEM_REGISTERS
        .iter()
        .find(|(sel, _)| *sel == selector)
        .map(|(_, reg)| *reg)
}

/// Selector of a system register given by name (`fpscr`, `mvfr0`...).
pub fn system_selector(regs: &RegisterFile, name: &str) -> Option<u64> {
    let lower = name.to_ascii_lowercase();
    SYSTEM_REGISTERS
        .iter()
        .find(|(_, reg)| regs.name(*reg) == lower)
        .map(|(sel, _)| *sel)
}
