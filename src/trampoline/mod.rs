// Trampoline resolution recognizes dynamic-linking stubs (PLT entries and their relatives)
// in freshly lifted RTL and recovers the address the stub really transfers control to.
// Each architecture family has its own small set of stub idioms; the matchers of a family
// run in a fixed order and the first one that recognizes the window wins. Matchers only
// inspect the first four statements of the window and read the program image through a
// MemoryReader. A window that does not match, is too short, or needs a read that fails
// simply yields None; nothing here reports errors or mutates the window.

//! Indirect jump trampoline resolution.

pub mod aarch64;
pub mod arm;
pub mod riscv;
pub mod x86;

use crate::core::expr::{Expression, ProcedureRef};
use crate::core::memory::{Address, MemoryReader};
use crate::core::rtl::RtlStatement;
use crate::core::types::DataType;
use std::fmt;
use std::str::FromStr;

/// Number of statements a matcher may look at.
pub const WINDOW: usize = 4;

/// Processor family whose stub idioms to look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    Arm32,
    AArch64,
    RiscV64,
    X86,
    X86_64,
}

impl Architecture {
    pub fn pointer_bits(self) -> u32 {
        match self {
            Architecture::Arm32 | Architecture::X86 => 32,
            Architecture::AArch64 | Architecture::RiscV64 | Architecture::X86_64 => 64,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Architecture::Arm32 => "arm32",
            Architecture::AArch64 => "aarch64",
            Architecture::RiscV64 => "riscv64",
            Architecture::X86 => "x86",
            Architecture::X86_64 => "x86-64",
        }
    }

    /// Matchers of this family in priority order.
    fn matchers(self) -> &'static [Matcher] {
        const ARM32: &[Matcher] = &[arm::load_indexed, arm::materialized];
        const AARCH64: &[Matcher] = &[aarch64::page_offset];
        const RISCV: &[Matcher] = &[riscv::table_offset];
        const X86: &[Matcher] = &[x86::jump_through_memory];
        match self {
            Architecture::Arm32 => ARM32,
            Architecture::AArch64 => AARCH64,
            Architecture::RiscV64 => RISCV,
            Architecture::X86 | Architecture::X86_64 => X86,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "arm" | "arm32" => Ok(Architecture::Arm32),
            "aarch64" | "arm64" => Ok(Architecture::AArch64),
            "riscv" | "riscv64" => Ok(Architecture::RiscV64),
            "x86" | "i386" => Ok(Architecture::X86),
            "x86-64" | "x86_64" | "x64" | "amd64" => Ok(Architecture::X86_64),
            other => Err(format!("unknown architecture {other}")),
        }
    }
}

/// The real destination of a trampoline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResolvedTarget {
    Address(Address),
    Procedure(ProcedureRef),
}

impl ResolvedTarget {
    pub fn address(&self) -> Option<Address> {
        match self {
            ResolvedTarget::Address(addr) => Some(*addr),
            ResolvedTarget::Procedure(p) => p.address,
        }
    }

    pub fn into_expression(self) -> Expression {
        match self {
            ResolvedTarget::Address(addr) => Expression::Address(addr),
            ResolvedTarget::Procedure(p) => Expression::Procedure(p),
        }
    }
}

impl fmt::Display for ResolvedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedTarget::Address(addr) => write!(f, "{addr}"),
            ResolvedTarget::Procedure(p) => f.write_str(&p.name),
        }
    }
}

/// What a matcher may consult besides the window itself.
pub struct MatchContext<'a> {
    pub arch: Architecture,
    /// Address of the first instruction of the window.
    pub site: Address,
    pub memory: &'a dyn MemoryReader,
}

type Matcher = fn(&MatchContext<'_>, &[RtlStatement]) -> Option<ResolvedTarget>;

/// Resolve the stub whose RTL starts at `site`.
pub fn resolve(
    arch: Architecture,
    site: Address,
    window: &[RtlStatement],
    memory: &dyn MemoryReader,
) -> Option<ResolvedTarget> {
    let window = &window[..window.len().min(WINDOW)];
    let ctx = MatchContext { arch, site, memory };
    let target = arch
        .matchers()
        .iter()
        .find_map(|matcher| matcher(&ctx, window));
    match &target {
        Some(t) => log::debug!("{arch} stub at {site} resolves to {t}"),
        None => log::trace!("No {arch} stub at {site}"),
    }
    target
}

/// Replace the target of a goto or call with `target`.
///
/// Returns false, leaving `stmt` untouched, for any other statement.
pub fn replace_target(stmt: &mut RtlStatement, target: ResolvedTarget) -> bool {
    match stmt {
        RtlStatement::Goto { target: t } | RtlStatement::Call { target: t } => {
            *t = target.into_expression();
            true
        }
        _ => false,
    }
}

fn assignment(stmt: &RtlStatement) -> Option<(&Expression, &Expression)> {
    match stmt {
        RtlStatement::Assignment { dst, src } => Some((dst, src)),
        _ => None,
    }
}

fn goto_target(stmt: &RtlStatement) -> Option<&Expression> {
    match stmt {
        RtlStatement::Goto { target } => Some(target),
        _ => None,
    }
}

fn memory_access(expr: &Expression) -> Option<(&Expression, &DataType)> {
    match expr {
        Expression::Memory(m) => Some((&*m.ea, &m.dt)),
        _ => None,
    }
}

/// Storage with a name: a register or a temporary.
fn is_identifier(expr: &Expression) -> bool {
    matches!(expr, Expression::Register(_) | Expression::Temporary(_))
}

#[cfg(test)]
mod fixtures {
    use crate::core::expr::{Constant, Expression, RegisterRef};
    use crate::core::memory::{Address, MemoryReader};
    use crate::core::register_file::Reg;
    use crate::core::rtl::RtlStatement;
    use crate::core::types::PrimitiveType;
    use hashbrown::HashMap;

    pub fn reg(id: u8, name: &str, bits: u32) -> Expression {
        Expression::Register(RegisterRef {
            reg: Reg::new(0, id),
            name: name.to_string(),
            dt: PrimitiveType::word(bits),
        })
    }

    pub fn assign(dst: Expression, src: Expression) -> RtlStatement {
        RtlStatement::Assignment { dst, src }
    }

    pub fn goto(target: Expression) -> RtlStatement {
        RtlStatement::Goto { target }
    }

    pub fn word32(value: u64) -> Expression {
        Expression::word(32, value)
    }

    /// Memory made of individually placed words.
    #[derive(Default)]
    pub struct Words(pub HashMap<u64, u64>);

    impl MemoryReader for Words {
        fn try_read(&self, addr: Address, dt: PrimitiveType) -> Option<Constant> {
            self.0.get(&addr.value).map(|v| Constant::new(dt, *v))
        }
    }

    /// Memory that fails every read.
    pub struct Unmapped;

    impl MemoryReader for Unmapped {
        fn try_read(&self, _addr: Address, _dt: PrimitiveType) -> Option<Constant> {
            None
        }
    }
}
