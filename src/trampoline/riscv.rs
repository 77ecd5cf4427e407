//! RISC-V PLT stubs.

use super::{assignment, goto_target, is_identifier, memory_access, MatchContext, ResolvedTarget};
use crate::core::rtl::RtlStatement;

/// GOT slot at a constant offset from an `auipc` address:
///
/// ```text
/// auipc t3, 0x5
/// ld    t3, 0xf0(t3)
/// jalr  t1, t3
/// ```
pub fn table_offset(_ctx: &MatchContext<'_>, window: &[RtlStatement]) -> Option<ResolvedTarget> {
    if window.len() < 4 {
        return None;
    }
    let (base_reg, src) = assignment(&window[0])?;
    let base = src.as_address()?;

    let (loaded, load) = assignment(&window[1])?;
    let (ea, _) = memory_access(load)?;
    let (left, right) = ea.as_iadd()?;
    if left != base_reg {
        return None;
    }
    let addr = base.offset(right.as_constant()?.as_i64());

    assignment(&window[2])?;
    let target = goto_target(&window[3])?;
    if !is_identifier(target) || target != loaded {
        return None;
    }
    Some(ResolvedTarget::Address(addr))
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::super::{resolve, Architecture};
    use super::*;
    use crate::core::expr::Expression;
    use crate::core::memory::Address;
    use crate::core::types::PrimitiveType;

    fn stub() -> Vec<RtlStatement> {
        let t3 = reg(28, "t3", 64);
        let t1 = reg(6, "t1", 64);
        vec![
            assign(t3.clone(), Expression::Address(Address::ptr64(0x15010))),
            assign(
                t3.clone(),
                Expression::mem(PrimitiveType::WORD64, Expression::iadd_s(t3.clone(), 0xF0)),
            ),
            assign(t1, Expression::Address(Address::ptr64(0x10018))),
            goto(t3),
        ]
    }

    #[test]
    fn test_table_offset() {
        assert_eq!(
            resolve(Architecture::RiscV64, Address::ptr64(0x10010), &stub(), &Unmapped),
            Some(ResolvedTarget::Address(Address::ptr64(0x15100)))
        );
    }

    #[test]
    fn test_needs_four_statements() {
        assert_eq!(
            resolve(Architecture::RiscV64, Address::ptr64(0x10010), &stub()[..3], &Unmapped),
            None
        );
    }

    #[test]
    fn test_jump_must_use_loaded_register() {
        let mut window = stub();
        window[3] = goto(reg(5, "t0", 64));
        assert_eq!(
            resolve(Architecture::RiscV64, Address::ptr64(0x10010), &window, &Unmapped),
            None
        );
    }
}
