//! AArch32 PLT stubs.

use super::{assignment, goto_target, is_identifier, memory_access, MatchContext, ResolvedTarget};
use crate::core::rtl::RtlStatement;

/// Offset loaded from a literal pool and added to a base address:
///
/// ```text
/// ldr rx, [addr1]
/// add ry, addr2, rx
/// ldr pc, [ry]
/// ```
pub fn load_indexed(ctx: &MatchContext<'_>, window: &[RtlStatement]) -> Option<ResolvedTarget> {
    if window.len() < 3 {
        return None;
    }
    let (loaded, src) = assignment(&window[0])?;
    let (ea, dt) = memory_access(src)?;
    let pool = ea.as_address()?;
    let dt = dt.as_primitive().filter(|p| p.bits == 32)?;
    let offset = ctx.memory.try_read(pool, dt)?;

    let (sum, value) = assignment(&window[1])?;
    let (left, right) = value.as_iadd()?;
    let base = left.as_address()?;
    if right != loaded {
        return None;
    }

    let (jump_ea, _) = memory_access(goto_target(&window[2])?)?;
    if jump_ea != sum {
        return None;
    }
    Some(ResolvedTarget::Address(base.offset(offset.as_i64())))
}

/// PC-relative address built in three additions:
///
/// ```text
/// add ip, pc, #0
/// add ip, ip, #0x64000
/// ldr pc, [ip, #0x7e0]!
/// ```
///
/// The two folded constants are not checked to be PC-relative.
pub fn materialized(_ctx: &MatchContext<'_>, window: &[RtlStatement]) -> Option<ResolvedTarget> {
    if window.len() < 4 {
        return None;
    }
    let (dst, src) = assignment(&window[0])?;
    if !is_identifier(dst) {
        return None;
    }
    let (left, right) = src.as_iadd()?;
    let mut addr = left.as_address()?.offset(right.as_constant()?.as_i64());

    for stmt in &window[1..3] {
        let (step_dst, step) = assignment(stmt)?;
        let (left, right) = step.as_iadd()?;
        if step_dst != dst || left != dst {
            return None;
        }
        addr = addr.offset(right.as_constant()?.as_i64());
    }

    let (ea, dt) = memory_access(goto_target(&window[3])?)?;
    if ea != dst || dt.bit_size() != 32 {
        return None;
    }
    Some(ResolvedTarget::Address(addr))
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::super::{resolve, Architecture};
    use super::*;
    use crate::core::expr::{Constant, Expression};
    use crate::core::memory::Address;
    use crate::core::types::PrimitiveType;

    fn load_indexed_stub() -> Vec<RtlStatement> {
        let r3 = reg(3, "r3", 32);
        let ip = reg(12, "ip", 32);
        vec![
            assign(
                r3.clone(),
                Expression::mem(PrimitiveType::WORD32, Expression::Address(Address::ptr32(0x8000))),
            ),
            assign(
                ip.clone(),
                Expression::iadd(Expression::Address(Address::ptr32(0x10000)), r3),
            ),
            goto(Expression::mem(PrimitiveType::WORD32, ip)),
        ]
    }

    fn pool() -> Words {
        let mut words = Words::default();
        words.0.insert(0x8000, 0x2468);
        words
    }

    #[test]
    fn test_load_indexed() {
        let stub = load_indexed_stub();
        let target = resolve(Architecture::Arm32, Address::ptr32(0x7FF0), &stub, &pool());
        assert_eq!(target, Some(ResolvedTarget::Address(Address::ptr32(0x12468))));
    }

    #[test]
    fn test_load_indexed_needs_three_statements() {
        let stub = load_indexed_stub();
        assert_eq!(
            resolve(Architecture::Arm32, Address::ptr32(0x7FF0), &stub[..2], &pool()),
            None
        );
    }

    #[test]
    fn test_load_indexed_failed_read_is_no_match() {
        let stub = load_indexed_stub();
        assert_eq!(
            resolve(Architecture::Arm32, Address::ptr32(0x7FF0), &stub, &Unmapped),
            None
        );
    }

    #[test]
    fn test_load_indexed_negative_offset() {
        let mut words = Words::default();
        words.0.insert(0x8000, 0xFFFF_FFF0);
        let stub = load_indexed_stub();
        assert_eq!(
            resolve(Architecture::Arm32, Address::ptr32(0), &stub, &words),
            Some(ResolvedTarget::Address(Address::ptr32(0xFFF0)))
        );
    }

    fn materialized_stub() -> Vec<RtlStatement> {
        let ip = reg(12, "ip", 32);
        vec![
            assign(
                ip.clone(),
                Expression::iadd(Expression::Address(Address::ptr32(0x10A9C)), word32(0)),
            ),
            assign(ip.clone(), Expression::iadd(ip.clone(), word32(0x64000))),
            assign(
                ip.clone(),
                Expression::iadd(ip.clone(), Expression::Constant(Constant::int32(1864))),
            ),
            goto(Expression::mem(PrimitiveType::WORD32, ip)),
        ]
    }

    #[test]
    fn test_materialized() {
        let stub = materialized_stub();
        assert_eq!(
            resolve(Architecture::Arm32, Address::ptr32(0x10A94), &stub, &Unmapped),
            Some(ResolvedTarget::Address(Address::ptr32(0x751E4)))
        );
    }

    #[test]
    fn test_materialized_rejects_other_register() {
        let mut stub = materialized_stub();
        let r0 = reg(0, "r0", 32);
        stub[2] = assign(r0.clone(), Expression::iadd(r0, word32(4)));
        assert_eq!(
            resolve(Architecture::Arm32, Address::ptr32(0x10A94), &stub, &Unmapped),
            None
        );
        assert_eq!(
            resolve(Architecture::Arm32, Address::ptr32(0x10A94), &materialized_stub()[..3], &Unmapped),
            None
        );
    }
}
