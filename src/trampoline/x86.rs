//! x86 and x86-64 PLT stubs.

use super::{goto_target, MatchContext, ResolvedTarget};
use crate::core::expr::Expression;
use crate::core::memory::Address;
use crate::core::rtl::RtlStatement;

/// `jmp [addr]`, or a jump already resolved to a procedure.
///
/// A constant effective address is taken as an address of the family's
/// pointer width; the memory it names is not read.
pub fn jump_through_memory(ctx: &MatchContext<'_>, window: &[RtlStatement]) -> Option<ResolvedTarget> {
    match goto_target(window.first()?)? {
        Expression::Procedure(p) => Some(ResolvedTarget::Procedure(p.clone())),
        Expression::Memory(m) => match m.ea.as_ref() {
            Expression::Address(addr) => Some(ResolvedTarget::Address(*addr)),
            Expression::Constant(c) => Some(ResolvedTarget::Address(Address::new(
                c.value,
                ctx.arch.pointer_bits(),
            ))),
            _ => None,
        },
        _ => None,
    }
}
