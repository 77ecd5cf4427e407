//! AArch64 PLT stubs.

use super::{assignment, goto_target, is_identifier, memory_access, MatchContext, ResolvedTarget};
use crate::core::expr::Expression;
use crate::core::rtl::RtlStatement;

/// Scratch register the linker uses for the GOT page.
const PAGE_REGISTER: &str = "x16";

/// GOT slot addressed by page and page offset:
///
/// ```text
/// adrp x16, #0x13000
/// ldr  x17, [x16, #off]
/// add  x16, x16, #off
/// br   x17
/// ```
pub fn page_offset(_ctx: &MatchContext<'_>, window: &[RtlStatement]) -> Option<ResolvedTarget> {
    if window.len() < 4 {
        return None;
    }
    let (page_reg, src) = assignment(&window[0])?;
    if !matches!(page_reg, Expression::Register(r) if r.name == PAGE_REGISTER) {
        return None;
    }
    let page = src.as_address()?;

    let (slot, load) = assignment(&window[1])?;
    if !is_identifier(slot) {
        return None;
    }
    let (ea, _) = memory_access(load)?;
    let addr = match ea.as_iadd() {
        Some((left, right)) if left == page_reg => page.offset(right.as_constant()?.as_i64()),
        Some(_) => return None,
        None if ea == page_reg => page,
        None => return None,
    };

    let (third, _) = assignment(&window[2])?;
    if third == slot {
        return None;
    }
    if goto_target(&window[3])? != slot {
        return None;
    }
    Some(ResolvedTarget::Address(addr))
}
