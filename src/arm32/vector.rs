// Rewriters for the AArch32 VFP/Advanced SIMD instructions. Each handler reads its operands
// through the operand resolver, emits statements into the context's buffer, and reports a
// malformed or unimplemented combination by returning an error instead of emitting. The
// caller drops the context on error, so a failing handler never leaves partial RTL behind.
//
// Lane-wise operations with no direct RTL operator are emitted as intrinsic calls whose
// result is an array of lanes covering the destination register. Scalar floating point
// forms (an element as wide as the destination) use plain RTL arithmetic instead.
//
// Structured transfers (vld1-4/vst1-4) move whole D registers. A load fills a temporary of
// 64 bits per register and then hands each register its slice, the first listed register
// taking the most significant 64 bits.

//! Opcode rewriters for AArch32 vector and floating point instructions.

use super::instruction::{Opcode, Operand, VectorData};
use super::operand::{arith, lanes, Ctx};
use super::registers::{self, NZCV, NZCV_MASK, SP};
use crate::core::error::RewriteError;
use crate::core::expr::{BinaryOp, Expression, UnaryOp};
use crate::core::intrinsic::{IntrinsicDescriptor, IntrinsicKind, IntrinsicParam};
use crate::core::memory::mask;
use crate::core::register_file::Reg;
use crate::core::types::{DataType, ElementType, LaneKind, PrimitiveType};

type RewriteResult = Result<(), RewriteError>;

/// Emit the RTL of the instruction held by `ctx`.
pub fn rewrite(ctx: &mut Ctx<'_>) -> RewriteResult {
    let instr = ctx.instr();
    if let Some(cond) = instr.condition {
        return Err(unimplemented(ctx, format!("conditional execution ({cond})")));
    }
    match instr.opcode {
        Opcode::Vabd => lane_binop(ctx, IntrinsicKind::Vabd),
        Opcode::Vadd => float_or_lane_binop(ctx, IntrinsicKind::Vadd, BinaryOp::FAdd),
        Opcode::Vand => lane_binop(ctx, IntrinsicKind::Vand),
        Opcode::Vbic => lane_binop(ctx, IntrinsicKind::Vbic),
        Opcode::Vceq => lane_binop(ctx, IntrinsicKind::Vceq),
        Opcode::Vcge => lane_binop(ctx, IntrinsicKind::Vcge),
        Opcode::Vcgt => lane_binop(ctx, IntrinsicKind::Vcgt),
        Opcode::Veor => lane_binop(ctx, IntrinsicKind::Veor),
        Opcode::Vmax => lane_binop(ctx, IntrinsicKind::Vmax),
        Opcode::Vmin => lane_binop(ctx, IntrinsicKind::Vmin),
        Opcode::Vmul => float_or_lane_binop(ctx, IntrinsicKind::Vmul, BinaryOp::FMul),
        Opcode::Vorn => lane_binop(ctx, IntrinsicKind::Vorn),
        Opcode::Vorr => lane_binop(ctx, IntrinsicKind::Vorr),
        Opcode::Vpadd => lane_binop(ctx, IntrinsicKind::Vpadd),
        Opcode::Vqadd => lane_binop(ctx, IntrinsicKind::Vqadd),
        Opcode::Vqsub => lane_binop(ctx, IntrinsicKind::Vqsub),
        Opcode::Vshl => lane_binop(ctx, IntrinsicKind::Vshl),
        Opcode::Vsub => float_or_lane_binop(ctx, IntrinsicKind::Vsub, BinaryOp::FSub),
        Opcode::Vdiv => vdiv(ctx),

        Opcode::Vabs => vabs(ctx),
        Opcode::Vneg => vneg(ctx),
        Opcode::Vmvn => vmvn(ctx),
        Opcode::Vsqrt => vsqrt(ctx),
        Opcode::Vdup => vdup(ctx),
        Opcode::Vbsl => vbsl(ctx),
        Opcode::Vext => vext(ctx),
        Opcode::Vtbl => vtbl(ctx),

        Opcode::Vcmp | Opcode::Vcmpe => vcmp(ctx),
        Opcode::Vcvt => vcvt(ctx),
        Opcode::Vcvtr => vcvtr(ctx),

        Opcode::Vmla | Opcode::Vfma => multiply_accumulate(ctx, false),
        Opcode::Vmls | Opcode::Vfms => multiply_accumulate(ctx, true),

        Opcode::Vmov => vmov(ctx),
        Opcode::Vmrs => vmrs(ctx),
        Opcode::Vmsr => vmsr(ctx),

        Opcode::Vld1 => structured_load(ctx, IntrinsicKind::Vld1Multi),
        Opcode::Vld2 => structured_load(ctx, IntrinsicKind::Vld2),
        Opcode::Vld3 => structured_load(ctx, IntrinsicKind::Vld3),
        Opcode::Vld4 => structured_load(ctx, IntrinsicKind::Vld4),
        Opcode::Vst1 => structured_store(ctx, IntrinsicKind::Vst1Multi),
        Opcode::Vst2 => structured_store(ctx, IntrinsicKind::Vst2),
        Opcode::Vst3 => structured_store(ctx, IntrinsicKind::Vst3),
        Opcode::Vst4 => structured_store(ctx, IntrinsicKind::Vst4),

        Opcode::Vldr => vldr(ctx),
        Opcode::Vstr => vstr(ctx),
        Opcode::Vldmia => vldmia(ctx),
        Opcode::Vstmia => vstm(ctx, true),
        Opcode::Vstmdb => vstm(ctx, false),
        Opcode::Vpush => vpush(ctx),
        Opcode::Vpop => vpop(ctx),

        Opcode::Vcnt
        | Opcode::Vrecpe
        | Opcode::Vrev64
        | Opcode::Vrsqrte
        | Opcode::Vswp
        | Opcode::Vtrn
        | Opcode::Vuzp
        | Opcode::Vzip => Err(unimplemented(ctx, "no rewriter for this opcode")),

        Opcode::Invalid => Err(RewriteError::malformed("undecodable instruction")),
    }
}

fn unimplemented(ctx: &Ctx<'_>, detail: impl Into<String>) -> RewriteError {
    let instr = ctx.instr();
    RewriteError::Unimplemented {
        mnemonic: format!("{}{}", instr.opcode, instr.vector_data),
        detail: detail.into(),
    }
}

/// Operand indices of a two- or three-operand form: `(dst, src1, src2)`.
///
/// The two-operand form `op d0, d1` means `op d0, d0, d1`.
fn binop_operands(ctx: &Ctx<'_>) -> Result<(usize, usize, usize), RewriteError> {
    match ctx.operand_count() {
        3 => Ok((0, 1, 2)),
        2 => Ok((0, 0, 1)),
        n => Err(RewriteError::malformed(format!(
            "{} expects two or three operands, got {n}",
            ctx.instr().opcode
        ))),
    }
}

/// Read a source operand; immediates are read at the lane width.
fn lane_source(ctx: &Ctx<'_>, index: usize, elem: ElementType) -> Result<Expression, RewriteError> {
    match ctx.operand(index)? {
        Operand::Immediate(_) => ctx.read_as(index, elem.bits),
        _ => ctx.read(index),
    }
}

/// Scalar floating point element as wide as the destination register, if any.
fn scalar_float(ctx: &Ctx<'_>, dst: &Expression) -> Option<ElementType> {
    ctx.instr()
        .vector_data
        .elem()
        .filter(|e| e.kind == LaneKind::Float && e.bits == dst.bit_size())
}

/// Lanes of `elem` across the whole of `dst`.
fn lane_array(elem: ElementType, dst: &Expression) -> Result<DataType, RewriteError> {
    lanes(elem.primitive(), dst.bit_size())
}

fn lane_binop(ctx: &mut Ctx<'_>, kind: IntrinsicKind) -> RewriteResult {
    let (d, s1, s2) = binop_operands(ctx)?;
    let elem = ctx.instr().vector_data.lane_type();
    let src1 = ctx.read(s1)?;
    let src2 = lane_source(ctx, s2, elem)?;
    let dst = ctx.write(d)?;
    let dt = lane_array(elem, &dst)?;
    let call = Expression::intrinsic(
        IntrinsicDescriptor::with_elem(kind, elem),
        dt,
        vec![src1, src2],
    );
    ctx.assign(dst, call)
}

fn float_or_lane_binop(ctx: &mut Ctx<'_>, kind: IntrinsicKind, op: BinaryOp) -> RewriteResult {
    let (d, s1, s2) = binop_operands(ctx)?;
    let dst = ctx.write(d)?;
    if scalar_float(ctx, &dst).is_none() {
        return lane_binop(ctx, kind);
    }
    let src1 = ctx.read(s1)?;
    let src2 = ctx.read(s2)?;
    ctx.assign(dst, Expression::binary(op, src1, src2))
}

fn vdiv(ctx: &mut Ctx<'_>) -> RewriteResult {
    let (d, s1, s2) = binop_operands(ctx)?;
    let dst = ctx.write(d)?;
    if scalar_float(ctx, &dst).is_none() {
        return Err(unimplemented(ctx, "vdiv is only defined on scalar floats"));
    }
    let src1 = ctx.read(s1)?;
    let src2 = ctx.read(s2)?;
    ctx.assign(dst, Expression::fdiv(src1, src2))
}

fn lane_unop(ctx: &mut Ctx<'_>, kind: IntrinsicKind) -> RewriteResult {
    let elem = ctx.instr().vector_data.lane_type();
    let src = lane_source(ctx, 1, elem)?;
    let dst = ctx.write(0)?;
    let dt = lane_array(elem, &dst)?;
    let call = Expression::intrinsic(IntrinsicDescriptor::with_elem(kind, elem), dt, vec![src]);
    ctx.assign(dst, call)
}

fn vabs(ctx: &mut Ctx<'_>) -> RewriteResult {
    let dst = ctx.write(0)?;
    let Some(elem) = scalar_float(ctx, &dst) else {
        return lane_unop(ctx, IntrinsicKind::Vabs);
    };
    let kind = if elem.bits == 32 {
        IntrinsicKind::Fabsf
    } else {
        IntrinsicKind::Fabs
    };
    let src = ctx.read(1)?;
    let call = Expression::intrinsic(IntrinsicDescriptor::plain(kind), elem.primitive(), vec![src]);
    ctx.assign(dst, call)
}

fn vneg(ctx: &mut Ctx<'_>) -> RewriteResult {
    let dst = ctx.write(0)?;
    if scalar_float(ctx, &dst).is_none() {
        return lane_unop(ctx, IntrinsicKind::Vneg);
    }
    let src = ctx.read(1)?;
    ctx.assign(dst, Expression::unary(UnaryOp::FNeg, src))
}

fn vmvn(ctx: &mut Ctx<'_>) -> RewriteResult {
    match ctx.operand(1)? {
        Operand::Immediate(_) => lane_unop(ctx, IntrinsicKind::VmvnImm),
        _ => lane_unop(ctx, IntrinsicKind::Vmvn),
    }
}

fn vsqrt(ctx: &mut Ctx<'_>) -> RewriteResult {
    let elem = ctx.instr().vector_data.elem();
    let (kind, dt) = match elem {
        Some(e) if e.kind == LaneKind::Float && e.bits == 32 => (IntrinsicKind::Sqrtf, PrimitiveType::REAL32),
        Some(e) if e.kind == LaneKind::Float && e.bits == 64 => (IntrinsicKind::Sqrt, PrimitiveType::REAL64),
        _ => return Err(RewriteError::malformed("vsqrt needs a floating point element type")),
    };
    let src = ctx.read(1)?;
    let dst = ctx.write(0)?;
    ctx.assign(dst, Expression::intrinsic(IntrinsicDescriptor::plain(kind), dt, vec![src]))
}

fn vdup(ctx: &mut Ctx<'_>) -> RewriteResult {
    let bits = ctx.instr().vector_data.lane_bits_or_fallback();
    let mut src = ctx.read(1)?;
    if src.bit_size() < bits {
        return Err(RewriteError::malformed(format!(
            "{}-bit source for {bits}-bit lanes",
            src.bit_size()
        )));
    }
    if src.bit_size() > bits {
        src = Expression::slice(src, PrimitiveType::word(bits), 0);
    }
    let dst = ctx.write(0)?;
    let count = dst.bit_size() / bits;
    let dt = DataType::array(src.data_type(), count);
    let call = Expression::intrinsic(
        IntrinsicDescriptor::with_bits(IntrinsicKind::Vdup, bits),
        dt,
        vec![src],
    );
    ctx.assign(dst, call)
}

fn vbsl(ctx: &mut Ctx<'_>) -> RewriteResult {
    let select = ctx.read(0)?;
    let src1 = ctx.read(1)?;
    let src2 = ctx.read(2)?;
    let dst = ctx.write(0)?;
    let bits = dst.bit_size();
    let dt = dst.data_type();
    let call = Expression::intrinsic(
        IntrinsicDescriptor::with_bits(IntrinsicKind::Vbsl, bits),
        dt,
        vec![select, src1, src2],
    );
    ctx.assign(dst, call)
}

fn vext(ctx: &mut Ctx<'_>) -> RewriteResult {
    let src1 = ctx.read(1)?;
    let src2 = ctx.read(2)?;
    let position = ctx.read_as(3, 8)?;
    let dst = ctx.write(0)?;
    let dt = dst.data_type();
    let call = Expression::intrinsic(
        IntrinsicDescriptor::plain(IntrinsicKind::Vext),
        dt,
        vec![src1, src2, position],
    );
    ctx.assign(dst, call)
}

fn vtbl(ctx: &mut Ctx<'_>) -> RewriteResult {
    let table = ctx.read(1)?;
    let index = ctx.read(2)?;
    let dst = ctx.write(0)?;
    let dt = dst.data_type();
    let call = Expression::intrinsic(
        IntrinsicDescriptor::with_bits(IntrinsicKind::Vtbl, table.bit_size()),
        dt,
        vec![table, index],
    );
    ctx.assign(dst, call)
}

fn vcmp(ctx: &mut Ctx<'_>) -> RewriteResult {
    let src1 = ctx.read(0)?;
    let src2 = ctx.read_as(1, src1.bit_size())?;
    let flags = ctx.flag_group(NZCV)?;
    let dt = flags.data_type();
    ctx.assign(flags, Expression::cond(Expression::fsub(src1, src2), dt))
}

fn vcvt(ctx: &mut Ctx<'_>) -> RewriteResult {
    let VectorData::Convert { dst: to, src: from } = ctx.instr().vector_data else {
        return Err(unimplemented(ctx, "conversion without source and destination types"));
    };
    if ctx.operand_count() > 2 {
        return Err(unimplemented(ctx, "fixed-point conversion"));
    }
    let src = ctx.read(1)?;
    let dst = ctx.write(0)?;
    let dst_bits = dst.bit_size();
    if dst_bits == to.bits {
        if src.bit_size() != from.bits {
            return Err(RewriteError::malformed(format!(
                "{}-bit source for a {} conversion",
                src.bit_size(),
                from.name()
            )));
        }
        return ctx.assign(dst, Expression::convert(src, from.primitive(), to.primitive()));
    }

    // Packed conversion: every lane of the source converts independently.
    let dst_dt = lanes(to.primitive(), dst_bits)?;
    let count = dst_bits / to.bits;
    if src.bit_size() != count * from.bits {
        return Err(RewriteError::malformed(format!(
            "{}-bit source cannot hold {count} {} lanes",
            src.bit_size(),
            from.name()
        )));
    }
    let packed = ctx.temp(DataType::array(from.primitive().into(), count));
    ctx.assign(packed.clone(), src)?;
    let descriptor = IntrinsicDescriptor::new(
        IntrinsicKind::Vcvt,
        vec![IntrinsicParam::Conv(to), IntrinsicParam::Conv(from)],
    );
    ctx.assign(dst, Expression::intrinsic(descriptor, dst_dt, vec![packed]))
}

/// Float to integer conversion rounding toward zero.
fn vcvtr(ctx: &mut Ctx<'_>) -> RewriteResult {
    let VectorData::Convert { dst: to, src: from } = ctx.instr().vector_data else {
        return Err(unimplemented(ctx, "conversion without source and destination types"));
    };
    if from.kind != LaneKind::Float || to.kind == LaneKind::Float {
        return Err(unimplemented(ctx, "only float to integer conversions round"));
    }
    if ctx.operand_count() > 2 {
        return Err(unimplemented(ctx, "fixed-point conversion"));
    }
    let src = ctx.read(1)?;
    let dst = ctx.write(0)?;
    if src.bit_size() != from.bits || dst.bit_size() != to.bits {
        return Err(RewriteError::malformed("vcvtr operands do not match the conversion types"));
    }
    let truncated = ctx.temp(from.primitive());
    let trunc = Expression::intrinsic(
        IntrinsicDescriptor::plain(IntrinsicKind::Trunc),
        from.primitive(),
        vec![src],
    );
    ctx.assign(truncated.clone(), trunc)?;
    ctx.assign(dst, Expression::convert(truncated, from.primitive(), to.primitive()))
}

/// `vmla`/`vmls`/`vfma`/`vfms`: `dst = dst ± src1 * src2` on the low element.
fn multiply_accumulate(ctx: &mut Ctx<'_>, subtract: bool) -> RewriteResult {
    let Some(elem) = ctx.instr().vector_data.elem() else {
        return Err(unimplemented(ctx, "no element type"));
    };
    let lhs_reg = ctx.register_operand(1)?;
    let rhs_reg = ctx.register_operand(2)?;
    let dst_reg = ctx.register_operand(0)?;
    let width = ctx.registers().width(lhs_reg);
    if elem.bits > width {
        return Err(unimplemented(
            ctx,
            format!("{}-bit elements in a {width}-bit operand", elem.bits),
        ));
    }
    let dt = elem.primitive();
    let lhs = ctx.narrowed(lhs_reg, dt)?;
    let rhs = ctx.narrowed(rhs_reg, dt)?;
    let acc = ctx.narrowed(dst_reg, dt)?;

    let float = elem.kind == LaneKind::Float;
    let product = Expression::binary(arith(float, BinaryOp::IMul, BinaryOp::FMul), lhs, rhs);
    let op = if subtract {
        arith(float, BinaryOp::ISub, BinaryOp::FSub)
    } else {
        arith(float, BinaryOp::IAdd, BinaryOp::FAdd)
    };
    let result = Expression::binary(op, acc, product);

    let dst = ctx.reg(dst_reg);
    let result = ctx.zero_extend(result, dst.bit_size());
    ctx.assign(dst, result)
}

fn vmov(ctx: &mut Ctx<'_>) -> RewriteResult {
    match ctx.operand_count() {
        2 => {}
        3 => return vmov_core_pair(ctx),
        n => return Err(unimplemented(ctx, format!("vmov with {n} operands"))),
    }
    let dst = ctx.write(0)?;
    let dst_bits = dst.bit_size();
    let source = ctx.operand(1)?;

    if let Operand::Immediate(value) = source {
        // A Q register receives the 64-bit pattern in both halves.
        let bits = if dst_bits == 128 { 64 } else { dst_bits };
        let pattern = match ctx.instr().vector_data.elem() {
            Some(elem) if elem.bits > 0 && elem.bits < bits => {
                replicate(*value, elem.bits, bits)
            }
            _ => *value,
        };
        let imm = Expression::word(bits, pattern);
        let src = if dst_bits == 2 * imm.bit_size() {
            Expression::seq(vec![imm.clone(), imm])
        } else {
            imm
        };
        return ctx.assign(dst, src);
    }

    let src = ctx.read(1)?;
    if let Some(elem) = ctx.instr().vector_data.elem() {
        if !matches!(source, Operand::RegisterList(_)) {
            let dt = dst.data_type();
            let call = Expression::intrinsic(
                IntrinsicDescriptor::with_elem(IntrinsicKind::Vmov, elem),
                dt,
                vec![src],
            );
            return ctx.assign(dst, call);
        }
    }
    let src = if src.bit_size() == dst_bits {
        src
    } else {
        let from = src.data_type();
        Expression::convert(src, from, dst.data_type())
    };
    ctx.assign(dst, src)
}

/// Repeat the low `lane` bits of `value` across `total` bits.
fn replicate(value: u64, lane: u32, total: u32) -> u64 {
    let lane_value = value & mask(lane);
    (0..total / lane).fold(0, |acc, i| acc | (lane_value << (i * lane)))
}

/// `vmov d0, r0, r1` and `vmov r0, r1, d0`: move a D register to or from a core register pair.
fn vmov_core_pair(ctx: &mut Ctx<'_>) -> RewriteResult {
    let first = ctx.register_operand(0)?;
    if ctx.registers().width(first) == 64 {
        let low = ctx.read(1)?;
        let high = ctx.read(2)?;
        let dst = ctx.write(0)?;
        return ctx.assign(dst, Expression::seq(vec![high, low]));
    }
    let src = ctx.read(2)?;
    if src.bit_size() != 64 {
        return Err(RewriteError::malformed("vmov to a register pair needs a D register source"));
    }
    let low = ctx.write(0)?;
    let high = ctx.write(1)?;
    ctx.assign(low, Expression::slice(src.clone(), PrimitiveType::WORD32, 0))?;
    ctx.assign(high, Expression::slice(src, PrimitiveType::WORD32, 32))
}

/// System register named by operand `index`, either directly or by selector.
fn system_register(ctx: &Ctx<'_>, index: usize) -> Result<Option<Reg>, RewriteError> {
    match ctx.operand(index)? {
        Operand::Register(reg) => Ok(Some(*reg)),
        Operand::Immediate(selector) => Ok(registers::system_register(*selector)),
        _ => Err(RewriteError::malformed("expected a system register")),
    }
}

fn vmrs(ctx: &mut Ctx<'_>) -> RewriteResult {
    let Some(sysreg) = system_register(ctx, 1)? else {
        ctx.invalid();
        return Ok(());
    };
    let src = ctx.reg(sysreg);
    // `vmrs APSR_nzcv, fpscr` copies only the condition flags.
    if matches!(ctx.operand(1)?, Operand::Immediate(1)) {
        let flags = ctx.flag_group(NZCV)?;
        let bits = flags.bit_size();
        let offset = NZCV_MASK.trailing_zeros();
        return ctx.assign(flags, Expression::slice(src, PrimitiveType::word(bits), offset));
    }
    let dst = ctx.write(0)?;
    ctx.assign(dst, src)
}

fn vmsr(ctx: &mut Ctx<'_>) -> RewriteResult {
    let Some(sysreg) = system_register(ctx, 0)? else {
        ctx.invalid();
        return Ok(());
    };
    let src = ctx.read(1)?;
    let dst = ctx.reg(sysreg);
    ctx.assign(dst, src)
}

/// D registers of a structured transfer, checked to be 64 bits wide.
fn d_registers<'a>(ctx: &Ctx<'a>, index: usize) -> Result<&'a [Reg], RewriteError> {
    let regs = ctx.register_list(index)?;
    if let Some(reg) = regs.iter().find(|r| ctx.registers().width(**r) != 64) {
        return Err(RewriteError::malformed(format!(
            "{} in a structured transfer is not a D register",
            ctx.registers().name(*reg)
        )));
    }
    Ok(regs)
}

/// Base register of a structured transfer and whether it is written back.
fn transfer_base(ctx: &Ctx<'_>, index: usize) -> Result<(Reg, bool), RewriteError> {
    let mem = ctx.memory_operand(index)?;
    let base = mem
        .base
        .ok_or_else(|| RewriteError::malformed("structured transfer has no base register"))?;
    let writeback = ctx.instr().writeback;
    if writeback && mem.index.is_some() {
        return Err(RewriteError::fault(
            "structured transfer with both a register index and writeback",
        ));
    }
    Ok((base, writeback))
}

fn write_back(ctx: &mut Ctx<'_>, base: Reg, delta: i64) -> RewriteResult {
    let reg = ctx.reg(base);
    let updated = ctx.displaced(reg.clone(), delta);
    ctx.assign(reg, updated)
}

fn structured_load(ctx: &mut Ctx<'_>, kind: IntrinsicKind) -> RewriteResult {
    let regs = d_registers(ctx, 0)?;
    let (base, writeback) = transfer_base(ctx, 1)?;
    let elem = ctx.instr().vector_data.lane_type();
    let count = regs.len() as u32;
    let bits = 64 * count;

    let descriptor = IntrinsicDescriptor::new(
        kind,
        vec![IntrinsicParam::Bits(32), IntrinsicParam::Elem(elem)],
    );
    let loaded = ctx.temp(PrimitiveType::word(bits));
    let call = Expression::intrinsic(descriptor, PrimitiveType::word(bits), vec![ctx.reg(base)]);
    ctx.assign(loaded.clone(), call)?;

    for (i, reg) in regs.iter().enumerate() {
        let offset = 64 * (count - 1 - i as u32);
        let dst = ctx.reg(*reg);
        ctx.assign(dst, Expression::slice(loaded.clone(), PrimitiveType::WORD64, offset))?;
    }
    if writeback {
        write_back(ctx, base, i64::from(count) * 8)?;
    }
    Ok(())
}

fn structured_store(ctx: &mut Ctx<'_>, kind: IntrinsicKind) -> RewriteResult {
    let regs = d_registers(ctx, 0)?;
    let (base, writeback) = transfer_base(ctx, 1)?;
    let elem = ctx.instr().vector_data.lane_type();
    let count = regs.len() as u32;

    let data = ctx.sequence(regs)?;
    let descriptor = IntrinsicDescriptor::new(
        kind,
        vec![
            IntrinsicParam::Bits(32),
            IntrinsicParam::Elem(elem),
            IntrinsicParam::Bits(64 * count),
        ],
    );
    let call = Expression::intrinsic(descriptor, PrimitiveType::VOID, vec![data, ctx.reg(base)]);
    ctx.m.side_effect(call);
    if writeback {
        write_back(ctx, base, i64::from(count) * 8)?;
    }
    Ok(())
}

fn vldr(ctx: &mut Ctx<'_>) -> RewriteResult {
    let dst = ctx.write(0)?;
    let src = ctx.read_as(1, dst.bit_size())?;
    ctx.assign(dst, src)
}

fn vstr(ctx: &mut Ctx<'_>) -> RewriteResult {
    let src = ctx.read(0)?;
    let dst = ctx.resolve(1, Some(src.bit_size()), super::operand::Access::Write)?;
    ctx.assign(dst, src)
}

/// Memory slot of each register in a multiple transfer starting at `base + start`.
fn transfer_slots(
    ctx: &Ctx<'_>,
    base: Reg,
    regs: &[Reg],
    start: i64,
) -> Vec<(Reg, Expression)> {
    let mut offset = start;
    regs.iter()
        .map(|reg| {
            let bits = ctx.registers().width(*reg);
            let ea = if offset == 0 {
                ctx.reg(base)
            } else {
                ctx.displaced(ctx.reg(base), offset)
            };
            offset += i64::from(bits / 8);
            (*reg, Expression::mem(PrimitiveType::word(bits), ea))
        })
        .collect()
}

fn list_size(ctx: &Ctx<'_>, regs: &[Reg]) -> i64 {
    regs.iter()
        .map(|r| i64::from(ctx.registers().width(*r) / 8))
        .sum()
}

fn vldmia(ctx: &mut Ctx<'_>) -> RewriteResult {
    let base = ctx.register_operand(0)?;
    let regs = ctx.register_list(1)?;
    for (reg, slot) in transfer_slots(ctx, base, regs, 0) {
        let dst = ctx.reg(reg);
        ctx.assign(dst, slot)?;
    }
    if ctx.instr().writeback {
        let size = list_size(ctx, regs);
        write_back(ctx, base, size)?;
    }
    Ok(())
}

/// `vstmia` stores upward from the base, `vstmdb` below it.
fn vstm(ctx: &mut Ctx<'_>, increment_after: bool) -> RewriteResult {
    let base = ctx.register_operand(0)?;
    let regs = ctx.register_list(1)?;
    let size = list_size(ctx, regs);
    let start = if increment_after { 0 } else { -size };
    for (reg, slot) in transfer_slots(ctx, base, regs, start) {
        let src = ctx.reg(reg);
        ctx.assign(slot, src)?;
    }
    if ctx.instr().writeback {
        write_back(ctx, base, if increment_after { size } else { -size })?;
    }
    Ok(())
}

fn vpush(ctx: &mut Ctx<'_>) -> RewriteResult {
    let regs = ctx.register_list(0)?;
    let size = list_size(ctx, regs);
    write_back(ctx, SP, -size)?;
    for (reg, slot) in transfer_slots(ctx, SP, regs, 0) {
        let src = ctx.reg(reg);
        ctx.assign(slot, src)?;
    }
    Ok(())
}

fn vpop(ctx: &mut Ctx<'_>) -> RewriteResult {
    let regs = ctx.register_list(0)?;
    for (reg, slot) in transfer_slots(ctx, SP, regs, 0) {
        let dst = ctx.reg(reg);
        ctx.assign(dst, slot)?;
    }
    let size = list_size(ctx, regs);
    write_back(ctx, SP, size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm32::instruction::{DecodedInstruction, MemoryOperand};
    use crate::arm32::registers::{d, q, r, s};
    use crate::core::memory::Address;
    use crate::core::register_file::RegisterFile;
    use crate::core::rtl::{InstrClass, RtlCluster};

    const I32: ElementType = ElementType::new(LaneKind::Int, 32);
    const F32: ElementType = ElementType::new(LaneKind::Float, 32);
    const F64: ElementType = ElementType::new(LaneKind::Float, 64);
    const S32: ElementType = ElementType::new(LaneKind::Signed, 32);

    fn regs() -> RegisterFile {
        registers::register_file().unwrap()
    }

    fn instr(opcode: Opcode, vd: VectorData, operands: Vec<Operand>) -> DecodedInstruction {
        DecodedInstruction::new(Address::ptr32(0x10000), opcode, vd, operands)
    }

    fn lift(regs: &RegisterFile, i: &DecodedInstruction) -> Result<RtlCluster, RewriteError> {
        let mut ctx = Ctx::new(i, i.address, i.length, regs);
        rewrite(&mut ctx)?;
        Ok(ctx.finish())
    }

    fn lines(i: DecodedInstruction) -> Vec<String> {
        lift(&regs(), &i).unwrap().lines()
    }

    fn reg_ops(list: &[Reg]) -> Vec<Operand> {
        list.iter().map(|r| Operand::Register(*r)).collect()
    }

    #[test]
    fn test_vbic_emits_lane_intrinsic() {
        let i = instr(Opcode::Vbic, VectorData::Elem(I32), reg_ops(&[d(0), d(1), d(2)]));
        let cluster = lift(&regs(), &i).unwrap();
        assert_eq!(cluster.lines(), vec!["d0 = __vbic_i32(d1, d2)"]);
        assert_eq!(cluster.class, InstrClass::Linear);
        assert!(cluster.defs.contains(d(0)));
        match &cluster.instrs[0] {
            crate::core::rtl::RtlStatement::Assignment { src, .. } => {
                assert_eq!(src.data_type().to_string(), "(arr word32 2)");
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn test_untyped_lanes_fall_back_to_bytes() {
        let i = instr(Opcode::Vorr, VectorData::Invalid, reg_ops(&[q(0), q(1), q(2)]));
        assert_eq!(lines(i), vec!["q0 = __vorr_i8(q1, q2)"]);
    }

    #[test]
    fn test_scalar_float_arithmetic() {
        let i = instr(Opcode::Vadd, VectorData::Elem(F32), reg_ops(&[s(0), s(1), s(2)]));
        assert_eq!(lines(i), vec!["s0 = s1 + s2"]);
        let i = instr(Opcode::Vdiv, VectorData::Elem(F64), reg_ops(&[d(0), d(1), d(2)]));
        assert_eq!(lines(i), vec!["d0 = d1 / d2"]);
        let i = instr(Opcode::Vneg, VectorData::Elem(F32), reg_ops(&[s(4), s(5)]));
        assert_eq!(lines(i), vec!["s4 = -s5"]);
        let i = instr(Opcode::Vabs, VectorData::Elem(F64), reg_ops(&[d(4), d(5)]));
        assert_eq!(lines(i), vec!["d4 = fabs(d5)"]);
    }

    #[test]
    fn test_vector_float_add_uses_intrinsic() {
        let i = instr(Opcode::Vadd, VectorData::Elem(F32), reg_ops(&[q(0), q(1), q(2)]));
        assert_eq!(lines(i), vec!["q0 = __vadd_f32(q1, q2)"]);
    }

    #[test]
    fn test_vdup_narrows_source() {
        let i = instr(
            Opcode::Vdup,
            VectorData::Elem(ElementType::new(LaneKind::Int, 8)),
            reg_ops(&[d(0), r(1)]),
        );
        assert_eq!(lines(i), vec!["d0 = __vdup_8(SLICE(r1, byte, 0))"]);
        let i = instr(Opcode::Vdup, VectorData::Elem(I32), reg_ops(&[q(0), r(1)]));
        assert_eq!(lines(i), vec!["q0 = __vdup_32(r1)"]);
    }

    #[test]
    fn test_vdup_source_narrower_than_lane_is_malformed() {
        let i = instr(
            Opcode::Vdup,
            VectorData::Elem(ElementType::new(LaneKind::Int, 64)),
            reg_ops(&[q(0), r(1)]),
        );
        assert!(matches!(lift(&regs(), &i), Err(RewriteError::Malformed { .. })));
    }

    #[test]
    fn test_vext_and_vtbl() {
        let i = instr(
            Opcode::Vext,
            VectorData::Elem(ElementType::new(LaneKind::Int, 8)),
            vec![
                Operand::Register(d(0)),
                Operand::Register(d(1)),
                Operand::Register(d(2)),
                Operand::Immediate(3),
            ],
        );
        assert_eq!(lines(i), vec!["d0 = __vext(d1, d2, 3<8>)"]);

        let i = instr(
            Opcode::Vtbl,
            VectorData::Elem(ElementType::new(LaneKind::Int, 8)),
            vec![
                Operand::Register(d(0)),
                Operand::RegisterList(vec![d(1), d(2)]),
                Operand::Register(d(3)),
            ],
        );
        assert_eq!(lines(i), vec!["d0 = __vtbl_128(SEQ(d1, d2), d3)"]);
    }

    #[test]
    fn test_vmov_immediate_replicates_lanes() {
        let i = instr(
            Opcode::Vmov,
            VectorData::Elem(I32),
            vec![Operand::Register(d(0)), Operand::Immediate(1)],
        );
        assert_eq!(lines(i), vec!["d0 = 0x100000001<64>"]);
        let i = instr(
            Opcode::Vmov,
            VectorData::Elem(ElementType::new(LaneKind::Int, 8)),
            vec![Operand::Register(d(1)), Operand::Immediate(0x1FF)],
        );
        assert_eq!(lines(i), vec!["d1 = 0xFFFFFFFFFFFFFFFF<64>"]);
        let i = instr(
            Opcode::Vmov,
            VectorData::Elem(F32),
            vec![Operand::Register(s(0)), Operand::Immediate(0x3F80_0000)],
        );
        assert_eq!(lines(i), vec!["s0 = 0x3F800000<32>"]);
    }

    #[test]
    fn test_vmov_immediate_fills_both_halves() {
        let i = instr(
            Opcode::Vmov,
            VectorData::Elem(ElementType::new(LaneKind::Int, 64)),
            vec![Operand::Register(q(0)), Operand::Immediate(0)],
        );
        assert_eq!(lines(i), vec!["q0 = SEQ(0<64>, 0<64>)"]);
    }

    #[test]
    fn test_vmov_forms() {
        let i = instr(Opcode::Vmov, VectorData::Invalid, reg_ops(&[d(0), d(1)]));
        assert_eq!(lines(i), vec!["d0 = d1"]);
        let i = instr(Opcode::Vmov, VectorData::Elem(F32), reg_ops(&[s(0), s(1)]));
        assert_eq!(lines(i), vec!["s0 = __vmov_f32(s1)"]);
        let i = instr(Opcode::Vmov, VectorData::Invalid, reg_ops(&[d(2), r(0), r(1)]));
        assert_eq!(lines(i), vec!["d2 = SEQ(r1, r0)"]);
        let i = instr(Opcode::Vmov, VectorData::Invalid, reg_ops(&[r(0), r(1), d(2)]));
        assert_eq!(
            lines(i),
            vec!["r0 = SLICE(d2, word32, 0)", "r1 = SLICE(d2, word32, 32)"]
        );
    }

    #[test]
    fn test_vcvt_scalar_and_packed() {
        let i = instr(
            Opcode::Vcvt,
            VectorData::Convert { dst: F64, src: S32 },
            reg_ops(&[d(0), s(2)]),
        );
        assert_eq!(lines(i), vec!["d0 = CONVERT(s2, int32, real64)"]);

        let i = instr(
            Opcode::Vcvt,
            VectorData::Convert { dst: F32, src: S32 },
            reg_ops(&[q(0), q(1)]),
        );
        assert_eq!(lines(i), vec!["v0 = q1", "q0 = __vcvt_f32_i32(v0)"]);
    }

    #[test]
    fn test_vcvtr_truncates_first() {
        let i = instr(
            Opcode::Vcvtr,
            VectorData::Convert { dst: S32, src: F64 },
            reg_ops(&[s(0), d(1)]),
        );
        assert_eq!(
            lines(i),
            vec!["v0 = trunc(d1)", "s0 = CONVERT(v0, real64, int32)"]
        );
    }

    #[test]
    fn test_fixed_point_conversion_is_unimplemented() {
        let i = instr(
            Opcode::Vcvt,
            VectorData::Convert { dst: S32, src: F32 },
            vec![
                Operand::Register(s(0)),
                Operand::Register(s(0)),
                Operand::Immediate(16),
            ],
        );
        assert!(matches!(
            lift(&regs(), &i),
            Err(RewriteError::Unimplemented { .. })
        ));
        let i = instr(
            Opcode::Vcvtr,
            VectorData::Convert { dst: S32, src: F64 },
            vec![
                Operand::Register(s(0)),
                Operand::Register(d(1)),
                Operand::Immediate(16),
            ],
        );
        assert!(matches!(
            lift(&regs(), &i),
            Err(RewriteError::Unimplemented { .. })
        ));
    }

    #[test]
    fn test_vcmp_sets_condition_flags() {
        let i = instr(Opcode::Vcmp, VectorData::Elem(F32), reg_ops(&[s(0), s(1)]));
        assert_eq!(lines(i), vec!["NZCV = cond(s0 - s1)"]);
    }

    #[test]
    fn test_vmrs() {
        let i = instr(
            Opcode::Vmrs,
            VectorData::Invalid,
            vec![Operand::Register(r(0)), Operand::Immediate(1)],
        );
        assert_eq!(lines(i), vec!["NZCV = SLICE(fpscr, word4, 28)"]);
        let i = instr(
            Opcode::Vmrs,
            VectorData::Invalid,
            vec![Operand::Register(r(2)), Operand::Immediate(7)],
        );
        assert_eq!(lines(i), vec!["r2 = mvfr0"]);
        let i = instr(
            Opcode::Vmrs,
            VectorData::Invalid,
            vec![Operand::Register(r(2)), Operand::Immediate(3)],
        );
        let cluster = lift(&regs(), &i).unwrap();
        assert!(cluster.is_invalid());
        assert_eq!(cluster.lines(), vec!["<invalid>"]);
    }

    #[test]
    fn test_structured_load_with_writeback() {
        let i = instr(
            Opcode::Vld1,
            VectorData::Elem(I32),
            vec![
                Operand::RegisterList(vec![d(0), d(1)]),
                Operand::Memory(MemoryOperand::base(r(5))),
            ],
        )
        .with_writeback();
        assert_eq!(
            lines(i),
            vec![
                "v0 = __vld1_multi_32_i32(r5)",
                "d0 = SLICE(v0, word64, 64)",
                "d1 = SLICE(v0, word64, 0)",
                "r5 = r5 + 16<i32>",
            ]
        );
    }

    #[test]
    fn test_structured_load_index_and_writeback_is_fault() {
        let i = instr(
            Opcode::Vld2,
            VectorData::Elem(I32),
            vec![
                Operand::RegisterList(vec![d(0), d(1)]),
                Operand::Memory(MemoryOperand {
                    index: Some(r(2)),
                    ..MemoryOperand::base(r(5))
                }),
            ],
        )
        .with_writeback();
        assert!(matches!(lift(&regs(), &i), Err(RewriteError::Fault { .. })));
    }

    #[test]
    fn test_structured_load_without_base_is_malformed() {
        let i = instr(
            Opcode::Vld1,
            VectorData::Elem(I32),
            vec![
                Operand::RegisterList(vec![d(0)]),
                Operand::Memory(MemoryOperand {
                    base: None,
                    index: None,
                    offset: 0,
                    align: None,
                }),
            ],
        );
        assert!(matches!(lift(&regs(), &i), Err(RewriteError::Malformed { .. })));
    }

    #[test]
    fn test_structured_store() {
        let i = instr(
            Opcode::Vst1,
            VectorData::Elem(I32),
            vec![
                Operand::RegisterList(vec![d(0), d(1)]),
                Operand::Memory(MemoryOperand::base(r(5))),
            ],
        );
        assert_eq!(lines(i), vec!["__vst1_multi_32_i32_128(SEQ(d0, d1), r5)"]);
    }

    #[test]
    fn test_multiply_accumulate() {
        let i = instr(Opcode::Vmla, VectorData::Elem(F32), reg_ops(&[s(0), s(1), s(2)]));
        assert_eq!(lines(i), vec!["s0 = s0 + (s1 * s2)"]);

        let i = instr(Opcode::Vmls, VectorData::Elem(F32), reg_ops(&[d(0), d(1), d(2)]));
        assert_eq!(
            lines(i),
            vec![
                "v0 = SLICE(d1, real32, 0)",
                "v1 = SLICE(d2, real32, 0)",
                "v2 = SLICE(d0, real32, 0)",
                "d0 = SEQ(0<32>, v2 - (v0 * v1))",
            ]
        );
    }

    #[test]
    fn test_multiply_accumulate_wide_element_is_unimplemented() {
        let i = instr(Opcode::Vfma, VectorData::Elem(F64), reg_ops(&[s(0), s(1), s(2)]));
        assert!(matches!(
            lift(&regs(), &i),
            Err(RewriteError::Unimplemented { .. })
        ));
    }

    #[test]
    fn test_multiple_transfers() {
        let i = instr(
            Opcode::Vpush,
            VectorData::Invalid,
            vec![Operand::RegisterList(vec![d(8), d(9)])],
        );
        assert_eq!(
            lines(i),
            vec![
                "sp = sp - 16<i32>",
                "Mem[sp:word64] = d8",
                "Mem[sp + 8<i32>:word64] = d9",
            ]
        );

        let i = instr(
            Opcode::Vstmdb,
            VectorData::Invalid,
            vec![Operand::Register(r(0)), Operand::RegisterList(vec![d(0), d(1)])],
        )
        .with_writeback();
        assert_eq!(
            lines(i),
            vec![
                "Mem[r0 - 16<i32>:word64] = d0",
                "Mem[r0 - 8<i32>:word64] = d1",
                "r0 = r0 - 16<i32>",
            ]
        );
    }

    #[test]
    fn test_vldr_vstr() {
        let i = instr(
            Opcode::Vldr,
            VectorData::Invalid,
            vec![
                Operand::Register(d(0)),
                Operand::Memory(MemoryOperand::with_offset(r(1), 8)),
            ],
        );
        assert_eq!(lines(i), vec!["d0 = Mem[r1 + 8<i32>:word64]"]);
        let i = instr(
            Opcode::Vstr,
            VectorData::Invalid,
            vec![Operand::Register(s(3)), Operand::Memory(MemoryOperand::base(r(1)))],
        );
        assert_eq!(lines(i), vec!["Mem[r1:word32] = s3"]);
    }

    #[test]
    fn test_conditional_and_unsupported_opcodes_are_unimplemented() {
        let mut i = instr(Opcode::Vadd, VectorData::Elem(F32), reg_ops(&[s(0), s(1), s(2)]));
        i.condition = Some("eq");
        assert!(matches!(
            lift(&regs(), &i),
            Err(RewriteError::Unimplemented { .. })
        ));
        let i = instr(Opcode::Vzip, VectorData::Elem(I32), reg_ops(&[d(0), d(1)]));
        assert!(matches!(
            lift(&regs(), &i),
            Err(RewriteError::Unimplemented { .. })
        ));
    }
}
