// Parses AArch32 vector disassembly listings into decoded instructions. One instruction per
// line, in the form
//
//     [address:] mnemonic[cond][.type[.type]] operand, operand, ...
//
// Addresses are hexadecimal; a line without one follows the previous instruction. Text
// after `;`, `@` or `//` is a comment. Operands are registers (`d0`, `r5!`), register lists
// (`{d0, d1}`, `{d8-d11}`), memory references (`[r5]`, `[r5:64]`, `[r5, #-8]`, `[r5]!`,
// `[r5], r2`) and immediates (`#12`, `#0xff`, `#-1`, `#1.5`). The listing parser plays the
// role of the decoder for the command-line tool and for text-driven tests. Like a byte
// decoder, it turns an instruction it cannot parse into an Invalid opcode and carries on;
// only a malformed address prefix stops the listing.

//! Disassembly listing parser.

use super::instruction::{DecodedInstruction, MemoryOperand, Opcode, Operand, VectorData};
use super::registers;
use crate::core::error::{LiftError, LiftResult};
use crate::core::memory::Address;
use crate::core::register_file::{Reg, RegisterFile};
use crate::core::types::{ElementType, LaneKind};

const CONDITIONS: &[&str] = &[
    "eq", "ne", "cs", "hs", "cc", "lo", "mi", "pl", "vs", "vc", "hi", "ls", "ge", "lt", "gt",
    "le", "al",
];

/// Mnemonic spellings that name the same instruction as a canonical one.
const ALIASES: &[(&str, Opcode)] = &[("vldm", Opcode::Vldmia), ("vstm", Opcode::Vstmia)];

/// Parse a whole listing.
pub fn parse_listing(regs: &RegisterFile, text: &str) -> LiftResult<Vec<DecodedInstruction>> {
    let mut instrs = Vec::new();
    let mut next: u32 = 0;
    for (n, raw) in text.lines().enumerate() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        let parse_err = |reason: String| LiftError::Parse {
            line: n + 1,
            reason,
        };
        let (address, body) = split_address(line).map_err(parse_err)?;
        let address = address.unwrap_or(next);
        let at = Address::ptr32(address);
        let instr = parse_instruction(regs, at, body).unwrap_or_else(|reason| {
            log::warn!("line {}: {reason}: {body}", n + 1);
            DecodedInstruction::new(at, Opcode::Invalid, VectorData::Invalid, Vec::new())
        });
        next = address.wrapping_add(instr.length);
        instrs.push(instr);
    }
    log::debug!("Parsed {} instructions", instrs.len());
    Ok(instrs)
}

fn strip_comment(line: &str) -> &str {
    let end = [line.find(';'), line.find('@'), line.find("//")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(line.len());
    &line[..end]
}

fn split_address(line: &str) -> Result<(Option<u32>, &str), String> {
    let Some((head, rest)) = line.split_once(':') else {
        return Ok((None, line));
    };
    // `[r5:64]` also contains a colon; only a leading hex token is an address.
    let head = head.trim();
    if head.is_empty() || !head.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok((None, line));
    }
    let value = u32::from_str_radix(head, 16).map_err(|e| format!("bad address {head}: {e}"))?;
    Ok((Some(value), rest.trim()))
}

/// Parse one instruction without its address.
pub fn parse_instruction(
    regs: &RegisterFile,
    address: Address,
    text: &str,
) -> Result<DecodedInstruction, String> {
    let (mnemonic, operands) = match text.split_once(char::is_whitespace) {
        Some((m, rest)) => (m, rest.trim()),
        None => (text, ""),
    };

    let mut parts = mnemonic.split('.');
    let head = parts.next().unwrap_or_default();
    let (opcode, condition) = parse_opcode(head)?;
    let tags: Vec<&str> = parts.collect();
    let vector_data = match tags.as_slice() {
        [] => VectorData::Invalid,
        [tag] => VectorData::Elem(parse_tag(tag)?),
        [dst, src] => VectorData::Convert {
            dst: parse_tag(dst)?,
            src: parse_tag(src)?,
        },
        _ => return Err(format!("too many type suffixes in {mnemonic}")),
    };

    let mut instr = DecodedInstruction::new(address, opcode, vector_data, Vec::new());
    instr.condition = condition;

    let tokens = split_operands(operands)?;
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        if token.starts_with('[') {
            let (mut mem, writeback) = parse_memory(regs, token)?;
            instr.writeback |= writeback;
            // Post-indexed by a register: `[r5], r2`.
            if let Some(next) = tokens.get(i + 1) {
                if let Some(index) = registers::lookup(regs, next) {
                    mem.index = Some(index);
                    instr.writeback = true;
                    i += 1;
                }
            }
            instr.operands.push(Operand::Memory(mem));
        } else if token.starts_with('{') {
            instr.operands.push(Operand::RegisterList(parse_list(regs, token)?));
        } else if let Some(imm) = token.strip_prefix('#') {
            instr.operands.push(Operand::Immediate(parse_immediate(imm, vector_data)?));
        } else if let Some(operand) = system_operand(regs, opcode, token) {
            instr.operands.push(operand);
        } else if let Some(name) = token.strip_suffix('!') {
            instr.operands.push(Operand::Register(register(regs, name)?));
            instr.writeback = true;
        } else if let Some(reg) = registers::lookup(regs, token) {
            instr.operands.push(Operand::Register(reg));
        } else {
            instr.operands.push(Operand::Immediate(parse_immediate(token, vector_data)?));
        }
        i += 1;
    }
    Ok(instr)
}

fn parse_opcode(head: &str) -> Result<(Opcode, Option<&'static str>), String> {
    let lower = head.to_ascii_lowercase();
    if let Some(op) = lookup_opcode(&lower) {
        return Ok((op, None));
    }
    for cond in CONDITIONS {
        if let Some(base) = lower.strip_suffix(cond) {
            if let Some(op) = lookup_opcode(base) {
                let condition = (*cond != "al").then_some(*cond);
                return Ok((op, condition));
            }
        }
    }
    Err(format!("unknown mnemonic {head}"))
}

fn lookup_opcode(mnemonic: &str) -> Option<Opcode> {
    Opcode::from_mnemonic(mnemonic).or_else(|| {
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == mnemonic)
            .map(|(_, op)| *op)
    })
}

fn parse_tag(tag: &str) -> Result<ElementType, String> {
    VectorData::parse_elem(tag).ok_or_else(|| format!("unknown element type .{tag}"))
}

/// Split on commas outside of brackets and braces.
fn split_operands(text: &str) -> Result<Vec<&str>, String> {
    let mut tokens = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth -= 1;
                if depth < 0 {
                    return Err(format!("unbalanced {c} in operands"));
                }
            }
            ',' if depth == 0 => {
                tokens.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err("unterminated operand".to_string());
    }
    let last = text[start..].trim();
    if !last.is_empty() {
        tokens.push(last);
    }
    if tokens.iter().any(|t| t.is_empty()) {
        return Err("empty operand".to_string());
    }
    Ok(tokens)
}

fn register(regs: &RegisterFile, name: &str) -> Result<Reg, String> {
    registers::lookup(regs, name.trim()).ok_or_else(|| format!("unknown register {name}"))
}

/// System register operands of `vmrs`/`vmsr` are encoded as their selector.
/// `APSR_nzcv` is encoded as `pc`, as in the machine encoding.
fn system_operand(regs: &RegisterFile, opcode: Opcode, token: &str) -> Option<Operand> {
    if !matches!(opcode, Opcode::Vmrs | Opcode::Vmsr) {
        return None;
    }
    if token.eq_ignore_ascii_case("apsr_nzcv") {
        return Some(Operand::Register(registers::PC));
    }
    registers::system_selector(regs, token).map(Operand::Immediate)
}

fn parse_list(regs: &RegisterFile, token: &str) -> Result<Vec<Reg>, String> {
    let inner = token
        .strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .ok_or_else(|| format!("bad register list {token}"))?;
    let mut list = Vec::new();
    for item in inner.split(',').map(str::trim) {
        match item.split_once('-') {
            Some((first, last)) => {
                let first = register(regs, first)?;
                let last = register(regs, last)?;
                if first.bank != last.bank || first.id > last.id {
                    return Err(format!("bad register range {item}"));
                }
                for id in first.id..=last.id {
                    let reg = Reg::new(first.bank, id);
                    if regs.get(reg).is_none() {
                        return Err(format!("bad register range {item}"));
                    }
                    list.push(reg);
                }
            }
            None => list.push(register(regs, item)?),
        }
    }
    if list.is_empty() {
        return Err("empty register list".to_string());
    }
    Ok(list)
}

fn parse_memory(regs: &RegisterFile, token: &str) -> Result<(MemoryOperand, bool), String> {
    let (body, writeback) = match token.strip_suffix('!') {
        Some(body) => (body.trim_end(), true),
        None => (token, false),
    };
    let inner = body
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(|| format!("bad memory operand {token}"))?;

    let mut parts = inner.split(',').map(str::trim);
    let base_part = parts.next().unwrap_or_default();
    let (base_name, align) = match base_part.split_once(':') {
        Some((name, align)) => {
            let bits = align
                .trim()
                .parse::<u32>()
                .map_err(|e| format!("bad alignment {align}: {e}"))?;
            (name, Some(bits))
        }
        None => (base_part, None),
    };
    let mut mem = MemoryOperand {
        base: if base_name.is_empty() {
            None
        } else {
            Some(register(regs, base_name)?)
        },
        index: None,
        offset: 0,
        align,
    };
    if let Some(second) = parts.next() {
        match second.strip_prefix('#') {
            Some(imm) => {
                let value = parse_int(imm)?;
                mem.offset = i32::try_from(value).map_err(|_| format!("offset {imm} out of range"))?;
            }
            None => mem.index = Some(register(regs, second)?),
        }
    }
    if parts.next().is_some() {
        return Err(format!("too many parts in memory operand {token}"));
    }
    Ok((mem, writeback))
}

fn parse_int(text: &str) -> Result<i64, String> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse::<i64>(),
    }
    .map_err(|e| format!("bad number {text}: {e}"))?;
    Ok(if negative { -value } else { value })
}

/// Immediate bits. Floating point literals are encoded in the instruction's float format.
fn parse_immediate(text: &str, vector_data: VectorData) -> Result<u64, String> {
    let is_hex = text.contains("0x") || text.contains("0X");
    if !is_hex && (text.contains('.') || text.contains('e') || text.contains('E')) {
        let value: f64 = text
            .trim()
            .parse()
            .map_err(|e| format!("bad float {text}: {e}"))?;
        let single = matches!(
            vector_data.elem(),
            Some(e) if e.kind == LaneKind::Float && e.bits == 32
        );
        return Ok(if single {
            u64::from((value as f32).to_bits())
        } else {
            value.to_bits()
        });
    }
    parse_int(text).map(|v| v as u64)
}
