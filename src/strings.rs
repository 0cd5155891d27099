//! String literal extraction from method instruction streams.

use anyhow::{Context, Result, bail};
use jclassfile::constant_pool::ConstantPool;

use crate::opcodes;

/// Collect the string literals loaded by a method body, de-duplicated in
/// first-occurrence order. Pure function of the code and constant pool.
pub fn method_strings(code: &[u8], constant_pool: &[ConstantPool]) -> Result<Vec<String>> {
    let mut literals = Vec::new();
    let mut offset = 0usize;
    while offset < code.len() {
        let opcode = code[offset];
        let length = opcode_length(code, offset)?;
        if length == 0 || offset + length > code.len() {
            bail!("invalid bytecode length at offset {offset}");
        }
        match opcode {
            opcodes::LDC => {
                let index = code
                    .get(offset + 1)
                    .copied()
                    .context("ldc operand out of bounds")? as u16;
                push_literal(constant_pool, index, &mut literals)?;
            }
            opcodes::LDC_W => {
                let index = read_u16(code, offset + 1)?;
                push_literal(constant_pool, index, &mut literals)?;
            }
            _ => {}
        }
        offset += length;
    }
    Ok(literals)
}

/// Collect every string constant in the pool, de-duplicated in pool order.
pub fn class_strings(constant_pool: &[ConstantPool]) -> Vec<String> {
    let mut literals = Vec::new();
    for entry in constant_pool {
        if let ConstantPool::String { string_index } = entry {
            if let Ok(value) = resolve_utf8(constant_pool, *string_index) {
                if !literals.contains(&value) {
                    literals.push(value);
                }
            }
        }
    }
    literals
}

fn push_literal(
    constant_pool: &[ConstantPool],
    index: u16,
    literals: &mut Vec<String>,
) -> Result<()> {
    let entry = constant_pool
        .get(index as usize)
        .context("ldc operand points outside the constant pool")?;
    if let ConstantPool::String { string_index } = entry {
        let value = resolve_utf8(constant_pool, *string_index)?;
        if !literals.contains(&value) {
            literals.push(value);
        }
    }
    Ok(())
}

pub(crate) fn resolve_utf8(constant_pool: &[ConstantPool], index: u16) -> Result<String> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing constant pool entry")?;
    match entry {
        ConstantPool::Utf8 { value } => Ok(value.clone()),
        _ => bail!("constant pool entry {index} is not utf8"),
    }
}

pub(crate) fn opcode_length(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = code[offset];
    let length = match opcode {
        0x00..=0x0f => 1,
        0x10 => 2,
        0x11 => 3,
        opcodes::LDC => 2,
        opcodes::LDC_W | opcodes::LDC2_W => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x83 => 1,
        0x84 => 3,
        0x85..=0x98 => 1,
        0x99..=0xa6 => 3,
        opcodes::GOTO | opcodes::JSR => 3,
        0xa9 => 2,
        opcodes::TABLESWITCH => tableswitch_length(code, offset)?,
        opcodes::LOOKUPSWITCH => lookupswitch_length(code, offset)?,
        0xac..=0xb1 => 1,
        0xb2..=0xb5 => 3,
        opcodes::INVOKEVIRTUAL | opcodes::INVOKESPECIAL | opcodes::INVOKESTATIC => 3,
        opcodes::INVOKEINTERFACE | opcodes::INVOKEDYNAMIC => 5,
        0xbb => 3,
        0xbc => 2,
        0xbd => 3,
        0xbe | 0xbf => 1,
        0xc0 | 0xc1 => 3,
        0xc2 | 0xc3 => 1,
        opcodes::WIDE => wide_length(code, offset)?,
        0xc5 => 4,
        0xc6 | 0xc7 => 3,
        opcodes::GOTO_W | opcodes::JSR_W => 5,
        0xca => 1,
        0xfe | 0xff => 1,
        _ => bail!("unsupported opcode 0x{opcode:02x}"),
    };
    Ok(length)
}

fn tableswitch_length(code: &[u8], offset: usize) -> Result<usize> {
    let padding = padding(offset);
    let base = offset + 1 + padding;
    let low = read_i32(code, base + 4)?;
    let high = read_i32(code, base + 8)?;
    let count = high
        .checked_sub(low)
        .and_then(|value| value.checked_add(1))
        .filter(|value| *value >= 0)
        .context("invalid tableswitch range")?;
    Ok(1 + padding + 12 + (count as usize) * 4)
}

fn lookupswitch_length(code: &[u8], offset: usize) -> Result<usize> {
    let padding = padding(offset);
    let base = offset + 1 + padding;
    let npairs = read_i32(code, base + 4)?;
    if npairs < 0 {
        bail!("invalid lookupswitch pairs");
    }
    Ok(1 + padding + 8 + (npairs as usize) * 8)
}

fn wide_length(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = code
        .get(offset + 1)
        .copied()
        .context("missing wide opcode")?;
    if opcode == 0x84 { Ok(6) } else { Ok(4) }
}

fn padding(offset: usize) -> usize {
    (4 - ((offset + 1) % 4)) % 4
}

fn read_u16(code: &[u8], offset: usize) -> Result<u16> {
    let slice = code
        .get(offset..offset + 2)
        .context("bytecode u16 out of bounds")?;
    Ok(u16::from_be_bytes([slice[0], slice[1]]))
}

fn read_i32(code: &[u8], offset: usize) -> Result<i32> {
    let slice = code
        .get(offset..offset + 4)
        .context("bytecode i32 out of bounds")?;
    Ok(i32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}
