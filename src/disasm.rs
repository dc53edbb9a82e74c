// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Disassembler: binary image back to assembly surface syntax.
//!
//! The listing is re-assemblable: data records render as `DB` lines,
//! debug labels as `LBL` lines at their offsets, and operands in the same
//! surface forms the assembler accepts. Without debug records, jump
//! targets fall back to `#<offset>` names.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;

use serde_json::json;

use crate::core::image::{BinaryHeader, Image, MAGIC};
use crate::core::opcode::{Arity, Opcode};
use crate::core::operand::{decode_operand, Operand, OperandDecodeError, OperandType};
use crate::core::registers::register_name;

#[derive(Debug)]
pub enum DisasmError {
    UnknownOpcode { byte: u8, offset: usize },
    Operand(OperandDecodeError),
    UnterminatedName { offset: usize },
}

impl fmt::Display for DisasmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOpcode { byte, offset } => {
                write!(f, "unknown opcode 0x{byte:02X} at offset {offset}")
            }
            Self::Operand(err) => write!(f, "{err}"),
            Self::UnterminatedName { offset } => {
                write!(f, "unterminated foreign-call name at offset {offset}")
            }
        }
    }
}

impl std::error::Error for DisasmError {}

impl From<OperandDecodeError> for DisasmError {
    fn from(err: OperandDecodeError) -> Self {
        Self::Operand(err)
    }
}

/// One element of a disassembly listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Data { addr: u16, bytes: Vec<u8> },
    Label { offset: usize, name: String },
    Instr {
        offset: usize,
        len: usize,
        opcode: Opcode,
        operands: Vec<Operand>,
        mni_name: Option<String>,
    },
}

#[derive(Debug)]
pub struct Disassembly {
    items: Vec<Item>,
    labels: BTreeMap<i32, String>,
    header: BinaryHeader,
    code: Vec<u8>,
}

impl Disassembly {
    /// Decode every data record and instruction of a parsed image.
    pub fn from_image(image: &Image<'_>) -> Result<Disassembly, DisasmError> {
        // Emission keeps every record; the lookup map keeps one name per
        // address for operand rendering.
        let mut label_records: Vec<(i32, String)> = Vec::new();
        let mut labels = BTreeMap::new();
        for record in image.debug_records() {
            let Ok((name, addr)) = record else { break };
            labels.entry(addr).or_insert_with(|| name.clone());
            label_records.push((addr, name));
        }
        label_records.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let mut items = Vec::new();
        for record in image.data_records() {
            let Ok((addr, bytes)) = record else { break };
            items.push(Item::Data {
                addr,
                bytes: bytes.to_vec(),
            });
        }

        let code = image.code;
        let mut pos = 0usize;
        while pos < code.len() {
            for (addr, name) in &label_records {
                if *addr == pos as i32 {
                    items.push(Item::Label {
                        offset: pos,
                        name: name.trim_start_matches('#').to_string(),
                    });
                }
            }

            let offset = pos;
            let byte = code[pos];
            let opcode = Opcode::from_byte(byte)
                .filter(|opcode| !opcode.is_pseudo())
                .ok_or(DisasmError::UnknownOpcode { byte, offset })?;
            pos += 1;

            let mut operands = Vec::new();
            let mut mni_name = None;
            match opcode.arity() {
                Arity::Fixed(count) => {
                    for _ in 0..count {
                        let (operand, used) = decode_operand(code, pos)?;
                        operands.push(operand);
                        pos += used;
                    }
                }
                Arity::Variadic => {
                    let nul = code[pos..]
                        .iter()
                        .position(|&b| b == 0)
                        .ok_or(DisasmError::UnterminatedName { offset: pos })?;
                    mni_name =
                        Some(String::from_utf8_lossy(&code[pos..pos + nul]).into_owned());
                    pos += nul + 1;
                    loop {
                        let (operand, used) = decode_operand(code, pos)?;
                        pos += used;
                        if operand.otype == OperandType::None {
                            break;
                        }
                        operands.push(operand);
                    }
                }
                Arity::None => unreachable!("pseudo opcodes are filtered above"),
            }

            items.push(Item::Instr {
                offset,
                len: pos - offset,
                opcode,
                operands,
                mni_name,
            });
        }

        Ok(Disassembly {
            items,
            labels,
            header: image.header,
            code: code.to_vec(),
        })
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Re-assemblable text listing.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("; entry point {:#x}\n", self.header.entry_offset()));
        for item in &self.items {
            match item {
                Item::Data { addr, bytes } => {
                    out.push_str(&format!("DB ${addr} \"{}\"\n", escape_data(bytes)));
                }
                Item::Label { name, .. } => {
                    out.push_str(&format!("LBL {name}\n"));
                }
                Item::Instr {
                    opcode,
                    operands,
                    mni_name,
                    ..
                } => {
                    out.push_str(opcode.mnemonic());
                    if let Some(name) = mni_name {
                        out.push(' ');
                        out.push_str(name);
                    }
                    for operand in operands {
                        out.push(' ');
                        out.push_str(&self.format_operand(operand));
                    }
                    out.push('\n');
                }
            }
        }
        out
    }

    /// Annotated listing for the terminal: a header block followed by an
    /// offset / bytes / disassembly table, then the data records.
    pub fn render_annotated(&self) -> String {
        let mut out = String::new();
        let header = &self.header;
        out.push_str("--- Header ---\n");
        let _ = writeln!(out, "Magic:       0x{MAGIC:08X} (\"MASM\")");
        let _ = writeln!(out, "Version:     {}", header.version);
        let _ = writeln!(out, "Code Size:   {} bytes", header.code_size);
        let _ = writeln!(out, "Data Size:   {} bytes", header.data_size);
        let _ = writeln!(out, "Debug Size:  {} bytes", header.dbg_size);
        let _ = writeln!(
            out,
            "Entry Point: 0x{:X}{}",
            header.entry_offset(),
            if header.auto_init_frame() {
                " (auto-init frame)"
            } else {
                ""
            }
        );
        out.push_str("--------------\n\n");

        let _ = writeln!(out, "--- Code Segment (Size: {}) ---", header.code_size);
        out.push_str("Offset   | Bytes                    | Disassembly\n");
        out.push_str("---------|--------------------------|--------------------------------\n");
        for item in &self.items {
            match item {
                Item::Data { .. } => {}
                Item::Label { name, .. } => {
                    let _ = writeln!(out, "         |                          | LBL {name}");
                }
                Item::Instr {
                    offset,
                    len,
                    opcode,
                    operands,
                    mni_name,
                } => {
                    let mut text = opcode.mnemonic().to_string();
                    if let Some(name) = mni_name {
                        text.push(' ');
                        text.push_str(name);
                    }
                    for operand in operands {
                        text.push(' ');
                        text.push_str(&self.format_operand(operand));
                    }
                    // Wide instructions continue the byte column on
                    // follow-up rows.
                    let bytes = &self.code[*offset..offset + len];
                    for (row, chunk) in bytes.chunks(8).enumerate() {
                        let hex: Vec<String> =
                            chunk.iter().map(|byte| format!("{byte:02X}")).collect();
                        if row == 0 {
                            let _ = writeln!(
                                out,
                                "0x{:06X} | {:<24} | {}",
                                offset,
                                hex.join(" "),
                                text
                            );
                        } else {
                            let _ = writeln!(
                                out,
                                "0x{:06X} | {:<24} |",
                                offset + row * 8,
                                hex.join(" ")
                            );
                        }
                    }
                }
            }
        }

        let data_items: Vec<&Item> = self
            .items
            .iter()
            .filter(|item| matches!(item, Item::Data { .. }))
            .collect();
        if !data_items.is_empty() {
            let _ = writeln!(out, "\n--- Data Segment (Size: {}) ---", header.data_size);
            for item in data_items {
                if let Item::Data { addr, bytes } = item {
                    let _ = writeln!(out, "DB ${addr} \"{}\"", escape_data(bytes));
                }
            }
        }
        out
    }

    /// Machine-readable listing for `--format json`.
    pub fn render_json(&self) -> serde_json::Value {
        let items: Vec<serde_json::Value> = self
            .items
            .iter()
            .map(|item| match item {
                Item::Data { addr, bytes } => json!({
                    "kind": "data",
                    "addr": addr,
                    "text": escape_data(bytes),
                }),
                Item::Label { offset, name } => json!({
                    "kind": "label",
                    "offset": offset,
                    "name": name,
                }),
                Item::Instr {
                    offset,
                    len,
                    opcode,
                    operands,
                    mni_name,
                } => json!({
                    "kind": "instruction",
                    "offset": offset,
                    "size": len,
                    "mnemonic": opcode.mnemonic(),
                    "function": mni_name,
                    "operands": operands
                        .iter()
                        .map(|operand| self.format_operand(operand))
                        .collect::<Vec<_>>(),
                }),
            })
            .collect();
        json!({
            "entry": self.header.entry_offset(),
            "labels": self
                .labels
                .iter()
                .map(|(addr, name)| json!({ "name": name, "address": addr }))
                .collect::<Vec<_>>(),
            "items": items,
        })
    }

    fn format_operand(&self, operand: &Operand) -> String {
        match operand.otype {
            OperandType::None => "[NONE]".to_string(),
            OperandType::Register => register_or_index(operand.value).to_string(),
            OperandType::RegisterAsAddress => format!("${}", register_or_index(operand.value)),
            OperandType::Immediate => operand.value.to_string(),
            OperandType::DataAddress => format!("${}", operand.value),
            OperandType::LabelAddress => match self.labels.get(&operand.value) {
                Some(name) => name.clone(),
                None => format!("#{}", operand.value),
            },
            OperandType::MathOperator => {
                let (base, op, other) = operand.math_parts();
                let base = register_or_index(base as i32).to_string();
                let other = if operand.other_is_reg {
                    register_or_index(other).to_string()
                } else {
                    other.to_string()
                };
                match op {
                    Some(op) if op.is_reversed() => {
                        format!("$[{}{}{}]", other, op.symbol(), base)
                    }
                    Some(op) => format!("$[{}{}{}]", base, op.symbol(), other),
                    None => format!("$[{base}?{other}]"),
                }
            }
        }
    }
}

fn register_or_index(value: i32) -> String {
    usize::try_from(value)
        .ok()
        .and_then(register_name)
        .map(str::to_string)
        .unwrap_or_else(|| format!("R?{value}"))
}

/// Escape a data record for a `DB` line; the trailing NUL the assembler
/// appends is dropped so the line round-trips.
fn escape_data(bytes: &[u8]) -> String {
    let body = bytes.strip_suffix(&[0]).unwrap_or(bytes);
    let mut out = String::new();
    for &byte in body {
        match byte {
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            other => out.push(other as char),
        }
    }
    out
}
