// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Textual operand resolution.
//!
//! Maps a source token to a typed operand:
//!
//! - `#name`   label address (must be defined)
//! - `$Rxx`    register holding the effective address
//! - `$[ … ]`  base-plus-operation address, may fold to a constant
//! - `$<n>`    data/linear-memory address
//! - `Rxx`     register
//! - integer   immediate, signed 32-bit

use std::collections::HashMap;

use crate::assembler::expr::{parse_math_expr, MathExpr};
use crate::core::error::{AsmError, AsmErrorKind};
use crate::core::operand::{pack_math, Operand, OperandType};
use crate::core::registers;

/// Resolve one operand token against the label table.
pub fn resolve_operand(
    token: &str,
    labels: &HashMap<String, u32>,
) -> Result<Operand, AsmError> {
    if token.is_empty() {
        return Err(AsmError::new(
            AsmErrorKind::InvalidOperand,
            "Empty operand",
            None,
        ));
    }

    if token.starts_with('#') {
        return match labels.get(token) {
            Some(&addr) => Ok(Operand::new(OperandType::LabelAddress, addr as i32)),
            None => Err(AsmError::new(
                AsmErrorKind::UnknownLabel,
                "Undefined label",
                Some(token),
            )),
        };
    }

    if let Some(rest) = token.strip_prefix('$') {
        if rest.starts_with('[') {
            let body = rest
                .strip_prefix('[')
                .and_then(|inner| inner.strip_suffix(']'))
                .ok_or_else(|| {
                    AsmError::new(
                        AsmErrorKind::InvalidOperand,
                        "Unterminated address expression",
                        Some(token),
                    )
                })?;
            return match parse_math_expr(body) {
                Ok(MathExpr::Constant(value)) => {
                    if value < 0 {
                        return Err(AsmError::new(
                            AsmErrorKind::OutOfRange,
                            "Address expression folds to a negative address",
                            Some(token),
                        ));
                    }
                    Ok(Operand::new(OperandType::DataAddress, value))
                }
                Ok(MathExpr::RegReg { base, op, other }) => Ok(Operand {
                    otype: OperandType::MathOperator,
                    value: pack_math(base, op, other as i32),
                    other_is_reg: true,
                }),
                Ok(MathExpr::RegImm { base, op, other }) => Ok(Operand {
                    otype: OperandType::MathOperator,
                    value: pack_math(base, op, other),
                    other_is_reg: false,
                }),
                Err(err) => Err(AsmError::new(
                    AsmErrorKind::InvalidOperand,
                    &err.to_string(),
                    Some(token),
                )),
            };
        }

        if rest.starts_with(['R', 'r']) {
            if registers::is_rip(rest) {
                return Err(AsmError::new(
                    AsmErrorKind::InvalidOperand,
                    "RIP cannot be used as an operand",
                    None,
                ));
            }
            return match registers::register_index(rest) {
                Some(idx) => Ok(Operand::new(OperandType::RegisterAsAddress, idx as i32)),
                None => Err(AsmError::new(
                    AsmErrorKind::InvalidOperand,
                    "Unknown register in address operand",
                    Some(token),
                )),
            };
        }

        return match rest.parse::<i64>() {
            Ok(value) if (0..=i32::MAX as i64).contains(&value) => {
                Ok(Operand::new(OperandType::DataAddress, value as i32))
            }
            Ok(value) => Err(AsmError::new(
                AsmErrorKind::OutOfRange,
                &format!("Data address out of range: {value}"),
                Some(token),
            )),
            Err(_) => Err(AsmError::new(
                AsmErrorKind::InvalidOperand,
                "Invalid data address",
                Some(token),
            )),
        };
    }

    if token.starts_with(['R', 'r']) {
        if registers::is_rip(token) {
            return Err(AsmError::new(
                AsmErrorKind::InvalidOperand,
                "RIP cannot be used as an operand",
                None,
            ));
        }
        if let Some(idx) = registers::register_index(token) {
            return Ok(Operand::new(OperandType::Register, idx as i32));
        }
        let msg = if token[1..].bytes().all(|b| b.is_ascii_digit()) && token.len() > 1 {
            "Register index out of range (R0-R15)"
        } else {
            "Unknown register"
        };
        return Err(AsmError::new(AsmErrorKind::InvalidOperand, msg, Some(token)));
    }

    match token.parse::<i64>() {
        Ok(value) if (i32::MIN as i64..=i32::MAX as i64).contains(&value) => {
            Ok(Operand::immediate(value as i32))
        }
        Ok(value) => Err(AsmError::new(
            AsmErrorKind::OutOfRange,
            &format!("Immediate out of 32-bit range: {value}"),
            Some(token),
        )),
        Err(_) => Err(AsmError::new(
            AsmErrorKind::InvalidOperand,
            "Invalid operand",
            Some(token),
        )),
    }
}
