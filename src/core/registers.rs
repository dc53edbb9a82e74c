// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Register model: 24 general-purpose 32-bit slots.
//!
//! Indices 0..7 carry the mnemonic names RAX..RSP, 8..23 are R0..R15.
//! RIP is not addressable as an operand.

pub const REGISTER_COUNT: usize = 24;

/// Index of RBP within the register file.
pub const REG_RBP: usize = 6;
/// Index of RSP within the register file.
pub const REG_RSP: usize = 7;

const NAMES: [&str; REGISTER_COUNT] = [
    "RAX", "RBX", "RCX", "RDX", "RSI", "RDI", "RBP", "RSP", "R0", "R1", "R2", "R3", "R4", "R5",
    "R6", "R7", "R8", "R9", "R10", "R11", "R12", "R13", "R14", "R15",
];

/// Resolve a register mnemonic to its index. Case-insensitive.
///
/// `RIP` is a recognised name but never a valid operand, so it maps to
/// `None` like any unknown name; callers that want a dedicated message
/// should test for it with [`is_rip`] first.
pub fn register_index(name: &str) -> Option<usize> {
    let upper = name.to_ascii_uppercase();
    match upper.as_str() {
        "RAX" => Some(0),
        "RBX" => Some(1),
        "RCX" => Some(2),
        "RDX" => Some(3),
        "RSI" => Some(4),
        "RDI" => Some(5),
        "RBP" => Some(6),
        "RSP" => Some(7),
        _ => {
            let digits = upper.strip_prefix('R')?;
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let n: usize = digits.parse().ok()?;
            if n <= 15 {
                Some(n + 8)
            } else {
                None
            }
        }
    }
}

pub fn is_rip(name: &str) -> bool {
    name.eq_ignore_ascii_case("RIP")
}

/// Name of the register at `index`, or `None` for an out-of-range index.
pub fn register_name(index: usize) -> Option<&'static str> {
    NAMES.get(index).copied()
}
