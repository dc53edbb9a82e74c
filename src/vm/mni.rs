// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Foreign-call registry.
//!
//! Named host routines keyed by `Module.Function`. The table is owned by
//! the interpreter that dispatches into it, not by the process; callbacks
//! are plain function pointers so a call can re-enter the interpreter.

use std::collections::HashMap;

use crate::core::operand::Operand;
use crate::vm::error::VmError;
use crate::vm::interp::Interpreter;

pub type MniFn = fn(&mut Interpreter, &[Operand]) -> Result<(), VmError>;

pub struct MniRegistry {
    functions: HashMap<String, MniFn>,
}

impl MniRegistry {
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// A registry preloaded with the built-in host routines.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("Math", "sin", math_sin);
        registry.register("IO", "write", io_write);
        registry.register("Proc", "exit", proc_exit);
        registry.register("StringOperations", "cmp", string_cmp);
        registry.register("Memory", "allocate", memory_allocate);
        registry.register("Memory", "free", memory_free);
        registry
    }

    /// Register `Module.Function`. Returns false and keeps the existing
    /// entry when the name is already taken.
    pub fn register(&mut self, module: &str, name: &str, function: MniFn) -> bool {
        let full = format!("{module}.{name}");
        if self.functions.contains_key(&full) {
            return false;
        }
        self.functions.insert(full, function);
        true
    }

    pub fn lookup(&self, name: &str) -> Option<MniFn> {
        self.functions.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl Default for MniRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// `Math.sin src dst`: sine of the source value, truncated to an integer.
fn math_sin(machine: &mut Interpreter, args: &[Operand]) -> Result<(), VmError> {
    let [src, dst] = expect_args::<2>("Math.sin", args)?;
    let value = machine.read_value(&src, 4)? as f64;
    machine.write_operand(&dst, value.sin() as i32, 4)
}

/// `IO.write port addr`: write the NUL-terminated string at `addr` to the
/// given port.
fn io_write(machine: &mut Interpreter, args: &[Operand]) -> Result<(), VmError> {
    let [port, addr] = expect_args::<2>("IO.write", args)?;
    let port = machine.read_value(&port, 4)?;
    let addr = machine.read_value(&addr, 4)?;
    let bytes = machine.memory().read_cstring(addr)?;
    machine.write_port(port, &bytes)
}

/// `Proc.exit code`: set the exit status and halt. This is the program's
/// way to override the status reported at HLT.
fn proc_exit(machine: &mut Interpreter, args: &[Operand]) -> Result<(), VmError> {
    let [code] = expect_args::<1>("Proc.exit", args)?;
    let code = machine.read_value(&code, 4)?;
    machine.request_exit(code);
    Ok(())
}

/// `StringOperations.cmp addr1 addr2`: compare two NUL-terminated strings
/// and set the zero flag on equality.
fn string_cmp(machine: &mut Interpreter, args: &[Operand]) -> Result<(), VmError> {
    let [a, b] = expect_args::<2>("StringOperations.cmp", args)?;
    let addr_a = machine.read_value(&a, 4)?;
    let addr_b = machine.read_value(&b, 4)?;
    let s1 = machine.memory().read_cstring(addr_a)?;
    let s2 = machine.memory().read_cstring(addr_b)?;
    machine.set_zero_flag(s1 == s2);
    Ok(())
}

/// `Memory.allocate size dst`: heap allocation with the same result and
/// flag conventions as the MALLOC opcode.
fn memory_allocate(machine: &mut Interpreter, args: &[Operand]) -> Result<(), VmError> {
    let [size, dst] = expect_args::<2>("Memory.allocate", args)?;
    let size = machine.read_value(&size, 4)?;
    let result = machine.heap_mut().alloc(size);
    machine.write_operand(&dst, result, 4)?;
    machine.set_flags_from_result(result);
    Ok(())
}

/// `Memory.free ptr dst`: heap release with the same result and flag
/// conventions as the FREE opcode.
fn memory_free(machine: &mut Interpreter, args: &[Operand]) -> Result<(), VmError> {
    let [ptr, dst] = expect_args::<2>("Memory.free", args)?;
    let ptr = machine.read_value(&ptr, 4)?;
    let result = machine.heap_mut().free(ptr);
    machine.write_operand(&dst, result, 4)?;
    machine.set_flags_from_result(result);
    Ok(())
}

fn expect_args<const N: usize>(name: &str, args: &[Operand]) -> Result<[Operand; N], VmError> {
    <[Operand; N]>::try_from(args).map_err(|_| VmError::UnknownForeignCall {
        name: format!("{name} (expected {N} arguments, found {})", args.len()),
    })
}
