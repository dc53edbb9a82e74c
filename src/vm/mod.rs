// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! The virtual machine: linear memory, stack discipline, heap and the
//! dispatch loop.

pub mod error;
pub mod heap;
pub mod interp;
pub mod memory;
pub mod mni;

pub use error::VmError;
pub use interp::{Interpreter, LoadError, DEFAULT_MEMORY_SIZE, HEAP_BASE, STACK_SIZE};
pub use mni::{MniFn, MniRegistry};
