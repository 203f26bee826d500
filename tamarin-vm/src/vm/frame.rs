// tamarin-vm - Bytecode compiler and virtual machine for the Tamarin programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Call frames for the VM.

use std::rc::Rc;

use crate::code::Instructions;
use crate::value::Closure;

/// A call frame on the VM's frame stack.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The closure being executed; also serves `CurrentClosure` and
    /// `GetFree`.
    pub closure: Rc<Closure>,

    /// Instruction pointer into the closure's stream. Starts at -1 and
    /// is incremented before each fetch, so jumps store `target - 1`.
    pub ip: i64,

    /// Operand-stack index of the frame's local slot 0.
    pub base_pointer: usize,
}

impl Frame {
    /// Create a frame about to execute `closure` from the top.
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Frame {
            closure,
            ip: -1,
            base_pointer,
        }
    }

    /// The instruction stream this frame executes.
    #[inline]
    pub fn instructions(&self) -> &Instructions {
        &self.closure.func.instructions
    }
}
