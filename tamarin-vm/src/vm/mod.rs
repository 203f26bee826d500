// tamarin-vm - Bytecode compiler and virtual machine for the Tamarin programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Stack-based virtual machine executing Tamarin bytecode.
//!
//! A single fetch-decode-execute loop drives the current frame's
//! instruction stream. Function calls push frames whose base pointer
//! marks local slot 0 on the operand stack; returns discard the frame's
//! whole stack window in one stack-pointer move.

pub mod frame;
pub mod stack;

use std::fmt;
use std::rc::Rc;

use im::{OrdMap, Vector};

use crate::builtins::BUILTINS;
use crate::code::{OpCode, read_u8, read_u16};
use crate::compiler::Bytecode;
use crate::value::{Builtin, Closure, CompiledFunction, HashPair, Value};

pub use frame::Frame;
pub use stack::OperandStack;

/// Operand stack depth.
pub const STACK_SIZE: usize = 2048;

/// Global binding slots.
pub const GLOBAL_SIZE: usize = 65536;

/// Maximum call depth.
pub const MAX_FRAMES: usize = 1024;

/// Runtime error during VM execution. Halts the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// Operand stack exhausted.
    StackOverflow,
    /// Pop from an empty stack (corrupt bytecode).
    StackUnderflow,
    /// Call depth beyond `MAX_FRAMES`.
    FrameOverflow,
    /// Instruction byte outside the opcode table.
    UndefinedOpcode(u8),
    /// Binary operator applied to an unsupported type pairing.
    UnsupportedBinaryTypes {
        left: &'static str,
        right: &'static str,
    },
    /// Comparison with no rule for the operand types.
    UnknownOperator {
        op: OpCode,
        left: &'static str,
        right: &'static str,
    },
    /// Arithmetic opcode reached with integer operands it cannot handle.
    UnknownIntegerOperator(OpCode),
    /// Non-concatenation operator on two strings.
    UnknownStringOperator(OpCode),
    /// Integer division by zero.
    DivisionByZero,
    /// Unary minus on a non-integer.
    UnsupportedNegation(&'static str),
    /// Indexing into a value that is neither array nor hash.
    IndexNotSupported(&'static str),
    /// Hash key of an unhashable type.
    UnusableHashKey(&'static str),
    /// Call with the wrong argument count.
    WrongArity { want: usize, got: usize },
    /// Calling a value that is neither closure nor built-in.
    NotCallable,
    /// Closure instruction pointing at a non-function constant.
    NotAFunction(String),
    /// Invariant violation (corrupt bytecode or compiler bug).
    Internal(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::StackOverflow => write!(f, "stack overflow"),
            RuntimeError::StackUnderflow => write!(f, "stack underflow"),
            RuntimeError::FrameOverflow => write!(f, "frame stack overflow"),
            RuntimeError::UndefinedOpcode(byte) => write!(f, "undefined opcode: {}", byte),
            RuntimeError::UnsupportedBinaryTypes { left, right } => {
                write!(f, "unsupported types for binary operation: {} {}", left, right)
            }
            RuntimeError::UnknownOperator { op, left, right } => {
                write!(f, "unknown operator: {} ({} {})", op, left, right)
            }
            RuntimeError::UnknownIntegerOperator(op) => {
                write!(f, "unknown integer operator: {}", op)
            }
            RuntimeError::UnknownStringOperator(op) => {
                write!(f, "unknown string operator: {}", op)
            }
            RuntimeError::DivisionByZero => write!(f, "division by zero"),
            RuntimeError::UnsupportedNegation(type_name) => {
                write!(f, "unsupported type for negation: {}", type_name)
            }
            RuntimeError::IndexNotSupported(type_name) => {
                write!(f, "index operator not supported: {}", type_name)
            }
            RuntimeError::UnusableHashKey(type_name) => {
                write!(f, "unusable as hash key: {}", type_name)
            }
            RuntimeError::WrongArity { want, got } => {
                write!(f, "wrong number of arguments: want={}, got={}", want, got)
            }
            RuntimeError::NotCallable => write!(f, "calling non-closure and non-built-in"),
            RuntimeError::NotAFunction(value) => write!(f, "not a function: {}", value),
            RuntimeError::Internal(message) => write!(f, "internal error: {}", message),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Result type for VM operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// The Tamarin virtual machine.
pub struct VM {
    constants: Vec<Value>,
    stack: OperandStack,
    globals: Vec<Value>,
    frames: Vec<Frame>,
}

impl VM {
    /// Create a VM ready to run the given bytecode.
    pub fn new(bytecode: Bytecode) -> Self {
        VM::new_with_globals(bytecode, vec![Value::Null; GLOBAL_SIZE])
    }

    /// Create a VM reusing an existing globals vector (the REPL keeps
    /// bindings alive across lines this way).
    pub fn new_with_globals(bytecode: Bytecode, globals: Vec<Value>) -> Self {
        let main_fn = CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
            name: String::new(),
        };
        let main_closure = Closure {
            func: Rc::new(main_fn),
            free: Vec::new(),
        };
        VM {
            constants: bytecode.constants,
            stack: OperandStack::new(STACK_SIZE),
            globals,
            frames: vec![Frame::new(Rc::new(main_closure), 0)],
        }
    }

    /// Hand the globals vector back for the next REPL line.
    pub fn into_globals(self) -> Vec<Value> {
        self.globals
    }

    /// The residual value of a finished program: the stack slot just
    /// above the stack pointer.
    pub fn last_popped(&self) -> Value {
        self.stack.last_popped()
    }

    /// Execute until the main frame's instructions run out.
    pub fn run(&mut self) -> Result<()> {
        while let Some(byte) = self.fetch() {
            let op =
                OpCode::from_byte(byte).ok_or(RuntimeError::UndefinedOpcode(byte))?;

            match op {
                OpCode::Const => {
                    let index = self.read_u16_operand() as usize;
                    let value = self
                        .constants
                        .get(index)
                        .cloned()
                        .ok_or_else(|| {
                            RuntimeError::Internal(format!("constant {} out of range", index))
                        })?;
                    self.stack.push(value)?;
                }
                OpCode::Pop => {
                    self.stack.pop()?;
                }

                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => {
                    self.execute_binary_operation(op)?;
                }
                OpCode::Equal | OpCode::NotEqual | OpCode::GreaterThan => {
                    self.execute_comparison(op)?;
                }
                OpCode::Bang => {
                    let operand = self.stack.pop()?;
                    self.stack.push(Value::Boolean(!operand.is_truthy()))?;
                }
                OpCode::Minus => {
                    let operand = self.stack.pop()?;
                    match operand {
                        Value::Integer(n) => self.stack.push(Value::Integer(n.wrapping_neg()))?,
                        other => {
                            return Err(RuntimeError::UnsupportedNegation(other.type_name()));
                        }
                    }
                }

                OpCode::True => self.stack.push(Value::Boolean(true))?,
                OpCode::False => self.stack.push(Value::Boolean(false))?,
                OpCode::Null => self.stack.push(Value::Null)?,

                OpCode::Jump | OpCode::Loop => {
                    let target = self.read_u16_operand();
                    self.jump_to(target);
                }
                OpCode::JumpNotTruthy => {
                    let target = self.read_u16_operand();
                    let condition = self.stack.pop()?;
                    if !condition.is_truthy() {
                        self.jump_to(target);
                    }
                }

                OpCode::SetGlobal => {
                    let index = self.read_u16_operand() as usize;
                    self.globals[index] = self.stack.pop()?;
                }
                OpCode::GetGlobal => {
                    let index = self.read_u16_operand() as usize;
                    self.stack.push(self.globals[index].clone())?;
                }
                OpCode::SetLocal => {
                    let index = self.read_u8_operand() as usize;
                    let base = self.current_frame().base_pointer;
                    let value = self.stack.pop()?;
                    self.stack.set(base + index, value)?;
                }
                OpCode::GetLocal => {
                    let index = self.read_u8_operand() as usize;
                    let base = self.current_frame().base_pointer;
                    let value = self.stack.get(base + index)?;
                    self.stack.push(value)?;
                }
                OpCode::GetBuiltin => {
                    let index = self.read_u8_operand() as usize;
                    let builtin = BUILTINS.get(index).copied().ok_or_else(|| {
                        RuntimeError::Internal(format!("built-in {} out of range", index))
                    })?;
                    self.stack.push(Value::Builtin(builtin))?;
                }
                OpCode::GetFree => {
                    let index = self.read_u8_operand() as usize;
                    let closure = &self.current_frame().closure;
                    let value = closure.free.get(index).cloned().ok_or_else(|| {
                        RuntimeError::Internal(format!("free variable {} out of range", index))
                    })?;
                    self.stack.push(value)?;
                }
                OpCode::CurrentClosure => {
                    let closure = Rc::clone(&self.current_frame().closure);
                    self.stack.push(Value::Closure(closure))?;
                }

                OpCode::Array => {
                    let count = self.read_u16_operand() as usize;
                    let sp = self.stack.sp();
                    let elements: Vector<Value> =
                        self.stack.window(sp - count, sp).iter().cloned().collect();
                    self.stack.set_sp(sp - count)?;
                    self.stack.push(Value::Array(elements))?;
                }
                OpCode::Hash => {
                    let count = self.read_u16_operand() as usize;
                    let hash = self.build_hash(count)?;
                    self.stack.push(hash)?;
                }
                OpCode::Index => {
                    let index = self.stack.pop()?;
                    let left = self.stack.pop()?;
                    self.execute_index_expression(left, index)?;
                }

                OpCode::Call => {
                    let num_args = self.read_u8_operand() as usize;
                    self.execute_call(num_args)?;
                }
                OpCode::ReturnValue => {
                    let value = self.stack.pop()?;
                    if self.pop_frame_and_reset_sp()? {
                        self.stack.push(value)?;
                    } else {
                        // Explicit return from the top level: expose the
                        // value as the program result and stop.
                        self.stack.push(value)?;
                        self.stack.pop()?;
                        return Ok(());
                    }
                }
                OpCode::Return => {
                    if self.pop_frame_and_reset_sp()? {
                        self.stack.push(Value::Null)?;
                    } else {
                        self.stack.push(Value::Null)?;
                        self.stack.pop()?;
                        return Ok(());
                    }
                }

                OpCode::Closure => {
                    let const_index = self.read_u16_operand() as usize;
                    let num_free = self.read_u8_operand() as usize;
                    self.push_closure(const_index, num_free)?;
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Fetch & frames
    // ------------------------------------------------------------------

    /// Advance the current frame's instruction pointer and read the
    /// opcode byte there. `None` when the stream is exhausted.
    fn fetch(&mut self) -> Option<u8> {
        let frame = self.frames.last_mut().expect("frame stack is never empty");
        frame.ip += 1;
        frame.instructions().get(frame.ip as usize)
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("frame stack is never empty")
    }

    fn read_u16_operand(&mut self) -> u16 {
        let frame = self.frames.last_mut().expect("frame stack is never empty");
        let start = (frame.ip + 1) as usize;
        let value = read_u16(&frame.instructions().bytes()[start..]);
        frame.ip += 2;
        value
    }

    fn read_u8_operand(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("frame stack is never empty");
        let start = (frame.ip + 1) as usize;
        let value = read_u8(&frame.instructions().bytes()[start..]);
        frame.ip += 1;
        value
    }

    /// Redirect execution to an absolute offset. The pointer parks one
    /// byte short because the next fetch pre-increments.
    fn jump_to(&mut self, target: u16) {
        let frame = self.frames.last_mut().expect("frame stack is never empty");
        frame.ip = target as i64 - 1;
    }

    /// Pop the current frame and discard its stack window (callee slot
    /// included). Returns false when the current frame is the main one,
    /// which has no caller to return into and stays in place.
    fn pop_frame_and_reset_sp(&mut self) -> Result<bool> {
        if self.frames.len() == 1 {
            return Ok(false);
        }
        let frame = self.frames.pop().expect("frame stack is never empty");
        self.stack.set_sp(frame.base_pointer - 1)?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Operation helpers
    // ------------------------------------------------------------------

    fn execute_binary_operation(&mut self, op: OpCode) -> Result<()> {
        let right = self.stack.pop()?;
        let left = self.stack.pop()?;

        match (&left, &right) {
            (Value::Integer(a), Value::Integer(b)) => {
                let result = match op {
                    OpCode::Add => a.wrapping_add(*b),
                    OpCode::Sub => a.wrapping_sub(*b),
                    OpCode::Mul => a.wrapping_mul(*b),
                    OpCode::Div => {
                        if *b == 0 {
                            return Err(RuntimeError::DivisionByZero);
                        }
                        a.wrapping_div(*b)
                    }
                    _ => return Err(RuntimeError::UnknownIntegerOperator(op)),
                };
                self.stack.push(Value::Integer(result))
            }
            (Value::String(a), Value::String(b)) => {
                if op != OpCode::Add {
                    return Err(RuntimeError::UnknownStringOperator(op));
                }
                self.stack.push(Value::string(format!("{}{}", a, b)))
            }
            _ => Err(RuntimeError::UnsupportedBinaryTypes {
                left: left.type_name(),
                right: right.type_name(),
            }),
        }
    }

    fn execute_comparison(&mut self, op: OpCode) -> Result<()> {
        let right = self.stack.pop()?;
        let left = self.stack.pop()?;

        if let (Value::Integer(a), Value::Integer(b)) = (&left, &right) {
            let result = match op {
                OpCode::Equal => a == b,
                OpCode::NotEqual => a != b,
                OpCode::GreaterThan => a > b,
                _ => return Err(RuntimeError::UnknownIntegerOperator(op)),
            };
            return self.stack.push(Value::Boolean(result));
        }

        // Non-integers compare as the canonical true/false/null
        // singletons do: booleans by value, null to null, everything
        // else unequal.
        let identical = singletons_equal(&left, &right);
        match op {
            OpCode::Equal => self.stack.push(Value::Boolean(identical)),
            OpCode::NotEqual => self.stack.push(Value::Boolean(!identical)),
            _ => Err(RuntimeError::UnknownOperator {
                op,
                left: left.type_name(),
                right: right.type_name(),
            }),
        }
    }

    fn build_hash(&mut self, count: usize) -> Result<Value> {
        let sp = self.stack.sp();
        let start = sp - count;

        let mut pairs = OrdMap::new();
        for i in (start..sp).step_by(2) {
            let key = self.stack.get(i)?;
            let value = self.stack.get(i + 1)?;
            let hash_key = key
                .hash_key()
                .ok_or(RuntimeError::UnusableHashKey(key.type_name()))?;
            pairs.insert(hash_key, HashPair { key, value });
        }

        self.stack.set_sp(start)?;
        Ok(Value::Hash(pairs))
    }

    fn execute_index_expression(&mut self, left: Value, index: Value) -> Result<()> {
        match (&left, &index) {
            (Value::Array(elements), Value::Integer(i)) => {
                let value = if *i >= 0 && (*i as usize) < elements.len() {
                    elements[*i as usize].clone()
                } else {
                    Value::Null
                };
                self.stack.push(value)
            }
            (Value::Hash(pairs), _) => {
                let hash_key = index
                    .hash_key()
                    .ok_or(RuntimeError::UnusableHashKey(index.type_name()))?;
                let value = pairs
                    .get(&hash_key)
                    .map(|pair| pair.value.clone())
                    .unwrap_or(Value::Null);
                self.stack.push(value)
            }
            _ => Err(RuntimeError::IndexNotSupported(left.type_name())),
        }
    }

    fn execute_call(&mut self, num_args: usize) -> Result<()> {
        let callee = self.stack.get(self.stack.sp() - num_args - 1)?;
        match callee {
            Value::Closure(closure) => self.call_closure(closure, num_args),
            Value::Builtin(builtin) => self.call_builtin(builtin, num_args),
            _ => Err(RuntimeError::NotCallable),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, num_args: usize) -> Result<()> {
        if closure.func.num_parameters != num_args {
            return Err(RuntimeError::WrongArity {
                want: closure.func.num_parameters,
                got: num_args,
            });
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError::FrameOverflow);
        }

        let base_pointer = self.stack.sp() - num_args;
        let num_locals = closure.func.num_locals;
        self.frames.push(Frame::new(closure, base_pointer));
        // Reserve the whole local window (parameters already sit in the
        // first slots of it).
        self.stack.set_sp(base_pointer + num_locals)
    }

    fn call_builtin(&mut self, builtin: Builtin, num_args: usize) -> Result<()> {
        let sp = self.stack.sp();
        let args: Vec<Value> = self.stack.window(sp - num_args, sp).to_vec();

        let result = (builtin.func)(&args);

        // Drop the arguments and the callee, then push the result.
        self.stack.set_sp(sp - num_args - 1)?;
        self.stack.push(result)
    }

    fn push_closure(&mut self, const_index: usize, num_free: usize) -> Result<()> {
        let constant = self.constants.get(const_index).cloned().ok_or_else(|| {
            RuntimeError::Internal(format!("constant {} out of range", const_index))
        })?;
        let func = match constant {
            Value::Function(func) => func,
            other => return Err(RuntimeError::NotAFunction(other.to_string())),
        };

        let sp = self.stack.sp();
        let free: Vec<Value> = self.stack.window(sp - num_free, sp).to_vec();
        self.stack.set_sp(sp - num_free)?;

        self.stack.push(Value::Closure(Rc::new(Closure { func, free })))
    }
}

/// Equality for non-integer pairs: mirrors comparing the canonical
/// true/false/null singletons by identity.
fn singletons_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Boolean(a), Value::Boolean(b)) => a == b,
        (Value::Null, Value::Null) => true,
        _ => false,
    }
}
