// tamarin-vm - Bytecode compiler and virtual machine for the Tamarin programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Runtime values for the Tamarin VM.
//!
//! `Value` is the central enum representing everything a Tamarin
//! program can compute. Aggregates use persistent `im` collections, so
//! sharing a value never aliases mutable state; operations that "grow"
//! an array or hash build a new value sharing structure with the old.

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::rc::Rc;

use im::{OrdMap, Vector};

use crate::code::Instructions;

/// A Tamarin runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
    Null,
    String(Rc<str>),
    Array(Vector<Value>),
    Hash(OrdMap<HashKey, HashPair>),
    /// A compiled function constant; only ever observed wrapped in a
    /// [`Closure`] once the VM touches it.
    Function(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    Builtin(Builtin),
    /// A value-level error produced by a built-in. Flows through the
    /// stack like any other value; does not halt the VM.
    Error(Rc<str>),
}

impl Value {
    /// Build a string value.
    pub fn string(s: impl AsRef<str>) -> Value {
        Value::String(Rc::from(s.as_ref()))
    }

    /// Build a value-level error.
    pub fn error(message: impl AsRef<str>) -> Value {
        Value::Error(Rc::from(message.as_ref()))
    }

    /// Uppercase type tag used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Boolean(_) => "BOOLEAN",
            Value::Null => "NULL",
            Value::String(_) => "STRING",
            Value::Array(_) => "ARRAY",
            Value::Hash(_) => "HASH",
            Value::Function(_) => "FUNCTION",
            Value::Closure(_) => "CLOSURE",
            Value::Builtin(_) => "BUILTIN",
            Value::Error(_) => "ERROR",
        }
    }

    /// Truthiness as used by `!` and conditional jumps: booleans count
    /// as their value, null is false, everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Null => false,
            _ => true,
        }
    }

    /// The hash key for this value, or `None` when the value cannot be
    /// used as a hash key.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Integer(n) => Some(HashKey {
                kind: HashKind::Integer,
                value: *n as u64,
            }),
            Value::Boolean(b) => Some(HashKey {
                kind: HashKind::Boolean,
                value: *b as u64,
            }),
            Value::String(s) => {
                let mut hasher = DefaultHasher::new();
                s.hash(&mut hasher);
                Some(HashKey {
                    kind: HashKind::String,
                    value: hasher.finish(),
                })
            }
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Hash(a), Value::Hash(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            (Value::Error(a), Value::Error(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    /// The `inspect` form printed by the REPL and `puts`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(elements) => {
                let elements: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", elements.join(", "))
            }
            Value::Hash(pairs) => {
                let pairs: Vec<String> = pairs
                    .values()
                    .map(|pair| format!("{}:{}", pair.key, pair.value))
                    .collect();
                write!(f, "{{{}}}", pairs.join(", "))
            }
            Value::Function(func) => {
                if func.name.is_empty() {
                    write!(f, "#<fn>")
                } else {
                    write!(f, "#<fn {}>", func.name)
                }
            }
            Value::Closure(closure) => {
                if closure.func.name.is_empty() {
                    write!(f, "#<fn>")
                } else {
                    write!(f, "#<fn {}>", closure.func.name)
                }
            }
            Value::Builtin(builtin) => write!(f, "#<builtin {}>", builtin.name),
            Value::Error(message) => write!(f, "ERROR: {}", message),
        }
    }
}

/// A key/value pair stored in a hash, keeping the original key value
/// for display.
#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

/// Which family of value a hash key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashKind {
    Integer,
    Boolean,
    String,
}

/// Hash-map key: type tag plus 64-bit hash. Only integers, booleans,
/// and strings are hashable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HashKey {
    pub kind: HashKind,
    pub value: u64,
}

/// A function lowered to bytecode: its instruction stream plus the
/// frame shape the VM needs to call it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    /// Local slot count, parameters included.
    pub num_locals: usize,
    pub num_parameters: usize,
    /// Binding name for self-recursion and display; empty for anonymous
    /// functions.
    pub name: String,
}

/// A compiled function bundled with the values captured from its
/// enclosing scopes, in capture order.
#[derive(Debug, Clone)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

/// A built-in function: registry name plus native implementation.
/// Precondition violations come back as [`Value::Error`].
#[derive(Debug, Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub func: fn(&[Value]) -> Value,
}

// ============================================================================
// Tests
// ============================================================================
