// tamarin-vm - Bytecode compiler and virtual machine for the Tamarin programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Built-in functions.
//!
//! A fixed, ordered registry: the compiler seeds its symbol table from
//! the order here, and `GetBuiltin` indexes into the same order at run
//! time, so the positions are part of the bytecode contract. Contract
//! violations return a [`Value::Error`] that flows through the stack
//! like any other value; built-ins never halt the VM.

use crate::value::{Builtin, Value};

/// The built-in registry, in opcode-operand order.
pub const BUILTINS: [Builtin; 6] = [
    Builtin { name: "len", func: builtin_len },
    Builtin { name: "puts", func: builtin_puts },
    Builtin { name: "first", func: builtin_first },
    Builtin { name: "last", func: builtin_last },
    Builtin { name: "rest", func: builtin_rest },
    Builtin { name: "push", func: builtin_push },
];

/// Look a built-in up by name (compiler seeding and tests; the VM goes
/// by position).
pub fn lookup(name: &str) -> Option<Builtin> {
    BUILTINS.iter().find(|b| b.name == name).copied()
}

fn builtin_len(args: &[Value]) -> Value {
    if args.len() != 1 {
        return Value::error(format!(
            "wrong number of arguments. got={}, want=1",
            args.len()
        ));
    }
    match &args[0] {
        Value::String(s) => Value::Integer(s.len() as i64),
        Value::Array(elements) => Value::Integer(elements.len() as i64),
        other => Value::error(format!(
            "argument to `len` not supported, got {}",
            other.type_name()
        )),
    }
}

fn builtin_puts(args: &[Value]) -> Value {
    for arg in args {
        println!("{}", arg);
    }
    Value::Null
}

fn builtin_first(args: &[Value]) -> Value {
    if args.len() != 1 {
        return Value::error(format!(
            "wrong number of arguments. got={}, want=1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Array(elements) => elements.front().cloned().unwrap_or(Value::Null),
        other => Value::error(format!(
            "argument to `first` must be an array, got {}",
            other.type_name()
        )),
    }
}

fn builtin_last(args: &[Value]) -> Value {
    if args.len() != 1 {
        return Value::error(format!(
            "wrong number of arguments. got={}, want=1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Array(elements) => elements.back().cloned().unwrap_or(Value::Null),
        other => Value::error(format!(
            "argument to `last` must be an array, got {}",
            other.type_name()
        )),
    }
}

fn builtin_rest(args: &[Value]) -> Value {
    if args.len() != 1 {
        return Value::error(format!(
            "wrong number of arguments. got={}, want=1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Array(elements) if !elements.is_empty() => Value::Array(elements.skip(1)),
        Value::Array(_) => Value::Null,
        other => Value::error(format!(
            "argument to `rest` must be an array, got {}",
            other.type_name()
        )),
    }
}

fn builtin_push(args: &[Value]) -> Value {
    if args.len() != 2 {
        return Value::error(format!(
            "wrong number of arguments. got={}, want=2",
            args.len()
        ));
    }
    match &args[0] {
        Value::Array(elements) => {
            let mut pushed = elements.clone();
            pushed.push_back(args[1].clone());
            Value::Array(pushed)
        }
        other => Value::error(format!(
            "argument to `push` must be an array, got {}",
            other.type_name()
        )),
    }
}

// ============================================================================
// Tests
// ============================================================================
