// tamarin - A small C-like scripting language with a bytecode VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::process;

use tamarin_parser::Parser;
use tamarin_vm::builtins::BUILTINS;
use tamarin_vm::vm::GLOBAL_SIZE;
use tamarin_vm::{Compiler, SymbolTable, VM, Value};

fn main() {
    let args: Vec<String> = env::args().collect();

    // Handle --version flag
    if args.len() == 2 && (args[1] == "--version" || args[1] == "-v") {
        println!("Tamarin v0.1.0");
        return;
    }

    // A single path argument runs that file; otherwise start the REPL
    if args.len() == 2 {
        run_file(&args[1]);
    } else {
        run_repl();
    }
}

/// Compile and execute a source file, printing the program's residual
/// value.
fn run_file(path: &str) {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error reading '{}': {}", path, e);
            process::exit(1);
        }
    };

    let program = match Parser::parse(&source) {
        Ok(program) => program,
        Err(errors) => {
            print_parse_errors(&errors);
            process::exit(1);
        }
    };

    let mut compiler = Compiler::new();
    if let Err(e) = compiler.compile(&program) {
        eprintln!("compilation failed: {}", e);
        process::exit(1);
    }

    let mut vm = VM::new(compiler.bytecode());
    if let Err(e) = vm.run() {
        eprintln!("executing bytecode failed: {}", e);
        process::exit(1);
    }

    println!("{}", vm.last_popped());
}

/// Run the interactive REPL. The symbol table, constant pool, and
/// globals vector persist across lines so `let` bindings survive.
fn run_repl() {
    let user = env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "there".to_string());
    println!("Hello {}! This is the Tamarin programming language!", user);
    println!("Feel free to type in commands");

    let mut symbol_table = SymbolTable::new();
    for (index, builtin) in BUILTINS.iter().enumerate() {
        symbol_table.define_builtin(index, builtin.name);
    }
    let mut constants: Vec<Value> = Vec::new();
    let mut globals: Vec<Value> = vec![Value::Null; GLOBAL_SIZE];

    loop {
        print!(">> ");
        io::stdout().flush().unwrap();

        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("read error: {}", e);
                break;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let program = match Parser::parse(line) {
            Ok(program) => program,
            Err(errors) => {
                print_parse_errors(&errors);
                continue;
            }
        };

        let mut compiler = Compiler::new_with_state(symbol_table, constants);
        if let Err(e) = compiler.compile(&program) {
            eprintln!("Woops! Compilation failed:\n{}", e);
            (symbol_table, constants) = compiler.into_state();
            continue;
        }
        let bytecode = compiler.bytecode();
        (symbol_table, constants) = compiler.into_state();

        let mut vm = VM::new_with_globals(bytecode, globals);
        match vm.run() {
            Ok(()) => println!("{}", vm.last_popped()),
            Err(e) => eprintln!("Woops! Executing bytecode failed:\n{}", e),
        }
        globals = vm.into_globals();
    }
}

fn print_parse_errors(errors: &[String]) {
    eprintln!("Woops! We ran into some trouble here!");
    eprintln!(" parser errors:");
    for error in errors {
        eprintln!("\t{}", error);
    }
}
