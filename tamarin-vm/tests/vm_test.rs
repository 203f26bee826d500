// tamarin-vm - VM execution tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! End-to-end execution tests: compile a snippet, run it, and check
//! the residual value the machine leaves behind.

use im::{OrdMap, Vector};
use tamarin_parser::Parser;
use tamarin_vm::compiler::Compiler;
use tamarin_vm::value::{HashPair, Value};
use tamarin_vm::vm::{RuntimeError, VM};

fn run(source: &str) -> Result<Value, RuntimeError> {
    let program = Parser::parse(source).expect("parse error");
    let mut compiler = Compiler::new();
    compiler.compile(&program).expect("compile error");
    let mut vm = VM::new(compiler.bytecode());
    vm.run()?;
    Ok(vm.last_popped())
}

fn run_ok(source: &str) -> Value {
    match run(source) {
        Ok(value) => value,
        Err(e) => panic!("vm error for {:?}: {}", source, e),
    }
}

fn check_int(cases: &[(&str, i64)]) {
    for (source, expected) in cases {
        assert_eq!(run_ok(source), Value::Integer(*expected), "source: {:?}", source);
    }
}

fn check_bool(cases: &[(&str, bool)]) {
    for (source, expected) in cases {
        assert_eq!(run_ok(source), Value::Boolean(*expected), "source: {:?}", source);
    }
}

fn array(values: Vec<Value>) -> Value {
    Value::Array(Vector::from(values))
}

fn hash(pairs: Vec<(Value, Value)>) -> Value {
    let mut map = OrdMap::new();
    for (key, value) in pairs {
        let hash_key = key.hash_key().expect("hashable test key");
        map.insert(hash_key, HashPair { key, value });
    }
    Value::Hash(map)
}

fn expect_error_value(source: &str, message: &str) {
    match run_ok(source) {
        Value::Error(got) => assert_eq!(&*got, message, "source: {:?}", source),
        other => panic!("expected error value for {:?}, got {:?}", source, other),
    }
}

// ============================================================================
// Arithmetic, booleans, conditionals
// ============================================================================

#[test]
fn test_integer_arithmetic() {
    check_int(&[
        ("1", 1),
        ("2", 2),
        ("1 + 2", 3),
        ("1 - 2", -1),
        ("1 * 2", 2),
        ("4 / 2", 2),
        ("1 / 2", 0),
        ("50 / 2 * 2 + 10 - 5", 55),
        ("5 * (2 + 10)", 60),
        ("-5", -5),
        ("-10", -10),
        ("-50 + 100 + -50", 0),
        ("(5 + 10 * 2 + 15 / 3) * 2 + -10", 50),
    ]);
}

#[test]
fn test_boolean_expressions() {
    check_bool(&[
        ("true", true),
        ("false", false),
        ("1 < 2", true),
        ("1 > 2", false),
        ("1 < 1", false),
        ("1 > 1", false),
        ("1 <= 2", true),
        ("1 <= 1", true),
        ("2 <= 1", false),
        ("2 >= 1", true),
        ("1 >= 1", true),
        ("1 >= 2", false),
        ("1 == 1", true),
        ("1 != 1", false),
        ("1 == 2", false),
        ("1 != 2", true),
        ("true == true", true),
        ("false == false", true),
        ("true == false", false),
        ("true != false", true),
        ("false != true", true),
        ("(1 < 2) == true", true),
        ("(1 < 2) == false", false),
        ("(1 > 2) == true", false),
        ("(1 > 2) == false", true),
        ("!true", false),
        ("!false", true),
        ("!5", false),
        ("!!true", true),
        ("!!false", false),
        ("!!5", true),
        ("!(if (false) { 5; })", true),
    ]);
}

#[test]
fn test_string_equality_is_identity() {
    // Non-integer equality compares the canonical singletons, so two
    // separately built strings are never equal even with the same text.
    check_bool(&[("\"a\" == \"a\"", false), ("\"a\" != \"a\"", true)]);
}

#[test]
fn test_conditionals() {
    check_int(&[
        ("if (true) { 10 }", 10),
        ("if (true) { 10 } else { 20 }", 10),
        ("if (false) { 10 } else { 20 }", 20),
        ("if (1) { 10 }", 10),
        ("if (1 < 2) { 10 }", 10),
        ("if (1 < 2) { 10 } else { 20 }", 10),
        ("if (1 > 2) { 10 } else { 20 }", 20),
        ("if ((if (false) { 10 })) { 10 } else { 20 }", 20),
    ]);
    assert_eq!(run_ok("if (1 > 2) { 10 }"), Value::Null);
    assert_eq!(run_ok("if (false) { 10 }"), Value::Null);
}

// ============================================================================
// Bindings
// ============================================================================

#[test]
fn test_global_let_statements() {
    check_int(&[
        ("let a = 5; a;", 5),
        ("let one = 1; one", 1),
        ("let one = 1; let two = 2; one + two", 3),
        ("let one = 1; let two = one + one; one + two", 3),
    ]);
}

#[test]
fn test_string_expressions() {
    assert_eq!(run_ok("\"tamarin\""), Value::string("tamarin"));
    assert_eq!(run_ok("\"tam\" + \"arin\""), Value::string("tamarin"));
    assert_eq!(
        run_ok("\"tam\" + \"arin\" + \" says hi\""),
        Value::string("tamarin says hi")
    );
}

// ============================================================================
// Aggregates
// ============================================================================

#[test]
fn test_array_literals() {
    assert_eq!(run_ok("[]"), array(vec![]));
    assert_eq!(
        run_ok("[1, 2, 3]"),
        array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
    );
    assert_eq!(
        run_ok("[1 + 2, 3 * 4, 5 + 6]"),
        array(vec![Value::Integer(3), Value::Integer(12), Value::Integer(11)])
    );
}

#[test]
fn test_hash_literals() {
    assert_eq!(run_ok("{}"), hash(vec![]));
    assert_eq!(
        run_ok("{1: 2, 2: 3}"),
        hash(vec![
            (Value::Integer(1), Value::Integer(2)),
            (Value::Integer(2), Value::Integer(3)),
        ])
    );
    assert_eq!(
        run_ok("{1 + 1: 2 * 2, 3 + 3: 4 * 4}"),
        hash(vec![
            (Value::Integer(2), Value::Integer(4)),
            (Value::Integer(6), Value::Integer(16)),
        ])
    );
}

#[test]
fn test_index_expressions() {
    check_int(&[
        ("[1, 2, 3][1]", 2),
        ("[1, 2, 3][0 + 2]", 3),
        ("[[1, 1, 1]][0][0]", 1),
        ("let a = [1, 2, 3]; a[2] + a[0];", 4),
        ("{1: 1, 2: 2}[1]", 1),
        ("{1: 1, 2: 2}[2]", 2),
        ("{\"k\": 1 + 2}[\"k\"]", 3),
    ]);
    assert_eq!(run_ok("[][0]"), Value::Null);
    assert_eq!(run_ok("[1, 2, 3][99]"), Value::Null);
    assert_eq!(run_ok("[1, 2, 3][100]"), Value::Null);
    assert_eq!(run_ok("[1][-1]"), Value::Null);
    assert_eq!(run_ok("let a = [1, 2, 3]; a[-1]"), Value::Null);
    assert_eq!(run_ok("{1: 1}[0]"), Value::Null);
    assert_eq!(run_ok("{}[0]"), Value::Null);
    assert_eq!(run_ok("{}[\"x\"]"), Value::Null);
    assert_eq!(run_ok("{true: \"t\"}[true]"), Value::string("t"));
}

// ============================================================================
// Functions & closures
// ============================================================================

#[test]
fn test_calling_functions_without_arguments() {
    check_int(&[
        ("let fivePlusTen = fn() { 5 + 10; }; fivePlusTen();", 15),
        ("let one = fn() { 1; }; let two = fn() { 2; }; one() + two()", 3),
        ("let a = fn() { 1 }; let b = fn() { a() + 1 }; let c = fn() { b() + 1 }; c();", 3),
    ]);
}

#[test]
fn test_functions_with_return_statements() {
    check_int(&[
        ("let earlyExit = fn() { return 99; 100; }; earlyExit();", 99),
        ("let earlyExit = fn() { return 99; return 100; }; earlyExit();", 99),
    ]);
}

#[test]
fn test_functions_without_return_value() {
    assert_eq!(run_ok("let noReturn = fn() { }; noReturn();"), Value::Null);
    assert_eq!(
        run_ok(
            "let noReturn = fn() { };
             let noReturnTwo = fn() { noReturn(); };
             noReturn();
             noReturnTwo();"
        ),
        Value::Null
    );
}

#[test]
fn test_first_class_functions() {
    check_int(&[(
        "let returnsOneReturner = fn() { let returnsOne = fn() { 1; }; returnsOne; };
         returnsOneReturner()();",
        1,
    )]);
}

#[test]
fn test_calling_functions_with_bindings() {
    check_int(&[
        ("let one = fn() { let one = 1; one }; one();", 1),
        (
            "let oneAndTwo = fn() { let one = 1; let two = 2; one + two; }; oneAndTwo();",
            3,
        ),
        (
            "let oneAndTwo = fn() { let one = 1; let two = 2; one + two; };
             let threeAndFour = fn() { let three = 3; let four = 4; three + four; };
             oneAndTwo() + threeAndFour();",
            10,
        ),
        (
            "let firstFoobar = fn() { let foobar = 50; foobar; };
             let secondFoobar = fn() { let foobar = 100; foobar; };
             firstFoobar() + secondFoobar();",
            150,
        ),
        (
            "let globalSeed = 50;
             let minusOne = fn() { let num = 1; globalSeed - num; };
             let minusTwo = fn() { let num = 2; globalSeed - num; };
             minusOne() + minusTwo();",
            97,
        ),
    ]);
}

#[test]
fn test_calling_functions_with_arguments_and_bindings() {
    check_int(&[
        ("let identity = fn(a) { a; }; identity(4);", 4),
        ("let sum = fn(a, b) { a + b; }; sum(1, 2);", 3),
        ("let sum = fn(a, b) { let c = a + b; c; }; sum(1, 2);", 3),
        (
            "let sum = fn(a, b) { let c = a + b; c; }; sum(1, 2) + sum(3, 4);",
            10,
        ),
        (
            "let sum = fn(a, b) { let c = a + b; c; };
             let outer = fn() { sum(1, 2) + sum(3, 4); };
             outer();",
            10,
        ),
        (
            "let globalNum = 10;
             let sum = fn(a, b) { let c = a + b; c + globalNum; };
             let outer = fn() { sum(1, 2) + sum(3, 4) + globalNum; };
             outer() + globalNum;",
            50,
        ),
    ]);
}

#[test]
fn test_closures() {
    check_int(&[
        (
            "let newClosure = fn(a) { fn() { a; }; }; let closure = newClosure(99); closure();",
            99,
        ),
        (
            "let newAdder = fn(x) { fn(y) { x + y } }; let add2 = newAdder(2); add2(40);",
            42,
        ),
        (
            "let newAdder = fn(a, b) { fn(c) { a + b + c }; };
             let adder = newAdder(1, 2);
             adder(8);",
            11,
        ),
        (
            "let newAdder = fn(a, b) { let c = a + b; fn(d) { c + d }; };
             let adder = newAdder(1, 2);
             adder(8);",
            11,
        ),
        (
            "let newAdderOuter = fn(a, b) {
                 let c = a + b;
                 fn(d) { let e = d + c; fn(f) { e + f; }; };
             };
             let newAdderInner = newAdderOuter(1, 2);
             let adder = newAdderInner(3);
             adder(8);",
            14,
        ),
        (
            "let a = 1;
             let newAdderOuter = fn(b) { fn(c) { fn(d) { a + b + c + d }; }; };
             let newAdderInner = newAdderOuter(2);
             let adder = newAdderInner(3);
             adder(8);",
            14,
        ),
        (
            "let newClosure = fn(a, b) {
                 let one = fn() { a; };
                 let two = fn() { b; };
                 fn() { one() + two(); };
             };
             let closure = newClosure(9, 90);
             closure();",
            99,
        ),
    ]);
}

#[test]
fn test_recursive_functions() {
    check_int(&[
        (
            "let countDown = fn(x) { if (x == 0) { return 0; } else { countDown(x - 1); } };
             countDown(1);",
            0,
        ),
        (
            "let countDown = fn(x) { if (x == 0) { return 0; } else { countDown(x - 1); } };
             let wrapper = fn() { countDown(1); };
             wrapper();",
            0,
        ),
        (
            "let wrapper = fn() {
                 let countDown = fn(x) { if (x == 0) { return 0; } else { countDown(x - 1); } };
                 countDown(1);
             };
             wrapper();",
            0,
        ),
    ]);
}

#[test]
fn test_fibonacci() {
    check_int(&[(
        "let fib = fn(n) { if (n < 2) { n } else { fib(n - 1) + fib(n - 2) } };
         fib(10);",
        55,
    )]);
}

// ============================================================================
// While loops & assignment
// ============================================================================

#[test]
fn test_while_loops() {
    check_int(&[
        (
            "let b = 0; let i = 0; while (i < 3) { b = b + i; i = i + 1; } b;",
            3,
        ),
        ("let i = 5; while (i > 0) { i = i - 1; } i;", 0),
        ("let i = 0; while (false) { i = 99; } i;", 0),
        (
            "let total = 0;
             let i = 0;
             while (i <= 10) { total = total + i; i = i + 1; }
             total;",
            55,
        ),
    ]);
}

#[test]
fn test_while_loop_with_function_calls() {
    check_int(&[(
        "let double = fn(x) { x * 2 };
         let acc = 1;
         let i = 0;
         while (i < 3) { acc = double(acc); i = i + 1; }
         acc;",
        8,
    )]);
}

#[test]
fn test_assignment_expressions() {
    check_int(&[
        ("let x = 1; x = 2; x;", 2),
        ("let x = 1; x = x + 1; x;", 2),
        // Assignment yields the assigned value.
        ("let a = 1; let b = (a = 5); b;", 5),
        ("let f = fn() { let x = 1; x = x + 1; x }; f();", 2),
    ]);
}

// ============================================================================
// Built-ins
// ============================================================================

#[test]
fn test_builtin_functions() {
    check_int(&[
        ("len(\"\")", 0),
        ("len(\"four\")", 4),
        ("len(\"hello\")", 5),
        ("len(\"hello world\")", 11),
        ("len([1, 2, 3])", 3),
        ("len([])", 0),
        ("first([1, 2, 3])", 1),
        ("last([1, 2, 3])", 3),
    ]);

    assert_eq!(run_ok("puts(\"hello\", \"world\")"), Value::Null);
    assert_eq!(run_ok("first([])"), Value::Null);
    assert_eq!(run_ok("last([])"), Value::Null);
    assert_eq!(run_ok("rest([])"), Value::Null);
    assert_eq!(
        run_ok("rest([1, 2, 3])"),
        array(vec![Value::Integer(2), Value::Integer(3)])
    );
    assert_eq!(run_ok("push([], 1)"), array(vec![Value::Integer(1)]));
}

#[test]
fn test_builtin_error_values() {
    // Contract violations come back as error values, not VM errors.
    expect_error_value("len(1)", "argument to `len` not supported, got INTEGER");
    expect_error_value(
        "len(\"one\", \"two\")",
        "wrong number of arguments. got=2, want=1",
    );
    expect_error_value("first(1)", "argument to `first` must be an array, got INTEGER");
    expect_error_value("last(1)", "argument to `last` must be an array, got INTEGER");
    expect_error_value("push(1, 1)", "argument to `push` must be an array, got INTEGER");
}

#[test]
fn test_builtins_compose() {
    check_int(&[(
        "let map = fn(arr, f) {
             let iter = fn(arr, accumulated) {
                 if (len(arr) == 0) { accumulated }
                 else { iter(rest(arr), push(accumulated, f(first(arr)))); }
             };
             iter(arr, []);
         };
         let doubled = map([1, 2, 3], fn(x) { x * 2 });
         doubled[0] + doubled[1] + doubled[2];",
        12,
    )]);
}

// ============================================================================
// Incremental sessions (REPL behaviour)
// ============================================================================

#[test]
fn test_globals_survive_across_runs() {
    use tamarin_vm::vm::GLOBAL_SIZE;

    let program = Parser::parse("let x = 5;").unwrap();
    let mut compiler = Compiler::new();
    compiler.compile(&program).unwrap();
    let bytecode = compiler.bytecode();
    let (symbols, constants) = compiler.into_state();

    let mut vm = VM::new_with_globals(bytecode, vec![Value::Null; GLOBAL_SIZE]);
    vm.run().unwrap();
    let globals = vm.into_globals();

    let program = Parser::parse("x + 1;").unwrap();
    let mut compiler = Compiler::new_with_state(symbols, constants);
    compiler.compile(&program).unwrap();

    let mut vm = VM::new_with_globals(compiler.bytecode(), globals);
    vm.run().unwrap();
    assert_eq!(vm.last_popped(), Value::Integer(6));
}
