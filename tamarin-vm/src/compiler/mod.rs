// tamarin-vm - Bytecode compiler and virtual machine for the Tamarin programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Bytecode compiler: lowers the Tamarin AST to a linear instruction
//! stream plus a constant pool.
//!
//! Each function body compiles in its own compilation scope; scopes
//! stack as the compiler walks into nested function literals, mirrored
//! by enclosed symbol tables. Forward jumps are emitted with a
//! placeholder operand and back-patched in place once the target offset
//! is known.

use std::fmt;
use std::rc::Rc;

use tamarin_parser::ast::{Block, Expression, Program, Statement};

use crate::builtins::BUILTINS;
use crate::code::{Instructions, OpCode, make};
use crate::symbols::{Symbol, SymbolScope, SymbolTable};
use crate::value::{CompiledFunction, Value};

/// Placeholder operand for a jump whose target is not yet known.
const PLACEHOLDER_TARGET: usize = 9999;

/// Error during compilation. Halts the compile.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Reference to a name with no visible binding.
    UndefinedVariable(String),
    /// Operator the code generator has no lowering for.
    UnknownOperator(String),
    /// Assignment to something that is not a plain global or local.
    BadAssignTarget(String),
    /// Constant pool overflow (more than fits a u16 operand).
    TooManyConstants,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::UndefinedVariable(name) => {
                write!(f, "undefined variable `{}`", name)
            }
            CompileError::UnknownOperator(op) => write!(f, "unknown operator {}", op),
            CompileError::BadAssignTarget(name) => {
                write!(f, "cannot assign to `{}`", name)
            }
            CompileError::TooManyConstants => {
                write!(f, "too many constants in one compilation unit")
            }
        }
    }
}

impl std::error::Error for CompileError {}

/// Result type for compilation.
pub type Result<T> = std::result::Result<T, CompileError>;

/// The compiler's output: a top-level instruction stream and the
/// constant pool it indexes into.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

/// The most recent emission in a scope, kept so the compiler can
/// inspect or rewrite it (dropping a trailing `Pop`, turning one into
/// `ReturnValue`).
#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: OpCode,
    position: usize,
}

/// Instruction stream under construction for one function body.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last: Option<EmittedInstruction>,
    previous: Option<EmittedInstruction>,
}

/// The bytecode compiler.
pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
    scope_index: usize,
}

impl Compiler {
    /// Create a compiler with a fresh symbol table seeded with the
    /// built-in registry.
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }
        Compiler {
            constants: Vec::new(),
            symbol_table,
            scopes: vec![CompilationScope::default()],
            scope_index: 0,
        }
    }

    /// Create a compiler that continues from an earlier session's
    /// symbol table and constant pool (the REPL compiles line by line).
    pub fn new_with_state(symbol_table: SymbolTable, constants: Vec<Value>) -> Self {
        let mut compiler = Compiler::new();
        compiler.symbol_table = symbol_table;
        compiler.constants = constants;
        compiler
    }

    /// Hand the symbol table and constant pool back to the caller for
    /// the next incremental compile.
    pub fn into_state(self) -> (SymbolTable, Vec<Value>) {
        (self.symbol_table, self.constants)
    }

    /// Compile a whole program into the current scope.
    pub fn compile(&mut self, program: &Program) -> Result<()> {
        for statement in &program.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    /// The finished top-level bytecode.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.scopes[self.scope_index].instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn compile_statement(&mut self, statement: &Statement) -> Result<()> {
        match statement {
            Statement::Let { name, value } => self.compile_let(name, value),
            Statement::Return(value) => {
                self.compile_expression(value)?;
                self.emit(OpCode::ReturnValue, &[]);
                Ok(())
            }
            Statement::While { condition, body } => self.compile_while(condition, body),
            Statement::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(OpCode::Pop, &[]);
                Ok(())
            }
        }
    }

    /// `let` defines the name before compiling the value so a function
    /// literal bound here can refer to itself through its own binding.
    fn compile_let(&mut self, name: &str, value: &Expression) -> Result<()> {
        let symbol = self.symbol_table.define(name);

        if let Expression::FnLit {
            params,
            body,
            name: fn_name,
        } = value
        {
            let self_name = fn_name.as_deref().unwrap_or(name);
            self.compile_function_literal(params, body, Some(self_name))?;
        } else {
            self.compile_expression(value)?;
        }

        match symbol.scope {
            SymbolScope::Global => self.emit(OpCode::SetGlobal, &[symbol.index]),
            _ => self.emit(OpCode::SetLocal, &[symbol.index]),
        };
        Ok(())
    }

    fn compile_while(&mut self, condition: &Expression, body: &Block) -> Result<()> {
        let loop_start = self.current_instructions().len();
        self.compile_expression(condition)?;

        let exit_jump = self.emit(OpCode::JumpNotTruthy, &[PLACEHOLDER_TARGET]);
        self.compile_block(body)?;
        self.emit(OpCode::Loop, &[loop_start]);

        let after_body = self.current_instructions().len();
        self.change_operand(exit_jump, after_body);
        Ok(())
    }

    fn compile_block(&mut self, block: &Block) -> Result<()> {
        for statement in &block.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn compile_expression(&mut self, expr: &Expression) -> Result<()> {
        match expr {
            Expression::Ident(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedVariable(name.clone()))?;
                self.load_symbol(&symbol);
                Ok(())
            }
            Expression::IntLit(n) => {
                let index = self.add_constant(Value::Integer(*n))?;
                self.emit(OpCode::Const, &[index]);
                Ok(())
            }
            Expression::StringLit(s) => {
                let index = self.add_constant(Value::string(s))?;
                self.emit(OpCode::Const, &[index]);
                Ok(())
            }
            Expression::BoolLit(true) => {
                self.emit(OpCode::True, &[]);
                Ok(())
            }
            Expression::BoolLit(false) => {
                self.emit(OpCode::False, &[]);
                Ok(())
            }
            Expression::Prefix { op, right } => {
                self.compile_expression(right)?;
                match op.as_str() {
                    "!" => self.emit(OpCode::Bang, &[]),
                    "-" => self.emit(OpCode::Minus, &[]),
                    _ => return Err(CompileError::UnknownOperator(op.clone())),
                };
                Ok(())
            }
            Expression::Infix { op, left, right } => self.compile_infix(op, left, right),
            Expression::If {
                condition,
                consequence,
                alternative,
            } => self.compile_if(condition, consequence, alternative.as_ref()),
            Expression::FnLit { params, body, name } => {
                self.compile_function_literal(params, body, name.as_deref())
            }
            Expression::Call { callee, args } => {
                self.compile_expression(callee)?;
                for arg in args {
                    self.compile_expression(arg)?;
                }
                self.emit(OpCode::Call, &[args.len()]);
                Ok(())
            }
            Expression::ArrayLit(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(OpCode::Array, &[elements.len()]);
                Ok(())
            }
            Expression::HashLit(pairs) => self.compile_hash_literal(pairs),
            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(OpCode::Index, &[]);
                Ok(())
            }
            Expression::Assign { name, value } => self.compile_assign(name, value),
        }
    }

    /// There is no less-than opcode: `<` compiles to `GreaterThan` with
    /// swapped operand order, and `<=`/`>=` negate the strict compare.
    fn compile_infix(&mut self, op: &str, left: &Expression, right: &Expression) -> Result<()> {
        match op {
            "<" | ">=" => {
                self.compile_expression(right)?;
                self.compile_expression(left)?;
            }
            _ => {
                self.compile_expression(left)?;
                self.compile_expression(right)?;
            }
        }

        match op {
            "+" => self.emit(OpCode::Add, &[]),
            "-" => self.emit(OpCode::Sub, &[]),
            "*" => self.emit(OpCode::Mul, &[]),
            "/" => self.emit(OpCode::Div, &[]),
            "==" => self.emit(OpCode::Equal, &[]),
            "!=" => self.emit(OpCode::NotEqual, &[]),
            ">" | "<" => self.emit(OpCode::GreaterThan, &[]),
            "<=" | ">=" => {
                self.emit(OpCode::GreaterThan, &[]);
                self.emit(OpCode::Bang, &[])
            }
            _ => return Err(CompileError::UnknownOperator(op.to_string())),
        };
        Ok(())
    }

    fn compile_if(
        &mut self,
        condition: &Expression,
        consequence: &Block,
        alternative: Option<&Block>,
    ) -> Result<()> {
        self.compile_expression(condition)?;

        let exit_jump = self.emit(OpCode::JumpNotTruthy, &[PLACEHOLDER_TARGET]);

        self.compile_block(consequence)?;
        if self.last_instruction_is(OpCode::Pop) {
            self.remove_last_pop();
        }

        let end_jump = self.emit(OpCode::Jump, &[PLACEHOLDER_TARGET]);

        let after_consequence = self.current_instructions().len();
        self.change_operand(exit_jump, after_consequence);

        match alternative {
            None => {
                self.emit(OpCode::Null, &[]);
            }
            Some(alternative) => {
                self.compile_block(alternative)?;
                if self.last_instruction_is(OpCode::Pop) {
                    self.remove_last_pop();
                }
            }
        }

        let after_alternative = self.current_instructions().len();
        self.change_operand(end_jump, after_alternative);
        Ok(())
    }

    /// Keys compile in ascending order of their printed form so the
    /// emitted bytecode is deterministic regardless of source order.
    fn compile_hash_literal(&mut self, pairs: &[(Expression, Expression)]) -> Result<()> {
        let mut sorted: Vec<&(Expression, Expression)> = pairs.iter().collect();
        sorted.sort_by_key(|(key, _)| key.to_string());

        for (key, value) in sorted {
            self.compile_expression(key)?;
            self.compile_expression(value)?;
        }
        self.emit(OpCode::Hash, &[pairs.len() * 2]);
        Ok(())
    }

    /// Assignment rebinds an existing global or local and yields the
    /// assigned value: store, then load the slot straight back.
    fn compile_assign(&mut self, name: &str, value: &Expression) -> Result<()> {
        let symbol = self
            .symbol_table
            .resolve(name)
            .ok_or_else(|| CompileError::UndefinedVariable(name.to_string()))?;

        match symbol.scope {
            SymbolScope::Global | SymbolScope::Local => {}
            _ => return Err(CompileError::BadAssignTarget(name.to_string())),
        }

        self.compile_expression(value)?;
        match symbol.scope {
            SymbolScope::Global => {
                self.emit(OpCode::SetGlobal, &[symbol.index]);
                self.emit(OpCode::GetGlobal, &[symbol.index]);
            }
            _ => {
                self.emit(OpCode::SetLocal, &[symbol.index]);
                self.emit(OpCode::GetLocal, &[symbol.index]);
            }
        }
        Ok(())
    }

    fn compile_function_literal(
        &mut self,
        params: &[String],
        body: &Block,
        name: Option<&str>,
    ) -> Result<()> {
        self.enter_scope();

        if let Some(name) = name {
            self.symbol_table.define_function_name(name);
        }
        for param in params {
            self.symbol_table.define(param);
        }

        self.compile_block(body)?;

        // An expression body returns its value; a body ending some other
        // way (or an empty one) returns null implicitly.
        if self.last_instruction_is(OpCode::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(OpCode::ReturnValue) {
            self.emit(OpCode::Return, &[]);
        }

        let num_locals = self.symbol_table.num_definitions();
        let free_symbols = self.symbol_table.free_symbols().to_vec();
        let instructions = self.leave_scope();

        // Load each captured symbol in the enclosing scope; the closure
        // instruction collects them off the stack.
        for symbol in &free_symbols {
            self.load_symbol(symbol);
        }

        let function = CompiledFunction {
            instructions,
            num_locals,
            num_parameters: params.len(),
            name: name.unwrap_or("").to_string(),
        };
        let index = self.add_constant(Value::Function(Rc::new(function)))?;
        self.emit(OpCode::Closure, &[index, free_symbols.len()]);
        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(OpCode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(OpCode::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(OpCode::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(OpCode::GetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(OpCode::CurrentClosure, &[]),
        };
    }

    // ------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------

    /// Intern a constant, returning its pool index.
    fn add_constant(&mut self, value: Value) -> Result<usize> {
        if self.constants.len() > u16::MAX as usize {
            return Err(CompileError::TooManyConstants);
        }
        self.constants.push(value);
        Ok(self.constants.len() - 1)
    }

    /// Encode and append an instruction to the current scope, returning
    /// its starting offset.
    fn emit(&mut self, op: OpCode, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let scope = &mut self.scopes[self.scope_index];
        let position = scope.instructions.append(instruction);
        scope.previous = scope.last;
        scope.last = Some(EmittedInstruction {
            opcode: op,
            position,
        });
        position
    }

    fn current_instructions(&self) -> &Instructions {
        &self.scopes[self.scope_index].instructions
    }

    fn last_instruction_is(&self, op: OpCode) -> bool {
        self.scopes[self.scope_index]
            .last
            .is_some_and(|last| last.opcode == op)
    }

    /// Drop the most recent instruction (always a `Pop` stripped from a
    /// branch arm).
    fn remove_last_pop(&mut self) {
        let scope = &mut self.scopes[self.scope_index];
        if let Some(last) = scope.last {
            scope.instructions.truncate(last.position);
            scope.last = scope.previous.take();
        }
    }

    /// Rewrite the trailing `Pop` of a function body into `ReturnValue`
    /// (both are single-byte, so this is an in-place overwrite).
    fn replace_last_pop_with_return(&mut self) {
        let scope = &mut self.scopes[self.scope_index];
        if let Some(last) = &mut scope.last {
            scope
                .instructions
                .replace(last.position, &make(OpCode::ReturnValue, &[]));
            last.opcode = OpCode::ReturnValue;
        }
    }

    /// Back-patch the operand of the jump emitted at `position`.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let scope = &mut self.scopes[self.scope_index];
        let op = scope
            .instructions
            .get(position)
            .and_then(OpCode::from_byte)
            .expect("back-patch position holds a defined opcode");
        scope.instructions.replace(position, &make(op, &[operand]));
    }

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        self.scope_index += 1;

        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::new_enclosed(outer);
    }

    /// Pop the current scope, restore the enclosing symbol table, and
    /// return the finished instruction stream.
    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("scope stack is never empty");
        self.scope_index -= 1;

        self.symbol_table = self
            .symbol_table
            .take_outer()
            .expect("leaving a scope that has an enclosing table");
        scope.instructions
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
