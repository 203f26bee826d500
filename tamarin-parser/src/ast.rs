// tamarin-parser - AST for Tamarin
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Abstract syntax tree for Tamarin source code.
//!
//! Statements and expressions are closed sum types; all behaviour in
//! the compiler dispatches by pattern matching. The `Display` impls
//! reproduce source-like text and are load-bearing: the compiler orders
//! hash-literal keys by the printed form of the key expression.

use std::fmt;

/// A parsed program: the top-level statement sequence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

/// A brace-delimited statement sequence (function, `if`, and `while`
/// bodies).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub statements: Vec<Statement>,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

/// Statement nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `let name = value;`
    Let { name: String, value: Expression },
    /// `return value;`
    Return(Expression),
    /// `while (condition) { body }`
    While { condition: Expression, body: Block },
    /// A bare expression in statement position.
    Expression(Expression),
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Let { name, value } => write!(f, "let {} = {};", name, value),
            Statement::Return(value) => write!(f, "return {};", value),
            Statement::While { condition, body } => {
                write!(f, "while ({}) {{ {} }}", condition, body)
            }
            Statement::Expression(expr) => write!(f, "{}", expr),
        }
    }
}

/// Expression nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Ident(String),
    IntLit(i64),
    StringLit(String),
    BoolLit(bool),
    /// `!right` or `-right`.
    Prefix { op: String, right: Box<Expression> },
    /// `left op right`.
    Infix {
        op: String,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `if (condition) { consequence } else { alternative }`.
    If {
        condition: Box<Expression>,
        consequence: Block,
        alternative: Option<Block>,
    },
    /// `fn(params) { body }`. The `name` is the self-name for recursive
    /// reference; the parser always leaves it `None` and the compiler
    /// fills it in from the enclosing `let` binding.
    FnLit {
        params: Vec<String>,
        body: Block,
        name: Option<String>,
    },
    /// `callee(args)`.
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
    },
    /// `[elements]`.
    ArrayLit(Vec<Expression>),
    /// `{key: value, ...}` in source order.
    HashLit(Vec<(Expression, Expression)>),
    /// `left[index]`.
    Index {
        left: Box<Expression>,
        index: Box<Expression>,
    },
    /// `name = value`, rebinding an existing `let` binding.
    Assign { name: String, value: Box<Expression> },
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Ident(name) => write!(f, "{}", name),
            Expression::IntLit(n) => write!(f, "{}", n),
            Expression::StringLit(s) => write!(f, "{}", s),
            Expression::BoolLit(b) => write!(f, "{}", b),
            Expression::Prefix { op, right } => write!(f, "({}{})", op, right),
            Expression::Infix { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if{} {}", condition, consequence)?;
                if let Some(alt) = alternative {
                    write!(f, "else {}", alt)?;
                }
                Ok(())
            }
            Expression::FnLit { params, body, name } => {
                write!(f, "fn")?;
                if let Some(name) = name {
                    write!(f, "<{}>", name)?;
                }
                write!(f, "({}) {}", params.join(", "), body)
            }
            Expression::Call { callee, args } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", callee, args.join(", "))
            }
            Expression::ArrayLit(elements) => {
                let elements: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", elements.join(", "))
            }
            Expression::HashLit(pairs) => {
                let pairs: Vec<String> =
                    pairs.iter().map(|(k, v)| format!("{}:{}", k, v)).collect();
                write!(f, "{{{}}}", pairs.join(", "))
            }
            Expression::Index { left, index } => write!(f, "({}[{}])", left, index),
            Expression::Assign { name, value } => write!(f, "{} = {}", name, value),
        }
    }
}
