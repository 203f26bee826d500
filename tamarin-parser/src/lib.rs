// tamarin-parser - Lexer, AST, and parser for Tamarin
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Front end for the Tamarin programming language.
//!
//! This crate turns source text into an AST: [`lexer::Lexer`] produces
//! [`token::Token`]s, [`parser::Parser`] assembles them into
//! [`ast::Program`] nodes. Compilation and execution live in the
//! `tamarin-vm` crate.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{Block, Expression, Program, Statement};
pub use lexer::Lexer;
pub use parser::Parser;
pub use token::Token;
