// tamarin-vm - Bytecode compiler and virtual machine for the Tamarin programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Lexically nested symbol tables for the compiler.
//!
//! Each function body compiles inside its own table enclosed by the
//! table of the surrounding scope. Resolving a name that lives in an
//! enclosing non-global scope promotes it to a free variable of the
//! current table; the compiler later emits the load of the original
//! symbol in the enclosing scope when it builds the closure.

use std::collections::HashMap;

/// Where a resolved name lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    /// Top-level binding, addressed by slot in the VM's globals vector.
    Global,
    /// Function-local binding (parameters included), addressed relative
    /// to the frame's base pointer.
    Local,
    /// One of the fixed built-in functions.
    Builtin,
    /// Captured from an enclosing function scope.
    Free,
    /// The name of the function currently being compiled, inside its
    /// own body; loads as the running closure itself.
    Function,
}

/// A resolved name. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

/// One lexical scope's name table.
#[derive(Debug, Default)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    entries: HashMap<String, Symbol>,
    free: Vec<Symbol>,
    num_definitions: usize,
}

impl SymbolTable {
    /// Create the root (global) table.
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Create a table enclosed by `outer`.
    pub fn new_enclosed(outer: SymbolTable) -> Self {
        SymbolTable {
            outer: Some(Box::new(outer)),
            ..SymbolTable::default()
        }
    }

    /// Detach and return the enclosing table, if any.
    pub fn take_outer(&mut self) -> Option<SymbolTable> {
        self.outer.take().map(|outer| *outer)
    }

    /// Number of definitions recorded in this table (not counting free
    /// promotions); a compiled function's local slot count.
    pub fn num_definitions(&self) -> usize {
        self.num_definitions
    }

    /// The free symbols promoted into this table, in promotion order.
    /// Each entry is the symbol as resolved in the enclosing table.
    pub fn free_symbols(&self) -> &[Symbol] {
        &self.free
    }

    /// Define `name` in this table with a fresh index: global scope in
    /// the root table, local scope everywhere else.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_none() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };
        self.num_definitions += 1;
        self.entries.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Record a built-in at its fixed registry position.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.entries.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Make the function being compiled visible inside its own body.
    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Function,
            index: 0,
        };
        self.entries.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Promote `original` (a symbol of an enclosing scope) to a free
    /// variable of this table.
    fn define_free(&mut self, original: Symbol) -> Symbol {
        let symbol = Symbol {
            name: original.name.clone(),
            scope: SymbolScope::Free,
            index: self.free.len(),
        };
        self.free.push(original);
        self.entries.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    /// Resolve `name`, walking outwards. A hit in an enclosing scope
    /// comes back unchanged when it is global or built-in; anything else
    /// is promoted to a free variable at every level it crosses.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.entries.get(name) {
            return Some(symbol.clone());
        }
        let outer = self.outer.as_mut()?;
        let symbol = outer.resolve(name)?;
        if matches!(symbol.scope, SymbolScope::Global | SymbolScope::Builtin) {
            return Some(symbol);
        }
        Some(self.define_free(symbol))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn global(name: &str, index: usize) -> Symbol {
        Symbol {
            name: name.to_string(),
            scope: SymbolScope::Global,
            index,
        }
    }

    fn local(name: &str, index: usize) -> Symbol {
        Symbol {
            name: name.to_string(),
            scope: SymbolScope::Local,
            index,
        }
    }

    fn free(name: &str, index: usize) -> Symbol {
        Symbol {
            name: name.to_string(),
            scope: SymbolScope::Free,
            index,
        }
    }

    #[test]
    fn test_define() {
        let mut table = SymbolTable::new();
        assert_eq!(table.define("a"), global("a", 0));
        assert_eq!(table.define("b"), global("b", 1));

        let mut first = SymbolTable::new_enclosed(table);
        assert_eq!(first.define("c"), local("c", 0));
        assert_eq!(first.define("d"), local("d", 1));

        let mut second = SymbolTable::new_enclosed(first);
        assert_eq!(second.define("e"), local("e", 0));
        assert_eq!(second.define("f"), local("f", 1));
    }

    #[test]
    fn test_resolve_global() {
        let mut table = SymbolTable::new();
        table.define("a");
        table.define("b");

        assert_eq!(table.resolve("a"), Some(global("a", 0)));
        assert_eq!(table.resolve("b"), Some(global("b", 1)));
        assert_eq!(table.resolve("c"), None);
    }

    #[test]
    fn test_resolve_after_define_is_stable() {
        let mut table = SymbolTable::new();
        let defined = table.define("a");
        assert_eq!(table.resolve("a"), Some(defined.clone()));
        assert_eq!(table.resolve("a"), Some(defined));
    }

    #[test]
    fn test_resolve_local_and_global() {
        let mut outer = SymbolTable::new();
        outer.define("a");
        outer.define("b");
        let mut table = SymbolTable::new_enclosed(outer);
        table.define("c");
        table.define("d");

        assert_eq!(table.resolve("a"), Some(global("a", 0)));
        assert_eq!(table.resolve("b"), Some(global("b", 1)));
        assert_eq!(table.resolve("c"), Some(local("c", 0)));
        assert_eq!(table.resolve("d"), Some(local("d", 1)));
    }

    #[test]
    fn test_resolve_builtins_from_nested_scopes() {
        let mut root = SymbolTable::new();
        let expected = root.define_builtin(0, "len");
        let first = SymbolTable::new_enclosed(root);
        let mut second = SymbolTable::new_enclosed(first);

        // Builtins resolve unchanged however deep the nesting goes.
        assert_eq!(second.resolve("len"), Some(expected));
        assert!(second.free_symbols().is_empty());
    }

    #[test]
    fn test_resolve_free() {
        let mut root = SymbolTable::new();
        root.define("a");
        root.define("b");

        let mut first = SymbolTable::new_enclosed(root);
        first.define("c");
        first.define("d");

        let mut second = SymbolTable::new_enclosed(first);
        second.define("e");
        second.define("f");

        assert_eq!(second.resolve("a"), Some(global("a", 0)));
        assert_eq!(second.resolve("b"), Some(global("b", 1)));
        assert_eq!(second.resolve("c"), Some(free("c", 0)));
        assert_eq!(second.resolve("d"), Some(free("d", 1)));
        assert_eq!(second.resolve("e"), Some(local("e", 0)));
        assert_eq!(second.resolve("f"), Some(local("f", 1)));

        // The recorded originals are the symbols as seen one level out.
        assert_eq!(second.free_symbols(), &[local("c", 0), local("d", 1)]);

        // The intermediate scope was crossed without touching c or d
        // directly, so it records no promotions of its own.
        let first = second.take_outer().unwrap();
        assert!(first.free_symbols().is_empty());
    }

    #[test]
    fn test_free_promotion_chains_through_intermediate_scope() {
        let mut root = SymbolTable::new();
        root.define("a");

        let mut first = SymbolTable::new_enclosed(root);
        first.define("b");

        let mut second = SymbolTable::new_enclosed(first);

        // Resolving b two levels down promotes it in the innermost table
        // and records the intermediate's local as the original.
        assert_eq!(second.resolve("b"), Some(free("b", 0)));
        assert_eq!(second.free_symbols(), &[local("b", 0)]);

        // Resolving through yet another level chains the promotion: the
        // innermost original is the free symbol of the middle table.
        let mut third = SymbolTable::new_enclosed(second);
        assert_eq!(third.resolve("b"), Some(free("b", 0)));
        assert_eq!(third.free_symbols(), &[free("b", 0)]);
    }

    #[test]
    fn test_unresolvable_free() {
        let mut root = SymbolTable::new();
        root.define("a");
        let mut first = SymbolTable::new_enclosed(root);
        first.define("c");
        let mut second = SymbolTable::new_enclosed(first);
        second.define("e");
        second.define("f");

        assert_eq!(second.resolve("a"), Some(global("a", 0)));
        assert_eq!(second.resolve("c"), Some(free("c", 0)));
        assert_eq!(second.resolve("b"), None);
        assert_eq!(second.resolve("d"), None);
    }

    #[test]
    fn test_define_and_resolve_function_name() {
        let mut root = SymbolTable::new();
        let expected = root.define_function_name("a");
        assert_eq!(expected.scope, SymbolScope::Function);
        assert_eq!(expected.index, 0);
        assert_eq!(root.resolve("a"), Some(expected));
    }

    #[test]
    fn test_shadowing_function_name() {
        let mut root = SymbolTable::new();
        root.define_function_name("a");
        let expected = root.define("a");
        assert_eq!(root.resolve("a"), Some(expected));
        assert_eq!(root.resolve("a").unwrap().scope, SymbolScope::Global);
    }
}
