//! Built-in operator declarations (spec §6.1 `builtinDecls`).
//!
//! A mapping from built-in operator name to arity and kind, consumed by the
//! expression planner to distinguish built-ins from user functions during
//! call planning (spec §4.3.3).

use std::collections::HashMap;

/// What a built-in does with its arity+1-th operand, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    /// A comparison operator (`=`, `==`, `<`, `<=`, `>`, `>=`, `!=`); lowered
    /// directly to a `Stmt` comparison variant rather than a `Call`.
    Comparison,
    /// Any other built-in function, called like a user function.
    Function,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinDecl {
    pub arity: usize,
    pub kind: BuiltinKind,
}

/// The built-in operator declaration table.
#[derive(Debug, Clone, Default)]
pub struct BuiltinDecls {
    decls: HashMap<String, BuiltinDecl>,
}

impl BuiltinDecls {
    pub fn new() -> Self {
        BuiltinDecls::default()
    }

    /// The standard comparison operators named in spec §4.3.3, all arity 2.
    pub fn standard() -> Self {
        let mut decls = BuiltinDecls::new();
        for name in ["=", "==", "<", "<=", ">", ">=", "!="] {
            decls.register(name, 2, BuiltinKind::Comparison);
        }
        decls
    }

    pub fn register(&mut self, name: impl Into<String>, arity: usize, kind: BuiltinKind) {
        self.decls.insert(name.into(), BuiltinDecl { arity, kind });
    }

    pub fn get(&self, name: &str) -> Option<BuiltinDecl> {
        self.decls.get(name).copied()
    }

    pub fn is_comparison(&self, name: &str) -> bool {
        matches!(
            self.get(name),
            Some(BuiltinDecl { kind: BuiltinKind::Comparison, .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_has_all_comparisons() {
        let decls = BuiltinDecls::standard();
        for name in ["=", "==", "<", "<=", ">", ">=", "!="] {
            assert!(decls.is_comparison(name), "missing comparison {name}");
        }
        assert_eq!(decls.get("=").unwrap().arity, 2);
    }

    #[test]
    fn unknown_name_is_absent() {
        let decls = BuiltinDecls::standard();
        assert!(decls.get("sprintf").is_none());
    }

    #[test]
    fn custom_function_registers_as_function_kind() {
        let mut decls = BuiltinDecls::standard();
        decls.register("count", 1, BuiltinKind::Function);
        assert!(!decls.is_comparison("count"));
        assert_eq!(decls.get("count").unwrap().arity, 1);
    }
}
