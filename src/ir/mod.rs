//! # Policy IR — Intermediate Representation
//!
//! The language-neutral IR the planner emits (spec §3.3). A `Stmt` is a
//! single instruction in a `Block`; blocks nest inside `Func`s and `Plan`s;
//! the whole output is bundled into a `Policy` together with the string
//! pool's static section.
//!
//! This module owns only the data model and its (de)serialization /
//! pretty-printing. Lowering — the code that actually produces `Stmt`
//! sequences from an AST — lives in [`crate::planner`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::locals::Local;
use crate::location::Location;
use crate::strings::{StringIndex, StringPool};

// ============================================================================
// Statements
// ============================================================================

/// One IR instruction. Every variant carries an implicit source [`Location`]
/// via its enclosing [`LocatedStmt`] wrapper rather than duplicating a
/// `location` field into each variant — see [`LocatedStmt`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    MakeNull { target: Local },
    MakeBoolean { value: bool, target: Local },
    MakeNumberInt { value: i64, target: Local },
    MakeNumberFloat { value: f64, target: Local },
    /// Materializes a number too large/precise for `Int`/`Float` via its
    /// deduped string-pool index (spec §9 "Numbers").
    MakeNumberRef { index: StringIndex, target: Local },
    MakeString { index: StringIndex, target: Local },

    MakeArray { target: Local },
    MakeObject { target: Local },
    MakeSet { target: Local },

    ArrayAppend { value: Local, array: Local },
    /// Fails if `key` is already present in `obj` with a value other than `v`.
    ObjectInsert { key: Local, value: Local, object: Local },
    ObjectInsertOnce { key: Local, value: Local, object: Local },
    SetAdd { value: Local, set: Local },

    AssignVar { src: Local, target: Local },
    /// Fails if `target` is already written with a value other than `src`.
    AssignVarOnce { src: Local, target: Local },
    AssignInt { value: i64, target: Local },
    AssignBoolean { value: bool, target: Local },

    /// Field lookup; fails if `key` is absent from `src`.
    Dot { src: Local, key: Local, target: Local },

    Len { src: Local, target: Local },
    IsArray { src: Local },
    IsObject { src: Local },
    IsDefined { src: Local },
    IsUndefined { src: Local },

    Equal { a: Local, b: Local },
    NotEqual { a: Local, b: Local },
    LessThan { a: Local, b: Local },
    LessThanEqual { a: Local, b: Local },
    GreaterThan { a: Local, b: Local },
    GreaterThanEqual { a: Local, b: Local },

    /// Iterate `src`; `block` re-executes once per `(key, value)` pair with
    /// those locals (re)bound.
    Scan { src: Local, key: Local, value: Local, block: Block },

    /// Invoke a planned function by name.
    Call { func: String, args: Vec<Local>, result: Local },
    /// Invoke via rule-trie dispatch on a non-ground ref prefix (§4.4).
    CallDynamic { path: Vec<Local>, args: Vec<Local>, result: Local },

    /// A sequence of blocks tried in order, as a single unit; used by
    /// else-chains and disjunctions (spec §9).
    Block { blocks: Vec<Block> },
    /// Succeeds iff `block` fails.
    Not { block: Block },
    /// Exits `index` enclosing blocks (0-indexed from the innermost, spec
    /// §6.3).
    Break { index: u32 },

    Return { code: i32 },
    ReturnLocal { src: Local },

    /// Appends a result-bindings object to the top-level result set.
    ResultSetAdd { value: Local, set: Local },
}

/// A [`Stmt`] paired with the source location it was lowered from. The
/// planner never invents a location: it is always copied from the AST node
/// that produced the statement (spec Invariant 4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatedStmt {
    pub location: Location,
    pub stmt: Stmt,
}

impl LocatedStmt {
    pub fn new(location: Location, stmt: Stmt) -> Self {
        LocatedStmt { location, stmt }
    }
}

/// An ordered list of statements.
pub type Block = Vec<LocatedStmt>;

// ============================================================================
// Functions, plans, policy
// ============================================================================

/// A planned rule-bucket function: fixed `(input, data)` parameters plus one
/// per function argument, a single return local, and a sequence of blocks
/// (one per rule in the bucket, in source order, plus a trailing
/// `ReturnLocal` block).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Func {
    pub name: String,
    pub params: Vec<Local>,
    pub return_local: Local,
    pub blocks: Vec<Block>,
}

/// One top-level query plan: a preamble plus one block per disjunct query,
/// plus a trailing block returning the result set (spec §4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub name: String,
    pub blocks: Vec<Block>,
}

/// The static (non-executable) section of a policy: the deduplicated
/// string pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticData {
    pub strings: StringPool,
}

/// The planner's complete output (spec §6.2): a static section, a function
/// table keyed by the rule path's textual form, and an ordered plan table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Policy {
    pub static_data: StaticData,
    pub funcs: std::collections::BTreeMap<String, Func>,
    pub plans: Vec<Plan>,
}

// ============================================================================
// Pretty-printing
// ============================================================================

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::MakeNull { target } => write!(f, "MakeNull {{{target}}}"),
            Stmt::MakeBoolean { value, target } => write!(f, "MakeBoolean {{{value}, {target}}}"),
            Stmt::MakeNumberInt { value, target } => write!(f, "MakeNumberInt {{{value}, {target}}}"),
            Stmt::MakeNumberFloat { value, target } => write!(f, "MakeNumberFloat {{{value}, {target}}}"),
            Stmt::MakeNumberRef { index, target } => write!(f, "MakeNumberRef {{{index}, {target}}}"),
            Stmt::MakeString { index, target } => write!(f, "MakeString {{{index}, {target}}}"),
            Stmt::MakeArray { target } => write!(f, "MakeArray {{{target}}}"),
            Stmt::MakeObject { target } => write!(f, "MakeObject {{{target}}}"),
            Stmt::MakeSet { target } => write!(f, "MakeSet {{{target}}}"),
            Stmt::ArrayAppend { value, array } => write!(f, "ArrayAppend {{{value}, {array}}}"),
            Stmt::ObjectInsert { key, value, object } => {
                write!(f, "ObjectInsert {{{key}, {value}, {object}}}")
            }
            Stmt::ObjectInsertOnce { key, value, object } => {
                write!(f, "ObjectInsertOnce {{{key}, {value}, {object}}}")
            }
            Stmt::SetAdd { value, set } => write!(f, "SetAdd {{{value}, {set}}}"),
            Stmt::AssignVar { src, target } => write!(f, "AssignVar {{{src}, {target}}}"),
            Stmt::AssignVarOnce { src, target } => write!(f, "AssignVarOnce {{{src}, {target}}}"),
            Stmt::AssignInt { value, target } => write!(f, "AssignInt {{{value}, {target}}}"),
            Stmt::AssignBoolean { value, target } => write!(f, "AssignBoolean {{{value}, {target}}}"),
            Stmt::Dot { src, key, target } => write!(f, "Dot {{{src}, {key}, {target}}}"),
            Stmt::Len { src, target } => write!(f, "Len {{{src}, {target}}}"),
            Stmt::IsArray { src } => write!(f, "IsArray {{{src}}}"),
            Stmt::IsObject { src } => write!(f, "IsObject {{{src}}}"),
            Stmt::IsDefined { src } => write!(f, "IsDefined {{{src}}}"),
            Stmt::IsUndefined { src } => write!(f, "IsUndefined {{{src}}}"),
            Stmt::Equal { a, b } => write!(f, "Equal {{{a}, {b}}}"),
            Stmt::NotEqual { a, b } => write!(f, "NotEqual {{{a}, {b}}}"),
            Stmt::LessThan { a, b } => write!(f, "LessThan {{{a}, {b}}}"),
            Stmt::LessThanEqual { a, b } => write!(f, "LessThanEqual {{{a}, {b}}}"),
            Stmt::GreaterThan { a, b } => write!(f, "GreaterThan {{{a}, {b}}}"),
            Stmt::GreaterThanEqual { a, b } => write!(f, "GreaterThanEqual {{{a}, {b}}}"),
            Stmt::Scan { src, key, value, block } => {
                write!(f, "Scan {{{src}, {key}, {value}, {}}}", fmt_block(block))
            }
            Stmt::Call { func, args, result } => write!(f, "Call {{{func}, {args:?}, {result}}}"),
            Stmt::CallDynamic { path, args, result } => {
                write!(f, "CallDynamic {{{path:?}, {args:?}, {result}}}")
            }
            Stmt::Block { blocks } => {
                let rendered: Vec<String> = blocks.iter().map(|b| fmt_block(b)).collect();
                write!(f, "Block {{{}}}", rendered.join(", "))
            }
            Stmt::Not { block } => write!(f, "Not {{{}}}", fmt_block(block)),
            Stmt::Break { index } => write!(f, "Break {{{index}}}"),
            Stmt::Return { code } => write!(f, "Return {{{code}}}"),
            Stmt::ReturnLocal { src } => write!(f, "ReturnLocal {{{src}}}"),
            Stmt::ResultSetAdd { value, set } => write!(f, "ResultSetAdd {{{value}, {set}}}"),
        }
    }
}

fn fmt_block(block: &Block) -> String {
    let rendered: Vec<String> = block.iter().map(|s| s.stmt.to_string()).collect();
    format!("[{}]", rendered.join("; "))
}

impl fmt::Display for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "func {}({:?}) -> {}", self.name, self.params, self.return_local)?;
        for block in &self.blocks {
            writeln!(f, "  {}", fmt_block(block))?;
        }
        Ok(())
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "plan {}", self.name)?;
        for block in &self.blocks {
            writeln!(f, "  {}", fmt_block(block))?;
        }
        Ok(())
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "strings: {:?}", self.static_data.strings.strings())?;
        for func in self.funcs.values() {
            write!(f, "{func}")?;
        }
        for plan in &self.plans {
            write!(f, "{plan}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Location;

    fn located(stmt: Stmt) -> LocatedStmt {
        LocatedStmt::new(Location::synthetic(), stmt)
    }

    #[test]
    fn stmt_display_renders_fields() {
        let s = Stmt::Equal { a: 3, b: 4 };
        assert_eq!(s.to_string(), "Equal {3, 4}");
    }

    #[test]
    fn block_display_joins_statements() {
        let block: Block = vec![
            located(Stmt::MakeNumberInt { value: 1, target: 2 }),
            located(Stmt::ReturnLocal { src: 2 }),
        ];
        assert_eq!(fmt_block(&block), "[MakeNumberInt {1, 2}; ReturnLocal {2}]");
    }

    #[test]
    fn nested_scan_renders_inner_block() {
        let inner: Block = vec![located(Stmt::Equal { a: 1, b: 2 })];
        let scan = Stmt::Scan { src: 0, key: 5, value: 6, block: inner };
        assert_eq!(scan.to_string(), "Scan {0, 5, 6, [Equal {1, 2}]}");
    }

    #[test]
    fn policy_serializes_deterministically() {
        let mut policy = Policy::default();
        policy.static_data.strings.intern("foo");
        let json_a = serde_json::to_string(&policy).unwrap();
        let json_b = serde_json::to_string(&policy).unwrap();
        assert_eq!(json_a, json_b);
    }

    #[test]
    fn policy_round_trips_through_bincode() {
        let mut policy = Policy::default();
        policy.static_data.strings.intern("x");
        policy.plans.push(Plan {
            name: "q0".to_string(),
            blocks: vec![vec![located(Stmt::ReturnLocal { src: 1 })]],
        });
        let bytes = bincode::serialize(&policy).unwrap();
        let restored: Policy = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored.plans.len(), 1);
        assert_eq!(restored.static_data.strings.get(0), Some("x"));
    }

    #[test]
    fn func_display_includes_params_and_blocks() {
        let func = Func {
            name: "data.test.p".to_string(),
            params: vec![0, 1],
            return_local: 2,
            blocks: vec![vec![located(Stmt::ReturnLocal { src: 2 })]],
        };
        let rendered = func.to_string();
        assert!(rendered.contains("func data.test.p"));
        assert!(rendered.contains("ReturnLocal {2}"));
    }
}
