//! # Policy Query Planner
//!
//! Lowers a typed, rewritten policy AST (an already-parsed and type-checked
//! module set, plus a set of named top-level queries) into a
//! language-neutral intermediate representation a separate runtime
//! executes, and analyzes the symbolic runtime complexity of rules and
//! queries in terms of the ground prefixes of the `input`/`data` documents
//! they touch.
//!
//! ## Pipeline
//!
//! ```text
//! AST (Module/QuerySet, external parser+typechecker)
//!     |
//!     v
//! Rule Trie (trie)          -- organizes rules by reference path
//!     |
//!     v
//! Planner (planner)         -- term/expr lowering, unification, query planning
//!     |
//!     v
//! Policy (ir)                -- Stmt/Block/Func/Plan, serializable, runtime-agnostic
//! ```
//!
//! [`complexity::Analyzer`] runs independently over the same AST, producing
//! a [`complexity::Report`] per query or rule.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use policy_planner::ast::builders::{BodyBuilder, TermBuilder};
//! use policy_planner::ast::QuerySet;
//! use policy_planner::planner::{PlanInput, Planner};
//!
//! let body = BodyBuilder::new()
//!     .call(TermBuilder::var("="), vec![TermBuilder::var("x"), TermBuilder::int(1)])
//!     .build();
//! let queries = vec![QuerySet::new("q0", vec![body])];
//!
//! let planner = Planner::new(PlanInput::new(queries, vec![]))?;
//! let policy = planner.plan()?;
//! # Ok::<(), policy_planner::error::PlanError>(())
//! ```

pub mod ast;
pub mod builtins;
pub mod complexity;
pub mod config;
pub mod debug;
pub mod error;
pub mod ir;
pub mod locals;
pub mod location;
pub mod planner;
pub mod rewrite;
pub mod scope;
pub mod strings;
pub mod trie;

pub use error::{PlanError, PlanResult};
