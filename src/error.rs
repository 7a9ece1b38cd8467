//! Planner error types (spec §7).

use thiserror::Error;

use crate::location::Location;

/// Errors the planner (or the complexity analyzer) can raise. Every variant
/// carries the location of the offending AST node.
#[derive(Error, Debug)]
pub enum PlanError {
    /// A call's operator resolves to neither a builtin nor a rule-trie node.
    #[error("{location}: unknown operator {operator:?}")]
    UnknownOperator { operator: String, location: Location },

    /// Call operand count is neither the declared arity nor arity+1.
    #[error("{location}: {operator:?} expects {expected} or {expected_plus_one} operands, got {actual}")]
    ArityMismatch {
        operator: String,
        expected: usize,
        expected_plus_one: usize,
        actual: usize,
        location: Location,
    },

    /// Ref head is not a Var, or the head is an unsafe/unbound variable.
    #[error("{location}: illegal reference: {reason}")]
    IllegalRef { reason: String, location: Location },

    /// A term variant the planner cannot lower (e.g. an arbitrary-precision
    /// number with no float fallback).
    #[error("{location}: unsupported term: {reason}")]
    UnsupportedTerm { reason: String, location: Location },

    /// Rule bucket with inconsistent arity/kind, or an else-chain head
    /// mismatch — a bug in an upstream compiler stage, not in user input.
    #[error("{location}: internal invariant violated: {reason}")]
    InternalInvariant { reason: String, location: Location },
}

impl PlanError {
    pub fn location(&self) -> &Location {
        match self {
            PlanError::UnknownOperator { location, .. }
            | PlanError::ArityMismatch { location, .. }
            | PlanError::IllegalRef { location, .. }
            | PlanError::UnsupportedTerm { location, .. }
            | PlanError::InternalInvariant { location, .. } => location,
        }
    }
}

/// Result type for planning and complexity-analysis operations.
pub type PlanResult<T> = Result<T, PlanError>;
