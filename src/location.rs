//! Source location tracking.
//!
//! Every AST node the planner consumes, and every `Stmt` it emits, carries one
//! of these. The planner never invents a location: an emitted statement's
//! location is always copied from the AST node it was lowered from (spec
//! Invariant 4, "Location preservation").

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single point (well, span-via-text) in a source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub row: u32,
    pub col: u32,
    pub text: String,
}

impl Location {
    pub fn new(file: impl Into<String>, row: u32, col: u32, text: impl Into<String>) -> Self {
        Location {
            file: file.into(),
            row,
            col,
            text: text.into(),
        }
    }

    /// A location with no useful source span, used for synthesized statements
    /// that still need somewhere to point (e.g. a preamble block shared
    /// across queries). Kept distinct from `Default` so call sites are
    /// explicit about why there's no real span.
    pub fn synthetic() -> Self {
        Location {
            file: String::new(),
            row: 0,
            col: 0,
            text: String::new(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.row, self.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let loc = Location::new("policy.rego", 3, 5, "x = 1");
        assert_eq!(loc.to_string(), "policy.rego:3:5");
    }

    #[test]
    fn synthetic_is_distinct_default_content() {
        let loc = Location::synthetic();
        assert_eq!(loc.row, 0);
        assert!(loc.file.is_empty());
    }
}
