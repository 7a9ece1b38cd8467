//! Rewritten-variable map (spec §6.1 `rewrittenVars`).
//!
//! An optional mapping from a post-rewrite AST `Var` name back to its
//! pre-rewrite, user-facing name. Used only to label result-binding keys
//! (spec §4.5 step 2) — it has no bearing on planning semantics.

use std::collections::HashMap;

/// Maps a post-rewrite variable name to the name the user actually wrote.
pub type RewrittenVars = HashMap<String, String>;

/// Resolve `name` to its original, user-facing form if the compiler renamed
/// it; otherwise return `name` unchanged.
pub fn original_name<'a>(rewritten: &'a RewrittenVars, name: &'a str) -> &'a str {
    rewritten.get(name).map(String::as_str).unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_name_when_unmapped() {
        let map = RewrittenVars::new();
        assert_eq!(original_name(&map, "x"), "x");
    }

    #[test]
    fn resolves_through_the_map() {
        let mut map = RewrittenVars::new();
        map.insert("__local0__".to_string(), "x".to_string());
        assert_eq!(original_name(&map, "__local0__"), "x");
    }
}
