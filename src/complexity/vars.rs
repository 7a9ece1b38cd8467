//! Variable categorization and ground-prefix extraction (spec §4.6
//! "Variable categorization").
//!
//! Every AST variable in a rule body is bucketed into one of `OneValue`
//! (bound to a single value), `ManyValue` (bound by iteration over a
//! container, with a recorded ref prefix), or `Missing` (unresolved, e.g.
//! inside a comprehension or a `walk` call). The first occurrence decides
//! the bucket; later occurrences of the same name are plain lookups.

use std::collections::{HashMap, HashSet};

use crate::ast::{Body, Expr, ExprTerms, Term, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarCategory {
    OneValue,
    ManyValue,
    Missing,
}

/// The result of walking a body once: every variable's category, plus the
/// reverse index from a `ManyValue` variable to the ref prefix that bound
/// it (spec §4.6 "A reverse index from ref-prefix -> var is maintained").
#[derive(Debug, Clone, Default)]
pub struct VarTable {
    categories: HashMap<String, VarCategory>,
    prefixes: HashMap<String, String>,
}

impl VarTable {
    pub fn category(&self, name: &str) -> Option<VarCategory> {
        self.categories.get(name).copied()
    }

    pub fn prefix_of(&self, name: &str) -> Option<&str> {
        self.prefixes.get(name).map(String::as_str)
    }

    /// True the first time `name` is categorized this walk (used by cost
    /// computation to charge a `ManyValue` var's prefix exactly once: at
    /// the expression that actually introduces it).
    fn set_if_absent(&mut self, name: &str, category: VarCategory, prefix: Option<&str>) -> bool {
        if self.categories.contains_key(name) {
            return false;
        }
        self.categories.insert(name.to_string(), category);
        if let Some(p) = prefix {
            self.prefixes.insert(name.to_string(), p.to_string());
        }
        true
    }
}

/// Walk `body` once, left to right, building the variable table (spec
/// §4.6). Returns the table; callers that need per-expression "did this
/// expression just introduce var X" information should call
/// [`introduced_many_value_prefixes`] per expression against the same
/// table, in the same left-to-right order used here.
pub fn categorize(body: &Body) -> VarTable {
    let mut table = VarTable::default();
    for expr in body {
        categorize_expr(expr, &mut table);
    }
    table
}

fn categorize_expr(expr: &Expr, table: &mut VarTable) {
    if is_missing_bearing(expr) {
        let mut names = HashSet::new();
        match &expr.terms {
            ExprTerms::Term(t) => collect_missing_vars(t, &mut names),
            ExprTerms::Call { operator, operands } => {
                collect_missing_vars(operator, &mut names);
                operands.iter().for_each(|t| collect_missing_vars(t, &mut names));
            }
        }
        for name in names {
            table.set_if_absent(&name, VarCategory::Missing, None);
        }
        return;
    }

    match &expr.terms {
        ExprTerms::Term(t) => mark_term(t, table),
        ExprTerms::Call { operator, operands } => {
            mark_term(operator, table);
            let is_assign = is_assign_operator(operator);
            for (i, operand) in operands.iter().enumerate() {
                mark_term(operand, table);
                // The first bare-var operand of an assignment that wasn't
                // already bound by a ref index within this same call is a
                // one-value binding (spec §4.6: "one-value... bound to a
                // single value, e.g. x := 1 or x := input.a").
                if is_assign {
                    if let Value::Var(name) = &operand.value {
                        if i == 0 {
                            table.set_if_absent(name, VarCategory::OneValue, None);
                        }
                    }
                }
            }
        }
    }
}

pub(crate) fn is_assign_operator(operator: &Term) -> bool {
    matches!(&operator.value, Value::Var(name) if name == "=" || name == ":=" || name == "==")
}

/// Does this expression carry a comprehension or a `walk` call anywhere,
/// making its contained variables' complexity indeterminate (spec §4.6:
/// "comprehension-bearing: marked missing"; "`walk`: marked missing")?
fn is_missing_bearing(expr: &Expr) -> bool {
    missing_reason(expr).is_some()
}

/// Why (if at all) `expr`'s complexity is indeterminate: a `"comprehension"`
/// or a `"walk"` call somewhere inside it (spec §4.6). Shared by variable
/// categorization and the cost analyzer's own missing-expression reporting.
pub(crate) fn missing_reason(expr: &Expr) -> Option<&'static str> {
    match &expr.terms {
        ExprTerms::Term(t) => term_missing_reason(t),
        ExprTerms::Call { operator, operands } => {
            if is_walk_call(operator) {
                return Some("walk");
            }
            term_missing_reason(operator).or_else(|| operands.iter().find_map(term_missing_reason))
        }
    }
}

fn term_missing_reason(term: &Term) -> Option<&'static str> {
    match &term.value {
        Value::ArrayComprehension { .. } | Value::SetComprehension { .. } | Value::ObjectComprehension { .. } => {
            Some("comprehension")
        }
        Value::Ref(parts) => parts.iter().find_map(term_missing_reason),
        Value::Array(items) | Value::Set(items) => items.iter().find_map(term_missing_reason),
        Value::Object(pairs) => pairs.iter().find_map(|(k, v)| term_missing_reason(k).or_else(|| term_missing_reason(v))),
        Value::Call { operator, operands } => {
            if is_walk_call(operator) {
                return Some("walk");
            }
            term_missing_reason(operator).or_else(|| operands.iter().find_map(term_missing_reason))
        }
        Value::Null | Value::Boolean(_) | Value::Number(_) | Value::String(_) | Value::Var(_) => None,
    }
}

fn is_walk_call(operator: &Term) -> bool {
    matches!(&operator.value, Value::Var(name) if name == "walk")
}

/// Walk every `Ref` nested inside `term`, categorizing any `Var` that
/// appears as an index segment as `ManyValue`, with its reverse-index
/// prefix the dotted text of the ground segments seen before it (spec
/// §4.6, §8 scenario B/D).
fn mark_term(term: &Term, table: &mut VarTable) {
    match &term.value {
        Value::Ref(parts) => mark_ref(parts, table),
        Value::Array(items) | Value::Set(items) => items.iter().for_each(|t| mark_term(t, table)),
        Value::Object(pairs) => pairs.iter().for_each(|(k, v)| {
            mark_term(k, table);
            mark_term(v, table);
        }),
        Value::Call { operator, operands } => {
            mark_term(operator, table);
            operands.iter().for_each(|t| mark_term(t, table));
        }
        Value::Null
        | Value::Boolean(_)
        | Value::Number(_)
        | Value::String(_)
        | Value::Var(_)
        | Value::ArrayComprehension { .. }
        | Value::SetComprehension { .. }
        | Value::ObjectComprehension { .. } => {}
    }
}

fn mark_ref(parts: &[Term], table: &mut VarTable) {
    if parts.is_empty() {
        return;
    }
    let mut prefix = match &parts[0].value {
        Value::Var(name) => name.clone(),
        _ => return,
    };
    for segment in &parts[1..] {
        match &segment.value {
            Value::Var(name) => {
                table.set_if_absent(name, VarCategory::ManyValue, Some(&prefix));
            }
            _ => {
                if let Some(label) = ground_segment_label(segment) {
                    prefix.push('.');
                    prefix.push_str(&label);
                } else {
                    mark_term(segment, table);
                }
            }
        }
    }
}

/// Like [`Term::variables`], but descends into comprehension
/// term/key/value (not their bodies, which are their own scope) — used
/// only to name the variables of a missing-bearing expression for the
/// `Missing` bucket, not for normal categorization.
fn collect_missing_vars(term: &Term, out: &mut HashSet<String>) {
    match &term.value {
        Value::Null | Value::Boolean(_) | Value::Number(_) | Value::String(_) => {}
        Value::Var(name) => {
            out.insert(name.clone());
        }
        Value::Ref(parts) => parts.iter().for_each(|t| collect_missing_vars(t, out)),
        Value::Array(items) | Value::Set(items) => items.iter().for_each(|t| collect_missing_vars(t, out)),
        Value::Object(pairs) => pairs.iter().for_each(|(k, v)| {
            collect_missing_vars(k, out);
            collect_missing_vars(v, out);
        }),
        Value::Call { operator, operands } => {
            collect_missing_vars(operator, out);
            operands.iter().for_each(|t| collect_missing_vars(t, out));
        }
        Value::ArrayComprehension { term, .. } | Value::SetComprehension { term, .. } => {
            collect_missing_vars(term, out);
        }
        Value::ObjectComprehension { key, value, .. } => {
            collect_missing_vars(key, out);
            collect_missing_vars(value, out);
        }
    }
}

fn ground_segment_label(term: &Term) -> Option<String> {
    match &term.value {
        Value::String(s) => Some(s.clone()),
        Value::Number(crate::ast::Number::Int(i)) => Some(i.to_string()),
        _ => None,
    }
}

/// Re-walk `term`'s refs collecting the `(var, prefix)` pairs for
/// `ManyValue` variables whose *first* occurrence in the whole body is
/// inside this expression — i.e. the expression that actually introduces
/// them, not a later expression that merely reuses them as a bound lookup.
///
/// `table` must be the fully-built table from [`categorize`]; `charged`
/// tracks which `ManyValue` vars have already been billed to an earlier
/// (in body order) expression, since body composition walks right to left
/// but a var's cost is charged once, at its introducing expression.
pub fn newly_introduced_prefixes(term: &Term, table: &VarTable, charged: &mut std::collections::HashSet<String>) -> Vec<String> {
    let mut found = Vec::new();
    collect_ref_vars(term, &mut found);
    let mut prefixes = Vec::new();
    for name in found {
        if table.category(&name) != Some(VarCategory::ManyValue) {
            continue;
        }
        if charged.contains(&name) {
            continue;
        }
        if let Some(prefix) = table.prefix_of(&name) {
            prefixes.push(prefix.to_string());
            charged.insert(name);
        }
    }
    prefixes
}

fn collect_ref_vars(term: &Term, out: &mut Vec<String>) {
    match &term.value {
        Value::Ref(parts) => {
            for segment in &parts[1..] {
                if let Value::Var(name) = &segment.value {
                    out.push(name.clone());
                } else {
                    collect_ref_vars(segment, out);
                }
            }
        }
        Value::Array(items) | Value::Set(items) => items.iter().for_each(|t| collect_ref_vars(t, out)),
        Value::Object(pairs) => pairs.iter().for_each(|(k, v)| {
            collect_ref_vars(k, out);
            collect_ref_vars(v, out);
        }),
        Value::Call { operator, operands } => {
            collect_ref_vars(operator, out);
            operands.iter().for_each(|t| collect_ref_vars(t, out));
        }
        _ => {}
    }
}

/// Drop any prefix that is a strict dotted-segment prefix-of-another
/// already in the list; keep the coarser (shorter) one (spec §4.6 "Prefix
/// subsumption", §8 scenario D).
pub fn subsume_prefixes(prefixes: Vec<String>) -> Vec<String> {
    prefixes
        .iter()
        .enumerate()
        .filter(|(i, p)| {
            !prefixes.iter().enumerate().any(|(j, other)| {
                *i != j && other.len() < p.len() && p.starts_with(other.as_str()) && p.as_bytes()[other.len()] == b'.'
            })
        })
        .map(|(_, p)| p.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{BodyBuilder, TermBuilder};

    #[test]
    fn one_value_assignment_from_ground_ref() {
        let body = BodyBuilder::new()
            .call(TermBuilder::var("="), vec![TermBuilder::var("x"), TermBuilder::input_ref(&["foo"])])
            .build();
        let table = categorize(&body);
        assert_eq!(table.category("x"), Some(VarCategory::OneValue));
    }

    #[test]
    fn many_value_from_ref_index() {
        let body = BodyBuilder::new()
            .call(
                TermBuilder::var("="),
                vec![
                    TermBuilder::var("x"),
                    TermBuilder::reference(TermBuilder::var("input"), vec![TermBuilder::string("foo"), TermBuilder::var("_")]),
                ],
            )
            .build();
        let table = categorize(&body);
        assert_eq!(table.category("_"), Some(VarCategory::ManyValue));
        assert_eq!(table.prefix_of("_"), Some("input.foo"));
    }

    #[test]
    fn subsumption_drops_longer_nested_prefix() {
        let kept = subsume_prefixes(vec!["input.foo".to_string(), "input.foo.bar".to_string()]);
        assert_eq!(kept, vec!["input.foo".to_string()]);
    }

    #[test]
    fn subsumption_keeps_unrelated_prefixes() {
        let kept = subsume_prefixes(vec!["input.foo".to_string(), "input.bar".to_string()]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn comprehension_variables_are_missing() {
        let body = BodyBuilder::new()
            .expr(crate::ast::Term::new(
                crate::location::Location::synthetic(),
                crate::ast::Value::SetComprehension {
                    term: Box::new(TermBuilder::var("x")),
                    body: vec![],
                },
            ))
            .build();
        let table = categorize(&body);
        assert_eq!(table.category("x"), Some(VarCategory::Missing));
    }
}
