//! Runtime-complexity analyzer (component H, spec §4.6).
//!
//! Given a compiled module set and a query body, [`Analyzer::calculate`]
//! produces a [`Report`]: a symbolic cost expression in terms of the ground
//! prefixes of base-document references, plus the list of expressions whose
//! cost could not be determined (comprehensions, `walk`). The analyzer is a
//! read-only pass over the same AST the planner consumes — it does not share
//! state with a [`Planner`](crate::planner::Planner) and can run before,
//! after, or independently of planning.
//!
//! Submodules:
//! - [`time`]: the symbolic cost-expression tree (`TimeNode`) and its
//!   `O(...)` rendering.
//! - [`vars`]: variable categorization and ground-prefix extraction (spec
//!   §4.6 "Variable categorization").

mod time;
mod vars;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::{Body, Expr, ExprTerms, Module, Term, Value};
use crate::trie::{Key, RuleBucket, TrieNode};

pub use time::TimeNode;

/// A completed complexity report, shaped to serialize exactly per spec
/// §6.4's JSON schema (the `results` wrapper is part of that schema, not an
/// implementation artifact).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub results: ReportBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportBody {
    pub query: String,
    pub expressions: Vec<TimeNode>,
    pub missing: Vec<String>,
    pub complexity: TimeNode,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "query: {}", self.results.query)?;
        writeln!(f, "complexity: {}", self.results.complexity)?;
        if !self.results.missing.is_empty() {
            writeln!(f, "missing:")?;
            for m in &self.results.missing {
                writeln!(f, "  - {m}")?;
            }
        }
        Ok(())
    }
}

/// Analyzes rule bodies and query bodies against a fixed module set,
/// memoizing each rule bucket's own symbolic cost (spec §4.6 "Inter-rule
/// substitution").
///
/// Unlike [`Planner`](crate::planner::Planner), an `Analyzer` is reusable:
/// [`calculate`](Analyzer::calculate) takes `&self` and may be called once
/// per query.
pub struct Analyzer {
    buckets: HashMap<String, RuleBucket>,
    cache: RefCell<HashMap<String, TimeNode>>,
}

impl Analyzer {
    /// Build an analyzer over `modules`, indexing every non-empty rule
    /// bucket by its dotted `data.`-rooted path (spec §6.2's function-name
    /// convention, reused here as the substitution key of §4.6).
    pub fn new(modules: &[Module]) -> crate::error::PlanResult<Self> {
        let mut trie = TrieNode::new();
        for module in modules {
            let package_path = crate::planner::ref_tail_keys(&module.package)?;
            trie.register_package(&package_path);
            for rule in &module.rules {
                let mut full_path = package_path.clone();
                full_path.extend(crate::planner::term_key_path(&rule.head.path)?);
                trie.insert(&full_path, rule.clone());
            }
        }

        let mut buckets = HashMap::new();
        collect_buckets(&trie, &mut Vec::new(), &mut buckets);
        Ok(Analyzer {
            buckets,
            cache: RefCell::new(HashMap::new()),
        })
    }

    /// Analyze one query body, producing its [`Report`] (spec §6.4).
    pub fn calculate(&self, query: impl Into<String>, body: &Body) -> Report {
        let mut visiting = HashSet::new();
        let (complexity, expressions, missing) = self.analyze_body(body, &mut visiting);
        Report {
            results: ReportBody {
                query: query.into(),
                expressions,
                missing,
                complexity,
            },
        }
    }

    /// Right-to-left body composition (spec §4.6 "Body composition"):
    /// multiply the accumulator by each expression's cost in reverse source
    /// order, which both charges a many-value var's prefix once (at the
    /// expression introducing it, tracked via `charged`) and preserves
    /// left-to-right display order in the resulting product.
    fn analyze_body(&self, body: &Body, visiting: &mut HashSet<String>) -> (TimeNode, Vec<TimeNode>, Vec<String>) {
        let table = vars::categorize(body);
        let mut charged = HashSet::new();
        let mut missing = Vec::new();
        let mut per_expr = Vec::with_capacity(body.len());
        let mut acc = TimeNode::one();

        for expr in body.iter().rev() {
            let (cost, reason) = self.expr_cost(expr, &table, &mut charged, visiting);
            if let Some(reason) = reason {
                missing.push(format!("{}: {reason}", expr.location));
            }
            acc = TimeNode::multiply_prepend(cost.clone(), acc);
            per_expr.push(cost);
        }
        per_expr.reverse();
        missing.reverse();
        (acc, per_expr, missing)
    }

    /// Per-expression complexity (spec §4.6 "Per-expression complexity").
    fn expr_cost(
        &self,
        expr: &Expr,
        table: &vars::VarTable,
        charged: &mut HashSet<String>,
        visiting: &mut HashSet<String>,
    ) -> (TimeNode, Option<&'static str>) {
        if let Some(reason) = vars::missing_reason(expr) {
            return (TimeNode::one(), Some(reason));
        }

        let cost = match &expr.terms {
            ExprTerms::Term(t) => self.term_cost(t, table, charged, visiting),
            ExprTerms::Call { operator, operands } => {
                if vars::is_assign_operator(operator) {
                    let mut acc = TimeNode::one();
                    for operand in operands {
                        acc = TimeNode::multiply_prepend(self.term_cost(operand, table, charged, visiting), acc);
                    }
                    acc
                } else if let Some(name) = resolve_user_rule_name(operator) {
                    self.call_cost(&name, operands, table, charged, visiting)
                } else {
                    // Any other builtin call (comparisons, `count`, ...):
                    // O(1), per spec's literal reading of "Builtin call
                    // (other than walk): O(1)".
                    TimeNode::one()
                }
            }
        };
        (cost, None)
    }

    /// The cost contribution of a single term: a rule substitution if it
    /// names a virtual `data.`-rooted rule path, the product of
    /// subsumption-deduplicated `O(ref-prefix)` terms if it is an ordinary
    /// ref, or `O(1)` for a ground/bound value (spec §4.6 "Ref-bearing
    /// expression", "Prefix subsumption").
    fn term_cost(&self, term: &Term, table: &vars::VarTable, charged: &mut HashSet<String>, visiting: &mut HashSet<String>) -> TimeNode {
        match &term.value {
            Value::Ref(parts) => {
                if let Some(dotted) = fully_ground_data_path(parts) {
                    if self.buckets.contains_key(&dotted) {
                        return self.rule_cost(&dotted, visiting);
                    }
                }
                let introduced = vars::subsume_prefixes(vars::newly_introduced_prefixes(term, table, charged));
                if introduced.is_empty() {
                    TimeNode::one()
                } else {
                    TimeNode::Product(introduced.into_iter().map(TimeNode::prefix).collect())
                }
            }
            Value::Call { operator, operands } => {
                if let Some(name) = resolve_user_rule_name(operator) {
                    self.call_cost(&name, operands, table, charged, visiting)
                } else {
                    TimeNode::one()
                }
            }
            Value::Array(items) | Value::Set(items) => {
                let mut acc = TimeNode::one();
                for item in items {
                    acc = TimeNode::multiply_prepend(self.term_cost(item, table, charged, visiting), acc);
                }
                acc
            }
            Value::Object(pairs) => {
                let mut acc = TimeNode::one();
                for (k, v) in pairs {
                    acc = TimeNode::multiply_prepend(self.term_cost(k, table, charged, visiting), acc);
                    acc = TimeNode::multiply_prepend(self.term_cost(v, table, charged, visiting), acc);
                }
                acc
            }
            Value::Null | Value::Boolean(_) | Value::Number(_) | Value::String(_) | Value::Var(_) => TimeNode::one(),
            Value::ArrayComprehension { .. } | Value::SetComprehension { .. } | Value::ObjectComprehension { .. } => TimeNode::one(),
        }
    }

    /// Cost of a call to a resolvable virtual rule path, substituting the
    /// callee's own symbolic cost and multiplying in each argument's cost
    /// (spec §4.6 "Inter-rule substitution").
    ///
    /// The spec leaves open exactly how an argument's position substitutes
    /// into the callee's own ref-prefixes when the callee's cost depends on
    /// the shape of that argument (§9, second open question). This
    /// implementation takes the simpler of the two documented choices:
    /// treat the callee's cost as opaque and multiply in the caller-side
    /// cost of each argument independently, rather than rewriting prefixes
    /// inside the callee's tree by argument position. See DESIGN.md.
    fn call_cost(&self, name: &str, operands: &[Term], table: &vars::VarTable, charged: &mut HashSet<String>, visiting: &mut HashSet<String>) -> TimeNode {
        let mut acc = self.rule_cost(name, visiting);
        for operand in operands {
            acc = TimeNode::multiply_prepend(self.term_cost(operand, table, charged, visiting), acc);
        }
        acc
    }

    /// The symbolic cost of the rule bucket named `name`, memoized, with
    /// cycle detection (spec §9 "Cyclic references among rules"): a
    /// self-referential chain yields a placeholder `O(<name>)` instead of a
    /// guessed transitive cost.
    fn rule_cost(&self, name: &str, visiting: &mut HashSet<String>) -> TimeNode {
        if let Some(cached) = self.cache.borrow().get(name) {
            return cached.clone();
        }
        if !visiting.insert(name.to_string()) {
            return TimeNode::prefix(format!("<{name}>"));
        }

        let cost = match self.buckets.get(name) {
            Some(bucket) => {
                let mut acc = TimeNode::one();
                for rule in &bucket.rules {
                    for chained in rule.chain_iter() {
                        let (c, _, _) = self.analyze_body(&chained.body, visiting);
                        acc = TimeNode::add_prepend(c, acc);
                    }
                }
                acc
            }
            None => TimeNode::one(),
        };

        visiting.remove(name);
        self.cache.borrow_mut().insert(name.to_string(), cost.clone());
        cost
    }
}

fn collect_buckets(node: &TrieNode, prefix: &mut Vec<Key>, out: &mut HashMap<String, RuleBucket>) {
    if let Some(bucket) = &node.bucket {
        if !bucket.rules.is_empty() {
            out.insert(crate::planner::path_label(prefix), bucket.clone());
        }
    }
    for (key, child) in node.children() {
        prefix.push(key.clone());
        collect_buckets(child, prefix, out);
        prefix.pop();
    }
}

/// If `operator` is a fully-ground `data.`-rooted ref, its dotted textual
/// form (e.g. `data.test.p`) — a candidate virtual-rule substitution target.
fn resolve_user_rule_name(operator: &Term) -> Option<String> {
    match &operator.value {
        Value::Ref(parts) => fully_ground_data_path(parts),
        _ => None,
    }
}

fn fully_ground_data_path(parts: &[Term]) -> Option<String> {
    let head = parts.first()?;
    if !matches!(&head.value, Value::Var(name) if name == "data") {
        return None;
    }
    let mut out = String::from("data");
    for segment in &parts[1..] {
        match &segment.value {
            Value::String(s) => {
                out.push('.');
                out.push_str(s);
            }
            Value::Number(crate::ast::Number::Int(i)) => {
                out.push('.');
                out.push_str(&i.to_string());
            }
            _ => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{BodyBuilder, ModuleBuilder, RuleBuilder, TermBuilder};

    fn analyzer(modules: Vec<Module>) -> Analyzer {
        Analyzer::new(&modules).unwrap()
    }

    #[test]
    fn scenario_a_ground_ref_is_constant() {
        let body = BodyBuilder::new()
            .call(TermBuilder::var(":="), vec![TermBuilder::var("x"), TermBuilder::input_ref(&["foo"])])
            .build();
        let report = analyzer(vec![]).calculate("p", &body);
        assert_eq!(report.results.complexity.to_string(), "O(1)");
        assert!(report.results.missing.is_empty());
    }

    #[test]
    fn scenario_b_single_many_value_ref() {
        let body = BodyBuilder::new()
            .call(
                TermBuilder::var(":="),
                vec![
                    TermBuilder::var("x"),
                    TermBuilder::reference(TermBuilder::var("input"), vec![TermBuilder::string("foo"), TermBuilder::var("_")]),
                ],
            )
            .build();
        let report = analyzer(vec![]).calculate("p", &body);
        assert_eq!(report.results.complexity.to_string(), "O(input.foo)");
    }

    #[test]
    fn scenario_c_two_many_value_refs_multiply() {
        let body = BodyBuilder::new()
            .call(
                TermBuilder::var(":="),
                vec![
                    TermBuilder::var("x"),
                    TermBuilder::reference(TermBuilder::var("input"), vec![TermBuilder::string("foo"), TermBuilder::var("_")]),
                ],
            )
            .call(
                TermBuilder::var(":="),
                vec![
                    TermBuilder::var("y"),
                    TermBuilder::reference(TermBuilder::var("input"), vec![TermBuilder::string("bar"), TermBuilder::var("_")]),
                ],
            )
            .build();
        let report = analyzer(vec![]).calculate("p", &body);
        assert_eq!(report.results.complexity.to_string(), "O(input.foo * input.bar)");
    }

    #[test]
    fn scenario_d_prefix_subsumption() {
        let nested_ref = TermBuilder::reference(
            TermBuilder::var("input"),
            vec![
                TermBuilder::string("foo"),
                TermBuilder::var("y"),
                TermBuilder::string("bar"),
                TermBuilder::var("z"),
            ],
        );
        let body = BodyBuilder::new().call(TermBuilder::var(":="), vec![TermBuilder::var("x"), nested_ref]).build();
        let report = analyzer(vec![]).calculate("p", &body);
        assert_eq!(report.results.complexity.to_string(), "O(input.foo)");
    }

    #[test]
    fn comprehension_is_reported_missing() {
        let body = BodyBuilder::new()
            .expr(crate::ast::Term::new(
                crate::location::Location::synthetic(),
                crate::ast::Value::SetComprehension {
                    term: Box::new(TermBuilder::var("x")),
                    body: vec![],
                },
            ))
            .build();
        let report = analyzer(vec![]).calculate("p", &body);
        assert_eq!(report.results.missing.len(), 1);
        assert_eq!(report.results.complexity.to_string(), "O(1)");
    }

    #[test]
    fn rule_reference_substitutes_callee_cost() {
        let callee_body = BodyBuilder::new()
            .call(
                TermBuilder::var(":="),
                vec![
                    TermBuilder::var("x"),
                    TermBuilder::reference(TermBuilder::var("input"), vec![TermBuilder::string("foo"), TermBuilder::var("_")]),
                ],
            )
            .build();
        let module = ModuleBuilder::new("test").rule(RuleBuilder::new("p").body(callee_body).value(TermBuilder::var("x")).build()).build();

        let caller_body = BodyBuilder::new().expr(TermBuilder::data_ref(&["test", "p"])).build();
        let report = analyzer(vec![module]).calculate("q", &caller_body);
        assert_eq!(report.results.complexity.to_string(), "O(input.foo)");
    }

    #[test]
    fn self_referential_rule_yields_placeholder() {
        let cyclic_body = BodyBuilder::new().expr(TermBuilder::data_ref(&["test", "p"])).build();
        let module = ModuleBuilder::new("test").rule(RuleBuilder::new("p").body(cyclic_body).value(TermBuilder::int(1)).build()).build();

        let analyzer = Analyzer::new(&[module]).unwrap();
        let cost = analyzer.rule_cost("data.test.p", &mut HashSet::new());
        assert_eq!(cost.to_string(), "O(<data.test.p>)");
    }
}
