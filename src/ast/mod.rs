//! # Policy AST — Abstract Syntax Tree Types
//!
//! The typed, rewritten AST the planner consumes. Parsing, type checking, and
//! the compiler passes that rewrite terms into this canonical shape are all
//! external collaborators (spec §1) — this module only defines the shape the
//! planner reads.
//!
//! ## Builders
//!
//! For programmatic construction of AST nodes (the normal way to feed the
//! planner in tests, since there is no parser in this crate), see the
//! [`builders`] module, which provides fluent APIs like [`builders::TermBuilder`]
//! and [`builders::RuleBuilder`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::location::Location;

pub mod builders;

// ============================================================================
// Numbers
// ============================================================================

/// An AST number literal. The planner prefers `Int`, falls back to `Float`,
/// and finally to `Big` (an arbitrary-precision literal carried as its
/// original text) when the value fits neither (spec §9 "Numbers").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Number {
    Int(i64),
    Float(f64),
    /// Arbitrary-precision literal, stored as its canonical decimal text.
    Big(String),
}

impl Number {
    /// Parse a numeric literal the way a typed AST would already have it:
    /// prefer an exact `i64`, then an `f64`, then keep the text verbatim.
    pub fn parse(text: &str) -> Number {
        if let Ok(i) = text.parse::<i64>() {
            return Number::Int(i);
        }
        if let Ok(f) = text.parse::<f64>() {
            return Number::Float(f);
        }
        Number::Big(text.to_string())
    }
}

// ============================================================================
// Terms
// ============================================================================

/// A value with a source location — the unit the term planner lowers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub location: Location,
    pub value: Value,
}

impl Term {
    pub fn new(location: Location, value: Value) -> Self {
        Term { location, value }
    }

    /// A term is ground iff it contains no `Var` and no comprehension
    /// (comprehensions are never ground for the purposes of ref lowering,
    /// per spec §4.3.5, since their value depends on runtime iteration).
    pub fn is_ground(&self) -> bool {
        match &self.value {
            Value::Null | Value::Boolean(_) | Value::Number(_) | Value::String(_) => true,
            Value::Var(_) => false,
            Value::Ref(parts) => parts.iter().all(Term::is_ground),
            Value::Array(items) | Value::Set(items) => items.iter().all(Term::is_ground),
            Value::Object(pairs) => pairs.iter().all(|(k, v)| k.is_ground() && v.is_ground()),
            Value::Call { operator, operands } => {
                operator.is_ground() && operands.iter().all(Term::is_ground)
            }
            Value::ArrayComprehension { .. }
            | Value::SetComprehension { .. }
            | Value::ObjectComprehension { .. } => false,
        }
    }

    /// All variable names free in this term (used by unification and the
    /// complexity analyzer's variable walk). Comprehension bodies are opaque
    /// here on purpose — their free variables are a planner-internal concern
    /// of the comprehension lowering, not of the enclosing term.
    pub fn variables(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut HashSet<String>) {
        match &self.value {
            Value::Null | Value::Boolean(_) | Value::Number(_) | Value::String(_) => {}
            Value::Var(name) => {
                out.insert(name.clone());
            }
            Value::Ref(parts) => parts.iter().for_each(|t| t.collect_variables(out)),
            Value::Array(items) | Value::Set(items) => {
                items.iter().for_each(|t| t.collect_variables(out))
            }
            Value::Object(pairs) => pairs.iter().for_each(|(k, v)| {
                k.collect_variables(out);
                v.collect_variables(out);
            }),
            Value::Call { operator, operands } => {
                operator.collect_variables(out);
                operands.iter().for_each(|t| t.collect_variables(out));
            }
            Value::ArrayComprehension { .. }
            | Value::SetComprehension { .. }
            | Value::ObjectComprehension { .. } => {}
        }
    }

    /// Convenience constructor for a `Var` term at a given location.
    pub fn var(location: Location, name: impl Into<String>) -> Self {
        Term::new(location, Value::Var(name.into()))
    }

    /// Convenience constructor for a `String` term.
    pub fn string(location: Location, s: impl Into<String>) -> Self {
        Term::new(location, Value::String(s.into()))
    }

    /// Convenience constructor for an int-valued `Number` term.
    pub fn int(location: Location, v: i64) -> Self {
        Term::new(location, Value::Number(Number::Int(v)))
    }

    /// Convenience constructor for a `Boolean` term.
    pub fn bool_(v: bool) -> Self {
        Term::new(Location::synthetic(), Value::Boolean(v))
    }

    /// Build a `Ref` term out of a head variable and a sequence of path
    /// segment terms, e.g. `data`, `"foo"`, `"bar"` -> `data.foo.bar`.
    pub fn reference(location: Location, head: Term, mut segments: Vec<Term>) -> Self {
        let mut parts = vec![head];
        parts.append(&mut segments);
        Term::new(location, Value::Ref(parts))
    }
}

/// The value carried by a [`Term`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(Number),
    String(String),
    Var(String),
    /// A reference: head term followed by a sequence of path segment terms.
    /// `parts[0]` is the head (always a `Var` in well-formed input, e.g.
    /// `input` or `data` or a local variable); `parts[1..]` are path terms.
    Ref(Vec<Term>),
    Array(Vec<Term>),
    /// Key/value pairs; keys are unique by value (enforced by the compiler,
    /// not re-validated here).
    Object(Vec<(Term, Term)>),
    Set(Vec<Term>),
    Call {
        operator: Box<Term>,
        operands: Vec<Term>,
    },
    ArrayComprehension {
        term: Box<Term>,
        body: Body,
    },
    SetComprehension {
        term: Box<Term>,
        body: Body,
    },
    ObjectComprehension {
        key: Box<Term>,
        value: Box<Term>,
        body: Body,
    },
}

// ============================================================================
// Expressions and bodies
// ============================================================================

/// One `with target as replacement` modifier attached to an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct With {
    /// Always a `Ref` rooted at `input` or `data`.
    pub target: Term,
    pub value: Term,
}

/// The content of an [`Expr`]: either a bare term (tested for truthiness) or
/// a call (built-in comparison, user function, or other built-in).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprTerms {
    Term(Term),
    Call { operator: Term, operands: Vec<Term> },
}

/// One expression in a rule body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub location: Location,
    pub terms: ExprTerms,
    #[serde(default)]
    pub negated: bool,
    #[serde(default)]
    pub with: Vec<With>,
}

impl Expr {
    pub fn bare(location: Location, term: Term) -> Self {
        Expr {
            location,
            terms: ExprTerms::Term(term),
            negated: false,
            with: Vec::new(),
        }
    }

    pub fn call(location: Location, operator: Term, operands: Vec<Term>) -> Self {
        Expr {
            location,
            terms: ExprTerms::Call { operator, operands },
            negated: false,
            with: Vec::new(),
        }
    }

    pub fn negate(mut self) -> Self {
        self.negated = true;
        self
    }

    pub fn with_modifier(mut self, target: Term, value: Term) -> Self {
        self.with.push(With { target, value });
        self
    }

    /// Variables this expression references directly (not recursing into
    /// `with` replacement values, which are a separate concern).
    pub fn variables(&self) -> HashSet<String> {
        match &self.terms {
            ExprTerms::Term(t) => t.variables(),
            ExprTerms::Call { operator, operands } => {
                let mut vars = operator.variables();
                for o in operands {
                    vars.extend(o.variables());
                }
                vars
            }
        }
    }
}

/// An ordered sequence of expressions, planned in source order left to right
/// (spec §3.1: "strict left-to-right for planning purposes").
pub type Body = Vec<Expr>;

// ============================================================================
// Rules and modules
// ============================================================================

/// The derived kind of a rule, computed from its head shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleKind {
    /// Value, no key: `allow = true { ... }`.
    Complete,
    /// Key, no value: `names[x] { ... }`.
    PartialSet,
    /// Key and value: `tags[x] = y { ... }`.
    PartialObject,
    /// Arguments present: `f(x) = y { ... }`.
    Function,
}

/// A rule head. `path` is the full reference path this rule contributes to;
/// `args` is present only for functions; `key`/`value` follow from the rule
/// kind (spec §3.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Head {
    pub path: Term,
    #[serde(default)]
    pub args: Option<Vec<Term>>,
    #[serde(default)]
    pub key: Option<Term>,
    #[serde(default)]
    pub value: Option<Term>,
    pub location: Location,
}

impl Head {
    /// Derive the rule kind from which of `args`/`key`/`value` are present.
    pub fn kind(&self) -> RuleKind {
        if self.args.is_some() {
            RuleKind::Function
        } else if self.key.is_some() && self.value.is_some() {
            RuleKind::PartialObject
        } else if self.key.is_some() {
            RuleKind::PartialSet
        } else {
            RuleKind::Complete
        }
    }

    /// Number of function parameters (0 for non-function rules).
    pub fn arity(&self) -> usize {
        self.args.as_ref().map_or(0, Vec::len)
    }
}

/// A single rule, possibly the head of an else-chain. Else-chaining is
/// modeled as a linked list hanging off the first rule in the chain — not as
/// separate bucket entries — so the rule/module planner can emit a single
/// enclosing `Block` for the whole chain (spec §9 "Rule buckets and
/// else-chains").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub head: Head,
    pub body: Body,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub else_rule: Option<Box<Rule>>,
    pub location: Location,
}

impl Rule {
    pub fn new(head: Head, body: Body, location: Location) -> Self {
        Rule {
            head,
            body,
            default: false,
            else_rule: None,
            location,
        }
    }

    pub fn default_rule(mut self) -> Self {
        self.default = true;
        self
    }

    pub fn chain(mut self, else_rule: Rule) -> Self {
        self.else_rule = Some(Box::new(else_rule));
        self
    }

    /// Walk this rule and its else-chain in order.
    pub fn chain_iter(&self) -> ChainIter<'_> {
        ChainIter { next: Some(self) }
    }
}

pub struct ChainIter<'a> {
    next: Option<&'a Rule>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = &'a Rule;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = current.else_rule.as_deref();
        Some(current)
    }
}

/// A module: a package path plus the rules declared under it. Empty modules
/// still register their package path (spec §3.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub package: Term,
    pub rules: Vec<Rule>,
    pub location: Location,
}

impl Module {
    pub fn new(package: Term, rules: Vec<Rule>, location: Location) -> Self {
        Module {
            package,
            rules,
            location,
        }
    }
}

/// A named, top-level query set: one or more bodies, tried in order, whose
/// results are unioned (spec §4.5 "Disjunction between queries").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySet {
    pub name: String,
    pub bodies: Vec<Body>,
}

impl QuerySet {
    pub fn new(name: impl Into<String>, bodies: Vec<Body>) -> Self {
        QuerySet {
            name: name.into(),
            bodies,
        }
    }

    /// All free variables across every body in this query set — non-wildcard,
    /// non-generated names are what the preamble pre-allocates strings for
    /// (spec §4.5).
    pub fn variables(&self) -> HashSet<String> {
        let mut vars = HashSet::new();
        for body in &self.bodies {
            for expr in body {
                vars.extend(expr.variables());
            }
        }
        vars
    }
}
