//! Builder Patterns for AST Construction
//!
//! Fluent APIs for constructing AST nodes, used heavily in tests since this
//! crate has no parser (spec §1: parsing is an external collaborator).
//!
//! ## Example
//!
//! ```ignore
//! use policy_planner::ast::builders::{TermBuilder, RuleBuilder};
//!
//! // allow = true { input.method == "GET" }
//! let rule = RuleBuilder::new("allow")
//!     .value(TermBuilder::bool_(true))
//!     .body_expr(TermBuilder::var("x"))
//!     .build();
//! ```

use crate::location::Location;

use super::{Body, Expr, Head, Module, Number, Rule, Term, Value, With};

fn synthetic() -> Location {
    Location::synthetic()
}

/// Fluent constructors for [`Term`]s. Every term built this way carries a
/// synthetic location — tests that care about real locations should build
/// `Term`s directly instead.
#[derive(Debug, Clone, Default)]
pub struct TermBuilder;

impl TermBuilder {
    pub fn var(name: impl Into<String>) -> Term {
        Term::new(synthetic(), Value::Var(name.into()))
    }

    pub fn string(s: impl Into<String>) -> Term {
        Term::new(synthetic(), Value::String(s.into()))
    }

    pub fn int(v: i64) -> Term {
        Term::new(synthetic(), Value::Number(Number::Int(v)))
    }

    pub fn float(v: f64) -> Term {
        Term::new(synthetic(), Value::Number(Number::Float(v)))
    }

    pub fn bool_(v: bool) -> Term {
        Term::new(synthetic(), Value::Boolean(v))
    }

    pub fn null() -> Term {
        Term::new(synthetic(), Value::Null)
    }

    pub fn array(items: Vec<Term>) -> Term {
        Term::new(synthetic(), Value::Array(items))
    }

    pub fn set(items: Vec<Term>) -> Term {
        Term::new(synthetic(), Value::Set(items))
    }

    pub fn object(pairs: Vec<(Term, Term)>) -> Term {
        Term::new(synthetic(), Value::Object(pairs))
    }

    pub fn call(operator: Term, operands: Vec<Term>) -> Term {
        Term::new(
            synthetic(),
            Value::Call {
                operator: Box::new(operator),
                operands,
            },
        )
    }

    /// `data`, `"foo"`, `"bar"` -> `data.foo.bar`
    pub fn reference(head: Term, segments: Vec<Term>) -> Term {
        Term::reference(synthetic(), head, segments)
    }

    /// Shorthand for a reference rooted at `input`.
    pub fn input_ref(segments: &[&str]) -> Term {
        Term::reference(
            synthetic(),
            Self::var("input"),
            segments.iter().map(|s| Self::string(*s)).collect(),
        )
    }

    /// Shorthand for a reference rooted at `data`.
    pub fn data_ref(segments: &[&str]) -> Term {
        Term::reference(
            synthetic(),
            Self::var("data"),
            segments.iter().map(|s| Self::string(*s)).collect(),
        )
    }
}

/// Fluent builder for rule bodies ([`Body`] = `Vec<Expr>`).
#[derive(Debug, Clone, Default)]
pub struct BodyBuilder {
    exprs: Vec<Expr>,
}

impl BodyBuilder {
    pub fn new() -> Self {
        BodyBuilder::default()
    }

    pub fn expr(mut self, term: Term) -> Self {
        self.exprs.push(Expr::bare(synthetic(), term));
        self
    }

    pub fn negated_expr(mut self, term: Term) -> Self {
        self.exprs.push(Expr::bare(synthetic(), term).negate());
        self
    }

    pub fn call(mut self, operator: Term, operands: Vec<Term>) -> Self {
        self.exprs.push(Expr::call(synthetic(), operator, operands));
        self
    }

    pub fn with(mut self, target: Term, value: Term) -> Self {
        if let Some(last) = self.exprs.last_mut() {
            last.with.push(With { target, value });
        }
        self
    }

    pub fn build(self) -> Body {
        self.exprs
    }
}

/// Fluent builder for [`Rule`]s.
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    name: String,
    args: Option<Vec<Term>>,
    key: Option<Term>,
    value: Option<Term>,
    body: Body,
    default: bool,
}

impl RuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        RuleBuilder {
            name: name.into(),
            args: None,
            key: None,
            value: None,
            body: Vec::new(),
            default: false,
        }
    }

    pub fn args(mut self, args: Vec<Term>) -> Self {
        self.args = Some(args);
        self
    }

    pub fn key(mut self, key: Term) -> Self {
        self.key = Some(key);
        self
    }

    pub fn value(mut self, value: Term) -> Self {
        self.value = Some(value);
        self
    }

    pub fn body_expr(mut self, term: Term) -> Self {
        self.body.push(Expr::bare(synthetic(), term));
        self
    }

    pub fn body_call(mut self, operator: Term, operands: Vec<Term>) -> Self {
        self.body.push(Expr::call(synthetic(), operator, operands));
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn default_rule(mut self) -> Self {
        self.default = true;
        self
    }

    pub fn build(self) -> Rule {
        let head = Head {
            path: TermBuilder::var(self.name),
            args: self.args,
            key: self.key,
            value: self.value,
            location: synthetic(),
        };
        let mut rule = Rule::new(head, self.body, synthetic());
        if self.default {
            rule = rule.default_rule();
        }
        rule
    }
}

/// Fluent builder for [`Module`]s.
#[derive(Debug, Clone, Default)]
pub struct ModuleBuilder {
    package: Vec<String>,
    rules: Vec<Rule>,
}

impl ModuleBuilder {
    pub fn new(package: impl Into<String>) -> Self {
        ModuleBuilder {
            package: vec![package.into()],
            rules: Vec::new(),
        }
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn build(self) -> Module {
        let segments: Vec<Term> = self
            .package
            .iter()
            .map(|s| TermBuilder::string(s.clone()))
            .collect();
        let package = TermBuilder::reference(TermBuilder::var("data"), segments);
        Module::new(package, self.rules, synthetic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::RuleKind;

    #[test]
    fn builds_complete_rule() {
        let rule = RuleBuilder::new("allow").value(TermBuilder::bool_(true)).build();
        assert_eq!(rule.head.kind(), RuleKind::Complete);
    }

    #[test]
    fn builds_function_rule_with_body() {
        let rule = RuleBuilder::new("f")
            .args(vec![TermBuilder::var("x")])
            .value(TermBuilder::var("x"))
            .body_expr(TermBuilder::var("x"))
            .build();
        assert_eq!(rule.head.kind(), RuleKind::Function);
        assert_eq!(rule.body.len(), 1);
    }

    #[test]
    fn builds_module_with_package_path() {
        let module = ModuleBuilder::new("example")
            .rule(RuleBuilder::new("allow").value(TermBuilder::bool_(true)).build())
            .build();
        assert_eq!(module.rules.len(), 1);
    }

    #[test]
    fn body_builder_chains_exprs() {
        let body = BodyBuilder::new()
            .expr(TermBuilder::var("x"))
            .negated_expr(TermBuilder::var("y"))
            .build();
        assert_eq!(body.len(), 2);
        assert!(body[1].negated);
    }
}
