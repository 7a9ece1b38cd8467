//! The documented runtime-complexity scenarios, exercised through the
//! public `Analyzer` API rather than as internal unit tests.

use policy_planner::ast::builders::{BodyBuilder, ModuleBuilder, RuleBuilder, TermBuilder};
use policy_planner::complexity::Analyzer;

fn analyzer(modules: Vec<policy_planner::ast::Module>) -> Analyzer {
    Analyzer::new(&modules).expect("analyzer construction")
}

/// A body with no ref-bearing expression at all costs `O(1)`.
#[test]
fn constant_body_costs_o1() {
    let body = BodyBuilder::new().call(TermBuilder::var(":="), vec![TermBuilder::var("x"), TermBuilder::int(1)]).build();
    let report = analyzer(vec![]).calculate("q0", &body);
    assert_eq!(report.results.complexity.to_string(), "O(1)");
    assert!(report.results.missing.is_empty());
}

/// One iterating reference costs `O(<prefix>)`.
#[test]
fn single_iterating_ref_costs_its_prefix() {
    let body = BodyBuilder::new()
        .call(
            TermBuilder::var(":="),
            vec![
                TermBuilder::var("x"),
                TermBuilder::reference(TermBuilder::var("input"), vec![TermBuilder::string("users"), TermBuilder::var("_")]),
            ],
        )
        .build();
    let report = analyzer(vec![]).calculate("q0", &body);
    assert_eq!(report.results.complexity.to_string(), "O(input.users)");
}

/// Two independent iterating references in the same body multiply.
#[test]
fn two_independent_iterating_refs_multiply() {
    let body = BodyBuilder::new()
        .call(
            TermBuilder::var(":="),
            vec![
                TermBuilder::var("x"),
                TermBuilder::reference(TermBuilder::var("input"), vec![TermBuilder::string("users"), TermBuilder::var("_")]),
            ],
        )
        .call(
            TermBuilder::var(":="),
            vec![
                TermBuilder::var("y"),
                TermBuilder::reference(TermBuilder::var("input"), vec![TermBuilder::string("groups"), TermBuilder::var("_")]),
            ],
        )
        .build();
    let report = analyzer(vec![]).calculate("q0", &body);
    assert_eq!(report.results.complexity.to_string(), "O(input.users * input.groups)");
}

/// A nested iterating reference under an already-charged prefix does not
/// double-count: the coarser (shorter) prefix subsumes the nested one.
#[test]
fn nested_ref_under_same_prefix_is_subsumed() {
    let nested_ref = TermBuilder::reference(
        TermBuilder::var("input"),
        vec![
            TermBuilder::string("users"),
            TermBuilder::var("i"),
            TermBuilder::string("roles"),
            TermBuilder::var("j"),
        ],
    );
    let body = BodyBuilder::new().call(TermBuilder::var(":="), vec![TermBuilder::var("x"), nested_ref]).build();
    let report = analyzer(vec![]).calculate("q0", &body);
    assert_eq!(report.results.complexity.to_string(), "O(input.users)");
}

/// Calling a user rule substitutes the callee's own symbolic cost into the
/// caller's, through `data.<pkg>.<rule>` resolution.
#[test]
fn calling_a_rule_substitutes_its_cost() {
    let callee_body = BodyBuilder::new()
        .call(
            TermBuilder::var(":="),
            vec![
                TermBuilder::var("u"),
                TermBuilder::reference(TermBuilder::var("input"), vec![TermBuilder::string("users"), TermBuilder::var("_")]),
            ],
        )
        .build();
    let rule = RuleBuilder::new("active_users").body(callee_body).value(TermBuilder::var("u")).build();
    let module = ModuleBuilder::new("authz").rule(rule).build();

    let caller_body = BodyBuilder::new().expr(TermBuilder::data_ref(&["authz", "active_users"])).build();
    let report = analyzer(vec![module]).calculate("q0", &caller_body);
    assert_eq!(report.results.complexity.to_string(), "O(input.users)");
}

/// A query mixing a ref-bearing expression with a comprehension reports the
/// comprehension as missing but still prices the rest of the body.
#[test]
fn mixed_body_prices_ref_and_reports_comprehension_missing() {
    let comprehension = policy_planner::ast::Term::new(
        policy_planner::location::Location::synthetic(),
        policy_planner::ast::Value::SetComprehension { term: Box::new(TermBuilder::var("y")), body: vec![] },
    );
    let body = BodyBuilder::new()
        .call(
            TermBuilder::var(":="),
            vec![
                TermBuilder::var("x"),
                TermBuilder::reference(TermBuilder::var("input"), vec![TermBuilder::string("users"), TermBuilder::var("_")]),
            ],
        )
        .expr(comprehension)
        .build();
    let report = analyzer(vec![]).calculate("q0", &body);
    assert_eq!(report.results.complexity.to_string(), "O(input.users)");
    assert_eq!(report.results.missing.len(), 1);
}

/// The report serializes to the documented JSON shape: a `results` wrapper
/// carrying `query`/`expressions`/`missing`/`complexity`.
#[test]
fn report_serializes_with_results_wrapper() {
    let body = BodyBuilder::new().call(TermBuilder::var(":="), vec![TermBuilder::var("x"), TermBuilder::int(1)]).build();
    let report = analyzer(vec![]).calculate("q0", &body);
    let json = serde_json::to_value(&report).unwrap();
    assert!(json.get("results").is_some());
    assert_eq!(json["results"]["query"], "q0");
    assert_eq!(json["results"]["complexity"], serde_json::json!({"product": []}));
}
