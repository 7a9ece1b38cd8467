//! End-to-end planning of representative queries and rule sets: the
//! planner's public surface (`PlanInput`/`Planner`) down to the shape of the
//! resulting `Policy`, rather than any one internal lowering step.

use policy_planner::ast::builders::{BodyBuilder, ModuleBuilder, RuleBuilder, TermBuilder};
use policy_planner::ast::{QuerySet, Term, Value};
use policy_planner::ir::Stmt;
use policy_planner::location::Location;
use policy_planner::planner::{PlanInput, Planner};

fn plan(modules: Vec<policy_planner::ast::Module>, queries: Vec<QuerySet>) -> policy_planner::ir::Policy {
    let planner = Planner::new(PlanInput::new(queries, modules)).expect("planner construction");
    planner.plan().expect("planning")
}

/// `q0 { x = 1 }` with no rules at all: the simplest possible query, still
/// produces a preamble + one disjunct block + a trailing return.
#[test]
fn bare_equality_query_plans_to_one_disjunct() {
    let body = BodyBuilder::new().call(TermBuilder::var("="), vec![TermBuilder::var("x"), TermBuilder::int(1)]).build();
    let policy = plan(vec![], vec![QuerySet::new("q0", vec![body])]);

    assert!(policy.funcs.is_empty());
    assert_eq!(policy.plans.len(), 1);
    let plan = &policy.plans[0];
    assert_eq!(plan.name, "q0");
    assert_eq!(plan.blocks.len(), 3, "preamble, one disjunct, trailing return");
}

/// `package authz { allow = true { input.role == "admin" } }`, queried as
/// `x = data.authz.allow`: the rule bucket becomes one `Func`, and the query
/// dispatches into it via a `Call`.
#[test]
fn rule_dispatch_emits_call_into_planned_function() {
    let rule = RuleBuilder::new("allow")
        .value(TermBuilder::bool_(true))
        .body_call(TermBuilder::var("=="), vec![TermBuilder::input_ref(&["role"]), TermBuilder::string("admin")])
        .build();
    let module = ModuleBuilder::new("authz").rule(rule).build();

    let query_body = BodyBuilder::new()
        .call(TermBuilder::var("="), vec![TermBuilder::var("x"), TermBuilder::data_ref(&["authz", "allow"])])
        .build();
    let policy = plan(vec![module], vec![QuerySet::new("q0", vec![query_body])]);

    assert!(policy.funcs.contains_key("data.authz.allow"));
    let func = &policy.funcs["data.authz.allow"];
    assert_eq!(func.params.len(), 2, "input and data only, no extra args");

    let query_plan = &policy.plans[0];
    let has_call = query_plan.blocks.iter().flatten().any(|s| matches!(&s.stmt, Stmt::Call { func, .. } if func == "data.authz.allow"));
    assert!(has_call, "expected the query to dispatch into data.authz.allow");
}

/// Several partial-set rules at the same path fold into one function whose
/// body is a single `Block` of alternatives, each contributing to one
/// shared set via `SetAdd`.
#[test]
fn partial_set_alternatives_share_one_function() {
    let rules = vec![
        RuleBuilder::new("roles").key(TermBuilder::string("admin")).build(),
        RuleBuilder::new("roles").key(TermBuilder::string("viewer")).build(),
    ];
    let module = ModuleBuilder::new("authz").rules(rules).build();
    let query_body = BodyBuilder::new()
        .call(TermBuilder::var("="), vec![TermBuilder::var("x"), TermBuilder::data_ref(&["authz", "roles"])])
        .build();
    let policy = plan(vec![module], vec![QuerySet::new("q0", vec![query_body])]);

    let func = &policy.funcs["data.authz.roles"];
    assert!(matches!(func.blocks[0][0].stmt, Stmt::MakeSet { .. }), "seeded with an empty set");
    let has_set_add_block = func.blocks.iter().any(|b| b.iter().any(|s| matches!(s.stmt, Stmt::SetAdd { .. })));
    assert!(has_set_add_block);
}

/// A bare `data.pkg` reference (no further path) builds an object merging
/// every rule in `pkg` — the "full extent" case of the virtual+base hybrid.
#[test]
fn bare_package_reference_builds_extent_object() {
    let rule = RuleBuilder::new("p").value(TermBuilder::int(1)).build();
    let module = ModuleBuilder::new("pkg").rule(rule).build();

    let data_ref = Term::new(Location::synthetic(), Value::Ref(vec![TermBuilder::var("data"), TermBuilder::string("pkg")]));
    let query_body = BodyBuilder::new().call(TermBuilder::var("="), vec![TermBuilder::var("x"), data_ref]).build();
    let policy = plan(vec![module], vec![QuerySet::new("q0", vec![query_body])]);

    let query_plan = &policy.plans[0];
    let has_make_object = query_plan.blocks.iter().flatten().any(|s| matches!(s.stmt, Stmt::MakeObject { .. }));
    assert!(has_make_object);
}

/// A `data.<pkg>.<rule>` reference used *inside another rule's body* (the
/// compiler rewrites in-package rule references to this fully-qualified
/// form before planning, spec §1) must dispatch into the sibling rule's
/// planned function exactly as it would from a top-level query — the
/// rule-function scope frame's `data -> data_param` shadow must not be
/// mistaken for a `with data as ...` rebind that would suppress virtual
/// resolution (spec §4.4, §9 "Global root documents").
#[test]
fn inter_rule_data_reference_inside_rule_body_dispatches_via_call() {
    let violations = RuleBuilder::new("violations").key(TermBuilder::string("bad")).build();
    let deny_body = BodyBuilder::new()
        .expr(TermBuilder::reference(
            TermBuilder::var("data"),
            vec![TermBuilder::string("authz"), TermBuilder::string("violations"), TermBuilder::var("m")],
        ))
        .build();
    let deny = RuleBuilder::new("deny").key(TermBuilder::var("m")).body(deny_body).build();
    let module = ModuleBuilder::new("authz").rules(vec![violations, deny]).build();

    let policy = plan(vec![module], vec![]);

    assert!(policy.funcs.contains_key("data.authz.violations"));
    let deny_func = &policy.funcs["data.authz.deny"];
    let has_call = deny_func
        .blocks
        .iter()
        .flatten()
        .any(|s| matches!(&s.stmt, Stmt::Call { func, .. } if func == "data.authz.violations"));
    assert!(
        has_call,
        "expected deny's body to dispatch into the sibling violations function via Call, not scan the raw base document"
    );
}

/// Planning is single-use: `Planner::plan` takes `self` by value, so a
/// planner cannot be invoked twice — this is a compile-time guarantee, not a
/// runtime check, demonstrated here by simply building a fresh planner per
/// plan rather than attempting (and failing) to call `plan` again.
#[test]
fn planner_is_rebuilt_per_plan_call() {
    let queries = || vec![QuerySet::new("q0", vec![BodyBuilder::new().expr(TermBuilder::bool_(true)).build()])];
    let first = plan(vec![], queries());
    let second = plan(vec![], queries());
    assert_eq!(first.plans[0].name, second.plans[0].name);
}
