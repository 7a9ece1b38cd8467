//! Planning and complexity-analysis benchmarks over synthetically sized
//! rule sets (no parser in this crate, so every fixture is built with
//! `ast::builders`).

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use policy_planner::ast::builders::{BodyBuilder, ModuleBuilder, RuleBuilder, TermBuilder};
use policy_planner::ast::{Module, QuerySet};
use policy_planner::complexity::Analyzer;
use policy_planner::planner::{PlanInput, Planner};

/// `package authz { allow_0 = true { input.role == "0" } ... allow_{n-1} }`:
/// `n` independent complete rules, each guarded by an equality test against
/// `input.role`, so the planner builds `n` single-block functions with no
/// shared structure to amortize.
fn wide_rule_set(n: u32) -> Module {
    let rules: Vec<_> = (0..n)
        .map(|i| {
            RuleBuilder::new(format!("allow_{i}"))
                .value(TermBuilder::bool_(true))
                .body_call(
                    TermBuilder::var("=="),
                    vec![TermBuilder::input_ref(&["role"]), TermBuilder::string(i.to_string())],
                )
                .build()
        })
        .collect();
    ModuleBuilder::new("authz").rules(rules).build()
}

/// `n` partial-set rules at the *same* path, `roles[r] { r == "0"; ... }`:
/// one bucket of `n` alternatives the planner must fold into a single
/// function body, rather than `n` separate functions as in
/// [`wide_rule_set`].
fn partial_set_alternatives(n: u32) -> Module {
    let rules: Vec<_> = (0..n)
        .map(|i| {
            RuleBuilder::new("roles")
                .key(TermBuilder::var("r"))
                .body_call(
                    TermBuilder::var("="),
                    vec![TermBuilder::var("r"), TermBuilder::string(i.to_string())],
                )
                .build()
        })
        .collect();
    ModuleBuilder::new("authz").rules(rules).build()
}

fn query_for(name: &str) -> QuerySet {
    let body = BodyBuilder::new()
        .call(
            TermBuilder::var("="),
            vec![TermBuilder::var("x"), TermBuilder::data_ref(&["authz", name])],
        )
        .build();
    QuerySet::new("q0", vec![body])
}

fn bench_plan_wide_rule_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_wide_rule_set");
    for size in [10u32, 100, 500] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let module = wide_rule_set(size);
                let queries = vec![query_for("allow_0")];
                let planner = Planner::new(PlanInput::new(queries, vec![module])).expect("planner");
                planner.plan().expect("plan")
            });
        });
    }
    group.finish();
}

fn bench_plan_partial_set_alternatives(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_partial_set_alternatives");
    for size in [10u32, 100, 500] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let module = partial_set_alternatives(size);
                let queries = vec![query_for("roles")];
                let planner = Planner::new(PlanInput::new(queries, vec![module])).expect("planner");
                planner.plan().expect("plan")
            });
        });
    }
    group.finish();
}

fn bench_complexity_wide_rule_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("complexity_wide_rule_set");
    for size in [10u32, 100, 500] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let module = wide_rule_set(size);
            let analyzer = Analyzer::new(std::slice::from_ref(&module)).expect("analyzer");
            let query = query_for("allow_0");
            b.iter(|| analyzer.calculate("q0", &query.bodies[0]));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_plan_wide_rule_set,
    bench_plan_partial_set_alternatives,
    bench_complexity_wide_rule_set
);
criterion_main!(benches);
