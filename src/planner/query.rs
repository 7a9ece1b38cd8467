//! Top-level query planning (spec §4.5): one IR [`Plan`] per named query
//! set.

use std::collections::BTreeMap;

use crate::ast::QuerySet;
use crate::error::PlanResult;
use crate::ir::{Block, Plan, Stmt};
use crate::locals::Local;
use crate::rewrite::original_name;

use super::Planner;

/// `_` never binds a result key, and a compiler-generated name (one the
/// rewriter produced rather than the user wrote) never does either — both
/// are filtered from a query set's result shape (spec §4.5 step 2, §8
/// scenario 7).
fn is_result_var(name: &str) -> bool {
    name != "_" && !name.starts_with("__")
}

/// Everything needed to build one result key: the pre-allocated
/// string-literal local for the user-facing (post-rewrite) name, plus every
/// internal (pre-rewrite) name the body may actually bind for it. More than
/// one internal name can map to the same user-facing key (the compiler may
/// rewrite the same source variable differently per disjunct), so the
/// binding step tries each in turn and uses whichever the body bound.
#[derive(Clone)]
struct ResultBinding {
    name_local: Local,
    internal_names: Vec<String>,
}

impl Planner {
    /// Plan one named query set into a [`Plan`] (spec §4.5).
    pub(crate) fn plan_query_set(&mut self, query_set: &QuerySet) -> PlanResult<Plan> {
        let loc = crate::location::Location::synthetic();
        let result_set = self.locals.fresh();

        let var_set = query_set.variables();
        let mut vars: Vec<&str> = var_set.iter().map(String::as_str).filter(|n| is_result_var(n)).collect();
        vars.sort_unstable();

        // Stable local deduplicated order: collect every internal (source)
        // var name under its user-facing (post rewritten-var) key, since two
        // internal names may map back to the same key — both are kept (see
        // `ResultBinding`) so the binding step can try each in turn.
        let originals: Vec<(String, String)> =
            vars.iter().map(|var| (original_name(&self.rewritten_vars, var).to_string(), (*var).to_string())).collect();

        let mut preamble: Block = Vec::new();
        self.emit(&mut preamble, &loc, Stmt::MakeSet { target: result_set });
        let mut name_locals: BTreeMap<String, ResultBinding> = BTreeMap::new();
        for (original, var) in originals {
            let binding = match name_locals.get_mut(&original) {
                Some(binding) => binding,
                None => {
                    let index = self.strings.intern(&original);
                    let local = self.locals.fresh();
                    self.emit(&mut preamble, &loc, Stmt::MakeString { index, target: local });
                    name_locals.entry(original).or_insert(ResultBinding { name_local: local, internal_names: Vec::new() })
                }
            };
            binding.internal_names.push(var);
        }

        let mut blocks = vec![preamble];
        for body in &query_set.bodies {
            blocks.push(self.plan_query_body(body, result_set, &name_locals)?);
        }

        let mut final_block: Block = Vec::new();
        self.emit(&mut final_block, &loc, Stmt::ReturnLocal { src: result_set });
        blocks.push(final_block);

        Ok(Plan { name: query_set.name.clone(), blocks })
    }

    /// Plan a single disjunct query body: push a fresh scope frame, plan the
    /// body, and on success build the result-binding object and add it to
    /// the shared result set (spec §4.5 "Per-query block").
    fn plan_query_body(&mut self, body: &crate::ast::Body, result_set: Local, name_locals: &BTreeMap<String, ResultBinding>) -> PlanResult<Block> {
        let mut block: Block = Vec::new();
        self.scope.push([("input".to_string(), crate::locals::INPUT), ("data".to_string(), crate::locals::DATA)]);

        let name_locals = name_locals.clone();
        let result = self.plan_body(body, 0, &mut block, Box::new(move |planner, blk| {
            planner.plan_query_binding(result_set, &name_locals, blk)
        }));

        self.scope.pop();
        result?;
        Ok(block)
    }

    /// Build the result-binding object for one successful query solution
    /// and add it to the shared result set. The key is always the
    /// user-facing (post-rewrite) name; the value is read from whichever
    /// internal (pre-rewrite) name the body actually bound (spec §4.5 step
    /// 2: the rewritten-var map relabels the *key*, not the value).
    fn plan_query_binding(&mut self, result_set: Local, name_locals: &BTreeMap<String, ResultBinding>, block: &mut Block) -> PlanResult<()> {
        let loc = crate::location::Location::synthetic();
        let binding = self.locals.fresh();
        self.emit(block, &loc, Stmt::MakeObject { target: binding });
        for result_binding in name_locals.values() {
            let var_local = result_binding
                .internal_names
                .iter()
                .find_map(|internal| self.scope.get(internal))
                .unwrap_or_else(|| self.locals.fresh());
            self.emit(block, &loc, Stmt::ObjectInsert { key: result_binding.name_local, value: var_local, object: binding });
        }
        self.emit(block, &loc, Stmt::ResultSetAdd { value: binding, set: result_set });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{BodyBuilder, TermBuilder};
    use crate::ast::QuerySet;
    use crate::planner::PlanInput;
    use crate::planner::Planner;

    #[test]
    fn empty_query_set_still_builds_result_set() {
        let body = BodyBuilder::new().expr(TermBuilder::bool_(true)).build();
        let qs = QuerySet::new("q0", vec![body]);
        let mut planner = Planner::new(PlanInput::new(vec![], vec![])).unwrap();
        let plan = planner.plan_query_set(&qs).unwrap();
        assert_eq!(plan.name, "q0");
        assert!(matches!(plan.blocks[0][0].stmt, Stmt::MakeSet { .. }));
        assert!(matches!(plan.blocks.last().unwrap()[0].stmt, Stmt::ReturnLocal { .. }));
    }

    #[test]
    fn query_var_produces_binding_object() {
        let body = BodyBuilder::new()
            .call(TermBuilder::var("="), vec![TermBuilder::var("x"), TermBuilder::int(1)])
            .build();
        let qs = QuerySet::new("q0", vec![body]);
        let mut planner = Planner::new(PlanInput::new(vec![], vec![])).unwrap();
        let plan = planner.plan_query_set(&qs).unwrap();
        // preamble + one query block + final block
        assert_eq!(plan.blocks.len(), 3);
        let query_block = &plan.blocks[1];
        assert!(query_block.iter().any(|s| matches!(s.stmt, Stmt::MakeObject { .. })));
        assert!(query_block.iter().any(|s| matches!(s.stmt, Stmt::ResultSetAdd { .. })));
    }

    #[test]
    fn wildcard_var_is_excluded_from_result_shape() {
        let body = BodyBuilder::new()
            .call(TermBuilder::var("="), vec![TermBuilder::var("_"), TermBuilder::int(1)])
            .build();
        let qs = QuerySet::new("q0", vec![body]);
        let mut planner = Planner::new(PlanInput::new(vec![], vec![])).unwrap();
        let plan = planner.plan_query_set(&qs).unwrap();
        let preamble = &plan.blocks[0];
        // MakeSet only; no MakeString was pre-allocated for `_`.
        assert_eq!(preamble.len(), 1);
    }
}
