//! Rule-set planning (spec §4.2): one IR [`Func`] per non-empty rule-trie
//! bucket.

use crate::ast::RuleKind;
use crate::error::{PlanError, PlanResult};
use crate::ir::{Block, Func, Stmt};
use crate::trie::Key;

use super::path_label;
use super::Planner;

impl Planner {
    /// Plan the function for the rule bucket at `path` (spec §4.2).
    pub(crate) fn plan_rule_set_at(&mut self, path: &[Key]) -> PlanResult<Func> {
        let name = path_label(path);
        let bucket = self
            .trie
            .lookup(path)
            .and_then(|n| n.bucket.clone())
            .ok_or_else(|| PlanError::InternalInvariant {
                reason: format!("no rule bucket at {name}"),
                location: crate::location::Location::synthetic(),
            })?;

        let kind = bucket.rules.first().map(|r| r.head.kind()).ok_or_else(|| PlanError::InternalInvariant {
            reason: format!("empty rule bucket at {name}"),
            location: crate::location::Location::synthetic(),
        })?;
        for rule in &bucket.rules {
            if rule.head.kind() != kind {
                return Err(PlanError::InternalInvariant {
                    reason: format!("rule bucket {name} mixes rule kinds"),
                    location: rule.location.clone(),
                });
            }
        }

        let input_param = self.locals.fresh();
        let data_param = self.locals.fresh();
        let arity = bucket.arity();
        let mut arg_params = Vec::with_capacity(arity);
        for _ in 0..arity {
            arg_params.push(self.locals.fresh());
        }
        let return_local = self.locals.fresh();

        self.function_handles.insert(
            name.clone(),
            crate::trie::FuncHandle { name: name.clone(), arity, return_local },
        );

        let mut blocks: Vec<Block> = Vec::new();

        match kind {
            RuleKind::PartialSet => {
                let loc = bucket.rules[0].location.clone();
                blocks.push(vec![crate::ir::LocatedStmt::new(loc, Stmt::MakeSet { target: return_local })]);
            }
            RuleKind::PartialObject => {
                let loc = bucket.rules[0].location.clone();
                blocks.push(vec![crate::ir::LocatedStmt::new(loc, Stmt::MakeObject { target: return_local })]);
            }
            RuleKind::Complete | RuleKind::Function => {}
        }

        let mut default_rule = None;
        for chain_head in &bucket.rules {
            if chain_head.default {
                default_rule = Some(chain_head);
                continue;
            }
            let block = self.plan_rule_chain(chain_head, input_param, data_param, &arg_params, kind, return_local)?;
            blocks.push(block);
        }

        if let Some(rule) = default_rule {
            let loc = rule.location.clone();
            let mut guard: Block = Vec::new();
            self.emit(&mut guard, &loc, Stmt::IsUndefined { src: return_local });
            self.scope.push([
                ("input".to_string(), input_param),
                ("data".to_string(), data_param),
            ]);
            let value_term = rule.head.value.as_ref().ok_or_else(|| PlanError::InternalInvariant {
                reason: "default rule without a value term".to_string(),
                location: loc.clone(),
            })?;
            let assign_result = self.plan_term_immediate(value_term, &mut guard);
            self.scope.pop();
            let value_local = assign_result?;
            self.emit(&mut guard, &loc, Stmt::AssignVar { src: value_local, target: return_local });
            blocks.push(guard);
        }

        let final_loc = bucket.rules[0].location.clone();
        blocks.push(vec![crate::ir::LocatedStmt::new(final_loc, Stmt::ReturnLocal { src: return_local })]);

        let mut params = vec![input_param, data_param];
        params.extend(arg_params);

        Ok(Func { name, params, return_local, blocks })
    }

    /// Plan one rule's body (and its else-chain, if any) into a single block
    /// (spec §4.2 steps 1-6).
    #[allow(clippy::too_many_arguments)]
    fn plan_rule_chain(
        &mut self,
        head: &crate::ast::Rule,
        input_param: crate::locals::Local,
        data_param: crate::locals::Local,
        arg_params: &[crate::locals::Local],
        kind: RuleKind,
        return_local: crate::locals::Local,
    ) -> PlanResult<Block> {
        let chain: Vec<&crate::ast::Rule> = head.chain_iter().collect();
        if chain.len() == 1 {
            return self.plan_single_rule(chain[0], input_param, data_param, arg_params, kind, return_local, false);
        }

        let mut branches: Vec<Block> = Vec::with_capacity(chain.len());
        for rule in &chain {
            branches.push(self.plan_single_rule(rule, input_param, data_param, arg_params, kind, return_local, true)?);
        }
        Ok(vec![crate::ir::LocatedStmt::new(head.location.clone(), Stmt::Block { blocks: branches })])
    }

    /// Plan a single rule body into one block: scope push, argument
    /// unification, body, head projection, optional else-chain break, scope
    /// pop.
    ///
    /// Argument unification, the body, and the head projection are chained
    /// as one continuation, not as separate sequential calls: any of them
    /// may open a `Scan`/`Not` sub-block (e.g. unifying an array argument
    /// against an unbound ref, or a body expression that scans a
    /// collection), and everything downstream must run *inside* that
    /// sub-block to see its bindings, not as a sibling statement after it.
    #[allow(clippy::too_many_arguments)]
    fn plan_single_rule<'p>(
        &mut self,
        rule: &'p crate::ast::Rule,
        input_param: crate::locals::Local,
        data_param: crate::locals::Local,
        arg_params: &'p [crate::locals::Local],
        kind: RuleKind,
        return_local: crate::locals::Local,
        in_chain: bool,
    ) -> PlanResult<Block> {
        let mut block: Block = Vec::new();
        self.scope.push([
            ("input".to_string(), input_param),
            ("data".to_string(), data_param),
        ]);

        let result = self.plan_rule_args(rule, 0, arg_params, kind, return_local, in_chain, &mut block);

        self.scope.pop();
        result?;
        Ok(block)
    }

    /// Unify function-rule arguments one at a time, continuing with the body
    /// once every argument is bound (no-op immediately if `rule` takes no
    /// arguments).
    #[allow(clippy::too_many_arguments)]
    fn plan_rule_args<'p>(
        &mut self,
        rule: &'p crate::ast::Rule,
        idx: usize,
        arg_params: &'p [crate::locals::Local],
        kind: RuleKind,
        return_local: crate::locals::Local,
        in_chain: bool,
        block: &mut Block,
    ) -> PlanResult<()> {
        if let Some(args) = &rule.head.args {
            if idx < args.len() {
                let param = arg_params[idx];
                let loc = rule.location.clone();
                return self.unify_local(param, &args[idx], block, &loc, Box::new(move |planner, blk| {
                    planner.plan_rule_args(rule, idx + 1, arg_params, kind, return_local, in_chain, blk)
                }));
            }
        }
        self.plan_rule_body(rule, kind, return_local, in_chain, block)
    }

    /// Plan the rule body, continuing with the head projection once the
    /// body succeeds.
    fn plan_rule_body(
        &mut self,
        rule: &crate::ast::Rule,
        kind: RuleKind,
        return_local: crate::locals::Local,
        in_chain: bool,
        block: &mut Block,
    ) -> PlanResult<()> {
        self.plan_body(&rule.body, 0, block, Box::new(move |planner, blk| {
            planner.plan_rule_head(rule, kind, return_local, in_chain, blk)
        }))
    }

    /// Project the rule head into `return_local` (spec §4.2 step 5) and, for
    /// an else-chain branch, guard the fallthrough to the next branch (step
    /// 6).
    fn plan_rule_head(
        &mut self,
        rule: &crate::ast::Rule,
        kind: RuleKind,
        return_local: crate::locals::Local,
        in_chain: bool,
        block: &mut Block,
    ) -> PlanResult<()> {
        let loc = rule.location.clone();
        match kind {
            RuleKind::Complete | RuleKind::Function => {
                let value_term = rule.head.value.as_ref().ok_or_else(|| PlanError::InternalInvariant {
                    reason: "complete/function rule missing a value term".to_string(),
                    location: loc.clone(),
                })?;
                let value_local = self.plan_term_immediate(value_term, block)?;
                self.emit(block, &loc, Stmt::AssignVarOnce { src: value_local, target: return_local });
            }
            RuleKind::PartialSet => {
                let key_term = rule.head.key.as_ref().ok_or_else(|| PlanError::InternalInvariant {
                    reason: "partial set rule missing a key term".to_string(),
                    location: loc.clone(),
                })?;
                let key_local = self.plan_term_immediate(key_term, block)?;
                self.emit(block, &loc, Stmt::SetAdd { value: key_local, set: return_local });
            }
            RuleKind::PartialObject => {
                let key_term = rule.head.key.as_ref().ok_or_else(|| PlanError::InternalInvariant {
                    reason: "partial object rule missing a key term".to_string(),
                    location: loc.clone(),
                })?;
                let value_term = rule.head.value.as_ref().ok_or_else(|| PlanError::InternalInvariant {
                    reason: "partial object rule missing a value term".to_string(),
                    location: loc.clone(),
                })?;
                let key_local = self.plan_term_immediate(key_term, block)?;
                let value_local = self.plan_term_immediate(value_term, block)?;
                self.emit(block, &loc, Stmt::ObjectInsertOnce { key: key_local, value: value_local, object: return_local });
            }
        }

        if in_chain {
            self.emit(block, &loc, Stmt::IsDefined { src: return_local });
            self.emit(block, &loc, Stmt::Break { index: 1 });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{ModuleBuilder, RuleBuilder, TermBuilder};
    use crate::planner::{PlanInput, Planner};

    #[test]
    fn complete_rule_assigns_once_and_returns() {
        let module = ModuleBuilder::new("test")
            .rule(RuleBuilder::new("allow").value(TermBuilder::bool_(true)).build())
            .build();
        let mut planner = Planner::new(PlanInput::new(vec![], vec![module])).unwrap();
        let path = vec![Key::String("test".into()), Key::String("allow".into())];
        let func = planner.plan_rule_set_at(&path).unwrap();
        assert_eq!(func.name, "data.test.allow");
        assert_eq!(func.params.len(), 2);
        let last_block = func.blocks.last().unwrap();
        assert!(matches!(last_block[0].stmt, Stmt::ReturnLocal { .. }));
    }

    #[test]
    fn partial_set_rule_seeds_make_set() {
        let module = ModuleBuilder::new("test")
            .rule(RuleBuilder::new("names").key(TermBuilder::string("a")).build())
            .build();
        let mut planner = Planner::new(PlanInput::new(vec![], vec![module])).unwrap();
        let path = vec![Key::String("test".into()), Key::String("names".into())];
        let func = planner.plan_rule_set_at(&path).unwrap();
        assert!(matches!(func.blocks[0][0].stmt, Stmt::MakeSet { .. }));
    }

    #[test]
    fn function_rule_gets_extra_params() {
        let module = ModuleBuilder::new("test")
            .rule(
                RuleBuilder::new("f")
                    .args(vec![TermBuilder::var("x")])
                    .value(TermBuilder::var("x"))
                    .build(),
            )
            .build();
        let mut planner = Planner::new(PlanInput::new(vec![], vec![module])).unwrap();
        let path = vec![Key::String("test".into()), Key::String("f".into())];
        let func = planner.plan_rule_set_at(&path).unwrap();
        assert_eq!(func.params.len(), 3);
    }

    #[test]
    fn else_chain_wraps_branches_in_one_block() {
        let a = RuleBuilder::new("p").value(TermBuilder::int(1)).build();
        let b = RuleBuilder::new("p").value(TermBuilder::int(2)).build();
        let chained = a.chain(b);
        let module = ModuleBuilder::new("test").rule(chained).build();
        let mut planner = Planner::new(PlanInput::new(vec![], vec![module])).unwrap();
        let path = vec![Key::String("test".into()), Key::String("p".into())];
        let func = planner.plan_rule_set_at(&path).unwrap();
        // one Block{} statement for the chain, plus the trailing ReturnLocal block.
        assert_eq!(func.blocks.len(), 2);
        assert!(matches!(func.blocks[0][0].stmt, Stmt::Block { .. }));
    }

    #[test]
    fn default_rule_is_guarded_by_is_undefined() {
        let main = RuleBuilder::new("p").value(TermBuilder::bool_(true)).build();
        let default = RuleBuilder::new("p").value(TermBuilder::bool_(false)).default_rule().build();
        let module = ModuleBuilder::new("test").rules(vec![main, default]).build();
        let mut planner = Planner::new(PlanInput::new(vec![], vec![module])).unwrap();
        let path = vec![Key::String("test".into()), Key::String("p".into())];
        let func = planner.plan_rule_set_at(&path).unwrap();
        let default_block = &func.blocks[func.blocks.len() - 2];
        assert!(matches!(default_block[0].stmt, Stmt::IsUndefined { .. }));
    }
}
