//! Term and expression planning, and unification (spec §4.3).
//!
//! This is where the continuation-style lowering described in spec §9 lives.
//! Rust's closures are the natural vehicle for it: every planning function
//! that can introduce a nested block (a `Scan`, a `Not`, a comprehension)
//! takes a boxed continuation representing "everything that still has to
//! happen once this value is bound", and calls it once the value's local is
//! ready. Simple, non-iterating terms just invoke the continuation
//! immediately in the current block — there is no structural difference
//! between "iterate" and "don't" from the continuation's point of view.

use crate::ast::{Expr, ExprTerms, Number, Term, Value};
use crate::error::{PlanError, PlanResult};
use crate::ir::{Block, Stmt};
use crate::locals::Local;
use crate::location::Location;

use super::Planner;

/// Continuation taking the block being built and the local holding a term's
/// resolved value.
pub type TermCont<'p> = Box<dyn FnOnce(&mut Planner, &mut Block, Local) -> PlanResult<()> + 'p>;
/// Continuation taking only the block — used once an expression's own
/// effect (a comparison, a call) has been emitted.
pub type ExprCont<'p> = Box<dyn FnOnce(&mut Planner, &mut Block) -> PlanResult<()> + 'p>;

impl Planner {
    /// Plan an entire body left to right (spec §4.3.1), finally invoking
    /// `finish` once every expression has succeeded.
    pub(crate) fn plan_body<'p>(
        &mut self,
        body: &'p [Expr],
        idx: usize,
        block: &mut Block,
        finish: ExprCont<'p>,
    ) -> PlanResult<()> {
        if idx >= body.len() {
            return finish(self, block);
        }
        let expr = &body[idx];
        let next: ExprCont<'p> = Box::new(move |planner: &mut Planner, blk: &mut Block| {
            planner.plan_body(body, idx + 1, blk, finish)
        });
        self.plan_expr(expr, block, next)
    }

    /// Lower one expression (spec §4.3.3), then call `finish`.
    pub(crate) fn plan_expr<'p>(
        &mut self,
        expr: &'p Expr,
        block: &mut Block,
        finish: ExprCont<'p>,
    ) -> PlanResult<()> {
        if expr.negated {
            let mut inner: Block = Vec::new();
            let bare = Expr { negated: false, with: Vec::new(), ..expr.clone() };
            self.plan_expr_no_with(&bare, &mut inner, Box::new(|_, _| Ok(())))?;
            self.emit(block, &expr.location, Stmt::Not { block: inner });
            return finish(self, block);
        }
        if !expr.with.is_empty() {
            return self.plan_expr_with(expr, 0, block, finish);
        }
        self.plan_expr_no_with(expr, block, finish)
    }

    fn plan_expr_with<'p>(
        &mut self,
        expr: &'p Expr,
        with_idx: usize,
        block: &mut Block,
        finish: ExprCont<'p>,
    ) -> PlanResult<()> {
        if with_idx >= expr.with.len() {
            return self.plan_expr_no_with(expr, block, finish);
        }
        let modifier = &expr.with[with_idx];
        let saved = self.apply_with(&modifier.target, &modifier.value, block, &expr.location)?;
        let next: ExprCont<'p> = Box::new(move |planner: &mut Planner, blk: &mut Block| {
            planner.plan_expr_with(expr, with_idx + 1, blk, finish)
        });
        let result = self.plan_expr_with(expr, with_idx + 1, block, next);
        self.restore_with(saved);
        result
    }

    /// Rebind the scope entry for the root name (`input`/`data`) of `target`
    /// to a modified copy for the duration of the expression (spec §4.3.6).
    /// Supports `with input as X`, `with data as X`, and single-level
    /// prefixes (`with data.foo as X`); deeper prefixes are built by nesting
    /// `with` expressions, which compose via the same restore discipline.
    fn apply_with(
        &mut self,
        target: &Term,
        value: &Term,
        block: &mut Block,
        loc: &Location,
    ) -> PlanResult<(String, Option<Local>)> {
        let Value::Ref(parts) = &target.value else {
            return Err(PlanError::IllegalRef {
                reason: "with target must be a reference".to_string(),
                location: target.location.clone(),
            });
        };
        let root_name = match &parts[0].value {
            Value::Var(name) => name.clone(),
            _ => {
                return Err(PlanError::IllegalRef {
                    reason: "with target must be rooted at input or data".to_string(),
                    location: target.location.clone(),
                })
            }
        };
        let prior = self.scope.get(&root_name);
        let old_root = prior.unwrap_or(if root_name == "input" {
            crate::locals::INPUT
        } else {
            crate::locals::DATA
        });

        *self.with_rebind_depth.entry(root_name.clone()).or_insert(0) += 1;

        let value_local = self.plan_term_immediate(value, block)?;

        if parts.len() == 1 {
            self.scope.put(root_name.clone(), value_local);
            return Ok((root_name, prior));
        }

        let new_root = self.locals.fresh();
        self.emit(block, loc, Stmt::AssignVar { src: old_root, target: new_root });
        let leaf_key = self.plan_term_immediate(parts.last().expect("ref has >=2 parts"), block)?;
        self.emit(
            block,
            loc,
            Stmt::ObjectInsert { key: leaf_key, value: value_local, object: new_root },
        );
        self.scope.put(root_name.clone(), new_root);
        Ok((root_name, prior))
    }

    fn restore_with(&mut self, saved: (String, Option<Local>)) {
        let (name, prior) = saved;
        if let Some(depth) = self.with_rebind_depth.get_mut(&name) {
            *depth = depth.saturating_sub(1);
        }
        match prior {
            Some(local) => self.scope.put(name, local),
            None => self.scope.remove(&name),
        }
    }

    fn plan_expr_no_with<'p>(
        &mut self,
        expr: &'p Expr,
        block: &mut Block,
        finish: ExprCont<'p>,
    ) -> PlanResult<()> {
        match &expr.terms {
            ExprTerms::Term(term) => {
                let loc = expr.location.clone();
                self.plan_term(term, block, Box::new(move |planner, blk, local| {
                    let false_local = planner.locals.fresh();
                    planner.emit(blk, &loc, Stmt::MakeBoolean { value: false, target: false_local });
                    planner.emit(blk, &loc, Stmt::NotEqual { a: local, b: false_local });
                    finish(planner, blk)
                }))
            }
            ExprTerms::Call { operator, operands } => self.plan_call(&expr.location, operator, operands, block, finish),
        }
    }

    fn plan_call<'p>(
        &mut self,
        loc: &'p Location,
        operator: &'p Term,
        operands: &'p [Term],
        block: &mut Block,
        finish: ExprCont<'p>,
    ) -> PlanResult<()> {
        if let Value::Var(name) = &operator.value {
            if name == "=" {
                if operands.len() != 2 {
                    return Err(PlanError::ArityMismatch {
                        operator: name.clone(),
                        expected: 2,
                        expected_plus_one: 3,
                        actual: operands.len(),
                        location: loc.clone(),
                    });
                }
                return self.unify(&operands[0], &operands[1], block, finish);
            }
            if self.builtins.is_comparison(name) {
                return self.plan_comparison(name.clone(), loc, operands, block, finish);
            }
        }
        self.plan_user_or_builtin_call(loc, operator, operands, block, finish)
    }

    fn plan_comparison<'p>(
        &mut self,
        name: String,
        loc: &'p Location,
        operands: &'p [Term],
        block: &mut Block,
        finish: ExprCont<'p>,
    ) -> PlanResult<()> {
        let a = &operands[0];
        let b = &operands[1];
        self.plan_term(a, block, Box::new(move |planner, blk, la| {
            planner.plan_term(b, blk, Box::new(move |planner, blk, lb| {
                let stmt = match name.as_str() {
                    "=" | "==" => Stmt::Equal { a: la, b: lb },
                    "!=" => Stmt::NotEqual { a: la, b: lb },
                    "<" => Stmt::LessThan { a: la, b: lb },
                    "<=" => Stmt::LessThanEqual { a: la, b: lb },
                    ">" => Stmt::GreaterThan { a: la, b: lb },
                    ">=" => Stmt::GreaterThanEqual { a: la, b: lb },
                    other => {
                        return Err(PlanError::UnknownOperator {
                            operator: other.to_string(),
                            location: loc.clone(),
                        })
                    }
                };
                planner.emit(blk, loc, stmt);
                finish(planner, blk)
            }))
        }))
    }

    fn plan_user_or_builtin_call<'p>(
        &mut self,
        loc: &'p Location,
        operator: &'p Term,
        operands: &'p [Term],
        block: &mut Block,
        finish: ExprCont<'p>,
    ) -> PlanResult<()> {
        let op_name = match &operator.value {
            Value::Var(name) => name.clone(),
            Value::Ref(_) => self.textual_ref(operator)?,
            _ => {
                return Err(PlanError::IllegalRef {
                    reason: "call operator must be a name or reference".to_string(),
                    location: operator.location.clone(),
                })
            }
        };

        let arity = if let Some(decl) = self.builtins.get(&op_name) {
            decl.arity
        } else if let Some(handle) = self.lookup_function(&op_name) {
            handle.arity
        } else {
            return Err(PlanError::UnknownOperator { operator: op_name, location: loc.clone() });
        };

        let (call_operands, unify_extra): (&[Term], Option<&Term>) = if operands.len() == arity {
            (operands, None)
        } else if operands.len() == arity + 1 {
            (&operands[..arity], operands.last())
        } else {
            return Err(PlanError::ArityMismatch {
                operator: op_name,
                expected: arity,
                expected_plus_one: arity + 1,
                actual: operands.len(),
                location: loc.clone(),
            });
        };

        self.plan_term_list(call_operands, block, Box::new(move |planner, blk, args| {
            let result = planner.locals.fresh();
            planner.emit(blk, loc, Stmt::Call { func: op_name.clone(), args, result });
            match unify_extra {
                None => finish(planner, blk),
                Some(extra) => planner.unify_local(result, extra, blk, &extra.location, finish),
            }
        }))
    }

    /// Plan a list of terms left to right, collecting their locals.
    fn plan_term_list<'p>(
        &mut self,
        terms: &'p [Term],
        block: &mut Block,
        finish: Box<dyn FnOnce(&mut Planner, &mut Block, Vec<Local>) -> PlanResult<()> + 'p>,
    ) -> PlanResult<()> {
        self.plan_term_list_from(terms, 0, Vec::new(), block, finish)
    }

    fn plan_term_list_from<'p>(
        &mut self,
        terms: &'p [Term],
        idx: usize,
        mut acc: Vec<Local>,
        block: &mut Block,
        finish: Box<dyn FnOnce(&mut Planner, &mut Block, Vec<Local>) -> PlanResult<()> + 'p>,
    ) -> PlanResult<()> {
        if idx >= terms.len() {
            return finish(self, block, acc);
        }
        self.plan_term(&terms[idx], block, Box::new(move |planner, blk, local| {
            acc.push(local);
            planner.plan_term_list_from(terms, idx + 1, acc, blk, finish)
        }))
    }

    /// Plan a ground, non-iterating term and return its local directly.
    /// Used for `with` replacement values and trie-path key materialization,
    /// neither of which can legally expand into a `Scan`.
    pub(crate) fn plan_term_immediate(&mut self, term: &Term, block: &mut Block) -> PlanResult<Local> {
        let mut result = None;
        self.plan_term(term, block, Box::new(|_, _, local| {
            result = Some(local);
            Ok(())
        }))?;
        result.ok_or_else(|| PlanError::InternalInvariant {
            reason: "plan_term_immediate continuation never ran".to_string(),
            location: term.location.clone(),
        })
    }

    /// Dispatch on the term's value variant (spec §4.3.2).
    pub(crate) fn plan_term<'p>(
        &mut self,
        term: &'p Term,
        block: &mut Block,
        finish: TermCont<'p>,
    ) -> PlanResult<()> {
        let loc = &term.location;
        match &term.value {
            Value::Null => {
                let target = self.locals.fresh();
                self.emit(block, loc, Stmt::MakeNull { target });
                finish(self, block, target)
            }
            Value::Boolean(b) => {
                let target = self.locals.fresh();
                self.emit(block, loc, Stmt::MakeBoolean { value: *b, target });
                finish(self, block, target)
            }
            Value::Number(n) => {
                let target = self.locals.fresh();
                let stmt = match n {
                    Number::Int(i) => Stmt::MakeNumberInt { value: *i, target },
                    Number::Float(f) => Stmt::MakeNumberFloat { value: *f, target },
                    Number::Big(text) => {
                        if let Ok(f) = text.parse::<f64>() {
                            Stmt::MakeNumberFloat { value: f, target }
                        } else {
                            let index = self.strings.intern(text.clone());
                            Stmt::MakeNumberRef { index, target }
                        }
                    }
                };
                self.emit(block, loc, stmt);
                finish(self, block, target)
            }
            Value::String(s) => {
                let target = self.locals.fresh();
                let index = self.strings.intern(s.clone());
                self.emit(block, loc, Stmt::MakeString { index, target });
                finish(self, block, target)
            }
            Value::Var(name) => {
                let local = self.resolve_var(name);
                finish(self, block, local)
            }
            Value::Ref(_) => self.plan_ref(term, block, finish),
            Value::Array(items) => {
                let target = self.locals.fresh();
                self.emit(block, loc, Stmt::MakeArray { target });
                self.plan_container_items(items, target, block, finish)
            }
            Value::Set(items) => {
                let target = self.locals.fresh();
                self.emit(block, loc, Stmt::MakeSet { target });
                self.plan_set_items(items, target, block, finish)
            }
            Value::Object(pairs) => {
                let target = self.locals.fresh();
                self.emit(block, loc, Stmt::MakeObject { target });
                self.plan_object_pairs(pairs, target, block, finish)
            }
            Value::Call { operator, operands } => {
                let loc = term.location.clone();
                self.plan_term_list(operands, block, Box::new(move |planner, blk, args| {
                    let result = planner.locals.fresh();
                    let name = match &operator.value {
                        Value::Var(n) => n.clone(),
                        _ => {
                            return Err(PlanError::IllegalRef {
                                reason: "call operator must be a name".to_string(),
                                location: operator.location.clone(),
                            })
                        }
                    };
                    planner.emit(blk, &loc, Stmt::Call { func: name, args, result });
                    finish(planner, blk, result)
                }))
            }
            Value::ArrayComprehension { term: inner, body } => {
                let loc = loc.clone();
                self.plan_array_or_set_comprehension(&loc, inner, body, true, block, finish)
            }
            Value::SetComprehension { term: inner, body } => {
                let loc = loc.clone();
                self.plan_array_or_set_comprehension(&loc, inner, body, false, block, finish)
            }
            Value::ObjectComprehension { key, value, body } => {
                let loc = loc.clone();
                self.plan_object_comprehension(&loc, key, value, body, block, finish)
            }
        }
    }

    fn plan_container_items<'p>(
        &mut self,
        items: &'p [Term],
        target: Local,
        block: &mut Block,
        finish: TermCont<'p>,
    ) -> PlanResult<()> {
        let loc = Location::synthetic();
        self.plan_term_list(items, block, Box::new(move |planner, blk, locals| {
            for value in locals {
                planner.emit(blk, &loc, Stmt::ArrayAppend { value, array: target });
            }
            finish(planner, blk, target)
        }))
    }

    fn plan_set_items<'p>(
        &mut self,
        items: &'p [Term],
        target: Local,
        block: &mut Block,
        finish: TermCont<'p>,
    ) -> PlanResult<()> {
        let loc = Location::synthetic();
        self.plan_term_list(items, block, Box::new(move |planner, blk, locals| {
            for value in locals {
                planner.emit(blk, &loc, Stmt::SetAdd { value, set: target });
            }
            finish(planner, blk, target)
        }))
    }

    fn plan_object_pairs<'p>(
        &mut self,
        pairs: &'p [(Term, Term)],
        target: Local,
        block: &mut Block,
        finish: TermCont<'p>,
    ) -> PlanResult<()> {
        self.plan_object_pairs_from(pairs, 0, target, block, finish)
    }

    fn plan_object_pairs_from<'p>(
        &mut self,
        pairs: &'p [(Term, Term)],
        idx: usize,
        target: Local,
        block: &mut Block,
        finish: TermCont<'p>,
    ) -> PlanResult<()> {
        if idx >= pairs.len() {
            return finish(self, block, target);
        }
        let (k, v) = &pairs[idx];
        let loc = k.location.clone();
        self.plan_term(k, block, Box::new(move |planner, blk, kl| {
            planner.plan_term(v, blk, Box::new(move |planner, blk, vl| {
                planner.emit(blk, &loc, Stmt::ObjectInsert { key: kl, value: vl, object: target });
                planner.plan_object_pairs_from(pairs, idx + 1, target, blk, finish)
            }))
        }))
    }

    /// `Make{Array|Set}{target}`; plan the body inside a `Block{[inner]}`
    /// whose success continuation plans the element term and appends it to
    /// `target` (spec §4.3.2). The comprehension's own scope frame is
    /// pushed/popped around the inner block so its bindings don't leak.
    #[allow(clippy::too_many_arguments)]
    fn plan_array_or_set_comprehension<'p>(
        &mut self,
        loc: &Location,
        element: &'p Term,
        body: &'p [Expr],
        is_array: bool,
        block: &mut Block,
        finish: TermCont<'p>,
    ) -> PlanResult<()> {
        let target = self.locals.fresh();
        if is_array {
            self.emit(block, loc, Stmt::MakeArray { target });
        } else {
            self.emit(block, loc, Stmt::MakeSet { target });
        }

        self.scope.push([]);
        let mut inner: Block = Vec::new();
        let append: ExprCont = Box::new(move |planner, blk| {
            planner.plan_term(element, blk, Box::new(move |planner, blk, value| {
                let stmt = if is_array {
                    Stmt::ArrayAppend { value, array: target }
                } else {
                    Stmt::SetAdd { value, set: target }
                };
                planner.emit(blk, &element.location, stmt);
                Ok(())
            }))
        });
        let result = self.plan_body(body, 0, &mut inner, append);
        self.scope.pop();
        result?;

        self.emit(block, loc, Stmt::Block { blocks: vec![inner] });
        finish(self, block, target)
    }

    /// `MakeObject{target}`; analogous to
    /// [`plan_array_or_set_comprehension`] but inserts a key/value pair per
    /// successful iteration.
    fn plan_object_comprehension<'p>(
        &mut self,
        loc: &Location,
        key: &'p Term,
        value: &'p Term,
        body: &'p [Expr],
        block: &mut Block,
        finish: TermCont<'p>,
    ) -> PlanResult<()> {
        let target = self.locals.fresh();
        self.emit(block, loc, Stmt::MakeObject { target });

        self.scope.push([]);
        let mut inner: Block = Vec::new();
        let append: ExprCont = Box::new(move |planner, blk| {
            planner.plan_term(key, blk, Box::new(move |planner, blk, kl| {
                planner.plan_term(value, blk, Box::new(move |planner, blk, vl| {
                    planner.emit(blk, &key.location, Stmt::ObjectInsert { key: kl, value: vl, object: target });
                    Ok(())
                }))
            }))
        });
        let result = self.plan_body(body, 0, &mut inner, append);
        self.scope.pop();
        result?;

        self.emit(block, loc, Stmt::Block { blocks: vec![inner] });
        finish(self, block, target)
    }
}

/// Unification (spec §4.3.4). Symmetric in effect: `unify(a, b, ...)` and
/// `unify(b, a, ...)` emit equivalent checks, but the tie-break rule (plan
/// the non-`Var` side first) means the two are not byte-identical — callers
/// should preserve the source's `a`/`b` order.
impl Planner {
    pub(crate) fn unify<'p>(
        &mut self,
        a: &'p Term,
        b: &'p Term,
        block: &mut Block,
        finish: ExprCont<'p>,
    ) -> PlanResult<()> {
        match (&a.value, &b.value) {
            (Value::Var(_), Value::Var(_)) | (_, Value::Var(_)) => {
                // Non-var (or left-var) first per the tie-break rule: plan
                // `a`, then unify the resulting local against `b`.
                let loc = a.location.clone();
                self.plan_term(a, block, Box::new(move |planner, blk, la| {
                    planner.unify_local(la, b, blk, &loc, finish)
                }))
            }
            (Value::Var(_), _) => self.unify(b, a, block, finish),
            (Value::Array(xs), Value::Array(ys)) => {
                if xs.len() != ys.len() {
                    // Statically fails: emit nothing further (an always-false
                    // block), matching spec §4.3.4 "if lengths differ, emit
                    // nothing (fail statically)".
                    let false_local = self.locals.fresh();
                    self.emit(block, &a.location, Stmt::MakeBoolean { value: false, target: false_local });
                    let true_local = self.locals.fresh();
                    self.emit(block, &a.location, Stmt::MakeBoolean { value: true, target: true_local });
                    self.emit(block, &a.location, Stmt::Equal { a: false_local, b: true_local });
                    return Ok(());
                }
                self.unify_pairs(xs, ys, 0, block, finish)
            }
            (Value::Object(xs), Value::Object(ys)) => self.unify_object(xs, ys, block, &a.location, finish),
            _ => {
                let loc = a.location.clone();
                self.plan_term(a, block, Box::new(move |planner, blk, la| {
                    planner.unify_local(la, b, blk, &loc, finish)
                }))
            }
        }
    }

    fn unify_pairs<'p>(
        &mut self,
        xs: &'p [Term],
        ys: &'p [Term],
        idx: usize,
        block: &mut Block,
        finish: ExprCont<'p>,
    ) -> PlanResult<()> {
        if idx >= xs.len() {
            return finish(self, block);
        }
        let next: ExprCont<'p> = Box::new(move |planner, blk| planner.unify_pairs(xs, ys, idx + 1, blk, finish));
        self.unify(&xs[idx], &ys[idx], block, next)
    }

    fn unify_object<'p>(
        &mut self,
        xs: &'p [(Term, Term)],
        ys: &'p [(Term, Term)],
        block: &mut Block,
        loc: &Location,
        finish: ExprCont<'p>,
    ) -> PlanResult<()> {
        if xs.len() != ys.len() {
            let false_local = self.locals.fresh();
            self.emit(block, loc, Stmt::MakeBoolean { value: false, target: false_local });
            let true_local = self.locals.fresh();
            self.emit(block, loc, Stmt::MakeBoolean { value: true, target: true_local });
            self.emit(block, loc, Stmt::Equal { a: false_local, b: true_local });
            return Ok(());
        }
        // Keys must match structurally, in declared order (compiler-level
        // concern to guarantee the same key appears on both sides at the
        // same index); unify values pairwise.
        let value_pairs: Vec<(&Term, &Term)> = xs.iter().zip(ys.iter()).map(|((_, xv), (_, yv))| (xv, yv)).collect();
        self.unify_value_pairs(value_pairs, 0, block, finish)
    }

    fn unify_value_pairs<'p>(
        &mut self,
        pairs: Vec<(&'p Term, &'p Term)>,
        idx: usize,
        block: &mut Block,
        finish: ExprCont<'p>,
    ) -> PlanResult<()> {
        if idx >= pairs.len() {
            return finish(self, block);
        }
        let (xv, yv) = pairs[idx];
        let next: ExprCont<'p> = Box::new(move |planner, blk| planner.unify_value_pairs(pairs, idx + 1, blk, finish));
        self.unify(xv, yv, block, next)
    }

    /// `unifyLocal(la, b, cont)` — `la` is already planned; dispatch on the
    /// shape of `b` (spec §4.3.4).
    pub(crate) fn unify_local<'p>(
        &mut self,
        la: Local,
        b: &'p Term,
        block: &mut Block,
        loc: &Location,
        finish: ExprCont<'p>,
    ) -> PlanResult<()> {
        match &b.value {
            Value::Var(name) => {
                if let Some(existing) = self.scope.get(name) {
                    self.emit(block, loc, Stmt::Equal { a: la, b: existing });
                    finish(self, block)
                } else {
                    let target = self.locals.fresh();
                    self.emit(block, loc, Stmt::AssignVar { src: la, target });
                    self.scope.put(name.clone(), target);
                    finish(self, block)
                }
            }
            Value::Array(items) => {
                self.emit(block, loc, Stmt::IsArray { src: la });
                let alen = self.locals.fresh();
                self.emit(block, loc, Stmt::Len { src: la, target: alen });
                let blen = self.locals.fresh();
                self.emit(block, loc, Stmt::MakeNumberInt { value: items.len() as i64, target: blen });
                self.emit(block, loc, Stmt::Equal { a: alen, b: blen });
                self.unify_local_array_elems(la, items, 0, block, loc, finish)
            }
            Value::Object(pairs) => {
                self.emit(block, loc, Stmt::IsObject { src: la });
                self.unify_local_object_elems(la, pairs, 0, block, loc, finish)
            }
            _ => {
                let loc2 = loc.clone();
                self.plan_term(b, block, Box::new(move |planner, blk, lb| {
                    planner.emit(blk, &loc2, Stmt::Equal { a: la, b: lb });
                    finish(planner, blk)
                }))
            }
        }
    }

    fn unify_local_array_elems<'p>(
        &mut self,
        la: Local,
        items: &'p [Term],
        idx: usize,
        block: &mut Block,
        loc: &Location,
        finish: ExprCont<'p>,
    ) -> PlanResult<()> {
        if idx >= items.len() {
            return finish(self, block);
        }
        let key_local = self.locals.fresh();
        self.emit(block, loc, Stmt::AssignInt { value: idx as i64, target: key_local });
        let elem_local = self.locals.fresh();
        self.emit(block, loc, Stmt::Dot { src: la, key: key_local, target: elem_local });
        let loc2 = loc.clone();
        let next: ExprCont<'p> =
            Box::new(move |planner, blk| planner.unify_local_array_elems(la, items, idx + 1, blk, &loc2, finish));
        self.unify_local(elem_local, &items[idx], block, loc, next)
    }

    fn unify_local_object_elems<'p>(
        &mut self,
        la: Local,
        pairs: &'p [(Term, Term)],
        idx: usize,
        block: &mut Block,
        loc: &Location,
        finish: ExprCont<'p>,
    ) -> PlanResult<()> {
        if idx >= pairs.len() {
            return finish(self, block);
        }
        let (k, v) = &pairs[idx];
        let loc2 = loc.clone();
        self.plan_term(k, block, Box::new(move |planner, blk, key_local| {
            let elem_local = planner.locals.fresh();
            planner.emit(blk, &loc2, Stmt::Dot { src: la, key: key_local, target: elem_local });
            let next: ExprCont<'p> =
                Box::new(move |planner, blk| planner.unify_local_object_elems(la, pairs, idx + 1, blk, &loc2, finish));
            planner.unify_local(elem_local, v, blk, &loc2, next)
        }))
    }
}
