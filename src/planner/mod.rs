//! The planner proper (components E-G, spec §4.2-§4.5).
//!
//! A [`Planner`] is built once from a [`PlanInput`] and consumed by
//! [`Planner::plan`], which takes `self` by value — the type system enforces
//! the "not reusable" rule of spec §5 rather than a runtime flag.
//!
//! Submodules:
//! - [`term`]: term/expression planning and unification (spec §4.3).
//! - [`refs`]: reference lowering, the data virtual+base hybrid, and the
//!   `CallDynamic` dispatch optimization (spec §4.3.5, §4.4).
//! - [`rule`]: rule-set and module planning (spec §4.2).
//! - [`query`]: top-level query planning (spec §4.5).

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::ast::{Module, Number, QuerySet, Value};
use crate::builtins::BuiltinDecls;
use crate::config::PlannerConfig;
use crate::debug::{DebugSink, NullSink};
use crate::error::{PlanError, PlanResult};
use crate::ir::{Block, LocatedStmt, Policy, Stmt};
use crate::locals::{Local, LocalAllocator, DATA, INPUT};
use crate::location::Location;
use crate::rewrite::RewrittenVars;
use crate::scope::ScopeStack;
use crate::strings::StringPool;
use crate::trie::{value_to_key, FuncHandle, Key, TrieNode};

pub mod query;
pub mod refs;
pub mod rule;
pub mod term;

/// Everything the planner needs to produce a [`Policy`] (spec §6.1).
pub struct PlanInput {
    pub queries: Vec<QuerySet>,
    pub modules: Vec<Module>,
    pub builtins: BuiltinDecls,
    pub rewritten_vars: RewrittenVars,
    pub debug: Box<dyn DebugSink>,
    pub config: PlannerConfig,
}

impl PlanInput {
    /// Convenience constructor for the common case: no rewritten-var map, no
    /// debug sink, default config, standard comparison builtins.
    pub fn new(queries: Vec<QuerySet>, modules: Vec<Module>) -> Self {
        PlanInput {
            queries,
            modules,
            builtins: BuiltinDecls::standard(),
            rewritten_vars: RewrittenVars::new(),
            debug: Box::new(NullSink),
            config: PlannerConfig::default(),
        }
    }
}

/// A single-use planner instance (spec §5: "a second call to `Plan` on the
/// same instance has undefined semantics" — enforced here by `plan`
/// consuming `self`).
pub struct Planner {
    pub(crate) scope: ScopeStack,
    pub(crate) locals: LocalAllocator,
    pub(crate) strings: StringPool,
    pub(crate) builtins: BuiltinDecls,
    pub(crate) trie: Rc<TrieNode>,
    pub(crate) function_handles: BTreeMap<String, FuncHandle>,
    pub(crate) funcs: BTreeMap<String, crate::ir::Func>,
    pub(crate) rewritten_vars: RewrittenVars,
    pub(crate) debug: Box<dyn DebugSink>,
    pub(crate) config: PlannerConfig,
    /// Count of currently-active `with <root> as ...` rebindings per root
    /// name (`"input"`/`"data"`), maintained by `apply_with`/`restore_with`.
    /// Distinguishes a genuine `with data as X` rebind — which must suppress
    /// virtual-document resolution per spec §4.3.6 — from the ordinary
    /// `data -> data_param` shadow a rule function's scope frame installs at
    /// entry (spec §9 "Global root documents"), which must *not* suppress it
    /// (spec §4.4).
    pub(crate) with_rebind_depth: HashMap<String, u32>,
    queries: Vec<QuerySet>,
}

impl Planner {
    pub fn new(input: PlanInput) -> PlanResult<Self> {
        let mut trie = TrieNode::new();
        for module in &input.modules {
            let package_path = ref_tail_keys(&module.package)?;
            trie.register_package(&package_path);
            for rule in &module.rules {
                let mut full_path = package_path.clone();
                full_path.extend(term_key_path(&rule.head.path)?);
                trie.insert(&full_path, rule.clone());
            }
        }

        Ok(Planner {
            scope: ScopeStack::new(),
            locals: LocalAllocator::new(),
            strings: StringPool::new(),
            builtins: input.builtins,
            trie: Rc::new(trie),
            function_handles: BTreeMap::new(),
            funcs: BTreeMap::new(),
            rewritten_vars: input.rewritten_vars,
            debug: input.debug,
            config: input.config,
            with_rebind_depth: HashMap::new(),
            queries: input.queries,
        })
    }

    /// Plan every rule set and every query set into a [`Policy`] (spec
    /// §6.2). Consumes `self`: a `Planner` is single-use (spec §5).
    pub fn plan(mut self) -> PlanResult<Policy> {
        self.debug.trace("planning started");

        let paths = self.collect_bucket_paths();
        for path in &paths {
            let name = path_label(path);
            let arity = self.trie.lookup(path).and_then(|n| n.bucket.as_ref()).map_or(0, |b| b.arity());
            self.function_handles.insert(name.clone(), FuncHandle { name, arity, return_local: 0 });
        }

        for path in &paths {
            tracing::debug!(path = %path_label(path), "planning rule set");
            let func = self.plan_rule_set_at(path)?;
            self.debug.trace(&format!("planned function {}", func.name));
            self.funcs.insert(func.name.clone(), func);
        }

        let queries = std::mem::take(&mut self.queries);
        let mut plans = Vec::with_capacity(queries.len());
        for query_set in &queries {
            tracing::debug!(query = %query_set.name, "planning query");
            let plan = self.plan_query_set(query_set)?;
            self.debug.trace(&format!("planned query {}", plan.name));
            plans.push(plan);
        }

        let mut policy = Policy::default();
        policy.static_data.strings = self.strings;
        policy.funcs = self.funcs;
        policy.plans = plans;
        self.debug.trace("planning finished");
        Ok(policy)
    }

    /// Collect the dotted key-path of every trie node holding a non-empty
    /// rule bucket, in a deterministic (sorted, depth-first) order.
    fn collect_bucket_paths(&self) -> Vec<Vec<Key>> {
        let mut out = Vec::new();
        collect_bucket_paths_from(&self.trie, &mut Vec::new(), &mut out);
        out
    }

    /// Append a located statement to `block`, copying `loc` verbatim (spec
    /// Invariant 4: never invent a location).
    pub(crate) fn emit(&mut self, block: &mut Block, loc: &Location, stmt: Stmt) {
        block.push(LocatedStmt::new(loc.clone(), stmt));
    }

    /// Resolve a `Var` term through the scope stack, allocating a fresh
    /// local on first sight (spec §4.3.2).
    pub(crate) fn resolve_var(&mut self, name: &str) -> Local {
        if let Some(local) = self.scope.get(name) {
            return local;
        }
        let fresh = self.locals.fresh();
        self.scope.put(name.to_string(), fresh);
        fresh
    }

    /// The dotted textual form of a ground reference, e.g. `data.test.p`
    /// (spec §6.2's function-name convention; also used for
    /// [`PlanError::IllegalRef`]/`UnknownOperator` messages).
    pub(crate) fn textual_ref(&self, term: &crate::ast::Term) -> PlanResult<String> {
        let path = ref_tail_keys(term)?;
        let head = match &term.value {
            Value::Ref(parts) => match &parts[0].value {
                Value::Var(name) => name.clone(),
                _ => {
                    return Err(PlanError::IllegalRef {
                        reason: "reference head must be a variable".to_string(),
                        location: term.location.clone(),
                    })
                }
            },
            _ => {
                return Err(PlanError::IllegalRef {
                    reason: "expected a reference".to_string(),
                    location: term.location.clone(),
                })
            }
        };
        Ok(path_label_with_head(&head, &path))
    }

    /// Look up a previously-registered function handle by its dotted path
    /// name (spec §4.3.3 "resolve the operator via the rule trie").
    pub(crate) fn lookup_function(&self, name: &str) -> Option<&FuncHandle> {
        self.function_handles.get(name)
    }

    /// Current value of the `INPUT`/`DATA` reserved locals, following any
    /// `with`-rebinding in scope, falling back to the reserved constant when
    /// unbound (spec §9 "Global root documents").
    pub(crate) fn current_root(&self, name: &str) -> Local {
        self.scope.get(name).unwrap_or(if name == "input" { INPUT } else { DATA })
    }

    /// Whether a genuine `with <name> as ...` rebind is currently active for
    /// `name` (spec §4.3.6) — as opposed to the ordinary rule-function
    /// parameter shadow installed at function entry (spec §9), which must
    /// not suppress virtual-document resolution (spec §4.4).
    pub(crate) fn is_with_rebound(&self, name: &str) -> bool {
        self.with_rebind_depth.get(name).copied().unwrap_or(0) > 0
    }
}

fn collect_bucket_paths_from(node: &TrieNode, prefix: &mut Vec<Key>, out: &mut Vec<Vec<Key>>) {
    if node.bucket.as_ref().is_some_and(|b| !b.rules.is_empty()) {
        out.push(prefix.clone());
    }
    for (key, child) in node.children() {
        prefix.push(key.clone());
        collect_bucket_paths_from(child, prefix, out);
        prefix.pop();
    }
}

/// Convert the path segments of a ground `Ref` term (skipping its head) into
/// trie [`Key`]s. Used for both module package paths and rule head paths.
pub(crate) fn ref_tail_keys(term: &crate::ast::Term) -> PlanResult<Vec<Key>> {
    match &term.value {
        Value::Ref(parts) => parts[1..].iter().map(term_to_key).collect(),
        _ => Ok(Vec::new()),
    }
}

/// Convert an arbitrary head-path `Term` (a bare `Var` naming the rule
/// locally, or a ground `Ref`/scalar) into the trie key segments it
/// contributes (spec §3.1 `Head.path`).
pub(crate) fn term_key_path(term: &crate::ast::Term) -> PlanResult<Vec<Key>> {
    match &term.value {
        Value::Var(name) => Ok(vec![Key::String(name.clone())]),
        Value::Ref(parts) => parts.iter().map(term_to_key).collect(),
        _ => Ok(vec![term_to_key(term)?]),
    }
}

fn term_to_key(term: &crate::ast::Term) -> PlanResult<Key> {
    value_to_key(&term.value).ok_or_else(|| PlanError::IllegalRef {
        reason: format!("expected a ground path segment, got {:?}", term.value),
        location: term.location.clone(),
    })
}

/// Render a dotted path rooted at `data`, e.g. `data.test.p` (spec §6.2).
pub(crate) fn path_label(path: &[Key]) -> String {
    path_label_with_head("data", path)
}

fn path_label_with_head(head: &str, path: &[Key]) -> String {
    let mut out = head.to_string();
    for key in path {
        out.push('.');
        out.push_str(&key.label());
    }
    out
}

/// Render an AST number as its canonical decimal text (used when a `Big`
/// literal falls back to float and the compiler needs a printable form for
/// diagnostics — not used on the hot path, which prefers `Number::parse`).
#[allow(dead_code)]
pub(crate) fn number_text(n: &Number) -> String {
    match n {
        Number::Int(i) => i.to_string(),
        Number::Float(f) => f.to_string(),
        Number::Big(s) => s.clone(),
    }
}
