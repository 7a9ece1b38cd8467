//! Rule trie (component D, spec §3.2, §4.1).
//!
//! A tree keyed by ground AST values along a reference path. Used to
//! organize rules (and empty packages) so the planner can answer both
//! "what rule bucket is at this exact path" and "does any rule exist under
//! this prefix" — the latter is what the virtual-extent and base-scan
//! exclusion logic in §4.4 needs, which a flat path->bucket map cannot
//! answer efficiently (spec §9 "Rule trie vs. flat map").

use std::collections::BTreeMap;

use crate::ast::{Number, Rule, Value};
use crate::locals::Local;

/// A single ground path segment, ordered `Null < Boolean < Number < String`
/// and then by value within each kind (spec §9: "sort by a total order over
/// value variants").
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    Null,
    Boolean(bool),
    /// Numbers compare by their `f64` projection; `Big` literals compare by
    /// text after numeric equivalents, which is an acceptable total order
    /// since rule paths are never indexed by fractional/huge literals in
    /// practice.
    Number(NumberKey),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberKey(pub Number);

impl Key {
    fn rank(&self) -> u8 {
        match self {
            Key::Null => 0,
            Key::Boolean(_) => 1,
            Key::Number(_) => 2,
            Key::String(_) => 3,
        }
    }

    /// Textual form used when rendering a dotted path, e.g. for function
    /// names (spec §6.2) and `textual_ref` error messages. Distinct from
    /// [`Key::sort_text`], which is zero-padded for ordering rather than
    /// readability.
    pub fn label(&self) -> String {
        match self {
            Key::Null => "null".to_string(),
            Key::Boolean(b) => b.to_string(),
            Key::Number(NumberKey(Number::Int(i))) => i.to_string(),
            Key::Number(NumberKey(Number::Float(f))) => f.to_string(),
            Key::Number(NumberKey(Number::Big(s))) => s.clone(),
            Key::String(s) => s.clone(),
        }
    }

    fn sort_text(&self) -> String {
        match self {
            Key::Null => String::new(),
            Key::Boolean(b) => b.to_string(),
            Key::Number(NumberKey(Number::Int(i))) => format!("{i:020}"),
            Key::Number(NumberKey(Number::Float(f))) => format!("{f}"),
            Key::Number(NumberKey(Number::Big(s))) => s.clone(),
            Key::String(s) => s.clone(),
        }
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.sort_text().cmp(&other.sort_text()))
    }
}

/// Convert a ground AST value into a trie [`Key`]. Returns `None` for
/// non-ground or non-scalar values, which cannot appear as a static path
/// segment.
pub fn value_to_key(value: &Value) -> Option<Key> {
    match value {
        Value::Null => Some(Key::Null),
        Value::Boolean(b) => Some(Key::Boolean(*b)),
        Value::Number(n) => Some(Key::Number(NumberKey(n.clone()))),
        Value::String(s) => Some(Key::String(s.clone())),
        _ => None,
    }
}

/// A lazily-filled planned function handle: the IR function this bucket
/// lowers to, once planned.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncHandle {
    pub name: String,
    pub arity: usize,
    pub return_local: Local,
}

/// The ordered list of AST rules sharing a single full head path. Each
/// `Rule` entry may itself be the head of an else-chain (spec §9); the
/// bucket holds one entry per *chain*, not per branch.
#[derive(Debug, Clone, Default)]
pub struct RuleBucket {
    pub rules: Vec<Rule>,
    pub planned: Option<FuncHandle>,
}

impl RuleBucket {
    /// Arity shared by every rule in the bucket (spec §3.2 invariant: "all
    /// rules in a bucket have identical arity").
    pub fn arity(&self) -> usize {
        self.rules.first().map_or(0, |r| r.head.arity())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrieNode {
    children: BTreeMap<Key, TrieNode>,
    pub bucket: Option<RuleBucket>,
    /// True when this node was reached by a `package` declaration, even if
    /// it holds no rules (spec §3.1: "empty modules still register their
    /// package path").
    pub is_package: bool,
}

impl TrieNode {
    pub fn new() -> Self {
        TrieNode::default()
    }

    fn child_mut(&mut self, key: Key) -> &mut TrieNode {
        self.children.entry(key).or_default()
    }

    /// Walk/create nodes along `path`, appending `rule` to the leaf's
    /// bucket. Two rules share a node iff they have identical head paths.
    pub fn insert(&mut self, path: &[Key], rule: Rule) {
        let node = self.walk_create(path);
        node.bucket.get_or_insert_with(RuleBucket::default).rules.push(rule);
    }

    /// Register a package path, creating the node if needed, without adding
    /// any rule.
    pub fn register_package(&mut self, path: &[Key]) {
        self.walk_create(path).is_package = true;
    }

    fn walk_create(&mut self, path: &[Key]) -> &mut TrieNode {
        let mut node = self;
        for key in path {
            node = node.child_mut(key.clone());
        }
        node
    }

    /// Return the node at `path`, or `None`. Never creates nodes.
    pub fn lookup(&self, path: &[Key]) -> Option<&TrieNode> {
        let mut node = self;
        for key in path {
            node = node.children.get(key)?;
        }
        Some(node)
    }

    pub fn lookup_mut(&mut self, path: &[Key]) -> Option<&mut TrieNode> {
        let mut node = self;
        for key in path {
            node = node.children.get_mut(key)?;
        }
        Some(node)
    }

    /// Like [`lookup`](Self::lookup), but on miss creates intermediate nodes
    /// and attaches `default` at the leaf bucket if it has none.
    pub fn lookup_or_insert_default(&mut self, path: &[Key]) -> &mut TrieNode {
        let node = self.walk_create(path);
        node.bucket.get_or_insert_with(RuleBucket::default);
        node
    }

    /// Enumerate direct child keys in deterministic (sorted) order.
    pub fn children(&self) -> impl Iterator<Item = (&Key, &TrieNode)> {
        self.children.iter()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Does any rule exist at or under this node (including itself)? Used
    /// to compute the virtual extent of a data reference (spec §4.1
    /// rationale).
    pub fn has_rules_under(&self) -> bool {
        if self.bucket.as_ref().is_some_and(|b| !b.rules.is_empty()) {
            return true;
        }
        self.children.values().any(TrieNode::has_rules_under)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{RuleBuilder, TermBuilder};

    fn path(segs: &[&str]) -> Vec<Key> {
        segs.iter().map(|s| Key::String(s.to_string())).collect()
    }

    #[test]
    fn insert_and_lookup_roundtrip() {
        let mut trie = TrieNode::new();
        let rule = RuleBuilder::new("p").value(TermBuilder::int(1)).build();
        trie.insert(&path(&["test", "p"]), rule);

        let node = trie.lookup(&path(&["test", "p"])).expect("node present");
        assert_eq!(node.bucket.as_ref().unwrap().rules.len(), 1);
    }

    #[test]
    fn lookup_miss_never_creates_nodes() {
        let trie = TrieNode::new();
        assert!(trie.lookup(&path(&["absent"])).is_none());
    }

    #[test]
    fn children_are_sorted_by_key_order() {
        let mut trie = TrieNode::new();
        trie.register_package(&[Key::String("zebra".into())]);
        trie.register_package(&[Key::String("alpha".into())]);
        trie.register_package(&[Key::Boolean(true)]);
        trie.register_package(&[Key::Null]);

        let ordered: Vec<&Key> = trie.children().map(|(k, _)| k).collect();
        assert_eq!(
            ordered,
            vec![
                &Key::Null,
                &Key::Boolean(true),
                &Key::String("alpha".into()),
                &Key::String("zebra".into()),
            ]
        );
    }

    #[test]
    fn has_rules_under_finds_nested_bucket() {
        let mut trie = TrieNode::new();
        let rule = RuleBuilder::new("p").value(TermBuilder::int(1)).build();
        trie.insert(&path(&["test", "nested", "p"]), rule);
        let node = trie.lookup(&path(&["test"])).unwrap();
        assert!(node.has_rules_under());
    }

    #[test]
    fn empty_package_registers_without_rules() {
        let mut trie = TrieNode::new();
        trie.register_package(&path(&["empty"]));
        let node = trie.lookup(&path(&["empty"])).unwrap();
        assert!(node.is_package);
        assert!(!node.has_rules_under());
    }

    #[test]
    fn bucket_arity_matches_rule_args() {
        let mut bucket = RuleBucket::default();
        bucket.rules.push(
            RuleBuilder::new("f")
                .args(vec![TermBuilder::var("x")])
                .value(TermBuilder::var("x"))
                .build(),
        );
        assert_eq!(bucket.arity(), 1);
    }
}
