//! The cost-expression tree (spec §4.6, §6.4 `<time node>`).
//!
//! A `TimeNode` is either a leaf naming a ground prefix (`input.foo`), a
//! `Sum` of sub-costs, or a `Product` of sub-costs. The empty `Product` is
//! the multiplicative identity and renders as `O(1)` — the constant cost a
//! rule with no ref-bearing expressions gets (spec §8 scenario A).

use std::fmt;

use serde::{Deserialize, Serialize};

/// A node in the symbolic cost tree. JSON shape matches spec §6.4 exactly:
/// `{"r": <prefix>}`, `{"sum": [...]}`, or `{"product": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeNode {
    R(String),
    Sum(Vec<TimeNode>),
    Product(Vec<TimeNode>),
}

impl TimeNode {
    /// The constant cost `O(1)`, represented as the empty product.
    pub fn one() -> Self {
        TimeNode::Product(Vec::new())
    }

    pub fn prefix(p: impl Into<String>) -> Self {
        TimeNode::R(p.into())
    }

    /// `O(1)` iff this node carries no actual cost term.
    pub fn is_trivial(&self) -> bool {
        match self {
            TimeNode::Product(items) => items.is_empty(),
            TimeNode::Sum(items) => items.is_empty(),
            TimeNode::R(_) => false,
        }
    }

    /// Multiply `self` by `factor`, flattening nested products and dropping
    /// either side if it is the identity (spec §4.6 "Body composition": a
    /// ref-bearing expression multiplies the accumulated cost).
    ///
    /// `factor` is prepended — it represents an earlier (more source-order)
    /// expression than `self`, since body composition walks right to left.
    pub fn multiply_prepend(factor: TimeNode, acc: TimeNode) -> TimeNode {
        if factor.is_trivial() {
            return acc;
        }
        if acc.is_trivial() {
            return factor;
        }
        let mut items = match factor {
            TimeNode::Product(items) => items,
            other => vec![other],
        };
        match acc {
            TimeNode::Product(rest) => items.extend(rest),
            other => items.push(other),
        }
        TimeNode::Product(items)
    }

    /// Add `term` into `acc` (spec §4.6 "a scalar/equality adds"), skipping
    /// the addend when `acc` already contains it (spec §4.6 "Output": "the
    /// cost tree supports containment checks used to suppress redundant
    /// additions").
    pub fn add_prepend(term: TimeNode, acc: TimeNode) -> TimeNode {
        if term.is_trivial() {
            return acc;
        }
        if acc.contains(&term) {
            return acc;
        }
        let mut items = vec![term];
        match acc {
            TimeNode::Sum(rest) => items.extend(rest),
            other if other.is_trivial() => {}
            other => items.push(other),
        }
        TimeNode::Sum(items)
    }

    /// Does this cost tree already contain `needle` as one of its terms
    /// (recursively through `Sum`/`Product`)? Used to suppress redundant
    /// additions (spec §4.6).
    pub fn contains(&self, needle: &TimeNode) -> bool {
        if self == needle {
            return true;
        }
        match self {
            TimeNode::Sum(items) | TimeNode::Product(items) => items.iter().any(|i| i.contains(needle)),
            TimeNode::R(_) => false,
        }
    }

    /// All leaf prefixes mentioned anywhere in this tree, for prefix
    /// subsumption checks against other expressions.
    pub fn leaf_prefixes(&self) -> Vec<&str> {
        match self {
            TimeNode::R(p) => vec![p.as_str()],
            TimeNode::Sum(items) | TimeNode::Product(items) => {
                items.iter().flat_map(TimeNode::leaf_prefixes).collect()
            }
        }
    }

    fn render_bare(&self) -> String {
        match self {
            TimeNode::R(p) => p.clone(),
            TimeNode::Sum(items) => {
                if items.is_empty() {
                    "0".to_string()
                } else {
                    items.iter().map(TimeNode::render_bare).collect::<Vec<_>>().join(" + ")
                }
            }
            TimeNode::Product(items) => {
                if items.is_empty() {
                    "1".to_string()
                } else {
                    items.iter().map(TimeNode::render_factor).collect::<Vec<_>>().join(" * ")
                }
            }
        }
    }

    /// Render as a factor inside a product: a non-trivial `Sum` needs
    /// `[...]` grouping so `*` binds tighter than `+` (spec §4.6 "`[…]` for
    /// grouping").
    fn render_factor(&self) -> String {
        match self {
            TimeNode::Sum(items) if !items.is_empty() => format!("[{}]", self.render_bare()),
            other => other.render_bare(),
        }
    }
}

impl fmt::Display for TimeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O({})", self.render_bare())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_renders_as_o1() {
        assert_eq!(TimeNode::one().to_string(), "O(1)");
    }

    #[test]
    fn single_prefix_renders_bare() {
        assert_eq!(TimeNode::prefix("input.foo").to_string(), "O(input.foo)");
    }

    #[test]
    fn product_joins_with_star() {
        let node = TimeNode::Product(vec![TimeNode::prefix("input.foo"), TimeNode::prefix("input.bar")]);
        assert_eq!(node.to_string(), "O(input.foo * input.bar)");
    }

    #[test]
    fn multiply_prepend_skips_trivial_sides() {
        let acc = TimeNode::prefix("input.bar");
        let result = TimeNode::multiply_prepend(TimeNode::one(), acc.clone());
        assert_eq!(result, acc);

        let result = TimeNode::multiply_prepend(TimeNode::prefix("input.foo"), TimeNode::one());
        assert_eq!(result, TimeNode::prefix("input.foo"));
    }

    #[test]
    fn multiply_prepend_flattens_and_orders() {
        let acc = TimeNode::prefix("input.bar");
        let result = TimeNode::multiply_prepend(TimeNode::prefix("input.foo"), acc);
        assert_eq!(result, TimeNode::Product(vec![TimeNode::prefix("input.foo"), TimeNode::prefix("input.bar")]));
    }

    #[test]
    fn add_prepend_skips_already_contained_addend() {
        let acc = TimeNode::Sum(vec![TimeNode::prefix("input.foo")]);
        let result = TimeNode::add_prepend(TimeNode::prefix("input.foo"), acc.clone());
        assert_eq!(result, acc);
    }

    #[test]
    fn sum_inside_product_is_bracketed() {
        let node = TimeNode::Product(vec![
            TimeNode::Sum(vec![TimeNode::prefix("a"), TimeNode::prefix("b")]),
            TimeNode::prefix("c"),
        ]);
        assert_eq!(node.to_string(), "O([a + b] * c)");
    }

    #[test]
    fn json_shape_matches_spec_schema() {
        let node = TimeNode::Product(vec![TimeNode::prefix("input.foo")]);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json, serde_json::json!({"product": [{"r": "input.foo"}]}));
    }

    #[test]
    fn contains_finds_nested_term() {
        let tree = TimeNode::Product(vec![TimeNode::prefix("input.foo"), TimeNode::prefix("input.bar")]);
        assert!(tree.contains(&TimeNode::prefix("input.bar")));
        assert!(!tree.contains(&TimeNode::prefix("input.baz")));
    }
}
