//! String pool (component A, spec §3.5).
//!
//! A growing list plus a name->index map guaranteeing deduplication. Index is
//! stable across the build — two requests for the same literal always yield
//! the same index, and indices are handed out in first-seen order (spec
//! Invariant 2, "String dedup").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Stable index into a [`StringPool`].
pub type StringIndex = u32;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StringPool {
    strings: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, StringIndex>,
}

impl StringPool {
    pub fn new() -> Self {
        StringPool::default()
    }

    /// Intern `s`, returning its stable index. Repeated calls with an equal
    /// string return the same index.
    pub fn intern(&mut self, s: impl Into<String>) -> StringIndex {
        let s = s.into();
        if let Some(&idx) = self.index.get(&s) {
            return idx;
        }
        let idx = self.strings.len() as StringIndex;
        self.index.insert(s.clone(), idx);
        self.strings.push(s);
        idx
    }

    pub fn get(&self, idx: StringIndex) -> Option<&str> {
        self.strings.get(idx as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// The interned strings, in index order (index `i` is `strings()[i]`).
    pub fn strings(&self) -> &[String] {
        &self.strings
    }
}

/// Rebuild the dedup index after deserializing (the index map is not
/// serialized; it is derived from `strings`).
impl StringPool {
    pub fn rebuild_index(&mut self) {
        self.index = self
            .strings
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i as StringIndex))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedups_repeated_literal() {
        let mut pool = StringPool::new();
        let a = pool.intern("foo");
        let b = pool.intern("foo");
        assert_eq!(a, b);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn distinct_literals_get_distinct_indices() {
        let mut pool = StringPool::new();
        let a = pool.intern("foo");
        let b = pool.intern("bar");
        assert_ne!(a, b);
        assert_eq!(pool.get(a), Some("foo"));
        assert_eq!(pool.get(b), Some("bar"));
    }

    #[test]
    fn indices_are_first_seen_order() {
        let mut pool = StringPool::new();
        assert_eq!(pool.intern("a"), 0);
        assert_eq!(pool.intern("b"), 1);
        assert_eq!(pool.intern("a"), 0);
    }

    proptest::proptest! {
        #[test]
        fn intern_is_idempotent(s in "[a-z]{1,12}") {
            let mut pool = StringPool::new();
            let first = pool.intern(s.clone());
            let second = pool.intern(s);
            proptest::prop_assert_eq!(first, second);
        }
    }
}
