//! Dotted-path lookup over execution state.
//!
//! Conditions, templates and transforms all read values by path
//! (`user.address.city`, `items.0`).  Anything that can answer such a lookup
//! implements [`Scope`].  A missing segment yields `None`, the "undefined"
//! value.

use serde_json::Value;

/// Read-only view that resolves dotted paths.
pub trait Scope: Send + Sync {
    /// Resolve `path`, or `None` if any segment is missing.
    fn lookup(&self, path: &str) -> Option<Value>;
}

impl Scope for Value {
    fn lookup(&self, path: &str) -> Option<Value> {
        get_path(self, path).cloned()
    }
}

/// Walk `path` from `root`.  Numeric segments index arrays; an empty path
/// returns the root.
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim().trim_start_matches('.');
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Split a path into its first segment and the remainder.
pub fn split_head(path: &str) -> (&str, &str) {
    let path = path.trim().trim_start_matches('.');
    match path.split_once('.') {
        Some((head, rest)) => (head, rest),
        None => (path, ""),
    }
}

/// Scope exposing one element as `item` on top of a parent scope.
pub struct ItemScope<'a> {
    item: &'a Value,
    index: usize,
    parent: &'a dyn Scope,
}

impl<'a> ItemScope<'a> {
    pub fn new(item: &'a Value, index: usize, parent: &'a dyn Scope) -> Self {
        Self {
            item,
            index,
            parent,
        }
    }
}

impl Scope for ItemScope<'_> {
    fn lookup(&self, path: &str) -> Option<Value> {
        match split_head(path) {
            ("item", rest) => get_path(self.item, rest).cloned(),
            ("index", "") => Some(Value::from(self.index)),
            _ => self.parent.lookup(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_paths() {
        let root = json!({"user": {"tags": ["a", "b"], "age": 3}});
        assert_eq!(root.lookup("user.age"), Some(json!(3)));
        assert_eq!(root.lookup("user.tags.1"), Some(json!("b")));
        assert_eq!(root.lookup("user.missing"), None);
        assert_eq!(root.lookup("user.age.deeper"), None);
        assert_eq!(root.lookup(""), Some(root.clone()));
    }

    #[test]
    fn item_scope_shadows_parent() {
        let parent = json!({"item": "parent", "limit": 5});
        let item = json!({"price": 9});
        let scope = ItemScope::new(&item, 2, &parent);
        assert_eq!(scope.lookup("item.price"), Some(json!(9)));
        assert_eq!(scope.lookup("index"), Some(json!(2)));
        assert_eq!(scope.lookup("limit"), Some(json!(5)));
    }
}
