use std::collections::btree_map::{self, BTreeMap};

use serde::{Deserialize, Serialize};

/// The translated attributes of one entity in one language.
///
/// Maps attribute name to value; a `None` value is a translation that was
/// explicitly stored as JSON `null`. An empty map means "no translation in
/// this language" and is never persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeMap(BTreeMap<String, Option<String>>);

impl AttributeMap {
    /// Create an empty attribute map.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no attributes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up an attribute. The outer `Option` is presence, the inner one
    /// a stored `null`.
    pub fn get(&self, attribute: &str) -> Option<Option<&str>> {
        self.0.get(attribute).map(Option::as_deref)
    }

    /// Returns `true` if the attribute is present (even if `null`).
    pub fn contains(&self, attribute: &str) -> bool {
        self.0.contains_key(attribute)
    }

    /// Insert or overwrite an attribute value.
    pub fn insert(&mut self, attribute: impl Into<String>, value: Option<String>) {
        self.0.insert(attribute.into(), value);
    }

    /// Builder-style [`Self::insert`] for a non-null value.
    #[must_use]
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(attribute, Some(value.into()));
        self
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove(&mut self, attribute: &str) -> Option<Option<String>> {
        self.0.remove(attribute)
    }

    /// Overlay `patch` onto `self`: values in `patch` win on collision,
    /// untouched attributes survive.
    pub fn merge(&mut self, patch: &AttributeMap) {
        for (name, value) in &patch.0 {
            self.0.insert(name.clone(), value.clone());
        }
    }

    /// A copy of this map with the named attributes removed.
    #[must_use]
    pub fn without<S: AsRef<str>>(&self, attributes: &[S]) -> Self {
        let mut out = self.clone();
        for name in attributes {
            out.0.remove(name.as_ref());
        }
        out
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Option<String>> {
        self.0.iter()
    }

    /// Attribute names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Unwrap into the underlying map.
    pub fn into_inner(self) -> BTreeMap<String, Option<String>> {
        self.0
    }
}

impl From<BTreeMap<String, Option<String>>> for AttributeMap {
    fn from(map: BTreeMap<String, Option<String>>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AttributeMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), Some(v.into())))
                .collect(),
        )
    }
}

impl IntoIterator for AttributeMap {
    type Item = (String, Option<String>);
    type IntoIter = btree_map::IntoIter<String, Option<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a AttributeMap {
    type Item = (&'a String, &'a Option<String>);
    type IntoIter = btree_map::Iter<'a, String, Option<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> AttributeMap {
        pairs.iter().copied().collect()
    }

    #[test]
    fn merge_overwrites_and_keeps_untouched() {
        let mut base = map(&[("a", "1"), ("b", "2")]);
        base.merge(&map(&[("a", "9")]));
        assert_eq!(base, map(&[("a", "9"), ("b", "2")]));
    }

    #[test]
    fn merge_can_add_new_attributes() {
        let mut base = map(&[("a", "1")]);
        base.merge(&map(&[("c", "3")]));
        assert_eq!(base.len(), 2);
        assert_eq!(base.get("c"), Some(Some("3")));
    }

    #[test]
    fn without_removes_named_attributes_only() {
        let base = map(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let trimmed = base.without(&["a", "c", "missing"]);
        assert_eq!(trimmed, map(&[("b", "2")]));
        assert!(base.without(&["a", "b", "c"]).is_empty());
    }

    #[test]
    fn null_values_are_distinct_from_absent() {
        let mut attrs = AttributeMap::new();
        attrs.insert("subtitle", None);
        assert!(attrs.contains("subtitle"));
        assert_eq!(attrs.get("subtitle"), Some(None));
        assert_eq!(attrs.get("title"), None);
    }

    #[test]
    fn serializes_as_plain_json_object() {
        let mut attrs = map(&[("title", "Hello")]);
        attrs.insert("body", None);
        let json = serde_json::to_string(&attrs).unwrap();
        assert_eq!(json, r#"{"body":null,"title":"Hello"}"#);

        let back: AttributeMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, attrs);
    }
}
