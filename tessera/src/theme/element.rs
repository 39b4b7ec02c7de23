use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Node of a render theme document.
///
/// A theme is an ordered tree of named elements with string attributes, serialized as JSON:
///
/// ```json
/// {
///   "name": "rendertheme",
///   "children": [
///     { "name": "rule", "attributes": { "e": "way", "k": "natural", "v": "water" },
///       "children": [ { "name": "area", "attributes": { "fill": "#B5D0D0" } } ] }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThemeElement {
    /// Element name: `rule`, `area`, `line`, `caption` and so on.
    pub name: String,
    /// Element attributes.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
    /// Child elements in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ThemeElement>,
}

impl ThemeElement {
    /// Creates an element without attributes and children.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Appends a child element.
    pub fn with_child(mut self, child: ThemeElement) -> Self {
        self.children.push(child);
        self
    }

    /// Value of the attribute, if present.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Depth-first iterator over the element and all its descendants.
    pub fn descendants(&self) -> impl Iterator<Item = &ThemeElement> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(next.children.iter().rev());
            Some(next)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_with_defaults() {
        let element: ThemeElement = serde_json::from_str(
            r#"{"name": "rendertheme", "children": [{"name": "rule", "attributes": {"k": "highway"}}]}"#,
        )
        .unwrap();

        assert_eq!(element.name, "rendertheme");
        assert!(element.attributes.is_empty());
        assert_eq!(element.children[0].attribute("k"), Some("highway"));
        assert_eq!(element.children[0].attribute("v"), None);
    }

    #[test]
    fn descendants_in_document_order() {
        let element = ThemeElement::new("a")
            .with_child(ThemeElement::new("b").with_child(ThemeElement::new("c")))
            .with_child(ThemeElement::new("d"));
        let names: Vec<_> = element.descendants().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
    }
}
