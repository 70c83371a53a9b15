use std::fmt::{self, Display};

use smol_str::SmolStr;

pub mod attr_keys {
    pub const CLASS: &str = "class";
    pub const EXT: &str = "ext";
    pub const META: &str = "meta";
    pub const HREF: &str = "href";
    pub const SRC: &str = "src";
    pub const ALT: &str = "alt";
    pub const TITLE: &str = "title";
    pub const START: &str = "start";
    pub const ALIGN: &str = "align";
    pub const CHECKED: &str = "checked";
}

/// Ordered attribute list with unique keys.
///
/// Inserting a key that is already present replaces the value in place, so the
/// original position of the key is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
pub struct Attributes(Vec<(SmolStr, String)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<SmolStr>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();

        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<SmolStr>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut attrs = Self::new();
        for (k, v) in iter {
            attrs.insert(k, v);
        }
        attrs
    }
}

/// A compound node: tag name, attributes and ordered children.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
pub struct Element {
    pub tag: SmolStr,
    pub attrs: Attributes,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<SmolStr>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Attributes::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<SmolStr>, value: impl Into<String>) -> Self {
        self.attrs.insert(key, value);
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key)
    }

    /// Returns the text of the element when its only payload is a single text leaf.
    pub fn sole_text(&self) -> Option<&str> {
        match self.children.as_slice() {
            [Node::Text(text)] => Some(text.as_str()),
            _ => None,
        }
    }
}

/// A node in a document tree.
///
/// The tree is either a text leaf or an element holding further nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "json",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "type", content = "value", rename_all = "camelCase")
)]
pub enum Node {
    Text(String),
    Element(Element),
}

impl Node {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn element(tag: impl Into<SmolStr>, children: Vec<Node>) -> Self {
        Self::Element(Element::new(tag).with_children(children))
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(element) => Some(element),
            Self::Text(_) => None,
        }
    }

    /// Concatenated text of this node and all of its descendants.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Element(element) => element.children.iter().map(Node::to_text).collect(),
        }
    }

    /// Depth-first search for the first node satisfying `pred`.
    pub fn find(&self, pred: &impl Fn(&Node) -> bool) -> Option<&Node> {
        if pred(self) {
            return Some(self);
        }

        match self {
            Self::Text(_) => None,
            Self::Element(element) => element.children.iter().find_map(|child| child.find(pred)),
        }
    }
}

impl From<Element> for Node {
    fn from(value: Element) -> Self {
        Self::Element(value)
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::html::serialize_html(std::slice::from_ref(self)))
    }
}
