//! Workflow Document Model
//!
//! An ordered element tree representing the emitted workflow document.
//! Attribute and child order are both significant: the destination
//! schema is order-sensitive for some elements, so everything is backed
//! by vectors rather than maps.
//!
//! Entity references (`&name;`) live as plain text children alongside
//! element children, which is why children are a mixed [`Node`] list.

use std::fs;
use std::path::Path;

use serde_yaml::value::TaggedValue;
use serde_yaml::Value;

use crate::config::scalar_to_string;
use crate::error::Result;
use crate::workflow::serializer::to_pretty_xml;

/// A single element in the workflow document tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Tag name.
    pub name: String,

    /// Attributes in declaration order.
    pub attrs: Vec<(String, String)>,

    /// Child nodes in document order; text and elements may interleave.
    pub children: Vec<Node>,
}

/// A child of an [`Element`].
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    /// Creates an element with no attributes or children.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Appends an attribute, preserving declaration order.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attrs.push((name.into(), value.into()));
    }

    /// Returns the value of the named attribute, if present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Appends a child element.
    pub fn push_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Appends a text child.
    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(Node::Text(text.into()));
    }

    /// Returns the first child element with the given tag name.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.children.iter().find_map(|node| match node {
            Node::Element(el) if el.name == name => Some(el),
            _ => None,
        })
    }

    /// Returns every child element with the given tag name, in order.
    pub fn find_all(&self, name: &str) -> Vec<&Element> {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Element(el) if el.name == name => Some(el),
                _ => None,
            })
            .collect()
    }

    /// Returns the child elements in document order.
    pub fn child_elements(&self) -> Vec<&Element> {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Element(el) => Some(el),
                _ => None,
            })
            .collect()
    }

    /// Concatenates the element's direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Attaches configuration content to an element: a `!cycstr` tagged
/// value becomes a structured `<cyclestr>` child, anything else becomes
/// text content.
pub fn attach_content(parent: &mut Element, value: &Value) {
    if let Value::Tagged(tagged) = value {
        if tagged.tag == "cycstr" {
            parent.push_child(cyclestr_element(tagged));
            return;
        }
    }
    parent.push_text(scalar_to_string(value));
}

/// Builds a `<cyclestr>` element from a `!cycstr` tagged mapping: the
/// `value` entry is the content, every other entry an attribute.
pub fn cyclestr_element(tagged: &TaggedValue) -> Element {
    let mut element = Element::new("cyclestr");

    match tagged.value.as_mapping() {
        Some(map) => {
            for (key, value) in map {
                let key = scalar_to_string(key);
                if key != "value" {
                    element.set_attr(key, scalar_to_string(value));
                }
            }
            if let Some(content) = map.get("value") {
                element.push_text(scalar_to_string(content));
            }
        }
        None => element.push_text(scalar_to_string(&tagged.value)),
    }

    element
}

/// The fully assembled workflow document: the entity-declaration header
/// plus the `<workflow>` tree. Header and body use different declaration
/// syntaxes, so they are kept as two blocks and concatenated on render.
#[derive(Debug, Clone)]
pub struct WorkflowDocument {
    /// XML declaration and DOCTYPE header with entity declarations.
    pub header: String,

    /// Root `<workflow>` element.
    pub root: Element,
}

impl WorkflowDocument {
    /// Renders the complete document as text.
    pub fn render(&self) -> String {
        format!("{}\n{}", self.header, to_pretty_xml(&self.root))
    }

    /// Writes the rendered document to a file.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.render())?;
        Ok(())
    }
}
