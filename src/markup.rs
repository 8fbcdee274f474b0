//! Owned SVG element trees and serialized markup.
//!
//! Stages that need to change markup parse it into an [`Element`] tree,
//! edit the tree, and serialize it back. Anchor lookups therefore either
//! find a real element or fail loudly; nothing is spliced into the middle
//! of a tag.

use std::fmt;

use crate::error::{ExportError, ExportResult};

pub const SVG_NS: &str = "http://www.w3.org/2000/svg";
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

// ============================================================================
// SvgMarkup
// ============================================================================

/// Serialized, self-contained SVG markup.
///
/// Each pipeline stage consumes one value and returns a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvgMarkup(String);

impl SvgMarkup {
    pub fn new(markup: impl Into<String>) -> Self {
        Self(markup.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Parses the markup into an element tree rooted at `<svg>`.
    pub fn parse(&self) -> ExportResult<Element> {
        Element::parse_svg(&self.0)
    }
}

impl From<&Element> for SvgMarkup {
    fn from(root: &Element) -> Self {
        Self(root.to_markup())
    }
}

impl fmt::Display for SvgMarkup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Element tree
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element with its attributes in document order.
///
/// Names carry their prefix (`xlink:href`), matching how they are written.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Builder-style text child.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Sets an attribute, replacing an existing value in place.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let index = self.attributes.iter().position(|(key, _)| key == name)?;
        Some(self.attributes.remove(index).1)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }

    /// Concatenated text of the direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|child| match child {
                Node::Text(text) => Some(text.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// Inserts `node` immediately before the first descendant named `name`,
    /// searching in document order. Returns the node back if no such
    /// descendant exists.
    pub fn insert_before_first(&mut self, name: &str, node: Node) -> Result<(), Node> {
        let mut node = Some(node);
        if self.insert_before_first_inner(name, &mut node) {
            Ok(())
        } else {
            Err(node.take().unwrap_or(Node::Text(String::new())))
        }
    }

    fn insert_before_first_inner(&mut self, name: &str, node: &mut Option<Node>) -> bool {
        for index in 0..self.children.len() {
            if let Node::Element(child) = &self.children[index] {
                if child.name == name {
                    if let Some(node) = node.take() {
                        self.children.insert(index, node);
                    }
                    return true;
                }
            }
            if let Node::Element(child) = &mut self.children[index] {
                if child.insert_before_first_inner(name, node) {
                    return true;
                }
            }
        }
        false
    }

    /// Removes every descendant element for which `drop` returns true.
    pub fn retain_elements(&mut self, drop: &impl Fn(&Element) -> bool) {
        self.children.retain(|child| match child {
            Node::Element(element) => !drop(element),
            Node::Text(_) => true,
        });
        for child in &mut self.children {
            if let Node::Element(element) = child {
                element.retain_elements(drop);
            }
        }
    }

    /// Visits this element and every descendant element, depth first.
    pub fn walk(&self, visit: &mut impl FnMut(&Element)) {
        visit(self);
        for child in self.child_elements() {
            child.walk(visit);
        }
    }

    // ---- Parsing ----

    /// Parses markup whose root element must be `<svg>`.
    pub fn parse_svg(markup: &str) -> ExportResult<Self> {
        let doc = roxmltree::Document::parse(markup)?;
        let root = doc.root_element();
        if root.tag_name().name() != "svg" {
            return Err(ExportError::NotSvg(root.tag_name().name().to_string()));
        }

        Ok(Self::from_xml(root, None))
    }

    fn from_xml(node: roxmltree::Node<'_, '_>, parent: Option<roxmltree::Node<'_, '_>>) -> Self {
        let tag = node.tag_name();
        let mut element = Self::new(tag.name());

        if let Some(parent) = parent {
            if tag.namespace() != parent.tag_name().namespace() {
                if let Some(ns) = tag.namespace() {
                    element.set_attr("xmlns", ns);
                }
            }
        }

        let mut uses_xlink = false;
        for attr in node.attributes() {
            let name = match attr.namespace() {
                Some(XLINK_NS) => {
                    uses_xlink = true;
                    format!("xlink:{}", attr.name())
                }
                Some(XML_NS) => format!("xml:{}", attr.name()),
                _ => attr.name().to_string(),
            };
            element.attributes.push((name, attr.value().to_string()));
        }

        // re-declare every binding this node adds to its parent's scope
        let in_parent_scope = |prefix: Option<&str>, uri: &str| {
            parent.is_some_and(|p| p.namespaces().any(|ns| ns.name() == prefix && ns.uri() == uri))
        };
        for ns in node.namespaces() {
            if ns.name() == Some("xml") || in_parent_scope(ns.name(), ns.uri()) {
                continue;
            }
            match ns.name() {
                Some(prefix) => element.set_attr(format!("xmlns:{prefix}"), ns.uri()),
                None => element.set_attr("xmlns", ns.uri()),
            }
        }

        // xlink attributes are written with the `xlink` prefix whatever
        // prefix the source bound
        let xlink_bound = node
            .namespaces()
            .any(|ns| ns.name() == Some("xlink") && ns.uri() == XLINK_NS);
        if uses_xlink && !xlink_bound {
            element.set_attr("xmlns:xlink", XLINK_NS);
        }

        for child in node.children() {
            if child.is_element() {
                element
                    .children
                    .push(Node::Element(Self::from_xml(child, Some(node))));
            } else if child.is_text() {
                if let Some(text) = child.text() {
                    element.children.push(Node::Text(text.to_string()));
                }
            }
        }

        element
    }

    // ---- Serialization ----

    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        self.write_markup(&mut out);
        out
    }

    fn write_markup(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (name, value) in &self.attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            escape_into(value, out, true);
            out.push('"');
        }

        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }

        out.push('>');
        for child in &self.children {
            match child {
                Node::Element(element) => element.write_markup(out),
                Node::Text(text) => escape_into(text, out, false),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn escape_into(value: &str, out: &mut String, attribute: bool) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

/// Leading numeric value of a length attribute (`"400"`, `"400px"`).
pub fn parse_length(value: &str) -> Option<f32> {
    let value = value.trim();
    let end = value
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.' || *c == '-' || *c == '+'))
        .map_or(value.len(), |(i, _)| i);
    value[..end].parse().ok()
}

// ============================================================================
// Tests
// ============================================================================
