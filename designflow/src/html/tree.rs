//! Owned HTML fragment tree.
//!
//! Parsing goes through `scraper` (html5ever); the result is copied into a
//! small owned tree so attributes can be rewritten in place and the fragment
//! serialized back deterministically.

use scraper::{ElementRef, Html};
use std::fmt::Write as _;
use std::ops::Deref;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta", "param",
    "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext",
];

/// A node of a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// An element with attributes and children.
    Element(Element),
    /// Character data.
    Text(String),
    /// A comment.
    Comment(String),
}

/// An element: tag name, ordered attributes, ordered children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    /// Creates an element without attributes or children.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Returns the lowercase tag name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns an attribute value unless it is missing or empty.
    #[must_use]
    pub fn non_empty_attr(&self, name: &str) -> Option<&str> {
        self.attr(name).filter(|value| !value.is_empty())
    }

    /// Sets an attribute, keeping its position when it already exists.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    /// Removes an attribute and returns its value.
    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let index = self.attrs.iter().position(|(key, _)| key == name)?;
        Some(self.attrs.remove(index).1)
    }

    /// Returns the attributes in source order.
    #[must_use]
    pub fn attrs(&self) -> &[(String, String)] {
        &self.attrs
    }

    /// Returns the children.
    #[must_use]
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Returns the children mutably.
    pub fn children_mut(&mut self) -> &mut Vec<Node> {
        &mut self.children
    }

    /// Whether the element never has an end tag.
    #[must_use]
    pub fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.name.as_str())
    }

    fn is_raw_text(&self) -> bool {
        RAW_TEXT_ELEMENTS.contains(&self.name.as_str())
    }
}

/// A parsed HTML fragment (no `<html>`/`<body>` wrapper).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    nodes: Vec<Node>,
}

impl Fragment {
    /// Parses a fragment. Malformed markup is repaired the way browsers do.
    #[must_use]
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_fragment(html);
        Self {
            nodes: convert_children(*document.root_element()),
        }
    }

    /// Returns the top-level nodes.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the top-level nodes mutably.
    pub fn nodes_mut(&mut self) -> &mut Vec<Node> {
        &mut self.nodes
    }

    /// Visits every element depth first with its index path.
    pub fn walk<F>(&self, mut visit: F)
    where
        F: FnMut(&[usize], &Element),
    {
        let mut path = Vec::new();
        walk_nodes(&self.nodes, &mut path, &mut visit);
    }

    /// Visits every element depth first, allowing in-place edits.
    pub fn walk_mut<F>(&mut self, mut visit: F)
    where
        F: FnMut(&[usize], &mut Element),
    {
        let mut path = Vec::new();
        walk_nodes_mut(&mut self.nodes, &mut path, &mut visit);
    }

    /// Returns the element at an index path produced by [`walk`](Self::walk).
    pub fn element_at_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let (first, rest) = path.split_first()?;
        let mut current = match self.nodes.get_mut(*first)? {
            Node::Element(element) => element,
            _ => return None,
        };
        for index in rest {
            current = match current.children.get_mut(*index)? {
                Node::Element(element) => element,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Serializes the fragment.
    ///
    /// Output depends only on the tree: attributes keep their order, text
    /// and attribute values are escaped, raw-text elements are not.
    #[must_use]
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            write_node(&mut out, node, false);
        }
        out
    }
}

/// A node of the parsed scraper tree.
type TreeNode<'a> = <ElementRef<'a> as Deref>::Target;

fn convert_children(parent: TreeNode<'_>) -> Vec<Node> {
    let mut nodes = Vec::new();
    for child in parent.children() {
        match child.value() {
            scraper::Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    nodes.push(Node::Element(convert_element(el)));
                }
            }
            scraper::Node::Text(text) => nodes.push(Node::Text(String::from(&**text))),
            scraper::Node::Comment(comment) => nodes.push(Node::Comment(String::from(&**comment))),
            // Template contents hang off a fragment node below the element.
            scraper::Node::Fragment => nodes.extend(convert_children(child)),
            _ => {}
        }
    }
    nodes
}

fn convert_element(element: ElementRef<'_>) -> Element {
    let value = element.value();
    Element {
        name: value.name().to_string(),
        attrs: value
            .attrs()
            .map(|(key, val)| (key.to_string(), val.to_string()))
            .collect(),
        children: convert_children(*element),
    }
}

fn walk_nodes<F>(nodes: &[Node], path: &mut Vec<usize>, visit: &mut F)
where
    F: FnMut(&[usize], &Element),
{
    for (index, node) in nodes.iter().enumerate() {
        if let Node::Element(element) = node {
            path.push(index);
            visit(path, element);
            walk_nodes(&element.children, path, visit);
            path.pop();
        }
    }
}

fn walk_nodes_mut<F>(nodes: &mut [Node], path: &mut Vec<usize>, visit: &mut F)
where
    F: FnMut(&[usize], &mut Element),
{
    for (index, node) in nodes.iter_mut().enumerate() {
        if let Node::Element(element) = node {
            path.push(index);
            visit(path, element);
            walk_nodes_mut(&mut element.children, path, visit);
            path.pop();
        }
    }
}

fn write_node(out: &mut String, node: &Node, raw_text: bool) {
    match node {
        Node::Text(text) if raw_text => out.push_str(text),
        Node::Text(text) => escape_into(out, text, false),
        Node::Comment(comment) => {
            let _ = write!(out, "<!--{comment}-->");
        }
        Node::Element(element) => {
            out.push('<');
            out.push_str(&element.name);
            for (key, value) in &element.attrs {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                escape_into(out, value, true);
                out.push('"');
            }
            out.push('>');

            if element.is_void() {
                return;
            }

            let raw = element.is_raw_text();
            for child in &element.children {
                write_node(out, child, raw);
            }
            let _ = write!(out, "</{}>", element.name);
        }
    }
}

fn escape_into(out: &mut String, text: &str, attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '"' if attribute => out.push_str("&quot;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}
