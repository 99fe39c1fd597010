//! Owned snapshot of the dashboard's presentation tree.
//!
//! The export pipeline never talks to a live rendering host directly.  The
//! host hands over its rendered markup once, this module parses it into a
//! mutable element tree, and every later stage (style inlining, id rewriting,
//! forced panel visibility) works on that snapshot.  Parsing is delegated to
//! `roxmltree`; serialization is done by hand so mutated subtrees can be fed
//! back to the SVG decoder.

use std::fmt::Write as _;

use thiserror::Error;

/// Error produced when host markup cannot be parsed into a tree.
#[derive(Debug, Error)]
pub enum MarkupError {
    /// The markup was not well-formed XML.
    #[error("failed to parse presentation markup: {0}")]
    Parse(#[from] roxmltree::Error),
}

/// A single element node: tag, attributes in document order, children, and
/// the concatenated direct text content.
#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    /// Local tag name (`svg`, `g`, `div`, ...).
    pub tag: String,
    attrs: Vec<(String, String)>,
    /// Child elements in document order.
    pub children: Vec<Element>,
    /// Direct text content, if any.
    pub text: Option<String>,
}

impl Element {
    /// Creates an empty element with the given tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
            text: None,
        }
    }

    /// Returns the value of `name`, if the attribute is present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Sets `name` to `value`, replacing any existing value.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
    }

    /// Removes `name` and returns its previous value.
    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let index = self.attrs.iter().position(|(key, _)| key == name)?;
        Some(self.attrs.remove(index).1)
    }

    /// All attributes in document order.
    pub fn attrs(&self) -> &[(String, String)] {
        &self.attrs
    }

    /// Mutable access to the raw attribute list, used by the id rewriter.
    pub(crate) fn attrs_mut(&mut self) -> &mut Vec<(String, String)> {
        &mut self.attrs
    }

    /// Reads one property out of the inline `style` attribute.
    pub fn style_value(&self, property: &str) -> Option<String> {
        parse_style(self.attr("style")?)
            .into_iter()
            .find(|(name, _)| name == property)
            .map(|(_, value)| value)
    }

    /// Writes one property into the inline `style` attribute, replacing any
    /// existing declaration for the same property.
    pub fn set_style_value(&mut self, property: &str, value: &str) {
        let mut props = self.attr("style").map(parse_style).unwrap_or_default();
        match props.iter_mut().find(|(name, _)| name == property) {
            Some(slot) => slot.1 = value.to_string(),
            None => props.push((property.to_string(), value.to_string())),
        }
        let rendered = props
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect::<Vec<_>>()
            .join("; ");
        self.set_attr("style", rendered);
    }

    /// Removes one property from the inline `style` attribute.  The whole
    /// attribute is dropped when no declarations remain.
    pub fn remove_style_value(&mut self, property: &str) {
        let Some(style) = self.attr("style") else {
            return;
        };
        let props: Vec<(String, String)> = parse_style(style)
            .into_iter()
            .filter(|(name, _)| name != property)
            .collect();
        if props.is_empty() {
            self.remove_attr("style");
            return;
        }
        let rendered = props
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect::<Vec<_>>()
            .join("; ");
        self.set_attr("style", rendered);
    }

    /// Depth-first search for the element carrying `id`.
    pub fn find_by_id(&self, id: &str) -> Option<&Element> {
        if self.attr("id") == Some(id) {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find_by_id(id))
    }

    /// Mutable variant of [`Element::find_by_id`].
    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut Element> {
        if self.attr("id") == Some(id) {
            return Some(self);
        }
        self.children
            .iter_mut()
            .find_map(|child| child.find_by_id_mut(id))
    }

    /// First direct child with the given tag.
    pub fn child_with_tag(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.tag == tag)
    }

    /// First descendant with the given tag, at any depth.
    pub fn descendant_with_tag(&self, tag: &str) -> Option<&Element> {
        for child in &self.children {
            if child.tag == tag {
                return Some(child);
            }
            if let Some(found) = child.descendant_with_tag(tag) {
                return Some(found);
            }
        }
        None
    }

    /// Resolves a child path (indices per level) relative to this element.
    pub fn node_at_path_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let mut current = self;
        for &index in path {
            current = current.children.get_mut(index)?;
        }
        Some(current)
    }

    /// Visits this element and every descendant.
    pub fn walk(&self, visit: &mut impl FnMut(&Element)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Mutable pre-order walk over this element and every descendant.
    pub fn walk_mut(&mut self, visit: &mut impl FnMut(&mut Element)) {
        visit(self);
        for child in &mut self.children {
            child.walk_mut(visit);
        }
    }

    /// Serializes the subtree back to markup.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        self.write_into(&mut out);
        out
    }

    fn write_into(&self, out: &mut String) {
        let _ = write!(out, "<{}", self.tag);
        for (name, value) in &self.attrs {
            let _ = write!(out, " {}=\"{}\"", name, escape_attr(value));
        }
        if self.text.is_none() && self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        if let Some(text) = &self.text {
            out.push_str(&escape_text(text));
        }
        for child in &self.children {
            child.write_into(out);
        }
        let _ = write!(out, "</{}>", self.tag);
    }
}

/// The full presentation-tree snapshot handed over by the host.
#[derive(Clone, Debug)]
pub struct PresentationTree {
    root: Element,
}

impl PresentationTree {
    /// Parses host markup into a tree.
    pub fn parse(markup: &str) -> Result<Self, MarkupError> {
        let doc = roxmltree::Document::parse(markup)?;
        Ok(Self {
            root: convert(doc.root_element()),
        })
    }

    /// Wraps an already-built element as the tree root.
    pub fn from_root(root: Element) -> Self {
        Self { root }
    }

    /// The root element.
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Mutable root element.
    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// Looks up an element by `id` anywhere in the tree.
    pub fn element_by_id(&self, id: &str) -> Option<&Element> {
        self.root.find_by_id(id)
    }

    /// Mutable variant of [`PresentationTree::element_by_id`].
    pub fn element_by_id_mut(&mut self, id: &str) -> Option<&mut Element> {
        self.root.find_by_id_mut(id)
    }
}

fn convert(node: roxmltree::Node<'_, '_>) -> Element {
    let mut element = Element::new(node.tag_name().name());
    for attr in node.attributes() {
        let name = match attr.namespace() {
            Some(ns) => match node.lookup_prefix(ns) {
                Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, attr.name()),
                _ => attr.name().to_string(),
            },
            None => attr.name().to_string(),
        };
        element.attrs.push((name, attr.value().to_string()));
    }

    let mut text = String::new();
    for child in node.children() {
        if child.is_element() {
            element.children.push(convert(child));
        } else if let Some(chunk) = child.text() {
            if !chunk.trim().is_empty() {
                text.push_str(chunk.trim());
            }
        }
    }
    if !text.is_empty() {
        element.text = Some(text);
    }
    element
}

/// Splits an inline style attribute into `(property, value)` pairs.
pub fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|declaration| {
            let (name, value) = declaration.split_once(':')?;
            let name = name.trim();
            let value = value.trim();
            if name.is_empty() || value.is_empty() {
                return None;
            }
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

fn escape_text(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(input: &str) -> String {
    escape_text(input).replace('"', "&quot;")
}
