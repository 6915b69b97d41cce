//! Namespace-agnostic XML access.
//!
//! Publishers disagree on prefixes and namespace URIs, so queries never name a
//! namespace. A document is parsed into a small element tree, the namespace of
//! the root element is taken as *the* document namespace, and lookups by local
//! name only match elements bound to that namespace.

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use unicode_normalization::UnicodeNormalization;

use crate::error::XmlError;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub namespace: Option<String>,
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    /// Attribute value by local name.
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == local)
            .map(|(_, v)| v.as_str())
    }

    fn is(&self, namespace: Option<&str>, local: &str) -> bool {
        self.name == local && self.namespace.as_deref() == namespace
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// First direct child with the given namespace and local name.
    pub fn child(&self, namespace: Option<&str>, local: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.is(namespace, local))
    }

    /// All matching descendants in document order, excluding `self`.
    pub fn descendants<'a>(&'a self, namespace: Option<&str>, local: &str) -> Vec<&'a Element> {
        let mut out = Vec::new();
        collect_descendants(self, namespace, local, &mut out);
        out
    }

    /// Every descendant element in document order, whatever its namespace.
    pub fn all_descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        let mut stack: Vec<&Element> = self.child_elements().collect();
        stack.reverse();
        while let Some(el) = stack.pop() {
            out.push(el);
            let mut children: Vec<&Element> = el.child_elements().collect();
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Concatenated text of the element and all its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        push_text(self, &mut out);
        out
    }

    /// Text content normalized for comparison: NFC, whitespace runs collapsed, trimmed.
    pub fn normalized_text(&self) -> String {
        normalize_text(&self.text())
    }
}

fn collect_descendants<'a>(
    el: &'a Element,
    namespace: Option<&str>,
    local: &str,
    out: &mut Vec<&'a Element>,
) {
    for child in el.child_elements() {
        if child.is(namespace, local) {
            out.push(child);
        }
        collect_descendants(child, namespace, local, out);
    }
}

fn push_text(el: &Element, out: &mut String) {
    for node in &el.children {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => push_text(e, out),
        }
    }
}

pub fn normalize_text(s: &str) -> String {
    let nfc: String = s.nfc().collect();
    nfc.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A parsed document whose queries are scoped to the root element's namespace.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    root: Element,
}

impl XmlDocument {
    pub fn parse(xml: &str) -> Result<Self, XmlError> {
        let mut reader = NsReader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let (ns, event) = reader.read_resolved_event()?;
            let namespace = namespace_of(ns);
            match event {
                Event::Start(ref e) => {
                    stack.push(element_from(e, namespace));
                }
                Event::Empty(ref e) => {
                    let el = element_from(e, namespace);
                    attach(&mut stack, &mut root, el);
                }
                Event::End(_) => {
                    if let Some(el) = stack.pop() {
                        attach(&mut stack, &mut root, el);
                    }
                }
                Event::Text(ref t) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Text(text_of(t)));
                    }
                }
                Event::CData(ref c) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(Node::Text(String::from_utf8_lossy(c).into_owned()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.pop() {
            return Err(XmlError::Unclosed(open.name));
        }
        root.map(|root| Self { root }).ok_or(XmlError::NoRoot)
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Namespace URI of the root element, `None` when it is unqualified.
    pub fn namespace(&self) -> Option<&str> {
        self.root.namespace.as_deref()
    }

    /// All descendants of the root with this local name in the document namespace.
    pub fn find_all(&self, local: &str) -> Vec<&Element> {
        self.root.descendants(self.namespace(), local)
    }
}

/// Namespace URI of the root element of `xml` without building a tree.
pub fn root_namespace(xml: &str) -> Result<Option<String>, XmlError> {
    let mut reader = NsReader::from_str(xml);
    loop {
        let (ns, event) = reader.read_resolved_event()?;
        match event {
            Event::Start(_) | Event::Empty(_) => return Ok(namespace_of(ns)),
            Event::Eof => return Err(XmlError::NoRoot),
            _ => {}
        }
    }
}

fn namespace_of(ns: ResolveResult<'_>) -> Option<String> {
    match ns {
        ResolveResult::Bound(Namespace(uri)) => Some(String::from_utf8_lossy(uri).into_owned()),
        ResolveResult::Unbound | ResolveResult::Unknown(_) => None,
    }
}

fn element_from(e: &BytesStart<'_>, namespace: Option<String>) -> Element {
    let attributes = e
        .attributes()
        .flatten()
        .filter(|a| a.key.as_namespace_binding().is_none())
        .map(|a| {
            let key = String::from_utf8_lossy(a.key.local_name().as_ref()).into_owned();
            let value = a
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned());
            (key, value)
        })
        .collect();

    Element {
        namespace,
        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        attributes,
        children: Vec::new(),
    }
}

// XHTML entities such as &nbsp; are not predefined in XML; keep them verbatim.
fn text_of(t: &BytesText<'_>) -> String {
    t.unescape()
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(t).into_owned())
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(el)),
        None => {
            if root.is_none() {
                *root = Some(el);
            }
        }
    }
}
