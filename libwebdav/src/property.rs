// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! Property names and owned XML fragments.

use std::fmt;

use roxmltree::{ExpandedName, Node};

use crate::namecheck::{validate_property_name, NameError};
use crate::names::DAV;
use crate::xmlutils::{escape_attribute, escape_text, NamespacePrefixes};

/// A namespaced property (or element) name.
///
/// An empty namespace means "no namespace". Request builders substitute a storer's default
/// namespace for it where one is configured.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyName {
    namespace: String,
    name: String,
}

impl PropertyName {
    pub fn new<N: Into<String>, L: Into<String>>(namespace: N, name: L) -> PropertyName {
        PropertyName {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Shortcut for a name in the `DAV:` namespace.
    pub fn dav<L: Into<String>>(name: L) -> PropertyName {
        PropertyName::new(DAV, name)
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Checks that the local name is a valid XML name.
    ///
    /// # Errors
    ///
    /// See [`validate_property_name`].
    pub fn validate(&self) -> Result<(), NameError> {
        validate_property_name(&self.name)
    }

    /// Returns a copy placed in `default_namespace` if this name has none.
    #[must_use]
    pub fn with_default_namespace(&self, default_namespace: Option<&str>) -> PropertyName {
        match default_namespace {
            Some(ns) if self.namespace.is_empty() => PropertyName::new(ns, self.name.as_str()),
            _ => self.clone(),
        }
    }

    pub(crate) fn of_node(node: &Node) -> PropertyName {
        let tag = node.tag_name();
        PropertyName::new(tag.namespace().unwrap_or(""), tag.name())
    }

    pub(crate) fn matches(&self, node: &Node) -> bool {
        let tag = node.tag_name();
        tag.name() == self.name && tag.namespace().unwrap_or("") == self.namespace
    }
}

impl fmt::Display for PropertyName {
    /// Renders the name in Clark notation, e.g.: `{DAV:}getetag`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.name)
        }
    }
}

impl From<ExpandedName<'_, '_>> for PropertyName {
    fn from(value: ExpandedName<'_, '_>) -> Self {
        PropertyName::new(value.namespace().unwrap_or(""), value.name())
    }
}

impl From<&ExpandedName<'_, '_>> for PropertyName {
    fn from(value: &ExpandedName<'_, '_>) -> Self {
        PropertyName::new(value.namespace().unwrap_or(""), value.name())
    }
}

impl PartialEq<ExpandedName<'_, '_>> for PropertyName {
    fn eq(&self, other: &ExpandedName<'_, '_>) -> bool {
        self.name == other.name() && self.namespace == other.namespace().unwrap_or("")
    }
}

/// An owned XML element.
///
/// Used to hold property values returned by the server, and to build structured property values
/// for `PROPPATCH`. Mixed content is simplified: only the direct text of an element is kept, and
/// whitespace-only text around child elements is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: PropertyName,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<Element>,
}

impl Element {
    pub fn new(name: PropertyName) -> Element {
        Element {
            name,
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_text<S: Into<String>>(mut self, text: S) -> Element {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: Element) -> Element {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn with_attribute<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Element {
        self.attributes.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn name(&self) -> &PropertyName {
        &self.name
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    #[must_use]
    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// Returns the value of an (un-namespaced) attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the first direct child with the given name.
    pub fn child<N: ?Sized>(&self, name: &N) -> Option<&Element>
    where
        PropertyName: PartialEq<N>,
    {
        self.children.iter().find(|child| child.name == *name)
    }

    /// Returns all direct children with the given name.
    pub fn children_named<'a, N: ?Sized>(
        &'a self,
        name: &'a N,
    ) -> impl Iterator<Item = &'a Element> + 'a
    where
        PropertyName: PartialEq<N>,
    {
        self.children.iter().filter(move |child| child.name == *name)
    }

    /// Returns the first element in this subtree (including itself) with the given name.
    pub fn find<N: ?Sized>(&self, name: &N) -> Option<&Element>
    where
        PropertyName: PartialEq<N>,
    {
        if self.name == *name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    /// Concatenates the text of the whole subtree, in document order.
    #[must_use]
    pub fn all_text(&self) -> String {
        let mut text = String::new();
        self.collect_text(&mut text);
        text
    }

    fn collect_text(&self, into: &mut String) {
        if let Some(text) = &self.text {
            into.push_str(text);
        }
        for child in &self.children {
            child.collect_text(into);
        }
    }

    /// Renders this element as a standalone XML fragment with its own namespace declarations.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut prefixes = NamespacePrefixes::default();
        let tag = prefixes.qualify(&self.name.namespace, &self.name.name);
        let mut inner = String::new();
        self.write_content(&mut prefixes, &mut inner);
        let mut rendered = format!("<{tag}{}", prefixes.declarations());
        self.write_attributes(&mut rendered);
        rendered.push('>');
        rendered.push_str(&inner);
        rendered.push_str(&format!("</{tag}>"));
        rendered
    }

    pub(crate) fn from_node(node: &Node) -> Element {
        let mut text = String::new();
        let mut children = Vec::new();
        for child in node.children() {
            if child.is_element() {
                children.push(Element::from_node(&child));
            } else if let Some(t) = child.text().filter(|_| child.is_text()) {
                text.push_str(t);
            }
        }
        let text = if text.is_empty() || (!children.is_empty() && text.trim().is_empty()) {
            None
        } else {
            Some(text)
        };
        Element {
            name: PropertyName::of_node(node),
            attributes: node
                .attributes()
                .map(|a| (a.name().to_string(), a.value().to_string()))
                .collect(),
            text,
            children,
        }
    }

    /// Renders this element into a document whose root declares all `prefixes`.
    pub(crate) fn write_xml(&self, prefixes: &mut NamespacePrefixes, out: &mut String) {
        let tag = prefixes.qualify(&self.name.namespace, &self.name.name);
        out.push('<');
        out.push_str(&tag);
        self.write_attributes(out);
        if self.text.is_none() && self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        self.write_content(prefixes, out);
        out.push_str("</");
        out.push_str(&tag);
        out.push('>');
    }

    /// Renders the text and children of this element.
    pub(crate) fn write_content(&self, prefixes: &mut NamespacePrefixes, out: &mut String) {
        if let Some(text) = &self.text {
            out.push_str(&escape_text(text));
        }
        for child in &self.children {
            child.write_xml(prefixes, out);
        }
    }

    fn write_attributes(&self, out: &mut String) {
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape_attribute(value));
            out.push('"');
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::names::{DISPLAY_NAME, GETETAG, HREF};

    use super::{Element, PropertyName};

    #[test]
    fn test_property_name_equality() {
        let name = PropertyName::dav("getetag");
        assert!(name == GETETAG);
        assert!(name != DISPLAY_NAME);
        assert_eq!(PropertyName::from(GETETAG), name);
        assert_eq!(name.to_string(), "{DAV:}getetag");
    }

    #[test]
    fn test_default_namespace() {
        let bare = PropertyName::new("", "colour");
        assert_eq!(
            bare.with_default_namespace(Some("urn:x")),
            PropertyName::new("urn:x", "colour")
        );
        let dav = PropertyName::dav("displayname");
        assert_eq!(dav.with_default_namespace(Some("urn:x")), dav);
    }

    #[test]
    fn test_element_from_node() {
        let raw = r#"<D:owner xmlns:D="DAV:" xmlns:X="urn:x">
            <D:href>/principals/alice</D:href>
            <X:note kind="plain">a &amp; b</X:note>
        </D:owner>"#;
        let doc = roxmltree::Document::parse(raw).unwrap();
        let owner = Element::from_node(&doc.root_element());

        assert_eq!(owner.text(), None);
        assert_eq!(owner.children().len(), 2);
        assert_eq!(
            owner.child(&HREF).and_then(Element::text),
            Some("/principals/alice")
        );
        let note = owner.find(&PropertyName::new("urn:x", "note")).unwrap();
        assert_eq!(note.text(), Some("a & b"));
        assert_eq!(note.attribute("kind"), Some("plain"));
        assert_eq!(owner.all_text().trim(), "/principals/alicea & b");
    }

    #[test]
    fn test_element_to_xml() {
        let element = Element::new(PropertyName::new("urn:x", "author"))
            .with_child(Element::new(PropertyName::dav("href")).with_text("/a?b=<c>"))
            .with_child(Element::new(PropertyName::new("urn:y", "empty")));
        assert_eq!(
            element.to_xml(),
            r#"<ns0:author xmlns:D="DAV:" xmlns:ns0="urn:x" xmlns:ns1="urn:y"><D:href>/a?b=&lt;c&gt;</D:href><ns1:empty/></ns0:author>"#
        );
    }
}
