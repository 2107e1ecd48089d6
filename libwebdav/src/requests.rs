// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! XML bodies for WebDAV requests.
//!
//! All builders produce a complete document. `DAV:` is always bound to the `D` prefix, and every
//! other namespace gets `ns0`, `ns1`, ... in the order in which it first appears. Property names
//! are validated before anything is rendered.
use std::collections::BTreeMap;

use crate::acp::{Acl, AclError};
use crate::condition::{Condition, ConditionError, ContainsStrategy};
use crate::dav::{Depth, LockScope, LockType};
use crate::namecheck::NameError;
use crate::property::{Element, PropertyName};
use crate::xmlutils::{escape_text, NamespacePrefixes, XML_DOC_HEADER};

/// Input rejected before any request was sent.
#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("invalid name")]
    Name(#[from] NameError),

    #[error("invalid access control list")]
    Acl(#[from] AclError),

    #[error("invalid search condition")]
    Condition(#[from] ConditionError),

    #[error("invalid url: '{0}'")]
    Url(String),

    #[error("at least one property name is required")]
    NoProperties,

    #[error("failed to build request")]
    Request(#[from] http::Error),
}

/// The value of a property written with `PROPPATCH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Text(String),
    /// Structured content, rendered as children of the property element.
    Xml(Vec<Element>),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<Element> for PropertyValue {
    fn from(value: Element) -> Self {
        PropertyValue::Xml(vec![value])
    }
}

/// Wraps `inner` into a `DAV:` root element declaring every allocated namespace.
fn document(root: &str, prefixes: &NamespacePrefixes, inner: &str) -> String {
    format!(
        "{XML_DOC_HEADER}<D:{root}{}>{inner}</D:{root}>",
        prefixes.declarations()
    )
}

fn validated(
    names: &[PropertyName],
    default_namespace: Option<&str>,
) -> Result<Vec<PropertyName>, NameError> {
    names
        .iter()
        .map(|name| {
            name.validate()?;
            Ok(name.with_default_namespace(default_namespace))
        })
        .collect()
}

fn write_prop(names: &[PropertyName], prefixes: &mut NamespacePrefixes, out: &mut String) {
    out.push_str("<D:prop>");
    for name in names {
        out.push_str(&format!("<{}/>", prefixes.qualify(name.namespace(), name.name())));
    }
    out.push_str("</D:prop>");
}

/// `PROPFIND` body requesting the given properties.
///
/// # Errors
///
/// If `names` is empty or contains an invalid name.
pub fn find_body(
    names: &[PropertyName],
    default_namespace: Option<&str>,
) -> Result<String, ValidationError> {
    if names.is_empty() {
        return Err(ValidationError::NoProperties);
    }
    let names = validated(names, default_namespace)?;
    let mut prefixes = NamespacePrefixes::default();
    let mut inner = String::new();
    write_prop(&names, &mut prefixes, &mut inner);
    Ok(document("propfind", &prefixes, &inner))
}

/// `PROPFIND` body requesting all properties.
#[must_use]
pub fn all_properties_body() -> String {
    document("propfind", &NamespacePrefixes::default(), "<D:allprop/>")
}

/// `PROPFIND` body requesting the names of all properties.
#[must_use]
pub fn property_names_body() -> String {
    document("propfind", &NamespacePrefixes::default(), "<D:propname/>")
}

/// `PROPPATCH` body setting the given properties.
///
/// # Errors
///
/// If `values` is empty or contains an invalid name.
pub fn update_body(
    values: &BTreeMap<PropertyName, PropertyValue>,
    default_namespace: Option<&str>,
) -> Result<String, ValidationError> {
    if values.is_empty() {
        return Err(ValidationError::NoProperties);
    }
    let mut prefixes = NamespacePrefixes::default();
    let mut inner = String::from("<D:set><D:prop>");
    for (name, value) in values {
        name.validate()?;
        let name = name.with_default_namespace(default_namespace);
        let tag = prefixes.qualify(name.namespace(), name.name());
        match value {
            PropertyValue::Text(text) => {
                inner.push_str(&format!("<{tag}>{}</{tag}>", escape_text(text)));
            }
            PropertyValue::Xml(children) => {
                inner.push_str(&format!("<{tag}>"));
                for child in children {
                    child.write_xml(&mut prefixes, &mut inner);
                }
                inner.push_str(&format!("</{tag}>"));
            }
        }
    }
    inner.push_str("</D:prop></D:set>");
    Ok(document("propertyupdate", &prefixes, &inner))
}

/// `PROPPATCH` body removing the given properties.
///
/// # Errors
///
/// If `names` is empty or contains an invalid name.
pub fn delete_body(
    names: &[PropertyName],
    default_namespace: Option<&str>,
) -> Result<String, ValidationError> {
    if names.is_empty() {
        return Err(ValidationError::NoProperties);
    }
    let names = validated(names, default_namespace)?;
    let mut prefixes = NamespacePrefixes::default();
    let mut inner = String::from("<D:remove>");
    write_prop(&names, &mut prefixes, &mut inner);
    inner.push_str("</D:remove>");
    Ok(document("propertyupdate", &prefixes, &inner))
}

/// DASL `basicsearch` body.
///
/// An empty `select` requests all properties. `scope` is the (encoded) href of the collection
/// to search in.
///
/// # Errors
///
/// If a name is invalid, or if `condition` cannot be evaluated with `strategy`.
pub fn search_body(
    select: &[PropertyName],
    scope: &str,
    depth: Depth,
    condition: Option<&Condition>,
    strategy: ContainsStrategy,
    default_namespace: Option<&str>,
) -> Result<String, ValidationError> {
    let select = validated(select, default_namespace)?;
    if let Some(condition) = condition {
        condition.validate(strategy)?;
    }

    let mut prefixes = NamespacePrefixes::default();
    let mut inner = String::from("<D:basicsearch><D:select>");
    if select.is_empty() {
        inner.push_str("<D:allprop/>");
    } else {
        write_prop(&select, &mut prefixes, &mut inner);
    }
    inner.push_str(&format!(
        "</D:select><D:from><D:scope><D:href>{}</D:href><D:depth>{}</D:depth></D:scope></D:from>",
        escape_text(scope),
        depth.as_str(),
    ));
    if let Some(condition) = condition {
        let mut clause = String::new();
        condition.write_xml(strategy, default_namespace, &mut prefixes, &mut clause);
        if !clause.is_empty() {
            inner.push_str(&format!("<D:where>{clause}</D:where>"));
        }
    }
    inner.push_str("</D:basicsearch>");
    Ok(document("searchrequest", &prefixes, &inner))
}

/// `LOCK` body.
#[must_use]
pub fn lock_body(owner: &str, scope: LockScope, lock_type: LockType) -> String {
    document(
        "lockinfo",
        &NamespacePrefixes::default(),
        &format!(
            "<D:lockscope><D:{}/></D:lockscope><D:locktype><D:{}/></D:locktype><D:owner>{}</D:owner>",
            scope.as_str(),
            lock_type.as_str(),
            escape_text(owner),
        ),
    )
}

/// `ACL` body.
///
/// # Errors
///
/// If any ACE is protected, inherited, or does not hold exactly one grant or deny clause.
pub fn acl_body(acl: &Acl) -> Result<String, ValidationError> {
    acl.validate()?;
    let mut prefixes = NamespacePrefixes::default();
    let mut aces = String::new();
    acl.write_xml(&mut prefixes, &mut aces);
    // `write_xml` renders the `DAV:acl` root itself; strip it to reuse the common wrapper.
    let inner = aces
        .strip_prefix("<D:acl>")
        .and_then(|rest| rest.strip_suffix("</D:acl>"))
        .unwrap_or(&aces);
    Ok(document("acl", &prefixes, inner))
}

/// Delta-V `UPDATE` body selecting a version.
#[must_use]
pub fn version_update_body(version_href: &str) -> String {
    document(
        "update",
        &NamespacePrefixes::default(),
        &format!(
            "<D:version><D:href>{}</D:href></D:version>",
            escape_text(version_href)
        ),
    )
}

/// Delta-V `DAV:version-tree` report body.
///
/// # Errors
///
/// If a name is invalid.
pub fn version_tree_body(
    names: &[PropertyName],
    default_namespace: Option<&str>,
) -> Result<String, ValidationError> {
    let names = validated(names, default_namespace)?;
    let mut prefixes = NamespacePrefixes::default();
    let mut inner = String::new();
    if names.is_empty() {
        inner.push_str("<D:allprop/>");
    } else {
        write_prop(&names, &mut prefixes, &mut inner);
    }
    Ok(document("version-tree", &prefixes, &inner))
}
