// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

use std::fmt;

use crate::names::{DAV, PRIVILEGE};
use crate::property::{Element, PropertyName};
use crate::response::ResponseFormatError;
use crate::xmlutils::NamespacePrefixes;

/// A privilege that can be granted or denied.
///
/// The variants cover the privileges defined in [rfc3744]; anything else a server advertises is
/// kept as an [`Privilege::Extension`].
///
/// [rfc3744]: https://www.rfc-editor.org/rfc/rfc3744#section-3
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Privilege {
    Read,
    Write,
    WriteProperties,
    WriteContent,
    Unlock,
    ReadAcl,
    ReadCurrentUserPrivilegeSet,
    WriteAcl,
    All,
    Bind,
    Unbind,
    Extension(PropertyName),
}

impl Privilege {
    /// Returns the element name of this privilege.
    #[must_use]
    pub fn name(&self) -> PropertyName {
        let local = match self {
            Privilege::Read => "read",
            Privilege::Write => "write",
            Privilege::WriteProperties => "write-properties",
            Privilege::WriteContent => "write-content",
            Privilege::Unlock => "unlock",
            Privilege::ReadAcl => "read-acl",
            Privilege::ReadCurrentUserPrivilegeSet => "read-current-user-privilege-set",
            Privilege::WriteAcl => "write-acl",
            Privilege::All => "all",
            Privilege::Bind => "bind",
            Privilege::Unbind => "unbind",
            Privilege::Extension(name) => return name.clone(),
        };
        PropertyName::dav(local)
    }

    /// Maps an element name to a privilege.
    #[must_use]
    pub fn from_name(name: &PropertyName) -> Privilege {
        if name.namespace() != DAV {
            return Privilege::Extension(name.clone());
        }
        match name.name() {
            "read" => Privilege::Read,
            "write" => Privilege::Write,
            "write-properties" => Privilege::WriteProperties,
            "write-content" => Privilege::WriteContent,
            "unlock" => Privilege::Unlock,
            "read-acl" => Privilege::ReadAcl,
            "read-current-user-privilege-set" => Privilege::ReadCurrentUserPrivilegeSet,
            "write-acl" => Privilege::WriteAcl,
            "all" => Privilege::All,
            "bind" => Privilege::Bind,
            "unbind" => Privilege::Unbind,
            _ => Privilege::Extension(name.clone()),
        }
    }

    /// Parses the children of an element containing `DAV:privilege` entries, such as
    /// `DAV:current-user-privilege-set`, `DAV:grant` or `DAV:deny`.
    ///
    /// # Errors
    ///
    /// If a `DAV:privilege` element is empty.
    pub fn list_from_element(parent: &Element) -> Result<Vec<Privilege>, ResponseFormatError> {
        parent
            .children_named(&PRIVILEGE)
            .map(|privilege| {
                privilege
                    .children()
                    .first()
                    .map(|p| Privilege::from_name(p.name()))
                    .ok_or_else(|| {
                        ResponseFormatError::content(&PRIVILEGE.into(), "empty privilege")
                    })
            })
            .collect()
    }

    pub(crate) fn write_xml(&self, prefixes: &mut NamespacePrefixes, out: &mut String) {
        let name = self.name();
        let privilege = prefixes.qualify(DAV, "privilege");
        let inner = prefixes.qualify(name.namespace(), name.name());
        out.push_str(&format!("<{privilege}><{inner}/></{privilege}>"));
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Privilege::Extension(name) => write!(f, "{name}"),
            standard => f.write_str(standard.name().name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::property::{Element, PropertyName};

    use super::Privilege;

    #[test]
    fn test_names() {
        assert_eq!(
            Privilege::from_name(&PropertyName::dav("write-acl")),
            Privilege::WriteAcl
        );
        assert_eq!(Privilege::ReadAcl.name(), PropertyName::dav("read-acl"));

        let custom = PropertyName::new("http://example.com/ns", "publish");
        assert_eq!(
            Privilege::from_name(&custom),
            Privilege::Extension(custom.clone())
        );
        assert_eq!(
            Privilege::from_name(&PropertyName::dav("frobnicate")),
            Privilege::Extension(PropertyName::dav("frobnicate"))
        );
        assert_eq!(
            Privilege::ReadCurrentUserPrivilegeSet.to_string(),
            "read-current-user-privilege-set"
        );
    }

    #[test]
    fn test_list_from_element() {
        let raw = r#"<D:current-user-privilege-set xmlns:D="DAV:">
            <D:privilege><D:read/></D:privilege>
            <D:privilege><D:write-content/></D:privilege>
        </D:current-user-privilege-set>"#;
        let doc = roxmltree::Document::parse(raw).unwrap();
        let element = Element::from_node(&doc.root_element());
        assert_eq!(
            Privilege::list_from_element(&element).unwrap(),
            vec![Privilege::Read, Privilege::WriteContent]
        );
    }
}
