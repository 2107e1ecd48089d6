// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

use std::fmt;

use crate::names::{ALL, AUTHENTICATED, DAV, HREF, PRINCIPAL, PROPERTY, SELF, UNAUTHENTICATED};
use crate::property::{Element, PropertyName};
use crate::response::ResponseFormatError;
use crate::xmlutils::{escape_text, NamespacePrefixes};

/// Principals that stand for a class of users rather than a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PseudoPrincipal {
    /// `DAV:all`
    All,
    /// `DAV:authenticated`
    Authenticated,
    /// `DAV:unauthenticated`
    Unauthenticated,
    /// `DAV:self`
    SelfPrincipal,
}

impl PseudoPrincipal {
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            PseudoPrincipal::All => "all",
            PseudoPrincipal::Authenticated => "authenticated",
            PseudoPrincipal::Unauthenticated => "unauthenticated",
            PseudoPrincipal::SelfPrincipal => "self",
        }
    }
}

/// What a [`Principal`] refers to. Exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrincipalKind {
    /// A principal resource, identified by its href exactly as the server sent it.
    Url(String),
    Pseudo(PseudoPrincipal),
    /// The principal named by a property of the resource, e.g.: `DAV:owner`.
    Property(PropertyName),
}

/// The subject that an ACE applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    kind: PrincipalKind,
    display_name: Option<String>,
}

impl Principal {
    pub fn from_url<S: Into<String>>(url: S) -> Principal {
        Principal {
            kind: PrincipalKind::Url(url.into()),
            display_name: None,
        }
    }

    #[must_use]
    pub fn from_pseudo(pseudo: PseudoPrincipal) -> Principal {
        Principal {
            kind: PrincipalKind::Pseudo(pseudo),
            display_name: None,
        }
    }

    #[must_use]
    pub fn from_property(property: PropertyName) -> Principal {
        Principal {
            kind: PrincipalKind::Property(property),
            display_name: None,
        }
    }

    #[must_use]
    pub fn with_display_name<S: Into<String>>(mut self, display_name: S) -> Principal {
        self.display_name = Some(display_name.into());
        self
    }

    #[must_use]
    pub fn kind(&self) -> &PrincipalKind {
        &self.kind
    }

    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match &self.kind {
            PrincipalKind::Url(url) => Some(url),
            _ => None,
        }
    }

    #[must_use]
    pub fn property(&self) -> Option<&PropertyName> {
        match &self.kind {
            PrincipalKind::Property(property) => Some(property),
            _ => None,
        }
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Returns whether both principals refer to the same subject, ignoring display names.
    #[must_use]
    pub fn same_subject(&self, other: &Principal) -> bool {
        self.kind == other.kind
    }

    /// A string identifying the subject, used to group ACEs.
    pub(crate) fn key(&self) -> String {
        match &self.kind {
            PrincipalKind::Url(url) => url.clone(),
            PrincipalKind::Pseudo(pseudo) => format!("{{{DAV}}}{}", pseudo.tag()),
            PrincipalKind::Property(property) => format!("property:{property}"),
        }
    }

    /// Parses a `DAV:principal` element.
    ///
    /// # Errors
    ///
    /// If the element does not contain exactly one recognised principal.
    pub fn from_element(principal: &Element) -> Result<Principal, ResponseFormatError> {
        let malformed = |message: &str| ResponseFormatError::content(&PRINCIPAL.into(), message);
        let [inner] = principal.children() else {
            return Err(malformed("expected exactly one child"));
        };
        let name = inner.name();

        let kind = if *name == HREF {
            let url = inner
                .text()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .ok_or_else(|| malformed("empty href"))?;
            PrincipalKind::Url(url.to_string())
        } else if *name == ALL {
            PrincipalKind::Pseudo(PseudoPrincipal::All)
        } else if *name == AUTHENTICATED {
            PrincipalKind::Pseudo(PseudoPrincipal::Authenticated)
        } else if *name == UNAUTHENTICATED {
            PrincipalKind::Pseudo(PseudoPrincipal::Unauthenticated)
        } else if *name == SELF {
            PrincipalKind::Pseudo(PseudoPrincipal::SelfPrincipal)
        } else if *name == PROPERTY {
            let property = inner
                .children()
                .first()
                .ok_or_else(|| malformed("empty property"))?;
            PrincipalKind::Property(property.name().clone())
        } else {
            return Err(malformed(&format!("unknown principal {name}")));
        };

        Ok(Principal {
            kind,
            display_name: None,
        })
    }

    /// Renders a `DAV:principal` element.
    pub(crate) fn write_xml(&self, prefixes: &mut NamespacePrefixes, out: &mut String) {
        let tag = prefixes.qualify(DAV, "principal");
        out.push_str(&format!("<{tag}>"));
        match &self.kind {
            PrincipalKind::Url(url) => {
                let href = prefixes.qualify(DAV, "href");
                out.push_str(&format!("<{href}>{}</{href}>", escape_text(url)));
            }
            PrincipalKind::Pseudo(pseudo) => {
                out.push_str(&format!("<{}/>", prefixes.qualify(DAV, pseudo.tag())));
            }
            PrincipalKind::Property(property) => {
                let wrapper = prefixes.qualify(DAV, "property");
                let inner = prefixes.qualify(property.namespace(), property.name());
                out.push_str(&format!("<{wrapper}><{inner}/></{wrapper}>"));
            }
        }
        out.push_str(&format!("</{tag}>"));
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(display_name) = &self.display_name {
            return f.write_str(display_name);
        }
        match &self.kind {
            PrincipalKind::Url(url) => f.write_str(url),
            PrincipalKind::Pseudo(pseudo) => f.write_str(pseudo.tag()),
            PrincipalKind::Property(property) => write!(f, "{property}"),
        }
    }
}
