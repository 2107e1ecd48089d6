// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

use crate::acp::{AclError, GrantDeny, Principal};
use crate::names::{ACE, DAV, DENY, GRANT, HREF, INHERITED, INVERT, PRINCIPAL, PROTECTED};
use crate::property::Element;
use crate::response::ResponseFormatError;
use crate::xmlutils::{escape_text, NamespacePrefixes};

/// An access control entry.
///
/// An ACE submitted to a server holds exactly one grant or deny clause. ACEs produced by
/// [`Acl::join_grant_deny`](crate::acp::Acl::join_grant_deny) may hold one of each.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ace {
    principal: Principal,
    invert: bool,
    grant_denies: Vec<GrantDeny>,
    protected: bool,
    inherited_from: Option<String>,
}

impl Ace {
    #[must_use]
    pub fn new(principal: Principal, grant_deny: GrantDeny) -> Ace {
        Ace {
            principal,
            invert: false,
            grant_denies: vec![grant_deny],
            protected: false,
            inherited_from: None,
        }
    }

    /// Makes this ACE apply to every principal except the given one.
    #[must_use]
    pub fn inverted(mut self) -> Ace {
        self.invert = true;
        self
    }

    #[must_use]
    pub fn with_protected(mut self, protected: bool) -> Ace {
        self.protected = protected;
        self
    }

    #[must_use]
    pub fn with_inherited_from<S: Into<String>>(mut self, url: S) -> Ace {
        self.inherited_from = Some(url.into());
        self
    }

    #[must_use]
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    #[must_use]
    pub fn invert(&self) -> bool {
        self.invert
    }

    #[must_use]
    pub fn grant_denies(&self) -> &[GrantDeny] {
        &self.grant_denies
    }

    #[must_use]
    pub fn is_protected(&self) -> bool {
        self.protected
    }

    #[must_use]
    pub fn is_inherited(&self) -> bool {
        self.inherited_from.is_some()
    }

    #[must_use]
    pub fn inherited_from(&self) -> Option<&str> {
        self.inherited_from.as_deref()
    }

    /// Adds a clause, merging its privileges into an existing clause of the same kind.
    pub fn add_grant_deny(&mut self, grant_deny: GrantDeny) {
        match self
            .grant_denies
            .iter_mut()
            .find(|existing| existing.is_grant() == grant_deny.is_grant())
        {
            Some(existing) => existing.add_privileges(grant_deny.privileges().iter().cloned()),
            None => self.grant_denies.push(grant_deny),
        }
    }

    pub fn add_grant_denies<I: IntoIterator<Item = GrantDeny>>(&mut self, grant_denies: I) {
        for grant_deny in grant_denies {
            self.add_grant_deny(grant_deny);
        }
    }

    /// Returns a copy of this ACE holding only `grant_deny`.
    pub(crate) fn with_only(&self, grant_deny: GrantDeny) -> Ace {
        Ace {
            grant_denies: vec![grant_deny],
            ..self.clone()
        }
    }

    /// Identity used to group ACEs: inherited and inverted entries stay apart from direct ones.
    pub(crate) fn group_key(&self) -> String {
        let mut key = self.principal.key();
        if self.invert {
            key.insert_str(0, "!");
        }
        if let Some(inherited_from) = &self.inherited_from {
            key = format!("{inherited_from}:{key}");
        }
        key
    }

    /// Checks whether this ACE can be submitted with an `ACL` request.
    ///
    /// # Errors
    ///
    /// If it is protected, inherited, or holds other than exactly one grant or deny clause.
    pub fn validate(&self) -> Result<(), AclError> {
        if self.protected {
            return Err(AclError::Protected(self.principal.to_string()));
        }
        if self.inherited_from.is_some() {
            return Err(AclError::Inherited(self.principal.to_string()));
        }
        if self.grant_denies.len() != 1 {
            return Err(AclError::GrantDenyCount {
                principal: self.principal.to_string(),
                count: self.grant_denies.len(),
            });
        }
        Ok(())
    }

    /// Parses a `DAV:ace` element.
    ///
    /// # Errors
    ///
    /// If the principal is missing or malformed, or if a clause is malformed.
    pub fn from_element(ace: &Element) -> Result<Ace, ResponseFormatError> {
        if *ace.name() != ACE {
            return Err(ResponseFormatError::content(ace.name(), "expected DAV:ace"));
        }

        let (principal, invert) = match (ace.child(&PRINCIPAL), ace.child(&INVERT)) {
            (Some(principal), None) => (principal, false),
            (None, Some(invert)) => (
                invert.child(&PRINCIPAL).ok_or_else(|| {
                    ResponseFormatError::content(invert.name(), "missing principal")
                })?,
                true,
            ),
            _ => {
                return Err(ResponseFormatError::content(
                    ace.name(),
                    "expected exactly one principal",
                ))
            }
        };

        let mut grant_denies = Vec::new();
        for clause in ace
            .children()
            .iter()
            .filter(|c| *c.name() == GRANT || *c.name() == DENY)
        {
            grant_denies.push(GrantDeny::from_element(clause)?);
        }

        let inherited_from = ace
            .child(&INHERITED)
            .map(|inherited| {
                inherited
                    .child(&HREF)
                    .and_then(Element::text)
                    .map(|href| href.trim().to_string())
                    .ok_or_else(|| ResponseFormatError::content(inherited.name(), "missing href"))
            })
            .transpose()?;

        Ok(Ace {
            principal: Principal::from_element(principal)?,
            invert,
            grant_denies,
            protected: ace.child(&PROTECTED).is_some(),
            inherited_from,
        })
    }

    /// Renders a `DAV:ace` element.
    pub(crate) fn write_xml(&self, prefixes: &mut NamespacePrefixes, out: &mut String) {
        let tag = prefixes.qualify(DAV, "ace");
        out.push_str(&format!("<{tag}>"));
        if self.invert {
            let invert = prefixes.qualify(DAV, "invert");
            out.push_str(&format!("<{invert}>"));
            self.principal.write_xml(prefixes, out);
            out.push_str(&format!("</{invert}>"));
        } else {
            self.principal.write_xml(prefixes, out);
        }
        for grant_deny in &self.grant_denies {
            grant_deny.write_xml(prefixes, out);
        }
        if self.protected {
            out.push_str(&format!("<{}/>", prefixes.qualify(DAV, "protected")));
        }
        if let Some(inherited_from) = &self.inherited_from {
            let inherited = prefixes.qualify(DAV, "inherited");
            let href = prefixes.qualify(DAV, "href");
            out.push_str(&format!(
                "<{inherited}><{href}>{}</{href}></{inherited}>",
                escape_text(inherited_from)
            ));
        }
        out.push_str(&format!("</{tag}>"));
    }
}

#[cfg(test)]
mod tests {
    use crate::acp::{AclError, GrantDeny, Principal, Privilege, PseudoPrincipal};
    use crate::property::Element;
    use crate::xmlutils::NamespacePrefixes;

    use super::Ace;

    #[test]
    fn test_add_grant_deny_merges() {
        let mut ace = Ace::new(
            Principal::from_url("/p/alice"),
            GrantDeny::grant([Privilege::Read]).unwrap(),
        );
        ace.add_grant_deny(GrantDeny::grant([Privilege::Write]).unwrap());
        assert_eq!(ace.grant_denies().len(), 1);
        assert_eq!(
            ace.grant_denies()[0].privileges(),
            &[Privilege::Read, Privilege::Write]
        );

        ace.add_grant_deny(GrantDeny::deny([Privilege::WriteAcl]).unwrap());
        assert_eq!(ace.grant_denies().len(), 2);
        assert!(matches!(
            ace.validate(),
            Err(AclError::GrantDenyCount { count: 2, .. })
        ));
    }

    #[test]
    fn test_validate() {
        let ace = Ace::new(
            Principal::from_pseudo(PseudoPrincipal::All),
            GrantDeny::grant([Privilege::Read]).unwrap(),
        );
        ace.validate().unwrap();
        assert!(matches!(
            ace.clone().with_protected(true).validate(),
            Err(AclError::Protected(_))
        ));
        assert!(matches!(
            ace.with_inherited_from("/parent/").validate(),
            Err(AclError::Inherited(_))
        ));
    }

    #[test]
    fn test_xml_round_trip() {
        let raw = r#"<D:ace xmlns:D="DAV:">
  <D:invert><D:principal><D:href>/p/mallory</D:href></D:principal></D:invert>
  <D:deny><D:privilege><D:read/></D:privilege></D:deny>
  <D:protected/>
  <D:inherited><D:href>/shared/</D:href></D:inherited>
</D:ace>"#;
        let doc = roxmltree::Document::parse(raw).unwrap();
        let ace = Ace::from_element(&Element::from_node(&doc.root_element())).unwrap();

        assert!(ace.invert());
        assert!(ace.is_protected());
        assert_eq!(ace.inherited_from(), Some("/shared/"));
        assert_eq!(ace.principal().url(), Some("/p/mallory"));
        assert!(ace.grant_denies()[0].is_deny());

        let mut prefixes = NamespacePrefixes::default();
        let mut out = String::new();
        ace.write_xml(&mut prefixes, &mut out);
        assert_eq!(
            out,
            concat!(
                "<D:ace><D:invert><D:principal><D:href>/p/mallory</D:href></D:principal></D:invert>",
                "<D:deny><D:privilege><D:read/></D:privilege></D:deny><D:protected/>",
                "<D:inherited><D:href>/shared/</D:href></D:inherited></D:ace>"
            )
        );
    }
}
