// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

use crate::acp::{Ace, AclError, Principal};
use crate::names::{ACE, DAV};
use crate::property::Element;
use crate::response::ResponseFormatError;
use crate::xmlutils::NamespacePrefixes;

/// An ordered list of access control entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Acl {
    aces: Vec<Ace>,
    with_inherited: bool,
}

impl Acl {
    /// Builds an ACL, skipping duplicate entries.
    pub fn new<I: IntoIterator<Item = Ace>>(aces: I) -> Acl {
        let mut acl = Acl::default();
        acl.add_aces(aces);
        acl
    }

    #[must_use]
    pub fn aces(&self) -> &[Ace] {
        &self.aces
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.aces.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aces.is_empty()
    }

    /// Whether any of the entries is inherited from another resource.
    #[must_use]
    pub fn with_inherited(&self) -> bool {
        self.with_inherited
    }

    /// Appends an ACE unless an equal one is already present.
    ///
    /// Returns whether the ACE was added.
    pub fn add_ace(&mut self, ace: Ace) -> bool {
        if self.aces.contains(&ace) {
            return false;
        }
        self.with_inherited |= ace.is_inherited();
        self.aces.push(ace);
        true
    }

    pub fn add_aces<I: IntoIterator<Item = Ace>>(&mut self, aces: I) {
        for ace in aces {
            self.add_ace(ace);
        }
    }

    /// Removes an ACE.
    ///
    /// # Errors
    ///
    /// If no equal ACE is present.
    pub fn del_ace(&mut self, ace: &Ace) -> Result<(), AclError> {
        let index = self
            .aces
            .iter()
            .position(|existing| existing == ace)
            .ok_or_else(|| AclError::AceNotFound(ace.principal().to_string()))?;
        self.aces.remove(index);
        self.refresh_inherited();
        Ok(())
    }

    /// Removes every ACE for the same subject as `principal`.
    pub fn del_principal_aces(&mut self, principal: &Principal) {
        self.aces
            .retain(|ace| !ace.principal().same_subject(principal));
        self.refresh_inherited();
    }

    fn refresh_inherited(&mut self) {
        self.with_inherited = self.aces.iter().any(Ace::is_inherited);
    }

    /// Merges all entries for the same principal into a single entry.
    ///
    /// Entries are grouped by principal, keeping inherited and inverted entries apart from direct
    /// ones. A resulting ACE may hold both a grant and a deny clause, so the result is meant for
    /// display and is NOT valid for [`ResourceStorer::set_acl`](crate::ResourceStorer::set_acl).
    /// Use [`Acl::split_grant_deny`] to revert it.
    #[must_use]
    pub fn join_grant_deny(&self) -> Acl {
        let mut joined: Vec<(String, Ace)> = Vec::new();
        for ace in &self.aces {
            let key = ace.group_key();
            match joined.iter_mut().find(|(k, _)| *k == key) {
                Some((_, existing)) => existing.add_grant_denies(ace.grant_denies().iter().cloned()),
                None => joined.push((key, ace.clone())),
            }
        }
        Acl::new(joined.into_iter().map(|(_, ace)| ace))
    }

    /// Separates mixed entries into one grant-only and one deny-only entry per principal.
    ///
    /// All grant entries come first, followed by all deny entries, each in first-seen order.
    #[must_use]
    pub fn split_grant_deny(&self) -> Acl {
        let mut grants: Vec<(String, Ace)> = Vec::new();
        let mut denies: Vec<(String, Ace)> = Vec::new();
        for ace in &self.aces {
            let key = ace.group_key();
            for grant_deny in ace.grant_denies() {
                let bucket = if grant_deny.is_grant() {
                    &mut grants
                } else {
                    &mut denies
                };
                match bucket.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, existing)) => existing.add_grant_deny(grant_deny.clone()),
                    None => bucket.push((key.clone(), ace.with_only(grant_deny.clone()))),
                }
            }
        }
        Acl::new(grants.into_iter().chain(denies).map(|(_, ace)| ace))
    }

    /// Returns a copy without inherited and/or protected entries.
    ///
    /// Servers reject attempts to set such entries, so they must be stripped before an ACL read
    /// from a server is submitted again.
    #[must_use]
    pub fn strip_aces(&self, inherited: bool, protected: bool) -> Acl {
        Acl::new(
            self.aces
                .iter()
                .filter(|ace| !(inherited && ace.is_inherited()))
                .filter(|ace| !(protected && ace.is_protected()))
                .cloned(),
        )
    }

    /// Whether every entry can be submitted with an `ACL` request.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// # Errors
    ///
    /// Returns the error of the first entry that cannot be submitted.
    pub fn validate(&self) -> Result<(), AclError> {
        self.aces.iter().try_for_each(Ace::validate)
    }

    /// Parses a `DAV:acl` element.
    ///
    /// # Errors
    ///
    /// If it contains anything other than well-formed `DAV:ace` elements.
    pub fn from_element(acl: &Element) -> Result<Acl, ResponseFormatError> {
        let mut parsed = Acl::default();
        for child in acl.children() {
            if *child.name() != ACE {
                return Err(ResponseFormatError::content(
                    acl.name(),
                    format!("unexpected child {}", child.name()),
                ));
            }
            parsed.add_ace(Ace::from_element(child)?);
        }
        Ok(parsed)
    }

    /// Renders a `DAV:acl` element.
    pub(crate) fn write_xml(&self, prefixes: &mut NamespacePrefixes, out: &mut String) {
        let tag = prefixes.qualify(DAV, "acl");
        out.push_str(&format!("<{tag}>"));
        for ace in &self.aces {
            ace.write_xml(prefixes, out);
        }
        out.push_str(&format!("</{tag}>"));
    }
}

#[cfg(test)]
mod tests {
    use crate::acp::{Ace, AclError, GrantDeny, Principal, Privilege, PseudoPrincipal};

    use super::Acl;

    fn alice() -> Principal {
        Principal::from_url("/principals/alice/")
    }

    fn grant(privileges: &[Privilege]) -> GrantDeny {
        GrantDeny::grant(privileges.iter().cloned()).unwrap()
    }

    fn deny(privileges: &[Privilege]) -> GrantDeny {
        GrantDeny::deny(privileges.iter().cloned()).unwrap()
    }

    #[test]
    fn test_join_split_inverse() {
        let acl = Acl::new([
            Ace::new(alice(), grant(&[Privilege::Read])),
            Ace::new(alice(), deny(&[Privilege::Write])),
        ]);

        let joined = acl.join_grant_deny();
        assert_eq!(joined.len(), 1);
        let clauses = joined.aces()[0].grant_denies();
        assert_eq!(clauses.len(), 2);
        assert!(clauses[0].is_grant());
        assert!(clauses[1].is_deny());
        assert!(!joined.is_valid());

        let split = joined.split_grant_deny();
        assert_eq!(split.len(), 2);
        assert!(split.is_valid());
        for ace in acl.aces() {
            assert!(split.aces().contains(ace));
        }
    }

    #[test]
    fn test_join_keeps_inherited_apart() {
        let acl = Acl::new([
            Ace::new(alice(), grant(&[Privilege::Read])),
            Ace::new(alice(), grant(&[Privilege::Write])).with_inherited_from("/parent/"),
            Ace::new(alice(), grant(&[Privilege::Bind])),
        ]);

        let joined = acl.join_grant_deny();
        assert_eq!(joined.len(), 2);
        assert_eq!(
            joined.aces()[0].grant_denies()[0].privileges(),
            &[Privilege::Read, Privilege::Bind]
        );
        assert!(joined.aces()[1].is_inherited());
        assert!(joined.with_inherited());
    }

    #[test]
    fn test_split_merges_same_principal() {
        let mut mixed = Ace::new(alice(), grant(&[Privilege::Read]));
        mixed.add_grant_deny(deny(&[Privilege::WriteAcl]));
        let acl = Acl::new([
            mixed,
            Ace::new(alice(), grant(&[Privilege::Unlock])),
            Ace::new(
                Principal::from_pseudo(PseudoPrincipal::All),
                deny(&[Privilege::All]),
            ),
        ]);

        let split = acl.split_grant_deny();
        assert_eq!(
            split.aces(),
            &[
                Ace::new(alice(), grant(&[Privilege::Read, Privilege::Unlock])),
                Ace::new(alice(), deny(&[Privilege::WriteAcl])),
                Ace::new(
                    Principal::from_pseudo(PseudoPrincipal::All),
                    deny(&[Privilege::All]),
                ),
            ]
        );
    }

    #[test]
    fn test_strip_aces() {
        let plain = Ace::new(
            Principal::from_pseudo(PseudoPrincipal::Authenticated),
            grant(&[Privilege::Read]),
        );
        let acl = Acl::new([
            Ace::new(alice(), grant(&[Privilege::All])).with_inherited_from("/"),
            Ace::new(alice(), grant(&[Privilege::ReadAcl])).with_protected(true),
            plain.clone(),
        ]);

        let stripped = acl.strip_aces(true, true);
        assert_eq!(stripped, Acl::new([plain]));
        assert!(!stripped.with_inherited());

        assert_eq!(acl.strip_aces(true, false).len(), 2);
        assert_eq!(acl.strip_aces(false, true).len(), 2);
        assert_eq!(acl.strip_aces(false, false), acl);
    }

    #[test]
    fn test_add_and_delete() {
        let ace = Ace::new(alice(), grant(&[Privilege::Read]));
        let mut acl = Acl::default();
        assert!(acl.add_ace(ace.clone()));
        assert!(!acl.add_ace(ace.clone()));
        assert_eq!(acl.len(), 1);

        acl.del_ace(&ace).unwrap();
        assert!(acl.is_empty());
        assert!(matches!(acl.del_ace(&ace), Err(AclError::AceNotFound(_))));

        acl.add_aces([
            Ace::new(alice(), grant(&[Privilege::Read])),
            Ace::new(alice().with_display_name("Alice"), deny(&[Privilege::Write])),
            Ace::new(Principal::from_url("/principals/bob/"), grant(&[Privilege::Read])),
        ]);
        acl.del_principal_aces(&alice());
        assert_eq!(acl.len(), 1);
        assert_eq!(acl.aces()[0].principal().url(), Some("/principals/bob/"));
    }
}
