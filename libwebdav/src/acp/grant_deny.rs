// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

use crate::acp::{AclError, Privilege};
use crate::names::{DAV, DENY, GRANT};
use crate::property::Element;
use crate::response::ResponseFormatError;
use crate::xmlutils::NamespacePrefixes;

/// A `DAV:grant` or `DAV:deny` clause.
///
/// Holds at least one privilege, without duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrantDeny {
    grant: bool,
    privileges: Vec<Privilege>,
}

impl GrantDeny {
    /// # Errors
    ///
    /// If `privileges` is empty.
    pub fn grant<I: IntoIterator<Item = Privilege>>(privileges: I) -> Result<GrantDeny, AclError> {
        GrantDeny::new(true, privileges)
    }

    /// # Errors
    ///
    /// If `privileges` is empty.
    pub fn deny<I: IntoIterator<Item = Privilege>>(privileges: I) -> Result<GrantDeny, AclError> {
        GrantDeny::new(false, privileges)
    }

    fn new<I: IntoIterator<Item = Privilege>>(
        grant: bool,
        privileges: I,
    ) -> Result<GrantDeny, AclError> {
        let mut clause = GrantDeny {
            grant,
            privileges: Vec::new(),
        };
        clause.add_privileges(privileges);
        if clause.privileges.is_empty() {
            return Err(AclError::EmptyGrantDeny);
        }
        Ok(clause)
    }

    #[must_use]
    pub fn is_grant(&self) -> bool {
        self.grant
    }

    #[must_use]
    pub fn is_deny(&self) -> bool {
        !self.grant
    }

    #[must_use]
    pub fn privileges(&self) -> &[Privilege] {
        &self.privileges
    }

    /// Adds a privilege unless it is already present.
    pub fn add_privilege(&mut self, privilege: Privilege) {
        if !self.privileges.contains(&privilege) {
            self.privileges.push(privilege);
        }
    }

    pub fn add_privileges<I: IntoIterator<Item = Privilege>>(&mut self, privileges: I) {
        for privilege in privileges {
            self.add_privilege(privilege);
        }
    }

    /// Removes a privilege.
    ///
    /// # Errors
    ///
    /// If this would leave the clause empty. The clause is left unchanged in that case.
    pub fn remove_privilege(&mut self, privilege: &Privilege) -> Result<(), AclError> {
        if self.privileges.len() == 1 && self.privileges[0] == *privilege {
            return Err(AclError::EmptyGrantDeny);
        }
        self.privileges.retain(|p| p != privilege);
        Ok(())
    }

    /// Parses a `DAV:grant` or `DAV:deny` element.
    ///
    /// # Errors
    ///
    /// If the element is neither, or holds no privileges.
    pub fn from_element(clause: &Element) -> Result<GrantDeny, ResponseFormatError> {
        let grant = if *clause.name() == GRANT {
            true
        } else if *clause.name() == DENY {
            false
        } else {
            return Err(ResponseFormatError::content(
                clause.name(),
                "expected DAV:grant or DAV:deny",
            ));
        };
        let privileges = Privilege::list_from_element(clause)?;
        GrantDeny::new(grant, privileges)
            .map_err(|err| ResponseFormatError::content(clause.name(), err.to_string()))
    }

    pub(crate) fn write_xml(&self, prefixes: &mut NamespacePrefixes, out: &mut String) {
        let tag = prefixes.qualify(DAV, if self.grant { "grant" } else { "deny" });
        out.push_str(&format!("<{tag}>"));
        for privilege in &self.privileges {
            privilege.write_xml(prefixes, out);
        }
        out.push_str(&format!("</{tag}>"));
    }
}
