// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! Access control model, as described in [rfc3744].
//!
//! Everything in this module is plain data: ACLs are read with
//! [`ResourceStorer::get_acl`](crate::ResourceStorer::get_acl), edited locally, and written back
//! with [`ResourceStorer::set_acl`](crate::ResourceStorer::set_acl).
//!
//! [rfc3744]: https://www.rfc-editor.org/rfc/rfc3744

mod ace;
mod acl;
mod grant_deny;
mod principal;
mod privilege;

pub use ace::Ace;
pub use acl::Acl;
pub use grant_deny::GrantDeny;
pub use principal::{Principal, PrincipalKind, PseudoPrincipal};
pub use privilege::Privilege;

/// An ACL or one of its parts cannot be built or submitted as requested.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AclError {
    #[error("a grant or deny clause must contain at least one privilege")]
    EmptyGrantDeny,

    #[error("ACE for {principal} has {count} grant/deny clauses, but exactly one is required")]
    GrantDenyCount { principal: String, count: usize },

    #[error("ACE for {0} is protected and cannot be submitted")]
    Protected(String),

    #[error("ACE for {0} is inherited and cannot be submitted")]
    Inherited(String),

    #[error("ACE to be deleted is not in the list: {0}")]
    AceNotFound(String),
}
