// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! Names of common dav elements and properties.

use roxmltree::ExpandedName;

/// Namespace for properties defined in the WebDav specifications.
pub const DAV: &str = "DAV:";

pub const MULTISTATUS: ExpandedName = ExpandedName::from_static(DAV, "multistatus");
pub const RESPONSE: ExpandedName = ExpandedName::from_static(DAV, "response");
pub const RESPONSE_DESCRIPTION: ExpandedName =
    ExpandedName::from_static(DAV, "responsedescription");
pub const HREF: ExpandedName = ExpandedName::from_static(DAV, "href");
pub const STATUS: ExpandedName = ExpandedName::from_static(DAV, "status");
pub const PROPSTAT: ExpandedName = ExpandedName::from_static(DAV, "propstat");
pub const PROP: ExpandedName = ExpandedName::from_static(DAV, "prop");

// Live properties.
pub const CREATION_DATE: ExpandedName = ExpandedName::from_static(DAV, "creationdate");
pub const DISPLAY_NAME: ExpandedName = ExpandedName::from_static(DAV, "displayname");
pub const GETCONTENTLANGUAGE: ExpandedName =
    ExpandedName::from_static(DAV, "getcontentlanguage");
pub const GETCONTENTLENGTH: ExpandedName = ExpandedName::from_static(DAV, "getcontentlength");
pub const GETCONTENTTYPE: ExpandedName = ExpandedName::from_static(DAV, "getcontenttype");
pub const GETETAG: ExpandedName = ExpandedName::from_static(DAV, "getetag");
pub const GETLASTMODIFIED: ExpandedName = ExpandedName::from_static(DAV, "getlastmodified");
pub const OWNER: ExpandedName = ExpandedName::from_static(DAV, "owner");
pub const RESOURCETYPE: ExpandedName = ExpandedName::from_static(DAV, "resourcetype");
pub const COLLECTION: ExpandedName = ExpandedName::from_static(DAV, "collection");
pub const SUPPORTEDLOCK: ExpandedName = ExpandedName::from_static(DAV, "supportedlock");

// Locking.
pub const LOCKDISCOVERY: ExpandedName = ExpandedName::from_static(DAV, "lockdiscovery");
pub const ACTIVELOCK: ExpandedName = ExpandedName::from_static(DAV, "activelock");
pub const LOCKTOKEN: ExpandedName = ExpandedName::from_static(DAV, "locktoken");
pub const LOCKSCOPE: ExpandedName = ExpandedName::from_static(DAV, "lockscope");
pub const LOCKTYPE: ExpandedName = ExpandedName::from_static(DAV, "locktype");
pub const EXCLUSIVE: ExpandedName = ExpandedName::from_static(DAV, "exclusive");
pub const SHARED: ExpandedName = ExpandedName::from_static(DAV, "shared");
pub const WRITE: ExpandedName = ExpandedName::from_static(DAV, "write");
pub const DEPTH: ExpandedName = ExpandedName::from_static(DAV, "depth");
pub const TIMEOUT: ExpandedName = ExpandedName::from_static(DAV, "timeout");

// Access control.
pub const ACL: ExpandedName = ExpandedName::from_static(DAV, "acl");
pub const ACE: ExpandedName = ExpandedName::from_static(DAV, "ace");
pub const PRINCIPAL: ExpandedName = ExpandedName::from_static(DAV, "principal");
pub const INVERT: ExpandedName = ExpandedName::from_static(DAV, "invert");
pub const GRANT: ExpandedName = ExpandedName::from_static(DAV, "grant");
pub const DENY: ExpandedName = ExpandedName::from_static(DAV, "deny");
pub const PRIVILEGE: ExpandedName = ExpandedName::from_static(DAV, "privilege");
pub const PROTECTED: ExpandedName = ExpandedName::from_static(DAV, "protected");
pub const INHERITED: ExpandedName = ExpandedName::from_static(DAV, "inherited");
pub const PROPERTY: ExpandedName = ExpandedName::from_static(DAV, "property");
pub const ALL: ExpandedName = ExpandedName::from_static(DAV, "all");
pub const AUTHENTICATED: ExpandedName = ExpandedName::from_static(DAV, "authenticated");
pub const UNAUTHENTICATED: ExpandedName = ExpandedName::from_static(DAV, "unauthenticated");
pub const SELF: ExpandedName = ExpandedName::from_static(DAV, "self");
pub const CURRENT_USER_PRIVILEGE_SET: ExpandedName =
    ExpandedName::from_static(DAV, "current-user-privilege-set");
pub const PRINCIPAL_COLLECTION_SET: ExpandedName =
    ExpandedName::from_static(DAV, "principal-collection-set");

// Versioning.
pub const VERSION_NAME: ExpandedName = ExpandedName::from_static(DAV, "version-name");
pub const CREATOR_DISPLAYNAME: ExpandedName =
    ExpandedName::from_static(DAV, "creator-displayname");
pub const CHECKED_IN: ExpandedName = ExpandedName::from_static(DAV, "checked-in");
pub const CHECKED_OUT: ExpandedName = ExpandedName::from_static(DAV, "checked-out");
pub const VERSION_HISTORY: ExpandedName = ExpandedName::from_static(DAV, "version-history");
