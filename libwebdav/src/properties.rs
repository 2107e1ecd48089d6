// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! Typed access to the live properties defined by WebDAV.

use chrono::{DateTime, FixedOffset};
use log::warn;
use roxmltree::ExpandedName;

use crate::dav::{Depth, LockScope, LockType};
use crate::names::{
    ACTIVELOCK, COLLECTION, CREATION_DATE, DEPTH, DISPLAY_NAME, EXCLUSIVE, GETCONTENTLANGUAGE,
    GETCONTENTLENGTH, GETCONTENTTYPE, GETETAG, GETLASTMODIFIED, HREF, LOCKDISCOVERY, LOCKSCOPE,
    LOCKTOKEN, LOCKTYPE, OWNER, RESOURCETYPE, SHARED, SUPPORTEDLOCK, TIMEOUT, WRITE,
};
use crate::property::{Element, PropertyName};
use crate::response::PropertyResponse;

/// Names of all live properties.
pub const LIVE_PROPERTY_NAMES: [ExpandedName<'static, 'static>; 11] = [
    CREATION_DATE,
    DISPLAY_NAME,
    GETCONTENTLANGUAGE,
    GETCONTENTLENGTH,
    GETCONTENTTYPE,
    GETETAG,
    GETLASTMODIFIED,
    OWNER,
    LOCKDISCOVERY,
    RESOURCETYPE,
    SUPPORTEDLOCK,
];

/// Returns [`LIVE_PROPERTY_NAMES`] as owned names.
#[must_use]
pub fn live_property_names() -> Vec<PropertyName> {
    LIVE_PROPERTY_NAMES.iter().map(PropertyName::from).collect()
}

/// A lock reported in `DAV:lockdiscovery`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveLock {
    pub scope: LockScope,
    pub lock_type: LockType,
    pub depth: Option<Depth>,
    pub owner: Option<String>,
    pub timeout: Option<String>,
    pub token: Option<String>,
}

impl ActiveLock {
    fn from_element(activelock: &Element) -> ActiveLock {
        let scope = match activelock.child(&LOCKSCOPE) {
            Some(scope) if scope.child(&SHARED).is_some() => LockScope::Shared,
            Some(scope) if scope.child(&EXCLUSIVE).is_none() => {
                warn!("Unknown lock scope, assuming exclusive");
                LockScope::Exclusive
            }
            _ => LockScope::Exclusive,
        };
        if let Some(lock_type) = activelock.child(&LOCKTYPE) {
            if lock_type.child(&WRITE).is_none() {
                warn!("Unknown lock type, assuming write");
            }
        }
        ActiveLock {
            scope,
            lock_type: LockType::Write,
            depth: activelock
                .child(&DEPTH)
                .and_then(Element::text)
                .and_then(Depth::parse),
            owner: activelock
                .child(&OWNER)
                .map(|owner| owner.all_text().trim().to_string())
                .filter(|owner| !owner.is_empty()),
            timeout: activelock
                .child(&TIMEOUT)
                .and_then(Element::text)
                .map(|t| t.trim().to_string()),
            token: activelock
                .child(&LOCKTOKEN)
                .and_then(|token| token.child(&HREF))
                .and_then(Element::text)
                .map(|t| t.trim().to_string()),
        }
    }
}

/// Typed view over the live properties of a resource.
///
/// Values that the server returned in an unexpected format are treated as missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveProperties {
    properties: PropertyResponse,
}

impl LiveProperties {
    #[must_use]
    pub fn new(properties: PropertyResponse) -> LiveProperties {
        LiveProperties { properties }
    }

    /// The underlying response.
    #[must_use]
    pub fn properties(&self) -> &PropertyResponse {
        &self.properties
    }

    fn text(&self, name: ExpandedName<'_, '_>) -> Option<&str> {
        self.properties
            .get(name)
            .and_then(Element::text)
            .map(str::trim)
    }

    /// `DAV:creationdate`, in RFC 3339 format.
    #[must_use]
    pub fn creation_date(&self) -> Option<DateTime<FixedOffset>> {
        let raw = self.text(CREATION_DATE)?;
        DateTime::parse_from_rfc3339(raw)
            .map_err(|err| warn!("Invalid creationdate '{raw}': {err}"))
            .ok()
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.text(DISPLAY_NAME)
    }

    #[must_use]
    pub fn content_language(&self) -> Option<&str> {
        self.text(GETCONTENTLANGUAGE)
    }

    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        let raw = self.text(GETCONTENTLENGTH)?;
        raw.parse()
            .map_err(|err| warn!("Invalid getcontentlength '{raw}': {err}"))
            .ok()
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.text(GETCONTENTTYPE)
    }

    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        self.text(GETETAG)
    }

    /// `DAV:getlastmodified`, in RFC 1123 format.
    #[must_use]
    pub fn last_modified(&self) -> Option<DateTime<FixedOffset>> {
        let raw = self.text(GETLASTMODIFIED)?;
        DateTime::parse_from_rfc2822(raw)
            .map_err(|err| warn!("Invalid getlastmodified '{raw}': {err}"))
            .ok()
    }

    /// The owner's href, or the text of `DAV:owner` if it holds no href.
    #[must_use]
    pub fn owner(&self) -> Option<String> {
        let owner = self.properties.get(OWNER)?;
        let text = owner
            .child(&HREF)
            .map_or_else(|| owner.all_text(), Element::all_text);
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.properties
            .get(RESOURCETYPE)
            .map_or(false, |rt| rt.child(&COLLECTION).is_some())
    }

    /// `"collection"` or `"resource"`.
    #[must_use]
    pub fn resource_type(&self) -> &'static str {
        if self.is_collection() {
            "collection"
        } else {
            "resource"
        }
    }

    /// Locks currently held on the resource.
    #[must_use]
    pub fn active_locks(&self) -> Vec<ActiveLock> {
        self.properties
            .get(LOCKDISCOVERY)
            .map(|discovery| {
                discovery
                    .children_named(&ACTIVELOCK)
                    .map(ActiveLock::from_element)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Lock scopes offered in `DAV:supportedlock`.
    #[must_use]
    pub fn supported_lock_scopes(&self) -> Vec<LockScope> {
        let Some(supported) = self.properties.get(SUPPORTEDLOCK) else {
            return Vec::new();
        };
        let mut scopes = Vec::new();
        for entry in supported.children() {
            let scope = match entry.child(&LOCKSCOPE) {
                Some(scope) if scope.child(&SHARED).is_some() => LockScope::Shared,
                Some(scope) if scope.child(&EXCLUSIVE).is_some() => LockScope::Exclusive,
                _ => continue,
            };
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        scopes
    }
}

impl From<PropertyResponse> for LiveProperties {
    fn from(value: PropertyResponse) -> Self {
        LiveProperties::new(value)
    }
}
