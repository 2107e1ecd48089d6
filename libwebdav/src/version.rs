// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! Delta-V (RFC 3253) operations on a single resource.
use http::header;
use log::debug;
use roxmltree::ExpandedName;

use crate::dav::{DavError, Depth};
use crate::names::{
    CHECKED_IN, CHECKED_OUT, CREATOR_DISPLAYNAME, HREF, VERSION_HISTORY, VERSION_NAME,
};
use crate::property::{Element, PropertyName};
use crate::requests::{version_tree_body, version_update_body};
use crate::resource::{lock_headers, LockToken, ResourceStorer};
use crate::response::MultistatusResponse;

/// Whether a resource is under version control, and which version it refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionState {
    Unversioned,
    /// Holds the href of the current version.
    CheckedIn(String),
    /// Holds the href of the version that was checked out.
    CheckedOut(String),
}

/// A version of a resource, as listed by [`VersionHandler::list_versions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub href: String,
    pub name: Option<String>,
    pub creator: Option<String>,
}

/// Delta-V operations; obtained via [`ResourceStorer::version`].
#[derive(Debug)]
pub struct VersionHandler<'a> {
    storer: &'a ResourceStorer,
}

fn href_of(element: Option<&Element>) -> Option<String> {
    element
        .and_then(|e| e.child(&HREF))
        .and_then(Element::text)
        .map(|href| href.trim().to_string())
}

impl<'a> VersionHandler<'a> {
    pub(crate) fn new(storer: &'a ResourceStorer) -> Self {
        VersionHandler { storer }
    }

    /// Puts the resource under version control.
    ///
    /// # Errors
    ///
    /// If the request fails.
    pub fn activate_version_control(&self) -> Result<(), DavError> {
        self.storer
            .connection()
            .version_control(self.storer.path())?;
        Ok(())
    }

    /// Checks out the resource so it can be modified.
    ///
    /// # Errors
    ///
    /// If the request fails.
    pub fn checkout(&self, lock: Option<&LockToken>) -> Result<(), DavError> {
        self.storer
            .connection()
            .checkout(self.storer.path(), lock_headers(lock)?)?;
        Ok(())
    }

    /// Checks in the resource, creating a new version.
    ///
    /// Returns the URL of the new version, if the server reported one.
    ///
    /// # Errors
    ///
    /// If the request fails.
    pub fn checkin(&self, lock: Option<&LockToken>) -> Result<Option<String>, DavError> {
        let response = self
            .storer
            .connection()
            .checkin(self.storer.path(), lock_headers(lock)?)?;
        let location = response
            .headers
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        debug!("Checked in {} as {location:?}", self.storer.path());
        Ok(location)
    }

    /// Discards the changes made since the last checkout.
    ///
    /// # Errors
    ///
    /// If the request fails.
    pub fn uncheckout(&self, lock: Option<&LockToken>) -> Result<(), DavError> {
        self.storer
            .connection()
            .uncheckout(self.storer.path(), lock_headers(lock)?)?;
        Ok(())
    }

    /// Sets the content and dead properties of the resource to those of a previous version.
    ///
    /// # Errors
    ///
    /// [`DavError::Multistatus`] if the update failed, or any request error.
    pub fn update(&self, version_href: &str, lock: Option<&LockToken>) -> Result<(), DavError> {
        self.storer
            .connection()
            .update(
                self.storer.path(),
                version_update_body(version_href),
                lock_headers(lock)?,
            )?
            .check_multistatus()?;
        Ok(())
    }

    /// Runs a `DAV:version-tree` report, returning the given properties of every version.
    ///
    /// # Errors
    ///
    /// If a name is invalid or the request fails.
    pub fn read_version_tree(
        &self,
        names: &[PropertyName],
    ) -> Result<MultistatusResponse, DavError> {
        let body = version_tree_body(names, self.storer.default_namespace())?;
        self.storer
            .connection()
            .report(self.storer.path(), body, Depth::Zero)?
            .into_multistatus()
    }

    /// Lists all versions of the resource.
    ///
    /// # Errors
    ///
    /// If the request fails.
    pub fn list_versions(&self) -> Result<Vec<VersionInfo>, DavError> {
        let tree = self.read_version_tree(&[VERSION_NAME.into(), CREATOR_DISPLAYNAME.into()])?;
        Ok(tree
            .iter()
            .map(|(href, entry)| {
                let properties = entry.as_properties();
                let text = |name: ExpandedName<'static, 'static>| {
                    properties
                        .and_then(|p| p.get(name))
                        .and_then(Element::text)
                        .map(|value| value.trim().to_string())
                };
                VersionInfo {
                    href: href.to_string(),
                    name: text(VERSION_NAME),
                    creator: text(CREATOR_DISPLAYNAME),
                }
            })
            .collect())
    }

    /// Reports whether the resource is checked in or out.
    ///
    /// # Errors
    ///
    /// If the request fails.
    pub fn version_state(&self) -> Result<VersionState, DavError> {
        let properties = self
            .storer
            .find_own_properties(&[CHECKED_IN.into(), CHECKED_OUT.into()])?;
        if let Some(href) = href_of(properties.get(CHECKED_OUT)) {
            return Ok(VersionState::CheckedOut(href));
        }
        if let Some(href) = href_of(properties.get(CHECKED_IN)) {
            return Ok(VersionState::CheckedIn(href));
        }
        Ok(VersionState::Unversioned)
    }

    /// Returns the href of the version history resource, if the server reports one.
    ///
    /// # Errors
    ///
    /// If the request fails.
    pub fn version_history(&self) -> Result<Option<String>, DavError> {
        let properties = self.storer.find_own_properties(&[VERSION_HISTORY.into()])?;
        Ok(href_of(properties.get(VERSION_HISTORY)))
    }
}
