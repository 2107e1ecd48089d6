// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! High level access to resources and collections.
//!
//! A [`ResourceStorer`] wraps a single path on a shared [`Connection`]. A [`CollectionStorer`]
//! adds operations on the members of a collection. Neither caches anything: every call maps
//! onto one (or a few) requests.
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use http::header::{self, HeaderName, InvalidHeaderValue};
use http::{HeaderMap, HeaderValue, Method};
use hyper::body::Bytes;
use log::{debug, info, warn};

use crate::acp::{Acl, Privilege};
use crate::condition::{Condition, ContainsStrategy};
use crate::connection::Connection;
use crate::dav::{evaluate_response, DavError, Depth, LockScope, LockType, MultistatusError};
use crate::namecheck::validate_resource_name;
use crate::names::{ACL, CURRENT_USER_PRIVILEGE_SET, DAV, HREF, OWNER, PRINCIPAL_COLLECTION_SET, RESOURCETYPE};
use crate::properties::{live_property_names, LiveProperties};
use crate::property::{Element, PropertyName};
use crate::requests::{
    acl_body, all_properties_body, delete_body, find_body, property_names_body, search_body,
    update_body, PropertyValue, ValidationError,
};
use crate::response::{MultistatusEntry, MultistatusResponse, PropertyResponse, ResponseFormatError};
use crate::version::VersionHandler;
use crate::xmlutils::quote_url;

/// A lock held on a resource.
///
/// Pass it to mutating operations on the locked resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken {
    url: String,
    token: String,
}

impl LockToken {
    pub fn new<U: Into<String>, T: Into<String>>(url: U, token: T) -> LockToken {
        LockToken {
            url: url.into(),
            token: token.into(),
        }
    }

    /// URL of the locked resource.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The opaque token, e.g.: `opaquelocktoken:e71d4fae-...`.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the `If` header for requests on the locked resource.
    ///
    /// # Errors
    ///
    /// If the URL or token contain characters not allowed in headers.
    pub fn to_header(&self) -> Result<(HeaderName, HeaderValue), InvalidHeaderValue> {
        Ok((
            HeaderName::from_static("if"),
            HeaderValue::try_from(self.to_string())?,
        ))
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> (<{}>)", self.url, self.token)
    }
}

pub(crate) fn lock_headers(lock: Option<&LockToken>) -> Result<HeaderMap, DavError> {
    let mut headers = HeaderMap::new();
    if let Some(lock) = lock {
        let (name, value) = lock.to_header().map_err(http::Error::from)?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Strips the scheme and authority of an absolute href.
fn href_path(href: &str) -> &str {
    match href.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("/", |slash| &rest[slash..]),
        None => href,
    }
}

/// Joins the values of all headers named `name`.
fn header_values(headers: &HeaderMap, name: &str) -> String {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect::<Vec<_>>()
        .join(",")
}

/// Client access to a single WebDAV resource.
#[derive(Debug, Clone)]
pub struct ResourceStorer {
    connection: Arc<Connection>,
    path: String,
    default_namespace: Option<String>,
    validate_names: bool,
}

impl ResourceStorer {
    /// Creates a storer for `path` on `connection`.
    ///
    /// This sends no request; use [`ResourceStorer::validate`] to check the resource.
    ///
    /// # Errors
    ///
    /// If `path` is not absolute or any of its segments is not a valid resource name.
    pub fn new<S: Into<String>>(connection: Arc<Connection>, path: S) -> Result<Self, DavError> {
        Self::with_validation(connection, path, true)
    }

    /// Like [`ResourceStorer::new`], optionally skipping name validation for this storer and
    /// any storer derived from it.
    ///
    /// # Errors
    ///
    /// If `path` is not absolute, or if validation is enabled and a segment is invalid.
    pub fn with_validation<S: Into<String>>(
        connection: Arc<Connection>,
        path: S,
        validate_names: bool,
    ) -> Result<Self, DavError> {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(ValidationError::Url(path).into());
        }
        if validate_names {
            // Segments containing `ino:` are used by Tamino servers.
            path.split('/')
                .filter(|segment| !segment.is_empty() && !segment.contains("ino:"))
                .try_for_each(validate_resource_name)?;
        }
        Ok(ResourceStorer {
            connection,
            path,
            default_namespace: None,
            validate_names,
        })
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The absolute, percent-encoded URL of this resource.
    #[must_use]
    pub fn url(&self) -> String {
        quote_url(
            &self.connection.url_for(&self.path),
            self.connection.config().url_charset,
        )
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// The last segment of the path.
    #[must_use]
    pub fn name(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn validates_names(&self) -> bool {
        self.validate_names
    }

    /// The namespace applied to property names that have none.
    #[must_use]
    pub fn default_namespace(&self) -> Option<&str> {
        self.default_namespace.as_deref()
    }

    pub fn set_default_namespace<S: Into<String>>(&mut self, namespace: Option<S>) {
        self.default_namespace = namespace.map(Into::into);
    }

    /// Checks that this URL is served by a WebDAV (class 2) server.
    ///
    /// # Errors
    ///
    /// [`DavError::Unsupported`] if the `DAV` header lacks class 2, or any request error.
    pub fn validate(&self) -> Result<(), DavError> {
        let dav = header_values(&self.options()?, "dav");
        debug!("DAV header for {}: {dav}", self.path);
        if dav.split(',').any(|class| class.trim() == "2") {
            Ok(())
        } else {
            Err(DavError::Unsupported("WebDAV class 2"))
        }
    }

    /// Sends an `OPTIONS` request and returns all response headers.
    ///
    /// # Errors
    ///
    /// If the request fails.
    pub fn options(&self) -> Result<HeaderMap, DavError> {
        Ok(self.connection.options(&self.path)?.headers)
    }

    /// Whether the server implements the access control protocol.
    ///
    /// # Errors
    ///
    /// If the `OPTIONS` request fails.
    pub fn acl_support_available(&self) -> Result<bool, DavError> {
        let dav = header_values(&self.options()?, "dav");
        Ok(dav.split(',').any(|class| class.trim() == "access-control"))
    }

    /// Whether the server implements DASL basic search.
    ///
    /// # Errors
    ///
    /// If the `OPTIONS` request fails.
    pub fn dasl_basicsearch_available(&self) -> Result<bool, DavError> {
        let dasl = header_values(&self.options()?, "dasl");
        Ok(dasl.contains("<DAV:basicsearch>"))
    }

    /// Delta-V operations on this resource.
    #[must_use]
    pub fn version(&self) -> VersionHandler<'_> {
        VersionHandler::new(self)
    }

    /// Extracts the properties for this resource from a multistatus response.
    pub(crate) fn own_properties(
        &self,
        multistatus: &MultistatusResponse,
    ) -> Result<PropertyResponse, DavError> {
        match multistatus.entry_for(&self.path) {
            Some(MultistatusEntry::Properties(props)) => Ok(props.clone()),
            Some(MultistatusEntry::Status(status)) if status.is_error() => Err(
                DavError::Multistatus(MultistatusError::from(multistatus.clone())),
            ),
            Some(MultistatusEntry::Status(_)) => Ok(PropertyResponse::default()),
            None => Err(ResponseFormatError::MissingResponse(self.path.clone()).into()),
        }
    }

    /// Sends a depth 0 `PROPFIND`, without failing on missing properties.
    pub(crate) fn find_own_properties(
        &self,
        names: &[PropertyName],
    ) -> Result<PropertyResponse, DavError> {
        let body = find_body(names, self.default_namespace())?;
        let multistatus = self
            .connection
            .propfind(&self.path, body, Depth::Zero)?
            .into_multistatus()?;
        self.own_properties(&multistatus)
    }

    /// Reads the given properties.
    ///
    /// # Errors
    ///
    /// [`DavError::Multistatus`] if any of the properties is missing, or any request error.
    pub fn read_properties(&self, names: &[PropertyName]) -> Result<PropertyResponse, DavError> {
        let body = find_body(names, self.default_namespace())?;
        let multistatus = self
            .connection
            .propfind(&self.path, body, Depth::Zero)?
            .into_multistatus()?;
        let properties = self.own_properties(&multistatus)?;
        if !properties.failed().is_empty() {
            return Err(DavError::Multistatus(MultistatusError {
                code: properties.code(),
                reason: format!(
                    "property is missing on '{}': {}",
                    self.path,
                    properties.reason()
                ),
                response: multistatus,
            }));
        }
        Ok(properties)
    }

    /// Reads a single property.
    ///
    /// # Errors
    ///
    /// Same as [`ResourceStorer::read_properties`].
    pub fn read_property(&self, name: &PropertyName) -> Result<Element, DavError> {
        let properties = self.read_properties(std::slice::from_ref(name))?;
        let name = name.with_default_namespace(self.default_namespace());
        properties
            .into_properties()
            .remove(&name)
            .ok_or_else(|| ResponseFormatError::MissingResponse(name.to_string()).into())
    }

    /// Reads all (dead and live) properties.
    ///
    /// # Errors
    ///
    /// If the request fails.
    pub fn read_all_properties(&self) -> Result<PropertyResponse, DavError> {
        let multistatus = self
            .connection
            .propfind(&self.path, all_properties_body(), Depth::Zero)?
            .into_multistatus()?;
        self.own_properties(&multistatus)
    }

    /// Returns the names of all properties of this resource.
    ///
    /// # Errors
    ///
    /// If the request fails.
    pub fn read_all_property_names(&self) -> Result<Vec<PropertyName>, DavError> {
        let multistatus = self
            .connection
            .propfind(&self.path, property_names_body(), Depth::Zero)?
            .into_multistatus()?;
        Ok(self
            .own_properties(&multistatus)?
            .into_properties()
            .into_keys()
            .collect())
    }

    /// Reads all WebDAV live properties.
    ///
    /// # Errors
    ///
    /// If the request fails.
    pub fn read_standard_properties(&self) -> Result<LiveProperties, DavError> {
        self.find_own_properties(&live_property_names())
            .map(LiveProperties::new)
    }

    /// Sets or updates the given properties.
    ///
    /// # Errors
    ///
    /// [`DavError::Multistatus`] if any property could not be written, or any request error.
    pub fn write_properties(
        &self,
        properties: &BTreeMap<PropertyName, PropertyValue>,
        lock: Option<&LockToken>,
    ) -> Result<(), DavError> {
        let body = update_body(properties, self.default_namespace())?;
        self.connection
            .proppatch(&self.path, body, lock_headers(lock)?)?
            .check_multistatus()?;
        Ok(())
    }

    /// Removes the given properties.
    ///
    /// # Errors
    ///
    /// [`DavError::Multistatus`] if any property could not be removed, or any request error.
    pub fn delete_properties(
        &self,
        names: &[PropertyName],
        lock: Option<&LockToken>,
    ) -> Result<(), DavError> {
        let body = delete_body(names, self.default_namespace())?;
        self.connection
            .proppatch(&self.path, body, lock_headers(lock)?)?
            .check_multistatus()?;
        Ok(())
    }

    /// Writes the content of this resource.
    ///
    /// # Errors
    ///
    /// If the request fails.
    pub fn upload_content<B: Into<Bytes>>(
        &self,
        content: B,
        content_type: Option<&str>,
        lock: Option<&LockToken>,
    ) -> Result<(), DavError> {
        let mut headers = lock_headers(lock)?;
        if let Some(content_type) = content_type {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::try_from(content_type).map_err(http::Error::from)?,
            );
        }
        let response = self.connection.put(&self.path, content.into(), headers)?;
        debug!("Upload to {} returned {}", self.path, response.status);
        Ok(())
    }

    /// Streams the content of a local file into this resource.
    ///
    /// # Errors
    ///
    /// If the file cannot be read or the request fails.
    pub fn upload_file(
        &self,
        file: &Path,
        content_type: Option<&str>,
        lock: Option<&LockToken>,
    ) -> Result<(), DavError> {
        let mut source = File::open(file)?;
        let length = source.metadata()?.len();
        let mut headers = lock_headers(lock)?;
        if let Some(content_type) = content_type {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::try_from(content_type).map_err(http::Error::from)?,
            );
        }
        let response = self
            .connection
            .put_file(&self.path, &mut source, length, &headers)?;
        evaluate_response(&self.connection, &Method::PUT, response)?;
        info!("Uploaded {length} bytes to {}", self.path);
        Ok(())
    }

    /// Reads the content of this resource.
    ///
    /// # Errors
    ///
    /// If the request fails.
    pub fn download_content(&self) -> Result<Bytes, DavError> {
        Ok(self.connection.get(&self.path)?.body)
    }

    /// Copies the content of this resource into a local file.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// If the request fails or the file cannot be written. The file is removed if the server
    /// answers with an error.
    pub fn download_file(&self, file: &Path) -> Result<u64, DavError> {
        let block_size = self.connection.config().block_size.max(1);
        let mut target = BufWriter::with_capacity(block_size, File::create(file)?);
        let (response, written) =
            self.connection
                .download(&self.path, &HeaderMap::new(), &mut target)?;
        if let Err(err) = evaluate_response(&self.connection, &Method::GET, response) {
            drop(target);
            if let Err(remove) = fs::remove_file(file) {
                warn!("Could not remove {}: {remove}", file.display());
            }
            return Err(err);
        }
        target.flush()?;
        info!("Downloaded {written} bytes from {}", self.path);
        Ok(written)
    }

    /// Truncates the content of this resource.
    ///
    /// # Errors
    ///
    /// If the request fails.
    pub fn delete_content(&self, lock: Option<&LockToken>) -> Result<(), DavError> {
        self.connection
            .put(&self.path, Bytes::new(), lock_headers(lock)?)?;
        Ok(())
    }

    fn lock_with_depth(&self, owner: &str, depth: Option<Depth>) -> Result<LockToken, DavError> {
        let response = self
            .connection
            .lock(
                &self.path,
                owner,
                None,
                depth,
                LockScope::Exclusive,
                LockType::Write,
            )?
            .check_multistatus()?;
        let token = response
            .lock_token
            .ok_or_else(|| ResponseFormatError::MissingResponse(String::from("lock token")))?;
        Ok(LockToken::new(self.url(), token))
    }

    /// Locks this resource for exclusive write access.
    ///
    /// # Errors
    ///
    /// If the lock is not granted.
    pub fn lock(&self, owner: &str) -> Result<LockToken, DavError> {
        self.lock_with_depth(owner, None)
    }

    /// Removes a lock from this resource.
    ///
    /// # Errors
    ///
    /// If the request fails.
    pub fn unlock(&self, lock: &LockToken) -> Result<(), DavError> {
        self.connection.unlock(&self.path, lock.token())?;
        Ok(())
    }

    /// Copies this resource to `destination`, which is a path on the same host or an absolute
    /// URL. Collections are copied with all their members unless `infinity` is `false`.
    ///
    /// # Errors
    ///
    /// [`DavError::Multistatus`] if some members could not be copied, or any request error.
    pub fn copy(&self, destination: &str, infinity: bool) -> Result<(), DavError> {
        debug!("Copy {} to {destination}", self.path);
        let depth = (!infinity).then_some(Depth::Zero);
        self.connection
            .copy(&self.path, destination, depth)?
            .check_multistatus()?;
        Ok(())
    }

    /// Moves or renames this resource.
    ///
    /// # Errors
    ///
    /// [`DavError::Multistatus`] if some members could not be moved, or any request error.
    pub fn move_to(&self, destination: &str, lock: Option<&LockToken>) -> Result<(), DavError> {
        debug!("Move {} to {destination}", self.path);
        self.connection
            .move_to(&self.path, destination, lock_headers(lock)?)?
            .check_multistatus()?;
        Ok(())
    }

    /// Deletes this resource.
    ///
    /// # Errors
    ///
    /// [`DavError::Multistatus`] if some members could not be deleted, or any request error.
    pub fn delete(&self, lock: Option<&LockToken>) -> Result<(), DavError> {
        self.connection
            .delete(&self.path, lock_headers(lock)?)?
            .check_multistatus()?;
        Ok(())
    }

    /// Returns the access control list of this resource.
    ///
    /// # Errors
    ///
    /// If the request fails or the ACL is malformed.
    pub fn get_acl(&self) -> Result<Acl, DavError> {
        let acl = self.read_property(&ACL.into())?;
        Ok(Acl::from_element(&acl)?)
    }

    /// Replaces the (non-inherited, non-protected) ACEs of this resource.
    ///
    /// # Errors
    ///
    /// If the ACL cannot be submitted (see [`Acl::validate`]), or any request error.
    pub fn set_acl(&self, acl: &Acl, lock: Option<&LockToken>) -> Result<(), DavError> {
        let body = acl_body(acl)?;
        self.connection
            .acl(&self.path, body, lock_headers(lock)?)?
            .check_multistatus()?;
        Ok(())
    }

    /// Returns the privileges of the current user on this resource.
    ///
    /// # Errors
    ///
    /// If the request fails or the property is malformed.
    pub fn current_user_privileges(&self) -> Result<Vec<Privilege>, DavError> {
        let privileges = self.read_property(&CURRENT_USER_PRIVILEGE_SET.into())?;
        Ok(Privilege::list_from_element(&privileges)?)
    }

    /// Returns the URLs of the collections holding principals.
    ///
    /// # Errors
    ///
    /// If the request fails.
    pub fn principal_collections(&self) -> Result<Vec<String>, DavError> {
        let collections = self.read_property(&PRINCIPAL_COLLECTION_SET.into())?;
        Ok(collections
            .children_named(&HREF)
            .filter_map(Element::text)
            .map(|href| href.trim().to_string())
            .collect())
    }

    /// Returns the URL of the owner of this resource, if any.
    ///
    /// # Errors
    ///
    /// If the request fails.
    pub fn owner_url(&self) -> Result<Option<String>, DavError> {
        let owner = self.read_property(&OWNER.into())?;
        Ok(owner
            .children()
            .first()
            .map(|child| child.all_text().trim().to_string()))
    }
}

/// A member of a collection, as returned by [`CollectionStorer::collection_contents`].
#[derive(Debug, Clone)]
pub enum Member {
    Resource(ResourceStorer),
    Collection(CollectionStorer),
}

impl Member {
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Member::Resource(resource) => resource.path(),
            Member::Collection(collection) => collection.path(),
        }
    }
}

/// Client access to a WebDAV collection.
#[derive(Debug, Clone)]
pub struct CollectionStorer {
    resource: ResourceStorer,
}

impl Deref for CollectionStorer {
    type Target = ResourceStorer;

    fn deref(&self) -> &Self::Target {
        &self.resource
    }
}

impl CollectionStorer {
    /// Creates a storer for the collection at `path`. A trailing slash is added if missing.
    ///
    /// # Errors
    ///
    /// Same as [`ResourceStorer::new`].
    pub fn new<S: Into<String>>(connection: Arc<Connection>, path: S) -> Result<Self, DavError> {
        Self::with_validation(connection, path, true)
    }

    /// # Errors
    ///
    /// Same as [`ResourceStorer::with_validation`].
    pub fn with_validation<S: Into<String>>(
        connection: Arc<Connection>,
        path: S,
        validate_names: bool,
    ) -> Result<Self, DavError> {
        let mut path = path.into();
        if !path.ends_with('/') {
            path.push('/');
        }
        Ok(CollectionStorer {
            resource: ResourceStorer::with_validation(connection, path, validate_names)?,
        })
    }

    pub fn set_default_namespace<S: Into<String>>(&mut self, namespace: Option<S>) {
        self.resource.set_default_namespace(namespace);
    }

    fn child_path(&self, name: &str) -> Result<String, DavError> {
        if self.validate_names {
            validate_resource_name(name.trim_end_matches('/'))?;
        }
        Ok(format!("{}{name}", self.path))
    }

    fn child<S: Into<String>>(&self, path: S) -> Result<ResourceStorer, DavError> {
        let mut child =
            ResourceStorer::with_validation(self.connection.clone(), path, self.validate_names)?;
        child.default_namespace = self.default_namespace.clone();
        Ok(child)
    }

    /// Returns a storer for a member of this collection.
    ///
    /// # Errors
    ///
    /// If `name` is not a valid resource name.
    pub fn resource_storer(&self, name: &str) -> Result<ResourceStorer, DavError> {
        self.child(self.child_path(name)?)
    }

    /// Checks that this URL is a WebDAV collection.
    ///
    /// # Errors
    ///
    /// [`DavError::NotACollection`] if it is a plain resource, or see
    /// [`ResourceStorer::validate`].
    pub fn validate(&self) -> Result<(), DavError> {
        self.resource.validate()?;
        let resource_type = self.read_property(&RESOURCETYPE.into())?;
        if resource_type.children().is_empty() {
            return Err(DavError::NotACollection(self.path.clone()));
        }
        Ok(())
    }

    /// Creates a new collection inside this one.
    ///
    /// # Errors
    ///
    /// If `name` is invalid or the request fails.
    pub fn add_collection(
        &self,
        name: &str,
        lock: Option<&LockToken>,
    ) -> Result<CollectionStorer, DavError> {
        let mut path = self.child_path(name)?;
        if !path.ends_with('/') {
            path.push('/');
        }
        self.connection.mkcol(&path, lock_headers(lock)?)?;
        Ok(CollectionStorer {
            resource: self.child(path)?,
        })
    }

    /// Creates a new resource inside this collection, with optional content and properties.
    ///
    /// # Errors
    ///
    /// If `name` is invalid or any of the requests fails.
    pub fn add_resource(
        &self,
        name: &str,
        content: Option<Bytes>,
        properties: Option<&BTreeMap<PropertyName, PropertyValue>>,
        lock: Option<&LockToken>,
    ) -> Result<ResourceStorer, DavError> {
        let resource = self.child(self.child_path(name)?)?;
        resource.upload_content(content.unwrap_or_default(), None, lock)?;
        if let Some(properties) = properties.filter(|p| !p.is_empty()) {
            resource.write_properties(properties, lock)?;
        }
        Ok(resource)
    }

    /// Deletes a member of this collection.
    ///
    /// # Errors
    ///
    /// If `name` is invalid or the request fails.
    pub fn delete_resource(&self, name: &str, lock: Option<&LockToken>) -> Result<(), DavError> {
        let path = self.child_path(name)?;
        self.connection
            .delete(&path, lock_headers(lock)?)?
            .check_multistatus()?;
        Ok(())
    }

    /// Locks this collection and all its members.
    ///
    /// # Errors
    ///
    /// If the lock is not granted.
    pub fn lock_all(&self, owner: &str) -> Result<LockToken, DavError> {
        self.lock_with_depth(owner, Some(Depth::Infinity))
    }

    /// Returns the live properties of each member of this collection.
    ///
    /// # Errors
    ///
    /// If the request fails.
    pub fn list_resources(&self) -> Result<Vec<(String, LiveProperties)>, DavError> {
        let body = find_body(&live_property_names(), Some(DAV))?;
        let multistatus = self
            .connection
            .propfind(&self.path, body, Depth::One)?
            .into_multistatus()?;
        let own_path = self.path.trim_end_matches('/');

        let mut members = Vec::new();
        for (href, entry) in multistatus.into_entries() {
            let path = href_path(&href);
            if path == self.path {
                continue;
            }
            if path == own_path {
                warn!("Server omitted trailing slash for collection {}", self.path);
                continue;
            }
            let properties = match entry {
                MultistatusEntry::Properties(props) => LiveProperties::new(props),
                MultistatusEntry::Status(status) => {
                    debug!("No properties for {path}: {status}");
                    LiveProperties::default()
                }
            };
            members.push((path.to_string(), properties));
        }
        Ok(members)
    }

    /// Returns a storer and the live properties for each member of this collection.
    ///
    /// # Errors
    ///
    /// If this is not a collection, or any of the requests fails.
    pub fn collection_contents(&self) -> Result<Vec<(Member, LiveProperties)>, DavError> {
        self.validate()?;
        self.list_resources()?
            .into_iter()
            .map(|(path, properties)| -> Result<_, DavError> {
                let member = if properties.is_collection() {
                    let mut collection =
                        CollectionStorer::with_validation(self.connection.clone(), path, self.validate_names)?;
                    collection.set_default_namespace(self.default_namespace.clone());
                    Member::Collection(collection)
                } else {
                    Member::Resource(self.child(path)?)
                };
                Ok((member, properties))
            })
            .collect()
    }

    fn find(&self, body: String, depth: Depth) -> Result<MultistatusResponse, DavError> {
        self.connection
            .propfind(&self.path, body, depth)?
            .into_multistatus()
    }

    /// Reads the given properties of this collection and its direct members.
    ///
    /// # Errors
    ///
    /// If a name is invalid or the request fails.
    pub fn find_properties(&self, names: &[PropertyName]) -> Result<MultistatusResponse, DavError> {
        self.find(find_body(names, self.default_namespace())?, Depth::One)
    }

    /// Reads the given properties of this collection and all nested members.
    ///
    /// Many servers refuse this, since it can be expensive.
    ///
    /// # Errors
    ///
    /// If a name is invalid or the request fails.
    pub fn deep_find_properties(
        &self,
        names: &[PropertyName],
    ) -> Result<MultistatusResponse, DavError> {
        self.find(find_body(names, self.default_namespace())?, Depth::Infinity)
    }

    /// Reads all properties of this collection and its direct members.
    ///
    /// # Errors
    ///
    /// If the request fails.
    pub fn find_all_properties(&self) -> Result<MultistatusResponse, DavError> {
        self.find(all_properties_body(), Depth::One)
    }

    /// Searches the members of this collection with DASL `basicsearch`.
    ///
    /// With [`ContainsStrategy::IsDefinedPostFilter`], the properties inspected by `contains`
    /// terms are added to `select`, and the matching happens on the client.
    ///
    /// # Errors
    ///
    /// If the condition or a name is invalid, or the request fails.
    pub fn search(
        &self,
        condition: &Condition,
        select: &[PropertyName],
    ) -> Result<MultistatusResponse, DavError> {
        let strategy = self.connection.config().contains_strategy;
        let condition = condition.resolved(self.default_namespace());
        let mut select = select
            .iter()
            .map(|name| name.with_default_namespace(self.default_namespace()))
            .collect::<Vec<_>>();
        if strategy == ContainsStrategy::IsDefinedPostFilter {
            for property in condition.contains_properties() {
                if !select.contains(&property) {
                    select.push(property);
                }
            }
        }

        let scope = self.connection.config().url_charset.quote(&self.path);
        let body = search_body(
            &select,
            &scope,
            Depth::Infinity,
            Some(&condition),
            strategy,
            None,
        )?;
        let mut results = self
            .connection
            .search(&self.path, body, Depth::Infinity)?
            .into_multistatus()?;

        if strategy == ContainsStrategy::IsDefinedPostFilter {
            let before = results.len();
            results.retain(|_, entry| entry.as_properties().map_or(false, |p| condition.matches(p)));
            debug!("Filtered search results from {before} to {}", results.len());
        }
        Ok(results)
    }
}

impl From<CollectionStorer> for ResourceStorer {
    fn from(value: CollectionStorer) -> Self {
        value.resource
    }
}
