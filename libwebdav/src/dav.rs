// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! WebDAV methods.
//!
//! Each method sends one request through a [`Connection`] and classifies the response: error
//! statuses become a [`DavError`], `207 Multi-Status` bodies are parsed, and so are the bodies
//! of successful `LOCK` requests.
use std::io;

use http::{header, HeaderMap, HeaderValue, Method, Response, StatusCode};
use hyper::body::Bytes;
use log::debug;

use crate::acp::AclError;
use crate::auth::{challenge_scheme, AuthError, DigestChallenge};
use crate::condition::ConditionError;
use crate::connection::{Connection, TransportError};
use crate::namecheck::NameError;
use crate::requests::{lock_body, ValidationError};
use crate::response::{
    parse_lock_response, parse_multistatus, HttpStatus, MultistatusResponse, ResponseFormatError,
};
use crate::xmlutils::{quote_url, XML_CONTENT_TYPE};

/// Value of the `Depth` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Depth {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        }
    }

    /// Parses the text of a `DAV:depth` element.
    #[must_use]
    pub fn parse(value: &str) -> Option<Depth> {
        match value.trim() {
            "0" => Some(Depth::Zero),
            "1" => Some(Depth::One),
            v if v.eq_ignore_ascii_case("infinity") => Some(Depth::Infinity),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    #[default]
    Exclusive,
    Shared,
}

impl LockScope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LockScope::Exclusive => "exclusive",
            LockScope::Shared => "shared",
        }
    }
}

/// Only write locks are defined by WebDAV.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LockType {
    #[default]
    Write,
}

impl LockType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LockType::Write => "write",
        }
    }
}

/// Value of the `Timeout` header of a `LOCK` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockTimeout {
    Infinite,
    Seconds(u32),
}

impl LockTimeout {
    #[must_use]
    pub fn header_value(self) -> String {
        match self {
            LockTimeout::Infinite => String::from("Infinite"),
            LockTimeout::Seconds(seconds) => format!("Second-{seconds}"),
        }
    }
}

/// Well-known reasons for a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Forbidden,
    NotFound,
    Conflict,
    PreconditionFailed,
    Locked,
    FailedDependency,
    InsufficientStorage,
    Other,
}

impl FailureKind {
    #[must_use]
    pub fn from_status(status: StatusCode) -> FailureKind {
        match status.as_u16() {
            403 => FailureKind::Forbidden,
            404 => FailureKind::NotFound,
            409 => FailureKind::Conflict,
            412 => FailureKind::PreconditionFailed,
            423 => FailureKind::Locked,
            424 => FailureKind::FailedDependency,
            507 => FailureKind::InsufficientStorage,
            _ => FailureKind::Other,
        }
    }
}

/// The server answered with an error status.
#[derive(thiserror::Error, Debug)]
#[error("request failed: {status}")]
pub struct ProtocolError {
    pub status: HttpStatus,
    pub kind: FailureKind,
}

impl ProtocolError {
    #[must_use]
    pub fn new(status: HttpStatus) -> ProtocolError {
        ProtocolError {
            kind: FailureKind::from_status(status.code),
            status,
        }
    }
}

/// The server requires (other) credentials.
#[derive(thiserror::Error, Debug)]
#[error("authorization required: {reason}")]
pub struct AuthorizationError {
    pub reason: String,
    /// The `WWW-Authenticate` header of the response.
    pub challenge: Option<String>,
}

impl AuthorizationError {
    /// The authentication scheme requested by the server, e.g.: `Basic` or `Digest`.
    #[must_use]
    pub fn scheme(&self) -> Option<&str> {
        self.challenge.as_deref().map(challenge_scheme)
    }

    /// Parses a `Digest` challenge.
    ///
    /// # Errors
    ///
    /// If there is no challenge, or it is not a complete `Digest` challenge.
    pub fn digest_challenge(&self) -> Result<DigestChallenge, AuthError> {
        let challenge = self
            .challenge
            .as_deref()
            .ok_or(AuthError::MissingField("WWW-Authenticate"))?;
        DigestChallenge::parse(challenge)
    }
}

/// A multistatus response reported failures for some resources.
#[derive(thiserror::Error, Debug)]
#[error("request failed ({}): {reason}", code.as_u16())]
pub struct MultistatusError {
    pub code: StatusCode,
    pub reason: String,
    pub response: MultistatusResponse,
}

impl From<MultistatusResponse> for MultistatusError {
    fn from(response: MultistatusResponse) -> Self {
        MultistatusError {
            code: response.code(),
            reason: response.reason(),
            response,
        }
    }
}

/// A generic error for WebDAV operations.
#[derive(thiserror::Error, Debug)]
pub enum DavError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Unauthorized(#[from] AuthorizationError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Multistatus(#[from] MultistatusError),

    #[error("the server returned an invalid response")]
    ResponseFormat(#[from] ResponseFormatError),

    #[error("invalid input")]
    Validation(#[from] ValidationError),

    #[error("internal error with specified authentication")]
    Auth(#[from] AuthError),

    #[error("the server does not support {0}")]
    Unsupported(&'static str),

    #[error("'{0}' is not a collection")]
    NotACollection(String),

    #[error("error accessing local file")]
    Io(#[from] io::Error),
}

impl From<NameError> for DavError {
    fn from(value: NameError) -> Self {
        DavError::Validation(ValidationError::Name(value))
    }
}

impl From<AclError> for DavError {
    fn from(value: AclError) -> Self {
        DavError::Validation(ValidationError::Acl(value))
    }
}

impl From<ConditionError> for DavError {
    fn from(value: ConditionError) -> Self {
        DavError::Validation(ValidationError::Condition(value))
    }
}

impl From<http::Error> for DavError {
    fn from(value: http::Error) -> Self {
        DavError::Validation(ValidationError::Request(value))
    }
}

impl DavError {
    /// Returns the kind of failure, if the server answered with an error status.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            DavError::Protocol(err) => Some(err.kind),
            _ => None,
        }
    }
}

impl From<DavError> for io::Error {
    fn from(value: DavError) -> Self {
        let kind = match &value {
            DavError::Transport(TransportError::Closed) => io::ErrorKind::NotConnected,
            DavError::Transport(TransportError::RetriesExhausted { .. }) => {
                io::ErrorKind::ConnectionAborted
            }
            DavError::Transport(_)
            | DavError::Multistatus(_)
            | DavError::Unsupported(_)
            | DavError::NotACollection(_) => io::ErrorKind::Other,
            DavError::Unauthorized(_) => io::ErrorKind::PermissionDenied,
            DavError::Protocol(err) => match err.kind {
                FailureKind::NotFound => io::ErrorKind::NotFound,
                FailureKind::Forbidden => io::ErrorKind::PermissionDenied,
                _ => io::ErrorKind::Other,
            },
            DavError::ResponseFormat(_) => io::ErrorKind::InvalidData,
            DavError::Validation(_) | DavError::Auth(_) => io::ErrorKind::InvalidInput,
            DavError::Io(err) => err.kind(),
        };
        match value {
            DavError::Io(err) => err,
            other => io::Error::new(kind, other),
        }
    }
}

/// A classified response.
#[derive(Debug)]
pub struct DavResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Set for `207 Multi-Status` responses.
    pub multistatus: Option<MultistatusResponse>,
    /// Set for successful `LOCK` responses.
    pub lock_token: Option<String>,
}

impl DavResponse {
    /// Fails with [`DavError::Multistatus`] if the multistatus body reports any errors.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn check_multistatus(self) -> Result<DavResponse, DavError> {
        match &self.multistatus {
            Some(multistatus) if multistatus.error_count() > 0 => Err(DavError::Multistatus(
                MultistatusError::from(multistatus.clone()),
            )),
            _ => Ok(self),
        }
    }

    /// Returns the parsed multistatus body.
    ///
    /// # Errors
    ///
    /// If the response was not a multistatus response.
    pub fn into_multistatus(self) -> Result<MultistatusResponse, DavError> {
        self.multistatus
            .ok_or(DavError::ResponseFormat(ResponseFormatError::NotMultistatus(
                self.status,
            )))
    }
}

/// Picks the `Digest` challenge if the server offers one, otherwise the first challenge.
fn preferred_challenge(headers: &HeaderMap) -> Option<String> {
    let mut challenges = headers
        .get_all(header::WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok());
    let first = challenges.next()?;
    let preferred = std::iter::once(first)
        .chain(challenges)
        .find(|challenge| challenge_scheme(challenge).eq_ignore_ascii_case("digest"))
        .unwrap_or(first);
    Some(preferred.to_string())
}

/// Classifies a raw response.
///
/// # Errors
///
/// - [`DavError::Unauthorized`] for `401`.
/// - [`DavError::Protocol`] for any other status `>= 300`.
/// - [`DavError::ResponseFormat`] if a multistatus or lock body cannot be parsed.
pub fn evaluate_response(
    connection: &Connection,
    method: &Method,
    response: Response<Bytes>,
) -> Result<DavResponse, DavError> {
    let (head, body) = response.into_parts();
    let status = head.status;
    debug!("Method {method} returned {status}");

    if status.as_u16() >= 300 {
        debug!("Error response: {}", String::from_utf8_lossy(&body));
        let reason = status.canonical_reason().unwrap_or("").to_string();
        if status == StatusCode::UNAUTHORIZED {
            let challenge = preferred_challenge(&head.headers);
            return Err(AuthorizationError { reason, challenge }.into());
        }
        return Err(ProtocolError::new(HttpStatus::new(status, reason)).into());
    }

    let mut multistatus = None;
    let mut lock_token = None;
    if status == StatusCode::MULTI_STATUS {
        let parsed = parse_multistatus(&body, connection.config().url_charset)?;
        debug!(
            "Multistatus with {} entries and {} errors",
            parsed.len(),
            parsed.error_count()
        );
        multistatus = Some(parsed);
    } else if method.as_str() == "LOCK" {
        lock_token = Some(match parse_lock_response(&body) {
            Ok(token) => token,
            // Some servers only send the token in the header.
            Err(err) => head
                .headers
                .get("lock-token")
                .and_then(|value| value.to_str().ok())
                .map(|token| token.trim().trim_start_matches('<').trim_end_matches('>'))
                .map(str::to_string)
                .ok_or(err)?,
        });
    }

    Ok(DavResponse {
        status,
        headers: head.headers,
        body,
        multistatus,
        lock_token,
    })
}

fn dav_method(name: &str) -> Result<Method, http::Error> {
    Ok(Method::from_bytes(name.as_bytes())?)
}

fn xml_headers(mut headers: HeaderMap) -> HeaderMap {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(XML_CONTENT_TYPE),
    );
    headers
}

fn with_depth(mut headers: HeaderMap, depth: Depth) -> HeaderMap {
    headers.insert("depth", HeaderValue::from_static(depth.as_str()));
    headers
}

impl Connection {
    /// Sends a request and classifies its response.
    ///
    /// # Errors
    ///
    /// See [`Connection::execute`] and [`evaluate_response`].
    pub fn send<B: Into<Bytes>>(
        &self,
        method: &str,
        path: &str,
        headers: HeaderMap,
        body: B,
    ) -> Result<DavResponse, DavError> {
        let method = dav_method(method)?;
        let response = self.execute(&method, path, &headers, body.into())?;
        evaluate_response(self, &method, response)
    }

    /// Builds the value of a `Destination` header.
    ///
    /// `destination` is either a path on this host or an absolute URL.
    ///
    /// # Errors
    ///
    /// If an absolute URL lacks a scheme, host or path.
    pub fn destination(&self, destination: &str) -> Result<HeaderValue, ValidationError> {
        let absolute = if let Some((scheme, rest)) = destination.split_once("://") {
            let (host, path) = rest.split_at(rest.find('/').unwrap_or(rest.len()));
            if scheme.is_empty() || host.is_empty() || path.is_empty() {
                return Err(ValidationError::Url(destination.to_string()));
            }
            destination.to_string()
        } else if destination.starts_with('/') {
            self.url_for(destination)
        } else {
            return Err(ValidationError::Url(destination.to_string()));
        };
        HeaderValue::try_from(quote_url(&absolute, self.config().url_charset))
            .map_err(|_| ValidationError::Url(destination.to_string()))
    }

    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn get(&self, path: &str) -> Result<DavResponse, DavError> {
        self.send("GET", path, HeaderMap::new(), Bytes::new())
    }

    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn put(&self, path: &str, body: Bytes, headers: HeaderMap) -> Result<DavResponse, DavError> {
        self.send("PUT", path, headers, body)
    }

    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn delete(&self, path: &str, headers: HeaderMap) -> Result<DavResponse, DavError> {
        self.send("DELETE", path, headers, Bytes::new())
    }

    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn options(&self, path: &str) -> Result<DavResponse, DavError> {
        self.send("OPTIONS", path, HeaderMap::new(), Bytes::new())
    }

    /// Sends a `PROPFIND` request with a body built by [`crate::requests`].
    ///
    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn propfind(&self, path: &str, body: String, depth: Depth) -> Result<DavResponse, DavError> {
        let headers = with_depth(xml_headers(HeaderMap::new()), depth);
        self.send("PROPFIND", path, headers, body)
    }

    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn proppatch(
        &self,
        path: &str,
        body: String,
        headers: HeaderMap,
    ) -> Result<DavResponse, DavError> {
        self.send("PROPPATCH", path, xml_headers(headers), body)
    }

    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn mkcol(&self, path: &str, headers: HeaderMap) -> Result<DavResponse, DavError> {
        self.send("MKCOL", path, headers, Bytes::new())
    }

    /// Copies `path` to `destination`, recursively unless `depth` is [`Depth::Zero`].
    ///
    /// # Errors
    ///
    /// See [`Connection::send`] and [`Connection::destination`].
    pub fn copy(
        &self,
        path: &str,
        destination: &str,
        depth: Option<Depth>,
    ) -> Result<DavResponse, DavError> {
        let mut headers = HeaderMap::new();
        headers.insert("destination", self.destination(destination)?);
        if let Some(depth) = depth {
            headers = with_depth(headers, depth);
        }
        self.send("COPY", path, headers, Bytes::new())
    }

    /// # Errors
    ///
    /// See [`Connection::send`] and [`Connection::destination`].
    pub fn move_to(
        &self,
        path: &str,
        destination: &str,
        mut headers: HeaderMap,
    ) -> Result<DavResponse, DavError> {
        headers.insert("destination", self.destination(destination)?);
        self.send("MOVE", path, headers, Bytes::new())
    }

    /// Requests a lock. The token is returned in [`DavResponse::lock_token`].
    ///
    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn lock(
        &self,
        path: &str,
        owner: &str,
        timeout: Option<LockTimeout>,
        depth: Option<Depth>,
        scope: LockScope,
        lock_type: LockType,
    ) -> Result<DavResponse, DavError> {
        let mut headers = xml_headers(HeaderMap::new());
        if let Some(depth) = depth {
            headers = with_depth(headers, depth);
        }
        if let Some(timeout) = timeout {
            headers.insert(
                "timeout",
                HeaderValue::try_from(timeout.header_value()).map_err(http::Error::from)?,
            );
        }
        self.send("LOCK", path, headers, lock_body(owner, scope, lock_type))
    }

    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn unlock(&self, path: &str, token: &str) -> Result<DavResponse, DavError> {
        let token = if token.starts_with('<') {
            token.to_string()
        } else {
            format!("<{token}>")
        };
        let mut headers = HeaderMap::new();
        headers.insert(
            "lock-token",
            HeaderValue::try_from(token).map_err(http::Error::from)?,
        );
        self.send("UNLOCK", path, headers, Bytes::new())
    }

    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn acl(&self, path: &str, body: String, headers: HeaderMap) -> Result<DavResponse, DavError> {
        self.send("ACL", path, xml_headers(headers), body)
    }

    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn search(&self, path: &str, body: String, depth: Depth) -> Result<DavResponse, DavError> {
        let headers = with_depth(xml_headers(HeaderMap::new()), depth);
        self.send("SEARCH", path, headers, body)
    }

    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn report(&self, path: &str, body: String, depth: Depth) -> Result<DavResponse, DavError> {
        let headers = with_depth(xml_headers(HeaderMap::new()), depth);
        self.send("REPORT", path, headers, body)
    }

    /// Puts a resource under version control.
    ///
    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn version_control(&self, path: &str) -> Result<DavResponse, DavError> {
        self.send("VERSION-CONTROL", path, HeaderMap::new(), Bytes::new())
    }

    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn checkout(&self, path: &str, headers: HeaderMap) -> Result<DavResponse, DavError> {
        self.send("CHECKOUT", path, headers, Bytes::new())
    }

    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn checkin(&self, path: &str, headers: HeaderMap) -> Result<DavResponse, DavError> {
        self.send("CHECKIN", path, headers, Bytes::new())
    }

    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn uncheckout(&self, path: &str, headers: HeaderMap) -> Result<DavResponse, DavError> {
        self.send("UNCHECKOUT", path, headers, Bytes::new())
    }

    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn update(&self, path: &str, body: String, headers: HeaderMap) -> Result<DavResponse, DavError> {
        self.send("UPDATE", path, xml_headers(headers), body)
    }
}
