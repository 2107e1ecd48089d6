// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! Authentication-related types.
//!
//! Two schemes are supported: Basic and Digest (RFC 2617, `qop=auth` only). Credentials are
//! applied to each request by the [`Connection`](crate::Connection) that owns them; for Digest,
//! the nonce-count is part of that per-connection state.

use base64::{prelude::BASE64_STANDARD, write::EncoderWriter};
use core::fmt;
use http::{request::Builder, HeaderValue, Method};
use rand::Rng;
use std::collections::HashMap;
use std::io::Write;

/// Wrapper around a [`String`] that is not printed when debugging.
///
/// # Examples
///
/// ```
/// # use libwebdav::auth::Password;
/// let p1 = Password::from("secret");
/// let p2 = String::from("secret").into();
///
/// assert_eq!(p1, p2);
/// ```
///
/// # Display
///
/// The [`core::fmt::Display`] trait is intentionally not implemented. Use either
/// [`Password::into_string`] or [`Password::as_str()`].
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<REDACTED>")
    }
}

impl<S> From<S> for Password
where
    String: From<S>,
{
    fn from(value: S) -> Self {
        Password(String::from(value))
    }
}

#[allow(clippy::from_over_into)] // `From<Password> for String` is not feasible.
impl Into<String> for Password {
    /// Returns the underlying string.
    fn into(self) -> String {
        self.0
    }
}

impl Password {
    /// Returns the underlying string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Returns a reference to the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Authentication schemes supported by [`Connection`](crate::Connection).
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum Auth {
    None,
    Basic {
        username: String,
        password: Option<Password>,
    },
    /// Digest authentication for a challenge previously received from the server.
    ///
    /// See [`AuthorizationError::challenge`](crate::dav::AuthorizationError::challenge) and
    /// [`DigestChallenge::parse`].
    Digest {
        username: String,
        password: Password,
        challenge: DigestChallenge,
    },
}

/// Internal error resolving authentication.
///
/// This error is returned when there is an internal error handling authentication (e.g.: the input
/// is invalid). It IS NOT returned when authentication was rejected by the server.
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("digest challenge is missing the '{0}' parameter")]
    MissingField(&'static str),

    #[error("unsupported authentication scheme in challenge: '{0}'")]
    UnsupportedScheme(String),

    #[error("digest quality of protection '{0}' is not implemented")]
    NotImplemented(String),

    #[error("digest nonce-count exhausted; a new challenge is required")]
    NonceCountExhausted,

    #[error("credentials cannot be used in a header")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Parameters of a `WWW-Authenticate: Digest ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    /// Quality of protection options offered by the server, as sent (e.g.: `auth,auth-int`).
    pub qop: String,
    pub opaque: Option<String>,
}

impl DigestChallenge {
    /// Parses the value of a `WWW-Authenticate` header.
    ///
    /// # Errors
    ///
    /// - If the challenge is not for the Digest scheme.
    /// - If `realm`, `nonce` or `qop` are missing.
    pub fn parse(header: &str) -> Result<DigestChallenge, AuthError> {
        let header = header.trim();
        let (scheme, params) = header.split_once(' ').unwrap_or((header, ""));
        if !scheme.eq_ignore_ascii_case("digest") {
            return Err(AuthError::UnsupportedScheme(scheme.to_string()));
        }

        let mut params = parse_auth_params(params);
        let mut take = |key: &'static str| {
            params
                .remove(key)
                .filter(|value| !value.is_empty())
                .ok_or(AuthError::MissingField(key))
        };
        Ok(DigestChallenge {
            realm: take("realm")?,
            nonce: take("nonce")?,
            qop: take("qop")?,
            opaque: take("opaque").ok(),
        })
    }
}

/// Returns the scheme token of a `WWW-Authenticate` header (e.g.: `Basic` or `Digest`).
#[must_use]
pub fn challenge_scheme(header: &str) -> &str {
    header.split_whitespace().next().unwrap_or("")
}

/// Parses `key=value` and `key="quoted value"` pairs from a challenge.
fn parse_auth_params(content: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut chars = content.chars().peekable();

    while chars.peek().is_some() {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }

        let key: String = chars
            .by_ref()
            .take_while(|c| *c != '=')
            .collect::<String>()
            .trim()
            .to_lowercase();
        if key.is_empty() {
            break;
        }

        let value = if chars.peek() == Some(&'"') {
            chars.next();
            let mut value = String::new();
            let mut escaped = false;
            for c in chars.by_ref() {
                if escaped {
                    value.push(c);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    break;
                } else {
                    value.push(c);
                }
            }
            value
        } else {
            chars
                .by_ref()
                .take_while(|c| *c != ',' && !c.is_whitespace())
                .collect()
        };

        params.insert(key, value);
    }

    params
}

/// Credentials for HTTP Basic authentication.
///
/// The header value is computed once; the password is not kept.
#[derive(Debug, Clone)]
pub struct BasicAuthentication {
    username: String,
    header: HeaderValue,
}

impl BasicAuthentication {
    /// # Errors
    ///
    /// If the encoded credentials cannot be used as a header value.
    pub fn new(username: String, password: Option<&Password>) -> Result<Self, AuthError> {
        let mut sequence = b"Basic ".to_vec();
        let mut encoder = EncoderWriter::new(sequence, &BASE64_STANDARD);
        if let Some(pwd) = password {
            write!(encoder, "{username}:{}", pwd.0)?;
        } else {
            write!(encoder, "{username}:")?;
        }
        sequence = encoder.finish()?;

        let mut header = HeaderValue::from_bytes(&sequence)?;
        header.set_sensitive(true);
        Ok(BasicAuthentication { username, header })
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn header(&self) -> &HeaderValue {
        &self.header
    }
}

/// An authenticated Digest session.
///
/// Holds the nonce-count for the session; every authorised request increments it by one.
#[derive(Debug, Clone)]
pub struct DigestAuthentication {
    username: String,
    password: Password,
    challenge: DigestChallenge,
    nonce_count: u32,
}

impl DigestAuthentication {
    /// # Errors
    ///
    /// If the challenge offers only quality of protection options other than `auth`.
    pub fn new(
        username: String,
        password: Password,
        challenge: DigestChallenge,
    ) -> Result<Self, AuthError> {
        let offers_auth = challenge.qop.split(',').any(|qop| qop.trim() == "auth");
        if !offers_auth {
            return Err(AuthError::NotImplemented(challenge.qop.clone()));
        }
        Ok(DigestAuthentication {
            username,
            password,
            challenge,
            nonce_count: 0,
        })
    }

    /// Returns the nonce-count used by the most recent request.
    #[must_use]
    pub fn nonce_count(&self) -> u32 {
        self.nonce_count
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Computes the `Authorization` header value for the next request.
    ///
    /// # Errors
    ///
    /// If the nonce has been used for `u32::MAX` requests, or if the rendered value cannot be
    /// used as a header value.
    pub fn authorize(&mut self, method: &Method, uri: &str) -> Result<HeaderValue, AuthError> {
        self.nonce_count = self
            .nonce_count
            .checked_add(1)
            .ok_or(AuthError::NonceCountExhausted)?;
        let cnonce = generate_cnonce();
        let rendered = self.render(method.as_str(), uri, self.nonce_count, &cnonce);
        let mut header = HeaderValue::try_from(rendered)?;
        header.set_sensitive(true);
        Ok(header)
    }

    /// Computes the `response` parameter.
    #[must_use]
    pub fn response(&self, method: &str, uri: &str, nonce_count: u32, cnonce: &str) -> String {
        let ha1 = md5_hex(&format!(
            "{}:{}:{}",
            self.username,
            self.challenge.realm,
            self.password.as_str()
        ));
        let ha2 = md5_hex(&format!("{method}:{uri}"));
        md5_hex(&format!(
            "{ha1}:{}:{nonce_count:08x}:{cnonce}:auth:{ha2}",
            self.challenge.nonce
        ))
    }

    /// Renders a full `Authorization` header value.
    #[must_use]
    pub fn render(&self, method: &str, uri: &str, nonce_count: u32, cnonce: &str) -> String {
        let response = self.response(method, uri, nonce_count, cnonce);
        let mut rendered = format!(
            r#"Digest username="{}", realm="{}", nonce="{}", uri="{uri}", algorithm=MD5, response="{response}", qop=auth, nc={nonce_count:08x}, cnonce="{cnonce}""#,
            self.username, self.challenge.realm, self.challenge.nonce,
        );
        if let Some(opaque) = &self.challenge.opaque {
            rendered.push_str(&format!(r#", opaque="{opaque}""#));
        }
        rendered
    }
}

/// Authentication state held by a connection.
#[derive(Debug, Clone)]
pub enum AuthenticationInfo {
    Basic(BasicAuthentication),
    Digest(DigestAuthentication),
}

impl AuthenticationInfo {
    /// Resolves credentials into per-connection state.
    ///
    /// Returns `None` for [`Auth::None`].
    ///
    /// # Errors
    ///
    /// See [`BasicAuthentication::new`] and [`DigestAuthentication::new`].
    pub fn from_auth(auth: Auth) -> Result<Option<AuthenticationInfo>, AuthError> {
        match auth {
            Auth::None => Ok(None),
            Auth::Basic { username, password } => Ok(Some(AuthenticationInfo::Basic(
                BasicAuthentication::new(username, password.as_ref())?,
            ))),
            Auth::Digest {
                username,
                password,
                challenge,
            } => Ok(Some(AuthenticationInfo::Digest(DigestAuthentication::new(
                username, password, challenge,
            )?))),
        }
    }

    /// Returns the `Authorization` header value for a request.
    ///
    /// # Errors
    ///
    /// See [`DigestAuthentication::authorize`].
    pub fn authorization(&mut self, method: &Method, uri: &str) -> Result<HeaderValue, AuthError> {
        match self {
            AuthenticationInfo::Basic(basic) => Ok(basic.header.clone()),
            AuthenticationInfo::Digest(digest) => digest.authorize(method, uri),
        }
    }
}

pub(crate) trait AuthExt: Sized {
    /// Apply this authentication to an object.
    fn authenticate(self, auth: Option<&mut AuthenticationInfo>) -> Result<Self, AuthError>;
}

impl AuthExt for Builder {
    /// Apply this authentication to a request builder.
    ///
    /// The method and uri must have been set on the builder beforehand, since Digest responses
    /// depend on them.
    fn authenticate(self, auth: Option<&mut AuthenticationInfo>) -> Result<Builder, AuthError> {
        let Some(auth) = auth else {
            return Ok(self);
        };
        let method = self.method_ref().cloned().unwrap_or_default();
        let uri = self
            .uri_ref()
            .and_then(http::Uri::path_and_query)
            .map_or_else(|| String::from("/"), |p| p.as_str().to_string());
        let header = auth.authorization(&method, &uri)?;
        Ok(self.header(http::header::AUTHORIZATION, header))
    }
}

fn generate_cnonce() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use http::{Method, Request};

    use super::{
        challenge_scheme, Auth, AuthError, AuthExt, AuthenticationInfo, DigestAuthentication,
        DigestChallenge, Password,
    };

    fn rfc2617_session() -> DigestAuthentication {
        let challenge = DigestChallenge {
            realm: String::from("testrealm@host.com"),
            nonce: String::from("dcd98b7102dd2f0e8b11d0f600bfb0c093"),
            qop: String::from("auth,auth-int"),
            opaque: Some(String::from("5ccc069c403ebaf9f0171e9517f40e41")),
        };
        DigestAuthentication::new(
            String::from("Mufasa"),
            Password::from("Circle Of Life"),
            challenge,
        )
        .unwrap()
    }

    #[test]
    fn test_digest_vector() {
        let session = rfc2617_session();
        assert_eq!(
            session.response("GET", "/dir/index.html", 1, "0a4f113b"),
            "6629fae49393a05397450978507c4ef1"
        );
        assert_eq!(
            session.render("GET", "/dir/index.html", 1, "0a4f113b"),
            concat!(
                r#"Digest username="Mufasa", realm="testrealm@host.com", "#,
                r#"nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", uri="/dir/index.html", "#,
                r#"algorithm=MD5, response="6629fae49393a05397450978507c4ef1", qop=auth, "#,
                r#"nc=00000001, cnonce="0a4f113b", opaque="5ccc069c403ebaf9f0171e9517f40e41""#,
            )
        );
    }

    #[test]
    fn test_nonce_count_increments() {
        let mut session = rfc2617_session();
        for expected in 1..=20u32 {
            let header = session.authorize(&Method::GET, "/").unwrap();
            assert_eq!(session.nonce_count(), expected);
            let rendered = header.to_str().unwrap();
            assert!(rendered.contains(&format!("nc={expected:08x},")));
        }
    }

    #[test]
    fn test_nonce_count_exhausted() {
        let mut session = rfc2617_session();
        session.nonce_count = u32::MAX;
        assert!(matches!(
            session.authorize(&Method::GET, "/"),
            Err(AuthError::NonceCountExhausted)
        ));
        assert_eq!(session.nonce_count(), u32::MAX);
    }

    #[test]
    fn test_parse_challenge() {
        let header = r#"Digest realm="testrealm@host.com", qop="auth,auth-int", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", opaque="5ccc069c403ebaf9f0171e9517f40e41""#;
        let challenge = DigestChallenge::parse(header).unwrap();
        assert_eq!(challenge.realm, "testrealm@host.com");
        assert_eq!(challenge.qop, "auth,auth-int");
        assert_eq!(challenge.nonce, "dcd98b7102dd2f0e8b11d0f600bfb0c093");
        assert_eq!(
            challenge.opaque.as_deref(),
            Some("5ccc069c403ebaf9f0171e9517f40e41")
        );
        assert_eq!(challenge_scheme(header), "Digest");
    }

    #[test]
    fn test_parse_incomplete_challenge() {
        let err = DigestChallenge::parse(r#"Digest realm="x", qop="auth""#).unwrap_err();
        assert!(matches!(err, AuthError::MissingField("nonce")));

        let err = DigestChallenge::parse(r#"Basic realm="x""#).unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedScheme(s) if s == "Basic"));
    }

    #[test]
    fn test_auth_int_is_not_implemented() {
        let challenge = DigestChallenge {
            realm: String::from("r"),
            nonce: String::from("n"),
            qop: String::from("auth-int"),
            opaque: None,
        };
        let err =
            DigestAuthentication::new(String::from("u"), Password::from("p"), challenge).unwrap_err();
        assert!(matches!(err, AuthError::NotImplemented(qop) if qop == "auth-int"));
    }

    #[test]
    fn test_basic_header() {
        let mut info = AuthenticationInfo::from_auth(Auth::Basic {
            username: String::from("Aladdin"),
            password: Some(Password::from("open sesame")),
        })
        .unwrap()
        .unwrap();

        let request = Request::builder()
            .method(Method::GET)
            .uri("http://example.com/")
            .authenticate(Some(&mut info))
            .unwrap()
            .body(())
            .unwrap();
        let header = request.headers().get(http::header::AUTHORIZATION).unwrap();
        assert_eq!(header, "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
        assert!(header.is_sensitive());
    }

    #[test]
    fn test_no_auth() {
        assert!(AuthenticationInfo::from_auth(Auth::None).unwrap().is_none());
    }
}
