// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! Builder for [`Connection`]s.
//!
//! The type parameter tracks which settings are still missing, so an incomplete builder cannot
//! be built.
use std::sync::Arc;

use http::Uri;
use log::debug;

use crate::auth::{Auth, AuthenticationInfo, Password};
use crate::connection::{Connection, ConnectionConfig, HttpTransport, HyperTransport};
use crate::dav::DavError;
use crate::requests::ValidationError;

pub struct NeedsUri(pub(crate) ());
pub struct NeedsAuth {
    pub(crate) uri: Uri,
}
pub struct NeedsPassword {
    pub(crate) uri: Uri,
    pub(crate) username: String,
}
pub struct Ready {
    pub(crate) uri: Uri,
    pub(crate) auth: Auth,
    pub(crate) config: ConnectionConfig,
    pub(crate) transport: Option<Box<dyn HttpTransport>>,
}

pub struct ConnectionBuilder<State> {
    pub(crate) state: State,
}

impl Default for ConnectionBuilder<NeedsUri> {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionBuilder<NeedsUri> {
    #[must_use]
    pub fn new() -> ConnectionBuilder<NeedsUri> {
        ConnectionBuilder {
            state: NeedsUri(()),
        }
    }

    /// Sets the scheme, host and port from a `Uri`. Any path is ignored.
    #[must_use]
    pub fn with_uri(self, uri: Uri) -> ConnectionBuilder<NeedsAuth> {
        ConnectionBuilder {
            state: NeedsAuth { uri },
        }
    }
}

impl ConnectionBuilder<NeedsAuth> {
    /// Sets the authentication type and credentials.
    #[must_use]
    pub fn with_auth(self, auth: Auth) -> ConnectionBuilder<Ready> {
        Self::ready(self.state.uri, auth)
    }

    /// Sets a username for basic authentication.
    #[must_use]
    pub fn with_username<S: Into<String>>(self, username: S) -> ConnectionBuilder<NeedsPassword> {
        ConnectionBuilder {
            state: NeedsPassword {
                uri: self.state.uri,
                username: username.into(),
            },
        }
    }

    /// Sends requests without credentials.
    #[must_use]
    pub fn without_auth(self) -> ConnectionBuilder<Ready> {
        Self::ready(self.state.uri, Auth::None)
    }

    fn ready(uri: Uri, auth: Auth) -> ConnectionBuilder<Ready> {
        ConnectionBuilder {
            state: Ready {
                uri,
                auth,
                config: ConnectionConfig::default(),
                transport: None,
            },
        }
    }
}

impl ConnectionBuilder<NeedsPassword> {
    /// Sets the password.
    #[must_use]
    pub fn with_password<P: Into<Password>>(self, password: P) -> ConnectionBuilder<Ready> {
        ConnectionBuilder::<NeedsAuth>::ready(
            self.state.uri,
            Auth::Basic {
                username: self.state.username,
                password: Some(password.into()),
            },
        )
    }

    /// Sets no password.
    #[must_use]
    pub fn without_password(self) -> ConnectionBuilder<Ready> {
        ConnectionBuilder::<NeedsAuth>::ready(
            self.state.uri,
            Auth::Basic {
                username: self.state.username,
                password: None,
            },
        )
    }
}

impl ConnectionBuilder<Ready> {
    /// Replaces the default [`ConnectionConfig`].
    #[must_use]
    pub fn with_config(mut self, config: ConnectionConfig) -> ConnectionBuilder<Ready> {
        self.state.config = config;
        self
    }

    /// Uses a custom transport instead of the default `hyper` client.
    #[must_use]
    pub fn with_transport(mut self, transport: Box<dyn HttpTransport>) -> ConnectionBuilder<Ready> {
        self.state.transport = Some(transport);
        self
    }

    /// Creates the connection. No request is sent.
    ///
    /// # Errors
    ///
    /// If the URI lacks a host, the credentials are incomplete, or the runtime for the default
    /// transport cannot be created.
    pub fn build(self) -> Result<Arc<Connection>, DavError> {
        let Ready {
            uri,
            auth,
            config,
            transport,
        } = self.state;
        if uri.authority().is_none() {
            return Err(ValidationError::Url(uri.to_string()).into());
        }
        let base_url = Uri::builder()
            .scheme(uri.scheme_str().unwrap_or("https"))
            .authority(uri.authority().map_or("", |a| a.as_str()))
            .path_and_query("/")
            .build()
            .map_err(ValidationError::from)?;

        let auth = AuthenticationInfo::from_auth(auth)?;
        let transport = match transport {
            Some(transport) => transport,
            None => Box::new(HyperTransport::new(&base_url, config.timeout)?),
        };
        debug!("Connection to {base_url} ready.");
        Ok(Arc::new(Connection::new(base_url, config, transport, auth)))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use http::{Request, Response, Uri};
    use hyper::body::Bytes;

    use crate::auth::Auth;
    use crate::connection::{HttpTransport, TransportFailure};
    use crate::dav::DavError;

    use super::ConnectionBuilder;

    struct Unreachable;

    impl HttpTransport for Unreachable {
        fn execute(&mut self, _: Request<Bytes>) -> Result<Response<Bytes>, TransportFailure> {
            Err(TransportFailure::Fatal("unreachable".into()))
        }

        fn execute_streaming(
            &mut self,
            _: Request<()>,
            _: &mut dyn Read,
            _: usize,
        ) -> Result<Response<Bytes>, TransportFailure> {
            Err(TransportFailure::Fatal("unreachable".into()))
        }

        fn reconnect(&mut self) -> Result<(), TransportFailure> {
            Ok(())
        }
    }

    #[test]
    fn test_build_without_host() {
        let result = ConnectionBuilder::new()
            .with_uri(Uri::from_static("/just/a/path"))
            .with_auth(Auth::None)
            .with_transport(Box::new(Unreachable))
            .build();
        assert!(matches!(result, Err(DavError::Validation(_))));
    }

    #[test]
    fn test_build_strips_path() {
        let connection = ConnectionBuilder::new()
            .with_uri(Uri::from_static("https://dav.example.com:8443/some/path"))
            .with_username("alice")
            .with_password("secret")
            .with_transport(Box::new(Unreachable))
            .build()
            .unwrap();
        assert_eq!(connection.base_url().to_string(), "https://dav.example.com:8443/");
        assert_eq!(
            connection.url_for("/docs/a.txt"),
            "https://dav.example.com:8443/docs/a.txt"
        );
    }
}
