// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! Blocking HTTP transport shared by all storers of a host.
//!
//! A [`Connection`] serialises requests: at most one request is in flight at any time, and the
//! lock is held for the whole request/response cycle. Transient transport failures are retried
//! (after reconnecting) up to [`ConnectionConfig::max_retries`] attempts in total.
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use http::{header, HeaderMap, Method, Request, Response, Uri};
use hyper::body::{Bytes, HttpBody};
use hyper::{client::HttpConnector, Body, Client};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use log::{debug, info};

use crate::auth::{Auth, AuthExt, AuthenticationInfo};
use crate::condition::ContainsStrategy;
use crate::dav::DavError;
use crate::requests::ValidationError;
use crate::xmlutils::UrlCharset;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Tunables for a [`Connection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Total number of attempts for a request failing with transient transport errors.
    pub max_retries: u32,
    /// Size of the blocks in which files are streamed.
    pub block_size: usize,
    /// Timeout for a whole request/response cycle.
    pub timeout: Duration,
    /// Character set used to percent-encode request paths and decode response hrefs.
    pub url_charset: UrlCharset,
    /// How substring conditions are sent to servers on `SEARCH`.
    pub contains_strategy: ContainsStrategy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            max_retries: 10,
            block_size: 30_000,
            timeout: Duration::from_secs(60),
            url_charset: UrlCharset::Utf8,
            contains_strategy: ContainsStrategy::Native,
        }
    }
}

/// Outcome of a failed attempt at the transport level.
#[derive(thiserror::Error, Debug)]
pub enum TransportFailure {
    /// The connection broke (closed, reset, incomplete response...). Worth retrying.
    #[error("transient transport failure")]
    Transient(#[source] BoxError),

    /// Anything else, including failures to connect and timeouts.
    #[error("transport failure")]
    Fatal(#[source] BoxError),
}

/// A request could not be completed.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("request failed after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: BoxError,
    },

    #[error("cannot perform request")]
    Fatal(#[source] BoxError),

    #[error("connection has been closed")]
    Closed,

    #[error("connection state is poisoned")]
    Poisoned,
}

/// The network seam of a [`Connection`].
///
/// Implementations perform a single attempt; retrying is the connection's concern.
pub trait HttpTransport: Send {
    /// Sends a request with an in-memory body.
    ///
    /// # Errors
    ///
    /// See [`TransportFailure`].
    fn execute(&mut self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportFailure>;

    /// Sends a request whose body is copied from `body` in blocks of `block_size` bytes.
    ///
    /// The request must carry a `Content-Length` header.
    ///
    /// # Errors
    ///
    /// See [`TransportFailure`].
    fn execute_streaming(
        &mut self,
        request: Request<()>,
        body: &mut dyn Read,
        block_size: usize,
    ) -> Result<Response<Bytes>, TransportFailure>;

    /// Sends a request and copies a successful (`2xx`) response body into `sink`.
    ///
    /// Returns the response with an empty body and the number of bytes written. Other responses
    /// are returned with their body and nothing is written.
    ///
    /// # Errors
    ///
    /// See [`TransportFailure`]. Failing to write to `sink` is fatal.
    fn execute_download(
        &mut self,
        request: Request<Bytes>,
        sink: &mut dyn Write,
    ) -> Result<(Response<Bytes>, u64), TransportFailure> {
        let response = self.execute(request)?;
        if !response.status().is_success() {
            return Ok((response, 0));
        }
        let (head, body) = response.into_parts();
        sink.write_all(&body)
            .map_err(|err| TransportFailure::Fatal(err.into()))?;
        Ok((Response::from_parts(head, Bytes::new()), body.len() as u64))
    }

    /// Drops any open connection so that the next request starts afresh.
    ///
    /// # Errors
    ///
    /// If a new connection cannot be established.
    fn reconnect(&mut self) -> Result<(), TransportFailure>;
}

/// [`HttpTransport`] backed by hyper and rustls.
///
/// Requests are driven to completion on a private current-thread runtime.
pub struct HyperTransport {
    runtime: tokio::runtime::Runtime,
    client: Client<HttpsConnector<HttpConnector>>,
    https_only: bool,
    timeout: Duration,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("https_only", &self.https_only)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// Builds a new transport for `base_url`.
    ///
    /// Only `https` is enabled, unless `base_url` has a scheme of `http`.
    ///
    /// # Errors
    ///
    /// If the runtime cannot be created.
    pub fn new(base_url: &Uri, timeout: Duration) -> io::Result<HyperTransport> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let https_only = !matches!(base_url.scheme_str(), Some("http"));
        Ok(HyperTransport {
            runtime,
            client: Self::client(https_only),
            https_only,
            timeout,
        })
    }

    fn client(https_only: bool) -> Client<HttpsConnector<HttpConnector>> {
        let builder = HttpsConnectorBuilder::new().with_native_roots();
        let builder = if https_only {
            builder.https_only()
        } else {
            builder.https_or_http()
        };
        Client::builder().build(builder.enable_http1().build())
    }
}

impl HttpTransport for HyperTransport {
    fn execute(&mut self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportFailure> {
        let request = request.map(Body::from);
        let response = self.client.request(request);
        let timeout = self.timeout;
        self.runtime.block_on(async move {
            let response = tokio::time::timeout(timeout, response)
                .await
                .map_err(|elapsed| TransportFailure::Fatal(elapsed.into()))?
                .map_err(classify)?;
            collect(response, timeout).await
        })
    }

    fn execute_streaming(
        &mut self,
        request: Request<()>,
        body: &mut dyn Read,
        block_size: usize,
    ) -> Result<Response<Bytes>, TransportFailure> {
        let (mut sender, stream) = Body::channel();
        let (head, ()) = request.into_parts();
        let response = self
            .runtime
            .spawn(self.client.request(Request::from_parts(head, stream)));
        let timeout = self.timeout;

        self.runtime.block_on(async move {
            let mut buffer = vec![0; block_size.max(1)];
            let mut sent = 0_usize;
            loop {
                let read = body
                    .read(&mut buffer)
                    .map_err(|err| TransportFailure::Fatal(err.into()))?;
                if read == 0 {
                    break;
                }
                if sender
                    .send_data(Bytes::copy_from_slice(&buffer[..read]))
                    .await
                    .is_err()
                {
                    // The request ended early; its outcome is reported below.
                    break;
                }
                sent += read;
            }
            drop(sender);
            info!("Streamed {sent} bytes");

            let response = tokio::time::timeout(timeout, response)
                .await
                .map_err(|elapsed| TransportFailure::Fatal(elapsed.into()))?
                .map_err(|join| TransportFailure::Fatal(join.into()))?
                .map_err(classify)?;
            collect(response, timeout).await
        })
    }

    fn execute_download(
        &mut self,
        request: Request<Bytes>,
        sink: &mut dyn Write,
    ) -> Result<(Response<Bytes>, u64), TransportFailure> {
        let request = request.map(Body::from);
        let response = self.client.request(request);
        let timeout = self.timeout;
        self.runtime.block_on(async move {
            let response = tokio::time::timeout(timeout, response)
                .await
                .map_err(|elapsed| TransportFailure::Fatal(elapsed.into()))?
                .map_err(classify)?;
            if !response.status().is_success() {
                return Ok((collect(response, timeout).await?, 0));
            }

            let (head, mut body) = response.into_parts();
            let mut written = 0_u64;
            while let Some(chunk) = tokio::time::timeout(timeout, body.data())
                .await
                .map_err(|elapsed| TransportFailure::Fatal(elapsed.into()))?
            {
                let chunk = chunk.map_err(classify)?;
                sink.write_all(&chunk)
                    .map_err(|err| TransportFailure::Fatal(err.into()))?;
                written += chunk.len() as u64;
            }
            Ok((Response::from_parts(head, Bytes::new()), written))
        })
    }

    fn reconnect(&mut self) -> Result<(), TransportFailure> {
        // Pooled connections are dropped along with the old client.
        self.client = Self::client(self.https_only);
        Ok(())
    }
}

async fn collect(
    response: Response<Body>,
    timeout: Duration,
) -> Result<Response<Bytes>, TransportFailure> {
    let (head, body) = response.into_parts();
    let body = tokio::time::timeout(timeout, hyper::body::to_bytes(body))
        .await
        .map_err(|elapsed| TransportFailure::Fatal(elapsed.into()))?
        .map_err(classify)?;
    Ok(Response::from_parts(head, body))
}

/// Sorts hyper errors into the ones worth retrying and the rest.
fn classify(err: hyper::Error) -> TransportFailure {
    if err.is_connect() {
        return TransportFailure::Fatal(err.into());
    }
    if err.is_incomplete_message() || err.is_closed() || err.is_canceled() || err.is_parse() {
        return TransportFailure::Transient(err.into());
    }
    let broken = std::error::Error::source(&err)
        .and_then(|source| source.downcast_ref::<io::Error>())
        .map_or(false, |io_err| {
            matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            )
        });
    if broken {
        TransportFailure::Transient(err.into())
    } else {
        TransportFailure::Fatal(err.into())
    }
}

struct ConnectionState {
    transport: Box<dyn HttpTransport>,
    auth: Option<AuthenticationInfo>,
}

/// A connection to a single WebDAV host.
///
/// Share it between storers with an `Arc`.
pub struct Connection {
    /// Scheme and authority used for all requests.
    base_url: Uri,
    config: ConnectionConfig,
    state: Mutex<ConnectionState>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("base_url", &self.base_url)
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub(crate) fn new(
        base_url: Uri,
        config: ConnectionConfig,
        transport: Box<dyn HttpTransport>,
        auth: Option<AuthenticationInfo>,
    ) -> Connection {
        Connection {
            base_url,
            config,
            state: Mutex::new(ConnectionState { transport, auth }),
            closed: AtomicBool::new(false),
        }
    }

    /// The URL that this connection was built with.
    #[must_use]
    pub fn base_url(&self) -> &Uri {
        &self.base_url
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Returns the absolute (not encoded) URL for `path`.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}://{}{path}",
            self.base_url.scheme_str().unwrap_or("https"),
            self.base_url
                .authority()
                .map_or("localhost", http::uri::Authority::as_str),
        )
    }

    /// Returns the request URI for `path`, percent-encoding it with the configured charset.
    ///
    /// # Errors
    ///
    /// If the result is not a valid URI.
    pub fn request_uri(&self, path: &str) -> Result<Uri, ValidationError> {
        let encoded = format!(
            "{}://{}{}",
            self.base_url.scheme_str().unwrap_or("https"),
            self.base_url
                .authority()
                .map_or("localhost", http::uri::Authority::as_str),
            self.config.url_charset.quote(path),
        );
        Uri::try_from(encoded.as_str()).map_err(|_| ValidationError::Url(self.url_for(path)))
    }

    /// Replaces the credentials used for later requests.
    ///
    /// This is typically used after a `401` response, to answer a Digest challenge.
    ///
    /// # Errors
    ///
    /// If the credentials are incomplete, or if the connection is unusable.
    pub fn set_auth(&self, auth: Auth) -> Result<(), DavError> {
        let auth = AuthenticationInfo::from_auth(auth)?;
        self.lock_state()?.auth = auth;
        Ok(())
    }

    /// Closes this connection.
    ///
    /// Any request started afterwards (including those waiting for the lock) fails with
    /// [`TransportError::Closed`].
    pub fn close(&self) {
        debug!("Closing connection to {}", self.base_url);
        self.closed.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, ConnectionState>, TransportError> {
        let state = self.state.lock().map_err(|_| TransportError::Poisoned)?;
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        Ok(state)
    }

    /// Sends a request, retrying transient failures.
    ///
    /// HTTP error statuses are returned as regular responses; it is up to the caller to
    /// interpret them.
    ///
    /// # Errors
    ///
    /// - If the path cannot be encoded into a valid URI.
    /// - If authentication fails to apply.
    /// - If the transport fails fatally, or keeps failing for all attempts.
    pub fn execute(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response<Bytes>, DavError> {
        let uri = self.request_uri(path)?;
        let mut state = self.lock_state()?;
        let attempts = self.config.max_retries.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = Request::builder()
                .method(method.clone())
                .uri(uri.clone())
                .authenticate(state.auth.as_mut())?
                .body(body.clone())
                .map_err(ValidationError::from)?;
            request.headers_mut().extend(headers.clone());
            log_request(&request);

            let failure = match state.transport.execute(request) {
                Ok(response) => {
                    log_response(&response);
                    return Ok(response);
                }
                Err(TransportFailure::Fatal(err)) => {
                    return Err(TransportError::Fatal(err).into());
                }
                Err(TransportFailure::Transient(err)) => err,
            };

            debug!("Attempt {attempt}/{attempts} for {method} {path} failed: {failure}");
            if attempt >= attempts {
                return Err(TransportError::RetriesExhausted {
                    attempts,
                    source: failure,
                }
                .into());
            }
            if self.is_closed() {
                return Err(TransportError::Closed.into());
            }
            state.transport.reconnect().map_err(|err| match err {
                TransportFailure::Transient(err) | TransportFailure::Fatal(err) => {
                    TransportError::Fatal(err)
                }
            })?;
        }
    }

    /// Uploads `length` bytes read from `reader` with a `PUT` request.
    ///
    /// The body is copied in blocks of [`ConnectionConfig::block_size`] bytes and is never
    /// buffered as a whole. Since the reader cannot be rewound, this request is not retried.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::execute`].
    pub fn put_file(
        &self,
        path: &str,
        reader: &mut dyn Read,
        length: u64,
        headers: &HeaderMap,
    ) -> Result<Response<Bytes>, DavError> {
        let uri = self.request_uri(path)?;
        let mut state = self.lock_state()?;

        let mut request = Request::builder()
            .method(Method::PUT)
            .uri(uri)
            .authenticate(state.auth.as_mut())?
            .header(header::CONTENT_LENGTH, length)
            .body(())
            .map_err(ValidationError::from)?;
        request.headers_mut().extend(headers.clone());
        debug!("Request PUT {} ({length} bytes, streamed)", request.uri());

        match state
            .transport
            .execute_streaming(request, reader, self.config.block_size)
        {
            Ok(response) => {
                log_response(&response);
                Ok(response)
            }
            Err(TransportFailure::Transient(err) | TransportFailure::Fatal(err)) => {
                Err(TransportError::Fatal(err).into())
            }
        }
    }

    /// Sends a `GET` request, copying a successful response body into `sink` as it arrives.
    ///
    /// Since part of the body may already have been written, this request is not retried.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::execute`], or if writing to `sink` fails.
    pub fn download(
        &self,
        path: &str,
        headers: &HeaderMap,
        sink: &mut dyn Write,
    ) -> Result<(Response<Bytes>, u64), DavError> {
        let uri = self.request_uri(path)?;
        let mut state = self.lock_state()?;

        let mut request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .authenticate(state.auth.as_mut())?
            .body(Bytes::new())
            .map_err(ValidationError::from)?;
        request.headers_mut().extend(headers.clone());
        log_request(&request);

        match state.transport.execute_download(request, sink) {
            Ok((response, written)) => {
                log_response(&response);
                Ok((response, written))
            }
            Err(TransportFailure::Transient(err) | TransportFailure::Fatal(err)) => {
                Err(TransportError::Fatal(err).into())
            }
        }
    }
}

fn log_request(request: &Request<Bytes>) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    debug!("Request {} {}", request.method(), request.uri());
    for (name, value) in request.headers() {
        if name != header::AUTHORIZATION {
            debug!("Request header {name}: {value:?}");
        }
    }
    if !request.body().is_empty() {
        debug!("Request body: {}", String::from_utf8_lossy(request.body()));
    }
}

fn log_response(response: &Response<Bytes>) {
    debug!("Response ({}): {:?}", response.status(), response.body());
}
