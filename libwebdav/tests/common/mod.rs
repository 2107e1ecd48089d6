// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! Scripted transport for driving a `Connection` without a server.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Read;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};

use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use hyper::body::Bytes;
use libwebdav::auth::Auth;
use libwebdav::connection::{HttpTransport, TransportFailure};
use libwebdav::{Connection, ConnectionBuilder, ConnectionConfig};

pub const BASE: &str = "https://dav.example.com";

pub fn init() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// What the transport does for the next request.
pub enum Reply {
    Status(StatusCode),
    Body(StatusCode, &'static str),
    WithHeader(StatusCode, &'static str, &'static str),
    Transient,
    Fatal,
    /// Reports on `entered` that the request is in flight, then answers `200` once `release`
    /// receives a message.
    Gate {
        entered: Sender<()>,
        release: Receiver<()>,
    },
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: String,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Shared view of everything the transport saw.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    requests: Arc<Mutex<Vec<Recorded>>>,
    reconnects: Arc<Mutex<usize>>,
}

impl Recorder {
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last(&self) -> Recorded {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }

    pub fn reconnects(&self) -> usize {
        *self.reconnects.lock().unwrap()
    }
}

/// Answers requests from a script. Once the script runs out, every request fails transiently.
pub struct MockTransport {
    script: VecDeque<Reply>,
    recorder: Recorder,
}

impl MockTransport {
    pub fn new(script: Vec<Reply>) -> (MockTransport, Recorder) {
        let recorder = Recorder::default();
        let transport = MockTransport {
            script: script.into(),
            recorder: recorder.clone(),
        };
        (transport, recorder)
    }

    fn reply(&mut self) -> Result<Response<Bytes>, TransportFailure> {
        let (status, header, body) = match self.script.pop_front().unwrap_or(Reply::Transient) {
            Reply::Status(status) => (status, None, ""),
            Reply::Body(status, body) => (status, None, body),
            Reply::WithHeader(status, name, value) => (status, Some((name, value)), ""),
            Reply::Transient => return Err(TransportFailure::Transient("connection reset".into())),
            Reply::Fatal => return Err(TransportFailure::Fatal("connection refused".into())),
            Reply::Gate { entered, release } => {
                entered.send(()).unwrap();
                release.recv().unwrap();
                (StatusCode::OK, None, "")
            }
        };
        let mut response = Response::builder().status(status);
        if let Some((name, value)) = header {
            response = response.header(name, value);
        }
        Ok(response.body(Bytes::from_static(body.as_bytes())).unwrap())
    }
}

impl HttpTransport for MockTransport {
    fn execute(&mut self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportFailure> {
        self.recorder.requests.lock().unwrap().push(Recorded {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
            body: String::from_utf8_lossy(request.body()).into_owned(),
        });
        self.reply()
    }

    fn execute_streaming(
        &mut self,
        request: Request<()>,
        body: &mut dyn Read,
        _block_size: usize,
    ) -> Result<Response<Bytes>, TransportFailure> {
        let mut content = String::new();
        body.read_to_string(&mut content)
            .map_err(|err| TransportFailure::Fatal(err.into()))?;
        self.recorder.requests.lock().unwrap().push(Recorded {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
            body: content,
        });
        self.reply()
    }

    fn reconnect(&mut self) -> Result<(), TransportFailure> {
        *self.recorder.reconnects.lock().unwrap() += 1;
        Ok(())
    }
}

pub fn connect_with(
    auth: Auth,
    config: ConnectionConfig,
    script: Vec<Reply>,
) -> (Arc<Connection>, Recorder) {
    init();
    let (transport, recorder) = MockTransport::new(script);
    let connection = ConnectionBuilder::new()
        .with_uri(BASE.parse().unwrap())
        .with_auth(auth)
        .with_config(config)
        .with_transport(Box::new(transport))
        .build()
        .unwrap();
    (connection, recorder)
}

pub fn connect(script: Vec<Reply>) -> (Arc<Connection>, Recorder) {
    connect_with(Auth::None, ConnectionConfig::default(), script)
}
