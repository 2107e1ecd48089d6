// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! A blocking WebDAV client.
//!
//! Besides the basic WebDAV methods, this library supports locking (RFC 4918), access control
//! lists (RFC 3744), DASL `basicsearch` and the core of Delta-V (RFC 3253).
//!
//! See [`ConnectionBuilder`] to connect to a server and [`CollectionStorer`] or
//! [`ResourceStorer`] as useful entry points:
//!
//! ```no_run
//! # use libwebdav::{ConnectionBuilder, CollectionStorer};
//! # fn main() -> Result<(), libwebdav::dav::DavError> {
//! let connection = ConnectionBuilder::new()
//!     .with_uri("https://dav.example.com/".parse().unwrap())
//!     .with_username("alice")
//!     .with_password("secret")
//!     .build()?;
//! let docs = CollectionStorer::new(connection, "/docs/")?;
//! for (path, properties) in docs.list_resources()? {
//!     println!("{path}: {:?}", properties.content_length());
//! }
//! # Ok(())
//! # }
//! ```
pub mod acp;
pub mod auth;
mod builder;
pub mod condition;
pub mod connection;
pub mod dav;
pub mod namecheck;
pub mod names;
pub mod properties;
pub mod property;
pub mod requests;
pub mod resource;
pub mod response;
pub mod version;
pub mod xmlutils;

pub use builder::{ConnectionBuilder, NeedsAuth, NeedsPassword, NeedsUri, Ready};
pub use connection::{Connection, ConnectionConfig};
pub use property::{Element, PropertyName};
pub use resource::{CollectionStorer, LockToken, Member, ResourceStorer};
