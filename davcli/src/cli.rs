// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use http::Uri;

#[derive(Clone, ValueEnum)]
enum Verbosity {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Args)]
pub(crate) struct ServerDetails {
    /// Base URL of the server. Any path is ignored.
    ///
    /// Examples: `http://localhost:8080`, `https://example.com`.
    #[arg(long)]
    pub(crate) base_uri: Uri,

    /// Username for authentication. The password is read from `DAVCLI_PASSWORD`.
    #[arg(long)]
    pub(crate) username: Option<String>,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// List the members of a collection
    List { path: String },
    /// Print the content of a resource, or save it to a file
    Get {
        path: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Upload a local file
    Put {
        file: PathBuf,
        path: String,
        /// Defaults to a type guessed from the file extension.
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Create a collection
    Mkcol { path: String },
    /// Delete a resource or collection
    Rm { path: String },
    /// Copy a resource or collection
    Cp {
        source: String,
        destination: String,
        /// Copy only the collection itself, not its members.
        #[arg(long)]
        shallow: bool,
    },
    /// Move or rename a resource or collection
    Mv { source: String, destination: String },
    /// Show the properties of a resource
    Props {
        path: String,
        /// Show dead properties too.
        #[arg(long)]
        all: bool,
    },
    /// Lock a resource and print the lock token
    Lock {
        path: String,
        #[arg(long, default_value = "davcli")]
        owner: String,
    },
    /// Remove a lock
    Unlock { path: String, token: String },
    /// Show the access control list of a resource
    Acl { path: String },
}

#[derive(Parser)]
#[clap(author, version = env!("DAVCLI_VERSION"), about, long_about = None)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) server: ServerDetails,

    #[command(subcommand)]
    pub(crate) command: Command,

    /// Change logging verbosity
    #[clap(short, long)]
    verbose: Option<Verbosity>,
}

impl Cli {
    /// Returns the desired log level.
    /// The default log level is WARN.
    pub(crate) fn log_level(&self) -> log::Level {
        match self.verbose {
            Some(Verbosity::Error) => log::Level::Error,
            Some(Verbosity::Warn) => log::Level::Warn,
            Some(Verbosity::Info) => log::Level::Info,
            Some(Verbosity::Debug) => log::Level::Debug,
            Some(Verbosity::Trace) => log::Level::Trace,
            None => log::Level::Warn,
        }
    }
}

#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Cli::command().debug_assert()
}
