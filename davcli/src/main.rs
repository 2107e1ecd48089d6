// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use libwebdav::auth::Auth;
use libwebdav::dav::DavError;
use libwebdav::{CollectionStorer, Connection, ConnectionBuilder, LockToken, ResourceStorer};
use log::info;

use crate::cli::{Cli, Command};

mod cli;

/// Splits `/a/b/c/` into `/a/b/` and `c`.
fn split_parent(path: &str) -> anyhow::Result<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    let (parent, name) = trimmed
        .rsplit_once('/')
        .with_context(|| format!("not an absolute path: {path}"))?;
    Ok((&path[..=parent.len()], name))
}

fn list(connection: &Arc<Connection>, path: &str) -> anyhow::Result<()> {
    let collection = CollectionStorer::new(connection.clone(), path)?;
    let members = collection.list_resources()?;
    if members.is_empty() {
        println!("No items in collection");
    }
    for (href, properties) in members {
        let length = properties
            .content_length()
            .map_or_else(String::new, |l| l.to_string());
        println!("{:<10} {length:>10}  {href}", properties.resource_type());
    }
    Ok(())
}

fn get(
    connection: &Arc<Connection>,
    path: &str,
    output: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let resource = ResourceStorer::new(connection.clone(), path)?;
    match output {
        Some(file) => {
            let written = resource.download_file(file)?;
            println!("Saved {written} bytes to {}", file.display());
        }
        None => {
            let content = resource.download_content()?;
            std::io::stdout()
                .write_all(&content)
                .context("failed to write to stdout")?;
        }
    }
    Ok(())
}

fn put(
    connection: &Arc<Connection>,
    file: &std::path::Path,
    path: &str,
    content_type: Option<&str>,
) -> anyhow::Result<()> {
    let guessed = mime_guess::from_path(file).first_or_octet_stream();
    let content_type = content_type.unwrap_or_else(|| guessed.essence_str());
    let resource = ResourceStorer::new(connection.clone(), path)?;
    resource
        .upload_file(file, Some(content_type), None)
        .with_context(|| format!("failed to upload {}", file.display()))?;
    Ok(())
}

fn mkcol(connection: &Arc<Connection>, path: &str) -> anyhow::Result<()> {
    let (parent, name) = split_parent(path)?;
    let parent = CollectionStorer::new(connection.clone(), parent)?;
    let created = parent.add_collection(name, None)?;
    println!("Created {}", created.path());
    Ok(())
}

fn props(connection: &Arc<Connection>, path: &str, all: bool) -> anyhow::Result<()> {
    let resource = ResourceStorer::new(connection.clone(), path)?;
    if all {
        for (name, value) in resource.read_all_properties()?.properties() {
            println!("{name}: {}", value.to_xml());
        }
        return Ok(());
    }

    let live = resource.read_standard_properties()?;
    println!("Type: {}", live.resource_type());
    if let Some(name) = live.display_name() {
        println!("Display name: {name}");
    }
    if let Some(length) = live.content_length() {
        println!("Content length: {length}");
    }
    if let Some(content_type) = live.content_type() {
        println!("Content type: {content_type}");
    }
    if let Some(etag) = live.etag() {
        println!("Etag: {etag}");
    }
    if let Some(created) = live.creation_date() {
        println!("Created: {created}");
    }
    if let Some(modified) = live.last_modified() {
        println!("Last modified: {modified}");
    }
    if let Some(owner) = live.owner() {
        println!("Owner: {owner}");
    }
    for lock in live.active_locks() {
        println!(
            "Locked ({}) by {}: {}",
            lock.scope.as_str(),
            lock.owner.as_deref().unwrap_or("unknown"),
            lock.token.as_deref().unwrap_or("no token"),
        );
    }
    Ok(())
}

fn acl(connection: &Arc<Connection>, path: &str) -> anyhow::Result<()> {
    let resource = ResourceStorer::new(connection.clone(), path)?;
    let acl = resource.get_acl()?;
    if acl.is_empty() {
        println!("No access control entries");
    }
    for ace in acl.aces() {
        let principal = if ace.invert() {
            format!("all but {}", ace.principal())
        } else {
            ace.principal().to_string()
        };
        for clause in ace.grant_denies() {
            let privileges = clause
                .privileges()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            let verb = if clause.is_grant() { "grant" } else { "deny" };
            print!("{verb} {privileges} to {principal}");
            if ace.is_protected() {
                print!(" (protected)");
            }
            if let Some(from) = ace.inherited_from() {
                print!(" (inherited from {from})");
            }
            println!();
        }
    }
    Ok(())
}

fn run(connection: &Arc<Connection>, command: &Command) -> anyhow::Result<()> {
    match command {
        Command::List { path } => list(connection, path)?,
        Command::Get { path, output } => get(connection, path, output.as_deref())?,
        Command::Put {
            file,
            path,
            content_type,
        } => put(connection, file, path, content_type.as_deref())?,
        Command::Mkcol { path } => mkcol(connection, path)?,
        Command::Rm { path } => ResourceStorer::new(connection.clone(), path.as_str())?
            .delete(None)
            .with_context(|| format!("failed to delete {path}"))?,
        Command::Cp {
            source,
            destination,
            shallow,
        } => ResourceStorer::new(connection.clone(), source.as_str())?
            .copy(destination, !shallow)
            .with_context(|| format!("failed to copy {source}"))?,
        Command::Mv {
            source,
            destination,
        } => ResourceStorer::new(connection.clone(), source.as_str())?
            .move_to(destination, None)
            .with_context(|| format!("failed to move {source}"))?,
        Command::Props { path, all } => props(connection, path, *all)?,
        Command::Lock { path, owner } => {
            let lock = ResourceStorer::new(connection.clone(), path.as_str())?.lock(owner)?;
            println!("{}", lock.token());
        }
        Command::Unlock { path, token } => {
            let resource = ResourceStorer::new(connection.clone(), path.as_str())?;
            resource.unlock(&LockToken::new(resource.url(), token.as_str()))?;
        }
        Command::Acl { path } => acl(connection, path)?,
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    simple_logger::init_with_level(cli.log_level()).context("failed to initialise logging")?;

    let builder = ConnectionBuilder::new().with_uri(cli.server.base_uri.clone());
    let credentials = match &cli.server.username {
        Some(username) => {
            let password =
                std::env::var("DAVCLI_PASSWORD").context("failed to determine password")?;
            Some((username.clone(), password))
        }
        None => None,
    };
    let connection = match &credentials {
        Some((username, password)) => builder
            .with_username(username.as_str())
            .with_password(password.as_str())
            .build()?,
        None => builder.without_auth().build()?,
    };

    let Err(err) = run(&connection, &cli.command) else {
        return Ok(());
    };
    let challenge = match err.downcast_ref::<DavError>() {
        Some(DavError::Unauthorized(unauthorized))
            if unauthorized
                .scheme()
                .map_or(false, |scheme| scheme.eq_ignore_ascii_case("digest")) =>
        {
            unauthorized.digest_challenge()?
        }
        _ => return Err(err),
    };
    let (username, password) = credentials.context("server requires credentials")?;

    info!("Server requested digest authentication, retrying.");
    connection.set_auth(Auth::Digest {
        username,
        password: password.into(),
        challenge,
    })?;
    run(&connection, &cli.command)
}
