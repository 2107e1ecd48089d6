// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! Runs the client against a live WebDAV server.
//!
//! Usage: `live_tests <config.toml>`. See [`Config`] for the file format.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, ensure, Context};
use http::Uri;
use libwebdav::acp::Privilege;
use libwebdav::condition::Condition;
use libwebdav::dav::{DavError, FailureKind};
use libwebdav::names::DISPLAY_NAME;
use libwebdav::{CollectionStorer, Connection, ConnectionBuilder, PropertyName};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde::Deserialize;
use strum::IntoEnumIterator;

const TEST_NAMESPACE: &str = "urn:example:libwebdav-live-tests";

/// Contents of the configuration file.
///
/// ```toml
/// server = "https://dav.example.com"
/// username = "alice"
/// password_env = "WEBDAV_PASSWORD"
/// base_path = "/remote.php/dav/files/alice/"
/// skip = ["search", "versioning"]
/// ```
#[derive(Deserialize, Debug)]
struct Config {
    server: String,
    username: String,
    /// Name of the environment variable holding the password.
    #[serde(default = "default_password_env")]
    password_env: String,
    /// A collection in which the tests may create and delete resources.
    base_path: String,
    #[serde(default)]
    skip: Vec<TestCase>,
}

fn default_password_env() -> String {
    String::from("WEBDAV_PASSWORD")
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::EnumIter, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
enum TestCase {
    CreateAndDeleteCollection,
    UploadAndDownload,
    DeadProperties,
    Locking,
    CopyAndMove,
    FetchMissing,
    Search,
    Acl,
    Versioning,
}

struct TestContext {
    connection: Arc<Connection>,
    base: CollectionStorer,
}

impl TestContext {
    /// Creates a fresh collection for a single test.
    fn scratch(&self) -> anyhow::Result<CollectionStorer> {
        self.base
            .add_collection(&random_string(16), None)
            .context("could not create scratch collection")
    }
}

fn main() -> anyhow::Result<()> {
    simple_logger::init_with_level(log::Level::Error).expect("logger configuration is valid");

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: live_tests <config.toml>")?;
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("could not read {}", path.display()))?;
    let config: Config = toml::from_str(&raw).context("invalid configuration file")?;

    let context = create_test_context(&config).context("could not initialise test client")?;
    println!("🌐 Running tests for: {}{}", config.server, config.base_path);

    let mut results = Vec::new();
    for case in TestCase::iter() {
        if config.skip.contains(&case) {
            println!("⏭️ Skipping: {case}");
            continue;
        }
        let result = match case {
            TestCase::CreateAndDeleteCollection => test_create_and_delete_collection(&context),
            TestCase::UploadAndDownload => test_upload_and_download(&context),
            TestCase::DeadProperties => test_dead_properties(&context),
            TestCase::Locking => test_locking(&context),
            TestCase::CopyAndMove => test_copy_and_move(&context),
            TestCase::FetchMissing => test_fetch_missing(&context),
            TestCase::Search => test_search(&context),
            TestCase::Acl => test_acl(&context),
            TestCase::Versioning => test_versioning(&context),
        };
        results.push(result.with_context(|| case.to_string()));
    }

    let mut failed = 0;
    for result in &results {
        if let Err(err) = result {
            println!("🔥 Test failed: {err:?}");
            failed += 1;
            println!("-----");
        }
    }
    let total = results.len();
    let passed = total - failed;

    println!("✅ Tests passed: {passed}/{total}");
    if failed > 0 {
        std::process::exit(1);
    }

    context.connection.close();
    Ok(())
}

fn create_test_context(config: &Config) -> anyhow::Result<TestContext> {
    let password = std::env::var(&config.password_env)
        .with_context(|| format!("Could not read {}", config.password_env))?;
    let connection = ConnectionBuilder::new()
        .with_uri(config.server.parse::<Uri>()?)
        .with_username(config.username.as_str())
        .with_password(password)
        .build()?;
    let base = CollectionStorer::new(connection.clone(), config.base_path.as_str())?;
    base.validate()
        .context("base path is not a WebDAV collection")?;
    Ok(TestContext { connection, base })
}

fn random_string(len: usize) -> String {
    thread_rng()
        .sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn test_create_and_delete_collection(context: &TestContext) -> anyhow::Result<()> {
    let before = context.base.list_resources()?.len();

    let collection = context.scratch()?;
    // ASSERTION: the new collection is listed as a collection.
    let members = context.base.list_resources()?;
    ensure!(members.len() == before + 1, "collection was not listed");
    let (_, properties) = members
        .iter()
        .find(|(path, _)| path == collection.path())
        .context("created collection was not returned when listing")?;
    ensure!(properties.is_collection(), "new member is not a collection");

    collection.delete(None)?;
    ensure!(context.base.list_resources()?.len() == before);
    Ok(())
}

fn test_upload_and_download(context: &TestContext) -> anyhow::Result<()> {
    let collection = context.scratch()?;
    let content = format!("hello, {}\n", random_string(32));

    let resource = collection.add_resource("hello.txt", Some(content.clone().into()), None, None)?;
    resource.upload_content(content.clone(), Some("text/plain"), None)?;

    // ASSERTION: content round trips.
    ensure!(resource.download_content()? == content.as_bytes());
    let live = resource.read_standard_properties()?;
    ensure!(live.content_length() == Some(content.len() as u64));
    ensure!(!live.is_collection());

    resource.delete_content(None)?;
    ensure!(resource.download_content()?.is_empty());

    collection.delete(None)?;
    Ok(())
}

fn test_dead_properties(context: &TestContext) -> anyhow::Result<()> {
    let collection = context.scratch()?;
    let resource = collection.add_resource("props.txt", None, None, None)?;
    let author = PropertyName::new(TEST_NAMESPACE, "author");

    let mut properties = BTreeMap::new();
    properties.insert(author.clone(), "Alice".into());
    resource.write_properties(&properties, None)?;

    // ASSERTION: the property is returned with its value.
    let value = resource.read_property(&author)?;
    ensure!(value.text() == Some("Alice"), "unexpected value {value:?}");
    ensure!(resource.read_all_property_names()?.contains(&author));

    resource.delete_properties(&[author.clone()], None)?;
    // ASSERTION: reading a removed property fails.
    match resource.read_property(&author) {
        Err(DavError::Multistatus(_)) => {}
        other => bail!("removed property is still readable: {other:?}"),
    }

    collection.delete(None)?;
    Ok(())
}

fn test_locking(context: &TestContext) -> anyhow::Result<()> {
    let collection = context.scratch()?;
    let resource = collection.add_resource("locked.txt", None, None, None)?;

    let lock = resource.lock("live_tests")?;
    let locks = resource.read_standard_properties()?.active_locks();
    ensure!(
        locks.iter().any(|l| l.token.as_deref() == Some(lock.token())),
        "lock is not reported in lockdiscovery"
    );

    // ASSERTION: writing without the token fails.
    let err = resource
        .upload_content("intruder", None, None)
        .expect_err("write without lock token succeeded");
    ensure!(err.failure_kind() == Some(FailureKind::Locked), "{err:?}");

    resource.upload_content("owner", None, Some(&lock))?;
    resource.unlock(&lock)?;
    resource.upload_content("anyone", None, None)?;

    collection.delete(None)?;
    Ok(())
}

fn test_copy_and_move(context: &TestContext) -> anyhow::Result<()> {
    let collection = context.scratch()?;
    let original = collection.add_resource("original.txt", Some("data".into()), None, None)?;

    let copy = format!("{}copy.txt", collection.path());
    original.copy(&copy, true)?;
    let moved = format!("{}moved.txt", collection.path());
    original.move_to(&moved, None)?;

    let members = collection
        .list_resources()?
        .into_iter()
        .map(|(path, _)| path)
        .collect::<Vec<_>>();
    ensure!(members.contains(&copy), "copy is missing: {members:?}");
    ensure!(members.contains(&moved), "moved file is missing: {members:?}");
    ensure!(!members.contains(&original.path().to_string()));

    collection.delete(None)?;
    Ok(())
}

fn test_fetch_missing(context: &TestContext) -> anyhow::Result<()> {
    let missing = context.base.resource_storer(&random_string(12))?;
    match missing.download_content() {
        Err(err) if err.failure_kind() == Some(FailureKind::NotFound) => Ok(()),
        other => bail!("expected 404, got {other:?}"),
    }
}

fn test_search(context: &TestContext) -> anyhow::Result<()> {
    if !context.base.dasl_basicsearch_available()? {
        bail!("server does not advertise DASL basicsearch");
    }
    let collection = context.scratch()?;
    let marker = random_string(10);
    let resource = collection.add_resource("findme.txt", None, None, None)?;
    let mut properties = BTreeMap::new();
    properties.insert(DISPLAY_NAME.into(), format!("report {marker}").into());
    resource.write_properties(&properties, None)?;
    collection.add_resource("other.txt", None, None, None)?;

    let condition = Condition::contains(DISPLAY_NAME.into(), marker, true);
    let results = collection.search(&condition, &[DISPLAY_NAME.into()])?;
    ensure!(results.len() == 1, "unexpected results: {results:?}");

    collection.delete(None)?;
    Ok(())
}

fn test_acl(context: &TestContext) -> anyhow::Result<()> {
    if !context.base.acl_support_available()? {
        bail!("server does not advertise access-control");
    }
    let acl = context.base.get_acl()?;
    log::debug!("{acl:?}");

    // ASSERTION: splitting and joining yields the same entries.
    ensure!(acl.split_grant_deny().join_grant_deny() == acl.join_grant_deny());

    let privileges = context.base.current_user_privileges()?;
    ensure!(
        privileges
            .iter()
            .any(|p| matches!(p, Privilege::Read | Privilege::All)),
        "current user cannot read the base collection"
    );
    Ok(())
}

fn test_versioning(context: &TestContext) -> anyhow::Result<()> {
    let collection = context.scratch()?;
    let resource = collection.add_resource("versioned.txt", Some("v1".into()), None, None)?;
    let versions = resource.version();

    versions.activate_version_control()?;
    versions.checkout(None)?;
    resource.upload_content("v2", None, None)?;
    versions.checkin(None)?;

    let history = versions.list_versions()?;
    ensure!(history.len() >= 2, "expected two versions, got {history:?}");

    collection.delete(None)?;
    Ok(())
}
