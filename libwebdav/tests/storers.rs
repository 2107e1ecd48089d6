// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! Resource and collection operations against a scripted server.

mod common;

use std::collections::BTreeMap;

use common::{connect, connect_with, Reply};
use http::{Method, StatusCode};
use hyper::body::Bytes;
use libwebdav::auth::Auth;
use libwebdav::condition::{Condition, ContainsStrategy};
use libwebdav::dav::{DavError, FailureKind};
use libwebdav::names::DISPLAY_NAME;
use libwebdav::requests::ValidationError;
use libwebdav::version::VersionState;
use libwebdav::{CollectionStorer, ConnectionConfig, Member, PropertyName, ResourceStorer};
use rand::{distributions::Alphanumeric, thread_rng, Rng};

const LOCK_RESPONSE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:prop xmlns:D="DAV:">
  <D:lockdiscovery>
    <D:activelock>
      <D:locktype><D:write/></D:locktype>
      <D:lockscope><D:exclusive/></D:lockscope>
      <D:depth>0</D:depth>
      <D:timeout>Second-604800</D:timeout>
      <D:locktoken><D:href>opaquelocktoken:e71d4fae-5dec-22d6-fea5-00a0c91e6be4</D:href></D:locktoken>
    </D:activelock>
  </D:lockdiscovery>
</D:prop>"#;

const PROPPATCH_OK: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:" xmlns:Z="urn:example:props">
  <D:response>
    <D:href>/docs/a.txt</D:href>
    <D:propstat>
      <D:prop><Z:author/></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

const LISTING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/docs/</D:href>
    <D:propstat>
      <D:prop><D:resourcetype><D:collection/></D:resourcetype></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>https://dav.example.com/docs/a%20b.txt</D:href>
    <D:propstat>
      <D:prop>
        <D:resourcetype/>
        <D:getcontentlength>12</D:getcontentlength>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/docs/sub/</D:href>
    <D:propstat>
      <D:prop><D:resourcetype><D:collection/></D:resourcetype></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

const SEARCH_RESULTS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/docs/report.txt</D:href>
    <D:propstat>
      <D:prop><D:displayname>Quarterly Report</D:displayname></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/docs/notes.txt</D:href>
    <D:propstat>
      <D:prop><D:displayname>Notes</D:displayname></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

const PARTIAL_DELETE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/docs/sub/locked.txt</D:href>
    <D:status>HTTP/1.1 423 Locked</D:status>
  </D:response>
</D:multistatus>"#;

const MISSING_PROPERTY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/docs/a.txt</D:href>
    <D:propstat>
      <D:prop><D:displayname>A</D:displayname></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
    <D:propstat>
      <D:prop><D:getetag/></D:prop>
      <D:status>HTTP/1.1 404 Not Found</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

const PLAIN_RESOURCE_TYPE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/docs/</D:href>
    <D:propstat>
      <D:prop><D:resourcetype/></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

const CHECKED_IN: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/docs/a.txt</D:href>
    <D:propstat>
      <D:prop><D:checked-in><D:href>/history/1/v3</D:href></D:checked-in></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
    <D:propstat>
      <D:prop><D:checked-out/></D:prop>
      <D:status>HTTP/1.1 404 Not Found</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

fn random_string(len: usize) -> String {
    thread_rng()
        .sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[test]
fn test_invalid_names_never_reach_the_server() {
    let (connection, recorder) = connect(vec![]);

    assert!(matches!(
        ResourceStorer::new(connection.clone(), "/docs/bad|name"),
        Err(DavError::Validation(ValidationError::Name(_)))
    ));
    assert!(ResourceStorer::new(connection.clone(), "docs/relative").is_err());

    let docs = CollectionStorer::new(connection.clone(), "/docs").unwrap();
    assert_eq!(docs.path(), "/docs/");
    assert!(docs.resource_storer("a:b").is_err());
    assert!(docs.add_collection("..", None).is_err());

    let resource = docs.resource_storer("a.txt").unwrap();
    let err = resource
        .read_properties(&[PropertyName::new("urn:example", "1st")])
        .unwrap_err();
    assert!(matches!(err, DavError::Validation(ValidationError::Name(_))));
    assert!(matches!(
        resource.read_properties(&[]),
        Err(DavError::Validation(ValidationError::NoProperties))
    ));

    assert_eq!(recorder.count(), 0);
}

#[test]
fn test_unvalidated_names() {
    let (connection, _) = connect(vec![]);
    let docs = CollectionStorer::with_validation(connection, "/docs/", false).unwrap();
    assert!(docs.resource_storer("a:b").is_ok());
}

#[test]
fn test_lock_and_write_properties() {
    let (connection, recorder) = connect(vec![
        Reply::Body(StatusCode::OK, LOCK_RESPONSE),
        Reply::Body(StatusCode::MULTI_STATUS, PROPPATCH_OK),
        Reply::Status(StatusCode::NO_CONTENT),
    ]);
    let resource = ResourceStorer::new(connection, "/docs/a.txt").unwrap();

    let lock = resource.lock("alice").unwrap();
    assert_eq!(
        lock.token(),
        "opaquelocktoken:e71d4fae-5dec-22d6-fea5-00a0c91e6be4"
    );
    assert_eq!(lock.url(), "https://dav.example.com/docs/a.txt");
    let request = recorder.last();
    assert_eq!(request.method.as_str(), "LOCK");
    assert_eq!(request.header("depth"), None);
    assert!(request.body.contains("<D:exclusive/>"));
    assert!(request.body.contains("alice"));

    let mut properties = BTreeMap::new();
    properties.insert(
        PropertyName::new("urn:example:props", "author"),
        "Alice".into(),
    );
    resource.write_properties(&properties, Some(&lock)).unwrap();
    let request = recorder.last();
    assert_eq!(request.method.as_str(), "PROPPATCH");
    assert_eq!(
        request.header("if"),
        Some("<https://dav.example.com/docs/a.txt> (<opaquelocktoken:e71d4fae-5dec-22d6-fea5-00a0c91e6be4>)")
    );
    assert!(request.body.contains("Alice"));
    assert!(request.body.contains("urn:example:props"));

    resource.unlock(&lock).unwrap();
    assert_eq!(
        recorder.last().header("lock-token"),
        Some("<opaquelocktoken:e71d4fae-5dec-22d6-fea5-00a0c91e6be4>")
    );
}

#[test]
fn test_lock_all_is_deep() {
    let (connection, recorder) = connect(vec![Reply::Body(StatusCode::OK, LOCK_RESPONSE)]);
    let docs = CollectionStorer::new(connection, "/docs/").unwrap();

    docs.lock_all("alice").unwrap();

    assert_eq!(recorder.last().header("depth"), Some("infinity"));
}

#[test]
fn test_lock_token_from_header() {
    let (connection, _) = connect(vec![Reply::WithHeader(
        StatusCode::OK,
        "lock-token",
        "<opaquelocktoken:from-header>",
    )]);
    let resource = ResourceStorer::new(connection, "/docs/a.txt").unwrap();

    assert_eq!(
        resource.lock("alice").unwrap().token(),
        "opaquelocktoken:from-header"
    );
}

#[test]
fn test_list_resources_skips_collection_itself() {
    let (connection, recorder) = connect(vec![Reply::Body(StatusCode::MULTI_STATUS, LISTING)]);
    let docs = CollectionStorer::new(connection, "/docs/").unwrap();

    let members = docs.list_resources().unwrap();

    assert_eq!(recorder.last().header("depth"), Some("1"));
    let paths = members.iter().map(|(path, _)| path.as_str()).collect::<Vec<_>>();
    assert_eq!(paths, vec!["/docs/a b.txt", "/docs/sub/"]);
    assert_eq!(members[0].1.content_length(), Some(12));
    assert!(!members[0].1.is_collection());
    assert!(members[1].1.is_collection());
}

#[test]
fn test_collection_contents() {
    let (connection, _) = connect(vec![
        Reply::WithHeader(StatusCode::OK, "dav", "1, 2"),
        Reply::Body(StatusCode::MULTI_STATUS, LISTING),
        Reply::Body(StatusCode::MULTI_STATUS, LISTING),
    ]);
    let docs = CollectionStorer::new(connection, "/docs/").unwrap();

    let contents = docs.collection_contents().unwrap();

    assert_eq!(contents.len(), 2);
    assert!(matches!(&contents[0].0, Member::Resource(r) if r.path() == "/docs/a b.txt"));
    assert!(matches!(&contents[1].0, Member::Collection(c) if c.path() == "/docs/sub/"));
}

#[test]
fn test_validate_rejects_plain_resource() {
    let (connection, _) = connect(vec![
        Reply::WithHeader(StatusCode::OK, "dav", "1, 2"),
        Reply::Body(StatusCode::MULTI_STATUS, PLAIN_RESOURCE_TYPE),
    ]);
    let docs = CollectionStorer::new(connection, "/docs/").unwrap();

    assert!(matches!(docs.validate(), Err(DavError::NotACollection(_))));
}

#[test]
fn test_validate_requires_class_two() {
    let (connection, _) = connect(vec![Reply::WithHeader(StatusCode::OK, "dav", "1")]);
    let resource = ResourceStorer::new(connection, "/docs/a.txt").unwrap();

    assert!(matches!(resource.validate(), Err(DavError::Unsupported(_))));
}

#[test]
fn test_capability_discovery() {
    let (connection, _) = connect(vec![
        Reply::WithHeader(StatusCode::OK, "dav", "1, 2, access-control"),
        Reply::WithHeader(StatusCode::OK, "dasl", "<DAV:basicsearch>"),
    ]);
    let resource = ResourceStorer::new(connection, "/docs/").unwrap();

    assert!(resource.acl_support_available().unwrap());
    assert!(resource.dasl_basicsearch_available().unwrap());
}

#[test]
fn test_read_properties_reports_missing() {
    let (connection, _) = connect(vec![
        Reply::Body(StatusCode::MULTI_STATUS, MISSING_PROPERTY),
        Reply::Body(StatusCode::MULTI_STATUS, MISSING_PROPERTY),
    ]);
    let resource = ResourceStorer::new(connection, "/docs/a.txt").unwrap();
    let names = [DISPLAY_NAME.into(), PropertyName::dav("getetag")];

    let err = resource.read_properties(&names).unwrap_err();
    assert!(matches!(err, DavError::Multistatus(_)));

    let live = resource.read_standard_properties().unwrap();
    assert_eq!(live.display_name(), Some("A"));
    assert_eq!(live.etag(), None);
}

#[test]
fn test_partial_delete_fails() {
    let (connection, _) = connect(vec![Reply::Body(StatusCode::MULTI_STATUS, PARTIAL_DELETE)]);
    let docs = CollectionStorer::new(connection, "/docs/").unwrap();

    let err = docs.delete_resource("sub", None).unwrap_err();

    let DavError::Multistatus(failure) = err else {
        panic!("expected a multistatus error, got {err:?}");
    };
    assert_eq!(failure.response.error_count(), 1);
    assert_eq!(failure.code, StatusCode::LOCKED);
}

#[test]
fn test_copy_and_move_destination() {
    let (connection, recorder) = connect(vec![
        Reply::Status(StatusCode::CREATED),
        Reply::Status(StatusCode::CREATED),
        Reply::Status(StatusCode::NO_CONTENT),
    ]);
    let resource = ResourceStorer::new(connection, "/docs/a.txt").unwrap();

    resource.copy("/backup/a copy.txt", true).unwrap();
    let request = recorder.last();
    assert_eq!(request.method.as_str(), "COPY");
    assert_eq!(
        request.header("destination"),
        Some("https://dav.example.com/backup/a%20copy.txt")
    );
    assert_eq!(request.header("depth"), None);

    resource.copy("/backup/b.txt", false).unwrap();
    assert_eq!(recorder.last().header("depth"), Some("0"));

    resource
        .move_to("https://dav.example.com/archive/a.txt", None)
        .unwrap();
    let request = recorder.last();
    assert_eq!(request.method.as_str(), "MOVE");
    assert_eq!(
        request.header("destination"),
        Some("https://dav.example.com/archive/a.txt")
    );

    assert!(resource.copy("relative/path", true).is_err());
    assert_eq!(recorder.count(), 3);
}

#[test]
fn test_search_with_post_filter() {
    let config = ConnectionConfig {
        contains_strategy: ContainsStrategy::IsDefinedPostFilter,
        ..ConnectionConfig::default()
    };
    let (connection, recorder) = connect_with(
        Auth::None,
        config,
        vec![Reply::Body(StatusCode::MULTI_STATUS, SEARCH_RESULTS)],
    );
    let docs = CollectionStorer::new(connection, "/docs/").unwrap();
    let condition = Condition::contains(PropertyName::dav("displayname"), "REPORT", true);

    let results = docs.search(&condition, &[]).unwrap();

    let request = recorder.last();
    assert_eq!(request.method.as_str(), "SEARCH");
    assert!(request.body.contains("is-defined"));
    assert!(!request.body.contains("<D:like"));
    assert!(request.body.contains("<D:displayname/>"));
    assert_eq!(results.len(), 1);
    assert!(results.get("/docs/report.txt").is_some());
}

#[test]
fn test_search_rejects_contains_under_or() {
    let config = ConnectionConfig {
        contains_strategy: ContainsStrategy::IsDefinedPostFilter,
        ..ConnectionConfig::default()
    };
    let (connection, recorder) = connect_with(Auth::None, config, vec![]);
    let docs = CollectionStorer::new(connection, "/docs/").unwrap();
    let condition = Condition::or([
        Condition::contains(PropertyName::dav("displayname"), "report", false),
        Condition::IsCollection,
    ]);

    let err = docs.search(&condition, &[]).unwrap_err();

    assert!(matches!(err, DavError::Validation(ValidationError::Condition(_))));
    assert_eq!(recorder.count(), 0);
}

#[test]
fn test_native_search() {
    let (connection, recorder) =
        connect(vec![Reply::Body(StatusCode::MULTI_STATUS, SEARCH_RESULTS)]);
    let docs = CollectionStorer::new(connection, "/docs/").unwrap();
    let condition = Condition::contains(PropertyName::dav("displayname"), "report", false);

    let results = docs.search(&condition, &[DISPLAY_NAME.into()]).unwrap();

    let request = recorder.last();
    assert_eq!(request.header("depth"), Some("infinity"));
    assert!(request.body.contains("<D:like"));
    assert!(request.body.contains("%report%"));
    assert_eq!(results.len(), 2);
}

#[test]
fn test_upload_and_download_files() {
    let (connection, recorder) = connect(vec![
        Reply::Status(StatusCode::CREATED),
        Reply::Body(StatusCode::OK, "downloaded content"),
    ]);
    let resource = ResourceStorer::new(connection, "/docs/a.txt").unwrap();
    let dir = std::env::temp_dir().join(format!("libwebdav-{}", random_string(12)));
    std::fs::create_dir(&dir).unwrap();

    let source = dir.join("source.txt");
    std::fs::write(&source, "uploaded content").unwrap();
    resource
        .upload_file(&source, Some("text/plain"), None)
        .unwrap();
    let request = recorder.last();
    assert_eq!(request.method, Method::PUT);
    assert_eq!(request.body, "uploaded content");
    assert_eq!(request.header("content-length"), Some("16"));
    assert_eq!(request.header("content-type"), Some("text/plain"));

    let target = dir.join("target.txt");
    assert_eq!(resource.download_file(&target).unwrap(), 18);
    assert_eq!(std::fs::read(&target).unwrap(), b"downloaded content");

    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_failed_download_leaves_no_file() {
    let (connection, recorder) = connect(vec![Reply::Status(StatusCode::NOT_FOUND)]);
    let resource = ResourceStorer::new(connection, "/docs/missing.txt").unwrap();
    let target = std::env::temp_dir().join(format!("libwebdav-{}", random_string(12)));

    let err = resource.download_file(&target).unwrap_err();

    assert_eq!(err.failure_kind(), Some(FailureKind::NotFound));
    assert!(!target.exists());
    assert_eq!(recorder.last().method, Method::GET);
    assert_eq!(recorder.count(), 1);
}

#[test]
fn test_add_resource_with_content() {
    let (connection, recorder) = connect(vec![
        Reply::Status(StatusCode::CREATED),
        Reply::Status(StatusCode::LOCKED),
    ]);
    let docs = CollectionStorer::new(connection, "/docs/").unwrap();

    let resource = docs
        .add_resource("new.txt", Some(Bytes::from_static(b"hi")), None, None)
        .unwrap();
    assert_eq!(resource.path(), "/docs/new.txt");
    assert_eq!(recorder.last().body, "hi");

    let err = resource.delete_content(None).unwrap_err();
    assert_eq!(err.failure_kind(), Some(FailureKind::Locked));
}

#[test]
fn test_version_state() {
    let (connection, recorder) = connect(vec![
        Reply::Body(StatusCode::MULTI_STATUS, CHECKED_IN),
        Reply::WithHeader(StatusCode::CREATED, "location", "/history/1/v4"),
    ]);
    let resource = ResourceStorer::new(connection, "/docs/a.txt").unwrap();

    assert_eq!(
        resource.version().version_state().unwrap(),
        VersionState::CheckedIn(String::from("/history/1/v3"))
    );
    assert_eq!(
        resource.version().checkin(None).unwrap().as_deref(),
        Some("/history/1/v4")
    );
    assert_eq!(recorder.last().method.as_str(), "CHECKIN");
}

#[test]
fn version_history_is_missing_on_unversioned_resource() {
    let (connection, recorder) = connect(vec![Reply::Body(
        StatusCode::MULTI_STATUS,
        r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/docs/a.txt</D:href>
    <D:propstat>
      <D:prop><D:version-history/></D:prop>
      <D:status>HTTP/1.1 404 Not Found</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#,
    )]);
    let resource = ResourceStorer::new(connection, "/docs/a.txt").unwrap();

    assert_eq!(resource.version().version_history().unwrap(), None);
    assert_eq!(recorder.last().header("depth"), Some("0"));
}
