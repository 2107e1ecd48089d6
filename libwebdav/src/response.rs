// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! Parsing of `multistatus` and `LOCK` responses.

use std::collections::BTreeMap;
use std::fmt;

use http::StatusCode;
use roxmltree::{ExpandedName, Node};

use crate::names::{
    ACTIVELOCK, HREF, LOCKDISCOVERY, LOCKTOKEN, MULTISTATUS, PROP, PROPSTAT, RESPONSE,
    RESPONSE_DESCRIPTION, STATUS,
};
use crate::property::{Element, PropertyName};
use crate::xmlutils::{parse_statusline, statusline_reason, UrlCharset};

/// A response body could not be understood.
///
/// This indicates a compatibility problem between this client and the server, rather than a
/// failed request.
#[derive(thiserror::Error, Debug)]
pub enum ResponseFormatError {
    #[error("could not decode response as utf-8")]
    NotUtf8(#[from] std::str::Utf8Error),

    #[error("could not parse XML response")]
    Xml(#[from] roxmltree::Error),

    #[error("invalid status line: '{0}'")]
    InvalidStatus(String),

    #[error("malformed '{element}' element at line {line}: {message}")]
    Structure {
        element: String,
        line: u32,
        message: String,
    },

    #[error("malformed '{element}' element: {message}")]
    Content { element: String, message: String },

    #[error("expected a multistatus response but got status {0}")]
    NotMultistatus(StatusCode),

    #[error("no response for '{0}'")]
    MissingResponse(String),
}

impl ResponseFormatError {
    pub(crate) fn content<S: Into<String>>(
        element: &PropertyName,
        message: S,
    ) -> ResponseFormatError {
        ResponseFormatError::Content {
            element: element.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn structure<S: Into<String>>(node: &Node, message: S) -> ResponseFormatError {
        ResponseFormatError::Structure {
            element: PropertyName::of_node(node).to_string(),
            line: node.document().text_pos_at(node.range().start).row,
            message: message.into(),
        }
    }
}

/// A status code with its reason phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpStatus {
    pub code: StatusCode,
    pub reason: String,
}

impl HttpStatus {
    pub fn new<S: Into<String>>(code: StatusCode, reason: S) -> HttpStatus {
        HttpStatus {
            code,
            reason: reason.into(),
        }
    }

    /// Uses the canonical reason phrase for `code`.
    #[must_use]
    pub fn from_code(code: StatusCode) -> HttpStatus {
        HttpStatus::new(code, code.canonical_reason().unwrap_or(""))
    }

    /// Parses a status line, e.g.: `HTTP/1.1 404 Not Found`.
    ///
    /// # Errors
    ///
    /// If the line does not contain a valid status code.
    pub fn parse(line: &str) -> Result<HttpStatus, ResponseFormatError> {
        let code = parse_statusline(line)
            .map_err(|_| ResponseFormatError::InvalidStatus(line.trim().to_string()))?;
        let reason = statusline_reason(line)
            .map(str::to_string)
            .or_else(|| code.canonical_reason().map(str::to_string))
            .unwrap_or_default();
        Ok(HttpStatus { code, reason })
    }

    /// Statuses `>= 300` are errors.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.code.as_u16() >= 300
    }
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code.as_u16(), self.reason)
    }
}

/// Properties returned for a single resource, together with the ones that failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyResponse {
    properties: BTreeMap<PropertyName, Element>,
    failed: Vec<(PropertyName, HttpStatus)>,
    errors: Vec<HttpStatus>,
    reasons: Vec<String>,
}

impl PropertyResponse {
    #[must_use]
    pub fn properties(&self) -> &BTreeMap<PropertyName, Element> {
        &self.properties
    }

    #[must_use]
    pub fn into_properties(self) -> BTreeMap<PropertyName, Element> {
        self.properties
    }

    pub fn get<N: Into<PropertyName>>(&self, name: N) -> Option<&Element> {
        self.properties.get(&name.into())
    }

    /// Properties that could not be returned, each with its own status.
    #[must_use]
    pub fn failed(&self) -> &[(PropertyName, HttpStatus)] {
        &self.failed
    }

    /// One status per failed `propstat`, in document order.
    #[must_use]
    pub fn errors(&self) -> &[HttpStatus] {
        &self.errors
    }

    #[must_use]
    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    /// `200` if nothing failed, `207` if only some properties failed, otherwise the code of the
    /// last failure.
    #[must_use]
    pub fn code(&self) -> StatusCode {
        match self.errors.last() {
            None => StatusCode::OK,
            Some(_) if !self.properties.is_empty() => StatusCode::MULTI_STATUS,
            Some(last) => last.code,
        }
    }

    #[must_use]
    pub fn reason(&self) -> String {
        self.reasons.join("; ")
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.code().as_u16() >= 300
    }
}

/// Result for a single href of a multistatus response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultistatusEntry {
    /// A status applying to the whole resource.
    Status(HttpStatus),
    /// Per-property results.
    Properties(PropertyResponse),
}

impl MultistatusEntry {
    #[must_use]
    pub fn code(&self) -> StatusCode {
        match self {
            MultistatusEntry::Status(status) => status.code,
            MultistatusEntry::Properties(props) => props.code(),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.code().as_u16() >= 300
    }

    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            MultistatusEntry::Status(status) => status.reason.clone(),
            MultistatusEntry::Properties(props) => props.reason(),
        }
    }

    #[must_use]
    pub fn as_properties(&self) -> Option<&PropertyResponse> {
        match self {
            MultistatusEntry::Properties(props) => Some(props),
            MultistatusEntry::Status(_) => None,
        }
    }
}

/// A parsed `207 Multi-Status` response.
///
/// Entries are kept in document order and keyed by their (percent-decoded) href.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultistatusResponse {
    entries: Vec<(String, MultistatusEntry)>,
    error_count: usize,
    description: Option<String>,
}

impl MultistatusResponse {
    #[must_use]
    pub fn get(&self, href: &str) -> Option<&MultistatusEntry> {
        self.entries
            .iter()
            .find(|(path, _)| path == href)
            .map(|(_, entry)| entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MultistatusEntry)> {
        self.entries
            .iter()
            .map(|(path, entry)| (path.as_str(), entry))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of hrefs whose final status is `>= 300`.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// The top-level `responsedescription`, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// `200` if nothing failed, `207` if some entries failed, otherwise the highest failure code.
    #[must_use]
    pub fn code(&self) -> StatusCode {
        if self.error_count == 0 {
            StatusCode::OK
        } else if self.entries.len() > self.error_count {
            StatusCode::MULTI_STATUS
        } else {
            self.entries
                .iter()
                .map(|(_, entry)| entry.code())
                .filter(|code| code.as_u16() >= 300)
                .max()
                .unwrap_or(StatusCode::MULTI_STATUS)
        }
    }

    /// Concatenates the reasons of all failed entries.
    #[must_use]
    pub fn reason(&self) -> String {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_error())
            .map(|(path, entry)| format!("{path}: {} {}", entry.code().as_u16(), entry.reason()))
            .collect::<Vec<_>>()
            .join("; ")
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<(String, MultistatusEntry)> {
        self.entries
    }

    /// Returns the entry for `href`, or the first entry if there is none.
    ///
    /// Some servers report a different form of the requested href (e.g.: with or without a
    /// trailing slash), so single-resource requests fall back to the first entry.
    #[must_use]
    pub fn entry_for(&self, href: &str) -> Option<&MultistatusEntry> {
        self.get(href)
            .or_else(|| self.entries.first().map(|(_, entry)| entry))
    }

    /// Keeps only the entries for which `keep` returns `true`.
    pub fn retain<F: FnMut(&str, &MultistatusEntry) -> bool>(&mut self, mut keep: F) {
        self.entries.retain(|(path, entry)| keep(path, entry));
        self.count_errors();
    }

    fn count_errors(&mut self) {
        self.error_count = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_error())
            .count();
    }

    fn entry_mut(&mut self, href: &str) -> Option<&mut MultistatusEntry> {
        self.entries
            .iter_mut()
            .find(|(path, _)| path == href)
            .map(|(_, entry)| entry)
    }

    fn set(&mut self, href: String, entry: MultistatusEntry) {
        match self.entry_mut(&href) {
            Some(existing) => *existing = entry,
            None => self.entries.push((href, entry)),
        }
    }
}

/// Parses the body of a `207 Multi-Status` response.
///
/// # Errors
///
/// If the body is not well-formed XML or does not follow the `multistatus` grammar.
pub fn parse_multistatus(
    body: &[u8],
    charset: UrlCharset,
) -> Result<MultistatusResponse, ResponseFormatError> {
    let body = std::str::from_utf8(body)?;
    let doc = roxmltree::Document::parse(body)?;
    let root = doc.root_element();
    if root.tag_name() != MULTISTATUS {
        return Err(ResponseFormatError::structure(
            &root,
            "root element is not DAV:multistatus",
        ));
    }

    let mut result = MultistatusResponse::default();
    for child in root.children().filter(Node::is_element) {
        if child.tag_name() == RESPONSE {
            scan_response(&child, charset, &mut result)?;
        } else if child.tag_name() == RESPONSE_DESCRIPTION {
            result.description = child.text().map(|t| t.trim().to_string());
        }
    }
    result.count_errors();

    Ok(result)
}

fn scan_response(
    response: &Node,
    charset: UrlCharset,
    result: &mut MultistatusResponse,
) -> Result<(), ResponseFormatError> {
    let mut hrefs = Vec::new();
    let mut has_result = false;
    let mut description = None;

    for child in response.children().filter(Node::is_element) {
        let tag = child.tag_name();
        if tag == HREF {
            let text = child
                .text()
                .ok_or_else(|| ResponseFormatError::structure(&child, "missing text in href"))?;
            hrefs.push(charset.unquote(text.trim())?);
        } else if tag == STATUS {
            if hrefs.is_empty() {
                return Err(ResponseFormatError::structure(
                    response,
                    "status without a preceding href",
                ));
            }
            let status = HttpStatus::parse(child.text().unwrap_or(""))?;
            for href in &hrefs {
                result.set(href.clone(), MultistatusEntry::Status(status.clone()));
            }
            has_result = true;
        } else if tag == PROPSTAT {
            let [href] = hrefs.as_slice() else {
                return Err(ResponseFormatError::structure(
                    response,
                    format!("propstat requires exactly one href, found {}", hrefs.len()),
                ));
            };
            if !matches!(result.get(href), Some(MultistatusEntry::Properties(_))) {
                result.set(
                    href.clone(),
                    MultistatusEntry::Properties(PropertyResponse::default()),
                );
            }
            if let Some(MultistatusEntry::Properties(props)) = result.entry_mut(href) {
                scan_propstat(&child, props)?;
            }
            has_result = true;
        } else if tag == RESPONSE_DESCRIPTION {
            description = child.text().map(|t| t.trim().to_string());
        }
    }

    if hrefs.is_empty() {
        return Err(ResponseFormatError::structure(response, "missing href"));
    }
    if !has_result {
        return Err(ResponseFormatError::structure(
            response,
            "response has neither status nor propstat",
        ));
    }
    if let Some(description) = description {
        for href in &hrefs {
            if let Some(MultistatusEntry::Properties(props)) = result.entry_mut(href) {
                props.reasons.push(description.clone());
            }
        }
    }

    Ok(())
}

fn scan_propstat(propstat: &Node, into: &mut PropertyResponse) -> Result<(), ResponseFormatError> {
    let prop = required_child(*propstat, PROP, "missing prop")?;
    let status_line = required_child(*propstat, STATUS, "missing status")?
        .text()
        .unwrap_or("");
    let status = HttpStatus::parse(status_line)?;

    for property in prop.children().filter(Node::is_element) {
        let name = PropertyName::of_node(&property);
        if status.is_error() {
            into.failed.push((name, status.clone()));
        } else {
            into.properties.insert(name, Element::from_node(&property));
        }
    }

    if status.is_error() {
        let reason = propstat
            .children()
            .find(|n| n.tag_name() == RESPONSE_DESCRIPTION)
            .and_then(|n| n.text())
            .map_or_else(|| status.to_string(), |t| t.trim().to_string());
        into.reasons.push(reason);
        into.errors.push(status);
    }

    Ok(())
}

/// Extracts the lock token from the body of a successful `LOCK` response.
///
/// The body is expected to be a `DAV:prop` with `lockdiscovery/activelock/locktoken/href`.
///
/// # Errors
///
/// If the body cannot be parsed or contains no lock token.
pub fn parse_lock_response(body: &[u8]) -> Result<String, ResponseFormatError> {
    let body = std::str::from_utf8(body)?;
    let doc = roxmltree::Document::parse(body)?;
    let root = doc.root_element();
    if root.tag_name() != PROP {
        return Err(ResponseFormatError::structure(
            &root,
            "root element is not DAV:prop",
        ));
    }

    let discovery = required_child(root, LOCKDISCOVERY, "missing lockdiscovery")?;
    let active = required_child(discovery, ACTIVELOCK, "missing activelock")?;
    let token = required_child(active, LOCKTOKEN, "missing locktoken")?;
    // Tokens are URIs, but they are opaque to us and never percent-decoded.
    let href = required_child(token, HREF, "missing href in locktoken")?;

    href.text()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ResponseFormatError::structure(&href, "empty lock token"))
}

fn required_child<'a, 'input>(
    node: Node<'a, 'input>,
    name: ExpandedName<'_, '_>,
    message: &str,
) -> Result<Node<'a, 'input>, ResponseFormatError> {
    node.children()
        .find(|n| n.tag_name() == name)
        .ok_or_else(|| ResponseFormatError::structure(&node, message))
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use crate::names::{DISPLAY_NAME, GETETAG};
    use crate::property::PropertyName;
    use crate::xmlutils::UrlCharset;

    use super::{
        parse_lock_response, parse_multistatus, HttpStatus, MultistatusEntry,
        ResponseFormatError,
    };

    #[test]
    fn test_mixed_multistatus() {
        let raw = br#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/dav/missing.txt</D:href>
    <D:status>HTTP/1.1 404 Not Found</D:status>
  </D:response>
  <D:response>
    <D:href>/dav/file.txt</D:href>
    <D:propstat>
      <D:prop><D:getetag>"abc"</D:getetag></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
    <D:propstat>
      <D:prop><D:displayname/></D:prop>
      <D:status>HTTP/1.1 403 Forbidden</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

        let parsed = parse_multistatus(raw, UrlCharset::Utf8).unwrap();
        assert_eq!(parsed.error_count(), 1);
        assert_eq!(parsed.len(), 2);
        assert_eq!(
            parsed.get("/dav/missing.txt"),
            Some(&MultistatusEntry::Status(HttpStatus::new(
                StatusCode::NOT_FOUND,
                "Not Found"
            )))
        );

        let props = parsed
            .get("/dav/file.txt")
            .and_then(MultistatusEntry::as_properties)
            .unwrap();
        assert_eq!(props.properties().len(), 1);
        assert_eq!(props.get(GETETAG).and_then(|e| e.text()), Some("\"abc\""));
        assert_eq!(props.failed().len(), 1);
        assert_eq!(props.failed()[0].0, PropertyName::from(DISPLAY_NAME));
        assert_eq!(props.failed()[0].1.code, StatusCode::FORBIDDEN);
        assert_eq!(props.code(), StatusCode::MULTI_STATUS);

        assert_eq!(parsed.code(), StatusCode::MULTI_STATUS);
        assert_eq!(parsed.reason(), "/dav/missing.txt: 404 Not Found");
    }

    #[test]
    fn test_status_for_several_hrefs() {
        let raw = br#"<multistatus xmlns="DAV:">
  <response>
    <href>/a</href>
    <href>/b%20c</href>
    <status>HTTP/1.1 423 Locked</status>
  </response>
  <responsedescription>Copy failed</responsedescription>
</multistatus>"#;

        let parsed = parse_multistatus(raw, UrlCharset::Utf8).unwrap();
        assert_eq!(parsed.error_count(), 2);
        assert_eq!(parsed.get("/b c").unwrap().code(), StatusCode::LOCKED);
        assert_eq!(parsed.code(), StatusCode::LOCKED);
        assert_eq!(parsed.description(), Some("Copy failed"));
    }

    #[test]
    fn test_worst_code_when_everything_failed() {
        let raw = br#"<multistatus xmlns="DAV:">
  <response><href>/a</href><status>HTTP/1.1 403 Forbidden</status></response>
  <response><href>/b</href><status>HTTP/1.1 423 Locked</status></response>
  <response><href>/c</href><status>HTTP/1.1 409 Conflict</status></response>
</multistatus>"#;

        let parsed = parse_multistatus(raw, UrlCharset::Utf8).unwrap();
        assert_eq!(parsed.error_count(), 3);
        assert_eq!(parsed.code(), StatusCode::LOCKED);
    }

    #[test]
    fn test_only_failed_properties() {
        let raw = br#"<multistatus xmlns="DAV:">
  <response>
    <href>/a</href>
    <propstat>
      <prop><displayname/></prop>
      <status>HTTP/1.1 409 Conflict</status>
      <responsedescription>cannot set</responsedescription>
    </propstat>
  </response>
</multistatus>"#;

        let parsed = parse_multistatus(raw, UrlCharset::Utf8).unwrap();
        let entry = parsed.get("/a").unwrap();
        assert_eq!(entry.code(), StatusCode::CONFLICT);
        assert_eq!(entry.reason(), "cannot set");
        assert_eq!(parsed.error_count(), 1);
    }

    #[test]
    fn test_malformed_multistatus() {
        let wrong_root = br#"<prop xmlns="DAV:"/>"#;
        assert!(matches!(
            parse_multistatus(wrong_root, UrlCharset::Utf8),
            Err(ResponseFormatError::Structure { .. })
        ));

        let no_href = br#"<multistatus xmlns="DAV:">
  <response><status>HTTP/1.1 200 OK</status></response>
</multistatus>"#;
        match parse_multistatus(no_href, UrlCharset::Utf8) {
            Err(ResponseFormatError::Structure { element, line, .. }) => {
                assert_eq!(element, "{DAV:}response");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let two_hrefs_propstat = br#"<multistatus xmlns="DAV:">
  <response>
    <href>/a</href><href>/b</href>
    <propstat><prop><getetag/></prop><status>HTTP/1.1 200 OK</status></propstat>
  </response>
</multistatus>"#;
        assert!(parse_multistatus(two_hrefs_propstat, UrlCharset::Utf8).is_err());

        let bad_status = br#"<multistatus xmlns="DAV:">
  <response><href>/a</href><status>garbage</status></response>
</multistatus>"#;
        assert!(matches!(
            parse_multistatus(bad_status, UrlCharset::Utf8),
            Err(ResponseFormatError::InvalidStatus(_))
        ));

        assert!(matches!(
            parse_multistatus(b"<multistatus", UrlCharset::Utf8),
            Err(ResponseFormatError::Xml(_))
        ));
    }

    #[test]
    fn test_latin1_hrefs() {
        let raw = br#"<multistatus xmlns="DAV:">
  <response><href>/dav/f%FCr</href><status>HTTP/1.1 200 OK</status></response>
</multistatus>"#;
        assert!(parse_multistatus(raw, UrlCharset::Utf8).is_err());
        let parsed = parse_multistatus(raw, UrlCharset::Latin1).unwrap();
        assert!(parsed.get("/dav/für").is_some());
    }

    #[test]
    fn test_parse_lock_response() {
        let raw = br#"<?xml version="1.0" encoding="utf-8" ?>
<D:prop xmlns:D="DAV:">
  <D:lockdiscovery>
    <D:activelock>
      <D:locktype><D:write/></D:locktype>
      <D:lockscope><D:exclusive/></D:lockscope>
      <D:depth>infinity</D:depth>
      <D:owner>alice</D:owner>
      <D:timeout>Second-604800</D:timeout>
      <D:locktoken>
        <D:href>opaquelocktoken:e71d4fae-5dec-22d6-fea5-00a0c91e6be4</D:href>
      </D:locktoken>
    </D:activelock>
  </D:lockdiscovery>
</D:prop>"#;
        assert_eq!(
            parse_lock_response(raw).unwrap(),
            "opaquelocktoken:e71d4fae-5dec-22d6-fea5-00a0c91e6be4"
        );

        let missing = br#"<D:prop xmlns:D="DAV:"><D:lockdiscovery/></D:prop>"#;
        assert!(matches!(
            parse_lock_response(missing),
            Err(ResponseFormatError::Structure { .. })
        ));
    }
}
