// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! Utilities for handling XML data and hrefs.
use std::borrow::Cow;
use std::fmt::Write;
use std::str::FromStr;

use http::status::InvalidStatusCode;
use http::StatusCode;
use percent_encoding::{percent_decode_str, percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::names::DAV;

/// Header prepended to every XML request body.
pub const XML_DOC_HEADER: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// Value of the `Content-Type` header for XML request bodies.
pub const XML_CONTENT_TYPE: &str = r#"text/xml; charset="utf-8""#;

/// Characters that are escaped for hrefs.
pub(crate) const DISALLOWED_FOR_HREF: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'~');

/// Parses a status line string into a [`StatusCode`].
///
/// Example input string: `HTTP/1.1 200 OK`.
///
/// # See also
///
/// - The [status element](https://www.rfc-editor.org/rfc/rfc2518#section-12.9.1.2)
/// - [Status-Line](https://www.rfc-editor.org/rfc/rfc2068#section-6.1)
///
/// # Errors
///
/// If the input string does not match a status line.
pub fn parse_statusline<S: AsRef<str>>(status_line: S) -> Result<StatusCode, InvalidStatusCode> {
    let mut iter = status_line.as_ref().trim().splitn(3, ' ');
    iter.next();
    let code = iter.next().unwrap_or("");
    StatusCode::from_str(code)
}

/// Returns the reason phrase of a status line, if any.
pub(crate) fn statusline_reason(status_line: &str) -> Option<&str> {
    status_line
        .trim()
        .splitn(3, ' ')
        .nth(2)
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
}

/// Replaces characters that need to be escaped in texts.
///
/// `<` --> `&lt;`
/// `>` --> `&gt;`
/// `&` --> `&amp;`
///
/// This IS NOT usable in other contexts of XML encoding.
#[must_use]
pub fn escape_text(raw: &str) -> Cow<str> {
    // This function is strongly based on `escape_partial` from `quick-xml`:
    {
        // The MIT License (MIT)
        //
        // Copyright (c) 2016 Johann Tuffe
        //
        // Permission is hereby granted, free of charge, to any person obtaining a copy
        // of this software and associated documentation files (the "Software"), to deal
        // in the Software without restriction, including without limitation the rights
        // to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
        // copies of the Software, and to permit persons to whom the Software is
        // furnished to do so, subject to the following conditions:
        //
        //
        // The above copyright notice and this permission notice shall be included in
        // all copies or substantial portions of the Software.
        //
        //
        // THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
        // IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
        // FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT.  IN NO EVENT SHALL THE
        // AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
        // LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
        // OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
        // THE SOFTWARE.
        let bytes = raw.as_bytes();
        let mut escaped = None;
        let mut iter = bytes.iter();
        let mut pos = 0;
        while let Some(i) = iter.position(|&b| matches!(b, b'<' | b'>' | b'&')) {
            let escaped = escaped.get_or_insert_with(|| Vec::with_capacity(raw.len()));
            let new_pos = pos + i;
            escaped.extend_from_slice(&bytes[pos..new_pos]);
            match bytes[new_pos] {
                b'<' => escaped.extend_from_slice(b"&lt;"),
                b'>' => escaped.extend_from_slice(b"&gt;"),
                b'&' => escaped.extend_from_slice(b"&amp;"),
                _ => unreachable!("Only '<', '>' and '&', are escaped"),
            }
            pos = new_pos + 1;
        }

        if let Some(mut escaped) = escaped {
            if let Some(raw) = bytes.get(pos..) {
                escaped.extend_from_slice(raw);
            }
            // SAFETY: we operate on UTF-8 input and search for an one byte chars only,
            // so all slices that was put to the `escaped` is a valid UTF-8 encoded strings
            Cow::Owned(
                String::from_utf8(escaped).expect("manually escaped string must be valid utf-8"),
            )
        } else {
            Cow::Borrowed(raw)
        }
    }
    // End copied code.
}

/// Escapes a value to be placed inside a double-quoted attribute.
#[must_use]
pub fn escape_attribute(raw: &str) -> Cow<str> {
    if !raw.contains(['<', '>', '&', '"']) {
        return Cow::Borrowed(raw);
    }
    let mut escaped = String::with_capacity(raw.len() + 8);
    for c in raw.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// Allocates namespace prefixes while rendering a request body.
///
/// `DAV:` is always bound to `D`. Every other namespace gets `ns0`, `ns1`, ... in the order in
/// which it is first seen. Elements without a namespace are rendered unprefixed, and no default
/// namespace is ever declared.
#[derive(Debug, Default)]
pub(crate) struct NamespacePrefixes {
    others: Vec<String>,
}

impl NamespacePrefixes {
    /// Returns the prefix for `namespace`, allocating one if needed.
    pub(crate) fn prefix_for(&mut self, namespace: &str) -> Option<String> {
        if namespace.is_empty() {
            return None;
        }
        if namespace == DAV {
            return Some(String::from("D"));
        }
        let index = match self.others.iter().position(|ns| ns == namespace) {
            Some(index) => index,
            None => {
                self.others.push(namespace.to_string());
                self.others.len() - 1
            }
        };
        Some(format!("ns{index}"))
    }

    /// Returns the qualified tag name for an element.
    pub(crate) fn qualify(&mut self, namespace: &str, name: &str) -> String {
        match self.prefix_for(namespace) {
            Some(prefix) => format!("{prefix}:{name}"),
            None => name.to_string(),
        }
    }

    /// Renders `xmlns` declarations for `DAV:` and every allocated namespace.
    ///
    /// The result starts with a space, so it can be placed right after the root tag name.
    pub(crate) fn declarations(&self) -> String {
        let mut decls = format!(r#" xmlns:D="{DAV}""#);
        for (index, namespace) in self.others.iter().enumerate() {
            // Writing into a String cannot fail.
            let _ = write!(decls, r#" xmlns:ns{index}="{}""#, escape_attribute(namespace));
        }
        decls
    }
}

/// Character set used to percent-encode and decode hrefs.
///
/// Modern servers use UTF-8. Some legacy servers percent-encode Latin-1 bytes instead; for those,
/// [`UrlCharset::Latin1`] must be selected explicitly. Raw (not percent-encoded) non-ASCII
/// characters in a response are always read as UTF-8, since the document itself is UTF-8.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum UrlCharset {
    #[default]
    Utf8,
    Latin1,
}

impl UrlCharset {
    /// URL-encodes a path.
    ///
    /// The input MUST NOT already be url-encoded. With [`UrlCharset::Latin1`], characters
    /// outside of Latin-1 are encoded as UTF-8.
    #[must_use]
    pub fn quote(self, path: &str) -> Cow<str> {
        match self {
            UrlCharset::Utf8 => quote_href(path.as_bytes()),
            UrlCharset::Latin1 if path.is_ascii() => quote_href(path.as_bytes()),
            UrlCharset::Latin1 => {
                let mut quoted = String::with_capacity(path.len() * 3);
                for c in path.chars() {
                    match u8::try_from(u32::from(c)) {
                        Ok(byte) => quoted.extend(percent_encode(&[byte], DISALLOWED_FOR_HREF)),
                        Err(_) => {
                            let mut buf = [0; 4];
                            let encoded = c.encode_utf8(&mut buf);
                            quoted.extend(percent_encode(encoded.as_bytes(), DISALLOWED_FOR_HREF));
                        }
                    }
                }
                Cow::Owned(quoted)
            }
        }
    }

    /// Decodes a percent-encoded href.
    ///
    /// # Errors
    ///
    /// With [`UrlCharset::Utf8`], if the decoded bytes are not valid UTF-8.
    pub fn unquote(self, href: &str) -> Result<String, std::str::Utf8Error> {
        match self {
            UrlCharset::Utf8 => Ok(percent_decode_str(href).decode_utf8()?.into_owned()),
            UrlCharset::Latin1 => {
                let mut decoded = String::with_capacity(href.len());
                let mut rest = href;
                while let Some(pos) = rest.find('%') {
                    decoded.push_str(&rest[..pos]);
                    let escape = rest.get(pos + 1..pos + 3);
                    match escape
                        .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
                        .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                    {
                        Some(byte) => {
                            decoded.push(char::from(byte));
                            rest = &rest[pos + 3..];
                        }
                        None => {
                            decoded.push('%');
                            rest = &rest[pos + 1..];
                        }
                    }
                }
                decoded.push_str(rest);
                Ok(decoded)
            }
        }
    }
}

// URL-encodes an href.
//
// Obviously the input parameter MUST NOT be url-encoded.
pub(crate) fn quote_href(href: &[u8]) -> Cow<'_, str> {
    Cow::from(percent_encode(href, DISALLOWED_FOR_HREF))
}

/// URL-encodes an absolute URL, such as the value of a `Destination` header.
///
/// Everything after the authority is encoded with `charset`. Relative references are encoded
/// as a whole.
pub(crate) fn quote_url(url: &str, charset: UrlCharset) -> String {
    let authority_end = url
        .find("://")
        .and_then(|scheme_end| {
            url[scheme_end + 3..]
                .find('/')
                .map(|slash| scheme_end + 3 + slash)
        });
    match authority_end {
        Some(end) => format!("{}{}", &url[..end], charset.quote(&url[end..])),
        None if url.contains("://") => url.to_string(),
        None => charset.quote(url).into_owned(),
    }
}
