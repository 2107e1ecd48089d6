// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! Validation of resource and property names.
//!
//! Names are checked before any request body is rendered or any request is sent, so that an
//! invalid name never costs a round trip to the server.

use std::fmt;

/// The kind of name that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Resource,
    Property,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameKind::Resource => f.write_str("resource"),
            NameKind::Property => f.write_str("property"),
        }
    }
}

/// A resource or property name was rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("{0} name must not be empty")]
    Empty(NameKind),

    #[error("'{name}' is a reserved {kind} name")]
    Reserved { kind: NameKind, name: String },

    #[error("invalid character {character:?} at index {index} in {kind} name '{name}'")]
    InvalidCharacter {
        kind: NameKind,
        name: String,
        character: char,
        index: usize,
    },
}

/// Characters that may never appear in a single path segment.
const FORBIDDEN_IN_RESOURCE: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Validates the name of a single resource (one path segment).
///
/// Names must be non-empty, must not be `.` or `..`, and must not contain path separators,
/// control characters or any of `\ : * ? " < > |`.
///
/// # Errors
///
/// Returns a [`NameError`] describing the first offending character.
pub fn validate_resource_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty(NameKind::Resource));
    }
    if name == "." || name == ".." {
        return Err(NameError::Reserved {
            kind: NameKind::Resource,
            name: name.to_string(),
        });
    }
    match name
        .chars()
        .enumerate()
        .find(|(_, c)| c.is_control() || FORBIDDEN_IN_RESOURCE.contains(c))
    {
        Some((index, character)) => Err(NameError::InvalidCharacter {
            kind: NameKind::Resource,
            name: name.to_string(),
            character,
            index,
        }),
        None => Ok(()),
    }
}

/// Validates every segment of an absolute or relative path.
///
/// Empty segments (caused by leading, trailing or doubled slashes) are ignored.
///
/// # Errors
///
/// Returns the error of the first invalid segment. The reported index is relative to that
/// segment.
pub fn validate_resource_path(path: &str) -> Result<(), NameError> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .try_for_each(validate_resource_name)
}

/// Validates the local name of an XML property.
///
/// The accepted grammar is a simplified XML `NCName`: a letter or underscore followed by
/// letters, digits, `.`, `-` or `_`.
///
/// # Errors
///
/// Returns a [`NameError`] describing the first offending character.
pub fn validate_property_name(name: &str) -> Result<(), NameError> {
    let mut chars = name.chars().enumerate();
    let Some((_, first)) = chars.next() else {
        return Err(NameError::Empty(NameKind::Property));
    };

    let invalid = |index, character| NameError::InvalidCharacter {
        kind: NameKind::Property,
        name: name.to_string(),
        character,
        index,
    };

    if !(first.is_alphabetic() || first == '_') {
        return Err(invalid(0, first));
    }
    match chars.find(|(_, c)| !(c.is_alphanumeric() || matches!(c, '.' | '-' | '_'))) {
        Some((index, character)) => Err(invalid(index, character)),
        None => Ok(()),
    }
}
