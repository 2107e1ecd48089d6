// Copyright 2023 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! Search conditions for DASL `basicsearch` requests.
//!
//! A [`Condition`] is a small tree of comparisons combined with `and`, `or` and `not`. It renders
//! into the `DAV:where` clause of a `SEARCH` request body.
//!
//! Some servers lack a substring operator. For those, [`ContainsStrategy::IsDefinedPostFilter`]
//! renders each [`Condition::Contains`] as an `is-defined` test and the matching is done on the
//! client, by re-scanning the returned property values. Only conditions where every `contains`
//! sits below `and` (or directly below `not`) can be evaluated this way.

use std::borrow::Cow;

use chrono::{DateTime, Utc};

use crate::namecheck::NameError;
use crate::names::{DAV, GETLASTMODIFIED};
use crate::property::PropertyName;
use crate::response::PropertyResponse;
use crate::xmlutils::{escape_text, NamespacePrefixes};

/// How [`Condition::Contains`] is sent to the server.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ContainsStrategy {
    /// Use the `DAV:like` operator.
    #[default]
    Native,
    /// Send `DAV:is-defined` and filter the results on the client.
    IsDefinedPostFilter,
}

/// A condition cannot be rendered.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    #[error("a 'contains' term below 'or' cannot be filtered on the client")]
    ContainsUnderOr,

    #[error("a 'contains' term below a negated compound term cannot be filtered on the client")]
    NegatedContains,

    #[error("invalid property in condition")]
    Name(#[from] NameError),
}

/// Relational operators for [`Condition::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Equal,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

impl Relation {
    fn tag(self) -> &'static str {
        match self {
            Relation::Equal => "eq",
            Relation::Greater => "gt",
            Relation::GreaterOrEqual => "gte",
            Relation::Less => "lt",
            Relation::LessOrEqual => "lte",
        }
    }
}

/// A constant compared against a property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Text(String),
    /// A number, already formatted.
    Number(String),
    Date(DateTime<Utc>),
}

impl Literal {
    pub fn number<N: ToString>(number: N) -> Literal {
        Literal::Number(number.to_string())
    }

    /// Renders the literal for a comparison against `property`.
    ///
    /// Dates are rendered as RFC 1123 for `DAV:getlastmodified` and as ISO 8601 otherwise,
    /// matching the format of the property values themselves.
    fn render(&self, property: &PropertyName) -> String {
        match self {
            Literal::Text(text) | Literal::Number(text) => text.clone(),
            Literal::Date(date) if *property == GETLASTMODIFIED => {
                date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
            }
            Literal::Date(date) => date.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Text(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Text(value)
    }
}

impl From<DateTime<Utc>> for Literal {
    fn from(value: DateTime<Utc>) -> Self {
        Literal::Date(value)
    }
}

/// A node of a search condition tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Compare {
        relation: Relation,
        property: PropertyName,
        literal: Literal,
        /// Rendered as the `caseless` attribute when set.
        caseless: Option<bool>,
    },
    /// The property value contains `text`.
    Contains {
        property: PropertyName,
        text: String,
        caseless: bool,
    },
    IsCollection,
    IsDefined(PropertyName),
    /// The resource content contains a phrase.
    ContentContains(String),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    /// String equality.
    pub fn equals<S: Into<String>>(property: PropertyName, text: S, caseless: bool) -> Condition {
        Condition::Compare {
            relation: Relation::Equal,
            property,
            literal: Literal::Text(text.into()),
            caseless: Some(caseless),
        }
    }

    pub fn compare<L: Into<Literal>>(
        relation: Relation,
        property: PropertyName,
        literal: L,
    ) -> Condition {
        Condition::Compare {
            relation,
            property,
            literal: literal.into(),
            caseless: None,
        }
    }

    pub fn greater<L: Into<Literal>>(property: PropertyName, literal: L) -> Condition {
        Condition::compare(Relation::Greater, property, literal)
    }

    pub fn greater_or_equal<L: Into<Literal>>(property: PropertyName, literal: L) -> Condition {
        Condition::compare(Relation::GreaterOrEqual, property, literal)
    }

    pub fn less<L: Into<Literal>>(property: PropertyName, literal: L) -> Condition {
        Condition::compare(Relation::Less, property, literal)
    }

    pub fn less_or_equal<L: Into<Literal>>(property: PropertyName, literal: L) -> Condition {
        Condition::compare(Relation::LessOrEqual, property, literal)
    }

    pub fn contains<S: Into<String>>(property: PropertyName, text: S, caseless: bool) -> Condition {
        Condition::Contains {
            property,
            text: text.into(),
            caseless,
        }
    }

    pub fn and<I: IntoIterator<Item = Condition>>(terms: I) -> Condition {
        Condition::And(terms.into_iter().collect())
    }

    pub fn or<I: IntoIterator<Item = Condition>>(terms: I) -> Condition {
        Condition::Or(terms.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(term: Condition) -> Condition {
        Condition::Not(Box::new(term))
    }

    /// Checks property names, and whether the condition can be evaluated with `strategy`.
    ///
    /// # Errors
    ///
    /// See [`ConditionError`].
    pub fn validate(&self, strategy: ContainsStrategy) -> Result<(), ConditionError> {
        self.validate_inner(strategy, false, false)
    }

    fn validate_inner(
        &self,
        strategy: ContainsStrategy,
        below_or: bool,
        below_negated_compound: bool,
    ) -> Result<(), ConditionError> {
        let post_filter = strategy == ContainsStrategy::IsDefinedPostFilter;
        match self {
            Condition::Compare { property, .. } | Condition::IsDefined(property) => {
                property.validate()?;
            }
            Condition::Contains { property, .. } => {
                property.validate()?;
                if post_filter && below_or {
                    return Err(ConditionError::ContainsUnderOr);
                }
                if post_filter && below_negated_compound {
                    return Err(ConditionError::NegatedContains);
                }
            }
            Condition::IsCollection | Condition::ContentContains(_) => {}
            Condition::And(terms) => {
                for term in terms {
                    term.validate_inner(strategy, below_or, below_negated_compound)?;
                }
            }
            Condition::Or(terms) => {
                for term in terms {
                    term.validate_inner(strategy, true, below_negated_compound)?;
                }
            }
            Condition::Not(term) => {
                let compound = !matches!(**term, Condition::Contains { .. });
                term.validate_inner(strategy, below_or, below_negated_compound || compound)?;
            }
        }
        Ok(())
    }

    /// Returns a copy where properties without a namespace are placed in `default_namespace`.
    #[must_use]
    pub fn resolved(&self, default_namespace: Option<&str>) -> Condition {
        let resolve = |property: &PropertyName| property.with_default_namespace(default_namespace);
        match self {
            Condition::Compare {
                relation,
                property,
                literal,
                caseless,
            } => Condition::Compare {
                relation: *relation,
                property: resolve(property),
                literal: literal.clone(),
                caseless: *caseless,
            },
            Condition::Contains {
                property,
                text,
                caseless,
            } => Condition::Contains {
                property: resolve(property),
                text: text.clone(),
                caseless: *caseless,
            },
            Condition::IsDefined(property) => Condition::IsDefined(resolve(property)),
            Condition::IsCollection | Condition::ContentContains(_) => self.clone(),
            Condition::And(terms) => Condition::And(
                terms
                    .iter()
                    .map(|term| term.resolved(default_namespace))
                    .collect(),
            ),
            Condition::Or(terms) => Condition::Or(
                terms
                    .iter()
                    .map(|term| term.resolved(default_namespace))
                    .collect(),
            ),
            Condition::Not(term) => Condition::not(term.resolved(default_namespace)),
        }
    }

    /// Properties that a client-side filter needs to inspect.
    #[must_use]
    pub fn contains_properties(&self) -> Vec<PropertyName> {
        let mut found = Vec::new();
        self.collect_contains_properties(&mut found);
        found
    }

    fn collect_contains_properties(&self, into: &mut Vec<PropertyName>) {
        match self {
            Condition::Contains { property, .. } => {
                if !into.contains(property) {
                    into.push(property.clone());
                }
            }
            Condition::And(terms) | Condition::Or(terms) => {
                for term in terms {
                    term.collect_contains_properties(into);
                }
            }
            Condition::Not(term) => term.collect_contains_properties(into),
            _ => {}
        }
    }

    /// Evaluates the `contains` terms against the properties returned for a resource.
    ///
    /// Every other term is assumed to have been evaluated by the server already.
    #[must_use]
    pub fn matches(&self, properties: &PropertyResponse) -> bool {
        match self {
            Condition::Contains {
                property,
                text,
                caseless,
            } => {
                let Some(value) = properties.properties().get(property) else {
                    return false;
                };
                let value = value.all_text();
                if *caseless {
                    value.to_lowercase().contains(&text.to_lowercase())
                } else {
                    value.contains(text.as_str())
                }
            }
            Condition::And(terms) => terms.iter().all(|term| term.matches(properties)),
            Condition::Not(term) if matches!(**term, Condition::Contains { .. }) => {
                !term.matches(properties)
            }
            _ => true,
        }
    }

    /// Renders the condition. `Not(Contains)` renders nothing when post-filtering, and neither
    /// does a compound term left without operands.
    pub(crate) fn write_xml(
        &self,
        strategy: ContainsStrategy,
        default_namespace: Option<&str>,
        prefixes: &mut NamespacePrefixes,
        out: &mut String,
    ) {
        let dav = |prefixes: &mut NamespacePrefixes, name: &str| prefixes.qualify(DAV, name);
        match self {
            Condition::Compare {
                relation,
                property,
                literal,
                caseless,
            } => {
                let tag = dav(prefixes, relation.tag());
                match caseless {
                    Some(caseless) => out.push_str(&format!(
                        r#"<{tag} caseless="{}">"#,
                        if *caseless { "yes" } else { "no" }
                    )),
                    None => out.push_str(&format!("<{tag}>")),
                }
                let property = property.with_default_namespace(default_namespace);
                write_prop(&property, prefixes, out);
                write_literal(&literal.render(&property), prefixes, out);
                out.push_str(&format!("</{tag}>"));
            }
            Condition::Contains {
                property,
                text,
                caseless,
            } => {
                let property = property.with_default_namespace(default_namespace);
                match strategy {
                    ContainsStrategy::Native => {
                        let tag = dav(prefixes, "like");
                        out.push_str(&format!(
                            r#"<{tag} caseless="{}">"#,
                            if *caseless { "yes" } else { "no" }
                        ));
                        write_prop(&property, prefixes, out);
                        write_literal(&format!("%{}%", escape_like(text)), prefixes, out);
                        out.push_str(&format!("</{tag}>"));
                    }
                    ContainsStrategy::IsDefinedPostFilter => {
                        write_is_defined(&property, prefixes, out);
                    }
                }
            }
            Condition::IsCollection => {
                out.push_str(&format!("<{}/>", dav(prefixes, "is-collection")));
            }
            Condition::IsDefined(property) => {
                let property = property.with_default_namespace(default_namespace);
                write_is_defined(&property, prefixes, out);
            }
            Condition::ContentContains(phrase) => {
                let tag = dav(prefixes, "contains");
                out.push_str(&format!("<{tag}>{}</{tag}>", escape_text(phrase)));
            }
            Condition::And(terms) | Condition::Or(terms) => {
                let tag = dav(
                    prefixes,
                    if matches!(self, Condition::And(_)) {
                        "and"
                    } else {
                        "or"
                    },
                );
                let mut operands = String::new();
                for term in terms {
                    term.write_xml(strategy, default_namespace, prefixes, &mut operands);
                }
                // Compounds need at least one operand; an empty one is left to the filter.
                if !operands.is_empty() {
                    out.push_str(&format!("<{tag}>{operands}</{tag}>"));
                }
            }
            Condition::Not(term) => {
                if strategy == ContainsStrategy::IsDefinedPostFilter
                    && matches!(**term, Condition::Contains { .. })
                {
                    return;
                }
                let tag = dav(prefixes, "not");
                let mut operand = String::new();
                term.write_xml(strategy, default_namespace, prefixes, &mut operand);
                if !operand.is_empty() {
                    out.push_str(&format!("<{tag}>{operand}</{tag}>"));
                }
            }
        }
    }
}

fn write_prop(property: &PropertyName, prefixes: &mut NamespacePrefixes, out: &mut String) {
    let prop = prefixes.qualify(DAV, "prop");
    let name = prefixes.qualify(property.namespace(), property.name());
    out.push_str(&format!("<{prop}><{name}/></{prop}>"));
}

fn write_literal(literal: &str, prefixes: &mut NamespacePrefixes, out: &mut String) {
    let tag = prefixes.qualify(DAV, "literal");
    out.push_str(&format!("<{tag}>{}</{tag}>", escape_text(literal)));
}

/// Escapes the `like` wildcards so that `text` matches literally.
fn escape_like(text: &str) -> Cow<str> {
    if !text.contains(&['\\', '%', '_'][..]) {
        return Cow::Borrowed(text);
    }
    let mut escaped = String::with_capacity(text.len() + 4);
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    Cow::Owned(escaped)
}

fn write_is_defined(property: &PropertyName, prefixes: &mut NamespacePrefixes, out: &mut String) {
    let tag = prefixes.qualify(DAV, "is-defined");
    out.push_str(&format!("<{tag}>"));
    write_prop(property, prefixes, out);
    out.push_str(&format!("</{tag}>"));
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::names::{DISPLAY_NAME, GETCONTENTLENGTH, GETLASTMODIFIED};
    use crate::property::PropertyName;
    use crate::response::parse_multistatus;
    use crate::xmlutils::{NamespacePrefixes, UrlCharset};

    use super::{Condition, ConditionError, ContainsStrategy, Literal};

    fn render(condition: &Condition, strategy: ContainsStrategy) -> String {
        let mut prefixes = NamespacePrefixes::default();
        let mut out = String::new();
        condition.write_xml(strategy, None, &mut prefixes, &mut out);
        out
    }

    #[test]
    fn test_render_tree() {
        let condition = Condition::and([
            Condition::equals(DISPLAY_NAME.into(), "a<b", true),
            Condition::not(Condition::IsCollection),
            Condition::greater(GETCONTENTLENGTH.into(), Literal::number(1024)),
        ]);
        assert_eq!(
            render(&condition, ContainsStrategy::Native),
            concat!(
                r#"<D:and><D:eq caseless="yes"><D:prop><D:displayname/></D:prop>"#,
                "<D:literal>a&lt;b</D:literal></D:eq><D:not><D:is-collection/></D:not>",
                "<D:gt><D:prop><D:getcontentlength/></D:prop><D:literal>1024</D:literal></D:gt>",
                "</D:and>"
            )
        );
    }

    #[test]
    fn test_render_contains() {
        let condition = Condition::contains(PropertyName::new("urn:x", "title"), "moon", false);
        assert_eq!(
            render(&condition, ContainsStrategy::Native),
            r#"<D:like caseless="no"><D:prop><ns0:title/></D:prop><D:literal>%moon%</D:literal></D:like>"#
        );
        assert_eq!(
            render(&condition, ContainsStrategy::IsDefinedPostFilter),
            "<D:is-defined><D:prop><ns0:title/></D:prop></D:is-defined>"
        );
        assert_eq!(
            render(
                &Condition::not(condition),
                ContainsStrategy::IsDefinedPostFilter
            ),
            ""
        );
    }

    #[test]
    fn test_render_contains_matches_wildcards_literally() {
        let condition = Condition::contains(DISPLAY_NAME.into(), r"50%_off\", false);
        assert_eq!(
            render(&condition, ContainsStrategy::Native),
            r#"<D:like caseless="no"><D:prop><D:displayname/></D:prop><D:literal>%50\%\_off\\%</D:literal></D:like>"#
        );
    }

    #[test]
    fn test_render_skips_compound_without_operands() {
        let contains = Condition::contains(DISPLAY_NAME.into(), "x", false);
        let condition = Condition::and([Condition::not(contains.clone())]);
        assert_eq!(render(&condition, ContainsStrategy::IsDefinedPostFilter), "");

        let nested = Condition::and([
            Condition::IsCollection,
            Condition::and([Condition::not(contains)]),
        ]);
        assert_eq!(
            render(&nested, ContainsStrategy::IsDefinedPostFilter),
            "<D:and><D:is-collection/></D:and>"
        );
    }

    #[test]
    fn test_render_dates() {
        let date = Utc.with_ymd_and_hms(2023, 3, 5, 14, 7, 9).unwrap();
        let modified = Condition::less(GETLASTMODIFIED.into(), date);
        assert_eq!(
            render(&modified, ContainsStrategy::Native),
            "<D:lt><D:prop><D:getlastmodified/></D:prop><D:literal>Sun, 05 Mar 2023 14:07:09 GMT</D:literal></D:lt>"
        );
        let created = Condition::greater_or_equal(PropertyName::dav("creationdate"), date);
        assert_eq!(
            render(&created, ContainsStrategy::Native),
            "<D:gte><D:prop><D:creationdate/></D:prop><D:literal>2023-03-05T14:07:09Z</D:literal></D:gte>"
        );
    }

    #[test]
    fn test_validate() {
        let contains = Condition::contains(DISPLAY_NAME.into(), "x", false);
        let or = Condition::or([contains.clone(), Condition::IsCollection]);
        or.validate(ContainsStrategy::Native).unwrap();
        assert_eq!(
            or.validate(ContainsStrategy::IsDefinedPostFilter),
            Err(ConditionError::ContainsUnderOr)
        );

        let negated_and = Condition::not(Condition::and([contains.clone()]));
        assert_eq!(
            negated_and.validate(ContainsStrategy::IsDefinedPostFilter),
            Err(ConditionError::NegatedContains)
        );
        Condition::not(contains)
            .validate(ContainsStrategy::IsDefinedPostFilter)
            .unwrap();

        let bad_name = Condition::IsDefined(PropertyName::dav("9lives"));
        assert!(matches!(
            bad_name.validate(ContainsStrategy::Native),
            Err(ConditionError::Name(_))
        ));
    }

    #[test]
    fn test_post_filter() {
        let raw = br#"<multistatus xmlns="DAV:">
  <response><href>/a</href><propstat>
    <prop><displayname>Full Moon</displayname></prop><status>HTTP/1.1 200 OK</status>
  </propstat></response>
  <response><href>/b</href><propstat>
    <prop><displayname>Sunrise</displayname></prop><status>HTTP/1.1 200 OK</status>
  </propstat></response>
</multistatus>"#;
        let parsed = parse_multistatus(raw, UrlCharset::Utf8).unwrap();
        let a = parsed.get("/a").unwrap().as_properties().unwrap();
        let b = parsed.get("/b").unwrap().as_properties().unwrap();

        let contains = Condition::contains(DISPLAY_NAME.into(), "moon", true);
        assert!(contains.matches(a));
        assert!(!contains.matches(b));

        let sensitive = Condition::contains(DISPLAY_NAME.into(), "moon", false);
        assert!(!sensitive.matches(a));

        let negated = Condition::and([Condition::IsCollection, Condition::not(contains)]);
        assert!(!negated.matches(a));
        assert!(negated.matches(b));
        assert_eq!(
            negated.contains_properties(),
            vec![PropertyName::from(DISPLAY_NAME)]
        );
    }
}
