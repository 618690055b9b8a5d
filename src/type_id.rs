//! Type identifiers and wildcard patterns
//!
//! A [`MetaDataTypeId`] is the `(type, subType)` key of the registry. Patterns
//! are built from [`Matcher`]s so a literal `*` never leaks into comparisons:
//! the wildcard only exists at the parsing edge.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MetaDataError, Result};

const WILDCARD: &str = "*";

/// Immutable `(type, subType)` pair, lower-cased on construction
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MetaDataTypeId {
    type_name: String,
    sub_type: String,
}

impl MetaDataTypeId {
    pub fn new(type_name: impl AsRef<str>, sub_type: impl AsRef<str>) -> Self {
        Self {
            type_name: type_name.as_ref().trim().to_lowercase(),
            sub_type: sub_type.as_ref().trim().to_lowercase(),
        }
    }

    /// Parse a qualified name such as `field.string`
    pub fn parse(qualified: &str) -> Result<Self> {
        let (type_name, sub_type) = qualified
            .trim()
            .split_once('.')
            .ok_or_else(|| MetaDataError::InvalidTypeId(qualified.to_string()))?;

        if type_name.is_empty()
            || sub_type.is_empty()
            || type_name == WILDCARD
            || sub_type == WILDCARD
            || sub_type.contains('.')
        {
            return Err(MetaDataError::InvalidTypeId(qualified.to_string()));
        }
        Ok(Self::new(type_name, sub_type))
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn sub_type(&self) -> &str {
        &self.sub_type
    }

    /// `type.subType`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.type_name, self.sub_type)
    }

    pub fn is_type(&self, type_name: &str) -> bool {
        self.type_name.eq_ignore_ascii_case(type_name)
    }

    /// Id of the `base` subtype of this type family
    pub fn base(&self) -> Self {
        Self::new(&self.type_name, "base")
    }
}

impl fmt::Display for MetaDataTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.sub_type)
    }
}

impl FromStr for MetaDataTypeId {
    type Err = MetaDataError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MetaDataTypeId {
    type Error = MetaDataError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<MetaDataTypeId> for String {
    fn from(id: MetaDataTypeId) -> Self {
        id.qualified_name()
    }
}

/// One position of a pattern: anything, or exactly one value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Matcher {
    Any,
    Exact(String),
}

impl Matcher {
    /// Parse a name position; `*` is the wildcard
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value == WILDCARD || value.is_empty() {
            Matcher::Any
        } else {
            Matcher::Exact(value.to_string())
        }
    }

    /// Parse a type or subtype position (case-normalised like type ids)
    pub fn parse_type(value: &str) -> Self {
        match Self::parse(value) {
            Matcher::Exact(v) => Matcher::Exact(v.to_lowercase()),
            any => any,
        }
    }

    pub fn exact(value: impl Into<String>) -> Self {
        Matcher::Exact(value.into())
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Matcher::Any)
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::Exact(expected) => expected == value,
        }
    }

    /// The exact value, if any
    pub fn value(&self) -> Option<&str> {
        match self {
            Matcher::Any => None,
            Matcher::Exact(v) => Some(v),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Any => f.write_str(WILDCARD),
            Matcher::Exact(v) => f.write_str(v),
        }
    }
}

impl From<String> for Matcher {
    fn from(value: String) -> Self {
        Matcher::parse(&value)
    }
}

impl From<Matcher> for String {
    fn from(m: Matcher) -> Self {
        m.to_string()
    }
}

/// `type.subType[name]` pattern with wildcards in any position
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypePattern {
    pub type_name: Matcher,
    pub sub_type: Matcher,
    pub name: Matcher,
}

impl TypePattern {
    /// `*.*[*]`
    pub fn any() -> Self {
        Self {
            type_name: Matcher::Any,
            sub_type: Matcher::Any,
            name: Matcher::Any,
        }
    }

    /// Pattern from raw positions, `*` meaning any
    pub fn of(type_name: &str, sub_type: &str, name: &str) -> Self {
        Self {
            type_name: Matcher::parse_type(type_name),
            sub_type: Matcher::parse_type(sub_type),
            name: Matcher::parse(name),
        }
    }

    /// Pattern matching exactly one type id, any name
    pub fn exact(type_id: &MetaDataTypeId) -> Self {
        Self {
            type_name: Matcher::exact(type_id.type_name()),
            sub_type: Matcher::exact(type_id.sub_type()),
            name: Matcher::Any,
        }
    }

    /// Parse `*`, `field.*`, `*.string`, `attr.int[maxLength]`
    pub fn parse(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(MetaDataError::InvalidTypeId(pattern.to_string()));
        }

        let (base, name) = match pattern.find('[') {
            Some(open) => {
                let rest = &pattern[open + 1..];
                let inner = rest
                    .strip_suffix(']')
                    .ok_or_else(|| MetaDataError::InvalidTypeId(pattern.to_string()))?;
                (&pattern[..open], inner)
            }
            None => (pattern, WILDCARD),
        };

        let (type_name, sub_type) = match base.split_once('.') {
            Some((t, s)) if !t.is_empty() && !s.is_empty() && !s.contains('.') => (t, s),
            Some(_) => return Err(MetaDataError::InvalidTypeId(pattern.to_string())),
            None => (base, WILDCARD),
        };

        Ok(Self::of(type_name, sub_type, name))
    }

    /// Whether the pattern accepts this type, ignoring the name position
    pub fn matches_type(&self, type_id: &MetaDataTypeId) -> bool {
        self.type_name.matches(type_id.type_name()) && self.sub_type.matches(type_id.sub_type())
    }

    pub fn matches(&self, type_id: &MetaDataTypeId, name: &str) -> bool {
        self.matches_type(type_id) && self.name.matches(name)
    }

    /// Number of exact positions; used to order descriptions
    pub fn specificity(&self) -> usize {
        [&self.type_name, &self.sub_type, &self.name]
            .iter()
            .filter(|m| !m.is_any())
            .count()
    }
}

impl fmt::Display for TypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.sub_type)?;
        if !self.name.is_any() {
            write!(f, "[{}]", self.name)?;
        }
        Ok(())
    }
}

impl FromStr for TypePattern {
    type Err = MetaDataError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TypePattern {
    type Error = MetaDataError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TypePattern> for String {
    fn from(p: TypePattern) -> Self {
        p.to_string()
    }
}

/// Wildcard test: does `type_id` satisfy `pattern`
pub fn matches(pattern: &TypePattern, type_id: &MetaDataTypeId) -> bool {
    pattern.matches_type(type_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(t: &str, s: &str) -> MetaDataTypeId {
        MetaDataTypeId::new(t, s)
    }

    #[test]
    fn test_type_id_is_case_normalized() {
        let a = MetaDataTypeId::new("Field", "String");
        assert_eq!(a, id("field", "string"));
        assert_eq!(a.qualified_name(), "field.string");
    }

    #[test]
    fn test_parse_type_id() {
        assert_eq!(MetaDataTypeId::parse("attr.int").unwrap(), id("attr", "int"));
        assert!(MetaDataTypeId::parse("attr").is_err());
        assert!(MetaDataTypeId::parse("attr.*").is_err());
        assert!(MetaDataTypeId::parse(".int").is_err());
    }

    #[test]
    fn test_wildcard_matching() {
        let string_field = id("field", "string");
        assert!(matches(&TypePattern::parse("field.*").unwrap(), &string_field));
        assert!(!matches(&TypePattern::parse("field.int").unwrap(), &string_field));
        assert!(matches(&TypePattern::parse("*.*").unwrap(), &string_field));
        assert!(matches(&TypePattern::parse("*.string").unwrap(), &string_field));
        assert!(matches(&TypePattern::parse("*").unwrap(), &id("validator", "regex")));
    }

    #[test]
    fn test_named_pattern() {
        let pattern = TypePattern::parse("attr.int[maxLength]").unwrap();
        assert!(pattern.matches(&id("attr", "int"), "maxLength"));
        assert!(!pattern.matches(&id("attr", "int"), "minLength"));
        assert_eq!(pattern.to_string(), "attr.int[maxLength]");
        assert_eq!(pattern.specificity(), 3);
    }

    #[test]
    fn test_literal_star_name_is_not_a_collision() {
        // a node literally named "*" is only matched by an exact or wildcard name
        let pattern = TypePattern::of("attr", "string", "pattern");
        assert!(!pattern.matches(&id("attr", "string"), "*"));
    }

    #[test]
    fn test_malformed_patterns() {
        assert!(TypePattern::parse("").is_err());
        assert!(TypePattern::parse("attr.int[name").is_err());
        assert!(TypePattern::parse("a.b.c").is_err());
    }

    #[test]
    fn test_serde_as_strings() {
        let pattern = TypePattern::parse("field.*").unwrap();
        let json = serde_json::to_string(&pattern).unwrap();
        assert_eq!(json, "\"field.*\"");
        let back: MetaDataTypeId = serde_json::from_str("\"object.pojo\"").unwrap();
        assert_eq!(back, id("object", "pojo"));
    }
}
