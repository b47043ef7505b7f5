//! Label selectors
//!
//! A [`LabelSelector`] is a conjunction of [`Requirement`]s. It renders to
//! the label selector syntax understood by the API server (for server-side
//! list filtering) and evaluates against a label map client-side, with the
//! same semantics:
//!
//! - `in`, `=`, `==`: the label is present and its value is in the set
//! - `notin`, `!=`: the label is absent, or its value is not in the set
//! - `exists` / `!`: presence / absence of the key
//! - `gt`, `lt`: the label is present and parses as an integer greater /
//!   less than the requirement's value
//!
//! Requirements are validated when built: keys must be qualified names,
//! values must be valid label values and the number of values must fit the
//! operator.

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

const QUALIFIED_NAME_MAX_LENGTH: usize = 63;
const LABEL_VALUE_MAX_LENGTH: usize = 63;
const DNS1123_SUBDOMAIN_MAX_LENGTH: usize = 253;

static QUALIFIED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$").expect("qualified name pattern")
});

static LABEL_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9])?$").expect("label value pattern")
});

static DNS1123_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("dns-1123 subdomain pattern")
});

/// Errors raised while building a selector
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectorError {
    /// Key is not a valid qualified name
    #[error("invalid label key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// Value is not a valid label value
    #[error("invalid label value {value:?} for key {key:?}: {reason}")]
    InvalidValue { key: String, value: String, reason: String },

    /// Operator is not one of the supported tokens
    #[error("unknown selector operator {0:?}")]
    UnknownOperator(String),

    /// Number of values does not fit the operator
    #[error("operator {operator} on key {key:?} takes {expected}, got {got}")]
    ValueCount {
        key: String,
        operator: Operator,
        expected: &'static str,
        got: usize,
    },

    /// `gt` / `lt` value is not an integer
    #[error("value {value:?} for key {key:?} must be an integer for operator {operator}")]
    InvalidInteger {
        key: String,
        value: String,
        operator: Operator,
    },
}

/// Selector operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `in`
    In,
    /// `notin`
    NotIn,
    /// `=`
    Equals,
    /// `==`
    DoubleEquals,
    /// `!=`
    NotEquals,
    /// `exists`
    Exists,
    /// `!`
    DoesNotExist,
    /// `gt`
    GreaterThan,
    /// `lt`
    LessThan,
}

impl FromStr for Operator {
    type Err = SelectorError;

    /// Parses the lowercase operator tokens. Callers normalize case first.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(Operator::In),
            "notin" => Ok(Operator::NotIn),
            "=" => Ok(Operator::Equals),
            "==" => Ok(Operator::DoubleEquals),
            "!=" => Ok(Operator::NotEquals),
            "exists" => Ok(Operator::Exists),
            "!" => Ok(Operator::DoesNotExist),
            "gt" => Ok(Operator::GreaterThan),
            "lt" => Ok(Operator::LessThan),
            other => Err(SelectorError::UnknownOperator(other.to_string())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Operator::In => "in",
            Operator::NotIn => "notin",
            Operator::Equals => "=",
            Operator::DoubleEquals => "==",
            Operator::NotEquals => "!=",
            Operator::Exists => "exists",
            Operator::DoesNotExist => "!",
            Operator::GreaterThan => "gt",
            Operator::LessThan => "lt",
        };
        f.write_str(token)
    }
}

/// A single validated label requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    operator: Operator,
    values: Vec<String>,
}

impl Requirement {
    /// Build a requirement, validating key, values and value count.
    pub fn new(
        key: impl Into<String>,
        operator: Operator,
        values: Vec<String>,
    ) -> Result<Self, SelectorError> {
        let key = key.into();
        validate_qualified_name(&key)?;

        let count_error = |expected: &'static str| SelectorError::ValueCount {
            key: key.clone(),
            operator,
            expected,
            got: values.len(),
        };
        match operator {
            Operator::In | Operator::NotIn => {
                if values.is_empty() {
                    return Err(count_error("at least one value"));
                }
            }
            Operator::Equals | Operator::DoubleEquals | Operator::NotEquals => {
                if values.len() != 1 {
                    return Err(count_error("exactly one value"));
                }
            }
            Operator::Exists | Operator::DoesNotExist => {
                if !values.is_empty() {
                    return Err(count_error("no values"));
                }
            }
            Operator::GreaterThan | Operator::LessThan => {
                if values.len() != 1 {
                    return Err(count_error("exactly one value"));
                }
                if values[0].parse::<i64>().is_err() {
                    return Err(SelectorError::InvalidInteger {
                        key,
                        value: values[0].clone(),
                        operator,
                    });
                }
            }
        }

        for value in &values {
            validate_label_value(&key, value)?;
        }

        let mut values = values;
        values.sort();
        values.dedup();
        Ok(Self { key, operator, values })
    }

    /// Label key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Operator
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Sorted, de-duplicated values
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Evaluate the requirement against a label map.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            Operator::In | Operator::Equals | Operator::DoubleEquals => {
                value.is_some_and(|v| self.values.contains(v))
            }
            Operator::NotIn | Operator::NotEquals => {
                value.is_none_or(|v| !self.values.contains(v))
            }
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
            Operator::GreaterThan | Operator::LessThan => {
                let Some(actual) = value.and_then(|v| v.parse::<i64>().ok()) else {
                    return false;
                };
                let Some(bound) = self.values.first().and_then(|v| v.parse::<i64>().ok()) else {
                    return false;
                };
                if self.operator == Operator::GreaterThan {
                    actual > bound
                } else {
                    actual < bound
                }
            }
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
            Operator::Equals | Operator::DoubleEquals | Operator::NotEquals => {
                write!(f, "{}{}{}", self.key, self.operator, self.values.join(""))
            }
            Operator::In | Operator::NotIn => {
                write!(f, "{} {} ({})", self.key, self.operator, self.values.join(","))
            }
            Operator::GreaterThan => write!(f, "{}>{}", self.key, self.values.join("")),
            Operator::LessThan => write!(f, "{}<{}", self.key, self.values.join("")),
        }
    }
}

/// Conjunction of requirements. The empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Selector matching every object.
    pub fn everything() -> Self {
        Self::default()
    }

    /// Selector from already validated requirements.
    pub fn from_requirements(requirements: Vec<Requirement>) -> Self {
        let mut selector = Self::default();
        for requirement in requirements {
            selector.add(requirement);
        }
        selector
    }

    /// Add a requirement, keeping requirements ordered by key.
    pub fn add(&mut self, requirement: Requirement) {
        let index = self
            .requirements
            .partition_point(|r| r.key.as_str() <= requirement.key.as_str());
        self.requirements.insert(index, requirement);
    }

    /// True when the selector has no requirement.
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Requirements ordered by key
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// True when every requirement matches.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.requirements.iter().map(ToString::to_string).collect();
        f.write_str(&rendered.join(","))
    }
}

fn validate_qualified_name(key: &str) -> Result<(), SelectorError> {
    let invalid = |reason: &str| SelectorError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };
    let parts: Vec<&str> = key.split('/').collect();
    let name = match parts.as_slice() {
        [name] => *name,
        [prefix, name] => {
            if prefix.is_empty() {
                return Err(invalid("prefix part must be non-empty"));
            }
            if prefix.len() > DNS1123_SUBDOMAIN_MAX_LENGTH {
                return Err(invalid("prefix part must be no more than 253 characters"));
            }
            if !DNS1123_SUBDOMAIN.is_match(prefix) {
                return Err(invalid("prefix part must be a lowercase RFC 1123 subdomain"));
            }
            *name
        }
        _ => return Err(invalid("a qualified name must have at most one '/'")),
    };
    if name.is_empty() {
        return Err(invalid("name part must be non-empty"));
    }
    if name.len() > QUALIFIED_NAME_MAX_LENGTH {
        return Err(invalid("name part must be no more than 63 characters"));
    }
    if !QUALIFIED_NAME.is_match(name) {
        return Err(invalid(
            "name part must consist of alphanumeric characters, '-', '_' or '.', and must start and end with an alphanumeric character",
        ));
    }
    Ok(())
}

fn validate_label_value(key: &str, value: &str) -> Result<(), SelectorError> {
    let invalid = |reason: &str| SelectorError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };
    if value.len() > LABEL_VALUE_MAX_LENGTH {
        return Err(invalid("must be no more than 63 characters"));
    }
    if !LABEL_VALUE.is_match(value) {
        return Err(invalid(
            "must be empty or consist of alphanumeric characters, '-', '_' or '.', and must start and end with an alphanumeric character",
        ));
    }
    Ok(())
}
