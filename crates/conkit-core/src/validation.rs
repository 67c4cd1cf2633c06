//! Input validation
//!
//! Validators are small typed predicates composed per field. A [`Validator`]
//! collects every failing rule for a value before reporting, so callers see
//! the first problem as an [`Error::Validation`] without any runtime type
//! inspection.

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Longest accepted session id
pub const MAX_SESSION_ID_LEN: usize = 100;

/// Longest accepted conversation message
pub const MAX_MESSAGE_LEN: usize = 10_000;

/// A single named rule over `T`
pub struct Rule<T: ?Sized> {
    message: &'static str,
    check: Box<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T: ?Sized> Rule<T> {
    /// Create a rule that passes when `check` returns true
    pub fn new(message: &'static str, check: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            message,
            check: Box::new(check),
        }
    }
}

/// Ordered list of rules for one field
pub struct Validator<T: ?Sized> {
    field: &'static str,
    rules: Vec<Rule<T>>,
}

impl<T: ?Sized> Validator<T> {
    /// Start a validator for `field`
    #[must_use]
    pub fn new(field: &'static str) -> Self {
        Self {
            field,
            rules: Vec::new(),
        }
    }

    /// Append a rule
    #[must_use]
    pub fn rule(mut self, rule: Rule<T>) -> Self {
        self.rules.push(rule);
        self
    }

    /// All failing rule messages, in rule order
    pub fn failures(&self, value: &T) -> Vec<&'static str> {
        self.rules
            .iter()
            .filter(|r| !(r.check)(value))
            .map(|r| r.message)
            .collect()
    }

    /// Validate, returning the first failure as an error
    pub fn validate(&self, value: &T) -> Result<()> {
        match self.failures(value).first() {
            Some(message) => Err(Error::validation(self.field, *message)),
            None => Ok(()),
        }
    }
}

/// Rule: string is not empty after trimming
pub fn non_empty() -> Rule<str> {
    Rule::new("must not be empty", |s: &str| !s.trim().is_empty())
}

/// Rule: string is at most `max` bytes
pub fn max_len(max: usize, message: &'static str) -> Rule<str> {
    Rule::new(message, move |s: &str| s.len() <= max)
}

/// Rule: string matches `pattern`
pub fn matches(pattern: &'static Regex, message: &'static str) -> Rule<str> {
    Rule::new(message, move |s: &str| pattern.is_match(s))
}

static SESSION_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$")
        .expect("SESSION_ID_REGEX is a compile-time constant")
});

static DNS_LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$")
        .expect("DNS_LABEL_REGEX is a compile-time constant")
});

static LABEL_KEY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([a-z0-9]([-a-z0-9.]{0,251}[a-z0-9])?/)?[A-Za-z0-9]([-A-Za-z0-9_.]{0,61}[A-Za-z0-9])?$",
    )
    .expect("LABEL_KEY_REGEX is a compile-time constant")
});

static LABEL_VALUE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9]([-A-Za-z0-9_.]{0,61}[A-Za-z0-9])?)?$")
        .expect("LABEL_VALUE_REGEX is a compile-time constant")
});

/// Validate a caller-supplied session id
pub fn validate_session_id(id: &str) -> Result<()> {
    Validator::<str>::new("session_id")
        .rule(non_empty())
        .rule(max_len(MAX_SESSION_ID_LEN, "must be at most 100 characters"))
        .rule(matches(
            &SESSION_ID_REGEX,
            "may only contain letters, digits, '.', '_' and '-', starting with a letter or digit",
        ))
        .validate(id)
}

/// Validate a free-form session label
pub fn validate_label(label: &str) -> Result<()> {
    Validator::<str>::new("label")
        .rule(non_empty())
        .rule(max_len(253, "must be at most 253 characters"))
        .rule(Rule::new("must not contain whitespace", |s: &str| {
            !s.chars().any(char::is_whitespace)
        }))
        .validate(label)
}

/// Validate a Kubernetes-style label key/value pair
pub fn validate_k8s_label(key: &str, value: &str) -> Result<()> {
    Validator::<str>::new("k8s_label_key")
        .rule(non_empty())
        .rule(matches(&LABEL_KEY_REGEX, "is not a valid Kubernetes label key"))
        .validate(key)?;
    Validator::<str>::new("k8s_label_value")
        .rule(max_len(63, "must be at most 63 characters"))
        .rule(matches(&LABEL_VALUE_REGEX, "is not a valid Kubernetes label value"))
        .validate(value)
}

/// Validate a Kubernetes resource name (RFC 1123 DNS label)
pub fn validate_dns_label(field: &'static str, name: &str) -> Result<()> {
    Validator::<str>::new(field)
        .rule(non_empty())
        .rule(matches(
            &DNS_LABEL_REGEX,
            "must be lowercase letters, digits and '-', at most 63 characters",
        ))
        .validate(name)
}

/// Whether `name` is a valid DNS label
pub fn is_dns_label(name: &str) -> bool {
    DNS_LABEL_REGEX.is_match(name)
}

/// Validate a conversation message
pub fn validate_message(message: &str) -> Result<()> {
    Validator::<str>::new("message")
        .rule(non_empty())
        .rule(max_len(MAX_MESSAGE_LEN, "is too long (max 10,000 characters)"))
        .validate(message)
}
