//! Target patterns for policy rules

use crate::error::{AuthzError, Result};
use crate::types::{AttributeValue, Attributes};
use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a rule selects the subject, resource or action it applies to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchPattern {
    /// Matches everything
    #[default]
    Any,

    /// Exact string equality
    Exact { value: String },

    /// Glob with `*` matching any run of characters, e.g. `document:*`
    Wildcard { pattern: String },

    /// Anchored regular expression
    Regex { pattern: String },

    /// Match on an attribute of the corresponding bag instead of the identifier
    Attribute { attribute: String, value: AttributeValue },
}

impl MatchPattern {
    pub fn exact(value: impl Into<String>) -> Self {
        MatchPattern::Exact { value: value.into() }
    }

    pub fn wildcard(pattern: impl Into<String>) -> Self {
        MatchPattern::Wildcard {
            pattern: pattern.into(),
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        MatchPattern::Regex {
            pattern: pattern.into(),
        }
    }

    pub fn attribute(attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        MatchPattern::Attribute {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Match a value, consulting `bag` for attribute patterns
    pub fn matches(&self, value: &str, bag: &Attributes, regexes: &RegexCache) -> Result<bool> {
        match self {
            MatchPattern::Any => Ok(true),
            MatchPattern::Exact { value: expected } => Ok(expected == value),
            MatchPattern::Wildcard { pattern } => {
                if pattern == "*" {
                    return Ok(true);
                }
                if !pattern.contains('*') {
                    return Ok(pattern == value);
                }
                Ok(regexes.get(&glob_to_regex(pattern))?.is_match(value))
            }
            MatchPattern::Regex { pattern } => Ok(regexes.get(&anchor(pattern))?.is_match(value)),
            MatchPattern::Attribute { attribute, value: expected } => Ok(match (bag.get(attribute), expected) {
                (Some(AttributeValue::List(items)), AttributeValue::String(item)) => items.contains(item),
                (Some(actual), _) => actual == expected,
                (None, _) => false,
            }),
        }
    }

    /// Compile-check the pattern
    pub fn validate(&self, regexes: &RegexCache) -> Result<()> {
        match self {
            MatchPattern::Wildcard { pattern } if pattern.is_empty() => Err(
                AuthzError::InvalidPolicy("wildcard pattern cannot be empty".to_string()),
            ),
            MatchPattern::Wildcard { pattern } if pattern.contains('*') => {
                regexes.get(&glob_to_regex(pattern)).map(|_| ())
            }
            MatchPattern::Regex { pattern } => regexes.get(&anchor(pattern)).map(|_| ()),
            MatchPattern::Attribute { attribute, .. } if attribute.is_empty() => Err(
                AuthzError::InvalidPolicy("attribute pattern needs an attribute name".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

fn glob_to_regex(pattern: &str) -> String {
    format!("^{}$", regex::escape(pattern).replace(r"\*", ".*"))
}

fn anchor(pattern: &str) -> String {
    format!("^(?:{})$", pattern)
}

/// Compiled-regex cache shared by pattern and condition evaluation
#[derive(Debug, Default, Clone)]
pub struct RegexCache {
    compiled: Arc<DashMap<String, Arc<Regex>>>,
}

impl RegexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or compile a regex
    pub fn get(&self, pattern: &str) -> Result<Arc<Regex>> {
        if let Some(regex) = self.compiled.get(pattern) {
            return Ok(Arc::clone(regex.value()));
        }

        let regex = Regex::new(pattern)
            .map_err(|e| AuthzError::InvalidPolicy(format!("invalid regex '{}': {}", pattern, e)))?;
        let regex = Arc::new(regex);
        self.compiled.insert(pattern.to_string(), Arc::clone(&regex));
        Ok(regex)
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}
