//! Boolean conditions over attribute bags
//!
//! Conditions are a closed tree of `all` / `any` / `not` combinators over
//! `compare` leaves, serialized as externally tagged JSON:
//!
//! ```json
//! {"all": [
//!   {"compare": {"attribute": "subject.department", "op": "eq",
//!                "operand": {"ref": "resource.department"}}},
//!   {"compare": {"attribute": "environment.hour", "op": "lt",
//!                "operand": {"value": 18}}}
//! ]}
//! ```
//!
//! A comparison whose attribute is missing is indeterminate, for every
//! operator including `ne`. Indeterminate stays indeterminate under `not`,
//! is absorbed only by a decisive sibling (`false` in `all`, `true` in
//! `any`), and fails the condition as a whole. Comparing values of
//! incompatible kinds is an evaluation error.

use super::attributes::{AttributeBags, ScopeUsage};
use super::pattern::RegexCache;
use crate::error::{AuthzError, Result};
use crate::types::AttributeValue;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Left string is an element of the right list
    In,
    /// Left list contains the right string, or left string contains right substring
    Contains,
    /// Left string matches the right regex (anchored)
    Matches,
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operand {
    /// Literal value
    Value(AttributeValue),

    /// Another attribute, by path
    #[serde(rename = "ref")]
    Reference(String),
}

/// Condition tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyCondition {
    All(Vec<PolicyCondition>),
    Any(Vec<PolicyCondition>),
    Not(Box<PolicyCondition>),
    Compare {
        attribute: String,
        op: Operator,
        operand: Operand,
    },
}

impl PolicyCondition {
    /// Compare an attribute against a literal
    pub fn compare(attribute: impl Into<String>, op: Operator, value: impl Into<AttributeValue>) -> Self {
        PolicyCondition::Compare {
            attribute: attribute.into(),
            op,
            operand: Operand::Value(value.into()),
        }
    }

    /// Compare two attributes
    pub fn compare_ref(attribute: impl Into<String>, op: Operator, other: impl Into<String>) -> Self {
        PolicyCondition::Compare {
            attribute: attribute.into(),
            op,
            operand: Operand::Reference(other.into()),
        }
    }

    pub fn negate(condition: PolicyCondition) -> Self {
        PolicyCondition::Not(Box::new(condition))
    }

    /// Evaluate against the request's attribute bags
    pub fn evaluate(&self, bags: &AttributeBags, regexes: &RegexCache) -> Result<bool> {
        Ok(self.evaluate_partial(bags, regexes)?.unwrap_or(false))
    }

    /// `None` when the outcome hinges on a missing attribute
    fn evaluate_partial(&self, bags: &AttributeBags, regexes: &RegexCache) -> Result<Option<bool>> {
        match self {
            PolicyCondition::All(conditions) => {
                let mut indeterminate = false;
                for condition in conditions {
                    match condition.evaluate_partial(bags, regexes)? {
                        Some(false) => return Ok(Some(false)),
                        Some(true) => {}
                        None => indeterminate = true,
                    }
                }
                Ok((!indeterminate).then_some(true))
            }
            PolicyCondition::Any(conditions) => {
                let mut indeterminate = false;
                for condition in conditions {
                    match condition.evaluate_partial(bags, regexes)? {
                        Some(true) => return Ok(Some(true)),
                        Some(false) => {}
                        None => indeterminate = true,
                    }
                }
                Ok((!indeterminate).then_some(false))
            }
            PolicyCondition::Not(inner) => Ok(inner.evaluate_partial(bags, regexes)?.map(|value| !value)),
            PolicyCondition::Compare {
                attribute,
                op,
                operand,
            } => {
                let Some(left) = bags.lookup(attribute) else {
                    return Ok(None);
                };
                let right = match operand {
                    Operand::Value(value) => value,
                    Operand::Reference(path) => match bags.lookup(path) {
                        Some(value) => value,
                        None => return Ok(None),
                    },
                };
                compare(*op, left, right, regexes)
                    .map(Some)
                    .map_err(|e| AuthzError::Evaluation(format!("{}: {}", attribute, e)))
            }
        }
    }

    /// Record every bag the condition reads
    pub fn collect_scopes(&self, usage: &mut ScopeUsage) {
        match self {
            PolicyCondition::All(conditions) | PolicyCondition::Any(conditions) => {
                conditions.iter().for_each(|c| c.collect_scopes(usage))
            }
            PolicyCondition::Not(inner) => inner.collect_scopes(usage),
            PolicyCondition::Compare {
                attribute, operand, ..
            } => {
                usage.add_path(attribute);
                if let Operand::Reference(path) = operand {
                    usage.add_path(path);
                }
            }
        }
    }

    /// Check paths and literal regexes at definition time
    pub fn validate(&self, regexes: &RegexCache) -> Result<()> {
        match self {
            PolicyCondition::All(conditions) | PolicyCondition::Any(conditions) => {
                conditions.iter().try_for_each(|c| c.validate(regexes))
            }
            PolicyCondition::Not(inner) => inner.validate(regexes),
            PolicyCondition::Compare {
                attribute,
                op,
                operand,
            } => {
                check_path(attribute)?;
                match operand {
                    Operand::Reference(path) => check_path(path),
                    Operand::Value(AttributeValue::String(pattern)) if *op == Operator::Matches => {
                        regexes.get(&anchor(pattern)).map(|_| ())
                    }
                    Operand::Value(value) if *op == Operator::Matches => Err(AuthzError::InvalidPolicy(
                        format!("'matches' needs a string pattern, got {}", value.kind()),
                    )),
                    Operand::Value(_) => Ok(()),
                }
            }
        }
    }
}

fn check_path(path: &str) -> Result<()> {
    if AttributeBags::is_valid_path(path) {
        Ok(())
    } else {
        Err(AuthzError::InvalidPolicy(format!(
            "attribute path '{}' must start with subject., resource. or environment.",
            path
        )))
    }
}

fn anchor(pattern: &str) -> String {
    format!("^(?:{})$", pattern)
}

fn incompatible(op: Operator, left: &AttributeValue, right: &AttributeValue) -> AuthzError {
    AuthzError::Evaluation(format!(
        "cannot apply {:?} to {} and {}",
        op,
        left.kind(),
        right.kind()
    ))
}

fn compare(op: Operator, left: &AttributeValue, right: &AttributeValue, regexes: &RegexCache) -> Result<bool> {
    use AttributeValue as V;

    match op {
        Operator::Eq | Operator::Ne => {
            if left.kind() != right.kind() {
                return Err(incompatible(op, left, right));
            }
            Ok((left == right) == (op == Operator::Eq))
        }
        Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
            let ordering = match (left, right) {
                (V::Number(a), V::Number(b)) => a.partial_cmp(b),
                (V::String(a), V::String(b)) => Some(a.cmp(b)),
                _ => return Err(incompatible(op, left, right)),
            };
            let Some(ordering) = ordering else {
                return Ok(false);
            };
            Ok(match op {
                Operator::Gt => ordering == Ordering::Greater,
                Operator::Gte => ordering != Ordering::Less,
                Operator::Lt => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            })
        }
        Operator::In => match (left, right) {
            (V::String(item), V::List(items)) => Ok(items.contains(item)),
            _ => Err(incompatible(op, left, right)),
        },
        Operator::Contains => match (left, right) {
            (V::List(items), V::String(item)) => Ok(items.contains(item)),
            (V::String(haystack), V::String(needle)) => Ok(haystack.contains(needle.as_str())),
            _ => Err(incompatible(op, left, right)),
        },
        Operator::Matches => match (left, right) {
            (V::String(value), V::String(pattern)) => Ok(regexes.get(&anchor(pattern))?.is_match(value)),
            _ => Err(incompatible(op, left, right)),
        },
    }
}
