//! Attribute-based access control
//!
//! Rules target subjects, resources and actions with [`MatchPattern`]s and
//! optionally guard on a [`PolicyCondition`] over the request's
//! [`AttributeBags`]. The highest matching priority tier decides, with deny
//! winning ties.

pub mod attributes;
pub mod condition;
pub mod evaluator;
pub mod pattern;
pub mod rule;
pub mod store;

pub use attributes::{AttributeBags, ScopeUsage};
pub use condition::{Operand, Operator, PolicyCondition};
pub use evaluator::PolicyEvaluator;
pub use pattern::{MatchPattern, RegexCache};
pub use rule::{PolicyEffect, PolicyRule};
pub use store::{InMemoryPolicyStore, PolicyStore};
