//! Declarative field-level authorization for resolver pipelines.
//!
//! Rules are composed into a [`RuleTree`] keyed by `(type, field)`. A
//! [`Shield`] sits in front of each resolver, evaluates the matching rule
//! against a per-request [`RequestScope`], and either lets the resolver run
//! or refuses the field according to its [`DenyPolicy`].

mod build;
mod cache;
mod error;
mod evaluate;
pub mod parse;
mod shield;
mod types;

pub use cache::{CacheStats, RuleCache};
pub use error::RampartError;
pub use evaluate::Evaluator;
pub use shield::{Denial, DenialKind, FieldOutcome, Shield, ShieldError};
pub use types::{
    BuildError, CacheMode, CancellationToken, Decision, DefaultPolicy, DenyPolicy, FieldInfo,
    FieldRequest, IntoDecision, LeafBuilder, OrPrecedence, PolicyExpr, PolicyTarget, RequestId,
    RequestScope, Rule, RuleFault, RuleId, RuleInput, RuleRegistry, RuleSource, RuleTree,
    RuleTreeBuilder, ShieldOptions, TypeRules, allow, and, chain, deny, not, or, race, rule,
};
