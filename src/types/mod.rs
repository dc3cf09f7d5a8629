mod decision;
mod error;
mod expr;
mod options;
mod registry;
mod request;
mod rule;
mod rule_tree;

pub use decision::{Decision, IntoDecision, RuleFault};
pub use error::BuildError;
pub use expr::{PolicyExpr, PolicyTarget};
pub use options::{DefaultPolicy, DenyPolicy, OrPrecedence, ShieldOptions};
pub use registry::RuleRegistry;
pub use request::{CancellationToken, FieldInfo, FieldRequest, RequestId, RequestScope, RuleInput};
pub use rule::{
    CacheMode, LeafBuilder, Rule, RuleId, allow, and, chain, deny, not, or, race, rule,
};
pub use rule_tree::{RuleSource, RuleTree, RuleTreeBuilder, TypeRules};

pub(crate) use rule::{Leaf, Predicate, RuleNode};
