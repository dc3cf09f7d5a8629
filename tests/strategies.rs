use proptest::prelude::*;
use rampart::{
    allow, and, chain, deny, not, or, race, rule, CacheMode, Decision, Evaluator, FieldRequest,
    OrPrecedence, RequestScope, Rule,
};

/// Reference model of a rule tree whose leaves have fixed outcomes.
#[derive(Debug, Clone)]
pub enum Model {
    Allow,
    Deny,
    /// A custom predicate leaf returning the given outcome.
    Leaf(bool, CacheMode),
    And(Vec<Model>),
    Or(Vec<Model>),
    Not(Box<Model>),
    Chain(Vec<Model>),
    Race(Vec<Model>),
}

impl Model {
    /// Expected outcome under plain boolean logic.
    pub fn holds(&self) -> bool {
        match self {
            Model::Allow => true,
            Model::Deny => false,
            Model::Leaf(value, _) => *value,
            Model::And(items) | Model::Chain(items) => items.iter().all(Model::holds),
            Model::Or(items) | Model::Race(items) => items.iter().any(Model::holds),
            Model::Not(inner) => !inner.holds(),
        }
    }

    pub fn to_rule(&self) -> Rule<()> {
        fn all(items: &[Model]) -> Vec<Rule<()>> {
            items.iter().map(Model::to_rule).collect()
        }

        match self {
            Model::Allow => allow(),
            Model::Deny => deny(),
            Model::Leaf(value, mode) => {
                let value = *value;
                rule(if value { "yes" } else { "no" })
                    .cache(*mode)
                    .check_sync(move |_| value)
            }
            Model::And(items) => and(all(items)),
            Model::Or(items) => or(all(items)),
            Model::Not(inner) => not(inner.to_rule()),
            Model::Chain(items) => chain(all(items)),
            Model::Race(items) => race(all(items)),
        }
    }
}

fn arb_cache_mode() -> impl Strategy<Value = CacheMode> {
    prop_oneof![
        Just(CacheMode::Contextual),
        Just(CacheMode::Strict),
        Just(CacheMode::None),
    ]
}

fn arb_leaf() -> impl Strategy<Value = Model> {
    prop_oneof![
        Just(Model::Allow),
        Just(Model::Deny),
        (any::<bool>(), arb_cache_mode()).prop_map(|(v, mode)| Model::Leaf(v, mode)),
    ]
}

/// Generate a random rule tree model, up to 4 levels deep.
pub fn arb_model() -> impl Strategy<Value = Model> {
    arb_leaf().prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Model::And),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Model::Or),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Model::Chain),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Model::Race),
            inner.prop_map(|m| Model::Not(Box::new(m))),
        ]
    })
}

/// Evaluate `rule` once in a fresh request on a single-threaded runtime.
pub fn evaluate(rule: &Rule<()>, precedence: OrPrecedence) -> Decision {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let scope = RequestScope::new(());
    runtime.block_on(
        Evaluator::with_or_precedence(precedence).evaluate(
            rule,
            &FieldRequest::new("Query", "f"),
            &scope,
        ),
    )
}
