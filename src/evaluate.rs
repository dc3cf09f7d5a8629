use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};

use crate::cache::CacheKey;
use crate::types::{
    Decision, FieldRequest, Leaf, OrPrecedence, Predicate, RequestScope, Rule, RuleFault,
    RuleInput, RuleNode,
};

/// Runs rule trees against a field request within a request scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Evaluator {
    or_precedence: OrPrecedence,
}

impl Evaluator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_or_precedence(or_precedence: OrPrecedence) -> Self {
        Self { or_precedence }
    }

    #[must_use]
    pub fn or_precedence(&self) -> OrPrecedence {
        self.or_precedence
    }

    /// Evaluate `rule` for `field`, memoizing leaf decisions in the scope's
    /// cache.
    pub async fn evaluate<C>(
        &self,
        rule: &Rule<C>,
        field: &FieldRequest,
        scope: &RequestScope<C>,
    ) -> Decision
    where
        C: Send + Sync + 'static,
    {
        let eval = Evaluation {
            field,
            scope,
            or_precedence: self.or_precedence,
        };
        evaluate_node(rule, &eval).await
    }
}

struct Evaluation<'a, C> {
    field: &'a FieldRequest,
    scope: &'a RequestScope<C>,
    or_precedence: OrPrecedence,
}

fn evaluate_node<'a, C>(rule: &'a Rule<C>, eval: &'a Evaluation<'a, C>) -> BoxFuture<'a, Decision>
where
    C: Send + Sync + 'static,
{
    async move {
        match rule.node() {
            RuleNode::Leaf(leaf) => evaluate_leaf(rule, leaf, eval).await,
            RuleNode::And(children) => all_of(children, eval).await,
            RuleNode::Chain(children) => in_sequence(children, eval).await,
            RuleNode::Or(children) => any_of(children, eval).await,
            RuleNode::Race(children) => first_allow(children, eval).await,
            RuleNode::Not(child) => evaluate_node(child, eval).await.negate(),
        }
    }
    .boxed()
}

async fn evaluate_leaf<C>(rule: &Rule<C>, leaf: &Leaf<C>, eval: &Evaluation<'_, C>) -> Decision
where
    C: Send + Sync + 'static,
{
    let scope = eval.scope;
    let cancellation = scope.cancellation();
    if cancellation.is_cancelled() {
        return Decision::Error(RuleFault::Cancelled);
    }

    let key = CacheKey::for_leaf(
        leaf.cache,
        rule.id(),
        scope.id(),
        eval.field.parent_value(),
        eval.field.args_value(),
    );

    let work = async {
        let Some(key) = key else {
            return invoke(leaf, eval).await;
        };
        let (pending, hit) = scope.cache().entry(key, || invoke(leaf, eval));
        tracing::trace!(
            rule = %leaf.name,
            cache = ?leaf.cache,
            hit,
            request = %scope.id(),
            "rule cache lookup"
        );
        pending.await
    };

    // Losing the select only detaches this caller. The shared evaluation
    // never settles without being polled, so a cancelled one is never cached.
    tokio::select! {
        biased;
        () = cancellation.cancelled() => Decision::Error(RuleFault::Cancelled),
        decision = work => decision,
    }
}

/// Build the predicate's evaluation as an owned future, so it can outlive
/// the composite that started it.
fn invoke<C>(leaf: &Leaf<C>, eval: &Evaluation<'_, C>) -> BoxFuture<'static, Decision>
where
    C: Send + Sync + 'static,
{
    let predicate = match &leaf.predicate {
        Predicate::Constant(true) => return future::ready(Decision::Allow).boxed(),
        Predicate::Constant(false) => return future::ready(Decision::Deny(None)).boxed(),
        Predicate::Custom(predicate) => Arc::clone(predicate),
    };
    let input = RuleInput::new(eval.field, eval.scope);
    let name = leaf.name.clone();

    async move {
        tracing::debug!(rule = %name, field = %input.info(), "invoking predicate");
        let future = match std::panic::catch_unwind(AssertUnwindSafe(|| (*predicate)(input))) {
            Ok(future) => future,
            Err(payload) => return panicked(&name, payload.as_ref()),
        };
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(decision) => decision,
            Err(payload) => panicked(&name, payload.as_ref()),
        }
    }
    .boxed()
}

fn panicked(rule: &str, payload: &(dyn Any + Send)) -> Decision {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned());
    Decision::Error(RuleFault::Panicked {
        rule: rule.to_owned(),
        message,
    })
}

/// Concurrent conjunction; the first non-allow to settle decides. Children
/// still running are no longer awaited, but their cached leaf evaluations
/// stay in the request's cache and are resumed by the next caller.
async fn all_of<C>(children: &[Rule<C>], eval: &Evaluation<'_, C>) -> Decision
where
    C: Send + Sync + 'static,
{
    let mut pending: FuturesUnordered<_> = children
        .iter()
        .map(|child| evaluate_node(child, eval))
        .collect();

    while let Some(decision) = pending.next().await {
        if !decision.is_allowed() {
            return decision;
        }
    }
    Decision::Allow
}

async fn in_sequence<C>(children: &[Rule<C>], eval: &Evaluation<'_, C>) -> Decision
where
    C: Send + Sync + 'static,
{
    for child in children {
        let decision = evaluate_node(child, eval).await;
        if !decision.is_allowed() {
            return decision;
        }
    }
    Decision::Allow
}

/// Concurrent disjunction. When nothing allows, the denial is picked by
/// declared position according to the configured precedence.
async fn any_of<C>(children: &[Rule<C>], eval: &Evaluation<'_, C>) -> Decision
where
    C: Send + Sync + 'static,
{
    let mut pending: FuturesUnordered<_> = children
        .iter()
        .enumerate()
        .map(|(position, child)| evaluate_node(child, eval).map(move |d| (position, d)))
        .collect();

    let mut refusals = Vec::with_capacity(children.len());
    while let Some((position, decision)) = pending.next().await {
        if decision.is_allowed() {
            return Decision::Allow;
        }
        refusals.push((position, decision));
    }

    let chosen = match eval.or_precedence {
        OrPrecedence::Last => refusals.into_iter().max_by_key(|(position, _)| *position),
        OrPrecedence::First => refusals.into_iter().min_by_key(|(position, _)| *position),
    };
    chosen.map_or(Decision::Deny(None), |(_, decision)| decision)
}

async fn first_allow<C>(children: &[Rule<C>], eval: &Evaluation<'_, C>) -> Decision
where
    C: Send + Sync + 'static,
{
    let mut pending: FuturesUnordered<_> = children
        .iter()
        .map(|child| evaluate_node(child, eval))
        .collect();

    let mut first_refusal = None;
    while let Some(decision) = pending.next().await {
        if decision.is_allowed() {
            return Decision::Allow;
        }
        if first_refusal.is_none() {
            first_refusal = Some(decision);
        }
    }
    first_refusal.unwrap_or(Decision::Deny(None))
}
