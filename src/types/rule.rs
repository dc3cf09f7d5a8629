use std::fmt;
use std::future::Future;
use std::ops::Not;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use super::decision::{Decision, IntoDecision};
use super::request::RuleInput;

static NEXT_RULE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a rule node, assigned once at construction.
///
/// Clones of a [`Rule`] share the id; separately constructed rules never do,
/// even when their predicates are identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(u64);

impl RuleId {
    fn next() -> Self {
        RuleId(NEXT_RULE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a leaf's decisions are memoized within one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// One evaluation per request, regardless of parent and arguments.
    #[default]
    Contextual,
    /// One evaluation per request for each distinct (parent, args) pair.
    Strict,
    /// Evaluated on every call.
    None,
}

pub(crate) type BoxedPredicate<C> =
    Arc<dyn Fn(RuleInput<C>) -> BoxFuture<'static, Decision> + Send + Sync>;

pub(crate) enum Predicate<C> {
    Constant(bool),
    Custom(BoxedPredicate<C>),
}

pub(crate) struct Leaf<C> {
    pub(crate) name: String,
    pub(crate) cache: CacheMode,
    pub(crate) predicate: Predicate<C>,
}

pub(crate) enum RuleNode<C> {
    Leaf(Leaf<C>),
    And(Vec<Rule<C>>),
    Or(Vec<Rule<C>>),
    Not(Rule<C>),
    Chain(Vec<Rule<C>>),
    Race(Vec<Rule<C>>),
}

struct RuleInner<C> {
    id: RuleId,
    node: RuleNode<C>,
}

/// A node of the authorization expression tree.
///
/// Leaves are built with [`rule()`]; composites with [`and()`], [`or()`],
/// [`not()`], [`chain()`] and [`race()`]. Cloning is cheap and preserves
/// identity, so the same leaf mapped to many fields is evaluated once per
/// request.
pub struct Rule<C> {
    inner: Arc<RuleInner<C>>,
}

impl<C> Rule<C> {
    fn from_node(node: RuleNode<C>) -> Self {
        Self {
            inner: Arc::new(RuleInner {
                id: RuleId::next(),
                node,
            }),
        }
    }

    fn constant(name: &str, value: bool) -> Self {
        Self::from_node(RuleNode::Leaf(Leaf {
            name: name.to_owned(),
            cache: CacheMode::None,
            predicate: Predicate::Constant(value),
        }))
    }

    #[must_use]
    pub fn id(&self) -> RuleId {
        self.inner.id
    }

    /// The leaf's name, or the combinator name for composites.
    #[must_use]
    pub fn name(&self) -> &str {
        match &self.inner.node {
            RuleNode::Leaf(leaf) => &leaf.name,
            RuleNode::And(_) => "and",
            RuleNode::Or(_) => "or",
            RuleNode::Not(_) => "not",
            RuleNode::Chain(_) => "chain",
            RuleNode::Race(_) => "race",
        }
    }

    /// The leaf's cache mode; `None` for composites, which are never cached.
    #[must_use]
    pub fn cache_mode(&self) -> Option<CacheMode> {
        match &self.inner.node {
            RuleNode::Leaf(leaf) => Some(leaf.cache),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self.inner.node, RuleNode::Leaf(_))
    }

    pub(crate) fn node(&self) -> &RuleNode<C> {
        &self.inner.node
    }

    #[must_use]
    pub fn and(self, other: Rule<C>) -> Rule<C> {
        and([self, other])
    }

    #[must_use]
    pub fn or(self, other: Rule<C>) -> Rule<C> {
        or([self, other])
    }
}

impl<C> Clone for Rule<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> Not for Rule<C> {
    type Output = Rule<C>;

    fn not(self) -> Rule<C> {
        not(self)
    }
}

fn write_children<C>(f: &mut fmt::Formatter<'_>, name: &str, children: &[Rule<C>]) -> fmt::Result {
    write!(f, "{name}(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{child}")?;
    }
    write!(f, ")")
}

impl<C> fmt::Display for Rule<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.node {
            RuleNode::Leaf(leaf) => write!(f, "{}", leaf.name),
            RuleNode::And(children) => write_children(f, "and", children),
            RuleNode::Or(children) => write_children(f, "or", children),
            RuleNode::Not(child) => write!(f, "not({child})"),
            RuleNode::Chain(children) => write_children(f, "chain", children),
            RuleNode::Race(children) => write_children(f, "race", children),
        }
    }
}

impl<C> fmt::Debug for Rule<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rule({} {self})", self.inner.id)
    }
}

/// Intermediate builder for leaf rules. Created by [`rule()`]; requires
/// [`check()`](Self::check) or [`check_sync()`](Self::check_sync) to produce
/// a [`Rule`].
#[derive(Debug, Clone)]
pub struct LeafBuilder {
    name: String,
    cache: CacheMode,
}

impl LeafBuilder {
    #[must_use]
    pub fn cache(mut self, mode: CacheMode) -> Self {
        self.cache = mode;
        self
    }

    /// Finish the leaf with an async predicate.
    #[must_use]
    pub fn check<C, F, Fut, O>(self, predicate: F) -> Rule<C>
    where
        F: Fn(RuleInput<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send + 'static,
        O: IntoDecision,
    {
        let name: Arc<str> = Arc::from(self.name.as_str());
        let boxed: BoxedPredicate<C> = Arc::new(move |input| {
            let name = Arc::clone(&name);
            predicate(input)
                .map(move |out| out.into_decision(&name))
                .boxed()
        });
        Rule::from_node(RuleNode::Leaf(Leaf {
            name: self.name,
            cache: self.cache,
            predicate: Predicate::Custom(boxed),
        }))
    }

    /// Finish the leaf with a predicate that never suspends.
    #[must_use]
    pub fn check_sync<C, F, O>(self, predicate: F) -> Rule<C>
    where
        F: Fn(&RuleInput<C>) -> O + Send + Sync + 'static,
        O: IntoDecision + Send + 'static,
    {
        self.check(move |input: RuleInput<C>| {
            let out = predicate(&input);
            futures::future::ready(out)
        })
    }
}

/// Start a leaf rule. The cache mode defaults to [`CacheMode::Contextual`].
#[must_use]
pub fn rule(name: &str) -> LeafBuilder {
    LeafBuilder {
        name: name.to_owned(),
        cache: CacheMode::default(),
    }
}

/// A leaf that always allows.
#[must_use]
pub fn allow<C>() -> Rule<C> {
    Rule::constant("allow", true)
}

/// A leaf that always denies without a reason.
#[must_use]
pub fn deny<C>() -> Rule<C> {
    Rule::constant("deny", false)
}

/// Allows iff every child allows. Children are evaluated concurrently.
#[must_use]
pub fn and<C>(children: impl IntoIterator<Item = Rule<C>>) -> Rule<C> {
    Rule::from_node(RuleNode::And(children.into_iter().collect()))
}

/// Allows iff any child allows. Children are evaluated concurrently.
#[must_use]
pub fn or<C>(children: impl IntoIterator<Item = Rule<C>>) -> Rule<C> {
    Rule::from_node(RuleNode::Or(children.into_iter().collect()))
}

#[must_use]
pub fn not<C>(child: Rule<C>) -> Rule<C> {
    Rule::from_node(RuleNode::Not(child))
}

/// Like [`and()`], but child N+1 only starts after child N has allowed.
#[must_use]
pub fn chain<C>(children: impl IntoIterator<Item = Rule<C>>) -> Rule<C> {
    Rule::from_node(RuleNode::Chain(children.into_iter().collect()))
}

/// The first child to settle with an allow wins.
#[must_use]
pub fn race<C>(children: impl IntoIterator<Item = Rule<C>>) -> Rule<C> {
    Rule::from_node(RuleNode::Race(children.into_iter().collect()))
}
