use std::collections::HashMap;
use std::fmt;

use super::error::BuildError;
use super::options::DefaultPolicy;
use super::registry::RuleRegistry;
use super::rule::Rule;

/// Builder for constructing a [`RuleTree`].
///
/// Entries are collected as given and validated by [`build()`](Self::build),
/// so registration order never changes the outcome.
///
/// # Example
///
/// ```
/// use rampart::{allow, rule, DefaultPolicy, RuleTreeBuilder};
///
/// let is_authenticated = rule("isAuthenticated")
///     .check_sync(|input: &rampart::RuleInput<Option<u64>>| input.context().is_some());
///
/// let tree = RuleTreeBuilder::new()
///     .default_policy(DefaultPolicy::DenyByDefault)
///     .rules("Query", |t| {
///         t.field("me", is_authenticated.clone())
///             .field("feed", allow())
///     })
///     .field("Mutation", "createDraft", is_authenticated)
///     .build()
///     .unwrap();
///
/// assert_eq!(tree.len(), 3);
/// ```
pub struct RuleTreeBuilder<C> {
    pub(crate) fields: Vec<(String, String, Rule<C>)>,
    pub(crate) type_fallbacks: Vec<(String, Rule<C>)>,
    pub(crate) fallbacks: Vec<Rule<C>>,
    pub(crate) default_policy: DefaultPolicy,
}

/// Intermediate builder passed to [`RuleTreeBuilder::rules()`]; scoped to one
/// parent type.
pub struct TypeRules<C> {
    fields: Vec<(String, Rule<C>)>,
    fallbacks: Vec<Rule<C>>,
}

impl<C> RuleTreeBuilder<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            type_fallbacks: Vec::new(),
            fallbacks: Vec::new(),
            default_policy: DefaultPolicy::default(),
        }
    }

    /// Map `parent_type.field` to `rule`.
    #[must_use]
    pub fn field(mut self, parent_type: &str, field: &str, rule: Rule<C>) -> Self {
        self.fields
            .push((parent_type.to_owned(), field.to_owned(), rule));
        self
    }

    /// Define the rules of one parent type.
    #[must_use]
    pub fn rules(mut self, parent_type: &str, f: impl FnOnce(TypeRules<C>) -> TypeRules<C>) -> Self {
        let rules = f(TypeRules {
            fields: Vec::new(),
            fallbacks: Vec::new(),
        });
        for (field, rule) in rules.fields {
            self.fields.push((parent_type.to_owned(), field, rule));
        }
        for rule in rules.fallbacks {
            self.type_fallbacks.push((parent_type.to_owned(), rule));
        }
        self
    }

    /// Rule for fields of `parent_type` that have no entry of their own.
    #[must_use]
    pub fn type_fallback(mut self, parent_type: &str, rule: Rule<C>) -> Self {
        self.type_fallbacks.push((parent_type.to_owned(), rule));
        self
    }

    /// Rule for fields of any type that match neither an entry nor a type
    /// fallback.
    #[must_use]
    pub fn fallback(mut self, rule: Rule<C>) -> Self {
        self.fallbacks.push(rule);
        self
    }

    #[must_use]
    pub fn default_policy(mut self, policy: DefaultPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Validate the entries and freeze them into a `RuleTree`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if a key is registered twice with different
    /// rules or a name is empty.
    pub fn build(self) -> Result<RuleTree<C>, BuildError> {
        crate::build::build(self)
    }
}

impl<C> Default for RuleTreeBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> TypeRules<C> {
    #[must_use]
    pub fn field(mut self, field: &str, rule: Rule<C>) -> Self {
        self.fields.push((field.to_owned(), rule));
        self
    }

    #[must_use]
    pub fn fallback(mut self, rule: Rule<C>) -> Self {
        self.fallbacks.push(rule);
        self
    }
}

/// Where [`RuleTree::lookup()`] found the rule for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSource {
    Field,
    TypeFallback,
    Fallback,
    DefaultPolicy,
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleSource::Field => "field",
            RuleSource::TypeFallback => "type fallback",
            RuleSource::Fallback => "fallback",
            RuleSource::DefaultPolicy => "default policy",
        };
        f.write_str(s)
    }
}

/// A compiled, immutable rule tree. Thread-safe and designed to live behind
/// `Arc`.
pub struct RuleTree<C> {
    pub(crate) fields: HashMap<String, HashMap<String, Rule<C>>>,
    pub(crate) type_fallbacks: HashMap<String, Rule<C>>,
    pub(crate) fallback: Option<Rule<C>>,
    pub(crate) default_policy: DefaultPolicy,
    /// Materialized default-policy leaf.
    pub(crate) default_rule: Rule<C>,
}

impl<C> RuleTree<C> {
    #[must_use]
    pub fn builder() -> RuleTreeBuilder<C> {
        RuleTreeBuilder::new()
    }

    /// The rule applicable to `parent_type.field`.
    #[must_use]
    pub fn resolve(&self, parent_type: &str, field: &str) -> &Rule<C> {
        self.lookup(parent_type, field).0
    }

    /// Like [`resolve()`](Self::resolve), also reporting which tier matched.
    ///
    /// Tiers are tried in order: exact entry, type fallback, global
    /// fallback, default policy.
    #[must_use]
    pub fn lookup(&self, parent_type: &str, field: &str) -> (&Rule<C>, RuleSource) {
        if let Some(rule) = self
            .fields
            .get(parent_type)
            .and_then(|fields| fields.get(field))
        {
            return (rule, RuleSource::Field);
        }
        if let Some(rule) = self.type_fallbacks.get(parent_type) {
            return (rule, RuleSource::TypeFallback);
        }
        if let Some(rule) = &self.fallback {
            return (rule, RuleSource::Fallback);
        }
        (&self.default_rule, RuleSource::DefaultPolicy)
    }

    #[must_use]
    pub fn default_policy(&self) -> DefaultPolicy {
        self.default_policy
    }

    /// Number of exact (type, field) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.values().map(HashMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All exact entries as `(parent_type, field)`, sorted.
    #[must_use]
    pub fn fields(&self) -> Vec<(&str, &str)> {
        let mut out: Vec<(&str, &str)> = self
            .fields
            .iter()
            .flat_map(|(ty, fields)| {
                fields
                    .keys()
                    .map(move |field| (ty.as_str(), field.as_str()))
            })
            .collect();
        out.sort_unstable();
        out
    }

    /// Parse a policy DSL string and compile it against `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`RampartError`](crate::RampartError) on parse or build
    /// failure.
    pub fn from_dsl(input: &str, registry: &RuleRegistry<C>) -> Result<Self, crate::RampartError> {
        let parsed = crate::parse::parse(input)?;
        let tree = crate::build::compile_policy(parsed, registry)?.build()?;
        Ok(tree)
    }

    /// Read a policy DSL file and compile it against `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`RampartError`](crate::RampartError) on I/O, parse, or build
    /// failure.
    pub fn from_file(
        path: impl AsRef<std::path::Path>,
        registry: &RuleRegistry<C>,
    ) -> Result<Self, crate::RampartError> {
        let input = std::fs::read_to_string(path)?;
        Self::from_dsl(&input, registry)
    }
}

impl<C> fmt::Display for RuleTree<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let policy = match self.default_policy {
            DefaultPolicy::AllowByDefault => "allow",
            DefaultPolicy::DenyByDefault => "deny",
        };
        write!(
            f,
            "RuleTree({} fields, {} type fallbacks, fallback: {}, default: {policy})",
            self.len(),
            self.type_fallbacks.len(),
            if self.fallback.is_some() { "yes" } else { "no" },
        )
    }
}

impl<C> fmt::Debug for RuleTree<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleTree")
            .field("fields", &self.fields)
            .field("type_fallbacks", &self.type_fallbacks)
            .field("fallback", &self.fallback)
            .field("default_policy", &self.default_policy)
            .finish()
    }
}
