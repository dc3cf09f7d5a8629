use super::rule::Rule;

/// Named rules that a policy DSL document can reference.
///
/// Every reference to a name resolves to a clone of the same registered
/// rule, so a rule used by many fields keeps a single identity and is
/// evaluated once per request.
pub struct RuleRegistry<C> {
    pub(crate) entries: Vec<(String, Rule<C>)>,
}

impl<C> RuleRegistry<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register `rule` under its own name.
    #[must_use]
    pub fn register(self, rule: Rule<C>) -> Self {
        let name = rule.name().to_owned();
        self.with(&name, rule)
    }

    /// Register `rule` under `name`.
    #[must_use]
    pub fn with(mut self, name: &str, rule: Rule<C>) -> Self {
        self.entries.push((name.to_owned(), rule));
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Rule<C>> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }
}

impl<C> Default for RuleRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
