use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::parse::ParsedPolicy;
use crate::types::{
    BuildError, DefaultPolicy, PolicyExpr, PolicyTarget, Rule, RuleRegistry, RuleTree,
    RuleTreeBuilder,
};
use crate::{allow, and, chain, deny, not, or, race};

pub(crate) fn build<C>(builder: RuleTreeBuilder<C>) -> Result<RuleTree<C>, BuildError> {
    let RuleTreeBuilder {
        fields: entries,
        type_fallbacks: fallback_entries,
        fallbacks,
        default_policy,
    } = builder;

    let fields = collect_fields(entries)?;
    let type_fallbacks = collect_type_fallbacks(fallback_entries)?;
    let fallback = single_fallback(fallbacks)?;

    let default_rule = match default_policy {
        DefaultPolicy::AllowByDefault => allow(),
        DefaultPolicy::DenyByDefault => deny(),
    };

    Ok(RuleTree {
        fields,
        type_fallbacks,
        fallback,
        default_policy,
        default_rule,
    })
}

fn check_name(what: &'static str, name: &str, target: impl FnOnce() -> String) -> Result<(), BuildError> {
    if name.trim().is_empty() {
        return Err(BuildError::EmptyName {
            what,
            target: target(),
        });
    }
    Ok(())
}

/// Registering the same rule twice for a key is harmless; two different
/// rules for one key is ambiguous and rejected.
fn collect_fields<C>(
    entries: Vec<(String, String, Rule<C>)>,
) -> Result<HashMap<String, HashMap<String, Rule<C>>>, BuildError> {
    let mut fields: HashMap<String, HashMap<String, Rule<C>>> = HashMap::new();
    for (parent_type, field, rule) in entries {
        check_name("type", &parent_type, || format!("{parent_type}.{field}"))?;
        check_name("field", &field, || format!("{parent_type}.{field}"))?;

        let by_field = fields.entry(parent_type.clone()).or_default();
        match by_field.entry(field) {
            Entry::Vacant(slot) => {
                slot.insert(rule);
            }
            Entry::Occupied(existing) if existing.get().id() != rule.id() => {
                return Err(BuildError::ConflictingFieldRule {
                    parent_type,
                    field: existing.key().clone(),
                });
            }
            Entry::Occupied(_) => {}
        }
    }
    Ok(fields)
}

fn collect_type_fallbacks<C>(
    entries: Vec<(String, Rule<C>)>,
) -> Result<HashMap<String, Rule<C>>, BuildError> {
    let mut fallbacks: HashMap<String, Rule<C>> = HashMap::new();
    for (parent_type, rule) in entries {
        check_name("type", &parent_type, || format!("{parent_type}.*"))?;
        match fallbacks.entry(parent_type) {
            Entry::Vacant(slot) => {
                slot.insert(rule);
            }
            Entry::Occupied(existing) if existing.get().id() != rule.id() => {
                return Err(BuildError::ConflictingTypeFallback {
                    parent_type: existing.key().clone(),
                });
            }
            Entry::Occupied(_) => {}
        }
    }
    Ok(fallbacks)
}

fn single_fallback<C>(fallbacks: Vec<Rule<C>>) -> Result<Option<Rule<C>>, BuildError> {
    let mut chosen: Option<Rule<C>> = None;
    for rule in fallbacks {
        match &chosen {
            Some(existing) if existing.id() != rule.id() => {
                return Err(BuildError::ConflictingFallback);
            }
            Some(_) => {}
            None => chosen = Some(rule),
        }
    }
    Ok(chosen)
}

/// Resolve a parsed policy document's rule references against `registry`
/// and turn its statements into builder entries.
pub(crate) fn compile_policy<C>(
    parsed: ParsedPolicy,
    registry: &RuleRegistry<C>,
) -> Result<RuleTreeBuilder<C>, BuildError> {
    let lowering = Lowering {
        named: index_registry(registry)?,
        allow: allow(),
        deny: deny(),
    };

    let mut builder = RuleTreeBuilder::new();
    if let Some(policy) = single_default(&parsed.defaults)? {
        builder = builder.default_policy(policy);
    }

    // Identical statement bodies compile to one rule, so repeating an
    // entry verbatim is not a conflict.
    let mut compiled: Vec<(&PolicyExpr, Rule<C>)> = Vec::new();
    for (target, expr) in &parsed.rules {
        let rule = match compiled.iter().find(|(seen, _)| *seen == expr) {
            Some((_, rule)) => rule.clone(),
            None => {
                let rule = lowering.lower(expr, target)?;
                compiled.push((expr, rule.clone()));
                rule
            }
        };
        builder = match target {
            PolicyTarget::Field { parent_type, field } => builder.field(parent_type, field, rule),
            PolicyTarget::Type(parent_type) => builder.type_fallback(parent_type, rule),
            PolicyTarget::Fallback => builder.fallback(rule),
        };
    }
    Ok(builder)
}

fn index_registry<C>(registry: &RuleRegistry<C>) -> Result<HashMap<&str, &Rule<C>>, BuildError> {
    let mut named = HashMap::new();
    for (name, rule) in &registry.entries {
        if named.insert(name.as_str(), rule).is_some() {
            return Err(BuildError::DuplicateRule { name: name.clone() });
        }
    }
    Ok(named)
}

fn single_default(defaults: &[DefaultPolicy]) -> Result<Option<DefaultPolicy>, BuildError> {
    let Some((&first, rest)) = defaults.split_first() else {
        return Ok(None);
    };
    if rest.iter().any(|&p| p != first) {
        return Err(BuildError::ConflictingDefaultPolicy);
    }
    Ok(Some(first))
}

/// Name resolution for one policy document. The `allow`/`deny` literals
/// share one rule each.
struct Lowering<'r, C> {
    named: HashMap<&'r str, &'r Rule<C>>,
    allow: Rule<C>,
    deny: Rule<C>,
}

impl<C> Lowering<'_, C> {
    fn lower(&self, expr: &PolicyExpr, target: &PolicyTarget) -> Result<Rule<C>, BuildError> {
        let lower_all = |items: &[PolicyExpr]| -> Result<Vec<Rule<C>>, BuildError> {
            items.iter().map(|e| self.lower(e, target)).collect()
        };

        Ok(match expr {
            PolicyExpr::Ref(name) => self
                .named
                .get(name.as_str())
                .map(|&rule| rule.clone())
                .ok_or_else(|| BuildError::UndefinedRule {
                    name: name.clone(),
                    target: target.to_string(),
                })?,
            PolicyExpr::Allow => self.allow.clone(),
            PolicyExpr::Deny => self.deny.clone(),
            PolicyExpr::And(items) => and(lower_all(items)?),
            PolicyExpr::Or(items) => or(lower_all(items)?),
            PolicyExpr::Not(inner) => not(self.lower(inner, target)?),
            PolicyExpr::Chain(items) => chain(lower_all(items)?),
            PolicyExpr::Race(items) => race(lower_all(items)?),
        })
    }
}
