use std::fmt;

/// Rule expression as written in a policy document. Rule names are strings;
/// they are resolved against a [`RuleRegistry`](super::RuleRegistry) when the
/// document is compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyExpr {
    Ref(String),
    Allow,
    Deny,
    And(Vec<PolicyExpr>),
    Or(Vec<PolicyExpr>),
    Not(Box<PolicyExpr>),
    Chain(Vec<PolicyExpr>),
    Race(Vec<PolicyExpr>),
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[PolicyExpr], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for PolicyExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyExpr::Ref(name) => write!(f, "{name}"),
            PolicyExpr::Allow => write!(f, "allow"),
            PolicyExpr::Deny => write!(f, "deny"),
            PolicyExpr::And(items) => {
                write!(f, "(")?;
                write_list(f, items, " AND ")?;
                write!(f, ")")
            }
            PolicyExpr::Or(items) => {
                write!(f, "(")?;
                write_list(f, items, " OR ")?;
                write!(f, ")")
            }
            PolicyExpr::Not(inner) => write!(f, "(NOT {inner})"),
            PolicyExpr::Chain(items) => {
                write!(f, "chain(")?;
                write_list(f, items, ", ")?;
                write!(f, ")")
            }
            PolicyExpr::Race(items) => {
                write!(f, "race(")?;
                write_list(f, items, ", ")?;
                write!(f, ")")
            }
        }
    }
}

/// Left-hand side of a policy statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyTarget {
    /// `Type.field`
    Field { parent_type: String, field: String },
    /// `Type.*`
    Type(String),
    /// `fallback`
    Fallback,
}

impl fmt::Display for PolicyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyTarget::Field { parent_type, field } => write!(f, "{parent_type}.{field}"),
            PolicyTarget::Type(parent_type) => write!(f, "{parent_type}.*"),
            PolicyTarget::Fallback => write!(f, "fallback"),
        }
    }
}
