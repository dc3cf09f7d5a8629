use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Failure of a rule evaluation itself, as opposed to a refusal.
///
/// Cloneable so it can be stored in the request cache and handed to every
/// field that shares the failing rule.
#[derive(Debug, Clone, Error)]
pub enum RuleFault {
    #[error("rule '{rule}' failed: {cause}")]
    Failed {
        rule: String,
        cause: Arc<dyn StdError + Send + Sync>,
    },

    #[error("rule '{rule}' panicked: {message}")]
    Panicked { rule: String, message: String },

    #[error("evaluation cancelled")]
    Cancelled,
}

impl RuleFault {
    pub(crate) fn failed(rule: &str, cause: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        RuleFault::Failed {
            rule: rule.to_owned(),
            cause: Arc::from(cause.into()),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RuleFault::Cancelled)
    }
}

/// Tri-state outcome of evaluating a rule.
#[derive(Debug, Clone)]
#[must_use]
pub enum Decision {
    Allow,
    Deny(Option<String>),
    Error(RuleFault),
}

impl Decision {
    pub fn deny() -> Self {
        Decision::Deny(None)
    }

    pub fn deny_with(reason: impl Into<String>) -> Self {
        Decision::Deny(Some(reason.into()))
    }

    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    #[must_use]
    pub fn is_denied(&self) -> bool {
        matches!(self, Decision::Deny(_))
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Decision::Error(_))
    }

    /// The reason attached to a denial, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Deny(reason) => reason.as_deref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn fault(&self) -> Option<&RuleFault> {
        match self {
            Decision::Error(fault) => Some(fault),
            _ => None,
        }
    }

    /// Logical negation. An evaluation failure is not invertible and passes
    /// through unchanged.
    pub fn negate(self) -> Self {
        match self {
            Decision::Allow => Decision::Deny(None),
            Decision::Deny(_) => Decision::Allow,
            Decision::Error(fault) => Decision::Error(fault),
        }
    }
}

// Faults compare by their rendered message; the boxed cause has no equality.
impl PartialEq for Decision {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Decision::Allow, Decision::Allow) => true,
            (Decision::Deny(a), Decision::Deny(b)) => a == b,
            (Decision::Error(a), Decision::Error(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => write!(f, "allow"),
            Decision::Deny(None) => write!(f, "deny"),
            Decision::Deny(Some(reason)) => write!(f, "deny ({reason})"),
            Decision::Error(fault) => write!(f, "error ({fault})"),
        }
    }
}

/// Conversion from a predicate's return value into a [`Decision`].
///
/// `true` allows, `false` denies without a reason, and a string denies with
/// that string as the reason. `Err` values become [`RuleFault::Failed`].
pub trait IntoDecision {
    fn into_decision(self, rule: &str) -> Decision;
}

impl IntoDecision for Decision {
    fn into_decision(self, _rule: &str) -> Decision {
        self
    }
}

impl IntoDecision for bool {
    fn into_decision(self, _rule: &str) -> Decision {
        if self {
            Decision::Allow
        } else {
            Decision::Deny(None)
        }
    }
}

impl IntoDecision for String {
    fn into_decision(self, _rule: &str) -> Decision {
        Decision::Deny(Some(self))
    }
}

impl IntoDecision for &str {
    fn into_decision(self, _rule: &str) -> Decision {
        Decision::Deny(Some(self.to_owned()))
    }
}

impl IntoDecision for serde_json::Value {
    fn into_decision(self, rule: &str) -> Decision {
        match self {
            serde_json::Value::Bool(b) => b.into_decision(rule),
            serde_json::Value::String(s) => Decision::Deny(Some(s)),
            other => Decision::Deny(Some(other.to_string())),
        }
    }
}

impl<T, E> IntoDecision for Result<T, E>
where
    T: IntoDecision,
    E: Into<Box<dyn StdError + Send + Sync>>,
{
    fn into_decision(self, rule: &str) -> Decision {
        match self {
            Ok(value) => value.into_decision(rule),
            Err(e) => Decision::Error(RuleFault::failed(rule, e)),
        }
    }
}
