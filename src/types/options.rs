use serde::{Deserialize, Serialize};

/// Decision applied when no rule matches a field and no fallback exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultPolicy {
    AllowByDefault,
    #[default]
    DenyByDefault,
}

/// What the middleware does with a denied or failed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyPolicy {
    /// The field resolves to a redacted value; sibling fields proceed.
    #[default]
    Redact,
    /// The whole request is cancelled.
    AbortRequest,
}

/// Which refusal an `or` reports when none of its children allow.
///
/// Positions are the children's declared order, not completion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrPrecedence {
    /// The last child's refusal; surfaces the most specific denial when
    /// alternatives are ordered from general to specific.
    #[default]
    Last,
    First,
}

/// Runtime options of a [`Shield`](crate::Shield).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShieldOptions {
    pub on_deny: DenyPolicy,
    pub or_precedence: OrPrecedence,
    /// Client-facing message for denials that carry no reason.
    pub denial_message: String,
    /// Client-facing message for rule evaluation failures.
    pub failure_message: String,
}

impl Default for ShieldOptions {
    fn default() -> Self {
        Self {
            on_deny: DenyPolicy::default(),
            or_precedence: OrPrecedence::default(),
            denial_message: "not authorized".to_owned(),
            failure_message: "internal error while authorizing request".to_owned(),
        }
    }
}

impl ShieldOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_deny(mut self, policy: DenyPolicy) -> Self {
        self.on_deny = policy;
        self
    }

    #[must_use]
    pub fn or_precedence(mut self, precedence: OrPrecedence) -> Self {
        self.or_precedence = precedence;
        self
    }

    #[must_use]
    pub fn denial_message(mut self, message: impl Into<String>) -> Self {
        self.denial_message = message.into();
        self
    }

    #[must_use]
    pub fn failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = message.into();
        self
    }

    /// Parse options from a JSON document. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RampartError::Config`](crate::RampartError::Config) if the
    /// document is malformed or names an unknown option.
    pub fn from_json(input: &str) -> Result<Self, crate::RampartError> {
        Ok(serde_json::from_str(input)?)
    }
}
