use crate::{DefaultPolicy, PolicyExpr, PolicyTarget};

/// The result of parsing a policy DSL document.
#[derive(Debug, Default)]
pub struct ParsedPolicy {
    /// Every `default` statement, in document order.
    pub defaults: Vec<DefaultPolicy>,
    /// Every `target: expr` statement, in document order.
    pub rules: Vec<(PolicyTarget, PolicyExpr)>,
}
