use std::fmt;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::Instrument;

use crate::evaluate::Evaluator;
use crate::types::{
    Decision, DenyPolicy, FieldRequest, RequestScope, RuleFault, RuleTree, ShieldOptions,
};

/// Category of a client-facing refusal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialKind {
    /// A rule refused access.
    NotAuthorized,
    /// A rule failed while deciding; details are only in the logs.
    Internal,
}

/// Client-safe description of why a field did not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Denial {
    kind: DenialKind,
    message: String,
}

impl Denial {
    fn new(kind: DenialKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> DenialKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Stable machine-readable code, suitable for an error `extensions.code`.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self.kind {
            DenialKind::NotAuthorized => "FORBIDDEN",
            DenialKind::Internal => "INTERNAL_SERVER_ERROR",
        }
    }
}

/// Result of a field that was allowed to resolve, or was redacted.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOutcome<T> {
    Resolved(T),
    /// The field resolves to null; the denial belongs in the response's
    /// error list.
    Redacted(Denial),
}

impl<T> FieldOutcome<T> {
    /// The resolved value, or `None` when redacted.
    pub fn into_value(self) -> Option<T> {
        match self {
            FieldOutcome::Resolved(value) => Some(value),
            FieldOutcome::Redacted(_) => None,
        }
    }

    #[must_use]
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            FieldOutcome::Resolved(_) => None,
            FieldOutcome::Redacted(denial) => Some(denial),
        }
    }

    #[must_use]
    pub fn is_redacted(&self) -> bool {
        matches!(self, FieldOutcome::Redacted(_))
    }
}

#[derive(Debug, Error)]
pub enum ShieldError<E> {
    /// The field was refused and the request is aborted.
    #[error("{0}")]
    Denied(Denial),

    /// The request was cancelled before or during authorization.
    #[error("request cancelled")]
    Cancelled,

    /// The wrapped resolver ran and failed; the error is passed through
    /// untouched.
    #[error("{0}")]
    Resolver(E),
}

/// Authorization middleware in front of a resolver pipeline.
///
/// One `Shield` serves every request; per-request state lives in the
/// [`RequestScope`] created by [`request()`](Self::request).
pub struct Shield<C> {
    tree: Arc<RuleTree<C>>,
    options: ShieldOptions,
    evaluator: Evaluator,
}

impl<C> Shield<C>
where
    C: Send + Sync + 'static,
{
    #[must_use]
    pub fn new(tree: RuleTree<C>) -> Self {
        Self::with_options(tree, ShieldOptions::default())
    }

    #[must_use]
    pub fn with_options(tree: RuleTree<C>, options: ShieldOptions) -> Self {
        Self::shared(Arc::new(tree), options)
    }

    /// Build from a tree that is already shared elsewhere.
    #[must_use]
    pub fn shared(tree: Arc<RuleTree<C>>, options: ShieldOptions) -> Self {
        let evaluator = Evaluator::with_or_precedence(options.or_precedence);
        Self {
            tree,
            options,
            evaluator,
        }
    }

    #[must_use]
    pub fn tree(&self) -> &RuleTree<C> {
        &self.tree
    }

    #[must_use]
    pub fn options(&self) -> &ShieldOptions {
        &self.options
    }

    /// Open a scope for one request. Drop it when the request completes.
    #[must_use]
    pub fn request(&self, context: C) -> RequestScope<C> {
        RequestScope::new(context)
    }

    /// Look up and evaluate the rule for `field` without resolving it.
    pub async fn check(&self, scope: &RequestScope<C>, field: &FieldRequest) -> Decision {
        let info = field.info();
        let (rule, source) = self.tree.lookup(info.parent_type(), info.field_name());
        tracing::debug!(%source, rule = %rule, "rule selected");

        let decision = self.evaluator.evaluate(rule, field, scope).await;
        tracing::debug!(%decision, "authorization decided");
        decision
    }

    /// Authorize `field`, then run `next` if allowed.
    ///
    /// # Errors
    ///
    /// - [`ShieldError::Resolver`] when the resolver itself fails.
    /// - [`ShieldError::Denied`] when the field is refused under
    ///   [`DenyPolicy::AbortRequest`]; the scope is cancelled as a side
    ///   effect.
    /// - [`ShieldError::Cancelled`] when the scope was cancelled.
    pub async fn resolve<T, E, F, Fut>(
        &self,
        scope: &RequestScope<C>,
        field: FieldRequest,
        next: F,
    ) -> Result<FieldOutcome<T>, ShieldError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if scope.is_cancelled() {
            return Err(ShieldError::Cancelled);
        }

        let span = tracing::debug_span!(
            "authorize",
            parent_type = field.info().parent_type(),
            field = field.info().field_name(),
            request = %scope.id(),
        );
        let decision = self.check(scope, &field).instrument(span).await;

        let denial = match decision {
            Decision::Allow => {
                return next()
                    .await
                    .map(FieldOutcome::Resolved)
                    .map_err(ShieldError::Resolver);
            }
            Decision::Deny(reason) => {
                let message = reason.unwrap_or_else(|| self.options.denial_message.clone());
                tracing::info!(
                    field = %field.info(),
                    request = %scope.id(),
                    %message,
                    "field access denied"
                );
                Denial::new(DenialKind::NotAuthorized, message)
            }
            Decision::Error(RuleFault::Cancelled) => return Err(ShieldError::Cancelled),
            Decision::Error(fault) => {
                tracing::error!(
                    field = %field.info(),
                    request = %scope.id(),
                    error = %fault,
                    "rule evaluation failed"
                );
                Denial::new(DenialKind::Internal, self.options.failure_message.clone())
            }
        };

        match self.options.on_deny {
            DenyPolicy::Redact => Ok(FieldOutcome::Redacted(denial)),
            DenyPolicy::AbortRequest => {
                scope.cancel();
                Err(ShieldError::Denied(denial))
            }
        }
    }
}

impl<C> fmt::Debug for Shield<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shield")
            .field("tree", &format_args!("{}", self.tree))
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{allow, deny, rule, RuleTreeBuilder};

    fn shield(options: ShieldOptions) -> Shield<()> {
        let tree = RuleTreeBuilder::new()
            .field("Query", "open", allow())
            .field("Query", "closed", deny())
            .field("Query", "reasoned", rule("r").check_sync(|_| "members only"))
            .field(
                "Query",
                "broken",
                rule("broken").check_sync(|_| Err::<bool, _>(std::io::Error::other("db down"))),
            )
            .build()
            .unwrap();
        Shield::with_options(tree, options)
    }

    async fn resolve(s: &Shield<()>, scope: &RequestScope<()>, field: &str) -> Result<FieldOutcome<u32>, ShieldError<String>> {
        s.resolve(scope, FieldRequest::new("Query", field), || async { Ok(7) })
            .await
    }

    #[tokio::test]
    async fn allowed_field_resolves() {
        let s = shield(ShieldOptions::default());
        let scope = s.request(());
        let out = resolve(&s, &scope, "open").await.unwrap();
        assert_eq!(out, FieldOutcome::Resolved(7));
    }

    #[tokio::test]
    async fn denied_field_uses_generic_message() {
        let s = shield(ShieldOptions::default());
        let scope = s.request(());
        let out = resolve(&s, &scope, "closed").await.unwrap();
        let denial = out.denial().unwrap();
        assert_eq!(denial.kind(), DenialKind::NotAuthorized);
        assert_eq!(denial.message(), "not authorized");
        assert_eq!(denial.code(), "FORBIDDEN");
    }

    #[tokio::test]
    async fn denial_reason_is_surfaced_verbatim() {
        let s = shield(ShieldOptions::default());
        let scope = s.request(());
        let out = resolve(&s, &scope, "reasoned").await.unwrap();
        assert_eq!(out.denial().map(Denial::message), Some("members only"));
    }

    #[tokio::test]
    async fn fault_is_not_leaked() {
        let s = shield(ShieldOptions::default().failure_message("try again later"));
        let scope = s.request(());
        let out = resolve(&s, &scope, "broken").await.unwrap();
        let denial = out.denial().unwrap();
        assert_eq!(denial.kind(), DenialKind::Internal);
        assert_eq!(denial.message(), "try again later");
        assert!(!denial.message().contains("db down"));
        assert_eq!(denial.code(), "INTERNAL_SERVER_ERROR");
    }

    #[tokio::test]
    async fn resolver_errors_pass_through() {
        let s = shield(ShieldOptions::default());
        let scope = s.request(());
        let result: Result<FieldOutcome<u32>, ShieldError<String>> = s
            .resolve(&scope, FieldRequest::new("Query", "open"), || async {
                Err("resolver exploded".to_owned())
            })
            .await;
        match result {
            Err(ShieldError::Resolver(e)) => assert_eq!(e, "resolver exploded"),
            other => panic!("expected resolver error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn abort_policy_cancels_the_request() {
        let s = shield(ShieldOptions::default().on_deny(DenyPolicy::AbortRequest));
        let scope = s.request(());
        match resolve(&s, &scope, "closed").await {
            Err(ShieldError::Denied(denial)) => assert_eq!(denial.message(), "not authorized"),
            other => panic!("expected denial, got {other:?}"),
        }
        assert!(scope.is_cancelled());
        assert!(matches!(
            resolve(&s, &scope, "open").await,
            Err(ShieldError::Cancelled)
        ));
    }

    #[test]
    fn field_outcome_into_value() {
        assert_eq!(FieldOutcome::Resolved(3).into_value(), Some(3));
        let redacted: FieldOutcome<u32> =
            FieldOutcome::Redacted(Denial::new(DenialKind::NotAuthorized, "no"));
        assert!(redacted.is_redacted());
        assert_eq!(redacted.into_value(), None);
    }
}
