use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

use crate::cache::RuleCache;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of one in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub(crate) fn next() -> Self {
        RequestId(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Cooperative cancellation flag shared by every evaluation in a request.
///
/// Cloning yields a handle to the same flag. Once cancelled it stays
/// cancelled.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`cancel()`](Self::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            // The sender lives as long as this token, so `changed` only
            // errors if the channel is torn down underneath us.
            if rx.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Static description of the field being resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    parent_type: String,
    field_name: String,
    path: Vec<String>,
}

impl FieldInfo {
    #[must_use]
    pub fn new(parent_type: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            parent_type: parent_type.into(),
            field_name: field_name.into(),
            path: Vec::new(),
        }
    }

    /// Attach the response path (e.g. `["posts", "3", "author"]`).
    #[must_use]
    pub fn with_path(mut self, path: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.path = path.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn parent_type(&self) -> &str {
        &self.parent_type
    }

    #[must_use]
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.path
    }
}

impl fmt::Display for FieldInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.parent_type, self.field_name)
    }
}

/// One field-resolution attempt: the parent value, the field arguments, and
/// the field's static info.
#[derive(Debug, Clone)]
pub struct FieldRequest {
    parent: Arc<Value>,
    args: Arc<Value>,
    info: Arc<FieldInfo>,
}

impl FieldRequest {
    /// A request with `null` parent and empty arguments.
    #[must_use]
    pub fn new(parent_type: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self::from_info(FieldInfo::new(parent_type, field_name))
    }

    #[must_use]
    pub fn from_info(info: FieldInfo) -> Self {
        Self {
            parent: Arc::new(Value::Null),
            args: Arc::new(Value::Object(serde_json::Map::new())),
            info: Arc::new(info),
        }
    }

    #[must_use]
    pub fn parent(mut self, parent: Value) -> Self {
        self.parent = Arc::new(parent);
        self
    }

    #[must_use]
    pub fn args(mut self, args: Value) -> Self {
        self.args = Arc::new(args);
        self
    }

    #[must_use]
    pub fn parent_value(&self) -> &Value {
        &self.parent
    }

    #[must_use]
    pub fn args_value(&self) -> &Value {
        &self.args
    }

    #[must_use]
    pub fn info(&self) -> &FieldInfo {
        &self.info
    }
}

/// Everything a predicate sees. Cheap to clone; all fields are shared.
pub struct RuleInput<C> {
    parent: Arc<Value>,
    args: Arc<Value>,
    context: Arc<C>,
    info: Arc<FieldInfo>,
    cancellation: CancellationToken,
}

impl<C> RuleInput<C> {
    pub(crate) fn new(field: &FieldRequest, scope: &RequestScope<C>) -> Self {
        Self {
            parent: Arc::clone(&field.parent),
            args: Arc::clone(&field.args),
            context: Arc::clone(&scope.context),
            info: Arc::clone(&field.info),
            cancellation: scope.cancellation.clone(),
        }
    }

    #[must_use]
    pub fn parent(&self) -> &Value {
        &self.parent
    }

    #[must_use]
    pub fn args(&self) -> &Value {
        &self.args
    }

    /// Look up a single argument by name.
    #[must_use]
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    #[must_use]
    pub fn context(&self) -> &C {
        &self.context
    }

    #[must_use]
    pub fn info(&self) -> &FieldInfo {
        &self.info
    }

    /// The request's cancellation token. Long-running predicates should
    /// select on [`CancellationToken::cancelled()`].
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

impl<C> Clone for RuleInput<C> {
    fn clone(&self) -> Self {
        Self {
            parent: Arc::clone(&self.parent),
            args: Arc::clone(&self.args),
            context: Arc::clone(&self.context),
            info: Arc::clone(&self.info),
            cancellation: self.cancellation.clone(),
        }
    }
}

impl<C> fmt::Debug for RuleInput<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleInput")
            .field("info", &self.info)
            .field("parent", &self.parent)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// State owned by one in-flight request: the host's context, the rule cache,
/// and the cancellation token.
///
/// Dropping the scope discards every cached decision.
pub struct RequestScope<C> {
    id: RequestId,
    context: Arc<C>,
    cache: RuleCache,
    cancellation: CancellationToken,
}

impl<C> RequestScope<C> {
    #[must_use]
    pub fn new(context: C) -> Self {
        Self::with_cancellation(context, CancellationToken::new())
    }

    /// Build a scope tied to an externally owned token, e.g. one the host
    /// fires when the client disconnects.
    #[must_use]
    pub fn with_cancellation(context: C, cancellation: CancellationToken) -> Self {
        let id = RequestId::next();
        Self {
            id,
            context: Arc::new(context),
            cache: RuleCache::new(id),
            cancellation,
        }
    }

    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    #[must_use]
    pub fn context(&self) -> &C {
        &self.context
    }

    #[must_use]
    pub fn cache(&self) -> &RuleCache {
        &self.cache
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl<C> fmt::Debug for RequestScope<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("id", &self.id)
            .field("cache", &self.cache)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
