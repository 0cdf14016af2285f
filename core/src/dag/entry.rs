//! Entries and the work-item capability interface.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;

/// Lifecycle state of an [`Entry`].
///
/// `Ready` holds iff `pending_dependency_count == 0` and the entry has not
/// yet been dispatched; enforcing that invariant is the job of [`super::graph::Dag`],
/// not of this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    /// Waiting on at least one dependency.
    NotStarted,
    /// All dependencies satisfied; eligible for dispatch.
    Ready,
    /// Dispatched, awaiting completion.
    InProgress,
    /// Completed successfully.
    Succeeded,
    /// Completed with an error.
    Faulted,
    /// Skipped because an ancestor faulted under the active termination
    /// strategy; never dispatched.
    Cancelled,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "NotStarted",
            Self::Ready => "Ready",
            Self::InProgress => "InProgress",
            Self::Succeeded => "Succeeded",
            Self::Faulted => "Faulted",
            Self::Cancelled => "Cancelled",
        };
        write!(f, "{s}")
    }
}

/// A unit of asynchronous work a [`crate::dag::TaskGroup`] can schedule.
///
/// `prepare` runs synchronously just before dispatch; `is_hot` distinguishes
/// work that has already begun running (the caller only needs to subscribe)
/// from work that starts on first subscription. `invoke_async` returns the
/// stream of results; `result` exposes whatever the item last produced, for
/// inspection outside of the stream.
#[async_trait]
pub trait TaskItem<R>: Send + Sync
where
    R: Send + Sync + 'static,
{
    /// Side-effecting setup hook, invoked once right before dispatch.
    async fn prepare(&self) {}

    /// Whether this item's underlying stream is already running.
    fn is_hot(&self) -> bool {
        false
    }

    /// Start (or, if hot, attach to) the item's result stream.
    async fn invoke_async(&self, context: Arc<InvocationContext>) -> BoxStream<'static, Result<R>>;

    /// The item's last-produced result, if any.
    fn result(&self) -> Option<R> {
        None
    }
}

/// A no-op work item used for proxy roots and for tests that only care
/// about ordering, not payload.
pub struct NoopItem<R> {
    value: R,
}

impl<R> NoopItem<R> {
    /// Construct a no-op item that immediately "succeeds" with `value`.
    pub fn new(value: R) -> Self {
        Self { value }
    }
}

#[async_trait]
impl<R> TaskItem<R> for NoopItem<R>
where
    R: Clone + Send + Sync + 'static,
{
    async fn invoke_async(&self, _context: Arc<InvocationContext>) -> BoxStream<'static, Result<R>> {
        let value = self.value.clone();
        Box::pin(futures::stream::once(async move { Ok(value) }))
    }

    fn result(&self) -> Option<R> {
        Some(self.value.clone())
    }
}

/// Per-`invoke_async` mutable bag of state, shared by every work item
/// dispatched during that invocation. Work items that mutate it own their
/// own synchronization.
#[derive(Debug, Default)]
pub struct InvocationContext {
    state: parking_lot::RwLock<std::collections::HashMap<String, String>>,
}

impl InvocationContext {
    /// Create a fresh, empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a value previously stored under `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.state.read().get(key).cloned()
    }

    /// Store a value under `key`, overwriting any previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.state.write().insert(key.into(), value.into());
    }
}

/// A node in a [`super::graph::Dag`]: a work item plus dependency bookkeeping.
///
/// Invariant: `dependencies` and `dependents` are mirrored across the
/// entries of whichever [`super::graph::Dag`] map(s) hold them — `u ∈
/// v.dependencies ⇔ v ∈ u.dependents`.
pub struct Entry<R> {
    /// Key unique within any DAG this entry participates in.
    pub key: String,
    /// The work this entry wraps.
    pub work_item: Arc<dyn TaskItem<R>>,
    /// Keys this entry waits on.
    pub dependencies: HashSet<String>,
    /// Keys that wait on this entry.
    pub dependents: HashSet<String>,
    /// Count of dependencies not yet reported complete.
    pub pending_dependency_count: usize,
    /// Current lifecycle state.
    pub state: EntryState,
}

impl<R> Entry<R> {
    /// Construct a leaf entry (no dependencies yet) wrapping `work_item`.
    pub fn new(key: impl Into<String>, work_item: Arc<dyn TaskItem<R>>) -> Self {
        Self {
            key: key.into(),
            work_item,
            dependencies: HashSet::new(),
            dependents: HashSet::new(),
            pending_dependency_count: 0,
            state: EntryState::NotStarted,
        }
    }

    /// Construct a synthetic no-op entry, used for proxy roots.
    pub fn new_noop(key: impl Into<String>) -> Self
    where
        R: Default + Clone + Send + Sync + 'static,
    {
        Self::new(key, Arc::new(NoopItem::new(R::default())))
    }
}

impl<R> fmt::Debug for Entry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("dependencies", &self.dependencies)
            .field("dependents", &self.dependents)
            .field("pending_dependency_count", &self.pending_dependency_count)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_item_produces_value() {
        let item = NoopItem::new(42u32);
        let ctx = Arc::new(InvocationContext::new());
        let mut stream = item.invoke_async(ctx).await;
        use futures::StreamExt;
        let value = stream.next().await.unwrap().unwrap();
        assert_eq!(value, 42);
        assert_eq!(item.result(), Some(42));
    }

    #[test]
    fn test_invocation_context_roundtrip() {
        let ctx = InvocationContext::new();
        assert_eq!(ctx.get("k"), None);
        ctx.set("k", "v");
        assert_eq!(ctx.get("k"), Some("v".to_string()));
    }

    #[test]
    fn test_entry_state_display() {
        assert_eq!(EntryState::Ready.to_string(), "Ready");
        assert_eq!(EntryState::Cancelled.to_string(), "Cancelled");
    }
}
