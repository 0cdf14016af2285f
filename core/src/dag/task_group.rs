//! TaskGroup: a DAG plus cross-group composition.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::Result;

use super::driver::DriverEvent;
use super::entry::{Entry, InvocationContext, TaskItem};
use super::graph::{Dag, DagStats, EntryRef};
use super::proxy::ProxyWrapper;
use super::TerminationStrategy;

const EVENT_BUFFER_SIZE: usize = 256;

struct TaskGroupInner<R> {
    dag: RwLock<Dag<R>>,
    root_key: String,
    termination_strategy: TerminationStrategy,
    parent_dags: RwLock<Vec<Weak<TaskGroupInner<R>>>>,
    post_run_dependents: RwLock<Vec<TaskGroup<R>>>,
    proxy_wrapper: RwLock<Option<ProxyWrapper<R>>>,
    events: broadcast::Sender<DriverEvent>,
}

/// A DAG augmented with a designated root entry, back-references to
/// TaskGroups that depend on it, and the post-run dependents that will be
/// scheduled through its proxy once activated.
///
/// Cheap to clone: clones share the same underlying state via `Arc`.
pub struct TaskGroup<R> {
    inner: Arc<TaskGroupInner<R>>,
}

impl<R> Clone for TaskGroup<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> TaskGroup<R>
where
    R: Clone + Default + Send + Sync + 'static,
{
    /// Construct a new TaskGroup whose DAG initially contains only its root.
    pub fn new(
        root_key: impl Into<String>,
        root_item: Arc<dyn TaskItem<R>>,
        termination_strategy: TerminationStrategy,
    ) -> Self {
        let root_key = root_key.into();
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        let inner = TaskGroupInner {
            dag: RwLock::new(Dag::new(root_key.clone(), root_item)),
            root_key,
            termination_strategy,
            parent_dags: RwLock::new(Vec::new()),
            post_run_dependents: RwLock::new(Vec::new()),
            proxy_wrapper: RwLock::new(None),
            events,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    fn from_dag(dag: Dag<R>, root_key: String, termination_strategy: TerminationStrategy) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        let inner = TaskGroupInner {
            dag: RwLock::new(dag),
            root_key,
            termination_strategy,
            parent_dags: RwLock::new(Vec::new()),
            post_run_dependents: RwLock::new(Vec::new()),
            proxy_wrapper: RwLock::new(None),
            events,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// This group's root key (the real root, not its proxy).
    pub fn root_key(&self) -> &str {
        &self.inner.root_key
    }

    /// The termination strategy configured for this group.
    pub fn termination_strategy(&self) -> TerminationStrategy {
        self.inner.termination_strategy
    }

    /// Insert an additional entry directly into this group's own DAG.
    pub fn add_entry(&self, entry: Entry<R>) -> Result<()> {
        self.inner.dag.write().add_entry(entry)
    }

    /// Add a dependency edge within this group's own DAG (not across
    /// groups — see [`Self::add_dependency_task_group`] for that).
    pub fn add_edge(&self, from: &str, to: &str) -> Result<()> {
        self.inner.dag.write().add_edge(from, to)
    }

    /// The proxy task group, if post-run dependents have activated one.
    pub fn active_proxy(&self) -> Option<TaskGroup<R>> {
        self.inner
            .proxy_wrapper
            .read()
            .as_ref()
            .map(|p| p.proxy_task_group.clone())
    }

    /// Every TaskGroup currently registered as depending on this one
    /// (directly, or via its proxy once activated).
    pub fn parent_dags(&self) -> Vec<TaskGroup<R>> {
        self.inner
            .parent_dags
            .read()
            .iter()
            .filter_map(|w| w.upgrade().map(|inner| TaskGroup { inner }))
            .collect()
    }

    fn push_parent(&self, parent: &TaskGroup<R>) {
        let mut parents = self.inner.parent_dags.write();
        let already = parents
            .iter()
            .any(|w| w.as_ptr() == Arc::as_ptr(&parent.inner));
        if !already {
            parents.push(Arc::downgrade(&parent.inner));
        }
    }

    /// The key and a merge-ready snapshot of entries for whichever DAG
    /// currently represents this group externally — the active proxy's DAG
    /// if one exists, otherwise this group's own DAG.
    fn effective_snapshot(&self) -> (std::collections::HashMap<String, EntryRef<R>>, String) {
        if let Some(proxy) = self.active_proxy() {
            let dag = proxy.inner.dag.read();
            (dag.snapshot_entries(), dag.root_key().to_string())
        } else {
            let dag = self.inner.dag.read();
            (dag.snapshot_entries(), dag.root_key().to_string())
        }
    }

    /// The TaskGroup that should be registered as the effective owner of
    /// this group's externally-visible root (the proxy, if active).
    fn effective_owner(&self) -> TaskGroup<R> {
        self.active_proxy().unwrap_or_else(|| self.clone())
    }

    /// Make this group's root depend on `other`'s root (or `other`'s
    /// active proxy root, if it has one). Idempotent: calling this twice
    /// with the same argument has the same effect as calling it once.
    pub fn add_dependency_task_group(&self, other: &TaskGroup<R>) -> Result<()> {
        let (other_entries, other_root) = other.effective_snapshot();

        self.inner
            .dag
            .write()
            .merge_and_add_edge(other_entries, &other_root, &self.inner.root_key)?;

        other.effective_owner().push_parent(self);
        debug!(
            dependency = %other_root,
            dependent = %self.inner.root_key,
            "composed task group dependency"
        );
        Ok(())
    }

    /// Declare that `other` must run after this group's root completes,
    /// *and* after every parent that currently depends on this group's
    /// root — activating the proxy-node rewiring protocol on first call.
    pub fn add_post_run_dependent_task_group(&self, other: &TaskGroup<R>) -> Result<()> {
        let is_first_activation = self.inner.proxy_wrapper.read().is_none();

        if is_first_activation {
            self.activate_proxy()?;
        }

        let proxy = self
            .active_proxy()
            .expect("proxy must be active past this point");

        let (other_entries, other_root) = other.effective_snapshot();
        proxy
            .inner
            .dag
            .write()
            .merge_and_add_edge(other_entries, &other_root, &proxy.inner.root_key)?;

        self.inner.post_run_dependents.write().push(other.clone());
        self.push_parent(other);

        info!(
            root = %self.inner.root_key,
            post_run = %other_root,
            proxy = %proxy.inner.root_key,
            "registered post-run dependent"
        );
        Ok(())
    }

    /// First-activation half of the proxy rewiring protocol: build the
    /// proxy DAG from this group's current entries, thread it above the
    /// real root, and rewire every existing parent onto the proxy.
    fn activate_proxy(&self) -> Result<()> {
        let proxy_root_key = format!("proxy-{}", self.inner.root_key);

        let mut proxy_entries = {
            let dag = self.inner.dag.read();
            dag.snapshot_entries()
        };
        proxy_entries.insert(
            proxy_root_key.clone(),
            Arc::new(RwLock::new(Entry::new_noop(proxy_root_key.clone()))) as EntryRef<R>,
        );

        let mut proxy_dag = Dag::from_entries(proxy_entries, proxy_root_key.clone());
        proxy_dag.add_edge(&self.inner.root_key, &proxy_root_key)?;

        let proxy_task_group =
            TaskGroup::from_dag(proxy_dag, proxy_root_key, self.inner.termination_strategy);

        let old_parents: Vec<Weak<TaskGroupInner<R>>> =
            std::mem::take(&mut *self.inner.parent_dags.write());

        for weak_parent in old_parents {
            let Some(parent_inner) = weak_parent.upgrade() else { continue };
            let parent = TaskGroup { inner: parent_inner };
            self.rewire_parent_onto_proxy(&parent, &proxy_task_group)?;
            proxy_task_group.push_parent(&parent);
        }

        self.inner
            .parent_dags
            .write()
            .push(Arc::downgrade(&proxy_task_group.inner));
        *self.inner.proxy_wrapper.write() = Some(ProxyWrapper {
            proxy_task_group,
        });
        Ok(())
    }

    /// Redirect a parent's dependency edge from this group's real root onto
    /// the proxy root, and give the parent visibility into the proxy's DAG.
    fn rewire_parent_onto_proxy(&self, parent: &TaskGroup<R>, proxy: &TaskGroup<R>) -> Result<()> {
        let proxy_entries = proxy.inner.dag.read().snapshot_entries();
        let mut parent_dag = parent.inner.dag.write();
        parent_dag.remove_edge(&self.inner.root_key, &parent.inner.root_key);
        parent_dag.merge_and_add_edge(proxy_entries, &proxy.inner.root_key, &parent.inner.root_key)?;
        Ok(())
    }

    /// Construct a fresh [`InvocationContext`] for a new `invoke_async`
    /// call. Every work item dispatched during that call shares this one
    /// instance.
    pub fn new_invocation_context(&self) -> Arc<InvocationContext> {
        Arc::new(InvocationContext::new())
    }

    /// Prepare the effective DAG (the active proxy's, if any, else this
    /// group's own) for a fresh enumeration.
    pub fn prepare_for_enumeration(&self) {
        let effective = self.effective_task_group();
        effective.inner.dag.write().prepare_for_enumeration();
    }

    /// The TaskGroup whose DAG should drive enumeration: the active proxy,
    /// or this group itself.
    pub fn effective_task_group(&self) -> TaskGroup<R> {
        self.active_proxy().unwrap_or_else(|| self.clone())
    }

    /// Dequeue one ready entry from the effective DAG. See
    /// [`Dag::get_next`].
    pub fn get_next(&self) -> Option<EntryRef<R>> {
        self.effective_task_group().inner.dag.write().get_next()
    }

    /// Whether the effective DAG still has ready or in-progress entries.
    pub fn has_remaining_work(&self) -> bool {
        self.effective_task_group().inner.dag.read().has_remaining_work()
    }

    /// Report an entry's successful completion to the effective DAG. See
    /// [`Dag::report_completion`].
    pub fn report_completion(&self, key: &str) -> Result<()> {
        self.effective_task_group().inner.dag.write().report_completion(key)
    }

    /// Report an entry's failure to the effective DAG, cascading
    /// cancellation to its dependents. See [`Dag::report_failure`].
    pub fn report_failure(&self, key: &str) -> Result<Vec<String>> {
        self.effective_task_group().inner.dag.write().report_failure(key)
    }

    /// Subscribe to this group's driver events (`EntryReady`,
    /// `EntryCompleted`, `EntryFailed`, `InvocationFinished`).
    pub fn subscribe_events(&self) -> broadcast::Receiver<DriverEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn emit_event(&self, event: DriverEvent) {
        let _ = self.inner.events.send(event);
    }

    /// Statistics over the effective DAG's entries.
    pub fn stats(&self) -> DagStats {
        self.effective_task_group().inner.dag.read().stats()
    }

    /// Identity check — two TaskGroup handles refer to the same group iff
    /// they share the same underlying `Arc`.
    pub fn is_same_group(&self, other: &TaskGroup<R>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::entry::NoopItem;

    fn group(root: &str) -> TaskGroup<u32> {
        TaskGroup::new(root, Arc::new(NoopItem::new(0u32)), TerminationStrategy::TerminateOnInProgressCompletion)
    }

    #[test]
    fn test_new_group_has_only_root() {
        let g = group("root");
        assert_eq!(g.root_key(), "root");
        assert_eq!(g.stats().total, 1);
        assert!(g.active_proxy().is_none());
        assert!(g.parent_dags().is_empty());
    }

    #[test]
    fn test_new_invocation_context_is_fresh_each_call() {
        let g = group("root");
        let ctx1 = g.new_invocation_context();
        ctx1.set("k", "v");
        let ctx2 = g.new_invocation_context();
        assert_eq!(ctx2.get("k"), None);
    }

    #[test]
    fn test_add_dependency_registers_parent() {
        let g1 = group("A");
        let g2 = group("B");
        g2.add_dependency_task_group(&g1).unwrap();
        assert_eq!(g1.parent_dags().len(), 1);
        assert!(g1.parent_dags()[0].is_same_group(&g2));
    }

    #[test]
    fn test_post_run_dependent_activates_proxy_once() {
        let g1 = group("A");
        let g2 = group("B");
        let g3 = group("C");
        g1.add_post_run_dependent_task_group(&g2).unwrap();
        let proxy = g1.active_proxy().unwrap();
        assert_eq!(proxy.root_key(), "proxy-A");

        g1.add_post_run_dependent_task_group(&g3).unwrap();
        let proxy_again = g1.active_proxy().unwrap();
        assert!(proxy.is_same_group(&proxy_again));
    }
}
