//! The DAG itself: topological enumeration over a mapping of key to entry.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::{GraphError, Result};

use super::entry::{Entry, EntryState, TaskItem};

/// Shared handle to an [`Entry`]. Cloning a `Dag`'s entry map clones these
/// handles, not the entries — composing two task groups makes their entry
/// sets alias the same underlying state.
pub type EntryRef<R> = Arc<RwLock<Entry<R>>>;

/// Snapshot counts of entries per [`EntryState`], for progress inspection
/// without driving a full enumeration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DagStats {
    /// Total entries in the DAG.
    pub total: usize,
    /// Entries still waiting on a dependency.
    pub not_started: usize,
    /// Entries eligible for dispatch.
    pub ready: usize,
    /// Entries currently dispatched.
    pub in_progress: usize,
    /// Entries that completed successfully.
    pub succeeded: usize,
    /// Entries that faulted.
    pub faulted: usize,
    /// Entries cancelled after an ancestor faulted.
    pub cancelled: usize,
}

/// A directed acyclic collection of [`Entry`] values keyed by a unique
/// string, plus a designated root and a ready-queue.
///
/// Acyclic by construction: every mutation that would introduce a cycle is
/// rejected with [`GraphError::CycleDetected`] before any state changes.
pub struct Dag<R> {
    entries: HashMap<String, EntryRef<R>>,
    insertion_order: Vec<String>,
    root_key: String,
    ready_queue: VecDeque<String>,
    in_progress: HashSet<String>,
}

impl<R> Dag<R> {
    /// Create a DAG containing only its root entry.
    pub fn new(root_key: impl Into<String>, root_item: Arc<dyn TaskItem<R>>) -> Self {
        let root_key = root_key.into();
        let mut dag = Self {
            entries: HashMap::new(),
            insertion_order: Vec::new(),
            root_key: root_key.clone(),
            ready_queue: VecDeque::new(),
            in_progress: HashSet::new(),
        };
        dag.add_entry(Entry::new(root_key, root_item))
            .expect("root entry cannot collide in a fresh DAG");
        dag
    }

    /// Build a DAG from an existing (possibly shared) entry map, used when
    /// assembling a proxy's DAG from a snapshot of other DAGs.
    pub(crate) fn from_entries(entries: HashMap<String, EntryRef<R>>, root_key: String) -> Self {
        let mut insertion_order: Vec<String> = entries.keys().cloned().collect();
        insertion_order.sort();
        Self {
            entries,
            insertion_order,
            root_key,
            ready_queue: VecDeque::new(),
            in_progress: HashSet::new(),
        }
    }

    /// This DAG's designated root key.
    pub fn root_key(&self) -> &str {
        &self.root_key
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether this DAG holds any entries at all (it always holds at least
    /// its root).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a shared handle to the entry keyed `key`.
    pub fn entry(&self, key: &str) -> Option<EntryRef<R>> {
        self.entries.get(key).cloned()
    }

    /// A cheap clone of this DAG's entry map — entries alias, the map does
    /// not. Used to seed a proxy's DAG or to merge one group's entries into
    /// another's.
    pub(crate) fn snapshot_entries(&self) -> HashMap<String, EntryRef<R>> {
        self.entries.clone()
    }

    /// Merge another DAG's entries into this one. Keys already present are
    /// left untouched (they already alias the same entry).
    pub(crate) fn merge_entries(&mut self, other: HashMap<String, EntryRef<R>>) {
        for (key, entry) in other {
            if let std::collections::hash_map::Entry::Vacant(slot) = self.entries.entry(key.clone()) {
                slot.insert(entry);
                self.insertion_order.push(key);
            }
        }
    }

    /// Merge `other`'s entries into this DAG and add the edge `from -> to`
    /// as a single atomic operation: if the edge would create a cycle, the
    /// merge is rolled back and no entries from `other` are retained.
    ///
    /// Composition callers MUST use this instead of a bare
    /// `merge_entries` + `add_edge` pair — per spec.md §7, a rejected
    /// `CycleDetected` composition must leave the graph unmodified, and a
    /// merge that is never undone would leave `other`'s entries sitting in
    /// this DAG with no connecting edge, silently breaking completeness.
    pub(crate) fn merge_and_add_edge(
        &mut self,
        other: HashMap<String, EntryRef<R>>,
        from: &str,
        to: &str,
    ) -> Result<()> {
        let before: HashSet<String> = self.entries.keys().cloned().collect();
        self.merge_entries(other);
        if let Err(err) = self.add_edge(from, to) {
            let added: Vec<String> = self
                .entries
                .keys()
                .filter(|k| !before.contains(*k))
                .cloned()
                .collect();
            for key in &added {
                self.entries.remove(key);
            }
            self.insertion_order.retain(|k| before.contains(k));
            return Err(err);
        }
        Ok(())
    }

    /// Insert a new entry. Fails with [`GraphError::DuplicateKey`] if the
    /// key already exists.
    pub fn add_entry(&mut self, mut entry: Entry<R>) -> Result<()> {
        if self.entries.contains_key(&entry.key) {
            return Err(GraphError::duplicate_key(entry.key.clone()));
        }
        entry.pending_dependency_count = entry.dependencies.len();
        let key = entry.key.clone();
        self.entries.insert(key.clone(), Arc::new(RwLock::new(entry)));
        self.insertion_order.push(key);
        Ok(())
    }

    /// Add a dependency edge: `to` depends on `from`. Rejected with
    /// [`GraphError::CycleDetected`] if `from` is already (transitively)
    /// a dependent of `to`.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<()> {
        if !self.entries.contains_key(from) {
            return Err(GraphError::unknown_key(from));
        }
        if !self.entries.contains_key(to) {
            return Err(GraphError::unknown_key(to));
        }
        if self.has_edge(from, to) {
            // P5: idempotent re-addition.
            return Ok(());
        }
        if self.depends_on(from, to) {
            return Err(GraphError::cycle_detected(from, to));
        }

        {
            let from_entry = self.entries[from].clone();
            let mut from_guard = from_entry.write();
            from_guard.dependents.insert(to.to_string());
        }
        {
            let to_entry = self.entries[to].clone();
            let mut to_guard = to_entry.write();
            to_guard.dependencies.insert(from.to_string());
            to_guard.pending_dependency_count += 1;
        }
        trace!(from, to, "added dependency edge");
        Ok(())
    }

    /// Remove a dependency edge previously added with [`Self::add_edge`].
    /// Used by the proxy rewiring protocol; no-op if the edge is absent.
    pub(crate) fn remove_edge(&mut self, from: &str, to: &str) {
        if let Some(from_entry) = self.entries.get(from) {
            from_entry.write().dependents.remove(to);
        }
        if let Some(to_entry) = self.entries.get(to) {
            let mut guard = to_entry.write();
            if guard.dependencies.remove(from) {
                guard.pending_dependency_count = guard.pending_dependency_count.saturating_sub(1);
            }
        }
    }

    fn has_edge(&self, from: &str, to: &str) -> bool {
        self.entries
            .get(to)
            .map(|e| e.read().dependencies.contains(from))
            .unwrap_or(false)
    }

    /// True if `start` already (transitively) depends on `target`, i.e. a
    /// path `start -> ... -> target` exists along dependency edges.
    fn depends_on(&self, start: &str, target: &str) -> bool {
        let mut stack = vec![start.to_string()];
        let mut seen = HashSet::new();
        while let Some(key) = stack.pop() {
            if key == target {
                return true;
            }
            if !seen.insert(key.clone()) {
                continue;
            }
            if let Some(entry) = self.entries.get(&key) {
                for dep in entry.read().dependencies.iter() {
                    stack.push(dep.clone());
                }
            }
        }
        false
    }

    /// Reset every entry to `NotStarted` with its static dependency count,
    /// and seed the ready-queue with every dependency-free entry in
    /// insertion order.
    pub fn prepare_for_enumeration(&mut self) {
        self.ready_queue.clear();
        self.in_progress.clear();
        for key in &self.insertion_order {
            let Some(entry) = self.entries.get(key) else { continue };
            let mut guard = entry.write();
            guard.pending_dependency_count = guard.dependencies.len();
            guard.state = if guard.pending_dependency_count == 0 {
                EntryState::Ready
            } else {
                EntryState::NotStarted
            };
        }
        for key in &self.insertion_order {
            if let Some(entry) = self.entries.get(key) {
                if entry.read().state == EntryState::Ready {
                    self.ready_queue.push_back(key.clone());
                }
            }
        }
        debug!(entries = self.entries.len(), ready = self.ready_queue.len(), "prepared for enumeration");
    }

    /// Dequeue one ready entry and mark it `InProgress`. Returns `None`
    /// when the queue is empty and nothing is in progress.
    pub fn get_next(&mut self) -> Option<EntryRef<R>> {
        let key = self.ready_queue.pop_front()?;
        let entry = self.entries.get(&key)?.clone();
        entry.write().state = EntryState::InProgress;
        self.in_progress.insert(key);
        Some(entry)
    }

    /// Whether enumeration has more work: either the ready-queue is
    /// non-empty, or an entry is still in progress.
    pub fn has_remaining_work(&self) -> bool {
        !self.ready_queue.is_empty() || !self.in_progress.is_empty()
    }

    /// Mark `key` `Succeeded` and unblock any dependent whose count drops
    /// to zero, appending it to the ready-queue.
    pub fn report_completion(&mut self, key: &str) -> Result<()> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| GraphError::unknown_key(key))?
            .clone();
        {
            let mut guard = entry.write();
            if guard.state != EntryState::InProgress {
                return Err(GraphError::invalid_state(
                    key,
                    guard.state.to_string(),
                    EntryState::InProgress.to_string(),
                ));
            }
            guard.state = EntryState::Succeeded;
        }
        self.in_progress.remove(key);

        let dependents: Vec<String> = entry.read().dependents.iter().cloned().collect();
        for dependent_key in dependents {
            if let Some(dependent) = self.entries.get(&dependent_key) {
                let mut guard = dependent.write();
                if guard.pending_dependency_count > 0 {
                    guard.pending_dependency_count -= 1;
                }
                if guard.pending_dependency_count == 0 && guard.state == EntryState::NotStarted {
                    guard.state = EntryState::Ready;
                    drop(guard);
                    self.ready_queue.push_back(dependent_key);
                }
            }
        }
        trace!(key, "reported completion");
        Ok(())
    }

    /// Mark `key` `Faulted` and cascade-cancel every entry transitively
    /// dependent on it that has not yet started, so a host application can
    /// tell "never got a chance to run" apart from "ran and failed."
    pub fn report_failure(&mut self, key: &str) -> Result<Vec<String>> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| GraphError::unknown_key(key))?
            .clone();
        {
            let mut guard = entry.write();
            if guard.state != EntryState::InProgress {
                return Err(GraphError::invalid_state(
                    key,
                    guard.state.to_string(),
                    EntryState::InProgress.to_string(),
                ));
            }
            guard.state = EntryState::Faulted;
        }
        self.in_progress.remove(key);

        let cancelled = self.cancel_dependents(key);
        tracing::warn!(key, cancelled = cancelled.len(), "entry faulted, cascaded cancellation");
        Ok(cancelled)
    }

    /// BFS over `dependents` marking every reachable, not-yet-started entry
    /// `Cancelled` and removing it from the ready-queue.
    fn cancel_dependents(&mut self, from: &str) -> Vec<String> {
        let mut cancelled = Vec::new();
        let mut queue = VecDeque::new();
        if let Some(entry) = self.entries.get(from) {
            queue.extend(entry.read().dependents.iter().cloned());
        }
        let mut seen = HashSet::new();
        while let Some(key) = queue.pop_front() {
            if !seen.insert(key.clone()) {
                continue;
            }
            let Some(entry) = self.entries.get(&key) else { continue };
            let mut guard = entry.write();
            if matches!(guard.state, EntryState::NotStarted | EntryState::Ready) {
                guard.state = EntryState::Cancelled;
                cancelled.push(key.clone());
                queue.extend(guard.dependents.iter().cloned());
            }
            drop(guard);
        }
        self.ready_queue.retain(|k| !cancelled.contains(k));
        cancelled
    }

    /// Compute statistics across every entry currently held.
    pub fn stats(&self) -> DagStats {
        let mut stats = DagStats {
            total: self.entries.len(),
            ..Default::default()
        };
        for entry in self.entries.values() {
            match entry.read().state {
                EntryState::NotStarted => stats.not_started += 1,
                EntryState::Ready => stats.ready += 1,
                EntryState::InProgress => stats.in_progress += 1,
                EntryState::Succeeded => stats.succeeded += 1,
                EntryState::Faulted => stats.faulted += 1,
                EntryState::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}
