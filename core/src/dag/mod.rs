//! Task-group DAG scheduler.
//!
//! Five cooperating pieces, leaves first: [`entry::Entry`] wraps one work
//! item; [`graph::Dag`] owns topological enumeration over a keyed map of
//! entries; [`task_group::TaskGroup`] augments a DAG with a root, parent
//! back-references, and post-run dependents; [`proxy::ProxyWrapper`]
//! interposes a synthetic root when post-run dependents are added after
//! parents already point at the real root; [`driver`] streams ready entries
//! into execution.

pub mod driver;
pub mod entry;
pub mod graph;
pub mod proxy;
pub mod task_group;

pub use driver::{DriverEvent, InvocationDriver};
pub use entry::{Entry, EntryState, InvocationContext, NoopItem, TaskItem};
pub use graph::{Dag, DagStats};
pub use proxy::ProxyWrapper;
pub use task_group::TaskGroup;

use serde::{Deserialize, Serialize};

/// Policy governing the invocation driver's behavior when an entry faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationStrategy {
    /// Stop dispatching new entries once any entry faults; entries already
    /// in progress are allowed to finish, then the output stream signals
    /// failure.
    TerminateOnInProgressCompletion,
    /// Keep dispatching entries that are not transitively dependent on the
    /// faulted entry; surface the collected errors once enumeration ends.
    TerminateOnHubCompletion,
}

impl Default for TerminationStrategy {
    fn default() -> Self {
        Self::TerminateOnInProgressCompletion
    }
}
