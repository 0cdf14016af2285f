#![allow(clippy::result_large_err)]
//! # Task-Group DAG Scheduler
//!
//! Coordinates execution of interdependent work items across multiple
//! dynamically-composed DAGs that share nodes, including late-arriving
//! "post-run" dependents threaded in through a proxy-node rewiring
//! protocol.
//!
//! ## Architecture
//!
//! - **Entry**: one work item plus dependency/dependent bookkeeping.
//! - **DAG**: topological enumeration over a keyed map of entries.
//! - **TaskGroup**: a DAG plus a root, parent back-references, and
//!   post-run dependents.
//! - **ProxyWrapper**: late-activated shadow root that preserves ordering
//!   when post-run dependents are attached after parents already exist.
//! - **InvocationDriver**: streams ready entries into execution.

pub mod config;
pub mod dag;
pub mod error;
pub mod telemetry;

pub use error::{GraphError, Result};

/// Re-export of the commonly used scheduler types.
pub mod prelude {
    pub use crate::config::RuntimeConfig;
    pub use crate::dag::{
        Dag, DagStats, DriverEvent, Entry, EntryState, InvocationContext, InvocationDriver,
        NoopItem, ProxyWrapper, TaskGroup, TaskItem, TerminationStrategy,
    };
    pub use crate::error::{GraphError, Result};
}
