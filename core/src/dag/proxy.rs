//! ProxyWrapper: the late-activated shadow structure that preserves
//! ordering when post-run dependents are attached after parents already
//! point at a group's real root.
//!
//! See [`super::task_group::TaskGroup::add_post_run_dependent_task_group`]
//! for the rewiring protocol itself; this type is just the handle a
//! [`super::task_group::TaskGroup`] holds once that protocol has fired.

use super::task_group::TaskGroup;

/// Owns the synthetic task group created the first time a post-run
/// dependent is attached to some real root `F`. Its root entry carries the
/// key `proxy-<F>` and a no-op work item; once active it sits between `F`
/// and every TaskGroup that depended on `F` before activation.
pub struct ProxyWrapper<R> {
    /// The synthetic task group rooted at `proxy-<F>`.
    pub proxy_task_group: TaskGroup<R>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::entry::NoopItem;
    use crate::dag::TerminationStrategy;
    use std::sync::Arc;

    #[test]
    fn test_proxy_wrapper_exposes_root_key() {
        let tg = TaskGroup::new(
            "proxy-F",
            Arc::new(NoopItem::new(0u32)),
            TerminationStrategy::TerminateOnInProgressCompletion,
        );
        let wrapper = ProxyWrapper {
            proxy_task_group: tg.clone(),
        };
        assert_eq!(wrapper.proxy_task_group.root_key(), "proxy-F");
        assert!(wrapper.proxy_task_group.is_same_group(&tg));
    }
}
