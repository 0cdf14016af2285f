//! Integration tests for multi-DAG composition and the proxy rewiring
//! protocol, covering the shapes and properties a task-group scheduler must
//! satisfy: topological order, completeness, idempotent composition, and
//! proxy interposition after late-arriving post-run dependents.

use std::sync::Arc;

use taskgraph_core::dag::{Entry, NoopItem, TaskGroup, TaskItem};
use taskgraph_core::dag::TerminationStrategy;

fn item() -> Arc<dyn TaskItem<u32>> {
    Arc::new(NoopItem::new(0u32))
}

/// Build the six-node "sample shape": a leaf with no dependencies, three
/// entries that each depend only on the leaf, a hub that depends on two of
/// those three, and a root that depends on the remaining entry plus the
/// hub.
///
/// `letters` is `[leaf, a, b, c, hub, root]`, e.g. `["A","B","C","D","E","F"]`.
fn sample_shape(letters: [&str; 6]) -> TaskGroup<u32> {
    let [leaf, a, b, c, hub, root] = letters;
    let group = TaskGroup::new(root, item(), TerminationStrategy::TerminateOnInProgressCompletion);
    for key in [leaf, a, b, c, hub] {
        group.add_entry(Entry::new(key, item())).unwrap();
    }
    group.add_edge(leaf, a).unwrap();
    group.add_edge(leaf, b).unwrap();
    group.add_edge(leaf, c).unwrap();
    group.add_edge(b, hub).unwrap();
    group.add_edge(c, hub).unwrap();
    group.add_edge(a, root).unwrap();
    group.add_edge(hub, root).unwrap();
    group
}

fn enumerate(group: &TaskGroup<u32>) -> Vec<String> {
    group.prepare_for_enumeration();
    let mut emitted = Vec::new();
    while let Some(entry) = group.get_next() {
        let key = entry.read().key.clone();
        group.report_completion(&key).unwrap();
        emitted.push(key);
    }
    emitted
}

fn pos(emitted: &[String], key: &str) -> usize {
    emitted.iter().position(|k| k == key).unwrap()
}

#[test]
fn s1_single_group_sample_shape() {
    let g1 = sample_shape(["A", "B", "C", "D", "E", "F"]);
    let emitted = enumerate(&g1);

    assert_eq!(emitted.len(), 6);
    assert_eq!(emitted.last().unwrap(), "F");
    assert!(pos(&emitted, "B") < pos(&emitted, "F"));
    assert!(pos(&emitted, "C") < pos(&emitted, "E"));
    assert!(pos(&emitted, "C") < pos(&emitted, "F"));
    assert!(pos(&emitted, "D") < pos(&emitted, "E"));
    assert!(pos(&emitted, "D") < pos(&emitted, "F"));
    assert!(pos(&emitted, "E") < pos(&emitted, "F"));
}

#[test]
fn s2_two_groups_with_dependency_link() {
    let g1 = sample_shape(["A", "B", "C", "D", "E", "F"]);
    let g2 = sample_shape(["G", "H", "I", "J", "K", "L"]);

    g2.add_dependency_task_group(&g1).unwrap();

    let emitted = enumerate(&g2);
    assert_eq!(emitted.len(), 12);
    for letter in ["A", "B", "C", "D", "E", "F"] {
        assert!(pos(&emitted, letter) < pos(&emitted, "L"));
    }
}

#[test]
fn s3_post_run_dependent_activates_proxy() {
    let g1 = sample_shape(["A", "B", "C", "D", "E", "F"]);
    let g2 = sample_shape(["G", "H", "I", "J", "K", "L"]);

    g1.add_post_run_dependent_task_group(&g2).unwrap();

    let proxy = g1.active_proxy().expect("proxy should be active");
    assert_eq!(proxy.root_key(), "proxy-F");

    let emitted = enumerate(&proxy);
    assert_eq!(emitted.len(), 13);
    assert_eq!(emitted.last().unwrap(), "proxy-F");
    for letter in ["A", "B", "C", "D", "E", "F"] {
        assert!(pos(&emitted, letter) < pos(&emitted, "proxy-F"));
    }
    for letter in ["G", "H", "I", "J", "K", "L"] {
        assert!(pos(&emitted, letter) < pos(&emitted, "proxy-F"));
    }
}

#[test]
fn s4_parent_reassignment_on_late_post_run() {
    let g1 = sample_shape(["A", "B", "C", "D", "E", "F"]);
    let g2 = sample_shape(["G", "H", "I", "J", "K", "L"]);
    let g3 = sample_shape(["M", "N", "O", "P", "Q", "R"]);

    g2.add_dependency_task_group(&g1).unwrap();
    g1.add_post_run_dependent_task_group(&g3).unwrap();

    let proxy = g1.active_proxy().expect("proxy should be active");
    let g1_parents = g1.parent_dags();
    assert_eq!(g1_parents.len(), 2);
    assert!(g1_parents.iter().any(|p| p.is_same_group(&g3)));
    assert!(g1_parents.iter().any(|p| p.is_same_group(&proxy)));

    let proxy_parents = proxy.parent_dags();
    assert_eq!(proxy_parents.len(), 1);
    assert!(proxy_parents[0].is_same_group(&g2));

    let emitted = enumerate(&g2);
    assert_eq!(emitted.len(), 19);
    for letter in ["M", "N", "O", "P", "Q", "R"] {
        assert!(pos(&emitted, letter) < pos(&emitted, "L"));
    }
}

#[test]
fn s5_nested_proxies() {
    let g1 = sample_shape(["A", "B", "C", "D", "E", "F"]);
    let g2 = sample_shape(["G", "H", "I", "J", "K", "L"]);
    let g3 = sample_shape(["M", "N", "O", "P", "Q", "R"]);
    let g4 = sample_shape(["S", "T", "U", "V", "W", "X"]);
    let g5 = sample_shape(["AA", "BB", "CC", "DD", "EE", "FF"]);

    g2.add_dependency_task_group(&g1).unwrap();
    g1.add_post_run_dependent_task_group(&g3).unwrap();
    g4.add_post_run_dependent_task_group(&g5).unwrap();
    g1.add_post_run_dependent_task_group(&g4).unwrap();

    let proxy_f = g1.active_proxy().expect("proxy-F should be active");
    let proxy_x = g4.active_proxy().expect("proxy-X should be active");
    assert_eq!(proxy_x.root_key(), "proxy-X");

    let emitted = enumerate(&proxy_f);
    assert_eq!(emitted.len(), 26);
    assert!(pos(&emitted, "proxy-X") < pos(&emitted, "proxy-F"));
    for letter in ["S", "T", "U", "V", "W", "X", "AA", "BB", "CC", "DD", "EE", "FF"] {
        assert!(pos(&emitted, letter) < pos(&emitted, "proxy-X"));
    }
}

#[test]
fn s6_independence_without_post_run_dependent() {
    let g1 = sample_shape(["A", "B", "C", "D", "E", "F"]);
    let g2 = sample_shape(["G", "H", "I", "J", "K", "L"]);
    g2.add_dependency_task_group(&g1).unwrap();

    assert!(g1.active_proxy().is_none());
    let emitted = enumerate(&g1);
    assert_eq!(emitted.len(), 6);
    for letter in ["G", "H", "I", "J", "K", "L"] {
        assert!(!emitted.contains(&letter.to_string()));
    }
}

#[test]
fn p5_dependency_composition_is_idempotent() {
    let g1 = sample_shape(["A", "B", "C", "D", "E", "F"]);
    let g2 = sample_shape(["G", "H", "I", "J", "K", "L"]);

    g2.add_dependency_task_group(&g1).unwrap();
    g2.add_dependency_task_group(&g1).unwrap();

    assert_eq!(g1.parent_dags().len(), 1);
    let emitted = enumerate(&g2);
    assert_eq!(emitted.len(), 12);
}

#[test]
fn p2_no_duplicate_emission() {
    let g1 = sample_shape(["A", "B", "C", "D", "E", "F"]);
    let emitted = enumerate(&g1);
    let mut sorted = emitted.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), emitted.len());
}

#[test]
fn cycle_across_groups_is_rejected() {
    let g1 = sample_shape(["A", "B", "C", "D", "E", "F"]);
    let g2 = sample_shape(["G", "H", "I", "J", "K", "L"]);

    g2.add_dependency_task_group(&g1).unwrap();
    let err = g1.add_dependency_task_group(&g2).unwrap_err();
    assert!(matches!(err, taskgraph_core::error::GraphError::CycleDetected { .. }));

    // The rejected composition must leave g1 exactly as it was: none of
    // g2's keys may have been retained without a connecting edge.
    let emitted = enumerate(&g1);
    let mut sorted = emitted.clone();
    sorted.sort();
    assert_eq!(sorted, vec!["A", "B", "C", "D", "E", "F"]);
}
