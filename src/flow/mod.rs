//! Money-flow reconstruction from transaction rows.
//!
//! rows → [`nodes::build_nodes`] → [`linker::link_parents`] →
//! [`roots::select_roots`] → [`FlowTree`]. The build never fails: empty or
//! unrecognisable input yields the "No Data" placeholder, and cycles or
//! duplicate accounts degrade to a best-effort hierarchy.

pub mod linker;
pub mod nodes;
pub mod resolver;
pub mod roots;
mod views;

use tracing::{info, warn};

use crate::schema::BuildStats;
use nodes::{build_nodes, FlowNode, NodeIdx};
use resolver::{ColumnResolver, Row};
use roots::select_roots;

pub use views::{NestLimits, MAX_NEST_DEPTH};

pub const ROOT_NAME: &str = "Transaction Flow";
pub const EMPTY_NAME: &str = "No Data";

/// The linked node arena plus the selected roots.
#[derive(Debug, Clone)]
pub struct FlowTree {
    pub nodes: Vec<FlowNode>,
    pub roots: Vec<NodeIdx>,
    /// Nodes caught in parent cycles that no root reaches.
    pub unreachable: Vec<NodeIdx>,
    /// Number of distinct layer values observed.
    pub total_layers: usize,
    pub stats: BuildStats,
}

impl FlowTree {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Build the money-flow hierarchy for `rows`.
pub fn build_tree(rows: &[Row], resolver: &ColumnResolver) -> FlowTree {
    info!("Building flow tree from {} rows", rows.len());

    let built = build_nodes(rows, resolver);
    let mut nodes = built.nodes;
    info!(
        "Created {} nodes ({} rows skipped without an account number)",
        nodes.len(),
        built.skipped_rows
    );

    let relationships = linker::link_parents(&mut nodes, &built.index, resolver);
    info!("Parent-child relationships found: {}", relationships);

    let selection = select_roots(&nodes);
    info!(
        "Selected {} root(s) by {:?} rule",
        selection.roots.len(),
        selection.rule
    );
    if !selection.unreachable.is_empty() {
        warn!(
            "{} node(s) sit in parent cycles no root reaches",
            selection.unreachable.len()
        );
    }

    let stats = BuildStats {
        rows: rows.len(),
        skipped_rows: built.skipped_rows,
        nodes: nodes.len(),
        distinct_accounts: built.index.len(),
        relationships,
        roots: selection.roots.len(),
        root_rule: selection.rule,
        unreachable_nodes: selection.unreachable.len(),
    };

    FlowTree {
        nodes,
        roots: selection.roots,
        unreachable: selection.unreachable,
        total_layers: built.layers.len(),
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::roots::{mark_reachable, RootRule};
    use serde_json::{json, Value};

    fn rows(value: Value) -> Vec<Row> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().cloned().unwrap())
            .collect()
    }

    fn build(value: Value) -> FlowTree {
        build_tree(&rows(value), &ColumnResolver::default())
    }

    fn ids(tree: &FlowTree, idxs: &[NodeIdx]) -> Vec<String> {
        idxs.iter().map(|&i| tree.nodes[i].account_id.clone()).collect()
    }

    #[test]
    fn test_basic_example() {
        let tree = build(json!([
            { "AccountNo": "A", "Layer": 0 },
            { "AccountNo": "B", "Layer": 1, "Parent": "A" },
            { "AccountNo": "C", "Layer": 1, "Parent": "A" },
        ]));
        assert_eq!(ids(&tree, &tree.roots), vec!["A"]);
        assert_eq!(ids(&tree, &tree.nodes[0].children), vec!["B", "C"]);
        assert_eq!(tree.nodes.len(), 3);
        assert_eq!(tree.total_layers, 2);
        assert_eq!(tree.stats.relationships, 2);
        assert_eq!(tree.stats.root_rule, RootRule::Unparented);
    }

    #[test]
    fn test_total_accounts_counts_resolvable_rows_only() {
        let tree = build(json!([
            { "Account No": "A" },
            { "Account No": "A" },
            { "Narration": "opening balance" },
            { "AC No": 42, "Level": 3 },
        ]));
        assert_eq!(tree.nodes.len(), 3);
        assert_eq!(tree.stats.skipped_rows, 1);
        assert_eq!(tree.stats.distinct_accounts, 2);
        assert_eq!(tree.total_layers, 2);
    }

    #[test]
    fn test_detached_cycle_keeps_unparented_roots() {
        let tree = build(json!([
            { "AccountNo": "A", "Layer": 0 },
            { "AccountNo": "X", "Layer": 2, "Parent": "Y" },
            { "AccountNo": "Y", "Layer": 2, "Parent": "X" },
        ]));
        let root_ids: Vec<&str> = tree.roots.iter().map(|&r| tree.nodes[r].id.as_str()).collect();
        assert_eq!(root_ids, vec!["A-0"]);
        assert_eq!(ids(&tree, &tree.unreachable), vec!["X", "Y"]);
        assert_eq!(tree.stats.roots, 1);
        assert_eq!(tree.stats.unreachable_nodes, 2);
    }

    #[test]
    fn test_reached_and_unreachable_cover_every_node() {
        let tree = build(json!([
            { "AccountNo": "A", "Layer": 0 },
            { "AccountNo": "B", "Layer": 1, "Parent": "A" },
            { "AccountNo": "X", "Layer": 2, "Parent": "Y" },
            { "AccountNo": "Y", "Layer": 2, "Parent": "X" },
            { "AccountNo": "Z", "Layer": 3, "Parent": "Z" },
        ]));
        let mut reached = vec![false; tree.nodes.len()];
        for &root in &tree.roots {
            mark_reachable(&tree.nodes, root, &mut reached);
        }
        for (idx, &hit) in reached.iter().enumerate() {
            assert_eq!(hit, !tree.unreachable.contains(&idx));
        }
        assert_eq!(ids(&tree, &tree.roots), vec!["A"]);
        assert_eq!(ids(&tree, &tree.unreachable), vec!["X", "Y", "Z"]);
    }

    #[test]
    fn test_fully_cyclic_input_uses_layer_zero() {
        let tree = build(json!([
            { "AccountNo": "A", "Layer": 0, "Parent": "B" },
            { "AccountNo": "B", "Layer": 1, "Parent": "A" },
        ]));
        assert_eq!(ids(&tree, &tree.roots), vec!["A"]);
        assert_eq!(tree.stats.root_rule, RootRule::LayerZero);
        assert!(tree.unreachable.is_empty());
    }

    #[test]
    fn test_build_is_idempotent() {
        let input = rows(json!([
            { "AccountNo": "A", "Layer": 0 },
            { "AccountNo": "A", "Layer": 0 },
            { "AccountNo": "B", "Layer": 1, "Parent": "A" },
            { "AccountNo": "C", "Layer": 4, "Parent": "B" },
        ]));
        let resolver = ColumnResolver::default();
        let first = build_tree(&input, &resolver);
        let second = build_tree(&input, &resolver);
        assert_eq!(first.nodes, second.nodes);
        assert_eq!(first.roots, second.roots);
        assert_eq!(first.stats, second.stats);
    }

    #[test]
    fn test_no_rows() {
        let tree = build(json!([]));
        assert!(tree.is_empty());
        assert!(tree.roots.is_empty());
        assert_eq!(tree.stats.root_rule, RootRule::Empty);
    }
}
