//! Root selection.

use serde::{Deserialize, Serialize};

use super::nodes::{FlowNode, NodeIdx};

/// Which rule produced the primary root set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootRule {
    /// No nodes at all.
    Empty,
    /// Nodes no parent claimed.
    Unparented,
    /// Every node had a parent; layer-0 nodes were used.
    LayerZero,
    /// Every node had a parent and none sat at layer 0; the first node was used.
    FirstNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RootSelection {
    pub roots: Vec<NodeIdx>,
    pub rule: RootRule,
    /// Nodes no root reaches: parent cycles detached from every root. They are
    /// reported, never promoted to roots.
    pub unreachable: Vec<NodeIdx>,
}

/// Pick top-level nodes: unparented nodes, else layer-0 nodes, else the first
/// node. The fallbacks only run when the previous rule found nothing.
pub fn select_roots(nodes: &[FlowNode]) -> RootSelection {
    if nodes.is_empty() {
        return RootSelection {
            roots: Vec::new(),
            rule: RootRule::Empty,
            unreachable: Vec::new(),
        };
    }

    let mut rule = RootRule::Unparented;
    let mut roots: Vec<NodeIdx> = (0..nodes.len()).filter(|&i| !nodes[i].has_parent).collect();

    if roots.is_empty() {
        rule = RootRule::LayerZero;
        roots = (0..nodes.len()).filter(|&i| nodes[i].layer == 0).collect();
    }
    if roots.is_empty() {
        rule = RootRule::FirstNode;
        roots = vec![0];
    }

    let mut reached = vec![false; nodes.len()];
    for &root in &roots {
        mark_reachable(nodes, root, &mut reached);
    }

    let unreachable = (0..nodes.len()).filter(|&i| !reached[i]).collect();

    RootSelection {
        roots,
        rule,
        unreachable,
    }
}

/// Iterative walk so long parent chains cannot overflow the stack.
pub fn mark_reachable(nodes: &[FlowNode], start: NodeIdx, reached: &mut [bool]) {
    let mut stack = vec![start];
    while let Some(idx) = stack.pop() {
        if reached[idx] {
            continue;
        }
        reached[idx] = true;
        stack.extend(nodes[idx].children.iter().filter(|&&c| !reached[c]));
    }
}
