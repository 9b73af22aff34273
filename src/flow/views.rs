//! Rendering-facing views of a [`FlowTree`].

use super::nodes::NodeIdx;
use super::{FlowTree, EMPTY_NAME, ROOT_NAME};
use crate::schema::{
    FlowGraph, FlowHierarchy, GraphEdge, GraphNode, HierarchyNode, HierarchySummary, NodeDetail,
};

/// Hard ceiling on nesting depth; the nested walk recurses once per level.
pub const MAX_NEST_DEPTH: usize = 1024;

/// Bounds on the nested view. Shared children are expanded under every
/// parent, so a dense multi-parent graph can grow far beyond its node count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NestLimits {
    pub max_depth: usize,
    pub max_nodes: usize,
}

impl Default for NestLimits {
    fn default() -> Self {
        Self {
            max_depth: 256,
            max_nodes: 200_000,
        }
    }
}

impl FlowTree {
    /// Nested `{ name, attributes, children }` hierarchy under the synthetic root.
    pub fn to_hierarchy(&self, limits: NestLimits) -> FlowHierarchy {
        if self.is_empty() {
            return FlowHierarchy {
                name: EMPTY_NAME.to_string(),
                attributes: HierarchySummary::default(),
                children: Vec::new(),
            };
        }

        let mut nester = Nester {
            tree: self,
            limits: NestLimits {
                max_depth: limits.max_depth.min(MAX_NEST_DEPTH),
                ..limits
            },
            emitted: 0,
            on_path: vec![false; self.nodes.len()],
        };
        let children = self.roots.iter().map(|&r| nester.nest(r, 1)).collect();

        FlowHierarchy {
            name: ROOT_NAME.to_string(),
            attributes: HierarchySummary {
                total_accounts: Some(self.nodes.len()),
                total_layers: Some(self.total_layers),
            },
            children,
        }
    }

    /// Flat node and edge lists; each node appears once.
    pub fn to_graph(&self) -> FlowGraph {
        FlowGraph {
            roots: self.roots.iter().map(|&r| self.nodes[r].id.clone()).collect(),
            unreachable: self
                .unreachable
                .iter()
                .map(|&i| self.nodes[i].id.clone())
                .collect(),
            nodes: self
                .nodes
                .iter()
                .map(|n| GraphNode {
                    id: n.id.clone(),
                    name: n.account_id.clone(),
                    layer: n.layer,
                    attributes: n.attributes.clone(),
                })
                .collect(),
            edges: self
                .nodes
                .iter()
                .flat_map(|parent| {
                    parent.children.iter().map(|&c| GraphEdge {
                        from: parent.id.clone(),
                        to: self.nodes[c].id.clone(),
                    })
                })
                .collect(),
        }
    }

    /// Look up one node by id, with parent and child ids.
    pub fn node_detail(&self, node_id: &str) -> Option<NodeDetail> {
        let idx = self.nodes.iter().position(|n| n.id == node_id)?;
        let node = &self.nodes[idx];
        let parents = self
            .nodes
            .iter()
            .filter(|p| p.children.contains(&idx))
            .map(|p| p.id.clone())
            .collect();

        Some(NodeDetail {
            id: node.id.clone(),
            name: node.account_id.clone(),
            layer: node.layer,
            attributes: node.attributes.clone(),
            children: node.children.iter().map(|&c| self.nodes[c].id.clone()).collect(),
            parents,
        })
    }
}

struct Nester<'a> {
    tree: &'a FlowTree,
    limits: NestLimits,
    emitted: usize,
    on_path: Vec<bool>,
}

impl Nester<'_> {
    fn nest(&mut self, idx: NodeIdx, depth: usize) -> HierarchyNode {
        let tree = self.tree;
        let node = &tree.nodes[idx];
        self.emitted += 1;

        let mut out = HierarchyNode {
            id: node.id.clone(),
            name: node.account_id.clone(),
            layer: node.layer,
            attributes: node.attributes.clone(),
            cycle: false,
            truncated: false,
            children: Vec::new(),
        };

        if self.on_path[idx] {
            out.cycle = true;
            return out;
        }
        if node.children.is_empty() {
            return out;
        }
        if depth >= self.limits.max_depth || self.emitted >= self.limits.max_nodes {
            out.truncated = true;
            return out;
        }

        self.on_path[idx] = true;
        for &child in &node.children {
            let nested = self.nest(child, depth + 1);
            out.children.push(nested);
        }
        self.on_path[idx] = false;

        out
    }
}
