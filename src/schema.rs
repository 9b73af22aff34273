//! Output types handed to the rendering layer.
//!
//! The nested hierarchy follows the `{ name, attributes, children }` shape
//! tree renderers consume; the graph view is a flat, duplicate-free
//! alternative for consumers that handle shared nodes and cycles themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::flow::roots::RootRule;

/// Stored result of one upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowRecord {
    pub id: String,
    pub source_file: String,
    /// SHA-256 of the uploaded bytes.
    pub source_hash: String,
    pub sheet_name: String,
    pub profile: String,
    pub extracted_at: DateTime<Utc>,
    pub stats: BuildStats,
    pub hierarchy: FlowHierarchy,
}

impl FlowRecord {
    pub fn new(
        source_file: String,
        source_hash: String,
        sheet_name: String,
        profile: String,
        stats: BuildStats,
        hierarchy: FlowHierarchy,
    ) -> Self {
        Self {
            id: format!("flow_{}", Uuid::new_v4().simple()),
            source_file,
            source_hash,
            sheet_name,
            profile,
            extracted_at: Utc::now(),
            stats,
            hierarchy,
        }
    }
}

/// Counts gathered while building, in place of progress logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStats {
    pub rows: usize,
    pub skipped_rows: usize,
    pub nodes: usize,
    pub distinct_accounts: usize,
    pub relationships: usize,
    pub roots: usize,
    pub root_rule: RootRule,
    /// Nodes in parent cycles that no root reaches; listed in the graph view.
    pub unreachable_nodes: usize,
}

/// Synthetic top of the hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowHierarchy {
    pub name: String,
    pub attributes: HierarchySummary,
    #[serde(default)]
    pub children: Vec<HierarchyNode>,
}

/// Aggregates on the synthetic root. Both are omitted on the "No Data" placeholder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchySummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_accounts: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_layers: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub id: String,
    /// Account id, displayed as the node label.
    pub name: String,
    pub layer: u32,
    pub attributes: Map<String, Value>,
    /// Set on a repeat of an ancestor; its children are not expanded again.
    #[serde(default, skip_serializing_if = "is_false")]
    pub cycle: bool,
    /// Set when output limits stopped expansion below this node.
    #[serde(default, skip_serializing_if = "is_false")]
    pub truncated: bool,
    #[serde(default)]
    pub children: Vec<HierarchyNode>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Flat view: each node once, edges parent → child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    pub roots: Vec<String>,
    /// Nodes no root reaches, so absent from the nested hierarchy.
    #[serde(default)]
    pub unreachable: Vec<String>,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    pub layer: u32,
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
}

/// A single node with its neighbours referenced by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDetail {
    pub id: String,
    pub name: String,
    pub layer: u32,
    pub attributes: Map<String, Value>,
    pub children: Vec<String>,
    pub parents: Vec<String>,
}
