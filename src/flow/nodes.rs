//! Node construction: one node per row that names an account.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::debug;

use super::resolver::{value_to_key, ColumnResolver, NormalizedRow, Row};

/// Position of a node in the flat node list.
pub type NodeIdx = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct FlowNode {
    /// `{account_id}-{row_index}`, unique even when accounts repeat.
    pub id: String,
    pub account_id: String,
    pub layer: u32,
    /// Resolved fields followed by the raw row.
    pub attributes: Row,
    pub children: Vec<NodeIdx>,
    pub has_parent: bool,
}

/// Account id → every node carrying it, in row order.
#[derive(Debug, Clone, Default)]
pub struct AccountIndex {
    by_account: HashMap<String, Vec<NodeIdx>>,
}

impl AccountIndex {
    fn insert(&mut self, account_id: &str, idx: NodeIdx) {
        self.by_account
            .entry(account_id.to_string())
            .or_default()
            .push(idx);
    }

    /// Nodes sharing `account_id`; empty when the account never appears.
    pub fn get(&self, account_id: &str) -> &[NodeIdx] {
        self.by_account
            .get(account_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of distinct account ids.
    pub fn len(&self) -> usize {
        self.by_account.len()
    }
}

/// Output of the node-building pass.
#[derive(Debug, Clone, Default)]
pub struct BuiltNodes {
    pub nodes: Vec<FlowNode>,
    pub index: AccountIndex,
    /// Layer → nodes, for summary statistics only.
    pub layers: BTreeMap<u32, Vec<NodeIdx>>,
    pub skipped_rows: usize,
}

/// Turn rows into nodes. Rows without an account id are skipped; every
/// other row becomes exactly one node, in input order.
pub fn build_nodes(rows: &[Row], resolver: &ColumnResolver) -> BuiltNodes {
    let mut built = BuiltNodes::default();

    for (row_index, row) in rows.iter().enumerate() {
        let view = NormalizedRow::new(row);

        let Some(account_value) = view.resolve(&resolver.account) else {
            debug!("Skipping row {}: no account number found", row_index);
            built.skipped_rows += 1;
            continue;
        };
        let account_id = match value_to_key(account_value) {
            Some(key) if !key.is_empty() => key,
            _ => {
                debug!("Skipping row {}: account cell is not a scalar", row_index);
                built.skipped_rows += 1;
                continue;
            }
        };

        let layer_value = view.resolve(&resolver.layer);
        let layer = coerce_layer(layer_value).unwrap_or_else(|| {
            debug!(
                "Row {}: layer value {:?} is not a non-negative integer, using 0",
                row_index, layer_value
            );
            0
        });

        let mut attributes = Row::new();
        attributes.insert("accountNo".to_string(), account_value.clone());
        attributes.insert(
            "layer".to_string(),
            layer_value.cloned().unwrap_or_else(|| Value::from(0)),
        );
        for (key, aliases) in &resolver.attributes {
            let value = view.resolve(aliases).cloned().unwrap_or(Value::Null);
            attributes.insert(key.clone(), value);
        }
        for (key, value) in row {
            attributes.insert(key.clone(), value.clone());
        }

        let idx = built.nodes.len();
        built.index.insert(&account_id, idx);
        built.layers.entry(layer).or_default().push(idx);
        built.nodes.push(FlowNode {
            id: format!("{}-{}", account_id, row_index),
            account_id,
            layer,
            attributes,
            children: Vec::new(),
            has_parent: false,
        });
    }

    built
}

/// Layer cell → hop count. `None` input means the column is absent (layer 0);
/// `None` output means the value could not be read as a non-negative integer.
pub fn coerce_layer(value: Option<&Value>) -> Option<u32> {
    let raw = match value {
        None => return Some(0),
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().and_then(whole)),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole))
        }
        Some(_) => None,
    };
    raw.and_then(|l| u32::try_from(l).ok())
}

fn whole(f: f64) -> Option<u64> {
    (f.is_finite() && f >= 0.0 && f.fract() == 0.0).then_some(f as u64)
}
