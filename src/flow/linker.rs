//! Parent linking. Each node names the account that sent it funds; the node is
//! attached under every node of that account one layer up, or under every
//! node of that account when none sits one layer up.

use tracing::debug;

use super::nodes::{AccountIndex, FlowNode, NodeIdx};
use super::resolver::{value_to_key, ColumnResolver, NormalizedRow};

/// Link every node to its parent candidates. Returns the number of
/// parent → child edges added.
///
/// Single pass keyed on account ids, so cyclic declarations (A sends to B,
/// B sends to A, or an account naming itself) terminate and simply produce
/// cyclic child lists.
pub fn link_parents(
    nodes: &mut [FlowNode],
    index: &AccountIndex,
    resolver: &ColumnResolver,
) -> usize {
    let mut relationships = 0;

    for idx in 0..nodes.len() {
        let Some(parent_account) = parent_account(&nodes[idx], resolver) else {
            continue;
        };

        let candidates = index.get(&parent_account);
        if candidates.is_empty() {
            debug!(
                "Node {}: parent account {} not present in data",
                nodes[idx].id, parent_account
            );
            continue;
        }

        let expected = nodes[idx].layer.checked_sub(1);
        let strict: Vec<NodeIdx> = candidates
            .iter()
            .copied()
            .filter(|&c| Some(nodes[c].layer) == expected)
            .collect();
        let chosen = if strict.is_empty() {
            candidates
        } else {
            strict.as_slice()
        };

        for &parent in chosen {
            nodes[parent].children.push(idx);
            relationships += 1;
        }
        nodes[idx].has_parent = true;
    }

    relationships
}

/// The parent account named in a node's attributes, if any. Empty strings and
/// the literal `"null"` count as no parent.
fn parent_account(node: &FlowNode, resolver: &ColumnResolver) -> Option<String> {
    NormalizedRow::new(&node.attributes)
        .resolve(&resolver.parent)
        .and_then(value_to_key)
        .filter(|key| !key.is_empty() && key != "null")
}
