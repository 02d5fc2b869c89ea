//! Tree assembly from resolved records.
//!
//! Records arrive in any order and may reference the same cell from several
//! parents, so the tree is built only after resolution, in one DFS pass:
//!
//! - the first occurrence of an id owns its subtree
//! - later occurrences (a cell shared by two parents) become aliases that
//!   carry the resolved title and kind but no children
//! - a child pointing back at one of its own ancestors is dropped
//! - ids without a record stay unresolved (title = id)

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::types::{DocumentNode, NodeId, NodeKind, NodeRecord};

/// Build the document tree rooted at `root`
///
/// `root_title` names the root while its own record is missing or untitled.
pub fn assemble(
    root: &NodeId,
    root_title: &str,
    records: &HashMap<NodeId, NodeRecord>,
) -> DocumentNode {
    let mut expanded = HashSet::new();
    let mut ancestors = HashSet::new();
    let mut tree = build(root, records, &mut expanded, &mut ancestors);

    if tree.kind == NodeKind::Unknown {
        tree.kind = NodeKind::Root;
    }
    if tree.title == root.as_str() && !root_title.is_empty() {
        tree.title = root_title.to_string();
    }
    tree
}

fn build(
    id: &NodeId,
    records: &HashMap<NodeId, NodeRecord>,
    expanded: &mut HashSet<NodeId>,
    ancestors: &mut HashSet<NodeId>,
) -> DocumentNode {
    let mut node = DocumentNode::unresolved(id.clone());
    let Some(record) = records.get(id) else {
        return node;
    };
    if !record.title.is_empty() {
        node.title = record.title.clone();
    }
    node.kind = record.kind;

    if !expanded.insert(id.clone()) {
        debug!(node_id = %id, "repeated reference, emitting alias");
        return node;
    }

    ancestors.insert(id.clone());
    for child in &record.child_ids {
        if ancestors.contains(child) {
            debug!(node_id = %id, child = %child, "cycle back to ancestor cut");
            continue;
        }
        node.children.push(build(child, records, expanded, ancestors));
    }
    ancestors.remove(id);
    node
}
