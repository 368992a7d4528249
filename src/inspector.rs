//! Tools for inspecting the stored structure of a vault table.
//! Useful for debugging corrupt keys and checking how values were flattened.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::Result;
use crate::format::Row;
use crate::graph::{LocalId, Node, NodePayload};
use crate::key::KeyHash;
use crate::rebuild::rebuild_nodes;
use crate::store::VaultStore;

/// A structural report of one vault table.
#[derive(Debug, Serialize)]
pub struct TableReport {
    /// Inspected table.
    pub table: String,
    /// Number of rows read.
    pub row_count: usize,
    /// Rows that belong to no key.
    pub unattributed_rows: usize,
    /// One entry per key, ordered by hash.
    pub keys: Vec<KeyReport>,
}

/// The stored shape of one key.
#[derive(Debug, Serialize)]
pub struct KeyReport {
    /// Hex rendering of the key hash.
    pub key: String,
    /// Rows stored for the key.
    pub node_count: usize,
    /// Why the key cannot be rebuilt, if it cannot.
    pub error: Option<String>,
    /// Node tree reachable from the top-level node, when one was found.
    pub tree: Option<NodeInfo>,
}

/// One node in a key's tree.
#[derive(Debug, Serialize)]
pub struct NodeInfo {
    /// Tag name.
    pub tag: &'static str,
    /// Composite id.
    pub local_id: Option<u32>,
    /// Position in the parent.
    pub sequence_index: Option<u32>,
    /// Rendered scalar.
    pub value: Option<String>,
    /// Member nodes.
    pub children: Vec<NodeInfo>,
}

/// The vault table inspector.
#[derive(Debug)]
pub struct VaultInspector;

impl VaultInspector {
    /// Reads `table` through `store` and reports its structure.
    pub fn inspect(store: &VaultStore, table: &str) -> Result<TableReport> {
        let rows = store.load_all(table)?;
        Ok(Self::inspect_rows(table, rows))
    }

    /// Reports the structure of rows that were already read.
    pub fn inspect_rows(table: &str, rows: Vec<Row>) -> TableReport {
        let row_count = rows.len();
        let mut unattributed_rows = 0;
        let mut groups: HashMap<KeyHash, Vec<Row>> = HashMap::new();
        for row in rows {
            match row.group_key() {
                Some(key) => groups.entry(key).or_default().push(row),
                None => unattributed_rows += 1,
            }
        }

        let mut keys: Vec<KeyReport> = groups
            .into_iter()
            .map(|(key, rows)| Self::inspect_key(key, rows))
            .collect();
        keys.sort_by(|a, b| a.key.cmp(&b.key));

        TableReport {
            table: table.to_string(),
            row_count,
            unattributed_rows,
            keys,
        }
    }

    fn inspect_key(key: KeyHash, rows: Vec<Row>) -> KeyReport {
        let node_count = rows.len();
        let nodes = match rows
            .into_iter()
            .map(|row| Node::from_row(key, row))
            .collect::<Result<Vec<Node>>>()
        {
            Ok(nodes) => nodes,
            Err(e) => {
                return KeyReport {
                    key: key.to_string(),
                    node_count,
                    error: Some(e.to_string()),
                    tree: None,
                };
            }
        };

        let tree = Self::tree(&nodes);
        let error = rebuild_nodes(key, nodes).err().map(|e| e.to_string());
        KeyReport {
            key: key.to_string(),
            node_count,
            error,
            tree,
        }
    }

    fn tree(nodes: &[Node]) -> Option<NodeInfo> {
        let root = nodes.iter().find(|n| n.is_root())?;
        let mut children: HashMap<LocalId, Vec<&Node>> = HashMap::new();
        for node in nodes.iter().filter(|n| !n.is_root()) {
            if let Some(parent) = node.parent {
                children.entry(parent).or_default().push(node);
            }
        }
        for members in children.values_mut() {
            members.sort_by_key(|n| n.sequence_index);
        }
        let mut visited = HashSet::new();
        Some(Self::node_info(root, &children, &mut visited))
    }

    fn node_info<'n>(
        node: &'n Node,
        children: &HashMap<LocalId, Vec<&'n Node>>,
        visited: &mut HashSet<LocalId>,
    ) -> NodeInfo {
        let (local_id, value, members) = match &node.payload {
            NodePayload::Leaf(value) => (None, Some(value.to_string()), Vec::new()),
            NodePayload::Composite(id) => {
                let members = if visited.insert(*id) {
                    children
                        .get(id)
                        .map(|members| {
                            members
                                .iter()
                                .map(|m| Self::node_info(*m, children, visited))
                                .collect()
                        })
                        .unwrap_or_default()
                } else {
                    Vec::new()
                };
                (Some(id.as_u32()), None, members)
            }
        };
        NodeInfo {
            tag: node.tag.name(),
            local_id,
            sequence_index: node.sequence_index,
            value,
            children: members,
        }
    }
}

impl std::fmt::Display for TableReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== VAULT TABLE {} ===", self.table)?;
        writeln!(
            f,
            "Rows: {} | Keys: {} | Unattributed: {}",
            self.row_count,
            self.keys.len(),
            self.unattributed_rows
        )?;
        for key in &self.keys {
            let status = key.error.as_deref().unwrap_or("ok");
            writeln!(f, "\n[{}] {} nodes | {}", key.key, key.node_count, status)?;
            if let Some(tree) = &key.tree {
                tree.fmt_recursive(f, "", true)?;
            }
        }
        Ok(())
    }
}

impl NodeInfo {
    fn fmt_recursive(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        prefix: &str,
        is_last: bool,
    ) -> std::fmt::Result {
        let connector = if is_last { "└── " } else { "├── " };
        let child_prefix = if is_last { "    " } else { "│   " };
        let position = self
            .sequence_index
            .map(|i| format!("[{i}] "))
            .unwrap_or_default();
        let detail = match (&self.value, self.local_id) {
            (Some(value), _) => format!(" = {value}"),
            (None, Some(id)) => format!(" #{id} ({} members)", self.children.len()),
            (None, None) => String::new(),
        };

        writeln!(f, "{prefix}{connector}{position}{}{detail}", self.tag)?;

        for (i, child) in self.children.iter().enumerate() {
            let is_last_child = i + 1 == self.children.len();
            child.fmt_recursive(f, &format!("{prefix}{child_prefix}"), is_last_child)?;
        }
        Ok(())
    }
}
