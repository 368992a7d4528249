use rusqlite::types::Value as SqlValue;

use super::id::LocalId;
use crate::error::{Result, VaultError};
use crate::format::{self, Row, TypeTag};
use crate::key::KeyHash;
use crate::value::Value;

/// What a node carries: a concrete scalar, or the marker of a container.
#[derive(Debug, Clone, PartialEq)]
pub enum NodePayload {
    /// A scalar value. Never a composite.
    Leaf(Value),
    /// "A container of this node's tag lives here". Children point at the id.
    Composite(LocalId),
}

/// A single node of a flattened value.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Leaf value or composite placeholder.
    pub payload: NodePayload,
    /// Shape of the node.
    pub tag: TypeTag,
    /// The stored key, present only on the top-level node of that key.
    pub owner_key: Option<KeyHash>,
    /// The composite that directly contains this node. `None` on the top-level node.
    pub parent: Option<LocalId>,
    /// Ordinal position within an order-preserving parent.
    pub sequence_index: Option<u32>,
    /// The top-level key whose subtree this node belongs to.
    pub belongs_to: KeyHash,
}

impl Node {
    /// True for the single node that represents a key's top-level value.
    pub fn is_root(&self) -> bool {
        self.owner_key.is_some()
    }

    /// Converts the node into its persisted row.
    pub fn to_row(&self) -> Row {
        let (value, local_id) = match &self.payload {
            NodePayload::Leaf(v) => (format::encode_scalar(v), None),
            NodePayload::Composite(id) => (SqlValue::Null, Some(i64::from(id.as_u32()))),
        };
        Row {
            key_hash: self.owner_key.map(|k| k.as_i64()),
            value,
            type_tag: i64::from(self.tag.as_u8()),
            sequence_index: self.sequence_index.map(i64::from),
            local_id,
            parent_local_id: self.parent.map(|p| i64::from(p.as_u32())),
            belongs_to_key: Some(self.belongs_to.as_i64()),
        }
    }

    /// Decodes a persisted row that has already been attributed to `key`.
    pub fn from_row(key: KeyHash, row: Row) -> Result<Self> {
        let corrupt = |reason: String| VaultError::corrupt(key, reason);

        let tag = TypeTag::from_raw(row.type_tag).map_err(|_| {
            corrupt(format!("Unknown type tag {}", row.type_tag))
        })?;

        let payload = if tag.is_composite() {
            let raw = row
                .local_id
                .ok_or_else(|| corrupt(format!("Composite {} without local id", tag.name())))?;
            let id = LocalId::from_raw(raw)
                .ok_or_else(|| corrupt(format!("Local id {raw} out of range")))?;
            NodePayload::Composite(id)
        } else {
            let value = format::decode_scalar(tag, row.value).map_err(|e| match e {
                VaultError::CorruptEncoding { reason, .. } => corrupt(reason),
                other => other,
            })?;
            NodePayload::Leaf(value)
        };

        let parent = match row.parent_local_id {
            Some(raw) => Some(
                LocalId::from_raw(raw)
                    .ok_or_else(|| corrupt(format!("Parent id {raw} out of range")))?,
            ),
            None => None,
        };

        let sequence_index = match row.sequence_index {
            Some(raw) => Some(
                u32::try_from(raw)
                    .map_err(|_| corrupt(format!("Sequence index {raw} out of range")))?,
            ),
            None => None,
        };

        Ok(Self {
            payload,
            tag,
            owner_key: row.key_hash.map(KeyHash::from_raw),
            parent,
            sequence_index,
            belongs_to: key,
        })
    }
}

/// The arena produced by flattening one key's value.
///
/// Nodes are kept in emission order (depth-first, parents before children).
/// Composite ids come from a counter owned by this arena, so two graphs may
/// reuse the same ids.
#[derive(Debug)]
pub struct FlatGraph {
    key: KeyHash,
    nodes: Vec<Node>,
    next_id: u32,
}

impl FlatGraph {
    /// Creates an empty graph for `key`.
    pub fn new(key: KeyHash) -> Self {
        Self {
            key,
            nodes: Vec::new(),
            next_id: 0,
        }
    }

    /// The key every node of this graph belongs to.
    pub fn key(&self) -> KeyHash {
        self.key
    }

    /// Appends a leaf. The top-level node (no parent) becomes the key's owner node.
    pub fn add_leaf(&mut self, value: Value, parent: Option<LocalId>, sequence_index: Option<u32>) {
        let tag = value.tag();
        self.push(NodePayload::Leaf(value), tag, parent, sequence_index);
    }

    /// Appends a composite placeholder and returns the id its children must reference.
    pub fn add_composite(
        &mut self,
        tag: TypeTag,
        parent: Option<LocalId>,
        sequence_index: Option<u32>,
    ) -> LocalId {
        let id = LocalId::new(self.next_id);
        self.next_id += 1;
        self.push(NodePayload::Composite(id), tag, parent, sequence_index);
        id
    }

    fn push(
        &mut self,
        payload: NodePayload,
        tag: TypeTag,
        parent: Option<LocalId>,
        sequence_index: Option<u32>,
    ) {
        self.nodes.push(Node {
            payload,
            tag,
            owner_key: parent.is_none().then_some(self.key),
            parent,
            sequence_index,
            belongs_to: self.key,
        });
    }

    /// Returns true if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns a slice containing all nodes in emission order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Consumes the graph, yielding its nodes.
    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }

    /// Converts every node into its persisted row.
    pub fn to_rows(&self) -> Vec<Row> {
        self.nodes.iter().map(Node::to_row).collect()
    }
}
