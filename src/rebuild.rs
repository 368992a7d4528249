//! Parallel reconstruction of values from persisted rows.
//!
//! Rebuilding a table runs in two independent phases, both fanned out with Rayon:
//!
//! 1. **Regroup:** the unordered bag of rows is split into chunks, each chunk is
//!    partitioned by owning key, and the partial groupings are merged.
//! 2. **Reconstruct:** every key is rebuilt on its own. Composites are collected
//!    into an arena indexed by [`LocalId`], members are attached to their parent in
//!    `sequence_index` order, and containers are then materialized bottom-up:
//!    children before parents. A tuple is therefore built exactly once, from its
//!    finished members, and never patched in place.
//!
//! A key whose rows are inconsistent reconstructs to a
//! [`VaultError::CorruptEncoding`]; the other keys are unaffected.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::{Result, VaultError};
use crate::format::{Row, TypeTag};
use crate::graph::{FlatGraph, LocalId, Node, NodePayload};
use crate::key::KeyHash;
use crate::value::{Value, ValueMap};

/// Rows handed to one regroup task when no other size is configured.
pub const DEFAULT_CHUNK_ROWS: usize = 4096;

/// Outcome of rebuilding one key: its value, or why it is unavailable.
pub type Slot = std::result::Result<Value, VaultError>;

/// Everything a full-table rebuild produced.
#[derive(Debug, Default)]
pub struct RebuildOutput {
    /// One entry per key found in the rows.
    pub values: HashMap<KeyHash, Slot>,
    /// Rows that carried neither `belongs_to_key` nor `key_hash` and were dropped.
    pub unattributed_rows: usize,
}

impl RebuildOutput {
    /// Keys whose rows could not be reconstructed.
    pub fn corrupt_keys(&self) -> Vec<KeyHash> {
        let mut keys: Vec<KeyHash> = self
            .values
            .iter()
            .filter(|(_, slot)| slot.is_err())
            .map(|(key, _)| *key)
            .collect();
        keys.sort();
        keys
    }
}

/// Rebuilds every key contained in `rows`.
///
/// Runs on the current Rayon pool; wrap the call in `ThreadPool::install` to pick
/// another one. `chunk_rows` bounds the work of a single regroup task.
pub fn rebuild(rows: Vec<Row>, chunk_rows: usize) -> RebuildOutput {
    let total_rows = rows.len();
    let (groups, unattributed_rows) = regroup(rows, chunk_rows);

    if unattributed_rows > 0 {
        warn!(unattributed_rows, "dropping rows that belong to no key");
    }

    let values: HashMap<KeyHash, Slot> = groups
        .into_par_iter()
        .map(|(key, rows)| {
            let slot = rebuild_rows(key, rows);
            if let Err(e) = &slot {
                warn!(%key, error = %e, "key is unavailable");
            }
            (key, slot)
        })
        .collect();

    debug!(rows = total_rows, keys = values.len(), "rebuild finished");

    RebuildOutput {
        values,
        unattributed_rows,
    }
}

/// Phase 1: partitions rows by owning key.
///
/// Returns the groups and the number of rows that could not be attributed.
fn regroup(rows: Vec<Row>, chunk_rows: usize) -> (HashMap<KeyHash, Vec<Row>>, usize) {
    rows.into_par_iter()
        .with_min_len(chunk_rows.max(1))
        .fold(
            || (HashMap::<KeyHash, Vec<Row>>::new(), 0usize),
            |(mut groups, mut orphans), row| {
                match row.group_key() {
                    Some(key) => groups.entry(key).or_default().push(row),
                    None => orphans += 1,
                }
                (groups, orphans)
            },
        )
        .reduce(
            || (HashMap::new(), 0),
            |(mut left, left_orphans), (right, right_orphans)| {
                for (key, mut rows) in right {
                    left.entry(key).or_default().append(&mut rows);
                }
                (left, left_orphans + right_orphans)
            },
        )
}

/// Decodes and reconstructs the rows of a single key.
pub fn rebuild_rows(key: KeyHash, rows: Vec<Row>) -> Result<Value> {
    let nodes = rows
        .into_iter()
        .map(|row| Node::from_row(key, row))
        .collect::<Result<Vec<Node>>>()?;
    rebuild_nodes(key, nodes)
}

/// Reconstructs the value described by a freshly flattened graph.
pub fn rebuild_graph(graph: FlatGraph) -> Result<Value> {
    let key = graph.key();
    rebuild_nodes(key, graph.into_nodes())
}

/// A member waiting to be placed into its container.
enum Member {
    Leaf(Value),
    Composite(LocalId),
}

/// Arena slot for one composite: its shape and its members, in stored order.
struct Frame {
    tag: TypeTag,
    members: Vec<(Option<u32>, Member)>,
}

/// Phase 2: reconstructs one key from its nodes, in any order.
pub fn rebuild_nodes(key: KeyHash, nodes: Vec<Node>) -> Result<Value> {
    let corrupt = |reason: String| VaultError::corrupt(key, reason);

    // A. Separate the owner node from the members.
    let mut root: Option<Node> = None;
    let mut members = Vec::with_capacity(nodes.len().saturating_sub(1));
    for node in nodes {
        if node.is_root() {
            if root.is_some() {
                return Err(corrupt("More than one top-level node".into()));
            }
            root = Some(node);
        } else {
            members.push(node);
        }
    }
    let root = root.ok_or_else(|| corrupt("No top-level node".into()))?;
    if let Some(parent) = root.parent {
        return Err(corrupt(format!("Top-level node references parent {parent}")));
    }

    let root_id = match root.payload {
        NodePayload::Leaf(value) => {
            if !members.is_empty() {
                return Err(corrupt(format!(
                    "Scalar value has {} member nodes",
                    members.len()
                )));
            }
            return Ok(value);
        }
        NodePayload::Composite(id) => id,
    };

    // B. Register every composite in the arena.
    let mut arena: HashMap<LocalId, Frame> = HashMap::new();
    arena.insert(
        root_id,
        Frame {
            tag: root.tag,
            members: Vec::new(),
        },
    );
    for node in &members {
        if let NodePayload::Composite(id) = node.payload {
            let frame = Frame {
                tag: node.tag,
                members: Vec::new(),
            };
            if arena.insert(id, frame).is_some() {
                return Err(corrupt(format!("Local id {id} is used twice")));
            }
        }
    }

    // C. Attach members to their parents.
    for node in members {
        let parent = node
            .parent
            .ok_or_else(|| corrupt(format!("Member {} has no parent", node.tag.name())))?;
        let frame = arena
            .get_mut(&parent)
            .ok_or_else(|| corrupt(format!("Orphan node: parent {parent} does not exist")))?;
        let member = match node.payload {
            NodePayload::Leaf(value) => Member::Leaf(value),
            NodePayload::Composite(id) => Member::Composite(id),
        };
        frame.members.push((node.sequence_index, member));
    }

    // D. Put the members of ordered containers in sequence.
    for (id, frame) in &mut arena {
        if !frame.tag.is_ordered() {
            continue;
        }
        if frame.members.iter().any(|(seq, _)| seq.is_none()) {
            return Err(corrupt(format!(
                "Member of {} {id} has no sequence index",
                frame.tag.name()
            )));
        }
        frame.members.sort_by_key(|(seq, _)| *seq);
        let contiguous = (0u32..)
            .zip(&frame.members)
            .all(|(expected, (seq, _))| *seq == Some(expected));
        if !contiguous {
            return Err(corrupt(format!(
                "Sequence indices of {} {id} are not contiguous",
                frame.tag.name()
            )));
        }
    }

    // E. Order composites so that every child comes before its parent.
    let mut preorder = Vec::with_capacity(arena.len());
    let mut stack = vec![root_id];
    while let Some(id) = stack.pop() {
        preorder.push(id);
        if let Some(frame) = arena.get(&id) {
            stack.extend(frame.members.iter().filter_map(|(_, m)| match m {
                Member::Composite(child) => Some(*child),
                Member::Leaf(_) => None,
            }));
        }
    }
    if preorder.len() != arena.len() {
        return Err(corrupt(format!(
            "{} composites are unreachable from the top-level node",
            arena.len().saturating_sub(preorder.len())
        )));
    }

    // F. Materialize bottom-up.
    let mut built: HashMap<LocalId, Value> = HashMap::with_capacity(arena.len());
    for id in preorder.into_iter().rev() {
        let frame = arena
            .remove(&id)
            .ok_or_else(|| VaultError::Internal(format!("Composite {id} visited twice")))?;
        let mut items = Vec::with_capacity(frame.members.len());
        for (_, member) in frame.members {
            let item = match member {
                Member::Leaf(value) => value,
                Member::Composite(child) => built.remove(&child).ok_or_else(|| {
                    VaultError::Internal(format!("Composite {child} not built before {id}"))
                })?,
            };
            items.push(item);
        }
        let value = materialize(frame.tag, items).map_err(&corrupt)?;
        built.insert(id, value);
    }

    built
        .remove(&root_id)
        .ok_or_else(|| VaultError::Internal("Top-level composite was not built".into()))
}

/// Builds a container of `tag` from its finished members.
fn materialize(tag: TypeTag, items: Vec<Value>) -> std::result::Result<Value, String> {
    match tag {
        TypeTag::List => Ok(Value::List(items)),
        TypeTag::Tuple => Ok(Value::Tuple(items)),
        TypeTag::Set => Ok(Value::Set(items.into_iter().collect())),
        TypeTag::Map => {
            if items.len() % 2 != 0 {
                return Err(format!("Map has an odd number of members ({})", items.len()));
            }
            let mut map = ValueMap::with_capacity(items.len() / 2);
            let mut items = items.into_iter();
            while let (Some(k), Some(v)) = (items.next(), items.next()) {
                map.insert(k, v);
            }
            Ok(Value::Map(map))
        }
        scalar => Err(format!("{} is not a container", scalar.name())),
    }
}
