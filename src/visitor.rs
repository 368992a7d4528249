//! Flattening of values into a [`FlatGraph`].
//!
//! The walk is depth-first: a composite emits its placeholder, then each member in
//! iteration order. Members of lists, tuples and maps get their ordinal position as
//! `sequence_index`; set members get none. Maps are walked as the alternating
//! sequence `k0, v0, k1, v1, ...`.

use crate::graph::{FlatGraph, LocalId};
use crate::key::KeyHash;
use crate::value::Value;

/// A type that can be structurally visited to build a [`FlatGraph`].
///
/// This is distinct from serialization: instead of writing bytes, a visitor writes
/// *nodes* into the graph and links them to their parent.
pub trait GraphVisitor {
    /// Visits the object and populates the graph.
    ///
    /// `parent` is `None` only for the top-level value of the key.
    fn visit(&self, graph: &mut FlatGraph, parent: Option<LocalId>, sequence_index: Option<u32>);
}

impl GraphVisitor for Value {
    fn visit(&self, graph: &mut FlatGraph, parent: Option<LocalId>, sequence_index: Option<u32>) {
        // Pending (value, parent, position) triples. Members are pushed in reverse so
        // they pop in iteration order and emission stays depth-first.
        let mut pending: Vec<(&Value, Option<LocalId>, Option<u32>)> =
            vec![(self, parent, sequence_index)];

        while let Some((value, parent, sequence_index)) = pending.pop() {
            match value {
                Value::List(items) | Value::Tuple(items) => {
                    let id = graph.add_composite(value.tag(), parent, sequence_index);
                    push_ordered(&mut pending, id, items.iter());
                }
                Value::Map(map) => {
                    let id = graph.add_composite(value.tag(), parent, sequence_index);
                    push_ordered(&mut pending, id, map.linearized());
                }
                Value::Set(members) => {
                    let id = graph.add_composite(value.tag(), parent, sequence_index);
                    pending.extend(members.iter().rev().map(|m| (m, Some(id), None)));
                }
                scalar => graph.add_leaf(scalar.clone(), parent, sequence_index),
            }
        }
    }
}

fn push_ordered<'v>(
    pending: &mut Vec<(&'v Value, Option<LocalId>, Option<u32>)>,
    id: LocalId,
    items: impl Iterator<Item = &'v Value>,
) {
    let start = pending.len();
    pending.extend((0u32..).zip(items).map(|(index, item)| (item, Some(id), Some(index))));
    pending[start..].reverse();
}

/// Flattens the value stored under `key`.
///
/// Pure and deterministic: the same value always yields the same nodes with the
/// same local ids, starting from zero.
pub fn flatten(key: KeyHash, value: &Value) -> FlatGraph {
    let mut graph = FlatGraph::new(key);
    value.visit(&mut graph, None, None);
    graph
}
