#![allow(missing_docs)]

use std::collections::{BTreeSet, HashMap};

use graphvault::{
    KeyHash, Result, TypeTag, Value, ValueMap,
    format::Row,
    graph::NodePayload,
    rebuild::{rebuild, rebuild_graph},
    visitor::flatten,
};

// --- HELPERS ---

fn round_trip(value: &Value) -> Result<Value> {
    rebuild_graph(flatten(KeyHash::of("k"), value))
}

/// A value four containers deep, mixing every shape.
fn deep_value() -> Value {
    Value::map([
        (
            Value::from("level1"),
            Value::list([
                Value::tuple([
                    Value::set([Value::list([1, 2]), Value::list([3])]),
                    Value::from("tail"),
                ]),
                Value::map([("inner", Value::tuple([Value::from(1.5), Value::Bool(false)]))]),
            ]),
        ),
        (Value::tuple([1, 2]), Value::Bytes(vec![0, 255, 7])),
        (Value::from(7), Value::Complex(1.0, -2.5)),
    ])
}

// --- TESTS ---

#[test]
fn test_scalars_round_trip() -> Result<()> {
    let scalars = [
        Value::Int(-42),
        Value::Int(i64::MAX),
        Value::Float(3.25),
        Value::from("hello"),
        Value::from(""),
        Value::Bool(true),
        Value::Bytes(vec![1, 2, 3]),
        Value::Complex(0.5, 2.0),
    ];
    for scalar in &scalars {
        assert_eq!(&round_trip(scalar)?, scalar);
    }
    Ok(())
}

#[test]
fn test_empty_containers_round_trip() -> Result<()> {
    let empties = [
        Value::List(Vec::new()),
        Value::Tuple(Vec::new()),
        Value::Set(BTreeSet::new()),
        Value::Map(ValueMap::new()),
        Value::list([Value::List(Vec::new()), Value::Map(ValueMap::new())]),
    ];
    for value in &empties {
        assert_eq!(&round_trip(value)?, value);
    }
    Ok(())
}

#[test]
fn test_deep_nesting_round_trip() -> Result<()> {
    let value = deep_value();
    assert_eq!(round_trip(&value)?, value);
    Ok(())
}

#[test]
fn test_nested_tuple_keeps_positions() -> Result<()> {
    let value = Value::tuple([Value::from(1), Value::tuple([2, 3]), Value::from(4)]);
    let rebuilt = round_trip(&value)?;

    match &rebuilt {
        Value::Tuple(items) => {
            assert_eq!(items.len(), 3);
            assert_eq!(items[1], Value::tuple([2, 3]));
        }
        other => panic!("expected a tuple, got {other}"),
    }
    assert_eq!(rebuilt, value);
    Ok(())
}

#[test]
fn test_map_keeps_insertion_order() -> Result<()> {
    let value = Value::map([("c", 3), ("a", 1), ("b", 2)]);
    let Value::Map(map) = round_trip(&value)? else {
        panic!("expected a map");
    };
    let keys: Vec<String> = map.iter().map(|(k, _)| k.to_string()).collect();
    assert_eq!(keys, ["\"c\"", "\"a\"", "\"b\""]);
    Ok(())
}

#[test]
fn test_flatten_layout() {
    let key = KeyHash::of("layout");
    let value = Value::map([("a", Value::set([1, 2]))]);
    let graph = flatten(key, &value);
    let nodes = graph.nodes();

    // map, "a", set, 1, 2
    assert_eq!(nodes.len(), 5);

    let roots: Vec<_> = nodes.iter().filter(|n| n.is_root()).collect();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].owner_key, Some(key));
    assert_eq!(roots[0].tag, TypeTag::Map);
    assert_eq!(roots[0].parent, None);

    assert!(nodes.iter().all(|n| n.belongs_to == key));

    // Map members are the linearized pair with positions 0 and 1.
    let set = &nodes[2];
    assert_eq!(set.tag, TypeTag::Set);
    assert_eq!(set.sequence_index, Some(1));

    // Set members carry no position.
    let NodePayload::Composite(set_id) = set.payload else {
        panic!("set must be a composite");
    };
    let members: Vec<_> = nodes.iter().filter(|n| n.parent == Some(set_id)).collect();
    assert_eq!(members.len(), 2);
    assert!(members.iter().all(|n| n.sequence_index.is_none()));
}

#[test]
fn test_local_ids_restart_per_flatten() {
    let value = Value::list([Value::list([1])]);
    let a = flatten(KeyHash::of("a"), &value);
    let b = flatten(KeyHash::of("b"), &value);

    let ids = |graph: &graphvault::graph::FlatGraph| -> Vec<u32> {
        graph
            .nodes()
            .iter()
            .filter_map(|n| match n.payload {
                NodePayload::Composite(id) => Some(id.as_u32()),
                NodePayload::Leaf(_) => None,
            })
            .collect()
    };
    assert_eq!(ids(&a), vec![0, 1]);
    assert_eq!(ids(&a), ids(&b));
}

#[test]
fn test_rebuild_mixed_shuffled_rows() {
    let values: Vec<(&str, Value)> = vec![
        ("scalar", Value::from(10)),
        ("list", Value::list(["x", "y", "z"])),
        ("set", Value::set([3, 1, 2])),
        ("deep", deep_value()),
        ("tuple", Value::tuple([Value::from(1), Value::tuple([2, 3]), Value::from(4)])),
    ];

    let mut rows: Vec<Row> = values
        .iter()
        .flat_map(|(key, value)| flatten(KeyHash::of(key), value).to_rows())
        .collect();
    // Children first, keys interleaved: the worst order a table scan could give.
    rows.reverse();
    let half = rows.len() / 2;
    rows.rotate_left(half);

    let output = rebuild(rows, 3);
    assert_eq!(output.unattributed_rows, 0);
    assert!(output.corrupt_keys().is_empty());

    let rebuilt: HashMap<KeyHash, Value> = output
        .values
        .into_iter()
        .map(|(k, slot)| (k, slot.expect("every key is valid")))
        .collect();
    assert_eq!(rebuilt.len(), values.len());
    for (key, value) in &values {
        assert_eq!(rebuilt.get(&KeyHash::of(key)), Some(value), "key {key}");
    }
}

#[test]
fn test_set_membership_ignores_row_order() -> Result<()> {
    let key = KeyHash::of("members");
    let value = Value::set(["red", "green", "blue"]);

    let mut rows = flatten(key, &value).to_rows();
    let root = rows.remove(0);
    rows.reverse();
    rows.push(root);

    let output = rebuild(rows, 1);
    let rebuilt = output.values.get(&key).cloned().expect("key present")?;
    assert_eq!(rebuilt, value);
    Ok(())
}

#[test]
fn test_large_map_round_trip() -> Result<()> {
    let count = 100_000i64;
    let value = Value::map((0..count).map(|i| (Value::from(i), Value::from(count - i))));
    let Value::Map(map) = round_trip(&value)? else {
        panic!("expected a map");
    };

    assert_eq!(map.len(), count as usize);
    assert_eq!(map.get(&Value::from(count - 1)), Some(&Value::from(1)));
    assert_eq!(map.iter().next(), Some((&Value::from(0), &Value::from(count))));
    Ok(())
}

#[test]
fn test_value_map_lookup_after_remove() {
    let mut map: ValueMap = ["a", "b", "c", "d"]
        .into_iter()
        .enumerate()
        .map(|(i, k)| (Value::from(k), Value::from(i as i64)))
        .collect();

    assert_eq!(map.remove(&Value::from("b")), Some(Value::from(1)));
    assert_eq!(map.get(&Value::from("b")), None);
    assert_eq!(map.get(&Value::from("d")), Some(&Value::from(3)));

    // Re-inserting an existing key keeps its position.
    assert_eq!(map.insert(Value::from("c"), Value::from(20)), Some(Value::from(2)));
    map.insert(Value::from("b"), Value::from(10));
    let keys: Vec<String> = map.iter().map(|(k, _)| k.to_string()).collect();
    assert_eq!(keys, ["\"a\"", "\"c\"", "\"d\"", "\"b\""]);
    assert_eq!(map.get(&Value::from("c")), Some(&Value::from(20)));
}

/// Takes a list nested `depth` levels apart one level at a time and returns the
/// number of levels found.
fn unnest(mut value: Value) -> usize {
    let mut depth = 0;
    while let Value::List(mut items) = value {
        depth += 1;
        value = items.pop().unwrap_or(Value::Int(0));
    }
    depth
}

#[test]
fn test_extreme_nesting_flattens_and_rebuilds() -> Result<()> {
    let depth = 100_000;
    let mut value = Value::List(Vec::new());
    for _ in 1..depth {
        value = Value::List(vec![value]);
    }

    let graph = flatten(KeyHash::of("deep"), &value);
    assert_eq!(graph.len(), depth);
    let rebuilt = rebuild_graph(graph)?;

    assert_eq!(unnest(rebuilt), depth);
    assert_eq!(unnest(value), depth);
    Ok(())
}
