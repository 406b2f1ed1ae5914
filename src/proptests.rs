use super::*;

use crate::rbtree::validate_tree;
use proptest::prelude::*;
use proptest_derive::Arbitrary;
use std::collections::HashMap;

/// Keys `k` and `k + 24` share a hash, and every hash is a multiple of 4,
/// so small tables see long chains, trees, and equal-hash ties.
fn colliding_hash(k: i32) -> i32 {
    (k % 24) * 4
}

fn validate_table<V>(table: &TaggedHashArray, heap: &Heap<TaggedValue, V>) -> usize {
    let mut entries = 0usize;
    for (index, bucket) in table.buckets().iter().enumerate() {
        match *bucket {
            Bucket::Empty => {}
            Bucket::Chain(head) => {
                let len = LinkedNode::len(heap, head);
                assert!(len < TREEIFY_THRESHOLD, "chain of {len} should have been treeified");
                let mut current = Some(head);
                while let Some(node) = current {
                    assert_eq!(
                        table.index_for(heap[node].hash()),
                        index,
                        "chain entry in wrong bucket"
                    );
                    current = heap[node].next();
                }
                entries += len;
            }
            Bucket::Tree(root) => {
                entries += validate_tree(heap, root);
                let mut stack = vec![root];
                while let Some(node) = stack.pop() {
                    assert_eq!(
                        table.index_for(heap[node].hash()),
                        index,
                        "tree entry in wrong bucket"
                    );
                    stack.extend(heap[node].left());
                    stack.extend(heap[node].right());
                }
            }
        }
    }
    assert_eq!(heap.live_nodes(), entries, "heap holds unreachable nodes");
    entries
}

#[derive(Clone, Debug, Arbitrary)]
enum TableOp {
    #[proptest(weight = 6)]
    Set(#[proptest(strategy = "0i32..96")] i32, i32),
    #[proptest(weight = 3)]
    Remove(#[proptest(strategy = "0i32..96")] i32),
    #[proptest(weight = 2)]
    Get(#[proptest(strategy = "0i32..96")] i32),
    #[proptest(weight = 1)]
    Resize,
    #[proptest(weight = 1)]
    Treeify(#[proptest(strategy = "0i32..96")] i32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Arbitrary)]
enum KeySpec {
    Int(#[proptest(strategy = "-40i32..40")] i32),
    Str(#[proptest(strategy = "0u8..40")] u8),
    Bool(bool),
    Null,
}

impl KeySpec {
    fn to_value(self) -> TaggedValue {
        match self {
            KeySpec::Int(i) => TaggedValue::Int(i),
            KeySpec::Str(n) => TaggedValue::from(format!("key-{n}").as_str()),
            KeySpec::Bool(b) => TaggedValue::Boolean(b),
            KeySpec::Null => TaggedValue::Null,
        }
    }
}

#[derive(Clone, Debug, Arbitrary)]
enum MapOp {
    #[proptest(weight = 5)]
    Set(KeySpec, i64),
    #[proptest(weight = 1)]
    Replace(KeySpec, i64),
    #[proptest(weight = 3)]
    Remove(KeySpec),
    #[proptest(weight = 2)]
    Get(KeySpec),
    #[proptest(weight = 1)]
    Clear,
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_table_matches_model(
        capacity_log2 in 0u32..4,
        ops in prop::collection::vec(any::<TableOp>(), 0..=400),
    ) {
        let mut heap: Heap<TaggedValue, i32> = Heap::new();
        let mut table = TaggedHashArray::create_bounded(1 << capacity_log2, 64);
        let mut model: HashMap<i32, i32> = HashMap::new();

        for op in ops {
            match op {
                TableOp::Set(k, v) => {
                    let outcome =
                        table.set_val(&mut heap, colliding_hash(k), TaggedValue::Int(k), v);
                    match model.insert(k, v) {
                        Some(old) => prop_assert_eq!(outcome, SetOutcome::Replaced(old)),
                        None => prop_assert_eq!(outcome, SetOutcome::Inserted),
                    }
                }
                TableOp::Remove(k) => {
                    let key = TaggedValue::Int(k);
                    let removed = table.remove_node(&mut heap, colliding_hash(k), &key);
                    prop_assert_eq!(removed, model.remove(&k));
                    prop_assert!(table.get(&heap, colliding_hash(k), &key).is_none());
                }
                TableOp::Get(k) => {
                    let got = table.get(&heap, colliding_hash(k), &TaggedValue::Int(k)).copied();
                    prop_assert_eq!(got, model.get(&k).copied());
                }
                TableOp::Resize => {
                    table = table.resize(&mut heap);
                }
                TableOp::Treeify(k) => {
                    table.treeing_bin(&mut heap, colliding_hash(k));
                }
            }
        }

        prop_assert_eq!(validate_table(&table, &heap), model.len());
        for (k, v) in &model {
            prop_assert_eq!(table.get(&heap, colliding_hash(*k), &TaggedValue::Int(*k)), Some(v));
        }
    }

    #[test]
    fn prop_resize_keeps_chain_order(
        picks in prop::collection::btree_set(0i32..64, 1..TREEIFY_THRESHOLD),
        bucket in 0i32..4,
    ) {
        let mut heap: Heap<TaggedValue, i32> = Heap::new();
        let mut table = TaggedHashArray::create(4);
        // Every hash lands in `bucket`; insertion order is the set's order.
        let hashes: Vec<i32> = picks.iter().map(|p| p * 4 + bucket).collect();
        for &h in &hashes {
            table.set_val(&mut heap, h, TaggedValue::Int(h), h);
        }

        let table = table.resize(&mut heap);
        let b = bucket as usize;
        for (index, expected_bit) in [(b, 0), (b + 4, 4)] {
            let expected: Vec<i32> = hashes
                .iter()
                .copied()
                .filter(|h| h & 4 == expected_bit)
                .collect();
            let mut got = Vec::new();
            if let Bucket::Chain(head) = table.bucket(index) {
                let mut current = Some(head);
                while let Some(node) = current {
                    got.push(heap[node].hash());
                    current = heap[node].next();
                }
            }
            prop_assert_eq!(got, expected);
        }
        prop_assert_eq!(validate_table(&table, &heap), hashes.len());
    }

    #[test]
    fn prop_map_matches_model(ops in prop::collection::vec(any::<MapOp>(), 0..=600)) {
        let config = Config { initial_capacity: 2, ..Config::default() };
        let mut map: TaggedHashMap<TaggedValue, i64> = TaggedHashMap::with_config(config).unwrap();
        let mut model: HashMap<KeySpec, i64> = HashMap::new();

        for op in ops {
            match op {
                MapOp::Set(k, v) => {
                    prop_assert_eq!(map.set(k.to_value(), v), model.insert(k, v));
                }
                MapOp::Replace(k, v) => {
                    let present = model.contains_key(&k);
                    prop_assert_eq!(map.replace(&k.to_value(), v), present);
                    if present {
                        model.insert(k, v);
                    }
                }
                MapOp::Remove(k) => {
                    prop_assert_eq!(map.remove(&k.to_value()), model.remove(&k));
                }
                MapOp::Get(k) => {
                    prop_assert_eq!(map.get(&k.to_value()).copied(), model.get(&k).copied());
                }
                MapOp::Clear => {
                    map.clear();
                    model.clear();
                }
            }
            prop_assert_eq!(map.len(), model.len());
        }

        prop_assert_eq!(validate_table(map.table(), map.heap()), model.len());
        let mut got: Vec<i64> = map.values().copied().collect();
        let mut expected: Vec<i64> = model.values().copied().collect();
        got.sort_unstable();
        expected.sort_unstable();
        prop_assert_eq!(got, expected);
    }
}

#[test]
fn randomized_tree_bucket_churn() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(3);
    let mut heap: Heap<TaggedValue, u64> = Heap::new();
    let mut table = TaggedHashArray::create(2);
    let mut model: HashMap<i32, u64> = HashMap::new();

    for step in 0..20_000 {
        let k = rng.gen_range(0..300);
        let hash = colliding_hash(k);
        match rng.gen_range(0..100) {
            0..=54 => {
                let v: u64 = rng.gen();
                let outcome = table.set_val(&mut heap, hash, TaggedValue::Int(k), v);
                assert_eq!(outcome.is_inserted(), model.insert(k, v).is_none());
            }
            55..=89 => {
                let removed = table.remove_node(&mut heap, hash, &TaggedValue::Int(k));
                assert_eq!(removed, model.remove(&k));
            }
            _ => {
                let got = table.get(&heap, hash, &TaggedValue::Int(k)).copied();
                assert_eq!(got, model.get(&k).copied());
            }
        }
        if step % 5_000 == 4_999 {
            table = table.resize(&mut heap);
            validate_table(&table, &heap);
        }
    }

    assert_eq!(validate_table(&table, &heap), model.len());
}
