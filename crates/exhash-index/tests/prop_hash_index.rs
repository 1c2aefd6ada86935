//! Property tests: the index agrees with a multiset model under random
//! insert/delete sequences, and its structural invariants hold throughout.

use std::collections::BTreeMap;

use exhash_index::{HashCode, HashIndex, HashIndexConfig, Index, hash_key};
use exhash_record::{MemoryStore, TransactionMode};
use exhash_types::{Constant, FieldType, RowLocator};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

const KEY_SPACE: i64 = 40;

#[derive(Debug, Clone)]
enum Op {
    Insert { key: i64, slot: u32 },
    Delete { key: i64, pick: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..KEY_SPACE, 0_u32..16).prop_map(|(key, slot)| Op::Insert { key, slot }),
        1 => (0..KEY_SPACE, 0_usize..4).prop_map(|(key, pick)| Op::Delete { key, pick }),
    ]
}

fn found<I: Index>(index: &mut I, key: &Constant) -> Result<Vec<RowLocator>, TestCaseError> {
    index
        .position(key)
        .map_err(|e| TestCaseError::fail(format!("position {key}: {e}")))?;
    let mut out = Vec::new();
    while index
        .next()
        .map_err(|e| TestCaseError::fail(format!("next {key}: {e}")))?
    {
        out.push(
            index
                .current_locator()
                .map_err(|e| TestCaseError::fail(e.to_string()))?,
        );
    }
    out.sort();
    Ok(out)
}

proptest! {
    #[test]
    fn prop_index_matches_model(
        capacity in 2_usize..6,
        ops in prop::collection::vec(op_strategy(), 1..120),
    ) {
        let store = MemoryStore::new();
        let tx = store.begin(TransactionMode::Immediate).unwrap();
        let config = HashIndexConfig::default().with_bucket_capacity(capacity);
        let mut index = HashIndex::open(tx, "prop", FieldType::Int, config).unwrap();
        let mut model: BTreeMap<i64, Vec<RowLocator>> = BTreeMap::new();

        for (step, op) in ops.iter().enumerate() {
            match *op {
                Op::Insert { key, slot } => {
                    let held = model.entry(key).or_default();
                    // More than `capacity` copies of one key can never fit.
                    if held.len() >= capacity {
                        continue;
                    }
                    let loc = RowLocator::new(step as u32, slot);
                    index.insert(&Constant::Int(key), loc).unwrap();
                    held.push(loc);
                }
                Op::Delete { key, pick } => {
                    let held = model.entry(key).or_default();
                    let loc = if held.is_empty() {
                        RowLocator::new(u32::MAX, 0)
                    } else {
                        held.remove(pick % held.len())
                    };
                    index.delete(&Constant::Int(key), loc).unwrap();
                }
            }
        }

        for key in 0..KEY_SPACE {
            let mut expected = model.get(&key).cloned().unwrap_or_default();
            expected.sort();
            let actual = found(&mut index, &Constant::Int(key))?;
            prop_assert_eq!(actual, expected, "key {}", key);
        }
        prop_assert!(index.check_invariants().is_ok());
        let g = index.global_depth().unwrap();
        prop_assert_eq!(index.directory_entries().unwrap().len(), 1_usize << g);
    }

    #[test]
    fn prop_suffix_is_fixed_width(raw in any::<u32>(), depth in 0_u32..=32) {
        let suffix = HashCode::new(raw).suffix(depth).unwrap();
        prop_assert_eq!(suffix.len(), depth as usize);
        let low = if depth == 32 { raw } else { raw & ((1_u32 << depth) - 1) };
        let parsed = if depth == 0 { 0 } else { u32::from_str_radix(&suffix, 2).unwrap() };
        prop_assert_eq!(parsed, low);
    }

    #[test]
    fn prop_hash_is_deterministic(key in any::<i64>(), text in "[a-z]{0,12}") {
        prop_assert_eq!(hash_key(&Constant::Int(key)), hash_key(&Constant::Int(key)));
        let s = Constant::from(text.as_str());
        prop_assert_eq!(hash_key(&s), hash_key(&s.clone()));
    }
}
