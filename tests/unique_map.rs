use cow_hashmap::{DefaultKeyTraits, KeyTraits, MapError, UniqueMap};
use std::collections::HashMap;

#[test]
fn insert_hundred_remove_half() {
    let mut m: UniqueMap<String, String> = UniqueMap::new();
    for i in 0..100 {
        let prev = m.insert(i.to_string(), format!("{}+", i)).expect("insert ok");
        assert!(prev.is_none());
    }
    assert_eq!(m.len(), 100);
    assert!(m.len() < m.capacity() * 2 / 3);

    for i in 0..50 {
        assert_eq!(m.remove(&i.to_string()).expect("remove ok"), format!("{}+", i));
    }
    assert_eq!(m.len(), 50);
    for i in 0..50 {
        assert!(!m.contains(&i.to_string()), "{} should be gone", i);
    }
    for i in 50..100 {
        assert_eq!(m.get(&i.to_string()), Some(&format!("{}+", i)));
    }
}

#[test]
fn insert_overwrites_and_returns_previous() {
    let mut m: UniqueMap<u64, &str> = UniqueMap::new();
    assert_eq!(m.insert(7, "a").unwrap(), None);
    assert_eq!(m.insert(7, "b").unwrap(), Some("a"));
    assert_eq!(m.len(), 1);
    assert_eq!(m[&7], "b");
}

#[test]
fn clear_key_is_rejected_everywhere() {
    let mut m: UniqueMap<u64, u64> = UniqueMap::new();
    assert_eq!(m.insert(0, 1), Err(MapError::InvalidKey));
    assert_eq!(m.at(&0), Err(MapError::InvalidKey));
    assert!(matches!(m.get_or_insert_with(0, || 1), Err(MapError::InvalidKey)));
    assert!(!m.contains(&0));
    assert_eq!(m.len(), 0);
}

#[test]
fn at_reports_missing_keys() {
    let mut m: UniqueMap<u64, u64> = UniqueMap::new();
    m.insert(3, 30).unwrap();
    assert_eq!(m.at(&3), Ok(&30));
    assert_eq!(m.at(&4), Err(MapError::MissingKey));
    *m.at_mut(&3).unwrap() += 1;
    assert_eq!(m.get(&3), Some(&31));
    assert!(m.at_mut(&9).is_err());
}

#[test]
fn clones_share_until_written() {
    let mut a: UniqueMap<u64, Vec<u8>> = UniqueMap::new();
    a.insert(1, vec![1]).unwrap();
    a.insert(2, vec![2]).unwrap();

    let mut b = a.clone();
    assert_eq!(a.ref_count(), 2);
    assert_eq!(b.ref_count(), 2);

    b.get_mut(&1).unwrap().unwrap().push(9);
    assert_eq!(a.ref_count(), 1);
    assert_eq!(b.ref_count(), 1);
    assert_eq!(a.get(&1), Some(&vec![1]));
    assert_eq!(b.get(&1), Some(&vec![1, 9]));

    let c = b.clone();
    b.remove(&2).unwrap();
    assert!(c.contains(&2));
    assert!(!b.contains(&2));
}

#[test]
fn clear_on_shared_map_leaves_sharers_alone() {
    let mut a: UniqueMap<u64, u64> = UniqueMap::new();
    for k in 1..=10 {
        a.insert(k, k * 10).unwrap();
    }
    let b = a.clone();
    a.clear();
    assert!(a.is_empty());
    assert_eq!(b.len(), 10);
    assert_eq!(b.ref_count(), 1);
    a.insert(5, 1).unwrap();
    assert_eq!(b.get(&5), Some(&50));
}

#[test]
fn reserve_avoids_regrowth() {
    let mut m: UniqueMap<u64, u64> = UniqueMap::new();
    m.reserve(100).unwrap();
    let cap = m.capacity();
    assert!(cap.is_power_of_two());
    for k in 1..=100 {
        m.insert(k, k).unwrap();
    }
    assert_eq!(m.capacity(), cap);
}

#[test]
fn get_or_insert_with_runs_default_once() {
    let mut m: UniqueMap<&str, Vec<u32>> = UniqueMap::new();
    let mut calls = 0;
    for (k, v) in [("a", 1), ("b", 2), ("a", 3)] {
        m.get_or_insert_with(k, || {
            calls += 1;
            Vec::new()
        })
        .unwrap()
        .push(v);
    }
    assert_eq!(calls, 2);
    assert_eq!(m[&"a"], [1, 3]);
    assert_eq!(m[&"b"], [2]);
}

#[test]
fn iteration_visits_each_entry_once() {
    let mut m: UniqueMap<u32, u32> = UniqueMap::new();
    for k in 1..=40 {
        m.insert(k, k * 2).unwrap();
    }
    let seen: HashMap<u32, u32> = m.iter().map(|(k, v)| (*k, *v)).collect();
    assert_eq!(seen.len(), 40);
    assert!(seen.iter().all(|(k, v)| *v == k * 2));
    assert_eq!(m.keys().len(), 40);
    assert_eq!(m.values().copied().sum::<u32>(), (1..=40u32).map(|k| k * 2).sum::<u32>());

    let snapshot = m.clone();
    for v in m.values_mut().unwrap() {
        *v += 1;
    }
    assert!(m.iter().all(|(k, v)| *v == k * 2 + 1));
    assert!(snapshot.iter().all(|(k, v)| *v == k * 2));
}

// Keys are case-insensitive ASCII strings; the empty string marks empty slots.
#[derive(Clone, Default)]
struct CaseInsensitive;

impl KeyTraits<String> for CaseInsensitive {
    fn clear_value(&self) -> String {
        String::new()
    }

    fn equals(&self, a: &String, b: &String) -> bool {
        a.eq_ignore_ascii_case(b)
    }

    fn hash_of(&self, key: &String) -> u64 {
        key.bytes().fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
            (h ^ b.to_ascii_lowercase() as u64).wrapping_mul(0x100_0000_01b3)
        })
    }
}

#[test]
fn custom_key_traits_drive_equality() {
    let mut m: UniqueMap<String, u32, CaseInsensitive> = UniqueMap::with_key_traits(CaseInsensitive);
    m.insert("Hello".to_string(), 1).unwrap();
    assert_eq!(m.insert("HELLO".to_string(), 2).unwrap(), Some(1));
    assert_eq!(m.len(), 1);
    assert_eq!(m.get(&"hello".to_string()), Some(&2));
    assert_eq!(m.insert(String::new(), 3), Err(MapError::InvalidKey));
}

#[test]
fn default_traits_accept_custom_hasher() {
    let traits = DefaultKeyTraits::with_hasher(std::collections::hash_map::RandomState::new());
    let mut m: UniqueMap<u8, u8, _> = UniqueMap::with_key_traits(traits);
    for k in 1..=200u8 {
        m.insert(k, k).unwrap();
    }
    assert_eq!(m.len(), 200);
    assert!((1..=200u8).all(|k| m.get(&k) == Some(&k)));
}

#[test]
fn debug_formats_as_map() {
    let mut m: UniqueMap<u32, &str> = UniqueMap::new();
    m.insert(4, "four").unwrap();
    assert_eq!(format!("{:?}", m), "{4: \"four\"}");
}

#[test]
#[should_panic(expected = "not in the map")]
fn remove_of_absent_key_panics() {
    let mut m: UniqueMap<u32, u32> = UniqueMap::new();
    m.insert(1, 1).unwrap();
    let _ = m.remove(&2);
}
