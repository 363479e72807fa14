#![no_main]

use std::collections::BTreeSet;

use frankenengine_known::KnownProperties;
use frankenengine_known::object_model::{
    JsValue, ObjectHandle, ObjectHeap, PropertyDescriptor, PropertyKey,
};
use libfuzzer_sys::fuzz_target;

const MAX_OBJECTS: usize = 8;
const KEYS: [&str; 6] = ["a", "b", "x", "0", "1", "length"];

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    let (heap, handles) = build_heap(data);
    let mut known = KnownProperties::default();

    for &handle in &handles {
        let obj = JsValue::Object(handle);
        let keys = known.known_keys(&heap, &obj).expect("acyclic heap");
        let unique: BTreeSet<&String> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len(), "duplicate key in {keys:?}");

        let entry_keys: Vec<String> = known
            .known_entries(&heap, &obj)
            .expect("acyclic heap")
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, entry_keys);

        for name in KEYS {
            let key = PropertyKey::from(name);
            let desc = known
                .get_known_property_descriptor(&heap, &obj, &key)
                .expect("acyclic heap");
            let reachable = known
                .has_known_property(&heap, &obj, &key)
                .expect("acyclic heap");
            assert_eq!(desc.is_some(), reachable);
        }

        let mut scratch = heap.clone();
        let target = scratch.alloc(None);
        known
            .assign_known(&mut scratch, &JsValue::Object(target), &[obj.clone()])
            .expect("fresh target accepts every write");
        assert_eq!(scratch.keys(target).expect("ordinary").len(), keys.len());
    }

    if let Ok(json) = serde_json::to_string(&heap) {
        let _ = serde_json::from_str::<ObjectHeap>(&json);
    }
});

/// Prototypes always point at an earlier object, so chains are acyclic.
fn build_heap(data: &[u8]) -> (ObjectHeap, Vec<ObjectHandle>) {
    let mut heap = ObjectHeap::new();
    let mut handles = Vec::new();
    let count = 1 + usize::from(data[0]) % MAX_OBJECTS;

    for (i, chunk) in data[1..].chunks(3).take(count).enumerate() {
        let proto = match (i, chunk.first()) {
            (0, _) | (_, None) => None,
            (_, Some(b)) if b % 4 == 0 => None,
            (_, Some(b)) => Some(handles[usize::from(*b) % i]),
        };
        let handle = heap.alloc(proto);
        for &byte in chunk.iter().skip(1) {
            let key = KEYS[usize::from(byte) % KEYS.len()];
            let value = JsValue::Int(i64::from(byte));
            let desc = if byte & 0x80 == 0 {
                PropertyDescriptor::data(value)
            } else {
                PropertyDescriptor::hidden(value)
            };
            let _ = heap.define_property(handle, key, desc);
        }
        handles.push(handle);
    }
    (heap, handles)
}
