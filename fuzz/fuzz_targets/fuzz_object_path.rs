//! Fuzz testing for the object-path text codec.
//!
//! Any input that parses must render back to text that parses again, and the
//! reparsed path must be equal and hash-equal to the first parse.

#![no_main]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use libfuzzer_sys::fuzz_target;

use scmo::ObjectPath;

fn hash_of(path: &ObjectPath) -> u64 {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}

fuzz_target!(|data: &str| {
    if data.len() > 4096 {
        return;
    }
    let Ok(path) = ObjectPath::parse(data) else {
        return;
    };
    let rendered = path.to_string();
    let reparsed = ObjectPath::parse(&rendered)
        .expect("rendered path must parse");
    assert_eq!(path, reparsed);
    assert_eq!(hash_of(&path), hash_of(&reparsed));
});
