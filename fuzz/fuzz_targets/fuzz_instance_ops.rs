//! Fuzz testing for instance property and key-binding operations.
//!
//! Drives arbitrary operation sequences against a class-backed and a
//! schema-less instance; every operation must return cleanly (value or error
//! kind) and reads must never panic.

#![no_main]

use std::borrow::Cow;
use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use scmo::{CimArray, CimType, CimValue, ScmoClass, ScmoInstance};

#[derive(Debug, Arbitrary)]
struct OpsInput {
    classless: bool,
    operations: Vec<Operation>,
}

#[derive(Debug, Arbitrary)]
enum Operation {
    SetBool(u8, bool),
    SetUint32(u8, u32),
    SetSint64(u8, i64),
    SetReal64(u8, f64),
    SetString(u8, String),
    SetUint32Array(u8, Vec<u32>),
    SetNull(u8),
    GetByName(u8),
    GetAt(u8),
    SetKey(u8, i64),
    ClearKeys,
    BuildKeys,
    CloneAndMutate(u8, u32),
}

const NAMES: [&str; 6] = ["Alpha", "Beta", "Gamma", "Delta", "Keys", "Extra"];

fn name_for(idx: u8) -> &'static str {
    NAMES[idx as usize % NAMES.len()]
}

fn test_class() -> Arc<ScmoClass> {
    Arc::new(
        ScmoClass::builder("root/fuzz", "FZZ_Object")
            .key_property("Alpha", CimType::Sint64)
            .property("Beta", CimType::Uint32)
            .property("Gamma", CimType::String)
            .array_property("Delta", CimType::Uint32)
            .build(),
    )
}

fuzz_target!(|input: OpsInput| {
    if input.operations.len() > 256 {
        return;
    }

    let mut inst = if input.classless {
        ScmoInstance::new_classless("root/fuzz", "FZZ_Object")
    } else {
        ScmoInstance::new(test_class())
    };

    for op in &input.operations {
        match op {
            Operation::SetBool(n, v) => {
                let _ = inst.set_property(name_for(*n), &CimValue::Boolean(*v));
            }
            Operation::SetUint32(n, v) => {
                let _ = inst.set_property(name_for(*n), &CimValue::Uint32(*v));
            }
            Operation::SetSint64(n, v) => {
                let _ = inst.set_property(name_for(*n), &CimValue::Sint64(*v));
            }
            Operation::SetReal64(n, v) => {
                let _ = inst.set_property(name_for(*n), &CimValue::Real64(*v));
            }
            Operation::SetString(n, v) => {
                if v.len() <= 1024 {
                    let _ = inst.set_property(name_for(*n), &CimValue::String(Cow::Borrowed(v)));
                }
            }
            Operation::SetUint32Array(n, v) => {
                if v.len() <= 256 {
                    let _ = inst.set_property(
                        name_for(*n),
                        &CimValue::Array(CimArray::Uint32(v.clone())),
                    );
                }
            }
            Operation::SetNull(n) => {
                let _ = inst.set_property_null(name_for(*n), CimType::Uint32, false);
            }
            Operation::GetByName(n) => {
                let _ = inst.property_by_name(name_for(*n));
            }
            Operation::GetAt(i) => {
                let _ = inst.property_at(*i as usize);
                let _ = inst.property_name_at(*i as usize);
            }
            Operation::SetKey(n, v) => {
                let _ = inst.set_key_binding(name_for(*n), &CimValue::Sint64(*v));
            }
            Operation::ClearKeys => inst.clear_key_bindings(),
            Operation::BuildKeys => {
                let _ = inst.build_key_bindings_from_properties();
            }
            Operation::CloneAndMutate(n, v) => {
                let frozen = inst.clone();
                let _ = inst.set_property(name_for(*n), &CimValue::Uint32(*v));
                let _ = frozen.property_by_name(name_for(*n));
            }
        }
    }

    // re-attachment of a buffer we built ourselves must always validate
    let bytes = inst.buffer_bytes().to_vec();
    let class = inst.class().cloned();
    let ext_refs = inst.external_refs().to_vec();
    let restored = ScmoInstance::from_raw_parts(bytes, class, ext_refs)
        .expect("self-built buffers must re-attach");
    assert!(restored.content_equals(&inst));
});
