//! # SCMO Regression Suite
//!
//! Source of truth for record-format correctness. Covers:
//!
//! - Value round-trips through the slot codec, scalars and arrays
//! - Null vs unset vs schema-default property reads
//! - Copy-on-write sharing, clone fidelity, and mutation isolation
//! - Offset relocation through `from_raw_parts`, including corrupt-byte
//!   rejection
//! - Key-binding equivalence, widening, and object-path identity
//! - Schema-less overflow chains and the conversion boundary
//!
//! If a test fails after a change, fix the format, not the expectation.

use std::borrow::Cow;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use scmo::{
    CimArray, CimDateTime, CimInstance, CimProperty, CimType, CimValue, ClassCache,
    KeyBindingKind, ObjectPath, ScmoClass, ScmoError, ScmoInstance,
};

fn disk_class() -> Arc<ScmoClass> {
    Arc::new(
        ScmoClass::builder("root/cimv2", "TST_Disk")
            .key_property("DeviceId", CimType::String)
            .key_property("Index", CimType::Uint16)
            .property("BlockSize", CimType::Uint32)
            .property_with_default(
                "Caption",
                CimType::String,
                CimValue::String(Cow::Borrowed("local disk")),
            )
            .array_property("Partitions", CimType::Uint32)
            .property("Installed", CimType::DateTime)
            .build(),
    )
}

fn path_hash(path: &ObjectPath) -> u64 {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}

mod round_trip_tests {
    use super::*;

    #[test]
    fn every_scalar_type_round_trips() {
        let class = Arc::new(
            ScmoClass::builder("root/test", "TST_AllTypes")
                .property("B", CimType::Boolean)
                .property("U8", CimType::Uint8)
                .property("S8", CimType::Sint8)
                .property("U16", CimType::Uint16)
                .property("S16", CimType::Sint16)
                .property("U32", CimType::Uint32)
                .property("S32", CimType::Sint32)
                .property("U64", CimType::Uint64)
                .property("S64", CimType::Sint64)
                .property("R32", CimType::Real32)
                .property("R64", CimType::Real64)
                .property("C16", CimType::Char16)
                .property("Str", CimType::String)
                .property("Dt", CimType::DateTime)
                .build(),
        );
        let mut inst = ScmoInstance::new(class);

        let dt = CimDateTime::parse("20260825113000.000000+000").unwrap();
        let values: [(&str, CimValue); 14] = [
            ("B", CimValue::Boolean(true)),
            ("U8", CimValue::Uint8(255)),
            ("S8", CimValue::Sint8(-128)),
            ("U16", CimValue::Uint16(65_535)),
            ("S16", CimValue::Sint16(-32_768)),
            ("U32", CimValue::Uint32(u32::MAX)),
            ("S32", CimValue::Sint32(i32::MIN)),
            ("U64", CimValue::Uint64(u64::MAX)),
            ("S64", CimValue::Sint64(i64::MIN)),
            ("R32", CimValue::Real32(1.5)),
            ("R64", CimValue::Real64(-2.25)),
            ("C16", CimValue::Char16(0x263A)),
            ("Str", CimValue::String(Cow::Borrowed("héllo"))),
            ("Dt", CimValue::DateTime(dt)),
        ];
        for (name, value) in &values {
            inst.set_property(name, value).unwrap();
        }
        for (name, value) in &values {
            assert_eq!(&inst.property_by_name(name).unwrap(), value, "{name}");
        }
    }

    #[test]
    fn arrays_round_trip() {
        let class = Arc::new(
            ScmoClass::builder("root/test", "TST_Arrays")
                .array_property("Bytes", CimType::Uint8)
                .array_property("Words", CimType::Uint32)
                .array_property("Names", CimType::String)
                .array_property("Flags", CimType::Boolean)
                .build(),
        );
        let mut inst = ScmoInstance::new(class);

        inst.set_property(
            "Bytes",
            &CimValue::Array(CimArray::Uint8(Cow::Borrowed(&[1, 2, 3]))),
        )
        .unwrap();
        inst.set_property("Words", &CimValue::Array(CimArray::Uint32(vec![7, u32::MAX])))
            .unwrap();
        inst.set_property(
            "Names",
            &CimValue::Array(CimArray::String(vec![
                Cow::Borrowed("a"),
                Cow::Borrowed(""),
                Cow::Borrowed("longer string value"),
            ])),
        )
        .unwrap();
        inst.set_property(
            "Flags",
            &CimValue::Array(CimArray::Boolean(vec![true, false, true])),
        )
        .unwrap();

        let CimValue::Array(CimArray::Uint8(bytes)) = inst.property_by_name("Bytes").unwrap()
        else {
            panic!("expected a uint8 array");
        };
        assert_eq!(bytes.as_ref(), &[1, 2, 3]);
        assert_eq!(
            inst.property_by_name("Words").unwrap().array_len(),
            Some(2)
        );
        assert_eq!(
            inst.property_by_name("Names").unwrap(),
            CimValue::Array(CimArray::String(vec![
                Cow::Borrowed("a"),
                Cow::Borrowed(""),
                Cow::Borrowed("longer string value"),
            ]))
        );
        assert_eq!(
            inst.property_by_name("Flags").unwrap(),
            CimValue::Array(CimArray::Boolean(vec![true, false, true]))
        );
    }

    #[test]
    fn null_unset_and_default_are_distinct() {
        let mut inst = ScmoInstance::new(super::disk_class());

        // unset without default
        assert_eq!(
            inst.property_by_name("BlockSize").unwrap_err(),
            ScmoError::NullValue
        );
        // unset with default reads the default
        assert_eq!(
            inst.property_by_name("Caption").unwrap(),
            CimValue::String(Cow::Borrowed("local disk"))
        );
        // explicit null wins over the default
        inst.set_property_null("Caption", CimType::String, false)
            .unwrap();
        assert_eq!(
            inst.property_by_name("Caption").unwrap_err(),
            ScmoError::NullValue
        );
        // a value wins over both
        inst.set_property("Caption", &CimValue::String(Cow::Borrowed("ssd")))
            .unwrap();
        assert_eq!(
            inst.property_by_name("Caption").unwrap(),
            CimValue::String(Cow::Borrowed("ssd"))
        );
    }

    #[test]
    fn replacing_values_abandons_old_payloads_cleanly() {
        let mut inst = ScmoInstance::new(super::disk_class());
        for round in 0..50u32 {
            let text = format!("device-{round}");
            inst.set_property("Caption", &CimValue::String(Cow::Borrowed(&text)))
                .unwrap();
            inst.set_property(
                "Partitions",
                &CimValue::Array(CimArray::Uint32(vec![round; (round % 7) as usize])),
            )
            .unwrap();
        }
        assert_eq!(
            inst.property_by_name("Caption").unwrap(),
            CimValue::String(Cow::Borrowed("device-49"))
        );
        assert_eq!(
            inst.property_by_name("Partitions").unwrap().array_len(),
            Some(0)
        );
    }

    #[test]
    fn datetime_text_round_trip() {
        for text in [
            "20260825113000.000000+000",
            "20001231235959.999999-480",
            "00000012041516.000000:000",
        ] {
            let dt = CimDateTime::parse(text).unwrap();
            assert_eq!(dt.to_string(), text);
            let packed = dt.to_bytes();
            assert_eq!(CimDateTime::from_bytes(&packed).unwrap(), dt);
        }
        assert!(CimDateTime::parse("20260825113000.******+000").is_err());
        assert!(CimDateTime::parse("not a datetime").is_err());
    }
}

mod cow_tests {
    use super::*;

    #[test]
    fn handle_clone_shares_until_first_write() {
        let mut a = ScmoInstance::new(disk_class());
        a.set_property("BlockSize", &CimValue::Uint32(512)).unwrap();

        let b = a.clone();
        let c = a.clone();
        assert!(a.is_same(&b) && b.is_same(&c));
        assert_eq!(a.ref_count(), 3);

        a.set_property("BlockSize", &CimValue::Uint32(4096)).unwrap();
        assert!(!a.is_same(&b));
        assert!(b.is_same(&c));
        assert_eq!(a.ref_count(), 1);
        assert_eq!(b.ref_count(), 2);
        assert_eq!(b.property_by_name("BlockSize").unwrap(), CimValue::Uint32(512));
        assert_eq!(a.property_by_name("BlockSize").unwrap(), CimValue::Uint32(4096));
    }

    #[test]
    fn clone_buffer_is_immediately_independent() {
        let mut a = ScmoInstance::new(disk_class());
        a.set_property("Caption", &CimValue::String(Cow::Borrowed("one")))
            .unwrap();

        let mut b = a.clone_buffer();
        assert!(!a.is_same(&b));
        assert!(a.content_equals(&b));

        b.set_property("Caption", &CimValue::String(Cow::Borrowed("two")))
            .unwrap();
        assert_eq!(
            a.property_by_name("Caption").unwrap(),
            CimValue::String(Cow::Borrowed("one"))
        );
        assert!(!a.content_equals(&b));
    }

    #[test]
    fn user_chains_survive_cow_clones() {
        let mut a = ScmoInstance::new_classless("root/x", "TST_Free");
        a.set_property("P1", &CimValue::Uint32(1)).unwrap();
        a.set_property("P2", &CimValue::String(Cow::Borrowed("v2")))
            .unwrap();

        let b = a.clone();
        a.set_property("P3", &CimValue::Boolean(true)).unwrap();
        a.set_property("P1", &CimValue::Uint32(10)).unwrap();

        assert_eq!(a.property_count(), 3);
        assert_eq!(b.property_count(), 2);
        assert_eq!(b.property_by_name("P1").unwrap(), CimValue::Uint32(1));
        assert_eq!(a.property_by_name("P1").unwrap(), CimValue::Uint32(10));
        assert_eq!(
            b.property_by_name("P3").unwrap_err(),
            ScmoError::NotFound
        );
    }

    #[test]
    fn shallow_clone_shares_reference_targets_deep_clone_does_not() {
        let target = ScmoInstance::new_classless("root/x", "TST_Target");
        let mut owner = ScmoInstance::new_classless("root/x", "TST_Owner");
        owner
            .set_property("Ref", &CimValue::Reference(target.clone()))
            .unwrap();

        let shallow = owner.clone_buffer();
        let CimValue::Reference(shared) = shallow.property_by_name("Ref").unwrap() else {
            panic!("expected a reference");
        };
        assert!(shared.is_same(&target));

        let deep = owner.clone_buffer_deep();
        let CimValue::Reference(copied) = deep.property_by_name("Ref").unwrap() else {
            panic!("expected a reference");
        };
        assert!(!copied.is_same(&target));
        assert!(copied.content_equals(&target));
    }
}

mod relocation_tests {
    use super::*;

    fn populated_instance() -> ScmoInstance {
        let mut inst = ScmoInstance::new(disk_class());
        inst.set_property("DeviceId", &CimValue::String(Cow::Borrowed("sda")))
            .unwrap();
        inst.set_property("BlockSize", &CimValue::Uint32(4096)).unwrap();
        inst.set_property(
            "Partitions",
            &CimValue::Array(CimArray::Uint32(vec![1, 2, 3])),
        )
        .unwrap();
        inst.build_key_bindings_from_properties().unwrap_err();
        inst.set_property("Index", &CimValue::Uint16(0)).unwrap();
        inst.build_key_bindings_from_properties().unwrap();
        inst
    }

    #[test]
    fn raw_bytes_reattach_at_a_new_base() {
        let inst = populated_instance();
        // fresh Vec, new base address, no fixups
        let bytes = inst.buffer_bytes().to_vec();
        let restored = ScmoInstance::from_raw_parts(
            bytes,
            inst.class().cloned(),
            inst.external_refs().to_vec(),
        )
        .unwrap();

        assert!(!restored.is_same(&inst));
        assert!(restored.content_equals(&inst));
        assert_eq!(
            restored.property_by_name("Partitions").unwrap(),
            CimValue::Array(CimArray::Uint32(vec![1, 2, 3]))
        );
        assert_eq!(
            restored.key_binding("DeviceId").unwrap(),
            CimValue::String(Cow::Borrowed("sda"))
        );
    }

    #[test]
    fn corrupt_bytes_are_rejected() {
        let inst = populated_instance();
        let good = inst.buffer_bytes().to_vec();
        let class = inst.class().cloned();

        // bad magic
        let mut bytes = good.clone();
        bytes[0] ^= 0xff;
        assert!(ScmoInstance::from_raw_parts(bytes, class.clone(), Vec::new()).is_err());

        // truncated block
        let bytes = good[..good.len() - 1].to_vec();
        assert!(ScmoInstance::from_raw_parts(bytes, class.clone(), Vec::new()).is_err());

        // header too small
        assert!(ScmoInstance::from_raw_parts(vec![0u8; 16], None, Vec::new()).is_err());

        // class shape disagreement
        let other = Arc::new(ScmoClass::builder("root/cimv2", "TST_Disk").build());
        assert!(
            ScmoInstance::from_raw_parts(good.clone(), Some(other), Vec::new()).is_err()
        );

        // external table length disagreement
        let mut owner = ScmoInstance::new_classless("root/x", "TST_Owner");
        owner
            .set_property(
                "Ref",
                &CimValue::Reference(ScmoInstance::new_classless("root/x", "TST_T")),
            )
            .unwrap();
        assert!(ScmoInstance::from_raw_parts(
            owner.buffer_bytes().to_vec(),
            None,
            Vec::new()
        )
        .is_err());
    }

    #[test]
    fn classless_buffers_reattach_without_a_class() {
        let mut inst = ScmoInstance::new_classless("root/x", "TST_Free");
        inst.set_property("Name", &CimValue::String(Cow::Borrowed("n")))
            .unwrap();
        inst.set_key_binding("Name", &CimValue::String(Cow::Borrowed("n")))
            .unwrap();

        let restored =
            ScmoInstance::from_raw_parts(inst.buffer_bytes().to_vec(), None, Vec::new()).unwrap();
        assert!(restored.is_classless());
        assert!(restored.content_equals(&inst));

        // a class may not be forced onto a classless buffer
        assert!(ScmoInstance::from_raw_parts(
            inst.buffer_bytes().to_vec(),
            Some(disk_class()),
            Vec::new()
        )
        .is_err());
    }
}

mod key_binding_tests {
    use super::*;

    #[test]
    fn widening_acceptance_and_rejection() {
        let mut inst = ScmoInstance::new(disk_class());

        inst.set_key_binding("Index", &CimValue::Uint8(3)).unwrap();
        assert_eq!(inst.key_binding("Index").unwrap(), CimValue::Uint16(3));
        inst.set_key_binding("Index", &CimValue::Sint64(9)).unwrap();
        assert_eq!(inst.key_binding("Index").unwrap(), CimValue::Uint16(9));

        assert_eq!(
            inst.set_key_binding("Index", &CimValue::Sint16(-1)).unwrap_err(),
            ScmoError::TypeMismatch
        );
        assert_eq!(
            inst.set_key_binding("Index", &CimValue::Boolean(true)).unwrap_err(),
            ScmoError::TypeMismatch
        );
        assert_eq!(
            inst.set_key_binding("Index", &CimValue::Array(CimArray::Uint16(vec![1])))
                .unwrap_err(),
            ScmoError::InvalidParameter
        );
    }

    #[test]
    fn numeric_literal_spellings_are_one_binding() {
        let variants = ["14", "014", "+14", "0xE", "0Xe"];
        let paths: Vec<ObjectPath> = variants
            .iter()
            .map(|v| ObjectPath::parse(&format!("root:TST_Unit.Index={v}")).unwrap())
            .collect();
        for a in &paths {
            for b in &paths {
                assert_eq!(a, b);
                assert_eq!(path_hash(a), path_hash(b));
            }
        }
        let other = ObjectPath::parse("root:TST_Unit.Index=15").unwrap();
        assert_ne!(paths[0], other);
    }

    #[test]
    fn boolean_and_name_case_insensitivity() {
        let a = ObjectPath::parse("root:TST_Unit.Enabled=true").unwrap();
        let b = ObjectPath::parse("ROOT:tst_unit.ENABLED=TRUE").unwrap();
        let c = ObjectPath::parse("root:TST_Unit.Enabled=True").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(path_hash(&a), path_hash(&b));
    }

    #[test]
    fn flower_scenario_preserves_table_order() {
        // all-key class entered y, x, z: rendering keeps entry order,
        // equality and hashing ignore it
        let mut path = ObjectPath::new("", "", "A");
        path.set_key("y", KeyBindingKind::String, "lavender");
        path.set_key("x", KeyBindingKind::String, "rose");
        path.set_key("z", KeyBindingKind::String, "rosemary");

        let text = path.to_string();
        assert_eq!(text, "A.y=\"lavender\",x=\"rose\",z=\"rosemary\"");

        let reordered =
            ObjectPath::parse("A.z=\"rosemary\",x=\"rose\",y=\"lavender\"").unwrap();
        assert_eq!(path, reordered);
        assert_eq!(path_hash(&path), path_hash(&reordered));
        assert_eq!(ObjectPath::parse(&text).unwrap(), path);

        // same identity derived from an instance: the key table fills in
        // schema order, and the derived path still matches the entered one
        let class = Arc::new(
            ScmoClass::builder("", "A")
                .key_property("x", CimType::String)
                .key_property("y", CimType::String)
                .key_property("z", CimType::String)
                .build(),
        );
        let mut inst = ScmoInstance::new(class);
        inst.set_property("x", &CimValue::String(Cow::Borrowed("rose")))
            .unwrap();
        inst.set_property("y", &CimValue::String(Cow::Borrowed("lavender")))
            .unwrap();
        inst.set_property("z", &CimValue::String(Cow::Borrowed("rosemary")))
            .unwrap();
        inst.build_key_bindings_from_properties().unwrap();

        let derived = inst.to_object_path();
        assert_eq!(
            derived.to_string(),
            "A.x=\"rose\",y=\"lavender\",z=\"rosemary\""
        );
        assert_eq!(derived, path);
        assert_eq!(path_hash(&derived), path_hash(&path));
    }

    #[test]
    fn build_key_bindings_success_and_failure() {
        let mut inst = ScmoInstance::new(disk_class());
        assert_eq!(
            inst.build_key_bindings_from_properties().unwrap_err(),
            ScmoError::NoSuchProperty
        );

        inst.set_property("DeviceId", &CimValue::String(Cow::Borrowed("sdb")))
            .unwrap();
        inst.set_property("Index", &CimValue::Uint16(2)).unwrap();
        inst.build_key_bindings_from_properties().unwrap();

        let path = inst.to_object_path();
        assert_eq!(path.to_string(), "root/cimv2:TST_Disk.DeviceId=\"sdb\",Index=2");
    }

    #[test]
    fn key_table_and_property_table_are_independent() {
        let mut inst = ScmoInstance::new(disk_class());
        inst.set_property("Index", &CimValue::Uint16(1)).unwrap();
        inst.set_key_binding("Index", &CimValue::Uint16(7)).unwrap();

        assert_eq!(inst.property_by_name("Index").unwrap(), CimValue::Uint16(1));
        assert_eq!(inst.key_binding("Index").unwrap(), CimValue::Uint16(7));

        inst.clear_key_bindings();
        assert_eq!(inst.property_by_name("Index").unwrap(), CimValue::Uint16(1));
        assert_eq!(inst.key_binding("Index").unwrap_err(), ScmoError::NullValue);
    }
}

mod overflow_tests {
    use super::*;

    #[test]
    fn classless_instances_accept_anything() {
        let mut inst = ScmoInstance::new_classless("root/free", "TST_Bag");
        for idx in 0..32u32 {
            let name = format!("Prop{idx}");
            inst.set_property(&name, &CimValue::Uint32(idx)).unwrap();
        }
        assert_eq!(inst.property_count(), 32);
        for idx in 0..32u32 {
            let name = format!("prop{idx}");
            assert_eq!(
                inst.property_by_name(&name).unwrap(),
                CimValue::Uint32(idx)
            );
        }
        assert_eq!(inst.property_name_at(31).unwrap(), "Prop31");
        assert_eq!(
            inst.property_at(32).unwrap_err(),
            ScmoError::IndexOutOfBound
        );
    }

    #[test]
    fn schema_bearing_instances_reject_unknown_names() {
        let mut inst = ScmoInstance::new(disk_class());
        assert_eq!(
            inst.set_property("NotDeclared", &CimValue::Uint32(1)).unwrap_err(),
            ScmoError::NotFound
        );
        assert_eq!(
            inst.property_by_name("NotDeclared").unwrap_err(),
            ScmoError::NotFound
        );
    }

    #[test]
    fn origin_filtering_applies_even_when_compromised() {
        let class = Arc::new(
            ScmoClass::builder("root/test", "TST_Derived")
                .property("Caption", CimType::String)
                .origin("TST_Base")
                .property("Local", CimType::Uint8)
                .build(),
        );
        let mut inst = ScmoInstance::new(class);
        inst.set_property("Caption", &CimValue::String(Cow::Borrowed("c")))
            .unwrap();

        assert!(inst.property_with_origin("Caption", "tst_base").is_ok());
        assert_eq!(
            inst.property_with_origin("Caption", "TST_Derived").unwrap_err(),
            ScmoError::OriginMismatch
        );

        inst.set_class_name("TST_Renamed").unwrap();
        assert!(inst.is_compromised());
        assert!(inst.property_with_origin("Caption", "TST_Base").is_ok());
        assert_eq!(
            inst.property_with_origin("Local", "TST_Base").unwrap_err(),
            ScmoError::OriginMismatch
        );
    }
}

mod conversion_tests {
    use super::*;

    #[test]
    fn cim_instance_round_trip_is_order_preserving() {
        let cache = ClassCache::new();
        cache.insert(
            ScmoClass::builder("root/cimv2", "TST_Disk")
                .key_property("DeviceId", CimType::String)
                .property("BlockSize", CimType::Uint32)
                .build(),
        );

        let src = CimInstance {
            class_name: "TST_Disk".to_string(),
            namespace: "root/cimv2".to_string(),
            path: None,
            properties: vec![
                CimProperty {
                    name: "DeviceId".to_string(),
                    vtype: CimType::String,
                    is_array: false,
                    class_origin: Some("TST_Disk".to_string()),
                    value: Some(CimValue::String(Cow::Borrowed("sda"))),
                },
                CimProperty {
                    name: "BlockSize".to_string(),
                    vtype: CimType::Uint32,
                    is_array: false,
                    class_origin: Some("TST_Disk".to_string()),
                    value: Some(CimValue::Uint32(512)),
                },
            ],
        };

        let inst = ScmoInstance::from_cim_instance(&cache, &src).unwrap();
        let back = inst.to_cim_instance();

        assert_eq!(back.properties.len(), src.properties.len());
        for (a, b) in back.properties.iter().zip(&src.properties) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.vtype, b.vtype);
            assert_eq!(a.value, b.value);
        }
    }

    #[test]
    fn reference_values_round_trip_through_paths() {
        let cache = ClassCache::new();
        cache.insert(
            ScmoClass::builder("root/cimv2", "TST_Disk")
                .key_property("DeviceId", CimType::String)
                .build(),
        );

        let path = ObjectPath::parse(
            "root/cimv2:TST_Mount.Disk=\"root/cimv2:TST_Disk.DeviceId=\\\"sda\\\"\",Dir=\"/\"",
        )
        .unwrap();
        let inst = ScmoInstance::from_object_path(&cache, &path).unwrap();

        let rendered = inst.to_object_path();
        assert_eq!(rendered, path);
        assert_eq!(path_hash(&rendered), path_hash(&path));
    }
}
