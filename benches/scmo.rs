//! SCMO record benchmarks
//!
//! Measures the hot paths of the record format: slot encode/decode through
//! the property API, copy-on-write clone plus first write, key-binding
//! construction, and the object-path text codec and hashing.

use std::borrow::Cow;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use scmo::{CimArray, CimType, CimValue, ObjectPath, ScmoClass, ScmoInstance};

fn bench_class() -> Arc<ScmoClass> {
    Arc::new(
        ScmoClass::builder("root/cimv2", "BNC_Disk")
            .key_property("DeviceId", CimType::String)
            .key_property("Index", CimType::Uint16)
            .property("BlockSize", CimType::Uint32)
            .property("Caption", CimType::String)
            .array_property("Partitions", CimType::Uint32)
            .build(),
    )
}

fn populated() -> ScmoInstance {
    let mut inst = ScmoInstance::new(bench_class());
    inst.set_property("DeviceId", &CimValue::String(Cow::Borrowed("sda")))
        .unwrap();
    inst.set_property("Index", &CimValue::Uint16(0)).unwrap();
    inst.set_property("BlockSize", &CimValue::Uint32(4096)).unwrap();
    inst.set_property("Caption", &CimValue::String(Cow::Borrowed("local disk")))
        .unwrap();
    inst.set_property(
        "Partitions",
        &CimValue::Array(CimArray::Uint32(vec![1, 2, 3, 4])),
    )
    .unwrap();
    inst
}

fn bench_property_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("property_access");

    group.bench_function("set_inline_scalar", |b| {
        let mut inst = populated();
        b.iter(|| {
            inst.set_property("BlockSize", black_box(&CimValue::Uint32(512)))
                .unwrap();
        });
    });

    group.bench_function("set_string", |b| {
        let mut inst = populated();
        b.iter(|| {
            inst.set_property(
                "Caption",
                black_box(&CimValue::String(Cow::Borrowed("replacement caption"))),
            )
            .unwrap();
        });
    });

    group.bench_function("get_by_name", |b| {
        let inst = populated();
        b.iter(|| black_box(inst.property_by_name(black_box("BlockSize")).unwrap()));
    });

    group.bench_function("get_string_borrowed", |b| {
        let inst = populated();
        b.iter(|| black_box(inst.property_by_name(black_box("Caption")).unwrap()));
    });

    group.bench_function("get_array", |b| {
        let inst = populated();
        b.iter(|| black_box(inst.property_by_name(black_box("Partitions")).unwrap()));
    });

    group.finish();
}

fn bench_cow(c: &mut Criterion) {
    let mut group = c.benchmark_group("cow");

    group.bench_function("handle_clone", |b| {
        let inst = populated();
        b.iter(|| black_box(inst.clone()));
    });

    group.bench_function("clone_then_first_write", |b| {
        let inst = populated();
        b.iter(|| {
            let mut copy = inst.clone();
            copy.set_property("BlockSize", &CimValue::Uint32(8192)).unwrap();
            black_box(copy)
        });
    });

    group.bench_function("clone_buffer", |b| {
        let inst = populated();
        b.iter(|| black_box(inst.clone_buffer()));
    });

    group.finish();
}

fn bench_key_bindings(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_bindings");

    group.bench_function("build_from_properties", |b| {
        let inst = populated();
        b.iter(|| {
            let mut copy = inst.clone();
            copy.build_key_bindings_from_properties().unwrap();
            black_box(copy)
        });
    });

    group.bench_function("to_object_path", |b| {
        let mut inst = populated();
        inst.build_key_bindings_from_properties().unwrap();
        b.iter(|| black_box(inst.to_object_path()));
    });

    group.finish();
}

fn bench_path_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("path_codec");
    let text = "//srv1/root/cimv2:BNC_Disk.DeviceId=\"sda\",Index=14,Removable=FALSE";
    let path = ObjectPath::parse(text).unwrap();

    group.bench_function("parse", |b| {
        b.iter(|| black_box(ObjectPath::parse(black_box(text)).unwrap()));
    });

    group.bench_function("render", |b| {
        b.iter(|| black_box(path.to_string()));
    });

    group.bench_function("hash", |b| {
        b.iter(|| {
            let mut hasher = DefaultHasher::new();
            black_box(&path).hash(&mut hasher);
            black_box(hasher.finish())
        });
    });

    group.bench_function("eq_reordered", |b| {
        let reordered = ObjectPath::parse(
            "//SRV1/root/cimv2:bnc_disk.Removable=false,Index=0xE,DeviceId=\"sda\"",
        )
        .unwrap();
        b.iter(|| black_box(path == reordered));
    });

    group.finish();
}

fn bench_relocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("relocation");
    let inst = populated();

    group.bench_function("from_raw_parts", |b| {
        b.iter(|| {
            let restored = ScmoInstance::from_raw_parts(
                inst.buffer_bytes().to_vec(),
                inst.class().cloned(),
                inst.external_refs().to_vec(),
            )
            .unwrap();
            black_box(restored)
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_property_access,
    bench_cow,
    bench_key_bindings,
    bench_path_codec,
    bench_relocation
);
criterion_main!(benches);
